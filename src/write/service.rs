//! Write endpoint service: one batch in, one HTTP request out.

use std::io::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use parking_lot::Mutex;
use reqwest::header;
use reqwest::Url;
use tokio::time::{Duration, Instant};
use tracing::debug;

use crate::client::resolve_http_error;
use crate::error::{Error, Result};
use crate::options::WriteOptions;
use crate::point::Point;

static NEXT_BATCH_ID: AtomicU64 = AtomicU64::new(1);

/// One unit of retry: a contiguous slice of newline-terminated line protocol
/// records, sent as a single HTTP request.
#[derive(Clone, Debug)]
pub struct Batch {
    /// Monotonic identity; the retry queue compares batches by it.
    pub(crate) id: u64,
    /// Joined record lines, each newline-terminated.
    pub lines: Arc<str>,
    /// Retry attempts so far; 0 until the first write has failed.
    pub attempts: u32,
    /// Point in time after which the batch is dropped instead of retried.
    pub(crate) expires_at: Instant,
    /// Set when the batch was invalidated by the expire scan.
    pub(crate) evicted: bool,
}

impl Batch {
    /// Create a batch expiring `expire_delay_ms` from now.
    pub fn new(lines: String, expire_delay_ms: u64) -> Self {
        Self {
            id: NEXT_BATCH_ID.fetch_add(1, Ordering::Relaxed),
            lines: lines.into(),
            attempts: 0,
            expires_at: Instant::now() + Duration::from_millis(expire_delay_ms),
            evicted: false,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_id(id: u64, lines: String, expires_at: Instant) -> Self {
        Self {
            id,
            lines: lines.into(),
            attempts: 0,
            expires_at,
            evicted: false,
        }
    }
}

/// Transport seam consumed by the write coordinator.
///
/// [`WriteService`] is the production implementation; tests substitute their
/// own to observe traffic and inject failures.
#[async_trait]
pub trait BatchWriter: Send + Sync + 'static {
    /// Perform one write attempt for `batch`.
    async fn write_batch(&self, batch: &Batch) -> Result<()>;

    /// When the most recent write attempt started, if any. The coordinator
    /// measures its backoff gate from this.
    fn last_write_attempt(&self) -> Option<Instant>;
}

#[async_trait]
impl<T: BatchWriter + ?Sized> BatchWriter for std::sync::Arc<T> {
    async fn write_batch(&self, batch: &Batch) -> Result<()> {
        (**self).write_batch(batch).await
    }

    fn last_write_attempt(&self) -> Option<Instant> {
        (**self).last_write_attempt()
    }
}

/// Issues write requests against `{base}/api/v2/write`.
pub struct WriteService {
    http: reqwest::Client,
    url: Url,
    authorization: Option<String>,
    user_agent: String,
    options: WriteOptions,
    last_write_attempt: Mutex<Option<Instant>>,
}

impl WriteService {
    /// Build the service. The target URL is constructed once, here.
    pub(crate) fn new(
        http: reqwest::Client,
        api_url: &Url,
        authorization: Option<String>,
        user_agent: String,
        org: &str,
        bucket: &str,
        options: WriteOptions,
    ) -> Result<Self> {
        let mut url = api_url
            .join("write")
            .map_err(|e| Error::Config(format!("error building write URL: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("org", org)
            .append_pair("bucket", bucket)
            .append_pair("precision", options.precision.as_str());
        Ok(Self {
            http,
            url,
            authorization,
            user_agent,
            options,
            last_write_attempt: Mutex::new(None),
        })
    }

    /// The write endpoint URL including query parameters.
    pub fn write_url(&self) -> &Url {
        &self.url
    }

    /// Encode points to newline-terminated line protocol, merging the
    /// configured default tags into each point.
    pub fn encode_points(&self, points: &[Point]) -> Result<String> {
        let mut out = String::new();
        for point in points {
            point.write_line_protocol(&mut out, self.options.precision, &self.options.default_tags)?;
        }
        Ok(out)
    }
}

#[async_trait]
impl BatchWriter for WriteService {
    async fn write_batch(&self, batch: &Batch) -> Result<()> {
        debug!(bytes = batch.lines.len(), attempts = batch.attempts, "writing batch");
        let body: Vec<u8> = if self.options.use_gzip {
            let mut enc = GzEncoder::new(Vec::new(), Compression::default());
            enc.write_all(batch.lines.as_bytes())?;
            enc.finish()?
        } else {
            batch.lines.as_bytes().to_vec()
        };

        *self.last_write_attempt.lock() = Some(Instant::now());

        let mut req = self
            .http
            .post(self.url.clone())
            .header(header::USER_AGENT, &self.user_agent)
            .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .header(header::ACCEPT, "application/json");
        if let Some(auth) = &self.authorization {
            req = req.header(header::AUTHORIZATION, auth);
        }
        if self.options.use_gzip {
            req = req.header(header::CONTENT_ENCODING, "gzip");
        }

        let resp = req.body(body).send().await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(Error::Http(resolve_http_error(resp).await))
        }
    }

    fn last_write_attempt(&self) -> Option<Instant> {
        *self.last_write_attempt.lock()
    }
}
