//! InfluxDB 2.x client.

use std::collections::{BTreeMap, HashMap};
use std::pin::Pin;

use chrono::{DateTime, FixedOffset};
use futures::TryStreamExt;
use reqwest::{header, Url};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;

use crate::annotated_csv::Reader;
use crate::error::{Error, HttpError, Result};
use crate::options::{Precision, WriteOptions};
use crate::point::Point;
use crate::write::{WriteApi, WriteService};

/// Parameters for creating a new [`Client`]. Only `server_url` is
/// mandatory; `auth_token` is needed unless authentication happens outside
/// this client.
#[derive(Clone, Debug, Default)]
pub struct Params {
    /// URL of the InfluxDB server, e.g. `http://localhost:8086`.
    pub server_url: String,
    /// API authorization token. Empty disables the `Authorization` header.
    pub auth_token: String,
    /// Custom HTTP client, for TLS configuration, timeouts or proxies.
    pub http_client: Option<reqwest::Client>,
}

/// Reader over a streamed query response body.
pub type QueryResult = Reader<Pin<Box<dyn AsyncRead + Send>>>;

/// An InfluxDB 2.x client.
///
/// ```ignore
/// let client = Client::new(Params {
///     server_url: "http://localhost:8086".to_string(),
///     auth_token: "my-token".to_string(),
///     ..Default::default()
/// })?;
///
/// let mut result = client.query("my-org", r#"from(bucket: "b") |> range(start: -1h)"#).await?;
/// while result.next_section().await {
///     while result.next_row().await {
///         // result.decode::<MyRecord>()?
///     }
/// }
/// ```
#[derive(Clone, Debug)]
pub struct Client {
    http: reqwest::Client,
    server_url: Url,
    api_url: Url,
    authorization: Option<String>,
    user_agent: String,
}

#[derive(Serialize)]
struct Dialect {
    annotations: Vec<&'static str>,
    delimiter: &'static str,
    header: bool,
}

impl Default for Dialect {
    fn default() -> Self {
        Self {
            annotations: vec!["datatype", "default", "group"],
            delimiter: ",",
            header: true,
        }
    }
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    #[serde(rename = "type")]
    query_type: &'static str,
    query: &'a str,
    dialect: Dialect,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    params: HashMap<String, String>,
}

/// `GET /health` response model.
#[derive(Clone, Debug, Deserialize)]
pub struct Health {
    /// Service name.
    pub name: String,
    /// Overall status, `pass` or `fail`.
    pub status: String,
    /// Optional status detail.
    #[serde(default)]
    pub message: Option<String>,
    /// Commit the server was built from.
    #[serde(default)]
    pub commit: Option<String>,
    /// Server version.
    #[serde(default)]
    pub version: Option<String>,
    /// Nested component checks, passed through verbatim.
    #[serde(default)]
    pub checks: Option<serde_json::Value>,
}

/// `GET /ready` response model.
#[derive(Clone, Debug, Deserialize)]
pub struct Ready {
    /// Readiness status.
    #[serde(default)]
    pub status: Option<String>,
    /// When the instance started.
    #[serde(default)]
    pub started: Option<DateTime<FixedOffset>>,
    /// Uptime as a duration string, e.g. `6m49.2s`.
    #[serde(default)]
    pub up: Option<String>,
}

impl Ready {
    /// The reported uptime, parsed from the `up` duration string.
    pub fn uptime(&self) -> Option<chrono::Duration> {
        self.up
            .as_deref()
            .and_then(|s| go_parse_duration::parse_duration(s).ok())
            .map(chrono::Duration::nanoseconds)
    }
}

impl Client {
    /// Create a client from the given parameters.
    pub fn new(params: Params) -> Result<Self> {
        if params.server_url.is_empty() {
            return Err(Error::Config("empty server URL".to_string()));
        }
        let mut address = params.server_url.clone();
        if !address.ends_with('/') {
            address.push('/');
        }
        let server_url = Url::parse(&address)
            .map_err(|e| Error::Config(format!("error parsing server URL: {}", e)))?;
        let api_url = server_url
            .join("api/v2/")
            .map_err(|e| Error::Config(format!("error parsing server URL: {}", e)))?;
        let authorization = if params.auth_token.is_empty() {
            None
        } else {
            Some(format!("Token {}", params.auth_token))
        };
        let http = match params.http_client {
            Some(client) => client,
            None => reqwest::Client::builder()
                .gzip(true)
                .build()
                .map_err(Error::Transport)?,
        };
        let user_agent = format!(
            "influxdb-client-rust/{} ({}; {})",
            env!("CARGO_PKG_VERSION"),
            std::env::consts::OS,
            std::env::consts::ARCH
        );
        Ok(Self {
            http,
            server_url,
            api_url,
            authorization,
            user_agent,
        })
    }

    /// The cached `{server}/api/v2/` base URL.
    pub fn api_url(&self) -> &Url {
        &self.api_url
    }

    /// Send a Flux query and stream the annotated CSV result. The returned
    /// reader holds the response body; drop or [`close`](Reader::close) it
    /// to release the connection.
    pub async fn query(&self, org: &str, query: &str) -> Result<QueryResult> {
        self.query_with_params(org, query, &[]).await
    }

    /// Like [`query`](Client::query), with parameters referenced from the
    /// Flux source via `params.<key>`.
    pub async fn query_with_params(
        &self,
        org: &str,
        query: &str,
        params: &[(&str, &str)],
    ) -> Result<QueryResult> {
        let url = self
            .api_url
            .join("query")
            .map_err(|e| Error::Config(format!("error building query URL: {}", e)))?;
        let request = QueryRequest {
            query_type: "flux",
            query,
            dialect: Dialect::default(),
            params: params
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        };

        let resp = self
            .request(self.http.post(url))
            .query(&[("org", org)])
            .header(header::CONTENT_TYPE, "application/json")
            .json(&request)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Error::Http(resolve_http_error(resp).await));
        }

        let stream = resp.bytes_stream().map_err(std::io::Error::other);
        let body: Pin<Box<dyn AsyncRead + Send>> = Box::pin(StreamReader::new(stream));
        Ok(Reader::new(body))
    }

    /// Write points synchronously in a single request, with nanosecond
    /// precision. For buffered, retrying writes use
    /// [`write_api`](Client::write_api).
    pub async fn write_points(&self, org: &str, bucket: &str, points: &[Point]) -> Result<()> {
        let mut body = String::new();
        let no_defaults = BTreeMap::new();
        for point in points {
            point.write_line_protocol(&mut body, Precision::Nanoseconds, &no_defaults)?;
        }

        let mut url = self
            .api_url
            .join("write")
            .map_err(|e| Error::Config(format!("error building write URL: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("org", org)
            .append_pair("bucket", bucket)
            .append_pair("precision", Precision::Nanoseconds.as_str());

        let resp = self
            .request(self.http.post(url))
            .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(body)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Error::Http(resolve_http_error(resp).await));
        }
        Ok(())
    }

    /// Create a buffered, retrying write API for the given organization and
    /// bucket.
    pub fn write_api(&self, org: &str, bucket: &str, options: WriteOptions) -> Result<WriteApi> {
        let service = WriteService::new(
            self.http.clone(),
            &self.api_url,
            self.authorization.clone(),
            self.user_agent.clone(),
            org,
            bucket,
            options.clone(),
        )?;
        Ok(WriteApi::with_service(service, options))
    }

    /// Check server health via `GET /health`.
    pub async fn health(&self) -> Result<Health> {
        let url = self
            .server_url
            .join("health")
            .map_err(|e| Error::Config(format!("error building health URL: {}", e)))?;
        let resp = self.request(self.http.get(url)).send().await?;
        if !resp.status().is_success() {
            return Err(Error::Http(resolve_http_error(resp).await));
        }
        Ok(resp.json().await?)
    }

    /// Check server readiness via `GET /ready`; reports how long the
    /// instance has been up.
    pub async fn ready(&self) -> Result<Ready> {
        let url = self
            .server_url
            .join("ready")
            .map_err(|e| Error::Config(format!("error building ready URL: {}", e)))?;
        let resp = self.request(self.http.get(url)).send().await?;
        if !resp.status().is_success() {
            return Err(Error::Http(resolve_http_error(resp).await));
        }
        Ok(resp.json().await?)
    }

    fn request(&self, mut builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder = builder.header(header::USER_AGENT, &self.user_agent);
        if let Some(auth) = &self.authorization {
            builder = builder.header(header::AUTHORIZATION, auth);
        }
        builder
    }
}

/// Parse a non-2xx response into an [`HttpError`]: `Retry-After` is
/// captured, `application/json` bodies are decoded from both the
/// `{code,message}` and `{error}` shapes, anything else becomes the message
/// verbatim, and empty messages fall back to status-derived defaults.
pub(crate) async fn resolve_http_error(resp: reqwest::Response) -> HttpError {
    let status = resp.status();
    let retry_after = resp
        .headers()
        .get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    let content_type = resp
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or("").trim().to_ascii_lowercase())
        .unwrap_or_default();

    let mut code = status
        .canonical_reason()
        .map(|reason| format!("{} {}", status.as_u16(), reason))
        .unwrap_or_else(|| status.as_u16().to_string());
    let mut message = String::new();

    #[derive(Deserialize)]
    struct ErrorBody {
        code: Option<String>,
        message: Option<String>,
        error: Option<String>,
    }

    if content_type == "application/json" {
        match resp.json::<ErrorBody>().await {
            Ok(body) => {
                if let Some(c) = body.code {
                    code = c;
                }
                message = body.message.or(body.error).unwrap_or_default();
            }
            Err(e) => message = e.to_string(),
        }
    } else {
        match resp.text().await {
            Ok(text) => message = text,
            Err(e) => message = e.to_string(),
        }
    }

    if message.is_empty() {
        match status.as_u16() {
            429 => {
                code = "too many requests".to_string();
                message = "exceeded rate limit".to_string();
            }
            503 => {
                code = "unavailable".to_string();
                message = "service temporarily unavailable".to_string();
            }
            _ => {}
        }
    }

    HttpError {
        status: status.as_u16(),
        code,
        message,
        retry_after,
    }
}
