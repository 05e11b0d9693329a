//! Write configuration.

use std::collections::BTreeMap;
use std::str::FromStr;

use crate::error::Error;

/// Timestamp precision for written points.
///
/// Only the canonical InfluxDB token set `ns`/`us`/`ms`/`s` is accepted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Precision {
    /// Nanosecond precision (`ns`), the default.
    #[default]
    Nanoseconds,
    /// Microsecond precision (`us`).
    Microseconds,
    /// Millisecond precision (`ms`).
    Milliseconds,
    /// Second precision (`s`).
    Seconds,
}

impl Precision {
    /// The precision token sent in the write URL.
    pub fn as_str(&self) -> &'static str {
        match self {
            Precision::Nanoseconds => "ns",
            Precision::Microseconds => "us",
            Precision::Milliseconds => "ms",
            Precision::Seconds => "s",
        }
    }

    /// Nanoseconds per unit of this precision.
    pub(crate) fn divisor(&self) -> i64 {
        match self {
            Precision::Nanoseconds => 1,
            Precision::Microseconds => 1_000,
            Precision::Milliseconds => 1_000_000,
            Precision::Seconds => 1_000_000_000,
        }
    }
}

impl FromStr for Precision {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ns" => Ok(Precision::Nanoseconds),
            "us" => Ok(Precision::Microseconds),
            "ms" => Ok(Precision::Milliseconds),
            "s" => Ok(Precision::Seconds),
            other => Err(Error::Config(format!("invalid precision: {}", other))),
        }
    }
}

impl std::fmt::Display for Precision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options for the asynchronous write API.
///
/// All methods consume and return `self`, so options chain:
///
/// ```ignore
/// let opts = WriteOptions::default()
///     .batch_size(100)
///     .flush_interval(500)
///     .use_gzip(true);
/// ```
#[derive(Clone, Debug)]
pub struct WriteOptions {
    pub(crate) batch_size: usize,
    pub(crate) flush_interval_ms: u64,
    pub(crate) use_gzip: bool,
    pub(crate) retry_interval_ms: u64,
    pub(crate) max_retry_interval_ms: u64,
    pub(crate) max_retry_time_ms: u64,
    pub(crate) exponential_base: u32,
    pub(crate) max_retries: u32,
    pub(crate) retry_buffer_limit: usize,
    pub(crate) precision: Precision,
    pub(crate) default_tags: BTreeMap<String, String>,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            batch_size: 5000,
            flush_interval_ms: 1000,
            use_gzip: false,
            retry_interval_ms: 5000,
            max_retry_interval_ms: 125_000,
            max_retry_time_ms: 180_000,
            exponential_base: 2,
            max_retries: 5,
            retry_buffer_limit: 50_000,
            precision: Precision::Nanoseconds,
            default_tags: BTreeMap::new(),
        }
    }
}

impl WriteOptions {
    /// Number of records collected into one batch. Default 5000.
    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Interval in ms after which a partial buffer is flushed. Default
    /// 1000 ms; 0 disables the timer so only size triggers and explicit
    /// flushes emit batches.
    pub fn flush_interval(mut self, ms: u64) -> Self {
        self.flush_interval_ms = ms;
        self
    }

    /// Compress write bodies with gzip. Default off.
    pub fn use_gzip(mut self, enabled: bool) -> Self {
        self.use_gzip = enabled;
        self
    }

    /// Initial retry delay in ms. Default 5000 ms.
    pub fn retry_interval(mut self, ms: u64) -> Self {
        self.retry_interval_ms = ms;
        self
    }

    /// Upper bound on the computed retry delay in ms. Default 125 000 ms.
    pub fn max_retry_interval(mut self, ms: u64) -> Self {
        self.max_retry_interval_ms = ms;
        self
    }

    /// How long a batch stays eligible for retrying, in ms. Default
    /// 180 000 ms.
    pub fn max_retry_time(mut self, ms: u64) -> Self {
        self.max_retry_time_ms = ms;
        self
    }

    /// Base of the exponential backoff. Default 2.
    pub fn exponential_base(mut self, base: u32) -> Self {
        self.exponential_base = base.max(1);
        self
    }

    /// Maximum retries per batch. Default 5; 0 disables retrying.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Retry buffer limit in records; the retry queue holds
    /// `limit / batch_size` batches. Default 50 000.
    pub fn retry_buffer_limit(mut self, limit: usize) -> Self {
        self.retry_buffer_limit = limit;
        self
    }

    /// Timestamp precision for written points. Default nanoseconds.
    pub fn precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }

    /// Add a tag merged into every written point. Tags set on a point
    /// override default tags with the same key.
    pub fn default_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_tags.insert(key.into(), value.into());
        self
    }

    /// Retry queue capacity in batches, always at least 1.
    pub(crate) fn retry_queue_capacity(&self) -> usize {
        (self.retry_buffer_limit / self.batch_size).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precision_tokens() {
        assert_eq!(Precision::Nanoseconds.as_str(), "ns");
        assert_eq!(Precision::Microseconds.as_str(), "us");
        assert_eq!(Precision::Milliseconds.as_str(), "ms");
        assert_eq!(Precision::Seconds.as_str(), "s");

        assert_eq!("ns".parse::<Precision>().unwrap(), Precision::Nanoseconds);
        assert_eq!("s".parse::<Precision>().unwrap(), Precision::Seconds);
        // only the canonical token set is valid
        assert!("n".parse::<Precision>().is_err());
        assert!("µs".parse::<Precision>().is_err());
        assert!("m".parse::<Precision>().is_err());
    }

    #[test]
    fn test_defaults() {
        let opts = WriteOptions::default();
        assert_eq!(opts.batch_size, 5000);
        assert_eq!(opts.flush_interval_ms, 1000);
        assert_eq!(opts.retry_interval_ms, 5000);
        assert_eq!(opts.max_retry_interval_ms, 125_000);
        assert_eq!(opts.max_retry_time_ms, 180_000);
        assert_eq!(opts.exponential_base, 2);
        assert_eq!(opts.max_retries, 5);
        assert_eq!(opts.retry_queue_capacity(), 10);
    }

    #[test]
    fn test_retry_queue_capacity_floor() {
        let opts = WriteOptions::default()
            .batch_size(5000)
            .retry_buffer_limit(100);
        assert_eq!(opts.retry_queue_capacity(), 1);

        let opts = WriteOptions::default()
            .batch_size(5000)
            .retry_buffer_limit(15_000);
        assert_eq!(opts.retry_queue_capacity(), 3);
    }
}
