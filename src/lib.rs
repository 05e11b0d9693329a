//! # influxdb-async
//!
//! Asynchronous client for InfluxDB 2.x: buffered, retrying line protocol
//! writes and streaming annotated-CSV queries.
//!
//! ## Writing
//!
//! The write API buffers records and ships them in batches in the
//! background. Retryable failures (connection errors, HTTP 429 and 5xx) are
//! re-queued with exponential backoff and bounded buffering; the oldest
//! batches are dropped when the retry buffer overflows or a batch outlives
//! its retry window.
//!
//! ```ignore
//! use influxdb_async::{Client, Params, Point, WriteOptions};
//!
//! let client = Client::new(Params {
//!     server_url: "http://localhost:8086".to_string(),
//!     auth_token: "my-token".to_string(),
//!     ..Default::default()
//! })?;
//!
//! let mut write_api = client.write_api("my-org", "my-bucket", WriteOptions::default())?;
//! write_api
//!     .write_point(&Point::new("cpu").tag("host", "server01").field("usage", 12.5))
//!     .await?;
//! write_api.close().await;
//! ```
//!
//! ## Querying
//!
//! Query results stream table by table and row by row, with constant
//! memory usage. Rows decode into record types declared with
//! [`flux_record!`], or into positional sequences of `String` or [`Value`].
//!
//! ```ignore
//! use influxdb_async::flux_record;
//!
//! flux_record! {
//!     #[derive(Debug, PartialEq)]
//!     pub struct Reading {
//!         time: chrono::DateTime<chrono::FixedOffset> => "_time",
//!         value: f64 => "_value",
//!     }
//! }
//!
//! let mut result = client.query("my-org", query).await?;
//! while result.next_section().await {
//!     while result.next_row().await {
//!         let reading: Reading = result.decode()?;
//!     }
//! }
//! ```

pub mod annotated_csv;
pub mod client;
pub mod error;
pub mod options;
pub mod point;
pub mod value;
pub mod write;

pub use annotated_csv::{Column, Datum, DestKind, Destination, FieldBinding, FromRow, Reader, SliceElement};
pub use client::{Client, Health, Params, QueryResult, Ready};
pub use error::{ConversionError, Error, HttpError, Result};
pub use options::{Precision, WriteOptions};
pub use point::{FieldValue, Point};
pub use value::Value;
pub use write::{Batch, BatchWriter, WriteApi, WriteFailedCallback, WriteService};
