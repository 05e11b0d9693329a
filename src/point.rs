//! Data points and line protocol rendering.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::options::Precision;

/// A field value on a [`Point`].
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    /// 64-bit float, rendered bare (`2.5`).
    Float(f64),
    /// Signed integer, rendered with the `i` suffix (`42i`).
    Long(i64),
    /// Unsigned integer, rendered with the `u` suffix (`42u`).
    UnsignedLong(u64),
    /// Boolean, rendered `true`/`false`.
    Bool(bool),
    /// String, rendered quoted with `"` and `\` escaped.
    String(String),
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Long(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Long(v as i64)
    }
}

impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        FieldValue::UnsignedLong(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::String(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::String(v)
    }
}

/// A single measurement point.
///
/// Tags and fields are kept in `BTreeMap`s, so both render in lexicographic
/// key order; the merged tag ordering required by the line protocol falls out
/// of the map itself.
///
/// ```ignore
/// let p = Point::new("cpu")
///     .tag("host", "server01")
///     .field("usage", 12.5)
///     .timestamp(Utc::now());
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Point {
    measurement: String,
    tags: BTreeMap<String, String>,
    fields: BTreeMap<String, FieldValue>,
    timestamp: Option<DateTime<Utc>>,
}

impl Point {
    /// Create a point for the given measurement.
    pub fn new(measurement: impl Into<String>) -> Self {
        Self {
            measurement: measurement.into(),
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
            timestamp: None,
        }
    }

    /// Add a tag. A later value for the same key wins.
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Add a field. A point must carry at least one field to encode.
    pub fn field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Set the point timestamp. Points without a timestamp are stamped by
    /// the server.
    pub fn timestamp(mut self, ts: DateTime<Utc>) -> Self {
        self.timestamp = Some(ts);
        self
    }

    /// The measurement name.
    pub fn measurement(&self) -> &str {
        &self.measurement
    }

    /// Tags set on this point.
    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    /// Fields set on this point.
    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    /// Render the point as a line protocol record without a trailing
    /// newline, using nanosecond precision and no default tags.
    pub fn to_line_protocol(&self) -> Result<String> {
        let mut out = String::new();
        self.write_line_protocol(&mut out, Precision::Nanoseconds, &BTreeMap::new())?;
        out.pop();
        Ok(out)
    }

    /// Append this point to `out` as a newline-terminated line protocol
    /// record. `default_tags` are merged in; tags on the point override
    /// defaults with the same key.
    pub(crate) fn write_line_protocol(
        &self,
        out: &mut String,
        precision: Precision,
        default_tags: &BTreeMap<String, String>,
    ) -> Result<()> {
        if self.measurement.is_empty() {
            return Err(Error::Encoding("empty measurement name".to_string()));
        }
        if self.fields.is_empty() {
            return Err(Error::Encoding(format!(
                "point {} has no fields",
                self.measurement
            )));
        }

        escape_into(out, &self.measurement, &[',', ' ']);

        if default_tags.is_empty() {
            for (k, v) in &self.tags {
                write_tag(out, k, v);
            }
        } else {
            let mut merged = default_tags.clone();
            merged.extend(self.tags.iter().map(|(k, v)| (k.clone(), v.clone())));
            for (k, v) in &merged {
                write_tag(out, k, v);
            }
        }

        out.push(' ');
        for (i, (k, v)) in self.fields.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            escape_into(out, k, &[',', '=', ' ']);
            out.push('=');
            write_field_value(out, k, v)?;
        }

        if let Some(ts) = self.timestamp {
            let nanos = ts.timestamp_nanos_opt().ok_or_else(|| {
                Error::Encoding(format!("timestamp out of range: {}", ts))
            })?;
            out.push(' ');
            out.push_str(&(nanos / precision.divisor()).to_string());
        }
        out.push('\n');
        Ok(())
    }
}

fn write_tag(out: &mut String, key: &str, value: &str) {
    out.push(',');
    escape_into(out, key, &[',', '=', ' ']);
    out.push('=');
    escape_into(out, value, &[',', '=', ' ']);
}

fn write_field_value(out: &mut String, key: &str, value: &FieldValue) -> Result<()> {
    match value {
        FieldValue::Float(v) => {
            if !v.is_finite() {
                return Err(Error::Encoding(format!(
                    "field {} has non-finite value {}",
                    key, v
                )));
            }
            out.push_str(&v.to_string());
        }
        FieldValue::Long(v) => {
            out.push_str(&v.to_string());
            out.push('i');
        }
        FieldValue::UnsignedLong(v) => {
            out.push_str(&v.to_string());
            out.push('u');
        }
        FieldValue::Bool(v) => out.push_str(if *v { "true" } else { "false" }),
        FieldValue::String(v) => {
            out.push('"');
            for c in v.chars() {
                if c == '"' || c == '\\' {
                    out.push('\\');
                }
                out.push(c);
            }
            out.push('"');
        }
    }
    Ok(())
}

fn escape_into(out: &mut String, s: &str, special: &[char]) {
    for c in s.chars() {
        if special.contains(&c) || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_basic_line() {
        let p = Point::new("test")
            .tag("vendor", "AWS")
            .field("mem_free", 1234567i64)
            .timestamp(Utc.timestamp_opt(60, 60).unwrap());
        assert_eq!(
            p.to_line_protocol().unwrap(),
            "test,vendor=AWS mem_free=1234567i 60000000060"
        );
    }

    #[test]
    fn test_default_tags_merge_and_sort() {
        let p = Point::new("test")
            .tag("vendor", "AWS")
            .field("mem_free", 1234567i64)
            .timestamp(Utc.timestamp_opt(60, 60).unwrap());
        let mut defaults = BTreeMap::new();
        defaults.insert("dft".to_string(), "a".to_string());

        let mut out = String::new();
        p.write_line_protocol(&mut out, Precision::Nanoseconds, &defaults)
            .unwrap();
        assert_eq!(out, "test,dft=a,vendor=AWS mem_free=1234567i 60000000060\n");
    }

    #[test]
    fn test_point_tag_overrides_default() {
        let p = Point::new("m").tag("host", "point").field("v", 1i64);
        let mut defaults = BTreeMap::new();
        defaults.insert("host".to_string(), "default".to_string());
        defaults.insert("zone".to_string(), "eu".to_string());

        let mut out = String::new();
        p.write_line_protocol(&mut out, Precision::Nanoseconds, &defaults)
            .unwrap();
        assert_eq!(out, "m,host=point,zone=eu v=1i\n");
    }

    #[test]
    fn test_field_value_rendering() {
        let p = Point::new("m")
            .field("b", true)
            .field("f", 2.5)
            .field("i", -7i64)
            .field("s", "say \"hi\"")
            .field("u", 9u64);
        assert_eq!(
            p.to_line_protocol().unwrap(),
            r#"m b=true,f=2.5,i=-7i,s="say \"hi\"",u=9u"#
        );
    }

    #[test]
    fn test_escaping() {
        let p = Point::new("my measurement")
            .tag("tag,key", "tag value")
            .field("field=key", 1i64);
        assert_eq!(
            p.to_line_protocol().unwrap(),
            r"my\ measurement,tag\,key=tag\ value field\=key=1i"
        );
    }

    #[test]
    fn test_precision_scaling() {
        let ts = Utc.timestamp_opt(60, 123_456_789).unwrap();
        let p = Point::new("m").field("v", 1i64).timestamp(ts);
        let render = |prec| {
            let mut out = String::new();
            p.write_line_protocol(&mut out, prec, &BTreeMap::new()).unwrap();
            out
        };
        assert_eq!(render(Precision::Nanoseconds), "m v=1i 60123456789\n");
        assert_eq!(render(Precision::Microseconds), "m v=1i 60123456\n");
        assert_eq!(render(Precision::Milliseconds), "m v=1i 60123\n");
        assert_eq!(render(Precision::Seconds), "m v=1i 60\n");
    }

    #[test]
    fn test_encoding_errors() {
        assert!(matches!(
            Point::new("").field("v", 1i64).to_line_protocol(),
            Err(Error::Encoding(_))
        ));
        assert!(matches!(
            Point::new("m").to_line_protocol(),
            Err(Error::Encoding(_))
        ));
        assert!(matches!(
            Point::new("m").field("v", f64::NAN).to_line_protocol(),
            Err(Error::Encoding(_))
        ));
        assert!(matches!(
            Point::new("m").field("v", f64::INFINITY).to_line_protocol(),
            Err(Error::Encoding(_))
        ));
    }
}
