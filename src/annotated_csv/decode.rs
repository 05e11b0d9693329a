//! Typed conversion of annotated CSV rows.
//!
//! Each section carries column types from its `#datatype` annotation. A
//! static conversion matrix keyed by `(column type, destination kind)`
//! supplies one converter per decoded column; the matrix is resolved once
//! per section and target type, then reused for every row.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, FixedOffset};
use go_parse_duration::parse_duration;
use ordered_float::OrderedFloat;

use super::reader::Column;
use crate::error::{ConversionError, Error, Result};
use crate::value::Value;

/// Column types carried by the `#datatype` annotation. Unknown names map to
/// `String`; a bare `dateTime` means RFC3339 with nanoseconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ColumnType {
    String,
    Bool,
    Duration,
    Long,
    UnsignedLong,
    Double,
    Base64Binary,
    TimeRfc,
    TimeRfcNano,
}

impl ColumnType {
    pub(crate) fn from_name(name: &str) -> Self {
        match name {
            "boolean" => ColumnType::Bool,
            "duration" => ColumnType::Duration,
            "long" => ColumnType::Long,
            "unsignedLong" => ColumnType::UnsignedLong,
            "double" => ColumnType::Double,
            "base64Binary" => ColumnType::Base64Binary,
            "dateTime:RFC3339" => ColumnType::TimeRfc,
            "dateTime:RFC3339Nano" | "dateTime" => ColumnType::TimeRfcNano,
            _ => ColumnType::String,
        }
    }
}

/// Destination kind of a decoded field, the second key of the conversion
/// matrix.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DestKind {
    /// `String`
    String,
    /// `bool`
    Bool,
    /// `i8`
    I8,
    /// `i16`
    I16,
    /// `i32`
    I32,
    /// `i64`
    I64,
    /// `isize`
    Isize,
    /// `u8`
    U8,
    /// `u16`
    U16,
    /// `u32`
    U32,
    /// `u64`
    U64,
    /// `usize`
    Usize,
    /// `f32`
    F32,
    /// `f64`
    F64,
    /// `chrono::Duration`
    Duration,
    /// `chrono::DateTime<FixedOffset>`
    Time,
    /// `Vec<u8>`
    Bytes,
    /// [`Value`]
    Any,
}

impl DestKind {
    fn name(&self) -> &'static str {
        match self {
            DestKind::String => "string",
            DestKind::Bool => "bool",
            DestKind::I8 => "i8",
            DestKind::I16 => "i16",
            DestKind::I32 => "i32",
            DestKind::I64 => "i64",
            DestKind::Isize => "isize",
            DestKind::U8 => "u8",
            DestKind::U16 => "u16",
            DestKind::U32 => "u32",
            DestKind::U64 => "u64",
            DestKind::Usize => "usize",
            DestKind::F32 => "f32",
            DestKind::F64 => "f64",
            DestKind::Duration => "duration",
            DestKind::Time => "time",
            DestKind::Bytes => "bytes",
            DestKind::Any => "any",
        }
    }
}

impl std::fmt::Display for DestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A converted cell, width-typed for its destination.
#[derive(Clone, Debug)]
pub enum Datum {
    /// Verbatim cell text.
    String(String),
    /// Boolean.
    Bool(bool),
    /// 8-bit signed.
    I8(i8),
    /// 16-bit signed.
    I16(i16),
    /// 32-bit signed.
    I32(i32),
    /// 64-bit signed.
    I64(i64),
    /// Native-width signed.
    Isize(isize),
    /// 8-bit unsigned.
    U8(u8),
    /// 16-bit unsigned.
    U16(u16),
    /// 32-bit unsigned.
    U32(u32),
    /// 64-bit unsigned.
    U64(u64),
    /// Native-width unsigned.
    Usize(usize),
    /// 32-bit float.
    F32(f32),
    /// 64-bit float.
    F64(f64),
    /// Duration.
    Duration(chrono::Duration),
    /// Timestamp.
    Time(DateTime<FixedOffset>),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// Dynamic value, canonical for the column type.
    Any(Value),
}

pub(crate) type Converter = fn(&str) -> std::result::Result<Datum, ConversionError>;

macro_rules! int_converter {
    ($name:ident, $ty:ty, $variant:ident) => {
        fn $name(s: &str) -> std::result::Result<Datum, ConversionError> {
            let wide: i64 = s.parse()?;
            let value = <$ty>::try_from(wide).map_err(|_| ConversionError::Overflow)?;
            Ok(Datum::$variant(value))
        }
    };
}

int_converter!(to_i8, i8, I8);
int_converter!(to_i16, i16, I16);
int_converter!(to_i32, i32, I32);
int_converter!(to_i64, i64, I64);
int_converter!(to_isize, isize, Isize);

macro_rules! uint_converter {
    ($name:ident, $ty:ty, $variant:ident) => {
        fn $name(s: &str) -> std::result::Result<Datum, ConversionError> {
            let wide: u64 = s.parse()?;
            let value = <$ty>::try_from(wide).map_err(|_| ConversionError::Overflow)?;
            Ok(Datum::$variant(value))
        }
    };
}

uint_converter!(to_u8, u8, U8);
uint_converter!(to_u16, u16, U16);
uint_converter!(to_u32, u32, U32);
uint_converter!(to_u64, u64, U64);
uint_converter!(to_usize, usize, Usize);

fn parse_finite(s: &str) -> std::result::Result<f64, ConversionError> {
    let value: f64 = s.parse()?;
    // Rust's parse saturates to infinity where the wire value overflowed
    if !value.is_finite() {
        return Err(ConversionError::Overflow);
    }
    Ok(value)
}

fn to_f64(s: &str) -> std::result::Result<Datum, ConversionError> {
    Ok(Datum::F64(parse_finite(s)?))
}

fn to_f32(s: &str) -> std::result::Result<Datum, ConversionError> {
    let value = parse_finite(s)?;
    if value > f64::from(f32::MAX) || value < f64::from(f32::MIN) {
        return Err(ConversionError::Overflow);
    }
    Ok(Datum::F32(value as f32))
}

fn to_string_datum(s: &str) -> std::result::Result<Datum, ConversionError> {
    Ok(Datum::String(s.to_string()))
}

fn parse_bool(s: &str) -> std::result::Result<bool, ConversionError> {
    match s {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(ConversionError::Bool),
    }
}

fn to_bool(s: &str) -> std::result::Result<Datum, ConversionError> {
    Ok(Datum::Bool(parse_bool(s)?))
}

fn parse_go_duration(s: &str) -> std::result::Result<chrono::Duration, ConversionError> {
    let nanos = parse_duration(s).map_err(|_| ConversionError::Duration(s.to_string()))?;
    Ok(chrono::Duration::nanoseconds(nanos))
}

fn to_duration(s: &str) -> std::result::Result<Datum, ConversionError> {
    Ok(Datum::Duration(parse_go_duration(s)?))
}

fn to_time(s: &str) -> std::result::Result<Datum, ConversionError> {
    Ok(Datum::Time(DateTime::parse_from_rfc3339(s)?))
}

fn to_bytes(s: &str) -> std::result::Result<Datum, ConversionError> {
    Ok(Datum::Bytes(BASE64.decode(s)?))
}

fn any_string(s: &str) -> std::result::Result<Datum, ConversionError> {
    Ok(Datum::Any(Value::String(s.to_string())))
}

fn any_bool(s: &str) -> std::result::Result<Datum, ConversionError> {
    Ok(Datum::Any(Value::Bool(parse_bool(s)?)))
}

fn any_long(s: &str) -> std::result::Result<Datum, ConversionError> {
    Ok(Datum::Any(Value::Long(s.parse()?)))
}

fn any_unsigned_long(s: &str) -> std::result::Result<Datum, ConversionError> {
    Ok(Datum::Any(Value::UnsignedLong(s.parse()?)))
}

fn any_double(s: &str) -> std::result::Result<Datum, ConversionError> {
    Ok(Datum::Any(Value::Double(OrderedFloat(parse_finite(s)?))))
}

fn any_duration(s: &str) -> std::result::Result<Datum, ConversionError> {
    Ok(Datum::Any(Value::Duration(parse_go_duration(s)?)))
}

fn any_bytes(s: &str) -> std::result::Result<Datum, ConversionError> {
    Ok(Datum::Any(Value::Base64Binary(BASE64.decode(s)?)))
}

fn any_time(s: &str) -> std::result::Result<Datum, ConversionError> {
    Ok(Datum::Any(Value::TimeRFC(DateTime::parse_from_rfc3339(s)?)))
}

/// The conversion matrix. Every column type converts to `string` and to a
/// dynamic value; numeric, boolean, duration, time and binary columns add
/// their typed destinations.
pub(crate) fn converter_for(column: ColumnType, dest: DestKind) -> Option<Converter> {
    use ColumnType as C;
    use DestKind as D;
    match dest {
        D::String => Some(to_string_datum),
        D::Any => Some(match column {
            C::String => any_string,
            C::Bool => any_bool,
            C::Duration => any_duration,
            C::Long => any_long,
            C::UnsignedLong => any_unsigned_long,
            C::Double => any_double,
            C::Base64Binary => any_bytes,
            C::TimeRfc | C::TimeRfcNano => any_time,
        }),
        D::Bool if column == C::Bool => Some(to_bool),
        D::Duration if column == C::Duration => Some(to_duration),
        D::Time if matches!(column, C::TimeRfc | C::TimeRfcNano) => Some(to_time),
        D::Bytes if column == C::Base64Binary => Some(to_bytes),
        D::I8 | D::I16 | D::I32 | D::I64 | D::Isize
            if matches!(column, C::Long | C::UnsignedLong) =>
        {
            Some(match dest {
                D::I8 => to_i8,
                D::I16 => to_i16,
                D::I32 => to_i32,
                D::I64 => to_i64,
                _ => to_isize,
            })
        }
        D::U8 | D::U16 | D::U32 | D::U64 | D::Usize if column == C::UnsignedLong => {
            Some(match dest {
                D::U8 => to_u8,
                D::U16 => to_u16,
                D::U32 => to_u32,
                D::U64 => to_u64,
                _ => to_usize,
            })
        }
        D::F32 | D::F64 if matches!(column, C::Long | C::UnsignedLong | C::Double) => {
            Some(if dest == D::F32 { to_f32 } else { to_f64 })
        }
        _ => None,
    }
}

/// A Rust type annotated CSV cells decode into.
pub trait Destination: Sized + 'static {
    /// The matrix key for this type.
    const KIND: DestKind;

    /// Unwrap a converted datum; the decode plan guarantees the variant
    /// matches [`KIND`](Self::KIND).
    fn from_datum(datum: Datum) -> Self;

    /// The zero value a field keeps when no column matches it.
    fn zero() -> Self;
}

macro_rules! destination {
    ($ty:ty, $kind:ident, $variant:ident, $zero:expr) => {
        impl Destination for $ty {
            const KIND: DestKind = DestKind::$kind;

            fn from_datum(datum: Datum) -> Self {
                match datum {
                    Datum::$variant(v) => v,
                    _ => Self::zero(),
                }
            }

            fn zero() -> Self {
                $zero
            }
        }
    };
}

destination!(String, String, String, String::new());
destination!(bool, Bool, Bool, false);
destination!(i8, I8, I8, 0);
destination!(i16, I16, I16, 0);
destination!(i32, I32, I32, 0);
destination!(i64, I64, I64, 0);
destination!(isize, Isize, Isize, 0);
destination!(u8, U8, U8, 0);
destination!(u16, U16, U16, 0);
destination!(u32, U32, U32, 0);
destination!(u64, U64, U64, 0);
destination!(usize, Usize, Usize, 0);
destination!(f32, F32, F32, 0.0);
destination!(f64, F64, F64, 0.0);
destination!(chrono::Duration, Duration, Duration, chrono::Duration::zero());
destination!(Vec<u8>, Bytes, Bytes, Vec::new());
destination!(Value, Any, Any, Value::Null);

impl Destination for DateTime<FixedOffset> {
    const KIND: DestKind = DestKind::Time;

    fn from_datum(datum: Datum) -> Self {
        match datum {
            Datum::Time(v) => v,
            _ => Self::zero(),
        }
    }

    fn zero() -> Self {
        DateTime::UNIX_EPOCH.fixed_offset()
    }
}

/// Marker for element types of positional sequence decoding: `String`
/// (never fails) and [`Value`].
pub trait SliceElement: Destination {}

impl SliceElement for String {}
impl SliceElement for Value {}

/// A record type rows decode into.
///
/// Implementations list one [`FieldBinding`] per decoded field. The
/// [`flux_record!`](crate::flux_record) macro generates both the struct and
/// this impl; implement it by hand for records with unbound fields.
pub trait FromRow: Default + 'static {
    /// Column bindings of this record type. When several bindings name the
    /// same column, the first wins.
    fn bindings() -> Vec<FieldBinding<Self>>;
}

/// Binds one record field to a named column.
pub struct FieldBinding<T> {
    column: String,
    kind: DestKind,
    set: Box<dyn Fn(&mut T, Datum) + Send + Sync>,
}

impl<T: 'static> FieldBinding<T> {
    /// Bind the column `column` to the field written by `set`. The
    /// destination kind comes from the field type `D`.
    pub fn new<D: Destination>(column: impl Into<String>, set: fn(&mut T, D)) -> Self {
        Self {
            column: column.into(),
            kind: D::KIND,
            set: Box::new(move |record, datum| set(record, D::from_datum(datum))),
        }
    }

    fn apply(&self, record: &mut T, datum: Datum) {
        (self.set)(record, datum)
    }
}

/// Declares a record struct together with its [`FromRow`] impl.
///
/// Each field names the CSV column it decodes from; the generated `Default`
/// leaves every field at its destination zero value.
///
/// ```ignore
/// flux_record! {
///     #[derive(Debug, PartialEq)]
///     pub struct Reading {
///         time: chrono::DateTime<chrono::FixedOffset> => "_time",
///         value: f64 => "_value",
///         location: String => "location",
///     }
/// }
/// ```
#[macro_export]
macro_rules! flux_record {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $( $field:ident : $ftype:ty => $column:expr ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            $( pub $field : $ftype, )+
        }

        impl ::std::default::Default for $name {
            fn default() -> Self {
                Self {
                    $( $field : <$ftype as $crate::Destination>::zero(), )+
                }
            }
        }

        impl $crate::FromRow for $name {
            fn bindings() -> ::std::vec::Vec<$crate::FieldBinding<Self>> {
                ::std::vec![
                    $(
                        $crate::FieldBinding::new::<$ftype>(
                            $column,
                            |record: &mut Self, value: $ftype| record.$field = value,
                        )
                    ),+
                ]
            }
        }
    };
}

/// Per-section decode plan for a record type: one converter per bound
/// column, resolved once.
pub(crate) struct RecordPlan<T> {
    bindings: Vec<FieldBinding<T>>,
    cols: Vec<Option<(usize, Converter)>>,
}

pub(crate) fn build_record_plan<T: FromRow>(columns: &[Column]) -> Result<RecordPlan<T>> {
    let bindings = T::bindings();
    let mut by_name: HashMap<&str, usize> = HashMap::new();
    for (i, binding) in bindings.iter().enumerate() {
        by_name.entry(binding.column.as_str()).or_insert(i);
    }

    let mut cols = Vec::with_capacity(columns.len());
    for column in columns {
        match by_name.get(column.name.as_str()) {
            Some(&idx) => {
                let ctype = ColumnType::from_name(&column.data_type);
                let kind = bindings[idx].kind;
                let converter = converter_for(ctype, kind).ok_or_else(|| {
                    Error::DecodeSetup(format!(
                        "cannot convert from column type {} to {}",
                        column.data_type, kind
                    ))
                })?;
                cols.push(Some((idx, converter)));
            }
            None => cols.push(None),
        }
    }
    Ok(RecordPlan { bindings, cols })
}

impl<T: FromRow> RecordPlan<T> {
    pub(crate) fn decode(&self, columns: &[Column], row: &[String], line: u64) -> Result<T> {
        let mut record = T::default();
        for (i, slot) in self.cols.iter().enumerate() {
            let Some((idx, convert)) = slot else { continue };
            let cell = if row[i].is_empty() {
                columns[i].default.as_str()
            } else {
                row[i].as_str()
            };
            let datum = convert(cell).map_err(|source| Error::DecodeValue {
                value: cell.to_string(),
                column_type: columns[i].data_type.clone(),
                line,
                source,
            })?;
            self.bindings[*idx].apply(&mut record, datum);
        }
        Ok(record)
    }
}

/// Per-section decode plan for positional sequences.
pub(crate) struct SlicePlan {
    cols: Vec<Converter>,
}

pub(crate) fn build_slice_plan<E: SliceElement>(columns: &[Column]) -> Result<SlicePlan> {
    let mut cols = Vec::with_capacity(columns.len());
    for column in columns {
        let ctype = ColumnType::from_name(&column.data_type);
        let converter = converter_for(ctype, E::KIND).ok_or_else(|| {
            Error::DecodeSetup(format!(
                "cannot convert from column type {} to {}",
                column.data_type,
                E::KIND
            ))
        })?;
        cols.push(converter);
    }
    Ok(SlicePlan { cols })
}

impl SlicePlan {
    pub(crate) fn decode<E: SliceElement>(
        &self,
        columns: &[Column],
        row: &[String],
        line: u64,
        out: &mut Vec<E>,
    ) -> Result<()> {
        out.clear();
        out.reserve(self.cols.len());
        for (i, convert) in self.cols.iter().enumerate() {
            let cell = if row[i].is_empty() {
                columns[i].default.as_str()
            } else {
                row[i].as_str()
            };
            let datum = convert(cell).map_err(|source| Error::DecodeValue {
                value: cell.to_string(),
                column_type: columns[i].data_type.clone(),
                line,
                source,
            })?;
            out.push(E::from_datum(datum));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_type_names() {
        assert_eq!(ColumnType::from_name("string"), ColumnType::String);
        assert_eq!(ColumnType::from_name("boolean"), ColumnType::Bool);
        assert_eq!(ColumnType::from_name("long"), ColumnType::Long);
        assert_eq!(ColumnType::from_name("unsignedLong"), ColumnType::UnsignedLong);
        assert_eq!(ColumnType::from_name("double"), ColumnType::Double);
        assert_eq!(ColumnType::from_name("base64Binary"), ColumnType::Base64Binary);
        assert_eq!(ColumnType::from_name("dateTime:RFC3339"), ColumnType::TimeRfc);
        assert_eq!(ColumnType::from_name("dateTime:RFC3339Nano"), ColumnType::TimeRfcNano);
        // bare dateTime means nanosecond RFC3339
        assert_eq!(ColumnType::from_name("dateTime"), ColumnType::TimeRfcNano);
        // unknown types behave as strings
        assert_eq!(ColumnType::from_name("stringer"), ColumnType::String);
        assert_eq!(ColumnType::from_name(""), ColumnType::String);
    }

    #[test]
    fn test_matrix_string_and_any_are_total() {
        let all = [
            ColumnType::String,
            ColumnType::Bool,
            ColumnType::Duration,
            ColumnType::Long,
            ColumnType::UnsignedLong,
            ColumnType::Double,
            ColumnType::Base64Binary,
            ColumnType::TimeRfc,
            ColumnType::TimeRfcNano,
        ];
        for column in all {
            assert!(converter_for(column, DestKind::String).is_some());
            assert!(converter_for(column, DestKind::Any).is_some());
        }
    }

    #[test]
    fn test_matrix_typed_destinations() {
        use ColumnType as C;
        use DestKind as D;

        // string columns only reach string and any
        for dest in [D::Bool, D::I64, D::U64, D::F64, D::Duration, D::Time, D::Bytes] {
            assert!(converter_for(C::String, dest).is_none());
        }

        assert!(converter_for(C::Bool, D::Bool).is_some());
        assert!(converter_for(C::Bool, D::I64).is_none());

        assert!(converter_for(C::Duration, D::Duration).is_some());
        assert!(converter_for(C::Duration, D::I64).is_none());

        for dest in [D::I8, D::I16, D::I32, D::I64, D::Isize, D::F32, D::F64] {
            assert!(converter_for(C::Long, dest).is_some());
            assert!(converter_for(C::UnsignedLong, dest).is_some());
        }
        for dest in [D::U8, D::U16, D::U32, D::U64, D::Usize] {
            assert!(converter_for(C::Long, dest).is_none());
            assert!(converter_for(C::UnsignedLong, dest).is_some());
        }

        assert!(converter_for(C::Double, D::F32).is_some());
        assert!(converter_for(C::Double, D::F64).is_some());
        assert!(converter_for(C::Double, D::I64).is_none());

        assert!(converter_for(C::Base64Binary, D::Bytes).is_some());
        assert!(converter_for(C::Base64Binary, D::I64).is_none());

        assert!(converter_for(C::TimeRfc, D::Time).is_some());
        assert!(converter_for(C::TimeRfcNano, D::Time).is_some());
        assert!(converter_for(C::TimeRfc, D::Duration).is_none());
    }

    #[test]
    fn test_int_conversions_range_checked() {
        assert!(matches!(to_i8("100").unwrap(), Datum::I8(100)));
        assert!(matches!(
            to_i8("1600").unwrap_err(),
            ConversionError::Overflow
        ));
        assert!(matches!(to_i8("#").unwrap_err(), ConversionError::Int(_)));

        assert!(matches!(to_u8("200").unwrap(), Datum::U8(200)));
        assert!(matches!(
            to_u8("1600").unwrap_err(),
            ConversionError::Overflow
        ));
        assert!(to_u64("-1").is_err());
        assert!(matches!(to_i64("-1").unwrap(), Datum::I64(-1)));
    }

    #[test]
    fn test_float_conversions_reject_overflow() {
        assert!(matches!(to_f64("3.3").unwrap(), Datum::F64(_)));
        assert!(matches!(
            to_f32("1e64").unwrap_err(),
            ConversionError::Overflow
        ));
        assert!(matches!(
            to_f64("1e999").unwrap_err(),
            ConversionError::Overflow
        ));
        assert!(to_f64("#").is_err());
    }

    #[test]
    fn test_bool_conversion_is_strict() {
        assert!(matches!(to_bool("true").unwrap(), Datum::Bool(true)));
        assert!(matches!(to_bool("false").unwrap(), Datum::Bool(false)));
        assert!(to_bool("True").is_err());
        assert!(to_bool("1").is_err());
        assert!(to_bool("#").is_err());
    }

    #[test]
    fn test_duration_conversion() {
        match to_duration("1h23m4s").unwrap() {
            Datum::Duration(d) => {
                assert_eq!(d, chrono::Duration::hours(1) + chrono::Duration::minutes(23) + chrono::Duration::seconds(4));
            }
            other => panic!("unexpected datum: {:?}", other),
        }
        match to_duration("1.5s").unwrap() {
            Datum::Duration(d) => assert_eq!(d, chrono::Duration::milliseconds(1500)),
            other => panic!("unexpected datum: {:?}", other),
        }
        assert!(to_duration("#").is_err());
    }

    #[test]
    fn test_time_conversion_tolerates_nano_fractions() {
        assert!(to_time("2020-02-18T10:34:08Z").is_ok());
        assert!(to_time("2020-02-18T10:34:08.135814545Z").is_ok());
        assert!(to_time("#").is_err());
    }

    #[test]
    fn test_bytes_conversion() {
        match to_bytes("ZGF0YWluYmFzZTY0").unwrap() {
            Datum::Bytes(b) => assert_eq!(b, b"datainbase64"),
            other => panic!("unexpected datum: {:?}", other),
        }
        assert!(to_bytes("#").is_err());
    }

    #[test]
    fn test_any_conversions_are_canonical() {
        assert!(matches!(any_string("x").unwrap(), Datum::Any(Value::String(_))));
        assert!(matches!(any_long("-1").unwrap(), Datum::Any(Value::Long(-1))));
        assert!(matches!(
            any_unsigned_long("0").unwrap(),
            Datum::Any(Value::UnsignedLong(0))
        ));
        assert!(matches!(any_double("3.3").unwrap(), Datum::Any(Value::Double(_))));
        assert!(matches!(any_bool("true").unwrap(), Datum::Any(Value::Bool(true))));
        assert!(matches!(
            any_duration("32m").unwrap(),
            Datum::Any(Value::Duration(_))
        ));
        assert!(matches!(any_bytes("eA==").unwrap(), Datum::Any(Value::Base64Binary(_))));
        assert!(matches!(
            any_time("2020-02-18T10:34:08.135814545Z").unwrap(),
            Datum::Any(Value::TimeRFC(_))
        ));
    }

    #[test]
    fn test_destination_zero_values() {
        assert_eq!(String::zero(), "");
        assert!(!bool::zero());
        assert_eq!(i64::zero(), 0);
        assert_eq!(f64::zero(), 0.0);
        assert_eq!(chrono::Duration::zero(), chrono::Duration::nanoseconds(0));
        assert_eq!(Vec::<u8>::zero(), Vec::<u8>::new());
        assert!(Value::zero().is_null());
        assert_eq!(
            DateTime::<FixedOffset>::zero(),
            DateTime::parse_from_rfc3339("1970-01-01T00:00:00Z").unwrap()
        );
    }
}
