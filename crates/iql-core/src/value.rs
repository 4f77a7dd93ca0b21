//! The value and type algebra.
//!
//! Every cell, literal and expression result is a [`Value`]. Heterogeneous
//! textual inputs are unified into a small coercing algebra: the
//! [`Type`] ordering `Bool < Int < Float < Date < String` drives column
//! type inference, and [`super_type`] picks the common type for binary
//! operators.

use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::error::{Error, Result};
use crate::source::Source;

/// A shared, immutable row producer bound to a `Table` value.
pub type TableRef = Rc<dyn Source>;

/// Declared value types, ordered for column type inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Type {
    Bool,
    Int,
    Float,
    Date,
    String,
    Array,
    Table,
}

impl Type {
    /// Returns the SQL spelling of the type.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Bool => "BOOLEAN",
            Self::Int => "INTEGER",
            Self::Float => "REAL",
            Self::Date => "DATETIME",
            Self::String => "VARCHAR",
            Self::Array => "VARCHAR[]",
            Self::Table => "TABLE",
        }
    }

    /// Whether a value of type `other` may be assigned to a binding
    /// declared with this type. `Null` is assignable to any declared type
    /// and is handled by the caller.
    #[must_use]
    pub fn assignable_from(&self, other: Self) -> bool {
        match self {
            Self::Float => matches!(other, Self::Int | Self::Float),
            _ => *self == other,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tagged runtime value.
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Date(DateTime<Utc>),
    String(String),
    Array(Vec<Value>),
    Table(TableRef),
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("Null"),
            Self::Bool(v) => write!(f, "Bool({v})"),
            Self::Int(v) => write!(f, "Int({v})"),
            Self::Float(v) => write!(f, "Float({v})"),
            Self::Date(v) => write!(f, "Date({v})"),
            Self::String(v) => write!(f, "String({v:?})"),
            Self::Array(v) => write!(f, "Array({v:?})"),
            Self::Table(_) => f.write_str("Table(..)"),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Date(a), Self::Date(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            (Self::Table(a), Self::Table(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Value {
    /// True for the `Null` variant.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The declared type of a non-null value.
    #[must_use]
    pub const fn ty(&self) -> Option<Type> {
        match self {
            Self::Null => None,
            Self::Bool(_) => Some(Type::Bool),
            Self::Int(_) => Some(Type::Int),
            Self::Float(_) => Some(Type::Float),
            Self::Date(_) => Some(Type::Date),
            Self::String(_) => Some(Type::String),
            Self::Array(_) => Some(Type::Array),
            Self::Table(_) => Some(Type::Table),
        }
    }

    /// Boolean accessor. Strings parse on demand.
    pub fn bool(&self) -> Result<Option<bool>> {
        match self {
            Self::Null => Ok(None),
            Self::Bool(v) => Ok(Some(*v)),
            Self::Int(v) => Ok(Some(*v != 0)),
            Self::String(s) => match s.to_ascii_lowercase().as_str() {
                "true" => Ok(Some(true)),
                "false" => Ok(Some(false)),
                _ => Err(Error::InvalidArgument(format!("'{s}' used as bool"))),
            },
            other => Err(Error::UnsupportedCast {
                from: other.ty().unwrap_or(Type::String),
                to: Type::Bool,
            }),
        }
    }

    /// Integer accessor. Strings parse on demand; floats truncate.
    pub fn int(&self) -> Result<Option<i64>> {
        match self {
            Self::Null => Ok(None),
            Self::Bool(v) => Ok(Some(i64::from(*v))),
            Self::Int(v) => Ok(Some(*v)),
            Self::Float(v) => Ok(Some(*v as i64)),
            Self::Date(d) => Ok(Some(d.timestamp())),
            Self::String(s) => s
                .parse::<i64>()
                .map(Some)
                .map_err(|_| Error::InvalidArgument(format!("'{s}' used as int"))),
            other => Err(Error::UnsupportedCast {
                from: other.ty().unwrap_or(Type::String),
                to: Type::Int,
            }),
        }
    }

    /// Float accessor. Int widens losslessly; strings parse on demand.
    pub fn float(&self) -> Result<Option<f64>> {
        match self {
            Self::Null => Ok(None),
            Self::Bool(v) => Ok(Some(f64::from(u8::from(*v)))),
            Self::Int(v) => Ok(Some(*v as f64)),
            Self::Float(v) => Ok(Some(*v)),
            Self::String(s) => s
                .parse::<f64>()
                .map(Some)
                .map_err(|_| Error::InvalidArgument(format!("'{s}' used as float"))),
            other => Err(Error::UnsupportedCast {
                from: other.ty().unwrap_or(Type::String),
                to: Type::Float,
            }),
        }
    }

    /// Date accessor. Strings parse the accepted formats; integers are
    /// Unix-epoch seconds.
    pub fn date(&self) -> Result<Option<DateTime<Utc>>> {
        match self {
            Self::Null => Ok(None),
            Self::Date(d) => Ok(Some(*d)),
            Self::Int(n) => Utc
                .timestamp_opt(*n, 0)
                .single()
                .map(Some)
                .ok_or_else(|| Error::InvalidArgument(format!("{n} out of range for a date"))),
            Self::String(s) => parse_date(s)
                .map(Some)
                .ok_or_else(|| Error::InvalidArgument(format!("'{s}' used as date"))),
            other => Err(Error::UnsupportedCast {
                from: other.ty().unwrap_or(Type::String),
                to: Type::Date,
            }),
        }
    }

    /// Performs the declared `CAST` conversion. `Null` casts to `Null`.
    pub fn cast(&self, to: Type) -> Result<Value> {
        if self.is_null() {
            return Ok(Value::Null);
        }
        match to {
            Type::Bool => Ok(self.bool()?.map_or(Value::Null, Value::Bool)),
            Type::Int => Ok(self.int()?.map_or(Value::Null, Value::Int)),
            Type::Float => Ok(self.float()?.map_or(Value::Null, Value::Float)),
            Type::Date => Ok(self.date()?.map_or(Value::Null, Value::Date)),
            Type::String => Ok(Value::String(self.to_string())),
            Type::Array | Type::Table => {
                if self.ty() == Some(to) {
                    Ok(self.clone())
                } else {
                    Err(Error::UnsupportedCast {
                        from: self.ty().unwrap_or(Type::String),
                        to,
                    })
                }
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Date(v) => write!(f, "{}", v.format("%Y-%m-%d %H:%M:%S%.f %:z")),
            Self::String(v) => f.write_str(v),
            Self::Array(vs) => {
                f.write_str("[")?;
                for (i, v) in vs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{v}")?;
                }
                f.write_str("]")
            }
            Self::Table(_) => f.write_str("<table>"),
        }
    }
}

/// Picks the common type two non-null operands are compared or combined in.
/// Int combined with Float promotes to Float; String only combines with
/// String; everything else requires identical types.
pub fn super_type(a: Type, b: Type) -> Result<Type> {
    if a == b {
        return Ok(a);
    }
    match (a, b) {
        (Type::Int, Type::Float) | (Type::Float, Type::Int) => Ok(Type::Float),
        _ => Err(Error::TypeMismatch(format!(
            "incompatible types {a} and {b}"
        ))),
    }
}

/// Equality used by `=`, `IN` and grouping keys: both-null is true,
/// exactly-one-null is false.
pub fn values_equal(a: &Value, b: &Value) -> Result<bool> {
    match (a.is_null(), b.is_null()) {
        (true, true) => return Ok(true),
        (true, false) | (false, true) => return Ok(false),
        (false, false) => {}
    }
    Ok(compare_values(a, b)? == Ordering::Equal)
}

/// Ordering comparison of two non-null values in their super type.
pub fn compare_values(a: &Value, b: &Value) -> Result<Ordering> {
    let ty = super_type(
        a.ty().unwrap_or(Type::String),
        b.ty().unwrap_or(Type::String),
    )?;
    match ty {
        Type::Bool => Ok(a.bool()?.cmp(&b.bool()?)),
        Type::Int => Ok(a.int()?.cmp(&b.int()?)),
        Type::Float => {
            let (x, y) = (a.float()?, b.float()?);
            Ok(x.partial_cmp(&y).unwrap_or(Ordering::Equal))
        }
        Type::Date => Ok(a.date()?.cmp(&b.date()?)),
        Type::String => match (a, b) {
            (Value::String(x), Value::String(y)) => Ok(x.cmp(y)),
            _ => unreachable!("super_type only yields String for two strings"),
        },
        Type::Array | Type::Table => Err(Error::TypeMismatch(format!("{ty} is not comparable"))),
    }
}

/// Total order used by ORDER BY: Null sorts first, Int and Float compare
/// numerically, Strings lexicographically; incompatible types order by
/// their type rank.
#[must_use]
pub fn sort_compare(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) | Value::Float(_) => 2,
            Value::Date(_) => 3,
            Value::String(_) => 4,
            Value::Array(_) => 5,
            Value::Table(_) => 6,
        }
    }

    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Int(x), Value::Int(y)) => x.cmp(y),
        (Value::Date(x), Value::Date(y)) => x.cmp(y),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            let x = a.float().unwrap_or(Some(0.0)).unwrap_or(0.0);
            let y = b.float().unwrap_or(Some(0.0)).unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Parses the accepted date spellings: RFC 3339,
/// `YYYY-MM-DD HH:MM:SS[.fff]` with an optional `±HH:MM` zone, a plain
/// date, and `MM/DD/YYYY`.
#[must_use]
pub fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f %:z") {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(Utc.from_utc_datetime(&dt));
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(Utc.from_utc_datetime(&d.and_hms_opt(0, 0, 0)?));
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%m/%d/%Y") {
        return Some(Utc.from_utc_datetime(&d.and_hms_opt(0, 0, 0)?));
    }
    None
}

/// Validates a `REALFMT` format string:
/// `%[flags][width][.precision]{e,E,f,F,g,G}`.
#[must_use]
pub fn verify_real_format(spec: &str) -> bool {
    parse_real_format(spec).is_some()
}

struct RealFormat {
    left_align: bool,
    zero_pad: bool,
    width: usize,
    precision: Option<usize>,
    verb: char,
}

fn parse_real_format(spec: &str) -> Option<RealFormat> {
    let rest = spec.strip_prefix('%')?;
    let mut chars = rest.chars().peekable();

    let mut left_align = false;
    let mut zero_pad = false;
    while let Some(&c) = chars.peek() {
        match c {
            '-' => left_align = true,
            '0' => zero_pad = true,
            '+' | ' ' => {}
            _ => break,
        }
        chars.next();
    }

    let mut width = 0usize;
    while let Some(&c) = chars.peek() {
        if let Some(d) = c.to_digit(10) {
            width = width * 10 + d as usize;
            chars.next();
        } else {
            break;
        }
    }

    let mut precision = None;
    if chars.peek() == Some(&'.') {
        chars.next();
        let mut p = 0usize;
        let mut seen = false;
        while let Some(&c) = chars.peek() {
            if let Some(d) = c.to_digit(10) {
                p = p * 10 + d as usize;
                seen = true;
                chars.next();
            } else {
                break;
            }
        }
        if !seen {
            return None;
        }
        precision = Some(p);
    }

    let verb = chars.next()?;
    if chars.next().is_some() || !matches!(verb, 'e' | 'E' | 'f' | 'F' | 'g' | 'G') {
        return None;
    }
    Some(RealFormat {
        left_align,
        zero_pad,
        width,
        precision,
        verb,
    })
}

/// Applies a printf-style float format. `%g` (the default) renders the
/// shortest round-trip representation. Invalid specs fall back to `%g`;
/// the `REALFMT` verify callback rejects them before they get here.
#[must_use]
pub fn format_real(spec: &str, value: f64) -> String {
    let Some(fmt) = parse_real_format(spec) else {
        return format!("{value}");
    };

    let mut body = match fmt.verb {
        'f' | 'F' => format!("{value:.prec$}", prec = fmt.precision.unwrap_or(6)),
        'e' | 'E' => format!("{value:.prec$e}", prec = fmt.precision.unwrap_or(6)),
        _ => match fmt.precision {
            Some(prec) => trim_trailing_zeros(&format!("{value:.prec$}")),
            None => format!("{value}"),
        },
    };
    if fmt.verb.is_ascii_uppercase() {
        body = body.to_ascii_uppercase();
    }

    if body.len() >= fmt.width {
        return body;
    }
    let pad = fmt.width - body.len();
    if fmt.left_align {
        format!("{body}{}", " ".repeat(pad))
    } else if fmt.zero_pad {
        let (sign, digits) = match body.strip_prefix('-') {
            Some(rest) => ("-", rest),
            None => ("", body.as_str()),
        };
        format!("{sign}{}{digits}", "0".repeat(pad))
    } else {
        format!("{}{body}", " ".repeat(pad))
    }
}

fn trim_trailing_zeros(s: &str) -> String {
    if !s.contains('.') {
        return s.to_string();
    }
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_ordering() {
        assert!(Type::Bool < Type::Int);
        assert!(Type::Int < Type::Float);
        assert!(Type::Float < Type::Date);
        assert!(Type::Date < Type::String);
        assert!(Type::String < Type::Table);
    }

    #[test]
    fn test_assignability() {
        assert!(Type::Float.assignable_from(Type::Int));
        assert!(Type::Float.assignable_from(Type::Float));
        assert!(!Type::Int.assignable_from(Type::Float));
        assert!(Type::String.assignable_from(Type::String));
        assert!(!Type::String.assignable_from(Type::Int));
    }

    #[test]
    fn test_null_equality() {
        assert!(values_equal(&Value::Null, &Value::Null).unwrap());
        assert!(!values_equal(&Value::Null, &Value::Int(1)).unwrap());
        assert!(!values_equal(&Value::Int(1), &Value::Null).unwrap());
    }

    #[test]
    fn test_numeric_promotion() {
        assert!(values_equal(&Value::Int(2), &Value::Float(2.0)).unwrap());
        assert_eq!(
            compare_values(&Value::Int(3), &Value::Float(2.5)).unwrap(),
            Ordering::Greater
        );
    }

    #[test]
    fn test_string_int_comparison_fails() {
        assert!(compare_values(&Value::String("1".into()), &Value::Int(1)).is_err());
    }

    #[test]
    fn test_value_round_trip() {
        for v in [
            Value::Bool(true),
            Value::Int(-42),
            Value::Float(2.5),
            Value::String("hello".into()),
        ] {
            let text = v.to_string();
            let back = Value::String(text).cast(v.ty().unwrap()).unwrap();
            assert_eq!(back, v);
        }
    }

    #[test]
    fn test_date_round_trip() {
        let d = Value::Date(Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap());
        let back = Value::String(d.to_string()).cast(Type::Date).unwrap();
        assert_eq!(back, d);
    }

    #[test]
    fn test_parse_date_formats() {
        assert!(parse_date("2024-03-01T12:30:00Z").is_some());
        assert!(parse_date("2024-03-01 12:30:00").is_some());
        assert!(parse_date("2024-03-01 12:30:00.250").is_some());
        assert!(parse_date("2024-03-01 12:30:00 +02:00").is_some());
        assert!(parse_date("2024-03-01").is_some());
        assert!(parse_date("03/01/2024").is_some());
        assert!(parse_date("not a date").is_none());
    }

    #[test]
    fn test_parse_date_zone_offset() {
        let with_zone = parse_date("2024-03-01 12:00:00 +02:00").unwrap();
        let utc = parse_date("2024-03-01 10:00:00").unwrap();
        assert_eq!(with_zone, utc);
    }

    #[test]
    fn test_cast_unsupported() {
        let err = Value::Bool(true).cast(Type::Date).unwrap_err();
        assert!(matches!(err, Error::UnsupportedCast { .. }));
    }

    #[test]
    fn test_cast_null_passes_through() {
        assert_eq!(Value::Null.cast(Type::Int).unwrap(), Value::Null);
    }

    #[test]
    fn test_sort_compare_null_first() {
        assert_eq!(sort_compare(&Value::Null, &Value::Int(1)), Ordering::Less);
        assert_eq!(
            sort_compare(&Value::Int(1), &Value::Null),
            Ordering::Greater
        );
        assert_eq!(
            sort_compare(&Value::Int(1), &Value::Float(1.5)),
            Ordering::Less
        );
        assert_eq!(
            sort_compare(&Value::String("a".into()), &Value::String("b".into())),
            Ordering::Less
        );
    }

    #[test]
    fn test_format_real_default() {
        assert_eq!(format_real("%g", 9.95), "9.95");
        assert_eq!(format_real("%g", 0.0), "0");
        assert_eq!(format_real("%g", -1.5), "-1.5");
    }

    #[test]
    fn test_format_real_fixed() {
        assert_eq!(format_real("%.2f", 9.954), "9.95");
        assert_eq!(format_real("%.0f", 2.5), "2");
        assert_eq!(format_real("%8.2f", 1.5), "    1.50");
        assert_eq!(format_real("%-8.2f", 1.5), "1.50    ");
        assert_eq!(format_real("%08.2f", -1.5), "-0001.50");
    }

    #[test]
    fn test_verify_real_format() {
        assert!(verify_real_format("%g"));
        assert!(verify_real_format("%.3f"));
        assert!(verify_real_format("%12.4E"));
        assert!(!verify_real_format("g"));
        assert!(!verify_real_format("%q"));
        assert!(!verify_real_format("%.f"));
        assert!(!verify_real_format("%gg"));
    }
}
