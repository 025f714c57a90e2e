//! Operand values accepted by query conditions
//!
//! Most operators only accept one or two kinds of value, but `equals` and the
//! comparison operators take heterogeneous input, so operands travel as a
//! tagged union and are checked against each operator's allow-list.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write};

/// Kind of an operand, as reported in type mismatch errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    String,
    Number,
    Boolean,
    List,
    DateTime,
}

impl fmt::Display for OperandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::List => "list",
            Self::DateTime => "datetime",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Text(String),
    Integer(i64),
    /// Unsigned values that do not fit in an `i64`
    Unsigned(u64),
    Float(f64),
    Boolean(bool),
    List(Vec<Operand>),
    /// Always held in UTC
    DateTime(DateTime<Utc>),
}

impl Operand {
    pub fn kind(&self) -> OperandKind {
        match self {
            Self::Text(_) => OperandKind::String,
            Self::Integer(_) | Self::Unsigned(_) | Self::Float(_) => OperandKind::Number,
            Self::Boolean(_) => OperandKind::Boolean,
            Self::List(_) => OperandKind::List,
            Self::DateTime(_) => OperandKind::DateTime,
        }
    }

    /// Render the operand the way the store's filter grammar expects it
    pub fn render(&self, dates: &DateFormat) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Integer(n) => n.to_string(),
            Self::Unsigned(n) => n.to_string(),
            Self::Float(n) => n.to_string(),
            Self::Boolean(b) => b.to_string(),
            Self::List(items) => items
                .iter()
                .map(|item| item.render(dates))
                .collect::<Vec<_>>()
                .join(","),
            Self::DateTime(dt) => dates.format(dt),
        }
    }
}

impl From<&str> for Operand {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Operand {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&String> for Operand {
    fn from(value: &String) -> Self {
        Self::Text(value.clone())
    }
}

macro_rules! impl_from_integer {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Operand {
                fn from(value: $ty) -> Self {
                    Self::Integer(i64::from(value))
                }
            }
        )*
    };
}

impl_from_integer!(i8, i16, i32, i64, u8, u16, u32);

impl From<u64> for Operand {
    fn from(value: u64) -> Self {
        match i64::try_from(value) {
            Ok(n) => Self::Integer(n),
            Err(_) => Self::Unsigned(value),
        }
    }
}

impl From<usize> for Operand {
    fn from(value: usize) -> Self {
        match i64::try_from(value) {
            Ok(n) => Self::Integer(n),
            // usize is at most 64 bits wide
            Err(_) => Self::Unsigned(value as u64),
        }
    }
}

impl From<isize> for Operand {
    fn from(value: isize) -> Self {
        // isize is at most 64 bits wide, so this is lossless
        Self::Integer(value as i64)
    }
}

impl From<f32> for Operand {
    fn from(value: f32) -> Self {
        Self::Float(f64::from(value))
    }
}

impl From<f64> for Operand {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for Operand {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl<T: Into<Operand>> From<Vec<T>> for Operand {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

impl<Tz: TimeZone> From<DateTime<Tz>> for Operand {
    fn from(value: DateTime<Tz>) -> Self {
        Self::DateTime(value.with_timezone(&Utc))
    }
}

/// strftime pattern used to encode date/time operands
///
/// Date/times are normalized to UTC before formatting, so the pattern should
/// not carry an offset unless the store expects one.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct DateFormat(String);

pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

impl DateFormat {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self(pattern.into())
    }

    pub fn pattern(&self) -> &str {
        &self.0
    }

    /// Format a UTC timestamp, falling back to RFC 3339 if the pattern is invalid
    pub fn format(&self, value: &DateTime<Utc>) -> String {
        let mut out = String::new();
        if write!(out, "{}", value.format(&self.0)).is_err() {
            tracing::warn!("Invalid date format pattern {:?}, using RFC 3339", self.0);
            return value.to_rfc3339();
        }
        out
    }
}

impl Default for DateFormat {
    fn default() -> Self {
        Self::new(DEFAULT_DATE_FORMAT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    #[test]
    fn test_list_renders_comma_joined() {
        let operand = Operand::from(vec!["a", "b", "c"]);
        assert_eq!(operand.kind(), OperandKind::List);
        assert_eq!(operand.render(&DateFormat::default()), "a,b,c");
    }

    #[test]
    fn test_numbers_render_without_trailing_zero() {
        let dates = DateFormat::default();
        assert_eq!(Operand::from(1.0).render(&dates), "1");
        assert_eq!(Operand::from(2.5).render(&dates), "2.5");
        assert_eq!(Operand::from(42u8).render(&dates), "42");
    }

    #[test]
    fn test_large_unsigned_values_render_exactly() {
        let dates = DateFormat::default();
        let max = Operand::from(u64::MAX);
        assert_eq!(max, Operand::Unsigned(u64::MAX));
        assert_eq!(max.kind(), OperandKind::Number);
        assert_eq!(max.render(&dates), "18446744073709551615");

        let just_over = Operand::from((1u64 << 63) + 1);
        assert_eq!(just_over.render(&dates), "9223372036854775809");

        assert_eq!(Operand::from(7u64), Operand::Integer(7));
    }

    #[test]
    fn test_pointer_sized_integers() {
        let dates = DateFormat::default();
        assert_eq!(Operand::from(3usize), Operand::Integer(3));
        assert_eq!(Operand::from(-3isize), Operand::Integer(-3));
        assert_eq!(Operand::from(vec![1usize, 2]).render(&dates), "1,2");
        if usize::BITS == 64 {
            assert_eq!(
                Operand::from(usize::MAX).render(&dates),
                "18446744073709551615"
            );
        }
    }

    #[test]
    fn test_datetime_normalized_to_utc() {
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let local = offset.with_ymd_and_hms(2024, 3, 1, 10, 30, 0).unwrap();
        let operand = Operand::from(local);
        assert_eq!(operand.kind(), OperandKind::DateTime);
        assert_eq!(operand.render(&DateFormat::default()), "2024-03-01 08:30:00");
    }

    #[test]
    fn test_custom_date_format() {
        let dt = Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 1).unwrap();
        let dates = DateFormat::new("%d-%m-%Y");
        assert_eq!(dates.format(&dt), "31-12-2024");
    }

    #[test]
    fn test_invalid_date_format_falls_back() {
        let dt = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let dates = DateFormat::new("%Y-%");
        assert_eq!(dates.format(&dt), dt.to_rfc3339());
    }
}
