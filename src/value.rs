//! Value types for filters, payloads and bound parameters.

use chrono::NaiveDateTime;

use crate::error::{DbError, DbResult};

/// Format used when a datetime is sent as text.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// A numeric filter or payload value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    /// Re-coerce into a bindable numeric. Integers pass through; floats must be finite.
    pub fn recoerce(self) -> Option<Param> {
        match self {
            Number::Int(n) => Some(Param::Int(n)),
            Number::Float(f) if f.is_finite() => Some(Param::Float(f)),
            Number::Float(_) => None,
        }
    }
}

impl std::fmt::Display for Number {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Number::Int(n) => write!(f, "{}", n),
            Number::Float(n) => write!(f, "{}", n),
        }
    }
}

/// A value bound to one `%s` placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    DateTime(NaiveDateTime),
}

impl Param {
    /// Numeric view of the param, if it is one.
    pub fn as_number(&self) -> Option<Number> {
        match self {
            Param::Int(n) => Some(Number::Int(*n)),
            Param::Float(f) => Some(Number::Float(*f)),
            _ => None,
        }
    }

    /// Coerce a payload value for a text-bound statement (single insert, update SET).
    ///
    /// `None` means the column should be written as SQL `NULL`.
    pub fn stringified(&self, column: &str) -> DbResult<Option<Param>> {
        let text = match self {
            Param::Null => return Ok(None),
            Param::Int(_) | Param::Float(_) => {
                let number = self.as_number().and_then(Number::recoerce).ok_or_else(|| {
                    DbError::argument(format!("column '{}' holds a non-finite number", column))
                })?;
                number.to_string()
            }
            Param::Bool(b) => if *b { "1" } else { "0" }.to_string(),
            Param::Text(s) => s.clone(),
            Param::DateTime(dt) => dt.format(DATETIME_FORMAT).to_string(),
        };
        Ok(Some(Param::Text(text)))
    }

    /// Coerce a payload value for the batched path, keeping its native type.
    pub fn native(&self, column: &str) -> DbResult<Param> {
        match self.as_number() {
            Some(number) => number.recoerce().ok_or_else(|| {
                DbError::argument(format!("column '{}' holds a non-finite number", column))
            }),
            None => Ok(self.clone()),
        }
    }
}

impl std::fmt::Display for Param {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Param::Null => write!(f, "NULL"),
            Param::Bool(b) => write!(f, "{}", b),
            Param::Int(n) => write!(f, "{}", n),
            Param::Float(n) => write!(f, "{}", n),
            Param::Text(s) => write!(f, "'{}'", s),
            Param::DateTime(dt) => write!(f, "'{}'", dt.format(DATETIME_FORMAT)),
        }
    }
}

/// A filter value on the right-hand side of a condition.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    /// `IS NULL`, whatever the operator.
    Null,
    /// `IS NOT NULL`, whatever the operator.
    NotNull,
    Number(Number),
    Scalar(Param),
    /// Only valid with `in` / `no_in`.
    List(Vec<Param>),
}

// Conversions

impl From<bool> for Param {
    fn from(v: bool) -> Self {
        Param::Bool(v)
    }
}

impl From<i32> for Param {
    fn from(v: i32) -> Self {
        Param::Int(v as i64)
    }
}

impl From<i64> for Param {
    fn from(v: i64) -> Self {
        Param::Int(v)
    }
}

impl From<u32> for Param {
    fn from(v: u32) -> Self {
        Param::Int(v as i64)
    }
}

impl From<f64> for Param {
    fn from(v: f64) -> Self {
        Param::Float(v)
    }
}

impl From<&str> for Param {
    fn from(v: &str) -> Self {
        Param::Text(v.to_string())
    }
}

impl From<String> for Param {
    fn from(v: String) -> Self {
        Param::Text(v)
    }
}

impl From<NaiveDateTime> for Param {
    fn from(v: NaiveDateTime) -> Self {
        Param::DateTime(v)
    }
}

impl<T: Into<Param>> From<Option<T>> for Param {
    fn from(v: Option<T>) -> Self {
        v.map_or(Param::Null, Into::into)
    }
}

impl From<Param> for FilterValue {
    fn from(v: Param) -> Self {
        match v {
            Param::Null => FilterValue::Null,
            Param::Int(n) => FilterValue::Number(Number::Int(n)),
            Param::Float(f) => FilterValue::Number(Number::Float(f)),
            other => FilterValue::Scalar(other),
        }
    }
}

impl From<Number> for FilterValue {
    fn from(v: Number) -> Self {
        FilterValue::Number(v)
    }
}

macro_rules! filter_from_param {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for FilterValue {
                fn from(v: $ty) -> Self {
                    Param::from(v).into()
                }
            }
        )*
    };
}

filter_from_param!(bool, i32, i64, u32, f64, &str, String, NaiveDateTime);

impl<T: Into<Param>> From<Option<T>> for FilterValue {
    fn from(v: Option<T>) -> Self {
        Param::from(v).into()
    }
}

impl<T: Into<Param>> From<Vec<T>> for FilterValue {
    fn from(v: Vec<T>) -> Self {
        FilterValue::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Param> + Clone> From<&[T]> for FilterValue {
    fn from(v: &[T]) -> Self {
        FilterValue::List(v.iter().cloned().map(Into::into).collect())
    }
}
