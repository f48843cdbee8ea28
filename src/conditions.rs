//! Condition compiler.
//!
//! Turns an ordered set of conditions into a WHERE clause and the params
//! for its placeholders.

use crate::error::{DbError, DbResult};
use crate::parser::{Operator, parse_key, validate_identifier};
use crate::value::{FilterValue, Param};

/// Placeholder left in generated SQL for each bound param.
pub const PLACEHOLDER: &str = "%s";

/// A single typed filter: `column <op> value`.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    column: String,
    op: Operator,
    value: FilterValue,
}

impl Condition {
    /// Build a condition without going through a string key. The column is
    /// checked when the condition is compiled.
    pub fn new(column: impl Into<String>, op: Operator, value: impl Into<FilterValue>) -> Self {
        Self {
            column: column.into(),
            op,
            value: value.into(),
        }
    }

    /// Build a condition from a `column__suffix` key.
    pub fn parse(key: &str, value: impl Into<FilterValue>) -> DbResult<Self> {
        let (column, op) = parse_key(key)?;
        Ok(Self {
            column,
            op,
            value: value.into(),
        })
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn op(&self) -> Operator {
        self.op
    }

    pub fn value(&self) -> &FilterValue {
        &self.value
    }

    /// Produce this condition's clause fragment and params.
    pub fn to_fragment(&self) -> DbResult<(String, Vec<Param>)> {
        coerce(&self.column, self.op, &self.value)
    }
}

/// A WHERE clause with one param per placeholder, left to right.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledClause {
    pub clause: String,
    pub params: Vec<Param>,
}

impl CompiledClause {
    pub fn is_empty(&self) -> bool {
        self.clause.is_empty()
    }
}

/// Insertion-ordered collection of conditions, joined with `AND`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conditions {
    items: Vec<Condition>,
}

impl Conditions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `(key, value)` pairs, rejecting the first bad key.
    pub fn parse<I, K, V>(pairs: I) -> DbResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<FilterValue>,
    {
        let mut conditions = Self::new();
        for (key, value) in pairs {
            conditions.push(key.as_ref(), value)?;
        }
        Ok(conditions)
    }

    /// Append a condition given as a `column__suffix` key.
    pub fn push(&mut self, key: &str, value: impl Into<FilterValue>) -> DbResult<()> {
        self.items.push(Condition::parse(key, value)?);
        Ok(())
    }

    /// Chaining form of [`Conditions::push`].
    pub fn and(mut self, key: &str, value: impl Into<FilterValue>) -> DbResult<Self> {
        self.push(key, value)?;
        Ok(self)
    }

    pub fn push_condition(&mut self, condition: Condition) {
        self.items.push(condition);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Condition> {
        self.items.iter()
    }

    /// Compile into a WHERE clause body. Empty input yields an empty clause.
    pub fn compile(&self) -> DbResult<CompiledClause> {
        let mut fragments = Vec::with_capacity(self.items.len());
        let mut params = Vec::new();

        for condition in &self.items {
            let (fragment, values) = condition.to_fragment()?;
            fragments.push(fragment);
            params.extend(values);
        }

        Ok(CompiledClause {
            clause: fragments.join(" AND "),
            params,
        })
    }
}

impl FromIterator<Condition> for Conditions {
    fn from_iter<T: IntoIterator<Item = Condition>>(iter: T) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Conditions {
    type Item = &'a Condition;
    type IntoIter = std::slice::Iter<'a, Condition>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// Coerce one filter value into a clause fragment plus params.
pub fn coerce(column: &str, op: Operator, value: &FilterValue) -> DbResult<(String, Vec<Param>)> {
    validate_identifier(column)
        .map_err(|_| DbError::condition(format!("invalid column '{}' in condition", column)))?;

    match value {
        FilterValue::Null | FilterValue::Scalar(Param::Null) => {
            Ok((format!("{} IS NULL", column), vec![]))
        }
        FilterValue::NotNull => Ok((format!("{} IS NOT NULL", column), vec![])),
        FilterValue::List(items) if op.is_membership() => {
            if items.is_empty() {
                return Err(DbError::condition(format!(
                    "empty list for '{}' {}",
                    column, op
                )));
            }
            let placeholders = vec![PLACEHOLDER; items.len()].join(",");
            Ok((format!("{} {} ({})", column, op, placeholders), items.clone()))
        }
        FilterValue::List(_) => Err(DbError::condition(format!(
            "a list value for '{}' needs the in or no_in suffix",
            column
        ))),
        _ if op.is_membership() => Err(DbError::condition(format!(
            "'{}' {} needs a list value",
            column, op
        ))),
        FilterValue::Number(number) => {
            let param = number.recoerce().ok_or_else(|| {
                DbError::condition(format!("'{}' compared against a non-finite number", column))
            })?;
            Ok((format!("{} {} {}", column, op, PLACEHOLDER), vec![param]))
        }
        FilterValue::Scalar(param) => Ok((
            format!("{} {} {}", column, op, PLACEHOLDER),
            vec![param.clone()],
        )),
    }
}

/// Build [`Conditions`] from `key => value` pairs.
///
/// Evaluates to `DbResult<Conditions>`; values of different types may be mixed.
///
/// ```
/// let conditions = dbutil::conditions! { "age__gte" => 18, "status" => "active" }.unwrap();
/// assert_eq!(conditions.len(), 2);
/// ```
#[macro_export]
macro_rules! conditions {
    () => {
        ::std::result::Result::<$crate::conditions::Conditions, $crate::error::DbError>::Ok(
            $crate::conditions::Conditions::new(),
        )
    };
    ($($key:expr => $value:expr),+ $(,)?) => {
        $crate::conditions::Conditions::parse([
            $(($key, $crate::value::FilterValue::from($value))),+
        ])
    };
}
