//! Condition key parser using nom.
//!
//! A condition key names a column and, optionally, a comparison:
//!
//! ```text
//! age__gte
//! ─┬─ ─┬─
//!  │   └── Suffix (operator, defaults to `=`)
//!  └── Column
//! ```
//!
//! The key is split on the last `__` that leaves text on both sides, so
//! `meta__created__lt` targets column `meta__created`.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while1},
    combinator::{all_consuming, value},
    IResult,
};

use crate::error::{DbError, DbResult};

/// Comparison operator carried by a condition key suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// `lte`
    Lte,
    /// `gte`
    Gte,
    /// `neq`
    Neq,
    /// `eq`, or no suffix at all
    Eq,
    /// `lt`
    Lt,
    /// `gt`
    Gt,
    /// `in`
    In,
    /// `no_in`
    NotIn,
}

impl Operator {
    /// SQL spelling of the operator.
    pub fn as_sql(self) -> &'static str {
        match self {
            Operator::Lte => "<=",
            Operator::Gte => ">=",
            Operator::Neq => "!=",
            Operator::Eq => "=",
            Operator::Lt => "<",
            Operator::Gt => ">",
            Operator::In => "IN",
            Operator::NotIn => "NOT IN",
        }
    }

    /// Key suffix that selects this operator.
    pub fn suffix(self) -> &'static str {
        match self {
            Operator::Lte => "lte",
            Operator::Gte => "gte",
            Operator::Neq => "neq",
            Operator::Eq => "eq",
            Operator::Lt => "lt",
            Operator::Gt => "gt",
            Operator::In => "in",
            Operator::NotIn => "no_in",
        }
    }

    /// Whether the operator takes a parenthesized list.
    pub fn is_membership(self) -> bool {
        matches!(self, Operator::In | Operator::NotIn)
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl std::str::FromStr for Operator {
    type Err = DbError;

    fn from_str(suffix: &str) -> DbResult<Self> {
        all_consuming(parse_suffix)(suffix)
            .map(|(_, op)| op)
            .map_err(|_| DbError::condition(format!("unknown operator suffix '{}'", suffix)))
    }
}

/// Parse a condition key into its column and operator.
pub fn parse_key(key: &str) -> DbResult<(String, Operator)> {
    if key.is_empty() || key == "None" {
        return Err(DbError::condition(
            "the key of a condition should not be null",
        ));
    }

    let (column, op) = match split_suffix(key) {
        Some((column, suffix)) => (column, suffix.parse()?),
        None => (key, Operator::Eq),
    };

    validate_identifier(column)
        .map_err(|_| DbError::condition(format!("invalid column in condition key '{}'", key)))?;

    Ok((column.to_string(), op))
}

/// Check that `name` is a plain (optionally dotted) SQL identifier.
pub fn validate_identifier(name: &str) -> DbResult<()> {
    match all_consuming(parse_identifier)(name) {
        Ok(_) => Ok(()),
        Err(_) => Err(DbError::argument(format!("'{}' is not a valid identifier", name))),
    }
}

/// Find the rightmost `__` with at least one character on either side.
fn split_suffix(key: &str) -> Option<(&str, &str)> {
    let bytes = key.as_bytes();
    (1..bytes.len().saturating_sub(2))
        .rev()
        .find(|&i| bytes[i] == b'_' && bytes[i + 1] == b'_')
        .map(|i| (&key[..i], &key[i + 2..]))
}

/// Parse an operator suffix. Longer spellings go first so `lte` is not read as `lt`.
fn parse_suffix(input: &str) -> IResult<&str, Operator> {
    alt((
        value(Operator::Lte, tag("lte")),
        value(Operator::Gte, tag("gte")),
        value(Operator::Neq, tag("neq")),
        value(Operator::NotIn, tag("no_in")),
        value(Operator::Eq, tag("eq")),
        value(Operator::Lt, tag("lt")),
        value(Operator::Gt, tag("gt")),
        value(Operator::In, tag("in")),
    ))(input)
}

fn parse_identifier(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_' || c == '.')(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_key_defaults_to_eq() {
        assert_eq!(parse_key("status").unwrap(), ("status".to_string(), Operator::Eq));
    }

    #[test]
    fn test_every_suffix() {
        let cases = [
            ("age__lte", Operator::Lte, "<="),
            ("age__gte", Operator::Gte, ">="),
            ("age__neq", Operator::Neq, "!="),
            ("age__eq", Operator::Eq, "="),
            ("age__lt", Operator::Lt, "<"),
            ("age__gt", Operator::Gt, ">"),
            ("age__in", Operator::In, "IN"),
            ("age__no_in", Operator::NotIn, "NOT IN"),
        ];
        for (key, op, sql) in cases {
            let (column, parsed) = parse_key(key).unwrap();
            assert_eq!(column, "age");
            assert_eq!(parsed, op);
            assert_eq!(parsed.as_sql(), sql);
        }
    }

    #[test]
    fn test_unknown_suffix() {
        let err = parse_key("name__like").unwrap_err();
        assert!(matches!(err, DbError::InvalidCondition(_)));
        assert!(parse_key("age__ltx").is_err());
    }

    #[test]
    fn test_null_keys_rejected() {
        assert!(matches!(parse_key(""), Err(DbError::InvalidCondition(_))));
        assert!(matches!(parse_key("None"), Err(DbError::InvalidCondition(_))));
    }

    #[test]
    fn test_splits_on_last_separator() {
        assert_eq!(
            parse_key("meta__created__lt").unwrap(),
            ("meta__created".to_string(), Operator::Lt)
        );
        assert_eq!(
            parse_key("a___gte").unwrap(),
            ("a_".to_string(), Operator::Gte)
        );
    }

    #[test]
    fn test_separator_needs_text_on_both_sides() {
        assert_eq!(parse_key("__gte").unwrap(), ("__gte".to_string(), Operator::Eq));
        assert_eq!(parse_key("flag__").unwrap(), ("flag__".to_string(), Operator::Eq));
    }

    #[test]
    fn test_dotted_column() {
        assert_eq!(parse_key("u.id__in").unwrap(), ("u.id".to_string(), Operator::In));
    }

    #[test]
    fn test_rejects_injection_in_column() {
        assert!(matches!(
            parse_key("id = 1 OR 1"),
            Err(DbError::InvalidCondition(_))
        ));
        assert!(parse_key("id;drop__eq").is_err());
    }
}
