//! # dbutil
//!
//! Turn condition maps into parameterized SQL, and run it.
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use dbutil::prelude::*;
//!
//! let session = MySqlSession::connect(&config.database)?;
//! let mut db = DbUtil::new(session, &config.options);
//!
//! let adults = db.select_many(
//!     &Select::new("users")
//!         .fields(["id", "email"])
//!         .filter(conditions! { "age__gte" => 18, "status" => "active" }?)
//!         .limit(10),
//! )?;
//! // => SELECT id, email FROM users WHERE age >= %s AND status = %s LIMIT 10
//! //    params: [18, 'active']
//! ```
//!
//! ## Condition keys
//!
//! | Suffix   | SQL      |
//! |----------|----------|
//! | (none)   | `=`      |
//! | `__eq`   | `=`      |
//! | `__neq`  | `!=`     |
//! | `__lt`   | `<`      |
//! | `__lte`  | `<=`     |
//! | `__gt`   | `>`      |
//! | `__gte`  | `>=`     |
//! | `__in`   | `IN`     |
//! | `__no_in`| `NOT IN` |
//!
//! [`FilterValue::Null`](value::FilterValue::Null) and
//! [`FilterValue::NotNull`](value::FilterValue::NotNull) compile to
//! `IS NULL` / `IS NOT NULL` whatever the suffix.

pub mod conditions;
pub mod config;
pub mod cursor;
pub mod engine;
pub mod error;
pub mod logging;
pub mod mysql;
pub mod parser;
pub mod transpiler;
pub mod value;

pub mod prelude {
    pub use crate::conditions;
    pub use crate::conditions::{Condition, Conditions, CompiledClause};
    pub use crate::config::{Config, DbConfig, Level, Options};
    pub use crate::cursor::Batches;
    pub use crate::engine::{DbUtil, Row, Session, Transaction};
    pub use crate::error::*;
    pub use crate::mysql::MySqlSession;
    pub use crate::parser::{Operator, parse_key};
    pub use crate::transpiler::{
        BatchStatement, Columns, Delete, Insert, InsertMany, Select, Statement, ToStatement,
        Update, Values,
    };
    pub use crate::value::{FilterValue, Number, Param};
}

/// Compile a condition map into a WHERE clause body and its params.
///
/// # Example
///
/// ```
/// let compiled = dbutil::compile(&dbutil::conditions! { "age__gte" => 18, "status" => "active" }.unwrap()).unwrap();
/// assert_eq!(compiled.clause, "age >= %s AND status = %s");
/// assert_eq!(compiled.params.len(), 2);
/// ```
pub fn compile(
    conditions: &conditions::Conditions,
) -> Result<conditions::CompiledClause, error::DbError> {
    conditions.compile()
}
