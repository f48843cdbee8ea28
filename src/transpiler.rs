//! Statement builder.
//!
//! Assembles SELECT / INSERT / UPDATE / DELETE text around compiled
//! conditions. Every user value travels as a param behind a `%s`
//! placeholder; only identifiers and the trusted `extends` tail are
//! written into the text.

use crate::conditions::{Conditions, PLACEHOLDER};
use crate::error::{DbError, DbResult};
use crate::parser::validate_identifier;
use crate::value::Param;

/// WHERE body used when no conditions apply.
const MATCH_ALL: &str = "1=1";

/// MySQL only accepts OFFSET after a LIMIT; this one means "all rows".
const NO_LIMIT: u64 = u64::MAX;

/// Trait for building executable statements.
pub trait ToStatement {
    type Output;

    /// Validate and build the statement. No SQL is produced on error.
    fn to_statement(&self) -> DbResult<Self::Output>;
}

/// SQL text plus its params in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Param>,
}

impl Statement {
    pub fn new(sql: impl Into<String>, params: Vec<Param>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

/// One statement text reused for many param rows.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchStatement {
    pub sql: String,
    pub rows: Vec<Vec<Param>>,
}

/// Ordered column → value payload for inserts and updates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Values {
    items: Vec<(String, Param)>,
}

impl Values {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a column, replacing an earlier value for the same column in place.
    pub fn set(mut self, column: impl Into<String>, value: impl Into<Param>) -> Self {
        let column = column.into();
        let value = value.into();
        match self.items.iter_mut().find(|(name, _)| *name == column) {
            Some(slot) => slot.1 = value,
            None => self.items.push((column, value)),
        }
        self
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Param)> {
        self.items.iter().map(|(column, value)| (column.as_str(), value))
    }
}

impl<K: Into<String>, V: Into<Param>> FromIterator<(K, V)> for Values {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        iter.into_iter()
            .fold(Values::new(), |values, (column, value)| values.set(column, value))
    }
}

/// Column-oriented rows for a batch insert: every column holds one value per row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Columns {
    items: Vec<(String, Vec<Param>)>,
}

impl Columns {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn column<T: Into<Param>>(
        mut self,
        name: impl Into<String>,
        values: impl IntoIterator<Item = T>,
    ) -> Self {
        let name = name.into();
        let values: Vec<Param> = values.into_iter().map(Into::into).collect();
        match self.items.iter_mut().find(|(column, _)| *column == name) {
            Some(slot) => slot.1 = values,
            None => self.items.push((name, values)),
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of rows, if every column agrees on it.
    pub fn row_count(&self) -> DbResult<usize> {
        let first = self.items.first().map_or(0, |(_, values)| values.len());
        if let Some((name, values)) = self.items.iter().find(|(_, v)| v.len() != first) {
            return Err(DbError::argument(format!(
                "the lengths of all insert sequences are not the same: column '{}' has {} values, expected {}",
                name,
                values.len(),
                first
            )));
        }
        Ok(first)
    }
}

/// SELECT builder.
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub table: String,
    pub fields: Vec<String>,
    pub conditions: Conditions,
    pub extends: String,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl Select {
    /// Row-returning select over `table`; fields default to `*`.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            fields: Vec::new(),
            conditions: Conditions::new(),
            extends: String::new(),
            limit: None,
            offset: None,
        }
    }

    /// `SELECT COUNT(*)` over `table`.
    pub fn count(table: impl Into<String>) -> Self {
        Self::new(table).fields(["COUNT(*)"])
    }

    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn filter(mut self, conditions: Conditions) -> Self {
        self.conditions = conditions;
        self
    }

    /// Trailing fragment such as `GROUP BY` or `ORDER BY`, written verbatim.
    pub fn extends(mut self, extends: impl Into<String>) -> Self {
        self.extends = extends.into();
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Statement for a single-row fetch: the caller's limit is replaced by one `LIMIT 1`.
    pub fn to_single_statement(&self) -> DbResult<Statement> {
        self.build(Some(1))
    }

    fn build(&self, limit: Option<u64>) -> DbResult<Statement> {
        validate_table(&self.table)?;
        validate_fragment("extends", &self.extends)?;

        let fields = if self.fields.is_empty() {
            "*".to_string()
        } else {
            for field in &self.fields {
                if field.trim().is_empty() {
                    return Err(DbError::argument("select field must not be empty"));
                }
                validate_fragment("field", field)?;
            }
            self.fields.join(", ")
        };

        let compiled = self.conditions.compile()?;
        let clause = if compiled.is_empty() {
            MATCH_ALL
        } else {
            compiled.clause.as_str()
        };

        let mut sql = format!("SELECT {} FROM {} WHERE {}", fields, self.table, clause);
        let extends = self.extends.trim();
        if !extends.is_empty() {
            sql.push(' ');
            sql.push_str(extends);
        }
        let limit = limit.filter(|n| *n > 0);
        let offset = self.offset.filter(|n| *n > 0);
        if let Some(n) = limit.or(offset.map(|_| NO_LIMIT)) {
            sql.push_str(&format!(" LIMIT {}", n));
        }
        if let Some(n) = offset {
            sql.push_str(&format!(" OFFSET {}", n));
        }

        Ok(Statement::new(sql, compiled.params))
    }
}

impl ToStatement for Select {
    type Output = Statement;

    fn to_statement(&self) -> DbResult<Statement> {
        self.build(self.limit)
    }
}

/// Single-row INSERT builder.
#[derive(Debug, Clone, PartialEq)]
pub struct Insert {
    pub table: String,
    pub values: Values,
}

impl Insert {
    pub fn new(table: impl Into<String>, values: Values) -> Self {
        Self {
            table: table.into(),
            values,
        }
    }
}

impl ToStatement for Insert {
    type Output = Statement;

    fn to_statement(&self) -> DbResult<Statement> {
        validate_table(&self.table)?;
        if self.values.is_empty() {
            return Err(DbError::argument("insert needs at least one column"));
        }

        let mut columns = Vec::with_capacity(self.values.len());
        let mut params = Vec::with_capacity(self.values.len());
        for (column, value) in self.values.iter() {
            validate_column(column)?;
            columns.push(column);
            params.push(value.stringified(column)?.unwrap_or(Param::Null));
        }

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table,
            columns.join(", "),
            placeholders(columns.len())
        );
        Ok(Statement::new(sql, params))
    }
}

/// Batched INSERT builder over column-oriented data.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertMany {
    pub table: String,
    pub columns: Columns,
}

impl InsertMany {
    pub fn new(table: impl Into<String>, columns: Columns) -> Self {
        Self {
            table: table.into(),
            columns,
        }
    }
}

impl ToStatement for InsertMany {
    type Output = BatchStatement;

    fn to_statement(&self) -> DbResult<BatchStatement> {
        validate_table(&self.table)?;
        let row_count = self.columns.row_count()?;
        if self.columns.is_empty() || row_count == 0 {
            return Err(DbError::argument("the insert value list is empty"));
        }

        let mut names = Vec::with_capacity(self.columns.items.len());
        for (name, _) in &self.columns.items {
            validate_column(name)?;
            names.push(name.as_str());
        }

        let rows = (0..row_count)
            .map(|i| {
                self.columns
                    .items
                    .iter()
                    .map(|(name, values)| values[i].native(name))
                    .collect::<DbResult<Vec<_>>>()
            })
            .collect::<DbResult<Vec<_>>>()?;

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table,
            names.join(", "),
            placeholders(names.len())
        );
        Ok(BatchStatement { sql, rows })
    }
}

/// UPDATE builder.
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub table: String,
    pub values: Values,
    pub conditions: Conditions,
}

impl Update {
    pub fn new(table: impl Into<String>, values: Values, conditions: Conditions) -> Self {
        Self {
            table: table.into(),
            values,
            conditions,
        }
    }
}

impl ToStatement for Update {
    type Output = Statement;

    fn to_statement(&self) -> DbResult<Statement> {
        validate_table(&self.table)?;
        if self.values.is_empty() {
            return Err(DbError::argument("update needs at least one column to set"));
        }

        let mut assignments = Vec::with_capacity(self.values.len());
        let mut params = Vec::with_capacity(self.values.len());
        for (column, value) in self.values.iter() {
            validate_column(column)?;
            match value.stringified(column)? {
                None => assignments.push(format!("{} = NULL", column)),
                Some(param) => {
                    assignments.push(format!("{} = {}", column, PLACEHOLDER));
                    params.push(param);
                }
            }
        }

        let compiled = self.conditions.compile()?;
        let clause = if compiled.is_empty() {
            MATCH_ALL
        } else {
            compiled.clause.as_str()
        };

        // SET params come first: they sit left of the WHERE placeholders.
        params.extend(compiled.params.iter().cloned());

        let sql = format!(
            "UPDATE {} SET {} WHERE {}",
            self.table,
            assignments.join(", "),
            clause
        );
        Ok(Statement::new(sql, params))
    }
}

/// DELETE builder. Refuses to build without conditions.
#[derive(Debug, Clone, PartialEq)]
pub struct Delete {
    pub table: String,
    pub conditions: Conditions,
}

impl Delete {
    pub fn new(table: impl Into<String>, conditions: Conditions) -> Self {
        Self {
            table: table.into(),
            conditions,
        }
    }
}

impl ToStatement for Delete {
    type Output = Statement;

    fn to_statement(&self) -> DbResult<Statement> {
        validate_table(&self.table)?;
        if self.conditions.is_empty() {
            return Err(DbError::condition("the delete condition should not be empty"));
        }
        let compiled = self.conditions.compile()?;
        let sql = format!("DELETE FROM {} WHERE {}", self.table, compiled.clause);
        Ok(Statement::new(sql, compiled.params))
    }
}

fn placeholders(n: usize) -> String {
    vec![PLACEHOLDER; n].join(", ")
}

fn validate_table(table: &str) -> DbResult<()> {
    validate_identifier(table)
        .map_err(|_| DbError::argument(format!("invalid table name '{}'", table)))
}

fn validate_column(column: &str) -> DbResult<()> {
    validate_identifier(column)
        .map_err(|_| DbError::argument(format!("invalid column name '{}'", column)))
}

/// Raw fragments may not end the statement early or open a comment.
fn validate_fragment(what: &str, fragment: &str) -> DbResult<()> {
    const FORBIDDEN: [&str; 5] = [";", "--", "#", "/*", "*/"];
    match FORBIDDEN.iter().find(|token| fragment.contains(*token)) {
        Some(token) => Err(DbError::argument(format!(
            "{} contains forbidden token '{}'",
            what, token
        ))),
        None => Ok(()),
    }
}
