//! Execution engine for dbutil.
//!
//! [`DbUtil`] owns one [`Session`] and runs built statements on it. It
//! applies the transaction policy: with auto-commit on, a mutating statement
//! is committed on success and rolled back on failure, and the failure is
//! still returned to the caller. [`Transaction`] is the scoped alternative
//! to the auto-commit flag.
//!
//! The driver is synchronous and single-owner. Share it across threads only
//! behind your own lock.

use std::collections::HashMap;
use std::ops::{Deref, DerefMut};

use tracing::{debug, error, info, warn};

use crate::conditions::Conditions;
use crate::config::Options;
use crate::cursor::Batches;
use crate::error::{DbError, DbResult};
use crate::transpiler::{
    Columns, Delete, Insert, InsertMany, Select, Statement, ToStatement, Update, Values,
};
use crate::value::Param;

/// A fetched row, keyed by column name.
pub type Row = HashMap<String, serde_json::Value>;

/// An open database session, supplied by the connection layer.
///
/// Statement text uses `%s` placeholders; a session translates them to its
/// driver's native syntax.
pub trait Session {
    /// Run one statement. Any result set is kept for the fetch methods.
    fn execute(&mut self, sql: &str, params: &[Param]) -> DbResult<()>;

    /// Run one statement text once per param row.
    fn execute_batch(&mut self, sql: &str, rows: &[Vec<Param>]) -> DbResult<()>;

    fn fetch_one(&mut self) -> DbResult<Option<Row>>;

    /// Fetch up to `n` rows. An empty vec means the result set is drained.
    fn fetch_many(&mut self, n: usize) -> DbResult<Vec<Row>>;

    fn fetch_all(&mut self) -> DbResult<Vec<Row>> {
        let mut rows = Vec::new();
        loop {
            let batch = self.fetch_many(1024)?;
            if batch.is_empty() {
                return Ok(rows);
            }
            rows.extend(batch);
        }
    }

    /// Rows touched by the last statement that ran.
    fn row_count(&self) -> u64;

    fn commit(&mut self) -> DbResult<()>;

    fn rollback(&mut self) -> DbResult<()>;

    fn close(&mut self) -> DbResult<()>;
}

/// Condition-driven query front end over a single session.
pub struct DbUtil<S: Session> {
    session: Option<S>,
    auto_commit: bool,
    echo: bool,
    affected: u64,
}

impl<S: Session> DbUtil<S> {
    pub fn new(session: S, options: &Options) -> Self {
        Self {
            session: Some(session),
            auto_commit: options.autocommit,
            echo: options.echo(),
            affected: 0,
        }
    }

    /// Wrap a session with default options (auto-commit on, no echo).
    pub fn with_session(session: S) -> Self {
        Self::new(session, &Options::default())
    }

    /// Borrow the underlying session.
    pub fn session(&self) -> DbResult<&S> {
        self.session.as_ref().ok_or(DbError::Closed)
    }

    pub fn session_mut(&mut self) -> DbResult<&mut S> {
        self.session.as_mut().ok_or(DbError::Closed)
    }

    /// Run a raw statement as-is. It is never auto-committed.
    pub fn query(&mut self, sql: &str) -> DbResult<u64> {
        self.run(&Statement::new(sql, vec![]), false)
    }

    /// `SELECT COUNT(*)` with conditions.
    pub fn count(&mut self, table: &str, conditions: Conditions, extends: &str) -> DbResult<i64> {
        let select = Select::count(table).filter(conditions).extends(extends);
        let statement = select.to_statement()?;
        self.run(&statement, false)?;
        let row = self.session_mut()?.fetch_one()?;
        Ok(row
            .and_then(|row| row.into_values().next())
            .and_then(|value| value.as_i64())
            .unwrap_or(0))
    }

    /// Fetch the first matching row. Always runs with exactly one `LIMIT 1`.
    pub fn select_one(&mut self, select: &Select) -> DbResult<Option<Row>> {
        let statement = select.to_single_statement()?;
        self.run(&statement, false)?;
        self.session_mut()?.fetch_one()
    }

    /// Fetch every matching row at once.
    pub fn select_many(&mut self, select: &Select) -> DbResult<Vec<Row>> {
        let statement = select.to_statement()?;
        self.run(&statement, false)?;
        self.session_mut()?.fetch_all()
    }

    /// Run the select once and hand back its rows in batches of `batch_size`.
    ///
    /// The iterator borrows the driver, so no other statement can run on
    /// the session until it is dropped.
    pub fn select_stream(&mut self, select: &Select, batch_size: usize) -> DbResult<Batches<'_, S>> {
        if batch_size == 0 {
            return Err(DbError::argument("batch size must be positive"));
        }
        let statement = select.to_statement()?;
        self.run(&statement, false)?;
        Ok(Batches::new(self.session_mut()?, batch_size))
    }

    pub fn insert_one(&mut self, table: &str, values: Values) -> DbResult<u64> {
        let statement = Insert::new(table, values).to_statement()?;
        self.run(&statement, true)
    }

    pub fn insert_many(&mut self, table: &str, columns: Columns) -> DbResult<u64> {
        let batch = InsertMany::new(table, columns).to_statement()?;
        self.echo_statement(&batch.sql, &batch.rows);
        self.dispatch(&batch.sql, true, |session| {
            session.execute_batch(&batch.sql, &batch.rows)
        })
    }

    pub fn update(&mut self, table: &str, values: Values, conditions: Conditions) -> DbResult<u64> {
        let statement = Update::new(table, values, conditions).to_statement()?;
        self.run(&statement, true)
    }

    /// Delete matching rows. Empty conditions are refused before any SQL runs.
    pub fn delete(&mut self, table: &str, conditions: Conditions) -> DbResult<u64> {
        let statement = Delete::new(table, conditions).to_statement()?;
        self.run(&statement, true)
    }

    pub fn is_auto_commit(&self) -> bool {
        self.auto_commit
    }

    pub fn set_auto_commit(&mut self, flag: bool) {
        if self.echo {
            info!(auto_commit = flag, "auto-commit changed");
        }
        self.auto_commit = flag;
    }

    /// Rows touched by the last successful statement.
    pub fn affected_rows(&self) -> u64 {
        self.affected
    }

    pub fn commit(&mut self) -> DbResult<()> {
        if self.echo {
            info!("commit");
        }
        self.session_mut()?.commit()
    }

    pub fn rollback(&mut self) -> DbResult<()> {
        if self.echo {
            info!("rollback");
        }
        self.session_mut()?.rollback()
    }

    /// Close the session. Later calls fail with [`DbError::Closed`].
    pub fn close(&mut self) -> DbResult<()> {
        match self.session.take() {
            Some(mut session) => session.close(),
            None => Ok(()),
        }
    }

    /// Start a scoped transaction: auto-commit is off until it ends.
    pub fn transaction(&mut self) -> DbResult<Transaction<'_, S>> {
        if self.session.is_none() {
            return Err(DbError::Closed);
        }
        let previous = self.auto_commit;
        self.auto_commit = false;
        Ok(Transaction {
            db: self,
            previous,
            finished: false,
        })
    }

    fn run(&mut self, statement: &Statement, mutating: bool) -> DbResult<u64> {
        self.echo_statement(&statement.sql, &statement.params);
        self.dispatch(&statement.sql, mutating, |session| {
            session.execute(&statement.sql, &statement.params)
        })
    }

    fn echo_statement<P: std::fmt::Debug>(&self, sql: &str, params: &P) {
        if self.echo {
            info!(sql, params = ?params, "executing");
        } else {
            debug!(sql, params = ?params, "executing");
        }
    }

    fn dispatch<F>(&mut self, sql: &str, mutating: bool, exec: F) -> DbResult<u64>
    where
        F: FnOnce(&mut S) -> DbResult<()>,
    {
        let auto_commit = self.auto_commit;
        let session = self.session.as_mut().ok_or(DbError::Closed)?;

        // A failed auto-commit is handled like a failed statement.
        let outcome = exec(session).and_then(|()| {
            let count = session.row_count();
            if mutating && auto_commit {
                session.commit()?;
            }
            Ok(count)
        });

        match outcome {
            Ok(count) => {
                self.affected = count;
                Ok(count)
            }
            Err(err) => {
                if mutating && auto_commit {
                    match session.rollback() {
                        Ok(()) => debug!(sql, "rolled back after failed statement"),
                        Err(rollback_err) => {
                            warn!(sql, error = %rollback_err, "rollback after failed statement also failed")
                        }
                    }
                }
                error!(sql, error = %err, "statement failed");
                Err(err)
            }
        }
    }
}

impl<S: Session> Drop for DbUtil<S> {
    fn drop(&mut self) {
        if let Some(mut session) = self.session.take() {
            if let Err(err) = session.close() {
                warn!(error = %err, "failed to close session");
            }
        }
    }
}

/// Scoped transaction over a [`DbUtil`].
///
/// Derefs to the driver, so every query method is available. Dropping it
/// without [`Transaction::commit`] rolls back. The previous auto-commit
/// setting is restored when it ends.
pub struct Transaction<'a, S: Session> {
    db: &'a mut DbUtil<S>,
    previous: bool,
    finished: bool,
}

impl<S: Session> Transaction<'_, S> {
    pub fn commit(mut self) -> DbResult<()> {
        let result = self.db.commit();
        self.finished = result.is_ok();
        result
    }

    pub fn rollback(mut self) -> DbResult<()> {
        self.finished = true;
        self.db.rollback()
    }
}

impl<S: Session> Deref for Transaction<'_, S> {
    type Target = DbUtil<S>;

    fn deref(&self) -> &Self::Target {
        self.db
    }
}

impl<S: Session> DerefMut for Transaction<'_, S> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.db
    }
}

impl<S: Session> Drop for Transaction<'_, S> {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(err) = self.db.rollback() {
                warn!(error = %err, "rollback of abandoned transaction failed");
            }
        }
        self.db.auto_commit = self.previous;
    }
}
