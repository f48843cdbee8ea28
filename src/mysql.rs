//! MySQL session backed by sqlx.
//!
//! sqlx is async; this session drives one connection from a private
//! current-thread tokio runtime so the driver above stays synchronous.
//! Result sets are buffered client side and handed out by the fetch calls.

use std::collections::VecDeque;

use sqlx::mysql::{MySql, MySqlArguments, MySqlConnectOptions, MySqlConnection, MySqlRow};
use sqlx::query::Query;
use sqlx::{Column, ConnectOptions, Connection, Row as _, TypeInfo};
use tracing::{debug, info, warn};

use crate::config::DbConfig;
use crate::engine::{Row, Session};
use crate::error::{DbError, DbResult};
use crate::value::{DATETIME_FORMAT, Param};

/// A single MySQL connection.
pub struct MySqlSession {
    runtime: tokio::runtime::Runtime,
    conn: Option<MySqlConnection>,
    pending: VecDeque<Row>,
    row_count: u64,
}

impl MySqlSession {
    /// Connect using the given settings. Server-side autocommit is switched
    /// off so commit and rollback stay under the driver's control.
    pub fn connect(config: &DbConfig) -> DbResult<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.name)
            .charset(&config.charset);

        let conn = runtime
            .block_on(async {
                let mut conn = options.connect().await?;
                sqlx::query("SET autocommit = 0").execute(&mut conn).await?;
                Ok::<_, sqlx::Error>(conn)
            })
            .map_err(|e| DbError::Connection(e.to_string()))?;

        info!(host = %config.host, port = config.port, database = %config.name, "connected");

        Ok(Self {
            runtime,
            conn: Some(conn),
            pending: VecDeque::new(),
            row_count: 0,
        })
    }

    fn run_simple(&mut self, sql: &'static str) -> DbResult<()> {
        let conn = self.conn.as_mut().ok_or(DbError::Closed)?;
        self.runtime
            .block_on(sqlx::query(sql).execute(&mut *conn))
            .map_err(execution_error)?;
        Ok(())
    }
}

impl Session for MySqlSession {
    fn execute(&mut self, sql: &str, params: &[Param]) -> DbResult<()> {
        let sql = to_native_placeholders(sql);
        let conn = self.conn.as_mut().ok_or(DbError::Closed)?;
        self.pending.clear();

        let query = bind_params(sqlx::query(&sql), params);
        if returns_rows(&sql) {
            let rows = self
                .runtime
                .block_on(query.fetch_all(&mut *conn))
                .map_err(execution_error)?;
            self.row_count = rows.len() as u64;
            self.pending = rows.iter().map(row_to_map).collect();
        } else {
            let result = self
                .runtime
                .block_on(query.execute(&mut *conn))
                .map_err(execution_error)?;
            self.row_count = result.rows_affected();
        }
        Ok(())
    }

    fn execute_batch(&mut self, sql: &str, rows: &[Vec<Param>]) -> DbResult<()> {
        let sql = to_native_placeholders(sql);
        let conn = self.conn.as_mut().ok_or(DbError::Closed)?;
        self.pending.clear();

        let mut total = 0;
        for params in rows {
            let result = self
                .runtime
                .block_on(bind_params(sqlx::query(&sql), params).execute(&mut *conn))
                .map_err(execution_error)?;
            total += result.rows_affected();
        }
        debug!(rows = rows.len(), affected = total, "batch executed");
        self.row_count = total;
        Ok(())
    }

    fn fetch_one(&mut self) -> DbResult<Option<Row>> {
        Ok(self.pending.pop_front())
    }

    fn fetch_many(&mut self, n: usize) -> DbResult<Vec<Row>> {
        let take = n.min(self.pending.len());
        Ok(self.pending.drain(..take).collect())
    }

    fn fetch_all(&mut self) -> DbResult<Vec<Row>> {
        Ok(self.pending.drain(..).collect())
    }

    fn row_count(&self) -> u64 {
        self.row_count
    }

    fn commit(&mut self) -> DbResult<()> {
        self.run_simple("COMMIT")
    }

    fn rollback(&mut self) -> DbResult<()> {
        self.run_simple("ROLLBACK")
    }

    fn close(&mut self) -> DbResult<()> {
        self.pending.clear();
        match self.conn.take() {
            Some(conn) => self
                .runtime
                .block_on(conn.close())
                .map_err(|e| DbError::Connection(e.to_string())),
            None => Ok(()),
        }
    }
}

fn execution_error(err: sqlx::Error) -> DbError {
    DbError::Execution(err.to_string())
}

/// Bind params in placeholder order.
fn bind_params<'q>(
    mut query: Query<'q, MySql, MySqlArguments>,
    params: &'q [Param],
) -> Query<'q, MySql, MySqlArguments> {
    for param in params {
        query = match param {
            Param::Null => query.bind(None::<String>),
            Param::Bool(v) => query.bind(*v),
            Param::Int(v) => query.bind(*v),
            Param::Float(v) => query.bind(*v),
            Param::Text(v) => query.bind(v.as_str()),
            Param::DateTime(v) => query.bind(*v),
        };
    }
    query
}

/// Rewrite `%s` to `?` and `%%` to `%`, leaving quoted text alone.
pub fn to_native_placeholders(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut quote: Option<char> = None;
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        match quote {
            Some(q) => {
                out.push(c);
                if c == '\\' {
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                } else if c == q {
                    quote = None;
                }
            }
            None => match c {
                '\'' | '"' | '`' => {
                    quote = Some(c);
                    out.push(c);
                }
                '%' if chars.peek() == Some(&'s') => {
                    chars.next();
                    out.push('?');
                }
                '%' if chars.peek() == Some(&'%') => {
                    chars.next();
                    out.push('%');
                }
                _ => out.push(c),
            },
        }
    }
    out
}

/// Whether a statement produces a result set.
fn returns_rows(sql: &str) -> bool {
    let keyword: String = sql
        .trim_start_matches(|c: char| c.is_whitespace() || c == '(')
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_ascii_uppercase();
    matches!(
        keyword.as_str(),
        "SELECT" | "SHOW" | "DESC" | "DESCRIBE" | "EXPLAIN" | "WITH"
    )
}

/// How a column is read back, by MySQL type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Bool,
    Unsigned,
    Signed,
    Float,
    Double,
    Decimal,
    DateTime,
    Date,
    Time,
    Year,
    Bit,
    Json,
    Text,
}

impl ColumnKind {
    fn from_type_name(type_name: &str) -> Self {
        match type_name {
            "BOOLEAN" => ColumnKind::Bool,
            "YEAR" => ColumnKind::Year,
            t if t.contains("INT") && t.contains("UNSIGNED") => ColumnKind::Unsigned,
            t if t.contains("INT") => ColumnKind::Signed,
            "FLOAT" => ColumnKind::Float,
            "DOUBLE" => ColumnKind::Double,
            "DECIMAL" => ColumnKind::Decimal,
            "DATETIME" | "TIMESTAMP" => ColumnKind::DateTime,
            "DATE" => ColumnKind::Date,
            "TIME" => ColumnKind::Time,
            "BIT" => ColumnKind::Bit,
            "JSON" => ColumnKind::Json,
            _ => ColumnKind::Text,
        }
    }
}

/// Convert a MySqlRow to a Row.
fn row_to_map(row: &MySqlRow) -> Row {
    use serde_json::Value;

    let mut map = Row::new();

    for (i, column) in row.columns().iter().enumerate() {
        let name = column.name().to_string();
        let type_name = column.type_info().name().to_ascii_uppercase();

        let value = match ColumnKind::from_type_name(&type_name) {
            ColumnKind::Bool => get::<bool>(row, i).map_or(Value::Null, Value::Bool),
            ColumnKind::Unsigned => {
                get::<u64>(row, i).map_or(Value::Null, |v| Value::Number(v.into()))
            }
            ColumnKind::Signed => {
                get::<i64>(row, i).map_or(Value::Null, |v| Value::Number(v.into()))
            }
            ColumnKind::Float => get::<f32>(row, i)
                .and_then(|v| serde_json::Number::from_f64(f64::from(v)))
                .map_or(Value::Null, Value::Number),
            ColumnKind::Double => get::<f64>(row, i)
                .and_then(serde_json::Number::from_f64)
                .map_or(Value::Null, Value::Number),
            // Kept as text so no precision is lost.
            ColumnKind::Decimal => get::<rust_decimal::Decimal>(row, i)
                .map_or(Value::Null, |v| Value::String(v.to_string())),
            ColumnKind::DateTime => get::<chrono::NaiveDateTime>(row, i)
                .map_or(Value::Null, |v| Value::String(v.format(DATETIME_FORMAT).to_string())),
            ColumnKind::Date => get::<chrono::NaiveDate>(row, i)
                .map_or(Value::Null, |v| Value::String(v.to_string())),
            ColumnKind::Time => get::<chrono::NaiveTime>(row, i)
                .map_or(Value::Null, |v| Value::String(v.to_string())),
            ColumnKind::Year => get_unchecked::<u16>(row, i)
                .map_or(Value::Null, |v| Value::Number(v.into())),
            ColumnKind::Bit => get_unchecked::<Vec<u8>>(row, i).map_or(Value::Null, |bytes| {
                Value::Number(bits_to_u64(&bytes).into())
            }),
            ColumnKind::Json => get::<Value>(row, i).unwrap_or(Value::Null),
            ColumnKind::Text => get::<String>(row, i)
                .or_else(|| get::<Vec<u8>>(row, i).map(|b| String::from_utf8_lossy(&b).into_owned()))
                .map_or(Value::Null, Value::String),
        };

        if value.is_null() && !is_sql_null(row, i) {
            warn!(column = %name, type_name = %type_name, "column type not decoded, returned as null");
        }
        map.insert(name, value);
    }

    map
}

/// BIT(n) arrives as big-endian bytes.
fn bits_to_u64(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0, |acc, b| (acc << 8) | u64::from(*b))
}

fn get<T>(row: &MySqlRow, i: usize) -> Option<T>
where
    T: for<'r> sqlx::Decode<'r, MySql> + sqlx::Type<MySql>,
{
    row.try_get::<Option<T>, _>(i).ok().flatten()
}

/// For column types sqlx does not map to a Rust type; skips the type check.
fn get_unchecked<T>(row: &MySqlRow, i: usize) -> Option<T>
where
    T: for<'r> sqlx::Decode<'r, MySql>,
{
    if is_sql_null(row, i) {
        return None;
    }
    row.try_get_unchecked::<T, _>(i).ok()
}

fn is_sql_null(row: &MySqlRow, i: usize) -> bool {
    row.try_get_raw(i).map(|raw| sqlx::ValueRef::is_null(&raw)).unwrap_or(true)
}
