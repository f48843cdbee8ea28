use std::collections::VecDeque;

use dbutil::prelude::*;
use pretty_assertions::assert_eq;
use serde_json::json;

/// In-memory session that records what the driver asks of it.
#[derive(Default)]
struct FakeSession {
    /// Rows served after any SELECT.
    table: Vec<Row>,
    pending: VecDeque<Row>,
    executed: Vec<(String, Vec<Param>)>,
    batches: Vec<(String, Vec<Vec<Param>>)>,
    /// Statements containing this text fail.
    fail_on: Option<String>,
    fail_commit: bool,
    affected_per_statement: u64,
    row_count: u64,
    commits: usize,
    rollbacks: usize,
}

impl FakeSession {
    fn with_rows(n: usize) -> Self {
        Self {
            table: (0..n).map(|i| Row::from([("id".to_string(), json!(i))])).collect(),
            affected_per_statement: 1,
            ..Default::default()
        }
    }

    fn failing_on(mut self, text: &str) -> Self {
        self.fail_on = Some(text.to_string());
        self
    }
}

impl Session for FakeSession {
    fn execute(&mut self, sql: &str, params: &[Param]) -> DbResult<()> {
        self.executed.push((sql.to_string(), params.to_vec()));
        if self.fail_on.as_deref().is_some_and(|text| sql.contains(text)) {
            return Err(DbError::Execution(format!("rejected: {}", sql)));
        }
        if sql.starts_with("SELECT") {
            self.pending = self.table.iter().cloned().collect();
            self.row_count = self.table.len() as u64;
        } else {
            self.row_count = self.affected_per_statement;
        }
        Ok(())
    }

    fn execute_batch(&mut self, sql: &str, rows: &[Vec<Param>]) -> DbResult<()> {
        self.batches.push((sql.to_string(), rows.to_vec()));
        self.row_count = rows.len() as u64;
        Ok(())
    }

    fn fetch_one(&mut self) -> DbResult<Option<Row>> {
        Ok(self.pending.pop_front())
    }

    fn fetch_many(&mut self, n: usize) -> DbResult<Vec<Row>> {
        let take = n.min(self.pending.len());
        Ok(self.pending.drain(..take).collect())
    }

    fn row_count(&self) -> u64 {
        self.row_count
    }

    fn commit(&mut self) -> DbResult<()> {
        self.commits += 1;
        if self.fail_commit {
            return Err(DbError::Execution("commit lost".into()));
        }
        Ok(())
    }

    fn rollback(&mut self) -> DbResult<()> {
        self.rollbacks += 1;
        Ok(())
    }

    fn close(&mut self) -> DbResult<()> {
        Ok(())
    }
}

fn fake(db: &DbUtil<FakeSession>) -> &FakeSession {
    db.session().unwrap()
}

#[test]
fn test_select_one_limits_to_one_row() {
    let mut db = DbUtil::with_session(FakeSession::with_rows(3));
    let select = Select::new("users")
        .fields(["id"])
        .filter(conditions! { "id" => 5 }.unwrap())
        .limit(40);

    let row = db.select_one(&select).unwrap();

    assert_eq!(row, Some(Row::from([("id".to_string(), json!(0))])));
    let (sql, params) = &fake(&db).executed[0];
    assert_eq!(sql, "SELECT id FROM users WHERE id = %s LIMIT 1");
    assert_eq!(params, &vec![Param::Int(5)]);
    assert_eq!(fake(&db).commits, 0);
}

#[test]
fn test_select_many_returns_everything() {
    let mut db = DbUtil::with_session(FakeSession::with_rows(7));
    let rows = db.select_many(&Select::new("users")).unwrap();
    assert_eq!(rows.len(), 7);
    assert_eq!(fake(&db).executed[0].0, "SELECT * FROM users WHERE 1=1");
}

#[test]
fn test_stream_yields_fixed_batches() {
    let mut db = DbUtil::with_session(FakeSession::with_rows(250));
    let select = Select::new("events");

    let sizes: Vec<usize> = db
        .select_stream(&select, 100)
        .unwrap()
        .map(|batch| batch.unwrap().len())
        .collect();

    assert_eq!(sizes, vec![100, 100, 50]);
    assert_eq!(fake(&db).executed.len(), 1);
}

#[test]
fn test_stream_is_not_restartable() {
    let mut db = DbUtil::with_session(FakeSession::with_rows(3));
    let select = Select::new("events");

    let mut batches = db.select_stream(&select, 2).unwrap();
    assert_eq!(batches.next().unwrap().unwrap().len(), 2);
    assert_eq!(batches.next().unwrap().unwrap().len(), 1);
    assert!(batches.next().is_none());
    assert!(batches.next().is_none());
}

#[test]
fn test_stream_rejects_zero_batch_size() {
    let mut db = DbUtil::with_session(FakeSession::with_rows(3));
    let err = db.select_stream(&Select::new("events"), 0).err().unwrap();
    assert!(matches!(err, DbError::InvalidArgument(_)));
    assert!(fake(&db).executed.is_empty());
}

#[test]
fn test_insert_one_commits_with_auto_commit() {
    let mut db = DbUtil::with_session(FakeSession::with_rows(0));
    let affected = db
        .insert_one("users", Values::new().set("name", "bob").set("age", 30))
        .unwrap();

    assert_eq!(affected, 1);
    assert_eq!(db.affected_rows(), 1);
    let (sql, params) = &fake(&db).executed[0];
    assert_eq!(sql, "INSERT INTO users (name, age) VALUES (%s, %s)");
    assert_eq!(
        params,
        &vec![Param::Text("bob".into()), Param::Text("30".into())]
    );
    assert_eq!(fake(&db).commits, 1);
}

#[test]
fn test_no_commit_without_auto_commit() {
    let options = Options {
        autocommit: false,
        ..Options::default()
    };
    let mut db = DbUtil::new(FakeSession::with_rows(0), &options);
    assert!(!db.is_auto_commit());

    db.update(
        "users",
        Values::new().set("status", "gone"),
        conditions! { "id" => 1 }.unwrap(),
    )
    .unwrap();
    assert_eq!(fake(&db).commits, 0);

    db.commit().unwrap();
    assert_eq!(fake(&db).commits, 1);

    db.set_auto_commit(true);
    assert!(db.is_auto_commit());
}

#[test]
fn test_failed_statement_rolls_back_and_surfaces_error() {
    let mut session = FakeSession::with_rows(0).failing_on("UPDATE");
    session.affected_per_statement = 4;
    let mut db = DbUtil::with_session(session);

    db.delete("users", conditions! { "id" => 1 }.unwrap()).unwrap();
    assert_eq!(db.affected_rows(), 4);

    let err = db
        .update(
            "users",
            Values::new().set("status", "x"),
            conditions! { "id" => 2 }.unwrap(),
        )
        .unwrap_err();

    assert!(matches!(err, DbError::Execution(_)));
    assert_eq!(fake(&db).rollbacks, 1);
    assert_eq!(fake(&db).commits, 1);
    assert_eq!(db.affected_rows(), 4);
}

#[test]
fn test_failed_commit_rolls_back() {
    let mut db = DbUtil::with_session(FakeSession::with_rows(0));
    db.delete("users", conditions! { "id" => 1 }.unwrap()).unwrap();
    assert_eq!(db.affected_rows(), 1);

    db.session_mut().unwrap().fail_commit = true;
    db.session_mut().unwrap().affected_per_statement = 9;
    let err = db
        .insert_one("users", Values::new().set("name", "bob"))
        .unwrap_err();

    assert!(matches!(err, DbError::Execution(_)));
    assert_eq!(fake(&db).commits, 2);
    assert_eq!(fake(&db).rollbacks, 1);
    assert_eq!(db.affected_rows(), 1);
}

#[test]
fn test_failed_select_does_not_roll_back() {
    let mut db = DbUtil::with_session(FakeSession::with_rows(1).failing_on("SELECT"));
    let err = db.select_many(&Select::new("users")).unwrap_err();
    assert!(matches!(err, DbError::Execution(_)));
    assert_eq!(fake(&db).rollbacks, 0);
}

#[test]
fn test_delete_without_conditions_issues_nothing() {
    let mut db = DbUtil::with_session(FakeSession::with_rows(0));
    let err = db.delete("users", Conditions::new()).unwrap_err();
    assert!(matches!(err, DbError::InvalidCondition(_)));
    assert!(fake(&db).executed.is_empty());
    assert_eq!(fake(&db).rollbacks, 0);
}

#[test]
fn test_insert_many_length_mismatch_issues_nothing() {
    let mut db = DbUtil::with_session(FakeSession::with_rows(0));
    let columns = Columns::new().column("a", [1, 2]).column("b", [3]);
    let err = db.insert_many("pairs", columns).unwrap_err();
    assert!(matches!(err, DbError::InvalidArgument(_)));
    assert!(fake(&db).batches.is_empty());
    assert!(fake(&db).executed.is_empty());
}

#[test]
fn test_insert_many_runs_one_batch() {
    let mut db = DbUtil::with_session(FakeSession::with_rows(0));
    let columns = Columns::new()
        .column("a", [1, 2, 3])
        .column("b", ["x", "y", "z"]);

    let affected = db.insert_many("pairs", columns).unwrap();

    assert_eq!(affected, 3);
    let (sql, rows) = &fake(&db).batches[0];
    assert_eq!(sql, "INSERT INTO pairs (a, b) VALUES (%s, %s)");
    assert_eq!(rows[2], vec![Param::Int(3), Param::Text("z".into())]);
    assert_eq!(fake(&db).commits, 1);
}

#[test]
fn test_bad_condition_key_never_reaches_session() {
    let mut db = DbUtil::with_session(FakeSession::with_rows(0));
    let mut conditions = Conditions::new();
    assert!(conditions.push("name__like", "bob%").is_err());
    conditions.push("id__in", Vec::<i64>::new()).unwrap();

    let err = db.select_many(&Select::new("users").filter(conditions)).unwrap_err();
    assert!(matches!(err, DbError::InvalidCondition(_)));
    assert!(fake(&db).executed.is_empty());
}

#[test]
fn test_count() {
    let mut session = FakeSession::default();
    session.table = vec![Row::from([("COUNT(*)".to_string(), json!(12))])];
    let mut db = DbUtil::with_session(session);

    let n = db
        .count("orders", conditions! { "user_id__in" => vec![1, 2] }.unwrap(), "")
        .unwrap();

    assert_eq!(n, 12);
    assert_eq!(
        fake(&db).executed[0].0,
        "SELECT COUNT(*) FROM orders WHERE user_id IN (%s,%s)"
    );
}

#[test]
fn test_transaction_rolls_back_when_dropped() {
    let mut db = DbUtil::with_session(FakeSession::with_rows(0));
    {
        let mut tx = db.transaction().unwrap();
        assert!(!tx.is_auto_commit());
        tx.insert_one("users", Values::new().set("name", "a")).unwrap();
        tx.insert_one("users", Values::new().set("name", "b")).unwrap();
    }
    assert_eq!(fake(&db).commits, 0);
    assert_eq!(fake(&db).rollbacks, 1);
    assert!(db.is_auto_commit());
}

#[test]
fn test_transaction_commit() {
    let mut db = DbUtil::with_session(FakeSession::with_rows(0));
    let mut tx = db.transaction().unwrap();
    tx.delete("users", conditions! { "id__lt" => 10 }.unwrap()).unwrap();
    tx.commit().unwrap();

    assert_eq!(fake(&db).commits, 1);
    assert_eq!(fake(&db).rollbacks, 0);
    assert!(db.is_auto_commit());
}

#[test]
fn test_closed_driver() {
    let mut db = DbUtil::with_session(FakeSession::with_rows(1));
    db.close().unwrap();
    assert!(matches!(
        db.select_many(&Select::new("users")),
        Err(DbError::Closed)
    ));
    assert!(matches!(db.transaction().err(), Some(DbError::Closed)));
    db.close().unwrap();
}
