//! End-to-end migration tests between two SQLite files.
//!
//! The target runs with foreign keys enforced, so referential failures behave
//! the way they do against PostgreSQL.

use bugtracker_migrate::config::MigrationConfig;
use bugtracker_migrate::{
    BugRecord, Config, Connection, MigrateError, Orchestrator, SqlValue, StoreConfig, User,
};
use std::path::PathBuf;
use tempfile::TempDir;

struct Stores {
    _dir: TempDir,
    source: PathBuf,
    target: PathBuf,
}

impl Stores {
    async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("bug_tracker.db");
        let target = dir.path().join("target.db");

        let mut conn = open(&source, true).await;
        // No foreign key on the source so dangling reporters can exist
        conn.execute(
            "CREATE TABLE users (id INTEGER PRIMARY KEY AUTOINCREMENT, username TEXT UNIQUE NOT NULL,
             password_hash TEXT NOT NULL, is_admin BOOLEAN DEFAULT 0)",
            &[],
        )
        .await
        .unwrap();
        conn.execute(
            "CREATE TABLE bugs (id INTEGER PRIMARY KEY AUTOINCREMENT,
             report_date DATETIME DEFAULT CURRENT_TIMESTAMP, system TEXT NOT NULL,
             bug_details TEXT NOT NULL, reported_by TEXT NOT NULL, status TEXT, priority TEXT,
             severity TEXT, assigned_to TEXT, resolution_date DATETIME, notes TEXT,
             reported_by_user_id INTEGER, file_path TEXT)",
            &[],
        )
        .await
        .unwrap();
        conn.commit().await.unwrap();
        conn.close().await.unwrap();

        Self {
            _dir: dir,
            source,
            target,
        }
    }

    fn config(&self, strict: bool) -> Config {
        Config {
            source: StoreConfig::sqlite(&self.source),
            target: StoreConfig::sqlite(&self.target).with_create_if_missing(true),
            migration: MigrationConfig { strict },
        }
    }

    async fn source(&self) -> Connection {
        open(&self.source, false).await
    }

    async fn target(&self) -> Connection {
        open(&self.target, false).await
    }
}

async fn open(path: &std::path::Path, create: bool) -> Connection {
    let cfg = StoreConfig::sqlite(path).with_create_if_missing(create);
    Connection::acquire(&cfg).await.unwrap()
}

async fn add_user(conn: &mut Connection, id: i64, name: &str, admin: bool) {
    conn.execute(
        "INSERT INTO users (id, username, password_hash, is_admin) VALUES (?, ?, ?, ?)",
        &[id.into(), name.into(), format!("hash-{}", name).into(), admin.into()],
    )
    .await
    .unwrap();
}

async fn add_bug(conn: &mut Connection, id: i64, reporter: SqlValue, notes: &str) {
    conn.execute(
        "INSERT INTO bugs (id, report_date, system, bug_details, reported_by, status, priority,
         severity, assigned_to, notes, reported_by_user_id)
         VALUES (?, '2025-03-01 10:00:00', 'core', 'npe', 'alice', 'open', 'medium', 'major', '', ?, ?)",
        &[id.into(), notes.into(), reporter],
    )
    .await
    .unwrap();
}

async fn fetch_bug(conn: &mut Connection, id: i64) -> Option<BugRecord> {
    conn.execute("SELECT * FROM bugs WHERE id = ?", &[id.into()])
        .await
        .unwrap()
        .fetchone()
        .unwrap()
        .map(|r| BugRecord::from_record(&r).unwrap())
}

#[tokio::test]
async fn test_users_and_bugs_are_copied() {
    let stores = Stores::new().await;
    let mut src = stores.source().await;
    add_user(&mut src, 1, "alice", false).await;
    add_user(&mut src, 2, "root", true).await;
    add_bug(&mut src, 10, SqlValue::I64(1), "first").await;
    src.commit().await.unwrap();
    src.close().await.unwrap();

    let result = Orchestrator::new(stores.config(false)).run().await.unwrap();
    assert!(result.is_success());
    assert_eq!(result.status, "completed");
    assert_eq!(result.users.migrated, 2);
    assert_eq!(result.bugs.migrated, 1);
    assert_eq!(result.schema.created_tables, vec!["users", "bugs"]);

    let mut tgt = stores.target().await;
    let rows = tgt
        .execute("SELECT * FROM users ORDER BY id", &[])
        .await
        .unwrap()
        .fetchall()
        .unwrap();
    let users: Vec<User> = rows.iter().map(|r| User::from_record(r).unwrap()).collect();
    assert_eq!(users[0].username, "alice");
    assert!(!users[0].is_admin);
    assert!(users[1].is_admin);

    let bug = fetch_bug(&mut tgt, 10).await.unwrap();
    assert_eq!(bug.reported_by_user_id, Some(1));
    assert_eq!(bug.notes.as_deref(), Some("first"));
    // Blank assignee is stored as NULL
    assert!(bug.assigned_to.is_none());
    tgt.close().await.unwrap();
}

#[tokio::test]
async fn test_zero_reporter_is_written_as_null() {
    let stores = Stores::new().await;
    let mut src = stores.source().await;
    add_bug(&mut src, 5, SqlValue::I64(0), "anonymous").await;
    src.commit().await.unwrap();
    src.close().await.unwrap();

    let result = Orchestrator::new(stores.config(false)).run().await.unwrap();
    assert!(result.is_success());

    let mut tgt = stores.target().await;
    let raw = tgt
        .execute("SELECT reported_by_user_id FROM bugs WHERE id = ?", &[5i64.into()])
        .await
        .unwrap()
        .fetchone()
        .unwrap()
        .unwrap();
    assert!(raw["reported_by_user_id"].is_null());
    tgt.close().await.unwrap();
}

#[tokio::test]
async fn test_second_run_changes_nothing() {
    let stores = Stores::new().await;
    let mut src = stores.source().await;
    add_user(&mut src, 1, "alice", false).await;
    add_bug(&mut src, 10, SqlValue::I64(1), "n").await;
    add_bug(&mut src, 11, SqlValue::Null, "m").await;
    src.commit().await.unwrap();
    src.close().await.unwrap();

    let orchestrator = Orchestrator::new(stores.config(false));
    let first = orchestrator.run().await.unwrap();
    let second = orchestrator.run().await.unwrap();

    assert!(first.is_success());
    assert!(second.is_success());
    assert!(second.schema.is_unchanged());
    assert_eq!(second.verification, first.verification);

    let report = orchestrator.validate().await.unwrap();
    assert!(report.is_complete());
    assert_eq!(report.get("bugs").unwrap().target, 2);
}

#[tokio::test]
async fn test_rerun_converges_on_source_changes() {
    let stores = Stores::new().await;
    let mut src = stores.source().await;
    add_user(&mut src, 1, "alice", false).await;
    add_bug(&mut src, 10, SqlValue::I64(1), "before").await;
    src.commit().await.unwrap();
    src.close().await.unwrap();

    let orchestrator = Orchestrator::new(stores.config(false));
    orchestrator.run().await.unwrap();

    let mut src = stores.source().await;
    src.execute("UPDATE bugs SET notes = ?, status = ? WHERE id = ?", &[
        "after".into(),
        "closed".into(),
        10i64.into(),
    ])
    .await
    .unwrap();
    src.commit().await.unwrap();
    src.close().await.unwrap();

    orchestrator.run().await.unwrap();

    let mut tgt = stores.target().await;
    let bug = fetch_bug(&mut tgt, 10).await.unwrap();
    assert_eq!(bug.notes.as_deref(), Some("after"));
    tgt.close().await.unwrap();
}

#[tokio::test]
async fn test_target_only_rows_are_kept_and_reported() {
    let stores = Stores::new().await;
    let mut src = stores.source().await;
    add_user(&mut src, 1, "alice", false).await;
    src.commit().await.unwrap();
    src.close().await.unwrap();

    let orchestrator = Orchestrator::new(stores.config(false));
    orchestrator.run().await.unwrap();

    let mut tgt = stores.target().await;
    add_user(&mut tgt, 50, "local-only", false).await;
    tgt.commit().await.unwrap();
    tgt.close().await.unwrap();

    let result = orchestrator.run().await.unwrap();
    assert!(!result.is_success());
    assert_eq!(result.status, "count_mismatch");
    let users = result.verification.get("users").unwrap();
    assert_eq!((users.source, users.target), (1, 2));
}

#[tokio::test]
async fn test_alice_scenario() {
    let stores = Stores::new().await;
    let mut src = stores.source().await;
    src.execute(
        "INSERT INTO users (id, username, password_hash, is_admin) VALUES (?, ?, ?, ?)",
        &[1i64.into(), "alice".into(), "h1".into(), false.into()],
    )
    .await
    .unwrap();
    src.execute(
        "INSERT INTO bugs (id, system, bug_details, reported_by, status, priority, severity,
         reported_by_user_id) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        &[
            10i64.into(),
            "core".into(),
            "npe".into(),
            "alice".into(),
            "open".into(),
            "medium".into(),
            "major".into(),
            1i64.into(),
        ],
    )
    .await
    .unwrap();
    src.commit().await.unwrap();
    src.close().await.unwrap();

    let result = Orchestrator::new(stores.config(false)).run().await.unwrap();
    assert!(result.is_success());
    assert_eq!(result.verification.get("users").unwrap().target, 1);
    assert_eq!(result.verification.get("bugs").unwrap().target, 1);

    let mut tgt = stores.target().await;
    let bug = fetch_bug(&mut tgt, 10).await.unwrap();
    assert_eq!(bug.reported_by_user_id, Some(1));
    tgt.close().await.unwrap();
}

#[tokio::test]
async fn test_dangling_reporter_is_skipped_and_counted() {
    let stores = Stores::new().await;
    let mut src = stores.source().await;
    add_user(&mut src, 1, "alice", false).await;
    add_bug(&mut src, 10, SqlValue::I64(1), "ok").await;
    add_bug(&mut src, 11, SqlValue::I64(999), "dangling").await;
    add_bug(&mut src, 12, SqlValue::I64(1), "also ok").await;
    src.commit().await.unwrap();
    src.close().await.unwrap();

    let result = Orchestrator::new(stores.config(false)).run().await.unwrap();
    assert!(!result.is_success());
    assert_eq!(result.bugs.migrated, 2);
    assert_eq!(result.bugs.failed, 1);
    assert_eq!(result.bugs.failures[0].row, "bug 11");
    assert!(result.bugs.failures[0].constraint_violation);

    let bugs = result.verification.get("bugs").unwrap();
    assert_eq!((bugs.source, bugs.target), (3, 2));

    // Rows after the rejected one were still written
    let mut tgt = stores.target().await;
    assert!(fetch_bug(&mut tgt, 12).await.is_some());
    assert!(fetch_bug(&mut tgt, 11).await.is_none());
    tgt.close().await.unwrap();
}

#[tokio::test]
async fn test_strict_mode_aborts_the_table() {
    let stores = Stores::new().await;
    let mut src = stores.source().await;
    add_user(&mut src, 1, "alice", false).await;
    add_bug(&mut src, 10, SqlValue::I64(1), "ok").await;
    add_bug(&mut src, 11, SqlValue::I64(999), "dangling").await;
    src.commit().await.unwrap();
    src.close().await.unwrap();

    let err = Orchestrator::new(stores.config(true)).run().await.unwrap_err();
    assert!(matches!(err, MigrateError::Transfer { ref table, .. } if table == "bugs"));

    // users were committed before bugs started; the bugs batch was undone
    let mut tgt = stores.target().await;
    assert_eq!(tgt.count_rows("users").await.unwrap(), 1);
    assert_eq!(tgt.count_rows("bugs").await.unwrap(), 0);
    tgt.close().await.unwrap();
}

#[tokio::test]
async fn test_missing_source_is_a_connection_error() {
    let dir = TempDir::new().unwrap();
    let config = Config {
        source: StoreConfig::sqlite(dir.path().join("absent.db")),
        target: StoreConfig::sqlite(dir.path().join("target.db")).with_create_if_missing(true),
        migration: MigrationConfig::default(),
    };
    let err = Orchestrator::new(config).run().await.unwrap_err();
    assert!(matches!(err, MigrateError::Connection { .. }));
    // Nothing was created on the target side
    assert!(!dir.path().join("target.db").exists());
}

#[tokio::test]
async fn test_http_project_url_is_rejected_at_connect() {
    let stores = Stores::new().await;
    let config = Config {
        source: StoreConfig::sqlite(&stores.source),
        target: StoreConfig::postgres_url("https://abc.supabase.co"),
        migration: MigrationConfig::default(),
    };
    let err = Orchestrator::new(config).run().await.unwrap_err();
    assert!(matches!(err, MigrateError::Connection { .. }));
    assert!(err.to_string().contains("HTTP URL"));
}

#[tokio::test]
async fn test_health_check_reports_tables() {
    let stores = Stores::new().await;
    let orchestrator = Orchestrator::new(stores.config(false));

    let health = orchestrator.health_check().await.unwrap();
    assert!(health.healthy);
    assert_eq!(health.source.tables, vec!["users", "bugs"]);
    assert!(health.target.tables.is_empty());

    let report = orchestrator.init_schema().await.unwrap();
    assert_eq!(report.created_tables, vec!["users", "bugs"]);

    let health = orchestrator.health_check().await.unwrap();
    assert_eq!(health.target.tables, vec!["users", "bugs"]);
    assert!(health.target.version.is_some());
}

async fn user_row(conn: &mut Connection, id: i64) -> bugtracker_migrate::Record {
    conn.execute(
        "SELECT id, username, password_hash, is_admin FROM users WHERE id = ?",
        &[id.into()],
    )
    .await
    .unwrap()
    .fetchone()
    .unwrap()
    .unwrap()
}

#[tokio::test]
async fn test_rerun_updates_changed_password_in_place() {
    let stores = Stores::new().await;
    let mut src = stores.source().await;
    add_user(&mut src, 7, "alice", false).await;
    add_user(&mut src, 8, "bob", true).await;
    src.commit().await.unwrap();
    src.close().await.unwrap();

    let orchestrator = Orchestrator::new(stores.config(false));
    orchestrator.run().await.unwrap();

    let mut tgt = stores.target().await;
    let before = user_row(&mut tgt, 7).await;
    let bob_before = user_row(&mut tgt, 8).await;
    tgt.close().await.unwrap();

    let mut src = stores.source().await;
    src.execute(
        "UPDATE users SET password_hash = ? WHERE id = ?",
        &["rotated".into(), 7i64.into()],
    )
    .await
    .unwrap();
    src.commit().await.unwrap();
    src.close().await.unwrap();

    let result = orchestrator.run().await.unwrap();
    assert!(result.is_success());

    let mut tgt = stores.target().await;
    let after = user_row(&mut tgt, 7).await;
    assert_eq!(after["id"], SqlValue::I64(7));
    assert_eq!(after["password_hash"], SqlValue::from("rotated"));
    for column in ["id", "username", "is_admin"] {
        assert_eq!(after[column], before[column], "{column} changed");
    }
    assert_eq!(user_row(&mut tgt, 8).await, bob_before);
    assert_eq!(tgt.count_rows("users").await.unwrap(), 2);
    tgt.close().await.unwrap();
}

#[tokio::test]
async fn test_bug_is_accepted_once_its_reporter_exists() {
    let stores = Stores::new().await;
    let mut src = stores.source().await;
    add_user(&mut src, 1, "alice", false).await;
    add_bug(&mut src, 20, SqlValue::I64(2), "waiting on bob").await;
    src.commit().await.unwrap();
    src.close().await.unwrap();

    let orchestrator = Orchestrator::new(stores.config(false));
    let first = orchestrator.run().await.unwrap();
    assert_eq!(first.bugs.failed, 1);
    assert_eq!(first.bugs.failures[0].row, "bug 20");

    let mut src = stores.source().await;
    add_user(&mut src, 2, "bob", false).await;
    src.commit().await.unwrap();
    src.close().await.unwrap();

    let second = orchestrator.run().await.unwrap();
    assert!(second.is_success());
    assert_eq!(second.users.migrated, 2);
    assert_eq!((second.bugs.migrated, second.bugs.failed), (1, 0));

    let mut tgt = stores.target().await;
    let bug = fetch_bug(&mut tgt, 20).await.unwrap();
    assert_eq!(bug.reported_by_user_id, Some(2));
    assert_eq!(bug.notes.as_deref(), Some("waiting on bob"));
    tgt.close().await.unwrap();
}

#[tokio::test]
async fn test_booleans_and_timestamps_keep_their_types() {
    let stores = Stores::new().await;
    let mut src = stores.source().await;
    add_user(&mut src, 1, "root", true).await;
    add_bug(&mut src, 10, SqlValue::I64(1), "typed").await;
    src.execute(
        "UPDATE bugs SET resolution_date = '2025-03-04T05:06:07' WHERE id = 10",
        &[],
    )
    .await
    .unwrap();
    src.commit().await.unwrap();
    src.close().await.unwrap();

    Orchestrator::new(stores.config(false)).run().await.unwrap();

    let bug_sql = "SELECT report_date, resolution_date, reported_by_user_id FROM bugs WHERE id = 10";
    let mut src = stores.source().await;
    let src_user = user_row(&mut src, 1).await;
    let src_bug = src.execute(bug_sql, &[]).await.unwrap().fetchone().unwrap().unwrap();
    src.close().await.unwrap();

    let mut tgt = stores.target().await;
    let tgt_user = user_row(&mut tgt, 1).await;
    let tgt_bug = tgt.execute(bug_sql, &[]).await.unwrap().fetchone().unwrap().unwrap();
    tgt.close().await.unwrap();

    assert_eq!(tgt_user["is_admin"], SqlValue::Bool(true));
    let reported = chrono::NaiveDate::from_ymd_opt(2025, 3, 1)
        .unwrap()
        .and_hms_opt(10, 0, 0)
        .unwrap();
    let resolved = chrono::NaiveDate::from_ymd_opt(2025, 3, 4)
        .unwrap()
        .and_hms_opt(5, 6, 7)
        .unwrap();
    assert_eq!(
        tgt_bug.values(),
        [
            SqlValue::Timestamp(reported),
            SqlValue::Timestamp(resolved),
            SqlValue::I64(1)
        ]
    );
    assert_eq!(tgt_user.values(), src_user.values());
    assert_eq!(tgt_bug.values(), src_bug.values());
}
