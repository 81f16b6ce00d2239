//! Migration orchestrator - main workflow coordinator.

mod observer;

pub use observer::{BatchEvent, BatchObserver, DefaultObserver, ErrorAction};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::audit::AuditScripts;
use crate::config::{MigrationConfig, MigrationOptions};
use crate::core::schema::SourceTable;
use crate::core::statement::{ConnectionRole, GeneratedStatement, StatementKind};
use crate::core::traits::{DbConnection, Dialect};
use crate::error::{MigrateError, Result};
use crate::introspect::discover_table;
use crate::plan::{plan_batches, select_eligible, StatementGenerator};
use crate::provision::{ensure_archive_table, table_exists};
use crate::transaction::{same_connection, TransactionCoordinator};

/// Migration orchestrator.
pub struct Orchestrator {
    config: MigrationConfig,
    source: Arc<dyn DbConnection>,
    archive: Arc<dyn DbConnection>,
    observer: Arc<dyn BatchObserver>,
}

/// Final status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every batch succeeded (or there was nothing to move).
    Completed,
    /// Some batches failed and an observer chose to continue.
    CompletedWithErrors,
    /// Statements were generated but not executed.
    DryRun,
}

/// Outcome of one batch statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Succeeded,
    Failed,
    /// Not started because an earlier failure aborted the run.
    Skipped,
    /// Generated in dry-run mode.
    Planned,
}

/// Report for one batch statement.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub role: ConnectionRole,
    pub kind: StatementKind,
    pub batch_index: usize,
    /// Source rows covered by the statement.
    pub rows: usize,
    pub status: BatchStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_affected: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl BatchReport {
    fn new(statement: &GeneratedStatement, status: BatchStatus) -> Self {
        Self {
            role: statement.role,
            kind: statement.kind,
            batch_index: statement.batch_index.unwrap_or_default(),
            rows: statement.rows,
            status,
            rows_affected: None,
            error: None,
            duration_ms: 0,
        }
    }
}

/// Result of a migration run.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationResult {
    /// Unique run identifier.
    pub run_id: String,

    /// Final status.
    pub status: RunStatus,

    pub dry_run: bool,

    /// `schema.table` of the live table.
    pub source_table: String,

    /// `schema.table` of the archive table.
    pub archive_table: String,

    /// Rows matched by the eligibility query.
    pub rows_selected: usize,

    /// Number of planned batches.
    pub batches: usize,

    /// Rows inserted into the archive (sum of affected rows).
    pub rows_archived: u64,

    /// Rows deleted from the source (sum of affected rows).
    pub rows_deleted: u64,

    /// Whether the archive table was created by this run.
    pub archive_table_created: bool,

    /// Per-statement outcomes, INSERTs first.
    pub batch_reports: Vec<BatchReport>,

    /// Whether audit scripts were written.
    pub audit_written: bool,

    /// Why writing the audit scripts failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit_error: Option<String>,

    /// SHA256 of the resolved configuration.
    pub config_hash: String,

    /// When the migration started.
    pub started_at: DateTime<Utc>,

    /// When the migration completed.
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,
}

impl MigrationResult {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reports of failed batches.
    pub fn failed_batches(&self) -> impl Iterator<Item = &BatchReport> {
        self.batch_reports
            .iter()
            .filter(|r| r.status == BatchStatus::Failed)
    }
}

/// What `inspect` discovered about the tables.
#[derive(Debug, Clone, Serialize)]
pub struct Inspection {
    pub source: SourceTable,
    pub archive_schema: String,
    pub archive_table: String,
    pub archive_exists: bool,
    /// Preview of the archive DDL that would be issued.
    pub archive_ddl: String,
}

/// Work done inside the transaction.
#[derive(Default)]
struct Progress {
    rows_selected: usize,
    batches: usize,
    archive_table_created: bool,
    reports: Vec<BatchReport>,
    audit_written: bool,
    audit_error: Option<String>,
}

struct BatchOutcome {
    report: BatchReport,
    abort_error: Option<MigrateError>,
}

impl Orchestrator {
    /// Create an orchestrator that archives within the source connection.
    pub fn new(config: MigrationConfig, source: Arc<dyn DbConnection>) -> Self {
        Self {
            config,
            archive: source.clone(),
            source,
            observer: Arc::new(DefaultObserver),
        }
    }

    /// Write the archive table through a different connection.
    pub fn with_archive(mut self, archive: Arc<dyn DbConnection>) -> Self {
        self.archive = archive;
        self
    }

    /// Attach per-batch hooks.
    pub fn with_observer(mut self, observer: Arc<dyn BatchObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// Run the migration.
    ///
    /// Connections are closed afterwards when `close_connection_on_finish`
    /// is set, whether the run succeeded or not.
    pub async fn run(self) -> Result<MigrationResult> {
        let result = self.run_in_transaction().await;
        if self.config.close_connection_on_finish {
            self.close_connections().await;
        }
        result
    }

    /// Discover the source table and archive state without changing anything.
    pub async fn inspect(&self) -> Result<Inspection> {
        let source = discover_table(
            self.source.as_ref(),
            &self.config.schema,
            &self.config.table,
            self.config.primary_key.as_ref(),
        )
        .await?;
        let archive_exists = table_exists(
            self.archive.as_ref(),
            &self.config.archive_schema,
            &self.config.archive_table,
        )
        .await?;
        let spec = crate::provision::archive_spec(&source, &self.config, self.archive.dialect())?;
        let archive_ddl =
            crate::provision::create_table_statement(&spec, self.archive.dialect()).literal;

        Ok(Inspection {
            source,
            archive_schema: self.config.archive_schema.clone(),
            archive_table: self.config.archive_table.clone(),
            archive_exists,
            archive_ddl,
        })
    }

    async fn run_in_transaction(&self) -> Result<MigrationResult> {
        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        let config_hash = self.config.hash();

        info!(
            "Starting soft delete migration run {}: {}.{} -> {}.{}{}",
            run_id,
            self.config.schema,
            self.config.table,
            self.config.archive_schema,
            self.config.archive_table,
            if self.config.dry_run { " (dry run)" } else { "" }
        );

        let mut tx = if self.config.dry_run {
            TransactionCoordinator::disabled(self.source.clone(), self.archive.clone())
        } else {
            TransactionCoordinator::new(self.source.clone(), self.archive.clone())
        };
        tx.begin().await?;

        let progress = match self.process(&mut tx, started_at, &config_hash).await {
            Ok(progress) => progress,
            Err(e) => {
                warn!("Migration failed, rolling back: {}", e);
                tx.rollback().await;
                return Err(e);
            }
        };
        tx.commit().await?;

        let completed_at = Utc::now();
        let duration = (completed_at - started_at).num_milliseconds() as f64 / 1000.0;

        let sum_affected = |kind: StatementKind| -> u64 {
            progress
                .reports
                .iter()
                .filter(|r| r.kind == kind)
                .filter_map(|r| r.rows_affected)
                .sum()
        };
        let failures = progress
            .reports
            .iter()
            .filter(|r| r.status == BatchStatus::Failed)
            .count();

        let status = if self.config.dry_run {
            RunStatus::DryRun
        } else if failures > 0 {
            RunStatus::CompletedWithErrors
        } else {
            RunStatus::Completed
        };

        let result = MigrationResult {
            run_id,
            status,
            dry_run: self.config.dry_run,
            source_table: format!("{}.{}", self.config.schema, self.config.table),
            archive_table: format!(
                "{}.{}",
                self.config.archive_schema, self.config.archive_table
            ),
            rows_selected: progress.rows_selected,
            batches: progress.batches,
            rows_archived: sum_affected(StatementKind::Insert),
            rows_deleted: sum_affected(StatementKind::Delete),
            archive_table_created: progress.archive_table_created,
            batch_reports: progress.reports,
            audit_written: progress.audit_written,
            audit_error: progress.audit_error,
            config_hash,
            started_at,
            completed_at,
            duration_seconds: duration,
        };

        info!(
            "Migration {:?}: {} rows selected, {} archived, {} deleted in {} batches ({:.1}s)",
            result.status,
            result.rows_selected,
            result.rows_archived,
            result.rows_deleted,
            result.batches,
            result.duration_seconds
        );

        Ok(result)
    }

    async fn process(
        &self,
        tx: &mut TransactionCoordinator,
        started_at: DateTime<Utc>,
        config_hash: &str,
    ) -> Result<Progress> {
        let mut progress = Progress::default();

        // Phase 1: Select eligible rows
        let query = select_eligible(&self.config, self.source.dialect());
        let rows = self.source.query(&query.sql, &query.params).await?;
        progress.rows_selected = rows.len();
        info!("Phase 1: {} eligible rows selected", rows.len());

        if rows.is_empty() {
            return Ok(progress);
        }

        // Phase 2: Discover key and provision the archive table
        let table = discover_table(
            self.source.as_ref(),
            &self.config.schema,
            &self.config.table,
            self.config.primary_key.as_ref(),
        )
        .await?;
        let provisioned = ensure_archive_table(self.archive.as_ref(), &table, &self.config).await?;
        progress.archive_table_created = provisioned.created;
        if provisioned.created && self.archive.dialect().ddl_commits_transaction() {
            tx.reopen(&self.archive).await?;
        }
        info!(
            "Phase 2: primary key ({}), archive table {}",
            table.primary_key.columns().join(", "),
            match (&provisioned.statement, provisioned.created) {
                (None, _) => "exists",
                (Some(_), true) => "created",
                (Some(_), false) => "would be created",
            }
        );

        // Phase 3: Plan batches and generate statements
        let batches = plan_batches(rows, self.config.batch_size);
        progress.batches = batches.len();
        let statements = StatementGenerator::new(
            &self.config,
            &table.primary_key,
            self.source.dialect(),
            self.archive.dialect(),
        )
        .generate(&batches)?;
        info!(
            "Phase 3: {} batches of up to {} rows",
            batches.len(),
            self.config.batch_size
        );

        if let Some(paths) = &self.config.audit {
            let scripts = AuditScripts {
                source_dialect: self.source.dialect(),
                archive_dialect: self.archive.dialect(),
                create: provisioned.statement.as_ref(),
                inserts: &statements.inserts,
                deletes: &statements.deletes,
                generated_at: started_at,
                fingerprint: config_hash,
            };
            progress.audit_error = scripts.write_logged(paths);
            progress.audit_written = progress.audit_error.is_none();
        }

        if self.config.dry_run {
            let skipped = statements.len() + usize::from(provisioned.statement.is_some());
            info!("Dry run: skipping {} write statements", skipped);
            progress.reports = statements
                .inserts
                .iter()
                .chain(&statements.deletes)
                .map(|s| BatchReport::new(s, BatchStatus::Planned))
                .collect();
            return Ok(progress);
        }

        // Phase 4: Apply
        info!(
            "Phase 4: applying {} INSERT and {} DELETE statements",
            statements.inserts.len(),
            statements.deletes.len()
        );
        progress.reports = self.apply(&statements.inserts, &statements.deletes).await?;

        Ok(progress)
    }

    /// Dispatch every INSERT on the archive connection and every DELETE on
    /// the source connection concurrently, bounded per connection.
    async fn apply(
        &self,
        inserts: &[GeneratedStatement],
        deletes: &[GeneratedStatement],
    ) -> Result<Vec<BatchReport>> {
        let max_in_flight = self.config.max_in_flight.get();
        let archive_permits = Arc::new(Semaphore::new(max_in_flight));
        let source_permits = if same_connection(&self.source, &self.archive) {
            archive_permits.clone()
        } else {
            Arc::new(Semaphore::new(max_in_flight))
        };
        let abort = AtomicBool::new(false);

        let tasks = inserts
            .iter()
            .map(|s| self.apply_one(s, &self.archive, &archive_permits, &abort))
            .chain(
                deletes
                    .iter()
                    .map(|s| self.apply_one(s, &self.source, &source_permits, &abort)),
            );
        let outcomes = join_all(tasks).await;

        let mut reports = Vec::with_capacity(outcomes.len());
        let mut first_error = None;
        for outcome in outcomes {
            if first_error.is_none() {
                first_error = outcome.abort_error;
            }
            reports.push(outcome.report);
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(reports),
        }
    }

    async fn apply_one(
        &self,
        statement: &GeneratedStatement,
        conn: &Arc<dyn DbConnection>,
        permits: &Semaphore,
        abort: &AtomicBool,
    ) -> BatchOutcome {
        let skipped = || BatchOutcome {
            report: BatchReport::new(statement, BatchStatus::Skipped),
            abort_error: None,
        };

        let Ok(_permit) = permits.acquire().await else {
            return skipped();
        };
        if abort.load(Ordering::SeqCst) {
            debug!(
                "Skipping {} batch {} after abort",
                statement.kind,
                statement.batch_index.unwrap_or_default()
            );
            return skipped();
        }

        let batch_index = statement.batch_index.unwrap_or_default();
        let started = Instant::now();
        let executed = conn
            .execute(&statement.bound.sql, &statement.bound.params)
            .await;
        let mut report = BatchReport::new(statement, BatchStatus::Succeeded);
        report.duration_ms = started.elapsed().as_millis() as u64;

        let mut event = BatchEvent {
            role: statement.role,
            kind: statement.kind,
            batch_index,
            rows: statement.rows,
            rows_affected: 0,
        };

        match executed {
            Ok(affected) => {
                debug!(
                    "{} batch {} on {} connection: {} rows",
                    statement.kind, batch_index, statement.role, affected
                );
                event.rows_affected = affected;
                report.rows_affected = Some(affected);
                match statement.kind {
                    StatementKind::Delete => self.observer.on_deleted_batch(&event),
                    _ => self.observer.on_inserted_batch(&event),
                }
                BatchOutcome {
                    report,
                    abort_error: None,
                }
            }
            Err(e) => {
                let error = MigrateError::batch(statement.role, statement.kind, batch_index, e);
                let action = match statement.kind {
                    StatementKind::Delete => self.observer.on_deleted_batch_error(&event, &error),
                    _ => self.observer.on_inserted_batch_error(&event, &error),
                };
                warn!("{} ({:?})", error, action);
                report.status = BatchStatus::Failed;
                report.error = Some(error.to_string());

                let abort_error = match action {
                    ErrorAction::Abort => {
                        abort.store(true, Ordering::SeqCst);
                        Some(error)
                    }
                    ErrorAction::Continue => None,
                };
                BatchOutcome {
                    report,
                    abort_error,
                }
            }
        }
    }

    async fn close_connections(&self) {
        if let Err(e) = self.source.close().await {
            warn!("Closing source connection failed: {}", e);
        }
        if !same_connection(&self.source, &self.archive) {
            if let Err(e) = self.archive.close().await {
                warn!("Closing archive connection failed: {}", e);
            }
        }
    }
}

/// Resolve `options` and run a migration.
///
/// `archive` defaults to `source` when `None`.
pub async fn migrate(
    source: Arc<dyn DbConnection>,
    options: &MigrationOptions,
    archive: Option<Arc<dyn DbConnection>>,
) -> Result<MigrationResult> {
    let config = options.resolve()?;
    let mut orchestrator = Orchestrator::new(config, source);
    if let Some(archive) = archive {
        orchestrator = orchestrator.with_archive(archive);
    }
    orchestrator.run().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::core::value::{Row, SqlValue};
    use crate::drivers::{DialectImpl, MysqlDialect, SqliteConnection};

    /// MySQL-dialect connection that answers metadata queries from a fixed
    /// script and records every write in order.
    struct ScriptedMysql {
        dialect: DialectImpl,
        statements: Mutex<Vec<String>>,
    }

    impl ScriptedMysql {
        fn new() -> Self {
            Self {
                dialect: DialectImpl::Mysql(MysqlDialect),
                statements: Mutex::new(Vec::new()),
            }
        }

        fn statements(&self) -> Vec<String> {
            self.statements.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DbConnection for ScriptedMysql {
        fn name(&self) -> &str {
            "scripted-mysql"
        }

        fn dialect(&self) -> &DialectImpl {
            &self.dialect
        }

        async fn query(&self, sql: &str, _params: &[SqlValue]) -> Result<Vec<Row>> {
            let column = |name: &str, data_type: &str, nullable: i64, pos: i64| {
                Row::from_iter([
                    ("column_name", SqlValue::from(name)),
                    ("column_type", SqlValue::from(data_type)),
                    ("is_nullable", SqlValue::I64(nullable)),
                    ("ordinal_position", SqlValue::I64(pos)),
                ])
            };
            let rows = if sql.contains("information_schema.tables") {
                vec![Row::from_iter([("table_count", SqlValue::I64(0))])]
            } else if sql.contains("INFORMATION_SCHEMA.COLUMNS") {
                vec![
                    column("id", "int(10) unsigned", 0, 1),
                    column("name", "varchar(64)", 0, 2),
                    column("deleted_at", "datetime", 1, 3),
                ]
            } else if sql.contains("INFORMATION_SCHEMA.KEY_COLUMN_USAGE") {
                vec![Row::from_iter([("column_name", "id")])]
            } else {
                vec![Row::from_iter([
                    ("id", SqlValue::I64(7)),
                    ("name", SqlValue::from("gone")),
                    ("deleted_at", SqlValue::from("2021-06-01 00:00:00")),
                ])]
            };
            Ok(rows)
        }

        async fn execute(&self, sql: &str, _params: &[SqlValue]) -> Result<u64> {
            self.statements.lock().unwrap().push(sql.to_string());
            Ok(1)
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    async fn seeded() -> Arc<dyn DbConnection> {
        let conn: Arc<dyn DbConnection> =
            Arc::new(SqliteConnection::connect("sqlite::memory:").await.unwrap());
        conn.execute(
            "CREATE TABLE posts (id INTEGER PRIMARY KEY, title TEXT, deleted_at TEXT)",
            &[],
        )
        .await
        .unwrap();
        conn.execute(
            "INSERT INTO posts VALUES (1, 'a', NULL), (2, 'b', '2023-05-01 12:00:00'), \
             (3, 'c', '2023-05-02 12:00:00')",
            &[],
        )
        .await
        .unwrap();
        conn
    }

    #[tokio::test]
    async fn test_result_serializes_to_json() {
        let conn = seeded().await;
        let mut options = MigrationOptions::for_table("posts");
        options.batch_size = Some(1);
        let result = migrate(conn, &options, None).await.unwrap();

        let json: serde_json::Value = serde_json::from_str(&result.to_json().unwrap()).unwrap();
        assert_eq!(json["status"], "completed");
        assert_eq!(json["rows_selected"], 2);
        assert_eq!(json["batch_reports"].as_array().map(Vec::len), Some(4));
        assert_eq!(json["batch_reports"][0]["kind"], "insert");
        assert!(json.get("audit_error").is_none());
    }

    #[tokio::test]
    async fn test_mysql_transaction_restarts_after_create() {
        let scripted = Arc::new(ScriptedMysql::new());
        let conn: Arc<dyn DbConnection> = scripted.clone();
        let config = MigrationOptions::for_table("users").resolve().unwrap();

        let result = Orchestrator::new(config, conn).run().await.unwrap();
        assert!(result.archive_table_created);
        assert_eq!(result.rows_deleted, 1);

        let statements = scripted.statements();
        assert_eq!(statements.len(), 6, "{:?}", statements);
        assert_eq!(statements[0], "START TRANSACTION");
        assert!(statements[1].starts_with("CREATE TABLE"));
        assert_eq!(statements[2], "START TRANSACTION");
        assert!(statements[3..5].iter().any(|s| s.starts_with("INSERT")));
        assert!(statements[3..5].iter().any(|s| s.starts_with("DELETE")));
        assert_eq!(statements[5], "COMMIT");
    }

    #[tokio::test]
    async fn test_run_twice_finds_nothing_the_second_time() {
        let conn = seeded().await;
        let config = MigrationOptions::for_table("posts").resolve().unwrap();

        let first = Orchestrator::new(config.clone(), conn.clone()).run().await.unwrap();
        assert_eq!(first.rows_deleted, 2);

        let second = Orchestrator::new(config, conn).run().await.unwrap();
        assert_eq!(second.rows_selected, 0);
        assert_eq!(second.batches, 0);
        assert!(second.batch_reports.is_empty());
    }
}
