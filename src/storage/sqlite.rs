// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! SQLite storage. Record tables are created on first use from the shape of
//! the rows written to them.

use std::cmp::Ordering;
use std::path::Path;
use std::str::FromStr as _;
use std::time::Instant;

use ahash::{HashSet, HashSetExt as _};
use anyhow::Context as _;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use itertools::Itertools as _;
use parking_lot::Mutex;
use sqlx::{
    Row as _, SqlitePool,
    query::Query,
    sqlite::{
        SqliteArguments, SqliteAutoVacuum, SqliteConnectOptions, SqliteJournalMode,
        SqliteSynchronous,
    },
};

use super::{ReportStore, Storage};
use crate::model::reports::{GapReport, GapStatus, ProcessingReport, ReportStatus};
use crate::model::{Row, ToRow as _, Value};
use crate::shim::clock::ChainEpoch;

pub type SqliteQuery<'q> = Query<'q, sqlx::Sqlite, SqliteArguments<'q>>;

/// Opens or creates a database at the specified path
pub async fn open_file(file: &Path) -> anyhow::Result<SqlitePool> {
    if let Some(dir) = file.parent()
        && !dir.as_os_str().is_empty()
        && !dir.is_dir()
    {
        std::fs::create_dir_all(dir)?;
    }
    let options = SqliteConnectOptions::new()
        .filename(file)
        .create_if_missing(true);
    Ok(open(options).await?)
}

/// Opens or creates an in-memory database
pub async fn open_memory() -> sqlx::Result<SqlitePool> {
    open(SqliteConnectOptions::new().in_memory(true)).await
}

pub async fn open(options: SqliteConnectOptions) -> sqlx::Result<SqlitePool> {
    let options = options
        .synchronous(SqliteSynchronous::Normal)
        .pragma("temp_store", "memory")
        .auto_vacuum(SqliteAutoVacuum::None)
        .journal_mode(SqliteJournalMode::Wal)
        .pragma("journal_size_limit", "0") // always reset journal and wal files
        .read_only(false);
    // an in-memory database lives as long as its single connection
    sqlx::pool::PoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
}

/// Creates the tables in `ddls` on a new database, or checks the schema
/// version of an existing one and applies the migrations it lacks.
pub async fn init_db<'q>(
    db: &SqlitePool,
    name: &str,
    ddls: impl IntoIterator<Item = SqliteQuery<'q>>,
    version_migrations: Vec<SqliteQuery<'q>>,
) -> anyhow::Result<()> {
    let schema_version = version_migrations.len() + 1;

    let init = async |db: &SqlitePool, schema_version| {
        let mut tx = db.begin().await?;
        sqlx::query("CREATE TABLE IF NOT EXISTS _meta (version UINT64 NOT NULL UNIQUE)")
            .execute(tx.as_mut())
            .await?;
        for i in 1..=schema_version {
            sqlx::query("INSERT OR IGNORE INTO _meta (version) VALUES (?)")
                .bind(i as i64)
                .execute(tx.as_mut())
                .await?;
        }
        for ddl in ddls.into_iter() {
            ddl.execute(tx.as_mut()).await?;
        }
        tx.commit().await
    };

    if sqlx::query("SELECT name FROM sqlite_master WHERE type='table' AND name='_meta';")
        .fetch_optional(db)
        .await
        .map_err(|e| anyhow::anyhow!("error looking for {name} database _meta table: {e}"))?
        .is_none()
    {
        init(db, schema_version).await?;
    }

    let found_version: i64 = sqlx::query_scalar("SELECT max(version) FROM _meta")
        .fetch_optional(db)
        .await?
        .with_context(|| format!("invalid {name} database version: no version found"))?;
    anyhow::ensure!(found_version > 0, "schema version should be 1 based");

    match found_version.cmp(&(schema_version as i64)) {
        Ordering::Greater => anyhow::bail!(
            "invalid {name} database version: version {found_version} is greater than the number of migrations {schema_version}"
        ),
        Ordering::Equal | Ordering::Less => {}
    }

    for (from_version, to_version, migration) in version_migrations
        .into_iter()
        .enumerate()
        .map(|(i, m)| (i + 1, i + 2, m))
        // the first migration takes a version 1 database to version 2
        .skip(found_version as usize - 1)
    {
        tracing::info!("Migrating {name} database to version {to_version}");
        let now = Instant::now();
        let mut tx = db.begin().await?;
        migration.execute(tx.as_mut()).await?;
        sqlx::query("INSERT OR IGNORE INTO _meta (version) VALUES (?)")
            .bind(to_version as i64)
            .execute(tx.as_mut())
            .await?;
        tx.commit().await?;
        tracing::info!(
            "Successfully migrated {name} database from version {from_version} to {to_version} in {}",
            humantime::format_duration(now.elapsed())
        );
    }
    Ok(())
}

const DDLS: [&str; 3] = [
    "CREATE TABLE IF NOT EXISTS processing_reports (
        height INTEGER NOT NULL,
        state_root TEXT NOT NULL,
        reporter TEXT NOT NULL,
        task TEXT NOT NULL,
        started_at TEXT NOT NULL,
        completed_at TEXT NOT NULL,
        status TEXT NOT NULL,
        status_information TEXT,
        errors_detected TEXT,
        PRIMARY KEY (height, state_root, reporter, task, started_at)
    )",
    "CREATE TABLE IF NOT EXISTS gap_reports (
        height INTEGER NOT NULL,
        task TEXT NOT NULL,
        status TEXT NOT NULL,
        reporter TEXT NOT NULL,
        reported_at TEXT NOT NULL,
        PRIMARY KEY (height, task, status)
    )",
    "CREATE INDEX IF NOT EXISTS processing_reports_height ON processing_reports (height)",
];

fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn bind<'q>(query: SqliteQuery<'q>, value: &Value) -> SqliteQuery<'q> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Int(i) => query.bind(*i),
        Value::Text(s) => query.bind(s.clone()),
    }
}

fn insert_statement(row: &Row) -> String {
    format!(
        "INSERT OR REPLACE INTO {} ({}) VALUES ({})",
        quote(row.table),
        row.columns.iter().map(|(name, _)| quote(name)).join(", "),
        row.columns.iter().map(|_| "?").join(", ")
    )
}

fn create_statement(row: &Row) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({}, PRIMARY KEY ({}))",
        quote(row.table),
        row.columns.iter().map(|(name, _)| quote(name)).join(", "),
        row.key.iter().map(|name| quote(name)).join(", ")
    )
}

pub struct SqliteStorage {
    pool: SqlitePool,
    created: Mutex<HashSet<&'static str>>,
}

impl SqliteStorage {
    pub async fn new(pool: SqlitePool) -> anyhow::Result<Self> {
        init_db(&pool, "indexer", DDLS.iter().map(|ddl| sqlx::query(ddl)), vec![]).await?;
        Ok(Self {
            pool,
            created: Mutex::new(HashSet::new()),
        })
    }

    pub async fn open_file(path: &Path) -> anyhow::Result<Self> {
        Self::new(open_file(path).await?).await
    }

    pub async fn open_memory() -> anyhow::Result<Self> {
        Self::new(open_memory().await?).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn insert(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        row: &Row,
    ) -> anyhow::Result<()> {
        let statement = insert_statement(row);
        let mut query = sqlx::query(&statement);
        for (_, value) in &row.columns {
            query = bind(query, value);
        }
        query
            .execute(tx.as_mut())
            .await
            .with_context(|| format!("inserting into {}", row.table))?;
        Ok(())
    }
}

impl SqliteStorage {
    /// Inserts `rows`, creating the tables not seen yet.
    async fn insert_rows(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        rows: &[Row],
    ) -> anyhow::Result<()> {
        for row in rows {
            let known = self.created.lock().contains(row.table);
            if !known {
                sqlx::query(&create_statement(row))
                    .execute(tx.as_mut())
                    .await
                    .with_context(|| format!("creating table {}", row.table))?;
                self.created.lock().insert(row.table);
            }
            Self::insert(tx, row).await?;
        }
        Ok(())
    }
}

fn parse_time(s: &str) -> anyhow::Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("bad timestamp {s}"))?
        .with_timezone(&Utc))
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn persist_batch(&self, rows: &[Row]) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        self.insert_rows(&mut tx, rows).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn persist_result(&self, report: &ProcessingReport, rows: &[Row]) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        self.insert_rows(&mut tx, rows).await?;
        Self::insert(&mut tx, &report.to_row()).await?;
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl ReportStore for SqliteStorage {
    async fn persist_processing_reports(&self, reports: &[ProcessingReport]) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        for report in reports {
            Self::insert(&mut tx, &report.to_row()).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn processing_reports(
        &self,
        min: ChainEpoch,
        max: ChainEpoch,
    ) -> anyhow::Result<Vec<ProcessingReport>> {
        let rows = sqlx::query(
            "SELECT height, state_root, reporter, task, started_at, completed_at, status,
                    status_information, errors_detected
             FROM processing_reports WHERE height BETWEEN ? AND ? ORDER BY height",
        )
        .bind(min)
        .bind(max)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| {
                let errors: Option<String> = row.try_get("errors_detected")?;
                Ok(ProcessingReport {
                    height: row.try_get("height")?,
                    state_root: row.try_get("state_root")?,
                    reporter: row.try_get("reporter")?,
                    task: row.try_get("task")?,
                    started_at: parse_time(&row.try_get::<String, _>("started_at")?)?,
                    completed_at: parse_time(&row.try_get::<String, _>("completed_at")?)?,
                    status: ReportStatus::from_str(&row.try_get::<String, _>("status")?)?,
                    status_information: row.try_get("status_information")?,
                    errors_detected: errors.map(|e| serde_json::from_str(&e)).transpose()?,
                })
            })
            .collect()
    }

    async fn persist_gap_reports(&self, gaps: &[GapReport]) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        for gap in gaps {
            Self::insert(&mut tx, &gap.to_row()).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn gap_reports(
        &self,
        status: GapStatus,
        min: ChainEpoch,
        max: ChainEpoch,
    ) -> anyhow::Result<Vec<GapReport>> {
        let rows = sqlx::query(
            "SELECT height, task, status, reporter, reported_at FROM gap_reports
             WHERE status = ? AND height BETWEEN ? AND ? ORDER BY height, task",
        )
        .bind(status.to_string())
        .bind(min)
        .bind(max)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| {
                Ok(GapReport {
                    height: row.try_get("height")?,
                    task: row.try_get("task")?,
                    status: GapStatus::from_str(&row.try_get::<String, _>("status")?)?,
                    reporter: row.try_get("reporter")?,
                    reported_at: parse_time(&row.try_get::<String, _>("reported_at")?)?,
                })
            })
            .collect()
    }

    async fn mark_gaps_filled(&self, height: ChainEpoch, tasks: &[String]) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now().to_rfc3339();
        for task in tasks {
            sqlx::query(
                "UPDATE OR REPLACE gap_reports SET status = ?, reported_at = ?
                 WHERE height = ? AND task = ? AND status = ?",
            )
            .bind(GapStatus::Filled.to_string())
            .bind(now.clone())
            .bind(height)
            .bind(task.clone())
            .bind(GapStatus::Gap.to_string())
            .execute(tx.as_mut())
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::messages::Receipt;
    use crate::model::reports::NULL_ROUND;
    use pretty_assertions::assert_eq;

    fn receipt(idx: u64, gas_used: u64) -> Row {
        Receipt {
            height: 10,
            message: format!("m{idx}"),
            state_root: "root".into(),
            idx,
            exit_code: 0,
            gas_used,
        }
        .to_row()
    }

    #[tokio::test]
    async fn tables_are_created_on_demand() {
        let storage = SqliteStorage::open_memory().await.unwrap();
        storage
            .persist_batch(&[receipt(0, 10), receipt(1, 20)])
            .await
            .unwrap();
        storage.persist_batch(&[receipt(1, 30)]).await.unwrap();
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT message, gas_used FROM receipts ORDER BY idx")
                .fetch_all(storage.pool())
                .await
                .unwrap();
        assert_eq!(rows, vec![("m0".into(), 10), ("m1".into(), 30)]);
    }

    #[tokio::test]
    async fn reports_round_trip() {
        let storage = SqliteStorage::open_memory().await.unwrap();
        let now = parse_time(&Utc::now().to_rfc3339()).unwrap();
        let report = ProcessingReport {
            height: 6,
            state_root: String::new(),
            reporter: "r".into(),
            task: "consensus".into(),
            started_at: now,
            completed_at: now,
            status: ReportStatus::Info,
            status_information: Some(NULL_ROUND.into()),
            errors_detected: Some(serde_json::json!(["a"])),
        };
        storage
            .persist_processing_reports(&[report.clone()])
            .await
            .unwrap();
        assert_eq!(storage.processing_reports(0, 10).await.unwrap(), vec![report]);
        assert!(storage.processing_reports(7, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn report_is_written_with_its_rows() {
        let storage = SqliteStorage::open_memory().await.unwrap();
        let now = parse_time(&Utc::now().to_rfc3339()).unwrap();
        let report = ProcessingReport {
            height: 10,
            state_root: "root".into(),
            reporter: "r".into(),
            task: "receipts".into(),
            started_at: now,
            completed_at: now,
            status: ReportStatus::Ok,
            status_information: None,
            errors_detected: None,
        };
        storage
            .persist_result(&report, &[receipt(0, 10)])
            .await
            .unwrap();
        assert_eq!(storage.processing_reports(10, 10).await.unwrap(), vec![report.clone()]);

        let broken = Row {
            table: "receipts",
            key: &["idx"],
            columns: vec![("no_such_column", Value::Int(1))],
        };
        let later = ProcessingReport {
            height: 11,
            ..report
        };
        assert!(
            storage
                .persist_result(&later, &[receipt(1, 20), broken])
                .await
                .is_err()
        );
        assert!(storage.processing_reports(11, 11).await.unwrap().is_empty());
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM receipts")
            .fetch_one(storage.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn gaps_are_filled_once() {
        let storage = SqliteStorage::open_memory().await.unwrap();
        let gap = GapReport {
            height: 3,
            task: "blocks".into(),
            status: GapStatus::Gap,
            reporter: "r".into(),
            reported_at: Utc::now(),
        };
        storage.persist_gap_reports(&[gap.clone()]).await.unwrap();
        storage.persist_gap_reports(&[gap]).await.unwrap();
        assert_eq!(storage.gap_reports(GapStatus::Gap, 0, 5).await.unwrap().len(), 1);
        storage
            .mark_gaps_filled(3, &["blocks".into()])
            .await
            .unwrap();
        assert!(storage.gap_reports(GapStatus::Gap, 0, 5).await.unwrap().is_empty());
        assert_eq!(storage.gap_reports(GapStatus::Filled, 0, 5).await.unwrap().len(), 1);
    }
}
