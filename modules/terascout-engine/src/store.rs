//! ScoutStore — the per-scout state store.
//!
//! One SQLite database file per scout keeps stores strictly isolated: a
//! scout's state is fully present (its file exists and is populated) or
//! fully absent. The pool is capped at a single connection, so concurrent
//! callers are serialized in arrival order and the single-writer rule holds
//! without extra locking.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::info;

use terascout_common::{
    date_key, EmailCount, EventArticle, ScoutConfig, ScoutEvent, ScoutSource, Snapshot,
    SourceStrategy, TerascoutError,
};

/// Default truncation applied on snapshot writes; overridable per store.
const DEFAULT_MAX_SNAPSHOT_TEXT: usize = 5_000;

#[derive(Clone)]
pub struct ScoutStore {
    pool: SqlitePool,
    max_snapshot_text: usize,
}

impl ScoutStore {
    /// Path of a scout's database file under the data directory.
    pub fn db_path(data_dir: &Path, scout_id: &str) -> PathBuf {
        data_dir.join("scouts").join(format!("{scout_id}.db"))
    }

    /// Create (or reopen) the store for a scout, installing the schema.
    pub async fn create(data_dir: &Path, scout_id: &str) -> Result<Self> {
        let path = Self::db_path(data_dir, scout_id);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true);
        Self::connect(options).await
    }

    /// Open an existing store. Returns `None` when no store exists for the
    /// scout — the control plane maps that to 404.
    pub async fn open(data_dir: &Path, scout_id: &str) -> Result<Option<Self>> {
        let path = Self::db_path(data_dir, scout_id);
        if !path.exists() {
            return Ok(None);
        }
        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(false);
        Ok(Some(Self::connect(options).await?))
    }

    /// An in-memory store for tests.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        Self::connect(options).await
    }

    async fn connect(options: SqliteConnectOptions) -> Result<Self> {
        // One connection: single-writer exclusion, arrival-order serialization.
        // The busy timeout covers control-plane reads that overlap the bound
        // engine's own connection.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options.busy_timeout(std::time::Duration::from_secs(5)))
            .await
            .context("Failed to open scout store")?;
        let store = Self {
            pool,
            max_snapshot_text: DEFAULT_MAX_SNAPSHOT_TEXT,
        };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn with_max_snapshot_text(mut self, max_bytes: usize) -> Self {
        self.max_snapshot_text = max_bytes;
        self
    }

    /// Close the pool. Required before deleting the database file.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Remove a scout's database file (and SQLite sidecar files). The store
    /// must be closed first. Missing files are not an error.
    pub fn delete_file(data_dir: &Path, scout_id: &str) -> Result<()> {
        let path = Self::db_path(data_dir, scout_id);
        for suffix in ["", "-wal", "-shm"] {
            let mut name = path.clone().into_os_string();
            name.push(suffix);
            match std::fs::remove_file(PathBuf::from(name)) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e).context("Failed to delete scout store file"),
            }
        }
        Ok(())
    }

    /// List scout ids that have a store on disk (startup respawn scan).
    pub fn scan_data_dir(data_dir: &Path) -> Result<Vec<String>> {
        let dir = data_dir.join("scouts");
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("db") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    // -----------------------------------------------------------------------
    // Schema
    // -----------------------------------------------------------------------

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS config (
                scout_id   TEXT PRIMARY KEY,
                query      TEXT NOT NULL,
                email      TEXT NOT NULL,
                created_at TEXT NOT NULL,
                expires_at TEXT
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sources (
                url             TEXT PRIMARY KEY,
                label           TEXT NOT NULL,
                strategy        TEXT NOT NULL,
                last_hash       TEXT NOT NULL DEFAULT '',
                last_text       TEXT NOT NULL DEFAULT '',
                last_checked_at TEXT
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                event_id     TEXT PRIMARY KEY,
                source_url   TEXT NOT NULL,
                source_label TEXT NOT NULL,
                tldr         TEXT NOT NULL DEFAULT '',
                summary      TEXT NOT NULL DEFAULT '',
                highlights   TEXT NOT NULL DEFAULT '[]',
                articles     TEXT NOT NULL DEFAULT '[]',
                is_breaking  INTEGER NOT NULL DEFAULT 0,
                detected_at  TEXT NOT NULL,
                notified     INTEGER NOT NULL DEFAULT 0
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS email_counter (
                date_key TEXT PRIMARY KEY,
                count    INTEGER NOT NULL DEFAULT 0
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS steps (
                name         TEXT PRIMARY KEY,
                outcome      TEXT,
                wake_at      TEXT,
                completed_at TEXT
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Stores written before the enrichment columns existed get them added
        // with empty defaults.
        self.ensure_column("config", "expires_at", "expires_at TEXT")
            .await?;
        self.ensure_column("events", "tldr", "tldr TEXT NOT NULL DEFAULT ''")
            .await?;
        self.ensure_column("events", "highlights", "highlights TEXT NOT NULL DEFAULT '[]'")
            .await?;
        self.ensure_column("events", "articles", "articles TEXT NOT NULL DEFAULT '[]'")
            .await?;
        self.ensure_column("events", "is_breaking", "is_breaking INTEGER NOT NULL DEFAULT 0")
            .await?;

        Ok(())
    }

    async fn ensure_column(&self, table: &str, column: &str, ddl: &str) -> Result<()> {
        let rows = sqlx::query(&format!("PRAGMA table_info({table})"))
            .fetch_all(&self.pool)
            .await?;
        let exists = rows
            .iter()
            .any(|row| row.get::<String, _>("name") == column);
        if !exists {
            info!(table, column, "Adding missing column to scout store");
            sqlx::query(&format!("ALTER TABLE {table} ADD COLUMN {ddl}"))
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Config + sources
    // -----------------------------------------------------------------------

    /// Overwrite the scout config and install its source rows.
    pub async fn put_config(&self, config: &ScoutConfig) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO config (scout_id, query, email, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&config.scout_id)
        .bind(&config.query)
        .bind(&config.email)
        .bind(config.created_at.to_rfc3339())
        .bind(config.expires_at.map(|at| at.to_rfc3339()))
        .execute(&mut *tx)
        .await?;

        for source in &config.sources {
            sqlx::query(
                r#"
                INSERT INTO sources (url, label, strategy)
                VALUES ($1, $2, $3)
                ON CONFLICT(url) DO UPDATE SET label = excluded.label, strategy = excluded.strategy
                "#,
            )
            .bind(&source.url)
            .bind(&source.label)
            .bind(source.strategy.to_string())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// The scout record plus its sources. `NotFound` when no config row is
    /// installed (wiped or never-initialized store).
    pub async fn get_config(&self) -> Result<ScoutConfig> {
        let row = sqlx::query(
            "SELECT scout_id, query, email, created_at, expires_at FROM config LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Err(TerascoutError::NotFound("no config installed".to_string()).into());
        };

        let sources = sqlx::query("SELECT url, label, strategy FROM sources ORDER BY url")
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|row| {
                let strategy: String = row.get("strategy");
                Ok(ScoutSource {
                    url: row.get("url"),
                    label: row.get("label"),
                    strategy: strategy
                        .parse::<SourceStrategy>()
                        .map_err(TerascoutError::Storage)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(ScoutConfig {
            scout_id: row.get("scout_id"),
            query: row.get("query"),
            email: row.get("email"),
            sources,
            created_at: parse_ts(row.get("created_at"))?,
            expires_at: row
                .get::<Option<String>, _>("expires_at")
                .map(parse_ts)
                .transpose()?,
        })
    }

    // -----------------------------------------------------------------------
    // Snapshots
    // -----------------------------------------------------------------------

    pub async fn get_snapshot(&self, url: &str) -> Result<Option<Snapshot>> {
        let row = sqlx::query(
            "SELECT last_hash, last_text, last_checked_at FROM sources WHERE url = $1",
        )
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let checked_at: Option<String> = row.get("last_checked_at");
        // A source row that has never been checked has no snapshot yet.
        let Some(checked_at) = checked_at else {
            return Ok(None);
        };

        Ok(Some(Snapshot {
            content_hash: row.get("last_hash"),
            text: row.get("last_text"),
            checked_at: parse_ts(checked_at)?,
        }))
    }

    /// Overwrite the snapshot for a source, stamping `checked_at = now` and
    /// truncating the text at a char boundary.
    pub async fn put_snapshot(&self, url: &str, content_hash: &str, text: &str) -> Result<()> {
        let text = ai_client::truncate_to_char_boundary(text, self.max_snapshot_text);
        sqlx::query(
            r#"
            UPDATE sources
            SET last_hash = $2, last_text = $3, last_checked_at = $4
            WHERE url = $1
            "#,
        )
        .bind(url)
        .bind(content_hash)
        .bind(text)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------------

    /// Insert iff `event_id` is new. Colliding inserts are a silent no-op;
    /// the return value reports whether a row was written.
    pub async fn record_event(&self, event: &ScoutEvent) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO events
                (event_id, source_url, source_label, tldr, summary, highlights,
                 articles, is_breaking, detected_at, notified)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(&event.event_id)
        .bind(&event.source_url)
        .bind(&event.source_label)
        .bind(&event.tldr)
        .bind(&event.summary)
        .bind(serde_json::to_string(&event.highlights)?)
        .bind(serde_json::to_string(&event.articles)?)
        .bind(event.is_breaking)
        .bind(event.detected_at.to_rfc3339())
        .bind(event.notified)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Mark an event as notified once its email has been dispatched.
    pub async fn mark_notified(&self, event_id: &str) -> Result<()> {
        sqlx::query("UPDATE events SET notified = 1 WHERE event_id = $1")
            .bind(event_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// All events, newest first.
    pub async fn list_events(&self) -> Result<Vec<ScoutEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT event_id, source_url, source_label, tldr, summary, highlights,
                   articles, is_breaking, detected_at, notified
            FROM events
            ORDER BY detected_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(event_from_row).collect()
    }

    // -----------------------------------------------------------------------
    // Email counter
    // -----------------------------------------------------------------------

    /// Today's (UTC) email tally, defaulting to zero.
    pub async fn get_email_count(&self) -> Result<EmailCount> {
        let key = date_key(Utc::now());
        let row = sqlx::query("SELECT count FROM email_counter WHERE date_key = $1")
            .bind(&key)
            .fetch_optional(&self.pool)
            .await?;

        let count = row.map(|r| r.get::<i64, _>("count") as u32).unwrap_or(0);
        Ok(EmailCount {
            date_key: key,
            count,
        })
    }

    /// Atomically bump today's row and drop every other date row, so the
    /// table never holds more than the current UTC day. Returns the new count.
    pub async fn increment_email_count(&self) -> Result<u32> {
        let key = date_key(Utc::now());
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO email_counter (date_key, count) VALUES ($1, 1)
            ON CONFLICT(date_key) DO UPDATE SET count = count + 1
            "#,
        )
        .bind(&key)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM email_counter WHERE date_key != $1")
            .bind(&key)
            .execute(&mut *tx)
            .await?;

        let row = sqlx::query("SELECT count FROM email_counter WHERE date_key = $1")
            .bind(&key)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(row.get::<i64, _>("count") as u32)
    }

    // -----------------------------------------------------------------------
    // Step memo (engine checkpoints)
    // -----------------------------------------------------------------------

    /// The persisted outcome of a completed step, if any.
    pub async fn step_outcome(&self, name: &str) -> Result<Option<String>> {
        let row = sqlx::query(
            "SELECT outcome FROM steps WHERE name = $1 AND completed_at IS NOT NULL",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.and_then(|r| r.get::<Option<String>, _>("outcome")))
    }

    /// Persist a step's outcome, marking it complete.
    pub async fn record_step(&self, name: &str, outcome_json: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO steps (name, outcome, completed_at) VALUES ($1, $2, $3)
            ON CONFLICT(name) DO UPDATE SET outcome = excluded.outcome,
                                            completed_at = excluded.completed_at
            "#,
        )
        .bind(name)
        .bind(outcome_json)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// The persisted wake deadline of an unfinished sleep step, if any.
    pub async fn sleep_deadline(&self, name: &str) -> Result<Option<DateTime<Utc>>> {
        let row = sqlx::query("SELECT wake_at, completed_at FROM steps WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        if row.get::<Option<String>, _>("completed_at").is_some() {
            return Ok(None);
        }
        row.get::<Option<String>, _>("wake_at")
            .map(parse_ts)
            .transpose()
    }

    pub async fn set_sleep_deadline(&self, name: &str, wake_at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO steps (name, wake_at) VALUES ($1, $2)
            ON CONFLICT(name) DO UPDATE SET wake_at = excluded.wake_at
            "#,
        )
        .bind(name)
        .bind(wake_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Whether a sleep step has already completed.
    pub async fn sleep_finished(&self, name: &str) -> Result<bool> {
        let row = sqlx::query(
            "SELECT 1 AS done FROM steps WHERE name = $1 AND completed_at IS NOT NULL",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    pub async fn finish_sleep(&self, name: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO steps (name, completed_at) VALUES ($1, $2)
            ON CONFLICT(name) DO UPDATE SET completed_at = excluded.completed_at
            "#,
        )
        .bind(name)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Wipe
    // -----------------------------------------------------------------------

    /// Delete all rows across all tables.
    pub async fn wipe(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for table in ["config", "sources", "events", "email_counter", "steps"] {
            sqlx::query(&format!("DELETE FROM {table}"))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

fn parse_ts(raw: String) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(&raw)
        .map_err(|e| TerascoutError::Storage(format!("bad timestamp {raw:?}: {e}")))?
        .with_timezone(&Utc))
}

fn event_from_row(row: SqliteRow) -> Result<ScoutEvent> {
    let highlights: Vec<String> =
        serde_json::from_str(&row.get::<String, _>("highlights")).unwrap_or_default();
    let articles: Vec<EventArticle> =
        serde_json::from_str(&row.get::<String, _>("articles")).unwrap_or_default();
    Ok(ScoutEvent {
        event_id: row.get("event_id"),
        source_url: row.get("source_url"),
        source_label: row.get("source_label"),
        tldr: row.get("tldr"),
        summary: row.get("summary"),
        highlights,
        articles,
        is_breaking: row.get("is_breaking"),
        detected_at: parse_ts(row.get("detected_at"))?,
        notified: row.get("notified"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_config() -> ScoutConfig {
        ScoutConfig {
            scout_id: "a1b2c3".to_string(),
            query: "NVIDIA GPU drops".to_string(),
            email: "u@e.com".to_string(),
            sources: vec![ScoutSource {
                url: "https://news.google.com/search?q=nvidia".to_string(),
                label: "nvidia".to_string(),
                strategy: SourceStrategy::HtmlDiff,
            }],
            created_at: Utc::now(),
            expires_at: Some(Utc::now() + Duration::hours(72)),
        }
    }

    fn sample_event(id: &str) -> ScoutEvent {
        ScoutEvent {
            event_id: id.to_string(),
            source_url: "https://news.google.com/search?q=nvidia".to_string(),
            source_label: "nvidia".to_string(),
            tldr: "RTX 5090 in stock".to_string(),
            summary: "The RTX 5090 is back in stock at several retailers.".to_string(),
            highlights: vec!["MSRP listings spotted".to_string()],
            articles: vec![EventArticle {
                title: "RTX 5090 restock".to_string(),
                url: "https://example.com/restock".to_string(),
                snippet: "In stock now".to_string(),
                image_url: None,
            }],
            is_breaking: false,
            detected_at: Utc::now(),
            notified: false,
        }
    }

    #[tokio::test]
    async fn config_round_trips() {
        let store = ScoutStore::in_memory().await.unwrap();
        let config = sample_config();
        store.put_config(&config).await.unwrap();

        let loaded = store.get_config().await.unwrap();
        assert_eq!(loaded.scout_id, config.scout_id);
        assert_eq!(loaded.query, config.query);
        assert_eq!(loaded.sources, config.sources);
        assert!(loaded.expires_at.is_some());
    }

    #[tokio::test]
    async fn record_event_is_idempotent() {
        let store = ScoutStore::in_memory().await.unwrap();
        store.put_config(&sample_config()).await.unwrap();

        let event = sample_event("ev-1");
        assert!(store.record_event(&event).await.unwrap());
        assert!(!store.record_event(&event).await.unwrap());

        let events = store.list_events().await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_id, "ev-1");
        assert_eq!(events[0].highlights, event.highlights);
        assert_eq!(events[0].articles, event.articles);
    }

    #[tokio::test]
    async fn list_events_is_newest_first() {
        let store = ScoutStore::in_memory().await.unwrap();
        let mut older = sample_event("older");
        older.detected_at = Utc::now() - Duration::minutes(10);
        let newer = sample_event("newer");
        store.record_event(&older).await.unwrap();
        store.record_event(&newer).await.unwrap();

        let events = store.list_events().await.unwrap();
        assert_eq!(events[0].event_id, "newer");
        assert_eq!(events[1].event_id, "older");
    }

    #[tokio::test]
    async fn wipe_then_get_config_is_not_found() {
        let store = ScoutStore::in_memory().await.unwrap();
        store.put_config(&sample_config()).await.unwrap();
        store.record_event(&sample_event("ev")).await.unwrap();
        store.record_step("load-config-0", "{}").await.unwrap();

        store.wipe().await.unwrap();

        let err = store.get_config().await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TerascoutError>(),
            Some(TerascoutError::NotFound(_))
        ));
        assert!(store.list_events().await.unwrap().is_empty());
        assert!(store.step_outcome("load-config-0").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn email_counter_increments_and_keeps_single_row() {
        let store = ScoutStore::in_memory().await.unwrap();
        assert_eq!(store.get_email_count().await.unwrap().count, 0);

        // Seed a stale row from a previous day; the upsert must purge it.
        sqlx::query("INSERT INTO email_counter (date_key, count) VALUES ('2020-01-01', 7)")
            .execute(&store.pool)
            .await
            .unwrap();

        assert_eq!(store.increment_email_count().await.unwrap(), 1);
        assert_eq!(store.increment_email_count().await.unwrap(), 2);
        assert_eq!(store.get_email_count().await.unwrap().count, 2);

        let rows = sqlx::query("SELECT date_key FROM email_counter")
            .fetch_all(&store.pool)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn snapshot_absent_until_first_check_and_truncated_on_write() {
        let store = ScoutStore::in_memory()
            .await
            .unwrap()
            .with_max_snapshot_text(10);
        let config = sample_config();
        store.put_config(&config).await.unwrap();
        let url = &config.sources[0].url;

        // Source row exists but has never been checked.
        assert!(store.get_snapshot(url).await.unwrap().is_none());

        store
            .put_snapshot(url, "hash-a", "a very long snapshot body")
            .await
            .unwrap();
        let snap = store.get_snapshot(url).await.unwrap().unwrap();
        assert_eq!(snap.content_hash, "hash-a");
        assert_eq!(snap.text, "a very lon");
    }

    #[tokio::test]
    async fn step_memo_round_trips() {
        let store = ScoutStore::in_memory().await.unwrap();
        assert!(store.step_outcome("fetch-0-x").await.unwrap().is_none());

        store.record_step("fetch-0-x", r#"{"hash":"h"}"#).await.unwrap();
        assert_eq!(
            store.step_outcome("fetch-0-x").await.unwrap().as_deref(),
            Some(r#"{"hash":"h"}"#)
        );
    }

    #[tokio::test]
    async fn sleep_deadline_survives_until_finished() {
        let store = ScoutStore::in_memory().await.unwrap();
        let wake = Utc::now() + Duration::minutes(10);

        assert!(store.sleep_deadline("wait-0").await.unwrap().is_none());
        store.set_sleep_deadline("wait-0", wake).await.unwrap();
        let stored = store.sleep_deadline("wait-0").await.unwrap().unwrap();
        assert_eq!(stored.timestamp(), wake.timestamp());

        store.finish_sleep("wait-0").await.unwrap();
        assert!(store.sleep_deadline("wait-0").await.unwrap().is_none());
        assert!(store.sleep_finished("wait-0").await.unwrap());
    }

    #[tokio::test]
    async fn missing_columns_are_added_on_init() {
        // Simulate a store written before the enrichment columns existed.
        let options = SqliteConnectOptions::from_str("sqlite::memory:").unwrap();
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .unwrap();
        sqlx::query(
            r#"
            CREATE TABLE config (
                scout_id TEXT PRIMARY KEY, query TEXT NOT NULL,
                email TEXT NOT NULL, created_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            r#"
            CREATE TABLE events (
                event_id TEXT PRIMARY KEY, source_url TEXT NOT NULL,
                source_label TEXT NOT NULL, summary TEXT NOT NULL DEFAULT '',
                detected_at TEXT NOT NULL, notified INTEGER NOT NULL DEFAULT 0
            );
            "#,
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query("INSERT INTO config (scout_id, query, email, created_at) VALUES ('s', 'q', 'u@e.com', $1)")
            .bind(Utc::now().to_rfc3339())
            .execute(&pool)
            .await
            .unwrap();

        let store = ScoutStore {
            pool,
            max_snapshot_text: DEFAULT_MAX_SNAPSHOT_TEXT,
        };
        store.init_schema().await.unwrap();

        // Old config rows surface with no expiration; new events carry the
        // enrichment columns.
        let config = store.get_config().await.unwrap();
        assert!(config.expires_at.is_none());
        assert!(store.record_event(&sample_event("ev-m")).await.unwrap());
        let events = store.list_events().await.unwrap();
        assert_eq!(events[0].tldr, "RTX 5090 in stock");
    }
}
