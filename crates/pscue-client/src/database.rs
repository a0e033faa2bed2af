//! SQLite persistence.
//!
//! A single-file database holds everything the engine has learned. Saves are
//! additive: each process writes only the usage accumulated since its last
//! successful save, merged with `usage = usage + delta`, `first_seen = min`,
//! `last_used = max` on conflict. That lets concurrent sessions persist
//! without clobbering each other. History is the exception - it is replaced
//! wholesale with the most recent N entries.

use std::path::Path;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::history::HistoryEntry;
use crate::stores::LearningStores;

pub fn to_ms(ts: OffsetDateTime) -> i64 {
    (ts.unix_timestamp_nanos() / 1_000_000) as i64
}

pub fn from_ms(ms: i64) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp_nanos(ms as i128 * 1_000_000)
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

/// Handle to the learned-data database.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if missing) with WAL and the given busy timeout in
    /// seconds, then run migrations.
    pub async fn new(path: impl AsRef<Path>, timeout: f64) -> Result<Self, StoreError> {
        let path = path.as_ref();
        debug!("opening learned-data database at {:?}", path);

        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                fs_err::create_dir_all(dir)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs_f64(timeout))
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new().connect_with(options).await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Persist all deltas and the current history ring in one transaction.
    ///
    /// On success the caller must advance baselines (see
    /// [`Database::save_and_advance`]); on failure in-memory state is
    /// untouched so nothing is lost.
    pub async fn save(&self, stores: &LearningStores) -> Result<(), StoreError> {
        let command_deltas = stores.knowledge.snapshot_deltas();
        let sequence_deltas = stores.sequences.snapshot_deltas();
        let workflow_deltas = stores.workflows.snapshot_deltas();
        let history = stores.history.recent(stores.history.capacity());

        let mut tx = self.pool.begin().await?;

        for delta in &command_deltas {
            sqlx::query(
                "insert into commands(command, total_usage, first_seen, last_used)
                 values (?1, ?2, ?3, ?4)
                 on conflict(command) do update set
                   total_usage = total_usage + excluded.total_usage,
                   first_seen = min(first_seen, excluded.first_seen),
                   last_used = max(last_used, excluded.last_used)",
            )
            .bind(&delta.name)
            .bind(delta.total_delta as i64)
            .bind(to_ms(delta.first_seen))
            .bind(to_ms(delta.last_used))
            .execute(&mut *tx)
            .await?;

            for arg in &delta.arguments {
                sqlx::query(
                    "insert into arguments(command, argument, usage_count, first_seen, last_used, is_flag)
                     values (?1, ?2, ?3, ?4, ?5, ?6)
                     on conflict(command, argument) do update set
                       usage_count = usage_count + excluded.usage_count,
                       first_seen = min(first_seen, excluded.first_seen),
                       last_used = max(last_used, excluded.last_used)",
                )
                .bind(&delta.name)
                .bind(&arg.text)
                .bind(arg.usage_delta as i64)
                .bind(to_ms(arg.first_seen))
                .bind(to_ms(arg.last_used))
                .bind(arg.is_flag)
                .execute(&mut *tx)
                .await?;
            }

            for (argument, other, count) in &delta.co_occurrences {
                sqlx::query(
                    "insert into co_occurrences(command, argument, co_occurred_with, count)
                     values (?1, ?2, ?3, ?4)
                     on conflict(command, argument, co_occurred_with) do update set
                       count = count + excluded.count",
                )
                .bind(&delta.name)
                .bind(argument)
                .bind(other)
                .bind(*count as i64)
                .execute(&mut *tx)
                .await?;
            }

            for (flags, count) in &delta.flag_combinations {
                sqlx::query(
                    "insert into flag_combinations(command, flags, count)
                     values (?1, ?2, ?3)
                     on conflict(command, flags) do update set
                       count = count + excluded.count",
                )
                .bind(&delta.name)
                .bind(flags)
                .bind(*count as i64)
                .execute(&mut *tx)
                .await?;
            }
        }

        for (prev, next, frequency, last_seen) in &sequence_deltas {
            sqlx::query(
                "insert into command_sequences(prev_command, next_command, frequency, last_seen)
                 values (?1, ?2, ?3, ?4)
                 on conflict(prev_command, next_command) do update set
                   frequency = frequency + excluded.frequency,
                   last_seen = max(last_seen, excluded.last_seen)",
            )
            .bind(prev)
            .bind(next)
            .bind(*frequency as i64)
            .bind(to_ms(*last_seen))
            .execute(&mut *tx)
            .await?;
        }

        for delta in &workflow_deltas {
            sqlx::query(
                "insert into workflow_transitions(from_command, to_command, frequency, total_time_delta_ms, first_seen, last_seen)
                 values (?1, ?2, ?3, ?4, ?5, ?6)
                 on conflict(from_command, to_command) do update set
                   frequency = frequency + excluded.frequency,
                   total_time_delta_ms = total_time_delta_ms + excluded.total_time_delta_ms,
                   first_seen = min(first_seen, excluded.first_seen),
                   last_seen = max(last_seen, excluded.last_seen)",
            )
            .bind(&delta.from)
            .bind(&delta.to)
            .bind(delta.frequency as i64)
            .bind(delta.time_delta_ms as i64)
            .bind(to_ms(delta.first_seen))
            .bind(to_ms(delta.last_seen))
            .execute(&mut *tx)
            .await?;
        }

        // History is replace-style: stored rows are always the newest N.
        sqlx::query("delete from command_history")
            .execute(&mut *tx)
            .await?;
        for entry in history.iter().rev() {
            sqlx::query(
                "insert into command_history(command, command_line, arguments, timestamp, success, working_directory)
                 values (?1, ?2, ?3, ?4, ?5, ?6)",
            )
            .bind(&entry.command)
            .bind(&entry.command_line)
            .bind(serde_json::to_string(&entry.arguments)?)
            .bind(to_ms(entry.timestamp))
            .bind(entry.success)
            .bind(&entry.working_directory)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        debug!(
            commands = command_deltas.len(),
            sequences = sequence_deltas.len(),
            workflows = workflow_deltas.len(),
            "saved learned data"
        );
        Ok(())
    }

    /// Save, then advance baselines and clear learner deltas.
    ///
    /// Baselines only move on confirmed success, so a failed save leaves the
    /// deltas intact for the next attempt.
    pub async fn save_and_advance(&self, stores: &LearningStores) -> Result<(), StoreError> {
        self.save(stores).await?;
        stores.knowledge.update_baseline();
        stores.sequences.clear_deltas();
        stores.workflows.clear_deltas();
        Ok(())
    }

    /// Load everything into the given stores.
    ///
    /// Each table is loaded independently: a corrupted table logs a warning
    /// and leaves that component empty without breaking the others.
    pub async fn load(&self, stores: &LearningStores) -> Result<(), StoreError> {
        if let Err(err) = self.load_commands(stores).await {
            warn!("could not load commands: {err}");
        }
        if let Err(err) = self.load_arguments(stores).await {
            warn!("could not load arguments: {err}");
        }
        if let Err(err) = self.load_co_occurrences(stores).await {
            warn!("could not load co-occurrences: {err}");
        }
        if let Err(err) = self.load_flag_combinations(stores).await {
            warn!("could not load flag combinations: {err}");
        }
        if let Err(err) = self.load_history(stores).await {
            warn!("could not load history: {err}");
        }
        if let Err(err) = self.load_sequences(stores).await {
            warn!("could not load command sequences: {err}");
        }
        if let Err(err) = self.load_workflows(stores).await {
            warn!("could not load workflow transitions: {err}");
        }
        Ok(())
    }

    async fn load_commands(&self, stores: &LearningStores) -> Result<(), StoreError> {
        let rows = sqlx::query("select command, total_usage, first_seen, last_used from commands")
            .fetch_all(&self.pool)
            .await?;
        for row in rows {
            stores.knowledge.initialize_command(
                row.get::<String, _>("command").as_str(),
                row.get::<i64, _>("total_usage") as u64,
                from_ms(row.get("first_seen")),
                from_ms(row.get("last_used")),
            );
        }
        Ok(())
    }

    async fn load_arguments(&self, stores: &LearningStores) -> Result<(), StoreError> {
        let rows = sqlx::query(
            "select command, argument, usage_count, first_seen, last_used, is_flag from arguments",
        )
        .fetch_all(&self.pool)
        .await?;
        for row in rows {
            stores.knowledge.initialize_argument(
                row.get::<String, _>("command").as_str(),
                row.get::<String, _>("argument").as_str(),
                row.get::<i64, _>("usage_count") as u64,
                from_ms(row.get("first_seen")),
                from_ms(row.get("last_used")),
                row.get("is_flag"),
            );
        }
        Ok(())
    }

    async fn load_co_occurrences(&self, stores: &LearningStores) -> Result<(), StoreError> {
        let rows =
            sqlx::query("select command, argument, co_occurred_with, count from co_occurrences")
                .fetch_all(&self.pool)
                .await?;
        for row in rows {
            stores.knowledge.initialize_co_occurrence(
                row.get::<String, _>("command").as_str(),
                row.get::<String, _>("argument").as_str(),
                row.get::<String, _>("co_occurred_with").as_str(),
                row.get::<i64, _>("count") as u64,
            );
        }
        Ok(())
    }

    async fn load_flag_combinations(&self, stores: &LearningStores) -> Result<(), StoreError> {
        let rows = sqlx::query("select command, flags, count from flag_combinations")
            .fetch_all(&self.pool)
            .await?;
        for row in rows {
            stores.knowledge.initialize_flag_combination(
                row.get::<String, _>("command").as_str(),
                row.get::<String, _>("flags").as_str(),
                row.get::<i64, _>("count") as u64,
            );
        }
        Ok(())
    }

    async fn load_history(&self, stores: &LearningStores) -> Result<(), StoreError> {
        let rows = sqlx::query(
            "select command, command_line, arguments, timestamp, success, working_directory
             from command_history order by id asc",
        )
        .fetch_all(&self.pool)
        .await?;
        for row in rows {
            let arguments: Vec<String> =
                serde_json::from_str(row.get::<String, _>("arguments").as_str())
                    .unwrap_or_default();
            stores.history.add_entry(
                HistoryEntry::builder()
                    .command(row.get::<String, _>("command"))
                    .command_line(row.get::<String, _>("command_line"))
                    .arguments(arguments)
                    .timestamp(from_ms(row.get("timestamp")))
                    .success(row.get("success"))
                    .working_directory(row.get::<Option<String>, _>("working_directory"))
                    .build(),
            );
        }
        Ok(())
    }

    async fn load_sequences(&self, stores: &LearningStores) -> Result<(), StoreError> {
        let rows = sqlx::query(
            "select prev_command, next_command, frequency, last_seen from command_sequences",
        )
        .fetch_all(&self.pool)
        .await?;
        for row in rows {
            stores.sequences.initialize_transition(
                row.get::<String, _>("prev_command").as_str(),
                row.get::<String, _>("next_command").as_str(),
                row.get::<i64, _>("frequency") as u64,
                from_ms(row.get("last_seen")),
            );
        }
        Ok(())
    }

    async fn load_workflows(&self, stores: &LearningStores) -> Result<(), StoreError> {
        let rows = sqlx::query(
            "select from_command, to_command, frequency, total_time_delta_ms, first_seen, last_seen
             from workflow_transitions",
        )
        .fetch_all(&self.pool)
        .await?;
        for row in rows {
            stores.workflows.initialize_transition(
                row.get::<String, _>("from_command").as_str(),
                row.get::<String, _>("to_command").as_str(),
                row.get::<i64, _>("frequency") as u64,
                row.get::<i64, _>("total_time_delta_ms") as u64,
                from_ms(row.get("first_seen")),
                from_ms(row.get("last_seen")),
            );
        }
        Ok(())
    }

    /// Drop all persisted data. Used by replace-mode import.
    pub async fn clear(&self) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for table in [
            "commands",
            "arguments",
            "co_occurrences",
            "flag_combinations",
            "command_history",
            "command_sequences",
            "workflow_transitions",
        ] {
            sqlx::query(&format!("delete from {table}"))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
