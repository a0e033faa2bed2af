//! JSON snapshot import/export.
//!
//! Full-database snapshots for migration between machines or stores. All
//! timestamps are RFC-3339 UTC. Import can either merge additively into the
//! existing data or replace it outright.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sqlx::Row;
use time::OffsetDateTime;

use crate::database::{Database, from_ms, to_ms};
use crate::error::StoreError;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ImportMode {
    /// Add the snapshot's counts on top of existing data.
    Merge,
    /// Clear existing data first.
    Replace,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Snapshot {
    pub commands: Vec<SnapshotCommand>,
    pub history: Vec<SnapshotHistoryEntry>,
    pub sequences: Vec<SnapshotSequence>,
    pub workflows: Vec<SnapshotWorkflow>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SnapshotCommand {
    pub command: String,
    pub total_usage: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub first_seen: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_used: OffsetDateTime,
    pub arguments: Vec<SnapshotArgument>,
    #[serde(default)]
    pub flag_combinations: HashMap<String, u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SnapshotArgument {
    pub argument: String,
    pub usage_count: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub first_seen: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_used: OffsetDateTime,
    pub is_flag: bool,
    #[serde(default)]
    pub co_occurrences: HashMap<String, u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SnapshotHistoryEntry {
    pub command: String,
    pub command_line: String,
    #[serde(default)]
    pub arguments: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub success: bool,
    #[serde(default)]
    pub working_directory: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SnapshotSequence {
    pub prev_command: String,
    pub next_command: String,
    pub frequency: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub last_seen: OffsetDateTime,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SnapshotWorkflow {
    pub from_command: String,
    pub to_command: String,
    pub frequency: u64,
    pub total_time_delta_ms: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub first_seen: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_seen: OffsetDateTime,
}

impl Database {
    /// Read the entire store into a snapshot.
    pub async fn export_snapshot(&self) -> Result<Snapshot, StoreError> {
        let pool = self.pool();

        let mut arguments_by_command: HashMap<String, Vec<SnapshotArgument>> = HashMap::new();
        let rows = sqlx::query(
            "select command, argument, usage_count, first_seen, last_used, is_flag from arguments",
        )
        .fetch_all(pool)
        .await?;
        for row in rows {
            arguments_by_command
                .entry(row.get("command"))
                .or_default()
                .push(SnapshotArgument {
                    argument: row.get("argument"),
                    usage_count: row.get::<i64, _>("usage_count") as u64,
                    first_seen: from_ms(row.get("first_seen")),
                    last_used: from_ms(row.get("last_used")),
                    is_flag: row.get("is_flag"),
                    co_occurrences: HashMap::new(),
                });
        }

        let rows =
            sqlx::query("select command, argument, co_occurred_with, count from co_occurrences")
                .fetch_all(pool)
                .await?;
        for row in rows {
            let command: String = row.get("command");
            let argument: String = row.get("argument");
            if let Some(args) = arguments_by_command.get_mut(&command) {
                if let Some(arg) = args.iter_mut().find(|a| a.argument == argument) {
                    arg.co_occurrences.insert(
                        row.get("co_occurred_with"),
                        row.get::<i64, _>("count") as u64,
                    );
                }
            }
        }

        let mut flags_by_command: HashMap<String, HashMap<String, u64>> = HashMap::new();
        let rows = sqlx::query("select command, flags, count from flag_combinations")
            .fetch_all(pool)
            .await?;
        for row in rows {
            flags_by_command
                .entry(row.get("command"))
                .or_default()
                .insert(row.get("flags"), row.get::<i64, _>("count") as u64);
        }

        let rows = sqlx::query("select command, total_usage, first_seen, last_used from commands")
            .fetch_all(pool)
            .await?;
        let commands = rows
            .into_iter()
            .map(|row| {
                let command: String = row.get("command");
                SnapshotCommand {
                    total_usage: row.get::<i64, _>("total_usage") as u64,
                    first_seen: from_ms(row.get("first_seen")),
                    last_used: from_ms(row.get("last_used")),
                    arguments: arguments_by_command.remove(&command).unwrap_or_default(),
                    flag_combinations: flags_by_command.remove(&command).unwrap_or_default(),
                    command,
                }
            })
            .collect();

        let rows = sqlx::query(
            "select command, command_line, arguments, timestamp, success, working_directory
             from command_history order by id asc",
        )
        .fetch_all(pool)
        .await?;
        let history = rows
            .into_iter()
            .map(|row| SnapshotHistoryEntry {
                command: row.get("command"),
                command_line: row.get("command_line"),
                arguments: serde_json::from_str(row.get::<String, _>("arguments").as_str())
                    .unwrap_or_default(),
                timestamp: from_ms(row.get("timestamp")),
                success: row.get("success"),
                working_directory: row.get("working_directory"),
            })
            .collect();

        let rows = sqlx::query(
            "select prev_command, next_command, frequency, last_seen from command_sequences",
        )
        .fetch_all(pool)
        .await?;
        let sequences = rows
            .into_iter()
            .map(|row| SnapshotSequence {
                prev_command: row.get("prev_command"),
                next_command: row.get("next_command"),
                frequency: row.get::<i64, _>("frequency") as u64,
                last_seen: from_ms(row.get("last_seen")),
            })
            .collect();

        let rows = sqlx::query(
            "select from_command, to_command, frequency, total_time_delta_ms, first_seen, last_seen
             from workflow_transitions",
        )
        .fetch_all(pool)
        .await?;
        let workflows = rows
            .into_iter()
            .map(|row| SnapshotWorkflow {
                from_command: row.get("from_command"),
                to_command: row.get("to_command"),
                frequency: row.get::<i64, _>("frequency") as u64,
                total_time_delta_ms: row.get::<i64, _>("total_time_delta_ms") as u64,
                first_seen: from_ms(row.get("first_seen")),
                last_seen: from_ms(row.get("last_seen")),
            })
            .collect();

        Ok(Snapshot {
            commands,
            history,
            sequences,
            workflows,
        })
    }

    /// Write a snapshot into the store.
    pub async fn import_snapshot(
        &self,
        snapshot: &Snapshot,
        mode: ImportMode,
    ) -> Result<(), StoreError> {
        if mode == ImportMode::Replace {
            self.clear().await?;
        }

        let mut tx = self.pool().begin().await?;

        for command in &snapshot.commands {
            sqlx::query(
                "insert into commands(command, total_usage, first_seen, last_used)
                 values (?1, ?2, ?3, ?4)
                 on conflict(command) do update set
                   total_usage = total_usage + excluded.total_usage,
                   first_seen = min(first_seen, excluded.first_seen),
                   last_used = max(last_used, excluded.last_used)",
            )
            .bind(&command.command)
            .bind(command.total_usage as i64)
            .bind(to_ms(command.first_seen))
            .bind(to_ms(command.last_used))
            .execute(&mut *tx)
            .await?;

            for arg in &command.arguments {
                sqlx::query(
                    "insert into arguments(command, argument, usage_count, first_seen, last_used, is_flag)
                     values (?1, ?2, ?3, ?4, ?5, ?6)
                     on conflict(command, argument) do update set
                       usage_count = usage_count + excluded.usage_count,
                       first_seen = min(first_seen, excluded.first_seen),
                       last_used = max(last_used, excluded.last_used)",
                )
                .bind(&command.command)
                .bind(&arg.argument)
                .bind(arg.usage_count as i64)
                .bind(to_ms(arg.first_seen))
                .bind(to_ms(arg.last_used))
                .bind(arg.is_flag)
                .execute(&mut *tx)
                .await?;

                for (other, count) in &arg.co_occurrences {
                    sqlx::query(
                        "insert into co_occurrences(command, argument, co_occurred_with, count)
                         values (?1, ?2, ?3, ?4)
                         on conflict(command, argument, co_occurred_with) do update set
                           count = count + excluded.count",
                    )
                    .bind(&command.command)
                    .bind(&arg.argument)
                    .bind(other)
                    .bind(*count as i64)
                    .execute(&mut *tx)
                    .await?;
                }
            }

            for (flags, count) in &command.flag_combinations {
                sqlx::query(
                    "insert into flag_combinations(command, flags, count)
                     values (?1, ?2, ?3)
                     on conflict(command, flags) do update set
                       count = count + excluded.count",
                )
                .bind(&command.command)
                .bind(flags)
                .bind(*count as i64)
                .execute(&mut *tx)
                .await?;
            }
        }

        if mode == ImportMode::Replace || !snapshot.history.is_empty() {
            sqlx::query("delete from command_history")
                .execute(&mut *tx)
                .await?;
            for entry in &snapshot.history {
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
        }

        for sequence in &snapshot.sequences {
            sqlx::query(
                "insert into command_sequences(prev_command, next_command, frequency, last_seen)
                 values (?1, ?2, ?3, ?4)
                 on conflict(prev_command, next_command) do update set
                   frequency = frequency + excluded.frequency,
                   last_seen = max(last_seen, excluded.last_seen)",
            )
            .bind(&sequence.prev_command)
            .bind(&sequence.next_command)
            .bind(sequence.frequency as i64)
            .bind(to_ms(sequence.last_seen))
            .execute(&mut *tx)
            .await?;
        }

        for workflow in &snapshot.workflows {
            sqlx::query(
                "insert into workflow_transitions(from_command, to_command, frequency, total_time_delta_ms, first_seen, last_seen)
                 values (?1, ?2, ?3, ?4, ?5, ?6)
                 on conflict(from_command, to_command) do update set
                   frequency = frequency + excluded.frequency,
                   total_time_delta_ms = total_time_delta_ms + excluded.total_time_delta_ms,
                   first_seen = min(first_seen, excluded.first_seen),
                   last_seen = max(last_seen, excluded.last_seen)",
            )
            .bind(&workflow.from_command)
            .bind(&workflow.to_command)
            .bind(workflow.frequency as i64)
            .bind(workflow.total_time_delta_ms as i64)
            .bind(to_ms(workflow.first_seen))
            .bind(to_ms(workflow.last_seen))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
