use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::models::{Occurrence, OccurrenceRow, Reminder, ReminderRow, format_ts, never_if_unset};

const REMINDER_COLUMNS: &str = "id, team_id, user_id, target, message, when_phrase, completed";
const OCCURRENCE_COLUMNS: &str = "id, user_id, reminder_id, repeat, occurrence, snoozed";

pub async fn save_reminder(pool: &SqlitePool, reminder: &Reminder) -> Result<()> {
    sqlx::query(
        "INSERT INTO reminders (id, team_id, user_id, target, message, when_phrase, completed)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&reminder.id)
    .bind(&reminder.team_id)
    .bind(&reminder.user_id)
    .bind(&reminder.target)
    .bind(&reminder.message)
    .bind(&reminder.when_phrase)
    .bind(format_ts(never_if_unset(reminder.completed)))
    .execute(pool)
    .await
    .context("inserting reminder")?;

    debug!(id = %reminder.id, user = %reminder.user_id, "saved reminder");
    Ok(())
}

pub async fn save_occurrence(pool: &SqlitePool, occurrence: &Occurrence) -> Result<()> {
    sqlx::query(
        "INSERT INTO occurrences (id, user_id, reminder_id, repeat, occurrence, snoozed)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&occurrence.id)
    .bind(&occurrence.user_id)
    .bind(&occurrence.reminder_id)
    .bind(&occurrence.repeat)
    .bind(format_ts(occurrence.occurrence))
    .bind(format_ts(never_if_unset(occurrence.snoozed)))
    .execute(pool)
    .await
    .context("inserting occurrence")?;

    debug!(id = %occurrence.id, at = %format_ts(occurrence.occurrence), "saved occurrence");
    Ok(())
}

pub async fn get_reminder(pool: &SqlitePool, id: &str) -> Result<Option<Reminder>> {
    let row = sqlx::query_as::<_, ReminderRow>(&format!(
        "SELECT {REMINDER_COLUMNS} FROM reminders WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("querying reminder by id")?;

    Ok(row.map(ReminderRow::into_reminder))
}

/// Occurrences due at exactly `t` (second-aligned), including those whose
/// snooze expires at `t`.
pub async fn get_by_time(pool: &SqlitePool, t: DateTime<Utc>) -> Result<Vec<Occurrence>> {
    let stamp = format_ts(t);
    let rows = sqlx::query_as::<_, OccurrenceRow>(&format!(
        "SELECT {OCCURRENCE_COLUMNS} FROM occurrences WHERE occurrence = ? OR snoozed = ?"
    ))
    .bind(&stamp)
    .bind(&stamp)
    .fetch_all(pool)
    .await
    .context("querying occurrences by fire time")?;

    Ok(rows.into_iter().map(OccurrenceRow::into_occurrence).collect())
}

pub async fn get_by_reminder(pool: &SqlitePool, reminder_id: &str) -> Result<Vec<Occurrence>> {
    let rows = sqlx::query_as::<_, OccurrenceRow>(&format!(
        "SELECT {OCCURRENCE_COLUMNS} FROM occurrences WHERE reminder_id = ? ORDER BY occurrence ASC"
    ))
    .bind(reminder_id)
    .fetch_all(pool)
    .await
    .context("querying occurrences by reminder")?;

    Ok(rows.into_iter().map(OccurrenceRow::into_occurrence).collect())
}

/// All of a user's reminders, ordered by id. Ids sort in creation order,
/// which makes listings deterministic.
pub async fn get_by_user(pool: &SqlitePool, user_id: &str) -> Result<Vec<Reminder>> {
    let rows = sqlx::query_as::<_, ReminderRow>(&format!(
        "SELECT {REMINDER_COLUMNS} FROM reminders WHERE user_id = ? ORDER BY id ASC"
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await
    .context("querying reminders by user")?;

    Ok(rows.into_iter().map(ReminderRow::into_reminder).collect())
}

/// Move a recurring occurrence to its next fire instant, clearing any
/// expired snooze.
pub async fn update_occurrence_time(pool: &SqlitePool, id: &str, next: DateTime<Utc>) -> Result<()> {
    sqlx::query("UPDATE occurrences SET occurrence = ?, snoozed = ? WHERE id = ?")
        .bind(format_ts(next))
        .bind(format_ts(crate::models::never()))
        .bind(id)
        .execute(pool)
        .await
        .context("updating occurrence fire time")?;

    debug!(id = %id, next = %format_ts(next), "advanced occurrence");
    Ok(())
}

pub async fn delete_occurrence(pool: &SqlitePool, id: &str) -> Result<()> {
    sqlx::query("DELETE FROM occurrences WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("deleting occurrence")?;
    Ok(())
}

/// Remove all of a user's reminders; occurrences go with them via the
/// foreign-key cascade.
pub async fn delete_for_user(pool: &SqlitePool, user_id: &str) -> Result<u64> {
    let result = sqlx::query("DELETE FROM reminders WHERE user_id = ?")
        .bind(user_id)
        .execute(pool)
        .await
        .context("deleting reminders for user")?;

    debug!(user = %user_id, deleted = result.rows_affected(), "deleted reminders");
    Ok(result.rows_affected())
}
