use std::sync::Arc;

use chrono::{DateTime, Datelike, Timelike, Utc};
use chrono_tz::Tz;
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::chat::{ChatService, ChatUser};
use crate::clock::ParseContext;
use crate::lexicon::Catalog;
use crate::models::Occurrence;
use crate::{notifier, parse, store};

/// Everything a tick needs; bundled so the loop and tests share one setup.
pub struct DispatchEnv {
    pub pool: SqlitePool,
    pub chat: Arc<dyn ChatService>,
    pub catalog: Arc<Catalog>,
    pub default_tz: Tz,
    pub timezone_aware: bool,
    pub bot: ChatUser,
}

/// Tick once per second, draining occurrences whose fire instant matches
/// the current second. Missed seconds are not replayed.
pub async fn dispatch_loop(env: DispatchEnv, cancel: CancellationToken) {
    info!("reminder dispatcher started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("reminder dispatcher shutting down");
                return;
            }
            _ = tokio::time::sleep(std::time::Duration::from_secs(1)) => {}
        }

        tick(&env, Utc::now()).await;
    }
}

/// One dispatch pass. Every per-occurrence failure is logged and skipped;
/// a single bad occurrence must not abort the tick.
pub async fn tick(env: &DispatchEnv, now: DateTime<Utc>) {
    let t = now.with_nanosecond(0).unwrap_or(now);

    let due = match store::get_by_time(&env.pool, t).await {
        Ok(due) => due,
        Err(e) => {
            error!(error = %e, "failed to load due occurrences");
            return;
        }
    };
    if due.is_empty() {
        return;
    }
    debug!(count = due.len(), at = %t, "dispatching due occurrences");

    for occurrence in due {
        // Snooze is a "fire no earlier than" hint.
        if occurrence.snoozed.is_some_and(|s| s > t) {
            continue;
        }

        let reminder = match store::get_reminder(&env.pool, &occurrence.reminder_id).await {
            Ok(Some(r)) => r,
            Ok(None) => {
                warn!(occurrence = %occurrence.id, "occurrence without reminder, skipping");
                continue;
            }
            Err(e) => {
                error!(occurrence = %occurrence.id, error = %e, "failed to load reminder");
                continue;
            }
        };

        let author = match env.chat.get_user(&reminder.user_id).await {
            Ok(user) => user,
            Err(e) => {
                error!(reminder = %reminder.id, error = %e, "failed to load reminder author");
                continue;
            }
        };

        let lexicon = env.catalog.get(&author.locale);
        let tz: Tz = author.timezone.parse().unwrap_or(env.default_tz);
        let ctx = ParseContext {
            now: t,
            tz,
            timezone_aware: env.timezone_aware,
            lexicon: lexicon.clone(),
        };

        if let Err(e) = notifier::deliver(env.chat.as_ref(), &lexicon, &env.bot, &author, &reminder).await {
            error!(reminder = %reminder.id, error = %e, "failed to deliver reminder");
        }

        if !occurrence.repeat.is_empty() {
            advance_recurring(env, &ctx, &occurrence, t).await;
        }
    }
}

/// Re-materialize a recurring occurrence's phrase with "now" at the fire
/// instant and move the row to its successor; a phrase with no future
/// instant retires the row.
async fn advance_recurring(env: &DispatchEnv, ctx: &ParseContext, occurrence: &Occurrence, t: DateTime<Utc>) {
    let times = match parse::materialize_when(&occurrence.repeat, ctx) {
        Ok((times, _)) => times,
        Err(e) => {
            warn!(occurrence = %occurrence.id, repeat = %occurrence.repeat, error = %e,
                "could not re-materialize repeat phrase");
            return;
        }
    };

    // A multi-day phrase yields one candidate per day; this occurrence
    // follows the day it just fired on.
    let tz = ctx.effective_tz();
    let fired_weekday = t.with_timezone(&tz).weekday();
    let future: Vec<DateTime<Utc>> = times.into_iter().filter(|c| *c > t).collect();
    let next = future
        .iter()
        .copied()
        .find(|c| c.with_timezone(&tz).weekday() == fired_weekday)
        .or_else(|| future.iter().copied().min());

    match next {
        Some(next) => {
            if let Err(e) = store::update_occurrence_time(&env.pool, &occurrence.id, next).await {
                error!(occurrence = %occurrence.id, error = %e, "failed to advance recurring occurrence");
            }
        }
        None => {
            debug!(occurrence = %occurrence.id, repeat = %occurrence.repeat, "repeat exhausted, removing");
            if let Err(e) = store::delete_occurrence(&env.pool, &occurrence.id).await {
                error!(occurrence = %occurrence.id, error = %e, "failed to remove exhausted occurrence");
            }
        }
    }
}
