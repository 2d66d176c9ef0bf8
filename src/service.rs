use std::sync::{Arc, Mutex, OnceLock};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rand::Rng;
use sqlx::SqlitePool;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::chat::{ChatService, ChatUser, NewUser};
use crate::clock::ParseContext;
use crate::config::Config;
use crate::dispatcher::{DispatchEnv, dispatch_loop};
use crate::lexicon::Catalog;
use crate::models::{Occurrence, Reminder, ReminderRequest, new_id};
use crate::{format, parse, store};

/// The reminder service: bot bootstrap, the schedule/list/delete
/// operations, and start/stop of the dispatch loop. One instance per
/// process; the bot user is set once by `init` and read-only afterwards.
pub struct ReminderService {
    pool: SqlitePool,
    chat: Arc<dyn ChatService>,
    catalog: Arc<Catalog>,
    config: Arc<Config>,
    bot: OnceLock<ChatUser>,
    running: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl ReminderService {
    pub fn new(pool: SqlitePool, chat: Arc<dyn ChatService>, catalog: Arc<Catalog>, config: Arc<Config>) -> Self {
        Self {
            pool,
            chat,
            catalog,
            config,
            bot: OnceLock::new(),
            running: Mutex::new(None),
        }
    }

    /// Ensure the well-known bot user exists and cache it. Creates the
    /// user as admin with a non-login email and a random password when
    /// absent.
    pub async fn init(&self) -> Result<()> {
        if self.bot.get().is_some() {
            return Ok(());
        }

        let username = &self.config.service.bot_username;
        let bot = match self
            .chat
            .get_user_by_username(username)
            .await
            .context("looking up bot user")?
        {
            Some(user) => user,
            None => {
                info!(username = %username, "bot user missing, creating");
                self.chat
                    .create_user_as_admin(NewUser {
                        username: username.clone(),
                        email: "-@-.-".to_string(),
                        password: random_password(),
                    })
                    .await
                    .context("creating bot user")?
            }
        };

        info!(username = %bot.username, id = %bot.id, "reminder bot ready");
        let _ = self.bot.set(bot);
        Ok(())
    }

    /// Launch the dispatch loop. Idempotent while running.
    pub fn start(&self) -> Result<()> {
        let bot = self
            .bot
            .get()
            .context("service not initialized, call init first")?
            .clone();

        let mut running = self.running.lock().expect("running lock");
        if running.is_some() {
            return Ok(());
        }

        let env = DispatchEnv {
            pool: self.pool.clone(),
            chat: self.chat.clone(),
            catalog: self.catalog.clone(),
            default_tz: self.config.default_tz(),
            timezone_aware: self.config.service.timezone_aware,
            bot,
        };
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(dispatch_loop(env, cancel.clone()));
        *running = Some((cancel, handle));
        Ok(())
    }

    /// Cooperative stop: an in-flight tick completes before the loop
    /// exits.
    pub async fn stop(&self) {
        let entry = self.running.lock().expect("running lock").take();
        if let Some((cancel, handle)) = entry {
            cancel.cancel();
            let _ = handle.await;
        }
    }

    pub async fn schedule_reminder(&self, request: &ReminderRequest) -> Result<String> {
        self.schedule_reminder_at(request, Utc::now()).await
    }

    /// Parse and persist a reminder, returning the localized
    /// acknowledgement. Parse and store failures collapse to the localized
    /// exception string; the underlying error only reaches the log.
    pub async fn schedule_reminder_at(&self, request: &ReminderRequest, now: DateTime<Utc>) -> Result<String> {
        let user = self
            .chat
            .get_user(&request.user_id)
            .await
            .context("loading requesting user")?;
        let ctx = self.parse_context(&user, now);
        let lexicon = ctx.lexicon.clone();

        let parsed = match parse::parse(&request.payload, &ctx) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(user = %request.user_id, locale = %lexicon.locale, error = %e, "could not parse reminder payload");
                return Ok(lexicon.render("exception", &[]));
            }
        };

        let reminder = Reminder {
            id: new_id(),
            team_id: request.team_id.clone(),
            user_id: request.user_id.clone(),
            target: parsed.target.clone(),
            message: parsed.message.clone(),
            when_phrase: parsed.when.clone(),
            completed: None,
        };

        if let Err(e) = store::save_reminder(&self.pool, &reminder).await {
            error!(user = %request.user_id, error = %e, "failed to save reminder");
            return Ok(lexicon.render("exception", &[]));
        }

        let mut first_time: Option<DateTime<Utc>> = None;
        for time in &parsed.times {
            first_time.get_or_insert(*time);
            let occurrence = Occurrence {
                id: new_id(),
                user_id: reminder.user_id.clone(),
                reminder_id: reminder.id.clone(),
                repeat: if parsed.repeating { parsed.when.clone() } else { String::new() },
                occurrence: *time,
                snoozed: None,
            };
            if let Err(e) = store::save_occurrence(&self.pool, &occurrence).await {
                error!(reminder = %reminder.id, error = %e, "failed to save occurrence");
                return Ok(lexicon.render("exception", &[]));
            }
        }
        let Some(first_time) = first_time else {
            warn!(user = %request.user_id, "parse produced no occurrences");
            return Ok(lexicon.render("exception", &[]));
        };

        let display_target = if parsed.target == lexicon.me_kw {
            lexicon.you_kw.clone()
        } else {
            parsed.target.clone()
        };
        let use_to = if parsed.message.starts_with(&format!("{} ", lexicon.to_kw)) {
            format!(" {}", lexicon.to_kw)
        } else {
            String::new()
        };
        let when_display = format::format_when(&ctx, &parsed.when, first_time);

        Ok(lexicon.render(
            "response",
            &[
                ("Target", display_target.as_str()),
                ("UseTo", use_to.as_str()),
                ("Message", parsed.message.as_str()),
                ("When", when_display.as_str()),
            ],
        ))
    }

    pub async fn list_reminders(&self, user_id: &str) -> Result<String> {
        self.list_reminders_at(user_id, Utc::now()).await
    }

    pub async fn list_reminders_at(&self, user_id: &str, now: DateTime<Utc>) -> Result<String> {
        let user = self.chat.get_user(user_id).await.context("loading user")?;
        let ctx = self.parse_context(&user, now);

        let reminders = store::get_by_user(&self.pool, user_id)
            .await
            .context("loading reminders")?;

        let mut occurrences = std::collections::HashMap::new();
        for reminder in &reminders {
            let rows = store::get_by_reminder(&self.pool, &reminder.id)
                .await
                .context("loading occurrences")?;
            occurrences.insert(reminder.id.clone(), rows);
        }

        let buckets = format::bucket_occurrences(now, &reminders, |r| {
            occurrences.get(&r.id).cloned().unwrap_or_default()
        });
        Ok(format::render_list(&ctx, &buckets))
    }

    /// Remove all of a user's reminders and occurrences.
    pub async fn delete_reminders(&self, user_id: &str) -> Result<String> {
        let user = self.chat.get_user(user_id).await.context("loading user")?;
        let lexicon = self.catalog.get(&user.locale);

        match store::delete_for_user(&self.pool, user_id).await {
            Ok(deleted) => {
                info!(user = %user_id, deleted, "cleared reminders");
                Ok(lexicon.render("ok_deleted", &[]))
            }
            Err(e) => {
                error!(user = %user_id, error = %e, "failed to delete reminders");
                Ok(lexicon.render("exception", &[]))
            }
        }
    }

    fn parse_context(&self, user: &ChatUser, now: DateTime<Utc>) -> ParseContext {
        ParseContext {
            now,
            tz: user.timezone.parse().unwrap_or_else(|_| self.config.default_tz()),
            timezone_aware: self.config.service.timezone_aware,
            lexicon: self.catalog.get(&user.locale),
        }
    }
}

fn random_password() -> String {
    use rand::distr::Alphanumeric;
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}
