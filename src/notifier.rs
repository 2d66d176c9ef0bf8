use chrono::Utc;
use tracing::debug;

use crate::chat::{ChatService, ChatUser, Post};
use crate::error::ChatError;
use crate::lexicon::Lexicon;
use crate::models::{Reminder, new_id};

/// Resolve a reminder's target to a destination channel and post the
/// reminder message as the bot user.
///
/// `me` goes to the author's DM with the bot; `@user` to the named user's
/// DM with the bot; `~channel` to the named channel within the reminder's
/// team.
pub async fn deliver(
    chat: &dyn ChatService,
    lexicon: &Lexicon,
    bot: &ChatUser,
    author: &ChatUser,
    reminder: &Reminder,
) -> Result<(), ChatError> {
    let (channel, final_target) = if reminder.target == lexicon.me_kw {
        let channel = chat.get_direct_channel(&bot.id, &author.id).await?;
        (channel, lexicon.you_kw.clone())
    } else if let Some(username) = reminder.target.strip_prefix('@') {
        let recipient = chat
            .get_user_by_username(username)
            .await?
            .ok_or_else(|| ChatError::UserNotFound(username.to_string()))?;
        let channel = chat.get_direct_channel(&bot.id, &recipient.id).await?;
        (channel, format!("@{}", recipient.username))
    } else if let Some(name) = reminder.target.strip_prefix('~') {
        let channel = chat
            .get_channel_by_name(name, &reminder.team_id)
            .await?
            .ok_or_else(|| ChatError::ChannelNotFound(name.to_string()))?;
        (channel, format!("@{}", author.username))
    } else {
        return Err(ChatError::ChannelNotFound(reminder.target.clone()));
    };

    let message = lexicon.render(
        "message",
        &[("FinalTarget", final_target.as_str()), ("Message", &reminder.message)],
    );

    let post = Post {
        channel_id: channel.id,
        user_id: bot.id.clone(),
        message,
        pending_post_id: format!("{}:{}", new_id(), Utc::now().timestamp_millis()),
    };

    chat.create_post_as_user(post, true).await?;
    debug!(reminder = %reminder.id, target = %reminder.target, channel = %channel.name, "delivered reminder");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::testing::MemoryChat;
    use crate::lexicon::Catalog;

    fn lexicon() -> std::sync::Arc<Lexicon> {
        Catalog::builtin("en").unwrap().get("en")
    }

    fn reminder(target: &str) -> Reminder {
        Reminder {
            id: new_id(),
            team_id: "team-1".into(),
            user_id: "author-1".into(),
            target: target.into(),
            message: "standup".into(),
            when_phrase: "in 5 minutes".into(),
            completed: None,
        }
    }

    #[tokio::test]
    async fn me_target_posts_to_author_dm_as_you() {
        let chat = MemoryChat::new();
        let bot = chat.add_user("bot-1", "remindbot", "", "");
        let author = chat.add_user("author-1", "casey", "en", "UTC");

        deliver(&chat, &lexicon(), &bot, &author, &reminder("me")).await.unwrap();

        let posts = chat.posts();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].user_id, "bot-1");
        assert_eq!(posts[0].message, "you standup");
        assert!(posts[0].pending_post_id.contains(':'));
    }

    #[tokio::test]
    async fn at_target_resolves_the_named_user() {
        let chat = MemoryChat::new();
        let bot = chat.add_user("bot-1", "remindbot", "", "");
        let author = chat.add_user("author-1", "casey", "en", "UTC");
        chat.add_user("alex-1", "alex", "en", "UTC");

        deliver(&chat, &lexicon(), &bot, &author, &reminder("@alex")).await.unwrap();

        let posts = chat.posts();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].message, "@alex standup");
        // The DM is between the bot and alex, not the author.
        let dm = chat.get_direct_channel("bot-1", "alex-1").await.unwrap();
        assert_eq!(posts[0].channel_id, dm.id);
    }

    #[tokio::test]
    async fn unknown_at_target_is_an_error() {
        let chat = MemoryChat::new();
        let bot = chat.add_user("bot-1", "remindbot", "", "");
        let author = chat.add_user("author-1", "casey", "en", "UTC");

        let err = deliver(&chat, &lexicon(), &bot, &author, &reminder("@ghost"))
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::UserNotFound(_)));
        assert!(chat.posts().is_empty());
    }

    #[tokio::test]
    async fn channel_target_posts_into_the_team_channel() {
        let chat = MemoryChat::new();
        let bot = chat.add_user("bot-1", "remindbot", "", "");
        let author = chat.add_user("author-1", "casey", "en", "UTC");
        let general = chat.add_channel("general", "team-1");

        deliver(&chat, &lexicon(), &bot, &author, &reminder("~general")).await.unwrap();

        let posts = chat.posts();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].channel_id, general.id);
        assert_eq!(posts[0].message, "@casey standup");
    }

    #[tokio::test]
    async fn missing_channel_is_an_error() {
        let chat = MemoryChat::new();
        let bot = chat.add_user("bot-1", "remindbot", "", "");
        let author = chat.add_user("author-1", "casey", "en", "UTC");

        let err = deliver(&chat, &lexicon(), &bot, &author, &reminder("~nowhere"))
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::ChannelNotFound(_)));
    }
}
