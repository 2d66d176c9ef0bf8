use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::ChatError;

/// The slice of a chat-host user this service cares about.
#[derive(Debug, Clone)]
pub struct ChatUser {
    pub id: String,
    pub username: String,
    pub locale: String,
    pub timezone: String,
}

#[derive(Debug, Clone)]
pub struct Channel {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct Post {
    pub channel_id: String,
    pub user_id: String,
    pub message: String,
    pub pending_post_id: String,
}

/// Collaborator contracts consumed from the chat host. The daemon talks to
/// the host's REST API; tests use an in-memory double.
#[async_trait]
pub trait ChatService: Send + Sync {
    async fn get_user(&self, id: &str) -> Result<ChatUser, ChatError>;
    async fn get_user_by_username(&self, username: &str) -> Result<Option<ChatUser>, ChatError>;
    async fn create_user_as_admin(&self, new: NewUser) -> Result<ChatUser, ChatError>;
    /// The DM channel between two users, created on first use.
    async fn get_direct_channel(&self, user_a: &str, user_b: &str) -> Result<Channel, ChatError>;
    async fn get_channel_by_name(&self, name: &str, team_id: &str) -> Result<Option<Channel>, ChatError>;
    async fn create_post_as_user(&self, post: Post, clear_push_notifications: bool) -> Result<(), ChatError>;
}

/// REST adapter against the chat host (v4-style API, bearer token).
pub struct HttpChatService {
    base_url: String,
    token: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ApiUser {
    id: String,
    username: String,
    #[serde(default)]
    locale: String,
    #[serde(default)]
    timezone: Option<ApiTimezone>,
}

#[derive(Debug, Deserialize)]
struct ApiTimezone {
    #[serde(rename = "manualTimezone", default)]
    manual: String,
    #[serde(rename = "automaticTimezone", default)]
    automatic: String,
}

#[derive(Debug, Deserialize)]
struct ApiChannel {
    id: String,
    #[serde(default)]
    name: String,
}

impl HttpChatService {
    pub fn new(base_url: &str, token: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(&self.token)
    }

    async fn check(path: &str, response: reqwest::Response) -> Result<reqwest::Response, ChatError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(ChatError::Status {
                path: path.to_string(),
                status: response.status().as_u16(),
            })
        }
    }

    fn into_user(api: ApiUser) -> ChatUser {
        let timezone = api
            .timezone
            .map(|tz| if tz.manual.is_empty() { tz.automatic } else { tz.manual })
            .unwrap_or_default();
        ChatUser {
            id: api.id,
            username: api.username,
            locale: api.locale,
            timezone,
        }
    }
}

#[async_trait]
impl ChatService for HttpChatService {
    async fn get_user(&self, id: &str) -> Result<ChatUser, ChatError> {
        let path = format!("/api/v4/users/{id}");
        let response = self
            .request(reqwest::Method::GET, &path)
            .send()
            .await
            .map_err(|e| ChatError::Http { path: path.clone(), source: e })?;
        let response = Self::check(&path, response).await?;
        let api: ApiUser = response
            .json()
            .await
            .map_err(|e| ChatError::Http { path, source: e })?;
        Ok(Self::into_user(api))
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<ChatUser>, ChatError> {
        let path = format!("/api/v4/users/username/{username}");
        let response = self
            .request(reqwest::Method::GET, &path)
            .send()
            .await
            .map_err(|e| ChatError::Http { path: path.clone(), source: e })?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::check(&path, response).await?;
        let api: ApiUser = response
            .json()
            .await
            .map_err(|e| ChatError::Http { path, source: e })?;
        Ok(Some(Self::into_user(api)))
    }

    async fn create_user_as_admin(&self, new: NewUser) -> Result<ChatUser, ChatError> {
        let path = "/api/v4/users".to_string();
        let body = serde_json::json!({
            "username": new.username,
            "email": new.email,
            "password": new.password,
        });
        let response = self
            .request(reqwest::Method::POST, &path)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChatError::Http { path: path.clone(), source: e })?;
        let response = Self::check(&path, response).await?;
        let api: ApiUser = response
            .json()
            .await
            .map_err(|e| ChatError::Http { path, source: e })?;
        debug!(username = %api.username, "created bot user");
        Ok(Self::into_user(api))
    }

    async fn get_direct_channel(&self, user_a: &str, user_b: &str) -> Result<Channel, ChatError> {
        let path = "/api/v4/channels/direct".to_string();
        let response = self
            .request(reqwest::Method::POST, &path)
            .json(&[user_a, user_b])
            .send()
            .await
            .map_err(|e| ChatError::Http { path: path.clone(), source: e })?;
        let response = Self::check(&path, response).await?;
        let api: ApiChannel = response
            .json()
            .await
            .map_err(|e| ChatError::Http { path, source: e })?;
        Ok(Channel { id: api.id, name: api.name })
    }

    async fn get_channel_by_name(&self, name: &str, team_id: &str) -> Result<Option<Channel>, ChatError> {
        let path = format!("/api/v4/teams/{team_id}/channels/name/{name}");
        let response = self
            .request(reqwest::Method::GET, &path)
            .send()
            .await
            .map_err(|e| ChatError::Http { path: path.clone(), source: e })?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::check(&path, response).await?;
        let api: ApiChannel = response
            .json()
            .await
            .map_err(|e| ChatError::Http { path, source: e })?;
        Ok(Some(Channel { id: api.id, name: api.name }))
    }

    async fn create_post_as_user(&self, post: Post, _clear_push_notifications: bool) -> Result<(), ChatError> {
        let path = "/api/v4/posts".to_string();
        let body = serde_json::json!({
            "channel_id": post.channel_id,
            "user_id": post.user_id,
            "message": post.message,
            "pending_post_id": post.pending_post_id,
        });
        let response = self
            .request(reqwest::Method::POST, &path)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChatError::Http { path: path.clone(), source: e })?;
        Self::check(&path, response).await?;
        Ok(())
    }
}

/// Scripted in-memory chat host for tests.
#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;
    use crate::models::new_id;

    #[derive(Default)]
    pub struct MemoryChat {
        users: Mutex<Vec<ChatUser>>,
        channels: Mutex<Vec<(String, Channel)>>,
        posts: Mutex<Vec<Post>>,
    }

    impl MemoryChat {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn add_user(&self, id: &str, username: &str, locale: &str, timezone: &str) -> ChatUser {
            let user = ChatUser {
                id: id.to_string(),
                username: username.to_string(),
                locale: locale.to_string(),
                timezone: timezone.to_string(),
            };
            self.users.lock().unwrap().push(user.clone());
            user
        }

        pub fn add_channel(&self, name: &str, team_id: &str) -> Channel {
            let channel = Channel {
                id: new_id(),
                name: name.to_string(),
            };
            self.channels
                .lock()
                .unwrap()
                .push((format!("{team_id}:{name}"), channel.clone()));
            channel
        }

        pub fn posts(&self) -> Vec<Post> {
            self.posts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatService for MemoryChat {
        async fn get_user(&self, id: &str) -> Result<ChatUser, ChatError> {
            self.users
                .lock()
                .unwrap()
                .iter()
                .find(|u| u.id == id)
                .cloned()
                .ok_or_else(|| ChatError::UserNotFound(id.to_string()))
        }

        async fn get_user_by_username(&self, username: &str) -> Result<Option<ChatUser>, ChatError> {
            Ok(self
                .users
                .lock()
                .unwrap()
                .iter()
                .find(|u| u.username == username)
                .cloned())
        }

        async fn create_user_as_admin(&self, new: NewUser) -> Result<ChatUser, ChatError> {
            let user = ChatUser {
                id: new_id(),
                username: new.username,
                locale: String::new(),
                timezone: String::new(),
            };
            self.users.lock().unwrap().push(user.clone());
            Ok(user)
        }

        async fn get_direct_channel(&self, user_a: &str, user_b: &str) -> Result<Channel, ChatError> {
            let mut pair = [user_a, user_b];
            pair.sort_unstable();
            let key = format!("dm:{}:{}", pair[0], pair[1]);
            let mut channels = self.channels.lock().unwrap();
            if let Some((_, channel)) = channels.iter().find(|(k, _)| *k == key) {
                return Ok(channel.clone());
            }
            let channel = Channel {
                id: new_id(),
                name: key.clone(),
            };
            channels.push((key, channel.clone()));
            Ok(channel)
        }

        async fn get_channel_by_name(&self, name: &str, team_id: &str) -> Result<Option<Channel>, ChatError> {
            let key = format!("{team_id}:{name}");
            Ok(self
                .channels
                .lock()
                .unwrap()
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, c)| c.clone()))
        }

        async fn create_post_as_user(&self, post: Post, _clear_push_notifications: bool) -> Result<(), ChatError> {
            self.posts.lock().unwrap().push(post);
            Ok(())
        }
    }
}
