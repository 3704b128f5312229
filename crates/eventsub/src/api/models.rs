//! Helix request and response bodies.

use serde::{Deserialize, Serialize};

use crate::session::SubscriptionType;

/// Envelope used by every Helix list endpoint.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct DataList<T> {
    pub data: Vec<T>,
}

/// Error body returned with non-2xx responses.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// A user from `GET /users`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelixUser {
    pub id: String,
    pub login: String,
    pub display_name: String,
}

/// A live stream from `GET /streams`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelixStream {
    pub id: String,
    pub user_id: String,
    pub user_login: String,
    #[serde(default)]
    pub user_name: String,
    /// `"live"` for a live stream; empty when Twitch reports an error.
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub started_at: Option<String>,
}

impl HelixStream {
    pub fn channel_url(&self) -> String {
        format!("https://twitch.tv/{}", self.user_login)
    }
}

/// Target user, given either as a numeric id or a login name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserRef {
    Id(String),
    /// Always lower-cased.
    Login(String),
}

impl UserRef {
    /// All-digit input is an id; anything else is a login.
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        if !input.is_empty() && input.bytes().all(|b| b.is_ascii_digit()) {
            Self::Id(input.to_string())
        } else {
            Self::Login(input.to_lowercase())
        }
    }

    pub(crate) fn query(&self) -> (&'static str, &str) {
        match self {
            Self::Id(id) => ("id", id),
            Self::Login(login) => ("login", login),
        }
    }
}

impl std::fmt::Display for UserRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id(id) => write!(f, "#{id}"),
            Self::Login(login) => f.write_str(login),
        }
    }
}

/// Body of `POST /eventsub/subscriptions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionRequest {
    #[serde(rename = "type")]
    pub kind: SubscriptionType,
    pub version: String,
    pub condition: SubscriptionCondition,
    pub transport: SubscriptionTransport,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionCondition {
    pub broadcaster_user_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionTransport {
    pub method: String,
    pub session_id: String,
}

impl SubscriptionRequest {
    /// `stream.online` v1 for `broadcaster_user_id`, delivered over the
    /// WebSocket session `session_id`.
    pub fn stream_online(broadcaster_user_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            kind: SubscriptionType::StreamOnline,
            version: "1".to_string(),
            condition: SubscriptionCondition {
                broadcaster_user_id: broadcaster_user_id.into(),
            },
            transport: SubscriptionTransport {
                method: "websocket".to_string(),
                session_id: session_id.into(),
            },
        }
    }
}

/// Subscription entry returned on creation.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CreatedSubscription {
    pub id: String,
    #[serde(default)]
    pub status: String,
}
