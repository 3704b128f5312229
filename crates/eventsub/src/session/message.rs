//! Inbound EventSub WebSocket messages.

use std::fmt;

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::error::{Error, Result};

/// Subscription types this client understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubscriptionType {
    #[serde(rename = "stream.online")]
    StreamOnline,
}

impl SubscriptionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StreamOnline => "stream.online",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "stream.online" => Some(Self::StreamOnline),
            _ => None,
        }
    }
}

impl fmt::Display for SubscriptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `metadata` object shared by every message.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MessageMetadata {
    pub message_id: String,
    pub message_type: String,
    #[serde(default)]
    pub message_timestamp: String,
    #[serde(default)]
    pub subscription_type: Option<String>,
    #[serde(default)]
    pub subscription_version: Option<String>,
}

/// Session object of a `session_welcome` payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WelcomeSession {
    pub id: String,
    #[serde(default)]
    pub status: String,
    pub keepalive_timeout_seconds: u64,
    #[serde(default)]
    pub connected_at: Option<String>,
}

/// Session object of a `session_reconnect` payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReconnectSession {
    pub id: String,
    #[serde(default)]
    pub status: String,
    pub reconnect_url: String,
    #[serde(default)]
    pub connected_at: Option<String>,
}

/// Subscription object attached to notifications and revocations.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SubscriptionInfo {
    pub id: String,
    /// `enabled` for notifications; the revocation reason for revocations.
    pub status: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub condition: Value,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// `stream.online` event body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamOnlineEvent {
    #[serde(default)]
    pub id: String,
    pub broadcaster_user_id: String,
    pub broadcaster_user_login: String,
    #[serde(default)]
    pub broadcaster_user_name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub started_at: Option<String>,
}

impl StreamOnlineEvent {
    pub fn channel_url(&self) -> String {
        format!("https://twitch.tv/{}", self.broadcaster_user_login)
    }
}

/// Event carried by a notification, keyed by subscription type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationEvent {
    StreamOnline(StreamOnlineEvent),
}

impl NotificationEvent {
    pub fn subscription_type(&self) -> SubscriptionType {
        match self {
            Self::StreamOnline(_) => SubscriptionType::StreamOnline,
        }
    }
}

/// Why a subscription was revoked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevocationReason {
    AuthorizationRevoked,
    UserRemoved,
    VersionRemoved,
    Other(String),
}

impl RevocationReason {
    pub fn from_status(status: &str) -> Self {
        match status {
            "authorization_revoked" => Self::AuthorizationRevoked,
            "user_removed" => Self::UserRemoved,
            "version_removed" => Self::VersionRemoved,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for RevocationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AuthorizationRevoked => f.write_str("Authorization to the app was revoked."),
            Self::UserRemoved => {
                f.write_str("The user we were waiting to go live no longer exists.")
            }
            Self::VersionRemoved => f.write_str(
                "The version of the subscription is no longer available; the program needs updating.",
            ),
            Self::Other(status) => write!(f, "Unrecognized revocation status \"{status}\"."),
        }
    }
}

/// A classified inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventSubMessage {
    Welcome {
        metadata: MessageMetadata,
        session: WelcomeSession,
    },
    Keepalive {
        metadata: MessageMetadata,
    },
    Reconnect {
        metadata: MessageMetadata,
        session: ReconnectSession,
    },
    Notification {
        metadata: MessageMetadata,
        subscription: SubscriptionInfo,
        event: NotificationEvent,
    },
    Revocation {
        metadata: MessageMetadata,
        subscription_type: SubscriptionType,
        subscription: SubscriptionInfo,
    },
}

#[derive(Deserialize)]
struct Envelope {
    metadata: MessageMetadata,
    #[serde(default)]
    payload: Value,
}

#[derive(Deserialize)]
struct SessionPayload<S> {
    session: S,
}

#[derive(Deserialize)]
struct NotificationPayload<E> {
    subscription: SubscriptionInfo,
    event: E,
}

#[derive(Deserialize)]
struct RevocationPayload {
    subscription: SubscriptionInfo,
}

impl EventSubMessage {
    /// Classify a text frame.
    ///
    /// Anything that is not one of the known (message type, subscription
    /// type) pairs, or whose payload does not match that pair, is a
    /// [`Error::ProtocolViolation`].
    pub fn parse(text: &str) -> Result<Self> {
        let envelope: Envelope = serde_json::from_str(text)
            .map_err(|e| Error::protocol(format!("malformed message: {e}")))?;
        let Envelope { metadata, payload } = envelope;

        match metadata.message_type.as_str() {
            "session_welcome" => {
                let SessionPayload { session } = payload_as(&metadata, payload)?;
                Ok(Self::Welcome { metadata, session })
            }
            "session_keepalive" => Ok(Self::Keepalive { metadata }),
            "session_reconnect" => {
                let SessionPayload { session } = payload_as(&metadata, payload)?;
                Ok(Self::Reconnect { metadata, session })
            }
            "notification" => match subscription_type_of(&metadata)? {
                SubscriptionType::StreamOnline => {
                    let NotificationPayload {
                        subscription,
                        event,
                    } = payload_as(&metadata, payload)?;
                    Ok(Self::Notification {
                        metadata,
                        subscription,
                        event: NotificationEvent::StreamOnline(event),
                    })
                }
            },
            "revocation" => {
                let subscription_type = subscription_type_of(&metadata)?;
                let RevocationPayload { subscription } = payload_as(&metadata, payload)?;
                Ok(Self::Revocation {
                    metadata,
                    subscription_type,
                    subscription,
                })
            }
            other => Err(Error::protocol(format!("unknown message type \"{other}\""))),
        }
    }

    pub fn metadata(&self) -> &MessageMetadata {
        match self {
            Self::Welcome { metadata, .. }
            | Self::Keepalive { metadata }
            | Self::Reconnect { metadata, .. }
            | Self::Notification { metadata, .. }
            | Self::Revocation { metadata, .. } => metadata,
        }
    }

    pub fn message_id(&self) -> &str {
        &self.metadata().message_id
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Welcome { .. } => "session_welcome",
            Self::Keepalive { .. } => "session_keepalive",
            Self::Reconnect { .. } => "session_reconnect",
            Self::Notification { .. } => "notification",
            Self::Revocation { .. } => "revocation",
        }
    }
}

fn subscription_type_of(metadata: &MessageMetadata) -> Result<SubscriptionType> {
    let name = metadata.subscription_type.as_deref().ok_or_else(|| {
        Error::protocol(format!(
            "{} message without a subscription type",
            metadata.message_type
        ))
    })?;
    SubscriptionType::from_name(name).ok_or_else(|| {
        Error::protocol(format!(
            "{} for unsupported subscription type \"{name}\"",
            metadata.message_type
        ))
    })
}

fn payload_as<T: DeserializeOwned>(metadata: &MessageMetadata, payload: Value) -> Result<T> {
    serde_json::from_value(payload).map_err(|e| {
        Error::protocol(format!(
            "invalid {} payload: {e}",
            metadata.message_type
        ))
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn raw(value: Value) -> String {
        value.to_string()
    }

    #[test]
    fn test_parse_welcome() {
        let message = EventSubMessage::parse(&raw(json!({
            "metadata": {
                "message_id": "96a3f3b5-5dec-4eed-908e-e11ee657416c",
                "message_type": "session_welcome",
                "message_timestamp": "2023-07-19T14:56:51.634234626Z"
            },
            "payload": {
                "session": {
                    "id": "AQoQILE98gtqShGmLD7AM6yJThAB",
                    "status": "connected",
                    "connected_at": "2023-07-19T14:56:51.616329898Z",
                    "keepalive_timeout_seconds": 10,
                    "reconnect_url": null
                }
            }
        })))
        .unwrap();

        match message {
            EventSubMessage::Welcome { session, .. } => {
                assert_eq!(session.id, "AQoQILE98gtqShGmLD7AM6yJThAB");
                assert_eq!(session.keepalive_timeout_seconds, 10);
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn test_parse_keepalive_without_payload_fields() {
        let message = EventSubMessage::parse(&raw(json!({
            "metadata": {
                "message_id": "k1",
                "message_type": "session_keepalive",
                "message_timestamp": "2023-07-19T10:11:12.634234626Z"
            },
            "payload": {}
        })))
        .unwrap();
        assert_eq!(message.kind(), "session_keepalive");
        assert_eq!(message.message_id(), "k1");
    }

    #[test]
    fn test_parse_stream_online_notification() {
        let message = EventSubMessage::parse(&raw(json!({
            "metadata": {
                "message_id": "n1",
                "message_type": "notification",
                "message_timestamp": "2023-07-19T10:11:12.634234626Z",
                "subscription_type": "stream.online",
                "subscription_version": "1"
            },
            "payload": {
                "subscription": {
                    "id": "sub-1",
                    "status": "enabled",
                    "type": "stream.online",
                    "version": "1",
                    "cost": 0,
                    "condition": { "broadcaster_user_id": "42" },
                    "transport": { "method": "websocket", "session_id": "abc" },
                    "created_at": "2023-07-19T10:11:12.634234626Z"
                },
                "event": {
                    "id": "9001",
                    "broadcaster_user_id": "42",
                    "broadcaster_user_login": "someone",
                    "broadcaster_user_name": "SomeOne",
                    "type": "live",
                    "started_at": "2023-07-19T10:11:12Z"
                }
            }
        })))
        .unwrap();

        match message {
            EventSubMessage::Notification {
                event: NotificationEvent::StreamOnline(event),
                subscription,
                ..
            } => {
                assert_eq!(subscription.id, "sub-1");
                assert_eq!(event.broadcaster_user_id, "42");
                assert_eq!(event.channel_url(), "https://twitch.tv/someone");
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn test_parse_revocation_reasons() {
        for (status, expected) in [
            ("authorization_revoked", RevocationReason::AuthorizationRevoked),
            ("user_removed", RevocationReason::UserRemoved),
            ("version_removed", RevocationReason::VersionRemoved),
        ] {
            let message = EventSubMessage::parse(&raw(json!({
                "metadata": {
                    "message_id": format!("r-{status}"),
                    "message_type": "revocation",
                    "message_timestamp": "2023-07-19T10:11:12.634234626Z",
                    "subscription_type": "stream.online",
                    "subscription_version": "1"
                },
                "payload": {
                    "subscription": {
                        "id": "sub-1",
                        "status": status,
                        "type": "stream.online",
                        "version": "1",
                        "condition": { "broadcaster_user_id": "42" }
                    }
                }
            })))
            .unwrap();

            match message {
                EventSubMessage::Revocation {
                    subscription,
                    subscription_type,
                    ..
                } => {
                    assert_eq!(subscription_type, SubscriptionType::StreamOnline);
                    assert_eq!(RevocationReason::from_status(&subscription.status), expected);
                }
                other => panic!("unexpected message {other:?}"),
            }
        }
    }

    #[test]
    fn test_revocation_descriptions_are_distinct() {
        let descriptions: Vec<String> = [
            RevocationReason::AuthorizationRevoked,
            RevocationReason::UserRemoved,
            RevocationReason::VersionRemoved,
        ]
        .iter()
        .map(ToString::to_string)
        .collect();
        assert!(descriptions[1].contains("no longer exists"));
        assert_ne!(descriptions[0], descriptions[1]);
        assert_ne!(descriptions[1], descriptions[2]);
        assert_ne!(descriptions[0], descriptions[2]);
    }

    #[test]
    fn test_unknown_shapes_are_protocol_violations() {
        let cases = [
            json!({ "metadata": { "message_id": "1", "message_type": "mystery" }, "payload": {} }),
            json!({
                "metadata": { "message_id": "2", "message_type": "notification" },
                "payload": {}
            }),
            json!({
                "metadata": {
                    "message_id": "3",
                    "message_type": "notification",
                    "subscription_type": "channel.follow"
                },
                "payload": {}
            }),
            json!({
                "metadata": { "message_id": "4", "message_type": "session_welcome" },
                "payload": { "session": { "id": "abc" } }
            }),
            json!({ "hello": "world" }),
        ];

        for case in cases {
            let err = EventSubMessage::parse(&raw(case.clone())).unwrap_err();
            assert!(
                matches!(err, Error::ProtocolViolation(_)),
                "expected protocol violation for {case}"
            );
        }

        assert!(matches!(
            EventSubMessage::parse("not json").unwrap_err(),
            Error::ProtocolViolation(_)
        ));
    }
}
