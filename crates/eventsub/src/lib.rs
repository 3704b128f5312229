//! EventSub: go-live notifications over a persistent Twitch EventSub session.
//!
//! ## Token lifecycle
//!
//! - [`Credentials`] - client id/secret and the access/refresh token pair
//! - [`FileCredentialStore`] - JSON credential file with first-run template
//! - [`TokenManager`] - validate, silently refresh, or drive an interactive login
//! - [`LocalRedirectListener`] - captures the OAuth redirect on a local port
//!
//! ## REST
//!
//! - [`HelixClient`] - authenticated JSON requests, token endpoints and lookups
//!
//! ## Streaming session
//!
//! - [`EventSubSession`] - the connection state machine, keepalive watchdog,
//!   duplicate-message cache and reconnect handling
//! - [`EventSubMessage`] - closed set of inbound message kinds
//! - [`WebSocketConnector`] - tokio-tungstenite transport

pub mod api;
pub mod auth;
pub mod browser;
pub mod credentials;
pub mod error;
pub mod session;

pub use api::{HelixClient, HelixStream, HelixUser, SubscriptionRequest, UserRef};
pub use auth::{
    AuthorizationCodeSource, AuthorizationRequest, AuthorizationState, IdentityProvider,
    LocalRedirectListener, RefreshOutcome, TokenGrant, TokenManager, TokenValidation,
    ValidationStatus,
};
pub use browser::open_url;
pub use credentials::{CredentialStore, Credentials, FileCredentialStore, LoadOutcome};
pub use error::{Error, Result};
pub use session::{
    CloseReason, Connection, Connector, DEFAULT_EVENTSUB_URL, EventSubMessage, EventSubSession,
    Frame, RevocationReason, SeenMessageCache, SessionConfig, SessionDelegate, SessionOutcome,
    SessionState, StreamOnlineEvent, SubscriptionType, WebSocketConnector,
};
