//! EventSub WebSocket session.
//!
//! [`EventSubSession`] owns exactly one [`Connection`] at a time together
//! with its keepalive watchdog and duplicate-message cache, and is driven by
//! a single `tokio::select!` loop:
//!
//! ```text
//! Connecting --welcome--> Welcomed --keepalive--> Active
//!     ^                      |                      |
//!     |                      +----session_reconnect-+--> Reconnecting --welcome--> Welcomed
//!     +--watchdog fired------+----------------------+
//!
//! notification / revocation / close / protocol violation --> Closed
//! ```

mod close;
mod dedup;
mod message;
mod transport;

pub use close::CloseReason;
pub use dedup::SeenMessageCache;
pub use message::{
    EventSubMessage, MessageMetadata, NotificationEvent, ReconnectSession, RevocationReason,
    StreamOnlineEvent, SubscriptionInfo, SubscriptionType, WelcomeSession,
};
pub use transport::{Connection, Connector, Frame, WebSocketConnector};

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{Instant, Interval, MissedTickBehavior, Sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::error::{Error, Result};

pub const DEFAULT_EVENTSUB_URL: &str = "wss://eventsub.wss.twitch.tv/ws";

/// Session tuning.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Endpoint for the first connection and for watchdog reconnects.
    pub url: String,
    /// How long a message id is remembered.
    pub dedup_retention: Duration,
    /// How often expired message ids are purged.
    pub sweep_period: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_EVENTSUB_URL.to_string(),
            dedup_retention: Duration::from_secs(10 * 60),
            sweep_period: Duration::from_secs(5 * 60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connected, waiting for the welcome message.
    Connecting,
    /// Welcome received; subscription registered.
    Welcomed,
    /// At least one keepalive received since the welcome.
    Active,
    /// Migrating to a server-supplied URL; waiting for its welcome.
    Reconnecting,
    Closed,
}

/// Caller-side collaborators of the session.
#[async_trait]
pub trait SessionDelegate: Send + Sync {
    /// Register the subscription against `session_id` and return its id.
    async fn create_subscription(&self, session_id: &str) -> Result<String>;

    /// The watched broadcaster went live.
    async fn stream_online(&self, event: &StreamOnlineEvent) -> Result<()>;
}

/// How a session that did not fail ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    WentLive(StreamOnlineEvent),
    Cancelled,
}

enum SessionEvent {
    Cancelled,
    Frame(Frame),
    WatchdogFired,
    Sweep,
}

pub struct EventSubSession {
    config: SessionConfig,
    connector: Arc<dyn Connector>,
    delegate: Arc<dyn SessionDelegate>,
    connection: Option<Box<dyn Connection>>,
    state: SessionState,
    session_id: Option<String>,
    subscription_id: Option<String>,
    keepalive_timeout: Option<Duration>,
    watchdog: Option<Pin<Box<Sleep>>>,
    sweep: Interval,
    seen: SeenMessageCache,
    cancel: CancellationToken,
}

impl EventSubSession {
    /// Open the first connection to `config.url`.
    pub async fn connect(
        config: SessionConfig,
        connector: Arc<dyn Connector>,
        delegate: Arc<dyn SessionDelegate>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        if config.sweep_period.is_zero() {
            return Err(Error::config("message id sweep period must be greater than zero"));
        }
        if config.dedup_retention.is_zero() {
            return Err(Error::config("message id retention must be greater than zero"));
        }

        info!(url = %config.url, "Connecting to Twitch EventSub");
        let connection = connector.connect(&config.url).await?;

        let mut sweep =
            tokio::time::interval_at(Instant::now() + config.sweep_period, config.sweep_period);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);

        Ok(Self {
            config,
            connector,
            delegate,
            connection: Some(connection),
            state: SessionState::Connecting,
            session_id: None,
            subscription_id: None,
            keepalive_timeout: None,
            watchdog: None,
            sweep,
            seen: SeenMessageCache::new(),
            cancel,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn subscription_id(&self) -> Option<&str> {
        self.subscription_id.as_deref()
    }

    pub fn keepalive_timeout(&self) -> Option<Duration> {
        self.keepalive_timeout
    }

    /// When the watchdog fires unless more traffic arrives.
    pub fn watchdog_deadline(&self) -> Option<Instant> {
        self.watchdog.as_ref().map(|sleep| sleep.deadline())
    }

    pub fn seen_messages(&self) -> &SeenMessageCache {
        &self.seen
    }

    /// Drive the session until the broadcaster goes live, the token is
    /// cancelled, or a terminal error occurs.
    pub async fn run(mut self) -> Result<SessionOutcome> {
        loop {
            if let Some(outcome) = self.step().await? {
                return Ok(outcome);
            }
        }
    }

    /// Handle exactly one event. `Ok(None)` means the session is still live.
    ///
    /// On any terminal result the connection is closed and the watchdog
    /// dropped before returning.
    pub async fn step(&mut self) -> Result<Option<SessionOutcome>> {
        let event = self.next_event().await?;
        let result = self.handle_event(event).await;
        if !matches!(result, Ok(None)) {
            self.shutdown().await;
        }
        result
    }

    async fn next_event(&mut self) -> Result<SessionEvent> {
        let Some(connection) = self.connection.as_mut() else {
            return Err(Error::ConnectionClosed(CloseReason::Dropped(
                "session is closed".to_string(),
            )));
        };

        let event = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => SessionEvent::Cancelled,
            frame = connection.next_frame() => SessionEvent::Frame(frame),
            _ = watchdog_fired(&mut self.watchdog) => SessionEvent::WatchdogFired,
            _ = self.sweep.tick() => SessionEvent::Sweep,
        };
        Ok(event)
    }

    async fn handle_event(&mut self, event: SessionEvent) -> Result<Option<SessionOutcome>> {
        match event {
            SessionEvent::Cancelled => {
                info!("EventSub session cancelled");
                Ok(Some(SessionOutcome::Cancelled))
            }
            SessionEvent::Frame(Frame::Text(text)) => self.handle_text(&text).await,
            SessionEvent::Frame(Frame::Closed(reason)) => {
                error!(code = ?reason.code(), "Twitch unexpectedly closed the connection: {reason}");
                self.connection = None;
                Err(Error::ConnectionClosed(reason))
            }
            SessionEvent::WatchdogFired => {
                warn!("Twitch connection lost, reconnecting");
                let url = self.config.url.clone();
                self.reconnect(&url).await?;
                // A fresh connection carries no subscriptions.
                self.subscription_id = None;
                self.state = SessionState::Connecting;
                self.rearm_watchdog();
                Ok(None)
            }
            SessionEvent::Sweep => {
                let removed = self.seen.purge_older_than(self.config.dedup_retention);
                trace!(removed, remaining = self.seen.len(), "Swept message id cache");
                Ok(None)
            }
        }
    }

    async fn handle_text(&mut self, text: &str) -> Result<Option<SessionOutcome>> {
        let message = EventSubMessage::parse(text).inspect_err(|e| {
            error!(error = %e, raw = text, "Unknown WebSocket message");
        })?;

        if !self.seen.observe(message.message_id()) {
            debug!(id = message.message_id(), kind = message.kind(), "Ignoring duplicate message");
            return Ok(None);
        }
        trace!(id = message.message_id(), kind = message.kind(), "Received message");

        match self.state {
            SessionState::Connecting | SessionState::Reconnecting => match message {
                EventSubMessage::Welcome { session, .. } => self.on_welcome(session).await,
                other => {
                    warn!(kind = other.kind(), "Ignoring message received before welcome");
                    Ok(None)
                }
            },
            SessionState::Welcomed | SessionState::Active => {
                self.rearm_watchdog();
                self.on_message(message).await
            }
            SessionState::Closed => Err(Error::ConnectionClosed(CloseReason::Dropped(
                "session is closed".to_string(),
            ))),
        }
    }

    async fn on_welcome(&mut self, session: WelcomeSession) -> Result<Option<SessionOutcome>> {
        let timeout = session
            .keepalive_timeout_seconds
            .checked_mul(1000)
            .and_then(|ms| ms.checked_add(1000))
            .map(Duration::from_millis)
            .filter(|timeout| Instant::now().checked_add(*timeout).is_some())
            .ok_or_else(|| {
                Error::protocol(format!(
                    "keepalive timeout of {} seconds is out of range",
                    session.keepalive_timeout_seconds
                ))
            })?;
        info!(
            session_id = %session.id,
            keepalive_timeout_ms = timeout.as_millis() as u64,
            "Received welcome message"
        );

        self.keepalive_timeout = Some(timeout);
        self.session_id = Some(session.id.clone());
        self.state = SessionState::Welcomed;
        self.rearm_watchdog();

        if self.subscription_id.is_none() {
            info!("Subscribing to stream.online");
            let id = self.delegate.create_subscription(&session.id).await?;
            info!(subscription_id = %id, "Subscribed; the stream opens as soon as it goes live");
            self.subscription_id = Some(id);
        } else {
            info!("Still listening for the stream to come online");
        }
        Ok(None)
    }

    async fn on_message(&mut self, message: EventSubMessage) -> Result<Option<SessionOutcome>> {
        match message {
            EventSubMessage::Welcome { .. } => {
                warn!("Ignoring repeated welcome on an established session");
                Ok(None)
            }
            EventSubMessage::Keepalive { .. } => {
                self.state = SessionState::Active;
                Ok(None)
            }
            EventSubMessage::Reconnect { session, .. } => {
                info!(url = %session.reconnect_url, "Twitch requested a reconnect");
                self.reconnect(&session.reconnect_url).await?;
                self.state = SessionState::Reconnecting;
                Ok(None)
            }
            EventSubMessage::Revocation {
                subscription,
                subscription_type,
                ..
            } => {
                let reason = RevocationReason::from_status(&subscription.status);
                error!(%subscription_type, subscription_id = %subscription.id, "EventSub subscription was revoked: {reason}");
                Err(Error::Revoked(reason))
            }
            EventSubMessage::Notification {
                event: NotificationEvent::StreamOnline(event),
                ..
            } => {
                info!(
                    broadcaster = %event.broadcaster_user_login,
                    broadcaster_id = %event.broadcaster_user_id,
                    "Stream is live"
                );
                self.delegate.stream_online(&event).await?;
                Ok(Some(SessionOutcome::WentLive(event)))
            }
        }
    }

    /// Replace the current connection with one to `url`.
    async fn reconnect(&mut self, url: &str) -> Result<()> {
        let next = self.connector.connect(url).await?;
        if let Some(mut previous) = self.connection.replace(next) {
            previous.close().await;
        }
        self.seen.clear();
        debug!(url, "Reconnected");
        Ok(())
    }

    /// Push the watchdog deadline out by the keepalive timeout, replacing
    /// any pending firing.
    fn rearm_watchdog(&mut self) {
        let Some(timeout) = self.keepalive_timeout else {
            return;
        };
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return;
        };
        match self.watchdog.as_mut() {
            Some(sleep) => sleep.as_mut().reset(deadline),
            None => self.watchdog = Some(Box::pin(tokio::time::sleep_until(deadline))),
        }
    }

    async fn shutdown(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            connection.close().await;
        }
        self.watchdog = None;
        self.state = SessionState::Closed;
        debug!("EventSub session closed");
    }
}

async fn watchdog_fired(watchdog: &mut Option<Pin<Box<Sleep>>>) {
    match watchdog {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}
