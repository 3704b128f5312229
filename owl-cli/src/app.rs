use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use eventsub::{
    Credentials, EventSubSession, FileCredentialStore, HelixClient, LoadOutcome,
    LocalRedirectListener, SessionConfig, SessionDelegate, SessionOutcome, StreamOnlineEvent,
    SubscriptionRequest, TokenManager, UserRef, WebSocketConnector, open_url,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{AppError, Result};
use crate::keep_awake::KeepAwake;

/// Everything the watch flow needs, after CLI flags were merged over the config.
#[derive(Debug, Clone)]
pub struct WatchOptions {
    pub user: String,
    pub credentials_path: PathBuf,
    pub redirect_port: u16,
    pub authorization_timeout: Duration,
    pub open_browser: bool,
    pub keep_awake: bool,
    pub session: SessionConfig,
}

/// How a watch run ended without an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finished {
    /// The stream was opened (already live, or went live while we waited).
    Opened,
    /// A credential template was written; the user has to fill it in first.
    FirstRun(PathBuf),
    /// Interrupted with Ctrl-C.
    Interrupted,
}

pub async fn watch(options: WatchOptions) -> Result<Finished> {
    let store = Arc::new(FileCredentialStore::new(&options.credentials_path));
    let credentials = match store.load_or_init().await? {
        LoadOutcome::Loaded(credentials) => credentials,
        LoadOutcome::Created(path) => return Ok(Finished::FirstRun(path)),
    };
    credentials.require_client()?;

    let api = Arc::new(HelixClient::new()?);
    let listener = LocalRedirectListener::new(options.redirect_port)
        .with_timeout(options.authorization_timeout)
        .with_browser(options.open_browser);
    let tokens = Arc::new(TokenManager::new(
        credentials,
        api.clone(),
        store,
        Arc::new(listener),
    ));

    let credentials = tokens.ensure_valid_token(true).await?;
    let user = resolve_user(&api, &credentials, &options.user).await?;

    info!("Checking if {} is already live", user.display_name);
    if let Some(stream) = api.current_stream(&credentials, &user.id).await? {
        info!(title = %stream.title, "Stream is already live");
        open_channel(&stream.channel_url(), options.open_browser).await;
        return Ok(Finished::Opened);
    }

    let keep_awake = if options.keep_awake {
        KeepAwake::start()
    } else {
        KeepAwake::disabled()
    };

    let cancel = CancellationToken::new();
    let interrupt = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupted, closing connection");
                cancel.cancel();
            }
        }
    });

    let delegate = Arc::new(LiveDelegate {
        api,
        tokens,
        broadcaster_id: user.id.clone(),
        open_browser: options.open_browser,
    });
    info!("Waiting for {} to go live", user.display_name);
    let outcome = run_session(options.session, delegate, cancel).await;

    interrupt.abort();
    keep_awake.stop().await;

    match outcome? {
        SessionOutcome::WentLive(_) => Ok(Finished::Opened),
        SessionOutcome::Cancelled => Ok(Finished::Interrupted),
    }
}

async fn run_session(
    config: SessionConfig,
    delegate: Arc<LiveDelegate>,
    cancel: CancellationToken,
) -> Result<SessionOutcome> {
    let session =
        EventSubSession::connect(config, Arc::new(WebSocketConnector), delegate, cancel).await?;
    Ok(session.run().await?)
}

async fn resolve_user(
    api: &HelixClient,
    credentials: &Credentials,
    input: &str,
) -> Result<eventsub::HelixUser> {
    let user = api
        .lookup_user(credentials, &UserRef::parse(input))
        .await?
        .ok_or_else(|| AppError::UnknownUser(input.to_string()))?;
    info!(id = %user.id, "Found user {}", user.display_name);
    Ok(user)
}

/// Open `url`, falling back to printing it.
async fn open_channel(url: &str, open_browser: bool) {
    if open_browser {
        info!(url, "Opening stream");
        match open_url(url).await {
            Ok(()) => return,
            Err(e) => warn!(error = %e, "Could not open the browser"),
        }
    }
    println!("{url}");
}

/// Session callbacks for the watch flow.
struct LiveDelegate {
    api: Arc<HelixClient>,
    tokens: Arc<TokenManager>,
    broadcaster_id: String,
    open_browser: bool,
}

#[async_trait]
impl SessionDelegate for LiveDelegate {
    async fn create_subscription(&self, session_id: &str) -> eventsub::Result<String> {
        // The login flow cannot run mid-session; a dead token ends the run.
        let credentials = self.tokens.ensure_valid_token(false).await?;
        let request = SubscriptionRequest::stream_online(&self.broadcaster_id, session_id);
        self.api.create_subscription(&credentials, &request).await
    }

    async fn stream_online(&self, event: &StreamOnlineEvent) -> eventsub::Result<()> {
        info!(
            broadcaster = %event.broadcaster_user_login,
            "{} went live",
            event.broadcaster_user_name
        );
        open_channel(&event.channel_url(), self.open_browser).await;
        Ok(())
    }
}
