//! One-shot localhost listener capturing the OAuth redirect.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    extract::{Query, State},
    http::StatusCode,
    routing::get,
};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::code::{AuthorizationCodeSource, AuthorizationRequest};
use super::state::AuthorizationState;
use crate::browser;
use crate::error::{Error, Result};

/// Default port registered as the app's redirect URI.
pub const DEFAULT_REDIRECT_PORT: u16 = 8000;

/// How long the user has to finish the browser flow.
const AUTHORIZATION_TIMEOUT: Duration = Duration::from_secs(300);

/// Delay between resolving and shutting down, so the browser tab can render the final page.
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Upper bound on waiting for the server task after shutdown is signalled.
const SHUTDOWN_WAIT: Duration = Duration::from_secs(2);

const PAGE_DONE: &str = "You're all done authorizing the app, and you may close this tab.";
const PAGE_DENIED: &str = "The app has not been authorized, and you may close this tab.";
const PAGE_WAITING: &str =
    "Still trying to authenticate with Twitch. Try using the URL in the terminal again.";
const PAGE_STATE_MISMATCH: &str =
    "This authorization response does not match the pending login and was ignored.";

/// Authorization code source backed by a short-lived local HTTP listener.
#[derive(Debug, Clone)]
pub struct LocalRedirectListener {
    port: u16,
    timeout: Duration,
    grace: Duration,
    open_browser: bool,
}

impl Default for LocalRedirectListener {
    fn default() -> Self {
        Self::new(DEFAULT_REDIRECT_PORT)
    }
}

impl LocalRedirectListener {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            timeout: AUTHORIZATION_TIMEOUT,
            grace: CLOSE_GRACE,
            open_browser: true,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Whether to launch the system browser at the authorization URL.
    pub fn with_browser(mut self, open_browser: bool) -> Self {
        self.open_browser = open_browser;
        self
    }

    /// Serve redirects on `listener` until a code (or provider error) for
    /// `request.state` arrives, or the timeout elapses.
    async fn serve(&self, listener: TcpListener, request: &AuthorizationRequest) -> Result<String> {
        let (tx, mut rx) = mpsc::channel(1);
        let ctx = Arc::new(CallbackContext {
            expected: request.state.clone(),
            tx,
        });
        let router = Router::new()
            .route("/", get(handle_redirect))
            .with_state(ctx);

        let shutdown = CancellationToken::new();
        let server_shutdown = shutdown.clone();
        let mut server = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
                .await
        });

        let result = match tokio::time::timeout(self.timeout, rx.recv()).await {
            Ok(Some(result)) => {
                tokio::time::sleep(self.grace).await;
                result
            }
            Ok(None) => Err(Error::Authorization(
                "redirect listener stopped unexpectedly".to_string(),
            )),
            Err(_) => Err(Error::Authorization(
                "For security purposes, the authorization flow timed out. Restart the app and try again"
                    .to_string(),
            )),
        };

        shutdown.cancel();
        match tokio::time::timeout(SHUTDOWN_WAIT, &mut server).await {
            Ok(Ok(Ok(()))) => debug!("Redirect listener stopped"),
            Ok(Ok(Err(e))) => warn!(error = %e, "Redirect listener failed"),
            Ok(Err(e)) => warn!(error = %e, "Redirect listener task panicked"),
            Err(_) => {
                warn!("Redirect listener did not stop in time; aborting");
                server.abort();
            }
        }

        result
    }
}

#[async_trait]
impl AuthorizationCodeSource for LocalRedirectListener {
    fn redirect_uri(&self) -> String {
        format!("http://localhost:{}", self.port)
    }

    async fn obtain_code(&self, request: &AuthorizationRequest) -> Result<String> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, self.port)).await?;

        info!(
            "We need to log into Twitch. Check your browser, or use this URL to retry: {}",
            request.url
        );
        if self.open_browser {
            if let Err(e) = browser::open_url(&request.url).await {
                warn!(error = %e, "Could not open the browser; open the URL above manually");
            }
        }

        self.serve(listener, request).await
    }
}

struct CallbackContext {
    expected: AuthorizationState,
    tx: mpsc::Sender<Result<String>>,
}

#[derive(Debug, Deserialize)]
struct RedirectParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

async fn handle_redirect(
    State(ctx): State<Arc<CallbackContext>>,
    Query(params): Query<RedirectParams>,
) -> (StatusCode, &'static str) {
    if params.code.is_none() && params.error.is_none() {
        return (StatusCode::OK, PAGE_WAITING);
    }

    if !ctx.expected.matches(params.state.as_deref()) {
        warn!("Ignoring authorization redirect with mismatched state");
        return (StatusCode::BAD_REQUEST, PAGE_STATE_MISMATCH);
    }

    if let Some(error) = params.error {
        let description = params
            .error_description
            .unwrap_or_else(|| "Unknown error".to_string());
        warn!(%error, %description, "Authorization was denied");
        // Only the first resolution is delivered.
        let _ = ctx
            .tx
            .try_send(Err(Error::Authorization(format!("{error}: {description}"))));
        return (StatusCode::OK, PAGE_DENIED);
    }

    match params.code {
        Some(code) if !code.is_empty() => {
            let _ = ctx.tx.try_send(Ok(code));
            (StatusCode::OK, PAGE_DONE)
        }
        _ => (StatusCode::BAD_REQUEST, PAGE_WAITING),
    }
}
