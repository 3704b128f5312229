//! Token lifecycle manager.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use super::code::{AuthorizationCodeSource, AuthorizationRequest};
use super::provider::{IdentityProvider, RefreshOutcome, TokenGrant, ValidationStatus};
use super::state::AuthorizationState;
use crate::credentials::{CredentialStore, Credentials};
use crate::error::{Error, Result};

/// App tokens expiring within this margin are replaced before use.
const APP_TOKEN_MARGIN_SECS: i64 = 60;

/// Keeps a usable access token.
///
/// Owns the in-memory [`Credentials`]; every successful path writes them back
/// through the [`CredentialStore`] before returning.
pub struct TokenManager {
    provider: Arc<dyn IdentityProvider>,
    store: Arc<dyn CredentialStore>,
    authorizer: Arc<dyn AuthorizationCodeSource>,
    credentials: Mutex<Credentials>,
}

impl TokenManager {
    pub fn new(
        credentials: Credentials,
        provider: Arc<dyn IdentityProvider>,
        store: Arc<dyn CredentialStore>,
        authorizer: Arc<dyn AuthorizationCodeSource>,
    ) -> Self {
        Self {
            provider,
            store,
            authorizer,
            credentials: Mutex::new(credentials),
        }
    }

    /// Snapshot of the current credentials.
    pub async fn credentials(&self) -> Credentials {
        self.credentials.lock().await.clone()
    }

    /// Return credentials holding a user access token that passed validation,
    /// refreshing it or running the interactive login when needed.
    ///
    /// Without `allow_interactive_login`, a missing token pair fails with
    /// [`Error::NotAuthenticated`] and a rejected refresh token with
    /// [`Error::SessionExpired`].
    #[instrument(skip(self))]
    pub async fn ensure_valid_token(&self, allow_interactive_login: bool) -> Result<Credentials> {
        let mut creds = self.credentials.lock().await;
        creds.require_client()?;

        let refresh_token = match (creds.has_access_token(), creds.refresh_token()) {
            (true, Some(token)) => token.to_string(),
            _ => {
                debug!("No stored token pair");
                return self
                    .login_or(&mut creds, allow_interactive_login, Error::NotAuthenticated)
                    .await;
            }
        };

        match self.provider.validate(&creds.access_token).await? {
            ValidationStatus::Valid(validation) => {
                debug!(expires_in = validation.expires_in, "Access token is valid");
                self.store.save(&creds).await?;
                return Ok(creds.clone());
            }
            ValidationStatus::Unauthorized => {
                info!("Access token is no longer valid, refreshing");
            }
        }

        match self.provider.refresh(&creds, &refresh_token).await? {
            RefreshOutcome::Refreshed(grant) => {
                self.store_grant(&mut creds, &grant).await?;
                info!("Access token refreshed");
                Ok(creds.clone())
            }
            RefreshOutcome::Rejected => {
                warn!("Refresh token was rejected");
                self.login_or(&mut creds, allow_interactive_login, Error::SessionExpired)
                    .await
            }
        }
    }

    /// Return credentials holding an app access token (client-credentials
    /// grant), tracking its expiry in `token_expires`.
    #[instrument(skip(self))]
    pub async fn ensure_app_token(&self) -> Result<Credentials> {
        let mut creds = self.credentials.lock().await;
        creds.require_client()?;

        let margin = chrono::Duration::seconds(APP_TOKEN_MARGIN_SECS);
        if !creds.has_access_token() || creds.expires_within(margin) {
            self.fetch_app_token(&mut creds).await?;
        } else {
            match self.provider.validate(&creds.access_token).await? {
                ValidationStatus::Valid(validation) => {
                    creds.token_expires =
                        Some(Utc::now() + chrono::Duration::seconds(validation.expires_in as i64));
                }
                ValidationStatus::Unauthorized => {
                    info!("App token is no longer valid, requesting a new one");
                    self.fetch_app_token(&mut creds).await?;
                }
            }
        }

        self.store.save(&creds).await?;
        Ok(creds.clone())
    }

    async fn fetch_app_token(&self, creds: &mut Credentials) -> Result<()> {
        let grant = self.provider.client_credentials(creds).await?;
        creds.apply_grant(&grant);
        creds.token_expires =
            Some(Utc::now() + chrono::Duration::seconds(grant.expires_in as i64));
        debug!(expires_in = grant.expires_in, "Obtained app token");
        Ok(())
    }

    async fn login_or(
        &self,
        creds: &mut Credentials,
        allow_interactive_login: bool,
        otherwise: Error,
    ) -> Result<Credentials> {
        if !allow_interactive_login {
            return Err(otherwise);
        }
        self.interactive_login(creds).await?;
        Ok(creds.clone())
    }

    async fn interactive_login(&self, creds: &mut Credentials) -> Result<()> {
        let state = AuthorizationState::new();
        let redirect_uri = self.authorizer.redirect_uri();
        let url = self
            .provider
            .authorize_url(&creds.client_id, &redirect_uri, &state)?;

        info!("Starting interactive login");
        let code = self
            .authorizer
            .obtain_code(&AuthorizationRequest { url, state })
            .await?;

        let grant = self
            .provider
            .exchange_code(creds, &code, &redirect_uri)
            .await?;
        self.store_grant(creds, &grant).await?;
        info!("Logged in");
        Ok(())
    }

    async fn store_grant(&self, creds: &mut Credentials, grant: &TokenGrant) -> Result<()> {
        creds.apply_grant(grant);
        self.store.save(creds).await
    }
}
