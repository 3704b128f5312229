//! Identity provider seam: token validation, refresh and code exchange.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::state::AuthorizationState;
use crate::credentials::Credentials;
use crate::error::Result;

/// Response body of the token endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    pub expires_in: u64,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Vec<String>,
    #[serde(default)]
    pub token_type: String,
}

/// Response body of the validation endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenValidation {
    pub client_id: String,
    #[serde(default)]
    pub login: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    pub expires_in: u64,
}

/// Outcome of validating an access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationStatus {
    Valid(TokenValidation),
    /// The provider answered 401.
    Unauthorized,
}

/// Outcome of a refresh-token grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Refreshed(TokenGrant),
    /// The refresh token itself was rejected (401).
    Rejected,
}

/// Token endpoints of the OAuth provider.
///
/// Any status other than success or the documented 401 cases is returned as
/// [`crate::Error::Upstream`].
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Validate an access token.
    async fn validate(&self, access_token: &str) -> Result<ValidationStatus>;

    /// Exchange a refresh token for a new token pair.
    async fn refresh(&self, client: &Credentials, refresh_token: &str) -> Result<RefreshOutcome>;

    /// Exchange an authorization code for a token pair.
    async fn exchange_code(
        &self,
        client: &Credentials,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenGrant>;

    /// Obtain an app access token with the client-credentials grant.
    async fn client_credentials(&self, client: &Credentials) -> Result<TokenGrant>;

    /// Build the URL the user visits to authorize the app.
    fn authorize_url(
        &self,
        client_id: &str,
        redirect_uri: &str,
        state: &AuthorizationState,
    ) -> Result<String>;
}
