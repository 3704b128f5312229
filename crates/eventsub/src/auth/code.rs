use async_trait::async_trait;

use super::state::AuthorizationState;
use crate::error::Result;

/// A pending interactive authorization.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    /// URL the user must visit.
    pub url: String,
    /// State the callback must echo back.
    pub state: AuthorizationState,
}

/// Capability to obtain an authorization code for a given state.
///
/// How the user is sent to the provider (browser, printed URL, headless) is up
/// to the implementation.
#[async_trait]
pub trait AuthorizationCodeSource: Send + Sync {
    /// Redirect URI registered with the provider.
    fn redirect_uri(&self) -> String;

    /// Present `request` to the user and wait for the matching code.
    async fn obtain_code(&self, request: &AuthorizationRequest) -> Result<String>;
}
