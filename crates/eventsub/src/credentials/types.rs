//! Core credential types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::TokenGrant;
use crate::error::{Error, Result};

/// Persisted OAuth credentials.
///
/// Client id and secret are never changed at runtime; the token fields are
/// rewritten by the token manager. An empty string means "not set".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub access_token: String,
    /// Refresh token (user-token variant).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Access token expiry (app-token variant).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_expires: Option<DateTime<Utc>>,
}

impl Credentials {
    /// Empty credentials written on first run.
    pub fn template() -> Self {
        Self {
            refresh_token: Some(String::new()),
            ..Self::default()
        }
    }

    #[inline]
    pub fn has_access_token(&self) -> bool {
        !self.access_token.is_empty()
    }

    /// Non-empty refresh token, if any.
    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref().filter(|t| !t.is_empty())
    }

    #[inline]
    pub fn has_client(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty()
    }

    /// Fail unless both client id and secret are filled in.
    pub fn require_client(&self) -> Result<()> {
        if self.has_client() {
            Ok(())
        } else {
            Err(Error::config(
                "clientId and clientSecret must be set to your Twitch application credentials",
            ))
        }
    }

    /// Store a freshly granted token pair.
    ///
    /// A grant without a refresh token keeps the previous one.
    pub fn apply_grant(&mut self, grant: &TokenGrant) {
        self.access_token = grant.access_token.clone();
        if let Some(refresh_token) = grant.refresh_token.as_ref() {
            self.refresh_token = Some(refresh_token.clone());
        }
    }

    /// Check whether the app token expires within `margin`.
    pub fn expires_within(&self, margin: chrono::Duration) -> bool {
        match self.token_expires {
            Some(expires) => expires - Utc::now() < margin,
            None => true,
        }
    }
}
