//! OAuth token lifecycle.
//!
//! # Architecture
//!
//! - [`IdentityProvider`]: validate / refresh / exchange against the token endpoints
//! - [`AuthorizationCodeSource`]: obtains an authorization code bound to an [`AuthorizationState`]
//! - [`LocalRedirectListener`]: code source backed by a one-shot localhost HTTP listener
//! - [`TokenManager`]: keeps a usable access token, persisting every change

mod code;
mod listener;
mod manager;
mod provider;
mod state;

pub use code::{AuthorizationCodeSource, AuthorizationRequest};
pub use listener::{DEFAULT_REDIRECT_PORT, LocalRedirectListener};
pub use manager::TokenManager;
pub use provider::{IdentityProvider, RefreshOutcome, TokenGrant, TokenValidation, ValidationStatus};
pub use state::AuthorizationState;
