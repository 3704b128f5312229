//! Credential model and persistence.
//!
//! - [`Credentials`]: the four persisted fields plus the optional app-token expiry
//! - [`CredentialStore`]: persistence seam used by the token manager
//! - [`FileCredentialStore`]: JSON file implementation with a first-run template

mod store;
mod types;

pub use store::{CredentialStore, FileCredentialStore, LoadOutcome};
pub use types::Credentials;
