//! Twitch REST access: token endpoints and Helix lookups.

mod client;
mod models;

pub use client::{DEFAULT_AUTH_URL, DEFAULT_HELIX_URL, HelixClient, install_rustls_provider};
pub use models::{
    HelixStream, HelixUser, SubscriptionCondition, SubscriptionRequest, SubscriptionTransport,
    UserRef,
};
