use std::fmt;

/// Random per-login token binding the redirect callback to its request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationState(String);

impl AuthorizationState {
    /// Generate a fresh state.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check a returned `state` query parameter against this one.
    pub fn matches(&self, returned: Option<&str>) -> bool {
        returned == Some(self.0.as_str())
    }
}

impl Default for AuthorizationState {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AuthorizationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
