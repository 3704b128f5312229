use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

/// Message ids seen on the current connection, with their receipt time.
#[derive(Debug, Default)]
pub struct SeenMessageCache {
    seen: HashMap<String, Instant>,
}

impl SeenMessageCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `id`. Returns `false` if it was already present.
    pub fn observe(&mut self, id: &str) -> bool {
        if self.seen.contains_key(id) {
            return false;
        }
        self.seen.insert(id.to_string(), Instant::now());
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.seen.contains_key(id)
    }

    /// Drop entries received `retention` or longer ago. Returns how many were removed.
    pub fn purge_older_than(&mut self, retention: Duration) -> usize {
        let now = Instant::now();
        let before = self.seen.len();
        self.seen
            .retain(|_, received| now.saturating_duration_since(*received) < retention);
        before - self.seen.len()
    }

    pub fn clear(&mut self) {
        self.seen.clear();
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
