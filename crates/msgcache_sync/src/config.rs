//! Configuration for the sync controller.

use std::time::Duration;

/// Configuration for partition sync.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Maximum entries requested per page.
    pub page_size: u32,
    /// How long a tentative entry stays matchable after creation.
    pub pending_ttl: Duration,
    /// Persist pending tentative entries so they survive a reload. Failed
    /// entries are persisted either way.
    pub persist_tentative: bool,
    /// Upper bound on pages fetched by one sync pass. `None` fetches until
    /// the remote reports the last page.
    pub max_pages_per_sync: Option<u32>,
}

impl SyncConfig {
    /// Creates a configuration with default settings.
    pub fn new() -> Self {
        Self {
            page_size: 100,
            pending_ttl: msgcache_core::DEFAULT_PENDING_TTL,
            persist_tentative: false,
            max_pages_per_sync: None,
        }
    }

    /// Sets the page size. Zero is raised to one.
    pub fn with_page_size(mut self, size: u32) -> Self {
        self.page_size = size.max(1);
        self
    }

    /// Sets the tentative-entry TTL.
    pub fn with_pending_ttl(mut self, ttl: Duration) -> Self {
        self.pending_ttl = ttl;
        self
    }

    /// Sets whether tentative entries are persisted.
    pub fn with_persist_tentative(mut self, persist: bool) -> Self {
        self.persist_tentative = persist;
        self
    }

    /// Caps the number of pages fetched per sync pass.
    pub fn with_max_pages_per_sync(mut self, pages: u32) -> Self {
        self.max_pages_per_sync = Some(pages.max(1));
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.page_size, 100);
        assert_eq!(config.pending_ttl, Duration::from_secs(600));
        assert!(!config.persist_tentative);
        assert_eq!(config.max_pages_per_sync, None);
    }

    #[test]
    fn builder() {
        let config = SyncConfig::new()
            .with_page_size(0)
            .with_pending_ttl(Duration::from_secs(5))
            .with_persist_tentative(true)
            .with_max_pages_per_sync(3);
        assert_eq!(config.page_size, 1);
        assert_eq!(config.pending_ttl, Duration::from_secs(5));
        assert!(config.persist_tentative);
        assert_eq!(config.max_pages_per_sync, Some(3));
    }
}
