//! Store configuration.

/// Retry budgets and index defaults shared by every handle on a store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Total compare-and-swap attempts for `Entity::save`/`mutate`/`patch`.
    pub entity_attempts: u32,

    /// Extra attempts per `Index::add_batch` chunk after a backend failure.
    /// Resets after every successful chunk.
    pub chunk_retries: u32,

    /// Page size recorded in newly created index roots.
    pub default_page_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            entity_attempts: 4,
            chunk_retries: 2,
            default_page_size: 200,
        }
    }
}

impl StoreConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the entity compare-and-swap attempt budget.
    #[must_use]
    pub const fn entity_attempts(mut self, attempts: u32) -> Self {
        self.entity_attempts = attempts;
        self
    }

    /// Sets the per-chunk retry budget for batched index appends.
    #[must_use]
    pub const fn chunk_retries(mut self, retries: u32) -> Self {
        self.chunk_retries = retries;
        self
    }

    /// Sets the page size for new indexes.
    #[must_use]
    pub const fn default_page_size(mut self, page_size: usize) -> Self {
        self.default_page_size = page_size;
        self
    }

    /// Attempt budget, never below one.
    pub(crate) fn effective_entity_attempts(&self) -> u32 {
        self.entity_attempts.max(1)
    }

    /// Page size, never below one.
    pub(crate) fn effective_page_size(&self) -> usize {
        self.default_page_size.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = StoreConfig::default();
        assert_eq!(config.entity_attempts, 4);
        assert_eq!(config.chunk_retries, 2);
        assert_eq!(config.default_page_size, 200);
    }

    #[test]
    fn builder_pattern() {
        let config = StoreConfig::new()
            .entity_attempts(8)
            .chunk_retries(0)
            .default_page_size(16);

        assert_eq!(config.entity_attempts, 8);
        assert_eq!(config.chunk_retries, 0);
        assert_eq!(config.default_page_size, 16);
    }

    #[test]
    fn zero_values_are_clamped() {
        let config = StoreConfig::new().entity_attempts(0).default_page_size(0);
        assert_eq!(config.effective_entity_attempts(), 1);
        assert_eq!(config.effective_page_size(), 1);
    }
}
