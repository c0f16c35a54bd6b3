//! Store query configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Largest page a store peer is asked for.
pub const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Requested page sizes are clamped to this
    pub max_page_size: usize,
    /// Page size used when the request leaves it at zero
    pub default_page_size: usize,
    /// Deadline for a single page
    pub query_timeout: Duration,
    /// Upper bound on pages fetched by `query_all`
    pub max_pages: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_page_size: MAX_PAGE_SIZE,
            default_page_size: 20,
            query_timeout: Duration::from_secs(30),
            max_pages: 50,
        }
    }
}

impl StoreConfig {
    pub fn for_testing() -> Self {
        Self {
            max_page_size: 10,
            default_page_size: 5,
            query_timeout: Duration::from_millis(200),
            max_pages: 5,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_page_size == 0 || self.default_page_size == 0 {
            return Err("page sizes must be > 0".to_string());
        }
        if self.default_page_size > self.max_page_size {
            return Err("default_page_size must be <= max_page_size".to_string());
        }
        if self.max_pages == 0 {
            return Err("max_pages must be > 0".to_string());
        }
        Ok(())
    }

    /// Effective page size for a request.
    pub fn page_size(&self, requested: usize) -> usize {
        if requested == 0 {
            self.default_page_size
        } else {
            requested.min(self.max_page_size)
        }
    }
}
