//! Engine configuration.

use ormapi_proto::{Page, DEFAULT_PAGE_SIZE};
use tracing::warn;

/// Query engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Page size used when a query asks for size zero.
    pub default_page_size: u64,

    /// Largest page a query may request; larger requests are clamped.
    /// `None` leaves page sizes unbounded.
    pub max_page_size: Option<u64>,
}

impl EngineConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default page size.
    pub fn with_default_page_size(mut self, size: u64) -> Self {
        self.default_page_size = size.max(1);
        self
    }

    /// Set the maximum page size.
    pub fn with_max_page_size(mut self, size: u64) -> Self {
        self.max_page_size = Some(size.max(1));
        self
    }

    /// Normalise a requested page: 1-based number, size within bounds.
    pub fn clamp_page(&self, page: Page) -> Page {
        let number = page.number.max(1);
        let size = match page.size {
            0 => self.default_page_size,
            size => match self.max_page_size {
                Some(max) if size > max => {
                    warn!(requested = size, max, "page size clamped");
                    max
                }
                _ => size,
            },
        };
        Page::new(number, size)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: None,
        }
    }
}
