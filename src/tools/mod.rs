//! Concrete capabilities used by the itinerary workflow.

mod books;
mod preferences;
mod search;

use std::sync::Arc;

pub use books::{GOOGLE_BOOKS_URL, GoogleBooksTool, SEARCH_BOOK, build_query, parse_volumes};
pub use preferences::{GET_USER_PREFERENCES, PREFERENCES_KEY, PreferencesTool};
pub use search::{GOOGLE_SEARCH, GoogleSearchTool};

use crate::capability::CapabilityRegistry;

/// Registry with every capability the workflow's tasks declare.
pub fn default_registry() -> CapabilityRegistry {
    CapabilityRegistry::new()
        .with(Arc::new(GoogleBooksTool::default()))
        .with(Arc::new(GoogleSearchTool))
        .with(Arc::new(PreferencesTool))
}
