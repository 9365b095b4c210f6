//! Session management: per-session conversation histories.

pub mod in_memory;
pub mod traits;

pub use in_memory::InMemoryHistoryStore;
pub use traits::HistoryStore;

use crate::config::HistoryConfig;

/// Create the default in-memory history store for the configured policy.
pub fn create_history_store(config: &HistoryConfig) -> Box<dyn HistoryStore> {
    Box::new(InMemoryHistoryStore::with_max_messages(config.max_messages))
}
