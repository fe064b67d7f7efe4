//! [`DocumentStore`](crate::traits::DocumentStore) backends.
//!
//! - [`SqliteDocumentStore`] — durable, used by the binary.
//! - [`InMemoryDocumentStore`] — `HashMap` behind an async `RwLock`, for
//!   tests and throwaway runs.
//!
//! Both stamp `updated_at` on every write and keep the first `created_at`
//! seen for an id.

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryDocumentStore;
pub use sqlite::SqliteDocumentStore;

use crate::models::Document;

/// Case-insensitive substring match over the fields `search_text` covers:
/// title, content, category and metadata values.
pub(crate) fn document_matches(doc: &Document, needle_lower: &str) -> bool {
    doc.title.to_lowercase().contains(needle_lower)
        || doc.content.to_lowercase().contains(needle_lower)
        || doc.category.to_lowercase().contains(needle_lower)
        || doc
            .metadata
            .values()
            .any(|v| v.to_lowercase().contains(needle_lower))
}
