//! [`VectorIndex`](crate::traits::VectorIndex) backends.
//!
//! | Config Value | Index |
//! |-------------|-------|
//! | `"qdrant"` | [`QdrantIndex`] over the Qdrant REST API |
//! | `"memory"` | [`InMemoryVectorIndex`], brute-force cosine |

pub mod memory;
pub mod qdrant;

pub use memory::InMemoryVectorIndex;
pub use qdrant::QdrantIndex;

use std::sync::Arc;

use anyhow::{bail, Result};

use crate::config::VectorConfig;
use crate::traits::VectorIndex;

/// Create a vector index from configuration, creating the remote
/// collection if it does not exist yet.
pub async fn create_index(config: &VectorConfig) -> Result<Arc<dyn VectorIndex>> {
    match config.provider.as_str() {
        "memory" => Ok(Arc::new(InMemoryVectorIndex::new())),
        "qdrant" => {
            let index = QdrantIndex::new(config)?;
            index.ensure_collection().await?;
            Ok(Arc::new(index))
        }
        other => bail!("Unknown vector provider: {}", other),
    }
}
