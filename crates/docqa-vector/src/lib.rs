//! Vector Index: brute-force in-process store, plus a variant that fronts an
//! external store (LanceDB) behind the same [`VectorIndexer`] seam.

#![deny(dead_code)]
#![deny(unused_variables)]

pub mod backend;
pub mod external;
pub mod lance;
pub mod memory;

use tracing::info;

use docqa_core::config::{VectorBackendKind, VectorSettings};
use docqa_core::traits::VectorIndexer;

pub use backend::VectorBackend;
pub use external::ExternalVectorIndex;
pub use lance::LanceBackend;
pub use memory::{cosine, InProcessVectorIndex};

/// Builds the vector index selected by `settings`.
pub async fn index_from_settings(settings: &VectorSettings) -> anyhow::Result<Box<dyn VectorIndexer>> {
	match settings.backend {
		VectorBackendKind::Memory => {
			info!("vector index: in-process");
			Ok(Box::new(InProcessVectorIndex::new()))
		}
		VectorBackendKind::Lance => {
			let uri = docqa_core::config::expand_path(&settings.uri);
			let backend = LanceBackend::connect(&uri.to_string_lossy(), &settings.table).await?;
			Ok(Box::new(ExternalVectorIndex::new(backend)))
		}
	}
}
