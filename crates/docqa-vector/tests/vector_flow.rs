use docqa_core::config::{VectorBackendKind, VectorSettings};
use docqa_core::error::as_domain;
use docqa_core::traits::VectorIndexer;
use docqa_core::types::{Chunk, EmbedMode, Embeddings};
use docqa_core::Error;
use docqa_vector::{index_from_settings, ExternalVectorIndex, InProcessVectorIndex, LanceBackend, VectorBackend};
use tempfile::TempDir;

fn chunks(doc: u64, n: u64) -> Vec<Chunk> {
	(0..n).map(|i| Chunk::new(i + 1, doc, 0, i as u32, format!("doc {doc} chunk {i}"))).collect()
}

fn unit(dim: usize, hot: usize) -> Vec<f32> {
	let mut v = vec![0.0; dim];
	v[hot % dim] = 1.0;
	v
}

fn embeddings(dim: usize, n: usize) -> Embeddings {
	Embeddings { vectors: (0..n).map(|i| unit(dim, i)).collect(), mode: EmbedMode::Model }
}

#[tokio::test]
async fn dimension_mismatch_leaves_collection_intact() {
	let index: Box<dyn VectorIndexer> = Box::new(InProcessVectorIndex::new());
	index.add(&chunks(1, 2), &embeddings(8, 2)).await.unwrap();
	let err = index.add(&chunks(2, 1), &embeddings(4, 1)).await.unwrap_err();
	assert!(matches!(as_domain(&err), Some(Error::DimensionMismatch { expected: 8, actual: 4 })));
	assert_eq!(index.len(), 2);
	assert_eq!(index.vector_size(), Some(8));
	assert_eq!(index.search(&unit(8, 0), 5, &[]).await.unwrap().len(), 2);
}

#[tokio::test]
async fn reset_allows_a_new_vector_size() {
	let index = InProcessVectorIndex::new();
	VectorIndexer::add(&index, &chunks(1, 1), &embeddings(8, 1)).await.unwrap();
	VectorIndexer::reset(&index).await.unwrap();
	assert_eq!(VectorIndexer::vector_size(&index), None);
	VectorIndexer::add(&index, &chunks(1, 1), &embeddings(4, 1)).await.unwrap();
	assert_eq!(VectorIndexer::vector_size(&index), Some(4));
}

#[tokio::test]
async fn settings_select_the_in_process_index() {
	let index = index_from_settings(&VectorSettings::default()).await.unwrap();
	assert!(index.is_empty());
	assert_eq!(index.vector_size(), None);
}

#[tokio::test]
async fn lance_backend_full_flow() {
	let tmp = TempDir::new().expect("tmp");
	let backend = LanceBackend::connect(&tmp.path().to_string_lossy(), "chunks_test").await.expect("connect");
	let index = ExternalVectorIndex::new(backend);

	index.add(&chunks(1, 3), &embeddings(4, 3)).await.expect("add doc 1");
	index.add(&chunks(2, 2), &embeddings(4, 2)).await.expect("add doc 2");
	assert!(index.backend_in_sync());
	assert_eq!(index.backend().count().await.unwrap(), 5);

	let hits = index.search(&unit(4, 0), 3, &[]).await.expect("search");
	assert!(!hits.is_empty() && hits.len() <= 3);
	assert!((hits[0].score - 1.0).abs() < 1e-4, "exact match scores ~1, got {}", hits[0].score);
	assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
	assert_eq!(hits[0].embed_mode, Some(EmbedMode::Model));

	let only_two = index.search(&unit(4, 0), 5, &[2]).await.expect("filtered search");
	assert!(!only_two.is_empty());
	assert!(only_two.iter().all(|h| h.chunk.document_id == 2));

	assert_eq!(index.delete_document(1).await.unwrap(), 3);
	assert_eq!(index.backend().count().await.unwrap(), 2);
	let after = index.search(&unit(4, 0), 5, &[]).await.unwrap();
	assert!(after.iter().all(|h| h.chunk.document_id != 1));

	index.reset().await.unwrap();
	assert_eq!(index.backend().count().await.unwrap(), 0);
	index.add(&chunks(3, 1), &embeddings(6, 1)).await.expect("new size after reset");
	assert!(index.backend_in_sync());
	assert_eq!(index.backend().count().await.unwrap(), 1);
}

#[tokio::test]
async fn lance_settings_build_an_external_index() {
	let tmp = TempDir::new().expect("tmp");
	let settings = VectorSettings {
		backend: VectorBackendKind::Lance,
		uri: tmp.path().join("db").to_string_lossy().into_owned(),
		table: "chunks".to_string(),
	};
	let index = index_from_settings(&settings).await.expect("index");
	index.add(&chunks(1, 1), &embeddings(3, 1)).await.unwrap();
	assert_eq!(index.search(&unit(3, 0), 1, &[]).await.unwrap().len(), 1);
}
