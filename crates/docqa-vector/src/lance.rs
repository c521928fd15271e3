use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use arrow_array::types::Float32Type;
use arrow_array::{Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray, UInt32Array, UInt64Array};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::database::CreateTableMode;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, Connection, DistanceType, Table};
use tracing::{debug, info};

use docqa_core::types::{Chunk, DocumentId, EmbedMode, Embeddings, ScoredChunk, SourceKind};

use crate::backend::VectorBackend;

pub fn chunk_schema(vector_size: i32) -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new("id", DataType::UInt64, false),
		Field::new("chunk_id", DataType::UInt64, false),
		Field::new("document_id", DataType::UInt64, false),
		Field::new("page", DataType::UInt32, false),
		Field::new("position", DataType::UInt32, false),
		Field::new("text", DataType::Utf8, false),
		Field::new("embed_mode", DataType::Utf8, false),
		Field::new("vector", DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), vector_size), true),
	]))
}

fn column<'a, T: Array + 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
	batch
		.column_by_name(name)
		.and_then(|c| c.as_any().downcast_ref::<T>())
		.ok_or_else(|| anyhow!("missing or mistyped column `{name}`"))
}

fn parse_embed_mode(s: &str) -> Option<EmbedMode> {
	match s {
		"model" => Some(EmbedMode::Model),
		"hash" => Some(EmbedMode::Hash),
		"mixed" => Some(EmbedMode::Mixed),
		_ => None,
	}
}

/// LanceDB table holding one row per chunk vector, searched by cosine distance.
///
/// The table is (re)created on the first insert after construction or
/// [`reset`](VectorBackend::reset), so rows from an earlier process are
/// discarded and each reset may change the vector size.
pub struct LanceBackend {
	db: Connection,
	table_name: String,
	fresh: AtomicBool,
}

impl LanceBackend {
	pub async fn connect(uri: &str, table_name: &str) -> Result<Self> {
		let db = connect(uri).execute().await?;
		info!(uri, table = table_name, "connected to LanceDB");
		Ok(Self { db, table_name: table_name.to_string(), fresh: AtomicBool::new(true) })
	}

	async fn table(&self) -> Result<Option<Table>> {
		if self.fresh.load(Ordering::SeqCst) {
			return Ok(None);
		}
		Ok(Some(self.db.open_table(&self.table_name).execute().await?))
	}

	fn to_record_batch(ids: &[u64], chunks: &[Chunk], embeddings: &Embeddings) -> Result<RecordBatch> {
		let vector_size = embeddings.dim().ok_or_else(|| anyhow!("empty batch"))?;
		let vector_size = i32::try_from(vector_size)?;
		let mode = embeddings.mode.as_str();
		let vectors = embeddings.vectors.iter().map(|v| Some(v.iter().map(|&x| Some(x)).collect::<Vec<_>>()));
		let batch = RecordBatch::try_new(
			chunk_schema(vector_size),
			vec![
				Arc::new(UInt64Array::from(ids.to_vec())),
				Arc::new(UInt64Array::from(chunks.iter().map(|c| c.id).collect::<Vec<_>>())),
				Arc::new(UInt64Array::from(chunks.iter().map(|c| c.document_id).collect::<Vec<_>>())),
				Arc::new(UInt32Array::from(chunks.iter().map(|c| c.page).collect::<Vec<_>>())),
				Arc::new(UInt32Array::from(chunks.iter().map(|c| c.position).collect::<Vec<_>>())),
				Arc::new(StringArray::from(chunks.iter().map(|c| c.text.as_str()).collect::<Vec<_>>())),
				Arc::new(StringArray::from(vec![mode; chunks.len()])),
				Arc::new(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(vectors, vector_size)),
			],
		)?;
		Ok(batch)
	}

	fn read_hits(batch: &RecordBatch, out: &mut Vec<ScoredChunk>) -> Result<()> {
		let chunk_ids = column::<UInt64Array>(batch, "chunk_id")?;
		let document_ids = column::<UInt64Array>(batch, "document_id")?;
		let pages = column::<UInt32Array>(batch, "page")?;
		let positions = column::<UInt32Array>(batch, "position")?;
		let texts = column::<StringArray>(batch, "text")?;
		let modes = column::<StringArray>(batch, "embed_mode")?;
		let distances = column::<Float32Array>(batch, "_distance")?;
		for i in 0..batch.num_rows() {
			out.push(ScoredChunk {
				chunk: Chunk::new(chunk_ids.value(i), document_ids.value(i), pages.value(i), positions.value(i), texts.value(i)),
				score: 1.0 - distances.value(i),
				source: SourceKind::Vector,
				embed_mode: parse_embed_mode(modes.value(i)),
			});
		}
		Ok(())
	}
}

#[async_trait]
impl VectorBackend for LanceBackend {
	fn name(&self) -> &str {
		"lancedb"
	}

	async fn insert(&self, ids: &[u64], chunks: &[Chunk], embeddings: &Embeddings) -> Result<()> {
		if chunks.is_empty() {
			return Ok(());
		}
		let batch = Self::to_record_batch(ids, chunks, embeddings)?;
		let schema = batch.schema();
		let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
		if self.fresh.swap(false, Ordering::SeqCst) {
			let created = self.db.create_table(&self.table_name, reader).mode(CreateTableMode::Overwrite).execute().await;
			if let Err(e) = created {
				self.fresh.store(true, Ordering::SeqCst);
				return Err(e.into());
			}
			debug!(table = %self.table_name, rows = chunks.len(), "created table");
		} else {
			self.db.open_table(&self.table_name).execute().await?.add(reader).execute().await?;
			debug!(table = %self.table_name, rows = chunks.len(), "appended rows");
		}
		Ok(())
	}

	async fn search(&self, query: &[f32], limit: usize, document_ids: &[DocumentId]) -> Result<Vec<ScoredChunk>> {
		let Some(table) = self.table().await? else { return Ok(Vec::new()) };
		let mut q = table.vector_search(query.to_vec())?.distance_type(DistanceType::Cosine).limit(limit);
		if !document_ids.is_empty() {
			let ids = document_ids.iter().map(|d| d.to_string()).collect::<Vec<_>>().join(", ");
			q = q.only_if(format!("document_id IN ({ids})"));
		}
		let mut stream = q.execute().await?;
		let mut hits = Vec::new();
		while let Some(batch) = stream.try_next().await? {
			Self::read_hits(&batch, &mut hits)?;
		}
		Ok(hits)
	}

	async fn delete_document(&self, document_id: DocumentId) -> Result<()> {
		if let Some(table) = self.table().await? {
			table.delete(&format!("document_id = {document_id}")).await?;
		}
		Ok(())
	}

	async fn reset(&self) -> Result<()> {
		self.fresh.store(true, Ordering::SeqCst);
		Ok(())
	}

	async fn count(&self) -> Result<usize> {
		match self.table().await? {
			Some(table) => Ok(table.count_rows(None).await?),
			None => Ok(0),
		}
	}
}
