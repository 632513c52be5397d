use std::sync::Arc;

use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use uuid::Uuid;

use crate::{Error, Providers, RowSource, ServiceResult, VectorIndex};
use recall_chunking::ChunkingConfig;
use recall_storage::models::{DocMeta, SourceRow};

#[derive(Debug, Clone, serde::Serialize)]
pub struct IndexReport {
	pub total_indexed: u64,
	pub total_vectors: u64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct TableReport {
	pub table: String,
	pub total_indexed: u64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct RecordReport {
	pub table: String,
	pub row_id: i64,
	pub chunks_indexed: u64,
}

struct PendingChunk {
	meta: DocMeta,
	text: String,
}

/// Batch ingestion: enumerate rows, flatten, chunk, embed, upsert. The
/// single-record path deletes the previous generation of vectors first, so
/// re-indexing a record is idempotent under updates.
pub struct IndexingService {
	cfg: Arc<recall_config::Config>,
	providers: Providers,
	index: Arc<dyn VectorIndex>,
	rows: Arc<dyn RowSource>,
}

impl IndexingService {
	pub fn new(
		cfg: Arc<recall_config::Config>,
		providers: Providers,
		index: Arc<dyn VectorIndex>,
		rows: Arc<dyn RowSource>,
	) -> Self {
		Self { cfg, providers, index, rows }
	}

	pub async fn index_all(&self, exclude: &[String]) -> ServiceResult<IndexReport> {
		let tables = self.rows.list_tables().await?;
		let mut pending = Vec::new();

		for table in &tables {
			if exclude.iter().any(|excluded| excluded == table)
				|| self.cfg.indexing.exclude_tables.iter().any(|excluded| excluded == table)
			{
				continue;
			}

			tracing::info!(table = %table, "Collecting rows for indexing.");

			let rows = self.rows.fetch_rows(table, None).await?;

			pending.extend(self.build_chunks(table, &rows));
		}

		let total_indexed = self.process_batches(pending).await?;
		let total_vectors = self.vector_count().await?;

		Ok(IndexReport { total_indexed, total_vectors })
	}

	pub async fn index_table(&self, table: &str) -> ServiceResult<TableReport> {
		let tables = self.rows.list_tables().await?;

		if !tables.iter().any(|known| known == table) {
			return Err(Error::InvalidRequest {
				message: format!("table {table} does not exist."),
			});
		}

		let rows = self.rows.fetch_rows(table, None).await?;
		let pending = self.build_chunks(table, &rows);
		let total_indexed = self.process_batches(pending).await?;

		Ok(TableReport { table: table.to_string(), total_indexed })
	}

	pub async fn index_record(&self, table: &str, row_id: i64) -> ServiceResult<RecordReport> {
		let Some(row) = self.rows.fetch_row(table, row_id).await? else {
			return Err(Error::InvalidRequest {
				message: format!("record {row_id} not found in table {table}."),
			});
		};
		let text = recall_chunking::flatten_row(&row.fields);
		let user_id = row_user_id(&row);
		let chunks_indexed = self.index_document(table, row_id, &text, user_id).await?;

		Ok(RecordReport { table: table.to_string(), row_id, chunks_indexed })
	}

	pub async fn delete_record(&self, table: &str, row_id: i64) -> ServiceResult<()> {
		self.index
			.delete_record(table, row_id)
			.await
			.map_err(|err| Error::Index { message: err.to_string() })
	}

	pub async fn vector_count(&self) -> ServiceResult<u64> {
		self.index.count().await.map_err(|err| Error::Index { message: err.to_string() })
	}

	/// The single-item path shared by record re-indexing and conversation
	/// self-indexing: delete the `(table, row_id)` key, then insert the
	/// replacement chunk set.
	pub async fn index_document(
		&self,
		table: &str,
		row_id: i64,
		text: &str,
		user_id: Option<i64>,
	) -> ServiceResult<u64> {
		self.index
			.delete_record(table, row_id)
			.await
			.map_err(|err| Error::Index { message: err.to_string() })?;

		let chunking = self.chunking_config();
		let now = timestamp();
		let pending: Vec<PendingChunk> = recall_chunking::chunk_row(table, row_id, text, &chunking)
			.into_iter()
			.map(|chunk| PendingChunk {
				meta: DocMeta {
					table: chunk.table,
					row_id: chunk.row_id,
					chunk_index: chunk.chunk_index,
					chunk_count: chunk.chunk_count,
					user_id,
					created_at: Some(now.clone()),
					text: None,
					original_text: None,
					extra: serde_json::Map::new(),
				},
				text: chunk.text,
			})
			.collect();

		self.process_batches(pending).await
	}

	fn build_chunks(&self, table: &str, rows: &[SourceRow]) -> Vec<PendingChunk> {
		let chunking = self.chunking_config();
		let now = timestamp();
		let mut pending = Vec::new();

		for row in rows {
			let text = recall_chunking::flatten_row(&row.fields);

			if text.is_empty() {
				continue;
			}

			let user_id = row_user_id(row);

			for chunk in recall_chunking::chunk_row(table, row.row_id, &text, &chunking) {
				pending.push(PendingChunk {
					meta: DocMeta {
						table: chunk.table,
						row_id: chunk.row_id,
						chunk_index: chunk.chunk_index,
						chunk_count: chunk.chunk_count,
						user_id,
						created_at: Some(now.clone()),
						text: None,
						original_text: None,
						extra: serde_json::Map::new(),
					},
					text: chunk.text,
				});
			}
		}

		pending
	}

	/// Embeds and upserts in bounded batches. Earlier batches stay
	/// committed when a later one fails; the error carries how far the run
	/// got so the caller can resume.
	async fn process_batches(&self, pending: Vec<PendingChunk>) -> ServiceResult<u64> {
		let batch_size = self.cfg.indexing.batch_size.max(1) as usize;
		let mut total_indexed = 0_u64;
		let mut batch_no = 0_u64;

		for batch in pending.chunks(batch_size) {
			batch_no += 1;

			let inserted = match self.process_batch(batch).await {
				Ok(inserted) => inserted,
				Err(err) => {
					return Err(Error::BatchIndexing {
						indexed: total_indexed,
						message: err.to_string(),
					});
				},
			};

			total_indexed += inserted;

			tracing::info!(batch = batch_no, total_indexed, "Indexed batch.");
		}

		Ok(total_indexed)
	}

	async fn process_batch(&self, batch: &[PendingChunk]) -> ServiceResult<u64> {
		let mut texts = Vec::with_capacity(batch.len());

		for chunk in batch {
			texts.push(self.translate_for_indexing(&chunk.text).await);
		}

		let embed_inputs: Vec<String> = texts.iter().map(|(text, _)| text.clone()).collect();
		let vectors = self
			.providers
			.embedding
			.embed(&self.cfg.providers.embedding, &embed_inputs)
			.await
			.map_err(|err| Error::Retrieval { message: err.to_string() })?;

		if vectors.len() != batch.len() {
			return Err(Error::Retrieval {
				message: "Embedding provider returned mismatched vector count.".to_string(),
			});
		}

		let mut documents = Vec::with_capacity(batch.len());

		for ((chunk, (text, original)), vector) in
			batch.iter().zip(texts.into_iter()).zip(vectors.into_iter())
		{
			let mut meta = chunk.meta.clone();

			meta.text = Some(text);
			meta.original_text = original;

			documents.push((Uuid::new_v4(), vector, meta));
		}

		self.index
			.upsert(documents)
			.await
			.map_err(|err| Error::Index { message: err.to_string() })
	}

	/// Returns `(embedding_text, original_text)`. The original is kept on
	/// the payload whenever translation rewrote the text.
	async fn translate_for_indexing(&self, text: &str) -> (String, Option<String>) {
		let translation = &self.cfg.providers.translation;

		if !translation.enabled
			|| !recall_domain::language::is_language(text, &translation.source_lang)
		{
			return (text.to_string(), None);
		}

		match self
			.providers
			.translation
			.translate(translation, text, &translation.source_lang, &translation.target_lang)
			.await
		{
			Ok(translated) if !translated.trim().is_empty() => {
				(translated, Some(text.to_string()))
			},
			Ok(_) => (text.to_string(), None),
			Err(err) => {
				tracing::warn!(error = %err, "Chunk translation failed; indexing original text.");

				(text.to_string(), None)
			},
		}
	}

	fn chunking_config(&self) -> ChunkingConfig {
		ChunkingConfig {
			chunk_size: self.cfg.indexing.chunk_size,
			chunk_overlap: self.cfg.indexing.chunk_overlap,
		}
	}
}

fn row_user_id(row: &SourceRow) -> Option<i64> {
	row.fields
		.iter()
		.find(|(name, _)| name == "user_id")
		.and_then(|(_, value)| value.as_i64())
}

fn timestamp() -> String {
	OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default()
}
