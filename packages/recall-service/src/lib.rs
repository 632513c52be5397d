pub mod chat;
pub mod indexing;
pub mod search;

mod error;

use std::{future::Future, pin::Pin, sync::Arc};

pub use chat::{ChatRequest, ChatResponse, ChatService};
pub use error::{Error, ServiceResult};
pub use indexing::{IndexReport, IndexingService, RecordReport, TableReport};
pub use search::{
	RankingCriteria, SearchHit, SearchOutcome, SearchRequest, SearchService, SearchSource,
};

use recall_config::{
	EmbeddingProviderConfig, GenerationProviderConfig, TranslationProviderConfig,
};
use recall_providers::{embedding, generation, translation};
use recall_storage::{
	db::Db,
	models::{DocMeta, NewTurn, SourceRow},
	qdrant::{QdrantStore, ScoredDoc},
	queries,
};
use uuid::Uuid;

pub use recall_providers::generation::SamplingParams;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>>;
}

pub trait GenerationProvider
where
	Self: Send + Sync,
{
	fn generate<'a>(
		&'a self,
		cfg: &'a GenerationProviderConfig,
		prompt: &'a str,
		params: SamplingParams,
	) -> BoxFuture<'a, color_eyre::Result<String>>;
}

pub trait TranslationProvider
where
	Self: Send + Sync,
{
	fn translate<'a>(
		&'a self,
		cfg: &'a TranslationProviderConfig,
		text: &'a str,
		source: &'a str,
		target: &'a str,
	) -> BoxFuture<'a, color_eyre::Result<String>>;
}

/// The nearest-neighbor index the retrieval pipeline runs against. The core
/// never mutates a stored vector; records are replaced by delete-then-insert
/// under `(table, row_id)`.
pub trait VectorIndex
where
	Self: Send + Sync,
{
	fn upsert<'a>(
		&'a self,
		documents: Vec<(Uuid, Vec<f32>, DocMeta)>,
	) -> BoxFuture<'a, recall_storage::Result<u64>>;

	fn search<'a>(
		&'a self,
		vector: Vec<f32>,
		limit: u64,
	) -> BoxFuture<'a, recall_storage::Result<Vec<ScoredDoc>>>;

	fn delete_record<'a>(
		&'a self,
		table: &'a str,
		row_id: i64,
	) -> BoxFuture<'a, recall_storage::Result<()>>;

	fn count<'a>(&'a self) -> BoxFuture<'a, recall_storage::Result<u64>>;
}

pub trait RowSource
where
	Self: Send + Sync,
{
	fn list_tables<'a>(&'a self) -> BoxFuture<'a, recall_storage::Result<Vec<String>>>;

	fn fetch_rows<'a>(
		&'a self,
		table: &'a str,
		limit: Option<u32>,
	) -> BoxFuture<'a, recall_storage::Result<Vec<SourceRow>>>;

	fn fetch_row<'a>(
		&'a self,
		table: &'a str,
		row_id: i64,
	) -> BoxFuture<'a, recall_storage::Result<Option<SourceRow>>>;
}

pub trait TurnStore
where
	Self: Send + Sync,
{
	fn insert_turns<'a>(&'a self, turns: &'a [NewTurn])
	-> BoxFuture<'a, recall_storage::Result<()>>;
}

#[derive(Clone)]
pub struct Providers {
	pub embedding: Arc<dyn EmbeddingProvider>,
	pub generation: Arc<dyn GenerationProvider>,
	pub translation: Arc<dyn TranslationProvider>,
}

struct DefaultProviders;

impl EmbeddingProvider for DefaultProviders {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>> {
		Box::pin(embedding::embed(cfg, texts))
	}
}

impl GenerationProvider for DefaultProviders {
	fn generate<'a>(
		&'a self,
		cfg: &'a GenerationProviderConfig,
		prompt: &'a str,
		params: SamplingParams,
	) -> BoxFuture<'a, color_eyre::Result<String>> {
		Box::pin(generation::generate(cfg, prompt, params))
	}
}

impl TranslationProvider for DefaultProviders {
	fn translate<'a>(
		&'a self,
		cfg: &'a TranslationProviderConfig,
		text: &'a str,
		source: &'a str,
		target: &'a str,
	) -> BoxFuture<'a, color_eyre::Result<String>> {
		Box::pin(translation::translate(cfg, text, source, target))
	}
}

impl Providers {
	pub fn new(
		embedding: Arc<dyn EmbeddingProvider>,
		generation: Arc<dyn GenerationProvider>,
		translation: Arc<dyn TranslationProvider>,
	) -> Self {
		Self { embedding, generation, translation }
	}
}

impl Default for Providers {
	fn default() -> Self {
		let provider = Arc::new(DefaultProviders);

		Self { embedding: provider.clone(), generation: provider.clone(), translation: provider }
	}
}

impl VectorIndex for QdrantStore {
	fn upsert<'a>(
		&'a self,
		documents: Vec<(Uuid, Vec<f32>, DocMeta)>,
	) -> BoxFuture<'a, recall_storage::Result<u64>> {
		Box::pin(QdrantStore::upsert(self, documents))
	}

	fn search<'a>(
		&'a self,
		vector: Vec<f32>,
		limit: u64,
	) -> BoxFuture<'a, recall_storage::Result<Vec<ScoredDoc>>> {
		Box::pin(QdrantStore::search(self, vector, limit))
	}

	fn delete_record<'a>(
		&'a self,
		table: &'a str,
		row_id: i64,
	) -> BoxFuture<'a, recall_storage::Result<()>> {
		Box::pin(QdrantStore::delete_record(self, table, row_id))
	}

	fn count<'a>(&'a self) -> BoxFuture<'a, recall_storage::Result<u64>> {
		Box::pin(QdrantStore::count(self))
	}
}

impl RowSource for Db {
	fn list_tables<'a>(&'a self) -> BoxFuture<'a, recall_storage::Result<Vec<String>>> {
		Box::pin(queries::list_tables(self))
	}

	fn fetch_rows<'a>(
		&'a self,
		table: &'a str,
		limit: Option<u32>,
	) -> BoxFuture<'a, recall_storage::Result<Vec<SourceRow>>> {
		Box::pin(queries::fetch_source_rows(self, table, limit))
	}

	fn fetch_row<'a>(
		&'a self,
		table: &'a str,
		row_id: i64,
	) -> BoxFuture<'a, recall_storage::Result<Option<SourceRow>>> {
		Box::pin(queries::fetch_source_row(self, table, row_id))
	}
}

impl TurnStore for Db {
	fn insert_turns<'a>(
		&'a self,
		turns: &'a [NewTurn],
	) -> BoxFuture<'a, recall_storage::Result<()>> {
		Box::pin(queries::insert_turns(self, turns))
	}
}
