pub mod cache;
pub mod ranking;
pub mod threshold;

use std::{sync::Arc, time::Duration};

use uuid::Uuid;

pub use cache::ScoreCache;
pub use ranking::{
	RankFusion, RankingCriteria, RecencyCriterion, SourcePriorityCriterion, UserRelevanceCriterion,
};

use crate::{Error, Providers, ServiceResult, VectorIndex};
use recall_storage::models::DocMeta;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SearchRequest {
	pub query: String,
	pub top_k: Option<u32>,
	pub use_cache: Option<bool>,
	pub threshold: Option<f32>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SearchHit {
	pub id: Uuid,
	/// Raw similarity from the vector index. Never overwritten; derived
	/// scores live in `ranking`.
	pub score: f32,
	pub metadata: DocMeta,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub ranking: Option<RankingBreakdown>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RankingBreakdown {
	pub ranking_score: f32,
	pub original_score: f32,
	pub table_score: f32,
	pub source_score: f32,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub recency_score: Option<f32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub source_priority_score: Option<f32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub user_score: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchSource {
	Cache,
	Search,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct SearchOutcome {
	pub query: String,
	pub results: Vec<SearchHit>,
	pub total_candidates: usize,
	pub filtered_count: usize,
	pub threshold: f32,
	pub source: SearchSource,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub applied_criteria: Option<RankingCriteria>,
}

/// Composes cache lookup, embedding, over-fetched vector search, threshold
/// gating, rank fusion, and cache write-back into one retrieval call.
pub struct SearchService {
	cfg: Arc<recall_config::Config>,
	providers: Providers,
	index: Arc<dyn VectorIndex>,
	fusion: RankFusion,
	cache: ScoreCache,
}

impl SearchService {
	pub fn new(
		cfg: Arc<recall_config::Config>,
		providers: Providers,
		index: Arc<dyn VectorIndex>,
	) -> Self {
		let fusion = RankFusion::new(&cfg.ranking);
		let cache = ScoreCache::new(Duration::from_secs(cfg.search.cache_ttl_secs));

		Self { cfg, providers, index, fusion, cache }
	}

	pub fn clear_cache(&self) {
		self.cache.clear();
	}

	/// The retrieval protocol. A cache hit returns the stored ranking
	/// untouched, which also skips the per-call keyword re-boost; cached
	/// results answer the query text, not the full parameter set.
	pub async fn retrieve(&self, req: SearchRequest) -> ServiceResult<SearchOutcome> {
		let query = req.query.trim().to_string();

		if query.is_empty() {
			return Err(Error::InvalidRequest { message: "query must be non-empty.".to_string() });
		}

		let top_k = req.top_k.unwrap_or(self.cfg.search.default_top_k).max(1) as usize;
		let use_cache = self.cfg.search.cache_enabled && req.use_cache.unwrap_or(true);
		let threshold = req.threshold.unwrap_or(self.cfg.search.default_threshold);

		if use_cache && let Some(results) = self.cache.get(&query) {
			let count = results.len();

			tracing::debug!(query = %query, hits = count, "Serving retrieval from cache.");

			return Ok(SearchOutcome {
				query,
				results,
				total_candidates: count,
				filtered_count: count,
				threshold,
				source: SearchSource::Cache,
				applied_criteria: None,
			});
		}

		let working_query = self.translate_for_embedding(&query).await;
		let vector = self.embed_query(&working_query).await?;
		let candidates = self
			.index
			.search(vector, (top_k * 2) as u64)
			.await
			.map_err(|err| Error::Retrieval { message: err.to_string() })?;
		let total_candidates = candidates.len();
		let hits: Vec<SearchHit> = candidates
			.into_iter()
			.map(|doc| SearchHit { id: doc.id, score: doc.score, metadata: doc.meta, ranking: None })
			.collect();
		let gated = threshold::filter(hits, threshold);
		let filtered_count = gated.len();
		// Keyword boosts match against the caller's original wording, not
		// the translated embedding text.
		let ranked = self.fusion.rerank(gated, &query);
		let mut results: Vec<SearchHit> = ranked.into_iter().take(top_k).collect();

		restore_original_text(&mut results);

		if use_cache {
			self.cache.set(&query, results.clone());
		}

		Ok(SearchOutcome {
			query,
			results,
			total_candidates,
			filtered_count,
			threshold,
			source: SearchSource::Search,
			applied_criteria: None,
		})
	}

	/// Base retrieval plus request-scoped criteria re-scoring. Cached
	/// outcomes are re-scored too; they are an upper-bound candidate set.
	pub async fn retrieve_with_criteria(
		&self,
		req: SearchRequest,
		criteria: RankingCriteria,
	) -> ServiceResult<SearchOutcome> {
		let mut outcome = self.retrieve(req).await?;

		if criteria.is_empty() || outcome.results.is_empty() {
			return Ok(outcome);
		}

		let now = time::OffsetDateTime::now_utc();

		outcome.results = ranking::apply_criteria(outcome.results, &criteria, now);
		outcome.applied_criteria = Some(criteria);

		Ok(outcome)
	}

	pub(crate) async fn embed_query(&self, text: &str) -> ServiceResult<Vec<f32>> {
		let texts = [text.to_string()];
		let vectors = self
			.providers
			.embedding
			.embed(&self.cfg.providers.embedding, &texts)
			.await
			.map_err(|err| Error::Retrieval { message: err.to_string() })?;
		let Some(vector) = vectors.into_iter().next() else {
			return Err(Error::Retrieval {
				message: "Embedding provider returned no vectors.".to_string(),
			});
		};

		if vector.len() != self.cfg.storage.qdrant.vector_dim as usize {
			return Err(Error::Retrieval {
				message: "Embedding vector dimension mismatch.".to_string(),
			});
		}

		Ok(vector)
	}

	/// Maps the query into the embedding model's working language when the
	/// translation collaborator is enabled and the text is in the configured
	/// source language. Translation trouble degrades to the original text.
	pub(crate) async fn translate_for_embedding(&self, query: &str) -> String {
		let translation = &self.cfg.providers.translation;

		if !translation.enabled
			|| !recall_domain::language::is_language(query, &translation.source_lang)
		{
			return query.to_string();
		}

		match self
			.providers
			.translation
			.translate(translation, query, &translation.source_lang, &translation.target_lang)
			.await
		{
			Ok(translated) if !translated.trim().is_empty() => translated,
			Ok(_) => query.to_string(),
			Err(err) => {
				tracing::warn!(error = %err, "Query translation failed; embedding original text.");

				query.to_string()
			},
		}
	}
}

/// Surfaces the stored original-language text on selected results. The
/// translated text remains available under `text` in the index payload, so
/// nothing is discarded.
fn restore_original_text(results: &mut [SearchHit]) {
	for hit in results {
		if let Some(original) = hit.metadata.original_text.clone() {
			hit.metadata.text = Some(original);
		}
	}
}
