use std::{
	collections::VecDeque,
	sync::{
		Arc, Mutex,
		atomic::{AtomicUsize, Ordering},
	},
};

use serde_json::Map;
use uuid::Uuid;

use recall_config::{
	Chat, Config, EmbeddingProviderConfig, GenerationProviderConfig, Indexing, Postgres,
	Providers as ProviderSettings, Qdrant, Ranking, Search, Service, Storage,
	TranslationProviderConfig,
};
use recall_service::{
	BoxFuture, ChatRequest, ChatService, EmbeddingProvider, Error, GenerationProvider,
	IndexingService, Providers, RowSource, SamplingParams, SearchRequest, SearchService,
	SearchSource, TranslationProvider, TurnStore, VectorIndex,
	search::{RankingCriteria, SourcePriorityCriterion, ranking},
};
use recall_storage::models::{DocMeta, NewTurn, SourceRow};
use recall_storage::qdrant::ScoredDoc;

const DIM: u32 = 4;

fn test_config() -> Arc<Config> {
	Arc::new(Config {
		service: Service {
			http_bind: "127.0.0.1:8080".to_string(),
			log_level: "info".to_string(),
		},
		storage: Storage {
			postgres: Postgres {
				dsn: "postgres://localhost/recall".to_string(),
				pool_max_conns: 4,
			},
			qdrant: Qdrant {
				url: "http://localhost:6334".to_string(),
				collection: "recall_vectors".to_string(),
				vector_dim: DIM,
			},
		},
		providers: ProviderSettings {
			embedding: EmbeddingProviderConfig {
				provider_id: "mock".to_string(),
				api_base: "http://localhost".to_string(),
				api_key: "key".to_string(),
				path: "/v1/embeddings".to_string(),
				model: "mock-embed".to_string(),
				dimensions: DIM,
				timeout_ms: 1_000,
				default_headers: Map::new(),
			},
			generation: GenerationProviderConfig {
				provider_id: "mock".to_string(),
				api_base: "http://localhost".to_string(),
				api_key: "key".to_string(),
				path: "/v1/chat/completions".to_string(),
				model: "mock-llm".to_string(),
				temperature: 0.7,
				retry_temperature: 0.3,
				max_tokens: 256,
				timeout_ms: 1_000,
				default_headers: Map::new(),
			},
			translation: TranslationProviderConfig {
				enabled: false,
				api_base: String::new(),
				api_key: String::new(),
				path: "/translate".to_string(),
				source_lang: "ko".to_string(),
				target_lang: "en".to_string(),
				timeout_ms: 1_000,
				default_headers: Map::new(),
			},
		},
		search: Search::default(),
		ranking: Ranking::default(),
		indexing: Indexing { batch_size: 2, ..Indexing::default() },
		chat: Chat::default(),
	})
}

struct StaticEmbedding {
	vector: Vec<f32>,
	calls: AtomicUsize,
	fail_after: Option<usize>,
}

impl StaticEmbedding {
	fn new() -> Self {
		Self { vector: vec![0.1, 0.2, 0.3, 0.4], calls: AtomicUsize::new(0), fail_after: None }
	}

	fn failing_after(calls: usize) -> Self {
		Self { fail_after: Some(calls), ..Self::new() }
	}
}

impl EmbeddingProvider for StaticEmbedding {
	fn embed<'a>(
		&'a self,
		_cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>> {
		Box::pin(async move {
			let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

			if let Some(limit) = self.fail_after
				&& call > limit
			{
				return Err(color_eyre::eyre::eyre!("embedding backend unavailable"));
			}

			Ok(vec![self.vector.clone(); texts.len()])
		})
	}
}

struct ScriptedGeneration {
	outputs: Mutex<VecDeque<String>>,
	temperatures: Mutex<Vec<f32>>,
}

impl ScriptedGeneration {
	fn new(outputs: &[&str]) -> Self {
		Self {
			outputs: Mutex::new(outputs.iter().map(|s| s.to_string()).collect()),
			temperatures: Mutex::new(Vec::new()),
		}
	}

	fn calls(&self) -> usize {
		self.temperatures.lock().unwrap().len()
	}
}

impl GenerationProvider for ScriptedGeneration {
	fn generate<'a>(
		&'a self,
		_cfg: &'a GenerationProviderConfig,
		_prompt: &'a str,
		params: SamplingParams,
	) -> BoxFuture<'a, color_eyre::Result<String>> {
		Box::pin(async move {
			self.temperatures.lock().unwrap().push(params.temperature);

			Ok(self
				.outputs
				.lock()
				.unwrap()
				.pop_front()
				.unwrap_or_else(|| "Here is a grounded answer for you.".to_string()))
		})
	}
}

struct IdentityTranslation;

impl TranslationProvider for IdentityTranslation {
	fn translate<'a>(
		&'a self,
		_cfg: &'a TranslationProviderConfig,
		text: &'a str,
		_source: &'a str,
		_target: &'a str,
	) -> BoxFuture<'a, color_eyre::Result<String>> {
		Box::pin(async move { Ok(text.to_string()) })
	}
}

#[derive(Default)]
struct MemoryIndex {
	docs: Mutex<Vec<(Uuid, Vec<f32>, DocMeta)>>,
	scripted: Mutex<Vec<ScoredDoc>>,
	ops: Mutex<Vec<String>>,
}

impl MemoryIndex {
	fn with_scripted(hits: Vec<ScoredDoc>) -> Self {
		Self { scripted: Mutex::new(hits), ..Self::default() }
	}

	fn stored_tables(&self) -> Vec<(String, i64)> {
		self.docs
			.lock()
			.unwrap()
			.iter()
			.map(|(_, _, meta)| (meta.table.clone(), meta.row_id))
			.collect()
	}
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
	let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
	let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
	let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

	if na == 0.0 || nb == 0.0 { 0.0 } else { dot / (na * nb) }
}

impl VectorIndex for MemoryIndex {
	fn upsert<'a>(
		&'a self,
		documents: Vec<(Uuid, Vec<f32>, DocMeta)>,
	) -> BoxFuture<'a, recall_storage::Result<u64>> {
		Box::pin(async move {
			let inserted = documents.len() as u64;

			self.ops.lock().unwrap().push(format!("upsert:{inserted}"));
			self.docs.lock().unwrap().extend(documents);

			Ok(inserted)
		})
	}

	fn search<'a>(
		&'a self,
		vector: Vec<f32>,
		limit: u64,
	) -> BoxFuture<'a, recall_storage::Result<Vec<ScoredDoc>>> {
		Box::pin(async move {
			let scripted = self.scripted.lock().unwrap();

			if !scripted.is_empty() {
				return Ok(scripted.iter().take(limit as usize).cloned().collect());
			}

			drop(scripted);

			let docs = self.docs.lock().unwrap();
			let mut hits: Vec<ScoredDoc> = docs
				.iter()
				.map(|(id, stored, meta)| ScoredDoc {
					id: *id,
					score: cosine(&vector, stored),
					meta: meta.clone(),
				})
				.collect();

			hits.sort_by(|left, right| ranking::cmp_f32_desc(left.score, right.score));
			hits.truncate(limit as usize);

			Ok(hits)
		})
	}

	fn delete_record<'a>(
		&'a self,
		table: &'a str,
		row_id: i64,
	) -> BoxFuture<'a, recall_storage::Result<()>> {
		Box::pin(async move {
			self.ops.lock().unwrap().push(format!("delete:{table}:{row_id}"));
			self.docs
				.lock()
				.unwrap()
				.retain(|(_, _, meta)| !(meta.table == table && meta.row_id == row_id));

			Ok(())
		})
	}

	fn count<'a>(&'a self) -> BoxFuture<'a, recall_storage::Result<u64>> {
		Box::pin(async move { Ok(self.docs.lock().unwrap().len() as u64) })
	}
}

#[derive(Default)]
struct StaticRows {
	tables: Vec<String>,
	rows: Vec<(String, SourceRow)>,
}

impl RowSource for StaticRows {
	fn list_tables<'a>(&'a self) -> BoxFuture<'a, recall_storage::Result<Vec<String>>> {
		Box::pin(async move { Ok(self.tables.clone()) })
	}

	fn fetch_rows<'a>(
		&'a self,
		table: &'a str,
		_limit: Option<u32>,
	) -> BoxFuture<'a, recall_storage::Result<Vec<SourceRow>>> {
		Box::pin(async move {
			Ok(self
				.rows
				.iter()
				.filter(|(owner, _)| owner == table)
				.map(|(_, row)| row.clone())
				.collect())
		})
	}

	fn fetch_row<'a>(
		&'a self,
		table: &'a str,
		row_id: i64,
	) -> BoxFuture<'a, recall_storage::Result<Option<SourceRow>>> {
		Box::pin(async move {
			Ok(self
				.rows
				.iter()
				.find(|(owner, row)| owner == table && row.row_id == row_id)
				.map(|(_, row)| row.clone()))
		})
	}
}

#[derive(Default)]
struct MemoryTurns {
	rows: Mutex<Vec<NewTurn>>,
	fail: bool,
}

impl TurnStore for MemoryTurns {
	fn insert_turns<'a>(
		&'a self,
		turns: &'a [NewTurn],
	) -> BoxFuture<'a, recall_storage::Result<()>> {
		Box::pin(async move {
			if self.fail {
				return Err(recall_storage::Error::InvalidArgument(
					"turn store offline".to_string(),
				));
			}

			self.rows.lock().unwrap().extend(turns.iter().cloned());

			Ok(())
		})
	}
}

fn providers(
	embedding: Arc<StaticEmbedding>,
	generation: Arc<ScriptedGeneration>,
) -> Providers {
	Providers::new(embedding, generation, Arc::new(IdentityTranslation))
}

fn doc(table: &str, row_id: i64, score: f32, text: &str) -> ScoredDoc {
	ScoredDoc {
		id: Uuid::new_v4(),
		score,
		meta: DocMeta {
			table: table.to_string(),
			row_id,
			chunk_index: 0,
			chunk_count: 1,
			text: Some(text.to_string()),
			..Default::default()
		},
	}
}

#[tokio::test]
async fn retrieve_overfetches_gates_and_truncates() {
	let scripted = vec![
		doc("schedule", 1, 0.9, "standup at nine"),
		doc("diet", 2, 0.8, "lunch salad"),
		doc("habit", 3, 0.7, "evening run"),
		doc("user", 4, 0.4, "profile"),
		doc("transaction", 5, 0.3, "coffee purchase"),
		doc("note", 6, 0.2, "scratch"),
		doc("note", 7, 0.1, "never returned"),
	];
	let index = Arc::new(MemoryIndex::with_scripted(scripted));
	let embedding = Arc::new(StaticEmbedding::new());
	let service = SearchService::new(
		test_config(),
		providers(embedding, Arc::new(ScriptedGeneration::new(&[]))),
		index,
	);
	let outcome = service
		.retrieve(SearchRequest {
			query: "what is on my schedule".to_string(),
			top_k: Some(3),
			use_cache: Some(false),
			threshold: Some(0.5),
		})
		.await
		.expect("retrieval failed");

	// Over-fetch asks for 2 * top_k; the gate then drops sub-threshold hits.
	assert_eq!(outcome.total_candidates, 6);
	assert_eq!(outcome.filtered_count, 3);
	assert_eq!(outcome.results.len(), 3);
	assert_eq!(outcome.threshold, 0.5);
	assert_eq!(outcome.source, SearchSource::Search);
	assert!(outcome.results.iter().all(|hit| hit.score >= 0.5));
	assert!(outcome.results.iter().all(|hit| hit.ranking.is_some()));
}

#[tokio::test]
async fn retrieve_serves_repeat_queries_from_cache() {
	let scripted = vec![doc("schedule", 1, 0.9, "standup at nine")];
	let index = Arc::new(MemoryIndex::with_scripted(scripted));
	let embedding = Arc::new(StaticEmbedding::new());
	let service = SearchService::new(
		test_config(),
		providers(embedding.clone(), Arc::new(ScriptedGeneration::new(&[]))),
		index,
	);
	let req = SearchRequest {
		query: "standup time".to_string(),
		top_k: Some(5),
		use_cache: Some(true),
		threshold: None,
	};
	let first = service.retrieve(req.clone()).await.expect("first retrieval failed");
	let second = service.retrieve(req).await.expect("second retrieval failed");

	assert_eq!(first.source, SearchSource::Search);
	assert_eq!(second.source, SearchSource::Cache);
	assert_eq!(second.results.len(), first.results.len());
	assert_eq!(second.results[0].id, first.results[0].id);
	assert_eq!(embedding.calls.load(Ordering::SeqCst), 1);

	service.clear_cache();

	let third = service
		.retrieve(SearchRequest {
			query: "standup time".to_string(),
			top_k: Some(5),
			use_cache: Some(true),
			threshold: None,
		})
		.await
		.expect("third retrieval failed");

	assert_eq!(third.source, SearchSource::Search);
}

#[tokio::test]
async fn keyword_boost_outranks_higher_raw_score() {
	let scripted = vec![
		doc("diet", 2, 0.65, "salad for lunch"),
		doc("habit", 1, 0.6, "morning jog since spring"),
	];
	let index = Arc::new(MemoryIndex::with_scripted(scripted));
	let service = SearchService::new(
		test_config(),
		providers(Arc::new(StaticEmbedding::new()), Arc::new(ScriptedGeneration::new(&[]))),
		index,
	);
	let outcome = service
		.retrieve(SearchRequest {
			query: "아침 조깅 습관은 언제 시작했나요?".to_string(),
			top_k: Some(5),
			use_cache: Some(false),
			threshold: Some(0.1),
		})
		.await
		.expect("retrieval failed");

	assert_eq!(outcome.results[0].metadata.table, "habit");
	assert_eq!(outcome.results[1].metadata.table, "diet");

	let habit = outcome.results[0].ranking.as_ref().expect("missing breakdown");

	// The raw similarity survives untouched next to the derived score.
	assert_eq!(habit.original_score, 0.6);
	assert_eq!(outcome.results[0].score, 0.6);
	assert!(habit.ranking_score > 0.6);
}

#[tokio::test]
async fn tied_ranking_scores_keep_input_order() {
	let first = doc("note", 1, 0.5, "alpha");
	let second = doc("note", 2, 0.5, "beta");
	let third = doc("note", 3, 0.5, "gamma");
	let expected: Vec<Uuid> = vec![first.id, second.id, third.id];
	let index = Arc::new(MemoryIndex::with_scripted(vec![first, second, third]));
	let service = SearchService::new(
		test_config(),
		providers(Arc::new(StaticEmbedding::new()), Arc::new(ScriptedGeneration::new(&[]))),
		index,
	);
	let outcome = service
		.retrieve(SearchRequest {
			query: "anything".to_string(),
			top_k: Some(5),
			use_cache: Some(false),
			threshold: None,
		})
		.await
		.expect("retrieval failed");
	let actual: Vec<Uuid> = outcome.results.iter().map(|hit| hit.id).collect();

	assert_eq!(actual, expected);
}

#[tokio::test]
async fn source_priority_criteria_orders_tagged_tables_first() {
	let scripted = vec![
		doc("note", 3, 0.5, "untagged"),
		doc("habit", 2, 0.5, "habit entry"),
		doc("schedule", 1, 0.5, "schedule entry"),
	];
	let index = Arc::new(MemoryIndex::with_scripted(scripted));
	let service = SearchService::new(
		test_config(),
		providers(Arc::new(StaticEmbedding::new()), Arc::new(ScriptedGeneration::new(&[]))),
		index,
	);
	let criteria = RankingCriteria {
		source_priority: Some(SourcePriorityCriterion {
			weight: 1.0,
			ordered_sources: vec!["schedule".to_string(), "habit".to_string()],
		}),
		..Default::default()
	};
	let outcome = service
		.retrieve_with_criteria(
			SearchRequest {
				query: "anything at all".to_string(),
				top_k: Some(5),
				use_cache: Some(false),
				threshold: None,
			},
			criteria,
		)
		.await
		.expect("retrieval failed");
	let tables: Vec<&str> =
		outcome.results.iter().map(|hit| hit.metadata.table.as_str()).collect();

	assert_eq!(tables, vec!["schedule", "habit", "note"]);
	assert!(outcome.applied_criteria.is_some());
}

#[tokio::test]
async fn reindexing_a_record_replaces_its_vectors() {
	let index = Arc::new(MemoryIndex::default());
	let rows = Arc::new(StaticRows::default());
	let service = IndexingService::new(
		test_config(),
		providers(Arc::new(StaticEmbedding::new()), Arc::new(ScriptedGeneration::new(&[]))),
		index.clone(),
		rows,
	);

	service
		.index_document("schedule", 42, "first generation text", None)
		.await
		.expect("first indexing failed");
	service
		.index_document("schedule", 42, "second generation text", None)
		.await
		.expect("second indexing failed");

	let stored = index.stored_tables();

	assert_eq!(stored, vec![("schedule".to_string(), 42)]);

	let ops = index.ops.lock().unwrap().clone();

	assert_eq!(ops, vec!["delete:schedule:42", "upsert:1", "delete:schedule:42", "upsert:1"]);

	let docs = index.docs.lock().unwrap();

	assert_eq!(docs[0].2.text.as_deref(), Some("second generation text"));
}

#[tokio::test]
async fn batch_failure_reports_partial_progress() {
	let index = Arc::new(MemoryIndex::default());
	let rows = Arc::new(StaticRows {
		tables: vec!["schedule".to_string()],
		rows: (1..=4)
			.map(|row_id| {
				(
					"schedule".to_string(),
					SourceRow {
						row_id,
						fields: vec![
							("id".to_string(), serde_json::json!(row_id)),
							("title".to_string(), serde_json::json!(format!("event {row_id}"))),
						],
					},
				)
			})
			.collect(),
	});
	// Batch size 2, four rows: the first batch lands, the second fails.
	let service = IndexingService::new(
		test_config(),
		providers(
			Arc::new(StaticEmbedding::failing_after(1)),
			Arc::new(ScriptedGeneration::new(&[])),
		),
		index.clone(),
		rows,
	);
	let err = service.index_table("schedule").await.expect_err("expected batch failure");

	match err {
		Error::BatchIndexing { indexed, .. } => assert_eq!(indexed, 2),
		other => panic!("unexpected error: {other}"),
	}
	assert_eq!(index.docs.lock().unwrap().len(), 2);
}

fn chat_fixture(
	generation: Arc<ScriptedGeneration>,
	turns: Arc<MemoryTurns>,
) -> (ChatService, Arc<MemoryIndex>) {
	let cfg = test_config();
	let index = Arc::new(MemoryIndex::default());
	let embedding = Arc::new(StaticEmbedding::new());
	let providers = providers(embedding, generation);
	let search = Arc::new(SearchService::new(cfg.clone(), providers.clone(), index.clone()));
	let indexing = Arc::new(IndexingService::new(
		cfg.clone(),
		providers.clone(),
		index.clone(),
		Arc::new(StaticRows::default()),
	));
	let chat = ChatService::new(cfg, providers, search, indexing, turns);

	(chat, index)
}

#[tokio::test]
async fn incomplete_only_answer_is_returned_without_retry() {
	let generation =
		Arc::new(ScriptedGeneration::new(&["The jog started back when you first"]));
	let turns = Arc::new(MemoryTurns::default());
	let (chat, _index) = chat_fixture(generation.clone(), turns);
	let response = chat
		.send(ChatRequest {
			user_id: 7,
			chat_id: Some(1),
			message: "When did the jogging habit start?".to_string(),
			output_format: Some("simple".to_string()),
			temperature: None,
			max_tokens: None,
			threshold: None,
		})
		.await
		.expect("chat turn failed");

	assert!(!response.retried);
	assert_eq!(generation.calls(), 1);
	assert!(!response.validation.is_valid);
	assert_eq!(response.answer, "The jog started back when you first");
}

#[tokio::test]
async fn substantive_issue_triggers_one_cooler_retry() {
	let generation = Arc::new(ScriptedGeneration::new(&[
		"Your balance is exactly 98765 won right now.",
		"I cannot find that amount in your records, sorry.",
	]));
	let turns = Arc::new(MemoryTurns::default());
	let (chat, _index) = chat_fixture(generation.clone(), turns);
	let response = chat
		.send(ChatRequest {
			user_id: 7,
			chat_id: Some(2),
			message: "How much money do I have?".to_string(),
			output_format: Some("simple".to_string()),
			temperature: None,
			max_tokens: None,
			threshold: None,
		})
		.await
		.expect("chat turn failed");

	assert!(response.retried);
	assert_eq!(generation.calls(), 2);
	assert_eq!(response.answer, "I cannot find that amount in your records, sorry.");
	assert!(response.validation.is_valid);

	let temperatures = generation.temperatures.lock().unwrap().clone();

	assert_eq!(temperatures, vec![0.7, 0.3]);
}

#[tokio::test]
async fn persistence_failure_does_not_abort_the_turn() {
	let generation = Arc::new(ScriptedGeneration::new(&[]));
	let turns = Arc::new(MemoryTurns { fail: true, ..Default::default() });
	let (chat, _index) = chat_fixture(generation, turns.clone());
	let response = chat
		.send(ChatRequest {
			user_id: 7,
			chat_id: None,
			message: "Anything planned today?".to_string(),
			output_format: None,
			temperature: None,
			max_tokens: None,
			threshold: None,
		})
		.await
		.expect("chat turn failed");

	assert!(!response.answer.is_empty());
	assert!(turns.rows.lock().unwrap().is_empty());
}

#[tokio::test]
async fn completed_turns_are_persisted_and_self_indexed() {
	let generation = Arc::new(ScriptedGeneration::new(&[]));
	let turns = Arc::new(MemoryTurns::default());
	let (chat, index) = chat_fixture(generation, turns.clone());

	chat.send(ChatRequest {
		user_id: 7,
		chat_id: Some(9),
		message: "Anything planned today?".to_string(),
		output_format: None,
		temperature: None,
		max_tokens: None,
		threshold: None,
	})
	.await
	.expect("chat turn failed");

	let persisted = turns.rows.lock().unwrap();

	assert_eq!(persisted.len(), 2);
	assert_eq!(persisted[0].message_type, "user");
	assert_eq!(persisted[1].message_type, "assistant");
	assert_eq!(persisted[0].session_key, "user:7:chat:9");

	let tables: Vec<String> =
		index.stored_tables().into_iter().map(|(table, _)| table).collect();

	assert!(tables.contains(&"chat_history".to_string()));
	assert!(tables.contains(&"chat".to_string()));
}

#[tokio::test]
async fn self_indexed_turns_become_retrievable_context() {
	let generation = Arc::new(ScriptedGeneration::new(&[]));
	let turns = Arc::new(MemoryTurns::default());
	let (chat, index) = chat_fixture(generation, turns);

	chat.send(ChatRequest {
		user_id: 7,
		chat_id: Some(4),
		message: "Anything planned today?".to_string(),
		output_format: None,
		temperature: None,
		max_tokens: None,
		threshold: None,
	})
	.await
	.expect("chat turn failed");

	// A fresh retrieval over the same index now surfaces the stored turn.
	let cfg = test_config();
	let search = SearchService::new(
		cfg,
		providers(Arc::new(StaticEmbedding::new()), Arc::new(ScriptedGeneration::new(&[]))),
		index,
	);
	let outcome = search
		.retrieve(SearchRequest {
			query: "what did we talk about".to_string(),
			top_k: Some(5),
			use_cache: Some(false),
			threshold: Some(0.1),
		})
		.await
		.expect("retrieval failed");

	assert!(outcome
		.results
		.iter()
		.any(|hit| hit.metadata.table == "chat_history"));
}

#[tokio::test]
async fn empty_query_is_rejected() {
	let index = Arc::new(MemoryIndex::default());
	let service = SearchService::new(
		test_config(),
		providers(Arc::new(StaticEmbedding::new()), Arc::new(ScriptedGeneration::new(&[]))),
		index,
	);
	let err = service
		.retrieve(SearchRequest {
			query: "   ".to_string(),
			top_k: None,
			use_cache: None,
			threshold: None,
		})
		.await
		.expect_err("expected rejection");

	assert!(matches!(err, Error::InvalidRequest { .. }));
}
