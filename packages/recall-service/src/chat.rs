pub mod prompt;

use std::{
	sync::{Arc, Mutex},
	time::Instant,
};

use ahash::AHashMap;
use time::OffsetDateTime;

use crate::{
	Error, Providers, SamplingParams, ServiceResult, TurnStore,
	indexing::IndexingService,
	search::{SearchHit, SearchRequest, SearchService},
};
use recall_domain::{
	format::{OutputFormat, SourceRef, format_answer},
	language,
	redaction::redact,
	validation::{ValidationConfig, ValidationReport, validate, warrants_retry},
};
use recall_storage::models::NewTurn;

const MAX_SOURCE_REFS: usize = 3;
const SOURCE_SCAN_ITEMS: usize = 5;
const SUMMARY_WINDOW_TURNS: usize = 6;

pub const CHAT_HISTORY_TABLE: &str = "chat_history";
pub const CHAT_SUMMARY_TABLE: &str = "chat";

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ChatRequest {
	pub user_id: i64,
	pub chat_id: Option<i64>,
	pub message: String,
	#[serde(default)]
	pub output_format: Option<String>,
	#[serde(default)]
	pub temperature: Option<f32>,
	#[serde(default)]
	pub max_tokens: Option<u32>,
	#[serde(default)]
	pub threshold: Option<f32>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ChatResponse {
	pub user_id: i64,
	pub chat_id: Option<i64>,
	pub message: String,
	pub answer: String,
	pub sources: Vec<SourceRef>,
	pub validation: ValidationReport,
	pub filtered: bool,
	pub retried: bool,
	pub format: OutputFormat,
	pub retrieval_source: crate::search::SearchSource,
	pub processing_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
	User,
	Assistant,
}

impl Role {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::User => "user",
			Self::Assistant => "assistant",
		}
	}
}

#[derive(Debug, Clone)]
pub struct SessionTurn {
	pub role: Role,
	pub content: String,
}

#[derive(Default)]
struct Session {
	turns: Vec<SessionTurn>,
	completed_turns: u64,
}

/// Per-session conversation orchestration: retrieval, prompt assembly,
/// generation with one bounded retry, post-processing, persistence, and
/// self-indexing of the finished turn back into the retrieval index.
///
/// Turns for one session key are serialized behind a per-key async mutex;
/// turns for distinct sessions proceed concurrently.
pub struct ChatService {
	cfg: Arc<recall_config::Config>,
	providers: Providers,
	search: Arc<SearchService>,
	indexing: Arc<IndexingService>,
	turns: Arc<dyn TurnStore>,
	sessions: Mutex<AHashMap<String, Arc<tokio::sync::Mutex<Session>>>>,
}

impl ChatService {
	pub fn new(
		cfg: Arc<recall_config::Config>,
		providers: Providers,
		search: Arc<SearchService>,
		indexing: Arc<IndexingService>,
		turns: Arc<dyn TurnStore>,
	) -> Self {
		Self {
			cfg,
			providers,
			search,
			indexing,
			turns,
			sessions: Mutex::new(AHashMap::new()),
		}
	}

	pub async fn send(&self, req: ChatRequest) -> ServiceResult<ChatResponse> {
		let started = Instant::now();
		let message = req.message.trim().to_string();

		if message.is_empty() {
			return Err(Error::InvalidRequest {
				message: "message must be non-empty.".to_string(),
			});
		}

		let session_key = session_key(req.user_id, req.chat_id);
		let handle = self.session_handle(&session_key);
		let mut session = handle.lock().await;

		let localize = self.needs_localization(&message);
		let working_message = if localize {
			self.search.translate_for_embedding(&message).await
		} else {
			message.clone()
		};

		let outcome = self
			.search
			.retrieve(SearchRequest {
				query: working_message.clone(),
				top_k: Some(self.cfg.chat.max_context_items),
				use_cache: Some(true),
				threshold: req.threshold,
			})
			.await?;
		let context_texts = context_texts(&outcome.results);
		let prompt = prompt::build(
			&working_message,
			&outcome.results,
			&session.turns,
			self.cfg.chat.max_history_turns,
		);
		let params = SamplingParams {
			temperature: req.temperature.unwrap_or(self.cfg.providers.generation.temperature),
			max_tokens: req.max_tokens.unwrap_or(self.cfg.providers.generation.max_tokens),
		};
		let generated = self.generate(&prompt, params).await?;
		let mut answer = self.localize_answer(generated, localize).await;
		let validation_cfg = ValidationConfig {
			min_chars: self.cfg.chat.min_response_chars,
			max_chars: self.cfg.chat.max_response_chars,
		};
		let mut report = validate(&answer, &context_texts, validation_cfg);
		let mut retried = false;

		if warrants_retry(&report.issues) {
			retried = true;

			let retry_params = SamplingParams {
				temperature: self.cfg.providers.generation.retry_temperature,
				..params
			};

			match self.generate(&prompt, retry_params).await {
				Ok(candidate) => {
					let candidate = self.localize_answer(candidate, localize).await;
					let candidate_report = validate(&candidate, &context_texts, validation_cfg);

					if candidate_report.is_valid
						|| candidate_report.issues.len() < report.issues.len()
					{
						answer = candidate;
						report = candidate_report;
					}
				},
				Err(err) => {
					tracing::warn!(error = %err, "Retry generation failed; keeping first answer.");
				},
			}
		}

		let redacted = redact(&answer, &self.cfg.chat.redaction_keywords);
		let capped = cap_length(redacted.text, self.cfg.chat.max_response_chars);
		let sources = collect_sources(&outcome.results);
		let format = req
			.output_format
			.as_deref()
			.map(OutputFormat::parse)
			.unwrap_or_default();
		let formatted = format_answer(&capped, &sources, format);

		// History feeds future prompts, so it keeps the processed answer
		// without the presentation footer.
		session.turns.push(SessionTurn { role: Role::User, content: message.clone() });
		session.turns.push(SessionTurn { role: Role::Assistant, content: capped.clone() });
		session.completed_turns += 1;

		let now = OffsetDateTime::now_utc();
		let persisted = [
			NewTurn {
				chat_id: req.chat_id,
				session_key: session_key.clone(),
				message_type: Role::User.as_str().to_string(),
				content: message.clone(),
				created_at: now,
			},
			NewTurn {
				chat_id: req.chat_id,
				session_key: session_key.clone(),
				message_type: Role::Assistant.as_str().to_string(),
				content: formatted.clone(),
				created_at: now,
			},
		];

		if let Err(err) = self.turns.insert_turns(&persisted).await {
			tracing::error!(error = %err, session = %session_key, "Turn persistence failed; answer still returned.");
		}

		self.self_index(&session_key, &session, req.user_id, &message, &capped).await;

		drop(session);

		Ok(ChatResponse {
			user_id: req.user_id,
			chat_id: req.chat_id,
			message,
			answer: formatted,
			sources,
			validation: report,
			filtered: redacted.filtered,
			retried,
			format,
			retrieval_source: outcome.source,
			processing_ms: started.elapsed().as_millis() as u64,
		})
	}

	async fn generate(&self, prompt: &str, params: SamplingParams) -> ServiceResult<String> {
		self.providers
			.generation
			.generate(&self.cfg.providers.generation, prompt, params)
			.await
			.map_err(|err| Error::Generation { message: err.to_string() })
	}

	fn needs_localization(&self, message: &str) -> bool {
		let translation = &self.cfg.providers.translation;

		translation.enabled && language::is_language(message, &translation.source_lang)
	}

	/// Brings the model output back into the session's working language.
	/// The pre-translation text is kept in the logs.
	async fn localize_answer(&self, generated: String, localize: bool) -> String {
		if !localize {
			return generated;
		}

		let translation = &self.cfg.providers.translation;

		match self
			.providers
			.translation
			.translate(
				translation,
				&generated,
				&translation.target_lang,
				&translation.source_lang,
			)
			.await
		{
			Ok(localized) if !localized.trim().is_empty() => {
				tracing::debug!(original = %generated, "Localized generated answer.");

				localized
			},
			Ok(_) => generated,
			Err(err) => {
				tracing::warn!(error = %err, "Answer translation failed; returning model output.");

				generated
			},
		}
	}

	/// Writes the finished turn back into the retrieval index: the Q&A pair
	/// under `chat_history` and a rolling session summary under `chat`.
	/// Failures here never fail the turn.
	async fn self_index(
		&self,
		session_key: &str,
		session: &Session,
		user_id: i64,
		message: &str,
		answer: &str,
	) {
		let qa_text = format!("user: {message}\nassistant: {answer}");
		let qa_row_id = derive_row_id(&format!("{session_key}:{}", session.completed_turns));

		if let Err(err) = self
			.indexing
			.index_document(CHAT_HISTORY_TABLE, qa_row_id, &qa_text, Some(user_id))
			.await
		{
			tracing::warn!(error = %err, session = %session_key, "Self-indexing of the Q&A pair failed.");
		}

		let summary = summarize(&session.turns);
		let summary_row_id = derive_row_id(session_key);

		if let Err(err) = self
			.indexing
			.index_document(CHAT_SUMMARY_TABLE, summary_row_id, &summary, Some(user_id))
			.await
		{
			tracing::warn!(error = %err, session = %session_key, "Self-indexing of the session summary failed.");
		}
	}

	fn session_handle(&self, key: &str) -> Arc<tokio::sync::Mutex<Session>> {
		let mut sessions = self.sessions.lock().expect("session map lock poisoned");

		sessions
			.entry(key.to_string())
			.or_insert_with(|| Arc::new(tokio::sync::Mutex::new(Session::default())))
			.clone()
	}
}

pub fn session_key(user_id: i64, chat_id: Option<i64>) -> String {
	match chat_id {
		Some(chat_id) => format!("user:{user_id}:chat:{chat_id}"),
		None => format!("user:{user_id}"),
	}
}

fn context_texts(results: &[SearchHit]) -> Vec<String> {
	results
		.iter()
		.filter_map(|hit| {
			hit.metadata.text.as_deref().or(hit.metadata.original_text.as_deref())
		})
		.map(str::to_string)
		.collect()
}

fn cap_length(text: String, max_chars: u32) -> String {
	let max_chars = max_chars as usize;

	if text.chars().count() <= max_chars {
		return text;
	}

	let mut capped: String = text.chars().take(max_chars).collect();

	capped.push_str("...");

	capped
}

fn collect_sources(results: &[SearchHit]) -> Vec<SourceRef> {
	let mut sources: Vec<SourceRef> = Vec::new();

	for hit in results.iter().take(SOURCE_SCAN_ITEMS) {
		let table = hit.metadata.table.as_str();

		if table.is_empty() || sources.iter().any(|source| source.table == table) {
			continue;
		}

		sources.push(SourceRef { table: table.to_string(), relevance: hit.score });

		if sources.len() >= MAX_SOURCE_REFS {
			break;
		}
	}

	sources
}

fn summarize(turns: &[SessionTurn]) -> String {
	let start = turns.len().saturating_sub(SUMMARY_WINDOW_TURNS);

	turns[start..]
		.iter()
		.map(|turn| format!("{}: {}", turn.role.as_str(), turn.content))
		.collect::<Vec<_>>()
		.join("\n")
}

fn derive_row_id(seed: &str) -> i64 {
	let hash = blake3::hash(seed.as_bytes());
	let bytes: [u8; 8] = hash.as_bytes()[..8].try_into().expect("hash is at least 8 bytes");

	i64::from_le_bytes(bytes) & i64::MAX
}
