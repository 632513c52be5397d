use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	#[serde(default)]
	pub search: Search,
	#[serde(default)]
	pub ranking: Ranking,
	#[serde(default)]
	pub indexing: Indexing,
	#[serde(default)]
	pub chat: Chat,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub log_level: String,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
	pub qdrant: Qdrant,
}

#[derive(Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Deserialize)]
pub struct Qdrant {
	pub url: String,
	pub collection: String,
	pub vector_dim: u32,
}

#[derive(Debug, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
	pub generation: GenerationProviderConfig,
	pub translation: TranslationProviderConfig,
}

#[derive(Debug, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct GenerationProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	#[serde(default = "default_temperature")]
	pub temperature: f32,
	#[serde(default = "default_retry_temperature")]
	pub retry_temperature: f32,
	#[serde(default = "default_max_tokens")]
	pub max_tokens: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct TranslationProviderConfig {
	pub enabled: bool,
	pub api_base: String,
	#[serde(default)]
	pub api_key: String,
	pub path: String,
	#[serde(default = "default_source_lang")]
	pub source_lang: String,
	#[serde(default = "default_target_lang")]
	pub target_lang: String,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct Search {
	#[serde(default = "default_top_k")]
	pub default_top_k: u32,
	#[serde(default = "default_threshold")]
	pub default_threshold: f32,
	#[serde(default = "default_cache_enabled")]
	pub cache_enabled: bool,
	#[serde(default = "default_cache_ttl_secs")]
	pub cache_ttl_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct Ranking {
	#[serde(default = "default_relevance_weight")]
	pub relevance_weight: f32,
	#[serde(default = "default_metadata_weight")]
	pub metadata_weight: f32,
	#[serde(default = "default_keyword_boost")]
	pub keyword_boost: f32,
}

#[derive(Debug, Deserialize)]
pub struct Indexing {
	#[serde(default = "default_chunk_size")]
	pub chunk_size: u32,
	#[serde(default = "default_chunk_overlap")]
	pub chunk_overlap: u32,
	#[serde(default = "default_batch_size")]
	pub batch_size: u32,
	#[serde(default = "default_exclude_tables")]
	pub exclude_tables: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct Chat {
	#[serde(default = "default_max_context_items")]
	pub max_context_items: u32,
	#[serde(default = "default_max_history_turns")]
	pub max_history_turns: u32,
	#[serde(default = "default_min_response_chars")]
	pub min_response_chars: u32,
	#[serde(default = "default_max_response_chars")]
	pub max_response_chars: u32,
	#[serde(default)]
	pub redaction_keywords: Vec<String>,
}

impl Default for Search {
	fn default() -> Self {
		Self {
			default_top_k: default_top_k(),
			default_threshold: default_threshold(),
			cache_enabled: default_cache_enabled(),
			cache_ttl_secs: default_cache_ttl_secs(),
		}
	}
}

impl Default for Ranking {
	fn default() -> Self {
		Self {
			relevance_weight: default_relevance_weight(),
			metadata_weight: default_metadata_weight(),
			keyword_boost: default_keyword_boost(),
		}
	}
}

impl Default for Indexing {
	fn default() -> Self {
		Self {
			chunk_size: default_chunk_size(),
			chunk_overlap: default_chunk_overlap(),
			batch_size: default_batch_size(),
			exclude_tables: default_exclude_tables(),
		}
	}
}

impl Default for Chat {
	fn default() -> Self {
		Self {
			max_context_items: default_max_context_items(),
			max_history_turns: default_max_history_turns(),
			min_response_chars: default_min_response_chars(),
			max_response_chars: default_max_response_chars(),
			redaction_keywords: Vec::new(),
		}
	}
}

fn default_temperature() -> f32 {
	0.7
}

fn default_retry_temperature() -> f32 {
	0.3
}

fn default_max_tokens() -> u32 {
	1_024
}

fn default_source_lang() -> String {
	"ko".to_string()
}

fn default_target_lang() -> String {
	"en".to_string()
}

fn default_top_k() -> u32 {
	5
}

fn default_threshold() -> f32 {
	0.1
}

fn default_cache_enabled() -> bool {
	true
}

fn default_cache_ttl_secs() -> u64 {
	3_600
}

fn default_relevance_weight() -> f32 {
	0.7
}

fn default_metadata_weight() -> f32 {
	0.1
}

fn default_keyword_boost() -> f32 {
	1.2
}

fn default_chunk_size() -> u32 {
	1_000
}

fn default_chunk_overlap() -> u32 {
	200
}

fn default_batch_size() -> u32 {
	100
}

fn default_exclude_tables() -> Vec<String> {
	vec!["migrations".to_string(), "alembic_version".to_string()]
}

fn default_max_context_items() -> u32 {
	5
}

fn default_max_history_turns() -> u32 {
	3
}

fn default_min_response_chars() -> u32 {
	10
}

fn default_max_response_chars() -> u32 {
	2_000
}
