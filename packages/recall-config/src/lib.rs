mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Chat, Config, EmbeddingProviderConfig, GenerationProviderConfig, Indexing, Postgres, Providers,
	Qdrant, Ranking, Search, Service, Storage, TranslationProviderConfig,
};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.http_bind.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.http_bind must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.dsn.trim().is_empty() {
		return Err(Error::Validation {
			message: "storage.postgres.dsn must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}
	if cfg.storage.qdrant.collection.trim().is_empty() {
		return Err(Error::Validation {
			message: "storage.qdrant.collection must be non-empty.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions != cfg.storage.qdrant.vector_dim {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must match storage.qdrant.vector_dim."
				.to_string(),
		});
	}
	if cfg.search.default_top_k == 0 {
		return Err(Error::Validation {
			message: "search.default_top_k must be greater than zero.".to_string(),
		});
	}
	if !cfg.search.default_threshold.is_finite() {
		return Err(Error::Validation {
			message: "search.default_threshold must be a finite number.".to_string(),
		});
	}
	if cfg.search.cache_ttl_secs == 0 {
		return Err(Error::Validation {
			message: "search.cache_ttl_secs must be greater than zero.".to_string(),
		});
	}

	for (label, weight) in [
		("ranking.relevance_weight", cfg.ranking.relevance_weight),
		("ranking.metadata_weight", cfg.ranking.metadata_weight),
		("ranking.keyword_boost", cfg.ranking.keyword_boost),
	] {
		if !weight.is_finite() {
			return Err(Error::Validation {
				message: format!("{label} must be a finite number."),
			});
		}
		if weight < 0.0 {
			return Err(Error::Validation { message: format!("{label} must be zero or greater.") });
		}
	}

	if cfg.indexing.chunk_size == 0 {
		return Err(Error::Validation {
			message: "indexing.chunk_size must be greater than zero.".to_string(),
		});
	}
	if cfg.indexing.chunk_overlap >= cfg.indexing.chunk_size {
		return Err(Error::Validation {
			message: "indexing.chunk_overlap must be less than indexing.chunk_size.".to_string(),
		});
	}
	if cfg.indexing.batch_size == 0 {
		return Err(Error::Validation {
			message: "indexing.batch_size must be greater than zero.".to_string(),
		});
	}
	if cfg.chat.max_context_items == 0 {
		return Err(Error::Validation {
			message: "chat.max_context_items must be greater than zero.".to_string(),
		});
	}
	if cfg.chat.min_response_chars >= cfg.chat.max_response_chars {
		return Err(Error::Validation {
			message: "chat.min_response_chars must be less than chat.max_response_chars."
				.to_string(),
		});
	}

	for (label, key) in [
		("embedding", &cfg.providers.embedding.api_key),
		("generation", &cfg.providers.generation.api_key),
	] {
		if key.trim().is_empty() {
			return Err(Error::Validation {
				message: format!("Provider {label} api_key must be non-empty."),
			});
		}
	}

	if cfg.providers.translation.enabled {
		if cfg.providers.translation.api_base.trim().is_empty() {
			return Err(Error::Validation {
				message: "providers.translation.api_base must be non-empty when enabled."
					.to_string(),
			});
		}
		if cfg.providers.translation.source_lang.trim().is_empty()
			|| cfg.providers.translation.target_lang.trim().is_empty()
		{
			return Err(Error::Validation {
				message: "providers.translation languages must be non-empty when enabled."
					.to_string(),
			});
		}
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	for keyword in &mut cfg.chat.redaction_keywords {
		*keyword = keyword.trim().to_string();
	}

	cfg.chat.redaction_keywords.retain(|keyword| !keyword.is_empty());
	cfg.indexing.exclude_tables.retain(|table| !table.trim().is_empty());
}
