use std::{
	collections::HashMap,
	sync::{Arc, Mutex},
};

use tokio::sync::broadcast;

pub use recall_service::{
	ChatRequest, ChatResponse, ChatService, Error as ServiceError, IndexingService,
	RankingCriteria, SearchOutcome, SearchRequest, SearchService,
};

use recall_service::Providers;
use recall_storage::{db::Db, qdrant::QdrantStore};

const BROADCAST_CAPACITY: usize = 32;

#[derive(Clone)]
pub struct AppState {
	pub search: Arc<SearchService>,
	pub indexing: Arc<IndexingService>,
	pub chat: Arc<ChatService>,
	channels: Arc<Mutex<HashMap<String, broadcast::Sender<String>>>>,
}

impl AppState {
	pub async fn new(config: recall_config::Config) -> color_eyre::Result<Self> {
		let cfg = Arc::new(config);
		let db = Db::connect(&cfg.storage.postgres).await?;

		db.ensure_schema().await?;

		let qdrant = QdrantStore::new(&cfg.storage.qdrant)?;

		qdrant.ensure_collection().await?;

		let db = Arc::new(db);
		let qdrant = Arc::new(qdrant);
		let providers = Providers::default();
		let search =
			Arc::new(SearchService::new(cfg.clone(), providers.clone(), qdrant.clone()));
		let indexing = Arc::new(IndexingService::new(
			cfg.clone(),
			providers.clone(),
			qdrant,
			db.clone(),
		));
		let chat =
			Arc::new(ChatService::new(cfg, providers, search.clone(), indexing.clone(), db));

		Ok(Self { search, indexing, chat, channels: Arc::new(Mutex::new(HashMap::new())) })
	}

	/// One broadcast channel per session key fans a response out to every
	/// device connection sharing that chat.
	pub fn subscribe(&self, key: &str) -> broadcast::Receiver<String> {
		let mut channels = self.channels.lock().expect("channel map lock poisoned");

		channels
			.entry(key.to_string())
			.or_insert_with(|| broadcast::channel(BROADCAST_CAPACITY).0)
			.subscribe()
	}

	pub fn publish(&self, key: &str, payload: String) {
		let channels = self.channels.lock().expect("channel map lock poisoned");

		if let Some(sender) = channels.get(key) {
			// Send only fails when no receiver is connected, which is fine.
			let _ = sender.send(payload);
		}
	}
}
