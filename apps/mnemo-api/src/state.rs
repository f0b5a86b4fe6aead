use std::sync::Arc;

use color_eyre::eyre;

use mnemo_config::{Config, StorageBackend};
use mnemo_service::{AgentService, Stores};
use mnemo_storage::{db::Db, in_memory::InMemoryStore};

use crate::realtime::Rooms;

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<AgentService>,
	pub rooms: Arc<Rooms>,
}
impl AppState {
	pub async fn new(config: Config) -> color_eyre::Result<Self> {
		let stores = match config.storage.backend {
			StorageBackend::Postgres => {
				let Some(postgres) = config.storage.postgres.as_ref() else {
					return Err(eyre::eyre!("storage.postgres is required for the postgres backend."));
				};
				let db = Db::connect(postgres).await?;

				db.ensure_schema().await?;

				Stores::shared(Arc::new(db))
			},
			StorageBackend::Memory => {
				tracing::warn!("Using in-memory storage. Data is lost on restart.");

				Stores::shared(Arc::new(InMemoryStore::new()))
			},
		};

		Ok(Self::from_service(AgentService::new(config, stores)))
	}

	pub fn from_service(service: AgentService) -> Self {
		Self { service: Arc::new(service), rooms: Arc::new(Rooms::default()) }
	}
}
