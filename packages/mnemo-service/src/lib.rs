pub mod auth;
pub mod history;
pub mod notes;
pub mod time_serde;
pub mod turn;

mod context;
mod error;
mod locks;

pub use auth::{LoginRequest, LoginResponse, Session, SignupRequest, SignupResponse};
pub use error::{Error, Result};
pub use history::{HistoryRequest, MessageItem};
pub use mnemo_storage::BoxFuture;
pub use notes::{NoteItem, NoteSearchItem, NoteSearchRequest, NotesRequest};
pub use turn::{ChatRequest, TurnRequest, TurnResponse};

use std::{sync::Arc, time::Duration};

use mnemo_config::{Config, EmbeddingProviderConfig, LlmProviderConfig};
use mnemo_providers::{embedding, generation};
use mnemo_storage::{ConversationStore, MemoryStore, UserStore};

use crate::locks::TurnLocks;

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>>;
}

pub trait GenerationProvider
where
	Self: Send + Sync,
{
	fn generate<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		prompt: &'a str,
	) -> BoxFuture<'a, Result<String>>;
}

#[derive(Clone)]
pub struct Providers {
	pub embedding: Arc<dyn EmbeddingProvider>,
	pub generation: Arc<dyn GenerationProvider>,
}
impl Providers {
	pub fn new(
		embedding: Arc<dyn EmbeddingProvider>,
		generation: Arc<dyn GenerationProvider>,
	) -> Self {
		Self { embedding, generation }
	}
}
impl Default for Providers {
	fn default() -> Self {
		let provider = Arc::new(DefaultProviders);

		Self { embedding: provider.clone(), generation: provider }
	}
}

#[derive(Clone)]
pub struct Stores {
	pub users: Arc<dyn UserStore>,
	pub notes: Arc<dyn MemoryStore>,
	pub conversations: Arc<dyn ConversationStore>,
}
impl Stores {
	pub fn new(
		users: Arc<dyn UserStore>,
		notes: Arc<dyn MemoryStore>,
		conversations: Arc<dyn ConversationStore>,
	) -> Self {
		Self { users, notes, conversations }
	}

	/// Uses one backend for every store.
	pub fn shared<B>(backend: Arc<B>) -> Self
	where
		B: UserStore + MemoryStore + ConversationStore + 'static,
	{
		Self { users: backend.clone(), notes: backend.clone(), conversations: backend }
	}
}

pub struct AgentService {
	pub cfg: Config,
	pub stores: Stores,
	pub providers: Providers,
	turn_locks: TurnLocks,
}
impl AgentService {
	pub fn new(cfg: Config, stores: Stores) -> Self {
		Self::with_providers(cfg, stores, Providers::default())
	}

	pub fn with_providers(cfg: Config, stores: Stores, providers: Providers) -> Self {
		Self { cfg, stores, providers, turn_locks: TurnLocks::default() }
	}

	/// Embeds one text, bounded by the provider timeout and checked against the configured
	/// dimensions.
	pub(crate) async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
		let cfg = &self.cfg.providers.embedding;
		let texts = [text.to_string()];
		let vectors = tokio::time::timeout(
			Duration::from_millis(cfg.timeout_ms),
			self.providers.embedding.embed(cfg, &texts),
		)
		.await
		.map_err(|_| Error::Provider { message: "Embedding provider timed out.".to_string() })??;
		let Some(vec) = vectors.into_iter().next() else {
			return Err(Error::Provider {
				message: "Embedding provider returned no vectors.".to_string(),
			});
		};

		if vec.len() != cfg.dimensions as usize {
			return Err(Error::Provider {
				message: "Embedding vector dimension mismatch.".to_string(),
			});
		}

		Ok(vec)
	}

	pub(crate) async fn generate(&self, prompt: &str) -> Result<String> {
		let cfg = &self.cfg.providers.generation;

		tokio::time::timeout(
			Duration::from_millis(cfg.timeout_ms),
			self.providers.generation.generate(cfg, prompt),
		)
		.await
		.map_err(|_| Error::Provider { message: "Generation provider timed out.".to_string() })?
	}
}

struct DefaultProviders;
impl EmbeddingProvider for DefaultProviders {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
		Box::pin(async move { Ok(embedding::embed(cfg, texts).await?) })
	}
}
impl GenerationProvider for DefaultProviders {
	fn generate<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		prompt: &'a str,
	) -> BoxFuture<'a, Result<String>> {
		Box::pin(async move { Ok(generation::generate(cfg, prompt).await?) })
	}
}
