use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	#[serde(default)]
	pub memory: Memory,
	#[serde(default)]
	pub agent: Agent,
	pub security: Security,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub log_level: String,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
	#[serde(default)]
	pub backend: StorageBackend,
	pub postgres: Option<Postgres>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
	#[default]
	Postgres,
	/// Process-local storage. Everything is lost on restart.
	Memory,
}

#[derive(Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
	pub generation: LlmProviderConfig,
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
pub struct LlmProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub temperature: f32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Memory {
	/// Maximum number of notes injected into a prompt.
	pub top_k: u32,
	/// Notes scoring at or below this cosine similarity are never injected.
	pub similarity_threshold: f32,
	pub allow_empty_notes: bool,
}
impl Default for Memory {
	fn default() -> Self {
		Self { top_k: 3, similarity_threshold: 0.5, allow_empty_notes: false }
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Agent {
	/// Reject turns whose conversation_id belongs to another user.
	pub enforce_conversation_ownership: bool,
	/// Run turns on the same conversation one at a time.
	pub serialize_turns: bool,
}
impl Default for Agent {
	fn default() -> Self {
		Self { enforce_conversation_ownership: false, serialize_turns: true }
	}
}

#[derive(Debug, Deserialize)]
pub struct Security {
	pub bind_localhost_only: bool,
	pub jwt_secret: String,
	#[serde(default = "default_token_ttl_days")]
	pub token_ttl_days: i64,
	#[serde(default = "default_password_iterations")]
	pub password_iterations: u32,
}

fn default_token_ttl_days() -> i64 {
	30
}

fn default_password_iterations() -> u32 {
	100_000
}
