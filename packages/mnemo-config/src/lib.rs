mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Agent, Config, EmbeddingProviderConfig, LlmProviderConfig, Memory, Postgres, Providers,
	Security, Service, Storage, StorageBackend,
};

use std::{fs, path::Path};

pub const MAX_TOKEN_TTL_DAYS: i64 = 3_650;

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

	match (cfg.storage.backend, cfg.storage.postgres.as_ref()) {
		(StorageBackend::Postgres, None) => {
			return Err(Error::Validation {
				message: "storage.postgres is required when storage.backend is postgres."
					.to_string(),
			});
		},
		(StorageBackend::Postgres, Some(postgres)) => {
			if postgres.dsn.trim().is_empty() {
				return Err(Error::Validation {
					message: "storage.postgres.dsn must be non-empty.".to_string(),
				});
			}
			if postgres.pool_max_conns == 0 {
				return Err(Error::Validation {
					message: "storage.postgres.pool_max_conns must be greater than zero."
						.to_string(),
				});
			}
		},
		(StorageBackend::Memory, _) => {},
	}

	if cfg.providers.embedding.dimensions == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must be greater than zero.".to_string(),
		});
	}

	for (label, timeout_ms) in [
		("embedding", cfg.providers.embedding.timeout_ms),
		("generation", cfg.providers.generation.timeout_ms),
	] {
		if timeout_ms == 0 {
			return Err(Error::Validation {
				message: format!("Provider {label} timeout_ms must be greater than zero."),
			});
		}
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

	if !cfg.providers.generation.temperature.is_finite()
		|| cfg.providers.generation.temperature < 0.0
	{
		return Err(Error::Validation {
			message: "providers.generation.temperature must be a finite number zero or greater."
				.to_string(),
		});
	}
	if cfg.memory.top_k == 0 {
		return Err(Error::Validation {
			message: "memory.top_k must be greater than zero.".to_string(),
		});
	}
	if !cfg.memory.similarity_threshold.is_finite() {
		return Err(Error::Validation {
			message: "memory.similarity_threshold must be a finite number.".to_string(),
		});
	}
	if !(-1.0..=1.0).contains(&cfg.memory.similarity_threshold) {
		return Err(Error::Validation {
			message: "memory.similarity_threshold must be in the range -1.0-1.0.".to_string(),
		});
	}
	if cfg.security.jwt_secret.trim().is_empty() {
		return Err(Error::Validation {
			message: "security.jwt_secret must be non-empty.".to_string(),
		});
	}
	if cfg.security.token_ttl_days <= 0 {
		return Err(Error::Validation {
			message: "security.token_ttl_days must be greater than zero.".to_string(),
		});
	}
	if cfg.security.token_ttl_days > MAX_TOKEN_TTL_DAYS {
		return Err(Error::Validation {
			message: format!("security.token_ttl_days must be at most {MAX_TOKEN_TTL_DAYS}."),
		});
	}
	if cfg.security.password_iterations == 0 {
		return Err(Error::Validation {
			message: "security.password_iterations must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	cfg.service.log_level = cfg.service.log_level.trim().to_string();

	if cfg.service.log_level.is_empty() {
		cfg.service.log_level = "info".to_string();
	}
	if cfg.storage.backend == StorageBackend::Memory
		&& cfg.storage.postgres.as_ref().map(|pg| pg.dsn.trim().is_empty()).unwrap_or(false)
	{
		cfg.storage.postgres = None;
	}
}
