//! Patcher configuration.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use livepatch_proto::DEFAULT_SYNTAX;
use livepatch_worker::WorkerConfig;
use serde::Deserialize;
use thiserror::Error;

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error reading a configuration file.
	#[error("I/O error reading {path}: {error}")]
	Io {
		/// Path to the file that failed to read.
		path: PathBuf,
		/// The underlying I/O error.
		error: std::io::Error,
	},

	/// The file is not valid TOML or has unknown keys.
	#[error("invalid config: {0}")]
	Parse(#[from] toml::de::Error),

	/// A value is out of range.
	#[error("invalid value for `{key}`: {reason}")]
	Invalid {
		/// Offending key.
		key: &'static str,
		/// What is wrong with it.
		reason: &'static str,
	},
}

/// Tunables for the core and its worker.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PatcherConfig {
	/// Milliseconds before an unanswered file request resolves empty.
	pub file_timeout_ms: u64,
	/// Syntax assumed for payloads that do not name one.
	pub default_syntax: String,
	/// Documents the engine keeps a baseline for.
	pub cache_capacity: usize,
}

impl Default for PatcherConfig {
	fn default() -> Self {
		Self {
			file_timeout_ms: 3000,
			default_syntax: DEFAULT_SYNTAX.to_string(),
			cache_capacity: 128,
		}
	}
}

impl PatcherConfig {
	/// Parses and validates TOML text.
	pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
		let config: Self = toml::from_str(text)?;
		config.validate()?;
		Ok(config)
	}

	/// Reads a TOML file.
	pub fn load(path: &Path) -> Result<Self, ConfigError> {
		let text = std::fs::read_to_string(path).map_err(|error| ConfigError::Io {
			path: path.to_path_buf(),
			error,
		})?;
		Self::from_toml(&text)
	}

	fn validate(&self) -> Result<(), ConfigError> {
		if self.cache_capacity == 0 {
			return Err(ConfigError::Invalid {
				key: "cache_capacity",
				reason: "must be at least 1",
			});
		}
		if self.default_syntax.trim().is_empty() {
			return Err(ConfigError::Invalid {
				key: "default_syntax",
				reason: "must not be empty",
			});
		}
		Ok(())
	}

	/// File request expiry window.
	pub const fn file_timeout(&self) -> Duration {
		Duration::from_millis(self.file_timeout_ms)
	}

	/// Engine cache capacity; `None` when zero.
	pub fn cache_capacity(&self) -> Option<NonZeroUsize> {
		NonZeroUsize::new(self.cache_capacity)
	}

	/// Settings for the worker.
	pub fn worker_config(&self) -> WorkerConfig {
		WorkerConfig {
			file_timeout: self.file_timeout(),
			default_syntax: self.default_syntax.clone(),
		}
	}
}

#[cfg(test)]
mod tests {
	use std::io::Write;

	use pretty_assertions::assert_eq;

	use super::*;

	#[test]
	fn missing_keys_use_defaults() {
		let config = PatcherConfig::from_toml("file_timeout_ms = 500\n").unwrap();
		assert_eq!(
			config,
			PatcherConfig {
				file_timeout_ms: 500,
				..PatcherConfig::default()
			}
		);
		assert_eq!(config.worker_config().file_timeout, Duration::from_millis(500));
		assert_eq!(config.worker_config().default_syntax, "css");
	}

	#[test]
	fn unknown_keys_are_rejected() {
		assert!(matches!(PatcherConfig::from_toml("timeout = 1\n"), Err(ConfigError::Parse(_))));
	}

	#[test]
	fn zero_capacity_is_rejected() {
		assert!(matches!(
			PatcherConfig::from_toml("cache_capacity = 0\n"),
			Err(ConfigError::Invalid { key: "cache_capacity", .. })
		));
	}

	#[test]
	fn loads_from_file() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(file, "default_syntax = \"css\"\ncache_capacity = 4").unwrap();
		let config = PatcherConfig::load(file.path()).unwrap();
		assert_eq!(config.cache_capacity(), NonZeroUsize::new(4));

		let missing = file.path().with_extension("missing");
		assert!(matches!(PatcherConfig::load(&missing), Err(ConfigError::Io { .. })));
	}
}
