//! Sync engine configuration
//!
//! Grouped config in the same shape as the rest of the app's configuration:
//! plain serde structs with defaults, loaded from a JSON file next to the
//! snapshot, falling back to defaults when the file is missing or corrupt.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Top-level sync configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SyncConfig {
	pub backoff: BackoffConfig,
	pub debounce: DebounceConfig,
	pub realtime: RealtimeConfig,
	pub polling: PollingConfig,
}

/// Retry backoff for failed outbound mutations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BackoffConfig {
	/// First retry delay in milliseconds.
	pub base_ms: u64,
	/// Upper bound on any retry delay in milliseconds.
	pub cap_ms: u64,
	/// How often the background loop checks for due queue items.
	pub flush_interval_ms: u64,
}

impl Default for BackoffConfig {
	fn default() -> Self {
		Self {
			base_ms: 1_000,
			cap_ms: 30_000,
			flush_interval_ms: 2_000,
		}
	}
}

/// Debounce window for rapid-fire, low-stakes writes (habit counters).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebounceConfig {
	pub habit_flush_ms: u64,
}

impl Default for DebounceConfig {
	fn default() -> Self {
		Self { habit_flush_ms: 800 }
	}
}

/// Realtime feed connection tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RealtimeConfig {
	/// Delay before resubscribing after the feed drops.
	pub reconnect_delay_ms: u64,
}

impl Default for RealtimeConfig {
	fn default() -> Self {
		Self {
			reconnect_delay_ms: 5_000,
		}
	}
}

/// Bounded polling (premium activation confirmation).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PollingConfig {
	pub premium_attempts: u32,
	pub premium_interval_ms: u64,
}

impl Default for PollingConfig {
	fn default() -> Self {
		Self {
			premium_attempts: 10,
			premium_interval_ms: 3_000,
		}
	}
}

impl SyncConfig {
	/// Load configuration from `path`, falling back to defaults.
	///
	/// A missing or unreadable file is normal on first launch; a corrupt file
	/// is logged and treated as absent rather than surfaced as an error.
	pub fn load_or_default(path: &Path) -> Self {
		match fs::read_to_string(path) {
			Ok(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
				warn!(path = %path.display(), error = %e, "Corrupt sync config, using defaults");
				Self::default()
			}),
			Err(_) => Self::default(),
		}
	}

	pub fn save(&self, path: &Path) {
		match serde_json::to_string_pretty(self) {
			Ok(json) => {
				if let Err(e) = fs::write(path, json) {
					warn!(path = %path.display(), error = %e, "Failed to write sync config");
				}
			}
			Err(e) => warn!(error = %e, "Failed to serialize sync config"),
		}
	}
}

impl BackoffConfig {
	pub fn base(&self) -> Duration {
		Duration::from_millis(self.base_ms)
	}

	pub fn cap(&self) -> Duration {
		Duration::from_millis(self.cap_ms)
	}
}
