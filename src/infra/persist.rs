//! Defensive local persistence
//!
//! The snapshot and the outbound queue are each one serialized JSON object
//! under a fixed file name. Reads never fail: a missing, unreadable or corrupt
//! file deserializes to the type's default so a bad disk state can degrade the
//! app to empty-but-working instead of crashing it.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use tracing::warn;

/// File name of the whole-app snapshot (profile, entries, notes, habit logs,
/// progress flags).
pub const SNAPSHOT_FILE: &str = "snapshot.json";

/// File name of the outbound mutation queue.
pub const OUTBOX_FILE: &str = "outbox.json";

/// Writes state objects under a data directory.
///
/// An ephemeral persister (no directory) is used by tests and by callers that
/// explicitly opt out of durability; loads return defaults and saves are
/// no-ops.
#[derive(Debug, Clone)]
pub struct Persister {
	dir: Option<PathBuf>,
}

impl Persister {
	pub fn at(dir: impl Into<PathBuf>) -> Self {
		Self {
			dir: Some(dir.into()),
		}
	}

	pub fn ephemeral() -> Self {
		Self { dir: None }
	}

	/// Load `file`, falling back to `T::default()` on any failure.
	pub fn load<T: DeserializeOwned + Default>(&self, file: &str) -> T {
		let Some(path) = self.dir.as_ref().map(|d| d.join(file)) else {
			return T::default();
		};

		match fs::read_to_string(&path) {
			Ok(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
				warn!(path = %path.display(), error = %e, "Corrupt persisted state, starting empty");
				T::default()
			}),
			// Missing file is the normal first-launch case.
			Err(_) => T::default(),
		}
	}

	/// Persist `value` to `file`. Failures are logged, never raised; the
	/// in-memory copy stays authoritative for this process.
	pub fn save<T: Serialize>(&self, file: &str, value: &T) {
		let Some(dir) = &self.dir else { return };

		if let Err(e) = fs::create_dir_all(dir) {
			warn!(dir = %dir.display(), error = %e, "Failed to create data directory");
			return;
		}

		let path = dir.join(file);
		match serde_json::to_string(value) {
			Ok(json) => {
				if let Err(e) = fs::write(&path, json) {
					warn!(path = %path.display(), error = %e, "Failed to persist state");
				}
			}
			Err(e) => warn!(path = %path.display(), error = %e, "Failed to serialize state"),
		}
	}
}
