//! Remote store interface
//!
//! The engine treats the remote store purely as a CRUD + realtime-subscription
//! service with opaque persistence guarantees. Anything that speaks this trait
//! (a hosted backend, an in-memory test double) can back the sync engine.

use crate::domain::{EntityKind, EntityRecord, Goal, HabitLog, JournalEntry, QuickNote, UserProfile};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Remote failure taxonomy.
///
/// Transport failures are transient and feed the retry queue; authentication
/// failures pause sync silently until the next valid session. Neither is ever
/// surfaced to the UI as an error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RemoteError {
	#[error("transport error: {0}")]
	Transport(String),
	#[error("unauthorized")]
	Unauthorized,
	#[error("record not found")]
	NotFound,
}

impl RemoteError {
	/// Whether a retry with backoff is worthwhile.
	pub fn is_transient(&self) -> bool {
		matches!(self, Self::Transport(_))
	}
}

/// A complete (or, for incremental pulls, partial) remote copy of one user's
/// data.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteSnapshot {
	pub profile: Option<UserProfile>,
	pub entries: Vec<JournalEntry>,
	pub goals: Vec<Goal>,
	pub notes: Vec<QuickNote>,
	pub habits: Vec<HabitLog>,
}

impl RemoteSnapshot {
	/// Flatten into per-record form for merge application.
	pub fn into_records(self) -> Vec<EntityRecord> {
		let mut records = Vec::with_capacity(
			self.entries.len() + self.goals.len() + self.notes.len() + self.habits.len() + 1,
		);
		records.extend(self.entries.into_iter().map(EntityRecord::Entry));
		records.extend(self.goals.into_iter().map(EntityRecord::Goal));
		records.extend(self.notes.into_iter().map(EntityRecord::Note));
		records.extend(self.habits.into_iter().map(EntityRecord::Habit));
		records.extend(self.profile.into_iter().map(EntityRecord::Profile));
		records
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
	Insert,
	Update,
	Delete,
}

/// One event from the per-user realtime feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteChange {
	pub change: ChangeKind,
	pub kind: EntityKind,
	pub entity_id: Uuid,
	/// The durably written remote record; `None` for deletes.
	pub record: Option<EntityRecord>,
}

/// CRUD + subscribe surface of the remote multi-device store.
///
/// The remote is authoritative for identity (whether an id exists); the merge
/// rules in [`crate::service::merge`] are authoritative for which value wins.
#[async_trait]
pub trait RemoteStore: Send + Sync {
	/// Complete snapshot of the user's data, for the once-per-login full sync.
	async fn fetch_all(&self, user_id: Uuid) -> Result<RemoteSnapshot, RemoteError>;

	/// Records whose last-write timestamp is after `since`.
	async fn fetch_changed_since(
		&self,
		user_id: Uuid,
		since: DateTime<Utc>,
	) -> Result<RemoteSnapshot, RemoteError>;

	/// Just the profile row; used by the bounded premium-activation poll.
	async fn fetch_profile(&self, user_id: Uuid) -> Result<Option<UserProfile>, RemoteError>;

	async fn upsert(&self, user_id: Uuid, record: &EntityRecord) -> Result<(), RemoteError>;

	async fn delete(&self, user_id: Uuid, kind: EntityKind, id: Uuid) -> Result<(), RemoteError>;

	/// Subscribe to the user's change feed. The feed ends (the receiver
	/// yields `None`) when the connection drops; the caller is responsible
	/// for resubscribing. Dropping the receiver tears the subscription down.
	async fn subscribe(&self, user_id: Uuid) -> Result<mpsc::Receiver<RemoteChange>, RemoteError>;
}
