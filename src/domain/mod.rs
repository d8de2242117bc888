//! Synchronized journal entities
//!
//! Every entity carries a stable id and a logical last-write timestamp
//! (`updated_at`). Conflict resolution is whole-record last-write-wins, so
//! these types are moved around as opaque snapshots; nothing in the engine
//! diffs individual fields.

pub mod entry;
pub mod habit;
pub mod note;
pub mod profile;

pub use entry::{Goal, JournalEntry};
pub use habit::HabitLog;
pub use note::QuickNote;
pub use profile::UserProfile;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The kinds of records the engine synchronizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
	Entry,
	Goal,
	Note,
	Profile,
	Habit,
}

impl EntityKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Entry => "entry",
			Self::Goal => "goal",
			Self::Note => "note",
			Self::Profile => "profile",
			Self::Habit => "habit",
		}
	}
}

impl std::fmt::Display for EntityKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// A model that participates in sync.
pub trait Syncable {
	const KIND: EntityKind;

	/// Stable identity of the record.
	fn id(&self) -> Uuid;

	/// Logical last-write timestamp.
	fn updated_at(&self) -> DateTime<Utc>;
}

/// A whole-record snapshot of any synchronized entity.
///
/// This is the payload shape used by the outbound queue, the remote store
/// interface and the realtime feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "record", rename_all = "snake_case")]
pub enum EntityRecord {
	Entry(JournalEntry),
	Goal(Goal),
	Note(QuickNote),
	Profile(UserProfile),
	Habit(HabitLog),
}

impl EntityRecord {
	pub fn kind(&self) -> EntityKind {
		match self {
			Self::Entry(_) => EntityKind::Entry,
			Self::Goal(_) => EntityKind::Goal,
			Self::Note(_) => EntityKind::Note,
			Self::Profile(_) => EntityKind::Profile,
			Self::Habit(_) => EntityKind::Habit,
		}
	}

	pub fn id(&self) -> Uuid {
		match self {
			Self::Entry(e) => e.id,
			Self::Goal(g) => g.id,
			Self::Note(n) => n.id,
			Self::Profile(p) => p.id,
			Self::Habit(h) => h.id,
		}
	}

	pub fn updated_at(&self) -> DateTime<Utc> {
		match self {
			Self::Entry(e) => e.updated_at,
			Self::Goal(g) => g.updated_at,
			Self::Note(n) => n.updated_at,
			Self::Profile(p) => p.updated_at,
			Self::Habit(h) => h.updated_at,
		}
	}
}
