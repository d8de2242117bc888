//! Journal entries and their goals

use super::{EntityKind, Syncable};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// A single day's journal entry.
///
/// At most one entry exists per (user, day); the snapshot store enforces the
/// day-key uniqueness on upsert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
	pub id: Uuid,
	/// Calendar-day key, unique per user.
	pub day: NaiveDate,
	/// Mood score, 1-5.
	pub mood: u8,
	pub emotions: Vec<String>,
	pub reflection: String,
	pub gratitude: String,
	pub activities: Vec<String>,
	/// Named "feeling level" sliders (energy, stress, ...), 0-10.
	pub feeling_levels: BTreeMap<String, u8>,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

impl JournalEntry {
	pub fn new(day: NaiveDate, mood: u8) -> Self {
		let now = Utc::now();
		Self {
			id: Uuid::new_v4(),
			day,
			mood,
			emotions: Vec::new(),
			reflection: String::new(),
			gratitude: String::new(),
			activities: Vec::new(),
			feeling_levels: BTreeMap::new(),
			created_at: now,
			updated_at: now,
		}
	}
}

impl Syncable for JournalEntry {
	const KIND: EntityKind = EntityKind::Entry;

	fn id(&self) -> Uuid {
		self.id
	}

	fn updated_at(&self) -> DateTime<Utc> {
		self.updated_at
	}
}

/// A goal attached to a journal entry.
///
/// Goals are created and updated alongside their parent entry, but survive it:
/// deleting the entry orphans the goal (`entry_id` becomes `None`) rather than
/// cascading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
	pub id: Uuid,
	pub entry_id: Option<Uuid>,
	pub text: String,
	pub completed: bool,
	pub day: NaiveDate,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

impl Goal {
	pub fn new(entry_id: Uuid, day: NaiveDate, text: impl Into<String>) -> Self {
		let now = Utc::now();
		Self {
			id: Uuid::new_v4(),
			entry_id: Some(entry_id),
			text: text.into(),
			completed: false,
			day,
			created_at: now,
			updated_at: now,
		}
	}
}

impl Syncable for Goal {
	const KIND: EntityKind = EntityKind::Goal;

	fn id(&self) -> Uuid {
		self.id
	}

	fn updated_at(&self) -> DateTime<Utc> {
		self.updated_at
	}
}
