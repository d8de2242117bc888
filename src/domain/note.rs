use super::{EntityKind, Syncable};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A quick note, independent of the day's journal entry. Many per day allowed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuickNote {
	pub id: Uuid,
	pub text: String,
	pub emoji: Option<String>,
	pub day: NaiveDate,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

impl QuickNote {
	pub fn new(day: NaiveDate, text: impl Into<String>) -> Self {
		let now = Utc::now();
		Self {
			id: Uuid::new_v4(),
			text: text.into(),
			emoji: None,
			day,
			created_at: now,
			updated_at: now,
		}
	}
}

impl Syncable for QuickNote {
	const KIND: EntityKind = EntityKind::Note;

	fn id(&self) -> Uuid {
		self.id
	}

	fn updated_at(&self) -> DateTime<Utc> {
		self.updated_at
	}
}
