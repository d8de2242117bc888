use super::{EntityKind, Syncable};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-day record of the four tracked habits, keyed by (user, day).
///
/// Habit counters are the one piece of data mutated rapid-fire from the UI,
/// so the coordinator debounces their remote writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HabitLog {
	pub id: Uuid,
	pub day: NaiveDate,
	pub hydration_ml: u32,
	pub meditation_minutes: u32,
	pub sleep_hours: f32,
	/// Subjective sleep quality, 1-5.
	pub sleep_quality: u8,
	pub detox_active: bool,
	pub detox_started_at: Option<DateTime<Utc>>,
	pub updated_at: DateTime<Utc>,
}

impl HabitLog {
	pub fn new(day: NaiveDate) -> Self {
		Self {
			id: Uuid::new_v4(),
			day,
			hydration_ml: 0,
			meditation_minutes: 0,
			sleep_hours: 0.0,
			sleep_quality: 0,
			detox_active: false,
			detox_started_at: None,
			updated_at: Utc::now(),
		}
	}
}

impl Syncable for HabitLog {
	const KIND: EntityKind = EntityKind::Habit;

	fn id(&self) -> Uuid {
		self.id
	}

	fn updated_at(&self) -> DateTime<Utc> {
		self.updated_at
	}
}
