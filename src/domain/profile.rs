use super::{EntityKind, Syncable};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Singleton per-user profile.
///
/// `xp` never decreases across merges, and `first_entry_date` is the
/// anti-backdating anchor: once the remote store has a value it must not
/// regress locally. Both rules live in [`crate::service::merge`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
	/// Matches the authenticated user id.
	pub id: Uuid,
	pub display_name: String,
	pub avatar: Option<String>,
	pub age_range: Option<String>,
	pub occupation: Option<String>,
	pub wellness_goals: Vec<String>,
	/// Experience-point total. Merged as `max(local, remote)`.
	pub xp: u64,
	pub premium: bool,
	pub premium_until: Option<DateTime<Utc>>,
	pub first_entry_date: Option<NaiveDate>,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

impl UserProfile {
	pub fn new(user_id: Uuid, display_name: impl Into<String>) -> Self {
		let now = Utc::now();
		Self {
			id: user_id,
			display_name: display_name.into(),
			avatar: None,
			age_range: None,
			occupation: None,
			wellness_goals: Vec::new(),
			xp: 0,
			premium: false,
			premium_until: None,
			first_entry_date: None,
			created_at: now,
			updated_at: now,
		}
	}

	pub fn is_premium(&self) -> bool {
		self.premium
			&& self
				.premium_until
				.map_or(true, |until| until > Utc::now())
	}
}

impl Syncable for UserProfile {
	const KIND: EntityKind = EntityKind::Profile;

	fn id(&self) -> Uuid {
		self.id
	}

	fn updated_at(&self) -> DateTime<Utc> {
		self.updated_at
	}
}
