//! Local snapshot store
//!
//! The authoritative device-local copy of the user's journal data. All UI
//! reads come from here; the reconciler and the realtime listener are the only
//! remote-driven writers, and both go through the same idempotent
//! `upsert`/`remove` operations, so arrival order of async completions is the
//! only ordering that matters.
//!
//! Every mutation persists the whole snapshot so a reload does not lose
//! confirmed local state.

use crate::domain::{EntityKind, EntityRecord, Goal, HabitLog, JournalEntry, QuickNote, UserProfile};
use crate::infra::persist::{Persister, SNAPSHOT_FILE};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Serialized form of the whole local state, one object per user on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Snapshot {
	pub profile: Option<UserProfile>,
	pub entries: Vec<JournalEntry>,
	pub goals: Vec<Goal>,
	pub notes: Vec<QuickNote>,
	pub habits: Vec<HabitLog>,
	pub onboarding_complete: bool,
	pub last_sync_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct Inner {
	profile: Option<UserProfile>,
	entries: HashMap<Uuid, JournalEntry>,
	entries_by_day: HashMap<NaiveDate, Uuid>,
	goals: HashMap<Uuid, Goal>,
	notes: HashMap<Uuid, QuickNote>,
	habits: HashMap<Uuid, HabitLog>,
	habits_by_day: HashMap<NaiveDate, Uuid>,
	onboarding_complete: bool,
	last_sync_at: Option<DateTime<Utc>>,
}

impl Inner {
	fn from_snapshot(snapshot: Snapshot) -> Self {
		let mut inner = Self {
			profile: snapshot.profile,
			onboarding_complete: snapshot.onboarding_complete,
			last_sync_at: snapshot.last_sync_at,
			..Self::default()
		};

		// Rebuild through the same dedupe path used at runtime so a snapshot
		// that somehow contains two entries for one day collapses to one.
		for entry in snapshot.entries {
			inner.put_entry(entry);
		}
		for goal in snapshot.goals {
			inner.goals.insert(goal.id, goal);
		}
		for note in snapshot.notes {
			inner.notes.insert(note.id, note);
		}
		for habit in snapshot.habits {
			inner.put_habit(habit);
		}

		inner
	}

	fn to_snapshot(&self) -> Snapshot {
		let mut entries: Vec<_> = self.entries.values().cloned().collect();
		entries.sort_by_key(|e| e.day);
		let mut goals: Vec<_> = self.goals.values().cloned().collect();
		goals.sort_by_key(|g| (g.day, g.created_at));
		let mut notes: Vec<_> = self.notes.values().cloned().collect();
		notes.sort_by_key(|n| n.created_at);
		let mut habits: Vec<_> = self.habits.values().cloned().collect();
		habits.sort_by_key(|h| h.day);

		Snapshot {
			profile: self.profile.clone(),
			entries,
			goals,
			notes,
			habits,
			onboarding_complete: self.onboarding_complete,
			last_sync_at: self.last_sync_at,
		}
	}

	/// Insert an entry, enforcing the one-entry-per-day invariant. An incoming
	/// entry for an already-occupied day replaces the existing row even when
	/// the ids differ (two devices can create the same day independently).
	fn put_entry(&mut self, entry: JournalEntry) {
		if let Some(&existing_id) = self.entries_by_day.get(&entry.day) {
			if existing_id != entry.id {
				self.entries.remove(&existing_id);
			}
		}
		// The id may have moved to a different day on an edit.
		if let Some(previous) = self.entries.get(&entry.id) {
			if previous.day != entry.day {
				self.entries_by_day.remove(&previous.day);
			}
		}
		self.entries_by_day.insert(entry.day, entry.id);
		self.entries.insert(entry.id, entry);
	}

	fn put_habit(&mut self, habit: HabitLog) {
		if let Some(&existing_id) = self.habits_by_day.get(&habit.day) {
			if existing_id != habit.id {
				self.habits.remove(&existing_id);
			}
		}
		self.habits_by_day.insert(habit.day, habit.id);
		self.habits.insert(habit.id, habit);
	}
}

/// The device-local snapshot store. See module docs.
#[derive(Debug)]
pub struct SnapshotStore {
	inner: RwLock<Inner>,
	persister: Persister,
}

impl SnapshotStore {
	/// Load the persisted snapshot (or start empty) from `persister`.
	pub fn load(persister: Persister) -> Self {
		let snapshot: Snapshot = persister.load(SNAPSHOT_FILE);
		Self {
			inner: RwLock::new(Inner::from_snapshot(snapshot)),
			persister,
		}
	}

	/// Idempotent whole-record upsert. Safe to call with stale or duplicate
	/// data; the same id (or, for entries and habits, the same day) never
	/// produces duplicate rows.
	pub async fn upsert(&self, record: EntityRecord) {
		let mut inner = self.inner.write().await;
		match record {
			EntityRecord::Entry(entry) => inner.put_entry(entry),
			EntityRecord::Goal(goal) => {
				inner.goals.insert(goal.id, goal);
			}
			EntityRecord::Note(note) => {
				inner.notes.insert(note.id, note);
			}
			EntityRecord::Profile(profile) => inner.profile = Some(profile),
			EntityRecord::Habit(habit) => inner.put_habit(habit),
		}
		self.persister.save(SNAPSHOT_FILE, &inner.to_snapshot());
	}

	/// Remove a record by id. Returns whether anything was removed; removing
	/// an absent id is a no-op, so duplicate realtime DELETEs are harmless.
	///
	/// Deleting an entry orphans its goals instead of cascading.
	pub async fn remove(&self, kind: EntityKind, id: Uuid) -> bool {
		let mut inner = self.inner.write().await;
		let removed = match kind {
			EntityKind::Entry => match inner.entries.remove(&id) {
				Some(entry) => {
					inner.entries_by_day.remove(&entry.day);
					for goal in inner.goals.values_mut() {
						if goal.entry_id == Some(id) {
							goal.entry_id = None;
						}
					}
					true
				}
				None => false,
			},
			EntityKind::Goal => inner.goals.remove(&id).is_some(),
			EntityKind::Note => inner.notes.remove(&id).is_some(),
			EntityKind::Profile => inner.profile.take().is_some(),
			EntityKind::Habit => match inner.habits.remove(&id) {
				Some(habit) => {
					inner.habits_by_day.remove(&habit.day);
					true
				}
				None => false,
			},
		};

		if removed {
			self.persister.save(SNAPSHOT_FILE, &inner.to_snapshot());
		}
		removed
	}

	pub async fn contains(&self, kind: EntityKind, id: Uuid) -> bool {
		let inner = self.inner.read().await;
		match kind {
			EntityKind::Entry => inner.entries.contains_key(&id),
			EntityKind::Goal => inner.goals.contains_key(&id),
			EntityKind::Note => inner.notes.contains_key(&id),
			EntityKind::Profile => inner.profile.as_ref().is_some_and(|p| p.id == id),
			EntityKind::Habit => inner.habits.contains_key(&id),
		}
	}

	pub async fn records_of(&self, kind: EntityKind) -> Vec<EntityRecord> {
		let inner = self.inner.read().await;
		match kind {
			EntityKind::Entry => inner
				.entries
				.values()
				.cloned()
				.map(EntityRecord::Entry)
				.collect(),
			EntityKind::Goal => inner.goals.values().cloned().map(EntityRecord::Goal).collect(),
			EntityKind::Note => inner.notes.values().cloned().map(EntityRecord::Note).collect(),
			EntityKind::Profile => inner
				.profile
				.clone()
				.map(EntityRecord::Profile)
				.into_iter()
				.collect(),
			EntityKind::Habit => inner
				.habits
				.values()
				.cloned()
				.map(EntityRecord::Habit)
				.collect(),
		}
	}

	/// Entries, newest day first.
	pub async fn entries(&self) -> Vec<JournalEntry> {
		let mut entries: Vec<_> = self.inner.read().await.entries.values().cloned().collect();
		entries.sort_by(|a, b| b.day.cmp(&a.day));
		entries
	}

	pub async fn entry_for_day(&self, day: NaiveDate) -> Option<JournalEntry> {
		let inner = self.inner.read().await;
		inner
			.entries_by_day
			.get(&day)
			.and_then(|id| inner.entries.get(id))
			.cloned()
	}

	pub async fn goals_for_entry(&self, entry_id: Uuid) -> Vec<Goal> {
		let mut goals: Vec<_> = self
			.inner
			.read()
			.await
			.goals
			.values()
			.filter(|g| g.entry_id == Some(entry_id))
			.cloned()
			.collect();
		goals.sort_by_key(|g| g.created_at);
		goals
	}

	/// Notes, newest first.
	pub async fn notes(&self) -> Vec<QuickNote> {
		let mut notes: Vec<_> = self.inner.read().await.notes.values().cloned().collect();
		notes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
		notes
	}

	pub async fn habits(&self) -> Vec<HabitLog> {
		let mut habits: Vec<_> = self.inner.read().await.habits.values().cloned().collect();
		habits.sort_by(|a, b| b.day.cmp(&a.day));
		habits
	}

	pub async fn habit_for_day(&self, day: NaiveDate) -> Option<HabitLog> {
		let inner = self.inner.read().await;
		inner
			.habits_by_day
			.get(&day)
			.and_then(|id| inner.habits.get(id))
			.cloned()
	}

	pub async fn profile(&self) -> Option<UserProfile> {
		self.inner.read().await.profile.clone()
	}

	pub async fn xp(&self) -> u64 {
		self.inner.read().await.profile.as_ref().map_or(0, |p| p.xp)
	}

	pub async fn is_premium(&self) -> bool {
		self.inner
			.read()
			.await
			.profile
			.as_ref()
			.is_some_and(UserProfile::is_premium)
	}

	pub async fn last_sync_at(&self) -> Option<DateTime<Utc>> {
		self.inner.read().await.last_sync_at
	}

	pub async fn set_last_sync_at(&self, at: DateTime<Utc>) {
		let mut inner = self.inner.write().await;
		inner.last_sync_at = Some(at);
		self.persister.save(SNAPSHOT_FILE, &inner.to_snapshot());
	}

	pub async fn onboarding_complete(&self) -> bool {
		self.inner.read().await.onboarding_complete
	}

	pub async fn set_onboarding_complete(&self, complete: bool) {
		let mut inner = self.inner.write().await;
		inner.onboarding_complete = complete;
		self.persister.save(SNAPSHOT_FILE, &inner.to_snapshot());
	}

	/// Explicit full data clear. Not invoked on logout; the snapshot stays
	/// available for offline viewing until the user asks for it to go.
	pub async fn clear(&self) {
		let mut inner = self.inner.write().await;
		*inner = Inner::default();
		self.persister.save(SNAPSHOT_FILE, &inner.to_snapshot());
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::NaiveDate;

	fn day(s: &str) -> NaiveDate {
		s.parse().unwrap()
	}

	fn store() -> SnapshotStore {
		SnapshotStore::load(Persister::ephemeral())
	}

	#[tokio::test]
	async fn upsert_is_idempotent() {
		let store = store();
		let entry = JournalEntry::new(day("2024-01-05"), 3);

		store.upsert(EntityRecord::Entry(entry.clone())).await;
		store.upsert(EntityRecord::Entry(entry.clone())).await;

		assert_eq!(store.entries().await, vec![entry]);
	}

	#[tokio::test]
	async fn same_day_entry_replaces_even_with_new_id() {
		let store = store();
		let first = JournalEntry::new(day("2024-01-05"), 2);
		let second = JournalEntry::new(day("2024-01-05"), 4);

		store.upsert(EntityRecord::Entry(first)).await;
		store.upsert(EntityRecord::Entry(second.clone())).await;

		let entries = store.entries().await;
		assert_eq!(entries.len(), 1);
		assert_eq!(entries[0].id, second.id);
		assert_eq!(entries[0].mood, 4);
	}

	#[tokio::test]
	async fn deleting_entry_orphans_goals() {
		let store = store();
		let entry = JournalEntry::new(day("2024-01-05"), 3);
		let goal = Goal::new(entry.id, entry.day, "stretch");

		store.upsert(EntityRecord::Entry(entry.clone())).await;
		store.upsert(EntityRecord::Goal(goal.clone())).await;
		assert!(store.remove(EntityKind::Entry, entry.id).await);

		let goals = store.records_of(EntityKind::Goal).await;
		assert_eq!(goals.len(), 1);
		match &goals[0] {
			EntityRecord::Goal(g) => assert_eq!(g.entry_id, None),
			other => panic!("expected goal, got {other:?}"),
		}
	}

	#[tokio::test]
	async fn double_remove_is_a_no_op() {
		let store = store();
		let note = QuickNote::new(day("2024-01-05"), "hi");

		store.upsert(EntityRecord::Note(note.clone())).await;
		assert!(store.remove(EntityKind::Note, note.id).await);
		assert!(!store.remove(EntityKind::Note, note.id).await);
		assert!(store.notes().await.is_empty());
	}

	#[tokio::test]
	async fn survives_reload_from_disk() {
		let dir = tempfile::tempdir().unwrap();
		let entry = JournalEntry::new(day("2024-01-05"), 5);
		let profile = UserProfile::new(Uuid::new_v4(), "mira");

		{
			let store = SnapshotStore::load(Persister::at(dir.path()));
			store.upsert(EntityRecord::Entry(entry.clone())).await;
			store.upsert(EntityRecord::Profile(profile.clone())).await;
			store.set_onboarding_complete(true).await;
		}

		let reloaded = SnapshotStore::load(Persister::at(dir.path()));
		assert_eq!(reloaded.entries().await, vec![entry]);
		assert_eq!(reloaded.profile().await, Some(profile));
		assert!(reloaded.onboarding_complete().await);
	}

	#[tokio::test]
	async fn corrupt_snapshot_starts_empty() {
		let dir = tempfile::tempdir().unwrap();
		std::fs::write(dir.path().join(SNAPSHOT_FILE), "{broken").unwrap();

		let store = SnapshotStore::load(Persister::at(dir.path()));
		assert!(store.entries().await.is_empty());
		assert_eq!(store.profile().await, None);
	}
}
