//! Reconciler: full-sync and incremental-pull merges
//!
//! Full sync runs once per login session and reconciles the complete remote
//! snapshot against the local store. The remote copy wins for every record it
//! has; records that exist only locally (never pushed) survive the merge and
//! are immediately pushed back, falling into the outbound queue when the push
//! fails.
//!
//! Incremental pull fetches only records changed since the last checkpoint
//! and applies the identical per-record merge rule.

use crate::domain::{EntityKind, EntityRecord};
use crate::infra::queue::{MutationQueue, QueueItem};
use crate::infra::store::SnapshotStore;
use crate::remote::{RemoteSnapshot, RemoteStore};
use crate::service::merge;
use crate::SyncError;
use chrono::{DateTime, NaiveDate, Utc};
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub struct Reconciler {
	store: Arc<SnapshotStore>,
	queue: Arc<MutationQueue>,
	remote: Arc<dyn RemoteStore>,
}

impl Reconciler {
	pub fn new(
		store: Arc<SnapshotStore>,
		queue: Arc<MutationQueue>,
		remote: Arc<dyn RemoteStore>,
	) -> Self {
		Self { store, queue, remote }
	}

	/// Complete reconciliation of all entities, run on session start.
	pub async fn full_sync(&self, user_id: Uuid) -> Result<(), SyncError> {
		let snapshot = self.remote.fetch_all(user_id).await?;

		// Work out which local records have no remote counterpart before the
		// remote copy lands in the store. Entries and habit logs are also
		// keyed by day: a local record whose day the remote already claims is
		// a conflict (remote wins), not a local-only survivor.
		let survivors = self.local_only_records(&snapshot).await;

		let records = snapshot.into_records();
		let pulled = records.len();
		for record in records {
			merge::apply_remote(&self.store, record).await;
		}

		let pushed = survivors.len();
		let results = join_all(
			survivors
				.iter()
				.map(|record| self.remote.upsert(user_id, record)),
		)
		.await;
		for (record, result) in survivors.into_iter().zip(results) {
			if let Err(e) = result {
				debug!(
					kind = %record.kind(),
					id = %record.id(),
					error = %e,
					"Push of local-only record failed, queueing"
				);
				self.queue.enqueue(QueueItem::create(record)).await;
			}
		}

		info!(user_id = %user_id, pulled, pushed, "Full sync merged");
		Ok(())
	}

	/// Pull records changed since `since` and merge them.
	pub async fn incremental_pull(
		&self,
		user_id: Uuid,
		since: DateTime<Utc>,
	) -> Result<(), SyncError> {
		let snapshot = self.remote.fetch_changed_since(user_id, since).await?;
		let records = snapshot.into_records();

		if records.is_empty() {
			debug!(user_id = %user_id, since = %since, "Incremental pull found no changes");
			return Ok(());
		}

		let pulled = records.len();
		for record in records {
			merge::apply_remote(&self.store, record).await;
		}

		info!(user_id = %user_id, since = %since, pulled, "Incremental pull merged");
		Ok(())
	}

	/// Local records with no remote counterpart, by id — and for day-keyed
	/// kinds, no remote claim on their day either.
	async fn local_only_records(&self, snapshot: &RemoteSnapshot) -> Vec<EntityRecord> {
		let remote_entry_ids: HashSet<Uuid> = snapshot.entries.iter().map(|e| e.id).collect();
		let remote_entry_days: HashSet<NaiveDate> = snapshot.entries.iter().map(|e| e.day).collect();
		let remote_goal_ids: HashSet<Uuid> = snapshot.goals.iter().map(|g| g.id).collect();
		let remote_note_ids: HashSet<Uuid> = snapshot.notes.iter().map(|n| n.id).collect();
		let remote_habit_ids: HashSet<Uuid> = snapshot.habits.iter().map(|h| h.id).collect();
		let remote_habit_days: HashSet<NaiveDate> = snapshot.habits.iter().map(|h| h.day).collect();

		let mut survivors = Vec::new();

		for record in self.store.records_of(EntityKind::Entry).await {
			if let EntityRecord::Entry(entry) = &record {
				if !remote_entry_ids.contains(&entry.id) && !remote_entry_days.contains(&entry.day) {
					survivors.push(record);
				}
			}
		}
		for record in self.store.records_of(EntityKind::Goal).await {
			if !remote_goal_ids.contains(&record.id()) {
				survivors.push(record);
			}
		}
		for record in self.store.records_of(EntityKind::Note).await {
			if !remote_note_ids.contains(&record.id()) {
				survivors.push(record);
			}
		}
		for record in self.store.records_of(EntityKind::Habit).await {
			if let EntityRecord::Habit(habit) = &record {
				if !remote_habit_ids.contains(&habit.id) && !remote_habit_days.contains(&habit.day) {
					survivors.push(record);
				}
			}
		}
		if snapshot.profile.is_none() {
			if let Some(profile) = self.store.profile().await {
				warn!(user_id = %profile.id, "Remote has no profile row, pushing local copy");
				survivors.push(EntityRecord::Profile(profile));
			}
		}

		survivors
	}
}
