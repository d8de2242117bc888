//! Conflict resolution
//!
//! One merge function shared by the reconciler and the realtime listener, so
//! every writer applies the identical rule and out-of-order or duplicate
//! delivery converges to the same state.
//!
//! The rule is whole-record last-write-wins in favour of the remote: a record
//! delivered by the remote store has by construction been durably written
//! there, so it overwrites the local copy unconditionally. The only fields
//! with bespoke handling live on the profile: `xp` never decreases, and
//! `first_entry_date` (the anti-backdating anchor) prefers the remote value
//! whenever one exists.

use crate::domain::{EntityRecord, UserProfile};
use crate::infra::store::SnapshotStore;
use crate::remote::{ChangeKind, RemoteChange};
use tracing::trace;

/// Merge a remote profile over the local one.
pub fn merge_profile(local: &UserProfile, remote: UserProfile) -> UserProfile {
	let mut merged = remote;
	// Clock or ordering skew must never cost the user experience points.
	merged.xp = merged.xp.max(local.xp);
	if merged.first_entry_date.is_none() {
		merged.first_entry_date = local.first_entry_date;
	}
	merged
}

/// Apply a remote record to the local store using the last-write-wins rule.
pub async fn apply_remote(store: &SnapshotStore, record: EntityRecord) {
	let record = match record {
		EntityRecord::Profile(remote) => {
			let merged = match store.profile().await {
				Some(local) => merge_profile(&local, remote),
				None => remote,
			};
			EntityRecord::Profile(merged)
		}
		other => other,
	};

	trace!(kind = %record.kind(), id = %record.id(), "Applying remote record");
	store.upsert(record).await;
}

/// Apply one realtime change event. Deletes remove by id (idempotently);
/// inserts and updates go through [`apply_remote`].
pub async fn apply_change(store: &SnapshotStore, change: RemoteChange) {
	match change.change {
		ChangeKind::Delete => {
			store.remove(change.kind, change.entity_id).await;
		}
		ChangeKind::Insert | ChangeKind::Update => {
			if let Some(record) = change.record {
				apply_remote(store, record).await;
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::domain::{EntityKind, JournalEntry};
	use crate::infra::persist::Persister;
	use uuid::Uuid;

	fn store() -> SnapshotStore {
		SnapshotStore::load(Persister::ephemeral())
	}

	#[tokio::test]
	async fn applying_the_same_record_twice_is_idempotent() {
		let store = store();
		let entry = JournalEntry::new("2024-01-05".parse().unwrap(), 4);

		apply_remote(&store, EntityRecord::Entry(entry.clone())).await;
		let once = store.entries().await;
		apply_remote(&store, EntityRecord::Entry(entry)).await;
		let twice = store.entries().await;

		assert_eq!(once, twice);
	}

	#[tokio::test]
	async fn xp_never_decreases() {
		let store = store();
		let user = Uuid::new_v4();

		let mut local = UserProfile::new(user, "mira");
		local.xp = 500;
		store.upsert(EntityRecord::Profile(local)).await;

		let mut remote = UserProfile::new(user, "mira");
		remote.xp = 120;
		apply_remote(&store, EntityRecord::Profile(remote)).await;

		assert_eq!(store.xp().await, 500);

		let mut newer = UserProfile::new(user, "mira");
		newer.xp = 900;
		apply_remote(&store, EntityRecord::Profile(newer)).await;
		assert_eq!(store.xp().await, 900);
	}

	#[tokio::test]
	async fn first_entry_date_prefers_remote_when_present() {
		let user = Uuid::new_v4();
		let mut local = UserProfile::new(user, "mira");
		local.first_entry_date = Some("2024-02-01".parse().unwrap());

		let mut remote = UserProfile::new(user, "mira");
		remote.first_entry_date = Some("2024-01-01".parse().unwrap());

		let merged = merge_profile(&local, remote.clone());
		assert_eq!(merged.first_entry_date, Some("2024-01-01".parse().unwrap()));

		// Remote without an anchor keeps the local one.
		remote.first_entry_date = None;
		let merged = merge_profile(&local, remote);
		assert_eq!(merged.first_entry_date, Some("2024-02-01".parse().unwrap()));
	}

	#[tokio::test]
	async fn delete_change_for_absent_id_is_harmless() {
		let store = store();
		let change = RemoteChange {
			change: ChangeKind::Delete,
			kind: EntityKind::Note,
			entity_id: Uuid::new_v4(),
			record: None,
		};

		apply_change(&store, change.clone()).await;
		apply_change(&store, change).await;

		assert!(store.notes().await.is_empty());
	}
}
