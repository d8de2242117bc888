//! Outbound mutation queue
//!
//! Records create/update/delete operations the remote store has not yet
//! acknowledged. Items are coalesced by entity id so at most one item per id
//! is ever pending: a later update supersedes an earlier one, and a delete
//! supersedes any pending create or update (a delete over an unpushed create
//! cancels both, since the remote never saw the record).
//!
//! The queue is persisted on every change and survives restarts. Items are
//! never dropped automatically; under permanent failure they stay queued and
//! are surfaced to the UI only as a pending count.

use crate::domain::{EntityKind, EntityRecord};
use crate::infra::persist::{Persister, OUTBOX_FILE};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
	Create,
	Update,
	Delete,
}

/// One pending outbound operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
	pub op: OpKind,
	pub kind: EntityKind,
	pub entity_id: Uuid,
	/// Whole-record payload snapshot; `None` for deletes.
	pub payload: Option<EntityRecord>,
	pub enqueued_at: DateTime<Utc>,
	pub retry_count: u32,
	/// Earliest time the next push attempt may run. `None` means due now.
	#[serde(default)]
	pub next_attempt_at: Option<DateTime<Utc>>,
}

impl QueueItem {
	pub fn create(record: EntityRecord) -> Self {
		Self::new(OpKind::Create, record.kind(), record.id(), Some(record))
	}

	pub fn update(record: EntityRecord) -> Self {
		Self::new(OpKind::Update, record.kind(), record.id(), Some(record))
	}

	pub fn delete(kind: EntityKind, entity_id: Uuid) -> Self {
		Self::new(OpKind::Delete, kind, entity_id, None)
	}

	fn new(op: OpKind, kind: EntityKind, entity_id: Uuid, payload: Option<EntityRecord>) -> Self {
		Self {
			op,
			kind,
			entity_id,
			payload,
			enqueued_at: Utc::now(),
			retry_count: 0,
			next_attempt_at: None,
		}
	}

	pub fn is_due(&self, now: DateTime<Utc>) -> bool {
		self.next_attempt_at.map_or(true, |at| at <= now)
	}
}

/// Persistent outbound queue. See module docs for the coalescing rules.
#[derive(Debug)]
pub struct MutationQueue {
	items: RwLock<Vec<QueueItem>>,
	persister: Persister,
}

impl MutationQueue {
	pub fn load(persister: Persister) -> Self {
		let items: Vec<QueueItem> = persister.load(OUTBOX_FILE);
		Self {
			items: RwLock::new(items),
			persister,
		}
	}

	/// Append an operation, coalescing with any pending item for the same id.
	pub async fn enqueue(&self, item: QueueItem) {
		let mut items = self.items.write().await;

		let existing = items.iter().position(|i| i.entity_id == item.entity_id);
		match (existing, item.op) {
			(Some(pos), OpKind::Delete) => {
				if items[pos].op == OpKind::Create {
					// The remote never saw this record; nothing to push at all.
					debug!(entity_id = %item.entity_id, "Delete cancelled unpushed create");
					items.remove(pos);
				} else {
					items[pos] = item;
				}
			}
			(Some(pos), _) => {
				// Later payload supersedes the queued one. A still-unpushed
				// create stays a create; retry bookkeeping carries over but
				// the fresh payload is due immediately.
				let op = if items[pos].op == OpKind::Create && item.op != OpKind::Delete {
					OpKind::Create
				} else {
					item.op
				};
				let retry_count = items[pos].retry_count;
				let enqueued_at = items[pos].enqueued_at;
				items[pos] = QueueItem {
					op,
					retry_count,
					enqueued_at,
					next_attempt_at: None,
					..item
				};
			}
			(None, _) => items.push(item),
		}

		self.persister.save(OUTBOX_FILE, &*items);
	}

	/// Drop every pending item. Used when the signed-in account changes, so
	/// one user's unpushed mutations never replay into another's account.
	pub async fn clear(&self) {
		let mut items = self.items.write().await;
		if items.is_empty() {
			return;
		}
		items.clear();
		self.persister.save(OUTBOX_FILE, &*items);
	}

	/// Remove every pending item for a confirmed entity id.
	pub async fn drain(&self, entity_id: Uuid) {
		let mut items = self.items.write().await;
		let before = items.len();
		items.retain(|i| i.entity_id != entity_id);
		if items.len() != before {
			self.persister.save(OUTBOX_FILE, &*items);
		}
	}

	/// Pending-item count, for the UI "N pending" display.
	pub async fn len(&self) -> usize {
		self.items.read().await.len()
	}

	pub async fn is_empty(&self) -> bool {
		self.items.read().await.is_empty()
	}

	/// Items whose backoff window has elapsed, oldest first.
	pub async fn due(&self, now: DateTime<Utc>) -> Vec<QueueItem> {
		let items = self.items.read().await;
		let mut due: Vec<_> = items.iter().filter(|i| i.is_due(now)).cloned().collect();
		due.sort_by_key(|i| i.enqueued_at);
		due
	}

	/// Record a failed push: bump the retry count and schedule the next
	/// attempt after `delay`.
	pub async fn record_failure(&self, entity_id: Uuid, delay: Duration) {
		let mut items = self.items.write().await;
		if let Some(item) = items.iter_mut().find(|i| i.entity_id == entity_id) {
			item.retry_count += 1;
			item.next_attempt_at =
				Some(Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default());
		}
		self.persister.save(OUTBOX_FILE, &*items);
	}

	/// Make every item due immediately, overriding backoff state. Used by the
	/// manual sync trigger.
	pub async fn force_due(&self) {
		let mut items = self.items.write().await;
		for item in items.iter_mut() {
			item.next_attempt_at = None;
		}
		self.persister.save(OUTBOX_FILE, &*items);
	}
}
