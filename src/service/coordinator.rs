//! Sync coordinator
//!
//! The façade the app talks to. Owns the reconciler, the outbound queue and
//! the realtime listener; exposes `trigger_sync`, the mutation entry points
//! and the status flags (`is_syncing`, `last_sync_at`, pending count).
//!
//! Every mutation entry point performs the optimistic local write first and
//! synchronously; the remote write happens afterwards and falls back to the
//! outbound queue on failure instead of raising to the caller. Failures
//! anywhere in the engine degrade to state flags and log lines, never
//! exceptions toward the UI.

use crate::config::{BackoffConfig, SyncConfig};
use crate::domain::{EntityKind, EntityRecord, Goal, HabitLog, JournalEntry, QuickNote, UserProfile};
use crate::infra::backoff::{self, bounded_poll, PollOutcome};
use crate::infra::event_bus::{UiCommand, UiCommandBus};
use crate::infra::queue::{MutationQueue, OpKind, QueueItem};
use crate::infra::store::SnapshotStore;
use crate::remote::{RemoteError, RemoteStore};
use crate::service::realtime::{ConnectionState, RealtimeListener};
use crate::service::reconciler::Reconciler;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Signals from the authentication collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
	SignedIn { user_id: Uuid },
	SignedOut,
}

struct Session {
	user_id: Uuid,
	/// Stops the background queue-flush loop on logout.
	shutdown: broadcast::Sender<()>,
}

pub struct SyncCoordinator {
	config: SyncConfig,
	store: Arc<SnapshotStore>,
	queue: Arc<MutationQueue>,
	remote: Arc<dyn RemoteStore>,
	reconciler: Reconciler,
	realtime: RealtimeListener,
	ui: UiCommandBus,
	session: RwLock<Option<Session>>,
	/// Flag, not a lock: prevents logically overlapping reconciliations
	/// under the cooperative scheduler.
	is_syncing: AtomicBool,
	/// Latched on the first `Unauthorized` push failure; flushes are skipped
	/// and the auth prompt is not re-emitted until a session event or a
	/// manual trigger clears it.
	auth_paused: Arc<AtomicBool>,
	habit_outbox: Arc<Mutex<HabitOutbox>>,
	habit_flush: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Clone)]
struct PendingHabit {
	habit: HabitLog,
	existed: bool,
}

/// Debounced habit writes waiting for their flush pass.
///
/// `flushing` and the map live under one lock: the flush task only exits
/// after observing an empty map, so an update logged while a push is in
/// flight is either drained by the next pass or starts a fresh task.
#[derive(Default)]
struct HabitOutbox {
	pending: HashMap<NaiveDate, PendingHabit>,
	flushing: bool,
}

impl SyncCoordinator {
	pub fn new(
		config: SyncConfig,
		store: Arc<SnapshotStore>,
		queue: Arc<MutationQueue>,
		remote: Arc<dyn RemoteStore>,
	) -> Self {
		let reconciler = Reconciler::new(store.clone(), queue.clone(), remote.clone());
		let realtime = RealtimeListener::new(
			store.clone(),
			remote.clone(),
			Duration::from_millis(config.realtime.reconnect_delay_ms),
		);

		Self {
			config,
			store,
			queue,
			remote,
			reconciler,
			realtime,
			ui: UiCommandBus::new(),
			session: RwLock::new(None),
			is_syncing: AtomicBool::new(false),
			auth_paused: Arc::new(AtomicBool::new(false)),
			habit_outbox: Arc::new(Mutex::new(HabitOutbox::default())),
			habit_flush: Mutex::new(None),
		}
	}

	// ---- status surface -------------------------------------------------

	pub fn is_syncing(&self) -> bool {
		self.is_syncing.load(Ordering::SeqCst)
	}

	pub async fn last_sync_at(&self) -> Option<DateTime<Utc>> {
		self.store.last_sync_at().await
	}

	pub async fn pending_count(&self) -> usize {
		self.queue.len().await
	}

	pub async fn realtime_state(&self) -> ConnectionState {
		self.realtime.state().await
	}

	pub fn store(&self) -> &Arc<SnapshotStore> {
		&self.store
	}

	pub fn ui(&self) -> &UiCommandBus {
		&self.ui
	}

	async fn user_id(&self) -> Option<Uuid> {
		self.session.read().await.as_ref().map(|s| s.user_id)
	}

	// ---- lifecycle ------------------------------------------------------

	/// React to an auth-provider session signal.
	///
	/// Sign-in runs exactly one full sync for the session; repeated
	/// session-available events for the same user are no-ops. Sign-out tears
	/// down the realtime subscription and session state, but keeps the local
	/// snapshot for offline viewing.
	pub async fn handle_session(&self, event: SessionEvent) {
		match event {
			SessionEvent::SignedIn { user_id } => {
				{
					let mut session = self.session.write().await;
					if let Some(existing) = session.as_ref() {
						if existing.user_id == user_id {
							debug!(user_id = %user_id, "Duplicate session event ignored");
							return;
						}
						// Different user: tear the old session down first.
						let _ = existing.shutdown.send(());
					}

					// A snapshot left behind by another account must never
					// bleed into this one, locally or remotely. Cleared
					// before the flush loop exists so the old user's queued
					// mutations cannot replay into the new account.
					if let Some(profile) = self.store.profile().await {
						if profile.id != user_id {
							warn!(
								previous_user = %profile.id,
								user_id = %user_id,
								"Discarding local state owned by another account"
							);
							self.store.clear().await;
							self.queue.clear().await;
						}
					}

					let (shutdown, shutdown_rx) = broadcast::channel(1);
					tokio::spawn(run_flush_loop(
						self.queue.clone(),
						self.remote.clone(),
						self.config.backoff.clone(),
						user_id,
						self.ui.clone(),
						self.auth_paused.clone(),
						shutdown_rx,
					));
					*session = Some(Session { user_id, shutdown });
				}

				info!(user_id = %user_id, "Session started");
				// Harmless on a fresh sign-in; required when switching users so
				// nothing from the previous session leaks into this one.
				if let Some(task) = self.habit_flush.lock().await.take() {
					task.abort();
				}
				{
					let mut outbox = self.habit_outbox.lock().await;
					outbox.pending.clear();
					outbox.flushing = false;
				}
				self.auth_paused.store(false, Ordering::SeqCst);
				self.realtime.stop().await;
				self.realtime.start(user_id).await;
				self.run_initial_sync(user_id).await;
			}
			SessionEvent::SignedOut => {
				let Some(session) = self.session.write().await.take() else {
					return;
				};
				let _ = session.shutdown.send(());
				self.realtime.stop().await;
				if let Some(task) = self.habit_flush.lock().await.take() {
					task.abort();
				}
				{
					let mut outbox = self.habit_outbox.lock().await;
					outbox.pending.clear();
					outbox.flushing = false;
				}
				self.auth_paused.store(false, Ordering::SeqCst);
				info!(user_id = %session.user_id, "Session ended, local snapshot retained");
			}
		}
	}

	/// The once-per-login full sync. A failure here is logged and reflected
	/// only through `is_syncing` flipping back to false; the app keeps
	/// running on local data and retries on the next trigger or reconnect.
	async fn run_initial_sync(&self, user_id: Uuid) {
		if self.is_syncing.swap(true, Ordering::SeqCst) {
			return;
		}

		match self.reconciler.full_sync(user_id).await {
			Ok(()) => self.store.set_last_sync_at(Utc::now()).await,
			Err(e) => warn!(user_id = %user_id, error = %e, "Full sync failed, continuing on local data"),
		}

		self.is_syncing.store(false, Ordering::SeqCst);
		self.emit_pending().await;
	}

	/// Manual sync trigger: queue drain (ignoring backoff), then incremental
	/// pull. A no-op while another reconciliation is in flight.
	pub async fn trigger_sync(&self) {
		let Some(user_id) = self.user_id().await else {
			debug!("trigger_sync without a session is a no-op");
			return;
		};

		if self.is_syncing.swap(true, Ordering::SeqCst) {
			debug!("Sync already in flight, ignoring trigger");
			return;
		}

		// A manual trigger is a user-driven retry; it may re-surface the auth
		// prompt if the session is still invalid.
		self.auth_paused.store(false, Ordering::SeqCst);
		self.queue.force_due().await;
		flush_due(
			&self.queue,
			&self.remote,
			&self.config.backoff,
			user_id,
			&self.ui,
			&self.auth_paused,
		)
		.await;

		let result = match self.store.last_sync_at().await {
			Some(since) => self.reconciler.incremental_pull(user_id, since).await,
			// Never completed a full sync (e.g. it failed at login).
			None => self.reconciler.full_sync(user_id).await,
		};

		match result {
			Ok(()) => self.store.set_last_sync_at(Utc::now()).await,
			Err(e) => warn!(user_id = %user_id, error = %e, "Sync failed"),
		}

		self.is_syncing.store(false, Ordering::SeqCst);
		self.emit_pending().await;
	}

	// ---- mutation entry points ------------------------------------------

	/// Save a journal entry and its goals. Sets the profile's
	/// `first_entry_date` anchor if this is the user's first ever entry.
	pub async fn save_entry(&self, mut entry: JournalEntry, mut goals: Vec<Goal>) {
		let now = Utc::now();
		entry.updated_at = now;

		let existed = self.store.contains(EntityKind::Entry, entry.id).await;
		self.store.upsert(EntityRecord::Entry(entry.clone())).await;
		let mut goals_existed = Vec::with_capacity(goals.len());
		for goal in &mut goals {
			goal.updated_at = now;
			goals_existed.push(self.store.contains(EntityKind::Goal, goal.id).await);
			self.store.upsert(EntityRecord::Goal(goal.clone())).await;
		}

		if let Some(mut profile) = self.store.profile().await {
			if profile.first_entry_date.is_none() {
				profile.first_entry_date = Some(entry.day);
				profile.updated_at = now;
				self.save_profile(profile).await;
			}
		}

		let Some(user_id) = self.user_id().await else {
			// Local-only for now; the full-sync survivor scan pushes unseen
			// records on the next session.
			return;
		};
		push_or_queue(
			&self.remote,
			&self.queue,
			user_id,
			EntityRecord::Entry(entry),
			existed,
		)
		.await;
		for (goal, goal_existed) in goals.into_iter().zip(goals_existed) {
			push_or_queue(
				&self.remote,
				&self.queue,
				user_id,
				EntityRecord::Goal(goal),
				goal_existed,
			)
			.await;
		}
		self.emit_pending().await;
	}

	pub async fn delete_entry(&self, entry_id: Uuid) {
		self.delete_record(EntityKind::Entry, entry_id).await;
	}

	pub async fn save_quick_note(&self, mut note: QuickNote) {
		note.updated_at = Utc::now();
		let existed = self.store.contains(EntityKind::Note, note.id).await;
		self.store.upsert(EntityRecord::Note(note.clone())).await;

		let Some(user_id) = self.user_id().await else {
			return; // rescued by the next full sync's survivor scan
		};
		push_or_queue(
			&self.remote,
			&self.queue,
			user_id,
			EntityRecord::Note(note),
			existed,
		)
		.await;
		self.emit_pending().await;
	}

	pub async fn delete_quick_note(&self, note_id: Uuid) {
		self.delete_record(EntityKind::Note, note_id).await;
	}

	pub async fn save_profile(&self, mut profile: UserProfile) {
		profile.updated_at = Utc::now();
		let existed = self.store.profile().await.is_some();
		self.store.upsert(EntityRecord::Profile(profile.clone())).await;

		let Some(user_id) = self.user_id().await else {
			return; // rescued by the next full sync's survivor scan
		};
		push_or_queue(
			&self.remote,
			&self.queue,
			user_id,
			EntityRecord::Profile(profile),
			existed,
		)
		.await;
		self.emit_pending().await;
	}

	/// Record a habit update. The local write is immediate; the remote write
	/// is debounced so rapid counter taps coalesce into one push. The flush
	/// task drains in passes until the outbox is empty, so an update logged
	/// while a push is in flight rides the next pass instead of being lost.
	pub async fn log_habit(&self, mut habit: HabitLog) {
		habit.updated_at = Utc::now();
		let existed = self.store.contains(EntityKind::Habit, habit.id).await;
		self.store.upsert(EntityRecord::Habit(habit.clone())).await;

		{
			let mut outbox = self.habit_outbox.lock().await;
			outbox
				.pending
				.entry(habit.day)
				.and_modify(|p| p.habit = habit.clone())
				.or_insert(PendingHabit { habit, existed });
			if outbox.flushing {
				return; // a running flush pass will pick this up
			}
			outbox.flushing = true;
		}

		let outbox = self.habit_outbox.clone();
		let remote = self.remote.clone();
		let queue = self.queue.clone();
		let ui = self.ui.clone();
		let session = self.user_id().await;
		let window = Duration::from_millis(self.config.debounce.habit_flush_ms);
		*self.habit_flush.lock().await = Some(tokio::spawn(async move {
			loop {
				tokio::time::sleep(window).await;
				let drained: Vec<PendingHabit> = {
					let mut outbox = outbox.lock().await;
					if outbox.pending.is_empty() {
						// Exit and emptiness are decided under one lock; a
						// concurrent log_habit either landed before this
						// check or sees `flushing == false` and respawns.
						outbox.flushing = false;
						return;
					}
					outbox.pending.drain().map(|(_, p)| p).collect()
				};
				let Some(user_id) = session else {
					// Local-only; the next full sync pushes these.
					outbox.lock().await.flushing = false;
					return;
				};
				for p in drained {
					push_or_queue(
						&remote,
						&queue,
						user_id,
						EntityRecord::Habit(p.habit),
						p.existed,
					)
					.await;
				}
				ui.emit(UiCommand::PendingCountChanged {
					pending: queue.len().await,
				});
			}
		}));
	}

	/// Wait for a deferred premium activation (payment webhook) to land
	/// remotely. Bounded: either the premium profile is observed and merged,
	/// or the attempt budget runs out with state unchanged.
	pub async fn confirm_premium(&self) -> PollOutcome<()> {
		let Some(user_id) = self.user_id().await else {
			return PollOutcome::Exhausted;
		};

		let remote = self.remote.clone();
		let outcome = bounded_poll(&self.config.polling, || {
			let remote = remote.clone();
			async move {
				match remote.fetch_profile(user_id).await {
					Ok(Some(profile)) if profile.premium => Some(profile),
					Ok(_) => None,
					Err(e) => {
						debug!(error = %e, "Premium poll attempt failed");
						None
					}
				}
			}
		})
		.await;

		match outcome {
			PollOutcome::Confirmed(profile) => {
				crate::service::merge::apply_remote(&self.store, EntityRecord::Profile(profile))
					.await;
				self.ui.emit(UiCommand::PremiumActivated);
				PollOutcome::Confirmed(())
			}
			PollOutcome::Exhausted => {
				warn!(user_id = %user_id, "Premium activation not confirmed within attempt budget");
				PollOutcome::Exhausted
			}
		}
	}

	async fn delete_record(&self, kind: EntityKind, id: Uuid) {
		self.store.remove(kind, id).await;

		let Some(user_id) = self.user_id().await else {
			// Unlike creates, a delete has no survivor-scan rescue on the
			// next full sync; queue it so the next session propagates it.
			self.queue.enqueue(QueueItem::delete(kind, id)).await;
			self.emit_pending().await;
			return;
		};
		match self.remote.delete(user_id, kind, id).await {
			// Already gone remotely counts as confirmed.
			Ok(()) | Err(RemoteError::NotFound) => self.queue.drain(id).await,
			Err(e) => {
				debug!(kind = %kind, id = %id, error = %e, "Remote delete failed, queueing");
				self.queue.enqueue(QueueItem::delete(kind, id)).await;
			}
		}
		self.emit_pending().await;
	}

	async fn emit_pending(&self) {
		self.ui.emit(UiCommand::PendingCountChanged {
			pending: self.queue.len().await,
		});
	}
}

/// Push one record, falling back to the queue. Direct-write confirmation also
/// drains any stale queued item for the id.
async fn push_or_queue(
	remote: &Arc<dyn RemoteStore>,
	queue: &Arc<MutationQueue>,
	user_id: Uuid,
	record: EntityRecord,
	existed: bool,
) {
	match remote.upsert(user_id, &record).await {
		Ok(()) => queue.drain(record.id()).await,
		Err(e) => {
			debug!(
				kind = %record.kind(),
				id = %record.id(),
				error = %e,
				"Remote write failed, falling back to queue"
			);
			let item = if existed {
				QueueItem::update(record)
			} else {
				QueueItem::create(record)
			};
			queue.enqueue(item).await;
		}
	}
}

/// Attempt every due queue item once. Transient failures reschedule with
/// backoff; an authentication failure latches `paused`, prompts for a fresh
/// session once, and suppresses further attempts until the latch clears.
async fn flush_due(
	queue: &Arc<MutationQueue>,
	remote: &Arc<dyn RemoteStore>,
	backoff_config: &BackoffConfig,
	user_id: Uuid,
	ui: &UiCommandBus,
	paused: &AtomicBool,
) {
	if paused.load(Ordering::SeqCst) {
		return;
	}

	let before = queue.len().await;

	for item in queue.due(Utc::now()).await {
		let result = match (&item.op, &item.payload) {
			(OpKind::Delete, _) => remote.delete(user_id, item.kind, item.entity_id).await,
			(_, Some(record)) => remote.upsert(user_id, record).await,
			// A create/update without a payload cannot be replayed.
			(_, None) => {
				warn!(entity_id = %item.entity_id, "Dropping queue item with missing payload");
				queue.drain(item.entity_id).await;
				continue;
			}
		};

		match result {
			Ok(()) => queue.drain(item.entity_id).await,
			Err(RemoteError::NotFound) if item.op == OpKind::Delete => {
				queue.drain(item.entity_id).await;
			}
			Err(RemoteError::Unauthorized) => {
				debug!(user_id = %user_id, "Queue flush paused: unauthorized");
				if !paused.swap(true, Ordering::SeqCst) {
					ui.emit(UiCommand::OpenAuthModal);
				}
				break;
			}
			Err(e) => {
				debug!(
					entity_id = %item.entity_id,
					retry_count = item.retry_count,
					error = %e,
					"Push failed, scheduling retry"
				);
				queue
					.record_failure(
						item.entity_id,
						backoff::retry_delay(backoff_config, item.retry_count),
					)
					.await;
			}
		}
	}

	let after = queue.len().await;
	if after != before {
		ui.emit(UiCommand::PendingCountChanged { pending: after });
	}
}

/// Background drain loop, one per session. Checks for due items on a fixed
/// interval; per-item `next_attempt_at` provides the actual backoff spacing.
async fn run_flush_loop(
	queue: Arc<MutationQueue>,
	remote: Arc<dyn RemoteStore>,
	backoff_config: BackoffConfig,
	user_id: Uuid,
	ui: UiCommandBus,
	auth_paused: Arc<AtomicBool>,
	mut shutdown: broadcast::Receiver<()>,
) {
	let mut interval =
		tokio::time::interval(Duration::from_millis(backoff_config.flush_interval_ms));
	// The first tick fires immediately; that is the reconnect-flush.
	loop {
		tokio::select! {
			_ = interval.tick() => {
				if !queue.is_empty().await {
					flush_due(&queue, &remote, &backoff_config, user_id, &ui, &auth_paused).await;
				}
			}
			_ = shutdown.recv() => {
				debug!(user_id = %user_id, "Queue flush loop stopped");
				return;
			}
		}
	}
}
