//! End-to-end sync engine tests against the in-memory remote double.


use aura_core::domain::{Goal, HabitLog, JournalEntry, QuickNote, UserProfile};
use aura_core::infra::persist::Persister;
use aura_core::{
	ChangeKind, ConnectionState, EntityKind, EntityRecord, MutationQueue, OpKind, PollOutcome,
	SessionEvent, SnapshotStore, SyncConfig, SyncCoordinator, UiCommand,
};
use chrono::{NaiveDate, Utc};
use mock_remote::{change_for, delete_change, MockRemote};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

fn day(s: &str) -> NaiveDate {
	s.parse().unwrap()
}

fn entry(day_key: &str, mood: u8) -> JournalEntry {
	JournalEntry::new(day(day_key), mood)
}

fn setup() -> (Arc<MockRemote>, Arc<SyncCoordinator>, Uuid) {
	let _ = tracing_subscriber::fmt()
		.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
		.with_test_writer()
		.try_init();

	let remote = MockRemote::new();
	let store = Arc::new(SnapshotStore::load(Persister::ephemeral()));
	let queue = Arc::new(MutationQueue::load(Persister::ephemeral()));

	let mut config = SyncConfig::default();
	config.debounce.habit_flush_ms = 30;
	config.backoff.flush_interval_ms = 100;
	config.backoff.base_ms = 50;
	config.polling.premium_interval_ms = 20;

	let coordinator = Arc::new(SyncCoordinator::new(config, store, queue, remote.clone()));
	(remote, coordinator, Uuid::new_v4())
}

async fn sign_in(coordinator: &SyncCoordinator, user_id: Uuid) {
	coordinator
		.handle_session(SessionEvent::SignedIn { user_id })
		.await;
}

// Scenario A: a local-only entry survives the full-sync merge and is pushed.
#[tokio::test]
async fn local_only_entry_survives_full_sync_and_is_pushed() {
	let (remote, coordinator, user) = setup();
	let local = entry("2024-01-05", 2);
	coordinator
		.store()
		.upsert(EntityRecord::Entry(local.clone()))
		.await;

	sign_in(&coordinator, user).await;

	assert!(remote.contains(EntityKind::Entry, local.id).await);
	assert_eq!(coordinator.store().entries().await, vec![local]);
	assert_eq!(coordinator.pending_count().await, 0);
}

// Scenario A with the remote unreachable: the survivor lands in the queue.
#[tokio::test]
async fn local_only_entry_is_queued_when_push_fails() {
	let (remote, coordinator, user) = setup();
	let local = entry("2024-01-05", 2);
	coordinator
		.store()
		.upsert(EntityRecord::Entry(local.clone()))
		.await;

	remote.set_fail_writes(true);
	sign_in(&coordinator, user).await;

	assert_eq!(coordinator.pending_count().await, 1);
	assert_eq!(coordinator.store().entries().await, vec![local.clone()]);
	assert!(!remote.contains(EntityKind::Entry, local.id).await);
}

// Scenario B: the remote copy of an already-synced day wins over stale local.
#[tokio::test]
async fn remote_entry_wins_for_same_day() {
	let (remote, coordinator, user) = setup();
	let stale = entry("2024-01-05", 2);
	let fresh = entry("2024-01-05", 4);
	coordinator
		.store()
		.upsert(EntityRecord::Entry(stale))
		.await;
	remote.seed(EntityRecord::Entry(fresh.clone())).await;

	sign_in(&coordinator, user).await;

	let entries = coordinator.store().entries().await;
	assert_eq!(entries.len(), 1);
	assert_eq!(entries[0].id, fresh.id);
	assert_eq!(entries[0].mood, 4);
	// The stale local entry must not resurrect on the remote side.
	assert_eq!(remote.entry_count().await, 1);
}

// Scenario C: duplicate realtime DELETEs for an id already gone are no-ops.
#[tokio::test]
async fn duplicate_realtime_deletes_are_harmless() {
	let (remote, coordinator, user) = setup();
	sign_in(&coordinator, user).await;
	tokio::time::sleep(Duration::from_millis(50)).await;

	let ghost = Uuid::new_v4();
	remote.push_change(delete_change(EntityKind::Note, ghost)).await;
	remote.push_change(delete_change(EntityKind::Note, ghost)).await;
	tokio::time::sleep(Duration::from_millis(50)).await;

	assert!(coordinator.store().notes().await.is_empty());
	assert_eq!(coordinator.realtime_state().await, ConnectionState::Active);
}

// Scenario D: trigger_sync while a sync is in flight is a no-op.
#[tokio::test]
async fn concurrent_trigger_sync_runs_once() {
	let (remote, coordinator, user) = setup();

	// Make the login full sync fail so last_sync_at stays unset and the next
	// trigger runs a (counted) full sync.
	remote.set_fail_reads(true);
	sign_in(&coordinator, user).await;
	assert_eq!(remote.fetch_all_calls(), 1);
	assert!(!coordinator.is_syncing());

	remote.set_fail_reads(false);
	remote.set_read_delay(Duration::from_millis(150)).await;

	let first = {
		let coordinator = coordinator.clone();
		tokio::spawn(async move { coordinator.trigger_sync().await })
	};
	tokio::time::sleep(Duration::from_millis(30)).await;
	assert!(coordinator.is_syncing());

	coordinator.trigger_sync().await; // must no-op
	first.await.unwrap();

	assert_eq!(remote.fetch_all_calls(), 2);
	assert!(!coordinator.is_syncing());
	assert!(coordinator.last_sync_at().await.is_some());
}

#[tokio::test]
async fn offline_note_is_queued_then_drained_by_trigger() {
	let (remote, coordinator, user) = setup();
	sign_in(&coordinator, user).await;

	remote.set_fail_writes(true);
	let note = QuickNote::new(day("2024-01-05"), "offline thought");
	coordinator.save_quick_note(note.clone()).await;

	assert_eq!(coordinator.pending_count().await, 1);
	assert_eq!(coordinator.store().notes().await.len(), 1);

	remote.set_fail_writes(false);
	coordinator.trigger_sync().await;

	assert_eq!(coordinator.pending_count().await, 0);
	assert!(remote.contains(EntityKind::Note, note.id).await);
}

#[tokio::test]
async fn background_flush_drains_queue_without_manual_trigger() {
	let (remote, coordinator, user) = setup();
	sign_in(&coordinator, user).await;

	remote.set_fail_writes(true);
	let note = QuickNote::new(day("2024-01-05"), "will sync later");
	coordinator.save_quick_note(note.clone()).await;
	assert_eq!(coordinator.pending_count().await, 1);

	remote.set_fail_writes(false);
	// The per-session flush loop runs every 100ms; the queued retry backoff
	// base is 50ms, so a few intervals are plenty.
	tokio::time::sleep(Duration::from_millis(400)).await;

	assert_eq!(coordinator.pending_count().await, 0);
	assert!(remote.contains(EntityKind::Note, note.id).await);
}

#[tokio::test]
async fn delete_supersedes_unpushed_create() {
	let (remote, coordinator, user) = setup();
	sign_in(&coordinator, user).await;
	let pushes_before = remote.upsert_calls();

	remote.set_fail_writes(true);
	let note = QuickNote::new(day("2024-01-05"), "never to be seen");
	coordinator.save_quick_note(note.clone()).await;
	assert_eq!(coordinator.pending_count().await, 1);

	coordinator.delete_quick_note(note.id).await;
	assert_eq!(coordinator.pending_count().await, 0);

	remote.set_fail_writes(false);
	coordinator.trigger_sync().await;

	assert!(!remote.contains(EntityKind::Note, note.id).await);
	assert_eq!(remote.upsert_calls(), pushes_before);
	assert!(coordinator.store().notes().await.is_empty());
}

#[tokio::test]
async fn xp_never_decreases_through_full_sync() {
	let (remote, coordinator, user) = setup();

	let mut local = UserProfile::new(user, "mira");
	local.xp = 500;
	coordinator
		.store()
		.upsert(EntityRecord::Profile(local))
		.await;

	let mut remote_profile = UserProfile::new(user, "mira");
	remote_profile.xp = 120;
	remote.seed(EntityRecord::Profile(remote_profile)).await;

	sign_in(&coordinator, user).await;

	assert_eq!(coordinator.store().xp().await, 500);
}

#[tokio::test]
async fn realtime_updates_apply_idempotently() {
	let (remote, coordinator, user) = setup();
	sign_in(&coordinator, user).await;
	tokio::time::sleep(Duration::from_millis(50)).await;

	let incoming = entry("2024-01-06", 4);
	remote
		.push_change(change_for(ChangeKind::Insert, EntityRecord::Entry(incoming.clone())))
		.await;
	remote
		.push_change(change_for(ChangeKind::Update, EntityRecord::Entry(incoming.clone())))
		.await;
	tokio::time::sleep(Duration::from_millis(50)).await;

	assert_eq!(coordinator.store().entries().await, vec![incoming]);
}

#[tokio::test]
async fn logout_tears_down_realtime_and_keeps_snapshot() {
	let (remote, coordinator, user) = setup();
	let local = entry("2024-01-05", 3);
	coordinator
		.store()
		.upsert(EntityRecord::Entry(local.clone()))
		.await;
	sign_in(&coordinator, user).await;

	coordinator.handle_session(SessionEvent::SignedOut).await;
	assert_eq!(coordinator.realtime_state().await, ConnectionState::Idle);

	// Events after teardown must not reach the store.
	remote
		.push_change(change_for(
			ChangeKind::Insert,
			EntityRecord::Entry(entry("2024-01-07", 5)),
		))
		.await;
	tokio::time::sleep(Duration::from_millis(50)).await;

	assert_eq!(coordinator.store().entries().await, vec![local]);
}

#[tokio::test]
async fn full_sync_failure_is_silent_and_recoverable() {
	let (remote, coordinator, user) = setup();
	remote.set_fail_reads(true);

	sign_in(&coordinator, user).await;

	assert!(!coordinator.is_syncing());
	assert!(coordinator.last_sync_at().await.is_none());

	// The app keeps working on local data and the next trigger recovers.
	remote.set_fail_reads(false);
	coordinator.trigger_sync().await;
	assert!(coordinator.last_sync_at().await.is_some());
}

#[tokio::test]
async fn repeated_session_events_run_one_full_sync() {
	let (remote, coordinator, user) = setup();

	sign_in(&coordinator, user).await;
	sign_in(&coordinator, user).await;
	sign_in(&coordinator, user).await;

	assert_eq!(remote.fetch_all_calls(), 1);
}

#[tokio::test]
async fn rapid_habit_updates_coalesce_into_one_push() {
	let (remote, coordinator, user) = setup();
	sign_in(&coordinator, user).await;
	let pushes_before = remote.upsert_calls();

	let mut habit = HabitLog::new(day("2024-01-05"));
	for ml in [250, 500, 750, 1_000, 1_250] {
		habit.hydration_ml = ml;
		coordinator.log_habit(habit.clone()).await;
	}

	tokio::time::sleep(Duration::from_millis(120)).await;

	assert_eq!(remote.upsert_calls(), pushes_before + 1);
	assert!(remote.contains(EntityKind::Habit, habit.id).await);
	let local = coordinator
		.store()
		.habit_for_day(day("2024-01-05"))
		.await
		.unwrap();
	assert_eq!(local.hydration_ml, 1_250);
}

#[tokio::test]
async fn habit_update_during_in_flight_push_is_not_lost() {
	let (remote, coordinator, user) = setup();
	sign_in(&coordinator, user).await;
	remote.set_write_delay(Duration::from_millis(150)).await;

	let mut habit = HabitLog::new(day("2024-01-05"));
	habit.hydration_ml = 250;
	coordinator.log_habit(habit.clone()).await;

	// Land a second update while the first push is still in flight.
	tokio::time::sleep(Duration::from_millis(80)).await;
	habit.hydration_ml = 999;
	coordinator.log_habit(habit.clone()).await;

	tokio::time::sleep(Duration::from_millis(600)).await;

	let pushed = remote.habit_for_day(day("2024-01-05")).await.unwrap();
	assert_eq!(pushed.hydration_ml, 999);
	assert_eq!(coordinator.pending_count().await, 0);
}

#[tokio::test]
async fn auth_failure_prompts_once_while_paused() {
	let (remote, coordinator, user) = setup();
	sign_in(&coordinator, user).await;
	let mut ui = coordinator.ui().subscribe();

	remote.set_unauthorized(true);
	let note = QuickNote::new(day("2024-01-05"), "pending through auth lapse");
	coordinator.save_quick_note(note.clone()).await;
	assert_eq!(coordinator.pending_count().await, 1);

	// Several background flush intervals pass while unauthorized.
	tokio::time::sleep(Duration::from_millis(500)).await;

	let mut prompts = 0;
	while let Ok(command) = ui.try_recv() {
		if command == UiCommand::OpenAuthModal {
			prompts += 1;
		}
	}
	assert_eq!(prompts, 1);

	remote.set_unauthorized(false);
	coordinator.trigger_sync().await;
	assert_eq!(coordinator.pending_count().await, 0);
	assert!(remote.contains(EntityKind::Note, note.id).await);
}

#[tokio::test]
async fn account_switch_discards_previous_users_unpushed_data() {
	let (remote, coordinator, user_a) = setup();
	sign_in(&coordinator, user_a).await;

	remote.set_fail_writes(true);
	coordinator
		.save_profile(UserProfile::new(user_a, "mira"))
		.await;
	let secret = entry("2024-01-05", 2);
	coordinator.save_entry(secret.clone(), Vec::new()).await;
	assert!(coordinator.pending_count().await >= 1);

	coordinator.handle_session(SessionEvent::SignedOut).await;
	remote.set_fail_writes(false);

	let user_b = Uuid::new_v4();
	sign_in(&coordinator, user_b).await;
	tokio::time::sleep(Duration::from_millis(300)).await;

	// Nothing of the first user's may reach the second account or screen.
	assert!(!remote.contains(EntityKind::Entry, secret.id).await);
	assert_eq!(remote.entry_count().await, 0);
	assert!(coordinator.store().entries().await.is_empty());
	assert_eq!(coordinator.pending_count().await, 0);
}

#[tokio::test]
async fn failed_push_of_new_goal_is_queued_as_create() {
	let remote = MockRemote::new();
	let store = Arc::new(SnapshotStore::load(Persister::ephemeral()));
	let queue = Arc::new(MutationQueue::load(Persister::ephemeral()));
	let coordinator = Arc::new(SyncCoordinator::new(
		SyncConfig::default(),
		store,
		queue.clone(),
		remote.clone(),
	));
	sign_in(&coordinator, Uuid::new_v4()).await;

	remote.set_fail_writes(true);
	let parent = entry("2024-01-05", 3);
	let goal = Goal::new(parent.id, parent.day, "stretch");
	coordinator.save_entry(parent, vec![goal.clone()]).await;

	let queued = queue
		.due(Utc::now())
		.await
		.into_iter()
		.find(|item| item.entity_id == goal.id)
		.unwrap();
	assert_eq!(queued.op, OpKind::Create);
}

#[tokio::test]
async fn signed_out_delete_is_queued_and_propagates() {
	let (remote, coordinator, user) = setup();
	let note = QuickNote::new(day("2024-01-05"), "short-lived");
	remote.seed(EntityRecord::Note(note.clone())).await;
	sign_in(&coordinator, user).await;
	assert_eq!(coordinator.store().notes().await.len(), 1);

	coordinator.handle_session(SessionEvent::SignedOut).await;
	coordinator.delete_quick_note(note.id).await;
	assert!(coordinator.store().notes().await.is_empty());
	assert_eq!(coordinator.pending_count().await, 1);

	sign_in(&coordinator, user).await;
	tokio::time::sleep(Duration::from_millis(300)).await;

	assert!(!remote.contains(EntityKind::Note, note.id).await);
	assert_eq!(coordinator.pending_count().await, 0);
}

#[tokio::test]
async fn unauthorized_pauses_sync_without_losing_data() {
	let (remote, coordinator, user) = setup();
	sign_in(&coordinator, user).await;

	remote.set_unauthorized(true);
	let note = QuickNote::new(day("2024-01-05"), "written during auth lapse");
	coordinator.save_quick_note(note.clone()).await;
	coordinator.trigger_sync().await;

	// Nothing dropped, nothing raised; just pending.
	assert_eq!(coordinator.pending_count().await, 1);
	assert_eq!(coordinator.store().notes().await.len(), 1);

	remote.set_unauthorized(false);
	coordinator.trigger_sync().await;
	assert_eq!(coordinator.pending_count().await, 0);
	assert!(remote.contains(EntityKind::Note, note.id).await);
}

#[tokio::test]
async fn premium_confirmation_polls_until_webhook_lands() {
	let (remote, coordinator, user) = setup();
	sign_in(&coordinator, user).await;

	let webhook = {
		let remote = remote.clone();
		tokio::spawn(async move {
			tokio::time::sleep(Duration::from_millis(50)).await;
			let mut profile = UserProfile::new(user, "mira");
			profile.premium = true;
			remote.seed(EntityRecord::Profile(profile)).await;
		})
	};

	let outcome = coordinator.confirm_premium().await;
	webhook.await.unwrap();

	assert_eq!(outcome, PollOutcome::Confirmed(()));
	assert!(coordinator.store().is_premium().await);
}

#[tokio::test]
async fn premium_confirmation_exhausts_when_nothing_lands() {
	let (_remote, coordinator, user) = setup();
	sign_in(&coordinator, user).await;

	let outcome = coordinator.confirm_premium().await;
	assert_eq!(outcome, PollOutcome::Exhausted);
	assert!(!coordinator.store().is_premium().await);
}

#[tokio::test]
async fn first_entry_date_is_anchored_on_first_save() {
	let (_remote, coordinator, user) = setup();
	sign_in(&coordinator, user).await;

	coordinator
		.save_profile(UserProfile::new(user, "mira"))
		.await;
	coordinator
		.save_entry(entry("2024-01-05", 4), Vec::new())
		.await;

	let profile = coordinator.store().profile().await.unwrap();
	assert_eq!(profile.first_entry_date, Some(day("2024-01-05")));

	// Further entries must not move the anchor.
	coordinator
		.save_entry(entry("2024-01-02", 3), Vec::new())
		.await;
	let profile = coordinator.store().profile().await.unwrap();
	assert_eq!(profile.first_entry_date, Some(day("2024-01-05")));
}
