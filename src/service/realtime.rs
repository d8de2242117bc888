//! Realtime listener
//!
//! Subscribes to the per-user change feed and applies incoming events to the
//! local store through the same merge rule as the reconciler, so a record
//! echoed back from this device's own write is a no-op and records from other
//! devices overwrite cleanly regardless of delivery order.
//!
//! Connection lifecycle: `Subscribing → Active → (Disconnected →
//! Reconnecting)*`, driven by one spawned loop per session. Teardown on
//! logout awaits the loop so no event can be delivered for a stale user.

use crate::infra::store::SnapshotStore;
use crate::remote::RemoteStore;
use crate::service::merge;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Feed connection state, exposed for the UI sync indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
	/// No session; nothing subscribed.
	Idle,
	Subscribing,
	Active,
	Disconnected,
	Reconnecting,
}

pub struct RealtimeListener {
	store: Arc<SnapshotStore>,
	remote: Arc<dyn RemoteStore>,
	reconnect_delay: Duration,
	state: Arc<RwLock<ConnectionState>>,
	shutdown: Mutex<Option<broadcast::Sender<()>>>,
	task: Mutex<Option<JoinHandle<()>>>,
}

impl RealtimeListener {
	pub fn new(
		store: Arc<SnapshotStore>,
		remote: Arc<dyn RemoteStore>,
		reconnect_delay: Duration,
	) -> Self {
		Self {
			store,
			remote,
			reconnect_delay,
			state: Arc::new(RwLock::new(ConnectionState::Idle)),
			shutdown: Mutex::new(None),
			task: Mutex::new(None),
		}
	}

	pub async fn state(&self) -> ConnectionState {
		*self.state.read().await
	}

	/// Start listening for `user_id`. A second start for the same session is
	/// a no-op.
	pub async fn start(&self, user_id: Uuid) {
		let mut task = self.task.lock().await;
		if task.as_ref().is_some_and(|t| !t.is_finished()) {
			debug!("Realtime listener already running");
			return;
		}

		let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
		*self.shutdown.lock().await = Some(shutdown_tx);

		let store = self.store.clone();
		let remote = self.remote.clone();
		let state = self.state.clone();
		let reconnect_delay = self.reconnect_delay;
		*task = Some(tokio::spawn(async move {
			run_loop(store, remote, state, user_id, reconnect_delay, shutdown_rx).await;
		}));

		info!(user_id = %user_id, "Realtime listener started");
	}

	/// Tear the subscription down and wait for the loop to finish. Guaranteed
	/// complete on return; required on logout so no stale-user events land.
	pub async fn stop(&self) {
		if let Some(shutdown) = self.shutdown.lock().await.take() {
			let _ = shutdown.send(());
		}
		if let Some(task) = self.task.lock().await.take() {
			if let Err(e) = task.await {
				warn!(error = %e, "Realtime listener task ended abnormally");
			}
		}
		*self.state.write().await = ConnectionState::Idle;
		info!("Realtime listener stopped");
	}
}

async fn run_loop(
	store: Arc<SnapshotStore>,
	remote: Arc<dyn RemoteStore>,
	state: Arc<RwLock<ConnectionState>>,
	user_id: Uuid,
	reconnect_delay: Duration,
	mut shutdown: broadcast::Receiver<()>,
) {
	loop {
		*state.write().await = ConnectionState::Subscribing;

		match remote.subscribe(user_id).await {
			Ok(mut feed) => {
				*state.write().await = ConnectionState::Active;
				debug!(user_id = %user_id, "Realtime feed active");

				loop {
					tokio::select! {
						change = feed.recv() => match change {
							Some(change) => merge::apply_change(&store, change).await,
							None => {
								warn!(user_id = %user_id, "Realtime feed closed");
								*state.write().await = ConnectionState::Disconnected;
								break;
							}
						},
						_ = shutdown.recv() => return,
					}
				}
			}
			Err(e) => {
				warn!(user_id = %user_id, error = %e, "Realtime subscribe failed");
				*state.write().await = ConnectionState::Disconnected;
			}
		}

		*state.write().await = ConnectionState::Reconnecting;
		tokio::select! {
			_ = sleep(reconnect_delay) => {}
			_ = shutdown.recv() => return,
		}
	}
}
