//! Typed UI command channel
//!
//! The sync engine never reaches into the UI; when it needs a UI action it
//! emits a closed command enum over a broadcast channel. This keeps the
//! engine/UI boundary statically checkable instead of stringly named events.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// Commands the engine can ask the UI layer to perform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiCommand {
	/// Ask the UI to present the sign-in modal (e.g. session expired).
	OpenAuthModal,
	/// Premium was confirmed remotely after a deferred payment.
	PremiumActivated,
	/// Pending outbound count changed; refresh the sync indicator.
	PendingCountChanged { pending: usize },
}

#[derive(Debug, Clone)]
pub struct UiCommandBus {
	sender: broadcast::Sender<UiCommand>,
}

impl UiCommandBus {
	pub fn new() -> Self {
		let (sender, _) = broadcast::channel(256);
		Self { sender }
	}

	/// Emit a command to all subscribers. Returns how many received it; zero
	/// subscribers is normal during startup and shutdown.
	pub fn emit(&self, command: UiCommand) -> usize {
		match self.sender.send(command.clone()) {
			Ok(count) => count,
			Err(_) => {
				debug!(?command, "UI command emitted with no subscribers");
				0
			}
		}
	}

	pub fn subscribe(&self) -> broadcast::Receiver<UiCommand> {
		self.sender.subscribe()
	}

	pub fn subscriber_count(&self) -> usize {
		self.sender.receiver_count()
	}
}

impl Default for UiCommandBus {
	fn default() -> Self {
		Self::new()
	}
}
