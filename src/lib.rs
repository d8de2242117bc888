//! Sync engine for the Aura journaling app.
//!
//! Keeps a device-local snapshot of a user's journal data consistent with the
//! remote multi-device store across unreliable connectivity, concurrent edits
//! from other devices and a live push channel. The UI only ever reads from the
//! local snapshot; every remote interaction goes through the coordinator.

#![warn(
	clippy::all,
	clippy::correctness,
	clippy::perf,
	clippy::style,
	clippy::suspicious,
	clippy::complexity,
	clippy::unwrap_used,
	unused_qualifications,
	rust_2018_idioms,
	trivial_casts,
	trivial_numeric_casts,
	unused_allocation
)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

pub mod config;
pub mod domain;
pub mod infra;
pub mod remote;
pub mod service;

pub use config::SyncConfig;
pub use domain::{EntityKind, EntityRecord, Syncable};
pub use infra::backoff::PollOutcome;
pub use infra::event_bus::{UiCommand, UiCommandBus};
pub use infra::queue::{MutationQueue, OpKind, QueueItem};
pub use infra::store::SnapshotStore;
pub use remote::{ChangeKind, RemoteChange, RemoteError, RemoteSnapshot, RemoteStore};
pub use service::coordinator::{SessionEvent, SyncCoordinator};
pub use service::realtime::ConnectionState;

/// Errors produced by the sync engine.
///
/// These never reach the UI as exceptions; the coordinator converts them into
/// state flags (`is_syncing`, pending count) and log lines.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
	#[error("remote store error: {0}")]
	Remote(#[from] remote::RemoteError),
}
