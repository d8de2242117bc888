//! Local infrastructure: persistence, snapshot store, outbound queue,
//! retry backoff and the typed UI command channel.

pub mod backoff;
pub mod event_bus;
pub mod persist;
pub mod queue;
pub mod store;
