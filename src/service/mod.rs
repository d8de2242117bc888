//! Sync services: conflict merge rules, the reconciler, the realtime
//! listener and the coordinator façade.

pub mod coordinator;
pub mod merge;
pub mod realtime;
pub mod reconciler;
