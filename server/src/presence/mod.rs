//! Presence synchronization: shared-store records, snapshots pushed to clients,
//! and reconciliation of cross-process login/logout signals.

pub mod reconciler;
pub mod record;
pub mod snapshot;

pub use record::{PresenceRecord, PresenceRecords};
pub use snapshot::{broadcast_snapshot, compute_snapshot};
