//! Core state logic - framework-agnostic credits/garden state and data-sync
//! coordination.

/// Credits and garden state container
pub mod credits;
/// Background polling, backup, and integrity validation
pub mod sync;
