//! The Conveyer: the mempool component. Stores transaction packets
//! keyed by content hash, tracks the current round's manifest, and
//! answers missing-packet queries for sync (spec §4.2).

pub mod conveyer;

pub use concord_types::error::MempoolError;
pub use conveyer::Conveyer;
