//! On-disk persistence: an append-only pool store of finalized blocks,
//! a wallet index (absolute address → balance/last-tx/public-key), and
//! a transactions index used to walk an address's transaction history
//! backwards (spec §6 "Persisted state").
//!
//! Treated as an external collaborator by the core spec; this crate
//! gives it a real, if simple, `redb`-backed implementation so the
//! validator and coordinator have something concrete to call through.

pub mod pool;
pub mod txindex;
pub mod wallet;

pub use concord_types::error::StorageError;
pub use pool::PoolStore;
pub use txindex::TransactionsIndex;
pub use wallet::{WalletIndex, WalletRecord};
