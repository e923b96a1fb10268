pub mod block;
pub mod round_table;
pub mod sync;

pub use concord_types::error::CoordinatorError;
pub use block::{assemble, assemble_genesis, block_quorum, finalize, signing_bytes, Draft};
pub use round_table::next_round_table;
pub use sync::{ingest_synced_block, missing_range};
