//! The smart-contract invocation queue (spec §4.4): a FIFO per
//! contract address, an async remote-executor client, and the
//! `new-state` transaction that reports an invocation's result back
//! into the transaction graph.

pub mod new_state;
pub mod queue;
pub mod remote;

pub use concord_types::error::ExecutorError;
pub use new_state::{build_new_state_transaction, decode_ref_start, encode_ref_start, REF_START_FIELD_ID, STATE_FIELD_ID};
pub use queue::{Executor, ExecutorQueue, QueueItem, QueueState, SmartResult};
pub use remote::{ExecutionOutcome, RemoteExecutor};
