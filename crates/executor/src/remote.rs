//! Client surface the queue talks to. The real remote executor is an
//! external VM reached over Thrift RPC (spec §1 "out of scope"); this
//! crate only needs the boundary trait and the shape of a result.

use async_trait::async_trait;

use concord_types::error::ExecutorError;
use concord_types::{SmartContractRef, Transaction};

/// What a finished invocation produced: the transactions it emitted
/// (source is the contract's own address) and its resulting state
/// blob, opaque to everything above this crate.
#[derive(Clone, Debug, Default)]
pub struct ExecutionOutcome {
    pub emitted: Vec<Transaction>,
    pub state: Vec<u8>,
}

#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    async fn execute(&self, invocation: SmartContractRef) -> Result<ExecutionOutcome, ExecutorError>;
}
