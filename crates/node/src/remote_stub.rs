//! Placeholder `RemoteExecutor`: the real remote executor is an
//! external VM reached over Thrift RPC, which this binary does not
//! embed. Every invocation fails immediately so a queue entry times
//! out and advances rather than hanging forever.

use async_trait::async_trait;

use concord_executor::{ExecutionOutcome, RemoteExecutor};
use concord_types::error::ExecutorError;
use concord_types::SmartContractRef;

pub struct UnavailableRemoteExecutor;

#[async_trait]
impl RemoteExecutor for UnavailableRemoteExecutor {
    async fn execute(&self, _invocation: SmartContractRef) -> Result<ExecutionOutcome, ExecutorError> {
        Err(ExecutorError::RemoteCallFailed("no remote executor configured for this node".to_string()))
    }
}
