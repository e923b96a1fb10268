//! FIFO-per-contract invocation queue (spec §4.4): at most one
//! invocation per contract address is ever `Running`, since only a
//! queue's head is eligible to run.

use std::collections::VecDeque;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::warn;

use concord_types::error::ExecutorError;
use concord_types::{Address, Round, SmartContractRef, Transaction};

use crate::remote::{ExecutionOutcome, RemoteExecutor};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum QueueState {
    Waiting,
    Running,
    Finished,
    Closed,
}

#[derive(Clone, Debug)]
pub struct QueueItem {
    pub invocation: SmartContractRef,
    pub state: QueueState,
    pub enqueued_round: Round,
    pub running_since_round: Option<Round>,
    pub emitted: Vec<Transaction>,
    pub result_state: Vec<u8>,
}

impl QueueItem {
    fn new(invocation: SmartContractRef, enqueued_round: Round) -> Self {
        QueueItem {
            invocation,
            state: QueueState::Waiting,
            enqueued_round,
            running_since_round: None,
            emitted: Vec::new(),
            result_state: Vec::new(),
        }
    }
}

/// A contract-execution result, delivered to the consensus mailbox by
/// an executor watcher task rather than applied directly (spec §5
/// "Executor watchers").
#[derive(Debug)]
pub struct SmartResult {
    pub contract_address: Address,
    pub invocation: SmartContractRef,
    pub outcome: Result<ExecutionOutcome, ExecutorError>,
}

/// Per-contract FIFO queues plus the round-count timeout that forces
/// progress when the remote executor hangs.
pub struct ExecutorQueue {
    queues: DashMap<Address, VecDeque<QueueItem>>,
    running_timeout_rounds: u64,
}

impl ExecutorQueue {
    pub fn new(running_timeout_rounds: u64) -> Self {
        ExecutorQueue {
            queues: DashMap::new(),
            running_timeout_rounds,
        }
    }

    pub fn enqueue(&self, contract_address: Address, invocation: SmartContractRef, current_round: Round) {
        self.queues
            .entry(contract_address)
            .or_default()
            .push_back(QueueItem::new(invocation, current_round));
    }

    /// Advances every contract's head: a `Waiting` head with no
    /// sibling `Running` transitions to `Running`. Returns the
    /// addresses and invocations that just started, for the caller to
    /// dispatch to the remote executor.
    pub fn test_exe_queue(&self, current_round: Round) -> Vec<(Address, SmartContractRef)> {
        let mut started = Vec::new();
        for mut entry in self.queues.iter_mut() {
            let address = *entry.key();
            if let Some(head) = entry.value_mut().front_mut() {
                if head.state == QueueState::Waiting {
                    head.state = QueueState::Running;
                    head.running_since_round = Some(current_round);
                    started.push((address, head.invocation));
                }
            }
        }
        started
    }

    /// Marks the head `Finished`, capturing its emitted transactions
    /// and result state. Fails if the head isn't the given invocation
    /// — it may already have been canceled by a big-bang reset.
    pub fn finish(
        &self,
        contract_address: Address,
        invocation: SmartContractRef,
        outcome: ExecutionOutcome,
    ) -> Result<(), ExecutorError> {
        let mut queue = self
            .queues
            .get_mut(&contract_address)
            .ok_or_else(|| ExecutorError::QueueItemNotFound(format!("{:?}", contract_address)))?;
        let head = queue
            .front_mut()
            .filter(|item| item.invocation == invocation)
            .ok_or_else(|| ExecutorError::QueueItemNotFound(format!("{:?}", invocation)))?;
        head.state = QueueState::Finished;
        head.emitted = outcome.emitted;
        head.result_state = outcome.state;
        Ok(())
    }

    /// Removes a `Finished` head once its `new-state` transaction has
    /// landed in a finalized block, freeing the next `Waiting` item.
    pub fn close_head(&self, contract_address: &Address) {
        if let Some(mut queue) = self.queues.get_mut(contract_address) {
            if matches!(queue.front(), Some(item) if item.state == QueueState::Finished) {
                queue.pop_front();
            }
        }
    }

    /// Heads `Running` longer than the configured bound: the caller
    /// should synthesize an empty-state `new-state` transaction for
    /// each so the chain keeps progressing (spec §4.4).
    pub fn timed_out(&self, current_round: Round) -> Vec<(Address, SmartContractRef)> {
        let mut out = Vec::new();
        for entry in self.queues.iter() {
            if let Some(head) = entry.value().front() {
                if head.state == QueueState::Running {
                    if let Some(since) = head.running_since_round {
                        if current_round.0.saturating_sub(since.0) > self.running_timeout_rounds {
                            out.push((*entry.key(), head.invocation));
                        }
                    }
                }
            }
        }
        out
    }

    /// Big-bang reset (spec §4.5): every `Running` head reverts to
    /// `Waiting` and discards what it had emitted so far.
    pub fn cancel_running(&self) {
        for mut entry in self.queues.iter_mut() {
            if let Some(head) = entry.value_mut().front_mut() {
                if head.state == QueueState::Running {
                    head.state = QueueState::Waiting;
                    head.running_since_round = None;
                    head.emitted.clear();
                    head.result_state.clear();
                }
            }
        }
    }

    pub fn depth(&self, contract_address: &Address) -> usize {
        self.queues.get(contract_address).map(|q| q.len()).unwrap_or(0)
    }

    pub fn head_state(&self, contract_address: &Address) -> Option<QueueState> {
        self.queues.get(contract_address).and_then(|q| q.front().map(|item| item.state))
    }
}

/// Owns the queue and the remote-executor client, spawning one
/// watcher task per outstanding RPC. Watchers report completion into
/// `mailbox` rather than applying it directly — only the consensus
/// task mutates queue state from there on (spec §5).
pub struct Executor {
    pub queue: Arc<ExecutorQueue>,
    remote: Arc<dyn RemoteExecutor>,
    mailbox: mpsc::Sender<SmartResult>,
}

impl Executor {
    pub fn new(running_timeout_rounds: u64, remote: Arc<dyn RemoteExecutor>, mailbox: mpsc::Sender<SmartResult>) -> Self {
        Executor {
            queue: Arc::new(ExecutorQueue::new(running_timeout_rounds)),
            remote,
            mailbox,
        }
    }

    pub fn enqueue(&self, contract_address: Address, invocation: SmartContractRef, current_round: Round) {
        self.queue.enqueue(contract_address, invocation, current_round);
    }

    /// Advances every queue's head and spawns a watcher for each
    /// invocation that just started running.
    pub fn dispatch_ready(&self, current_round: Round) {
        for (contract_address, invocation) in self.queue.test_exe_queue(current_round) {
            let remote = self.remote.clone();
            let mailbox = self.mailbox.clone();
            tokio::spawn(async move {
                let outcome = remote.execute(invocation).await;
                if mailbox
                    .send(SmartResult { contract_address, invocation, outcome })
                    .await
                    .is_err()
                {
                    warn!(target: "executor", ?contract_address, "consensus mailbox closed, dropping SmartResult");
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concord_types::PublicKey;

    fn contract(byte: u8) -> Address {
        Address::PublicKey(PublicKey([byte; 32]))
    }

    fn invocation(index: u32) -> SmartContractRef {
        SmartContractRef { sequence: concord_types::Sequence(1), index }
    }

    #[test]
    fn second_invocation_waits_behind_a_running_head() {
        let queue = ExecutorQueue::new(10);
        let addr = contract(1);
        queue.enqueue(addr, invocation(0), Round(1));
        queue.enqueue(addr, invocation(1), Round(1));

        let started = queue.test_exe_queue(Round(1));
        assert_eq!(started, vec![(addr, invocation(0))]);

        // A second test_exe_queue call must not start the second item
        // while the head is still Running.
        let started_again = queue.test_exe_queue(Round(2));
        assert!(started_again.is_empty());
        assert_eq!(queue.depth(&addr), 2);
    }

    #[test]
    fn finish_then_close_advances_to_next_item() {
        let queue = ExecutorQueue::new(10);
        let addr = contract(2);
        queue.enqueue(addr, invocation(0), Round(1));
        queue.enqueue(addr, invocation(1), Round(1));
        queue.test_exe_queue(Round(1));

        queue
            .finish(addr, invocation(0), ExecutionOutcome { emitted: vec![], state: vec![7] })
            .unwrap();
        assert_eq!(queue.head_state(&addr), Some(QueueState::Finished));

        queue.close_head(&addr);
        assert_eq!(queue.depth(&addr), 1);
        assert_eq!(queue.head_state(&addr), Some(QueueState::Waiting));

        let started = queue.test_exe_queue(Round(2));
        assert_eq!(started, vec![(addr, invocation(1))]);
    }

    #[test]
    fn timeout_flags_a_long_running_head() {
        let queue = ExecutorQueue::new(3);
        let addr = contract(3);
        queue.enqueue(addr, invocation(0), Round(1));
        queue.test_exe_queue(Round(1));

        assert!(queue.timed_out(Round(3)).is_empty());
        assert_eq!(queue.timed_out(Round(5)), vec![(addr, invocation(0))]);
    }

    #[test]
    fn big_bang_reverts_running_heads_and_drops_emitted() {
        let queue = ExecutorQueue::new(10);
        let addr = contract(4);
        queue.enqueue(addr, invocation(0), Round(1));
        queue.test_exe_queue(Round(1));
        queue
            .finish(addr, invocation(0), ExecutionOutcome { emitted: vec![], state: vec![1, 2] })
            .unwrap();
        // Re-run it as if a new invocation started running behind it
        // isn't relevant here; simulate mid-flight cancellation before
        // finish by resetting state manually through a fresh item.
        queue.cancel_running();
        // Already Finished, not Running, so cancel_running is a no-op
        // for this head — confirms cancellation only touches Running.
        assert_eq!(queue.head_state(&addr), Some(QueueState::Finished));

        let addr2 = contract(5);
        queue.enqueue(addr2, invocation(1), Round(1));
        queue.test_exe_queue(Round(1));
        queue.cancel_running();
        assert_eq!(queue.head_state(&addr2), Some(QueueState::Waiting));
    }

    #[tokio::test]
    async fn dispatch_ready_reports_result_through_mailbox() {
        struct EchoRemote;
        #[async_trait::async_trait]
        impl RemoteExecutor for EchoRemote {
            async fn execute(&self, _invocation: SmartContractRef) -> Result<ExecutionOutcome, ExecutorError> {
                Ok(ExecutionOutcome { emitted: vec![], state: vec![42] })
            }
        }

        let (tx, mut rx) = mpsc::channel(4);
        let executor = Executor::new(10, Arc::new(EchoRemote), tx);
        let addr = contract(6);
        executor.enqueue(addr, invocation(0), Round(1));
        executor.dispatch_ready(Round(1));

        let result = rx.recv().await.expect("watcher reports a result");
        assert_eq!(result.contract_address, addr);
        assert_eq!(result.outcome.unwrap().state, vec![42]);
    }
}
