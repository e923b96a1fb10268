//! The per-round driving loop: reads framed messages off the
//! transport socket, feeds them into the round state machine, and on
//! Stage3 quorum has the writer assemble, sign and broadcast the
//! block. Also drives the stage-request recovery timer, catch-up
//! sync and the smart-contract executor's ready/timeout ticks.

use std::sync::Arc;

use parity_scale_codec::{Decode, Encode};

use concord_consensus::{BigBang, RoundMachine};
use concord_coordinator::{assemble, finalize, ingest_synced_block, missing_range};
use concord_crypto::keyfile::KeyPair;
use concord_executor::{ExecutionOutcome, Executor};
use concord_mempool::Conveyer;
use concord_storage::PoolStore;
use concord_telemetry::Metrics;
use concord_transport::{MessageKind, Transport};
use concord_types::config::NodeConfig;
use concord_types::{Block, PublicKey, Round, RoundTable, Sequence, Stage1, Stage2, Stage3, StageKind, StageRequest};

pub async fn drive(
    transport: Arc<Transport>,
    pool: Arc<PoolStore>,
    conveyer: Arc<Conveyer>,
    executor: Arc<Executor>,
    keypair: KeyPair,
    mut machine: RoundMachine,
    authority: PublicKey,
    metrics: Metrics,
    config: Arc<NodeConfig>,
) {
    let mut buf = vec![0u8; 64 * 1024];
    let mut ticker = tokio::time::interval(config.timeouts.stage_request());
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            received = transport.recv(&mut buf) => {
                let inbound = match received {
                    Ok(Some(inbound)) => inbound,
                    Ok(None) => continue,
                    Err(error) => {
                        tracing::warn!(target: "node", %error, "transport receive failed");
                        continue;
                    }
                };

                match inbound.kind {
                    MessageKind::RoundTable => {
                        if let Ok(table) = RoundTable::decode(&mut inbound.payload.as_slice()) {
                            let round = table.round;
                            machine.on_round_table(table);
                            request_catch_up(&transport, &pool, round, config.max_packet_request_size).await;
                        }
                    }
                    MessageKind::Stage1 => {
                        if let Ok(stage) = Stage1::decode(&mut inbound.payload.as_slice()) {
                            let _ = machine.ingest_stage1(stage);
                        }
                    }
                    MessageKind::Stage2 => {
                        if let Ok(stage) = Stage2::decode(&mut inbound.payload.as_slice()) {
                            let _ = machine.ingest_stage2(stage);
                        }
                    }
                    MessageKind::Stage3 => {
                        if let Ok(stage) = Stage3::decode(&mut inbound.payload.as_slice()) {
                            match machine.ingest_stage3(stage) {
                                Ok(true) => try_finalize(&transport, &pool, &conveyer, &executor, &keypair, &machine, &metrics).await,
                                Ok(false) => {}
                                Err(error) => tracing::warn!(target: "node", %error, "rejected stage3 message"),
                            }
                        }
                    }
                    MessageKind::StageRequest => {
                        if let Ok(request) = StageRequest::decode(&mut inbound.payload.as_slice()) {
                            reply_to_stage_request(&transport, &machine, request).await;
                        }
                    }
                    MessageKind::BigBang => {
                        if let Ok(bb) = BigBang::decode(&mut inbound.payload.as_slice()) {
                            let last_written = pool.last_sequence().unwrap_or(None).unwrap_or(Sequence(0));
                            match machine.on_big_bang(&bb, &authority, last_written) {
                                Ok(()) => metrics.inc_big_bangs(),
                                Err(error) => tracing::warn!(target: "node", %error, "rejected big bang"),
                            }
                        }
                    }
                    MessageKind::TransactionsPacket => {
                        if let Ok(packet) = concord_types::TransactionsPacket::decode(&mut inbound.payload.as_slice()) {
                            if let Err(error) = conveyer.add(packet) {
                                tracing::debug!(target: "node", %error, "rejected transactions packet");
                            }
                            metrics.set_mempool_packets(conveyer.current_manifest().len());
                        }
                    }
                    MessageKind::BlockRequest => {
                        if let Ok(sequences) = Vec::<Sequence>::decode(&mut inbound.payload.as_slice()) {
                            reply_to_block_request(&transport, &pool, machine.round, sequences).await;
                        }
                    }
                    MessageKind::RequestedBlock => {
                        if let Ok(block) = concord_types::codec::decode_block(&inbound.payload) {
                            apply_synced_block(&pool, &executor, &machine, block);
                        }
                    }
                    MessageKind::Registration => {
                        if let Ok(sender) = PublicKey::decode(&mut inbound.payload.as_slice()) {
                            handle_registration(&transport, &machine, sender, inbound.from, config.max_trusted_nodes).await;
                        }
                    }
                    MessageKind::RegistrationConfirmed => {
                        if let Ok(sender) = PublicKey::decode(&mut inbound.payload.as_slice()) {
                            transport.neighbours().confirm_registration(&sender);
                        }
                    }
                    MessageKind::RegistrationRefused => {
                        if let Ok(sender) = PublicKey::decode(&mut inbound.payload.as_slice()) {
                            transport.neighbours().refuse(&sender);
                        }
                    }
                    _ => {}
                }
            }
            _ = ticker.tick() => {
                request_missing_stages(&transport, &machine).await;
                run_executor_tick(&executor, machine.round);
            }
        }
    }
}

/// Sends a `StageRequest` to every confidant for each stage this node
/// is still missing a sender's message from (spec §4.5 "stage-request
/// recovery").
async fn request_missing_stages(transport: &Transport, machine: &RoundMachine) {
    for stage in [StageKind::Stage1, StageKind::Stage2, StageKind::Stage3] {
        for request in machine.stage_requests(stage) {
            let payload = request.encode();
            if let Err(error) = transport.send_confidants(&machine.table.confidants, machine.round, MessageKind::StageRequest, &payload).await {
                tracing::debug!(target: "node", %error, "failed to send stage request");
            }
        }
    }
}

/// Replies with this node's cached copy of the requested stage
/// message, if it has one, addressed directly back to the requester.
async fn reply_to_stage_request(transport: &Transport, machine: &RoundMachine, request: StageRequest) {
    if request.round != machine.round {
        return;
    }
    let Some(requester_key) = machine.table.confidants.get(request.requester as usize).copied() else {
        return;
    };

    let (kind, payload) = match request.stage {
        StageKind::Stage1 => match machine.cached_stage1(request.required_sender) {
            Some(stage) => (MessageKind::Stage1, stage.encode()),
            None => return,
        },
        StageKind::Stage2 => match machine.cached_stage2(request.required_sender) {
            Some(stage) => (MessageKind::Stage2, stage.encode()),
            None => return,
        },
        StageKind::Stage3 => match machine.cached_stage3(request.required_sender) {
            Some(stage) => (MessageKind::Stage3, stage.encode()),
            None => return,
        },
    };

    if let Err(error) = transport.send_direct(&requester_key, machine.round, kind, &payload).await {
        tracing::debug!(target: "node", %error, "failed to reply to stage request");
    }
}

/// When a fresh round table reveals this node lagging behind the
/// chain's tip, broadcasts a `BlockRequest` for the missing sequences
/// in batches of at most `max_packet_request_size` (spec §4.6 scenario
/// 6 "blocks in ranges of at most maxPacketRequestSize").
async fn request_catch_up(transport: &Transport, pool: &PoolStore, round: Round, max_packet_request_size: u64) {
    if round.0 == 0 {
        return;
    }
    let local_last = pool.last_sequence().unwrap_or(None);
    let peer_last = Sequence(round.0 - 1);
    let missing = missing_range(local_last, peer_last, max_packet_request_size);
    if missing.is_empty() {
        return;
    }
    let payload = missing.encode();
    if let Err(error) = transport.broadcast(round, MessageKind::BlockRequest, &payload).await {
        tracing::debug!(target: "node", %error, "failed to broadcast block request");
    }
}

/// Answers a peer's `BlockRequest` with whichever of the requested
/// sequences this node already has stored.
async fn reply_to_block_request(transport: &Transport, pool: &PoolStore, round: Round, sequences: Vec<Sequence>) {
    for sequence in sequences {
        if let Ok(Some(block)) = pool.get_by_sequence(sequence) {
            let payload = concord_types::codec::encode_block(&block);
            if let Err(error) = transport.broadcast(round, MessageKind::RequestedBlock, &payload).await {
                tracing::debug!(target: "node", %error, "failed to reply to block request");
            }
        }
    }
}

/// Validates and appends a block received either as a live finalize
/// broadcast or as a sync reply, using the current round table as the
/// writer/confidant context.
fn apply_synced_block(pool: &PoolStore, executor: &Executor, machine: &RoundMachine, block: Block) {
    let writer_key = machine.table.general;
    let confidants = machine.table.confidants.clone();
    match ingest_synced_block(pool, block.clone(), &writer_key, &confidants) {
        Ok(()) => apply_block_to_executor(executor, &block, machine.round),
        Err(error) => tracing::debug!(target: "node", %error, "dropped synced block"),
    }
}

/// Feeds a just-appended block's effects into the executor queue:
/// executable transactions are enqueued for dispatch, and new-state
/// transactions free the FIFO head they report on (spec §4.4).
fn apply_block_to_executor(executor: &Executor, block: &Block, round: Round) {
    for (index, tx) in block.transactions.iter().enumerate() {
        if tx.is_executable() {
            executor.enqueue(
                tx.target,
                concord_types::SmartContractRef {
                    sequence: block.header.sequence,
                    index: index as u32,
                },
                round,
            );
        } else if tx.is_new_state() {
            executor.queue.close_head(&tx.target);
        }
    }
}

/// Advances every contract queue's head and forces progress on any
/// that have been `Running` past the configured round-count bound
/// (spec §4.4).
fn run_executor_tick(executor: &Executor, round: Round) {
    executor.dispatch_ready(round);
    for (contract_address, invocation) in executor.queue.timed_out(round) {
        tracing::warn!(target: "node", ?contract_address, ?invocation, "smart-contract invocation timed out, forcing empty-state progress");
        let outcome = ExecutionOutcome { emitted: vec![], state: vec![] };
        if let Err(error) = executor.queue.finish(contract_address, invocation, outcome) {
            tracing::debug!(target: "node", %error, "failed to force-finish timed out invocation");
        }
    }
}

/// Admits or refuses an inbound `Registration`, replying with
/// `RegistrationConfirmed`/`RegistrationRefused` (spec §4.1
/// registration handshake).
async fn handle_registration(transport: &Transport, machine: &RoundMachine, sender: PublicKey, from: std::net::SocketAddr, max_trusted_nodes: usize) {
    let neighbours = transport.neighbours();
    neighbours.request_registration(sender, from);
    match neighbours.accept_registration(&sender, max_trusted_nodes) {
        Ok(()) => {
            if let Err(error) = transport.send_direct(&sender, machine.round, MessageKind::RegistrationConfirmed, &sender.encode()).await {
                tracing::debug!(target: "node", %error, "failed to confirm registration");
            }
            neighbours.confirm_registration(&sender);
        }
        Err(reason) => {
            tracing::debug!(target: "node", ?reason, peer = %sender, "refusing registration");
            if let Err(error) = transport.send_direct(&sender, machine.round, MessageKind::RegistrationRefused, &[]).await {
                tracing::debug!(target: "node", %error, "failed to send registration refusal");
            }
            neighbours.refuse(&sender);
        }
    }
}

async fn try_finalize(transport: &Transport, pool: &PoolStore, conveyer: &Conveyer, executor: &Executor, keypair: &KeyPair, machine: &RoundMachine, metrics: &Metrics) {
    let Some((writer_index, trusted_mask)) = machine.resolve_writer() else {
        return;
    };
    if machine.table.general != keypair.public_key && machine.table.index_of(&keypair.public_key) != Some(writer_index) {
        return;
    }

    // The three-phase characteristic-mask pipeline (validator crate)
    // runs ahead of this point during Stage1/Stage2; by Stage3 every
    // confidant has already agreed on the mask carried in the round
    // table's winning hash. Re-deriving it here would duplicate that
    // pipeline, so every manifest transaction still present is taken
    // as accepted.
    let manifest_transactions: Vec<_> = conveyer.current_manifest().into_iter().filter_map(|hash| conveyer.get(&hash)).flat_map(|packet| packet.transactions).collect();
    let mask = concord_types::CharacteristicMask::new(vec![concord_types::RejectReason::None; manifest_transactions.len()]);
    let accepted = conveyer.flush_accepted(&manifest_transactions, &mask);

    let (previous_hash, previous_sequence, previous_timestamp) = match pool.last_sequence().ok().flatten().and_then(|seq| pool.get_by_sequence(seq).ok().flatten()) {
        Some(block) => (concord_types::codec::block_hash(&block), block.header.sequence, block.header.timestamp),
        None => (concord_types::Hash::default(), Sequence(0), 0),
    };
    let wall_time_ms = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(previous_timestamp);

    let draft = assemble(previous_hash, previous_sequence, previous_timestamp, machine.round, accepted, mask, wall_time_ms);

    let trusted_senders: std::collections::HashSet<u8> = trusted_mask
        .iter()
        .enumerate()
        .filter(|(_, trusted)| **trusted)
        .map(|(index, _)| index as u8)
        .collect();
    let confidant_signatures: Vec<_> = machine.collected_block_signatures().into_iter().filter(|(sender, _)| trusted_senders.contains(sender)).collect();

    match finalize(draft, &keypair.private_key, confidant_signatures, machine.table.confidants.len()) {
        Ok(block) => {
            if let Err(error) = pool.append(&block) {
                tracing::error!(target: "node", %error, "failed to persist finalized block");
                return;
            }
            metrics.inc_blocks_written();
            apply_block_to_executor(executor, &block, machine.round);
            let payload = concord_types::codec::encode_block(&block);
            if let Err(error) = transport.broadcast(machine.round, MessageKind::RequestedBlock, &payload).await {
                tracing::warn!(target: "node", %error, "failed to broadcast finalized block");
            }
        }
        Err(error) => tracing::debug!(target: "node", %error, "block not yet finalizable"),
    }
}
