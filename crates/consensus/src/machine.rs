//! The per-round driver: collects stage messages, tracks quorum, and
//! walks [`NodeState`] through the happy path, timeouts and big-bang
//! (spec §4.5).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use concord_types::error::ConsensusError;
use concord_types::{PublicKey, Round, RoundTable, Stage1, Stage2, Stage3, StageKind, StageRequest};

use crate::bigbang::{accept_big_bang, BigBang};
use crate::role::{assign_role, NodeState, Role};
use crate::stages::{elect_writer, has_quorum, true_trusted_mask, verify_stage1, verify_stage2, verify_stage3};

pub struct RoundMachine {
    pub self_key: PublicKey,
    pub state: NodeState,
    pub round: Round,
    pub table: RoundTable,
    pub role: Role,
    min_trusted: usize,
    stage1: HashMap<u8, Stage1>,
    stage2: HashMap<u8, Stage2>,
    stage3: HashMap<u8, Stage3>,
    state_entered_at: Instant,
}

impl RoundMachine {
    pub fn new(self_key: PublicKey, min_trusted: usize) -> Self {
        RoundMachine {
            self_key,
            state: NodeState::Normal,
            round: Round(0),
            table: RoundTable::default(),
            role: Role::Normal,
            min_trusted,
            stage1: HashMap::new(),
            stage2: HashMap::new(),
            stage3: HashMap::new(),
            state_entered_at: Instant::now(),
        }
    }

    fn enter(&mut self, state: NodeState) {
        self.state = state;
        self.state_entered_at = Instant::now();
    }

    /// A fresh `RoundTable` arrives: resets stage collections and
    /// assigns this round's role (spec §4.5 "Role assignment").
    pub fn on_round_table(&mut self, table: RoundTable) {
        self.round = table.round;
        self.role = assign_role(&self.self_key, &table.general, &table.confidants);
        self.table = table;
        self.stage1.clear();
        self.stage2.clear();
        self.stage3.clear();

        if self.table.confidants.len() < self.min_trusted {
            self.enter(NodeState::NoTrusted);
            return;
        }

        match self.role {
            Role::Writer => self.enter(NodeState::Writer),
            Role::Trusted => self.enter(NodeState::Trusted),
            Role::Normal => self.enter(NodeState::Normal),
        }
    }

    fn sender_key(&self, sender: u8) -> Option<PublicKey> {
        self.table.confidants.get(sender as usize).copied()
    }

    /// Verifies and records an inbound Stage1. Returns whether the
    /// quorum just became satisfied on this call (spec §4.5
    /// "Stage-2. Once a confidant has collected Stage1 ... from
    /// >= MinTrustedNodes confidants").
    pub fn ingest_stage1(&mut self, stage: Stage1) -> Result<bool, ConsensusError> {
        let sender_key = self.sender_key(stage.sender).ok_or(ConsensusError::BadSignature(stage.sender))?;
        if !verify_stage1(self.round, &stage, &sender_key) {
            return Err(ConsensusError::BadSignature(stage.sender));
        }
        let was_enough = has_quorum(self.stage1.len(), self.min_trusted);
        self.stage1.insert(stage.sender, stage);
        Ok(!was_enough && has_quorum(self.stage1.len(), self.min_trusted))
    }

    pub fn ingest_stage2(&mut self, stage: Stage2) -> Result<bool, ConsensusError> {
        let sender_key = self.sender_key(stage.sender).ok_or(ConsensusError::BadSignature(stage.sender))?;
        if !verify_stage2(self.round, &stage, &sender_key) {
            return Err(ConsensusError::BadSignature(stage.sender));
        }
        let was_enough = has_quorum(self.stage2.len(), self.min_trusted);
        self.stage2.insert(stage.sender, stage);
        Ok(!was_enough && has_quorum(self.stage2.len(), self.min_trusted))
    }

    pub fn ingest_stage3(&mut self, stage: Stage3) -> Result<bool, ConsensusError> {
        let sender_key = self.sender_key(stage.sender).ok_or(ConsensusError::BadSignature(stage.sender))?;
        if !verify_stage3(self.round, &stage, &sender_key) {
            return Err(ConsensusError::BadSignature(stage.sender));
        }
        let quorum = (self.table.confidants.len() * 2).div_ceil(3);
        let was_enough = has_quorum(self.stage3.len(), quorum);
        self.stage3.insert(stage.sender, stage);
        Ok(!was_enough && has_quorum(self.stage3.len(), quorum))
    }

    /// Confidant indices this node has not yet received a Stage1 from
    /// (spec §4.5 "stage-request recovery").
    pub fn missing_stage1_senders(&self) -> Vec<u8> {
        (0..self.table.confidants.len() as u8).filter(|i| !self.stage1.contains_key(i)).collect()
    }

    pub fn missing_stage2_senders(&self) -> Vec<u8> {
        (0..self.table.confidants.len() as u8).filter(|i| !self.stage2.contains_key(i)).collect()
    }

    pub fn missing_stage3_senders(&self) -> Vec<u8> {
        (0..self.table.confidants.len() as u8).filter(|i| !self.stage3.contains_key(i)).collect()
    }

    /// This node's own confidant index in the current round table, if
    /// it holds one (used as the `requester` field on outgoing
    /// `StageRequest`s).
    pub fn self_index(&self) -> Option<u8> {
        self.table.index_of(&self.self_key)
    }

    /// The cached Stage1 this node collected from `sender`, if any —
    /// what it replies with to a `StageRequest` for that sender (spec
    /// §4.5 "stage-request recovery").
    pub fn cached_stage1(&self, sender: u8) -> Option<&Stage1> {
        self.stage1.get(&sender)
    }

    pub fn cached_stage2(&self, sender: u8) -> Option<&Stage2> {
        self.stage2.get(&sender)
    }

    pub fn cached_stage3(&self, sender: u8) -> Option<&Stage3> {
        self.stage3.get(&sender)
    }

    /// Builds a `StageRequest` for every confidant this node is still
    /// missing `stage` from, addressed as this node's own index (spec
    /// §4.5 "stage-request recovery"). Empty if this node holds no seat
    /// in the current round table.
    pub fn stage_requests(&self, stage: StageKind) -> Vec<StageRequest> {
        let Some(requester) = self.self_index() else {
            return Vec::new();
        };
        let missing = match stage {
            StageKind::Stage1 => self.missing_stage1_senders(),
            StageKind::Stage2 => self.missing_stage2_senders(),
            StageKind::Stage3 => self.missing_stage3_senders(),
        };
        missing
            .into_iter()
            .filter(|&required_sender| required_sender != requester)
            .map(|required_sender| StageRequest {
                round: self.round,
                requester,
                required_sender,
                stage,
            })
            .collect()
    }

    /// Computes the writer and real-trusted mask from the collected
    /// Stage1s, once Stage1 quorum is reached.
    pub fn resolve_writer(&self) -> Option<(u8, Vec<bool>)> {
        let stages: Vec<Stage1> = self.stage1.values().cloned().collect();
        let mask = true_trusted_mask(&stages, self.table.confidants.len());
        elect_writer(&mask, &self.table.confidants).map(|writer| (writer, mask))
    }

    /// The block signatures collected from Stage3, keyed by sender —
    /// what the writer attaches to the finalized block (spec §4.6
    /// "attach >= 2/3 confidant signatures").
    pub fn collected_block_signatures(&self) -> Vec<(u8, concord_types::Signature)> {
        self.stage3.values().map(|s| (s.sender, s.block_signature)).collect()
    }

    /// The candidate lists each Stage1 sender proposed for the next
    /// round table, keyed by sender index — handed off to the
    /// coordinator's election once Stage3 finalizes the block.
    pub fn proposed_next_candidates(&self) -> Vec<Vec<PublicKey>> {
        self.stage1.values().map(|s| s.trusted_candidates.clone()).collect()
    }

    /// `true` once this state has been held past `timeout` (spec §4.5
    /// "Timeouts. Each state has an expiry timer (default 5000 ms)").
    pub fn is_expired(&self, timeout: Duration) -> bool {
        self.state_entered_at.elapsed() > timeout
    }

    /// Applies an `Expired` event per spec §4.5: `Trusted` drops to
    /// `NoTrusted` for the round; `Writer` signals the caller should
    /// broadcast `NextRoundRequest` (state itself is left in `Writer`
    /// so a late Stage3 can still land).
    pub fn on_expired(&mut self) {
        if self.state == NodeState::Trusted {
            self.enter(NodeState::NoTrusted);
        }
    }

    pub fn on_big_bang(&mut self, bb: &BigBang, authority: &PublicKey, last_written_sequence: concord_types::Sequence) -> Result<(), ConsensusError> {
        accept_big_bang(bb, authority, self.round, last_written_sequence)?;
        self.enter(NodeState::HandleBB);
        self.on_round_table(bb.table.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::build_stage1;
    use concord_crypto::keyfile::KeyPair;
    use concord_types::CharacteristicMask;

    fn table_with(round: u64, general: PublicKey, confidants: Vec<PublicKey>) -> RoundTable {
        RoundTable { round: Round(round), general, confidants, hashes: vec![] }
    }

    #[test]
    fn writer_key_enters_writer_state() {
        let writer = KeyPair::generate();
        let confidant = KeyPair::generate();
        let mut machine = RoundMachine::new(writer.public_key, 2);
        machine.on_round_table(table_with(1, writer.public_key, vec![writer.public_key, confidant.public_key]));
        assert_eq!(machine.state, NodeState::Writer);
        assert_eq!(machine.role, Role::Writer);
    }

    #[test]
    fn below_min_trusted_enters_no_trusted() {
        let writer = KeyPair::generate();
        let confidant = KeyPair::generate();
        let mut machine = RoundMachine::new(confidant.public_key, 3);
        machine.on_round_table(table_with(1, writer.public_key, vec![writer.public_key, confidant.public_key]));
        assert_eq!(machine.state, NodeState::NoTrusted);
    }

    #[test]
    fn stage1_quorum_flips_once_on_the_reaching_call() {
        let writer = KeyPair::generate();
        let c1 = KeyPair::generate();
        let c2 = KeyPair::generate();
        let mut machine = RoundMachine::new(c1.public_key, 2);
        machine.on_round_table(table_with(1, writer.public_key, vec![c1.public_key, c2.public_key]));

        let mask = CharacteristicMask::new(vec![]);
        let s0 = build_stage1(Round(1), 0, &mask, vec![], &c1.private_key);
        let s1 = build_stage1(Round(1), 1, &mask, vec![], &c2.private_key);

        assert_eq!(machine.ingest_stage1(s0).unwrap(), false);
        assert_eq!(machine.ingest_stage1(s1).unwrap(), true);
    }

    #[test]
    fn forged_sender_signature_is_rejected() {
        let writer = KeyPair::generate();
        let c1 = KeyPair::generate();
        let c2 = KeyPair::generate();
        let impostor = KeyPair::generate();
        let mut machine = RoundMachine::new(c1.public_key, 2);
        machine.on_round_table(table_with(1, writer.public_key, vec![c1.public_key, c2.public_key]));

        let mask = CharacteristicMask::new(vec![]);
        // signed by impostor's key but claims to be sender index 1 (c2's slot)
        let forged = build_stage1(Round(1), 1, &mask, vec![], &impostor.private_key);
        assert!(matches!(machine.ingest_stage1(forged), Err(ConsensusError::BadSignature(1))));
    }

    #[test]
    fn missing_senders_lists_those_not_yet_collected() {
        let writer = KeyPair::generate();
        let c1 = KeyPair::generate();
        let c2 = KeyPair::generate();
        let mut machine = RoundMachine::new(c1.public_key, 2);
        machine.on_round_table(table_with(1, writer.public_key, vec![c1.public_key, c2.public_key]));

        let mask = CharacteristicMask::new(vec![]);
        let s0 = build_stage1(Round(1), 0, &mask, vec![], &c1.private_key);
        machine.ingest_stage1(s0).unwrap();
        assert_eq!(machine.missing_stage1_senders(), vec![1]);
    }

    #[test]
    fn stage_requests_skip_self_and_collected_senders() {
        let writer = KeyPair::generate();
        let c1 = KeyPair::generate();
        let c2 = KeyPair::generate();
        let c3 = KeyPair::generate();
        let mut machine = RoundMachine::new(c1.public_key, 2);
        machine.on_round_table(table_with(1, writer.public_key, vec![c1.public_key, c2.public_key, c3.public_key]));

        let mask = CharacteristicMask::new(vec![]);
        let s2 = build_stage1(Round(1), 2, &mask, vec![], &c3.private_key);
        machine.ingest_stage1(s2).unwrap();

        let requests = machine.stage_requests(concord_types::StageKind::Stage1);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].required_sender, 1);
        assert_eq!(requests[0].requester, 0);
    }

    #[test]
    fn cached_stage_is_served_back_for_a_collected_sender() {
        let writer = KeyPair::generate();
        let c1 = KeyPair::generate();
        let c2 = KeyPair::generate();
        let mut machine = RoundMachine::new(c1.public_key, 2);
        machine.on_round_table(table_with(1, writer.public_key, vec![c1.public_key, c2.public_key]));

        let mask = CharacteristicMask::new(vec![]);
        let s0 = build_stage1(Round(1), 0, &mask, vec![], &c1.private_key);
        machine.ingest_stage1(s0).unwrap();

        assert!(machine.cached_stage1(0).is_some());
        assert!(machine.cached_stage1(1).is_none());
    }

    #[test]
    fn trusted_node_drops_to_no_trusted_on_expiry() {
        let writer = KeyPair::generate();
        let c1 = KeyPair::generate();
        let c2 = KeyPair::generate();
        let mut machine = RoundMachine::new(c2.public_key, 2);
        machine.on_round_table(table_with(1, writer.public_key, vec![c1.public_key, c2.public_key]));
        assert_eq!(machine.state, NodeState::Trusted);
        machine.on_expired();
        assert_eq!(machine.state, NodeState::NoTrusted);
    }
}
