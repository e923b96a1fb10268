//! Round table and the three-stage confidant message exchange
//! (spec §3 "Round table" / "Stage messages", §4.5).

use parity_scale_codec::{Decode, Encode};

use crate::ids::{Hash, PublicKey, Round, Signature};

/// The committee assigned to a round: one writer (`general`) and the
/// ordered list of confidants, plus the candidate-packet hashes they
/// are voting over.
#[derive(Clone, PartialEq, Eq, Encode, Decode, Debug, Default)]
pub struct RoundTable {
    pub round: Round,
    pub general: PublicKey,
    pub confidants: Vec<PublicKey>,
    pub hashes: Vec<Hash>,
}

impl RoundTable {
    pub fn size(&self) -> usize {
        self.confidants.len()
    }

    pub fn index_of(&self, key: &PublicKey) -> Option<u8> {
        self.confidants.iter().position(|k| k == key).map(|i| i as u8)
    }
}

/// Stage 1: a confidant's vote for the set of candidate hashes and
/// which of its peers it trusts as writer-eligible.
#[derive(Clone, PartialEq, Eq, Encode, Decode, Debug)]
pub struct Stage1 {
    pub sender: u8,
    pub candidates: Vec<Hash>,
    pub trusted_candidates: Vec<PublicKey>,
    pub signature: Signature,
}

/// Stage 2: a confidant echoes back everyone else's Stage1 signatures
/// it has observed, keyed by sender index.
#[derive(Clone, PartialEq, Eq, Encode, Decode, Debug)]
pub struct Stage2 {
    pub sender: u8,
    pub signatures: Vec<(u8, Signature)>,
    pub signature: Signature,
}

/// Stage 3: the writer's finalized block signature plus the mask of
/// which confidants it considers genuinely trusted for this round.
#[derive(Clone, PartialEq, Eq, Encode, Decode, Debug)]
pub struct Stage3 {
    pub sender: u8,
    pub writer: u8,
    pub real_trusted_mask: Vec<bool>,
    pub block_signature: Signature,
    pub signature: Signature,
}

/// Request to a peer confidant to resend a stage message this node is
/// missing (spec §4.5 "stage-request recovery").
#[derive(Clone, Copy, PartialEq, Eq, Encode, Decode, Debug)]
pub struct StageRequest {
    pub round: Round,
    pub requester: u8,
    pub required_sender: u8,
    pub stage: StageKind,
}

#[derive(Clone, Copy, PartialEq, Eq, Encode, Decode, Debug)]
pub enum StageKind {
    Stage1,
    Stage2,
    Stage3,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_of_finds_confidant_position() {
        let table = RoundTable {
            round: Round(1),
            general: PublicKey([0u8; 32]),
            confidants: vec![PublicKey([1u8; 32]), PublicKey([2u8; 32])],
            hashes: vec![],
        };
        assert_eq!(table.index_of(&PublicKey([2u8; 32])), Some(1));
        assert_eq!(table.index_of(&PublicKey([9u8; 32])), None);
    }
}
