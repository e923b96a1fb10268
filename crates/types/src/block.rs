//! The finalized block: header plus accepted transactions and the
//! committee signatures that attest it (spec §3 "Block").

use parity_scale_codec::{Decode, Encode};

use crate::ids::{Hash, Round, Sequence, Signature};
use crate::mask::CharacteristicMask;
use crate::tx::Transaction;

#[derive(Clone, PartialEq, Eq, Encode, Decode, Debug, Default)]
pub struct BlockHeader {
    pub previous_hash: Hash,
    pub sequence: Sequence,
    pub round: Round,
    pub timestamp: u64,
    pub mask: CharacteristicMask,
}

#[derive(Clone, PartialEq, Eq, Encode, Decode, Debug)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
    pub writer_signature: Signature,
    pub confidant_signatures: Vec<(u8, Signature)>,
}

impl Block {
    pub fn sequence(&self) -> Sequence {
        self.header.sequence
    }

    pub fn previous_hash(&self) -> Hash {
        self.header.previous_hash
    }

    /// Confidant signatures gathered so far; finalization requires at
    /// least `BLOCK_QUORUM` of these (spec §4.5/§4.6, Open Question 3).
    pub fn signature_count(&self) -> usize {
        self.confidant_signatures.len()
    }
}
