//! The characteristic mask: one reject-reason byte per transaction in a
//! round's candidate packet, produced by the validator and carried
//! through consensus and into the finalized block.

use parity_scale_codec::{Decode, Encode};

use crate::ids::Hash;

/// Why a transaction was excluded from the characteristic. `None` means
/// the transaction was accepted.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Encode, Decode, Debug)]
#[repr(u8)]
pub enum RejectReason {
    None = 0,
    InsufficientBalance = 1,
    WrongSignature = 2,
    TooLarge = 3,
    InsufficientMaxFee = 4,
    SourceDoesNotExist = 5,
    ContractViolation = 6,
    MalformedContractAddress = 7,
    RejectedByGraph = 8,
    RejectedSmart = 9,
    DuplicatedInsideBlock = 10,
    WrongInnerId = 11,
}

impl RejectReason {
    pub fn is_accepted(self) -> bool {
        matches!(self, RejectReason::None)
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl Default for RejectReason {
    fn default() -> Self {
        RejectReason::None
    }
}

/// One byte of [`RejectReason`] per transaction offered to a round,
/// in the same order as the candidate `TransactionsPacket`.
#[derive(Clone, PartialEq, Eq, Encode, Decode, Debug, Default)]
pub struct CharacteristicMask {
    pub reasons: Vec<RejectReason>,
}

impl CharacteristicMask {
    pub fn new(reasons: Vec<RejectReason>) -> Self {
        CharacteristicMask { reasons }
    }

    pub fn len(&self) -> usize {
        self.reasons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reasons.is_empty()
    }

    pub fn accepted_count(&self) -> usize {
        self.reasons.iter().filter(|r| r.is_accepted()).count()
    }

    /// Hash fed into the stage messages: the mask is hashed as its raw
    /// byte representation, one byte per reason.
    pub fn hash(&self) -> Hash {
        use blake2::{Blake2b512, Digest};
        let mut hasher = Blake2b512::new();
        for reason in &self.reasons {
            hasher.update([reason.as_u8()]);
        }
        let digest = hasher.finalize();
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest[..32]);
        Hash(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_length_matches_input_count() {
        let mask = CharacteristicMask::new(vec![
            RejectReason::None,
            RejectReason::InsufficientBalance,
            RejectReason::None,
        ]);
        assert_eq!(mask.len(), 3);
        assert_eq!(mask.accepted_count(), 2);
    }

    #[test]
    fn empty_and_nonempty_masks_hash_differently() {
        let empty = CharacteristicMask::new(vec![]);
        let nonempty = CharacteristicMask::new(vec![RejectReason::None]);
        assert_ne!(empty.hash(), nonempty.hash());
    }
}
