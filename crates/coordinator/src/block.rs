//! Block assembly and finalization — the writer's duties (spec §4.6
//! "Writer duties").

use concord_crypto::sign::sign;
use concord_types::error::CoordinatorError;
use concord_types::{codec, Block, BlockHeader, CharacteristicMask, Hash, PrivateKey, Round, Sequence, Signature, Transaction};

/// An assembled-but-unsigned block: header plus the accepted
/// transactions in manifest order (spec §4.6 "(a) Assemble the
/// block").
#[derive(Clone, Debug)]
pub struct Draft {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

/// The bytes the writer and every confidant sign — the block with its
/// signature fields zeroed/empty, so the signature can't cover itself.
pub fn signing_bytes(header: &BlockHeader, transactions: &[Transaction]) -> Vec<u8> {
    let draft = Block {
        header: header.clone(),
        transactions: transactions.to_vec(),
        writer_signature: Signature([0u8; 64]),
        confidant_signatures: Vec::new(),
    };
    codec::encode_block(&draft)
}

/// Assembles a draft block on top of the previous one (spec §4.6:
/// "previous-block hash, sequence = last+1, timestamp (monotonic wall
/// time, non-decreasing)").
pub fn assemble(previous_hash: Hash, previous_sequence: Sequence, previous_timestamp: u64, round: Round, transactions: Vec<Transaction>, mask: CharacteristicMask, wall_time_ms: u64) -> Draft {
    Draft {
        header: BlockHeader {
            previous_hash,
            sequence: previous_sequence.next(),
            round,
            timestamp: wall_time_ms.max(previous_timestamp),
            mask,
        },
        transactions,
    }
}

/// The genesis case: no previous block exists yet.
pub fn assemble_genesis(round: Round, transactions: Vec<Transaction>, mask: CharacteristicMask, wall_time_ms: u64) -> Draft {
    assemble(Hash::default(), Sequence(0), 0, round, transactions, mask, wall_time_ms)
}

/// `ceil(2/3 * confidant_count)`, the quorum required before the
/// writer finalizes (spec §4.5 Stage-3: "upon receiving >= 2/3
/// matching Stage3s, finalizes the block").
pub fn block_quorum(confidant_count: usize) -> usize {
    (confidant_count * 2).div_ceil(3)
}

/// Signs a draft as writer and attaches the confidant signatures
/// gathered from Stage3, producing the block to store and broadcast
/// (spec §4.6 "(b) Sign. (c) Attach >= 2/3 confidant signatures").
pub fn finalize(draft: Draft, writer_key: &PrivateKey, confidant_signatures: Vec<(u8, Signature)>, confidant_count: usize) -> Result<Block, CoordinatorError> {
    let need = block_quorum(confidant_count);
    if confidant_signatures.len() < need {
        return Err(CoordinatorError::InsufficientSignatures {
            have: confidant_signatures.len(),
            need,
        });
    }
    let payload = signing_bytes(&draft.header, &draft.transactions);
    let writer_signature = sign(writer_key, &payload).expect("valid seed");
    Ok(Block {
        header: draft.header,
        transactions: draft.transactions,
        writer_signature,
        confidant_signatures,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use concord_crypto::keyfile::KeyPair;
    use concord_types::RejectReason;

    fn mask() -> CharacteristicMask {
        CharacteristicMask::new(vec![RejectReason::None])
    }

    #[test]
    fn sequence_and_timestamp_advance_from_previous() {
        let draft = assemble(Hash([9u8; 32]), Sequence(4), 1_700_000_000, Round(5), vec![], mask(), 1_700_000_005);
        assert_eq!(draft.header.sequence, Sequence(5));
        assert_eq!(draft.header.timestamp, 1_700_000_005);
    }

    #[test]
    fn timestamp_never_goes_backwards() {
        let draft = assemble(Hash([9u8; 32]), Sequence(4), 1_700_000_000, Round(5), vec![], mask(), 1_699_999_000);
        assert_eq!(draft.header.timestamp, 1_700_000_000);
    }

    #[test]
    fn below_quorum_signatures_is_rejected() {
        let writer = KeyPair::generate();
        let draft = assemble_genesis(Round(1), vec![], mask(), 1);
        let result = finalize(draft, &writer.private_key, vec![(0, Signature([1u8; 64]))], 4);
        assert!(matches!(result, Err(CoordinatorError::InsufficientSignatures { have: 1, need: 3 })));
    }

    #[test]
    fn quorum_signatures_finalizes() {
        let writer = KeyPair::generate();
        let draft = assemble_genesis(Round(1), vec![], mask(), 1);
        let sigs = vec![(0, Signature([1u8; 64])), (1, Signature([2u8; 64])), (2, Signature([3u8; 64]))];
        let block = finalize(draft, &writer.private_key, sigs, 4).expect("quorum met");
        assert_eq!(block.confidant_signatures.len(), 3);
    }
}
