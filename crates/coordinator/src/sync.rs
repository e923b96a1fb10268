//! Catch-up: validating and appending blocks fetched from a peer via
//! `BlockRequest`/`RequestedBlock` (spec §4.6 "the block itself is
//! pulled on demand").

use concord_crypto::sign::verify;
use concord_types::error::CoordinatorError;
use concord_types::{codec, Block, PublicKey, Sequence};
use concord_storage::PoolStore;

use crate::block::{block_quorum, signing_bytes};

/// Verifies a synced block's writer signature and confidant-quorum,
/// then appends it if its sequence is exactly the next expected one.
pub fn ingest_synced_block(store: &PoolStore, block: Block, writer_key: &PublicKey, confidants: &[PublicKey]) -> Result<(), CoordinatorError> {
    let expected = match store.last_sequence().map_err(|e| CoordinatorError::SyncRequestFailed(e.to_string()))? {
        Some(last) => last.next(),
        None => Sequence(0),
    };
    if block.header.sequence != expected {
        return Err(CoordinatorError::SequenceGap {
            expected: expected.0,
            got: block.header.sequence.0,
        });
    }

    let need = block_quorum(confidants.len());
    if block.confidant_signatures.len() < need {
        return Err(CoordinatorError::InsufficientSignatures {
            have: block.confidant_signatures.len(),
            need,
        });
    }

    let payload = signing_bytes(&block.header, &block.transactions);
    if verify(writer_key, &payload, &block.writer_signature).is_err() {
        return Err(CoordinatorError::SyncRequestFailed("writer signature invalid".to_string()));
    }

    store.append(&block).map_err(|e| CoordinatorError::SyncRequestFailed(e.to_string()))?;
    Ok(())
}

/// The sequence range this node should request next, given its own
/// tip and the peer's advertised tip, capped to at most
/// `max_batch` sequences per call (spec §4.6 "blocks in ranges of at
/// most maxPacketRequestSize").
pub fn missing_range(local_last: Option<Sequence>, peer_last: Sequence, max_batch: u64) -> Vec<Sequence> {
    let start = local_last.map(|s| s.0 + 1).unwrap_or(0);
    if start > peer_last.0 {
        return Vec::new();
    }
    let span = peer_last.0 - start + 1;
    let end = start + span.min(max_batch.max(1)) - 1;
    (start..=end).map(Sequence).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use concord_crypto::keyfile::KeyPair;
    use concord_types::{BlockHeader, CharacteristicMask, Hash, RejectReason, Round};

    #[test]
    fn missing_range_is_empty_when_caught_up() {
        assert!(missing_range(Some(Sequence(10)), Sequence(10), 1000).is_empty());
    }

    #[test]
    fn missing_range_starts_at_genesis_when_empty() {
        assert_eq!(missing_range(None, Sequence(2), 1000), vec![Sequence(0), Sequence(1), Sequence(2)]);
    }

    #[test]
    fn missing_range_is_capped_at_max_batch() {
        let batch = missing_range(Some(Sequence(9)), Sequence(2_000), 1000);
        assert_eq!(batch.len(), 1000);
        assert_eq!(batch[0], Sequence(10));
        assert_eq!(batch[999], Sequence(1_009));
    }

    #[test]
    fn missing_range_second_batch_picks_up_where_first_left_off() {
        let first = missing_range(Some(Sequence(9)), Sequence(2_000), 1000);
        let last_fetched = *first.last().unwrap();
        let second = missing_range(Some(last_fetched), Sequence(2_000), 1000);
        assert_eq!(second[0], Sequence(1_010));
        assert_eq!(second.len(), 991);
    }

    #[test]
    fn sequence_gap_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = PoolStore::open(dir.path().join("pool.redb")).unwrap();
        let writer = KeyPair::generate();

        let header = BlockHeader {
            previous_hash: Hash::default(),
            sequence: Sequence(5),
            round: Round(5),
            timestamp: 1,
            mask: CharacteristicMask::new(vec![RejectReason::None]),
        };
        let payload = signing_bytes(&header, &[]);
        let writer_signature = concord_crypto::sign::sign(&writer.private_key, &payload).unwrap();
        let block = Block {
            header,
            transactions: vec![],
            writer_signature,
            confidant_signatures: vec![],
        };

        let result = ingest_synced_block(&store, block, &writer.public_key, &[]);
        assert!(matches!(result, Err(CoordinatorError::SequenceGap { expected: 0, got: 5 })));
    }
}
