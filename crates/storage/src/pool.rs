//! Append-only pool store: finalized block bytes keyed by sequence,
//! with a secondary index from pool (block) hash back to sequence.

use std::path::Path;

use redb::{Database, ReadableTable, TableDefinition};

use concord_types::error::StorageError;
use concord_types::{codec, Block, Hash, Sequence};

const BY_SEQUENCE: TableDefinition<u64, &[u8]> = TableDefinition::new("pool_by_sequence");
const HASH_TO_SEQUENCE: TableDefinition<&[u8; 32], u64> = TableDefinition::new("pool_hash_index");

pub struct PoolStore {
    db: Database,
}

impl PoolStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = Database::create(path).map_err(|e| StorageError::Backend(e.to_string()))?;
        let write = db.begin_write().map_err(|e| StorageError::Backend(e.to_string()))?;
        {
            write
                .open_table(BY_SEQUENCE)
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            write
                .open_table(HASH_TO_SEQUENCE)
                .map_err(|e| StorageError::Backend(e.to_string()))?;
        }
        write.commit().map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(PoolStore { db })
    }

    /// Appends a finalized block. Callers are responsible for only
    /// ever calling this with strictly increasing sequences — the
    /// writer role (the Round Coordinator) is the single owner of
    /// this store.
    pub fn append(&self, block: &Block) -> Result<(), StorageError> {
        let sequence = block.sequence().0;
        let hash = codec::block_hash(block);
        let encoded = codec::encode_block(block);

        let write = self.db.begin_write().map_err(|e| StorageError::Backend(e.to_string()))?;
        {
            let mut by_seq = write
                .open_table(BY_SEQUENCE)
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            by_seq
                .insert(sequence, encoded.as_slice())
                .map_err(|e| StorageError::Backend(e.to_string()))?;

            let mut by_hash = write
                .open_table(HASH_TO_SEQUENCE)
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            by_hash
                .insert(&hash.0, sequence)
                .map_err(|e| StorageError::Backend(e.to_string()))?;
        }
        write.commit().map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    pub fn get_by_sequence(&self, sequence: Sequence) -> Result<Option<Block>, StorageError> {
        let read = self.db.begin_read().map_err(|e| StorageError::Backend(e.to_string()))?;
        let table = read
            .open_table(BY_SEQUENCE)
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        match table.get(sequence.0).map_err(|e| StorageError::Backend(e.to_string()))? {
            Some(bytes) => {
                let block = codec::decode_block(bytes.value())
                    .map_err(|e| StorageError::IndexCorrupt(e.to_string()))?;
                Ok(Some(block))
            }
            None => Ok(None),
        }
    }

    pub fn get_by_hash(&self, hash: Hash) -> Result<Option<Block>, StorageError> {
        let read = self.db.begin_read().map_err(|e| StorageError::Backend(e.to_string()))?;
        let index = read
            .open_table(HASH_TO_SEQUENCE)
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        match index.get(&hash.0).map_err(|e| StorageError::Backend(e.to_string()))? {
            Some(seq) => self.get_by_sequence(Sequence(seq.value())),
            None => Ok(None),
        }
    }

    pub fn last_sequence(&self) -> Result<Option<Sequence>, StorageError> {
        let read = self.db.begin_read().map_err(|e| StorageError::Backend(e.to_string()))?;
        let table = read
            .open_table(BY_SEQUENCE)
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let last = table
            .iter()
            .map_err(|e| StorageError::Backend(e.to_string()))?
            .next_back();
        match last {
            Some(entry) => {
                let (key, _) = entry.map_err(|e| StorageError::Backend(e.to_string()))?;
                Ok(Some(Sequence(key.value())))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concord_types::{BlockHeader, CharacteristicMask, RejectReason, Round, Signature};

    fn sample_block(sequence: u64) -> Block {
        Block {
            header: BlockHeader {
                previous_hash: Hash([0u8; 32]),
                sequence: Sequence(sequence),
                round: Round(sequence),
                timestamp: 1_700_000_000 + sequence,
                mask: CharacteristicMask::new(vec![RejectReason::None]),
            },
            transactions: vec![],
            writer_signature: Signature([1u8; 64]),
            confidant_signatures: vec![(0, Signature([2u8; 64]))],
        }
    }

    #[test]
    fn append_then_lookup_by_sequence_and_hash() {
        let dir = tempfile::tempdir().unwrap();
        let store = PoolStore::open(dir.path().join("pool.redb")).expect("opens");

        let block = sample_block(1);
        let hash = codec::block_hash(&block);
        store.append(&block).expect("appends");

        let by_seq = store.get_by_sequence(Sequence(1)).expect("reads").expect("present");
        assert_eq!(by_seq, block);

        let by_hash = store.get_by_hash(hash).expect("reads").expect("present");
        assert_eq!(by_hash, block);

        assert_eq!(store.last_sequence().expect("reads"), Some(Sequence(1)));
    }

    #[test]
    fn missing_sequence_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = PoolStore::open(dir.path().join("pool.redb")).expect("opens");
        assert_eq!(store.get_by_sequence(Sequence(99)).expect("reads"), None);
    }
}
