//! Transactions index: `(address, sequence) -> previous sequence`
//! carrying a transaction of that address, so clients can walk an
//! account's history backwards without scanning the whole chain.

use std::path::Path;

use redb::{Database, ReadableTable, TableDefinition};

use concord_types::error::StorageError;
use concord_types::{PublicKey, Sequence};

const INDEX: TableDefinition<&[u8; 40], u64> = TableDefinition::new("transactions_index");

fn key(address: &PublicKey, sequence: Sequence) -> [u8; 40] {
    let mut out = [0u8; 40];
    out[..32].copy_from_slice(&address.0);
    out[32..].copy_from_slice(&sequence.0.to_be_bytes());
    out
}

pub struct TransactionsIndex {
    db: Database,
}

impl TransactionsIndex {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = Database::create(path).map_err(|e| StorageError::Backend(e.to_string()))?;
        let write = db.begin_write().map_err(|e| StorageError::Backend(e.to_string()))?;
        {
            write
                .open_table(INDEX)
                .map_err(|e| StorageError::Backend(e.to_string()))?;
        }
        write.commit().map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(TransactionsIndex { db })
    }

    /// Records that `address` had a transaction at `sequence`, whose
    /// predecessor transaction for the same address was at
    /// `previous_sequence`.
    pub fn record(&self, address: &PublicKey, sequence: Sequence, previous_sequence: Sequence) -> Result<(), StorageError> {
        let write = self.db.begin_write().map_err(|e| StorageError::Backend(e.to_string()))?;
        {
            let mut table = write.open_table(INDEX).map_err(|e| StorageError::Backend(e.to_string()))?;
            table
                .insert(&key(address, sequence), previous_sequence.0)
                .map_err(|e| StorageError::Backend(e.to_string()))?;
        }
        write.commit().map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    pub fn previous(&self, address: &PublicKey, sequence: Sequence) -> Result<Option<Sequence>, StorageError> {
        let read = self.db.begin_read().map_err(|e| StorageError::Backend(e.to_string()))?;
        let table = read.open_table(INDEX).map_err(|e| StorageError::Backend(e.to_string()))?;
        match table
            .get(&key(address, sequence))
            .map_err(|e| StorageError::Backend(e.to_string()))?
        {
            Some(value) => Ok(Some(Sequence(value.value()))),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_and_walks_backward_chain() {
        let dir = tempfile::tempdir().unwrap();
        let index = TransactionsIndex::open(dir.path().join("txindex.redb")).expect("opens");
        let address = PublicKey([5u8; 32]);

        index.record(&address, Sequence(10), Sequence(4)).unwrap();
        index.record(&address, Sequence(4), Sequence(1)).unwrap();

        assert_eq!(index.previous(&address, Sequence(10)).unwrap(), Some(Sequence(4)));
        assert_eq!(index.previous(&address, Sequence(4)).unwrap(), Some(Sequence(1)));
        assert_eq!(index.previous(&address, Sequence(1)).unwrap(), None);
    }
}
