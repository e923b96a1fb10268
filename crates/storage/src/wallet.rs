//! Wallet index: absolute address (public key) → balance, pointer to
//! its last transaction, and the key itself for wallet-id resolution.

use std::path::Path;

use redb::{Database, ReadableTable, TableDefinition};

use concord_types::error::StorageError;
use concord_types::{FixedAmount, PublicKey, Sequence, TransactionId};

const WALLETS: TableDefinition<&[u8; 32], &[u8]> = TableDefinition::new("wallet_index");

#[derive(Clone, Debug, PartialEq)]
pub struct WalletRecord {
    pub balance: FixedAmount,
    pub last_transaction: Option<TransactionId>,
    pub public_key: PublicKey,
}

fn encode_record(record: &WalletRecord) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&record.balance.integral.to_le_bytes());
    out.extend_from_slice(&record.balance.fraction.to_le_bytes());
    match &record.last_transaction {
        Some(id) => {
            out.push(1);
            out.extend_from_slice(id.to_string().as_bytes());
        }
        None => out.push(0),
    }
    out
}

fn decode_record(public_key: PublicKey, bytes: &[u8]) -> Result<WalletRecord, StorageError> {
    if bytes.len() < 17 {
        return Err(StorageError::IndexCorrupt("wallet record too short".to_string()));
    }
    let integral = i64::from_le_bytes(bytes[0..8].try_into().unwrap());
    let fraction = u64::from_le_bytes(bytes[8..16].try_into().unwrap());
    let has_last = bytes[16] != 0;
    let last_transaction = if has_last {
        let s = std::str::from_utf8(&bytes[17..])
            .map_err(|_| StorageError::IndexCorrupt("wallet record transaction id".to_string()))?;
        Some(
            s.parse::<TransactionId>()
                .map_err(|_| StorageError::IndexCorrupt("wallet record transaction id".to_string()))?,
        )
    } else {
        None
    };
    Ok(WalletRecord {
        balance: FixedAmount { integral, fraction },
        last_transaction,
        public_key,
    })
}

pub struct WalletIndex {
    db: Database,
}

impl WalletIndex {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = Database::create(path).map_err(|e| StorageError::Backend(e.to_string()))?;
        let write = db.begin_write().map_err(|e| StorageError::Backend(e.to_string()))?;
        {
            write
                .open_table(WALLETS)
                .map_err(|e| StorageError::Backend(e.to_string()))?;
        }
        write.commit().map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(WalletIndex { db })
    }

    pub fn get(&self, address: &PublicKey) -> Result<Option<WalletRecord>, StorageError> {
        let read = self.db.begin_read().map_err(|e| StorageError::Backend(e.to_string()))?;
        let table = read.open_table(WALLETS).map_err(|e| StorageError::Backend(e.to_string()))?;
        match table.get(&address.0).map_err(|e| StorageError::Backend(e.to_string()))? {
            Some(bytes) => Ok(Some(decode_record(*address, bytes.value())?)),
            None => Ok(None),
        }
    }

    /// Applied only at block finalization, per the data-model's
    /// single-writer rule.
    pub fn put(&self, record: &WalletRecord) -> Result<(), StorageError> {
        let write = self.db.begin_write().map_err(|e| StorageError::Backend(e.to_string()))?;
        {
            let mut table = write.open_table(WALLETS).map_err(|e| StorageError::Backend(e.to_string()))?;
            let encoded = encode_record(record);
            table
                .insert(&record.public_key.0, encoded.as_slice())
                .map_err(|e| StorageError::Backend(e.to_string()))?;
        }
        write.commit().map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concord_types::ids::BlockRef;

    #[test]
    fn put_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let index = WalletIndex::open(dir.path().join("wallet.redb")).expect("opens");

        let public_key = PublicKey([4u8; 32]);
        let record = WalletRecord {
            balance: FixedAmount { integral: 12, fraction: 500 },
            last_transaction: Some(TransactionId {
                block: BlockRef::Sequence(Sequence(7)),
                index: 2,
            }),
            public_key,
        };
        index.put(&record).expect("writes");

        let fetched = index.get(&public_key).expect("reads").expect("present");
        assert_eq!(fetched, record);
    }

    #[test]
    fn unknown_wallet_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let index = WalletIndex::open(dir.path().join("wallet.redb")).expect("opens");
        assert_eq!(index.get(&PublicKey([9u8; 32])).expect("reads"), None);
    }
}
