//! Opaque identifiers: keys, hashes, rounds, sequences and addresses.

use parity_scale_codec::{Decode, Encode};
use std::fmt;

/// A 32-byte Ed25519 public key.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Encode, Decode, Default)]
pub struct PublicKey(pub [u8; 32]);

/// A 64-byte Ed25519 private key (seed + public half, as produced by the
/// signing backend).
#[derive(Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct PrivateKey(pub [u8; 64]);

/// A 64-byte Ed25519 signature.
#[derive(Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct Signature(pub [u8; 64]);

/// A 32-byte Blake2b digest.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Encode, Decode, Default)]
pub struct Hash(pub [u8; 32]);

/// Monotonically increasing consensus round number.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Encode, Decode, Debug, Default)]
pub struct Round(pub u64);

/// A block's position in the chain.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Encode, Decode, Debug, Default)]
pub struct Sequence(pub u64);

impl Round {
    pub fn next(self) -> Round {
        Round(self.0 + 1)
    }
}

impl Sequence {
    pub fn next(self) -> Sequence {
        Sequence(self.0 + 1)
    }
}

/// Either a full public key or a compressed wallet-id, with the
/// distinguishing bit carried by the variant itself (the wire encoding
/// packs it into the top bits of the surrounding field, see
/// [`crate::codec`]).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Encode, Decode, Debug)]
pub enum Address {
    PublicKey(PublicKey),
    WalletId(u32),
}

impl Address {
    pub fn is_wallet_id(&self) -> bool {
        matches!(self, Address::WalletId(_))
    }
}

/// Points at a transaction inside a finalized block: either the block's
/// hash or its sequence, plus the transaction's index within it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Encode, Decode, Debug)]
pub enum BlockRef {
    Hash(Hash),
    Sequence(Sequence),
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Encode, Decode, Debug)]
pub struct TransactionId {
    pub block: BlockRef,
    pub index: u32,
}

/// Identifies a smart-contract invocation transaction by the block it
/// landed in.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Encode, Decode, Debug)]
pub struct SmartContractRef {
    pub sequence: Sequence,
    pub index: u32,
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", hex::encode(self.0))
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateKey(<redacted>)")
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", hex::encode(self.0))
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", hex::encode(self.0))
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.block {
            BlockRef::Hash(h) => write!(f, "h:{}:{}", h, self.index),
            BlockRef::Sequence(s) => write!(f, "s:{}:{}", s.0, self.index),
        }
    }
}

/// Parse error for [`TransactionId::from_str`]-style reconstruction.
#[derive(Debug, thiserror::Error)]
#[error("malformed transaction id: {0}")]
pub struct TransactionIdParseError(pub String);

impl std::str::FromStr for TransactionId {
    type Err = TransactionIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        let kind = parts.next().ok_or_else(|| TransactionIdParseError(s.to_string()))?;
        let body = parts.next().ok_or_else(|| TransactionIdParseError(s.to_string()))?;
        let index: u32 = parts
            .next()
            .ok_or_else(|| TransactionIdParseError(s.to_string()))?
            .parse()
            .map_err(|_| TransactionIdParseError(s.to_string()))?;

        let block = match kind {
            "h" => {
                let bytes = hex::decode(body).map_err(|_| TransactionIdParseError(s.to_string()))?;
                if bytes.len() != 32 {
                    return Err(TransactionIdParseError(s.to_string()));
                }
                let mut arr = [0u8; 32];
                arr.copy_from_slice(&bytes);
                BlockRef::Hash(Hash(arr))
            }
            "s" => {
                let seq: u64 = body.parse().map_err(|_| TransactionIdParseError(s.to_string()))?;
                BlockRef::Sequence(Sequence(seq))
            }
            _ => return Err(TransactionIdParseError(s.to_string())),
        };

        Ok(TransactionId { block, index })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn transaction_id_round_trips_through_string() {
        let id = TransactionId {
            block: BlockRef::Hash(Hash([7u8; 32])),
            index: 12,
        };
        let s = id.to_string();
        let back = TransactionId::from_str(&s).expect("parses");
        assert_eq!(id, back);

        let id2 = TransactionId {
            block: BlockRef::Sequence(Sequence(9001)),
            index: 0,
        };
        let back2 = TransactionId::from_str(&id2.to_string()).expect("parses");
        assert_eq!(id2, back2);
    }
}
