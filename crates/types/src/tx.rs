//! Transaction data model: fixed-point amounts, user fields and the
//! sealed-after-signing transaction itself.

use std::collections::BTreeMap;

use parity_scale_codec::{Decode, Encode};

use crate::ids::{Address, PublicKey, Signature};

/// A fixed-point token amount: an integral part and a fractional part
/// scaled to 64 bits, matching the on-chain 16-byte amount layout
/// (spec §6 "canonical transaction encoding").
#[derive(Clone, Copy, PartialEq, Eq, Encode, Decode, Debug, Default)]
pub struct FixedAmount {
    pub integral: i64,
    pub fraction: u64,
}

impl FixedAmount {
    pub const ZERO: FixedAmount = FixedAmount {
        integral: 0,
        fraction: 0,
    };

    pub fn is_negative(&self) -> bool {
        self.integral < 0
    }
}

impl std::ops::Add for FixedAmount {
    type Output = FixedAmount;

    fn add(self, rhs: FixedAmount) -> FixedAmount {
        let (fraction, carry) = self.fraction.overflowing_add(rhs.fraction);
        FixedAmount {
            integral: self.integral + rhs.integral + carry as i64,
            fraction,
        }
    }
}

impl std::ops::Sub for FixedAmount {
    type Output = FixedAmount;

    fn sub(self, rhs: FixedAmount) -> FixedAmount {
        let (fraction, borrow) = self.fraction.overflowing_sub(rhs.fraction);
        FixedAmount {
            integral: self.integral - rhs.integral - borrow as i64,
            fraction,
        }
    }
}

impl PartialOrd for FixedAmount {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FixedAmount {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.integral, self.fraction).cmp(&(other.integral, other.fraction))
    }
}

/// A value attached to a transaction's user-field map. Field 0 is
/// reserved for the smart-contract payload by convention (spec §4.3
/// deploy/transfer/execute dispatch); the rest are application-defined.
#[derive(Clone, PartialEq, Eq, Encode, Decode, Debug)]
pub enum UserFieldValue {
    Int(i64),
    Amount(FixedAmount),
    Bytes(Vec<u8>),
    Transaction(Box<Transaction>),
}

/// A fully-built, signed transaction. Once `signature` is populated the
/// type offers no field mutators — it can only be produced by
/// [`UnsignedTransaction::sign`], which consumes the builder.
#[derive(Clone, PartialEq, Eq, Encode, Decode, Debug)]
pub struct Transaction {
    pub inner_id: i64,
    pub source: Address,
    pub target: Address,
    pub currency: u8,
    pub amount: FixedAmount,
    pub max_fee: FixedAmount,
    pub counted_fee: FixedAmount,
    pub signature: Signature,
    pub user_fields: BTreeMap<i32, UserFieldValue>,
}

impl Transaction {
    /// A negative user-field key marks a smart-contract new-state
    /// packet; field `0` present marks a deploy/execute call (spec
    /// §4.3 "Transaction kinds").
    pub fn is_new_state(&self) -> bool {
        self.user_fields.keys().any(|k| *k < 0)
    }

    pub fn is_executable(&self) -> bool {
        self.user_fields.contains_key(&0) && !self.is_new_state()
    }

    pub fn signer(&self) -> Option<PublicKey> {
        match self.source {
            Address::PublicKey(pk) => Some(pk),
            Address::WalletId(_) => None,
        }
    }
}

/// Transaction fields before signing. `counted_fee` and `signature`
/// don't exist yet; building one and calling [`sign`](Self::sign) is
/// the only way to obtain a [`Transaction`].
#[derive(Clone, Debug)]
pub struct UnsignedTransaction {
    pub inner_id: i64,
    pub source: Address,
    pub target: Address,
    pub currency: u8,
    pub amount: FixedAmount,
    pub max_fee: FixedAmount,
    pub user_fields: BTreeMap<i32, UserFieldValue>,
}

impl UnsignedTransaction {
    pub fn new(inner_id: i64, source: Address, target: Address, currency: u8, amount: FixedAmount, max_fee: FixedAmount) -> Self {
        UnsignedTransaction {
            inner_id,
            source,
            target,
            currency,
            amount,
            max_fee,
            user_fields: BTreeMap::new(),
        }
    }

    pub fn with_user_field(mut self, key: i32, value: UserFieldValue) -> Self {
        self.user_fields.insert(key, value);
        self
    }

    /// Consumes the builder, attaching the caller-supplied signature
    /// over [`crate::codec::sign_bytes`] and the counted fee the caller
    /// has already settled on.
    pub fn sign(self, counted_fee: FixedAmount, signature: Signature) -> Transaction {
        Transaction {
            inner_id: self.inner_id,
            source: self.source,
            target: self.target,
            currency: self.currency,
            amount: self.amount,
            max_fee: self.max_fee,
            counted_fee,
            signature,
            user_fields: self.user_fields,
        }
    }
}

/// A batch of transactions gossiped together with its hash and the
/// confidant signatures attesting it as a round's accepted packet
/// (spec §3 "TransactionsPacket").
#[derive(Clone, PartialEq, Eq, Encode, Decode, Debug, Default)]
pub struct TransactionsPacket {
    pub hash: crate::ids::Hash,
    pub transactions: Vec<Transaction>,
    pub signatures: Vec<Signature>,
}

impl TransactionsPacket {
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}
