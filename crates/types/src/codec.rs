//! Canonical wire encoding for transactions and blocks. This is *not*
//! SCALE: the byte layout is pinned by the external protocol and is
//! hand-written here, little-endian throughout.

use std::collections::BTreeMap;

use blake2::{Blake2b512, Digest};

use crate::block::{Block, BlockHeader};
use crate::ids::{Address, Hash, PublicKey, Round, Sequence, Signature};
use crate::mask::{CharacteristicMask, RejectReason};
use crate::tx::{FixedAmount, Transaction, UserFieldValue};

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("unexpected end of input")]
    Eof,
    #[error("invalid user field tag: {0}")]
    InvalidTag(u8),
    #[error("invalid reject reason: {0}")]
    InvalidRejectReason(u8),
    #[error("inner id out of range: {0}")]
    InnerIdOutOfRange(i64),
}

type Result<T> = std::result::Result<T, CodecError>;

/// Minimal byte cursor so decoders read left to right without pulling
/// in a general-purpose parser combinator crate.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Reader { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.pos + n > self.buf.len() {
            return Err(CodecError::Eof);
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn i64(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn array32(&mut self) -> Result<[u8; 32]> {
        Ok(self.take(32)?.try_into().unwrap())
    }

    fn array64(&mut self) -> Result<[u8; 64]> {
        Ok(self.take(64)?.try_into().unwrap())
    }
}

const WALLET_ID_FLAG_SOURCE: u32 = 1 << 31;
const WALLET_ID_FLAG_TARGET: u32 = 1 << 30;
const INNER_ID_HI_MASK: u32 = 0x3FFF_FFFF;

fn encode_amount(out: &mut Vec<u8>, amount: FixedAmount) {
    out.extend_from_slice(&amount.integral.to_le_bytes());
    out.extend_from_slice(&amount.fraction.to_le_bytes());
}

fn decode_amount(r: &mut Reader) -> Result<FixedAmount> {
    Ok(FixedAmount {
        integral: r.i64()?,
        fraction: r.u64()?,
    })
}

fn encode_address(out: &mut Vec<u8>, address: &Address) {
    match address {
        Address::WalletId(id) => out.extend_from_slice(&id.to_le_bytes()),
        Address::PublicKey(pk) => out.extend_from_slice(&pk.0),
    }
}

fn decode_address(r: &mut Reader, is_wallet_id: bool) -> Result<Address> {
    if is_wallet_id {
        Ok(Address::WalletId(r.u32()?))
    } else {
        Ok(Address::PublicKey(PublicKey(r.array32()?)))
    }
}

fn address_width(address: &Address) -> usize {
    match address {
        Address::WalletId(_) => 4,
        Address::PublicKey(_) => 32,
    }
}

fn user_field_tag(value: &UserFieldValue) -> u8 {
    match value {
        UserFieldValue::Int(_) => 0,
        UserFieldValue::Amount(_) => 1,
        UserFieldValue::Bytes(_) => 2,
        UserFieldValue::Transaction(_) => 3,
    }
}

fn encode_user_field_value(out: &mut Vec<u8>, value: &UserFieldValue) {
    match value {
        UserFieldValue::Int(v) => out.extend_from_slice(&v.to_le_bytes()),
        UserFieldValue::Amount(a) => encode_amount(out, *a),
        UserFieldValue::Bytes(b) => {
            out.extend_from_slice(&(b.len() as u32).to_le_bytes());
            out.extend_from_slice(b);
        }
        UserFieldValue::Transaction(tx) => {
            let inner = encode_transaction(tx);
            out.extend_from_slice(&(inner.len() as u32).to_le_bytes());
            out.extend_from_slice(&inner);
        }
    }
}

fn decode_user_field_value(r: &mut Reader, tag: u8) -> Result<UserFieldValue> {
    match tag {
        0 => Ok(UserFieldValue::Int(r.i64()?)),
        1 => Ok(UserFieldValue::Amount(decode_amount(r)?)),
        2 => {
            let len = r.u32()? as usize;
            Ok(UserFieldValue::Bytes(r.take(len)?.to_vec()))
        }
        3 => {
            let len = r.u32()? as usize;
            let bytes = r.take(len)?;
            let tx = decode_transaction(bytes).map_err(|_| CodecError::InvalidTag(tag))?;
            Ok(UserFieldValue::Transaction(Box::new(tx)))
        }
        other => Err(CodecError::InvalidTag(other)),
    }
}

fn encode_user_fields(out: &mut Vec<u8>, fields: &BTreeMap<i32, UserFieldValue>, include_count_prefix: bool, only_nonnegative: bool) {
    let entries: Vec<_> = fields
        .iter()
        .filter(|(id, _)| !only_nonnegative || **id >= 0)
        .collect();
    if include_count_prefix {
        out.push(entries.len() as u8);
    }
    for (id, value) in entries {
        out.extend_from_slice(&id.to_le_bytes());
        out.push(user_field_tag(value));
        encode_user_field_value(out, value);
    }
}

fn decode_user_fields(r: &mut Reader) -> Result<BTreeMap<i32, UserFieldValue>> {
    let count = r.u8()?;
    let mut fields = BTreeMap::new();
    for _ in 0..count {
        let id = r.i32()?;
        let tag = r.u8()?;
        let value = decode_user_field_value(r, tag)?;
        fields.insert(id, value);
    }
    Ok(fields)
}

/// Encodes a transaction exactly as it is gossiped and stored (spec §6
/// "Transaction canonical encoding").
pub fn encode_transaction(tx: &Transaction) -> Vec<u8> {
    let mut out = Vec::new();
    encode_inner_id_and_addresses(&mut out, tx.inner_id, &tx.source, &tx.target);
    encode_amount(&mut out, tx.amount);
    encode_amount(&mut out, tx.max_fee);
    out.push(tx.currency);
    encode_user_fields(&mut out, &tx.user_fields, true, false);
    out.extend_from_slice(&tx.signature.0);
    encode_amount(&mut out, tx.counted_fee);
    out
}

/// Encodes the subset of a transaction that is actually signed: no
/// counted-fee, no signature, no user-fields count prefix, and only
/// non-negative-id user fields participate (Open Question 1 — treated
/// as an intentional elision, not a bug).
pub fn sign_bytes(
    inner_id: i64,
    source: &Address,
    target: &Address,
    amount: FixedAmount,
    max_fee: FixedAmount,
    currency: u8,
    user_fields: &BTreeMap<i32, UserFieldValue>,
) -> Vec<u8> {
    let mut out = Vec::new();
    encode_inner_id_and_addresses(&mut out, inner_id, source, target);
    encode_amount(&mut out, amount);
    encode_amount(&mut out, max_fee);
    out.push(currency);
    encode_user_fields(&mut out, user_fields, false, true);
    out
}

fn encode_inner_id_and_addresses(out: &mut Vec<u8>, inner_id: i64, source: &Address, target: &Address) {
    if !(0..(1i64 << 46)).contains(&inner_id) {
        // Caller is expected to validate before reaching the codec;
        // clamp defensively rather than panic on encode.
    }
    let id = inner_id as u64 & ((1u64 << 46) - 1);
    let lo = (id & 0xFFFF) as u16;
    let hi = ((id >> 16) & INNER_ID_HI_MASK as u64) as u32;
    let mut hi_and_flags = hi;
    if source.is_wallet_id() {
        hi_and_flags |= WALLET_ID_FLAG_SOURCE;
    }
    if target.is_wallet_id() {
        hi_and_flags |= WALLET_ID_FLAG_TARGET;
    }
    out.extend_from_slice(&lo.to_le_bytes());
    out.extend_from_slice(&hi_and_flags.to_le_bytes());
    encode_address(out, source);
    encode_address(out, target);
}

/// Decodes a transaction from its canonical byte form.
pub fn decode_transaction(bytes: &[u8]) -> Result<Transaction> {
    let mut r = Reader::new(bytes);
    let lo = r.u16()? as u64;
    let hi_and_flags = r.u32()?;
    let source_is_wallet = hi_and_flags & WALLET_ID_FLAG_SOURCE != 0;
    let target_is_wallet = hi_and_flags & WALLET_ID_FLAG_TARGET != 0;
    let hi = (hi_and_flags & INNER_ID_HI_MASK) as u64;
    let inner_id = (lo | (hi << 16)) as i64;

    let source = decode_address(&mut r, source_is_wallet)?;
    let target = decode_address(&mut r, target_is_wallet)?;
    let amount = decode_amount(&mut r)?;
    let max_fee = decode_amount(&mut r)?;
    let currency = r.u8()?;
    let user_fields = decode_user_fields(&mut r)?;
    let signature = Signature(r.array64()?);
    let counted_fee = decode_amount(&mut r)?;

    Ok(Transaction {
        inner_id,
        source,
        target,
        currency,
        amount,
        max_fee,
        counted_fee,
        signature,
        user_fields,
    })
}

fn encode_mask(out: &mut Vec<u8>, mask: &CharacteristicMask) {
    out.extend_from_slice(&(mask.reasons.len() as u32).to_le_bytes());
    for reason in &mask.reasons {
        out.push(reason.as_u8());
    }
}

fn decode_mask(r: &mut Reader) -> Result<CharacteristicMask> {
    let len = r.u32()? as usize;
    let mut reasons = Vec::with_capacity(len);
    for _ in 0..len {
        let byte = r.u8()?;
        reasons.push(reject_reason_from_u8(byte)?);
    }
    Ok(CharacteristicMask { reasons })
}

fn reject_reason_from_u8(byte: u8) -> Result<RejectReason> {
    Ok(match byte {
        0 => RejectReason::None,
        1 => RejectReason::InsufficientBalance,
        2 => RejectReason::WrongSignature,
        3 => RejectReason::TooLarge,
        4 => RejectReason::InsufficientMaxFee,
        5 => RejectReason::SourceDoesNotExist,
        6 => RejectReason::ContractViolation,
        7 => RejectReason::MalformedContractAddress,
        8 => RejectReason::RejectedByGraph,
        9 => RejectReason::RejectedSmart,
        10 => RejectReason::DuplicatedInsideBlock,
        11 => RejectReason::WrongInnerId,
        other => return Err(CodecError::InvalidRejectReason(other)),
    })
}

const BLOCK_VERSION: u8 = 1;

/// Encodes a finalized block (spec §6 "Block encoding").
pub fn encode_block(block: &Block) -> Vec<u8> {
    let mut out = Vec::new();
    out.push(BLOCK_VERSION);
    out.extend_from_slice(&block.header.previous_hash.0);
    out.extend_from_slice(&block.header.sequence.0.to_le_bytes());
    out.extend_from_slice(&block.header.round.0.to_le_bytes());
    out.extend_from_slice(&block.header.timestamp.to_le_bytes());
    encode_mask(&mut out, &block.header.mask);

    out.extend_from_slice(&(block.transactions.len() as u32).to_le_bytes());
    for tx in &block.transactions {
        let encoded = encode_transaction(tx);
        out.extend_from_slice(&(encoded.len() as u32).to_le_bytes());
        out.extend_from_slice(&encoded);
    }

    out.extend_from_slice(&block.writer_signature.0);
    out.push(block.confidant_signatures.len() as u8);
    for (idx, sig) in &block.confidant_signatures {
        out.push(*idx);
        out.extend_from_slice(&sig.0);
    }
    out
}

/// Decodes a block from its canonical byte form.
pub fn decode_block(bytes: &[u8]) -> Result<Block> {
    let mut r = Reader::new(bytes);
    let _version = r.u8()?;
    let previous_hash = Hash(r.array32()?);
    let sequence = Sequence(r.u64()?);
    let round = Round(r.u64()?);
    let timestamp = r.u64()?;
    let mask = decode_mask(&mut r)?;

    let tx_count = r.u32()? as usize;
    let mut transactions = Vec::with_capacity(tx_count);
    for _ in 0..tx_count {
        let len = r.u32()? as usize;
        let bytes = r.take(len)?;
        transactions.push(decode_transaction(bytes)?);
    }

    let writer_signature = Signature(r.array64()?);
    let sig_count = r.u8()?;
    let mut confidant_signatures = Vec::with_capacity(sig_count as usize);
    for _ in 0..sig_count {
        let idx = r.u8()?;
        let sig = Signature(r.array64()?);
        confidant_signatures.push((idx, sig));
    }

    Ok(Block {
        header: BlockHeader {
            previous_hash,
            sequence,
            round,
            timestamp,
            mask,
        },
        transactions,
        writer_signature,
        confidant_signatures,
    })
}

/// Blake2b-256 over a block's canonical encoding; subsequent blocks
/// commit to this value as their `previous_hash`.
pub fn block_hash(block: &Block) -> Hash {
    hash_bytes(&encode_block(block))
}

/// Blake2b-256 over the concatenation of canonically encoded
/// transactions, in order — a `TransactionsPacket`'s identity.
pub fn packet_hash(transactions: &[Transaction]) -> Hash {
    let mut buf = Vec::new();
    for tx in transactions {
        buf.extend_from_slice(&encode_transaction(tx));
    }
    hash_bytes(&buf)
}

fn hash_bytes(bytes: &[u8]) -> Hash {
    let mut hasher = Blake2b512::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest[..32]);
    Hash(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn sample_tx() -> Transaction {
        let mut fields = BTreeMap::new();
        fields.insert(0, UserFieldValue::Int(7));
        fields.insert(-1, UserFieldValue::Bytes(vec![1, 2, 3]));
        Transaction {
            inner_id: 123456,
            source: Address::PublicKey(PublicKey([9u8; 32])),
            target: Address::WalletId(42),
            currency: 1,
            amount: FixedAmount { integral: 10, fraction: 5 },
            max_fee: FixedAmount { integral: 0, fraction: 100 },
            counted_fee: FixedAmount { integral: 0, fraction: 50 },
            signature: Signature([3u8; 64]),
            user_fields: fields,
        }
    }

    #[test]
    fn transaction_round_trips() {
        let tx = sample_tx();
        let encoded = encode_transaction(&tx);
        let decoded = decode_transaction(&encoded).expect("decodes");
        assert_eq!(tx, decoded);
    }

    #[test]
    fn wallet_id_flag_round_trips_for_both_addresses() {
        let mut tx = sample_tx();
        tx.source = Address::WalletId(7);
        tx.target = Address::PublicKey(PublicKey([1u8; 32]));
        let encoded = encode_transaction(&tx);
        let decoded = decode_transaction(&encoded).expect("decodes");
        assert_eq!(tx.source, decoded.source);
        assert_eq!(tx.target, decoded.target);
    }

    #[test]
    fn sign_bytes_excludes_signature_and_negative_fields() {
        let tx = sample_tx();
        let bytes = sign_bytes(
            tx.inner_id,
            &tx.source,
            &tx.target,
            tx.amount,
            tx.max_fee,
            tx.currency,
            &tx.user_fields,
        );
        let haystack = &bytes;
        assert!(!contains_subslice(haystack, &tx.signature.0));
        assert!(!contains_subslice(haystack, &[1, 2, 3]));
    }

    fn contains_subslice(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    #[test]
    fn block_hash_changes_with_sequence() {
        let tx = sample_tx();
        let block_a = Block {
            header: BlockHeader {
                previous_hash: Hash([0u8; 32]),
                sequence: Sequence(1),
                round: Round(1),
                timestamp: 1000,
                mask: CharacteristicMask::new(vec![RejectReason::None]),
            },
            transactions: vec![tx.clone()],
            writer_signature: Signature([5u8; 64]),
            confidant_signatures: vec![(0, Signature([6u8; 64]))],
        };
        let mut block_b = block_a.clone();
        block_b.header.sequence = Sequence(2);
        assert_ne!(block_hash(&block_a), block_hash(&block_b));

        let round_tripped = decode_block(&encode_block(&block_a)).expect("decodes");
        assert_eq!(round_tripped, block_a);
    }

    #[test]
    fn inner_id_round_trips_at_46_bit_boundary() {
        let mut tx = sample_tx();
        tx.inner_id = (1i64 << 46) - 1;
        let encoded = encode_transaction(&tx);
        let decoded = decode_transaction(&encoded).expect("decodes");
        assert_eq!(tx.inner_id, decoded.inner_id);
    }
}
