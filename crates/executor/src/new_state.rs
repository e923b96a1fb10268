//! Encodes the `RefStart` user-field a `new-state` transaction carries
//! to point back at the invocation it reports on (spec §4.4). Negative
//! field ids are outside `sign_bytes`'s coverage (see
//! `concord_types::codec::sign_bytes`), which fits: a `new-state`
//! transaction is never signed by its nominal source, only confirmed
//! by confidant signatures over the packet hash.

use std::collections::BTreeMap;

use concord_types::{Address, FixedAmount, Sequence, SmartContractRef, Signature, Transaction, UnsignedTransaction, UserFieldValue};

pub const REF_START_FIELD_ID: i32 = -1;
/// Holds the contract's returned state blob, opaque at this layer.
pub const STATE_FIELD_ID: i32 = 0;

pub fn encode_ref_start(invocation: &SmartContractRef) -> UserFieldValue {
    let mut buf = Vec::with_capacity(12);
    buf.extend_from_slice(&invocation.sequence.0.to_le_bytes());
    buf.extend_from_slice(&invocation.index.to_le_bytes());
    UserFieldValue::Bytes(buf)
}

pub fn decode_ref_start(fields: &BTreeMap<i32, UserFieldValue>) -> Option<SmartContractRef> {
    let UserFieldValue::Bytes(buf) = fields.get(&REF_START_FIELD_ID)? else {
        return None;
    };
    if buf.len() != 12 {
        return None;
    }
    let sequence = Sequence(u64::from_le_bytes(buf[0..8].try_into().ok()?));
    let index = u32::from_le_bytes(buf[8..12].try_into().ok()?);
    Some(SmartContractRef { sequence, index })
}

/// Builds the unsigned shell of a contract's `new-state` transaction:
/// source and target are the contract's own address (the waived
/// source≠target invariant, spec §4.3), carrying `RefStart` back to
/// the invocation and the executor's returned state blob. The packet
/// this rides in is what actually carries authority, via confidant
/// signatures over the packet hash, not this transaction's own
/// signature field — which is left zeroed.
pub fn build_new_state_transaction(
    contract_address: Address,
    inner_id: i64,
    invocation: SmartContractRef,
    state: Vec<u8>,
) -> Transaction {
    UnsignedTransaction::new(inner_id, contract_address, contract_address, 0, FixedAmount::ZERO, FixedAmount::ZERO)
        .with_user_field(REF_START_FIELD_ID, encode_ref_start(&invocation))
        .with_user_field(STATE_FIELD_ID, UserFieldValue::Bytes(state))
        .sign(FixedAmount::ZERO, Signature([0u8; 64]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ref_start_round_trips() {
        let invocation = SmartContractRef { sequence: Sequence(42), index: 3 };
        let mut fields = BTreeMap::new();
        fields.insert(REF_START_FIELD_ID, encode_ref_start(&invocation));
        assert_eq!(decode_ref_start(&fields), Some(invocation));
    }

    #[test]
    fn malformed_field_decodes_to_none() {
        let mut fields = BTreeMap::new();
        fields.insert(REF_START_FIELD_ID, UserFieldValue::Int(7));
        assert_eq!(decode_ref_start(&fields), None);
    }

    #[test]
    fn new_state_transaction_carries_ref_start_and_waives_source_target() {
        let contract = Address::PublicKey(concord_types::PublicKey([9u8; 32]));
        let invocation = SmartContractRef { sequence: Sequence(5), index: 1 };
        let tx = build_new_state_transaction(contract, 1, invocation, vec![1, 2, 3]);

        assert_eq!(tx.source, contract);
        assert_eq!(tx.target, contract);
        assert!(tx.is_new_state());
        assert_eq!(decode_ref_start(&tx.user_fields), Some(invocation));
    }
}
