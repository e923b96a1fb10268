//! Big-bang: a signed out-of-band reset broadcast by an authorized
//! source (spec §4.5 "Big-bang").

use concord_crypto::sign::verify;
use concord_types::error::ConsensusError;
use concord_types::{PrivateKey, PublicKey, RoundTable, Sequence, Signature};

#[derive(Clone, Debug)]
pub struct BigBang {
    pub table: RoundTable,
    pub signature: Signature,
}

fn sign_bytes(table: &RoundTable) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&table.round.0.to_le_bytes());
    out.extend_from_slice(&table.general.0);
    for confidant in &table.confidants {
        out.extend_from_slice(&confidant.0);
    }
    for hash in &table.hashes {
        out.extend_from_slice(&hash.0);
    }
    out
}

pub fn build_big_bang(table: RoundTable, private_key: &PrivateKey) -> BigBang {
    let signature = sign(private_key, &sign_bytes(&table)).expect("valid seed");
    BigBang { table, signature }
}

/// Accepts a big-bang only if it is properly signed by `authority` and
/// its round is at least the node's current round and strictly ahead
/// of the last block actually written (spec §4.5: "forces the node to
/// accept the accompanying round table unconditionally if
/// `bb_round >= cur_round && bb_round > lastWrittenSequence`").
pub fn accept_big_bang(bb: &BigBang, authority: &PublicKey, cur_round: concord_types::Round, last_written_sequence: Sequence) -> Result<(), ConsensusError> {
    if verify(authority, &sign_bytes(&bb.table), &bb.signature).is_err() {
        return Err(ConsensusError::BadSignature(bb.table.general.0[0]));
    }
    if bb.table.round < cur_round || bb.table.round.0 <= last_written_sequence.0 {
        return Err(ConsensusError::StaleRound {
            received: bb.table.round.0,
            current: cur_round.0,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use concord_crypto::keyfile::KeyPair;
    use concord_types::Round;

    fn table(round: u64) -> RoundTable {
        RoundTable {
            round: Round(round),
            general: PublicKey([1u8; 32]),
            confidants: vec![PublicKey([1u8; 32]), PublicKey([2u8; 32])],
            hashes: vec![],
        }
    }

    #[test]
    fn ahead_of_both_round_and_last_written_is_accepted() {
        let authority = KeyPair::generate();
        let bb = build_big_bang(table(105), &authority.private_key);
        assert!(accept_big_bang(&bb, &authority.public_key, Round(100), Sequence(90)).is_ok());
    }

    #[test]
    fn not_ahead_of_last_written_sequence_is_rejected() {
        let authority = KeyPair::generate();
        let bb = build_big_bang(table(105), &authority.private_key);
        assert!(matches!(
            accept_big_bang(&bb, &authority.public_key, Round(100), Sequence(105)),
            Err(ConsensusError::StaleRound { .. })
        ));
    }

    #[test]
    fn tampered_table_fails_signature_check() {
        let authority = KeyPair::generate();
        let mut bb = build_big_bang(table(105), &authority.private_key);
        bb.table.round = Round(999);
        assert!(matches!(
            accept_big_bang(&bb, &authority.public_key, Round(100), Sequence(90)),
            Err(ConsensusError::BadSignature(_))
        ));
    }
}
