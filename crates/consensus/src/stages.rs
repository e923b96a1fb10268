//! Building, signing and quorum-checking the three stage messages
//! (spec §3 "Stage1/2/3", §4.5 "Happy path").

use std::collections::HashMap;

use concord_crypto::sign::{sign, verify};
use concord_types::{CharacteristicMask, Hash, PrivateKey, PublicKey, Round, Signature, Stage1, Stage2, Stage3};

fn stage1_sign_bytes(round: Round, sender: u8, candidates: &[Hash], trusted_candidates: &[PublicKey]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&round.0.to_le_bytes());
    out.push(sender);
    for hash in candidates {
        out.extend_from_slice(&hash.0);
    }
    for key in trusted_candidates {
        out.extend_from_slice(&key.0);
    }
    out
}

pub fn build_stage1(round: Round, sender: u8, mask: &CharacteristicMask, trusted_candidates: Vec<PublicKey>, private_key: &PrivateKey) -> Stage1 {
    let candidates = vec![mask.hash()];
    let payload = stage1_sign_bytes(round, sender, &candidates, &trusted_candidates);
    let signature = sign(private_key, &payload).expect("valid seed");
    Stage1 {
        sender,
        candidates,
        trusted_candidates,
        signature,
    }
}

pub fn verify_stage1(round: Round, stage: &Stage1, sender_key: &PublicKey) -> bool {
    let payload = stage1_sign_bytes(round, stage.sender, &stage.candidates, &stage.trusted_candidates);
    verify(sender_key, &payload, &stage.signature).is_ok()
}

fn stage2_sign_bytes(round: Round, sender: u8, signatures: &[(u8, Signature)]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&round.0.to_le_bytes());
    out.push(sender);
    for (index, sig) in signatures {
        out.push(*index);
        out.extend_from_slice(&sig.0);
    }
    out
}

pub fn build_stage2(round: Round, sender: u8, signatures: Vec<(u8, Signature)>, private_key: &PrivateKey) -> Stage2 {
    let payload = stage2_sign_bytes(round, sender, &signatures);
    let signature = sign(private_key, &payload).expect("valid seed");
    Stage2 { sender, signatures, signature }
}

pub fn verify_stage2(round: Round, stage: &Stage2, sender_key: &PublicKey) -> bool {
    let payload = stage2_sign_bytes(round, stage.sender, &stage.signatures);
    verify(sender_key, &payload, &stage.signature).is_ok()
}

fn stage3_sign_bytes(round: Round, sender: u8, writer: u8, real_trusted_mask: &[bool], block_signature: &Signature) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&round.0.to_le_bytes());
    out.push(sender);
    out.push(writer);
    for flag in real_trusted_mask {
        out.push(*flag as u8);
    }
    out.extend_from_slice(&block_signature.0);
    out
}

pub fn build_stage3(round: Round, sender: u8, writer: u8, real_trusted_mask: Vec<bool>, block_signature: Signature, private_key: &PrivateKey) -> Stage3 {
    let payload = stage3_sign_bytes(round, sender, writer, &real_trusted_mask, &block_signature);
    let signature = sign(private_key, &payload).expect("valid seed");
    Stage3 {
        sender,
        writer,
        real_trusted_mask,
        block_signature,
        signature,
    }
}

pub fn verify_stage3(round: Round, stage: &Stage3, sender_key: &PublicKey) -> bool {
    let payload = stage3_sign_bytes(round, stage.sender, stage.writer, &stage.real_trusted_mask, &stage.block_signature);
    verify(sender_key, &payload, &stage.signature).is_ok()
}

/// A quorum is reached once stages from at least `min_trusted`
/// distinct senders have been collected (spec §4.5 Stage-2/Stage-3
/// wording: "≥ MinTrustedNodes confidants").
pub fn has_quorum(collected_senders: usize, min_trusted: usize) -> bool {
    collected_senders >= min_trusted
}

/// The "true trusted" set: confidants whose Stage1 candidate hash
/// agrees with whichever hash a majority of Stage1s propose (spec
/// §4.5 Stage-3: "intersection of confidants whose Stage1 hashes
/// agree with the majority").
pub fn true_trusted_mask(stage1s: &[Stage1], confidant_count: usize) -> Vec<bool> {
    let mut tally: HashMap<Hash, usize> = HashMap::new();
    for stage in stage1s {
        if let Some(hash) = stage.candidates.first() {
            *tally.entry(*hash).or_insert(0) += 1;
        }
    }
    let majority_hash = tally.into_iter().max_by_key(|(_, count)| *count).map(|(hash, _)| hash);

    let mut mask = vec![false; confidant_count];
    for stage in stage1s {
        let agrees = stage.candidates.first() == majority_hash.as_ref();
        if agrees {
            if let Some(slot) = mask.get_mut(stage.sender as usize) {
                *slot = true;
            }
        }
    }
    mask
}

/// Elects the writer as the lowest confidant index whose Stage1 hash
/// agrees with the majority; ties (none possible by index alone, but
/// kept for symmetry with the next-round-table tie-break) resolved by
/// lexicographically-lowest public key (spec §4.5 Stage-3 "elects the
/// writer").
pub fn elect_writer(real_trusted_mask: &[bool], confidants: &[PublicKey]) -> Option<u8> {
    let mut candidates: Vec<(u8, &PublicKey)> = real_trusted_mask
        .iter()
        .enumerate()
        .filter(|(_, trusted)| **trusted)
        .filter_map(|(idx, _)| confidants.get(idx).map(|key| (idx as u8, key)))
        .collect();
    candidates.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.0.cmp(&b.1.0)));
    candidates.first().map(|(idx, _)| *idx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use concord_crypto::keyfile::KeyPair;

    #[test]
    fn stage1_signature_round_trips() {
        let keypair = KeyPair::generate();
        let mask = CharacteristicMask::new(vec![]);
        let stage = build_stage1(Round(5), 2, &mask, vec![], &keypair.private_key);
        assert!(verify_stage1(Round(5), &stage, &keypair.public_key));
    }

    #[test]
    fn true_trusted_mask_rewards_majority_hash() {
        let hash_a = Hash([1u8; 32]);
        let hash_b = Hash([2u8; 32]);
        let stages = vec![
            Stage1 { sender: 0, candidates: vec![hash_a], trusted_candidates: vec![], signature: Signature([0u8; 64]) },
            Stage1 { sender: 1, candidates: vec![hash_a], trusted_candidates: vec![], signature: Signature([0u8; 64]) },
            Stage1 { sender: 2, candidates: vec![hash_b], trusted_candidates: vec![], signature: Signature([0u8; 64]) },
        ];
        let mask = true_trusted_mask(&stages, 3);
        assert_eq!(mask, vec![true, true, false]);
    }

    #[test]
    fn writer_election_picks_lowest_agreeing_index() {
        let confidants = vec![PublicKey([3u8; 32]), PublicKey([1u8; 32]), PublicKey([2u8; 32])];
        let mask = vec![false, true, true];
        assert_eq!(elect_writer(&mask, &confidants), Some(1));
    }
}
