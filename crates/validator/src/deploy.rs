//! Deterministic contract-address derivation (spec §4.3 "Deploy check").

use concord_crypto::hash::blake2b_256;
use concord_types::{Address, PublicKey};

/// Derives the address a deploy transaction's contract must land at:
/// a hash of the deployer's key, their inner-id and the deploy
/// payload, truncated to a public-key-shaped 32 bytes.
pub fn derive_contract_address(deployer: &PublicKey, inner_id: i64, deploy_payload: &[u8]) -> Address {
    let mut buf = Vec::with_capacity(32 + 8 + deploy_payload.len());
    buf.extend_from_slice(&deployer.0);
    buf.extend_from_slice(&inner_id.to_le_bytes());
    buf.extend_from_slice(deploy_payload);
    let hash = blake2b_256(&buf);
    Address::PublicKey(PublicKey(hash.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic_and_input_sensitive() {
        let deployer = PublicKey([3u8; 32]);
        let a = derive_contract_address(&deployer, 1, b"payload-a");
        let b = derive_contract_address(&deployer, 1, b"payload-a");
        let c = derive_contract_address(&deployer, 1, b"payload-b");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
