use ed25519_dalek::{Signer, Verifier, SigningKey, VerifyingKey};

use concord_types::{PrivateKey, PublicKey, Signature};

use crate::error::CryptoError;

/// Signs `message` with `private_key`. The private key is expected in
/// the 64-byte dalek keypair form (32-byte seed followed by the
/// derived 32-byte public key), matching what [`crate::keyfile`]
/// persists.
pub fn sign(private_key: &PrivateKey, message: &[u8]) -> Result<Signature, CryptoError> {
    let seed: [u8; 32] = private_key.0[..32]
        .try_into()
        .map_err(|_| CryptoError::InvalidKey("private key seed".to_string()))?;
    let signing_key = SigningKey::from_bytes(&seed);
    let sig = signing_key.sign(message);
    Ok(Signature(sig.to_bytes()))
}

/// Verifies `signature` over `message` under `public_key`.
pub fn verify(public_key: &PublicKey, message: &[u8], signature: &Signature) -> Result<(), CryptoError> {
    let verifying_key = VerifyingKey::from_bytes(&public_key.0)
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    let sig = ed25519_dalek::Signature::from_bytes(&signature.0);
    verifying_key
        .verify(message, &sig)
        .map_err(|_| CryptoError::VerificationFailed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyfile::KeyPair;

    #[test]
    fn sign_then_verify_round_trips() {
        let keypair = KeyPair::generate();
        let message = b"stage1 payload";
        let sig = sign(&keypair.private_key, message).expect("signs");
        verify(&keypair.public_key, message, &sig).expect("verifies");
    }

    #[test]
    fn verify_rejects_tampered_message() {
        let keypair = KeyPair::generate();
        let sig = sign(&keypair.private_key, b"original").expect("signs");
        assert!(verify(&keypair.public_key, b"tampered", &sig).is_err());
    }
}
