//! `NodePublic.txt` / `NodePrivate.txt` handling: each file holds a
//! single Base58-encoded line (spec §6 "Persisted state").

use std::path::Path;

use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;

use concord_types::{PrivateKey, PublicKey};

use crate::error::CryptoError;

#[derive(Clone)]
pub struct KeyPair {
    pub public_key: PublicKey,
    pub private_key: PrivateKey,
}

impl KeyPair {
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        let verifying_key = signing_key.verifying_key();

        let mut private_bytes = [0u8; 64];
        private_bytes[..32].copy_from_slice(&signing_key.to_bytes());
        private_bytes[32..].copy_from_slice(verifying_key.as_bytes());

        KeyPair {
            public_key: PublicKey(verifying_key.to_bytes()),
            private_key: PrivateKey(private_bytes),
        }
    }
}

fn write_base58_line(path: &Path, bytes: &[u8]) -> Result<(), CryptoError> {
    let encoded = bs58::encode(bytes).into_string();
    std::fs::write(path, encoded).map_err(|source| CryptoError::KeyFileIo {
        path: path.display().to_string(),
        source,
    })
}

fn read_base58_line(path: &Path) -> Result<Vec<u8>, CryptoError> {
    let contents = std::fs::read_to_string(path).map_err(|source| CryptoError::KeyFileIo {
        path: path.display().to_string(),
        source,
    })?;
    bs58::decode(contents.trim())
        .into_vec()
        .map_err(|_| CryptoError::MalformedKeyFile(path.display().to_string()))
}

/// Loads the node's keypair from `public_path`/`private_path`, generating
/// and persisting a fresh one if neither file exists yet (spec §7
/// "Configuration: missing keys file prompts a one-time generation").
pub fn load_or_generate_keypair(public_path: &Path, private_path: &Path) -> Result<KeyPair, CryptoError> {
    if public_path.exists() && private_path.exists() {
        let public_bytes = read_base58_line(public_path)?;
        let private_bytes = read_base58_line(private_path)?;

        let public_key: [u8; 32] = public_bytes
            .try_into()
            .map_err(|_| CryptoError::MalformedKeyFile(public_path.display().to_string()))?;
        let private_key: [u8; 64] = private_bytes
            .try_into()
            .map_err(|_| CryptoError::MalformedKeyFile(private_path.display().to_string()))?;

        return Ok(KeyPair {
            public_key: PublicKey(public_key),
            private_key: PrivateKey(private_key),
        });
    }

    tracing::info!(target: "crypto", "no key files found, generating a new node identity");
    let keypair = KeyPair::generate();
    write_base58_line(public_path, &keypair.public_key.0)?;
    write_base58_line(private_path, &keypair.private_key.0)?;
    Ok(keypair)
}
