//! Signing, verification, hashing and key-file handling. The actual
//! Ed25519/Blake2 math is treated as an opaque primitive; this crate's
//! job is the small surface consensus and validation call through.

pub mod error;
pub mod hash;
pub mod keyfile;
pub mod sign;

pub use error::CryptoError;
pub use hash::blake2b_256;
pub use keyfile::{load_or_generate_keypair, KeyPair};
pub use sign::{sign, verify};
