use thiserror::Error;

use concord_types::error::ErrorCode;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid key encoding: {0}")]
    InvalidKey(String),
    #[error("invalid signature encoding: {0}")]
    InvalidSignature(String),
    #[error("signature verification failed")]
    VerificationFailed,
    #[error("key file io failure at {path}: {source}")]
    KeyFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("key file {0} is malformed")]
    MalformedKeyFile(String),
}

impl ErrorCode for CryptoError {
    fn code(&self) -> &'static str {
        match self {
            CryptoError::InvalidKey(_) => "crypto.invalid_key",
            CryptoError::InvalidSignature(_) => "crypto.invalid_signature",
            CryptoError::VerificationFailed => "crypto.verification_failed",
            CryptoError::KeyFileIo { .. } => "crypto.key_file_io",
            CryptoError::MalformedKeyFile(_) => "crypto.malformed_key_file",
        }
    }
}
