//! Shared error taxonomy. Every fallible operation across the
//! workspace returns one of these component-scoped enums, each
//! implementing [`ErrorCode`] so logs and metrics can key on a stable
//! string rather than parsing `Display` text.

use thiserror::Error;

/// A machine-triageable identifier for an error variant, independent
/// of its human-readable message.
pub trait ErrorCode {
    fn code(&self) -> &'static str;
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("socket would block")]
    WouldBlock,
    #[error("socket io failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed packet header")]
    MalformedHeader,
    #[error("unknown command byte: {0}")]
    UnknownCommand(u8),
    #[error("peer {0} is blacklisted")]
    PeerBlacklisted(String),
    #[error("fragment reassembly buffer full for header {0}")]
    ReassemblyBufferFull(String),
    #[error("payload exceeds maximum fragment count")]
    PayloadTooLarge,
    #[error("peer {0} is not a registered neighbour")]
    UnknownPeer(String),
}

impl ErrorCode for TransportError {
    fn code(&self) -> &'static str {
        match self {
            TransportError::WouldBlock => "transport.would_block",
            TransportError::Io(_) => "transport.io",
            TransportError::MalformedHeader => "transport.malformed_header",
            TransportError::UnknownCommand(_) => "transport.unknown_command",
            TransportError::PeerBlacklisted(_) => "transport.blacklisted",
            TransportError::ReassemblyBufferFull(_) => "transport.reassembly_full",
            TransportError::PayloadTooLarge => "transport.payload_too_large",
            TransportError::UnknownPeer(_) => "transport.unknown_peer",
        }
    }
}

#[derive(Debug, Error)]
pub enum MempoolError {
    #[error("packet has empty hash")]
    EmptyHash,
    #[error("manifest already set for this round")]
    ManifestAlreadySet,
    #[error("unknown packet hash {0}")]
    UnknownPacket(String),
}

impl ErrorCode for MempoolError {
    fn code(&self) -> &'static str {
        match self {
            MempoolError::EmptyHash => "mempool.empty_hash",
            MempoolError::ManifestAlreadySet => "mempool.manifest_already_set",
            MempoolError::UnknownPacket(_) => "mempool.unknown_packet",
        }
    }
}

#[derive(Debug, Error)]
pub enum ValidatorError {
    #[error("source address does not exist")]
    SourceDoesNotExist,
    #[error("characteristic mask length {mask_len} does not match packet length {packet_len}")]
    MaskLengthMismatch { mask_len: usize, packet_len: usize },
    #[error("wallet index lookup failed: {0}")]
    WalletIndex(String),
}

impl ErrorCode for ValidatorError {
    fn code(&self) -> &'static str {
        match self {
            ValidatorError::SourceDoesNotExist => "validator.source_missing",
            ValidatorError::MaskLengthMismatch { .. } => "validator.mask_length_mismatch",
            ValidatorError::WalletIndex(_) => "validator.wallet_index",
        }
    }
}

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("contract address {0} already has a running invocation")]
    AlreadyRunning(String),
    #[error("remote executor call failed: {0}")]
    RemoteCallFailed(String),
    #[error("queue item not found for contract {0}")]
    QueueItemNotFound(String),
}

impl ErrorCode for ExecutorError {
    fn code(&self) -> &'static str {
        match self {
            ExecutorError::AlreadyRunning(_) => "executor.already_running",
            ExecutorError::RemoteCallFailed(_) => "executor.remote_call_failed",
            ExecutorError::QueueItemNotFound(_) => "executor.queue_item_not_found",
        }
    }
}

#[derive(Debug, Error)]
pub enum ConsensusError {
    #[error("no trusted role available this round")]
    NoTrusted,
    #[error("received stage message for stale round {received}, current {current}")]
    StaleRound { received: u64, current: u64 },
    #[error("round table missing required confidant count")]
    InsufficientConfidants,
    #[error("signature verification failed for sender {0}")]
    BadSignature(u8),
}

impl ErrorCode for ConsensusError {
    fn code(&self) -> &'static str {
        match self {
            ConsensusError::NoTrusted => "consensus.no_trusted",
            ConsensusError::StaleRound { .. } => "consensus.stale_round",
            ConsensusError::InsufficientConfidants => "consensus.insufficient_confidants",
            ConsensusError::BadSignature(_) => "consensus.bad_signature",
        }
    }
}

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("insufficient confidant signatures: have {have}, need {need}")]
    InsufficientSignatures { have: usize, need: usize },
    #[error("block sequence gap: expected {expected}, got {got}")]
    SequenceGap { expected: u64, got: u64 },
    #[error("sync request to peer failed: {0}")]
    SyncRequestFailed(String),
}

impl ErrorCode for CoordinatorError {
    fn code(&self) -> &'static str {
        match self {
            CoordinatorError::InsufficientSignatures { .. } => "coordinator.insufficient_signatures",
            CoordinatorError::SequenceGap { .. } => "coordinator.sequence_gap",
            CoordinatorError::SyncRequestFailed(_) => "coordinator.sync_request_failed",
        }
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage backend failure: {0}")]
    Backend(String),
    #[error("index corrupt, rebuild required: {0}")]
    IndexCorrupt(String),
    #[error("requested sequence {0} not found")]
    NotFound(u64),
}

impl ErrorCode for StorageError {
    fn code(&self) -> &'static str {
        match self {
            StorageError::Backend(_) => "storage.backend",
            StorageError::IndexCorrupt(_) => "storage.index_corrupt",
            StorageError::NotFound(_) => "storage.not_found",
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("key file missing at {0}, run `keygen` first")]
    KeyFileMissing(String),
}

impl ErrorCode for ConfigError {
    fn code(&self) -> &'static str {
        match self {
            ConfigError::Read { .. } => "config.read",
            ConfigError::Parse(_) => "config.parse",
            ConfigError::KeyFileMissing(_) => "config.key_file_missing",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_stable_strings() {
        assert_eq!(ConsensusError::NoTrusted.code(), "consensus.no_trusted");
        assert_eq!(
            MempoolError::EmptyHash.code(),
            "mempool.empty_hash"
        );
    }
}
