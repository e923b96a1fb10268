//! Core data structures shared by every component of the consensus node:
//! identifiers, the transaction/block/stage data model, the canonical wire
//! codec and the error taxonomy.

pub mod block;
pub mod codec;
pub mod config;
pub mod error;
pub mod ids;
pub mod mask;
pub mod round;
pub mod tx;

pub use block::{Block, BlockHeader};
pub use ids::{Address, Hash, PrivateKey, PublicKey, Round, Sequence, Signature, SmartContractRef, TransactionId};
pub use mask::{CharacteristicMask, RejectReason};
pub use round::{RoundTable, Stage1, Stage2, Stage3, StageKind, StageRequest};
pub use tx::{FixedAmount, Transaction, TransactionsPacket, UnsignedTransaction, UserFieldValue};
