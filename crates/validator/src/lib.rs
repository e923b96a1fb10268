//! Transaction validation: a synchronous client-facing pre-check plus
//! the three-phase characteristic-mask pipeline consensus runs over a
//! round's manifest (spec §4.3).

pub mod deploy;
pub mod iterative;
pub mod simple;
pub mod wallet_lookup;

pub use concord_types::error::ValidatorError;
pub use deploy::derive_contract_address;
pub use iterative::{smart_state_quorum, Candidate, NewStateContext, Validator};
pub use simple::{check, SimpleVerdict};
pub use wallet_lookup::WalletLookup;
