//! Resolves addresses to balances and absolute (public-key) form. The
//! validator depends on this trait rather than `concord-storage`
//! directly so unit tests can substitute an in-memory double.

use concord_types::error::ValidatorError;
use concord_types::{Address, FixedAmount, PublicKey};

pub trait WalletLookup {
    fn balance(&self, address: &PublicKey) -> Result<FixedAmount, ValidatorError>;

    fn resolve(&self, address: &Address) -> Result<PublicKey, ValidatorError> {
        match address {
            Address::PublicKey(pk) => Ok(*pk),
            Address::WalletId(id) => self.resolve_wallet_id(*id),
        }
    }

    fn resolve_wallet_id(&self, wallet_id: u32) -> Result<PublicKey, ValidatorError>;
}

impl WalletLookup for concord_storage::WalletIndex {
    fn balance(&self, address: &PublicKey) -> Result<FixedAmount, ValidatorError> {
        self.get(address)
            .map_err(|e| ValidatorError::WalletIndex(e.to_string()))?
            .map(|record| record.balance)
            .ok_or(ValidatorError::SourceDoesNotExist)
    }

    fn resolve_wallet_id(&self, _wallet_id: u32) -> Result<PublicKey, ValidatorError> {
        // No id->pubkey secondary mapping exists in the wallet index yet;
        // wallet-id addressing is unreachable until one is added.
        Err(ValidatorError::SourceDoesNotExist)
    }
}
