//! Synchronous client-facing pre-check (spec §4.3 "SimpleValidator"):
//! a quick accept/reject verdict before a transaction is even
//! gossiped into the mempool.

use concord_crypto::sign::verify;
use concord_types::{codec, Transaction};

use crate::deploy::derive_contract_address;
use crate::wallet_lookup::WalletLookup;

const MAX_TRANSACTION_BYTES: usize = 1 << 16;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SimpleVerdict {
    AllCorrect,
    InsufficientBalance,
    WrongSignature,
    TooLarge,
    InsufficientMaxFee,
    SourceDoesNotExist,
    ContractViolation,
}

pub fn check(tx: &Transaction, wallet: &dyn WalletLookup) -> SimpleVerdict {
    let encoded = codec::encode_transaction(tx);
    if encoded.len() > MAX_TRANSACTION_BYTES {
        return SimpleVerdict::TooLarge;
    }

    let source_key = match wallet.resolve(&tx.source) {
        Ok(key) => key,
        Err(_) => return SimpleVerdict::SourceDoesNotExist,
    };

    if !tx.is_new_state() {
        let sign_bytes = codec::sign_bytes(
            tx.inner_id,
            &tx.source,
            &tx.target,
            tx.amount,
            tx.max_fee,
            tx.currency,
            &tx.user_fields,
        );
        if verify(&source_key, &sign_bytes, &tx.signature).is_err() {
            return SimpleVerdict::WrongSignature;
        }
    }

    if tx.counted_fee > tx.max_fee {
        return SimpleVerdict::InsufficientMaxFee;
    }

    let balance = match wallet.balance(&source_key) {
        Ok(balance) => balance,
        Err(_) => return SimpleVerdict::SourceDoesNotExist,
    };
    if balance < tx.amount + tx.counted_fee {
        return SimpleVerdict::InsufficientBalance;
    }

    if tx.is_executable() {
        if let Some(concord_types::UserFieldValue::Bytes(payload)) = tx.user_fields.get(&0) {
            if tx.user_fields.len() == 1 {
                let expected = derive_contract_address(&source_key, tx.inner_id, payload);
                if expected != tx.target {
                    return SimpleVerdict::ContractViolation;
                }
            }
        }
    }

    SimpleVerdict::AllCorrect
}

#[cfg(test)]
mod tests {
    use super::*;
    use concord_crypto::keyfile::KeyPair;
    use concord_crypto::sign::sign;
    use concord_types::error::ValidatorError;
    use concord_types::{Address, FixedAmount, PublicKey};

    struct FakeWallet {
        key: PublicKey,
        balance: FixedAmount,
    }

    impl WalletLookup for FakeWallet {
        fn balance(&self, address: &PublicKey) -> Result<FixedAmount, ValidatorError> {
            if *address == self.key {
                Ok(self.balance)
            } else {
                Err(ValidatorError::SourceDoesNotExist)
            }
        }

        fn resolve_wallet_id(&self, _wallet_id: u32) -> Result<PublicKey, ValidatorError> {
            Err(ValidatorError::SourceDoesNotExist)
        }
    }

    #[test]
    fn well_formed_signed_transaction_passes() {
        let keypair = KeyPair::generate();
        let source = Address::PublicKey(keypair.public_key);
        let target = Address::PublicKey(PublicKey([9u8; 32]));
        let amount = FixedAmount { integral: 1, fraction: 0 };

        let sign_bytes = codec::sign_bytes(1, &source, &target, amount, FixedAmount::ZERO, 0, &Default::default());
        let signature = sign(&keypair.private_key, &sign_bytes).unwrap();

        let tx = concord_types::UnsignedTransaction::new(1, source, target, 0, amount, FixedAmount::ZERO)
            .sign(FixedAmount::ZERO, signature);

        let wallet = FakeWallet {
            key: keypair.public_key,
            balance: FixedAmount { integral: 100, fraction: 0 },
        };

        assert_eq!(check(&tx, &wallet), SimpleVerdict::AllCorrect);
    }

    #[test]
    fn insufficient_balance_is_detected() {
        let keypair = KeyPair::generate();
        let source = Address::PublicKey(keypair.public_key);
        let target = Address::PublicKey(PublicKey([9u8; 32]));
        let amount = FixedAmount { integral: 1000, fraction: 0 };

        let sign_bytes = codec::sign_bytes(1, &source, &target, amount, FixedAmount::ZERO, 0, &Default::default());
        let signature = sign(&keypair.private_key, &sign_bytes).unwrap();
        let tx = concord_types::UnsignedTransaction::new(1, source, target, 0, amount, FixedAmount::ZERO)
            .sign(FixedAmount::ZERO, signature);

        let wallet = FakeWallet {
            key: keypair.public_key,
            balance: FixedAmount::ZERO,
        };

        assert_eq!(check(&tx, &wallet), SimpleVerdict::InsufficientBalance);
    }
}
