use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

use thiserror::Error;

use hash::Sha256Hash;
use keys::PublicKey;

use crate::transaction::SignedTransaction;

#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum TransactionError {
    #[error("transaction {id} carries a signature that does not verify")]
    InvalidSignature { id: Sha256Hash },
}

/// A signed transaction with its derived identities and lazily verified
/// signer set. Shared between the pending block, the fork database and the
/// unapplied-transaction map.
#[derive(Debug)]
pub struct TransactionMetadata {
    pub signed: SignedTransaction,
    pub id: Sha256Hash,
    pub signed_id: Sha256Hash,
    accepted: AtomicBool,
    recovered: OnceLock<BTreeSet<PublicKey>>,
}

impl TransactionMetadata {
    pub fn new(signed: SignedTransaction) -> Self {
        let id = signed.id();
        let signed_id = signed.signed_id();
        TransactionMetadata {
            signed,
            id,
            signed_id,
            accepted: AtomicBool::new(false),
            recovered: OnceLock::new(),
        }
    }

    /// Verifies every signature pair over the transaction id and returns
    /// the signer set. The result is cached after the first success.
    pub fn recover_keys(&self) -> Result<&BTreeSet<PublicKey>, TransactionError> {
        if let Some(keys) = self.recovered.get() {
            return Ok(keys);
        }
        let digest = self.id;
        let mut keys = BTreeSet::new();
        for pair in &self.signed.signatures {
            if !pair.public_key.verify(&pair.signature, digest.as_bytes()) {
                return Err(TransactionError::InvalidSignature { id: self.id });
            }
            keys.insert(pair.public_key);
        }
        Ok(self.recovered.get_or_init(|| keys))
    }

    /// Flips the accepted flag, returning true the first time. Keeps the
    /// `accepted_transaction` signal to exactly one emission per
    /// transaction.
    pub fn mark_accepted(&self) -> bool {
        !self.accepted.swap(true, Ordering::SeqCst)
    }
}
