pub type BlockId = hash::Sha256Hash;

mod block;
mod content;
mod header;
mod metadata;
mod transaction;

pub use self::block::{Extension, SignedBlock, TransactionReceipt, TransactionStatus};
pub use self::header::BlockHeader;
pub use self::metadata::{TransactionError, TransactionMetadata};
pub use self::transaction::{Action, SignaturePair, SignedTransaction, Transaction};

#[cfg(test)]
mod tests {
    use rand_core::OsRng;

    use keys::KeyPair;
    use primitives::Timestamp;

    use super::*;

    fn signed_transfer(pair: &KeyPair) -> SignedTransaction {
        let trx = Transaction {
            expiration: Timestamp::from_secs(60),
            ref_block_num: 1,
            ref_block_prefix: 0xCAFE,
            actions: vec![Action {
                name: "transfer".parse().unwrap(),
                domain: "cards".parse().unwrap(),
                key: "ace".parse().unwrap(),
                data: vec![1, 2, 3],
            }],
        };
        let id = trx.id();
        let signature = pair.sign(id.as_bytes());
        SignedTransaction {
            trx,
            signatures: vec![SignaturePair {
                public_key: pair.public,
                signature,
            }],
        }
    }

    #[test]
    fn it_distinguishes_id_and_signed_id() {
        let pair = KeyPair::generate(&mut OsRng);
        let signed = signed_transfer(&pair);

        assert_eq!(signed.id(), signed.trx.id());
        assert_ne!(signed.id(), signed.signed_id());

        let mut resigned = signed.clone();
        resigned.signatures.clear();
        assert_eq!(resigned.id(), signed.id());
        assert_ne!(resigned.signed_id(), signed.signed_id());
    }

    #[test]
    fn it_recovers_signer_keys() {
        let pair = KeyPair::generate(&mut OsRng);
        let meta = TransactionMetadata::new(signed_transfer(&pair));
        let keys = meta.recover_keys().unwrap();
        assert_eq!(keys.len(), 1);
        assert!(keys.contains(&pair.public));
    }

    #[test]
    fn it_rejects_a_tampered_signature() {
        let pair = KeyPair::generate(&mut OsRng);
        let other = KeyPair::generate(&mut OsRng);
        let mut signed = signed_transfer(&pair);
        signed.signatures[0].public_key = other.public;

        let meta = TransactionMetadata::new(signed);
        assert!(matches!(
            meta.recover_keys(),
            Err(TransactionError::InvalidSignature { .. })
        ));
    }

    #[test]
    fn it_verifies_tapos_pairs() {
        let pair = KeyPair::generate(&mut OsRng);
        let signed = signed_transfer(&pair);

        let mut id_bytes = [7u8; 32];
        id_bytes[0..4].copy_from_slice(&0x0001_0001u32.to_be_bytes());
        let summary_id = BlockId::from(id_bytes);
        let (num, prefix) = Transaction::tapos_of(&summary_id);

        // 0x10001 & 0xffff == 1.
        assert_eq!(num, 1);
        let mut trx = signed.trx.clone();
        trx.ref_block_num = num;
        trx.ref_block_prefix = prefix;
        assert!(trx.verify_reference_block(&summary_id));

        trx.ref_block_prefix = prefix.wrapping_add(1);
        assert!(!trx.verify_reference_block(&summary_id));
    }

    #[test]
    fn it_emits_accepted_exactly_once() {
        let pair = KeyPair::generate(&mut OsRng);
        let meta = TransactionMetadata::new(signed_transfer(&pair));
        assert!(meta.mark_accepted());
        assert!(!meta.mark_accepted());
    }
}
