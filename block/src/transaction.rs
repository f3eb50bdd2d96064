use std::fmt;
use std::io;

use serde::{Deserialize, Serialize};

use hash::{Hash, SerializeContent, Sha256Hash};
use keys::{PublicKey, Signature};
use primitives::{Name, Name128, Timestamp};

use crate::content;
use crate::BlockId;

/// One unit of work: `name` selects the apply handler, `(domain, key,
/// name)` selects the authority that must sign off, `data` is the
/// handler-specific payload.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Action {
    pub name: Name,
    pub domain: Name128,
    pub key: Name128,
    pub data: Vec<u8>,
}

impl Action {
    pub fn digest(&self) -> Sha256Hash {
        self.hash()
    }
}

impl SerializeContent for Action {
    fn serialize_content<W: io::Write>(&self, writer: &mut W) -> io::Result<usize> {
        let mut size = 0;
        size += content::write_u64(writer, self.name.as_u64())?;
        writer.write_all(self.domain.as_bytes())?;
        writer.write_all(self.key.as_bytes())?;
        size += 2 * Name128::SIZE;
        size += content::write_bytes(writer, &self.data)?;
        Ok(size)
    }
}

impl Hash for Action {}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}@{}/{}", self.name, self.domain, self.key)
    }
}

/// The unsigned transaction body. `ref_block_num`/`ref_block_prefix` bind
/// it to a recent block id (TaPoS), `expiration` bounds how long it stays
/// applicable.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Transaction {
    pub expiration: Timestamp,
    pub ref_block_num: u16,
    pub ref_block_prefix: u32,
    pub actions: Vec<Action>,
}

impl Transaction {
    /// The summary slot and id prefix a transaction must carry to
    /// reference the given block.
    pub fn tapos_of(id: &BlockId) -> (u16, u32) {
        let num = crate::BlockHeader::num_from_id(id);
        ((num & 0xffff) as u16, Self::prefix_of(id))
    }

    fn prefix_of(id: &BlockId) -> u32 {
        let bytes = id.as_bytes();
        u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]])
    }

    /// TaPoS check against the id stored in the block-summary ring.
    pub fn verify_reference_block(&self, summary_id: &BlockId) -> bool {
        let num = crate::BlockHeader::num_from_id(summary_id);
        self.ref_block_num == (num & 0xffff) as u16
            && self.ref_block_prefix == Self::prefix_of(summary_id)
    }

    pub fn id(&self) -> Sha256Hash {
        self.hash()
    }
}

impl SerializeContent for Transaction {
    fn serialize_content<W: io::Write>(&self, writer: &mut W) -> io::Result<usize> {
        let mut size = 0;
        size += content::write_u64(writer, self.expiration.as_millis())?;
        size += content::write_u16(writer, self.ref_block_num)?;
        size += content::write_u32(writer, self.ref_block_prefix)?;
        size += content::write_u32(writer, self.actions.len() as u32)?;
        for action in &self.actions {
            size += action.serialize_content(writer)?;
        }
        Ok(size)
    }
}

impl Hash for Transaction {}

/// A signature together with the key that produced it. Ed25519 offers no
/// key recovery, so the signer travels with the signature and
/// [`crate::TransactionMetadata::recover_keys`] verifies the pair.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct SignaturePair {
    pub public_key: PublicKey,
    pub signature: Signature,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct SignedTransaction {
    pub trx: Transaction,
    pub signatures: Vec<SignaturePair>,
}

impl SignedTransaction {
    pub fn id(&self) -> Sha256Hash {
        self.trx.id()
    }

    /// The digest that also commits to the signatures; keys
    /// `unapplied_transactions`.
    pub fn signed_id(&self) -> Sha256Hash {
        self.hash()
    }
}

impl SerializeContent for SignedTransaction {
    fn serialize_content<W: io::Write>(&self, writer: &mut W) -> io::Result<usize> {
        let mut size = self.trx.serialize_content(writer)?;
        size += content::write_u32(writer, self.signatures.len() as u32)?;
        for pair in &self.signatures {
            writer.write_all(pair.public_key.as_bytes())?;
            writer.write_all(&pair.signature.to_bytes())?;
            size += PublicKey::SIZE + Signature::SIZE;
        }
        Ok(size)
    }
}

impl Hash for SignedTransaction {}
