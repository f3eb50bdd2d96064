use std::io;

use serde::{Deserialize, Serialize};

use hash::{Hash, SerializeContent, Sha256Hash};
use keys::Signature;

use crate::content;
use crate::header::BlockHeader;
use crate::transaction::SignedTransaction;
use crate::BlockId;

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[repr(u8)]
pub enum TransactionStatus {
    Executed = 0,
    SoftFail = 1,
    HardFail = 2,
}

/// A transaction as recorded inside a block.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct TransactionReceipt {
    pub status: TransactionStatus,
    pub trx: SignedTransaction,
}

impl TransactionReceipt {
    pub fn executed(trx: SignedTransaction) -> Self {
        TransactionReceipt {
            status: TransactionStatus::Executed,
            trx,
        }
    }

    pub fn digest(&self) -> Sha256Hash {
        self.hash()
    }
}

impl SerializeContent for TransactionReceipt {
    fn serialize_content<W: io::Write>(&self, writer: &mut W) -> io::Result<usize> {
        let mut size = content::write_u8(writer, self.status as u8)?;
        size += self.trx.serialize_content(writer)?;
        Ok(size)
    }
}

impl Hash for TransactionReceipt {}

/// Reserved extension slot; the controller rejects blocks that carry any.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Extension {
    pub kind: u16,
    pub data: Vec<u8>,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct SignedBlock {
    pub header: BlockHeader,
    pub producer_signature: Signature,
    pub transactions: Vec<TransactionReceipt>,
    pub extensions: Vec<Extension>,
}

impl SignedBlock {
    pub fn new(header: BlockHeader) -> Self {
        SignedBlock {
            header,
            producer_signature: Signature::default(),
            transactions: Vec::new(),
            extensions: Vec::new(),
        }
    }

    pub fn id(&self) -> BlockId {
        self.header.id()
    }

    pub fn block_num(&self) -> u32 {
        self.header.block_num()
    }
}
