use std::fmt;
use std::io;

use serde::{Deserialize, Serialize};

use hash::{Hash, SerializeContent, Sha256Hash};
use keys::PublicKey;
use primitives::{BlockTimestamp, Name, ProducerSchedule};

use crate::content;
use crate::BlockId;

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct BlockHeader {
    pub previous: BlockId,
    pub timestamp: BlockTimestamp,
    pub producer: Name,
    /// How many prior blocks this header confirms on behalf of its
    /// producer.
    pub confirmed: u16,
    pub action_mroot: Sha256Hash,
    pub transaction_mroot: Sha256Hash,
    pub schedule_version: u32,
    pub new_producers: Option<ProducerSchedule>,
}

impl BlockHeader {
    /// Block number baked into the first four bytes of every block id.
    pub fn num_from_id(id: &BlockId) -> u32 {
        let bytes = id.as_bytes();
        u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    pub fn block_num(&self) -> u32 {
        Self::num_from_id(&self.previous) + 1
    }

    /// Digest over the full header; this is what producers sign.
    pub fn digest(&self) -> Sha256Hash {
        self.hash()
    }

    /// The block id: the header digest with the leading four bytes
    /// replaced by the block number, so ids order by height and the
    /// number can be read back without a lookup.
    pub fn id(&self) -> BlockId {
        let digest = self.digest();
        let mut bytes = *digest.as_bytes();
        bytes[0..4].copy_from_slice(&self.block_num().to_be_bytes());
        BlockId::from(bytes)
    }
}

impl SerializeContent for BlockHeader {
    fn serialize_content<W: io::Write>(&self, writer: &mut W) -> io::Result<usize> {
        let mut size = 0;
        size += self.previous.serialize_content(writer)?;
        size += content::write_u32(writer, self.timestamp.slot())?;
        size += content::write_u64(writer, self.producer.as_u64())?;
        size += content::write_u16(writer, self.confirmed)?;
        size += self.action_mroot.serialize_content(writer)?;
        size += self.transaction_mroot.serialize_content(writer)?;
        size += content::write_u32(writer, self.schedule_version)?;
        match &self.new_producers {
            None => {
                size += content::write_u8(writer, 0)?;
            }
            Some(schedule) => {
                size += content::write_u8(writer, 1)?;
                size += content::write_u32(writer, schedule.version)?;
                size += content::write_u32(writer, schedule.producers.len() as u32)?;
                for producer in &schedule.producers {
                    size += content::write_u64(writer, producer.producer_name.as_u64())?;
                    writer.write_all(producer.signing_key.as_bytes())?;
                    size += PublicKey::SIZE;
                }
            }
        }
        Ok(size)
    }
}

impl Hash for BlockHeader {}

impl fmt::Display for BlockHeader {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "[#{} by {} at {}]",
            self.block_num(),
            self.producer,
            self.timestamp
        )
    }
}
