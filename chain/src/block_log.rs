//! Append-only on-disk sequence of finalized blocks.
//!
//! Frames are a little-endian u32 length followed by the postcard encoding
//! of the block. An in-memory offset index built at open time serves
//! `read_block_by_num`; consecutive entries must chain.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use log::info;
use thiserror::Error;

use block::{BlockId, SignedBlock};

#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum BlockLogError {
    #[error("block log io: {0}")]
    Io(String),
    #[error("block log encoding: {0}")]
    Codec(String),
    #[error("appended block {got} does not link to log head {expected}")]
    NonContiguous { expected: BlockId, got: BlockId },
}

impl From<std::io::Error> for BlockLogError {
    fn from(e: std::io::Error) -> Self {
        BlockLogError::Io(e.to_string())
    }
}

impl From<postcard::Error> for BlockLogError {
    fn from(e: postcard::Error) -> Self {
        BlockLogError::Codec(e.to_string())
    }
}

pub struct BlockLog {
    path: PathBuf,
    file: File,
    /// Byte offset of each frame, position i holding block
    /// `first_block_num + i`.
    offsets: Vec<u64>,
    first_block_num: u32,
    head: Option<SignedBlock>,
}

impl BlockLog {
    const FILE_NAME: &'static str = "blocks.log";

    pub fn open(dir: &Path) -> Result<Self, BlockLogError> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(Self::FILE_NAME);
        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)?;

        let mut log = BlockLog {
            path,
            offsets: Vec::new(),
            first_block_num: 0,
            head: None,
            file: file.try_clone()?,
        };
        log.scan(&mut file)?;
        if let Some(head) = &log.head {
            info!(
                "block log {} holds blocks {}..={}",
                log.path.display(),
                log.first_block_num,
                head.block_num()
            );
        }
        Ok(log)
    }

    fn scan(&mut self, file: &mut File) -> Result<(), BlockLogError> {
        let len = file.seek(SeekFrom::End(0))?;
        file.seek(SeekFrom::Start(0))?;

        let mut offset = 0u64;
        let mut last: Option<SignedBlock> = None;
        while offset < len {
            let block = Self::read_frame_at(file, offset)?;
            if self.offsets.is_empty() {
                self.first_block_num = block.block_num();
            }
            self.offsets.push(offset);
            let frame_len = 4 + Self::frame_body_len(file, offset)?;
            offset += frame_len;
            last = Some(block);
        }
        self.head = last;
        Ok(())
    }

    fn frame_body_len(file: &mut File, offset: u64) -> Result<u64, BlockLogError> {
        file.seek(SeekFrom::Start(offset))?;
        let mut len_bytes = [0u8; 4];
        file.read_exact(&mut len_bytes)?;
        Ok(u32::from_le_bytes(len_bytes) as u64)
    }

    fn read_frame_at(file: &mut File, offset: u64) -> Result<SignedBlock, BlockLogError> {
        file.seek(SeekFrom::Start(offset))?;
        let mut len_bytes = [0u8; 4];
        file.read_exact(&mut len_bytes)?;
        let len = u32::from_le_bytes(len_bytes) as usize;
        let mut body = vec![0u8; len];
        file.read_exact(&mut body)?;
        Ok(postcard::from_bytes(&body)?)
    }

    pub fn head(&self) -> Option<&SignedBlock> {
        self.head.as_ref()
    }

    pub fn head_num(&self) -> Option<u32> {
        self.head.as_ref().map(SignedBlock::block_num)
    }

    pub fn head_id(&self) -> Option<BlockId> {
        self.head.as_ref().map(SignedBlock::id)
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Appends one block; it must link onto the current log head.
    pub fn append(&mut self, block: &SignedBlock) -> Result<(), BlockLogError> {
        if let Some(head) = &self.head {
            if block.header.previous != head.id() {
                return Err(BlockLogError::NonContiguous {
                    expected: head.id(),
                    got: block.id(),
                });
            }
        }

        let body = postcard::to_allocvec(block)?;
        let offset = self.file.seek(SeekFrom::End(0))?;
        self.file.write_all(&(body.len() as u32).to_le_bytes())?;
        self.file.write_all(&body)?;
        self.file.flush()?;

        if self.offsets.is_empty() {
            self.first_block_num = block.block_num();
        }
        self.offsets.push(offset);
        self.head = Some(block.clone());
        Ok(())
    }

    pub fn read_block_by_num(&mut self, num: u32) -> Result<Option<SignedBlock>, BlockLogError> {
        if self.offsets.is_empty() || num < self.first_block_num {
            return Ok(None);
        }
        let index = (num - self.first_block_num) as usize;
        let offset = match self.offsets.get(index) {
            Some(offset) => *offset,
            None => return Ok(None),
        };
        Ok(Some(Self::read_frame_at(&mut self.file, offset)?))
    }
}

#[cfg(test)]
mod tests {
    use block::BlockHeader;
    use hash::Sha256Hash;
    use primitives::BlockTimestamp;

    use super::*;

    fn block(num: u32, previous: BlockId) -> SignedBlock {
        let mut header = BlockHeader::default();
        header.previous = previous;
        header.timestamp = BlockTimestamp::from_slot(num);
        debug_assert_eq!(header.block_num(), num);
        SignedBlock::new(header)
    }

    fn genesis_block() -> SignedBlock {
        block(1, Sha256Hash::zero())
    }

    #[test]
    fn it_appends_and_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = BlockLog::open(dir.path()).unwrap();
        assert!(log.is_empty());

        let b1 = genesis_block();
        log.append(&b1).unwrap();
        let b2 = block(2, b1.id());
        log.append(&b2).unwrap();

        assert_eq!(log.head_num(), Some(2));
        assert_eq!(log.read_block_by_num(1).unwrap().unwrap().id(), b1.id());
        assert_eq!(log.read_block_by_num(2).unwrap().unwrap().id(), b2.id());
        assert!(log.read_block_by_num(3).unwrap().is_none());
    }

    #[test]
    fn it_rejects_non_contiguous_appends() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = BlockLog::open(dir.path()).unwrap();
        let b1 = genesis_block();
        log.append(&b1).unwrap();

        let mut unrelated = [9u8; 32];
        unrelated[0..4].copy_from_slice(&2u32.to_be_bytes());
        let stray = block(3, BlockId::from(unrelated));
        assert!(matches!(
            log.append(&stray),
            Err(BlockLogError::NonContiguous { .. })
        ));
    }

    #[test]
    fn it_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let b1 = genesis_block();
        let b2 = block(2, b1.id());
        {
            let mut log = BlockLog::open(dir.path()).unwrap();
            log.append(&b1).unwrap();
            log.append(&b2).unwrap();
        }

        let mut log = BlockLog::open(dir.path()).unwrap();
        assert_eq!(log.head_num(), Some(2));
        assert_eq!(log.head_id(), Some(b2.id()));
        assert_eq!(log.read_block_by_num(1).unwrap().unwrap().id(), b1.id());
    }
}
