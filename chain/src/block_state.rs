//! Per-block derived state: schedules, confirmation counts and the two
//! irreversibility numbers.

use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use block::{BlockHeader, BlockId, SignedBlock, TransactionMetadata};
use hash::{Hash, Hasher, Sha256Hash, Sha256Hasher};
use keys::{PublicKey, Signature};
use primitives::{policy, BlockTimestamp, Genesis, Name, ProducerKey, ProducerSchedule};

use crate::error::ChainError;

fn schedule_digest(schedule: &ProducerSchedule) -> Sha256Hash {
    let bytes = postcard::to_allocvec(schedule).expect("schedules are serializable");
    bytes.hash()
}

/// An explicit producer attestation for one block. Enough of them raises
/// BFT irreversibility ahead of the DPoS count.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HeaderConfirmation {
    pub block_id: BlockId,
    pub producer: Name,
    pub producer_signature: Signature,
}

impl HeaderConfirmation {
    /// The digest a confirming producer signs.
    pub fn signing_digest(block_id: &BlockId, producer: Name) -> Sha256Hash {
        let mut hasher = Sha256Hasher::new();
        hasher
            .write_all(block_id.as_bytes())
            .and_then(|_| hasher.write_all(&producer.as_u64().to_le_bytes()))
            .expect("writing to a hasher cannot fail");
        hasher.finish()
    }
}

/// Everything derivable from a header given its parent's state.
#[derive(Clone, Debug)]
pub struct BlockHeaderState {
    pub id: BlockId,
    pub block_num: u32,
    pub header: BlockHeader,
    pub active_schedule: ProducerSchedule,
    pub pending_schedule: ProducerSchedule,
    pub pending_schedule_hash: Sha256Hash,
    /// Block number at which the pending schedule was installed; it
    /// promotes once that number is DPoS-irreversible.
    pub pending_schedule_lib_num: u32,
    pub dpos_irreversible_blocknum: u32,
    pub block_signing_key: PublicKey,
    /// Remaining confirmations needed per tracked ancestor, oldest first.
    /// The last entry covers this block itself.
    pub confirm_count: Vec<u8>,
    pub producer_to_last_produced: HashMap<Name, u32>,
}

impl BlockHeaderState {
    /// The genesis state: a single initial producer, schedules already in
    /// effect, the chain id seeding the action merkle root.
    pub fn genesis(genesis: &Genesis) -> Self {
        let initial_schedule = ProducerSchedule::new(
            0,
            vec![ProducerKey {
                producer_name: Name::from_static("veris"),
                signing_key: genesis.initial_key,
            }],
        );

        let mut header = BlockHeader::default();
        header.timestamp = genesis.initial_timestamp;
        header.producer = Name::from_static("veris");
        header.action_mroot = genesis.compute_chain_id();

        let id = header.id();
        let block_num = header.block_num();

        BlockHeaderState {
            id,
            block_num,
            pending_schedule_hash: schedule_digest(&initial_schedule),
            pending_schedule_lib_num: 0,
            dpos_irreversible_blocknum: block_num,
            block_signing_key: genesis.initial_key,
            confirm_count: Vec::new(),
            producer_to_last_produced: HashMap::new(),
            active_schedule: initial_schedule.clone(),
            pending_schedule: initial_schedule,
            header,
        }
    }

    /// The state a block produced at `when` on top of this one starts
    /// from. Fails when `when` does not advance past this block's slot.
    pub fn generate_next(&self, when: BlockTimestamp) -> Result<BlockHeaderState, ChainError> {
        if when <= self.header.timestamp {
            return Err(ChainError::TimestampNotLater);
        }

        let producer = self.active_schedule.scheduled_producer(when).clone();

        let mut header = BlockHeader::default();
        header.previous = self.id;
        header.timestamp = when;
        header.producer = producer.producer_name;
        header.schedule_version = self.active_schedule.version;

        let block_num = self.block_num + 1;

        let mut producer_to_last_produced = self.producer_to_last_produced.clone();
        producer_to_last_produced.insert(producer.producer_name, block_num);

        let mut confirm_count = self.confirm_count.clone();
        if confirm_count.len() < policy::MAX_TRACKED_DPOS_CONFIRMATIONS {
            confirm_count.push(policy::required_confirmations(
                self.active_schedule.producers.len(),
            ));
        }

        Ok(BlockHeaderState {
            id: BlockId::zero(),
            block_num,
            header,
            active_schedule: self.active_schedule.clone(),
            pending_schedule: self.pending_schedule.clone(),
            pending_schedule_hash: self.pending_schedule_hash,
            pending_schedule_lib_num: self.pending_schedule_lib_num,
            dpos_irreversible_blocknum: self.dpos_irreversible_blocknum,
            block_signing_key: producer.signing_key,
            confirm_count,
            producer_to_last_produced,
        })
    }

    /// Applies this block's confirmation count to the tracked ancestors.
    /// The entry that reaches zero becomes the new DPoS-irreversible block
    /// and everything older stops being tracked.
    pub fn set_confirmed(&mut self, num_prev_blocks: u16) {
        self.header.confirmed = num_prev_blocks;

        let mut blocks_to_confirm = num_prev_blocks as u32 + 1; // confirm this block too
        let mut i = self.confirm_count.len();
        while i > 0 && blocks_to_confirm > 0 {
            i -= 1;
            self.confirm_count[i] = self.confirm_count[i].saturating_sub(1);
            if self.confirm_count[i] == 0 {
                let block_num_for_i = self.block_num - (self.confirm_count.len() - 1 - i) as u32;
                self.dpos_irreversible_blocknum = block_num_for_i;
                self.confirm_count.drain(..=i);
                return;
            }
            blocks_to_confirm -= 1;
        }
    }

    /// Promotes the pending schedule to active once the block that
    /// installed it is DPoS-irreversible. Returns whether a promotion
    /// happened.
    pub fn maybe_promote_pending(&mut self) -> bool {
        if self.pending_schedule.is_empty()
            || self.dpos_irreversible_blocknum < self.pending_schedule_lib_num
        {
            return false;
        }

        let new_active = std::mem::take(&mut self.pending_schedule);

        // Producers joining the set count as having last produced here,
        // producers leaving it are forgotten.
        self.producer_to_last_produced
            .retain(|name, _| new_active.producers.iter().any(|p| p.producer_name == *name));
        for producer in &new_active.producers {
            self.producer_to_last_produced
                .entry(producer.producer_name)
                .or_insert(self.block_num);
        }

        self.header.schedule_version = new_active.version;
        self.active_schedule = new_active;
        true
    }

    /// Installs a new pending schedule and announces it in the header.
    pub fn set_new_producers(&mut self, schedule: ProducerSchedule) -> Result<(), ChainError> {
        if !self.pending_schedule.is_empty() {
            return Err(ChainError::PendingSchedulePresent);
        }
        if schedule.version != self.active_schedule.version + 1 {
            return Err(ChainError::ScheduleVersionMismatch {
                expected: self.active_schedule.version + 1,
                got: schedule.version,
            });
        }
        self.pending_schedule_hash = schedule_digest(&schedule);
        self.pending_schedule_lib_num = self.block_num;
        self.header.new_producers = Some(schedule.clone());
        self.pending_schedule = schedule;
        Ok(())
    }

    /// Validates a received header against this state and derives the
    /// successor state. `trust` skips the producer signature check for
    /// blocks we validated before (replay, reorg reversal).
    pub fn next(
        &self,
        header: &BlockHeader,
        signature: &Signature,
        trust: bool,
    ) -> Result<BlockHeaderState, ChainError> {
        let mut result = self.generate_next(header.timestamp)?;

        if header.producer != result.header.producer {
            return Err(ChainError::WrongProducer {
                expected: result.header.producer,
                got: header.producer,
            });
        }

        // A producer cannot confirm blocks at or before its own last
        // produced block a second time.
        if let Some(&last_produced) = self.producer_to_last_produced.get(&header.producer) {
            if header.confirmed as u32 + last_produced >= result.block_num {
                return Err(ChainError::ProducerDoubleConfirm(header.producer));
            }
        }

        result.set_confirmed(header.confirmed);
        let was_promoted = result.maybe_promote_pending();
        if let Some(new_producers) = &header.new_producers {
            if was_promoted {
                return Err(ChainError::PendingSchedulePresent);
            }
            result.set_new_producers(new_producers.clone())?;
        }

        if header.schedule_version != result.header.schedule_version {
            return Err(ChainError::ScheduleVersionMismatch {
                expected: result.header.schedule_version,
                got: header.schedule_version,
            });
        }

        if !trust
            && !result
                .block_signing_key
                .verify(signature, header.digest().as_bytes())
        {
            return Err(ChainError::InvalidProducerSignature);
        }

        result.header = header.clone();
        result.id = result.header.id();
        Ok(result)
    }

    /// Produces the signature via the callback and installs it. The
    /// callback gets the header digest and nothing else; the signature is
    /// not inspected beyond the copy.
    pub fn sign(&self, signer: impl FnOnce(&Sha256Hash) -> Signature) -> Signature {
        signer(&self.header.digest())
    }
}

/// A validated (or in-flight pending) block and its derived state. Shared
/// between the fork database and the controller head; the mutable corners
/// are the bookkeeping flags, the confirmation list and the applied
/// transaction metadata.
#[derive(Debug)]
pub struct BlockState {
    pub header_state: BlockHeaderState,
    pub block: SignedBlock,
    validated: AtomicBool,
    in_current_chain: AtomicBool,
    bft_irreversible_blocknum: AtomicU32,
    confirmations: Mutex<Vec<HeaderConfirmation>>,
    trxs: Mutex<Vec<Arc<TransactionMetadata>>>,
}

impl BlockState {
    pub fn genesis(genesis: &Genesis) -> Self {
        let header_state = BlockHeaderState::genesis(genesis);
        let block = SignedBlock::new(header_state.header.clone());
        BlockState {
            header_state,
            block,
            validated: AtomicBool::new(true),
            in_current_chain: AtomicBool::new(true),
            bft_irreversible_blocknum: AtomicU32::new(0),
            confirmations: Mutex::new(Vec::new()),
            trxs: Mutex::new(Vec::new()),
        }
    }

    /// A fresh pending block on top of `prev`.
    pub fn generate(prev: &BlockState, when: BlockTimestamp) -> Result<Self, ChainError> {
        let header_state = prev.header_state.generate_next(when)?;
        let block = SignedBlock::new(header_state.header.clone());
        Ok(BlockState {
            header_state,
            block,
            validated: AtomicBool::new(false),
            in_current_chain: AtomicBool::new(false),
            bft_irreversible_blocknum: AtomicU32::new(prev.bft_irreversible_blocknum()),
            confirmations: Mutex::new(Vec::new()),
            trxs: Mutex::new(Vec::new()),
        })
    }

    /// Wraps a received block, validating its header against the parent
    /// state.
    pub fn from_signed_block(
        prev: &BlockState,
        block: SignedBlock,
        trust: bool,
    ) -> Result<Self, ChainError> {
        let header_state =
            prev.header_state
                .next(&block.header, &block.producer_signature, trust)?;
        Ok(BlockState {
            header_state,
            block,
            validated: AtomicBool::new(trust),
            in_current_chain: AtomicBool::new(false),
            bft_irreversible_blocknum: AtomicU32::new(prev.bft_irreversible_blocknum()),
            confirmations: Mutex::new(Vec::new()),
            trxs: Mutex::new(Vec::new()),
        })
    }

    pub fn id(&self) -> BlockId {
        self.header_state.id
    }

    pub fn block_num(&self) -> u32 {
        self.header_state.block_num
    }

    pub fn previous(&self) -> BlockId {
        self.header_state.header.previous
    }

    pub fn timestamp(&self) -> BlockTimestamp {
        self.header_state.header.timestamp
    }

    pub fn producer(&self) -> Name {
        self.header_state.header.producer
    }

    pub fn dpos_irreversible_blocknum(&self) -> u32 {
        self.header_state.dpos_irreversible_blocknum
    }

    pub fn bft_irreversible_blocknum(&self) -> u32 {
        self.bft_irreversible_blocknum.load(Ordering::SeqCst)
    }

    pub(crate) fn raise_bft_irreversible_blocknum(&self, num: u32) {
        self.bft_irreversible_blocknum
            .fetch_max(num, Ordering::SeqCst);
    }

    /// The block number below which nothing on this branch can revert.
    pub fn irreversibility_threshold(&self) -> u32 {
        self.dpos_irreversible_blocknum()
            .max(self.bft_irreversible_blocknum())
    }

    pub fn is_validated(&self) -> bool {
        self.validated.load(Ordering::SeqCst)
    }

    pub(crate) fn set_validated(&self, validated: bool) {
        self.validated.store(validated, Ordering::SeqCst);
    }

    pub fn is_in_current_chain(&self) -> bool {
        self.in_current_chain.load(Ordering::SeqCst)
    }

    pub(crate) fn set_in_current_chain(&self, in_chain: bool) {
        self.in_current_chain.store(in_chain, Ordering::SeqCst);
    }

    pub fn trxs(&self) -> Vec<Arc<TransactionMetadata>> {
        self.trxs.lock().clone()
    }

    pub(crate) fn set_trxs(&self, trxs: Vec<Arc<TransactionMetadata>>) {
        *self.trxs.lock() = trxs;
    }

    pub(crate) fn push_trx(&self, trx: Arc<TransactionMetadata>) {
        self.trxs.lock().push(trx);
    }

    pub(crate) fn truncate_trxs(&self, len: usize) {
        self.trxs.lock().truncate(len);
    }

    pub fn confirmation_count(&self) -> usize {
        self.confirmations.lock().len()
    }

    /// Validates and records one producer confirmation; returns the new
    /// confirmation count.
    pub(crate) fn add_confirmation(
        &self,
        confirmation: HeaderConfirmation,
    ) -> Result<usize, ChainError> {
        let signing_key = self
            .header_state
            .active_schedule
            .signing_key_of(confirmation.producer)
            .ok_or(ChainError::ConfirmationUnknownProducer(
                confirmation.producer,
            ))?;

        let digest = HeaderConfirmation::signing_digest(&self.id(), confirmation.producer);
        if !signing_key.verify(&confirmation.producer_signature, digest.as_bytes()) {
            return Err(ChainError::InvalidConfirmationSignature(
                confirmation.producer,
            ));
        }

        let mut confirmations = self.confirmations.lock();
        if confirmations
            .iter()
            .any(|c| c.producer == confirmation.producer)
        {
            return Err(ChainError::DuplicateConfirmation(confirmation.producer));
        }
        confirmations.push(confirmation);
        Ok(confirmations.len())
    }
}
