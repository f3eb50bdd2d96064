//! The chain controller: sequences the block lifecycle, owns the pending
//! state, drives fork choice and keeps the two stores in lockstep.

mod fork;
mod lifecycle;
mod validation;

use std::collections::HashMap;
use std::sync::Arc;

use log::{info, warn};

use block::{BlockHeader, BlockId, SignedBlock, TransactionMetadata};
use hash::Sha256Hash;
use primitives::{BlockTimestamp, Name, ProducerSchedule, Timestamp};
use statedb::{DynamicGlobalPropertyObject, GlobalPropertyObject, StateStore};
use tokendb::TokenStore;
use utils::observer::{Notifier, Subscriber, SubscriberHandle};

use crate::block_log::BlockLog;
use crate::block_state::BlockState;
use crate::config::Config;
use crate::contracts::{self, ApplyHandler, ApplyHandlerMap};
use crate::error::ChainError;
use crate::events::ChainEvent;
use crate::fork_database::ForkDatabase;
use crate::pending::PendingState;

pub struct Controller {
    pub(crate) config: Config,
    pub(crate) state: StateStore,
    pub(crate) tokens: TokenStore,
    pub(crate) fork_db: ForkDatabase,
    pub(crate) blog: BlockLog,
    pub(crate) head: Arc<BlockState>,
    pub(crate) pending: Option<PendingState>,
    pub(crate) apply_handlers: ApplyHandlerMap,
    /// Transactions undone by `pop_block` or `abort_block`, keyed by
    /// signed id; entries leave when re-applied in another block or when
    /// they fail objectively. Producers drain this when filling blocks.
    pub(crate) unapplied_transactions: HashMap<Sha256Hash, Arc<TransactionMetadata>>,
    pub(crate) notifier: Notifier<ChainEvent>,
    pub(crate) replaying: bool,
}

impl Controller {
    /// Opens the stores and the block log, then either replays an
    /// existing log or initializes a fresh chain from the configured
    /// genesis.
    pub fn new(config: Config) -> Result<Self, ChainError> {
        let state = StateStore::open(&config.state_dir, config.read_only)?;
        let tokens = TokenStore::open(&config.token_db_dir)?;
        let blog = BlockLog::open(&config.block_log_dir)?;

        let genesis_state = Arc::new(BlockState::genesis(&config.genesis));
        let mut fork_db = ForkDatabase::new();
        fork_db.reset(genesis_state.clone());

        let mut controller = Controller {
            config,
            state,
            tokens,
            fork_db,
            blog,
            head: genesis_state,
            pending: None,
            apply_handlers: contracts::build_handlers(),
            unapplied_transactions: HashMap::new(),
            notifier: Notifier::new(),
            replaying: false,
        };
        controller.startup()?;
        Ok(controller)
    }

    fn startup(&mut self) -> Result<(), ChainError> {
        info!(
            "initializing chain {} from genesis state",
            self.config.genesis.compute_chain_id()
        );
        self.state.set_revision(self.head.block_num() as i64)?;
        self.initialize_database();

        // The stores must sit exactly at the head block; anything above is
        // a leftover pending state and gets unwound.
        while self.state.revision() > self.head.block_num() as i64 {
            warn!("state revision above head block, undoing pending changes");
            self.state.undo()?;
        }
        if self.state.revision() != self.head.block_num() as i64 {
            return Err(ChainError::RevisionMismatch {
                revision: self.state.revision(),
                head: self.head.block_num(),
            });
        }

        self.replay_block_log()
    }

    /// Seeds the property singletons and the slot of the genesis block in
    /// the summary ring. Runs outside any undo session, so the writes are
    /// permanent.
    fn initialize_database(&mut self) {
        let slot = (self.head.block_num() & 0xffff) as u16;
        self.state.set_block_summary(slot, self.head.id());
        let configuration = self.config.genesis.initial_configuration.clone();
        self.state.modify_global(|g| g.configuration = configuration);
    }

    fn replay_block_log(&mut self) -> Result<(), ChainError> {
        match self.blog.head_num() {
            Some(end) if end > 1 => {
                self.replaying = true;
                info!("existing block log, attempting to replay {} blocks", end);
                loop {
                    let next = match self.blog.read_block_by_num(self.head.block_num() + 1)? {
                        Some(block) => block,
                        None => break,
                    };
                    let num = next.block_num();
                    self.push_block(next, true)?;
                    if num % 100 == 0 {
                        info!("{:>10} of {} blocks replayed", num, end);
                    }
                }
                self.replaying = false;
                info!("replay complete, head is {}", self.head.block_num());
            }
            Some(_) => {}
            None => {
                let genesis_block = self.head.block.clone();
                self.blog.append(&genesis_block)?;
            }
        }
        Ok(())
    }

    /// Registers an event subscriber. Subscribers can never influence
    /// consensus: the notifier contains and disables any that panic.
    pub fn subscribe<S: Subscriber<ChainEvent> + 'static>(
        &mut self,
        subscriber: S,
    ) -> SubscriberHandle {
        self.notifier.register(subscriber)
    }

    pub fn unsubscribe(&mut self, handle: SubscriberHandle) {
        self.notifier.deregister(handle);
    }

    // --- head queries ---

    pub fn head_block_num(&self) -> u32 {
        self.head.block_num()
    }

    pub fn head_block_id(&self) -> BlockId {
        self.head.id()
    }

    pub fn head_block_time(&self) -> BlockTimestamp {
        self.head.timestamp()
    }

    pub fn head_block_producer(&self) -> Name {
        self.head.producer()
    }

    pub fn head_block_header(&self) -> &BlockHeader {
        &self.head.header_state.header
    }

    pub fn head_block_state(&self) -> Arc<BlockState> {
        self.head.clone()
    }

    pub fn pending_block_state(&self) -> Option<&BlockState> {
        self.pending.as_ref().map(|p| &p.block_state)
    }

    pub fn pending_block_time(&self) -> Result<Timestamp, ChainError> {
        self.pending
            .as_ref()
            .map(|p| p.block_state.timestamp().to_timestamp())
            .ok_or(ChainError::NoPendingBlock)
    }

    // --- irreversibility queries ---

    pub fn last_irreversible_block_num(&self) -> u32 {
        self.head
            .dpos_irreversible_blocknum()
            .max(self.head.bft_irreversible_blocknum())
    }

    pub fn last_irreversible_block_id(&mut self) -> Result<BlockId, ChainError> {
        let lib = self.last_irreversible_block_num();
        let summary = self.state.block_summary((lib & 0xffff) as u16);
        if BlockHeader::num_from_id(&summary) == lib {
            return Ok(summary);
        }
        self.fetch_block_by_number(lib)?
            .map(|b| b.id())
            .ok_or(ChainError::UnknownBlockNum(lib))
    }

    // --- block queries ---

    pub fn fetch_block_by_number(&mut self, num: u32) -> Result<Option<SignedBlock>, ChainError> {
        if let Some(bs) = self.fork_db.get_block_in_current_chain_by_num(num) {
            return Ok(Some(bs.block.clone()));
        }
        Ok(self.blog.read_block_by_num(num)?)
    }

    pub fn fetch_block_by_id(&mut self, id: BlockId) -> Result<Option<SignedBlock>, ChainError> {
        if let Some(bs) = self.fork_db.get_block(&id) {
            return Ok(Some(bs.block.clone()));
        }
        match self.fetch_block_by_number(BlockHeader::num_from_id(&id))? {
            Some(block) if block.id() == id => Ok(Some(block)),
            _ => Ok(None),
        }
    }

    pub fn get_block_id_for_num(&mut self, num: u32) -> Result<BlockId, ChainError> {
        if let Some(bs) = self.fork_db.get_block_in_current_chain_by_num(num) {
            return Ok(bs.id());
        }
        self.blog
            .read_block_by_num(num)?
            .map(|b| b.id())
            .ok_or(ChainError::UnknownBlockNum(num))
    }

    // --- property queries ---

    pub fn get_global_properties(&self) -> GlobalPropertyObject {
        self.state.global()
    }

    pub fn get_dynamic_global_properties(&self) -> DynamicGlobalPropertyObject {
        self.state.dynamic()
    }

    pub fn active_producers(&self) -> ProducerSchedule {
        match &self.pending {
            Some(p) => p.block_state.header_state.active_schedule.clone(),
            None => self.head.header_state.active_schedule.clone(),
        }
    }

    pub fn pending_producers(&self) -> ProducerSchedule {
        match &self.pending {
            Some(p) => p.block_state.header_state.pending_schedule.clone(),
            None => self.head.header_state.pending_schedule.clone(),
        }
    }

    pub fn proposed_producers(&self) -> Option<ProducerSchedule> {
        let gpo = self.state.global();
        gpo.proposed_schedule_block_num
            .map(|_| gpo.proposed_schedule)
    }

    // --- unapplied transactions ---

    pub fn unapplied_transactions(&self) -> Vec<Arc<TransactionMetadata>> {
        self.unapplied_transactions.values().cloned().collect()
    }

    pub fn drop_unapplied_transaction(&mut self, trx: &TransactionMetadata) {
        self.unapplied_transactions.remove(&trx.signed_id);
    }

    // --- collaborator access ---

    pub fn state_db(&self) -> &StateStore {
        &self.state
    }

    pub fn token_db(&self) -> &TokenStore {
        &self.tokens
    }

    pub fn fork_database(&self) -> &ForkDatabase {
        &self.fork_db
    }

    pub fn find_apply_handler(&self, name: Name) -> Option<&ApplyHandler> {
        self.apply_handlers.get(&name)
    }

    pub fn is_replaying(&self) -> bool {
        self.replaying
    }

    pub fn is_read_only(&self) -> bool {
        self.config.read_only
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.abort_block();
    }
}
