//! In-memory DAG of candidate chain branches.
//!
//! Head selection follows the longest-valid-branch rule with deterministic
//! tie-breaks: higher DPoS-irreversible number, then higher block number,
//! then earlier timestamp, then smaller id. Blocks below the best validated
//! head's irreversibility threshold are pruned; the ones on the current
//! chain queue up for the controller to drain and feed into the
//! irreversible log, the rest are dead forks and are dropped.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use log::debug;

use block::{BlockId, SignedBlock};

use crate::block_state::{BlockState, HeaderConfirmation};
use crate::error::ChainError;
use primitives::policy;

pub struct ForkDatabase {
    index: HashMap<BlockId, Arc<BlockState>>,
    by_num: BTreeMap<u32, Vec<BlockId>>,
    newly_irreversible: VecDeque<Arc<BlockState>>,
}

fn fork_order_key(bs: &BlockState) -> (u32, u32, Reverse<u32>, Reverse<BlockId>) {
    (
        bs.dpos_irreversible_blocknum(),
        bs.block_num(),
        Reverse(bs.timestamp().slot()),
        Reverse(bs.id()),
    )
}

impl ForkDatabase {
    pub fn new() -> Self {
        ForkDatabase {
            index: HashMap::new(),
            by_num: BTreeMap::new(),
            newly_irreversible: VecDeque::new(),
        }
    }

    /// Installs the initial (genesis or replayed) root state.
    pub fn reset(&mut self, root: Arc<BlockState>) {
        self.index.clear();
        self.by_num.clear();
        self.newly_irreversible.clear();
        self.insert(root);
    }

    fn insert(&mut self, bs: Arc<BlockState>) {
        self.by_num.entry(bs.block_num()).or_default().push(bs.id());
        self.index.insert(bs.id(), bs);
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// The best known block, validated or not; a freshly added candidate
    /// must win this ordering before the controller tries to apply it.
    pub fn head(&self) -> Option<Arc<BlockState>> {
        self.index
            .values()
            .max_by_key(|bs| fork_order_key(bs))
            .cloned()
    }

    fn best_validated(&self) -> Option<Arc<BlockState>> {
        self.index
            .values()
            .filter(|bs| bs.is_validated())
            .max_by_key(|bs| fork_order_key(bs))
            .cloned()
    }

    /// Validates a received block against its parent and inserts it.
    pub fn add_block(
        &mut self,
        block: SignedBlock,
        trust: bool,
    ) -> Result<Arc<BlockState>, ChainError> {
        let id = block.id();
        if self.index.contains_key(&id) {
            return Err(ChainError::BlockAlreadyKnown(id));
        }
        let prev = self
            .index
            .get(&block.header.previous)
            .cloned()
            .ok_or(ChainError::UnlinkableBlock(id))?;

        let bs = Arc::new(BlockState::from_signed_block(&prev, block, trust)?);
        self.insert(bs.clone());
        self.advance_irreversibility();
        Ok(bs)
    }

    /// Inserts an already validated block state (the production path).
    pub fn add_state(&mut self, bs: Arc<BlockState>) -> Result<Arc<BlockState>, ChainError> {
        if self.index.contains_key(&bs.id()) {
            return Err(ChainError::BlockAlreadyKnown(bs.id()));
        }
        if !self.index.contains_key(&bs.previous()) {
            return Err(ChainError::UnlinkableBlock(bs.id()));
        }
        self.insert(bs.clone());
        self.advance_irreversibility();
        Ok(bs)
    }

    /// Records a producer confirmation; may raise BFT irreversibility of
    /// the block and its descendants.
    pub fn add_confirmation(
        &mut self,
        confirmation: HeaderConfirmation,
    ) -> Result<Arc<BlockState>, ChainError> {
        let bs = self
            .index
            .get(&confirmation.block_id)
            .cloned()
            .ok_or(ChainError::UnknownBlock(confirmation.block_id))?;

        let count = bs.add_confirmation(confirmation)?;
        let required =
            policy::required_confirmations(bs.header_state.active_schedule.producers.len());
        if count >= required as usize && bs.bft_irreversible_blocknum() < bs.block_num() {
            self.raise_bft_irreversible(&bs);
        }
        self.advance_irreversibility();
        Ok(bs)
    }

    fn raise_bft_irreversible(&mut self, bs: &Arc<BlockState>) {
        let num = bs.block_num();
        bs.raise_bft_irreversible_blocknum(num);

        // Propagate forward along every branch that contains this block.
        let mut on_branch: HashSet<BlockId> = HashSet::new();
        on_branch.insert(bs.id());
        for (_, ids) in self.by_num.range(num + 1..) {
            for id in ids {
                if let Some(descendant) = self.index.get(id) {
                    if on_branch.contains(&descendant.previous()) {
                        descendant.raise_bft_irreversible_blocknum(num);
                        on_branch.insert(*id);
                    }
                }
            }
        }
    }

    pub fn get_block(&self, id: &BlockId) -> Option<Arc<BlockState>> {
        self.index.get(id).cloned()
    }

    pub fn get_block_in_current_chain_by_num(&self, num: u32) -> Option<Arc<BlockState>> {
        self.by_num.get(&num).and_then(|ids| {
            ids.iter()
                .filter_map(|id| self.index.get(id))
                .find(|bs| bs.is_in_current_chain())
                .cloned()
        })
    }

    pub fn mark_in_current_chain(&self, bs: &Arc<BlockState>, in_chain: bool) {
        bs.set_in_current_chain(in_chain);
    }

    /// Marking a block invalid removes it from the index entirely, so it
    /// can never be selected as head again.
    pub fn set_validity(&mut self, bs: &Arc<BlockState>, valid: bool) {
        if valid {
            bs.set_validated(true);
            self.advance_irreversibility();
        } else {
            self.index.remove(&bs.id());
            if let Some(ids) = self.by_num.get_mut(&bs.block_num()) {
                ids.retain(|id| *id != bs.id());
                if ids.is_empty() {
                    self.by_num.remove(&bs.block_num());
                }
            }
        }
    }

    /// Walks both ids back to their common ancestor. Both branches come
    /// back tip-first, ending with the first block after the ancestor, so
    /// iterating one forward is pop order and iterating the other in
    /// reverse is replay order.
    pub fn fetch_branch_from(
        &self,
        first_id: BlockId,
        second_id: BlockId,
    ) -> Result<(Vec<Arc<BlockState>>, Vec<Arc<BlockState>>), ChainError> {
        let lookup = |id: &BlockId| -> Result<Arc<BlockState>, ChainError> {
            self.get_block(id).ok_or(ChainError::UnknownBlock(*id))
        };

        let mut first = lookup(&first_id)?;
        let mut second = lookup(&second_id)?;
        let mut first_branch = Vec::new();
        let mut second_branch = Vec::new();

        while first.block_num() > second.block_num() {
            first_branch.push(first.clone());
            first = lookup(&first.previous())?;
        }
        while second.block_num() > first.block_num() {
            second_branch.push(second.clone());
            second = lookup(&second.previous())?;
        }
        while first.id() != second.id() {
            first_branch.push(first.clone());
            second_branch.push(second.clone());
            first = lookup(&first.previous())?;
            second = lookup(&second.previous())?;
        }

        Ok((first_branch, second_branch))
    }

    /// Prunes everything below the best validated head's irreversibility
    /// threshold. Pruned blocks on the current chain queue up for the
    /// controller; pruned forks are gone.
    fn advance_irreversibility(&mut self) {
        let lib = match self.best_validated() {
            Some(head) => head.irreversibility_threshold(),
            None => return,
        };

        loop {
            let num = match self.by_num.keys().next() {
                Some(&num) if num < lib => num,
                _ => break,
            };
            let ids = self.by_num.remove(&num).unwrap_or_default();
            for id in ids {
                if let Some(bs) = self.index.remove(&id) {
                    if bs.is_in_current_chain() {
                        self.newly_irreversible.push_back(bs);
                    } else {
                        debug!("discarding forked block {} at height {}", id, num);
                    }
                }
            }
        }
    }

    /// Hands the blocks that crossed the irreversibility threshold to the
    /// caller, oldest first.
    pub fn drain_irreversible(&mut self) -> Vec<Arc<BlockState>> {
        self.newly_irreversible.drain(..).collect()
    }
}

impl Default for ForkDatabase {
    fn default() -> Self {
        ForkDatabase::new()
    }
}
