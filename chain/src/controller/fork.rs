//! Fork choice: pushing blocks and confirmations, switching branches,
//! popping blocks and advancing the irreversible log.

use std::sync::Arc;

use log::{error, info, warn};

use block::{SignedBlock, TransactionMetadata};

use crate::block_state::{BlockState, HeaderConfirmation};
use crate::error::ChainError;
use crate::events::ChainEvent;
use crate::transaction_context::TrxOutcome;

use super::Controller;

impl Controller {
    /// Feeds a block received from the outside into the fork database and
    /// follows whatever head the fork choice picks.
    pub fn push_block(&mut self, block: SignedBlock, trust: bool) -> Result<(), ChainError> {
        if self.pending.is_some() {
            return Err(ChainError::PendingBlockExists);
        }
        let new_bs = self.fork_db.add_block(block, trust)?;
        self.notifier
            .notify(&ChainEvent::AcceptedBlockHeader(new_bs));
        self.maybe_switch_forks(trust)?;
        self.process_irreversible()
    }

    /// Records a producer confirmation; BFT irreversibility may move a
    /// branch ahead, so fork choice runs afterwards.
    pub fn push_confirmation(
        &mut self,
        confirmation: HeaderConfirmation,
    ) -> Result<(), ChainError> {
        if self.pending.is_some() {
            return Err(ChainError::PendingBlockExists);
        }
        self.fork_db.add_confirmation(confirmation.clone())?;
        self.notifier
            .notify(&ChainEvent::AcceptedConfirmation(confirmation));
        self.maybe_switch_forks(false)?;
        self.process_irreversible()
    }

    /// Replays a block through the full lifecycle on top of the current
    /// head. On success the applied transaction metadata is returned so
    /// the caller can attach it to the fork-database state; on failure the
    /// pending block is aborted and the error propagates.
    pub(crate) fn apply_block(
        &mut self,
        block: &SignedBlock,
        _trust: bool,
    ) -> Result<Vec<Arc<TransactionMetadata>>, ChainError> {
        match self.apply_block_inner(block) {
            Ok(trxs) => Ok(trxs),
            Err(e) => {
                error!("failed to apply block {}: {}", block.id(), e);
                self.abort_block();
                Err(e)
            }
        }
    }

    fn apply_block_inner(
        &mut self,
        block: &SignedBlock,
    ) -> Result<Vec<Arc<TransactionMetadata>>, ChainError> {
        if !block.extensions.is_empty() {
            return Err(ChainError::UnsupportedExtension);
        }

        self.start_block(block.header.timestamp, block.header.confirmed)?;

        // A schedule change travels in the header. When our own proposal
        // staging did not produce the same pending schedule, adopt the
        // header's announcement; a conflicting one fails the id check
        // below.
        if let Some(new_producers) = &block.header.new_producers {
            let pending = self.pending.as_mut().ok_or(ChainError::NoPendingBlock)?;
            let header_state = &mut pending.block_state.header_state;
            if header_state.header.new_producers.is_none() {
                header_state.set_new_producers(new_producers.clone())?;
            }
        }

        for receipt in &block.transactions {
            let meta = Arc::new(TransactionMetadata::new(receipt.trx.clone()));
            let trace = self.push_transaction(meta, None, false)?;
            match &trace.outcome {
                TrxOutcome::Executed { .. } => {}
                TrxOutcome::Failed(e) | TrxOutcome::Deferred(e) => return Err(e.clone()),
            }
        }

        self.finalize_block()?;

        {
            let pending = self.pending.as_ref().ok_or(ChainError::NoPendingBlock)?;
            let header = &pending.block_state.header_state.header;
            if header.action_mroot != block.header.action_mroot {
                return Err(ChainError::MerkleMismatch { kind: "action" });
            }
            if header.transaction_mroot != block.header.transaction_mroot {
                return Err(ChainError::MerkleMismatch {
                    kind: "transaction",
                });
            }
        }

        // No re-signing: the block's own producer signature is installed.
        let signature = block.producer_signature;
        self.sign_block(move |_digest| signature)?;

        {
            let pending = self.pending.as_ref().ok_or(ChainError::NoPendingBlock)?;
            let computed = pending.block_state.header_state.id;
            if computed != block.id() {
                return Err(ChainError::UnexpectedBlockId {
                    received: block.id(),
                    computed,
                });
            }
        }

        self.do_commit_block(false)
    }

    /// Follows the fork database's head: extends in place on the fast
    /// path, otherwise pops back to the common ancestor and replays the
    /// other branch. Any failure during a reorg rewinds to the original
    /// head before the error propagates.
    pub(crate) fn maybe_switch_forks(&mut self, trust: bool) -> Result<(), ChainError> {
        let new_head = self.fork_db.head().ok_or(ChainError::ForkSwitchDesync)?;

        if new_head.previous() == self.head.id() {
            let block = new_head.block.clone();
            match self.apply_block(&block, trust) {
                Ok(trxs) => {
                    new_head.set_trxs(trxs);
                    self.fork_db.mark_in_current_chain(&new_head, true);
                    self.fork_db.set_validity(&new_head, true);
                    self.head = new_head;
                }
                Err(e) => {
                    // Removing the block from the index also removes it
                    // from head contention.
                    self.fork_db.set_validity(&new_head, false);
                    return Err(e);
                }
            }
        } else if new_head.id() != self.head.id() {
            info!(
                "switching forks from {} (block {}) to {} (block {})",
                self.head.id(),
                self.head.block_num(),
                new_head.id(),
                new_head.block_num(),
            );
            self.switch_forks(new_head)?;
        }
        Ok(())
    }

    fn switch_forks(&mut self, new_head: Arc<BlockState>) -> Result<(), ChainError> {
        let (apply_branch, pop_branch) = self
            .fork_db
            .fetch_branch_from(new_head.id(), self.head.id())?;

        for bs in &pop_branch {
            self.fork_db.mark_in_current_chain(bs, false);
            self.pop_block()?;
        }
        if let Some(last) = pop_branch.last() {
            if self.head.id() != last.previous() {
                return Err(ChainError::ForkSwitchDesync);
            }
        }

        let mut applied: Vec<Arc<BlockState>> = Vec::new();
        let mut failure: Option<(usize, ChainError)> = None;

        // Branches are tip-first; replay runs ancestor-first.
        for (offset, bs) in apply_branch.iter().rev().enumerate() {
            let block = bs.block.clone();
            match self.apply_block(&block, false) {
                Ok(trxs) => {
                    bs.set_trxs(trxs);
                    self.fork_db.mark_in_current_chain(bs, true);
                    self.fork_db.set_validity(bs, true);
                    self.head = bs.clone();
                    applied.push(bs.clone());
                }
                Err(e) => {
                    failure = Some((apply_branch.len() - 1 - offset, e));
                    break;
                }
            }
        }

        let (failed_index, err) = match failure {
            None => {
                info!("successfully switched fork to new head {}", new_head.id());
                return Ok(());
            }
            Some(f) => f,
        };

        error!("exception thrown while switching forks: {}", err);

        // The failed block and everything above it on the bad branch is
        // invalid.
        for bs in &apply_branch[..=failed_index] {
            self.fork_db.set_validity(bs, false);
        }

        // Rewind what was applied of the bad branch...
        for bs in applied.iter().rev() {
            self.fork_db.mark_in_current_chain(bs, false);
            self.pop_block()?;
        }
        if let Some(last) = pop_branch.last() {
            if self.head.id() != last.previous() {
                return Err(ChainError::ForkSwitchDesync);
            }
        }

        // ...and restore the branch that was head before; those blocks
        // were validated once already.
        for bs in pop_branch.iter().rev() {
            let block = bs.block.clone();
            let trxs = self.apply_block(&block, true)?;
            bs.set_trxs(trxs);
            self.fork_db.mark_in_current_chain(bs, true);
            self.head = bs.clone();
        }

        Err(err)
    }

    /// Steps the head back to its parent. The head block's transactions
    /// move into `unapplied_transactions` and one checkpoint is undone on
    /// each store.
    pub fn pop_block(&mut self) -> Result<(), ChainError> {
        let prev = self
            .fork_db
            .get_block(&self.head.previous())
            .ok_or(ChainError::PopBeyondIrreversible)?;

        for trx in self.head.trxs() {
            self.unapplied_transactions.insert(trx.signed_id, trx);
        }

        self.head = prev;
        self.state.undo()?;
        self.tokens.rollback_to_latest_savepoint()?;
        Ok(())
    }

    /// Drains the fork database's newly irreversible blocks into the
    /// block log and commits the matching store checkpoints.
    pub(crate) fn process_irreversible(&mut self) -> Result<(), ChainError> {
        for bs in self.fork_db.drain_irreversible() {
            self.on_irreversible(&bs)?;
        }
        Ok(())
    }

    fn on_irreversible(&mut self, bs: &Arc<BlockState>) -> Result<(), ChainError> {
        let log_head_num = self.blog.head_num().ok_or(ChainError::IrreversibleLinkage)?;

        if bs.block_num() == log_head_num + 1 {
            let log_head_id = self.blog.head_id().ok_or(ChainError::IrreversibleLinkage)?;
            if bs.previous() != log_head_id {
                return Err(ChainError::IrreversibleLinkage);
            }
            self.blog.append(&bs.block)?;
        } else if bs.block_num() > log_head_num + 1 {
            warn!(
                "skipped blocks: irreversible block {} is ahead of block log head {}",
                bs.block_num(),
                log_head_num,
            );
        }

        self.notifier
            .notify(&ChainEvent::IrreversibleBlock(bs.clone()));
        self.state.commit(bs.block_num() as i64);
        self.tokens.pop_savepoints(bs.block_num() as i64);
        Ok(())
    }
}
