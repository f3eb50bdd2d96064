//! Block lifecycle: start, per-transaction application, finalize, sign,
//! commit and abort.

use std::sync::Arc;
use std::time::Instant;

use log::{debug, info};

use block::{TransactionMetadata, TransactionReceipt, TransactionStatus};
use hash::Sha256Hash;
use keys::Signature;
use primitives::{BlockTimestamp, ProducerSchedule, Timestamp};
use utils::merkle;

use crate::authority_checker::AuthorityChecker;
use crate::block_state::BlockState;
use crate::error::ChainError;
use crate::events::ChainEvent;
use crate::pending::{BlockRestoreGuard, PendingState, StorePair};
use crate::transaction_context::{
    action_receipt_digests, TransactionContext, TransactionTrace, TrxOutcome,
};

use super::Controller;

impl Controller {
    /// Opens the pending state on top of the current head at timestamp
    /// `when`. Any failure on the way leaves no trace: the freshly opened
    /// store sessions roll back when the locals drop.
    pub fn start_block(
        &mut self,
        when: BlockTimestamp,
        confirm_count: u16,
    ) -> Result<(), ChainError> {
        if self.config.read_only {
            return Err(ChainError::ReadOnly);
        }
        if self.pending.is_some() {
            return Err(ChainError::PendingBlockExists);
        }
        let revision = self.state.revision();
        if revision != self.head.block_num() as i64 {
            return Err(ChainError::RevisionMismatch {
                revision,
                head: self.head.block_num(),
            });
        }

        let db_session = self.state.start_undo_session()?;
        // The savepoint tag mirrors the state revision of the block being
        // built, keeping the two stores' checkpoint stacks congruent.
        let token_session = self.tokens.new_savepoint_session(self.state.revision())?;

        let mut block_state = BlockState::generate(&self.head, when)?;
        block_state.set_in_current_chain(true);
        block_state.header_state.set_confirmed(confirm_count);
        let was_pending_promoted = block_state.header_state.maybe_promote_pending();

        let gpo = self.state.global();
        if let Some(proposed_num) = gpo.proposed_schedule_block_num {
            // Promote the proposed schedule once the block that proposed
            // it is irreversible, there is room for a pending schedule,
            // and that room was not created just now by a promotion.
            if proposed_num <= block_state.header_state.dpos_irreversible_blocknum
                && block_state.header_state.pending_schedule.is_empty()
                && !was_pending_promoted
            {
                info!(
                    "promoting proposed schedule (set in block {}) to pending; \
                     current block: {} lib: {}",
                    proposed_num,
                    block_state.block_num(),
                    block_state.header_state.dpos_irreversible_blocknum,
                );
                block_state
                    .header_state
                    .set_new_producers(gpo.proposed_schedule.clone())?;
                self.state.modify_global(|g| {
                    g.proposed_schedule_block_num = None;
                    g.proposed_schedule = ProducerSchedule::default();
                });
            }
        }

        let pending_time = block_state.timestamp().to_timestamp();
        self.clear_expired_input_transactions(pending_time);

        self.pending = Some(PendingState::new(
            StorePair::new(db_session, token_session),
            block_state,
        ));
        Ok(())
    }

    /// Applies one transaction against the pending block.
    ///
    /// Execution failures are captured into the returned trace instead of
    /// propagating; only precondition violations (no pending block) error
    /// out. A failed transaction leaves zero footprint: its store changes
    /// revert with the transaction's own checkpoints, and the restore
    /// guard rewinds the receipt, metadata and action lists on every path
    /// that does not reach `cancel`.
    pub fn push_transaction(
        &mut self,
        meta: Arc<TransactionMetadata>,
        deadline: Option<Instant>,
        implicit: bool,
    ) -> Result<Arc<TransactionTrace>, ChainError> {
        let (pending_block_time, pending_block_num) = {
            let pending = self.pending.as_ref().ok_or(ChainError::NoPendingBlock)?;
            (
                pending.block_state.timestamp().to_timestamp(),
                pending.block_state.block_num(),
            )
        };

        let mut ctx = TransactionContext::new(
            &self.state,
            &self.tokens,
            &self.apply_handlers,
            &meta,
            pending_block_time,
            pending_block_num,
            deadline,
        );

        let exec_result: Result<(), ChainError> = (|| {
            if implicit {
                ctx.init_for_implicit_trx()?;
            } else {
                ctx.init_for_input_trx(meta.signed.signatures.len())?;
                let keys = meta.recover_keys()?.clone();
                let mut checker = AuthorityChecker::new(&self.tokens, keys);
                for action in &meta.signed.trx.actions {
                    if !checker.satisfied(action) {
                        return Err(ChainError::TxMissingSigs {
                            name: action.name,
                            domain: action.domain,
                            key: action.key,
                        });
                    }
                }
            }
            ctx.exec()
        })();

        match exec_result {
            Ok(()) => {
                ctx.finalize();
                ctx.squash();
                let trace = Arc::new(ctx.into_trace(TrxOutcome::Executed {
                    status: TransactionStatus::Executed,
                }));

                {
                    let pending = self.pending.as_mut().ok_or(ChainError::NoPendingBlock)?;
                    let mut guard = BlockRestoreGuard::new(pending);

                    if !implicit {
                        guard
                            .pending()
                            .block_state
                            .block
                            .transactions
                            .push(TransactionReceipt::executed(meta.signed.clone()));
                        guard.pending().block_state.push_trx(meta.clone());
                    }
                    guard
                        .pending()
                        .actions
                        .extend(trace.action_traces.iter().cloned());

                    if meta.mark_accepted() {
                        self.notifier
                            .notify(&ChainEvent::AcceptedTransaction(meta.clone()));
                    }
                    self.notifier
                        .notify(&ChainEvent::AppliedTransaction(trace.clone()));

                    guard.cancel();
                }

                if !implicit {
                    self.unapplied_transactions.remove(&meta.signed_id);
                }
                Ok(trace)
            }
            Err(e) => {
                let subjective = e.is_subjective();
                if !subjective {
                    self.unapplied_transactions.remove(&meta.signed_id);
                }
                let outcome = if subjective {
                    TrxOutcome::Deferred(e)
                } else {
                    TrxOutcome::Failed(e)
                };
                Ok(Arc::new(ctx.into_trace(outcome)))
            }
        }
    }

    /// Computes the two merkle roots, fixes the block id and refreshes the
    /// block-summary ring slot.
    pub fn finalize_block(&mut self) -> Result<(), ChainError> {
        let pending = self.pending.as_mut().ok_or(ChainError::NoPendingBlock)?;

        let action_digests = action_receipt_digests(&pending.actions);
        let action_mroot = merkle::compute_root_from_hashes(&action_digests);

        let trx_digests: Vec<Sha256Hash> = pending
            .block_state
            .block
            .transactions
            .iter()
            .map(TransactionReceipt::digest)
            .collect();
        let transaction_mroot = merkle::compute_root_from_hashes(&trx_digests);

        let header_state = &mut pending.block_state.header_state;
        header_state.header.action_mroot = action_mroot;
        header_state.header.transaction_mroot = transaction_mroot;
        header_state.id = header_state.header.id();

        let id = header_state.id;
        let slot = (header_state.block_num & 0xffff) as u16;
        self.state.set_block_summary(slot, id);
        Ok(())
    }

    /// Obtains the producer signature for the finalized header and copies
    /// the header into the block. The signature is installed as returned,
    /// nothing more.
    pub fn sign_block(
        &mut self,
        signer: impl FnOnce(&Sha256Hash) -> Signature,
    ) -> Result<(), ChainError> {
        let pending = self.pending.as_mut().ok_or(ChainError::NoPendingBlock)?;
        let signature = pending.block_state.header_state.sign(signer);
        pending.block_state.block.header = pending.block_state.header_state.header.clone();
        pending.block_state.block.producer_signature = signature;
        Ok(())
    }

    /// Commits the pending block: production path. The block state enters
    /// the fork database and must become the new head.
    pub fn commit_block(&mut self) -> Result<(), ChainError> {
        self.do_commit_block(true).map(|_| ())
    }

    pub(crate) fn do_commit_block(
        &mut self,
        add_to_fork_db: bool,
    ) -> Result<Vec<Arc<TransactionMetadata>>, ChainError> {
        let pending = self.pending.take().ok_or(ChainError::NoPendingBlock)?;
        let PendingState {
            sessions,
            block_state,
            ..
        } = pending;

        if add_to_fork_db {
            block_state.set_validated(true);
        }
        let bs = Arc::new(block_state);
        let trxs = bs.trxs();

        if add_to_fork_db {
            if let Err(e) = self.fork_db.add_state(bs.clone()) {
                self.restore_unapplied(&trxs);
                drop(sessions);
                return Err(e);
            }
            self.notifier
                .notify(&ChainEvent::AcceptedBlockHeader(bs.clone()));

            let new_head = self.fork_db.head().ok_or(ChainError::ForkSwitchDesync)?;
            if !Arc::ptr_eq(&new_head, &bs) {
                self.restore_unapplied(&trxs);
                drop(sessions);
                return Err(ChainError::CommitHeadMismatch);
            }
            self.head = new_head;
        }

        self.notifier.notify(&ChainEvent::AcceptedBlock(bs.clone()));
        sessions.push();

        if add_to_fork_db {
            self.process_irreversible()?;
        }
        Ok(trxs)
    }

    /// Drops the pending block. Its transactions land in
    /// `unapplied_transactions`; the open sessions roll back with the
    /// pending state.
    pub fn abort_block(&mut self) {
        if let Some(pending) = self.pending.take() {
            debug!(
                "aborting pending block {}",
                pending.block_state.block_num()
            );
            let trxs = pending.block_state.trxs();
            self.restore_unapplied(&trxs);
        }
    }

    fn restore_unapplied(&mut self, trxs: &[Arc<TransactionMetadata>]) {
        for trx in trxs {
            self.unapplied_transactions
                .insert(trx.signed_id, trx.clone());
        }
    }

    /// Drops every entry of the deduplication index that expired before
    /// the pending block time.
    pub(crate) fn clear_expired_input_transactions(&mut self, now: Timestamp) {
        let removed = self.state.clear_expired_transactions(now);
        if removed > 0 {
            debug!("cleared {} expired input transactions", removed);
        }
    }
}
