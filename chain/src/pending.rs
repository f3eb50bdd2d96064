//! The staging area that exists between `start_block` and
//! `commit_block`/`abort_block`.

use statedb::UndoSession;
use tokendb::SavepointSession;

use crate::block_state::BlockState;
use crate::transaction_context::ActionTrace;

/// The open sessions on the two stores, welded together: they promote as
/// a unit via [`StorePair::push`] and dropping the pair rolls both back.
/// There is deliberately no way to commit one side alone.
pub(crate) struct StorePair {
    db_session: UndoSession,
    token_session: SavepointSession,
}

impl StorePair {
    pub fn new(db_session: UndoSession, token_session: SavepointSession) -> Self {
        StorePair {
            db_session,
            token_session,
        }
    }

    /// Promotes both sessions, making the block's changes part of the
    /// revertible store state.
    pub fn push(self) {
        let StorePair {
            db_session,
            token_session,
        } = self;
        db_session.push();
        token_session.accept();
    }
}

pub(crate) struct PendingState {
    pub sessions: StorePair,
    pub block_state: BlockState,
    /// Action traces of every executed transaction, in execution order;
    /// the action merkle root is computed over these.
    pub actions: Vec<ActionTrace>,
}

impl PendingState {
    pub fn new(sessions: StorePair, block_state: BlockState) -> Self {
        PendingState {
            sessions,
            block_state,
            actions: Vec::new(),
        }
    }

    fn restore_point(&self) -> RestorePoint {
        RestorePoint {
            block_trx_count: self.block_state.block.transactions.len(),
            applied_trx_count: self.block_state.trxs().len(),
            action_count: self.actions.len(),
        }
    }

    fn restore(&mut self, point: &RestorePoint) {
        self.block_state
            .block
            .transactions
            .truncate(point.block_trx_count);
        self.block_state.truncate_trxs(point.applied_trx_count);
        self.actions.truncate(point.action_count);
    }
}

#[derive(Clone, Copy, Debug)]
struct RestorePoint {
    block_trx_count: usize,
    applied_trx_count: usize,
    action_count: usize,
}

/// Captures the pending block's list sizes and restores them on drop
/// unless cancelled. A failed transaction leaves no footprint on the
/// pending block even though the outer store sessions stay open.
pub(crate) struct BlockRestoreGuard<'a> {
    pending: &'a mut PendingState,
    point: RestorePoint,
    armed: bool,
}

impl<'a> BlockRestoreGuard<'a> {
    pub fn new(pending: &'a mut PendingState) -> Self {
        let point = pending.restore_point();
        BlockRestoreGuard {
            pending,
            point,
            armed: true,
        }
    }

    pub fn pending(&mut self) -> &mut PendingState {
        self.pending
    }

    pub fn cancel(mut self) {
        self.armed = false;
    }
}

impl Drop for BlockRestoreGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.pending.restore(&self.point);
        }
    }
}
