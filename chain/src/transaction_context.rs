//! Executes one transaction: validation, dedup recording, action dispatch
//! and the resulting trace.

use std::sync::Arc;
use std::time::Instant;

use block::{Action, Transaction, TransactionMetadata, TransactionStatus};
use hash::{Hash, Sha256Hash};
use primitives::{ChainConfig, Timestamp};
use statedb::StateStore;
use tokendb::TokenStore;

use crate::contracts::{ApplyContext, ApplyHandlerMap};
use crate::error::ChainError;

/// Proof that one action executed, in block order. Receipt digests feed
/// the action merkle root.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ActionReceipt {
    pub act_digest: Sha256Hash,
    pub global_sequence: u64,
}

impl ActionReceipt {
    pub fn digest(&self) -> Sha256Hash {
        self.hash()
    }
}

impl hash::SerializeContent for ActionReceipt {
    fn serialize_content<W: std::io::Write>(&self, writer: &mut W) -> std::io::Result<usize> {
        writer.write_all(self.act_digest.as_bytes())?;
        writer.write_all(&self.global_sequence.to_le_bytes())?;
        Ok(Sha256Hash::SIZE + 8)
    }
}

impl Hash for ActionReceipt {}

#[derive(Clone, Debug)]
pub struct ActionTrace {
    pub receipt: ActionReceipt,
    pub action: Action,
}

/// What became of a transaction. Objective failures drop it from
/// `unapplied_transactions`, deferred (subjective) ones keep it for retry.
#[derive(Clone, Debug)]
pub enum TrxOutcome {
    Executed { status: TransactionStatus },
    Failed(ChainError),
    Deferred(ChainError),
}

#[derive(Clone, Debug)]
pub struct TransactionTrace {
    pub id: Sha256Hash,
    pub signed_id: Sha256Hash,
    pub block_num: u32,
    pub action_traces: Vec<ActionTrace>,
    pub outcome: TrxOutcome,
    /// Serialized size, rounded up to words; reporting only.
    pub net_usage: u64,
    /// Wall-clock execution time; reporting only.
    pub cpu_usage_us: u64,
}

impl TransactionTrace {
    pub fn error(&self) -> Option<&ChainError> {
        match &self.outcome {
            TrxOutcome::Executed { .. } => None,
            TrxOutcome::Failed(e) | TrxOutcome::Deferred(e) => Some(e),
        }
    }

    pub fn is_executed(&self) -> bool {
        matches!(self.outcome, TrxOutcome::Executed { .. })
    }
}

pub(crate) struct TransactionContext<'a> {
    state: &'a StateStore,
    tokens: &'a TokenStore,
    handlers: &'a ApplyHandlerMap,
    meta: &'a Arc<TransactionMetadata>,
    configuration: ChainConfig,
    pending_block_time: Timestamp,
    pending_block_num: u32,
    deadline: Option<Instant>,
    is_input: bool,
    signature_count: usize,
    started: Instant,
    /// The transaction's own checkpoint on each store. Squashed into the
    /// enclosing block sessions on success; dropping them (any failure
    /// path) reverts every store change this transaction made.
    sessions: Option<(statedb::UndoSession, tokendb::SavepointSession)>,
    pub executed: Vec<ActionTrace>,
    net_usage: u64,
    cpu_usage_us: u64,
}

impl<'a> TransactionContext<'a> {
    pub fn new(
        state: &'a StateStore,
        tokens: &'a TokenStore,
        handlers: &'a ApplyHandlerMap,
        meta: &'a Arc<TransactionMetadata>,
        pending_block_time: Timestamp,
        pending_block_num: u32,
        deadline: Option<Instant>,
    ) -> Self {
        let configuration = state.global().configuration;
        TransactionContext {
            state,
            tokens,
            handlers,
            meta,
            configuration,
            pending_block_time,
            pending_block_num,
            deadline,
            is_input: false,
            signature_count: 0,
            started: Instant::now(),
            sessions: None,
            executed: Vec::new(),
            net_usage: 0,
            cpu_usage_us: 0,
        }
    }

    fn open_sessions(&mut self) -> Result<(), ChainError> {
        let db_session = self.state.start_undo_session()?;
        let token_session = self.tokens.new_savepoint_session(self.state.revision())?;
        self.sessions = Some((db_session, token_session));
        Ok(())
    }

    pub fn init_for_implicit_trx(&mut self) -> Result<(), ChainError> {
        self.is_input = false;
        self.open_sessions()
    }

    /// Input transactions pay the full toll: expiration and TaPoS checks
    /// plus a slot in the deduplication index.
    pub fn init_for_input_trx(&mut self, signature_count: usize) -> Result<(), ChainError> {
        self.is_input = true;
        self.signature_count = signature_count;
        self.open_sessions()?;

        let trx = &self.meta.signed.trx;
        validate_expiration(trx, self.pending_block_time, &self.configuration)?;
        validate_tapos(trx, self.state)?;

        if !self
            .state
            .insert_transaction(self.meta.id, trx.expiration)
        {
            return Err(ChainError::TxDuplicate(self.meta.id));
        }
        Ok(())
    }

    /// Folds this transaction's store changes into the enclosing block
    /// sessions.
    pub fn squash(&mut self) {
        if let Some((db_session, token_session)) = self.sessions.take() {
            db_session.squash();
            token_session.squash();
        }
    }

    /// Runs every action in order, checking the deadline in between.
    pub fn exec(&mut self) -> Result<(), ChainError> {
        let actions = &self.meta.signed.trx.actions;
        for action in actions {
            self.check_deadline()?;
            self.dispatch(action)?;
        }
        Ok(())
    }

    fn dispatch(&mut self, action: &Action) -> Result<(), ChainError> {
        let handler = self
            .handlers
            .get(&action.name)
            .ok_or(ChainError::UnknownAction(action.name))?;

        let signing_keys = self.meta.recover_keys()?;
        let mut ctx = ApplyContext {
            tokens: self.tokens,
            action,
            signing_keys,
            pending_block_time: self.pending_block_time,
            configuration: &self.configuration,
        };
        handler(&mut ctx)?;

        let receipt = ActionReceipt {
            act_digest: action.digest(),
            global_sequence: self.state.next_action_sequence(),
        };
        self.executed.push(ActionTrace {
            receipt,
            action: action.clone(),
        });
        Ok(())
    }

    /// Rounds up the billing numbers; they only ever reach the trace.
    /// Implicit transactions bill nothing on the wire.
    pub fn finalize(&mut self) {
        const SIGNATURE_CPU_BILL_US: u64 = 100;

        if self.is_input {
            let body = postcard::to_allocvec(&self.meta.signed).unwrap_or_default();
            self.net_usage = (body.len() as u64 + 7) / 8 * 8;
        }
        self.cpu_usage_us = self.started.elapsed().as_micros() as u64
            + self.signature_count as u64 * SIGNATURE_CPU_BILL_US;
    }

    fn check_deadline(&self) -> Result<(), ChainError> {
        match self.deadline {
            Some(deadline) if Instant::now() > deadline => Err(ChainError::DeadlineExceeded),
            _ => Ok(()),
        }
    }

    pub fn into_trace(self, outcome: TrxOutcome) -> TransactionTrace {
        TransactionTrace {
            id: self.meta.id,
            signed_id: self.meta.signed_id,
            block_num: self.pending_block_num,
            action_traces: self.executed,
            outcome,
            net_usage: self.net_usage,
            cpu_usage_us: self.cpu_usage_us,
        }
    }
}

/// Asserts the transaction is neither expired nor expiring implausibly far
/// in the future.
pub(crate) fn validate_expiration(
    trx: &Transaction,
    pending_block_time: Timestamp,
    configuration: &ChainConfig,
) -> Result<(), ChainError> {
    if trx.expiration < pending_block_time {
        return Err(ChainError::ExpiredTx {
            expiration: trx.expiration,
            pending: pending_block_time,
        });
    }
    let max_secs = configuration.max_transaction_lifetime_secs;
    let limit = pending_block_time
        .checked_add_secs(max_secs as u64)
        .unwrap_or(Timestamp::from_millis(u64::MAX));
    if trx.expiration > limit {
        return Err(ChainError::TxExpTooFar {
            expiration: trx.expiration,
            reference: pending_block_time,
            max_secs,
        });
    }
    Ok(())
}

/// Asserts the transaction references a block id the summary ring still
/// remembers.
pub(crate) fn validate_tapos(trx: &Transaction, state: &StateStore) -> Result<(), ChainError> {
    let summary_id = state.block_summary(trx.ref_block_num);
    if !trx.verify_reference_block(&summary_id) {
        return Err(ChainError::InvalidRefBlock);
    }
    Ok(())
}

/// Digest list for the action merkle root, in execution order.
pub(crate) fn action_receipt_digests(traces: &[ActionTrace]) -> Vec<Sha256Hash> {
    traces.iter().map(|t| t.receipt.digest()).collect()
}
