use std::sync::Arc;

use block::TransactionMetadata;

use crate::block_state::{BlockState, HeaderConfirmation};
use crate::transaction_context::TransactionTrace;

/// Everything observable about the controller. Subscribers must never
/// influence consensus: the notifier contains panics and disables the
/// offending subscriber.
#[derive(Clone)]
pub enum ChainEvent {
    /// A header passed validation and entered the fork database.
    AcceptedBlockHeader(Arc<BlockState>),
    /// A block was fully applied and committed.
    AcceptedBlock(Arc<BlockState>),
    /// A transaction was accepted for the first time.
    AcceptedTransaction(Arc<TransactionMetadata>),
    /// A transaction finished applying; the trace carries the outcome.
    AppliedTransaction(Arc<TransactionTrace>),
    /// A producer confirmation was recorded.
    AcceptedConfirmation(HeaderConfirmation),
    /// A block crossed the irreversibility threshold.
    IrreversibleBlock(Arc<BlockState>),
}
