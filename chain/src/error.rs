use thiserror::Error;

use block::BlockId;
use hash::Sha256Hash;
use primitives::{Name, Timestamp};

use crate::block_log::BlockLogError;
use crate::contracts::ContractError;

/// Every way the controller can fail.
///
/// Three families, per the propagation policy:
/// objective failures are deterministic and drop the transaction from
/// `unapplied_transactions`; the single subjective failure
/// ([`ChainError::DeadlineExceeded`]) keeps it there for retry; the rest
/// are invariant violations that abort the operation and should take the
/// node down.
#[derive(Clone, Debug, Error)]
pub enum ChainError {
    // --- objective transaction failures ---
    #[error("action {name} in domain {domain} with key {key} was not authorized")]
    TxMissingSigs {
        name: Name,
        domain: primitives::Name128,
        key: primitives::Name128,
    },
    #[error("transaction expired at {expiration}, pending block time is {pending}")]
    ExpiredTx {
        expiration: Timestamp,
        pending: Timestamp,
    },
    #[error(
        "transaction expiration {expiration} is more than {max_secs}s past the \
         reference time {reference}"
    )]
    TxExpTooFar {
        expiration: Timestamp,
        reference: Timestamp,
        max_secs: u32,
    },
    #[error("transaction reference block does not match; transaction from a different fork?")]
    InvalidRefBlock,
    #[error("duplicate transaction {0}")]
    TxDuplicate(Sha256Hash),
    #[error("no apply handler registered for action {0}")]
    UnknownAction(Name),
    #[error(transparent)]
    Transaction(#[from] block::TransactionError),
    #[error(transparent)]
    Contract(#[from] ContractError),
    #[error(transparent)]
    TokenDb(#[from] tokendb::TokenDbError),

    // --- objective block failures ---
    #[error("unknown block {0}")]
    UnknownBlock(BlockId),
    #[error("unknown block number {0}")]
    UnknownBlockNum(u32),
    #[error("unlinkable block {0}")]
    UnlinkableBlock(BlockId),
    #[error("block {0} is already known")]
    BlockAlreadyKnown(BlockId),
    #[error("no supported block extensions")]
    UnsupportedExtension,
    #[error("{kind} merkle root does not match the block header")]
    MerkleMismatch { kind: &'static str },
    #[error("applying block {received} produced unexpected id {computed}")]
    UnexpectedBlockId {
        received: BlockId,
        computed: BlockId,
    },
    #[error("block names producer {got}, slot belongs to {expected}")]
    WrongProducer { expected: Name, got: Name },
    #[error("block carries schedule version {got}, expected {expected}")]
    ScheduleVersionMismatch { expected: u32, got: u32 },
    #[error("block timestamp does not advance past its parent")]
    TimestampNotLater,
    #[error("producer signature does not verify against the scheduled key")]
    InvalidProducerSignature,
    #[error("producer {0} confirms blocks it already confirmed")]
    ProducerDoubleConfirm(Name),
    #[error("confirmation producer {0} is not in the active schedule")]
    ConfirmationUnknownProducer(Name),
    #[error("duplicate confirmation from producer {0}")]
    DuplicateConfirmation(Name),
    #[error("confirmation signature from producer {0} does not verify")]
    InvalidConfirmationSignature(Name),
    #[error("a pending producer schedule already exists")]
    PendingSchedulePresent,

    // --- subjective failures ---
    #[error("deadline exceeded while applying transaction")]
    DeadlineExceeded,

    // --- invariant violations ---
    #[error("state store revision {revision} does not match head block {head}")]
    RevisionMismatch { revision: i64, head: u32 },
    #[error("attempt to pop beyond last irreversible block")]
    PopBeyondIrreversible,
    #[error("loss of sync between fork database and state during fork switch")]
    ForkSwitchDesync,
    #[error("committed block did not become the new head in the fork database")]
    CommitHeadMismatch,
    #[error("irreversible block does not link to the block log head")]
    IrreversibleLinkage,
    #[error("no pending block")]
    NoPendingBlock,
    #[error("a pending block is already in progress")]
    PendingBlockExists,
    #[error("controller is in read-only mode")]
    ReadOnly,
    #[error(transparent)]
    State(#[from] statedb::StateStoreError),
    #[error(transparent)]
    BlockLog(#[from] BlockLogError),
}

impl ChainError {
    /// Subjective failures are local (timing, resources); the transaction
    /// may succeed elsewhere or later, so it stays in
    /// `unapplied_transactions`.
    pub fn is_subjective(&self) -> bool {
        matches!(self, ChainError::DeadlineExceeded)
    }
}
