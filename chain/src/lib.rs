pub mod authority_checker;
pub mod block_log;
pub mod block_state;
pub mod config;
pub mod contracts;
pub mod error;
pub mod events;
pub mod fork_database;
pub mod transaction_context;

mod controller;
mod pending;

pub use self::authority_checker::AuthorityChecker;
pub use self::block_log::{BlockLog, BlockLogError};
pub use self::block_state::{BlockHeaderState, BlockState, HeaderConfirmation};
pub use self::config::Config;
pub use self::contracts::{ApplyContext, ApplyHandler, ContractError};
pub use self::controller::Controller;
pub use self::error::ChainError;
pub use self::events::ChainEvent;
pub use self::fork_database::ForkDatabase;
pub use self::transaction_context::{
    ActionReceipt, ActionTrace, TransactionTrace, TrxOutcome,
};
