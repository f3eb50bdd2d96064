//! The built-in contract: apply handlers for the domain/token/group/account
//! actions, registered by name at controller construction.
//!
//! Authorization has already been checked by the time a handler runs,
//! except for creation actions, which verify their payload's controlling
//! keys against the transaction's signers here.

use std::collections::{BTreeSet, HashMap};

use serde::de::DeserializeOwned;
use thiserror::Error;

use block::Action;
use keys::PublicKey;
use primitives::{ChainConfig, Coin, Name, Timestamp};
use tokendb::{Account, Domain, TokenDef, TokenStore};

use crate::error::ChainError;

mod payloads;

pub use payloads::{
    IssueToken, NewAccount, NewDomain, NewGroup, Transfer, TransferFund, UpdateDomain,
    UpdateGroup, UpdateOwner,
};

/// Routing names for the built-in actions and meta-domains.
pub mod names {
    use primitives::{Name, Name128};

    pub const NEWDOMAIN: Name = Name::from_static("newdomain");
    pub const UPDATEDOMAIN: Name = Name::from_static("updatedomain");
    pub const ISSUETOKEN: Name = Name::from_static("issuetoken");
    pub const TRANSFER: Name = Name::from_static("transfer");
    pub const NEWGROUP: Name = Name::from_static("newgroup");
    pub const UPDATEGROUP: Name = Name::from_static("updategroup");
    pub const NEWACCOUNT: Name = Name::from_static("newaccount");
    pub const UPDATEOWNER: Name = Name::from_static("updateowner");
    pub const TRANSFERFUND: Name = Name::from_static("transferfund");

    pub const ACCOUNT_DOMAIN: Name128 = Name128::from_static("account");
    pub const GROUP_DOMAIN: Name128 = Name128::from_static("group");
    pub const CREATE_KEY: Name128 = Name128::from_static(".create");
    pub const ISSUE_KEY: Name128 = Name128::from_static(".issue");
    pub const UPDATE_KEY: Name128 = Name128::from_static(".update");
}

#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ContractError {
    #[error("malformed action payload: {0}")]
    Payload(String),
    #[error("action {0} does not match its routing domain or key")]
    Routing(Name),
    #[error("invalid authority definition")]
    InvalidAuthority,
    #[error("invalid group definition")]
    InvalidGroup,
    #[error("creating key is not among the transaction signers")]
    CreatorNotSigned,
    #[error("owner keys are not among the transaction signers")]
    OwnerNotSigned,
    #[error("owner set must not be empty")]
    EmptyOwner,
    #[error("token name list must not be empty")]
    EmptyTokenNames,
    #[error("insufficient balance: have {have}, need {need}")]
    InsufficientBalance { have: Coin, need: Coin },
    #[error("transfer amount must be positive")]
    ZeroAmount,
    #[error("cannot transfer to the sending account")]
    SelfTransfer,
    #[error("balance overflow")]
    BalanceOverflow,
}

/// What a handler gets to see: the acted-on store, the action, the
/// verified signer set and the block context.
pub struct ApplyContext<'a> {
    pub tokens: &'a TokenStore,
    pub action: &'a Action,
    pub signing_keys: &'a BTreeSet<PublicKey>,
    pub pending_block_time: Timestamp,
    pub configuration: &'a ChainConfig,
}

impl ApplyContext<'_> {
    fn decode<T: DeserializeOwned>(&self) -> Result<T, ContractError> {
        postcard::from_bytes(&self.action.data).map_err(|e| ContractError::Payload(e.to_string()))
    }

    fn require_routing(&self, ok: bool) -> Result<(), ContractError> {
        if ok {
            Ok(())
        } else {
            Err(ContractError::Routing(self.action.name))
        }
    }

    fn require_signers(&self, keys: &[PublicKey], err: ContractError) -> Result<(), ContractError> {
        if keys.iter().all(|k| self.signing_keys.contains(k)) {
            Ok(())
        } else {
            Err(err)
        }
    }
}

pub type ApplyHandler = fn(&mut ApplyContext) -> Result<(), ChainError>;
pub type ApplyHandlerMap = HashMap<Name, ApplyHandler>;

/// The handler table, registered once at construction and immutable after.
pub fn build_handlers() -> ApplyHandlerMap {
    let mut handlers: ApplyHandlerMap = HashMap::new();
    handlers.insert(names::NEWDOMAIN, apply_newdomain);
    handlers.insert(names::UPDATEDOMAIN, apply_updatedomain);
    handlers.insert(names::ISSUETOKEN, apply_issuetoken);
    handlers.insert(names::TRANSFER, apply_transfer);
    handlers.insert(names::NEWGROUP, apply_newgroup);
    handlers.insert(names::UPDATEGROUP, apply_updategroup);
    handlers.insert(names::NEWACCOUNT, apply_newaccount);
    handlers.insert(names::UPDATEOWNER, apply_updateowner);
    handlers.insert(names::TRANSFERFUND, apply_transferfund);
    handlers
}

fn apply_newdomain(ctx: &mut ApplyContext) -> Result<(), ChainError> {
    let payload: NewDomain = ctx.decode()?;
    ctx.require_routing(ctx.action.domain == payload.name && ctx.action.key == names::CREATE_KEY)?;

    if !payload.issue.is_valid() || !payload.transfer.is_valid() || !payload.manage.is_valid() {
        return Err(ContractError::InvalidAuthority.into());
    }
    ctx.require_signers(&[payload.creator], ContractError::CreatorNotSigned)?;

    ctx.tokens.add_domain(Domain {
        name: payload.name,
        creator: payload.creator,
        created_at: ctx.pending_block_time,
        issue: payload.issue,
        transfer: payload.transfer,
        manage: payload.manage,
    })?;
    Ok(())
}

fn apply_updatedomain(ctx: &mut ApplyContext) -> Result<(), ChainError> {
    let payload: UpdateDomain = ctx.decode()?;
    ctx.require_routing(ctx.action.domain == payload.name && ctx.action.key == names::UPDATE_KEY)?;

    for authority in [&payload.issue, &payload.transfer, &payload.manage]
        .into_iter()
        .flatten()
    {
        if !authority.is_valid() {
            return Err(ContractError::InvalidAuthority.into());
        }
    }

    ctx.tokens.update_domain(&payload.name, |domain| {
        if let Some(issue) = payload.issue {
            domain.issue = issue;
        }
        if let Some(transfer) = payload.transfer {
            domain.transfer = transfer;
        }
        if let Some(manage) = payload.manage {
            domain.manage = manage;
        }
    })?;
    Ok(())
}

fn apply_issuetoken(ctx: &mut ApplyContext) -> Result<(), ChainError> {
    let payload: IssueToken = ctx.decode()?;
    ctx.require_routing(ctx.action.domain == payload.domain && ctx.action.key == names::ISSUE_KEY)?;

    if payload.names.is_empty() {
        return Err(ContractError::EmptyTokenNames.into());
    }
    if payload.owner.is_empty() {
        return Err(ContractError::EmptyOwner.into());
    }

    // The domain must exist even though the issue authority was already
    // resolved through it; implicit replay skips the checker.
    ctx.tokens.read_domain(&payload.domain)?;

    for name in payload.names {
        ctx.tokens.add_token(TokenDef {
            domain: payload.domain,
            name,
            owner: payload.owner.clone(),
        })?;
    }
    Ok(())
}

fn apply_transfer(ctx: &mut ApplyContext) -> Result<(), ChainError> {
    let payload: Transfer = ctx.decode()?;
    ctx.require_routing(ctx.action.domain == payload.domain && ctx.action.key == payload.name)?;

    if payload.to.is_empty() {
        return Err(ContractError::EmptyOwner.into());
    }

    ctx.tokens.update_token(&payload.domain, &payload.name, |token| {
        token.owner = payload.to;
    })?;
    Ok(())
}

fn apply_newgroup(ctx: &mut ApplyContext) -> Result<(), ChainError> {
    let payload: NewGroup = ctx.decode()?;
    ctx.require_routing(
        ctx.action.domain == names::GROUP_DOMAIN && ctx.action.key == payload.name,
    )?;

    if payload.group.name != payload.name || !payload.group.is_valid() {
        return Err(ContractError::InvalidGroup.into());
    }
    ctx.require_signers(&[payload.group.key], ContractError::CreatorNotSigned)?;

    ctx.tokens.add_group(payload.group)?;
    Ok(())
}

fn apply_updategroup(ctx: &mut ApplyContext) -> Result<(), ChainError> {
    let payload: UpdateGroup = ctx.decode()?;
    ctx.require_routing(
        ctx.action.domain == names::GROUP_DOMAIN && ctx.action.key == payload.name,
    )?;

    if payload.group.name != payload.name || !payload.group.is_valid() {
        return Err(ContractError::InvalidGroup.into());
    }

    ctx.tokens.update_group(&payload.name, |group| {
        *group = payload.group;
    })?;
    Ok(())
}

fn apply_newaccount(ctx: &mut ApplyContext) -> Result<(), ChainError> {
    let payload: NewAccount = ctx.decode()?;
    ctx.require_routing(
        ctx.action.domain == names::ACCOUNT_DOMAIN && ctx.action.key == payload.name,
    )?;

    if payload.owner.is_empty() {
        return Err(ContractError::EmptyOwner.into());
    }
    ctx.require_signers(&payload.owner, ContractError::OwnerNotSigned)?;

    ctx.tokens.add_account(Account {
        name: payload.name,
        owner: payload.owner,
        balance: ctx.configuration.account_grant,
        created_at: ctx.pending_block_time,
    })?;
    Ok(())
}

fn apply_updateowner(ctx: &mut ApplyContext) -> Result<(), ChainError> {
    let payload: UpdateOwner = ctx.decode()?;
    ctx.require_routing(
        ctx.action.domain == names::ACCOUNT_DOMAIN && ctx.action.key == payload.name,
    )?;

    if payload.owner.is_empty() {
        return Err(ContractError::EmptyOwner.into());
    }

    ctx.tokens.update_account(&payload.name, |account| {
        account.owner = payload.owner;
    })?;
    Ok(())
}

fn apply_transferfund(ctx: &mut ApplyContext) -> Result<(), ChainError> {
    let payload: TransferFund = ctx.decode()?;
    ctx.require_routing(
        ctx.action.domain == names::ACCOUNT_DOMAIN && ctx.action.key == payload.from,
    )?;

    if payload.from == payload.to {
        return Err(ContractError::SelfTransfer.into());
    }
    if payload.amount.is_zero() {
        return Err(ContractError::ZeroAmount.into());
    }

    let from = ctx.tokens.read_account(&payload.from)?;
    let to = ctx.tokens.read_account(&payload.to)?;

    let debited = from
        .balance
        .checked_sub(payload.amount)
        .ok_or(ContractError::InsufficientBalance {
            have: from.balance,
            need: payload.amount,
        })?;
    let credited = to
        .balance
        .checked_add(payload.amount)
        .ok_or(ContractError::BalanceOverflow)?;

    ctx.tokens.update_account(&payload.from, |account| {
        account.balance = debited;
    })?;
    ctx.tokens.update_account(&payload.to, |account| {
        account.balance = credited;
    })?;
    Ok(())
}
