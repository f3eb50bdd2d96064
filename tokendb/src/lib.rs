//! The token-side store: domains, tokens, groups and accounts.
//!
//! Mutations are captured by named savepoints tagged with the state store's
//! revision so the two stores commit and roll back in lockstep: every state
//! undo layer has a savepoint with the same tag, every `commit(n)` on the
//! state side is paired with [`TokenStore::pop_savepoints`] here, and every
//! state `undo()` with [`TokenStore::rollback_to_latest_savepoint`].

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use log::warn;
use parking_lot::RwLock;
use thiserror::Error;

use hash::{Hash, Sha256Hash};
use primitives::{Group, Name128};

mod records;

pub use records::{Account, Domain, TokenDef};

#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum TokenDbError {
    #[error("domain {0} does not exist")]
    DomainNotFound(Name128),
    #[error("domain {0} already exists")]
    DomainExists(Name128),
    #[error("token {0}/{1} does not exist")]
    TokenNotFound(Name128, Name128),
    #[error("token {0}/{1} already exists")]
    TokenExists(Name128, Name128),
    #[error("group {0} does not exist")]
    GroupNotFound(Name128),
    #[error("group {0} already exists")]
    GroupExists(Name128),
    #[error("account {0} does not exist")]
    AccountNotFound(Name128),
    #[error("account {0} already exists")]
    AccountExists(Name128),
    #[error("no savepoint to roll back to")]
    NoSavepoint,
    #[error("savepoint {0} is not newer than the latest savepoint")]
    SavepointOrder(i64),
    #[error("token store io: {0}")]
    Io(String),
}

enum UndoOp {
    DomainAdded(Name128),
    DomainChanged(Box<Domain>),
    TokenAdded(Name128, Name128),
    TokenChanged(Box<TokenDef>),
    GroupAdded(Name128),
    GroupChanged(Box<Group>),
    AccountAdded(Name128),
    AccountChanged(Box<Account>),
}

struct Savepoint {
    seq: i64,
    ops: Vec<UndoOp>,
}

#[derive(Default)]
struct Inner {
    domains: BTreeMap<Name128, Domain>,
    tokens: BTreeMap<(Name128, Name128), TokenDef>,
    groups: BTreeMap<Name128, Group>,
    accounts: BTreeMap<Name128, Account>,
    savepoints: Vec<Savepoint>,
}

impl Inner {
    fn record(&mut self, op: UndoOp) {
        if let Some(sp) = self.savepoints.last_mut() {
            sp.ops.push(op);
        }
    }

    fn revert(&mut self, sp: Savepoint) {
        for op in sp.ops.into_iter().rev() {
            match op {
                UndoOp::DomainAdded(name) => {
                    self.domains.remove(&name);
                }
                UndoOp::DomainChanged(prev) => {
                    self.domains.insert(prev.name, *prev);
                }
                UndoOp::TokenAdded(domain, name) => {
                    self.tokens.remove(&(domain, name));
                }
                UndoOp::TokenChanged(prev) => {
                    self.tokens.insert((prev.domain, prev.name), *prev);
                }
                UndoOp::GroupAdded(name) => {
                    self.groups.remove(&name);
                }
                UndoOp::GroupChanged(prev) => {
                    self.groups.insert(prev.name, *prev);
                }
                UndoOp::AccountAdded(name) => {
                    self.accounts.remove(&name);
                }
                UndoOp::AccountChanged(prev) => {
                    self.accounts.insert(prev.name, *prev);
                }
            }
        }
    }
}

/// Cheap-clone handle to the shared store.
#[derive(Clone)]
pub struct TokenStore(Arc<RwLock<Inner>>);

impl TokenStore {
    pub fn open(dir: &Path) -> Result<Self, TokenDbError> {
        std::fs::create_dir_all(dir).map_err(|e| TokenDbError::Io(e.to_string()))?;
        Ok(TokenStore(Arc::new(RwLock::new(Inner::default()))))
    }

    /// In-memory store for tests and tools.
    pub fn volatile() -> Self {
        TokenStore(Arc::new(RwLock::new(Inner::default())))
    }

    // --- savepoints ---

    /// Opens a savepoint tagged `seq`. Tags must strictly increase.
    pub fn new_savepoint_session(&self, seq: i64) -> Result<SavepointSession, TokenDbError> {
        let mut inner = self.0.write();
        if let Some(last) = inner.savepoints.last() {
            if last.seq >= seq {
                return Err(TokenDbError::SavepointOrder(seq));
            }
        }
        inner.savepoints.push(Savepoint {
            seq,
            ops: Vec::new(),
        });
        Ok(SavepointSession {
            store: self.clone(),
            seq,
            open: true,
        })
    }

    /// Reverts and removes the newest savepoint.
    pub fn rollback_to_latest_savepoint(&self) -> Result<(), TokenDbError> {
        let mut inner = self.0.write();
        let sp = inner.savepoints.pop().ok_or(TokenDbError::NoSavepoint)?;
        inner.revert(sp);
        Ok(())
    }

    /// Folds the newest savepoint into its predecessor, so both commit or
    /// revert together. Squashing the only savepoint keeps it as is.
    pub fn squash_latest_savepoint(&self) -> Result<(), TokenDbError> {
        let mut inner = self.0.write();
        let sp = inner.savepoints.pop().ok_or(TokenDbError::NoSavepoint)?;
        match inner.savepoints.last_mut() {
            Some(parent) => parent.ops.extend(sp.ops),
            None => inner.savepoints.push(sp),
        }
        Ok(())
    }

    /// Discards every savepoint tagged at or below `seq`, making the
    /// corresponding changes permanent.
    pub fn pop_savepoints(&self, seq: i64) {
        let mut inner = self.0.write();
        let keep = inner
            .savepoints
            .iter()
            .position(|sp| sp.seq > seq)
            .unwrap_or(inner.savepoints.len());
        inner.savepoints.drain(..keep);
    }

    pub fn savepoint_count(&self) -> usize {
        self.0.read().savepoints.len()
    }

    pub fn latest_savepoint_seq(&self) -> Option<i64> {
        self.0.read().savepoints.last().map(|sp| sp.seq)
    }

    // --- domains ---

    pub fn domain_exists(&self, name: &Name128) -> bool {
        self.0.read().domains.contains_key(name)
    }

    pub fn read_domain(&self, name: &Name128) -> Result<Domain, TokenDbError> {
        self.0
            .read()
            .domains
            .get(name)
            .cloned()
            .ok_or(TokenDbError::DomainNotFound(*name))
    }

    pub fn add_domain(&self, domain: Domain) -> Result<(), TokenDbError> {
        let mut inner = self.0.write();
        if inner.domains.contains_key(&domain.name) {
            return Err(TokenDbError::DomainExists(domain.name));
        }
        inner.record(UndoOp::DomainAdded(domain.name));
        inner.domains.insert(domain.name, domain);
        Ok(())
    }

    pub fn update_domain(
        &self,
        name: &Name128,
        f: impl FnOnce(&mut Domain),
    ) -> Result<(), TokenDbError> {
        let mut inner = self.0.write();
        let prev = inner
            .domains
            .get(name)
            .cloned()
            .ok_or(TokenDbError::DomainNotFound(*name))?;
        inner.record(UndoOp::DomainChanged(Box::new(prev)));
        f(inner.domains.get_mut(name).expect("checked above"));
        Ok(())
    }

    // --- tokens ---

    pub fn token_exists(&self, domain: &Name128, name: &Name128) -> bool {
        self.0.read().tokens.contains_key(&(*domain, *name))
    }

    pub fn read_token(&self, domain: &Name128, name: &Name128) -> Result<TokenDef, TokenDbError> {
        self.0
            .read()
            .tokens
            .get(&(*domain, *name))
            .cloned()
            .ok_or(TokenDbError::TokenNotFound(*domain, *name))
    }

    pub fn add_token(&self, token: TokenDef) -> Result<(), TokenDbError> {
        let mut inner = self.0.write();
        let key = (token.domain, token.name);
        if inner.tokens.contains_key(&key) {
            return Err(TokenDbError::TokenExists(token.domain, token.name));
        }
        inner.record(UndoOp::TokenAdded(token.domain, token.name));
        inner.tokens.insert(key, token);
        Ok(())
    }

    pub fn update_token(
        &self,
        domain: &Name128,
        name: &Name128,
        f: impl FnOnce(&mut TokenDef),
    ) -> Result<(), TokenDbError> {
        let mut inner = self.0.write();
        let key = (*domain, *name);
        let prev = inner
            .tokens
            .get(&key)
            .cloned()
            .ok_or(TokenDbError::TokenNotFound(*domain, *name))?;
        inner.record(UndoOp::TokenChanged(Box::new(prev)));
        f(inner.tokens.get_mut(&key).expect("checked above"));
        Ok(())
    }

    // --- groups ---

    pub fn group_exists(&self, name: &Name128) -> bool {
        self.0.read().groups.contains_key(name)
    }

    pub fn read_group(&self, name: &Name128) -> Result<Group, TokenDbError> {
        self.0
            .read()
            .groups
            .get(name)
            .cloned()
            .ok_or(TokenDbError::GroupNotFound(*name))
    }

    pub fn add_group(&self, group: Group) -> Result<(), TokenDbError> {
        let mut inner = self.0.write();
        if inner.groups.contains_key(&group.name) {
            return Err(TokenDbError::GroupExists(group.name));
        }
        inner.record(UndoOp::GroupAdded(group.name));
        inner.groups.insert(group.name, group);
        Ok(())
    }

    pub fn update_group(
        &self,
        name: &Name128,
        f: impl FnOnce(&mut Group),
    ) -> Result<(), TokenDbError> {
        let mut inner = self.0.write();
        let prev = inner
            .groups
            .get(name)
            .cloned()
            .ok_or(TokenDbError::GroupNotFound(*name))?;
        inner.record(UndoOp::GroupChanged(Box::new(prev)));
        f(inner.groups.get_mut(name).expect("checked above"));
        Ok(())
    }

    // --- accounts ---

    pub fn account_exists(&self, name: &Name128) -> bool {
        self.0.read().accounts.contains_key(name)
    }

    pub fn read_account(&self, name: &Name128) -> Result<Account, TokenDbError> {
        self.0
            .read()
            .accounts
            .get(name)
            .cloned()
            .ok_or(TokenDbError::AccountNotFound(*name))
    }

    pub fn add_account(&self, account: Account) -> Result<(), TokenDbError> {
        let mut inner = self.0.write();
        if inner.accounts.contains_key(&account.name) {
            return Err(TokenDbError::AccountExists(account.name));
        }
        inner.record(UndoOp::AccountAdded(account.name));
        inner.accounts.insert(account.name, account);
        Ok(())
    }

    pub fn update_account(
        &self,
        name: &Name128,
        f: impl FnOnce(&mut Account),
    ) -> Result<(), TokenDbError> {
        let mut inner = self.0.write();
        let prev = inner
            .accounts
            .get(name)
            .cloned()
            .ok_or(TokenDbError::AccountNotFound(*name))?;
        inner.record(UndoOp::AccountChanged(Box::new(prev)));
        f(inner.accounts.get_mut(name).expect("checked above"));
        Ok(())
    }

    /// Digest over the full store contents, savepoints excluded. Used to
    /// assert bit-exact rollback in tests.
    pub fn digest(&self) -> Sha256Hash {
        let inner = self.0.read();
        let domains: Vec<_> = inner.domains.values().collect();
        let tokens: Vec<_> = inner.tokens.values().collect();
        let groups: Vec<_> = inner.groups.values().collect();
        let accounts: Vec<_> = inner.accounts.values().collect();
        let bytes = postcard::to_allocvec(&(domains, tokens, groups, accounts))
            .expect("token records are serializable");
        bytes.hash()
    }
}

/// RAII guard over one savepoint.
pub struct SavepointSession {
    store: TokenStore,
    seq: i64,
    open: bool,
}

impl SavepointSession {
    pub fn seq(&self) -> i64 {
        self.seq
    }

    /// Keeps the savepoint on the stack: the changes survive this session
    /// and can later be reverted by
    /// [`TokenStore::rollback_to_latest_savepoint`] or discarded by
    /// [`TokenStore::pop_savepoints`].
    pub fn accept(mut self) {
        self.open = false;
    }

    /// Merges this savepoint into the enclosing one; the changes now live
    /// or die with it.
    pub fn squash(mut self) {
        self.open = false;
        if let Err(e) = self.store.squash_latest_savepoint() {
            warn!("failed to squash savepoint session: {}", e);
        }
    }
}

impl Drop for SavepointSession {
    fn drop(&mut self) {
        if self.open {
            if let Err(e) = self.store.rollback_to_latest_savepoint() {
                warn!("failed to roll back savepoint session: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use keys::PublicKey;
    use primitives::{Authority, Coin, Timestamp};

    use super::*;

    fn key(byte: u8) -> PublicKey {
        PublicKey::from([byte; PublicKey::SIZE])
    }

    fn domain(name: &str) -> Domain {
        Domain {
            name: name.parse().unwrap(),
            creator: key(1),
            created_at: Timestamp::from_secs(0),
            issue: Authority::single_key(key(1)),
            transfer: Authority::owner(),
            manage: Authority::single_key(key(1)),
        }
    }

    #[test]
    fn it_rolls_back_a_dropped_session() {
        let store = TokenStore::volatile();
        store.add_domain(domain("base")).unwrap();
        let before = store.digest();

        {
            let _session = store.new_savepoint_session(1).unwrap();
            store.add_domain(domain("other")).unwrap();
            store
                .update_domain(&"base".parse().unwrap(), |d| {
                    d.manage = Authority::single_key(key(7));
                })
                .unwrap();
            assert_ne!(store.digest(), before);
        }

        assert_eq!(store.digest(), before);
        assert!(!store.domain_exists(&"other".parse().unwrap()));
    }

    #[test]
    fn it_pops_accepted_savepoints_in_order() {
        let store = TokenStore::volatile();

        let s1 = store.new_savepoint_session(1).unwrap();
        store.add_domain(domain("one")).unwrap();
        s1.accept();

        let s2 = store.new_savepoint_session(2).unwrap();
        store.add_domain(domain("two")).unwrap();
        s2.accept();

        assert_eq!(store.savepoint_count(), 2);
        store.pop_savepoints(1);
        assert_eq!(store.savepoint_count(), 1);

        // Savepoint 2 can still be rolled back; savepoint 1 is permanent.
        store.rollback_to_latest_savepoint().unwrap();
        assert!(store.domain_exists(&"one".parse().unwrap()));
        assert!(!store.domain_exists(&"two".parse().unwrap()));
        assert_eq!(
            store.rollback_to_latest_savepoint(),
            Err(TokenDbError::NoSavepoint)
        );
    }

    #[test]
    fn it_enforces_monotonic_savepoint_tags() {
        let store = TokenStore::volatile();
        store.new_savepoint_session(5).unwrap().accept();
        assert!(matches!(
            store.new_savepoint_session(5),
            Err(TokenDbError::SavepointOrder(5))
        ));
    }

    #[test]
    fn it_restores_account_balances() {
        let store = TokenStore::volatile();
        store
            .add_account(Account {
                name: "alice".parse().unwrap(),
                owner: vec![key(1)],
                balance: Coin::from_units(100),
                created_at: Timestamp::from_secs(0),
            })
            .unwrap();

        let session = store.new_savepoint_session(1).unwrap();
        store
            .update_account(&"alice".parse().unwrap(), |a| {
                a.balance = Coin::from_units(40);
            })
            .unwrap();
        session.accept();

        store.rollback_to_latest_savepoint().unwrap();
        assert_eq!(
            store
                .read_account(&"alice".parse().unwrap())
                .unwrap()
                .balance,
            Coin::from_units(100)
        );
    }
}
