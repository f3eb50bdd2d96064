//! The indexed chain-state store.
//!
//! Holds the block-summary ring used for TaPoS validation, the global and
//! dynamic-global property singletons and the input-transaction
//! deduplication index. All mutation is captured by strictly LIFO undo
//! layers: a layer per started session, reverted on drop unless the session
//! was pushed, discarded wholesale by [`StateStore::commit`] once the
//! corresponding block is irreversible.
//!
//! The store is memory-resident; durability comes from replaying the block
//! log at startup. The configured directory is created and reserved for the
//! store either way.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use log::warn;
use parking_lot::RwLock;
use thiserror::Error;

use hash::{Hash, Sha256Hash};
use primitives::{policy, Timestamp};

mod objects;

pub use objects::{DynamicGlobalPropertyObject, GlobalPropertyObject};

#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum StateStoreError {
    #[error("state store is read only")]
    ReadOnly,
    #[error("cannot set the revision while undo sessions are active")]
    SessionsActive,
    #[error("no undo layers to revert")]
    NothingToUndo,
    #[error("state store io: {0}")]
    Io(String),
}

enum UndoOp {
    Summary {
        slot: u16,
        prev: Sha256Hash,
    },
    Global {
        prev: Box<GlobalPropertyObject>,
    },
    Dynamic {
        prev: DynamicGlobalPropertyObject,
    },
    TrxInserted {
        id: Sha256Hash,
    },
    TrxRemoved {
        id: Sha256Hash,
        expiration: Timestamp,
    },
}

struct UndoLayer {
    revision: i64,
    ops: Vec<UndoOp>,
}

struct Inner {
    read_only: bool,
    summaries: Vec<Sha256Hash>,
    global: GlobalPropertyObject,
    dynamic: DynamicGlobalPropertyObject,
    transactions: BTreeMap<Sha256Hash, Timestamp>,
    by_expiration: BTreeSet<(Timestamp, Sha256Hash)>,
    undo_stack: Vec<UndoLayer>,
    revision: i64,
}

impl Inner {
    fn record(&mut self, op: UndoOp) {
        if let Some(layer) = self.undo_stack.last_mut() {
            layer.ops.push(op);
        }
    }

    fn revert(&mut self, layer: UndoLayer) {
        for op in layer.ops.into_iter().rev() {
            match op {
                UndoOp::Summary { slot, prev } => {
                    self.summaries[slot as usize] = prev;
                }
                UndoOp::Global { prev } => {
                    self.global = *prev;
                }
                UndoOp::Dynamic { prev } => {
                    self.dynamic = prev;
                }
                UndoOp::TrxInserted { id } => {
                    if let Some(expiration) = self.transactions.remove(&id) {
                        self.by_expiration.remove(&(expiration, id));
                    }
                }
                UndoOp::TrxRemoved { id, expiration } => {
                    self.transactions.insert(id, expiration);
                    self.by_expiration.insert((expiration, id));
                }
            }
        }
    }
}

/// Cheap-clone handle to the shared store.
#[derive(Clone)]
pub struct StateStore(Arc<RwLock<Inner>>);

impl StateStore {
    pub fn open(dir: &Path, read_only: bool) -> Result<Self, StateStoreError> {
        std::fs::create_dir_all(dir).map_err(|e| StateStoreError::Io(e.to_string()))?;
        Ok(StateStore(Arc::new(RwLock::new(Inner {
            read_only,
            summaries: vec![Sha256Hash::zero(); policy::BLOCK_SUMMARY_SLOTS],
            global: GlobalPropertyObject::default(),
            dynamic: DynamicGlobalPropertyObject::default(),
            transactions: BTreeMap::new(),
            by_expiration: BTreeSet::new(),
            undo_stack: Vec::new(),
            revision: 0,
        }))))
    }

    /// In-memory store for tests and tools.
    pub fn volatile() -> Self {
        StateStore(Arc::new(RwLock::new(Inner {
            read_only: false,
            summaries: vec![Sha256Hash::zero(); policy::BLOCK_SUMMARY_SLOTS],
            global: GlobalPropertyObject::default(),
            dynamic: DynamicGlobalPropertyObject::default(),
            transactions: BTreeMap::new(),
            by_expiration: BTreeSet::new(),
            undo_stack: Vec::new(),
            revision: 0,
        })))
    }

    pub fn is_read_only(&self) -> bool {
        self.0.read().read_only
    }

    pub fn revision(&self) -> i64 {
        self.0.read().revision
    }

    /// Resets the revision counter. Only legal while no undo layers exist.
    pub fn set_revision(&self, revision: i64) -> Result<(), StateStoreError> {
        let mut inner = self.0.write();
        if !inner.undo_stack.is_empty() {
            return Err(StateStoreError::SessionsActive);
        }
        inner.revision = revision;
        Ok(())
    }

    /// Opens a new undo layer. The returned session rolls the layer back on
    /// drop unless [`UndoSession::push`] is called.
    pub fn start_undo_session(&self) -> Result<UndoSession, StateStoreError> {
        let mut inner = self.0.write();
        if inner.read_only {
            return Err(StateStoreError::ReadOnly);
        }
        inner.revision += 1;
        let revision = inner.revision;
        inner.undo_stack.push(UndoLayer {
            revision,
            ops: Vec::new(),
        });
        Ok(UndoSession {
            store: self.clone(),
            revision,
            open: true,
        })
    }

    /// Reverts the newest undo layer.
    pub fn undo(&self) -> Result<(), StateStoreError> {
        let mut inner = self.0.write();
        let layer = inner
            .undo_stack
            .pop()
            .ok_or(StateStoreError::NothingToUndo)?;
        inner.revision -= 1;
        inner.revert(layer);
        Ok(())
    }

    /// Folds the newest undo layer into its parent, so both commit or
    /// revert together. Squashing the only layer is equivalent to keeping
    /// it.
    pub fn squash(&self) -> Result<(), StateStoreError> {
        let mut inner = self.0.write();
        let layer = inner
            .undo_stack
            .pop()
            .ok_or(StateStoreError::NothingToUndo)?;
        match inner.undo_stack.last_mut() {
            Some(parent) => {
                parent.ops.extend(layer.ops);
                inner.revision -= 1;
            }
            None => inner.undo_stack.push(layer),
        }
        Ok(())
    }

    /// Discards all undo layers with a revision at or below `revision`,
    /// making their changes permanent.
    pub fn commit(&self, revision: i64) {
        let mut inner = self.0.write();
        let keep = inner
            .undo_stack
            .iter()
            .position(|layer| layer.revision > revision)
            .unwrap_or(inner.undo_stack.len());
        inner.undo_stack.drain(..keep);
    }

    pub fn block_summary(&self, slot: u16) -> Sha256Hash {
        self.0.read().summaries[slot as usize]
    }

    pub fn set_block_summary(&self, slot: u16, id: Sha256Hash) {
        let mut inner = self.0.write();
        let prev = inner.summaries[slot as usize];
        inner.record(UndoOp::Summary { slot, prev });
        inner.summaries[slot as usize] = id;
    }

    pub fn global(&self) -> GlobalPropertyObject {
        self.0.read().global.clone()
    }

    pub fn modify_global(&self, f: impl FnOnce(&mut GlobalPropertyObject)) {
        let mut inner = self.0.write();
        let prev = Box::new(inner.global.clone());
        inner.record(UndoOp::Global { prev });
        f(&mut inner.global);
    }

    pub fn dynamic(&self) -> DynamicGlobalPropertyObject {
        self.0.read().dynamic
    }

    pub fn modify_dynamic(&self, f: impl FnOnce(&mut DynamicGlobalPropertyObject)) {
        let mut inner = self.0.write();
        let prev = inner.dynamic;
        inner.record(UndoOp::Dynamic { prev });
        f(&mut inner.dynamic);
    }

    /// Hands out the next global action sequence number.
    pub fn next_action_sequence(&self) -> u64 {
        let mut inner = self.0.write();
        let prev = inner.dynamic;
        inner.record(UndoOp::Dynamic { prev });
        inner.dynamic.global_action_sequence += 1;
        inner.dynamic.global_action_sequence
    }

    /// Records an input transaction in the deduplication index. Returns
    /// false when the id is already present.
    pub fn insert_transaction(&self, id: Sha256Hash, expiration: Timestamp) -> bool {
        let mut inner = self.0.write();
        if inner.transactions.contains_key(&id) {
            return false;
        }
        inner.record(UndoOp::TrxInserted { id });
        inner.transactions.insert(id, expiration);
        inner.by_expiration.insert((expiration, id));
        true
    }

    pub fn contains_transaction(&self, id: &Sha256Hash) -> bool {
        self.0.read().transactions.contains_key(id)
    }

    pub fn transaction_count(&self) -> usize {
        self.0.read().transactions.len()
    }

    /// Drops every deduplication entry that expired strictly before `now`.
    pub fn clear_expired_transactions(&self, now: Timestamp) -> usize {
        let mut inner = self.0.write();
        let mut removed = 0;
        loop {
            let next = inner.by_expiration.iter().next().copied();
            match next {
                Some((expiration, id)) if expiration < now => {
                    inner.by_expiration.remove(&(expiration, id));
                    inner.transactions.remove(&id);
                    inner.record(UndoOp::TrxRemoved { id, expiration });
                    removed += 1;
                }
                _ => break,
            }
        }
        removed
    }

    /// Digest over the full store contents, undo layers excluded. Used to
    /// assert bit-exact rollback in tests.
    pub fn digest(&self) -> Sha256Hash {
        let inner = self.0.read();
        let trxs: Vec<(&Sha256Hash, &Timestamp)> = inner.transactions.iter().collect();
        let bytes = postcard::to_allocvec(&(
            &inner.summaries,
            &inner.global,
            &inner.dynamic,
            &trxs,
        ))
        .expect("state objects are serializable");
        bytes.hash()
    }
}

/// RAII guard over one undo layer.
pub struct UndoSession {
    store: StateStore,
    revision: i64,
    open: bool,
}

impl UndoSession {
    pub fn revision(&self) -> i64 {
        self.revision
    }

    /// Keeps the layer on the stack: the changes survive this session and
    /// can only be reverted by [`StateStore::undo`] or discarded by
    /// [`StateStore::commit`].
    pub fn push(mut self) {
        self.open = false;
    }

    /// Merges this session's layer into the enclosing one; the changes
    /// now live or die with the parent session.
    pub fn squash(mut self) {
        self.open = false;
        if let Err(e) = self.store.squash() {
            warn!("failed to squash undo session: {}", e);
        }
    }
}

impl Drop for UndoSession {
    fn drop(&mut self) {
        if self.open {
            if let Err(e) = self.store.undo() {
                warn!("failed to roll back undo session: {}", e);
            }
        }
    }
}
