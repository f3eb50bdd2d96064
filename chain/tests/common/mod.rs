//! Shared fixture: a controller over temporary directories with full
//! control over producer keys, block production and transaction building.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use rand_core::OsRng;
use tempfile::TempDir;

use block::{
    SignaturePair, SignedBlock, SignedTransaction, Transaction, TransactionMetadata,
};
use keys::KeyPair;
use primitives::{BlockTimestamp, Genesis, Name, ProducerKey, Timestamp};
use veris_chain::{ChainError, Config, Controller, TransactionTrace};

pub const INITIAL_PRODUCER: &str = "veris";
pub const SECOND_PRODUCER: &str = "beta";

pub struct TestChain {
    pub controller: Controller,
    pub genesis: Genesis,
    pub producer_keys: BTreeMap<Name, KeyPair>,
    _dir: TempDir,
}

impl TestChain {
    /// A fresh single-producer chain with a brand new genesis key.
    pub fn new() -> Self {
        let initial = KeyPair::generate(&mut OsRng);
        let genesis = Genesis::new(BlockTimestamp::from_slot(0), initial.public);
        Self::with_genesis(genesis, initial)
    }

    pub fn with_genesis(genesis: Genesis, initial: KeyPair) -> Self {
        let dir = TempDir::new().unwrap();
        let config = Config::under(dir.path(), genesis.clone());
        let controller = Controller::new(config).unwrap();

        let mut producer_keys = BTreeMap::new();
        producer_keys.insert(INITIAL_PRODUCER.parse().unwrap(), initial);

        TestChain {
            controller,
            genesis,
            producer_keys,
            _dir: dir,
        }
    }

    /// A second node on the same genesis, sharing the producer keys.
    pub fn replica(&self) -> Self {
        let dir = TempDir::new().unwrap();
        let config = Config::under(dir.path(), self.genesis.clone());
        let controller = Controller::new(config).unwrap();
        TestChain {
            controller,
            genesis: self.genesis.clone(),
            producer_keys: self.producer_keys.clone(),
            _dir: dir,
        }
    }

    pub fn head_time(&self) -> BlockTimestamp {
        self.controller.head_block_time()
    }

    /// Produces and commits one block at `when` carrying `trxs`; panics if
    /// any transaction does not execute. Returns the committed block.
    pub fn produce_block_at(
        &mut self,
        when: BlockTimestamp,
        confirm: u16,
        trxs: Vec<SignedTransaction>,
    ) -> SignedBlock {
        for trace in self.try_produce_block_at(when, confirm, trxs) {
            assert!(
                trace.is_executed(),
                "transaction failed during production: {:?}",
                trace.error()
            );
        }
        self.controller.head_block_state().block.clone()
    }

    /// Like `produce_block_at` but hands back the traces instead of
    /// asserting on them.
    pub fn try_produce_block_at(
        &mut self,
        when: BlockTimestamp,
        confirm: u16,
        trxs: Vec<SignedTransaction>,
    ) -> Vec<Arc<TransactionTrace>> {
        self.controller.start_block(when, confirm).unwrap();
        let mut traces = Vec::new();
        for trx in trxs {
            let meta = Arc::new(TransactionMetadata::new(trx));
            traces.push(self.controller.push_transaction(meta, None, false).unwrap());
        }
        self.finish_block();
        traces
    }

    /// Finalizes, signs (with the scheduled producer's key) and commits
    /// the pending block.
    pub fn finish_block(&mut self) {
        self.controller.finalize_block().unwrap();
        let producer = self
            .controller
            .pending_block_state()
            .expect("pending block exists")
            .producer();
        let pair = self
            .producer_keys
            .get(&producer)
            .expect("producer key known to fixture")
            .clone();
        self.controller
            .sign_block(|digest| pair.sign(digest.as_bytes()))
            .unwrap();
        self.controller.commit_block().unwrap();
    }

    pub fn produce_empty(&mut self) -> SignedBlock {
        self.produce_block_at(self.head_time().next(), 0, vec![])
    }

    /// Installs a two-producer schedule (the initial producer plus
    /// `beta`) and produces blocks until it is active. Returns once the
    /// active schedule has version 1.
    pub fn adopt_two_producer_schedule(&mut self) {
        let beta = KeyPair::generate(&mut OsRng);
        let beta_name: Name = SECOND_PRODUCER.parse().unwrap();
        self.producer_keys.insert(beta_name, beta.clone());

        let schedule = vec![
            ProducerKey {
                producer_name: INITIAL_PRODUCER.parse().unwrap(),
                signing_key: self.producer_keys[&INITIAL_PRODUCER.parse::<Name>().unwrap()]
                    .public,
            },
            ProducerKey {
                producer_name: beta_name,
                signing_key: beta.public,
            },
        ];

        // Propose mid-block, then let the pending/active promotion run its
        // course over the following blocks.
        self.controller
            .start_block(self.controller.head_block_time().next(), 0)
            .unwrap();
        assert!(self
            .controller
            .set_proposed_producers(schedule)
            .unwrap());
        self.finish_block();

        while self.controller.active_producers().version == 0 {
            self.produce_empty();
        }
        assert_eq!(self.controller.active_producers().producers.len(), 2);
    }

    /// The slot at or after `from` whose scheduled producer is `name`.
    pub fn slot_for_producer(&self, from: BlockTimestamp, name: &str) -> BlockTimestamp {
        let name: Name = name.parse().unwrap();
        let schedule = self.controller.active_producers();
        let mut when = from;
        loop {
            if schedule.scheduled_producer(when).producer_name == name {
                return when;
            }
            when = when.next();
        }
    }

    /// A signed transaction carrying `actions`, TaPoS-bound to the
    /// current head and signed by `signers`.
    pub fn make_trx(
        &self,
        actions: Vec<block::Action>,
        signers: &[&KeyPair],
    ) -> SignedTransaction {
        let head_id = self.controller.head_block_id();
        let (ref_block_num, ref_block_prefix) = Transaction::tapos_of(&head_id);
        let expiration = self
            .head_time()
            .to_timestamp()
            .checked_add_secs(120)
            .unwrap();
        sign_trx(
            Transaction {
                expiration,
                ref_block_num,
                ref_block_prefix,
                actions,
            },
            signers,
        )
    }

    pub fn push_signed_trx(
        &mut self,
        trx: SignedTransaction,
    ) -> Result<Arc<TransactionTrace>, ChainError> {
        let meta = Arc::new(TransactionMetadata::new(trx));
        self.controller.push_transaction(meta, None, false)
    }
}

pub fn sign_trx(trx: Transaction, signers: &[&KeyPair]) -> SignedTransaction {
    let id = trx.id();
    let signatures = signers
        .iter()
        .map(|pair| SignaturePair {
            public_key: pair.public,
            signature: pair.sign(id.as_bytes()),
        })
        .collect();
    SignedTransaction { trx, signatures }
}

pub fn expiration_after(when: BlockTimestamp, secs: u64) -> Timestamp {
    when.to_timestamp().checked_add_secs(secs).unwrap()
}
