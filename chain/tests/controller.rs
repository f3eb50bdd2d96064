//! Block lifecycle and transaction application against a single node.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand_core::OsRng;

use block::{Transaction, TransactionMetadata};
use keys::KeyPair;
use primitives::{Authority, Coin, Name128};
use veris_chain::contracts::{
    IssueToken, NewAccount, NewDomain, Transfer, TransferFund, UpdateOwner,
};
use veris_chain::{ChainError, ChainEvent, ContractError};

use common::{sign_trx, TestChain};

fn name128(s: &str) -> Name128 {
    s.parse().unwrap()
}

#[test]
fn it_commits_an_empty_block() {
    let mut chain = TestChain::new();
    let genesis_num = chain.controller.head_block_num();

    let block = chain.produce_empty();

    assert_eq!(chain.controller.head_block_num(), genesis_num + 1);

    // Both merkle roots over an empty list are the digest of the empty
    // byte string.
    let empty_root = utils::merkle::compute_root_from_hashes::<hash::Sha256Hash>(&[]);
    assert_eq!(block.header.action_mroot, empty_root);
    assert_eq!(block.header.transaction_mroot, empty_root);

    // The summary ring slot for the new block carries its id.
    let slot = (block.block_num() & 0xffff) as u16;
    assert_eq!(chain.controller.state_db().block_summary(slot), block.id());
}

#[test]
fn it_tracks_accounts_domains_tokens_and_funds() {
    let mut chain = TestChain::new();
    let alice = KeyPair::generate(&mut OsRng);
    let bob = KeyPair::generate(&mut OsRng);
    let issuer = KeyPair::generate(&mut OsRng);

    let accounts = chain.make_trx(
        vec![
            NewAccount {
                name: name128("alice"),
                owner: vec![alice.public],
            }
            .into_action(),
            NewAccount {
                name: name128("bob"),
                owner: vec![bob.public],
            }
            .into_action(),
        ],
        &[&alice, &bob],
    );
    let domain = chain.make_trx(
        vec![NewDomain {
            name: name128("cards"),
            creator: issuer.public,
            issue: Authority::single_key(issuer.public),
            transfer: Authority::owner(),
            manage: Authority::single_key(issuer.public),
        }
        .into_action()],
        &[&issuer],
    );
    chain.produce_block_at(chain.head_time().next(), 0, vec![accounts, domain]);

    let grant = chain
        .controller
        .get_global_properties()
        .configuration
        .account_grant;
    let tokens = chain.controller.token_db();
    assert_eq!(tokens.read_account(&name128("alice")).unwrap().balance, grant);
    assert!(tokens.domain_exists(&name128("cards")));

    // Issue a token to alice, have alice pass it to bob, and move some
    // funds the other way.
    let issue = chain.make_trx(
        vec![IssueToken {
            domain: name128("cards"),
            names: vec![name128("ace")],
            owner: vec![alice.public],
        }
        .into_action()],
        &[&issuer],
    );
    let pass = chain.make_trx(
        vec![Transfer {
            domain: name128("cards"),
            name: name128("ace"),
            to: vec![bob.public],
            memo: "enjoy".into(),
        }
        .into_action()],
        &[&alice],
    );
    let pay = chain.make_trx(
        vec![TransferFund {
            from: name128("alice"),
            to: name128("bob"),
            amount: Coin::from_units(250),
            memo: "rent".into(),
        }
        .into_action()],
        &[&alice],
    );
    chain.produce_block_at(chain.head_time().next(), 0, vec![issue, pass, pay]);

    let tokens = chain.controller.token_db();
    assert_eq!(
        tokens
            .read_token(&name128("cards"), &name128("ace"))
            .unwrap()
            .owner,
        vec![bob.public]
    );
    assert_eq!(
        tokens.read_account(&name128("alice")).unwrap().balance,
        grant.checked_sub(Coin::from_units(250)).unwrap()
    );
    assert_eq!(
        tokens.read_account(&name128("bob")).unwrap().balance,
        grant.checked_add(Coin::from_units(250)).unwrap()
    );
}

#[test]
fn an_unauthorized_transfer_leaves_no_footprint() {
    let mut chain = TestChain::new();
    let alice = KeyPair::generate(&mut OsRng);
    let mallory = KeyPair::generate(&mut OsRng);
    let issuer = KeyPair::generate(&mut OsRng);

    let setup = chain.make_trx(
        vec![
            NewDomain {
                name: name128("cards"),
                creator: issuer.public,
                issue: Authority::single_key(issuer.public),
                transfer: Authority::owner(),
                manage: Authority::single_key(issuer.public),
            }
            .into_action(),
            IssueToken {
                domain: name128("cards"),
                names: vec![name128("ace")],
                owner: vec![alice.public],
            }
            .into_action(),
        ],
        &[&issuer],
    );
    chain.produce_block_at(chain.head_time().next(), 0, vec![setup]);

    // Mallory signs a transfer of alice's token with her own key.
    let theft = chain.make_trx(
        vec![Transfer {
            domain: name128("cards"),
            name: name128("ace"),
            to: vec![mallory.public],
            memo: String::new(),
        }
        .into_action()],
        &[&mallory],
    );

    chain.controller.start_block(chain.head_time().next(), 0).unwrap();
    let state_digest = chain.controller.state_db().digest();
    let token_digest = chain.controller.token_db().digest();
    let receipts_before = chain
        .controller
        .pending_block_state()
        .unwrap()
        .block
        .transactions
        .len();

    let trace = chain.push_signed_trx(theft).unwrap();
    assert!(matches!(
        trace.error(),
        Some(ChainError::TxMissingSigs { .. })
    ));

    // No receipt, no actions, and both stores bit-identical: the failed
    // transaction left zero footprint.
    assert_eq!(chain.controller.state_db().digest(), state_digest);
    assert_eq!(chain.controller.token_db().digest(), token_digest);
    let pending = chain.controller.pending_block_state().unwrap();
    assert_eq!(pending.block.transactions.len(), receipts_before);
    assert!(pending.trxs().is_empty());
    assert_eq!(
        chain
            .controller
            .token_db()
            .read_token(&name128("cards"), &name128("ace"))
            .unwrap()
            .owner,
        vec![alice.public]
    );

    chain.controller.abort_block();
    assert_eq!(chain.controller.state_db().digest(), state_digest);
}

#[test]
fn a_blown_deadline_defers_the_transaction() {
    let mut chain = TestChain::new();
    let alice = KeyPair::generate(&mut OsRng);

    let create = chain.make_trx(
        vec![NewAccount {
            name: name128("alice"),
            owner: vec![alice.public],
        }
        .into_action()],
        &[&alice],
    );

    // Park the transaction in the unapplied map by aborting a block that
    // contained it.
    chain.controller.start_block(chain.head_time().next(), 0).unwrap();
    let meta = Arc::new(TransactionMetadata::new(create));
    let trace = chain
        .controller
        .push_transaction(meta.clone(), None, false)
        .unwrap();
    assert!(trace.is_executed());
    chain.controller.abort_block();
    assert_eq!(chain.controller.unapplied_transactions().len(), 1);

    // Retry with a deadline that is already over: deferred, retained.
    chain.controller.start_block(chain.head_time().next(), 0).unwrap();
    let deadline = Instant::now() - Duration::from_micros(1);
    let trace = chain
        .controller
        .push_transaction(meta.clone(), Some(deadline), false)
        .unwrap();
    assert!(matches!(
        trace.error(),
        Some(ChainError::DeadlineExceeded)
    ));
    assert_eq!(chain.controller.unapplied_transactions().len(), 1);

    // Retry without a deadline: executed, removed.
    let trace = chain.controller.push_transaction(meta, None, false).unwrap();
    assert!(trace.is_executed());
    assert!(chain.controller.unapplied_transactions().is_empty());
    chain.finish_block();
}

#[test]
fn an_objective_failure_drops_the_unapplied_entry() {
    let mut chain = TestChain::new();
    let alice = KeyPair::generate(&mut OsRng);
    let new_owner = KeyPair::generate(&mut OsRng);
    let bob = KeyPair::generate(&mut OsRng);

    let setup = chain.make_trx(
        vec![
            NewAccount {
                name: name128("alice"),
                owner: vec![alice.public],
            }
            .into_action(),
            NewAccount {
                name: name128("bob"),
                owner: vec![bob.public],
            }
            .into_action(),
        ],
        &[&alice, &bob],
    );
    chain.produce_block_at(chain.head_time().next(), 0, vec![setup]);

    // A payment signed by alice lands in the unapplied map via abort.
    let pay = chain.make_trx(
        vec![TransferFund {
            from: name128("alice"),
            to: name128("bob"),
            amount: Coin::from_units(1),
            memo: String::new(),
        }
        .into_action()],
        &[&alice],
    );
    chain.controller.start_block(chain.head_time().next(), 0).unwrap();
    let meta = Arc::new(TransactionMetadata::new(pay));
    assert!(chain
        .controller
        .push_transaction(meta.clone(), None, false)
        .unwrap()
        .is_executed());
    chain.controller.abort_block();
    assert_eq!(chain.controller.unapplied_transactions().len(), 1);

    // Alice's account changes hands; the parked payment now fails its
    // authority check and is dropped for good.
    let rekey = chain.make_trx(
        vec![UpdateOwner {
            name: name128("alice"),
            owner: vec![new_owner.public],
        }
        .into_action()],
        &[&alice],
    );
    chain.produce_block_at(chain.head_time().next(), 0, vec![rekey]);

    chain.controller.start_block(chain.head_time().next(), 0).unwrap();
    let trace = chain.controller.push_transaction(meta, None, false).unwrap();
    assert!(matches!(
        trace.error(),
        Some(ChainError::TxMissingSigs { .. })
    ));
    assert!(chain.controller.unapplied_transactions().is_empty());
    chain.controller.abort_block();
}

#[test]
fn it_rejects_a_mismatched_reference_block() {
    let mut chain = TestChain::new();
    let alice = KeyPair::generate(&mut OsRng);
    chain.produce_empty();

    let mut trx = Transaction {
        expiration: common::expiration_after(chain.head_time(), 60),
        ref_block_num: 5,
        ref_block_prefix: 0xDEAD_BEEF,
        actions: vec![NewAccount {
            name: name128("alice"),
            owner: vec![alice.public],
        }
        .into_action()],
    };

    chain.controller.start_block(chain.head_time().next(), 0).unwrap();
    assert!(matches!(
        chain.controller.validate_tapos(&trx),
        Err(ChainError::InvalidRefBlock)
    ));

    let trace = chain
        .push_signed_trx(sign_trx(trx.clone(), &[&alice]))
        .unwrap();
    assert!(matches!(
        trace.error(),
        Some(ChainError::InvalidRefBlock)
    ));

    // The same transaction with a proper reference passes.
    let (num, prefix) = Transaction::tapos_of(&chain.controller.head_block_id());
    trx.ref_block_num = num;
    trx.ref_block_prefix = prefix;
    assert!(chain.controller.validate_tapos(&trx).is_ok());
    let trace = chain.push_signed_trx(sign_trx(trx, &[&alice])).unwrap();
    assert!(trace.is_executed());
    chain.finish_block();
}

#[test]
fn it_enforces_the_expiration_window() {
    let mut chain = TestChain::new();
    let alice = KeyPair::generate(&mut OsRng);

    chain.controller.start_block(chain.head_time().next(), 0).unwrap();
    let pending = chain.controller.pending_block_time().unwrap();

    let action = NewAccount {
        name: name128("alice"),
        owner: vec![alice.public],
    }
    .into_action();
    let (num, prefix) = Transaction::tapos_of(&chain.controller.head_block_id());

    let expired = Transaction {
        expiration: primitives::Timestamp::from_millis(pending.as_millis() - 1),
        ref_block_num: num,
        ref_block_prefix: prefix,
        actions: vec![action.clone()],
    };
    assert!(matches!(
        chain.controller.validate_expiration(&expired),
        Err(ChainError::ExpiredTx { .. })
    ));

    let far = Transaction {
        expiration: pending.checked_add_secs(24 * 3600).unwrap(),
        ref_block_num: num,
        ref_block_prefix: prefix,
        actions: vec![action],
    };
    assert!(matches!(
        chain.controller.validate_expiration(&far),
        Err(ChainError::TxExpTooFar { .. })
    ));
    chain.controller.abort_block();
}

#[test]
fn it_deduplicates_input_transactions() {
    let mut chain = TestChain::new();
    let alice = KeyPair::generate(&mut OsRng);

    let create = chain.make_trx(
        vec![NewAccount {
            name: name128("alice"),
            owner: vec![alice.public],
        }
        .into_action()],
        &[&alice],
    );

    chain.controller.start_block(chain.head_time().next(), 0).unwrap();
    let first = Arc::new(TransactionMetadata::new(create.clone()));
    assert!(chain
        .controller
        .push_transaction(first, None, false)
        .unwrap()
        .is_executed());

    let again = Arc::new(TransactionMetadata::new(create));
    let trace = chain.controller.push_transaction(again, None, false).unwrap();
    assert!(matches!(trace.error(), Some(ChainError::TxDuplicate(_))));
    chain.finish_block();
}

#[test]
fn expired_dedup_entries_are_cleared_at_block_start() {
    let mut chain = TestChain::new();
    let alice = KeyPair::generate(&mut OsRng);

    // A short-lived transaction: expires two slots past the current head.
    let (num, prefix) = Transaction::tapos_of(&chain.controller.head_block_id());
    let trx = sign_trx(
        Transaction {
            expiration: common::expiration_after(chain.head_time(), 1),
            ref_block_num: num,
            ref_block_prefix: prefix,
            actions: vec![NewAccount {
                name: name128("alice"),
                owner: vec![alice.public],
            }
            .into_action()],
        },
        &[&alice],
    );
    chain.produce_block_at(chain.head_time().next(), 0, vec![trx]);
    assert_eq!(chain.controller.state_db().transaction_count(), 1);

    // Produce far enough in the future for the entry to expire.
    let later = primitives::BlockTimestamp::from_slot(chain.head_time().slot() + 10);
    chain.produce_block_at(later, 0, vec![]);
    assert_eq!(chain.controller.state_db().transaction_count(), 0);
}

#[test]
fn contract_errors_surface_in_traces() {
    let mut chain = TestChain::new();
    let alice = KeyPair::generate(&mut OsRng);
    let bob = KeyPair::generate(&mut OsRng);

    let setup = chain.make_trx(
        vec![
            NewAccount {
                name: name128("alice"),
                owner: vec![alice.public],
            }
            .into_action(),
            NewAccount {
                name: name128("bob"),
                owner: vec![bob.public],
            }
            .into_action(),
        ],
        &[&alice, &bob],
    );
    chain.produce_block_at(chain.head_time().next(), 0, vec![setup]);

    let grant = chain
        .controller
        .get_global_properties()
        .configuration
        .account_grant;
    let overdraft = chain.make_trx(
        vec![TransferFund {
            from: name128("alice"),
            to: name128("bob"),
            amount: grant.checked_add(Coin::from_units(1)).unwrap(),
            memo: String::new(),
        }
        .into_action()],
        &[&alice],
    );

    chain.controller.start_block(chain.head_time().next(), 0).unwrap();
    let trace = chain.push_signed_trx(overdraft).unwrap();
    assert!(matches!(
        trace.error(),
        Some(ChainError::Contract(ContractError::InsufficientBalance { .. }))
    ));

    // Balances are untouched by the failed transfer.
    assert_eq!(
        chain
            .controller
            .token_db()
            .read_account(&name128("alice"))
            .unwrap()
            .balance,
        grant
    );
    chain.controller.abort_block();
}

#[test]
fn it_promotes_proposed_schedules_through_pending_to_active() {
    let mut chain = TestChain::new();
    chain.adopt_two_producer_schedule();

    let active = chain.controller.active_producers();
    assert_eq!(active.version, 1);
    assert_eq!(active.producers.len(), 2);
    assert!(chain.controller.proposed_producers().is_none());
    assert!(chain.controller.pending_producers().is_empty());
}

#[test]
fn signals_fire_in_lifecycle_order_and_survive_panicking_listeners() {
    let mut chain = TestChain::new();
    let alice = KeyPair::generate(&mut OsRng);

    let header_count = Arc::new(AtomicUsize::new(0));
    let block_count = Arc::new(AtomicUsize::new(0));
    let trx_count = Arc::new(AtomicUsize::new(0));
    let applied_count = Arc::new(AtomicUsize::new(0));
    let irreversible_count = Arc::new(AtomicUsize::new(0));

    {
        let header_count = header_count.clone();
        let block_count = block_count.clone();
        let trx_count = trx_count.clone();
        let applied_count = applied_count.clone();
        let irreversible_count = irreversible_count.clone();
        chain.controller.subscribe(move |event: &ChainEvent| {
            match event {
                ChainEvent::AcceptedBlockHeader(_) => header_count.fetch_add(1, Ordering::SeqCst),
                ChainEvent::AcceptedBlock(_) => block_count.fetch_add(1, Ordering::SeqCst),
                ChainEvent::AcceptedTransaction(_) => trx_count.fetch_add(1, Ordering::SeqCst),
                ChainEvent::AppliedTransaction(_) => applied_count.fetch_add(1, Ordering::SeqCst),
                ChainEvent::IrreversibleBlock(_) => {
                    irreversible_count.fetch_add(1, Ordering::SeqCst)
                }
                ChainEvent::AcceptedConfirmation(_) => 0,
            };
        });
    }
    // A hostile subscriber must not be able to derail consensus.
    chain.controller.subscribe(|_event: &ChainEvent| {
        panic!("listener goes rogue");
    });

    let create = chain.make_trx(
        vec![NewAccount {
            name: name128("alice"),
            owner: vec![alice.public],
        }
        .into_action()],
        &[&alice],
    );
    chain.produce_block_at(chain.head_time().next(), 0, vec![create]);
    chain.produce_empty();

    assert_eq!(header_count.load(Ordering::SeqCst), 2);
    assert_eq!(block_count.load(Ordering::SeqCst), 2);
    assert_eq!(trx_count.load(Ordering::SeqCst), 1);
    assert_eq!(applied_count.load(Ordering::SeqCst), 1);
    // Single-producer chains make every committed block irreversible.
    assert!(irreversible_count.load(Ordering::SeqCst) >= 1);
}

#[test]
fn it_replays_the_block_log_on_restart() {
    let dir = tempfile::TempDir::new().unwrap();
    let initial = KeyPair::generate(&mut OsRng);
    let genesis = primitives::Genesis::new(primitives::BlockTimestamp::from_slot(0), initial.public);
    let alice = KeyPair::generate(&mut OsRng);

    let (expected_head, expected_tokens) = {
        let config = veris_chain::Config::under(dir.path(), genesis.clone());
        let mut controller = veris_chain::Controller::new(config).unwrap();

        // Produce a few blocks, one of which creates an account.
        for i in 1..=4u32 {
            controller
                .start_block(primitives::BlockTimestamp::from_slot(i), 0)
                .unwrap();
            if i == 2 {
                let head_id = controller.head_block_id();
                let (num, prefix) = Transaction::tapos_of(&head_id);
                let trx = sign_trx(
                    Transaction {
                        expiration: common::expiration_after(controller.head_block_time(), 120),
                        ref_block_num: num,
                        ref_block_prefix: prefix,
                        actions: vec![NewAccount {
                            name: name128("alice"),
                            owner: vec![alice.public],
                        }
                        .into_action()],
                    },
                    &[&alice],
                );
                let meta = Arc::new(TransactionMetadata::new(trx));
                assert!(controller
                    .push_transaction(meta, None, false)
                    .unwrap()
                    .is_executed());
            }
            controller.finalize_block().unwrap();
            let pair = initial.clone();
            controller
                .sign_block(|digest| pair.sign(digest.as_bytes()))
                .unwrap();
            controller.commit_block().unwrap();
        }

        // The log trails the head by one block, and the trailing block is
        // empty, so the token store after replay matches this digest.
        (controller.head_block_num() - 1, controller.token_db().digest())
    };

    let config = veris_chain::Config::under(dir.path(), genesis);
    let controller = veris_chain::Controller::new(config).unwrap();
    assert_eq!(controller.head_block_num(), expected_head);
    assert!(controller
        .token_db()
        .account_exists(&name128("alice")));
    assert_eq!(controller.token_db().digest(), expected_tokens);
}
