//! Validation utilities and the producer-schedule proposal entry point.

use std::collections::BTreeSet;

use keys::PublicKey;
use primitives::{ProducerKey, ProducerSchedule};

use block::Transaction;

use crate::authority_checker::AuthorityChecker;
use crate::error::ChainError;
use crate::transaction_context;

use super::Controller;

impl Controller {
    /// Asserts the transaction is inside its expiration window relative
    /// to the pending block time.
    pub fn validate_expiration(&self, trx: &Transaction) -> Result<(), ChainError> {
        let pending_block_time = self.pending_block_time()?;
        let configuration = self.state.global().configuration;
        transaction_context::validate_expiration(trx, pending_block_time, &configuration)
    }

    /// Asserts the transaction's reference block prefix matches the
    /// summary ring.
    pub fn validate_tapos(&self, trx: &Transaction) -> Result<(), ChainError> {
        transaction_context::validate_tapos(trx, &self.state)
    }

    /// Proposes a new producer schedule. Returns false (without touching
    /// anything) when a proposal is already in flight for an earlier
    /// block or the lineup would not change.
    pub fn set_proposed_producers(
        &mut self,
        producers: Vec<ProducerKey>,
    ) -> Result<bool, ChainError> {
        let gpo = self.state.global();
        let cur_block_num = self.head_block_num() + 1;

        if let Some(proposed_num) = gpo.proposed_schedule_block_num {
            if proposed_num != cur_block_num {
                // An earlier proposal is still waiting to become pending.
                return Ok(false);
            }
            if gpo.proposed_schedule.same_producers(&producers) {
                return Ok(false);
            }
        }

        let (version, unchanged) = {
            let pending = self.pending.as_ref().ok_or(ChainError::NoPendingBlock)?;
            let header_state = &pending.block_state.header_state;
            let base = if header_state.pending_schedule.is_empty() {
                &header_state.active_schedule
            } else {
                &header_state.pending_schedule
            };
            (base.version + 1, base.same_producers(&producers))
        };
        if unchanged {
            return Ok(false);
        }

        let schedule = ProducerSchedule::new(version, producers);
        self.state.modify_global(|g| {
            g.proposed_schedule_block_num = Some(cur_block_num);
            g.proposed_schedule = schedule;
        });
        Ok(true)
    }

    /// Runs the authorization checker over every action and returns the
    /// candidate keys it actually consumed.
    pub fn get_required_keys(
        &self,
        trx: &Transaction,
        candidate_keys: &BTreeSet<PublicKey>,
    ) -> Result<BTreeSet<PublicKey>, ChainError> {
        let mut checker = AuthorityChecker::new(&self.tokens, candidate_keys.clone());
        for action in &trx.actions {
            if !checker.satisfied(action) {
                return Err(ChainError::TxMissingSigs {
                    name: action.name,
                    domain: action.domain,
                    key: action.key,
                });
            }
        }
        Ok(checker.used_keys())
    }
}
