//! Evaluates whether a candidate key set satisfies the authority an action
//! requires.
//!
//! Routing: the three privileged domain operations check the domain's
//! `issue`/`transfer`/`manage` authority trees; creation actions pass (the
//! handler checks the payload's controlling keys against the signers);
//! everything else falls to the owner of whatever the action touches —
//! the account's owner set in the `account` meta-domain, the group's
//! managing key in the `group` meta-domain, the token's owner set
//! elsewhere.

use std::collections::BTreeSet;

use keys::PublicKey;
use primitives::{Authority, AuthorizerRef, GroupNode, Name128};
use tokendb::TokenStore;

use block::Action;

use crate::contracts::names;

pub struct AuthorityChecker<'a> {
    tokens: &'a TokenStore,
    candidate_keys: BTreeSet<PublicKey>,
    used_keys: BTreeSet<PublicKey>,
}

impl<'a> AuthorityChecker<'a> {
    pub fn new(tokens: &'a TokenStore, candidate_keys: BTreeSet<PublicKey>) -> Self {
        AuthorityChecker {
            tokens,
            candidate_keys,
            used_keys: BTreeSet::new(),
        }
    }

    /// Whether the candidate set satisfies this action's authority.
    /// Evaluation short-circuits and marks only the keys actually
    /// consumed.
    pub fn satisfied(&mut self, action: &Action) -> bool {
        match action.name {
            n if n == names::ISSUETOKEN => self.domain_authority(action, |d| d.issue.clone()),
            n if n == names::TRANSFER => self.domain_authority(action, |d| d.transfer.clone()),
            n if n == names::UPDATEDOMAIN => self.domain_authority(action, |d| d.manage.clone()),
            // Creation targets have no authority record yet; the apply
            // handler checks the payload's controlling keys.
            n if n == names::NEWDOMAIN || n == names::NEWGROUP || n == names::NEWACCOUNT => true,
            _ => self.owner_satisfied(&action.domain, &action.key),
        }
    }

    /// The subset of candidate keys consumed so far.
    pub fn used_keys(self) -> BTreeSet<PublicKey> {
        self.used_keys
    }

    fn domain_authority(
        &mut self,
        action: &Action,
        select: impl FnOnce(&tokendb::Domain) -> Authority,
    ) -> bool {
        match self.tokens.read_domain(&action.domain) {
            Ok(domain) => {
                let authority = select(&domain);
                self.authority_satisfied(&authority, &action.domain, &action.key)
            }
            Err(_) => false,
        }
    }

    fn authority_satisfied(
        &mut self,
        authority: &Authority,
        domain: &Name128,
        key: &Name128,
    ) -> bool {
        let threshold = authority.threshold as u64;
        let mut total: u64 = 0;
        for entry in &authority.authorizers {
            if total >= threshold {
                break;
            }
            let ok = match &entry.authorizer {
                AuthorizerRef::Key(k) => self.use_key(k),
                AuthorizerRef::Owner => self.owner_satisfied(domain, key),
                AuthorizerRef::Group(name) => match self.tokens.read_group(name) {
                    Ok(group) => self.node_satisfied(&group.root),
                    Err(_) => false,
                },
            };
            if ok {
                total += entry.weight as u64;
            }
        }
        total >= threshold
    }

    fn owner_satisfied(&mut self, domain: &Name128, key: &Name128) -> bool {
        if *domain == names::ACCOUNT_DOMAIN {
            match self.tokens.read_account(key) {
                Ok(account) => self.all_keys(&account.owner),
                Err(_) => false,
            }
        } else if *domain == names::GROUP_DOMAIN {
            match self.tokens.read_group(key) {
                Ok(group) => self.use_key(&group.key),
                Err(_) => false,
            }
        } else {
            match self.tokens.read_token(domain, key) {
                Ok(token) => self.all_keys(&token.owner),
                Err(_) => false,
            }
        }
    }

    fn node_satisfied(&mut self, node: &GroupNode) -> bool {
        match node {
            GroupNode::Leaf { key, .. } => self.use_key(key),
            GroupNode::Branch {
                threshold, nodes, ..
            } => {
                let threshold = *threshold as u64;
                let mut total: u64 = 0;
                for child in nodes {
                    if total >= threshold {
                        break;
                    }
                    if self.node_satisfied(child) {
                        total += child.weight() as u64;
                    }
                }
                total >= threshold
            }
        }
    }

    fn use_key(&mut self, key: &PublicKey) -> bool {
        if self.candidate_keys.contains(key) {
            self.used_keys.insert(*key);
            true
        } else {
            false
        }
    }

    /// An owner set is satisfied only when every key is present.
    fn all_keys(&mut self, keys: &[PublicKey]) -> bool {
        if keys.is_empty() {
            return false;
        }
        if keys.iter().all(|k| self.candidate_keys.contains(k)) {
            self.used_keys.extend(keys.iter().copied());
            true
        } else {
            false
        }
    }
}
