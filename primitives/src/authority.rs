//! The permission model.
//!
//! A domain carries one [`Authority`] per privileged operation. Authorities
//! are weighted references that must accumulate at least `threshold`:
//! a plain key, the owner set of whatever entity the action touches, or a
//! named [`Group`] — itself a weighted threshold tree of keys.

use serde::{Deserialize, Serialize};

use keys::PublicKey;

use crate::name::Name128;

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum AuthorizerRef {
    Key(PublicKey),
    Owner,
    Group(Name128),
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct AuthorizerWeight {
    pub authorizer: AuthorizerRef,
    pub weight: u16,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Authority {
    pub threshold: u32,
    pub authorizers: Vec<AuthorizerWeight>,
}

impl Authority {
    /// A single key with weight one against a threshold of one.
    pub fn single_key(key: PublicKey) -> Authority {
        Authority {
            threshold: 1,
            authorizers: vec![AuthorizerWeight {
                authorizer: AuthorizerRef::Key(key),
                weight: 1,
            }],
        }
    }

    /// The owner reference with weight one against a threshold of one.
    pub fn owner() -> Authority {
        Authority {
            threshold: 1,
            authorizers: vec![AuthorizerWeight {
                authorizer: AuthorizerRef::Owner,
                weight: 1,
            }],
        }
    }

    /// A satisfiable authority needs a positive threshold that its total
    /// weight can actually reach.
    pub fn is_valid(&self) -> bool {
        if self.threshold == 0 || self.authorizers.is_empty() {
            return false;
        }
        let total: u64 = self.authorizers.iter().map(|a| a.weight as u64).sum();
        total >= self.threshold as u64
    }
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum GroupNode {
    Leaf {
        key: PublicKey,
        weight: u16,
    },
    Branch {
        threshold: u32,
        weight: u16,
        nodes: Vec<GroupNode>,
    },
}

impl GroupNode {
    pub fn weight(&self) -> u16 {
        match self {
            GroupNode::Leaf { weight, .. } => *weight,
            GroupNode::Branch { weight, .. } => *weight,
        }
    }

    pub fn is_valid(&self) -> bool {
        match self {
            GroupNode::Leaf { .. } => true,
            GroupNode::Branch {
                threshold, nodes, ..
            } => {
                if *threshold == 0 || nodes.is_empty() {
                    return false;
                }
                let total: u64 = nodes.iter().map(|n| n.weight() as u64).sum();
                total >= *threshold as u64 && nodes.iter().all(GroupNode::is_valid)
            }
        }
    }
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Group {
    pub name: Name128,
    /// The key that manages (updates) the group itself.
    pub key: PublicKey,
    pub root: GroupNode,
}

impl Group {
    pub fn is_valid(&self) -> bool {
        !self.name.is_empty() && self.root.is_valid()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(byte: u8) -> PublicKey {
        PublicKey::from([byte; PublicKey::SIZE])
    }

    #[test]
    fn it_validates_authorities() {
        assert!(Authority::single_key(key(1)).is_valid());
        assert!(Authority::owner().is_valid());

        let unreachable = Authority {
            threshold: 5,
            authorizers: vec![AuthorizerWeight {
                authorizer: AuthorizerRef::Key(key(1)),
                weight: 2,
            }],
        };
        assert!(!unreachable.is_valid());

        let empty = Authority {
            threshold: 1,
            authorizers: vec![],
        };
        assert!(!empty.is_valid());
    }

    #[test]
    fn it_validates_group_trees() {
        let group = Group {
            name: "managers".parse().unwrap(),
            key: key(9),
            root: GroupNode::Branch {
                threshold: 2,
                weight: 1,
                nodes: vec![
                    GroupNode::Leaf {
                        key: key(1),
                        weight: 1,
                    },
                    GroupNode::Leaf {
                        key: key(2),
                        weight: 1,
                    },
                ],
            },
        };
        assert!(group.is_valid());

        let starved = Group {
            root: GroupNode::Branch {
                threshold: 3,
                weight: 1,
                nodes: vec![GroupNode::Leaf {
                    key: key(1),
                    weight: 1,
                }],
            },
            ..group
        };
        assert!(!starved.is_valid());
    }
}
