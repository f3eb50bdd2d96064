//! Payload structs for the built-in actions, with helpers that wrap them
//! into correctly routed [`Action`]s.

use serde::{Deserialize, Serialize};

use block::Action;
use keys::PublicKey;
use primitives::{Authority, Coin, Group, Name128};

use super::names;

fn encode<T: Serialize>(payload: &T) -> Vec<u8> {
    postcard::to_allocvec(payload).expect("action payloads are serializable")
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct NewDomain {
    pub name: Name128,
    pub creator: PublicKey,
    pub issue: Authority,
    pub transfer: Authority,
    pub manage: Authority,
}

impl NewDomain {
    pub fn into_action(self) -> Action {
        Action {
            name: names::NEWDOMAIN,
            domain: self.name,
            key: names::CREATE_KEY,
            data: encode(&self),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct UpdateDomain {
    pub name: Name128,
    pub issue: Option<Authority>,
    pub transfer: Option<Authority>,
    pub manage: Option<Authority>,
}

impl UpdateDomain {
    pub fn into_action(self) -> Action {
        Action {
            name: names::UPDATEDOMAIN,
            domain: self.name,
            key: names::UPDATE_KEY,
            data: encode(&self),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct IssueToken {
    pub domain: Name128,
    pub names: Vec<Name128>,
    pub owner: Vec<PublicKey>,
}

impl IssueToken {
    pub fn into_action(self) -> Action {
        Action {
            name: names::ISSUETOKEN,
            domain: self.domain,
            key: names::ISSUE_KEY,
            data: encode(&self),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Transfer {
    pub domain: Name128,
    pub name: Name128,
    pub to: Vec<PublicKey>,
    pub memo: String,
}

impl Transfer {
    pub fn into_action(self) -> Action {
        Action {
            name: names::TRANSFER,
            domain: self.domain,
            key: self.name,
            data: encode(&self),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct NewGroup {
    pub name: Name128,
    pub group: Group,
}

impl NewGroup {
    pub fn into_action(self) -> Action {
        Action {
            name: names::NEWGROUP,
            domain: names::GROUP_DOMAIN,
            key: self.name,
            data: encode(&self),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct UpdateGroup {
    pub name: Name128,
    pub group: Group,
}

impl UpdateGroup {
    pub fn into_action(self) -> Action {
        Action {
            name: names::UPDATEGROUP,
            domain: names::GROUP_DOMAIN,
            key: self.name,
            data: encode(&self),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct NewAccount {
    pub name: Name128,
    pub owner: Vec<PublicKey>,
}

impl NewAccount {
    pub fn into_action(self) -> Action {
        Action {
            name: names::NEWACCOUNT,
            domain: names::ACCOUNT_DOMAIN,
            key: self.name,
            data: encode(&self),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct UpdateOwner {
    pub name: Name128,
    pub owner: Vec<PublicKey>,
}

impl UpdateOwner {
    pub fn into_action(self) -> Action {
        Action {
            name: names::UPDATEOWNER,
            domain: names::ACCOUNT_DOMAIN,
            key: self.name,
            data: encode(&self),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct TransferFund {
    pub from: Name128,
    pub to: Name128,
    pub amount: Coin,
    pub memo: String,
}

impl TransferFund {
    pub fn into_action(self) -> Action {
        Action {
            name: names::TRANSFERFUND,
            domain: names::ACCOUNT_DOMAIN,
            key: self.from,
            data: encode(&self),
        }
    }
}
