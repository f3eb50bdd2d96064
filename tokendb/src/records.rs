use serde::{Deserialize, Serialize};

use keys::PublicKey;
use primitives::{Authority, Coin, Name128, Timestamp};

/// A namespace for tokens, carrying the three privileged authorities.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Domain {
    pub name: Name128,
    pub creator: PublicKey,
    pub created_at: Timestamp,
    pub issue: Authority,
    pub transfer: Authority,
    pub manage: Authority,
}

/// A non-fungible token inside a domain, held by an owner key set.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct TokenDef {
    pub domain: Name128,
    pub name: Name128,
    pub owner: Vec<PublicKey>,
}

/// A named account: an owner key set plus a fungible balance.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Account {
    pub name: Name128,
    pub owner: Vec<PublicKey>,
    pub balance: Coin,
    pub created_at: Timestamp,
}
