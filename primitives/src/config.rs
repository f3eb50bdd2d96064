use serde::{Deserialize, Serialize};

use hash::{Hash, Sha256Hash};
use keys::PublicKey;

use crate::coin::Coin;
use crate::policy;
use crate::time::BlockTimestamp;

/// Tunable consensus parameters, fixed at genesis and adjustable through
/// the global property object afterwards.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ChainConfig {
    /// Upper bound on `expiration - pending_block_time` for input
    /// transactions, in seconds.
    pub max_transaction_lifetime_secs: u32,
    /// Balance granted to every freshly created account.
    pub account_grant: Coin,
}

impl Default for ChainConfig {
    fn default() -> Self {
        ChainConfig {
            max_transaction_lifetime_secs: policy::DEFAULT_MAX_TRX_LIFETIME_SECS,
            account_grant: Coin::from_units(policy::DEFAULT_ACCOUNT_GRANT_UNITS),
        }
    }
}

/// Everything needed to bootstrap a chain that has no prior head.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Genesis {
    pub initial_timestamp: BlockTimestamp,
    pub initial_key: PublicKey,
    pub initial_configuration: ChainConfig,
}

impl Genesis {
    pub fn new(initial_timestamp: BlockTimestamp, initial_key: PublicKey) -> Self {
        Genesis {
            initial_timestamp,
            initial_key,
            initial_configuration: ChainConfig::default(),
        }
    }

    /// The chain id is the digest of the genesis parameters; it seeds the
    /// genesis header so that chains with different genesis states produce
    /// disjoint block ids.
    pub fn compute_chain_id(&self) -> Sha256Hash {
        let bytes = postcard::to_allocvec(self).expect("genesis is serializable");
        bytes.hash()
    }
}
