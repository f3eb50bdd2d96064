use serde::{Deserialize, Serialize};

use primitives::{ChainConfig, ProducerSchedule};

/// Chain-wide configuration plus the producer schedule currently proposed
/// but not yet pending.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct GlobalPropertyObject {
    pub configuration: ChainConfig,
    pub proposed_schedule_block_num: Option<u32>,
    pub proposed_schedule: ProducerSchedule,
}

impl GlobalPropertyObject {
    pub fn with_configuration(configuration: ChainConfig) -> Self {
        GlobalPropertyObject {
            configuration,
            proposed_schedule_block_num: None,
            proposed_schedule: ProducerSchedule::default(),
        }
    }
}

/// Fast-changing per-chain counters.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct DynamicGlobalPropertyObject {
    /// Monotonic sequence number handed to every executed action.
    pub global_action_sequence: u64,
}
