use std::fmt;
use std::ops::{Add, Sub};

use serde::{Deserialize, Serialize};

use crate::policy;

/// A wall-clock instant in milliseconds since the unix epoch.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const fn from_millis(millis: u64) -> Self {
        Timestamp(millis)
    }

    pub const fn from_secs(secs: u64) -> Self {
        Timestamp(secs * 1000)
    }

    pub const fn as_millis(&self) -> u64 {
        self.0
    }

    pub fn checked_add_secs(&self, secs: u64) -> Option<Timestamp> {
        self.0.checked_add(secs * 1000).map(Timestamp)
    }
}

impl Add<u64> for Timestamp {
    type Output = Timestamp;

    fn add(self, millis: u64) -> Timestamp {
        Timestamp(self.0 + millis)
    }
}

impl Sub for Timestamp {
    type Output = u64;

    fn sub(self, other: Timestamp) -> u64 {
        self.0.saturating_sub(other.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// A block production slot: the number of block intervals since the chain
/// epoch. Block headers carry this instead of a raw timestamp.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
#[serde(transparent)]
pub struct BlockTimestamp(u32);

impl BlockTimestamp {
    pub const fn from_slot(slot: u32) -> Self {
        BlockTimestamp(slot)
    }

    pub const fn slot(&self) -> u32 {
        self.0
    }

    pub fn next(&self) -> BlockTimestamp {
        BlockTimestamp(self.0 + 1)
    }

    pub fn to_timestamp(&self) -> Timestamp {
        Timestamp::from_millis(
            policy::BLOCK_TIMESTAMP_EPOCH_MS + self.0 as u64 * policy::BLOCK_INTERVAL_MS,
        )
    }
}

impl From<Timestamp> for BlockTimestamp {
    fn from(ts: Timestamp) -> Self {
        let since_epoch = ts.as_millis().saturating_sub(policy::BLOCK_TIMESTAMP_EPOCH_MS);
        BlockTimestamp((since_epoch / policy::BLOCK_INTERVAL_MS) as u32)
    }
}

impl fmt::Display for BlockTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "slot {}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_converts_between_slots_and_timestamps() {
        let slot = BlockTimestamp::from_slot(7);
        let ts = slot.to_timestamp();
        assert_eq!(BlockTimestamp::from(ts), slot);
        assert_eq!(
            ts.as_millis(),
            policy::BLOCK_TIMESTAMP_EPOCH_MS + 7 * policy::BLOCK_INTERVAL_MS
        );
    }

    #[test]
    fn it_floors_mid_interval_times() {
        let ts = Timestamp::from_millis(
            policy::BLOCK_TIMESTAMP_EPOCH_MS + policy::BLOCK_INTERVAL_MS + 123,
        );
        assert_eq!(BlockTimestamp::from(ts).slot(), 1);
    }
}
