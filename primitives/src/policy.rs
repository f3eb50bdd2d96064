//! Consensus-wide constants.

/// Length of one block production slot in milliseconds.
pub const BLOCK_INTERVAL_MS: u64 = 500;

/// Chain epoch for block timestamps: 2000-01-01T00:00:00Z in unix millis.
pub const BLOCK_TIMESTAMP_EPOCH_MS: u64 = 946_684_800_000;

/// Consecutive slots assigned to the same producer before the schedule
/// rotates to the next one.
pub const PRODUCER_REPETITIONS: u32 = 12;

/// Number of slots in the block-summary ring used for TaPoS checks.
pub const BLOCK_SUMMARY_SLOTS: usize = 0x10000;

/// Upper bound on how many unconfirmed ancestors a header state tracks.
pub const MAX_TRACKED_DPOS_CONFIRMATIONS: usize = 1024;

/// Default bound on how far in the future a transaction may expire,
/// relative to the pending block time.
pub const DEFAULT_MAX_TRX_LIFETIME_SECS: u32 = 60 * 60;

/// Default balance granted to a freshly created account.
pub const DEFAULT_ACCOUNT_GRANT_UNITS: u64 = 1_000_000;

/// Confirmations needed before a block stops being revertible:
/// two thirds of the producer set, plus one.
pub fn required_confirmations(producer_count: usize) -> u8 {
    (producer_count * 2 / 3 + 1) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_requires_a_two_thirds_majority() {
        assert_eq!(required_confirmations(1), 1);
        assert_eq!(required_confirmations(2), 2);
        assert_eq!(required_confirmations(3), 3);
        assert_eq!(required_confirmations(4), 3);
        assert_eq!(required_confirmations(21), 15);
    }
}
