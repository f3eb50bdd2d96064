use serde::{Deserialize, Serialize};

use keys::PublicKey;

use crate::name::Name;
use crate::policy;
use crate::time::BlockTimestamp;

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ProducerKey {
    pub producer_name: Name,
    pub signing_key: PublicKey,
}

/// An ordered producer set with a version that increments on every change.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct ProducerSchedule {
    pub version: u32,
    pub producers: Vec<ProducerKey>,
}

impl ProducerSchedule {
    pub fn new(version: u32, producers: Vec<ProducerKey>) -> Self {
        ProducerSchedule { version, producers }
    }

    pub fn is_empty(&self) -> bool {
        self.producers.is_empty()
    }

    /// The producer owning a given slot. Producers run
    /// `policy::PRODUCER_REPETITIONS` consecutive slots each, round-robin.
    pub fn scheduled_producer(&self, when: BlockTimestamp) -> &ProducerKey {
        let index = (when.slot() / policy::PRODUCER_REPETITIONS) as usize % self.producers.len();
        &self.producers[index]
    }

    pub fn signing_key_of(&self, producer: Name) -> Option<PublicKey> {
        self.producers
            .iter()
            .find(|pk| pk.producer_name == producer)
            .map(|pk| pk.signing_key)
    }

    /// Same producer lineup, ignoring the version.
    pub fn same_producers(&self, producers: &[ProducerKey]) -> bool {
        self.producers == producers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(byte: u8) -> PublicKey {
        PublicKey::from([byte; PublicKey::SIZE])
    }

    fn two_producer_schedule() -> ProducerSchedule {
        ProducerSchedule::new(
            0,
            vec![
                ProducerKey {
                    producer_name: "alpha".parse().unwrap(),
                    signing_key: key(1),
                },
                ProducerKey {
                    producer_name: "beta".parse().unwrap(),
                    signing_key: key(2),
                },
            ],
        )
    }

    #[test]
    fn it_rotates_producers_by_repetition_blocks() {
        let schedule = two_producer_schedule();
        let reps = policy::PRODUCER_REPETITIONS;

        for slot in 0..reps {
            assert_eq!(
                schedule
                    .scheduled_producer(BlockTimestamp::from_slot(slot))
                    .producer_name
                    .to_string(),
                "alpha"
            );
        }
        for slot in reps..2 * reps {
            assert_eq!(
                schedule
                    .scheduled_producer(BlockTimestamp::from_slot(slot))
                    .producer_name
                    .to_string(),
                "beta"
            );
        }
        assert_eq!(
            schedule
                .scheduled_producer(BlockTimestamp::from_slot(2 * reps))
                .producer_name
                .to_string(),
            "alpha"
        );
    }

    #[test]
    fn it_finds_signing_keys_by_name() {
        let schedule = two_producer_schedule();
        assert_eq!(
            schedule.signing_key_of("beta".parse().unwrap()),
            Some(key(2))
        );
        assert_eq!(schedule.signing_key_of("gamma".parse().unwrap()), None);
    }
}
