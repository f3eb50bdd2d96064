pub mod authority;
pub mod coin;
pub mod config;
pub mod name;
pub mod policy;
pub mod schedule;
pub mod time;

pub use self::authority::{Authority, AuthorizerRef, AuthorizerWeight, Group, GroupNode};
pub use self::coin::Coin;
pub use self::config::{ChainConfig, Genesis};
pub use self::name::{Name, Name128, NameError};
pub use self::schedule::{ProducerKey, ProducerSchedule};
pub use self::time::{BlockTimestamp, Timestamp};
