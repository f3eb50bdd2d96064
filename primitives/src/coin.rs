use std::fmt;

use serde::{Deserialize, Serialize};

/// An amount of the chain's fungible unit. All arithmetic is checked; an
/// overflowing or underdrawn operation yields `None` and the caller decides
/// how to fail.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
#[serde(transparent)]
pub struct Coin(u64);

impl Coin {
    pub const ZERO: Coin = Coin(0);

    pub const fn from_units(units: u64) -> Coin {
        Coin(units)
    }

    pub const fn units(&self) -> u64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub fn checked_add(self, other: Coin) -> Option<Coin> {
        self.0.checked_add(other.0).map(Coin)
    }

    #[must_use]
    pub fn checked_sub(self, other: Coin) -> Option<Coin> {
        self.0.checked_sub(other.0).map(Coin)
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_checks_arithmetic() {
        let a = Coin::from_units(10);
        let b = Coin::from_units(3);
        assert_eq!(a.checked_sub(b), Some(Coin::from_units(7)));
        assert_eq!(b.checked_sub(a), None);
        assert_eq!(
            Coin::from_units(u64::MAX).checked_add(Coin::from_units(1)),
            None
        );
    }
}
