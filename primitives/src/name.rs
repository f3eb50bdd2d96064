//! Fixed-width name symbols.
//!
//! `Name` is the 64-bit base-32 symbol used for action and producer names:
//! up to 12 characters from `.12345abcdefghijklmnopqrstuvwxyz` plus a 13th
//! character restricted to the first 16 of those. `Name128` is a 16-byte
//! inline symbol used for domains and token keys.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
pub enum NameError {
    #[error("name is empty")]
    Empty,
    #[error("name is too long")]
    TooLong,
    #[error("name contains an invalid character")]
    InvalidChar,
}

const NAME_CHARS: &[u8; 32] = b".12345abcdefghijklmnopqrstuvwxyz";

const fn char_to_symbol(c: u8) -> i32 {
    if c >= b'a' && c <= b'z' {
        (c - b'a') as i32 + 6
    } else if c >= b'1' && c <= b'5' {
        (c - b'1') as i32 + 1
    } else if c == b'.' {
        0
    } else {
        -1
    }
}

/// A 64-bit base-32 encoded name.
#[derive(Clone, Copy, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Name(u64);

impl Name {
    pub const MAX_LEN: usize = 13;

    /// Builds a name from a literal, failing the build (or panicking at
    /// runtime) when the literal is not a valid name.
    pub const fn from_static(s: &str) -> Name {
        match Self::parse_bytes(s.as_bytes()) {
            Ok(name) => name,
            Err(_) => panic!("invalid name literal"),
        }
    }

    const fn parse_bytes(bytes: &[u8]) -> Result<Name, NameError> {
        if bytes.is_empty() {
            return Err(NameError::Empty);
        }
        if bytes.len() > Name::MAX_LEN {
            return Err(NameError::TooLong);
        }

        let mut value: u64 = 0;
        let mut i = 0;
        while i < bytes.len() {
            let sym = char_to_symbol(bytes[i]);
            if sym < 0 {
                return Err(NameError::InvalidChar);
            }
            let sym = sym as u64;
            if i < 12 {
                value |= (sym & 0x1f) << (64 - 5 * (i + 1));
            } else {
                // The 13th character only has four bits of room.
                if sym > 0x0f {
                    return Err(NameError::InvalidChar);
                }
                value |= sym & 0x0f;
            }
            i += 1;
        }
        Ok(Name(value))
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    pub const fn from_u64(value: u64) -> Name {
        Name(value)
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut out = [b'.'; Name::MAX_LEN];
        let mut value = self.0;
        for i in (0..Name::MAX_LEN).rev() {
            let index = if i == 12 {
                (value & 0x0f) as usize
            } else {
                (value & 0x1f) as usize
            };
            out[i] = NAME_CHARS[index];
            value >>= if i == 12 { 4 } else { 5 };
        }
        let trimmed = {
            let mut end = Name::MAX_LEN;
            while end > 0 && out[end - 1] == b'.' {
                end -= 1;
            }
            &out[..end]
        };
        f.write_str(std::str::from_utf8(trimmed).expect("name chars are ascii"))
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl FromStr for Name {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Name::parse_bytes(s.as_bytes())
    }
}

/// A 16-byte inline symbol: lower-case letters, digits, `.` and `-`,
/// zero-padded on the right.
#[derive(Clone, Copy, Default, Eq, Hash, PartialEq)]
pub struct Name128([u8; Name128::SIZE]);

impl Name128 {
    pub const SIZE: usize = 16;

    pub const fn from_static(s: &str) -> Name128 {
        match Self::parse_bytes(s.as_bytes()) {
            Ok(name) => name,
            Err(_) => panic!("invalid name128 literal"),
        }
    }

    const fn valid_char(c: u8) -> bool {
        (c >= b'a' && c <= b'z') || (c >= b'0' && c <= b'9') || c == b'.' || c == b'-'
    }

    const fn parse_bytes(bytes: &[u8]) -> Result<Name128, NameError> {
        if bytes.is_empty() {
            return Err(NameError::Empty);
        }
        if bytes.len() > Name128::SIZE {
            return Err(NameError::TooLong);
        }
        let mut out = [0u8; Name128::SIZE];
        let mut i = 0;
        while i < bytes.len() {
            if !Self::valid_char(bytes[i]) {
                return Err(NameError::InvalidChar);
            }
            out[i] = bytes[i];
            i += 1;
        }
        Ok(Name128(out))
    }

    pub fn as_bytes(&self) -> &[u8; Name128::SIZE] {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        let end = self.0.iter().position(|b| *b == 0).unwrap_or(Name128::SIZE);
        std::str::from_utf8(&self.0[..end]).expect("name128 chars are ascii")
    }

    pub fn is_empty(&self) -> bool {
        self.0[0] == 0
    }
}

impl Ord for Name128 {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl PartialOrd for Name128 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Name128 {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for Name128 {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl FromStr for Name128 {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Name128::parse_bytes(s.as_bytes())
    }
}

mod serde_impl {
    use std::borrow::Cow;

    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::{Name, Name128};

    impl Serialize for Name {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            if serializer.is_human_readable() {
                serializer.serialize_str(&self.to_string())
            } else {
                serializer.serialize_u64(self.0)
            }
        }
    }

    impl<'de> Deserialize<'de> for Name {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            if deserializer.is_human_readable() {
                let data: Cow<'de, str> = Deserialize::deserialize(deserializer)?;
                data.parse().map_err(D::Error::custom)
            } else {
                Ok(Name(u64::deserialize(deserializer)?))
            }
        }
    }

    impl Serialize for Name128 {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            if serializer.is_human_readable() {
                serializer.serialize_str(self.as_str())
            } else {
                Serialize::serialize(&self.0, serializer)
            }
        }
    }

    impl<'de> Deserialize<'de> for Name128 {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            if deserializer.is_human_readable() {
                let data: Cow<'de, str> = Deserialize::deserialize(deserializer)?;
                data.parse().map_err(D::Error::custom)
            } else {
                let bytes: [u8; Name128::SIZE] = Deserialize::deserialize(deserializer)?;
                Ok(Name128(bytes))
            }
        }
    }
}
