use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use hex::FromHex;

use crate::errors::{KeysError, ParseError};

#[derive(Clone, Copy)]
pub struct Signature(pub(crate) ed25519_zebra::Signature);

impl Signature {
    pub const SIZE: usize = 64;

    pub fn to_bytes(&self) -> [u8; Signature::SIZE] {
        <[u8; Signature::SIZE]>::from(self.0)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeysError> {
        let bytes: [u8; Signature::SIZE] = bytes
            .try_into()
            .map_err(|_| KeysError::MalformedSignature)?;
        Ok(Signature(ed25519_zebra::Signature::from(bytes)))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }
}

impl From<[u8; Signature::SIZE]> for Signature {
    fn from(bytes: [u8; Signature::SIZE]) -> Self {
        Signature(ed25519_zebra::Signature::from(bytes))
    }
}

impl Default for Signature {
    fn default() -> Self {
        Signature::from([0u8; Signature::SIZE])
    }
}

impl PartialEq for Signature {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for Signature {}

impl Ord for Signature {
    fn cmp(&self, other: &Signature) -> Ordering {
        self.to_bytes().cmp(&other.to_bytes())
    }
}

impl PartialOrd for Signature {
    fn partial_cmp(&self, other: &Signature) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::hash::Hash for Signature {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::hash::Hash::hash(&self.to_bytes(), state);
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl FromHex for Signature {
    type Error = ParseError;

    fn from_hex<T: AsRef<[u8]>>(hex: T) -> Result<Signature, ParseError> {
        Ok(Signature::from_bytes(hex::decode(hex)?.as_slice())?)
    }
}

impl FromStr for Signature {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Signature::from_hex(s)
    }
}

mod serde_impl {
    use std::borrow::Cow;

    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::Signature;

    impl Serialize for Signature {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            if serializer.is_human_readable() {
                serializer.serialize_str(&self.to_hex())
            } else {
                serializer.serialize_bytes(&self.to_bytes())
            }
        }
    }

    impl<'de> Deserialize<'de> for Signature {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            if deserializer.is_human_readable() {
                let data: Cow<'de, str> = Deserialize::deserialize(deserializer)?;
                data.parse().map_err(D::Error::custom)
            } else {
                let bytes: Cow<'de, [u8]> = Deserialize::deserialize(deserializer)?;
                Signature::from_bytes(&bytes).map_err(D::Error::custom)
            }
        }
    }
}
