use std::cmp::Ordering;
use std::convert::TryFrom;
use std::fmt;
use std::str::FromStr;

use hex::FromHex;

use crate::errors::{KeysError, ParseError};
use crate::{PrivateKey, Signature};

#[derive(Clone, Copy)]
pub struct PublicKey(pub(crate) ed25519_zebra::VerificationKeyBytes);

impl PublicKey {
    pub const SIZE: usize = 32;

    pub fn verify(&self, signature: &Signature, data: &[u8]) -> bool {
        match ed25519_zebra::VerificationKey::try_from(self.0) {
            Ok(vk) => vk.verify(&signature.0, data).is_ok(),
            Err(_) => false,
        }
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8; PublicKey::SIZE] {
        self.0
            .as_ref()
            .try_into()
            .expect("verification key bytes are always 32 bytes")
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeysError> {
        let bytes: [u8; PublicKey::SIZE] =
            bytes.try_into().map_err(|_| KeysError::MalformedKey)?;
        Ok(PublicKey(ed25519_zebra::VerificationKeyBytes::from(bytes)))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.as_bytes())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl FromHex for PublicKey {
    type Error = ParseError;

    fn from_hex<T: AsRef<[u8]>>(hex: T) -> Result<PublicKey, ParseError> {
        Ok(PublicKey::from_bytes(hex::decode(hex)?.as_slice())?)
    }
}

impl FromStr for PublicKey {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PublicKey::from_hex(s)
    }
}

impl From<[u8; PublicKey::SIZE]> for PublicKey {
    fn from(bytes: [u8; PublicKey::SIZE]) -> Self {
        PublicKey(ed25519_zebra::VerificationKeyBytes::from(bytes))
    }
}

impl<'a> From<&'a PrivateKey> for PublicKey {
    fn from(private_key: &'a PrivateKey) -> Self {
        PublicKey(ed25519_zebra::VerificationKeyBytes::from(&private_key.0))
    }
}

impl Default for PublicKey {
    fn default() -> Self {
        PublicKey::from([0u8; PublicKey::SIZE])
    }
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl Eq for PublicKey {}

impl Ord for PublicKey {
    fn cmp(&self, other: &PublicKey) -> Ordering {
        self.as_bytes().cmp(other.as_bytes())
    }
}

impl PartialOrd for PublicKey {
    fn partial_cmp(&self, other: &PublicKey) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::hash::Hash for PublicKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::hash::Hash::hash(self.as_bytes(), state);
    }
}

mod serde_impl {
    use std::borrow::Cow;

    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::PublicKey;

    impl Serialize for PublicKey {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            if serializer.is_human_readable() {
                serializer.serialize_str(&self.to_hex())
            } else {
                Serialize::serialize(self.as_bytes(), serializer)
            }
        }
    }

    impl<'de> Deserialize<'de> for PublicKey {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            if deserializer.is_human_readable() {
                let data: Cow<'de, str> = Deserialize::deserialize(deserializer)?;
                data.parse().map_err(D::Error::custom)
            } else {
                let bytes: [u8; PublicKey::SIZE] = Deserialize::deserialize(deserializer)?;
                Ok(PublicKey::from(bytes))
            }
        }
    }
}
