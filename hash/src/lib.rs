use std::fmt;
use std::io;
use std::str::FromStr;

use hex::FromHex;
use sha2::{Digest, Sha256};

/// A writer that folds everything written into it into a digest.
pub trait Hasher: Default + io::Write {
    type Output: HashOutput;

    fn finish(self) -> Self::Output;

    fn digest(mut self, bytes: &[u8]) -> Self::Output {
        self.write_all(bytes).unwrap();
        self.finish()
    }

    fn hash<T: SerializeContent>(&mut self, h: &T) -> &mut Self {
        h.serialize_content(self).unwrap();
        self
    }

    fn chain<T: SerializeContent>(mut self, h: &T) -> Self {
        self.hash(h);
        self
    }
}

/// The canonical byte image of a value for hashing purposes.
///
/// Implementations must be deterministic: the digest of a value is part of
/// consensus state wherever this trait is used.
pub trait SerializeContent {
    fn serialize_content<W: io::Write>(&self, writer: &mut W) -> io::Result<usize>;
}

pub trait Hash: SerializeContent {
    fn hash<H: HashOutput>(&self) -> H {
        let mut h = H::Builder::default();
        self.serialize_content(&mut h).unwrap();
        h.finish()
    }
}

pub trait HashOutput:
    PartialEq + Eq + Clone + Sized + SerializeContent + fmt::Debug + std::hash::Hash
{
    type Builder: Hasher<Output = Self>;

    fn as_bytes(&self) -> &[u8];
    fn len() -> usize;
}

impl<H> SerializeContent for H
where
    H: HashOutput,
{
    fn serialize_content<W: io::Write>(&self, writer: &mut W) -> io::Result<usize> {
        writer.write_all(self.as_bytes())?;
        Ok(Self::len())
    }
}

impl SerializeContent for [u8] {
    fn serialize_content<W: io::Write>(&self, writer: &mut W) -> io::Result<usize> {
        writer.write_all(self)?;
        Ok(self.len())
    }
}

impl SerializeContent for Vec<u8> {
    fn serialize_content<W: io::Write>(&self, writer: &mut W) -> io::Result<usize> {
        self.as_slice().serialize_content(writer)
    }
}

impl Hash for [u8] {}
impl Hash for Vec<u8> {}

const SHA256_LENGTH: usize = 32;

/// A SHA-256 digest. Block ids, transaction ids and merkle nodes are all of
/// this type.
#[derive(Clone, Copy, Default, Eq, Ord, PartialEq, PartialOrd)]
pub struct Sha256Hash([u8; SHA256_LENGTH]);

impl Sha256Hash {
    pub const SIZE: usize = SHA256_LENGTH;

    pub const fn zero() -> Self {
        Sha256Hash([0u8; SHA256_LENGTH])
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8; SHA256_LENGTH] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl From<[u8; SHA256_LENGTH]> for Sha256Hash {
    fn from(bytes: [u8; SHA256_LENGTH]) -> Self {
        Sha256Hash(bytes)
    }
}

impl<'a> From<&'a [u8; SHA256_LENGTH]> for Sha256Hash {
    fn from(bytes: &'a [u8; SHA256_LENGTH]) -> Self {
        Sha256Hash(*bytes)
    }
}

impl TryFrom<&[u8]> for Sha256Hash {
    type Error = ParseHashError;

    fn try_from(slice: &[u8]) -> Result<Self, ParseHashError> {
        let bytes: [u8; SHA256_LENGTH] =
            slice.try_into().map_err(|_| ParseHashError::InvalidLength)?;
        Ok(Sha256Hash(bytes))
    }
}

impl AsRef<[u8]> for Sha256Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl std::hash::Hash for Sha256Hash {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::hash::Hash::hash(&self.0, state);
    }
}

impl fmt::Display for Sha256Hash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Sha256Hash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ParseHashError {
    InvalidLength,
    InvalidHex,
}

impl fmt::Display for ParseHashError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ParseHashError::InvalidLength => f.write_str("invalid hash length"),
            ParseHashError::InvalidHex => f.write_str("invalid hex encoding"),
        }
    }
}

impl std::error::Error for ParseHashError {}

impl FromHex for Sha256Hash {
    type Error = ParseHashError;

    fn from_hex<T: AsRef<[u8]>>(hex: T) -> Result<Self, ParseHashError> {
        let raw = hex::decode(hex).map_err(|_| ParseHashError::InvalidHex)?;
        Sha256Hash::try_from(raw.as_slice())
    }
}

impl FromStr for Sha256Hash {
    type Err = ParseHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Sha256Hash::from_hex(s)
    }
}

impl HashOutput for Sha256Hash {
    type Builder = Sha256Hasher;

    fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    fn len() -> usize {
        SHA256_LENGTH
    }
}

pub struct Sha256Hasher(Sha256);

impl Sha256Hasher {
    pub fn new() -> Self {
        Sha256Hasher(Sha256::new())
    }
}

impl Default for Sha256Hasher {
    fn default() -> Self {
        Sha256Hasher::new()
    }
}

impl io::Write for Sha256Hasher {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Hasher for Sha256Hasher {
    type Output = Sha256Hash;

    fn finish(self) -> Sha256Hash {
        let digest = self.0.finalize();
        let mut out = [0u8; SHA256_LENGTH];
        out.copy_from_slice(&digest);
        Sha256Hash(out)
    }
}

mod serde_impl {
    use std::borrow::Cow;

    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::Sha256Hash;

    impl Serialize for Sha256Hash {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            if serializer.is_human_readable() {
                serializer.serialize_str(&self.to_hex())
            } else {
                Serialize::serialize(&self.0, serializer)
            }
        }
    }

    impl<'de> Deserialize<'de> for Sha256Hash {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            if deserializer.is_human_readable() {
                let data: Cow<'de, str> = Deserialize::deserialize(deserializer)?;
                data.parse().map_err(D::Error::custom)
            } else {
                let bytes: [u8; Sha256Hash::SIZE] = Deserialize::deserialize(deserializer)?;
                Ok(Sha256Hash(bytes))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_computes_known_sha256_vectors() {
        let empty: Sha256Hash = b"".to_vec().hash();
        assert_eq!(
            empty.to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );

        let abc: Sha256Hash = b"abc".to_vec().hash();
        assert_eq!(
            abc.to_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn it_round_trips_hex() {
        let hash: Sha256Hash = b"veris".to_vec().hash();
        let parsed: Sha256Hash = hash.to_hex().parse().unwrap();
        assert_eq!(hash, parsed);
    }

    #[test]
    fn it_rejects_bad_hex() {
        assert_eq!("zz".parse::<Sha256Hash>(), Err(ParseHashError::InvalidHex));
        assert_eq!(
            "aabb".parse::<Sha256Hash>(),
            Err(ParseHashError::InvalidLength)
        );
    }

    #[test]
    fn it_chains_content() {
        let direct: Sha256Hash = b"abcdef".to_vec().hash();
        let chained = Sha256Hasher::new()
            .chain(&b"abc".to_vec())
            .chain(&b"def".to_vec())
            .finish();
        assert_eq!(direct, chained);
    }
}
