use std::fmt;

use rand_core::{CryptoRng, RngCore};

use crate::errors::KeysError;

#[derive(Clone)]
pub struct PrivateKey(pub(crate) ed25519_zebra::SigningKey);

impl PrivateKey {
    pub const SIZE: usize = 32;

    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        PrivateKey(ed25519_zebra::SigningKey::new(rng))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeysError> {
        let bytes: [u8; PrivateKey::SIZE] =
            bytes.try_into().map_err(|_| KeysError::MalformedKey)?;
        Ok(PrivateKey(ed25519_zebra::SigningKey::from(bytes)))
    }

    pub fn as_bytes(&self) -> &[u8; PrivateKey::SIZE] {
        self.0
            .as_ref()
            .try_into()
            .expect("ed25519 seed is always 32 bytes")
    }

    pub fn to_bytes(&self) -> [u8; PrivateKey::SIZE] {
        *self.as_bytes()
    }
}

impl From<[u8; PrivateKey::SIZE]> for PrivateKey {
    fn from(bytes: [u8; PrivateKey::SIZE]) -> Self {
        PrivateKey(ed25519_zebra::SigningKey::from(bytes))
    }
}

// Never print key material.
impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("PrivateKey(..)")
    }
}
