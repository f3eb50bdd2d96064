use rand_core::{CryptoRng, RngCore};

use crate::{PrivateKey, PublicKey, Signature};

#[derive(Clone, Debug)]
pub struct KeyPair {
    pub public: PublicKey,
    pub private: PrivateKey,
}

impl KeyPair {
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let private = PrivateKey::generate(rng);
        KeyPair::from(private)
    }

    pub fn sign(&self, data: &[u8]) -> Signature {
        Signature(self.private.0.sign(data))
    }
}

impl From<PrivateKey> for KeyPair {
    fn from(private_key: PrivateKey) -> Self {
        KeyPair {
            public: PublicKey::from(&private_key),
            private: private_key,
        }
    }
}
