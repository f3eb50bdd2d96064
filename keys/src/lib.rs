pub mod errors;
mod key_pair;
mod private_key;
mod public_key;
mod signature;

pub use self::errors::{KeysError, ParseError};
pub use self::key_pair::KeyPair;
pub use self::private_key::PrivateKey;
pub use self::public_key::PublicKey;
pub use self::signature::Signature;
