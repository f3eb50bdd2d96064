use thiserror::Error;

#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum KeysError {
    #[error("malformed key material")]
    MalformedKey,
    #[error("malformed signature")]
    MalformedSignature,
}

#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum ParseError {
    #[error("invalid hex encoding")]
    InvalidHex,
    #[error("{0}")]
    Keys(#[from] KeysError),
}

impl From<hex::FromHexError> for ParseError {
    fn from(_: hex::FromHexError) -> Self {
        ParseError::InvalidHex
    }
}

impl From<ed25519_zebra::Error> for KeysError {
    fn from(_: ed25519_zebra::Error) -> Self {
        KeysError::MalformedKey
    }
}
