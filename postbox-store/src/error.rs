//! Error types for the postbox-store crate.

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("No such user: {0}")]
    NoSuchUser(String),

    #[error("User already exists: {0}")]
    UserExists(String),

    /// Names are 1 to 13 ASCII letters.
    #[error("Invalid user name: {0:?}")]
    InvalidName(String),

    /// Index is zero-based.
    #[error("No such message: {0}")]
    NoSuchMessage(usize),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),
}

#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("Bincode encode error: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("Bincode decode error: {0}")]
    Decode(#[from] bincode::error::DecodeError),
}

impl From<bincode::error::EncodeError> for StoreError {
    fn from(err: bincode::error::EncodeError) -> Self {
        Self::Serialization(SerializationError::Encode(err))
    }
}

impl From<bincode::error::DecodeError> for StoreError {
    fn from(err: bincode::error::DecodeError) -> Self {
        Self::Serialization(SerializationError::Decode(err))
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
