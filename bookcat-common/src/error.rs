//! Error type shared by the catalog crates

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Filesystem work under the root folder (uploads, user assets, exports)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file missing or unparsable
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Password hashing failed: {0}")]
    Password(#[from] bcrypt::BcryptError),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Rejected input; surfaces as 400 in the HTTP layer
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Image decoding, thumbnail and other unexpected failures
    #[error("Internal error: {0}")]
    Internal(String),
}
