//! Error types for the transition engine.
//!
//! The engine surfaces three recoverable classes to its host (`InvalidData`,
//! `OutOfResources`, `Unknown`) plus storage failures, which the host treats
//! as fatal. Application-level code (config, commands, runtime) wraps these
//! in `anyhow` with context.

use thiserror::Error;

/// Failures reported by a [`crate::persistence::KeyValueStore`].
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("stored value for domain 0x{domain:02X} key 0x{key:02X} is malformed: {reason}")]
    Malformed { domain: u8, key: u8, reason: String },

    #[error("store is locked by another process: {0}")]
    Locked(String),
}

/// Errors surfaced by the transition engine.
#[derive(Error, Debug)]
pub enum AdaptiveLightError {
    /// Malformed or out-of-range input, or a detected internal inconsistency.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// A pool or buffer has no room left.
    #[error("out of resources: {0}")]
    OutOfResources(String),

    /// The request refers to something this accessory does not know about.
    #[error("unknown: {0}")]
    Unknown(String),

    /// The key-value store failed during routine operation.
    #[error("storage failure: {0}")]
    Storage(#[from] StoreError),
}

impl AdaptiveLightError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidData(msg.into())
    }

    pub fn out_of_resources(msg: impl Into<String>) -> Self {
        Self::OutOfResources(msg.into())
    }

    pub fn unknown(msg: impl Into<String>) -> Self {
        Self::Unknown(msg.into())
    }

    /// Storage failures cannot be survived by the host.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

pub type Result<T> = std::result::Result<T, AdaptiveLightError>;
