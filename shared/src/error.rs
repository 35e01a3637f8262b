use thiserror::Error;

use crate::config::ConfigError;
use crate::photo::PhotoError;
use crate::refresh::RefreshError;
use crate::session::SessionError;
use crate::storage::StoreError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("place name cannot be empty")]
    EmptyName,

    #[error("place id cannot be empty")]
    EmptyId,

    #[error("{field} too long ({len} > {max})")]
    TooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("place not found: {0}")]
    UnknownPlace(String),
}

/// Out-of-range domain index. Validated callers never produce one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("index {index} out of range for list of length {len}")]
pub struct IndexError {
    pub index: usize,
    pub len: usize,
}

impl IndexError {
    pub fn check(index: usize, len: usize) -> Result<(), IndexError> {
        if index < len {
            Ok(())
        } else {
            Err(IndexError { index, len })
        }
    }
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("session error: {0}")]
    Session(#[from] SessionError),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("refresh error: {0}")]
    Refresh(#[from] RefreshError),

    #[error("photo error: {0}")]
    Photo(#[from] PhotoError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

pub type CoreResult<T> = Result<T, CoreError>;
