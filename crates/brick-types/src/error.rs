//! The closed error taxonomy shared by every brick operation.
//!
//! Core operations return `Result<T, BrickError>`; `Ok` plays the role of
//! the `Success` code.  The binding layer translates results into its own
//! error convention through [`ErrorCode`], which is the stable numeric form
//! of the same set.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Shorthand used throughout the brick crates.
pub type BrickResult<T> = Result<T, BrickError>;

/// Every way a brick operation can fail.
///
/// The variants are grouped the same way callers are expected to react:
///
/// * structural: [`InvalidArgument`][Self::InvalidArgument],
///   [`InvalidPort`][Self::InvalidPort] – caller misuse, checked before any I/O;
/// * availability: [`NoDevice`][Self::NoDevice] – nothing attached, recoverable;
/// * I/O: [`Io`][Self::Io] – an OS file or timer operation failed;
/// * capability: [`NotSupported`][Self::NotSupported],
///   [`NotImplemented`][Self::NotImplemented];
/// * transient: [`Again`][Self::Again] – retry later.
#[derive(Error, Debug)]
pub enum BrickError {
    #[error("Unknown error")]
    Failed,

    #[error("Invalid argument")]
    InvalidArgument,

    #[error("Invalid port")]
    InvalidPort,

    #[error("I/O error ({context}): {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Device is not connected")]
    NoDevice,

    #[error("Operation not supported")]
    NotSupported,

    #[error("Operation not implemented")]
    NotImplemented,

    #[error("Try again later")]
    Again,
}

impl BrickError {
    /// Wrap an [`std::io::Error`] with a short description of what was being
    /// accessed, typically a device file path.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        BrickError::Io {
            context: context.into(),
            source,
        }
    }

    /// The numeric code reported across the binding boundary.
    pub fn code(&self) -> ErrorCode {
        match self {
            BrickError::Failed => ErrorCode::Failed,
            BrickError::InvalidArgument => ErrorCode::InvalidArgument,
            BrickError::InvalidPort => ErrorCode::InvalidPort,
            BrickError::Io { .. } => ErrorCode::Io,
            BrickError::NoDevice => ErrorCode::NoDevice,
            BrickError::NotSupported => ErrorCode::NotSupported,
            BrickError::NotImplemented => ErrorCode::NotImplemented,
            BrickError::Again => ErrorCode::Again,
        }
    }
}

/// Stable numeric result codes, `Success` included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[repr(u8)]
pub enum ErrorCode {
    Success = 0,
    Failed = 1,
    InvalidArgument = 2,
    InvalidPort = 3,
    Io = 4,
    NoDevice = 5,
    NotImplemented = 6,
    NotSupported = 7,
    Again = 8,
}

impl ErrorCode {
    /// Collapse any brick result into its code.
    pub fn of<T>(result: &BrickResult<T>) -> Self {
        match result {
            Ok(_) => ErrorCode::Success,
            Err(e) => e.code(),
        }
    }
}

impl From<&BrickError> for ErrorCode {
    fn from(err: &BrickError) -> Self {
        err.code()
    }
}
