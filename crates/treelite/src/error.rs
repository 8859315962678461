//! Error types for Treelite operations.

use thiserror::Error;
use treelite_ffi::FfiError;

/// Result type alias for Treelite operations.
pub type Result<T> = std::result::Result<T, TreeliteError>;

/// Errors that can occur in Treelite operations.
#[derive(Error, Debug)]
pub enum TreeliteError {
    /// Library loading or a native call failed.
    #[error(transparent)]
    Ffi(#[from] FfiError),

    /// Argument rejected before reaching the native library.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// String argument contains an interior NUL byte.
    #[error("string contains a nul byte: {0}")]
    NulError(#[from] std::ffi::NulError),

    /// C toolchain invocation failed.
    #[error("toolchain error: {0}")]
    Toolchain(String),

    /// I/O error.
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}

impl TreeliteError {
    /// Whether the error was reported by the native library itself.
    pub fn is_native(&self) -> bool {
        matches!(self, TreeliteError::Ffi(FfiError::Native { .. }))
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        TreeliteError::InvalidArgument(msg.into())
    }
}
