//! Error types for FFI operations.

use thiserror::Error;

/// Result type for FFI operations.
pub type Result<T> = std::result::Result<T, FfiError>;

/// Errors from FFI operations.
#[derive(Error, Debug)]
pub enum FfiError {
    /// No candidate location yielded a loadable Treelite library.
    #[error("treelite library not found: {0}")]
    LibraryNotFound(String),

    /// The loaded library lacks an entry point the binding needs.
    #[error("symbol {symbol} missing from {path}")]
    MissingSymbol {
        /// Name of the C function.
        symbol: &'static str,
        /// Library the lookup was made against.
        path: String,
    },

    /// A Treelite call returned a failure code.
    #[error("{call} failed: {message}")]
    Native {
        /// Name of the C function that failed.
        call: &'static str,
        /// Message reported by `TreeliteGetLastError`.
        message: String,
    },

    /// Invalid argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
