//! # Treelite FFI
//!
//! Raw bindings to the Treelite C API.
//!
//! This crate provides:
//! - Handle and function-pointer types mirroring the Treelite 1.x headers
//! - Runtime loading of `libtreelite` with every entry point resolved up front
//! - Native error retrieval and native log forwarding into `tracing`
//!
//! Nothing is linked at build time. The library is located through
//! `TREELITE_LIBRARY`, `TREELITE_HOME`, the `TREELITE_HOME` seen at build
//! time, or the system loader search path, in that order.

#![warn(missing_docs)]

pub mod error;
mod library;
pub mod sys;

pub use error::{FfiError, Result};
pub use library::{
    c_str_to_string, candidate_paths, default_library_name, is_available, library, load_library,
    Api, Library, HOME_ENV, LIBRARY_ENV,
};

/// Treelite C API generation these bindings target.
pub const TREELITE_API_VERSION: &str = "1.x";
