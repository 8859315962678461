//! # Treelite
//!
//! Safe Rust handles for the Treelite model compiler and runtime.
//!
//! This crate provides:
//! - **Model loading** from XGBoost (binary, JSON) and LightGBM files or memory
//! - **Branch annotation** to guide code generation with observed frequencies
//! - **Compilation** to C sources or, through a C toolchain, a shared library
//! - **Batch prediction** against a compiled shared library
//!
//! Every handle owns one native resource and frees it on drop. `close()`
//! releases early and reports the native error, if any.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use treelite::prelude::*;
//!
//! fn main() -> anyhow::Result<()> {
//!     let model = Model::load_xgboost("testdata/xgboost.model")?;
//!     let dmat = DMatrix::from_dense(&features, num_row, num_col, f32::NAN)?;
//!
//!     let annotator = Annotator::new(&model, &dmat, 1, false)?;
//!     annotator.save("annotation.json")?;
//!
//!     let params = CompilerParams::new()
//!         .annotation_path("annotation.json")
//!         .quantize(true);
//!     let compiler = Compiler::new(CompilerKind::AstNative, &params)?;
//!     let lib = compiler.export_shared_lib(&model, "compiled_model", &Toolchain::Gcc, &[])?;
//!
//!     let predictor = Predictor::load(&lib, default_thread_count())?;
//!     let scores = predictor.predict_batch(&dmat, false, false)?;
//!     println!("{:?}", scores.to_f64_vec());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod annotator;
pub mod compiler;
pub mod dmatrix;
pub mod error;
mod handle;
pub mod model;
pub mod predictor;

// Re-export FFI crate (for advanced users)
pub use treelite_ffi as ffi;

pub use annotator::Annotator;
pub use compiler::{shared_lib_extension, Compiler, CompilerKind, CompilerParams, Toolchain};
pub use dmatrix::{DMatrix, DataType, Dimension, Element, FileFormat};
pub use error::{Result, TreeliteError};
pub use handle::default_thread_count;
pub use model::{Model, ModelFormat};
pub use predictor::{OutputType, PredictionBuffer, Predictions, Predictor, PredictorInfo};

/// Commonly used types.
pub mod prelude {
    pub use crate::annotator::Annotator;
    pub use crate::compiler::{
        shared_lib_extension, Compiler, CompilerKind, CompilerParams, Toolchain,
    };
    pub use crate::dmatrix::{DMatrix, DataType, FileFormat};
    pub use crate::error::{Result, TreeliteError};
    pub use crate::handle::default_thread_count;
    pub use crate::model::{Model, ModelFormat};
    pub use crate::predictor::{Predictions, Predictor};
}
