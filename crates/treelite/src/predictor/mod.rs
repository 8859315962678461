//! Batch inference against a compiled model.
//!
//! A [`Predictor`] loads a shared library produced by
//! [`crate::Compiler::export_shared_lib`] and runs it over a [`DMatrix`].

mod output;

pub use output::{OutputType, PredictionBuffer, Predictions};

use crate::dmatrix::DMatrix;
use crate::error::{Result, TreeliteError};
use crate::handle::{ensure_same_library, path_to_cstring, thread_count, Handle, HandleKind};
use serde::Serialize;
use std::fmt;
use std::os::raw::c_char;
use std::path::{Path, PathBuf};
use treelite_ffi::sys::runtime::{PredictorQueryFloat, PredictorQueryString};
use treelite_ffi::sys::PredictorOutputHandle;

/// Properties baked into a compiled model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictorInfo {
    /// Number of output groups.
    pub num_class: usize,
    /// Number of input features.
    pub num_feature: usize,
    /// Transformation applied to raw margins.
    pub pred_transform: String,
    /// Scaling of the sigmoid transform.
    pub sigmoid_alpha: f32,
    /// Scaling of the exponential-standard-ratio transform, if reported.
    pub ratio_c: Option<f32>,
    /// Bias added to every margin.
    pub global_bias: f32,
    /// Type of split thresholds.
    pub threshold_type: String,
    /// Type of leaf outputs.
    pub leaf_output_type: String,
}

/// A compiled model loaded for inference.
pub struct Predictor {
    handle: Handle,
    path: PathBuf,
}

/// Native output buffer, deleted when dropped.
struct OutputVector<'a> {
    predictor: &'a Predictor,
    raw: PredictorOutputHandle,
}

impl Drop for OutputVector<'_> {
    fn drop(&mut self) {
        let lib = self.predictor.handle.lib();
        let ret = unsafe {
            (lib.api().delete_predictor_output_vector)(self.predictor.handle.raw(), self.raw)
        };
        if let Err(err) = lib.check("TreeliteDeletePredictorOutputVector", ret) {
            tracing::warn!(%err, "failed to free prediction output");
        }
    }
}

impl Predictor {
    /// Load the compiled model at `library_path`, running batches on
    /// `num_worker_thread` threads.
    pub fn load(library_path: impl AsRef<Path>, num_worker_thread: usize) -> Result<Self> {
        let path = library_path.as_ref();
        let lib = treelite_ffi::library()?;
        let c_path = path_to_cstring(path)?;
        let nthread = thread_count(num_worker_thread)?;
        let handle = Handle::create(
            lib,
            HandleKind::Predictor,
            "TreelitePredictorLoad",
            |api, out| unsafe { (api.predictor_load)(c_path.as_ptr(), nthread, out) },
        )?;
        tracing::info!(path = %path.display(), num_worker_thread, "loaded predictor");
        Ok(Self {
            handle,
            path: path.to_path_buf(),
        })
    }

    /// Shared library this predictor was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Predict every row of `dmatrix`.
    ///
    /// With `pred_margin` the raw margin is returned and the model's
    /// prediction transform is skipped.
    pub fn predict_batch(
        &self,
        dmatrix: &DMatrix,
        verbose: bool,
        pred_margin: bool,
    ) -> Result<Predictions> {
        let lib = self.handle.lib();
        ensure_same_library(lib, dmatrix.lib())?;

        let dim = dmatrix.dimension()?;
        let num_feature = self.num_feature()?;
        if dim.num_col > num_feature {
            return Err(TreeliteError::invalid(format!(
                "matrix has {} columns but the model takes {num_feature} features",
                dim.num_col
            )));
        }
        let output_type: OutputType = self.leaf_output_type()?.parse()?;

        let mut capacity = 0usize;
        let ret = unsafe {
            (lib.api().predictor_query_result_size)(self.handle.raw(), dmatrix.raw(), &mut capacity)
        };
        lib.check("TreelitePredictorQueryResultSize", ret)?;

        let mut raw: PredictorOutputHandle = std::ptr::null_mut();
        let ret = unsafe {
            (lib.api().create_predictor_output_vector)(self.handle.raw(), dmatrix.raw(), &mut raw)
        };
        lib.check("TreeliteCreatePredictorOutputVector", ret)?;
        let output = OutputVector {
            predictor: self,
            raw,
        };

        let mut written = 0usize;
        let ret = unsafe {
            (lib.api().predictor_predict_batch)(
                self.handle.raw(),
                dmatrix.raw(),
                i32::from(verbose),
                i32::from(pred_margin),
                output.raw,
                &mut written,
            )
        };
        lib.check("TreelitePredictorPredictBatch", ret)?;

        if written > capacity {
            return Err(TreeliteError::invalid(format!(
                "predictor wrote {written} values into a buffer of {capacity}"
            )));
        }

        let buffer = unsafe { PredictionBuffer::copy_from(output.raw, written, output_type) };
        drop(output);

        tracing::debug!(
            num_row = dim.num_row,
            values = written,
            pred_margin,
            "predicted batch"
        );
        Predictions::new(dim.num_row, buffer)
    }

    fn query_count(
        &self,
        call: &'static str,
        query: treelite_ffi::sys::runtime::PredictorQueryCount,
    ) -> Result<usize> {
        let mut out = 0usize;
        let ret = unsafe { query(self.handle.raw(), &mut out) };
        self.handle.lib().check(call, ret)?;
        Ok(out)
    }

    fn query_float(&self, call: &'static str, query: PredictorQueryFloat) -> Result<f32> {
        let mut out = 0f32;
        let ret = unsafe { query(self.handle.raw(), &mut out) };
        self.handle.lib().check(call, ret)?;
        Ok(out)
    }

    fn query_string(&self, call: &'static str, query: PredictorQueryString) -> Result<String> {
        let mut out: *const c_char = std::ptr::null();
        let ret = unsafe { query(self.handle.raw(), &mut out) };
        self.handle.lib().check(call, ret)?;
        Ok(unsafe { treelite_ffi::c_str_to_string(out) }.unwrap_or_default())
    }

    /// Number of output groups.
    pub fn num_class(&self) -> Result<usize> {
        self.query_count(
            "TreelitePredictorQueryNumClass",
            self.handle.lib().api().predictor_query_num_class,
        )
    }

    /// Number of input features.
    pub fn num_feature(&self) -> Result<usize> {
        self.query_count(
            "TreelitePredictorQueryNumFeature",
            self.handle.lib().api().predictor_query_num_feature,
        )
    }

    /// Name of the prediction transform, e.g. `sigmoid` or `identity`.
    pub fn pred_transform(&self) -> Result<String> {
        self.query_string(
            "TreelitePredictorQueryPredTransform",
            self.handle.lib().api().predictor_query_pred_transform,
        )
    }

    /// Sigmoid scaling factor.
    pub fn sigmoid_alpha(&self) -> Result<f32> {
        self.query_float(
            "TreelitePredictorQuerySigmoidAlpha",
            self.handle.lib().api().predictor_query_sigmoid_alpha,
        )
    }

    /// Exponential-standard-ratio scaling factor, if the library reports it.
    pub fn ratio_c(&self) -> Result<Option<f32>> {
        match self.handle.lib().api().predictor_query_ratio_c {
            Some(query) => self
                .query_float("TreelitePredictorQueryRatioC", query)
                .map(Some),
            None => Ok(None),
        }
    }

    /// Bias added to every margin.
    pub fn global_bias(&self) -> Result<f32> {
        self.query_float(
            "TreelitePredictorQueryGlobalBias",
            self.handle.lib().api().predictor_query_global_bias,
        )
    }

    /// Type of split thresholds, e.g. `float32`.
    pub fn threshold_type(&self) -> Result<String> {
        self.query_string(
            "TreelitePredictorQueryThresholdType",
            self.handle.lib().api().predictor_query_threshold_type,
        )
    }

    /// Type of leaf outputs, e.g. `float32`.
    pub fn leaf_output_type(&self) -> Result<String> {
        self.query_string(
            "TreelitePredictorQueryLeafOutputType",
            self.handle.lib().api().predictor_query_leaf_output_type,
        )
    }

    /// Gather every metadata query.
    pub fn info(&self) -> Result<PredictorInfo> {
        Ok(PredictorInfo {
            num_class: self.num_class()?,
            num_feature: self.num_feature()?,
            pred_transform: self.pred_transform()?,
            sigmoid_alpha: self.sigmoid_alpha()?,
            ratio_c: self.ratio_c()?,
            global_bias: self.global_bias()?,
            threshold_type: self.threshold_type()?,
            leaf_output_type: self.leaf_output_type()?,
        })
    }

    /// Release the predictor, reporting a failure to free it.
    pub fn close(mut self) -> Result<()> {
        self.handle.release()
    }
}

impl fmt::Debug for Predictor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Predictor")
            .field("path", &self.path)
            .field("handle", &self.handle.raw())
            .finish()
    }
}
