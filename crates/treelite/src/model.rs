//! Tree ensemble models.
//!
//! A [`Model`] owns a native model handle produced by one of the XGBoost or
//! LightGBM front ends.
//!
//! # Example
//!
//! ```ignore
//! use treelite::Model;
//!
//! let model = Model::load_xgboost("testdata/xgboost.model")?;
//! println!("{} trees over {} features", model.num_tree()?, model.num_feature()?);
//! ```

use crate::error::{Result, TreeliteError};
use crate::handle::{path_to_cstring, Handle, HandleKind};
use std::ffi::{c_void, CString};
use std::fmt;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use treelite_ffi::sys::compile::{LoadFromPath, QueryCount};
use treelite_ffi::{Api, FfiError, Library};

/// Serialized model formats understood by the native front ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFormat {
    /// XGBoost legacy binary format.
    XGBoost,
    /// XGBoost JSON format.
    XGBoostJson,
    /// LightGBM text format.
    LightGBM,
}

impl ModelFormat {
    /// Canonical name of the format.
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelFormat::XGBoost => "xgboost",
            ModelFormat::XGBoostJson => "xgboost_json",
            ModelFormat::LightGBM => "lightgbm",
        }
    }
}

impl fmt::Display for ModelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelFormat {
    type Err = TreeliteError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "xgboost" => Ok(ModelFormat::XGBoost),
            "xgboost_json" | "xgboost-json" => Ok(ModelFormat::XGBoostJson),
            "lightgbm" => Ok(ModelFormat::LightGBM),
            other => Err(TreeliteError::invalid(format!(
                "unknown model format: {other}"
            ))),
        }
    }
}

/// A loaded tree ensemble.
pub struct Model {
    handle: Handle,
}

impl Model {
    fn from_path(
        call: &'static str,
        path: &Path,
        select: fn(&Api) -> LoadFromPath,
    ) -> Result<Self> {
        let lib = treelite_ffi::library()?;
        let c_path = path_to_cstring(path)?;
        let load = select(lib.api());
        let handle = Handle::create(lib, HandleKind::Model, call, |_, out| unsafe {
            load(c_path.as_ptr(), out)
        })?;
        tracing::debug!(path = %path.display(), call, "loaded model");
        Ok(Self { handle })
    }

    /// Load a model in `format` from `path`.
    pub fn load(format: ModelFormat, path: impl AsRef<Path>) -> Result<Self> {
        match format {
            ModelFormat::XGBoost => Self::load_xgboost(path),
            ModelFormat::XGBoostJson => Self::load_xgboost_json(path),
            ModelFormat::LightGBM => Self::load_lightgbm(path),
        }
    }

    /// Load a model file generated by XGBoost (legacy binary format).
    pub fn load_xgboost(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_path("TreeliteLoadXGBoostModel", path.as_ref(), |api| {
            api.load_xgboost_model
        })
    }

    /// Load a JSON model file generated by XGBoost.
    pub fn load_xgboost_json(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_path("TreeliteLoadXGBoostJSON", path.as_ref(), |api| {
            api.load_xgboost_json
        })
    }

    /// Load a model file generated by LightGBM.
    pub fn load_lightgbm(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_path("TreeliteLoadLightGBMModel", path.as_ref(), |api| {
            api.load_lightgbm_model
        })
    }

    /// Load an XGBoost model from a JSON string.
    pub fn load_xgboost_json_str(json: &str) -> Result<Self> {
        if json.is_empty() {
            return Err(TreeliteError::invalid("empty XGBoost JSON string"));
        }
        let lib = treelite_ffi::library()?;
        let c_json = CString::new(json)?;
        let handle = Handle::create(
            lib,
            HandleKind::Model,
            "TreeliteLoadXGBoostJSONString",
            |api, out| unsafe { (api.load_xgboost_json_string)(c_json.as_ptr(), json.len(), out) },
        )?;
        Ok(Self { handle })
    }

    /// Load an XGBoost binary model held in memory.
    pub fn load_xgboost_from_buffer(buf: &[u8]) -> Result<Self> {
        if buf.is_empty() {
            return Err(TreeliteError::invalid("empty XGBoost model buffer"));
        }
        let lib = treelite_ffi::library()?;
        let handle = Handle::create(
            lib,
            HandleKind::Model,
            "TreeliteLoadXGBoostModelFromMemoryBuffer",
            |api, out| unsafe {
                (api.load_xgboost_model_from_memory_buffer)(
                    buf.as_ptr() as *const c_void,
                    buf.len(),
                    out,
                )
            },
        )?;
        Ok(Self { handle })
    }

    /// Read an XGBoost binary model to the end of `reader` and load it.
    pub fn load_xgboost_from_reader(mut reader: impl Read) -> Result<Self> {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        Self::load_xgboost_from_buffer(&buf)
    }

    /// Load a LightGBM model from the text produced by `model_to_string()`.
    pub fn load_lightgbm_str(model: &str) -> Result<Self> {
        if model.is_empty() {
            return Err(TreeliteError::invalid("empty LightGBM model string"));
        }
        let lib = treelite_ffi::library()?;
        let c_model = CString::new(model)?;
        let handle = Handle::create(
            lib,
            HandleKind::Model,
            "TreeliteLoadLightGBMModelFromString",
            |api, out| unsafe { (api.load_lightgbm_model_from_string)(c_model.as_ptr(), out) },
        )?;
        Ok(Self { handle })
    }

    /// Load a model checkpoint written by [`Model::serialize`].
    pub fn deserialize(path: impl AsRef<Path>) -> Result<Self> {
        let lib = treelite_ffi::library()?;
        let deserialize = lib.api().deserialize_model.ok_or_else(|| FfiError::MissingSymbol {
            symbol: "TreeliteDeserializeModel",
            path: lib.path().display().to_string(),
        })?;
        let c_path = path_to_cstring(path.as_ref())?;
        let handle = Handle::create(
            lib,
            HandleKind::Model,
            "TreeliteDeserializeModel",
            |_, out| unsafe { deserialize(c_path.as_ptr(), out) },
        )?;
        Ok(Self { handle })
    }

    /// Write a checkpoint of this model to `path`.
    pub fn serialize(&self, path: impl AsRef<Path>) -> Result<()> {
        let lib = self.handle.lib();
        let serialize = lib.api().serialize_model.ok_or_else(|| FfiError::MissingSymbol {
            symbol: "TreeliteSerializeModel",
            path: lib.path().display().to_string(),
        })?;
        let c_path = path_to_cstring(path.as_ref())?;
        let ret = unsafe { serialize(c_path.as_ptr(), self.handle.raw()) };
        lib.check("TreeliteSerializeModel", ret)?;
        Ok(())
    }

    fn query(&self, call: &'static str, query: QueryCount) -> Result<usize> {
        let mut out = 0usize;
        let ret = unsafe { query(self.handle.raw(), &mut out) };
        self.handle.lib().check(call, ret)?;
        Ok(out)
    }

    /// Number of trees in the ensemble.
    pub fn num_tree(&self) -> Result<usize> {
        self.query("TreeliteQueryNumTree", self.handle.lib().api().query_num_tree)
    }

    /// Number of input features.
    pub fn num_feature(&self) -> Result<usize> {
        self.query(
            "TreeliteQueryNumFeature",
            self.handle.lib().api().query_num_feature,
        )
    }

    /// Number of output groups (1 for regression and binary classification).
    pub fn num_class(&self) -> Result<usize> {
        self.query("TreeliteQueryNumClass", self.handle.lib().api().query_num_class)
    }

    /// Keep only the first `limit` trees.
    pub fn set_tree_limit(&mut self, limit: usize) -> Result<()> {
        if limit == 0 {
            return Err(TreeliteError::invalid("tree limit must be positive"));
        }
        let lib = self.handle.lib();
        let ret = unsafe { (lib.api().set_tree_limit)(self.handle.raw(), limit) };
        lib.check("TreeliteSetTreeLimit", ret)?;
        Ok(())
    }

    /// Release the model, reporting a failure to free it.
    pub fn close(mut self) -> Result<()> {
        self.handle.release()
    }

    pub(crate) fn raw(&self) -> treelite_ffi::sys::ModelHandle {
        self.handle.raw()
    }

    pub(crate) fn lib(&self) -> &Arc<Library> {
        self.handle.lib()
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("handle", &self.handle.raw())
            .finish()
    }
}
