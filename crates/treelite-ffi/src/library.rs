//! Runtime loading of `libtreelite`.
//!
//! The library is opened with `libloading` and every entry point the binding
//! uses is resolved up front into an [`Api`] table. A process-wide slot holds
//! the active library; each safe handle keeps its own `Arc<Library>` so the
//! code it was created with stays mapped until it is released.

use crate::error::{FfiError, Result};
use crate::sys::{common, compile, runtime, SUCCESS};
use parking_lot::RwLock;
use std::ffi::CStr;
use std::fmt;
use std::os::raw::{c_char, c_int};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Environment variable naming the full path of the Treelite library.
pub const LIBRARY_ENV: &str = "TREELITE_LIBRARY";

/// Environment variable naming a Treelite installation prefix.
pub const HOME_ENV: &str = "TREELITE_HOME";

static ACTIVE: RwLock<Option<Arc<Library>>> = parking_lot::const_rwlock(None);

unsafe fn required<T: Copy>(
    native: &libloading::Library,
    path: &Path,
    symbol: &'static str,
) -> Result<T> {
    native
        .get::<T>(symbol.as_bytes())
        .map(|sym| *sym)
        .map_err(|_| FfiError::MissingSymbol {
            symbol,
            path: path.display().to_string(),
        })
}

unsafe fn optional<T: Copy>(native: &libloading::Library, symbol: &'static str) -> Option<T> {
    native.get::<T>(symbol.as_bytes()).map(|sym| *sym).ok()
}

macro_rules! api_table {
    (
        required { $($field:ident: $ty:ty = $sym:literal,)* }
        optional { $($ofield:ident: $oty:ty = $osym:literal,)* }
    ) => {
        /// Function table resolved from a loaded Treelite library.
        #[derive(Clone, Copy, Debug)]
        pub struct Api {
            $(
                #[doc = concat!("`", $sym, "`.")]
                pub $field: $ty,
            )*
            $(
                #[doc = concat!("`", $osym, "`, absent from older releases.")]
                pub $ofield: Option<$oty>,
            )*
        }

        impl Api {
            /// Resolve every entry point from `native`.
            ///
            /// # Safety
            /// The library must export these symbols with the Treelite 1.x
            /// signatures declared in [`crate::sys`].
            unsafe fn resolve(native: &libloading::Library, path: &Path) -> Result<Self> {
                Ok(Self {
                    $($field: required(native, path, $sym)?,)*
                    $($ofield: optional(native, $osym),)*
                })
            }
        }
    };
}

api_table! {
    required {
        get_last_error: common::GetLastError = "TreeliteGetLastError",
        dmatrix_create_from_file: common::DMatrixCreateFromFile = "TreeliteDMatrixCreateFromFile",
        dmatrix_create_from_csr: common::DMatrixCreateFromCsr = "TreeliteDMatrixCreateFromCSR",
        dmatrix_create_from_mat: common::DMatrixCreateFromMat = "TreeliteDMatrixCreateFromMat",
        dmatrix_get_dimension: common::DMatrixGetDimension = "TreeliteDMatrixGetDimension",
        dmatrix_free: common::DMatrixFree = "TreeliteDMatrixFree",

        annotate_branch: compile::AnnotateBranch = "TreeliteAnnotateBranch",
        annotation_save: compile::AnnotationSave = "TreeliteAnnotationSave",
        annotation_free: compile::AnnotationFree = "TreeliteAnnotationFree",
        compiler_create_v2: compile::CompilerCreateV2 = "TreeliteCompilerCreateV2",
        compiler_generate_code_v2: compile::CompilerGenerateCodeV2 = "TreeliteCompilerGenerateCodeV2",
        compiler_free: compile::CompilerFree = "TreeliteCompilerFree",
        load_lightgbm_model: compile::LoadFromPath = "TreeliteLoadLightGBMModel",
        load_lightgbm_model_from_string: compile::LoadLightGBMFromString = "TreeliteLoadLightGBMModelFromString",
        load_xgboost_model: compile::LoadFromPath = "TreeliteLoadXGBoostModel",
        load_xgboost_json: compile::LoadFromPath = "TreeliteLoadXGBoostJSON",
        load_xgboost_json_string: compile::LoadXGBoostJsonString = "TreeliteLoadXGBoostJSONString",
        load_xgboost_model_from_memory_buffer: compile::LoadXGBoostFromMemoryBuffer = "TreeliteLoadXGBoostModelFromMemoryBuffer",
        query_num_tree: compile::QueryCount = "TreeliteQueryNumTree",
        query_num_feature: compile::QueryCount = "TreeliteQueryNumFeature",
        query_num_class: compile::QueryCount = "TreeliteQueryNumClass",
        set_tree_limit: compile::SetTreeLimit = "TreeliteSetTreeLimit",
        free_model: compile::FreeModel = "TreeliteFreeModel",

        predictor_load: runtime::PredictorLoad = "TreelitePredictorLoad",
        predictor_predict_batch: runtime::PredictorPredictBatch = "TreelitePredictorPredictBatch",
        create_predictor_output_vector: runtime::CreatePredictorOutputVector = "TreeliteCreatePredictorOutputVector",
        delete_predictor_output_vector: runtime::DeletePredictorOutputVector = "TreeliteDeletePredictorOutputVector",
        predictor_query_result_size: runtime::PredictorQueryResultSize = "TreelitePredictorQueryResultSize",
        predictor_query_num_class: runtime::PredictorQueryCount = "TreelitePredictorQueryNumClass",
        predictor_query_num_feature: runtime::PredictorQueryCount = "TreelitePredictorQueryNumFeature",
        predictor_query_pred_transform: runtime::PredictorQueryString = "TreelitePredictorQueryPredTransform",
        predictor_query_sigmoid_alpha: runtime::PredictorQueryFloat = "TreelitePredictorQuerySigmoidAlpha",
        predictor_query_global_bias: runtime::PredictorQueryFloat = "TreelitePredictorQueryGlobalBias",
        predictor_query_threshold_type: runtime::PredictorQueryString = "TreelitePredictorQueryThresholdType",
        predictor_query_leaf_output_type: runtime::PredictorQueryString = "TreelitePredictorQueryLeafOutputType",
        predictor_free: runtime::PredictorFree = "TreelitePredictorFree",
    }
    optional {
        register_log_callback: common::RegisterLogCallback = "TreeliteRegisterLogCallback",
        query_version: common::QueryVersion = "TreeliteQueryTreeliteVersion",
        serialize_model: compile::SerializeModel = "TreeliteSerializeModel",
        deserialize_model: compile::DeserializeModel = "TreeliteDeserializeModel",
        predictor_query_ratio_c: runtime::PredictorQueryFloat = "TreelitePredictorQueryRatioC",
    }
}

/// A loaded Treelite library.
pub struct Library {
    api: Api,
    path: PathBuf,
    version: Option<String>,
    _native: libloading::Library,
}

impl Library {
    /// Open the library at `path` and resolve its entry points.
    ///
    /// A bare file name is resolved through the system loader search path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let native = unsafe { libloading::Library::new(path) }
            .map_err(|e| FfiError::LibraryNotFound(format!("{}: {}", path.display(), e)))?;

        let api = unsafe { Api::resolve(&native, path)? };

        let version = api
            .query_version
            .and_then(|query| unsafe { c_str_to_string(query()) });

        if let Some(register) = api.register_log_callback {
            let ret = unsafe { register(forward_native_log) };
            if ret != SUCCESS {
                tracing::warn!(path = %path.display(), "failed to register treelite log callback");
            }
        }

        tracing::debug!(
            path = %path.display(),
            version = version.as_deref().unwrap_or("unknown"),
            "loaded treelite"
        );

        Ok(Self {
            api,
            path: path.to_path_buf(),
            version,
            _native: native,
        })
    }

    /// Function table of this library.
    pub fn api(&self) -> &Api {
        &self.api
    }

    /// Path the library was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Native version string, if the library reports one.
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Message of the last failed call on the current thread.
    pub fn last_error(&self) -> String {
        unsafe { c_str_to_string((self.api.get_last_error)()) }
            .unwrap_or_else(|| "unknown error".to_string())
    }

    /// Translate the return code of `call` into a `Result`.
    pub fn check(&self, call: &'static str, ret: c_int) -> Result<()> {
        if ret == SUCCESS {
            Ok(())
        } else {
            Err(FfiError::Native {
                call,
                message: self.last_error(),
            })
        }
    }
}

impl fmt::Debug for Library {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Library")
            .field("path", &self.path)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

/// Copy a native, NUL-terminated string.
///
/// # Safety
/// `ptr` must be null or point to a valid C string.
pub unsafe fn c_str_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        None
    } else {
        Some(CStr::from_ptr(ptr).to_string_lossy().into_owned())
    }
}

unsafe extern "C" fn forward_native_log(msg: *const c_char) {
    if let Some(msg) = c_str_to_string(msg) {
        tracing::info!(target: "treelite::native", "{}", msg.trim_end());
    }
}

/// Platform file name of the Treelite shared library.
pub fn default_library_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "treelite.dll"
    } else if cfg!(target_os = "macos") {
        "libtreelite.dylib"
    } else {
        "libtreelite.so"
    }
}

/// Locations tried, in order, when no library has been loaded explicitly.
pub fn candidate_paths() -> Vec<PathBuf> {
    let name = default_library_name();
    let mut candidates = Vec::new();

    if let Some(path) = std::env::var_os(LIBRARY_ENV) {
        candidates.push(PathBuf::from(path));
    }
    if let Some(home) = std::env::var_os(HOME_ENV) {
        candidates.push(Path::new(&home).join("lib").join(name));
    }
    if let Some(dir) = option_env!("TREELITE_BUILD_LIB_DIR") {
        candidates.push(Path::new(dir).join(name));
    }
    candidates.push(PathBuf::from(name));
    candidates
}

/// The process-wide library, loading it on first use.
pub fn library() -> Result<Arc<Library>> {
    if let Some(lib) = ACTIVE.read().as_ref() {
        return Ok(Arc::clone(lib));
    }

    let mut slot = ACTIVE.write();
    if let Some(lib) = slot.as_ref() {
        return Ok(Arc::clone(lib));
    }

    let mut failures = Vec::new();
    for candidate in candidate_paths() {
        match Library::open(&candidate) {
            Ok(lib) => {
                let lib = Arc::new(lib);
                *slot = Some(Arc::clone(&lib));
                return Ok(lib);
            }
            // A library that loads but lacks symbols is the wrong library; report it as is.
            Err(err @ FfiError::MissingSymbol { .. }) => return Err(err),
            Err(err) => failures.push(err.to_string()),
        }
    }

    Err(FfiError::LibraryNotFound(failures.join("; ")))
}

/// Load the library at `path` and make it the process-wide library.
pub fn load_library(path: impl AsRef<Path>) -> Result<Arc<Library>> {
    let lib = Arc::new(Library::open(path)?);
    *ACTIVE.write() = Some(Arc::clone(&lib));
    Ok(lib)
}

/// Whether a Treelite library can be loaded in this process.
pub fn is_available() -> bool {
    library().is_ok()
}
