//! Raw handle and callback types of the Treelite 1.x C API.
//!
//! Every entry point returns `0` on success and `-1` on failure, with the
//! failure message retrievable through `TreeliteGetLastError` on the same
//! thread.

use std::os::raw::{c_char, c_int, c_void};

/// Opaque handle to a tree ensemble.
pub type ModelHandle = *mut c_void;
/// Opaque handle to a feature matrix.
pub type DMatrixHandle = *mut c_void;
/// Opaque handle to a branch annotation.
pub type AnnotationHandle = *mut c_void;
/// Opaque handle to a configured compiler.
pub type CompilerHandle = *mut c_void;
/// Opaque handle to a predictor backed by a compiled shared library.
pub type PredictorHandle = *mut c_void;
/// Opaque handle to a native prediction output buffer.
pub type PredictorOutputHandle = *mut c_void;

/// Callback receiving native log lines.
pub type LogCallback = unsafe extern "C" fn(msg: *const c_char);

/// Return value signalling success.
pub const SUCCESS: c_int = 0;

/// Common API (`c_api_common.h`).
pub mod common {
    #![allow(missing_docs)]

    use super::*;

    pub type GetLastError = unsafe extern "C" fn() -> *const c_char;
    pub type RegisterLogCallback = unsafe extern "C" fn(callback: LogCallback) -> c_int;
    pub type QueryVersion = unsafe extern "C" fn() -> *const c_char;
    pub type DMatrixCreateFromFile = unsafe extern "C" fn(
        path: *const c_char,
        format: *const c_char,
        data_type: *const c_char,
        nthread: c_int,
        verbose: c_int,
        out: *mut DMatrixHandle,
    ) -> c_int;
    pub type DMatrixCreateFromCsr = unsafe extern "C" fn(
        data: *const c_void,
        data_type: *const c_char,
        col_ind: *const u32,
        row_ptr: *const usize,
        num_row: usize,
        num_col: usize,
        out: *mut DMatrixHandle,
    ) -> c_int;
    pub type DMatrixCreateFromMat = unsafe extern "C" fn(
        data: *const c_void,
        data_type: *const c_char,
        num_row: usize,
        num_col: usize,
        missing_value: *const c_void,
        out: *mut DMatrixHandle,
    ) -> c_int;
    pub type DMatrixGetDimension = unsafe extern "C" fn(
        handle: DMatrixHandle,
        out_num_row: *mut usize,
        out_num_col: *mut usize,
        out_nelem: *mut usize,
    ) -> c_int;
    pub type DMatrixFree = unsafe extern "C" fn(handle: DMatrixHandle) -> c_int;
}

/// Model loading, annotation and compilation (`c_api.h`).
pub mod compile {
    #![allow(missing_docs)]

    use super::*;

    pub type AnnotateBranch = unsafe extern "C" fn(
        model: ModelHandle,
        dmat: DMatrixHandle,
        nthread: c_int,
        verbose: c_int,
        out: *mut AnnotationHandle,
    ) -> c_int;
    pub type AnnotationSave =
        unsafe extern "C" fn(handle: AnnotationHandle, path: *const c_char) -> c_int;
    pub type AnnotationFree = unsafe extern "C" fn(handle: AnnotationHandle) -> c_int;

    pub type CompilerCreateV2 = unsafe extern "C" fn(
        name: *const c_char,
        params_json_str: *const c_char,
        out: *mut CompilerHandle,
    ) -> c_int;
    pub type CompilerGenerateCodeV2 = unsafe extern "C" fn(
        compiler: CompilerHandle,
        model: ModelHandle,
        dirpath: *const c_char,
    ) -> c_int;
    pub type CompilerFree = unsafe extern "C" fn(handle: CompilerHandle) -> c_int;

    pub type LoadFromPath =
        unsafe extern "C" fn(filename: *const c_char, out: *mut ModelHandle) -> c_int;
    pub type LoadXGBoostJsonString = unsafe extern "C" fn(
        json_str: *const c_char,
        length: usize,
        out: *mut ModelHandle,
    ) -> c_int;
    pub type LoadXGBoostFromMemoryBuffer =
        unsafe extern "C" fn(buf: *const c_void, len: usize, out: *mut ModelHandle) -> c_int;
    pub type LoadLightGBMFromString =
        unsafe extern "C" fn(model_str: *const c_char, out: *mut ModelHandle) -> c_int;
    pub type SerializeModel =
        unsafe extern "C" fn(filename: *const c_char, handle: ModelHandle) -> c_int;
    pub type DeserializeModel =
        unsafe extern "C" fn(filename: *const c_char, out: *mut ModelHandle) -> c_int;
    pub type QueryCount = unsafe extern "C" fn(handle: ModelHandle, out: *mut usize) -> c_int;
    pub type SetTreeLimit = unsafe extern "C" fn(handle: ModelHandle, limit: usize) -> c_int;
    pub type FreeModel = unsafe extern "C" fn(handle: ModelHandle) -> c_int;
}

/// Prediction runtime (`c_api_runtime.h`).
pub mod runtime {
    #![allow(missing_docs)]

    use super::*;

    pub type PredictorLoad = unsafe extern "C" fn(
        library_path: *const c_char,
        num_worker_thread: c_int,
        out: *mut PredictorHandle,
    ) -> c_int;
    pub type PredictorPredictBatch = unsafe extern "C" fn(
        handle: PredictorHandle,
        batch: DMatrixHandle,
        verbose: c_int,
        pred_margin: c_int,
        out_result: PredictorOutputHandle,
        out_result_size: *mut usize,
    ) -> c_int;
    pub type CreatePredictorOutputVector = unsafe extern "C" fn(
        handle: PredictorHandle,
        batch: DMatrixHandle,
        out_output_vector: *mut PredictorOutputHandle,
    ) -> c_int;
    pub type DeletePredictorOutputVector = unsafe extern "C" fn(
        handle: PredictorHandle,
        output_vector: PredictorOutputHandle,
    ) -> c_int;
    pub type PredictorQueryResultSize = unsafe extern "C" fn(
        handle: PredictorHandle,
        batch: DMatrixHandle,
        out: *mut usize,
    ) -> c_int;
    pub type PredictorQueryCount =
        unsafe extern "C" fn(handle: PredictorHandle, out: *mut usize) -> c_int;
    pub type PredictorQueryString =
        unsafe extern "C" fn(handle: PredictorHandle, out: *mut *const c_char) -> c_int;
    pub type PredictorQueryFloat =
        unsafe extern "C" fn(handle: PredictorHandle, out: *mut f32) -> c_int;
    pub type PredictorFree = unsafe extern "C" fn(handle: PredictorHandle) -> c_int;
}
