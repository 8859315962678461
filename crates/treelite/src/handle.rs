//! Ownership of opaque native handles.

use crate::error::Result;
use std::ffi::{c_void, CString};
use std::os::raw::c_int;
use std::path::Path;
use std::sync::Arc;
use treelite_ffi::Library;

/// Kind of resource behind a [`Handle`], which fixes how it is freed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HandleKind {
    Model,
    DMatrix,
    Annotation,
    Compiler,
    Predictor,
}

impl HandleKind {
    fn free_call(self) -> &'static str {
        match self {
            HandleKind::Model => "TreeliteFreeModel",
            HandleKind::DMatrix => "TreeliteDMatrixFree",
            HandleKind::Annotation => "TreeliteAnnotationFree",
            HandleKind::Compiler => "TreeliteCompilerFree",
            HandleKind::Predictor => "TreelitePredictorFree",
        }
    }
}

/// An owned native handle, freed exactly once through the library that
/// created it.
pub(crate) struct Handle {
    raw: *mut c_void,
    kind: HandleKind,
    lib: Arc<Library>,
}

// Treelite handles carry no thread affinity; moving one between threads is sound.
unsafe impl Send for Handle {}

impl Handle {
    /// Run a native constructor writing into an out-parameter and take
    /// ownership of the result.
    pub(crate) fn create<F>(
        lib: Arc<Library>,
        kind: HandleKind,
        call: &'static str,
        ctor: F,
    ) -> Result<Self>
    where
        F: FnOnce(&treelite_ffi::Api, *mut *mut c_void) -> c_int,
    {
        let mut raw: *mut c_void = std::ptr::null_mut();
        let out: *mut *mut c_void = &mut raw;
        let ret = ctor(lib.api(), out);
        lib.check(call, ret)?;
        tracing::debug!(kind = ?kind, handle = ?raw, "acquired treelite handle");
        Ok(Self { raw, kind, lib })
    }

    pub(crate) fn raw(&self) -> *mut c_void {
        self.raw
    }

    pub(crate) fn lib(&self) -> &Arc<Library> {
        &self.lib
    }

    /// Free the native resource. Subsequent calls are no-ops.
    pub(crate) fn release(&mut self) -> Result<()> {
        if self.raw.is_null() {
            return Ok(());
        }
        let raw = std::mem::replace(&mut self.raw, std::ptr::null_mut());
        let api = self.lib.api();
        let ret = unsafe {
            match self.kind {
                HandleKind::Model => (api.free_model)(raw),
                HandleKind::DMatrix => (api.dmatrix_free)(raw),
                HandleKind::Annotation => (api.annotation_free)(raw),
                HandleKind::Compiler => (api.compiler_free)(raw),
                HandleKind::Predictor => (api.predictor_free)(raw),
            }
        };
        tracing::debug!(kind = ?self.kind, handle = ?raw, "released treelite handle");
        self.lib.check(self.kind.free_call(), ret)?;
        Ok(())
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            tracing::warn!(kind = ?self.kind, %err, "failed to free treelite handle");
        }
    }
}

/// Handles from different library instances must never be mixed in one call.
pub(crate) fn ensure_same_library(a: &Arc<Library>, b: &Arc<Library>) -> Result<()> {
    if Arc::ptr_eq(a, b) {
        Ok(())
    } else {
        Err(crate::TreeliteError::invalid(format!(
            "handles belong to different treelite libraries ({} and {})",
            a.path().display(),
            b.path().display()
        )))
    }
}

/// Convert a path into a C string for the native API.
pub(crate) fn path_to_cstring(path: &Path) -> Result<CString> {
    let path = path.to_str().ok_or_else(|| {
        crate::TreeliteError::invalid(format!("path is not valid UTF-8: {}", path.display()))
    })?;
    Ok(CString::new(path)?)
}

/// Convert a thread count into the native integer type.
pub(crate) fn thread_count(nthread: usize) -> Result<c_int> {
    c_int::try_from(nthread)
        .map_err(|_| crate::TreeliteError::invalid(format!("thread count too large: {nthread}")))
}

/// Number of threads to use when the caller does not specify one.
pub fn default_thread_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
