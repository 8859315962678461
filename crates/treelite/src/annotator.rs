//! Branch annotation.
//!
//! An [`Annotator`] runs a model over a data matrix and records how often each
//! branch is taken. The saved annotation feeds the compiler's `annotate_in`
//! parameter so generated code can hint likely branches.

use crate::dmatrix::DMatrix;
use crate::error::Result;
use crate::handle::{ensure_same_library, path_to_cstring, thread_count, Handle, HandleKind};
use crate::model::Model;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Branch frequency profile of a model over a data matrix.
pub struct Annotator {
    handle: Handle,
}

impl Annotator {
    /// Profile `model` over every row of `dmatrix` using `nthread` threads.
    pub fn new(model: &Model, dmatrix: &DMatrix, nthread: usize, verbose: bool) -> Result<Self> {
        ensure_same_library(model.lib(), dmatrix.lib())?;
        let lib = Arc::clone(model.lib());
        let nthread = thread_count(nthread)?;
        let handle = Handle::create(
            lib,
            HandleKind::Annotation,
            "TreeliteAnnotateBranch",
            |api, out| unsafe {
                (api.annotate_branch)(
                    model.raw(),
                    dmatrix.raw(),
                    nthread,
                    i32::from(verbose),
                    out,
                )
            },
        )?;
        tracing::debug!(nthread, "annotated branches");
        Ok(Self { handle })
    }

    /// Write the annotation as JSON to `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let c_path = path_to_cstring(path)?;
        let lib = self.handle.lib();
        let ret = unsafe { (lib.api().annotation_save)(self.handle.raw(), c_path.as_ptr()) };
        lib.check("TreeliteAnnotationSave", ret)?;
        tracing::info!(path = %path.display(), "saved branch annotation");
        Ok(())
    }

    /// Release the annotation, reporting a failure to free it.
    pub fn close(mut self) -> Result<()> {
        self.handle.release()
    }
}

impl fmt::Debug for Annotator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Annotator")
            .field("handle", &self.handle.raw())
            .finish()
    }
}
