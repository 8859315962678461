//! Model compilation.
//!
//! A [`Compiler`] turns a [`Model`] into C sources, and optionally drives a
//! [`Toolchain`] to build those sources into a shared library that a
//! [`crate::Predictor`] can load.

mod params;
mod toolchain;

pub use params::CompilerParams;
pub use toolchain::{build_shared_lib, shared_lib_extension, Recipe, RecipeSource, Toolchain};

use crate::error::{Result, TreeliteError};
use crate::handle::{default_thread_count, ensure_same_library, path_to_cstring, Handle, HandleKind};
use crate::model::Model;
use std::ffi::CString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Code generation strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CompilerKind {
    /// Optimizing generator with annotation and quantization support.
    #[default]
    AstNative,
    /// Minimal generator for models the optimizing one rejects.
    Failsafe,
}

impl CompilerKind {
    /// Name understood by the native library.
    pub fn as_str(&self) -> &'static str {
        match self {
            CompilerKind::AstNative => "ast_native",
            CompilerKind::Failsafe => "failsafe",
        }
    }
}

impl fmt::Display for CompilerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompilerKind {
    type Err = TreeliteError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ast_native" => Ok(CompilerKind::AstNative),
            "failsafe" => Ok(CompilerKind::Failsafe),
            other => Err(TreeliteError::invalid(format!("unknown compiler: {other}"))),
        }
    }
}

/// Append the platform shared library extension to `path` unless it is
/// already there.
pub fn library_path(path: &Path) -> PathBuf {
    let ext = shared_lib_extension();
    if path.extension().map_or(false, |e| e == ext) {
        return path.to_path_buf();
    }
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

/// A configured native compiler.
pub struct Compiler {
    handle: Handle,
    kind: CompilerKind,
    params: CompilerParams,
}

impl Compiler {
    /// Create a compiler of `kind` configured with `params`.
    pub fn new(kind: CompilerKind, params: &CompilerParams) -> Result<Self> {
        let lib = treelite_ffi::library()?;
        let json = params.to_json()?;
        let c_name = CString::new(kind.as_str())?;
        let c_params = CString::new(json.as_str())?;
        let handle = Handle::create(
            lib,
            HandleKind::Compiler,
            "TreeliteCompilerCreateV2",
            |api, out| unsafe { (api.compiler_create_v2)(c_name.as_ptr(), c_params.as_ptr(), out) },
        )?;
        tracing::debug!(compiler = kind.as_str(), params = %json, "created compiler");
        Ok(Self {
            handle,
            kind,
            params: params.clone(),
        })
    }

    /// Code generation strategy of this compiler.
    pub fn kind(&self) -> CompilerKind {
        self.kind
    }

    /// Parameters this compiler was created with.
    pub fn params(&self) -> &CompilerParams {
        &self.params
    }

    /// Write C sources and `recipe.json` for `model` into `dirpath`.
    pub fn generate_code(&self, model: &Model, dirpath: impl AsRef<Path>) -> Result<()> {
        let dirpath = dirpath.as_ref();
        ensure_same_library(self.handle.lib(), model.lib())?;
        let c_dir = path_to_cstring(dirpath)?;
        let lib = self.handle.lib();
        let ret = unsafe {
            (lib.api().compiler_generate_code_v2)(self.handle.raw(), model.raw(), c_dir.as_ptr())
        };
        lib.check("TreeliteCompilerGenerateCodeV2", ret)?;
        tracing::info!(dir = %dirpath.display(), compiler = self.kind.as_str(), "generated code");
        Ok(())
    }

    /// Compile `model` into a shared library at `path`.
    ///
    /// The platform extension is appended to `path` unless already present.
    /// Sources are generated into a scratch directory that is removed
    /// afterwards. Returns the path of the written library.
    pub fn export_shared_lib(
        &self,
        model: &Model,
        path: impl AsRef<Path>,
        toolchain: &Toolchain,
        options: &[String],
    ) -> Result<PathBuf> {
        let dest = library_path(path.as_ref());
        let scratch = tempfile::Builder::new().prefix("treelite-").tempdir()?;

        self.generate_code(model, scratch.path())?;

        let jobs = self
            .params
            .parallel_comp
            .unwrap_or_else(default_thread_count)
            .clamp(1, default_thread_count().max(1));
        let built = build_shared_lib(scratch.path(), toolchain, options, jobs)?;

        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(&built, &dest)?;
        tracing::info!(lib = %dest.display(), "exported shared library");
        Ok(dest)
    }

    /// Release the compiler, reporting a failure to free it.
    pub fn close(mut self) -> Result<()> {
        self.handle.release()
    }
}

impl fmt::Debug for Compiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Compiler")
            .field("kind", &self.kind)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}
