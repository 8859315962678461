//! C toolchain driver for turning generated sources into a shared library.
//!
//! The native compiler writes translation units plus a `recipe.json` that
//! lists them. Each unit is compiled to an object file, then all objects are
//! linked into `<target>.<ext>` inside the same directory.
//!
//! Commands run with the code directory as their working directory, since
//! recipe `extra_args` name files such as `arrays.o` relative to it.

use crate::error::{Result, TreeliteError};
use rayon::prelude::*;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::str::FromStr;
use std::time::Instant;

/// Translation units above this many lines make for a slow build.
const LONG_SOURCE_LINES: usize = 10_000;

/// Shared library extension of the current platform.
pub fn shared_lib_extension() -> &'static str {
    if cfg!(target_os = "windows") {
        "dll"
    } else if cfg!(target_os = "macos") {
        "dylib"
    } else {
        "so"
    }
}

/// C compiler used to build the shared library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Toolchain {
    /// GNU C compiler.
    Gcc,
    /// Clang.
    Clang,
    /// Microsoft Visual C++ (`cl.exe`).
    Msvc,
    /// Any other gcc-compatible executable.
    Custom(String),
}

impl Toolchain {
    /// Executable invoked for compiling and linking.
    pub fn program(&self) -> &str {
        match self {
            Toolchain::Gcc => "gcc",
            Toolchain::Clang => "clang",
            Toolchain::Msvc => "cl.exe",
            Toolchain::Custom(program) => program,
        }
    }

    /// Extension of object files the toolchain produces.
    pub fn object_extension(&self) -> &'static str {
        match self {
            Toolchain::Msvc => "obj",
            _ => "o",
        }
    }

    /// Command compiling `src` into `obj`.
    pub fn compile_command(&self, src: &Path, obj: &Path, options: &[String]) -> Command {
        let mut cmd = Command::new(self.program());
        match self {
            Toolchain::Msvc => {
                cmd.args(["/c", "/openmp", "/Ox"])
                    .arg(src)
                    .arg(format!("/Fo{}", obj.display()));
            }
            _ => {
                cmd.args(["-c", "-O3", "-o"])
                    .arg(obj)
                    .arg(src)
                    .args(["-fPIC", "-std=c99"]);
            }
        }
        cmd.args(options);
        cmd
    }

    /// Command linking `objects` (plus recipe `extra_args`) into `lib`.
    pub fn link_command(
        &self,
        objects: &[PathBuf],
        extra_args: &[String],
        lib: &Path,
        options: &[String],
    ) -> Command {
        let mut cmd = Command::new(self.program());
        match self {
            Toolchain::Msvc => {
                cmd.arg("/LD")
                    .arg(format!("/Fe{}", lib.display()))
                    .arg("/openmp")
                    .args(objects)
                    .args(extra_args)
                    .args(options);
            }
            _ => {
                cmd.args(["-shared", "-O3", "-o"])
                    .arg(lib)
                    .args(objects)
                    .args(extra_args)
                    .arg("-std=c99")
                    .args(options)
                    .arg("-lm");
            }
        }
        cmd
    }
}

impl fmt::Display for Toolchain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.program())
    }
}

impl FromStr for Toolchain {
    type Err = TreeliteError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "" => Err(TreeliteError::invalid("toolchain name is empty")),
            "gcc" => Ok(Toolchain::Gcc),
            "clang" => Ok(Toolchain::Clang),
            "msvc" | "cl" | "cl.exe" => Ok(Toolchain::Msvc),
            other => Ok(Toolchain::Custom(other.to_string())),
        }
    }
}

/// Build recipe written by the native compiler next to the sources.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Recipe {
    /// Base name of the shared library.
    pub target: String,
    /// Translation units to compile.
    pub sources: Vec<RecipeSource>,
    /// Additional linker inputs, such as array objects.
    #[serde(default)]
    pub extra_args: Vec<String>,
}

/// One translation unit of a [`Recipe`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RecipeSource {
    /// File stem; the source is `<name>.c`.
    pub name: String,
    /// Line count of the source.
    #[serde(default)]
    pub length: usize,
}

impl Recipe {
    /// File name of the recipe inside a generated code directory.
    pub const FILE_NAME: &'static str = "recipe.json";

    /// Read the recipe from a generated code directory.
    pub fn load(dir: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(dir.join(Self::FILE_NAME))?;
        Ok(serde_json::from_str(&contents)?)
    }
}

/// Compile and link the generated code in `dir` with at most `jobs`
/// concurrent compiler processes. Returns the path of the built library.
pub fn build_shared_lib(
    dir: &Path,
    toolchain: &Toolchain,
    options: &[String],
    jobs: usize,
) -> Result<PathBuf> {
    let recipe = Recipe::load(dir)?;
    if recipe.sources.is_empty() {
        return Err(TreeliteError::Toolchain(format!(
            "{} in {} lists no sources",
            Recipe::FILE_NAME,
            dir.display()
        )));
    }

    let longest = recipe.sources.iter().map(|s| s.length).max().unwrap_or(0);
    if longest > LONG_SOURCE_LINES {
        tracing::info!(
            lines = longest,
            "generated sources are large, compilation may take a while"
        );
    }

    let start = Instant::now();
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs.max(1))
        .build()
        .map_err(|e| TreeliteError::Toolchain(format!("failed to start build pool: {e}")))?;

    let objects = pool.install(|| {
        recipe
            .sources
            .par_iter()
            .map(|source| -> Result<PathBuf> {
                let src = PathBuf::from(format!("{}.c", source.name));
                let obj =
                    PathBuf::from(format!("{}.{}", source.name, toolchain.object_extension()));
                tracing::debug!(source = %src.display(), lines = source.length, "compiling");
                run(toolchain.compile_command(&src, &obj, options).current_dir(dir))?;
                Ok(obj)
            })
            .collect::<Result<Vec<PathBuf>>>()
    })?;

    let lib_name = PathBuf::from(format!("{}.{}", recipe.target, shared_lib_extension()));
    run(toolchain
        .link_command(&objects, &recipe.extra_args, &lib_name, options)
        .current_dir(dir))?;
    let lib = dir.join(lib_name);

    tracing::info!(
        toolchain = %toolchain,
        sources = objects.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        lib = %lib.display(),
        "built shared library"
    );
    Ok(lib)
}

fn run(cmd: &mut Command) -> Result<()> {
    let output = cmd
        .output()
        .map_err(|e| TreeliteError::Toolchain(format!("failed to launch {cmd:?}: {e}")))?;
    if !output.status.success() {
        return Err(TreeliteError::Toolchain(format!(
            "{cmd:?} exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(())
}
