//! Compiler parameters.
//!
//! Serialized to the JSON document accepted by `TreeliteCompilerCreateV2`.
//! Flags travel as `0` / `1` integers; unset options and cleared flags are
//! left out so the native defaults apply.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Parameters controlling code generation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompilerParams {
    /// Branch annotation produced by [`crate::Annotator::save`].
    #[serde(
        rename = "annotate_in",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub annotation_path: Option<PathBuf>,

    /// Quantize thresholds into integer indices.
    #[serde(default, with = "int_flag", skip_serializing_if = "is_false")]
    pub quantize: bool,

    /// Split generated code into this many translation units.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel_comp: Option<usize>,

    /// Print progress from the native compiler.
    #[serde(default, with = "int_flag", skip_serializing_if = "is_false")]
    pub verbose: bool,

    /// Name of the shared library target written into `recipe.json`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub native_lib_name: Option<String>,

    /// Cost threshold above which subtrees are folded into arrays.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_folding_req: Option<f64>,

    /// Emit large arrays as an ELF object instead of C source (Linux only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dump_array_as_elf: Option<u32>,
}

fn is_false(flag: &bool) -> bool {
    !*flag
}

impl CompilerParams {
    /// Empty parameter set; every option takes the native default.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use the branch annotation at `path`.
    pub fn annotation_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.annotation_path = Some(path.into());
        self
    }

    /// Enable or disable threshold quantization.
    pub fn quantize(mut self, quantize: bool) -> Self {
        self.quantize = quantize;
        self
    }

    /// Split output into `units` translation units.
    pub fn parallel_comp(mut self, units: usize) -> Self {
        self.parallel_comp = Some(units);
        self
    }

    /// Enable or disable native progress output.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Set the shared library target name.
    pub fn native_lib_name(mut self, name: impl Into<String>) -> Self {
        self.native_lib_name = Some(name.into());
        self
    }

    /// Set the code folding threshold.
    pub fn code_folding_req(mut self, req: f64) -> Self {
        self.code_folding_req = Some(req);
        self
    }

    /// Emit arrays as an ELF object.
    pub fn dump_array_as_elf(mut self, level: u32) -> Self {
        self.dump_array_as_elf = Some(level);
        self
    }

    /// Parse from JSON text.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Serialize to the JSON document handed to the native compiler.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

mod int_flag {
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }

    pub fn serialize<S: Serializer>(flag: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(u8::from(*flag))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        Ok(match Flag::deserialize(deserializer)? {
            Flag::Bool(flag) => flag,
            Flag::Int(value) => value != 0,
        })
    }
}
