//! Prediction results.

use crate::error::{Result, TreeliteError};
use serde::Serialize;
use std::ffi::c_void;
use std::str::FromStr;

/// Element type of a compiled model's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputType {
    /// 32-bit float scores.
    Float32,
    /// 64-bit float scores.
    Float64,
    /// Unsigned integer outputs (class indices or leaf ids).
    UInt32,
}

impl FromStr for OutputType {
    type Err = TreeliteError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "float32" => Ok(OutputType::Float32),
            "float64" => Ok(OutputType::Float64),
            "uint32" => Ok(OutputType::UInt32),
            other => Err(TreeliteError::invalid(format!(
                "unsupported leaf output type: {other}"
            ))),
        }
    }
}

/// Flat, row-major prediction values in their native element type.
#[derive(Debug, Clone, PartialEq)]
pub enum PredictionBuffer {
    /// 32-bit float scores.
    Float32(Vec<f32>),
    /// 64-bit float scores.
    Float64(Vec<f64>),
    /// Unsigned integer outputs.
    UInt32(Vec<u32>),
}

impl PredictionBuffer {
    /// Copy `len` elements of `ty` starting at `ptr`.
    ///
    /// # Safety
    /// `ptr` must point to at least `len` initialized elements of `ty`.
    pub(crate) unsafe fn copy_from(ptr: *const c_void, len: usize, ty: OutputType) -> Self {
        if len == 0 || ptr.is_null() {
            return Self::empty(ty);
        }
        match ty {
            OutputType::Float32 => {
                Self::Float32(std::slice::from_raw_parts(ptr as *const f32, len).to_vec())
            }
            OutputType::Float64 => {
                Self::Float64(std::slice::from_raw_parts(ptr as *const f64, len).to_vec())
            }
            OutputType::UInt32 => {
                Self::UInt32(std::slice::from_raw_parts(ptr as *const u32, len).to_vec())
            }
        }
    }

    fn empty(ty: OutputType) -> Self {
        match ty {
            OutputType::Float32 => Self::Float32(Vec::new()),
            OutputType::Float64 => Self::Float64(Vec::new()),
            OutputType::UInt32 => Self::UInt32(Vec::new()),
        }
    }

    /// Element type of the buffer.
    pub fn output_type(&self) -> OutputType {
        match self {
            Self::Float32(_) => OutputType::Float32,
            Self::Float64(_) => OutputType::Float64,
            Self::UInt32(_) => OutputType::UInt32,
        }
    }

    /// Number of values.
    pub fn len(&self) -> usize {
        match self {
            Self::Float32(v) => v.len(),
            Self::Float64(v) => v.len(),
            Self::UInt32(v) => v.len(),
        }
    }

    /// Whether the buffer holds no values.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value at flat index `i`, widened to `f64`.
    pub fn get(&self, i: usize) -> Option<f64> {
        match self {
            Self::Float32(v) => v.get(i).map(|&x| f64::from(x)),
            Self::Float64(v) => v.get(i).copied(),
            Self::UInt32(v) => v.get(i).map(|&x| f64::from(x)),
        }
    }
}

/// Output of a batch prediction: `num_row` rows of `num_output` values.
#[derive(Debug, Clone, PartialEq)]
pub struct Predictions {
    num_row: usize,
    buffer: PredictionBuffer,
}

impl Predictions {
    /// Wrap a buffer holding an equal number of values for each row.
    pub fn new(num_row: usize, buffer: PredictionBuffer) -> Result<Self> {
        let len = buffer.len();
        let uneven = if num_row == 0 { len != 0 } else { len % num_row != 0 };
        if uneven {
            return Err(TreeliteError::invalid(format!(
                "{len} prediction values cannot be split across {num_row} rows"
            )));
        }
        Ok(Self { num_row, buffer })
    }

    /// Number of rows predicted.
    pub fn num_row(&self) -> usize {
        self.num_row
    }

    /// Number of values per row.
    pub fn num_output(&self) -> usize {
        if self.num_row == 0 {
            0
        } else {
            self.buffer.len() / self.num_row
        }
    }

    /// Total number of values.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether no values were produced.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Element type of the values.
    pub fn output_type(&self) -> OutputType {
        self.buffer.output_type()
    }

    /// Underlying typed buffer.
    pub fn buffer(&self) -> &PredictionBuffer {
        &self.buffer
    }

    /// Take the underlying typed buffer.
    pub fn into_buffer(self) -> PredictionBuffer {
        self.buffer
    }

    /// Value `col` of row `row`, widened to `f64`.
    pub fn value(&self, row: usize, col: usize) -> Option<f64> {
        if row >= self.num_row || col >= self.num_output() {
            return None;
        }
        self.buffer.get(row * self.num_output() + col)
    }

    /// All values widened to `f64`.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        match &self.buffer {
            PredictionBuffer::Float32(v) => v.iter().map(|&x| f64::from(x)).collect(),
            PredictionBuffer::Float64(v) => v.clone(),
            PredictionBuffer::UInt32(v) => v.iter().map(|&x| f64::from(x)).collect(),
        }
    }

    /// Values as `f32`, if that is their native type.
    pub fn as_f32(&self) -> Option<&[f32]> {
        match &self.buffer {
            PredictionBuffer::Float32(v) => Some(v),
            _ => None,
        }
    }

    /// Values as `f64`, if that is their native type.
    pub fn as_f64(&self) -> Option<&[f64]> {
        match &self.buffer {
            PredictionBuffer::Float64(v) => Some(v),
            _ => None,
        }
    }

    /// Values as `u32`, if that is their native type.
    pub fn as_u32(&self) -> Option<&[u32]> {
        match &self.buffer {
            PredictionBuffer::UInt32(v) => Some(v),
            _ => None,
        }
    }
}
