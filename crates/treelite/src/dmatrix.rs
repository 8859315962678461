//! Feature matrices passed to annotation and prediction.

use crate::error::{Result, TreeliteError};
use crate::handle::{path_to_cstring, thread_count, Handle, HandleKind};
use serde::{Deserialize, Serialize};
use std::ffi::{c_void, CString};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use treelite_ffi::Library;

mod sealed {
    pub trait Sealed {}
    impl Sealed for f32 {}
    impl Sealed for f64 {}
}

/// Element types the native matrix can hold.
pub trait Element: sealed::Sealed + Copy {
    /// Data type name used by the native API.
    const DATA_TYPE: DataType;
}

impl Element for f32 {
    const DATA_TYPE: DataType = DataType::Float32;
}

impl Element for f64 {
    const DATA_TYPE: DataType = DataType::Float64;
}

/// Native element data types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// 32-bit float.
    Float32,
    /// 64-bit float.
    Float64,
}

impl DataType {
    /// Name used by the native API.
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Float32 => "float32",
            DataType::Float64 => "float64",
        }
    }

    fn c_name(&self) -> &'static [u8] {
        match self {
            DataType::Float32 => b"float32\0",
            DataType::Float64 => b"float64\0",
        }
    }
}

impl FromStr for DataType {
    type Err = TreeliteError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "float32" => Ok(DataType::Float32),
            "float64" => Ok(DataType::Float64),
            other => Err(TreeliteError::invalid(format!("unknown data type: {other}"))),
        }
    }
}

/// Text formats accepted by [`DMatrix::from_file`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    /// LIBSVM sparse format.
    Libsvm,
    /// Comma-separated values.
    Csv,
    /// LIBFM sparse format.
    Libfm,
}

impl FileFormat {
    /// Name used by the native API.
    pub fn as_str(&self) -> &'static str {
        match self {
            FileFormat::Libsvm => "libsvm",
            FileFormat::Csv => "csv",
            FileFormat::Libfm => "libfm",
        }
    }
}

impl FromStr for FileFormat {
    type Err = TreeliteError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "libsvm" => Ok(FileFormat::Libsvm),
            "csv" => Ok(FileFormat::Csv),
            "libfm" => Ok(FileFormat::Libfm),
            other => Err(TreeliteError::invalid(format!("unknown file format: {other}"))),
        }
    }
}

/// Shape of a [`DMatrix`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimension {
    /// Number of rows.
    pub num_row: usize,
    /// Number of columns.
    pub num_col: usize,
    /// Number of stored elements.
    pub num_elem: usize,
}

/// A dense or sparse feature matrix owned by the native library.
///
/// The native side copies its input, so a `DMatrix` does not borrow the
/// slices it was built from.
pub struct DMatrix {
    handle: Handle,
}

impl DMatrix {
    /// Build a dense row-major matrix.
    ///
    /// Entries equal to `missing` are treated as absent; pass `NaN` to mark
    /// only NaN entries as missing.
    pub fn from_dense<T: Element>(
        data: &[T],
        num_row: usize,
        num_col: usize,
        missing: T,
    ) -> Result<Self> {
        validate_dense(data.len(), num_row, num_col)?;

        let lib = treelite_ffi::library()?;
        let data_type = T::DATA_TYPE.c_name();
        let handle = Handle::create(
            lib,
            HandleKind::DMatrix,
            "TreeliteDMatrixCreateFromMat",
            |api, out| unsafe {
                (api.dmatrix_create_from_mat)(
                    data.as_ptr() as *const c_void,
                    data_type.as_ptr() as *const _,
                    num_row,
                    num_col,
                    &missing as *const T as *const c_void,
                    out,
                )
            },
        )?;
        tracing::debug!(
            num_row,
            num_col,
            data_type = T::DATA_TYPE.as_str(),
            "created dense matrix"
        );
        Ok(Self { handle })
    }

    /// Build a sparse matrix in compressed sparse row layout.
    pub fn from_csr<T: Element>(
        data: &[T],
        col_ind: &[u32],
        row_ptr: &[usize],
        num_row: usize,
        num_col: usize,
    ) -> Result<Self> {
        validate_csr(data.len(), col_ind, row_ptr, num_row, num_col)?;

        let lib = treelite_ffi::library()?;
        let data_type = T::DATA_TYPE.c_name();
        let handle = Handle::create(
            lib,
            HandleKind::DMatrix,
            "TreeliteDMatrixCreateFromCSR",
            |api, out| unsafe {
                (api.dmatrix_create_from_csr)(
                    data.as_ptr() as *const c_void,
                    data_type.as_ptr() as *const _,
                    col_ind.as_ptr(),
                    row_ptr.as_ptr(),
                    num_row,
                    num_col,
                    out,
                )
            },
        )?;
        tracing::debug!(num_row, num_col, nnz = data.len(), "created sparse matrix");
        Ok(Self { handle })
    }

    /// Load a matrix from a text file.
    pub fn from_file(
        path: impl AsRef<Path>,
        format: FileFormat,
        data_type: DataType,
        nthread: usize,
        verbose: bool,
    ) -> Result<Self> {
        let path = path.as_ref();
        let lib = treelite_ffi::library()?;
        let c_path = path_to_cstring(path)?;
        let c_format = CString::new(format.as_str())?;
        let c_type = data_type.c_name();
        let nthread = thread_count(nthread)?;
        let handle = Handle::create(
            lib,
            HandleKind::DMatrix,
            "TreeliteDMatrixCreateFromFile",
            |api, out| unsafe {
                (api.dmatrix_create_from_file)(
                    c_path.as_ptr(),
                    c_format.as_ptr(),
                    c_type.as_ptr() as *const _,
                    nthread,
                    i32::from(verbose),
                    out,
                )
            },
        )?;
        tracing::debug!(
            path = %path.display(),
            format = format.as_str(),
            "loaded matrix from file"
        );
        Ok(Self { handle })
    }

    /// Shape and element count.
    pub fn dimension(&self) -> Result<Dimension> {
        let mut dim = Dimension {
            num_row: 0,
            num_col: 0,
            num_elem: 0,
        };
        let lib = self.handle.lib();
        let ret = unsafe {
            (lib.api().dmatrix_get_dimension)(
                self.handle.raw(),
                &mut dim.num_row,
                &mut dim.num_col,
                &mut dim.num_elem,
            )
        };
        lib.check("TreeliteDMatrixGetDimension", ret)?;
        Ok(dim)
    }

    /// Release the matrix, reporting a failure to free it.
    pub fn close(mut self) -> Result<()> {
        self.handle.release()
    }

    pub(crate) fn raw(&self) -> treelite_ffi::sys::DMatrixHandle {
        self.handle.raw()
    }

    pub(crate) fn lib(&self) -> &Arc<Library> {
        self.handle.lib()
    }
}

impl fmt::Debug for DMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DMatrix")
            .field("handle", &self.handle.raw())
            .finish()
    }
}

fn validate_dense(len: usize, num_row: usize, num_col: usize) -> Result<()> {
    let expected = num_row
        .checked_mul(num_col)
        .ok_or_else(|| TreeliteError::invalid(format!("{num_row} x {num_col} overflows")))?;
    if len != expected {
        return Err(TreeliteError::invalid(format!(
            "dense data has {len} elements, expected {num_row} x {num_col} = {expected}"
        )));
    }
    Ok(())
}

fn validate_csr(
    nnz: usize,
    col_ind: &[u32],
    row_ptr: &[usize],
    num_row: usize,
    num_col: usize,
) -> Result<()> {
    if row_ptr.len().checked_sub(1) != Some(num_row) {
        return Err(TreeliteError::invalid(format!(
            "row_ptr has {} entries, expected num_row + 1 for {num_row} rows",
            row_ptr.len()
        )));
    }
    if col_ind.len() != nnz {
        return Err(TreeliteError::invalid(format!(
            "col_ind has {} entries but data has {nnz}",
            col_ind.len()
        )));
    }
    if row_ptr[0] != 0 {
        return Err(TreeliteError::invalid("row_ptr must start at 0"));
    }
    if row_ptr.windows(2).any(|w| w[0] > w[1]) {
        return Err(TreeliteError::invalid("row_ptr must be non-decreasing"));
    }
    if row_ptr[num_row] != nnz {
        return Err(TreeliteError::invalid(format!(
            "row_ptr ends at {} but data has {nnz} elements",
            row_ptr[num_row]
        )));
    }
    if let Some(&col) = col_ind.iter().find(|&&c| c as usize >= num_col) {
        return Err(TreeliteError::invalid(format!(
            "column index {col} out of range for {num_col} columns"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dense_shape_must_match_data() {
        assert!(validate_dense(6, 2, 3).is_ok());
        assert!(validate_dense(0, 0, 30).is_ok());
        assert!(validate_dense(5, 2, 3).is_err());
        assert!(validate_dense(1, usize::MAX, 2).is_err());
    }

    #[test]
    fn csr_layout_is_checked() {
        // [[1, 0, 2], [0, 0, 3]]
        let col_ind = [0u32, 2, 2];
        let row_ptr = [0usize, 2, 3];
        assert!(validate_csr(3, &col_ind, &row_ptr, 2, 3).is_ok());

        assert!(validate_csr(3, &col_ind, &[0, 2], 2, 3).is_err());
        assert!(validate_csr(2, &col_ind, &row_ptr, 2, 3).is_err());
        assert!(validate_csr(3, &col_ind, &[1, 2, 3], 2, 3).is_err());
        assert!(validate_csr(3, &col_ind, &[0, 3, 2], 2, 3).is_err());
        assert!(validate_csr(3, &col_ind, &row_ptr, 2, 2).is_err());
    }

    #[test]
    fn empty_csr_is_valid() {
        assert!(validate_csr(0, &[], &[0], 0, 4).is_ok());
    }

    #[test]
    fn invalid_dense_input_fails_before_loading_library() {
        let result = DMatrix::from_dense(&[1.0f32, 2.0], 3, 1, f32::NAN);
        assert!(matches!(result, Err(TreeliteError::InvalidArgument(_))));
    }

    #[test]
    fn type_and_format_names() {
        assert_eq!(<f32 as Element>::DATA_TYPE.as_str(), "float32");
        assert_eq!(<f64 as Element>::DATA_TYPE.as_str(), "float64");
        assert_eq!("float64".parse::<DataType>().unwrap(), DataType::Float64);
        assert!("int8".parse::<DataType>().is_err());
        assert_eq!("CSV".parse::<FileFormat>().unwrap(), FileFormat::Csv);
        assert_eq!(FileFormat::Libsvm.as_str(), "libsvm");
    }

    #[test]
    fn dense_matrix_reports_dimension() {
        if !treelite_ffi::is_available() {
            return;
        }
        let data = [1.0f32, f32::NAN, 3.0, 4.0, 5.0, 6.0];
        let dmat = DMatrix::from_dense(&data, 2, 3, f32::NAN).unwrap();
        let dim = dmat.dimension().unwrap();
        assert_eq!(dim.num_row, 2);
        assert_eq!(dim.num_col, 3);
        dmat.close().unwrap();
    }
}
