//! Marshaling and ownership checks against a stand-in Treelite library.
//!
//! `tests/data/stub_treelite.c` is built twice with `gcc` into separate
//! shared objects, so handles from two library instances can be mixed. The
//! stub counts every entry point and fails any one of them on request.
//! Tests return early when `gcc` is unavailable.

use libloading::Symbol;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use tempfile::tempdir;
use treelite::ffi::Library;
use treelite::prelude::*;
use treelite::Dimension;

const STUB_SOURCE: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/data/stub_treelite.c");

// Every test swaps the process-wide library.
static SERIAL: Mutex<()> = Mutex::new(());
static STUBS: OnceLock<Option<[PathBuf; 2]>> = OnceLock::new();

fn serial() -> MutexGuard<'static, ()> {
    SERIAL.lock().unwrap_or_else(|e| e.into_inner())
}

fn compile_stub(name: &str) -> Option<PathBuf> {
    if !cfg!(unix) {
        return None;
    }
    let out = Path::new(env!("CARGO_TARGET_TMPDIR"))
        .join(format!("lib{name}.{}", shared_lib_extension()));
    let status = Command::new("gcc")
        .args(["-std=c99", "-shared", "-fPIC", "-O1", "-o"])
        .arg(&out)
        .arg(STUB_SOURCE)
        .status()
        .ok()?;
    status.success().then_some(out)
}

fn stub_paths() -> Option<&'static [PathBuf; 2]> {
    STUBS
        .get_or_init(|| Some([compile_stub("stub_treelite_a")?, compile_stub("stub_treelite_b")?]))
        .as_ref()
}

/// A stub installed as the process-wide library, plus its control entry points.
struct Stub {
    lib: Arc<Library>,
    native: libloading::Library,
}

impl Stub {
    fn install(path: &Path) -> Self {
        let lib = treelite::ffi::load_library(path).unwrap();
        // Same path, same dlopen handle: counters are shared with `lib`.
        let native = unsafe { libloading::Library::new(path) }.unwrap();
        let stub = Self { lib, native };
        stub.reset();
        stub
    }

    fn reset(&self) {
        unsafe {
            let reset: Symbol<unsafe extern "C" fn()> = self.native.get(b"StubReset").unwrap();
            reset();
        }
    }

    fn fail_on(&self, call: &str) {
        let call = CString::new(call).unwrap();
        unsafe {
            let fail_on: Symbol<unsafe extern "C" fn(*const c_char)> =
                self.native.get(b"StubFailOn").unwrap();
            fail_on(call.as_ptr());
        }
    }

    fn calls(&self, call: &str) -> c_int {
        let call = CString::new(call).unwrap();
        unsafe {
            let count: Symbol<unsafe extern "C" fn(*const c_char) -> c_int> =
                self.native.get(b"StubCallCount").unwrap();
            count(call.as_ptr())
        }
    }

    fn last_params(&self) -> String {
        unsafe {
            let params: Symbol<unsafe extern "C" fn() -> *const c_char> =
                self.native.get(b"StubLastParams").unwrap();
            CStr::from_ptr(params()).to_string_lossy().into_owned()
        }
    }
}

fn is_invalid<T>(result: Result<T>) -> bool {
    matches!(result, Err(TreeliteError::InvalidArgument(_)))
}

#[test]
fn optional_symbols_are_resolved() {
    let _serial = serial();
    let Some([primary, _]) = stub_paths() else {
        return;
    };
    let stub = Stub::install(primary);
    assert_eq!(stub.lib.version(), Some("1.4.0-stub"));
    assert_eq!(stub.lib.path(), primary.as_path());
    assert!(stub.lib.api().serialize_model.is_some());
    assert!(stub.lib.api().predictor_query_ratio_c.is_some());
}

#[test]
fn handles_from_different_libraries_are_not_mixed() {
    let _serial = serial();
    let Some([primary, secondary]) = stub_paths() else {
        return;
    };
    let dir = tempdir().unwrap();

    let first = Stub::install(primary);
    let model = Model::load_xgboost_from_buffer(b"model").unwrap();
    let dmat = DMatrix::from_dense(&[0.5f32, 1.0], 1, 2, f32::NAN).unwrap();

    let second = Stub::install(secondary);
    assert!(!Arc::ptr_eq(&first.lib, &second.lib));
    let predictor = Predictor::load(secondary, 1).unwrap();
    let compiler = Compiler::new(CompilerKind::AstNative, &CompilerParams::new()).unwrap();
    let other_dmat = DMatrix::from_dense(&[0.5f32, 1.0], 1, 2, f32::NAN).unwrap();

    assert!(is_invalid(predictor.predict_batch(&dmat, false, false)));
    assert!(is_invalid(compiler.generate_code(&model, dir.path())));
    assert!(is_invalid(Annotator::new(&model, &other_dmat, 1, false)));

    assert_eq!(second.calls("TreelitePredictorQueryResultSize"), 0);
    assert_eq!(second.calls("TreeliteCreatePredictorOutputVector"), 0);
    assert_eq!(second.calls("TreeliteCompilerGenerateCodeV2"), 0);
    assert_eq!(first.calls("TreeliteAnnotateBranch"), 0);
    assert_eq!(second.calls("TreeliteAnnotateBranch"), 0);

    // Each handle is freed by the library that created it.
    drop(model);
    drop(dmat);
    assert_eq!(first.calls("TreeliteFreeModel"), 1);
    assert_eq!(first.calls("TreeliteDMatrixFree"), 1);
    assert_eq!(second.calls("TreeliteDMatrixFree"), 0);
    drop(other_dmat);
    assert_eq!(second.calls("TreeliteDMatrixFree"), 1);
}

#[test]
fn failed_batch_still_frees_output_vector() {
    let _serial = serial();
    let Some([primary, _]) = stub_paths() else {
        return;
    };
    let stub = Stub::install(primary);
    let dmat = DMatrix::from_dense(&[0.25f32, 1.0, 0.75, 1.0], 2, 2, f32::NAN).unwrap();
    let predictor = Predictor::load(primary, 1).unwrap();

    stub.fail_on("TreelitePredictorPredictBatch");
    let err = predictor.predict_batch(&dmat, false, false).unwrap_err();
    assert!(err.is_native());
    assert!(err
        .to_string()
        .contains("stub failure in TreelitePredictorPredictBatch"));
    assert_eq!(stub.calls("TreelitePredictorPredictBatch"), 1);
    assert_eq!(stub.calls("TreeliteCreatePredictorOutputVector"), 1);
    assert_eq!(stub.calls("TreeliteDeletePredictorOutputVector"), 1);
}

#[test]
fn batch_copies_predictions_and_frees_output() {
    let _serial = serial();
    let Some([primary, _]) = stub_paths() else {
        return;
    };
    let stub = Stub::install(primary);
    let data = [0.25f32, 9.0, f32::NAN, 9.0, 0.75, 9.0];
    let dmat = DMatrix::from_dense(&data, 3, 2, f32::NAN).unwrap();
    assert_eq!(
        dmat.dimension().unwrap(),
        Dimension {
            num_row: 3,
            num_col: 2,
            num_elem: 5
        }
    );

    let predictor = Predictor::load(primary, 2).unwrap();
    let scores = predictor.predict_batch(&dmat, false, false).unwrap();
    assert_eq!(scores.num_row(), 3);
    assert_eq!(scores.num_output(), 1);
    assert_eq!(scores.as_f32(), Some(&[0.25f32, 0.0, 0.75][..]));

    let margins = predictor.predict_batch(&dmat, false, true).unwrap();
    assert_eq!(margins.to_f64_vec(), vec![1.25, 1.0, 1.75]);

    assert_eq!(stub.calls("TreeliteCreatePredictorOutputVector"), 2);
    assert_eq!(stub.calls("TreeliteDeletePredictorOutputVector"), 2);
}

#[test]
fn wide_matrix_is_rejected_before_native_prediction() {
    let _serial = serial();
    let Some([primary, _]) = stub_paths() else {
        return;
    };
    let stub = Stub::install(primary);
    let predictor = Predictor::load(primary, 1).unwrap();
    let wide = DMatrix::from_dense(&[0.0f64; 6], 2, 3, f64::NAN).unwrap();

    let err = predictor.predict_batch(&wide, false, false).unwrap_err();
    assert!(matches!(err, TreeliteError::InvalidArgument(_)));
    assert!(err.to_string().contains("3 columns"));
    assert_eq!(stub.calls("TreelitePredictorQueryResultSize"), 0);
    assert_eq!(stub.calls("TreeliteCreatePredictorOutputVector"), 0);
    assert_eq!(stub.calls("TreelitePredictorPredictBatch"), 0);

    // Fewer columns than features is passed through.
    let narrow = DMatrix::from_dense(&[0.5f64, 0.25], 2, 1, f64::NAN).unwrap();
    let scores = predictor.predict_batch(&narrow, false, false).unwrap();
    assert_eq!(scores.to_f64_vec(), vec![0.5, 0.25]);
}

#[test]
fn close_reports_native_free_error() {
    let _serial = serial();
    let Some([primary, _]) = stub_paths() else {
        return;
    };
    let stub = Stub::install(primary);
    let dmat = DMatrix::from_dense(&[1.0f32], 1, 1, f32::NAN).unwrap();

    stub.fail_on("TreeliteDMatrixFree");
    let err = dmat.close().unwrap_err();
    assert!(err.is_native());
    assert!(err.to_string().contains("TreeliteDMatrixFree"));
    assert_eq!(stub.calls("TreeliteDMatrixFree"), 1);
}

#[test]
fn drop_logs_free_error_without_retrying() {
    let _serial = serial();
    let Some([primary, _]) = stub_paths() else {
        return;
    };
    let stub = Stub::install(primary);
    let model = Model::load_xgboost_from_buffer(b"model").unwrap();

    stub.fail_on("TreeliteFreeModel");
    drop(model);
    assert_eq!(stub.calls("TreeliteFreeModel"), 1);
}

#[test]
fn every_handle_is_freed_exactly_once() {
    let _serial = serial();
    let Some([primary, _]) = stub_paths() else {
        return;
    };
    let stub = Stub::install(primary);
    {
        let model = Model::load_xgboost_from_buffer(b"model").unwrap();
        let dmat = DMatrix::from_dense(&[0.5f32, 1.0], 1, 2, f32::NAN).unwrap();
        let annotator = Annotator::new(&model, &dmat, 1, false).unwrap();
        let compiler = Compiler::new(CompilerKind::Failsafe, &CompilerParams::new()).unwrap();
        let predictor = Predictor::load(primary, 1).unwrap();

        predictor.close().unwrap();
        annotator.close().unwrap();
        drop(compiler);
        model.close().unwrap();
        drop(dmat);
    }
    for call in [
        "TreeliteFreeModel",
        "TreeliteDMatrixFree",
        "TreeliteAnnotationFree",
        "TreeliteCompilerFree",
        "TreelitePredictorFree",
    ] {
        assert_eq!(stub.calls(call), 1, "{call}");
    }
}

#[test]
fn model_loaders_pass_buffers_and_lengths() {
    let _serial = serial();
    let Some([primary, _]) = stub_paths() else {
        return;
    };
    let _stub = Stub::install(primary);
    let dir = tempdir().unwrap();

    // The stub reports the input length as the tree count.
    let model = Model::load_xgboost_from_buffer(b"12345").unwrap();
    assert_eq!(model.num_tree().unwrap(), 5);
    let model = Model::load_xgboost_from_reader(&b"1234567"[..]).unwrap();
    assert_eq!(model.num_tree().unwrap(), 7);
    let json = r#"{"learner": {}}"#;
    let model = Model::load_xgboost_json_str(json).unwrap();
    assert_eq!(model.num_tree().unwrap(), json.len());

    let model = Model::load_lightgbm_str("tree\nversion=v3\n").unwrap();
    assert_eq!(model.num_tree().unwrap(), 1);
    let err = Model::load_lightgbm_str("not a model").unwrap_err();
    assert!(err.is_native());
    assert!(err.to_string().contains("does not start with 'tree'"));
    assert!(matches!(
        Model::load_lightgbm_str("tree\0"),
        Err(TreeliteError::NulError(_))
    ));

    let file = dir.path().join("model.txt");
    std::fs::write(&file, "tree\n").unwrap();
    let mut model = Model::load(ModelFormat::LightGBM, &file).unwrap();
    assert_eq!(model.num_tree().unwrap(), 3);
    assert_eq!(model.num_feature().unwrap(), 2);
    assert_eq!(model.num_class().unwrap(), 1);
    model.set_tree_limit(2).unwrap();
    assert_eq!(model.num_tree().unwrap(), 2);
    assert!(model.set_tree_limit(10).unwrap_err().is_native());

    let err = Model::load_xgboost(dir.path().join("missing.model")).unwrap_err();
    assert!(err.to_string().contains("cannot open model file"));
}

#[test]
fn checkpoint_round_trips_through_file() {
    let _serial = serial();
    let Some([primary, _]) = stub_paths() else {
        return;
    };
    let _stub = Stub::install(primary);
    let dir = tempdir().unwrap();
    let checkpoint = dir.path().join("model.ckpt");

    let model = Model::load_xgboost_from_buffer(b"1234567").unwrap();
    model.serialize(&checkpoint).unwrap();
    let restored = Model::deserialize(&checkpoint).unwrap();
    assert_eq!(restored.num_tree().unwrap(), 7);
    assert_eq!(restored.num_feature().unwrap(), 2);

    std::fs::write(&checkpoint, "garbage").unwrap();
    assert!(Model::deserialize(&checkpoint).unwrap_err().is_native());
}

#[test]
fn matrices_from_csr_and_file() {
    let _serial = serial();
    let Some([primary, _]) = stub_paths() else {
        return;
    };
    let _stub = Stub::install(primary);
    let dir = tempdir().unwrap();

    // [[1, 0, 2], [0, 0, 3]]
    let csr = DMatrix::from_csr(&[1.0f64, 2.0, 3.0], &[0, 2, 2], &[0, 2, 3], 2, 3).unwrap();
    let dim = csr.dimension().unwrap();
    assert_eq!((dim.num_row, dim.num_col, dim.num_elem), (2, 3, 3));

    let csv = dir.path().join("features.csv");
    std::fs::write(&csv, "0.5,1\n0.25,2\n").unwrap();
    let from_file = DMatrix::from_file(&csv, FileFormat::Csv, DataType::Float64, 1, false).unwrap();
    let dim = from_file.dimension().unwrap();
    assert_eq!((dim.num_row, dim.num_col, dim.num_elem), (2, 2, 4));

    let err = DMatrix::from_file(&csv, FileFormat::Libsvm, DataType::Float32, 1, false)
        .unwrap_err();
    assert!(err.is_native());
}

#[test]
fn compiler_receives_params_json() {
    let _serial = serial();
    let Some([primary, _]) = stub_paths() else {
        return;
    };
    let stub = Stub::install(primary);

    let params = CompilerParams::new().quantize(true).parallel_comp(2);
    let compiler = Compiler::new(CompilerKind::AstNative, &params).unwrap();
    assert_eq!(stub.last_params(), r#"{"quantize":1,"parallel_comp":2}"#);
    assert_eq!(compiler.kind(), CompilerKind::AstNative);
    assert_eq!(compiler.params(), &params);

    let _failsafe = Compiler::new(CompilerKind::Failsafe, &CompilerParams::new()).unwrap();
    assert_eq!(stub.last_params(), "{}");
}

#[test]
fn annotation_feeds_compiler_params() {
    let _serial = serial();
    let Some([primary, _]) = stub_paths() else {
        return;
    };
    let stub = Stub::install(primary);
    let dir = tempdir().unwrap();
    let annotation = dir.path().join("annotation.json");

    let model = Model::load_xgboost_from_buffer(b"model").unwrap();
    let dmat = DMatrix::from_dense(&[0.0f32; 6], 3, 2, f32::NAN).unwrap();
    let annotator = Annotator::new(&model, &dmat, 2, false).unwrap();
    annotator.save(&annotation).unwrap();
    assert_eq!(std::fs::read_to_string(&annotation).unwrap(), "[[3]]\n");

    let params = CompilerParams::new().annotation_path(&annotation);
    let _compiler = Compiler::new(CompilerKind::AstNative, &params).unwrap();
    let sent: serde_json::Value = serde_json::from_str(&stub.last_params()).unwrap();
    assert_eq!(sent["annotate_in"], annotation.to_str().unwrap());
}

#[test]
fn export_builds_and_loads_generated_code() {
    let _serial = serial();
    let Some([primary, _]) = stub_paths() else {
        return;
    };
    let stub = Stub::install(primary);
    let dir = tempdir().unwrap();

    let model = Model::load_xgboost_from_buffer(b"model").unwrap();
    let compiler =
        Compiler::new(CompilerKind::AstNative, &CompilerParams::new().parallel_comp(2)).unwrap();
    let lib = compiler
        .export_shared_lib(&model, dir.path().join("out").join("stub_model"), &Toolchain::Gcc, &[])
        .unwrap();
    assert_eq!(
        lib,
        dir.path()
            .join("out")
            .join(format!("stub_model.{}", shared_lib_extension()))
    );
    assert!(lib.exists());
    assert_eq!(stub.calls("TreeliteCompilerGenerateCodeV2"), 1);

    let predictor = Predictor::load(&lib, 2).unwrap();
    assert_eq!(predictor.path(), lib.as_path());
    let info = predictor.info().unwrap();
    assert_eq!(info.num_feature, 2);
    assert_eq!(info.num_class, 1);
    assert_eq!(info.pred_transform, "identity");
    assert_eq!(info.global_bias, 0.5);
    assert_eq!(info.ratio_c, Some(1.0));
    assert_eq!(info.leaf_output_type, "float32");
}
