//! Compile an XGBoost model and score a CSV of features with it.
//!
//! Profiles branches on the input, compiles with the annotation, exports a
//! shared library and prints one prediction per row.
//!
//! Run with:
//! ```bash
//! cargo run -p treelite --example end_to_end -- testdata/xgboost.model testdata/feature.csv
//! ```

use anyhow::Context;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing_subscriber::EnvFilter;
use treelite::prelude::*;

fn load_features(path: &Path) -> anyhow::Result<(Vec<f32>, usize, usize)> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    let mut data = Vec::new();
    let mut num_row = 0;
    let mut num_col = None;
    for (lineno, line) in contents.lines().enumerate().filter(|(_, l)| !l.trim().is_empty()) {
        let row = line
            .split(',')
            .map(|v| v.trim().parse::<f32>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .with_context(|| format!("line {}: invalid number", lineno + 1))?;
        match num_col {
            None => num_col = Some(row.len()),
            Some(n) if n != row.len() => {
                anyhow::bail!("line {}: expected {} values, found {}", lineno + 1, n, row.len())
            }
            Some(_) => {}
        }
        data.extend(row);
        num_row += 1;
    }

    Ok((data, num_row, num_col.unwrap_or(0)))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let model_path = PathBuf::from(
        args.get(1)
            .map(String::as_str)
            .unwrap_or("testdata/xgboost.model"),
    );
    let feature_path = PathBuf::from(
        args.get(2)
            .map(String::as_str)
            .unwrap_or("testdata/feature.csv"),
    );
    let out_dir = tempfile::tempdir()?;

    println!("Treelite End-to-End Example");
    println!("===========================\n");

    let (data, num_row, num_col) = load_features(&feature_path)?;
    println!("Features: {} rows x {} columns", num_row, num_col);
    let dmat = DMatrix::from_dense(&data, num_row, num_col, f32::NAN)?;

    let model = Model::load_xgboost(&model_path)?;
    println!(
        "Model: {} trees, {} features, {} classes",
        model.num_tree()?,
        model.num_feature()?,
        model.num_class()?
    );

    let nthread = default_thread_count();
    let annotation = out_dir.path().join("annotation.json");
    let annotator = Annotator::new(&model, &dmat, nthread, false)?;
    annotator.save(&annotation)?;
    annotator.close()?;

    let params = CompilerParams::new()
        .annotation_path(&annotation)
        .quantize(true)
        .parallel_comp(nthread);
    let compiler = Compiler::new(CompilerKind::AstNative, &params)?;

    let start = Instant::now();
    let lib = compiler.export_shared_lib(
        &model,
        out_dir.path().join("compiled_model"),
        &Toolchain::Gcc,
        &[],
    )?;
    println!("Compiled {} in {:.2?}", lib.display(), start.elapsed());

    let predictor = Predictor::load(&lib, nthread)?;
    println!("Predictor: {}", serde_json::to_string(&predictor.info()?)?);

    let start = Instant::now();
    let scores = predictor.predict_batch(&dmat, false, false)?;
    println!("Predicted {} rows in {:.2?}\n", scores.num_row(), start.elapsed());

    for row in 0..scores.num_row().min(10) {
        let values: Vec<f64> = (0..scores.num_output())
            .filter_map(|col| scores.value(row, col))
            .collect();
        println!("  row {:>3}: {:?}", row, values);
    }

    predictor.close()?;
    compiler.close()?;
    model.close()?;
    dmat.close()?;
    Ok(())
}
