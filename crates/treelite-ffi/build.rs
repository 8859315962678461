//! Build script for treelite-ffi.
//!
//! Treelite is loaded at runtime, so nothing is linked here. This script:
//! 1. Records `TREELITE_HOME/lib` as a fallback search directory
//! 2. Warns when no build-time Treelite installation is visible

use std::path::Path;

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=TREELITE_HOME");

    let home = match std::env::var("TREELITE_HOME") {
        Ok(home) => home,
        Err(_) => {
            println!(
                "cargo:warning=TREELITE_HOME not set, libtreelite will be resolved at runtime only"
            );
            return;
        }
    };

    let lib_dir = Path::new(&home).join("lib");
    if !lib_dir.exists() {
        println!(
            "cargo:warning=TREELITE_HOME is set but {} does not exist",
            lib_dir.display()
        );
        return;
    }

    println!("cargo:rustc-env=TREELITE_BUILD_LIB_DIR={}", lib_dir.display());
}
