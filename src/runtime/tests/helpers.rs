//! Shared helpers for runtime tests

use std::sync::Arc;

use crate::image::{shared_dest, shared_source, GridImage, SharedDestImage};
use crate::runtime::lock_image;
use crate::script::{CompiledScript, Script};

/// Compile a script with one source ("src") and one destination ("dest")
pub fn compile_sd(source: &str) -> CompiledScript {
    Script::new(source)
        .source("src")
        .dest("dest")
        .compile()
        .expect("script should compile")
}

/// Compile a script with a single destination ("dest") and no sources
pub fn compile_d(source: &str) -> CompiledScript {
    Script::new(source)
        .dest("dest")
        .compile()
        .expect("script should compile")
}

/// Run a source+dest script over row-major input data, returning band 0
/// of the destination
pub fn run_with_input(source_text: &str, width: usize, height: usize, data: Vec<f64>) -> Vec<f64> {
    let compiled = compile_sd(source_text);
    let mut rt = compiled.direct_runtime();
    rt.set_source_image("src", shared_source(GridImage::from_data(width, height, data)))
        .expect("bind source");
    let dest = shared_dest(GridImage::filled(width, height, 1, f64::NAN));
    rt.set_destination_image("dest", Arc::clone(&dest))
        .expect("bind dest");
    rt.evaluate_all(None).expect("scan should succeed");
    dest_band(&dest, 0)
}

/// Run a generator script (no sources) over a blank destination
pub fn run_generator(source_text: &str, width: usize, height: usize) -> Vec<f64> {
    let compiled = compile_d(source_text);
    let mut rt = compiled.direct_runtime();
    let dest = shared_dest(GridImage::filled(width, height, 1, f64::NAN));
    rt.set_destination_image("dest", Arc::clone(&dest))
        .expect("bind dest");
    rt.evaluate_all(None).expect("scan should succeed");
    dest_band(&dest, 0)
}

/// Evaluate a generator script on a 1x1 grid and return the single value
pub fn eval_one(expr_script: &str) -> f64 {
    run_generator(expr_script, 1, 1)[0]
}

/// Read one band of a shared destination raster, row-major
pub fn dest_band(image: &SharedDestImage, band: usize) -> Vec<f64> {
    let image = lock_image(&**image);
    let mut out = Vec::with_capacity(image.width() * image.height());
    for row in 0..image.height() as i64 {
        for col in 0..image.width() as i64 {
            out.push(image.get_sample(image.min_x() + col, image.min_y() + row, band));
        }
    }
    out
}

/// Element-wise comparison treating NaN as equal to NaN
pub fn assert_samples(actual: &[f64], expected: &[f64]) {
    assert_eq!(actual.len(), expected.len(), "length mismatch");
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        let same = (a.is_nan() && e.is_nan()) || (a - e).abs() < 1e-9;
        assert!(same, "sample {} differs: got {}, expected {}", i, a, e);
    }
}
