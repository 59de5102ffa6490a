//! Image reads, writes, bounds handling and scan mechanics

use std::sync::atomic::Ordering;
use std::sync::Arc;

use maplit::hashmap;

use crate::error::RuntimeError;
use crate::image::{shared_dest, shared_source, DestImage, GridImage};
use crate::runtime::{ProgressListener, Val};
use crate::script::Script;
use crate::transform::{Bounds, CoordinateTransform};

use super::helpers::*;

/* ===================== Basic Reads and Writes ===================== */

#[test]
fn test_copy_source_to_dest() {
    let data = vec![1.0, 2.0, 3.0, 4.0];
    let out = run_with_input("dest = src;", 2, 2, data.clone());
    assert_samples(&out, &data);
}

#[test]
fn test_pixelwise_expression() {
    let out = run_with_input("dest = src * 2 + 1;", 2, 2, vec![1.0, 2.0, 3.0, 4.0]);
    assert_samples(&out, &[3.0, 5.0, 7.0, 9.0]);
}

#[test]
fn test_band_read() {
    let compiled = compile_sd("dest = src[1];");
    let mut rt = compiled.direct_runtime();

    let mut img = GridImage::filled(2, 1, 2, 0.0);
    img.set_sample(0, 0, 1, 5.0);
    img.set_sample(1, 0, 1, 6.0);
    rt.set_source_image("src", shared_source(img)).unwrap();

    let dest = shared_dest(GridImage::filled(2, 1, 1, f64::NAN));
    rt.set_destination_image("dest", Arc::clone(&dest)).unwrap();
    rt.evaluate_all(None).unwrap();

    assert_samples(&dest_band(&dest, 0), &[5.0, 6.0]);
}

#[test]
fn test_invalid_band_is_an_error() {
    let compiled = compile_sd("dest = src[3];");
    let mut rt = compiled.direct_runtime();
    rt.set_source_image("src", shared_source(GridImage::filled(1, 1, 1, 0.0)))
        .unwrap();
    rt.set_destination_image("dest", shared_dest(GridImage::filled(1, 1, 1, 0.0)))
        .unwrap();

    let err = rt.evaluate_all(None).unwrap_err();
    assert!(matches!(err, RuntimeError::InvalidBand { .. }));
}

#[test]
fn test_multi_band_destination_write() {
    let compiled = compile_d("dest[0] = 1; dest[1] = 2;");
    let mut rt = compiled.direct_runtime();
    let dest = shared_dest(GridImage::filled(2, 1, 2, f64::NAN));
    rt.set_destination_image("dest", Arc::clone(&dest)).unwrap();
    rt.evaluate_all(None).unwrap();

    assert_samples(&dest_band(&dest, 0), &[1.0, 1.0]);
    assert_samples(&dest_band(&dest, 1), &[2.0, 2.0]);
}

/* ===================== Neighborhood Reads ===================== */

#[test]
fn test_relative_pixel_read() {
    // Shift the grid one pixel left: each output takes its right neighbor.
    let compiled = Script::new("options { outside = 0; } dest = src[1, 0];")
        .source("src")
        .dest("dest")
        .compile()
        .unwrap();
    let mut rt = compiled.direct_runtime();
    rt.set_source_image(
        "src",
        shared_source(GridImage::from_data(3, 1, vec![1.0, 2.0, 3.0])),
    )
    .unwrap();
    let dest = shared_dest(GridImage::filled(3, 1, 1, f64::NAN));
    rt.set_destination_image("dest", Arc::clone(&dest)).unwrap();
    rt.evaluate_all(None).unwrap();

    assert_samples(&dest_band(&dest, 0), &[2.0, 3.0, 0.0]);
}

#[test]
fn test_absolute_pixel_read() {
    let out = run_with_input("dest = src[$0, $0];", 2, 2, vec![9.0, 1.0, 2.0, 3.0]);
    assert_samples(&out, &[9.0, 9.0, 9.0, 9.0]);
}

#[test]
fn test_band_and_pixel_read_combined() {
    let compiled = Script::new("options { outside = -1; } dest = src[1][0, -1];")
        .source("src")
        .dest("dest")
        .compile()
        .unwrap();
    let mut rt = compiled.direct_runtime();

    let mut img = GridImage::filled(1, 2, 2, 0.0);
    img.set_sample(0, 0, 1, 7.0);
    img.set_sample(0, 1, 1, 8.0);
    rt.set_source_image("src", shared_source(img)).unwrap();

    let dest = shared_dest(GridImage::filled(1, 2, 1, f64::NAN));
    rt.set_destination_image("dest", Arc::clone(&dest)).unwrap();
    rt.evaluate_all(None).unwrap();

    // Row 0 looks above the image and takes the outside value.
    assert_samples(&dest_band(&dest, 0), &[-1.0, 7.0]);
}

#[test]
fn test_out_of_bounds_without_outside_option_fails() {
    let compiled = compile_sd("dest = src[1, 0];");
    let mut rt = compiled.direct_runtime();
    rt.set_source_image("src", shared_source(GridImage::filled(2, 1, 1, 0.0)))
        .unwrap();
    rt.set_destination_image("dest", shared_dest(GridImage::filled(2, 1, 1, 0.0)))
        .unwrap();

    let err = rt.evaluate_all(None).unwrap_err();
    assert!(matches!(err, RuntimeError::OutOfBounds { .. }));
}

#[test]
fn test_band_count() {
    let compiled = compile_sd("dest = src->bands;");
    let mut rt = compiled.direct_runtime();
    rt.set_source_image("src", shared_source(GridImage::filled(1, 1, 3, 0.0)))
        .unwrap();
    let dest = shared_dest(GridImage::filled(1, 1, 1, f64::NAN));
    rt.set_destination_image("dest", Arc::clone(&dest)).unwrap();
    rt.evaluate_all(None).unwrap();

    assert_samples(&dest_band(&dest, 0), &[3.0]);
}

#[test]
fn test_band_count_drives_multi_band_copy() {
    let compiled = compile_sd("foreach (b in 0:(src->bands - 1)) dest[b] = src[b];");
    let mut rt = compiled.direct_runtime();

    let mut img = GridImage::filled(2, 1, 2, 0.0);
    img.set_sample(0, 0, 0, 1.0);
    img.set_sample(1, 0, 0, 2.0);
    img.set_sample(0, 0, 1, 3.0);
    img.set_sample(1, 0, 1, 4.0);
    rt.set_source_image("src", shared_source(img)).unwrap();

    let dest = shared_dest(GridImage::filled(2, 1, 2, f64::NAN));
    rt.set_destination_image("dest", Arc::clone(&dest)).unwrap();
    rt.evaluate_all(None).unwrap();

    assert_samples(&dest_band(&dest, 0), &[1.0, 2.0]);
    assert_samples(&dest_band(&dest, 1), &[3.0, 4.0]);
}

/* ===================== World and Transforms ===================== */

#[test]
fn test_world_coordinates_reach_the_script() {
    let compiled = compile_d("dest = x() + y();");
    let mut rt = compiled.direct_runtime();
    rt.set_world_by_num_pixels(Bounds::new(100.0, 200.0, 20.0, 20.0), 2, 2)
        .unwrap();
    let dest = shared_dest(GridImage::filled(2, 2, 1, f64::NAN));
    rt.set_destination_image("dest", Arc::clone(&dest)).unwrap();
    rt.evaluate_all(None).unwrap();

    // xres = yres = 10, world origin (100, 200)
    assert_samples(&dest_band(&dest, 0), &[300.0, 310.0, 310.0, 320.0]);
}

#[test]
fn test_source_transform_scales_reads() {
    // World spans 20 units over a 2-pixel source: each source pixel
    // covers 10 world units.
    let compiled = Script::new("options { outside = -1; } dest = src;")
        .source("src")
        .dest("dest")
        .compile()
        .unwrap();
    let mut rt = compiled.direct_runtime();
    rt.set_world_by_num_pixels(Bounds::new(0.0, 0.0, 20.0, 10.0), 4, 1)
        .unwrap();
    let transform = CoordinateTransform::world_to_image(
        Bounds::new(0.0, 0.0, 20.0, 10.0),
        Bounds::new(0.0, 0.0, 2.0, 1.0),
        false,
        false,
    )
    .unwrap();
    rt.set_source_image_with_transform(
        "src",
        shared_source(GridImage::from_data(2, 1, vec![5.0, 9.0])),
        transform,
    )
    .unwrap();
    let dest = shared_dest(GridImage::filled(4, 1, 1, f64::NAN));
    rt.set_destination_image("dest", Arc::clone(&dest)).unwrap();
    rt.evaluate_all(None).unwrap();

    // World x 0, 5, 10, 15 -> source pixels 0, 1, 1, 2; pixel 2 is
    // outside and takes the fallback.
    assert_samples(&dest_band(&dest, 0), &[5.0, 9.0, 9.0, -1.0]);
}

#[test]
fn test_default_transform_requires_world() {
    let compiled = compile_d("dest = 0;");
    let mut rt = compiled.direct_runtime();
    let err = rt
        .set_default_transform(CoordinateTransform::identity())
        .unwrap_err();
    assert_eq!(err, RuntimeError::WorldNotSet);
}

#[test]
fn test_invalid_world_rejected() {
    let compiled = compile_d("dest = 0;");
    let mut rt = compiled.direct_runtime();
    let err = rt
        .set_world_by_resolution(Bounds::new(0.0, 0.0, -5.0, 10.0), 1.0, 1.0)
        .unwrap_err();
    assert_eq!(err, RuntimeError::InvalidWorldBounds);
}

/* ===================== Binding Checks ===================== */

#[test]
fn test_unbound_source_fails() {
    let compiled = compile_sd("dest = src;");
    let mut rt = compiled.direct_runtime();
    rt.set_destination_image("dest", shared_dest(GridImage::filled(1, 1, 1, 0.0)))
        .unwrap();
    let err = rt.evaluate_all(None).unwrap_err();
    assert_eq!(err, RuntimeError::ImageNotBound("src".to_string()));
}

#[test]
fn test_unknown_binding_name_rejected() {
    let compiled = compile_d("dest = 0;");
    let mut rt = compiled.direct_runtime();
    let err = rt
        .set_destination_image("other", shared_dest(GridImage::filled(1, 1, 1, 0.0)))
        .unwrap_err();
    assert!(matches!(err, RuntimeError::BadArgument(_)));
}

#[test]
fn test_mismatched_destinations_fail() {
    let compiled = Script::new("a = 1; d1 = a; d2 = a;")
        .dest("d1")
        .dest("d2")
        .compile()
        .unwrap();
    let mut rt = compiled.direct_runtime();
    rt.set_destination_image("d1", shared_dest(GridImage::filled(2, 2, 1, 0.0)))
        .unwrap();
    rt.set_destination_image("d2", shared_dest(GridImage::filled(3, 2, 1, 0.0)))
        .unwrap();
    let err = rt.evaluate_all(None).unwrap_err();
    assert_eq!(err, RuntimeError::DestinationBoundsMismatch);
}

#[test]
fn test_multiple_destinations() {
    let compiled = Script::new("s = x() + y(); d1 = s; d2 = s * 10;")
        .dest("d1")
        .dest("d2")
        .compile()
        .unwrap();
    let mut rt = compiled.direct_runtime();
    let d1 = shared_dest(GridImage::filled(2, 1, 1, f64::NAN));
    let d2 = shared_dest(GridImage::filled(2, 1, 1, f64::NAN));
    rt.set_destination_image("d1", Arc::clone(&d1)).unwrap();
    rt.set_destination_image("d2", Arc::clone(&d2)).unwrap();
    rt.evaluate_all(None).unwrap();

    assert_samples(&dest_band(&d1, 0), &[0.0, 1.0]);
    assert_samples(&dest_band(&d2, 0), &[0.0, 10.0]);
}

/* ===================== Image-scope Variables ===================== */

#[test]
fn test_init_variables_persist_across_pixels() {
    let compiled = compile_d("init { n = 0; } n += 1; dest = n;");
    let mut rt = compiled.direct_runtime();
    let dest = shared_dest(GridImage::filled(2, 2, 1, f64::NAN));
    rt.set_destination_image("dest", Arc::clone(&dest)).unwrap();
    rt.evaluate_all(None).unwrap();

    assert_samples(&dest_band(&dest, 0), &[1.0, 2.0, 3.0, 4.0]);
    assert_eq!(rt.get_var("n"), Some(&Val::Num(4.0)));
}

#[test]
fn test_scan_result_snapshot() {
    let compiled = compile_d("init { total = 0; } total += 2; dest = 0;");
    let mut rt = compiled.direct_runtime();
    let dest = shared_dest(GridImage::filled(2, 1, 1, f64::NAN));
    rt.set_destination_image("dest", Arc::clone(&dest)).unwrap();
    rt.evaluate_all(None).unwrap();

    let result = rt.scan_result();
    assert_eq!(
        result.vars,
        hashmap! { "total".to_string() => Val::Num(4.0) }
    );
    assert_eq!(result.destinations.len(), 1);
    assert_eq!(result.destinations[0].0, "dest");
}

/* ===================== Cancellation and Progress ===================== */

#[test]
fn test_cancel_token_aborts_scan() {
    let compiled = compile_d("dest = 0;");
    let mut rt = compiled.direct_runtime();
    rt.set_destination_image("dest", shared_dest(GridImage::filled(4, 4, 1, 0.0)))
        .unwrap();
    rt.cancel_token().store(true, Ordering::Relaxed);

    let err = rt.evaluate_all(None).unwrap_err();
    assert_eq!(err, RuntimeError::Cancelled);
}

#[test]
fn test_cancelled_runtime_can_rerun() {
    let compiled = compile_d("dest = 1;");
    let mut rt = compiled.direct_runtime();
    let dest = shared_dest(GridImage::filled(2, 2, 1, f64::NAN));
    rt.set_destination_image("dest", Arc::clone(&dest)).unwrap();

    rt.cancel_token().store(true, Ordering::Relaxed);
    assert_eq!(rt.evaluate_all(None).unwrap_err(), RuntimeError::Cancelled);

    // The abort consumed the request; a fresh scan runs to completion.
    rt.evaluate_all(None).unwrap();
    assert_samples(&dest_band(&dest, 0), &[1.0, 1.0, 1.0, 1.0]);
}

struct Recorder {
    updates: Vec<(u64, u64)>,
}

impl ProgressListener for Recorder {
    fn update(&mut self, done_pixels: u64, total_pixels: u64) {
        self.updates.push((done_pixels, total_pixels));
    }
}

#[test]
fn test_progress_reported_per_row() {
    let compiled = compile_d("dest = 0;");
    let mut rt = compiled.direct_runtime();
    rt.set_destination_image("dest", shared_dest(GridImage::filled(3, 2, 1, 0.0)))
        .unwrap();

    let mut recorder = Recorder { updates: vec![] };
    rt.evaluate_all(Some(&mut recorder)).unwrap();

    assert_eq!(recorder.updates, vec![(3, 6), (6, 6)]);
}
