//! Expression evaluation and NoData semantics

use super::helpers::*;

/* ===================== Arithmetic ===================== */

#[test]
fn test_arithmetic_precedence() {
    assert_eq!(eval_one("dest = 1 + 2 * 3;"), 7.0);
    assert_eq!(eval_one("dest = (1 + 2) * 3;"), 9.0);
    assert_eq!(eval_one("dest = 10 % 3;"), 1.0);
    assert_eq!(eval_one("dest = 2 ^ 3 ^ 2;"), 512.0);
    assert_eq!(eval_one("dest = -2 ^ 2;"), 4.0);
}

#[test]
fn test_division_follows_ieee() {
    assert!(eval_one("dest = 1 / 0;").is_infinite());
    assert!(eval_one("dest = 0 / 0;").is_nan());
}

#[test]
fn test_nan_propagates_through_arithmetic() {
    assert!(eval_one("dest = null + 1;").is_nan());
    assert!(eval_one("dest = null * 0;").is_nan());
    assert!(eval_one("dest = -null;").is_nan());
}

/* ===================== Comparisons and Logic ===================== */

#[test]
fn test_comparisons_yield_one_or_zero() {
    assert_eq!(eval_one("dest = 3 > 2;"), 1.0);
    assert_eq!(eval_one("dest = 3 < 2;"), 0.0);
    assert_eq!(eval_one("dest = 2 <= 2;"), 1.0);
    assert_eq!(eval_one("dest = 2 != 2;"), 0.0);
    assert_eq!(eval_one("dest = 2 == 2;"), 1.0);
}

#[test]
fn test_comparisons_propagate_nan() {
    assert!(eval_one("dest = null == null;").is_nan());
    assert!(eval_one("dest = null != 1;").is_nan());
    assert!(eval_one("dest = null < 1;").is_nan());
}

#[test]
fn test_logical_operators() {
    assert_eq!(eval_one("dest = 1 && 2;"), 1.0);
    assert_eq!(eval_one("dest = 1 && 0;"), 0.0);
    assert_eq!(eval_one("dest = 0 || 3;"), 1.0);
    assert_eq!(eval_one("dest = 0 || 0;"), 0.0);
    assert_eq!(eval_one("dest = !0;"), 1.0);
    assert_eq!(eval_one("dest = !7;"), 0.0);
}

#[test]
fn test_logic_propagates_nan_without_short_circuit() {
    // NoData wins even where boolean short-circuit would have decided.
    assert!(eval_one("dest = 0 && null;").is_nan());
    assert!(eval_one("dest = 1 || null;").is_nan());
    assert!(eval_one("dest = !null;").is_nan());
}

/* ===================== Conditions and Variables ===================== */

#[test]
fn test_if_else() {
    assert_eq!(eval_one("v = 5; if (v > 3) dest = 1; else dest = 2;"), 1.0);
    assert_eq!(eval_one("v = 1; if (v > 3) dest = 1; else dest = 2;"), 2.0);
}

#[test]
fn test_nan_condition_is_false() {
    assert_eq!(eval_one("if (null) dest = 1; else dest = 2;"), 2.0);
}

#[test]
fn test_compound_assignment() {
    assert_eq!(eval_one("v = 10; v += 5; dest = v;"), 15.0);
    assert_eq!(eval_one("v = 10; v -= 4; dest = v;"), 6.0);
    assert_eq!(eval_one("v = 10; v *= 2; dest = v;"), 20.0);
    assert_eq!(eval_one("v = 10; v /= 4; dest = v;"), 2.5);
}

/* ===================== con() ===================== */

#[test]
fn test_con_one_arg() {
    assert_eq!(eval_one("dest = con(5);"), 1.0);
    assert_eq!(eval_one("dest = con(0);"), 0.0);
    assert_eq!(eval_one("dest = con(-5);"), 0.0);
}

#[test]
fn test_con_two_args() {
    assert_eq!(eval_one("dest = con(1, 42);"), 42.0);
    assert_eq!(eval_one("dest = con(0, 42);"), 0.0);
    assert_eq!(eval_one("dest = con(-1, 42);"), 0.0);
}

#[test]
fn test_con_three_args() {
    assert_eq!(eval_one("dest = con(1, 7, 9);"), 7.0);
    assert_eq!(eval_one("dest = con(0, 7, 9);"), 9.0);
    assert_eq!(eval_one("dest = con(-1, 7, 9);"), 9.0);
}

#[test]
fn test_con_four_args_signum_branches() {
    assert_eq!(eval_one("dest = con(3, 10, 20, 30);"), 10.0);
    assert_eq!(eval_one("dest = con(0, 10, 20, 30);"), 20.0);
    assert_eq!(eval_one("dest = con(-1, 10, 20, 30);"), 30.0);
}

#[test]
fn test_con_nan_condition_yields_nan() {
    assert!(eval_one("dest = con(null, 10, 20);").is_nan());
    assert!(eval_one("dest = con(null);").is_nan());
}

/* ===================== Built-in Functions ===================== */

#[test]
fn test_scalar_math_functions() {
    assert_eq!(eval_one("dest = abs(-3);"), 3.0);
    assert_eq!(eval_one("dest = sqrt(16);"), 4.0);
    assert_eq!(eval_one("dest = floor(2.7);"), 2.0);
    assert_eq!(eval_one("dest = ceil(2.1);"), 3.0);
    assert_eq!(eval_one("dest = round(2.5);"), 3.0);
    assert!((eval_one("dest = exp(1);") - std::f64::consts::E).abs() < 1e-12);
}

#[test]
fn test_log_natural_and_with_base() {
    assert!((eval_one("dest = log(M_E);") - 1.0).abs() < 1e-12);
    assert!((eval_one("dest = log(8, 2);") - 3.0).abs() < 1e-12);
}

#[test]
fn test_trig_and_angle_conversion() {
    assert!((eval_one("dest = sin(0);")).abs() < 1e-12);
    assert!((eval_one("dest = cos(0);") - 1.0).abs() < 1e-12);
    assert!((eval_one("dest = degToRad(180);") - std::f64::consts::PI).abs() < 1e-12);
    assert!((eval_one("dest = radToDeg(M_PI);") - 180.0).abs() < 1e-9);
}

#[test]
fn test_nodata_tests() {
    assert_eq!(eval_one("dest = isnull(null);"), 1.0);
    assert_eq!(eval_one("dest = isnull(0);"), 0.0);
    assert_eq!(eval_one("dest = isnan(NaN);"), 1.0);
    assert_eq!(eval_one("dest = isinf(1 / 0);"), 1.0);
    assert_eq!(eval_one("dest = isinf(1);"), 0.0);
}

#[test]
fn test_min_max_scalars() {
    assert_eq!(eval_one("dest = min(3, 7);"), 3.0);
    assert_eq!(eval_one("dest = max(3, 7);"), 7.0);
    assert!(eval_one("dest = min(null, 7);").is_nan());
}

#[test]
fn test_rand_stays_in_range() {
    for _ in 0..20 {
        let v = eval_one("dest = rand(10);");
        assert!((0.0..10.0).contains(&v), "rand out of range: {}", v);
        let i = eval_one("dest = randInt(5);");
        assert!((0.0..5.0).contains(&i) && i.fract() == 0.0, "randInt: {}", i);
    }
    assert!(eval_one("dest = rand(null);").is_nan());
}

/* ===================== Lists ===================== */

#[test]
fn test_list_reductions() {
    assert_eq!(eval_one("vals = [1, 2, 3, 4]; dest = sum(vals);"), 10.0);
    assert_eq!(eval_one("vals = [1, 2, 3, 4]; dest = mean(vals);"), 2.5);
    assert_eq!(eval_one("vals = [5, 1, 9]; dest = min(vals);"), 1.0);
    assert_eq!(eval_one("vals = [5, 1, 9]; dest = max(vals);"), 9.0);
}

#[test]
fn test_empty_list_reductions() {
    assert_eq!(eval_one("vals = []; dest = sum(vals);"), 0.0);
    assert!(eval_one("vals = []; dest = mean(vals);").is_nan());
    assert!(eval_one("vals = []; dest = min(vals);").is_nan());
}

#[test]
fn test_list_append() {
    assert_eq!(eval_one("vals = [1]; vals << 2; vals << 3; dest = sum(vals);"), 6.0);
}

#[test]
fn test_concat() {
    assert_eq!(
        eval_one("a = [1, 2]; b = [3]; dest = sum(concat(a, b));"),
        6.0
    );
    assert_eq!(eval_one("a = [1, 2]; dest = sum(concat(a, 10));"), 13.0);
}

#[test]
fn test_foreach_over_list() {
    assert_eq!(
        eval_one("total = 0; foreach (w in [1, 2, 4]) total += w; dest = total;"),
        7.0
    );
}

#[test]
fn test_list_in_arithmetic_is_an_error() {
    let compiled = compile_d("vals = [1, 2]; dest = vals + 1;");
    let mut rt = compiled.direct_runtime();
    let dest = crate::image::shared_dest(crate::image::GridImage::filled(1, 1, 1, 0.0));
    rt.set_destination_image("dest", dest).unwrap();
    let err = rt.evaluate_all(None).unwrap_err();
    assert!(matches!(err, crate::error::RuntimeError::ListNotAllowed(_)));
}

/* ===================== Position Functions ===================== */

#[test]
fn test_x_and_y_follow_the_scan() {
    let xs = run_generator("dest = x();", 3, 2);
    assert_samples(&xs, &[0.0, 1.0, 2.0, 0.0, 1.0, 2.0]);
    let ys = run_generator("dest = y();", 3, 2);
    assert_samples(&ys, &[0.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
}

#[test]
fn test_width_and_height() {
    let out = run_generator("dest = width() * 100 + height();", 4, 3);
    assert!(out.iter().all(|&v| v == 403.0));
}
