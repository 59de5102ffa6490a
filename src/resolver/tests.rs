use crate::ast::ImageRole;
use crate::parser::parse_program;

use super::*;

fn resolve_src(source: &str, declared: &[(&str, ImageRole)]) -> Result<ResolvedScript, CompileError> {
    let program = parse_program(source).expect("script should parse");
    let declared: Vec<(String, ImageRole)> = declared
        .iter()
        .map(|(n, r)| (n.to_string(), *r))
        .collect();
    resolve(program, &declared)
}

fn error_messages(err: CompileError) -> Vec<String> {
    err.problems()
        .iter()
        .filter(|p| p.is_error())
        .map(|p| p.message.clone())
        .collect()
}

#[test]
fn test_simple_script_resolves() {
    let resolved = resolve_src(
        "dest = src * 2;",
        &[("src", ImageRole::Source), ("dest", ImageRole::Dest)],
    )
    .unwrap();

    assert_eq!(resolved.source_names, vec!["src"]);
    assert_eq!(resolved.dest_names, vec!["dest"]);
    assert!(resolved.outside.is_none());
    assert!(resolved.warnings.is_empty());
}

#[test]
fn test_images_block_declares_roles() {
    let resolved = resolve_src(
        r#"
        images { src = read; dest = write; }
        dest = src + 1;
        "#,
        &[],
    )
    .unwrap();

    assert_eq!(resolved.source_names, vec!["src"]);
    assert_eq!(resolved.dest_names, vec!["dest"]);
}

#[test]
fn test_conflicting_roles_rejected() {
    let err = resolve_src(
        r#"
        images { img = read; }
        img = 1;
        "#,
        &[("img", ImageRole::Dest)],
    )
    .unwrap_err();

    assert!(error_messages(err)
        .iter()
        .any(|m| m.contains("conflicting roles")));
}

#[test]
fn test_invalid_caller_supplied_image_names_rejected() {
    let err = resolve_src(
        "dest = 1;",
        &[("2src", ImageRole::Source), ("bad name!", ImageRole::Dest)],
    )
    .unwrap_err();

    let messages = error_messages(err);
    assert!(messages
        .iter()
        .any(|m| m == "Invalid source image name: 2src"));
    assert!(messages
        .iter()
        .any(|m| m == "Invalid destination image name: bad name!"));
}

#[test]
fn test_script_without_images_rejected() {
    let err = resolve_src("v = 1;", &[]).unwrap_err();

    assert!(error_messages(err)
        .iter()
        .any(|m| m == "Script declares no source or destination images"));
}

#[test]
fn test_empty_images_block_rejected() {
    let err = resolve_src("images { } v = 1;", &[]).unwrap_err();

    assert!(error_messages(err)
        .iter()
        .any(|m| m == "Script declares no source or destination images"));
}

#[test]
fn test_write_to_source_rejected() {
    let err = resolve_src(
        "src = 1;",
        &[("src", ImageRole::Source), ("dest", ImageRole::Dest)],
    )
    .unwrap_err();

    assert!(error_messages(err)
        .iter()
        .any(|m| m == "Cannot write to source image 'src'"));
}

#[test]
fn test_read_from_dest_rejected() {
    let err = resolve_src(
        "dest = dest + 1;",
        &[("src", ImageRole::Source), ("dest", ImageRole::Dest)],
    )
    .unwrap_err();

    assert!(error_messages(err)
        .iter()
        .any(|m| m == "Cannot read from destination image 'dest'"));
}

#[test]
fn test_band_assign_requires_dest() {
    let err = resolve_src(
        "v[1] = 2; dest = 0;",
        &[("dest", ImageRole::Dest)],
    )
    .unwrap_err();

    assert!(error_messages(err)
        .iter()
        .any(|m| m.contains("Band index assignment")));
}

#[test]
fn test_unknown_image_in_bracket_read() {
    let err = resolve_src("dest = foo[1, 0];", &[("dest", ImageRole::Dest)]).unwrap_err();

    assert!(error_messages(err).iter().any(|m| m == "Unknown image: foo"));
}

#[test]
fn test_unknown_function() {
    let err = resolve_src("dest = frobnicate(1);", &[("dest", ImageRole::Dest)]).unwrap_err();

    assert!(error_messages(err)
        .iter()
        .any(|m| m == "Unknown function: frobnicate"));
}

#[test]
fn test_wrong_argument_count() {
    let err = resolve_src("dest = con(1, 2, 3, 4, 5);", &[("dest", ImageRole::Dest)]).unwrap_err();

    assert!(error_messages(err)
        .iter()
        .any(|m| m == "Wrong number of arguments to con: expected 1 to 4, got 5"));
}

#[test]
fn test_break_outside_loop() {
    let err = resolve_src("break; dest = 0;", &[("dest", ImageRole::Dest)]).unwrap_err();

    assert!(error_messages(err)
        .iter()
        .any(|m| m == "'break' outside of a loop"));
}

#[test]
fn test_break_inside_loop_is_fine() {
    resolve_src(
        r#"
        n = 0;
        while (n < 10) {
            n += 1;
            breakif(n == 5);
        }
        dest = n;
        "#,
        &[("dest", ImageRole::Dest)],
    )
    .unwrap();
}

#[test]
fn test_unknown_option() {
    let err = resolve_src(
        "options { turbo = 1; } dest = 0;",
        &[("dest", ImageRole::Dest)],
    )
    .unwrap_err();

    assert!(error_messages(err).iter().any(|m| m == "Unknown option: turbo"));
}

#[test]
fn test_outside_option_numeric() {
    let resolved = resolve_src(
        "options { outside = -1; } dest = 0;",
        &[("dest", ImageRole::Dest)],
    )
    .unwrap();

    assert_eq!(resolved.outside, Some(-1.0));
}

#[test]
fn test_outside_option_null() {
    let resolved = resolve_src(
        "options { outside = null; } dest = 0;",
        &[("dest", ImageRole::Dest)],
    )
    .unwrap();

    assert!(resolved.outside.map(f64::is_nan).unwrap_or(false));
}

#[test]
fn test_use_before_assign() {
    let err = resolve_src("dest = missing + 1;", &[("dest", ImageRole::Dest)]).unwrap_err();

    assert!(error_messages(err)
        .iter()
        .any(|m| m == "Variable 'missing' used before being assigned a value"));
}

#[test]
fn test_branch_assignment_defines_variable() {
    // Flat per-pixel scope: an assignment inside a branch still defines
    // the name for later statements.
    resolve_src(
        r#"
        if (src > 0) v = 1; else v = 2;
        dest = v;
        "#,
        &[("src", ImageRole::Source), ("dest", ImageRole::Dest)],
    )
    .unwrap();
}

#[test]
fn test_loop_binding_is_defined_in_body() {
    resolve_src(
        r#"
        total = 0;
        foreach (i in 1:4) total += i;
        dest = total;
        "#,
        &[("dest", ImageRole::Dest)],
    )
    .unwrap();
}

#[test]
fn test_unused_init_variable_warns() {
    let resolved = resolve_src(
        r#"
        init { stale = 7; }
        dest = 0;
        "#,
        &[("dest", ImageRole::Dest)],
    )
    .unwrap();

    assert_eq!(resolved.warnings.len(), 1);
    assert_eq!(
        resolved.warnings[0].message,
        "Variable 'stale' is declared in init but never used"
    );
}

#[test]
fn test_problem_display_format() {
    let err = resolve_src("dest = frobnicate(1);", &[("dest", ImageRole::Dest)]).unwrap_err();
    let problem = &err.problems()[0];
    let text = problem.to_string();

    assert!(text.starts_with("error at line 1, col "), "got: {}", text);
    assert!(text.ends_with("[known-functions]"), "got: {}", text);
}
