//! Semantic lowering tests

use glint::hir::{Module, Stmt, ValueKind};
use glint::resolve::BuiltinCatalog;
use glint::{
    lexer, lower, parser, pp, CompileOptions, DiagnosticLog, ShaderStage, TypeInterner,
};

/// Run the front half of the pipeline (no optimization) so the freshly
/// lowered IR can be inspected.
fn lower_src(
    src: &str,
    stage: ShaderStage,
    version: u16,
) -> (Option<Module>, DiagnosticLog, TypeInterner) {
    let options = CompileOptions {
        version,
        ..CompileOptions::default()
    };
    let types = TypeInterner::new();
    let mut log = DiagnosticLog::new();
    let expanded = pp::preprocess(src, &options, &mut log);
    let tokens = lexer::lex(&expanded.text, expanded.version, expanded.profile, &mut log);
    let unit = parser::parse(&tokens, &mut log);
    if log.has_errors() {
        return (None, log, types);
    }
    let catalog =
        BuiltinCatalog::default_catalog(expanded.version, stage, &options.limits, &types);
    let module = lower::lower(&unit, stage, expanded.version, &types, &catalog, &mut log);
    (Some(module), log, types)
}

fn lower_ok(src: &str, stage: ShaderStage) -> (Module, TypeInterner) {
    let (module, log, types) = lower_src(src, stage, 130);
    assert!(!log.has_errors(), "unexpected errors: {:?}", log.entries());
    (module.expect("module"), types)
}

fn lower_fail(src: &str, stage: ShaderStage) -> DiagnosticLog {
    let (_, log, _) = lower_src(src, stage, 130);
    assert!(log.has_errors(), "expected errors for {src:?}");
    log
}

#[test]
fn test_undeclared_identifier_single_entry() {
    let log = lower_fail("void main() { float x = foo; }", ShaderStage::Vertex);
    assert_eq!(log.error_count(), 1);
    assert!(log.entries()[0].message.contains("foo"));
    assert!(log.entries()[0].message.contains("undeclared"));
}

#[test]
fn test_shadowing_resolves_innermost_then_outer() {
    // The inner `x` is a float, so `x + 0.5` checks; after the block the
    // outer int `x` is visible again, so `x + 1` checks.
    lower_ok(
        "void main() {\n\
           int x = 1;\n\
           {\n\
             float x = 2.0;\n\
             float y = x + 0.5;\n\
           }\n\
           int z = x + 1;\n\
         }",
        ShaderStage::Vertex,
    );
}

#[test]
fn test_same_scope_redeclaration_rejected() {
    let log = lower_fail(
        "void main() { float a = 1.0; float a = 2.0; }",
        ShaderStage::Vertex,
    );
    assert!(log
        .entries()
        .iter()
        .any(|d| d.message.contains("redeclaration")));
}

#[test]
fn test_sibling_functions_lower_after_error() {
    // Both functions are broken; both must be reported in one invocation.
    let log = lower_fail(
        "void a() { float x = missing1; }\nvoid b() { float y = missing2; }",
        ShaderStage::Vertex,
    );
    assert_eq!(log.error_count(), 2);
    assert!(log.entries().iter().any(|d| d.message.contains("missing1")));
    assert!(log.entries().iter().any(|d| d.message.contains("missing2")));
}

#[test]
fn test_implicit_int_to_float_inserts_convert() {
    let (module, _) = lower_ok("void main() { float x = 1; float y = x; }", ShaderStage::Vertex);
    let main = module.find_function("main").unwrap();
    let has_convert = main
        .values
        .iter()
        .any(|(_, v)| matches!(v.kind, ValueKind::Convert(_)));
    assert!(has_convert, "expected an explicit conversion instruction");
}

#[test]
fn test_float_to_int_is_not_implicit() {
    let log = lower_fail("void main() { int x = 1.5; }", ShaderStage::Vertex);
    assert!(log.entries().iter().any(|d| d.message.contains("mismatch")));
}

#[test]
fn test_constructor_allows_explicit_narrowing() {
    lower_ok("void main() { int x = int(1.5); }", ShaderStage::Vertex);
}

#[test]
fn test_invalid_array_size() {
    let log = lower_fail("uniform vec4 a[0];", ShaderStage::Vertex);
    assert!(log.entries().iter().any(|d| d.message.contains("array")));
}

#[test]
fn test_array_size_from_const_expression() {
    let (module, types) = lower_ok(
        "const int N = 4;\nuniform vec4 lights[N * 2];",
        ShaderStage::Vertex,
    );
    let decl = module
        .decls
        .iter()
        .map(|(_, d)| d)
        .find(|d| d.name == "lights")
        .unwrap();
    assert_eq!(types.format(decl.ty), "vec4[8]");
}

#[test]
fn test_overload_exact_match_preferred() {
    lower_ok(
        "float pick(float x) { return x; }\n\
         float pick(int x) { return 0.0; }\n\
         void main() { float a = pick(1); float b = pick(1.0); }",
        ShaderStage::Vertex,
    );
}

#[test]
fn test_overload_unique_implicit_match() {
    // No exact match for int, but float is the only applicable candidate.
    lower_ok(
        "float pick(float x) { return x; }\n\
         void main() { float a = pick(1); }",
        ShaderStage::Vertex,
    );
}

#[test]
fn test_overload_ambiguous_rejected() {
    let log = lower_fail(
        "float pick(float x) { return x; }\n\
         float pick(uint x) { return 0.0; }\n\
         void main() { float a = pick(1); }",
        ShaderStage::Vertex,
    );
    assert!(log.entries().iter().any(|d| d.message.contains("ambiguous")));
}

#[test]
fn test_no_matching_overload() {
    let log = lower_fail(
        "void main() { float x = dot(1.0, true); }",
        ShaderStage::Vertex,
    );
    assert!(log
        .entries()
        .iter()
        .any(|d| d.message.contains("no matching overload")));
}

#[test]
fn test_builtins_referenced_reported() {
    let (module, _) = lower_ok(
        "uniform sampler2D tex;\n\
         varying vec2 uv;\n\
         void main() { gl_FragColor = texture2D(tex, uv) * sin(1.0); }",
        ShaderStage::Fragment,
    );
    assert!(module.builtins_referenced.iter().any(|b| b == "texture2D"));
    assert!(module.builtins_referenced.iter().any(|b| b == "sin"));
}

#[test]
fn test_out_parameter_call() {
    let (module, _) = lower_ok(
        "void unpack(in float v, out float a, out float b) { a = v; b = v * 2.0; }\n\
         void main() {\n\
           float lo; float hi;\n\
           unpack(0.5, lo, hi);\n\
           gl_FragColor = vec4(lo, hi, 0.0, 1.0);\n\
         }",
        ShaderStage::Fragment,
    );
    let main = module.find_function("main").unwrap();
    let call = main
        .body
        .iter()
        .find_map(|s| match s {
            Stmt::Call { out_targets, .. } => Some(out_targets.len()),
            _ => None,
        })
        .expect("call statement");
    assert_eq!(call, 2);
}

#[test]
fn test_out_argument_must_be_lvalue() {
    let log = lower_fail(
        "void set(out float a) { a = 1.0; }\nvoid main() { set(1.0); }",
        ShaderStage::Vertex,
    );
    assert!(log
        .entries()
        .iter()
        .any(|d| d.message.contains("assignable")));
}

#[test]
fn test_swizzle_types() {
    lower_ok(
        "void main() {\n\
           vec4 v = vec4(1.0);\n\
           vec2 xy = v.xy;\n\
           float r = v.r;\n\
           vec3 sss = v.stp;\n\
         }",
        ShaderStage::Vertex,
    );
}

#[test]
fn test_invalid_swizzle() {
    let log = lower_fail(
        "void main() { vec2 v = vec2(1.0); float z = v.z; }",
        ShaderStage::Vertex,
    );
    assert!(log
        .entries()
        .iter()
        .any(|d| d.message.contains("component selection")));
}

#[test]
fn test_swizzle_write_needs_distinct_lanes() {
    let log = lower_fail(
        "void main() { vec2 v; v.xx = vec2(1.0); }",
        ShaderStage::Vertex,
    );
    assert!(!log.is_empty());
}

#[test]
fn test_assign_to_uniform_rejected() {
    let log = lower_fail(
        "uniform float t;\nvoid main() { t = 1.0; }",
        ShaderStage::Vertex,
    );
    assert!(!log.is_empty());
}

#[test]
fn test_assign_to_const_rejected() {
    let log = lower_fail(
        "void main() { const float c = 1.0; c = 2.0; }",
        ShaderStage::Vertex,
    );
    assert!(log.entries().iter().any(|d| d.message.contains("constant")));
}

#[test]
fn test_discard_only_in_fragment() {
    lower_ok("void main() { discard; }", ShaderStage::Fragment);
    let log = lower_fail("void main() { discard; }", ShaderStage::Vertex);
    assert!(log.entries().iter().any(|d| d.message.contains("discard")));
}

#[test]
fn test_break_outside_loop_rejected() {
    let log = lower_fail("void main() { break; }", ShaderStage::Vertex);
    assert!(log.entries().iter().any(|d| d.message.contains("break")));
}

#[test]
fn test_struct_member_access() {
    lower_ok(
        "struct Light { vec3 dir; float power; };\n\
         void main() {\n\
           Light l = Light(vec3(0.0, 1.0, 0.0), 2.0);\n\
           gl_Position = vec4(l.dir * l.power, 1.0);\n\
         }",
        ShaderStage::Vertex,
    );
}

#[test]
fn test_unknown_struct_field() {
    let log = lower_fail(
        "struct S { float a; };\nvoid main() { S s = S(1.0); float b = s.b; }",
        ShaderStage::Vertex,
    );
    assert!(log.entries().iter().any(|d| d.message.contains("no such field")));
}

#[test]
fn test_matrix_vector_products_type() {
    lower_ok(
        "uniform mat4 mvp;\n\
         attribute vec4 position;\n\
         void main() { gl_Position = mvp * position; }",
        ShaderStage::Vertex,
    );
}

#[test]
fn test_matrix_shape_mismatch() {
    let log = lower_fail(
        "uniform mat4 m;\nvoid main() { vec3 v = vec3(1.0); vec3 r = m * v; }",
        ShaderStage::Vertex,
    );
    assert!(!log.is_empty());
}

#[test]
fn test_varying_direction_depends_on_stage() {
    let (vertex, _) = lower_ok(
        "varying vec4 vColor;\nvoid main() { vColor = vec4(1.0); }",
        ShaderStage::Vertex,
    );
    assert!(vertex.outputs().any(|d| d.name == "vColor"));

    let (fragment, _) = lower_ok(
        "varying vec4 vColor;\nvoid main() { gl_FragColor = vColor; }",
        ShaderStage::Fragment,
    );
    assert!(fragment.inputs().any(|d| d.name == "vColor"));
}

#[test]
fn test_called_prototype_without_body_rejected() {
    let log = lower_fail(
        "float helper(float x);\nvoid main() { float y = helper(1.0); }",
        ShaderStage::Vertex,
    );
    assert!(log
        .entries()
        .iter()
        .any(|d| d.message.contains("never defined")));
}

#[test]
fn test_uncalled_prototype_is_fine() {
    lower_ok("float helper(float x);\nvoid main() { }", ShaderStage::Vertex);
}

#[test]
fn test_void_main_gets_implicit_return() {
    let (module, _) = lower_ok("void main() { }", ShaderStage::Vertex);
    let main = module.find_function("main").unwrap();
    assert_eq!(main.body.stmts(), &[Stmt::Return(None)]);
}
