//! End-to-end pipeline tests

use glint::hir::Stmt;
use glint::resolve::BuiltinCatalog;
use glint::validate::validate_module;
use glint::{
    compile_shader, lexer, lower, parser, pp, CompileOptions, DiagnosticLog, ShaderStage,
    TypeInterner,
};

#[test]
fn test_scenario_constant_fold_then_dce() {
    // `1.0 + 2.0` folds, the unused local dies, and main is left with
    // nothing but its implicit return.
    let result = compile_shader(
        "void main() { float x = 1.0 + 2.0; }",
        ShaderStage::Vertex,
        &CompileOptions::default(),
    );
    assert!(result.success, "{}", result.info_log());
    let module = result.module.unwrap();
    let main = module.find_function("main").unwrap();
    assert_eq!(main.body.stmts(), &[Stmt::Return(None)]);
}

#[test]
fn test_scenario_undeclared_identifier() {
    let result = compile_shader(
        "void main() { float x = foo; }",
        ShaderStage::Vertex,
        &CompileOptions::default(),
    );
    assert!(!result.success);
    assert!(result.module.is_none());
    assert_eq!(result.log.error_count(), 1);
    let entry = &result.log.entries()[0];
    assert!(entry.message.contains("foo"));
    assert!(entry.span.is_some());
}

#[test]
fn test_scenario_two_errors_one_pass() {
    let result = compile_shader(
        "void main() { float x = ; int y = * 2; }",
        ShaderStage::Vertex,
        &CompileOptions::default(),
    );
    assert!(!result.success);
    assert!(result.log.error_count() >= 2);
}

#[test]
fn test_info_log_format() {
    let result = compile_shader(
        "void main() {\n  float x = nope;\n}",
        ShaderStage::Vertex,
        &CompileOptions::default(),
    );
    let log = result.info_log();
    // Driver-style "0:line(col): severity:" lines.
    assert!(log.starts_with("0:2("), "got: {log}");
    assert!(log.contains("error:"));
    assert!(log.contains("nope"));
}

#[test]
fn test_type_soundness_of_lowered_ir() {
    // For everything that lowers successfully, the validator finds nothing
    // to complain about.
    let sources = [
        ("void main() { gl_Position = vec4(0.0); }", ShaderStage::Vertex),
        (
            "uniform mat4 mvp;\nattribute vec4 position;\n\
             void main() { gl_Position = mvp * position; }",
            ShaderStage::Vertex,
        ),
        (
            "uniform sampler2D tex;\nvarying vec2 uv;\n\
             void main() {\n\
               vec4 c = texture2D(tex, uv);\n\
               if (c.a < 0.5) discard;\n\
               gl_FragColor = c;\n\
             }",
            ShaderStage::Fragment,
        ),
        (
            "void main() {\n\
               float s = 0.0;\n\
               for (int i = 0; i < 8; i++) { s += float(i); }\n\
               int k = 0;\n\
               do { k = k + 1; } while (k < 2);\n\
               gl_FragColor = vec4(s / 28.0);\n\
             }",
            ShaderStage::Fragment,
        ),
    ];

    for (src, stage) in sources {
        let options = CompileOptions::default();
        let types = TypeInterner::new();
        let mut log = DiagnosticLog::new();
        let expanded = pp::preprocess(src, &options, &mut log);
        let tokens = lexer::lex(&expanded.text, expanded.version, expanded.profile, &mut log);
        let unit = parser::parse(&tokens, &mut log);
        assert!(!log.has_errors(), "{src}: {:?}", log.entries());
        let catalog =
            BuiltinCatalog::default_catalog(expanded.version, stage, &options.limits, &types);
        let module = lower::lower(&unit, stage, expanded.version, &types, &catalog, &mut log);
        assert!(!log.has_errors(), "{src}: {:?}", log.entries());

        let violations = validate_module(&module, &types);
        assert!(violations.is_empty(), "{src}: {violations:?}");
    }
}

#[test]
fn test_preprocessor_feeds_pipeline() {
    let result = compile_shader(
        "#define BRIGHTNESS 0.75\n\
         #define SCALE(x) ((x) * BRIGHTNESS)\n\
         void main() {\n\
           gl_FragColor = vec4(SCALE(1.0));\n\
         }",
        ShaderStage::Fragment,
        &CompileOptions::default(),
    );
    assert!(result.success, "{}", result.info_log());
}

#[test]
fn test_conditional_compilation_selects_branch() {
    let result = compile_shader(
        "#define USE_RED 1\n\
         void main() {\n\
         #if USE_RED\n\
           gl_FragColor = vec4(1.0, 0.0, 0.0, 1.0);\n\
         #else\n\
           gl_FragColor = banana;\n\
         #endif\n\
         }",
        ShaderStage::Fragment,
        &CompileOptions::default(),
    );
    // The broken branch was excluded, so this compiles.
    assert!(result.success, "{}", result.info_log());
}

#[test]
fn test_version_gates_language_features() {
    // `switch` requires 1.30.
    let src = "void main() { int x = 0; switch (x) { default: x = 1; } gl_FragColor = vec4(float(x)); }";
    let result = compile_shader(src, ShaderStage::Fragment, &CompileOptions::default());
    assert!(!result.success);

    let with_version = format!("#version 130\n{src}");
    let result = compile_shader(&with_version, ShaderStage::Fragment, &CompileOptions::default());
    assert!(result.success, "{}", result.info_log());
    assert_eq!(result.version, 130);
}

#[test]
fn test_version_directive_must_be_supported() {
    let result = compile_shader(
        "#version 460\nvoid main() { }",
        ShaderStage::Vertex,
        &CompileOptions::default(),
    );
    assert!(!result.success);
    assert!(result.info_log().contains("unsupported"));
}

#[test]
fn test_extension_directive_require_unknown() {
    let result = compile_shader(
        "#extension GL_FAKE_extension : require\nvoid main() { }",
        ShaderStage::Vertex,
        &CompileOptions::default(),
    );
    assert!(!result.success);
}

#[test]
fn test_capability_limits_surface_as_constants() {
    let mut options = CompileOptions::default();
    options.limits.max_draw_buffers = 4;
    // gl_MaxDrawBuffers is usable as a constant array size.
    let result = compile_shader(
        "uniform vec4 buffers[gl_MaxDrawBuffers];\n\
         void main() { gl_FragColor = buffers[0]; }",
        ShaderStage::Fragment,
        &options,
    );
    assert!(result.success, "{}", result.info_log());
}

#[test]
fn test_representative_fragment_shader() {
    let source = "\
#version 120
uniform sampler2D tex;
uniform float t;
varying vec2 uv;

float wave(float x) {
    return sin(x) * 0.5 + 0.5;
}

void main() {
    vec4 base = texture2D(tex, uv);
    float w = wave(t);
    vec3 tinted = base.rgb * w;
    gl_FragColor = vec4(tinted, base.a);
}
";
    let result = compile_shader(source, ShaderStage::Fragment, &CompileOptions::default());
    assert!(result.success, "{}", result.info_log());
    assert_eq!(result.version, 120);
    assert!(result.builtins_referenced.iter().any(|b| b == "texture2D"));
    assert!(result.builtins_referenced.iter().any(|b| b == "sin"));

    // `wave` is small enough that the call gets inlined away.
    let module = result.module.unwrap();
    let main = module.find_function("main").unwrap();
    assert!(!main.body.iter().any(|s| matches!(s, Stmt::Call { .. })));
}

#[test]
fn test_result_survives_for_failed_unit() {
    // A failed unit still yields its full log and expanded source so the
    // host can present everything at once.
    let result = compile_shader(
        "#define X 1\nvoid main() { float a = ; float b = also_bad; }",
        ShaderStage::Vertex,
        &CompileOptions::default(),
    );
    assert!(!result.success);
    assert!(result.module.is_none());
    assert!(!result.expanded_source.is_empty());
    assert!(!result.log.is_empty());
}
