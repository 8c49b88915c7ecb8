//! Cross-stage linking tests

use glint::link::link_stages;
use glint::{compile_shader_with, CompileOptions, CompileResult, ShaderStage, TypeInterner};

fn compile(src: &str, stage: ShaderStage, types: &TypeInterner) -> CompileResult {
    compile_shader_with(src, stage, &CompileOptions::default(), types, None)
}

const VERTEX_OK: &str = "\
varying vec4 vColor;
void main() {
    vColor = vec4(1.0, 0.0, 0.0, 1.0);
    gl_Position = vec4(0.0, 0.0, 0.0, 1.0);
}
";

#[test]
fn test_matching_varyings_link() {
    let types = TypeInterner::new();
    let vs = compile(VERTEX_OK, ShaderStage::Vertex, &types);
    let fs = compile(
        "varying vec4 vColor;\nvoid main() { gl_FragColor = vColor; }",
        ShaderStage::Fragment,
        &types,
    );
    assert!(vs.success && fs.success);

    let linked = link_stages(vec![vs, fs], &types);
    assert!(linked.success, "{:?}", linked.log.entries());
    assert_eq!(linked.stages.len(), 2);
    assert_eq!(linked.matches.len(), 1);
    assert_eq!(linked.matches[0].name, "vColor");
    assert_eq!(types.format(linked.matches[0].ty), "vec4");
}

#[test]
fn test_varying_type_mismatch_fails_naming_the_variable() {
    let types = TypeInterner::new();
    let vs = compile(VERTEX_OK, ShaderStage::Vertex, &types);
    let fs = compile(
        "varying vec3 vColor;\nvoid main() { gl_FragColor = vec4(vColor, 1.0); }",
        ShaderStage::Fragment,
        &types,
    );
    assert!(vs.success && fs.success);

    let linked = link_stages(vec![vs, fs], &types);
    assert!(!linked.success);
    let message = linked
        .log
        .entries()
        .iter()
        .map(|d| d.message.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    assert!(message.contains("vColor"), "got: {message}");
    assert!(message.contains("vec4") && message.contains("vec3"));
}

#[test]
fn test_unwritten_varying_fails() {
    let types = TypeInterner::new();
    let vs = compile(
        "void main() { gl_Position = vec4(0.0); }",
        ShaderStage::Vertex,
        &types,
    );
    let fs = compile(
        "varying vec4 vColor;\nvoid main() { gl_FragColor = vColor; }",
        ShaderStage::Fragment,
        &types,
    );
    assert!(vs.success && fs.success);

    let linked = link_stages(vec![vs, fs], &types);
    assert!(!linked.success);
    assert!(linked
        .log
        .entries()
        .iter()
        .any(|d| d.message.contains("vColor")));
}

#[test]
fn test_stage_order_normalized() {
    let types = TypeInterner::new();
    // Fragment passed first; the linker sorts by pipeline position.
    let fs = compile(
        "varying vec4 vColor;\nvoid main() { gl_FragColor = vColor; }",
        ShaderStage::Fragment,
        &types,
    );
    let vs = compile(VERTEX_OK, ShaderStage::Vertex, &types);

    let linked = link_stages(vec![fs, vs], &types);
    assert!(linked.success, "{:?}", linked.log.entries());
    assert_eq!(linked.stages[0].stage, ShaderStage::Vertex);
    assert_eq!(linked.stages[1].stage, ShaderStage::Fragment);
}

#[test]
fn test_failed_stage_fails_link_with_merged_log() {
    let types = TypeInterner::new();
    let vs = compile(VERTEX_OK, ShaderStage::Vertex, &types);
    let fs = compile(
        "void main() { gl_FragColor = missing; }",
        ShaderStage::Fragment,
        &types,
    );
    assert!(!fs.success);

    let linked = link_stages(vec![vs, fs], &types);
    assert!(!linked.success);
    // The per-stage diagnostics survive into the merged log.
    assert!(linked
        .log
        .entries()
        .iter()
        .any(|d| d.message.contains("missing")));
}

#[test]
fn test_uniform_type_conflict_across_stages() {
    let types = TypeInterner::new();
    let vs = compile(
        "uniform float scale;\nvarying vec4 vColor;\n\
         void main() { vColor = vec4(scale); gl_Position = vec4(0.0); }",
        ShaderStage::Vertex,
        &types,
    );
    let fs = compile(
        "uniform vec2 scale;\nvarying vec4 vColor;\n\
         void main() { gl_FragColor = vColor + vec4(scale, 0.0, 0.0); }",
        ShaderStage::Fragment,
        &types,
    );
    assert!(vs.success && fs.success);

    let linked = link_stages(vec![vs, fs], &types);
    assert!(!linked.success);
    assert!(linked
        .log
        .entries()
        .iter()
        .any(|d| d.message.contains("scale")));
}

#[test]
fn test_missing_main_detected() {
    let types = TypeInterner::new();
    let vs = compile(
        "varying vec4 vColor;\nvoid helper() { vColor = vec4(1.0); }",
        ShaderStage::Vertex,
        &types,
    );
    assert!(vs.success);

    let linked = link_stages(vec![vs], &types);
    assert!(!linked.success);
    assert!(linked
        .log
        .entries()
        .iter()
        .any(|d| d.message.contains("main")));
}
