//! Optimization pipeline tests

use glint::hir::{ConstValue, Stmt, ValueKind};
use glint::opt::{self, Pass, PassManager};
use glint::resolve::BuiltinCatalog;
use glint::{
    compile_shader, lexer, lower, parser, pp, CompileOptions, DiagnosticLog, ShaderStage,
    TypeInterner,
};

fn lower_only(
    src: &str,
    stage: ShaderStage,
    options: &CompileOptions,
    types: &TypeInterner,
) -> glint::hir::Module {
    let mut log = DiagnosticLog::new();
    let expanded = pp::preprocess(src, options, &mut log);
    let tokens = lexer::lex(&expanded.text, expanded.version, expanded.profile, &mut log);
    let unit = parser::parse(&tokens, &mut log);
    assert!(!log.has_errors(), "{:?}", log.entries());
    let catalog =
        BuiltinCatalog::default_catalog(expanded.version, stage, &options.limits, types);
    let module = lower::lower(&unit, stage, expanded.version, types, &catalog, &mut log);
    assert!(!log.has_errors(), "{:?}", log.entries());
    module
}

fn resolve_store_const<'a>(
    func: &'a glint::hir::Function,
    decl_name: &str,
    module: &glint::hir::Module,
) -> Option<&'a ConstValue> {
    func.body.iter().find_map(|s| match s {
        Stmt::Store { target, value } if module.decls[target.decl].name == decl_name => {
            match &func.values[func.resolve(*value)].kind {
                ValueKind::Constant(c) => Some(c),
                _ => None,
            }
        }
        _ => None,
    })
}

#[test]
fn test_scenario_dead_local_collapses_to_implicit_return() {
    // Constant folding collapses 1.0+2.0, then the never-read local store
    // is dead code; only the implicit return remains.
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
fn test_output_write_survives() {
    let result = compile_shader(
        "void main() { gl_FragColor = vec4(0.5); }",
        ShaderStage::Fragment,
        &CompileOptions::default(),
    );
    assert!(result.success);
    let module = result.module.unwrap();
    let main = module.find_function("main").unwrap();
    assert!(main
        .body
        .iter()
        .any(|s| matches!(s, Stmt::Store { .. })));
}

#[test]
fn test_constant_folding_collapses_through_locals() {
    let types = TypeInterner::new();
    let options = CompileOptions::default();
    let mut module = lower_only(
        "void main() { float x = 2.0 * 3.0 + 4.0; gl_FragColor = vec4(x); }",
        ShaderStage::Fragment,
        &options,
        &types,
    );
    PassManager::standard(&options).run(&mut module, &types);

    let main = module.find_function("main").unwrap();
    let stored = resolve_store_const(main, "gl_FragColor", &module).expect("folded store");
    assert_eq!(stored, &ConstValue::Vector(vec![ConstValue::Float(10.0); 4]));
}

#[test]
fn test_float_division_by_zero_folds_to_infinity() {
    let types = TypeInterner::new();
    let options = CompileOptions::default();
    let mut module = lower_only(
        "void main() { float x = 1.0 / 0.0; gl_FragColor = vec4(x); }",
        ShaderStage::Fragment,
        &options,
        &types,
    );
    PassManager::standard(&options).run(&mut module, &types);

    let main = module.find_function("main").unwrap();
    let stored = resolve_store_const(main, "gl_FragColor", &module).expect("folded store");
    let ConstValue::Vector(elems) = stored else {
        panic!("expected vector constant, got {stored:?}");
    };
    for e in elems {
        let ConstValue::Float(v) = e else {
            panic!("expected float components");
        };
        assert!(v.is_infinite() && *v > 0.0);
    }
}

#[test]
fn test_int_constant_arithmetic() {
    let types = TypeInterner::new();
    let options = CompileOptions::default();
    let mut module = lower_only(
        "void main() { int y = 2 + 3; gl_FragColor = vec4(float(y)); }",
        ShaderStage::Fragment,
        &options,
        &types,
    );
    PassManager::standard(&options).run(&mut module, &types);

    let main = module.find_function("main").unwrap();
    let stored = resolve_store_const(main, "gl_FragColor", &module).expect("folded store");
    assert_eq!(stored, &ConstValue::Vector(vec![ConstValue::Float(5.0); 4]));
}

#[test]
fn test_algebraic_identity_feeds_propagation() {
    let types = TypeInterner::new();
    let options = CompileOptions::default();
    let mut module = lower_only(
        "uniform float t;\nvoid main() { float x = t * 1.0 + 0.0; gl_FragColor = vec4(x); }",
        ShaderStage::Fragment,
        &options,
        &types,
    );
    PassManager::standard(&options).run(&mut module, &types);

    let main = module.find_function("main").unwrap();
    // x's store is gone; the output store reads `t` through the collapsed
    // identities.
    let stores = main
        .body
        .iter()
        .filter(|s| matches!(s, Stmt::Store { .. }))
        .count();
    assert_eq!(stores, 1);
}

#[test]
fn test_small_function_inlined() {
    let types = TypeInterner::new();
    let options = CompileOptions::default();
    let mut module = lower_only(
        "float doubled(float v) { return v * 2.0; }\n\
         void main() { gl_FragColor = vec4(doubled(2.0)); }",
        ShaderStage::Fragment,
        &options,
        &types,
    );
    PassManager::standard(&options).run(&mut module, &types);

    let main = module.find_function("main").unwrap();
    assert!(
        !main.body.iter().any(|s| matches!(s, Stmt::Call { .. })),
        "call should have been inlined"
    );
    let stored = resolve_store_const(main, "gl_FragColor", &module).expect("folded store");
    assert_eq!(stored, &ConstValue::Vector(vec![ConstValue::Float(4.0); 4]));
}

#[test]
fn test_function_with_out_params_not_inlined() {
    let types = TypeInterner::new();
    let options = CompileOptions::default();
    let mut module = lower_only(
        "void fetch(out float v) { v = 1.0; }\n\
         void main() { float a; fetch(a); gl_FragColor = vec4(a); }",
        ShaderStage::Fragment,
        &options,
        &types,
    );
    PassManager::standard(&options).run(&mut module, &types);

    let main = module.find_function("main").unwrap();
    assert!(main.body.iter().any(|s| matches!(s, Stmt::Call { .. })));
}

#[test]
fn test_loop_analysis_reports_trip_count() {
    let types = TypeInterner::new();
    let options = CompileOptions::default();
    let module = lower_only(
        "void main() {\n\
           float s = 0.0;\n\
           for (int i = 0; i < 4; i++) { s += 1.0; }\n\
           gl_FragColor = vec4(s);\n\
         }",
        ShaderStage::Fragment,
        &options,
        &types,
    );
    // One round of cleanup passes makes the latch canonical, as the
    // fixed-point driver would.
    let mut module = module;
    opt::CopyPropagation.run(&mut module, &types);
    opt::DeadCodeElimination.run(&mut module, &types);

    let main = module.find_function("main").unwrap();
    let loops = opt::analyze_loops(main);
    assert_eq!(loops.len(), 1);
    assert_eq!(loops[0].trip_count, Some(4));
    assert!(loops[0].unrollable);
}

#[test]
fn test_unroll_removes_loop() {
    let options = CompileOptions {
        unroll_loops: true,
        ..CompileOptions::default()
    };
    let result = compile_shader(
        "void main() {\n\
           float s = 0.0;\n\
           for (int i = 0; i < 4; i++) { s += 1.0; }\n\
           gl_FragColor = vec4(s);\n\
         }",
        ShaderStage::Fragment,
        &options,
    );
    assert!(result.success, "{}", result.info_log());
    let module = result.module.unwrap();
    let main = module.find_function("main").unwrap();
    assert!(!main.body.iter().any(|s| matches!(s, Stmt::Loop { .. })));

    let stored = resolve_store_const(main, "gl_FragColor", &module).expect("folded store");
    assert_eq!(stored, &ConstValue::Vector(vec![ConstValue::Float(4.0); 4]));
}

#[test]
fn test_loop_not_unrolled_by_default() {
    let result = compile_shader(
        "void main() {\n\
           float s = 0.0;\n\
           for (int i = 0; i < 4; i++) { s += 1.0; }\n\
           gl_FragColor = vec4(s);\n\
         }",
        ShaderStage::Fragment,
        &CompileOptions::default(),
    );
    assert!(result.success);
    let module = result.module.unwrap();
    let main = module.find_function("main").unwrap();
    assert!(main.body.iter().any(|s| matches!(s, Stmt::Loop { .. })));
}

#[test]
fn test_idempotence_at_fixed_point() {
    let types = TypeInterner::new();
    let options = CompileOptions::default();
    let mut module = lower_only(
        "uniform float t;\n\
         float half_of(float v) { return v * 0.5; }\n\
         void main() {\n\
           float a = 1.0 + 2.0;\n\
           float b = half_of(a) * t;\n\
           gl_FragColor = vec4(b);\n\
         }",
        ShaderStage::Fragment,
        &options,
        &types,
    );
    let pm = PassManager::standard(&options);
    let first = pm.run(&mut module, &types);
    assert!(!first.hit_cap);

    // A second run over the fixed point reports no progress anywhere.
    let second = pm.run(&mut module, &types);
    assert_eq!(second.iterations, 1);
    assert!(
        second.progress.iter().all(|(_, n)| *n == 0),
        "passes still progressing: {:?}",
        second.progress
    );
}

#[test]
fn test_pass_progress_counts_exposed() {
    let types = TypeInterner::new();
    let options = CompileOptions::default();
    let mut module = lower_only(
        "void main() { float x = 1.0 + 2.0; }",
        ShaderStage::Vertex,
        &options,
        &types,
    );
    let report = PassManager::standard(&options).run(&mut module, &types);

    let folded = report
        .progress
        .iter()
        .find(|(name, _)| *name == "const-fold")
        .unwrap();
    assert!(folded.1 >= 1);
    let dce = report
        .progress
        .iter()
        .find(|(name, _)| *name == "dce")
        .unwrap();
    assert!(dce.1 >= 1);
}

#[test]
fn test_iteration_cap_respected() {
    let types = TypeInterner::new();
    let options = CompileOptions {
        max_opt_iterations: 1,
        ..CompileOptions::default()
    };
    let mut module = lower_only(
        "void main() { float x = 1.0 + 2.0; gl_FragColor = vec4(x); }",
        ShaderStage::Fragment,
        &options,
        &types,
    );
    let report = PassManager::standard(&options).run(&mut module, &types);
    assert_eq!(report.iterations, 1);
    assert!(report.hit_cap);
}

#[test]
fn test_mat_to_vec_only_on_request() {
    let types = TypeInterner::new();
    let options = CompileOptions::default();
    let mut module = lower_only(
        "uniform mat2 m;\n\
         uniform vec2 v;\n\
         void main() { gl_Position = vec4(m * v, 0.0, 1.0); }",
        ShaderStage::Vertex,
        &options,
        &types,
    );
    PassManager::standard(&options).run(&mut module, &types);

    let has_matrix_mul = |module: &glint::hir::Module| {
        let main = module.find_function("main").unwrap();
        main.values.iter().any(|(_, v)| {
            matches!(v.kind, ValueKind::Binary { op: glint::hir::BinaryOp::Mul, left, .. }
                if types.get(main.values[main.resolve(left)].ty).is_matrix())
        })
    };
    assert!(has_matrix_mul(&module), "fixed-point loop must not decompose");

    let pass = opt::MatToVec;
    assert!(pass.run(&mut module, &types));
    assert!(!has_matrix_mul(&module), "explicit pass decomposes");
}
