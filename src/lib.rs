//! A stand-alone GLSL compiler front end.
//!
//! Turns shader source text into a validated, optimized, typed IR suitable
//! for a downstream code generator:
//!
//! ```text
//! Source → Preprocessor → Lexer → Parser → AST → Lowering → HIR
//!        → Optimization (fixed point) → Validator → backend handoff
//! ```
//!
//! Each stage accumulates into a per-unit [`DiagnosticLog`] instead of
//! failing fast, so one invocation reports every problem it can find. The
//! optimized [`hir::Module`] is the contract boundary: an ordered list of
//! functions, each with typed values and an ordered instruction list, and
//! no assumptions about what the backend does beyond structural validity.
//!
//! # Example
//!
//! ```
//! use glint::{compile_shader, CompileOptions, ShaderStage};
//!
//! let result = compile_shader(
//!     "void main() { gl_FragColor = vec4(1.0, 0.0, 0.0, 1.0); }",
//!     ShaderStage::Fragment,
//!     &CompileOptions::default(),
//! );
//! assert!(result.success, "{}", result.info_log());
//! ```

pub mod ast;
pub mod common;
pub mod diagnostics;
pub mod hir;
pub mod lexer;
pub mod link;
pub mod lower;
pub mod options;
pub mod opt;
pub mod parser;
pub mod pp;
pub mod resolve;
pub mod types;
pub mod validate;

pub use diagnostics::{CompileError, Diagnostic, DiagnosticLog, Severity};
pub use options::{CapabilityLimits, CompileOptions, Profile, ShaderStage};
pub use resolve::BuiltinCatalog;
pub use types::TypeInterner;

/// Compiler version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Everything a host gets back from compiling one unit.
#[derive(Debug)]
pub struct CompileResult {
    /// False whenever the log holds a hard error; `module` is `None` then.
    pub success: bool,
    pub log: DiagnosticLog,
    /// The optimized IR, present only on success.
    pub module: Option<hir::Module>,
    /// Built-in functions the unit calls; the host must provide them.
    pub builtins_referenced: Vec<String>,
    /// Preprocessed text the log's spans refer to.
    pub expanded_source: String,
    /// Effective language version after `#version` handling.
    pub version: u16,
}

impl CompileResult {
    /// The log rendered as ordered info-log lines.
    pub fn info_log(&self) -> String {
        self.log.render(&self.expanded_source)
    }
}

/// Compile one shader with a private type interner and the default
/// built-in catalog. For multi-stage programs that will be linked, use
/// [`compile_shader_with`] and share one interner.
pub fn compile_shader(
    source: &str,
    stage: ShaderStage,
    options: &CompileOptions,
) -> CompileResult {
    let types = TypeInterner::new();
    compile_shader_with(source, stage, options, &types, None)
}

/// Compile one shader against a caller-owned interner and, optionally, a
/// caller-owned built-in catalog.
pub fn compile_shader_with(
    source: &str,
    stage: ShaderStage,
    options: &CompileOptions,
    types: &TypeInterner,
    catalog: Option<&BuiltinCatalog>,
) -> CompileResult {
    let mut log = DiagnosticLog::new();

    let expanded = pp::preprocess(source, options, &mut log);
    let tokens = lexer::lex(&expanded.text, expanded.version, expanded.profile, &mut log);
    tracing::debug!(tokens = tokens.len(), version = expanded.version, "lexed");

    let unit = parser::parse(&tokens, &mut log);
    tracing::debug!(decls = unit.decls.len(), "parsed");

    // A failed lex+parse stage skips lowering entirely.
    if log.has_errors() {
        return failure(log, expanded.text, expanded.version);
    }

    let default_catalog;
    let catalog = match catalog {
        Some(catalog) => catalog,
        None => {
            default_catalog = BuiltinCatalog::default_catalog(
                expanded.version,
                stage,
                &options.limits,
                types,
            );
            &default_catalog
        }
    };

    let mut module = lower::lower(
        &unit,
        stage,
        expanded.version,
        types,
        catalog,
        &mut log,
    );
    if log.has_errors() {
        return failure(log, expanded.text, expanded.version);
    }

    // Assertion oracle: freshly lowered IR must already be consistent.
    if !validate::validate_into_log(&module, types, &mut log) {
        return failure(log, expanded.text, expanded.version);
    }

    let pm = opt::PassManager::standard(options);
    let report = pm.run(&mut module, types);
    tracing::debug!(iterations = report.iterations, "optimized");

    if !validate::validate_into_log(&module, types, &mut log) {
        return failure(log, expanded.text, expanded.version);
    }

    let builtins_referenced = module.builtins_referenced.clone();
    CompileResult {
        success: true,
        log,
        module: Some(module),
        builtins_referenced,
        expanded_source: expanded.text,
        version: expanded.version,
    }
}

fn failure(log: DiagnosticLog, expanded_source: String, version: u16) -> CompileResult {
    CompileResult {
        success: false,
        log,
        module: None,
        builtins_referenced: Vec::new(),
        expanded_source,
        version,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_trivial_fragment_shader() {
        let result = compile_shader(
            "void main() { gl_FragColor = vec4(1.0); }",
            ShaderStage::Fragment,
            &CompileOptions::default(),
        );
        assert!(result.success, "{}", result.info_log());
        assert!(result.module.is_some());
    }
}
