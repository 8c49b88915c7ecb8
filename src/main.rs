//! The `glintc` command line front end.
//!
//! Glue only: selects input files and flags, drives the library pipeline,
//! and prints logs and IR dumps. The shader stage is inferred from the
//! file suffix (`.vert`, `.geom`, `.frag`).

use clap::{Parser, Subcommand};
use glint::opt::Pass;
use miette::Result;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "glintc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "A stand-alone GLSL compiler front end", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile one or more shader files
    Compile {
        /// Input files (.vert, .geom, .frag)
        #[arg(value_name = "FILE", required = true)]
        files: Vec<PathBuf>,

        /// Print the parsed AST as JSON
        #[arg(long)]
        dump_ast: bool,

        /// Print the IR before optimization
        #[arg(long)]
        dump_hir: bool,

        /// Print the IR after optimization
        #[arg(long)]
        dump_lir: bool,

        /// Link the compiled stages into one program
        #[arg(long)]
        link: bool,

        /// Compile as OpenGL ES (version 100)
        #[arg(long)]
        glsl_es: bool,

        /// Unroll statically counted loops
        #[arg(long)]
        unroll_loops: bool,

        /// Decompose whole-matrix operations into vector operations
        /// before handing the IR off
        #[arg(long)]
        mat_to_vec: bool,

        /// Optimization fixed-point iteration cap
        #[arg(long, default_value_t = 32)]
        max_opt_iterations: usize,
    },

    /// Show information about the compiler
    Info,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if cli.verbose {
        tracing::info!("Verbose mode enabled");
    }

    match cli.command {
        Commands::Compile {
            files,
            dump_ast,
            dump_hir,
            dump_lir,
            link,
            glsl_es,
            unroll_loops,
            mat_to_vec,
            max_opt_iterations,
        } => compile(
            &files,
            &DumpFlags {
                ast: dump_ast,
                hir: dump_hir,
                lir: dump_lir,
            },
            link,
            glsl_es,
            unroll_loops,
            mat_to_vec,
            max_opt_iterations,
        ),
        Commands::Info => info(),
    }
}

struct DumpFlags {
    ast: bool,
    hir: bool,
    lir: bool,
}

#[allow(clippy::too_many_arguments)]
fn compile(
    files: &[PathBuf],
    dumps: &DumpFlags,
    link: bool,
    glsl_es: bool,
    unroll_loops: bool,
    mat_to_vec: bool,
    max_opt_iterations: usize,
) -> Result<()> {
    let mut options = if glsl_es {
        glint::CompileOptions::glsl_es()
    } else {
        glint::CompileOptions::default()
    };
    options.unroll_loops = unroll_loops;
    options.max_opt_iterations = max_opt_iterations;

    // One interner for the whole invocation so stages can be linked.
    let types = glint::TypeInterner::new();
    let mut results = Vec::new();
    let mut any_failed = false;

    for file in files {
        let Some(stage) = glint::ShaderStage::from_path(file) else {
            return Err(miette::miette!(
                "cannot infer shader stage from {:?}; use .vert, .geom or .frag",
                file
            ));
        };
        let source = std::fs::read_to_string(file)
            .map_err(|e| miette::miette!("failed to read {:?}: {e}", file))?;

        tracing::info!("Compiling {:?} as {} shader", file, stage);

        if dumps.ast {
            print_ast(&source, &options)?;
        }
        if dumps.hir {
            print_unoptimized_ir(&source, stage, &options, &types);
        }

        let mut result = glint::compile_shader_with(&source, stage, &options, &types, None);

        if result.success && mat_to_vec {
            if let Some(module) = result.module.as_mut() {
                let pass = glint::opt::MatToVec;
                // The decomposition introduces mat*vec products that take
                // one more sweep each; the depth is bounded by the matrix
                // dimension.
                let mut rounds = 0;
                while pass.run(module, &types) && rounds < 8 {
                    rounds += 1;
                }
            }
        }

        print!("{}", result.info_log());
        if result.success {
            println!(
                "{}: ok ({} built-ins referenced)",
                file.display(),
                result.builtins_referenced.len()
            );
            if dumps.lir {
                if let Some(module) = &result.module {
                    println!("{}", glint::hir::dump_module(module, &types));
                }
            }
        } else {
            any_failed = true;
            println!("{}: compilation failed", file.display());
        }
        results.push(result);
    }

    if link {
        let linked = glint::link::link_stages(results, &types);
        if linked.success {
            println!(
                "link ok: {} stages, {} interface matches",
                linked.stages.len(),
                linked.matches.len()
            );
            for m in &linked.matches {
                println!("  {} : {}", m.name, types.format(m.ty));
            }
        } else {
            // Per-stage messages were already printed above; show only the
            // link-level entries.
            for d in linked.log.entries() {
                if d.span.is_none() {
                    eprintln!("{}: {}", d.severity.label(), d.message);
                }
            }
            return Err(miette::miette!("link failed"));
        }
    } else if any_failed {
        return Err(miette::miette!("compilation failed"));
    }

    Ok(())
}

fn print_ast(source: &str, options: &glint::CompileOptions) -> Result<()> {
    let mut log = glint::DiagnosticLog::new();
    let expanded = glint::pp::preprocess(source, options, &mut log);
    let tokens = glint::lexer::lex(
        &expanded.text,
        expanded.version,
        expanded.profile,
        &mut log,
    );
    let unit = glint::parser::parse(&tokens, &mut log);
    let json = serde_json::to_string_pretty(&unit)
        .map_err(|e| miette::miette!("failed to serialize AST: {e}"))?;
    println!("{json}");
    Ok(())
}

/// Mirror of the library pipeline stopped before optimization, so the
/// pre-optimization IR can be inspected.
fn print_unoptimized_ir(
    source: &str,
    stage: glint::ShaderStage,
    options: &glint::CompileOptions,
    types: &glint::TypeInterner,
) {
    let mut log = glint::DiagnosticLog::new();
    let expanded = glint::pp::preprocess(source, options, &mut log);
    let tokens = glint::lexer::lex(
        &expanded.text,
        expanded.version,
        expanded.profile,
        &mut log,
    );
    let unit = glint::parser::parse(&tokens, &mut log);
    if log.has_errors() {
        return;
    }
    let catalog = glint::BuiltinCatalog::default_catalog(
        expanded.version,
        stage,
        &options.limits,
        types,
    );
    let module = glint::lower::lower(
        &unit,
        stage,
        expanded.version,
        types,
        &catalog,
        &mut log,
    );
    if !log.has_errors() {
        println!("{}", glint::hir::dump_module(&module, types));
    }
}

fn info() -> Result<()> {
    println!("glint {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Supported language versions:");
    println!("  - GLSL 1.10, 1.20, 1.30 (core)");
    println!("  - GLSL ES 1.00");
    println!();
    println!("Pipeline: preprocess -> lex -> parse -> lower -> optimize -> validate");
    Ok(())
}
