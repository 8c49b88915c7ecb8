//! Cross-stage linking.
//!
//! A distinct, synchronous phase after per-unit compilation: it reads each
//! unit's exported interface, merges the diagnostic logs, and matches one
//! stage's outputs against the next stage's inputs by name with exact type
//! equality. All units must have been compiled against the same
//! [`TypeInterner`] for the type comparisons to mean anything.

use crate::diagnostics::{CompileError, DiagnosticLog};
use crate::hir::Module;
use crate::options::ShaderStage;
use crate::types::{TypeId, TypeInterner};
use crate::CompileResult;

/// One resolved output→input pairing between adjacent stages.
#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceMatch {
    pub name: String,
    pub ty: TypeId,
}

/// Result of linking the stages of one program.
#[derive(Debug)]
pub struct LinkResult {
    pub success: bool,
    /// Merged logs of every unit plus link-time diagnostics.
    pub log: DiagnosticLog,
    /// Per-stage optimized modules, in pipeline order.
    pub stages: Vec<Module>,
    pub matches: Vec<InterfaceMatch>,
}

fn stage_order(stage: ShaderStage) -> u8 {
    match stage {
        ShaderStage::Vertex => 0,
        ShaderStage::Geometry => 1,
        ShaderStage::Fragment => 2,
    }
}

/// Link compiled units into one program.
pub fn link_stages(results: Vec<CompileResult>, types: &TypeInterner) -> LinkResult {
    let mut log = DiagnosticLog::new();
    let mut stages = Vec::new();

    for result in results {
        log.merge(result.log);
        if let Some(module) = result.module {
            stages.push(module);
        }
    }

    if log.has_errors() {
        return LinkResult {
            success: false,
            log,
            stages,
            matches: Vec::new(),
        };
    }

    stages.sort_by_key(|m| stage_order(m.stage));

    for module in &stages {
        if module.entry.is_none() {
            log.error_global(CompileError::MissingMain {
                stage: module.stage.name().to_string(),
            });
        }
    }

    let mut matches = Vec::new();
    for pair in stages.windows(2) {
        let (producer, consumer) = (&pair[0], &pair[1]);
        for input in consumer.inputs() {
            match producer.outputs().find(|o| o.name == input.name) {
                None => {
                    log.error_global(CompileError::UnmatchedVarying {
                        name: input.name.clone(),
                    });
                }
                Some(output) if output.ty != input.ty => {
                    log.error_global(CompileError::InterfaceTypeMismatch {
                        name: input.name.clone(),
                        a: types.format(output.ty),
                        b: types.format(input.ty),
                    });
                }
                Some(output) => {
                    matches.push(InterfaceMatch {
                        name: input.name.clone(),
                        ty: output.ty,
                    });
                }
            }
        }
    }

    // Uniforms shared across stages must agree on their type.
    for (i, a) in stages.iter().enumerate() {
        for b in &stages[i + 1..] {
            for ua in a.decls.iter().map(|(_, d)| d).filter(|d| {
                d.storage == crate::hir::Storage::Uniform && !d.builtin
            }) {
                if let Some(ub) = b
                    .decls
                    .iter()
                    .map(|(_, d)| d)
                    .find(|d| d.storage == crate::hir::Storage::Uniform && d.name == ua.name)
                {
                    if ua.ty != ub.ty {
                        log.error_global(CompileError::InterfaceTypeMismatch {
                            name: ua.name.clone(),
                            a: types.format(ua.ty),
                            b: types.format(ub.ty),
                        });
                    }
                }
            }
        }
    }

    LinkResult {
        success: !log.has_errors(),
        log,
        stages,
        matches,
    }
}
