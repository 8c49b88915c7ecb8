//! IR optimization passes.
//!
//! A [`Pass`] rewrites a module and reports whether it changed anything; the
//! [`PassManager`] runs its pass list to a fixed point under a hard
//! iteration cap. Passes are independent: ordering affects how fast the
//! fixed point is reached, never the result. Matrix decomposition
//! ([`MatToVec`]) changes representation granularity rather than
//! simplifying, so it is invoked explicitly before codegen handoff, not as
//! part of the fixed-point list.

mod algebraic;
mod const_fold;
mod copy_prop;
mod dce;
mod inline;
mod loop_analysis;
mod mat_to_vec;

pub use algebraic::AlgebraicSimplification;
pub use const_fold::ConstantFolding;
pub use copy_prop::CopyPropagation;
pub use dce::DeadCodeElimination;
pub use inline::FunctionInlining;
pub use loop_analysis::{analyze_loops, LoopAnalysis, LoopInfo};
pub use mat_to_vec::MatToVec;

use crate::hir::Module;
use crate::options::CompileOptions;
use crate::types::TypeInterner;
use std::fmt::Debug;

/// An optimization pass over one module.
pub trait Pass: Debug {
    /// Short name used in progress reports and logs.
    fn name(&self) -> &'static str;

    /// Run once over the module. Returns `true` if anything was rewritten.
    fn run(&self, module: &mut Module, types: &TypeInterner) -> bool;
}

/// Outcome of a [`PassManager`] run.
#[derive(Debug, Clone)]
pub struct PassReport {
    /// Full iterations of the pass list that were executed.
    pub iterations: usize,
    /// For each pass, how many iterations it reported progress in.
    pub progress: Vec<(&'static str, usize)>,
    /// The iteration cap stopped the loop before a fixed point.
    pub hit_cap: bool,
}

/// Runs passes in order, repeating the whole list until no pass reports
/// progress or the iteration cap is reached. Reaching the cap is not an
/// error; it just stops further optimization.
pub struct PassManager {
    passes: Vec<Box<dyn Pass>>,
    max_iterations: usize,
}

impl PassManager {
    pub fn new(max_iterations: usize) -> Self {
        Self {
            passes: Vec::new(),
            max_iterations,
        }
    }

    /// The standard pipeline for the given options.
    pub fn standard(options: &CompileOptions) -> Self {
        let mut pm = Self::new(options.max_opt_iterations);
        pm.add_pass(Box::new(ConstantFolding));
        pm.add_pass(Box::new(CopyPropagation));
        pm.add_pass(Box::new(AlgebraicSimplification));
        pm.add_pass(Box::new(FunctionInlining::default()));
        pm.add_pass(Box::new(LoopAnalysis {
            unroll: options.unroll_loops,
            limit: options.unroll_limit,
        }));
        pm.add_pass(Box::new(DeadCodeElimination));
        pm
    }

    pub fn add_pass(&mut self, pass: Box<dyn Pass>) {
        self.passes.push(pass);
    }

    pub fn run(&self, module: &mut Module, types: &TypeInterner) -> PassReport {
        let mut report = PassReport {
            iterations: 0,
            progress: self.passes.iter().map(|p| (p.name(), 0)).collect(),
            hit_cap: false,
        };

        loop {
            if report.iterations >= self.max_iterations {
                report.hit_cap = true;
                break;
            }
            report.iterations += 1;

            let mut any = false;
            for (i, pass) in self.passes.iter().enumerate() {
                let changed = pass.run(module, types);
                if changed {
                    report.progress[i].1 += 1;
                    any = true;
                }
                tracing::trace!(pass = pass.name(), changed, "pass finished");
            }
            if !any {
                break;
            }
        }

        tracing::debug!(
            iterations = report.iterations,
            hit_cap = report.hit_cap,
            "optimization reached fixed point"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::ShaderStage;

    #[test]
    fn test_empty_module_converges_immediately() {
        let types = TypeInterner::new();
        let mut module = Module::new(ShaderStage::Vertex, 110);
        let pm = PassManager::standard(&CompileOptions::default());
        let report = pm.run(&mut module, &types);
        assert_eq!(report.iterations, 1);
        assert!(!report.hit_cap);
        assert!(report.progress.iter().all(|(_, n)| *n == 0));
    }

    #[test]
    fn test_cap_is_respected() {
        let types = TypeInterner::new();
        let mut module = Module::new(ShaderStage::Vertex, 110);

        // A pass that always claims progress must be stopped by the cap.
        #[derive(Debug)]
        struct Restless;
        impl Pass for Restless {
            fn name(&self) -> &'static str {
                "restless"
            }
            fn run(&self, _: &mut Module, _: &TypeInterner) -> bool {
                true
            }
        }

        let mut pm = PassManager::new(5);
        pm.add_pass(Box::new(Restless));
        let report = pm.run(&mut module, &types);
        assert_eq!(report.iterations, 5);
        assert!(report.hit_cap);
        assert_eq!(report.progress[0].1, 5);
    }
}
