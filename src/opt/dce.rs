//! Dead-code elimination pass.
//!
//! Removes stores to function-local variables that are provably never read,
//! empty conditionals, and statements made unreachable by a jump. Writes to
//! anything observable from outside the function — stage outputs, globals,
//! out-parameters — and calls, returns, and `discard` are never touched.

use crate::hir::{
    Access, Block, DeclId, Function, Module, Stmt, Storage, ValueKind,
};
use crate::types::TypeInterner;
use id_arena::Arena;
use rustc_hash::FxHashSet;

use super::Pass;

#[derive(Debug)]
pub struct DeadCodeElimination;

impl Pass for DeadCodeElimination {
    fn name(&self) -> &'static str {
        "dce"
    }

    fn run(&self, module: &mut Module, _types: &TypeInterner) -> bool {
        let decls = &module.decls;
        let mut changed = false;
        for func in module.functions.iter_mut() {
            changed |= run_on_function(func, decls);
        }
        changed
    }
}

pub(crate) fn run_on_function(
    func: &mut Function,
    decls: &Arena<crate::hir::Declaration>,
) -> bool {
    // Which locals may be removed at all: declared in this function and
    // not externally visible.
    let mut removable: FxHashSet<DeclId> = func.locals.iter().copied().collect();
    for &param in &func.params {
        if decls[param].storage == Storage::ParamIn {
            removable.insert(param);
        }
    }

    // Everything loaded anywhere in the function stays live.
    let mut loaded = FxHashSet::default();
    collect_loads(func, &func.body, &mut loaded);

    let mut body = std::mem::take(&mut func.body);
    let changed = sweep_block(func, &mut body, &removable, &loaded);
    func.body = body;

    changed
}

fn collect_loads(func: &Function, block: &Block, loaded: &mut FxHashSet<DeclId>) {
    let mut roots = Vec::new();
    collect_roots(block, &mut roots);
    let mut visited = FxHashSet::default();
    let mut stack = roots;
    while let Some(id) = stack.pop() {
        if !visited.insert(id) {
            continue;
        }
        if let ValueKind::Load(decl) = func.values[id].kind {
            loaded.insert(decl);
        }
        stack.extend(func.values[id].kind.operands());
    }
}

/// Value roots referenced by the statements of a block, nested blocks
/// included. Store-path index values count: they are evaluated even when
/// the store's value would otherwise be dead.
fn collect_roots(block: &Block, roots: &mut Vec<crate::hir::ValueId>) {
    for stmt in block.iter() {
        match stmt {
            Stmt::Store { target, value } => {
                roots.push(*value);
                push_target_roots(target, roots);
            }
            Stmt::Call {
                args, out_targets, ..
            } => {
                roots.extend(args.iter().copied());
                for (_, t) in out_targets {
                    push_target_roots(t, roots);
                }
            }
            Stmt::If {
                cond,
                then_block,
                else_block,
            } => {
                roots.push(*cond);
                collect_roots(then_block, roots);
                collect_roots(else_block, roots);
            }
            Stmt::Loop { body, continuing } => {
                collect_roots(body, roots);
                collect_roots(continuing, roots);
            }
            Stmt::Switch { value, cases } => {
                roots.push(*value);
                for case in cases {
                    collect_roots(&case.body, roots);
                }
            }
            Stmt::Return(Some(v)) => roots.push(*v),
            Stmt::Return(None) | Stmt::Break | Stmt::Continue | Stmt::Discard => {}
        }
    }
}

fn push_target_roots(target: &crate::hir::StoreTarget, roots: &mut Vec<crate::hir::ValueId>) {
    for access in &target.path {
        if let Access::Index(v) = access {
            roots.push(*v);
        }
    }
}

fn sweep_block(
    func: &Function,
    block: &mut Block,
    removable: &FxHashSet<DeclId>,
    loaded: &FxHashSet<DeclId>,
) -> bool {
    let mut changed = false;

    // Recurse first so emptied nested blocks are seen below.
    for stmt in block.iter_mut() {
        match stmt {
            Stmt::If {
                then_block,
                else_block,
                ..
            } => {
                changed |= sweep_block(func, then_block, removable, loaded);
                changed |= sweep_block(func, else_block, removable, loaded);
            }
            Stmt::Loop { body, continuing } => {
                changed |= sweep_block(func, body, removable, loaded);
                changed |= sweep_block(func, continuing, removable, loaded);
            }
            Stmt::Switch { cases, .. } => {
                for case in cases.iter_mut() {
                    changed |= sweep_block(func, &mut case.body, removable, loaded);
                }
            }
            _ => {}
        }
    }

    // Statements after an unconditional jump never run.
    if let Some(pos) = block.iter().position(is_terminator) {
        while block.len() > pos + 1 {
            block.remove(block.len() - 1);
            changed = true;
        }
    }

    block.stmts_mut().retain(|stmt| {
        let dead = match stmt {
            Stmt::Store { target, .. } => {
                removable.contains(&target.decl) && !loaded.contains(&target.decl)
            }
            Stmt::If {
                then_block,
                else_block,
                ..
            } => then_block.is_empty() && else_block.is_empty(),
            Stmt::Switch { cases, .. } => cases.iter().all(|c| c.body.is_empty()),
            // A loop whose body immediately breaks never repeats.
            Stmt::Loop { body, continuing } => {
                continuing.is_empty()
                    && body.len() == 1
                    && matches!(body.stmts()[0], Stmt::Break)
            }
            _ => false,
        };
        if dead {
            changed = true;
        }
        !dead
    });

    changed
}

fn is_terminator(stmt: &Stmt) -> bool {
    matches!(
        stmt,
        Stmt::Return(_) | Stmt::Break | Stmt::Continue | Stmt::Discard
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Span;
    use crate::hir::{ConstValue, Declaration, StoreTarget, ValueId};
    use crate::types::TypeInterner;

    fn decl(
        decls: &mut Arena<Declaration>,
        name: &str,
        ty: crate::types::TypeId,
        storage: Storage,
    ) -> DeclId {
        decls.alloc(Declaration {
            name: name.into(),
            ty,
            storage,
            precision: None,
            init: None,
            builtin: false,
            span: Span::default(),
        })
    }

    fn const_val(func: &mut Function, v: f32, ty: crate::types::TypeId) -> ValueId {
        func.add_value(
            ValueKind::Constant(ConstValue::Float(v)),
            ty,
            Span::default(),
        )
    }

    #[test]
    fn test_unread_local_store_removed() {
        let types = TypeInterner::new();
        let float = types.float();
        let mut decls = Arena::new();
        let x = decl(&mut decls, "x", float, Storage::Local);

        let mut func = Function::new("main", types.void(), Span::default());
        func.locals.push(x);
        let v = const_val(&mut func, 3.0, float);
        func.body.push(Stmt::Store {
            target: StoreTarget::whole(x),
            value: v,
        });
        func.body.push(Stmt::Return(None));

        assert!(run_on_function(&mut func, &decls));
        assert_eq!(func.body.stmts(), &[Stmt::Return(None)]);
    }

    #[test]
    fn test_output_store_kept() {
        let types = TypeInterner::new();
        let float = types.float();
        let mut decls = Arena::new();
        let out = decl(&mut decls, "vColor", float, Storage::Output);

        let mut func = Function::new("main", types.void(), Span::default());
        let v = const_val(&mut func, 1.0, float);
        func.body.push(Stmt::Store {
            target: StoreTarget::whole(out),
            value: v,
        });
        func.body.push(Stmt::Return(None));

        assert!(!run_on_function(&mut func, &decls));
        assert_eq!(func.body.len(), 2);
    }

    #[test]
    fn test_loaded_local_store_kept() {
        let types = TypeInterner::new();
        let float = types.float();
        let mut decls = Arena::new();
        let x = decl(&mut decls, "x", float, Storage::Local);

        let mut func = Function::new("f", float, Span::default());
        func.locals.push(x);
        let v = const_val(&mut func, 3.0, float);
        let load = func.add_value(ValueKind::Load(x), float, Span::default());
        func.body.push(Stmt::Store {
            target: StoreTarget::whole(x),
            value: v,
        });
        func.body.push(Stmt::Return(Some(load)));

        assert!(!run_on_function(&mut func, &decls));
        assert_eq!(func.body.len(), 2);
    }

    #[test]
    fn test_unreachable_after_return_removed() {
        let types = TypeInterner::new();
        let float = types.float();
        let mut decls = Arena::new();
        let out = decl(&mut decls, "o", float, Storage::Output);

        let mut func = Function::new("f", types.void(), Span::default());
        let v = const_val(&mut func, 1.0, float);
        func.body.push(Stmt::Return(None));
        func.body.push(Stmt::Store {
            target: StoreTarget::whole(out),
            value: v,
        });

        assert!(run_on_function(&mut func, &decls));
        assert_eq!(func.body.stmts(), &[Stmt::Return(None)]);
    }

    #[test]
    fn test_empty_if_removed() {
        let types = TypeInterner::new();
        let mut decls = Arena::new();
        let _ = &mut decls;

        let mut func = Function::new("f", types.void(), Span::default());
        let cond = func.add_value(
            ValueKind::Constant(ConstValue::Bool(true)),
            types.bool(),
            Span::default(),
        );
        func.body.push(Stmt::If {
            cond,
            then_block: Block::new(),
            else_block: Block::new(),
        });
        func.body.push(Stmt::Return(None));

        assert!(run_on_function(&mut func, &decls));
        assert_eq!(func.body.stmts(), &[Stmt::Return(None)]);
    }
}
