//! Copy/value propagation pass.
//!
//! Within straight-line statement runs, a load of a variable whose last
//! whole-object store is still in effect is forwarded to the stored value,
//! shrinking the live instruction set and feeding the other passes.
//! Forwarding is killed by any write to a variable the tracked value
//! depends on, by partial stores, and conservatively by calls (a callee
//! can write globals and out-parameters) and by control-flow joins.

use crate::hir::{DeclId, Function, Module, Stmt, StoreTarget, Value, ValueId, ValueKind};
use crate::types::TypeInterner;
use id_arena::Arena;
use rustc_hash::{FxHashMap, FxHashSet};

use super::Pass;

#[derive(Debug)]
pub struct CopyPropagation;

impl Pass for CopyPropagation {
    fn name(&self) -> &'static str {
        "copy-prop"
    }

    fn run(&self, module: &mut Module, _types: &TypeInterner) -> bool {
        let mut changed = false;
        for func in module.functions.iter_mut() {
            changed |= run_on_function(func);
        }
        changed
    }
}

/// Tracked forwarding: variable -> (value, variables that value loads).
type Env = FxHashMap<DeclId, (ValueId, FxHashSet<DeclId>)>;

pub(crate) fn run_on_function(func: &mut Function) -> bool {
    let mut body = std::mem::take(&mut func.body);
    let mut env = Env::default();
    let changed = process_block(&mut body, &mut func.values, &mut env);
    func.body = body;
    changed
}

fn process_block(
    block: &mut crate::hir::Block,
    values: &mut Arena<Value>,
    env: &mut Env,
) -> bool {
    let mut changed = false;
    for stmt in block.iter_mut() {
        match stmt {
            Stmt::Store { target, value } => {
                changed |= rewrite_loads(values, *value, env);
                for root in target_roots(target) {
                    changed |= rewrite_loads(values, root, env);
                }
                let decl = target.decl;
                kill(env, decl);
                if target.is_whole() {
                    let deps = deps_of(values, *value);
                    if !deps.contains(&decl) {
                        env.insert(decl, (*value, deps));
                    }
                }
            }
            Stmt::Call {
                args, out_targets, ..
            } => {
                for &arg in args.iter() {
                    changed |= rewrite_loads(values, arg, env);
                }
                for (_, target) in out_targets.iter() {
                    for root in target_roots(target) {
                        changed |= rewrite_loads(values, root, env);
                    }
                }
                // The callee may write globals and out-parameters.
                env.clear();
            }
            Stmt::If {
                cond,
                then_block,
                else_block,
            } => {
                changed |= rewrite_loads(values, *cond, env);
                let mut then_env = Env::default();
                changed |= process_block(then_block, values, &mut then_env);
                let mut else_env = Env::default();
                changed |= process_block(else_block, values, &mut else_env);
                kill_block_writes(env, then_block);
                kill_block_writes(env, else_block);
            }
            Stmt::Loop { body, continuing } => {
                let mut body_env = Env::default();
                changed |= process_block(body, values, &mut body_env);
                let mut cont_env = Env::default();
                changed |= process_block(continuing, values, &mut cont_env);
                kill_block_writes(env, body);
                kill_block_writes(env, continuing);
            }
            Stmt::Switch { value, cases } => {
                changed |= rewrite_loads(values, *value, env);
                for case in cases.iter_mut() {
                    let mut case_env = Env::default();
                    changed |= process_block(&mut case.body, values, &mut case_env);
                }
                for case in cases.iter() {
                    kill_block_writes(env, &case.body);
                }
            }
            Stmt::Return(Some(v)) => {
                changed |= rewrite_loads(values, *v, env);
            }
            Stmt::Return(None) | Stmt::Break | Stmt::Continue | Stmt::Discard => {}
        }
    }
    changed
}

fn target_roots(target: &StoreTarget) -> Vec<ValueId> {
    target
        .path
        .iter()
        .filter_map(|a| match a {
            crate::hir::Access::Index(v) => Some(*v),
            _ => None,
        })
        .collect()
}

/// Rewrite forwardable loads in the DAG under `root`.
fn rewrite_loads(values: &mut Arena<Value>, root: ValueId, env: &Env) -> bool {
    let mut changed = false;
    let mut visited = FxHashSet::default();
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        if !visited.insert(id) {
            continue;
        }
        if let ValueKind::Load(decl) = values[id].kind {
            if let Some((fwd, _)) = env.get(&decl) {
                values[id].kind = ValueKind::Copy(*fwd);
                changed = true;
                continue;
            }
        }
        stack.extend(values[id].kind.operands());
    }
    changed
}

/// Variables the DAG under `root` loads from.
fn deps_of(values: &Arena<Value>, root: ValueId) -> FxHashSet<DeclId> {
    let mut deps = FxHashSet::default();
    let mut visited = FxHashSet::default();
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        if !visited.insert(id) {
            continue;
        }
        if let ValueKind::Load(decl) = values[id].kind {
            deps.insert(decl);
        }
        stack.extend(values[id].kind.operands());
    }
    deps
}

/// Drop every forwarding invalidated by a write to `decl`.
fn kill(env: &mut Env, decl: DeclId) {
    env.retain(|&k, (_, deps)| k != decl && !deps.contains(&decl));
}

/// Drop forwardings invalidated by anything a nested block writes.
fn kill_block_writes(env: &mut Env, block: &crate::hir::Block) {
    match collect_writes(block) {
        Some(written) => {
            for decl in written {
                kill(env, decl);
            }
        }
        // A call somewhere inside: anything may have changed.
        None => env.clear(),
    }
}

/// All declarations a block (transitively) stores to, or `None` when a
/// call makes the write set unknowable.
pub(crate) fn collect_writes(block: &crate::hir::Block) -> Option<FxHashSet<DeclId>> {
    let mut written = FxHashSet::default();
    collect_writes_into(block, &mut written)?;
    Some(written)
}

fn collect_writes_into(block: &crate::hir::Block, out: &mut FxHashSet<DeclId>) -> Option<()> {
    for stmt in block.iter() {
        match stmt {
            Stmt::Store { target, .. } => {
                out.insert(target.decl);
            }
            Stmt::Call { .. } => return None,
            Stmt::If {
                then_block,
                else_block,
                ..
            } => {
                collect_writes_into(then_block, out)?;
                collect_writes_into(else_block, out)?;
            }
            Stmt::Loop { body, continuing } => {
                collect_writes_into(body, out)?;
                collect_writes_into(continuing, out)?;
            }
            Stmt::Switch { cases, .. } => {
                for case in cases {
                    collect_writes_into(&case.body, out)?;
                }
            }
            _ => {}
        }
    }
    Some(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Span;
    use crate::hir::{Block, ConstValue, Declaration, Storage};
    use crate::types::TypeInterner;

    fn local(decls: &mut Arena<Declaration>, name: &str, ty: crate::types::TypeId) -> DeclId {
        decls.alloc(Declaration {
            name: name.into(),
            ty,
            storage: Storage::Local,
            precision: None,
            init: None,
            builtin: false,
            span: Span::default(),
        })
    }

    #[test]
    fn test_forwards_through_store() {
        let types = TypeInterner::new();
        let float = types.float();
        let mut decls = Arena::new();
        let x = local(&mut decls, "x", float);

        let mut func = Function::new("f", float, Span::default());
        let c = func.add_value(
            ValueKind::Constant(ConstValue::Float(1.0)),
            float,
            Span::default(),
        );
        let load = func.add_value(ValueKind::Load(x), float, Span::default());
        let mut body = Block::new();
        body.push(Stmt::Store {
            target: StoreTarget::whole(x),
            value: c,
        });
        body.push(Stmt::Return(Some(load)));
        func.body = body;

        assert!(run_on_function(&mut func));
        assert_eq!(func.values[load].kind, ValueKind::Copy(c));
        assert_eq!(func.resolve(load), c);
        // Second run is a no-op.
        assert!(!run_on_function(&mut func));
    }

    #[test]
    fn test_killed_by_dependency_write() {
        let types = TypeInterner::new();
        let float = types.float();
        let mut decls = Arena::new();
        let a = local(&mut decls, "a", float);
        let x = local(&mut decls, "x", float);

        // x = a; a = 2.0; return x;  -- the load of x must NOT forward.
        let mut func = Function::new("f", float, Span::default());
        let load_a = func.add_value(ValueKind::Load(a), float, Span::default());
        let two = func.add_value(
            ValueKind::Constant(ConstValue::Float(2.0)),
            float,
            Span::default(),
        );
        let load_x = func.add_value(ValueKind::Load(x), float, Span::default());
        let mut body = Block::new();
        body.push(Stmt::Store {
            target: StoreTarget::whole(x),
            value: load_a,
        });
        body.push(Stmt::Store {
            target: StoreTarget::whole(a),
            value: two,
        });
        body.push(Stmt::Return(Some(load_x)));
        func.body = body;

        run_on_function(&mut func);
        assert_eq!(func.values[load_x].kind, ValueKind::Load(x));
    }

    #[test]
    fn test_self_referential_store_not_forwarded() {
        let types = TypeInterner::new();
        let float = types.float();
        let mut decls = Arena::new();
        let x = local(&mut decls, "x", float);

        // x = x + 1.0; return x;
        let mut func = Function::new("f", float, Span::default());
        let load1 = func.add_value(ValueKind::Load(x), float, Span::default());
        let one = func.add_value(
            ValueKind::Constant(ConstValue::Float(1.0)),
            float,
            Span::default(),
        );
        let sum = func.add_value(
            ValueKind::Binary {
                op: crate::hir::BinaryOp::Add,
                left: load1,
                right: one,
            },
            float,
            Span::default(),
        );
        let load2 = func.add_value(ValueKind::Load(x), float, Span::default());
        let mut body = Block::new();
        body.push(Stmt::Store {
            target: StoreTarget::whole(x),
            value: sum,
        });
        body.push(Stmt::Return(Some(load2)));
        func.body = body;

        run_on_function(&mut func);
        assert_eq!(func.values[load2].kind, ValueKind::Load(x));
    }
}
