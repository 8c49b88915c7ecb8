//! Function inlining pass.
//!
//! Replaces calls to small leaf functions — a body that is exactly one
//! `return` — with the callee's value graph, rewriting parameter loads to
//! the call's arguments. Callees with out/inout parameters, bigger bodies,
//! or any call of their own (which also rules out recursion, however it
//! might arise) are left alone.

use crate::hir::{
    Block, DeclId, Function, Module, Stmt, Value, ValueId, ValueKind,
};
use crate::types::TypeInterner;
use rustc_hash::FxHashMap;

use super::Pass;

#[derive(Debug)]
pub struct FunctionInlining {
    /// Callees with more value nodes than this stay out of line.
    pub max_callee_size: usize,
}

impl Default for FunctionInlining {
    fn default() -> Self {
        Self {
            max_callee_size: 64,
        }
    }
}

impl Pass for FunctionInlining {
    fn name(&self) -> &'static str {
        "inline"
    }

    fn run(&self, module: &mut Module, _types: &TypeInterner) -> bool {
        let mut changed = false;
        for caller in 0..module.functions.len() {
            // Snapshot eligible callees first; the borrow on the caller
            // below would otherwise pin the whole function list.
            let mut snapshots: FxHashMap<u32, CalleeSnapshot> = FxHashMap::default();
            collect_callees(&module.functions[caller].body, &module.functions, self, &mut snapshots);
            if snapshots.is_empty() {
                continue;
            }

            let func = &mut module.functions[caller];
            let mut body = std::mem::take(&mut func.body);
            changed |= inline_in_block(&mut body, &mut func.values, &snapshots);
            func.body = body;
        }
        changed
    }
}

/// The parts of a callee needed to splice it into a caller.
struct CalleeSnapshot {
    params: Vec<DeclId>,
    values: Vec<(ValueId, Value)>,
    /// Root of the returned expression; `None` for a bare `return;`.
    result: Option<ValueId>,
}

fn collect_callees(
    block: &Block,
    functions: &[Function],
    config: &FunctionInlining,
    out: &mut FxHashMap<u32, CalleeSnapshot>,
) {
    for stmt in block.iter() {
        match stmt {
            Stmt::Call {
                function,
                out_targets,
                ..
            } => {
                if !out_targets.is_empty() || out.contains_key(&function.0) {
                    continue;
                }
                if let Some(snapshot) = snapshot_callee(&functions[function.index()], config) {
                    out.insert(function.0, snapshot);
                }
            }
            Stmt::If {
                then_block,
                else_block,
                ..
            } => {
                collect_callees(then_block, functions, config, out);
                collect_callees(else_block, functions, config, out);
            }
            Stmt::Loop { body, continuing } => {
                collect_callees(body, functions, config, out);
                collect_callees(continuing, functions, config, out);
            }
            Stmt::Switch { cases, .. } => {
                for case in cases {
                    collect_callees(&case.body, functions, config, out);
                }
            }
            _ => {}
        }
    }
}

/// A callee qualifies when its body is a single `return` and small enough.
fn snapshot_callee(callee: &Function, config: &FunctionInlining) -> Option<CalleeSnapshot> {
    if callee.size() > config.max_callee_size {
        return None;
    }
    if callee.body.len() != 1 {
        return None;
    }
    let result = match callee.body.stmts().first() {
        Some(Stmt::Return(value)) => *value,
        _ => return None,
    };
    Some(CalleeSnapshot {
        params: callee.params.clone(),
        values: callee.values.iter().map(|(id, v)| (id, v.clone())).collect(),
        result,
    })
}

fn inline_in_block(
    block: &mut Block,
    values: &mut id_arena::Arena<Value>,
    snapshots: &FxHashMap<u32, CalleeSnapshot>,
) -> bool {
    let mut changed = false;
    let mut index = 0;
    while index < block.len() {
        let replace = match &block.stmts()[index] {
            Stmt::Call {
                function,
                args,
                out_targets,
                result,
            } if out_targets.is_empty() => snapshots
                .get(&function.0)
                .map(|snap| (args.clone(), *result, snap)),
            _ => None,
        };

        match replace {
            Some((args, result, snapshot)) => {
                let root = splice(snapshot, &args, values);
                if let (Some(result), Some(root)) = (result, root) {
                    values[result].kind = ValueKind::Copy(root);
                }
                block.remove(index);
                changed = true;
                // Do not advance: the next statement shifted into place.
            }
            None => {
                match &mut block.stmts_mut()[index] {
                    Stmt::If {
                        then_block,
                        else_block,
                        ..
                    } => {
                        changed |= inline_in_block(then_block, values, snapshots);
                        changed |= inline_in_block(else_block, values, snapshots);
                    }
                    Stmt::Loop { body, continuing } => {
                        changed |= inline_in_block(body, values, snapshots);
                        changed |= inline_in_block(continuing, values, snapshots);
                    }
                    Stmt::Switch { cases, .. } => {
                        for case in cases.iter_mut() {
                            changed |= inline_in_block(&mut case.body, values, snapshots);
                        }
                    }
                    _ => {}
                }
                index += 1;
            }
        }
    }
    changed
}

/// Copy the callee's return DAG into the caller, mapping parameter loads to
/// the actual arguments. Returns the mapped root.
fn splice(
    snapshot: &CalleeSnapshot,
    args: &[ValueId],
    values: &mut id_arena::Arena<Value>,
) -> Option<ValueId> {
    let root = snapshot.result?;
    let by_id: FxHashMap<ValueId, &Value> =
        snapshot.values.iter().map(|(id, v)| (*id, v)).collect();
    let mut mapping: FxHashMap<ValueId, ValueId> = FxHashMap::default();
    Some(map_value(root, &by_id, snapshot, args, values, &mut mapping))
}

fn map_value(
    id: ValueId,
    by_id: &FxHashMap<ValueId, &Value>,
    snapshot: &CalleeSnapshot,
    args: &[ValueId],
    values: &mut id_arena::Arena<Value>,
    mapping: &mut FxHashMap<ValueId, ValueId>,
) -> ValueId {
    if let Some(&mapped) = mapping.get(&id) {
        return mapped;
    }
    let source = by_id[&id];

    // Parameter loads become the caller's argument values.
    if let ValueKind::Load(decl) = source.kind {
        if let Some(pos) = snapshot.params.iter().position(|&p| p == decl) {
            if let Some(&arg) = args.get(pos) {
                mapping.insert(id, arg);
                return arg;
            }
        }
    }

    let kind = match &source.kind {
        ValueKind::Constant(c) => ValueKind::Constant(c.clone()),
        ValueKind::Load(decl) => ValueKind::Load(*decl),
        ValueKind::Unary { op, operand } => ValueKind::Unary {
            op: *op,
            operand: map_value(*operand, by_id, snapshot, args, values, mapping),
        },
        ValueKind::Binary { op, left, right } => ValueKind::Binary {
            op: *op,
            left: map_value(*left, by_id, snapshot, args, values, mapping),
            right: map_value(*right, by_id, snapshot, args, values, mapping),
        },
        ValueKind::Convert(v) => {
            ValueKind::Convert(map_value(*v, by_id, snapshot, args, values, mapping))
        }
        ValueKind::Copy(v) => {
            ValueKind::Copy(map_value(*v, by_id, snapshot, args, values, mapping))
        }
        ValueKind::Construct(items) => ValueKind::Construct(
            items
                .iter()
                .map(|&v| map_value(v, by_id, snapshot, args, values, mapping))
                .collect(),
        ),
        ValueKind::Swizzle { vector, components } => ValueKind::Swizzle {
            vector: map_value(*vector, by_id, snapshot, args, values, mapping),
            components: components.clone(),
        },
        ValueKind::AccessIndex { base, index } => ValueKind::AccessIndex {
            base: map_value(*base, by_id, snapshot, args, values, mapping),
            index: map_value(*index, by_id, snapshot, args, values, mapping),
        },
        ValueKind::AccessMember { base, member } => ValueKind::AccessMember {
            base: map_value(*base, by_id, snapshot, args, values, mapping),
            member: *member,
        },
        ValueKind::CallBuiltin { name, args: call_args } => ValueKind::CallBuiltin {
            name: name.clone(),
            args: call_args
                .iter()
                .map(|&v| map_value(v, by_id, snapshot, args, values, mapping))
                .collect(),
        },
        // Single-return bodies contain no calls; keep the shape total
        // anyway.
        ValueKind::CallResult(f) => ValueKind::CallResult(*f),
    };

    let new_id = values.alloc(Value {
        kind,
        ty: source.ty,
        span: source.span,
    });
    mapping.insert(id, new_id);
    new_id
}

/// Recursion guard used by eligibility: any call in the callee body (to
/// itself or anything else) disqualifies it. Exposed for the loop pass.
pub(crate) fn has_calls(block: &Block) -> bool {
    block.iter().any(|stmt| match stmt {
        Stmt::Call { .. } => true,
        Stmt::If {
            then_block,
            else_block,
            ..
        } => has_calls(then_block) || has_calls(else_block),
        Stmt::Loop { body, continuing } => has_calls(body) || has_calls(continuing),
        Stmt::Switch { cases, .. } => cases.iter().any(|c| has_calls(&c.body)),
        _ => false,
    })
}
