//! Loop analysis, with optional unrolling.
//!
//! Recognizes the counted-loop shape lowering produces — a leading
//! `if (!(i <cmp> limit)) break;` header and a latch that steps `i` by a
//! constant — and computes the induction variable and static trip count.
//! Analysis alone rewrites nothing; it feeds eligibility decisions. With
//! `unroll` set, loops with a known trip count within the limit and no
//! other jumps are replicated with the induction variable constant-folded
//! into each copy.

use crate::hir::{
    Access, BinaryOp, Block, ConstValue, DeclId, Function, Module, Stmt, StoreTarget, Value,
    ValueId, ValueKind,
};
use crate::types::{ScalarKind, TypeInterner};
use id_arena::Arena;
use rustc_hash::FxHashMap;

use super::copy_prop::collect_writes;
use super::inline::has_calls;
use super::Pass;

/// What the analysis learned about one loop, in pre-order encounter order.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopInfo {
    pub induction: Option<DeclId>,
    /// Statically determined iteration count, when the bounds are constant.
    pub trip_count: Option<u32>,
    /// `break` anywhere beyond the header check.
    pub has_break: bool,
    pub has_continue: bool,
    /// Safe and meaningful to replicate the body.
    pub unrollable: bool,
}

#[derive(Debug)]
pub struct LoopAnalysis {
    /// Rewrite eligible loops; analysis only when false.
    pub unroll: bool,
    /// Never unroll past this many iterations.
    pub limit: u32,
}

impl Pass for LoopAnalysis {
    fn name(&self) -> &'static str {
        "loop-analysis"
    }

    fn run(&self, module: &mut Module, types: &TypeInterner) -> bool {
        if !self.unroll {
            return false;
        }
        let decls = &module.decls;
        let mut changed = false;
        for func in module.functions.iter_mut() {
            let mut body = std::mem::take(&mut func.body);
            let mut env = FxHashMap::default();
            changed |= unroll_in_block(
                &mut body,
                &mut func.values,
                decls,
                types,
                self.limit,
                &mut env,
            );
            func.body = body;
        }
        changed
    }
}

/// Analyze every loop in a function without rewriting anything.
pub fn analyze_loops(func: &Function) -> Vec<LoopInfo> {
    let mut out = Vec::new();
    let mut env = FxHashMap::default();
    analyze_block(&func.body, &func.values, &mut env, &mut out);
    out
}

type ConstEnv = FxHashMap<DeclId, i64>;

fn analyze_block(
    block: &Block,
    values: &Arena<Value>,
    env: &mut ConstEnv,
    out: &mut Vec<LoopInfo>,
) {
    for stmt in block.iter() {
        match stmt {
            Stmt::Loop { body, continuing } => {
                out.push(describe_loop(values, body, continuing, env));
                let mut inner = env.clone();
                analyze_block(body, values, &mut inner, out);
                analyze_block(continuing, values, &mut inner, out);
                invalidate(env, body);
                invalidate(env, continuing);
            }
            Stmt::If {
                then_block,
                else_block,
                ..
            } => {
                let mut t = env.clone();
                analyze_block(then_block, values, &mut t, out);
                let mut e = env.clone();
                analyze_block(else_block, values, &mut e, out);
                invalidate(env, then_block);
                invalidate(env, else_block);
            }
            Stmt::Switch { cases, .. } => {
                for case in cases {
                    let mut c = env.clone();
                    analyze_block(&case.body, values, &mut c, out);
                }
                for case in cases {
                    invalidate(env, &case.body);
                }
            }
            other => apply_env_effect(other, values, env),
        }
    }
}

fn apply_env_effect(stmt: &Stmt, values: &Arena<Value>, env: &mut ConstEnv) {
    match stmt {
        Stmt::Store { target, value } => {
            if target.is_whole() {
                match const_i64(values, *value) {
                    Some(v) => {
                        env.insert(target.decl, v);
                    }
                    None => {
                        env.remove(&target.decl);
                    }
                }
            } else {
                env.remove(&target.decl);
            }
        }
        Stmt::Call { .. } => env.clear(),
        _ => {}
    }
}

fn invalidate(env: &mut ConstEnv, block: &Block) {
    match collect_writes(block) {
        Some(written) => {
            for decl in written {
                env.remove(&decl);
            }
        }
        None => env.clear(),
    }
}

fn const_i64(values: &Arena<Value>, id: ValueId) -> Option<i64> {
    let mut id = id;
    while let ValueKind::Copy(inner) = values[id].kind {
        id = inner;
    }
    match &values[id].kind {
        ValueKind::Constant(c) => c.as_i64(),
        _ => None,
    }
}

/// The counted-loop shape produced by lowering.
struct CountedLoop {
    induction: DeclId,
    start: i64,
    trip_count: u32,
}

fn describe_loop(
    values: &Arena<Value>,
    body: &Block,
    continuing: &Block,
    env: &ConstEnv,
) -> LoopInfo {
    let counted = match_counted_loop(values, body, continuing, env);
    let has_break = jumps_in(body, true, 1) || jumps_in(continuing, true, 0);
    let has_continue = jumps_in(body, false, 1) || jumps_in(continuing, false, 0);
    let unrollable = counted.is_some()
        && !has_break
        && !has_continue
        && !has_calls(body)
        && !has_calls(continuing);
    LoopInfo {
        induction: counted.as_ref().map(|c| c.induction),
        trip_count: counted.as_ref().map(|c| c.trip_count),
        has_break,
        has_continue,
        unrollable,
    }
}

/// Break/continue scanning that ignores the header check (`skip` leading
/// statements) and does not descend into nested loops, whose jumps target
/// the nested construct.
fn jumps_in(block: &Block, breaks: bool, skip: usize) -> bool {
    block.iter().skip(skip).any(|stmt| match stmt {
        Stmt::Break => breaks,
        Stmt::Continue => !breaks,
        Stmt::If {
            then_block,
            else_block,
            ..
        } => jumps_in(then_block, breaks, 0) || jumps_in(else_block, breaks, 0),
        // `break` inside a switch exits the switch, not the loop.
        Stmt::Switch { cases, .. } if !breaks => {
            cases.iter().any(|c| jumps_in(&c.body, breaks, 0))
        }
        _ => false,
    })
}

fn match_counted_loop(
    values: &Arena<Value>,
    body: &Block,
    continuing: &Block,
    env: &ConstEnv,
) -> Option<CountedLoop> {
    // Header: if (!(load i <cmp> const)) { break; }
    let Some(Stmt::If {
        cond,
        then_block,
        else_block,
    }) = body.stmts().first()
    else {
        return None;
    };
    if !(then_block.len() == 1
        && matches!(then_block.stmts()[0], Stmt::Break)
        && else_block.is_empty())
    {
        return None;
    }
    let ValueKind::Unary {
        op: crate::hir::UnaryOp::Not,
        operand,
    } = values[resolve(values, *cond)].kind
    else {
        return None;
    };
    let ValueKind::Binary { op, left, right } = values[resolve(values, operand)].kind else {
        return None;
    };
    if !matches!(
        op,
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge | BinaryOp::Ne
    ) {
        return None;
    }
    let ValueKind::Load(induction) = values[resolve(values, left)].kind else {
        return None;
    };
    let limit = const_i64(values, right)?;

    // Latch: i = i (+|-) step, directly or through the snapshot shape the
    // postfix operators leave behind.
    let step = match_step(values, continuing, induction)?;
    let start = *env.get(&induction)?;

    let trip_count = simulate(start, limit, op, step)?;
    Some(CountedLoop {
        induction,
        start,
        trip_count,
    })
}

fn match_step(values: &Arena<Value>, continuing: &Block, induction: DeclId) -> Option<i64> {
    let step_of = |value: ValueId, expect_load_of: DeclId| -> Option<i64> {
        let ValueKind::Binary { op, left, right } = values[resolve(values, value)].kind else {
            return None;
        };
        let ValueKind::Load(loaded) = values[resolve(values, left)].kind else {
            return None;
        };
        if loaded != expect_load_of {
            return None;
        }
        let step = const_i64(values, right)?;
        match op {
            BinaryOp::Add => Some(step),
            BinaryOp::Sub => Some(-step),
            _ => None,
        }
    };

    match continuing.stmts() {
        [Stmt::Store { target, value }] if target.is_whole() && target.decl == induction => {
            step_of(*value, induction)
        }
        // Snapshot form: $tmp = i; i = $tmp + step;
        [Stmt::Store {
            target: snap_target,
            value: snap_value,
        }, Stmt::Store { target, value }]
            if snap_target.is_whole()
                && target.is_whole()
                && target.decl == induction =>
        {
            let ValueKind::Load(loaded) = values[resolve(values, *snap_value)].kind else {
                return None;
            };
            if loaded != induction {
                return None;
            }
            step_of(*value, snap_target.decl)
        }
        _ => None,
    }
}

fn resolve(values: &Arena<Value>, mut id: ValueId) -> ValueId {
    while let ValueKind::Copy(inner) = values[id].kind {
        id = inner;
    }
    id
}

/// Walk the loop forward to count iterations; bail out past a sanity bound
/// so a degenerate loop cannot stall compilation.
fn simulate(start: i64, limit: i64, op: BinaryOp, step: i64) -> Option<u32> {
    const MAX_SIMULATED: u32 = 1 << 16;
    if step == 0 {
        return None;
    }
    let keep_going = |v: i64| match op {
        BinaryOp::Lt => v < limit,
        BinaryOp::Le => v <= limit,
        BinaryOp::Gt => v > limit,
        BinaryOp::Ge => v >= limit,
        BinaryOp::Ne => v != limit,
        _ => false,
    };
    let mut v = start;
    let mut count = 0u32;
    while keep_going(v) {
        count += 1;
        if count > MAX_SIMULATED {
            return None;
        }
        v = v.checked_add(step)?;
    }
    Some(count)
}

// ==================== UNROLLING ====================

fn unroll_in_block(
    block: &mut Block,
    values: &mut Arena<Value>,
    decls: &Arena<crate::hir::Declaration>,
    types: &TypeInterner,
    limit: u32,
    env: &mut ConstEnv,
) -> bool {
    let mut changed = false;
    let mut index = 0;
    while index < block.len() {
        let unrolled = match &block.stmts()[index] {
            Stmt::Loop { body, continuing } => {
                let info = describe_loop(values, body, continuing, env);
                match (info.unrollable, match_counted_loop(values, body, continuing, env)) {
                    (true, Some(counted)) if counted.trip_count <= limit => {
                        Some(expand_loop(body, continuing, &counted, values, decls, types))
                    }
                    _ => None,
                }
            }
            _ => None,
        };

        match unrolled {
            Some(replacement) => {
                block.remove(index);
                for (offset, stmt) in replacement.into_iter().enumerate() {
                    block.insert(index + offset, stmt);
                }
                changed = true;
                // Reprocess from the same position: replacement statements
                // are plain stores with no loops inside.
            }
            None => {
                match &mut block.stmts_mut()[index] {
                    Stmt::Loop { body, continuing } => {
                        let mut inner = ConstEnv::default();
                        changed |=
                            unroll_in_block(body, values, decls, types, limit, &mut inner);
                        changed |=
                            unroll_in_block(continuing, values, decls, types, limit, &mut inner);
                    }
                    Stmt::If {
                        then_block,
                        else_block,
                        ..
                    } => {
                        let mut t = env.clone();
                        changed |=
                            unroll_in_block(then_block, values, decls, types, limit, &mut t);
                        let mut e = env.clone();
                        changed |=
                            unroll_in_block(else_block, values, decls, types, limit, &mut e);
                    }
                    Stmt::Switch { cases, .. } => {
                        for case in cases.iter_mut() {
                            let mut c = env.clone();
                            changed |= unroll_in_block(
                                &mut case.body,
                                values,
                                decls,
                                types,
                                limit,
                                &mut c,
                            );
                        }
                    }
                    _ => {}
                }
                // With the mutable borrow released, account for what the
                // statement does to the tracked constants.
                match &block.stmts()[index] {
                    Stmt::Loop { body, continuing } => {
                        invalidate(env, body);
                        invalidate(env, continuing);
                    }
                    Stmt::If {
                        then_block,
                        else_block,
                        ..
                    } => {
                        invalidate(env, then_block);
                        invalidate(env, else_block);
                    }
                    Stmt::Switch { cases, .. } => {
                        for case in cases {
                            invalidate(env, &case.body);
                        }
                    }
                    other => apply_env_effect(other, values, env),
                }
                index += 1;
            }
        }
    }
    changed
}

/// Replicate the loop body once per iteration with the induction variable
/// pinned to its value, then store its final value for any use after the
/// loop.
fn expand_loop(
    body: &Block,
    continuing: &Block,
    counted: &CountedLoop,
    values: &mut Arena<Value>,
    decls: &Arena<crate::hir::Declaration>,
    types: &TypeInterner,
) -> Vec<Stmt> {
    // Recover the per-iteration step from the latch to advance the value.
    let step = match_step(values, continuing, counted.induction).unwrap_or(1);

    let make_const = |values: &mut Arena<Value>, v: i64| -> ValueId {
        let decl = &decls[counted.induction];
        let (c, ty) = match types.scalar_kind(decl.ty) {
            Some(ScalarKind::UInt) => (ConstValue::UInt(v as u32), decl.ty),
            _ => (ConstValue::Int(v as i32), decl.ty),
        };
        values.alloc(Value {
            kind: ValueKind::Constant(c),
            ty,
            span: decl.span,
        })
    };

    // Skip the header check (statement 0); the trip count already encodes
    // it.
    let template: Vec<Stmt> = body.stmts()[1..].to_vec();
    let mut out = Vec::new();
    let mut v = counted.start;
    for _ in 0..counted.trip_count {
        let pinned = make_const(values, v);
        let mut mapping = FxHashMap::default();
        for stmt in &template {
            out.push(clone_stmt(stmt, values, counted.induction, pinned, &mut mapping));
        }
        v += step;
    }

    // The induction variable's final value stays observable.
    let final_value = make_const(values, v);
    out.push(Stmt::Store {
        target: StoreTarget::whole(counted.induction),
        value: final_value,
    });
    out
}

fn clone_stmt(
    stmt: &Stmt,
    values: &mut Arena<Value>,
    induction: DeclId,
    pinned: ValueId,
    mapping: &mut FxHashMap<ValueId, ValueId>,
) -> Stmt {
    let clone_v =
        |values: &mut Arena<Value>, id: ValueId, mapping: &mut FxHashMap<ValueId, ValueId>| {
            clone_value(values, id, induction, pinned, mapping)
        };
    match stmt {
        Stmt::Store { target, value } => Stmt::Store {
            target: clone_target(target, values, induction, pinned, mapping),
            value: clone_v(values, *value, mapping),
        },
        Stmt::If {
            cond,
            then_block,
            else_block,
        } => Stmt::If {
            cond: clone_v(values, *cond, mapping),
            then_block: clone_block(then_block, values, induction, pinned, mapping),
            else_block: clone_block(else_block, values, induction, pinned, mapping),
        },
        Stmt::Loop { body, continuing } => Stmt::Loop {
            body: clone_block(body, values, induction, pinned, mapping),
            continuing: clone_block(continuing, values, induction, pinned, mapping),
        },
        Stmt::Switch { value, cases } => Stmt::Switch {
            value: clone_v(values, *value, mapping),
            cases: cases
                .iter()
                .map(|c| crate::hir::SwitchCase {
                    labels: c.labels.clone(),
                    body: clone_block(&c.body, values, induction, pinned, mapping),
                })
                .collect(),
        },
        Stmt::Return(v) => Stmt::Return(v.map(|v| clone_v(values, v, mapping))),
        Stmt::Break => Stmt::Break,
        Stmt::Continue => Stmt::Continue,
        Stmt::Discard => Stmt::Discard,
        // Calls are excluded by eligibility; keep the arm total.
        Stmt::Call {
            function,
            args,
            out_targets,
            result,
        } => Stmt::Call {
            function: *function,
            args: args
                .iter()
                .map(|&a| clone_v(values, a, mapping))
                .collect(),
            out_targets: out_targets
                .iter()
                .map(|(i, t)| (*i, clone_target(t, values, induction, pinned, mapping)))
                .collect(),
            result: *result,
        },
    }
}

fn clone_block(
    block: &Block,
    values: &mut Arena<Value>,
    induction: DeclId,
    pinned: ValueId,
    mapping: &mut FxHashMap<ValueId, ValueId>,
) -> Block {
    block
        .iter()
        .map(|stmt| clone_stmt(stmt, values, induction, pinned, mapping))
        .collect()
}

fn clone_target(
    target: &StoreTarget,
    values: &mut Arena<Value>,
    induction: DeclId,
    pinned: ValueId,
    mapping: &mut FxHashMap<ValueId, ValueId>,
) -> StoreTarget {
    StoreTarget {
        decl: target.decl,
        path: target
            .path
            .iter()
            .map(|a| match a {
                Access::Index(v) => {
                    Access::Index(clone_value(values, *v, induction, pinned, mapping))
                }
                other => other.clone(),
            })
            .collect(),
    }
}

fn clone_value(
    values: &mut Arena<Value>,
    id: ValueId,
    induction: DeclId,
    pinned: ValueId,
    mapping: &mut FxHashMap<ValueId, ValueId>,
) -> ValueId {
    if let Some(&mapped) = mapping.get(&id) {
        return mapped;
    }
    let source = values[id].clone();

    if let ValueKind::Load(decl) = source.kind {
        if decl == induction {
            mapping.insert(id, pinned);
            return pinned;
        }
    }

    let kind = match source.kind {
        ValueKind::Constant(c) => ValueKind::Constant(c),
        ValueKind::Load(d) => ValueKind::Load(d),
        ValueKind::CallResult(f) => ValueKind::CallResult(f),
        ValueKind::Unary { op, operand } => ValueKind::Unary {
            op,
            operand: clone_value(values, operand, induction, pinned, mapping),
        },
        ValueKind::Binary { op, left, right } => ValueKind::Binary {
            op,
            left: clone_value(values, left, induction, pinned, mapping),
            right: clone_value(values, right, induction, pinned, mapping),
        },
        ValueKind::Convert(v) => {
            ValueKind::Convert(clone_value(values, v, induction, pinned, mapping))
        }
        ValueKind::Copy(v) => {
            ValueKind::Copy(clone_value(values, v, induction, pinned, mapping))
        }
        ValueKind::Construct(args) => ValueKind::Construct(
            args.iter()
                .map(|&a| clone_value(values, a, induction, pinned, mapping))
                .collect(),
        ),
        ValueKind::Swizzle { vector, components } => ValueKind::Swizzle {
            vector: clone_value(values, vector, induction, pinned, mapping),
            components,
        },
        ValueKind::AccessIndex { base, index } => ValueKind::AccessIndex {
            base: clone_value(values, base, induction, pinned, mapping),
            index: clone_value(values, index, induction, pinned, mapping),
        },
        ValueKind::AccessMember { base, member } => ValueKind::AccessMember {
            base: clone_value(values, base, induction, pinned, mapping),
            member,
        },
        ValueKind::CallBuiltin { name, args } => ValueKind::CallBuiltin {
            name,
            args: args
                .iter()
                .map(|&a| clone_value(values, a, induction, pinned, mapping))
                .collect(),
        },
    };

    let new_id = values.alloc(Value {
        kind,
        ty: source.ty,
        span: source.span,
    });
    mapping.insert(id, new_id);
    new_id
}
