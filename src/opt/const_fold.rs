//! Constant folding pass.
//!
//! Replaces operations whose operands are all compile-time constants with a
//! single constant, using the language's exact numeric semantics: wrapping
//! 32-bit integers and IEEE f32 floats, NaN and infinity included. Integer
//! division by zero is left unfolded. Loads of `const`-qualified
//! declarations with known initializers fold too, which is what lets
//! `const`-driven expressions collapse across passes.

use crate::hir::{
    BinaryOp, ConstValue, Declaration, Function, Module, UnaryOp, Value, ValueId, ValueKind,
};
use crate::types::{Type, TypeInterner};
use id_arena::Arena;

use super::Pass;

#[derive(Debug)]
pub struct ConstantFolding;

impl Pass for ConstantFolding {
    fn name(&self) -> &'static str {
        "const-fold"
    }

    fn run(&self, module: &mut Module, types: &TypeInterner) -> bool {
        let decls = &module.decls;
        let mut changed = false;
        for func in module.functions.iter_mut() {
            changed |= run_on_function(func, decls, types);
        }
        changed
    }
}

pub(crate) fn run_on_function(
    func: &mut Function,
    decls: &Arena<Declaration>,
    types: &TypeInterner,
) -> bool {
    let mut changed = false;
    // Arena order puts operands before users, so one in-order sweep
    // cascades: `(1+2)+3` folds completely in a single run.
    let ids: Vec<ValueId> = func.values.iter().map(|(id, _)| id).collect();

    for id in ids {
        let node_ty = func.values[id].ty;
        let replacement = match &func.values[id].kind {
            ValueKind::Constant(_) => None,
            ValueKind::Load(decl) => {
                let d = &decls[*decl];
                if d.storage == crate::hir::Storage::Const {
                    d.init.clone()
                } else {
                    None
                }
            }
            ValueKind::Unary { op, operand } => {
                const_of(func, *operand).and_then(|v| fold_unary(*op, &v))
            }
            ValueKind::Binary { op, left, right } => {
                match (const_of(func, *left), const_of(func, *right)) {
                    (Some(l), Some(r)) => fold_binary(*op, &l, &r),
                    _ => None,
                }
            }
            ValueKind::Convert(v) => const_of(func, *v)
                .and_then(|c| convert_const(&c, &types.get(node_ty))),
            ValueKind::Construct(args) => {
                let consts: Option<Vec<ConstValue>> =
                    args.iter().map(|&a| const_of(func, a)).collect();
                consts.and_then(|consts| fold_construct(&consts, &types.get(node_ty)))
            }
            ValueKind::Swizzle { vector, components } => {
                const_of(func, *vector).and_then(|v| match v {
                    ConstValue::Vector(elems) => {
                        let picked: Option<Vec<ConstValue>> = components
                            .iter()
                            .map(|&lane| elems.get(lane as usize).cloned())
                            .collect();
                        picked.map(|p| {
                            if p.len() == 1 {
                                p.into_iter().next().expect("length checked")
                            } else {
                                ConstValue::Vector(p)
                            }
                        })
                    }
                    _ => None,
                })
            }
            ValueKind::AccessIndex { base, index } => {
                match (const_of(func, *base), const_of(func, *index)) {
                    (Some(base), Some(index)) => {
                        index.as_i64().and_then(|i| fold_index(&base, i))
                    }
                    _ => None,
                }
            }
            ValueKind::CallBuiltin { name, args } => {
                let consts: Option<Vec<ConstValue>> =
                    args.iter().map(|&a| const_of(func, a)).collect();
                consts.and_then(|consts| fold_builtin(name, &consts))
            }
            ValueKind::AccessMember { .. }
            | ValueKind::CallResult(_)
            | ValueKind::Copy(_) => None,
        };

        if let Some(c) = replacement {
            let span = func.values[id].span;
            func.values[id] = Value {
                kind: ValueKind::Constant(c),
                ty: node_ty,
                span,
            };
            changed = true;
        }
    }
    changed
}

/// Constant behind a value, following `Copy` forwarding.
fn const_of(func: &Function, v: ValueId) -> Option<ConstValue> {
    match &func.values[func.resolve(v)].kind {
        ValueKind::Constant(c) => Some(c.clone()),
        _ => None,
    }
}

fn fold_unary(op: UnaryOp, v: &ConstValue) -> Option<ConstValue> {
    match v {
        ConstValue::Vector(elems) => {
            let folded: Option<Vec<ConstValue>> =
                elems.iter().map(|e| fold_unary(op, e)).collect();
            folded.map(ConstValue::Vector)
        }
        ConstValue::Matrix { cols, rows, elems } if op == UnaryOp::Neg => {
            Some(ConstValue::Matrix {
                cols: *cols,
                rows: *rows,
                elems: elems.iter().map(|e| -e).collect(),
            })
        }
        ConstValue::Int(v) => match op {
            UnaryOp::Neg => Some(ConstValue::Int(v.wrapping_neg())),
            UnaryOp::BitNot => Some(ConstValue::Int(!v)),
            UnaryOp::Not => None,
        },
        ConstValue::UInt(v) => match op {
            UnaryOp::Neg => Some(ConstValue::UInt(v.wrapping_neg())),
            UnaryOp::BitNot => Some(ConstValue::UInt(!v)),
            UnaryOp::Not => None,
        },
        ConstValue::Float(v) => match op {
            UnaryOp::Neg => Some(ConstValue::Float(-v)),
            _ => None,
        },
        ConstValue::Bool(v) => match op {
            UnaryOp::Not => Some(ConstValue::Bool(!v)),
            _ => None,
        },
        _ => None,
    }
}

pub(crate) fn fold_binary(op: BinaryOp, l: &ConstValue, r: &ConstValue) -> Option<ConstValue> {
    use ConstValue::*;
    match (l, r) {
        // Whole-object equality for vectors and matrices.
        (Vector(_), Vector(_)) | (Matrix { .. }, Matrix { .. })
            if matches!(op, BinaryOp::Eq | BinaryOp::Ne) =>
        {
            let eq = l == r;
            Some(Bool(if op == BinaryOp::Eq { eq } else { !eq }))
        }
        (Vector(a), Vector(b)) => {
            if a.len() != b.len() {
                return None;
            }
            let folded: Option<Vec<ConstValue>> = a
                .iter()
                .zip(b)
                .map(|(x, y)| fold_binary(op, x, y))
                .collect();
            folded.map(Vector)
        }
        (Vector(a), scalar) if scalar.is_scalar() => {
            let folded: Option<Vec<ConstValue>> =
                a.iter().map(|x| fold_binary(op, x, scalar)).collect();
            folded.map(Vector)
        }
        (scalar, Vector(b)) if scalar.is_scalar() => {
            let folded: Option<Vec<ConstValue>> =
                b.iter().map(|y| fold_binary(op, scalar, y)).collect();
            folded.map(Vector)
        }
        (
            Matrix { cols, rows, elems },
            Matrix {
                cols: c2,
                rows: r2,
                elems: e2,
            },
        ) if matches!(op, BinaryOp::Add | BinaryOp::Sub)
            && cols == c2
            && rows == r2 =>
        {
            let elems = elems
                .iter()
                .zip(e2)
                .map(|(a, b)| match op {
                    BinaryOp::Add => a + b,
                    _ => a - b,
                })
                .collect();
            Some(Matrix {
                cols: *cols,
                rows: *rows,
                elems,
            })
        }
        (Matrix { cols, rows, elems }, Float(s))
            if matches!(op, BinaryOp::Mul | BinaryOp::Div) =>
        {
            let elems = elems
                .iter()
                .map(|a| if op == BinaryOp::Mul { a * s } else { a / s })
                .collect();
            Some(Matrix {
                cols: *cols,
                rows: *rows,
                elems,
            })
        }
        (Float(s), Matrix { cols, rows, elems }) if op == BinaryOp::Mul => {
            Some(Matrix {
                cols: *cols,
                rows: *rows,
                elems: elems.iter().map(|a| s * a).collect(),
            })
        }
        (Int(a), Int(b)) => fold_int(op, *a, *b),
        (UInt(a), UInt(b)) => fold_uint(op, *a, *b),
        (Float(a), Float(b)) => fold_float(op, *a, *b),
        (Bool(a), Bool(b)) => fold_bool(op, *a, *b),
        _ => None,
    }
}

fn fold_int(op: BinaryOp, a: i32, b: i32) -> Option<ConstValue> {
    use ConstValue::{Bool, Int};
    Some(match op {
        BinaryOp::Add => Int(a.wrapping_add(b)),
        BinaryOp::Sub => Int(a.wrapping_sub(b)),
        BinaryOp::Mul => Int(a.wrapping_mul(b)),
        BinaryOp::Div if b != 0 => Int(a.wrapping_div(b)),
        BinaryOp::Rem if b != 0 => Int(a.wrapping_rem(b)),
        BinaryOp::Shl => Int(a.wrapping_shl(b as u32)),
        BinaryOp::Shr => Int(a.wrapping_shr(b as u32)),
        BinaryOp::BitAnd => Int(a & b),
        BinaryOp::BitXor => Int(a ^ b),
        BinaryOp::BitOr => Int(a | b),
        BinaryOp::Lt => Bool(a < b),
        BinaryOp::Gt => Bool(a > b),
        BinaryOp::Le => Bool(a <= b),
        BinaryOp::Ge => Bool(a >= b),
        BinaryOp::Eq => Bool(a == b),
        BinaryOp::Ne => Bool(a != b),
        _ => return None,
    })
}

fn fold_uint(op: BinaryOp, a: u32, b: u32) -> Option<ConstValue> {
    use ConstValue::{Bool, UInt};
    Some(match op {
        BinaryOp::Add => UInt(a.wrapping_add(b)),
        BinaryOp::Sub => UInt(a.wrapping_sub(b)),
        BinaryOp::Mul => UInt(a.wrapping_mul(b)),
        BinaryOp::Div if b != 0 => UInt(a / b),
        BinaryOp::Rem if b != 0 => UInt(a % b),
        BinaryOp::Shl => UInt(a.wrapping_shl(b)),
        BinaryOp::Shr => UInt(a.wrapping_shr(b)),
        BinaryOp::BitAnd => UInt(a & b),
        BinaryOp::BitXor => UInt(a ^ b),
        BinaryOp::BitOr => UInt(a | b),
        BinaryOp::Lt => Bool(a < b),
        BinaryOp::Gt => Bool(a > b),
        BinaryOp::Le => Bool(a <= b),
        BinaryOp::Ge => Bool(a >= b),
        BinaryOp::Eq => Bool(a == b),
        BinaryOp::Ne => Bool(a != b),
        _ => return None,
    })
}

fn fold_float(op: BinaryOp, a: f32, b: f32) -> Option<ConstValue> {
    use ConstValue::{Bool, Float};
    // IEEE semantics throughout: 1.0/0.0 folds to infinity, 0.0/0.0 to
    // NaN. Nothing here is allowed to turn a NaN into a number.
    Some(match op {
        BinaryOp::Add => Float(a + b),
        BinaryOp::Sub => Float(a - b),
        BinaryOp::Mul => Float(a * b),
        BinaryOp::Div => Float(a / b),
        BinaryOp::Lt => Bool(a < b),
        BinaryOp::Gt => Bool(a > b),
        BinaryOp::Le => Bool(a <= b),
        BinaryOp::Ge => Bool(a >= b),
        BinaryOp::Eq => Bool(a == b),
        BinaryOp::Ne => Bool(a != b),
        _ => return None,
    })
}

fn fold_bool(op: BinaryOp, a: bool, b: bool) -> Option<ConstValue> {
    use ConstValue::Bool;
    Some(match op {
        BinaryOp::LogicalAnd => Bool(a && b),
        BinaryOp::LogicalOr => Bool(a || b),
        BinaryOp::LogicalXor => Bool(a != b),
        BinaryOp::Eq => Bool(a == b),
        BinaryOp::Ne => Bool(a != b),
        _ => return None,
    })
}

fn convert_const(v: &ConstValue, to: &Type) -> Option<ConstValue> {
    match to {
        Type::Scalar(kind) => match v {
            ConstValue::Vector(elems) => elems.first()?.convert(*kind),
            scalar => scalar.convert(*kind),
        },
        Type::Vector { kind, size } => match v {
            ConstValue::Vector(elems) if elems.len() == *size as usize => {
                let converted: Option<Vec<ConstValue>> =
                    elems.iter().map(|e| e.convert(*kind)).collect();
                converted.map(ConstValue::Vector)
            }
            _ => None,
        },
        _ => None,
    }
}

fn fold_construct(args: &[ConstValue], target: &Type) -> Option<ConstValue> {
    match target {
        Type::Vector { kind, size } => {
            let mut flat = Vec::new();
            for arg in args {
                match arg {
                    ConstValue::Vector(elems) => flat.extend(elems.iter().cloned()),
                    scalar if scalar.is_scalar() => flat.push(scalar.clone()),
                    _ => return None,
                }
            }
            let size = *size as usize;
            if flat.len() == 1 {
                let splat = flat[0].convert(*kind)?;
                return Some(ConstValue::Vector(vec![splat; size]));
            }
            if flat.len() != size {
                return None;
            }
            let converted: Option<Vec<ConstValue>> =
                flat.iter().map(|e| e.convert(*kind)).collect();
            converted.map(ConstValue::Vector)
        }
        Type::Matrix { cols, rows } => {
            let mut flat = Vec::new();
            for arg in args {
                match arg {
                    ConstValue::Vector(elems) => {
                        for e in elems {
                            flat.push(e.as_f32()?);
                        }
                    }
                    scalar if scalar.is_scalar() => flat.push(scalar.as_f32()?),
                    _ => return None,
                }
            }
            let n = *cols as usize * *rows as usize;
            if flat.len() == 1 {
                let mut elems = vec![0.0; n];
                for i in 0..(*cols).min(*rows) {
                    elems[i as usize * *rows as usize + i as usize] = flat[0];
                }
                return Some(ConstValue::Matrix {
                    cols: *cols,
                    rows: *rows,
                    elems,
                });
            }
            if flat.len() != n {
                return None;
            }
            Some(ConstValue::Matrix {
                cols: *cols,
                rows: *rows,
                elems: flat,
            })
        }
        _ => None,
    }
}

fn fold_index(base: &ConstValue, index: i64) -> Option<ConstValue> {
    let i = usize::try_from(index).ok()?;
    match base {
        ConstValue::Vector(elems) => elems.get(i).cloned(),
        ConstValue::Matrix { cols, rows, elems } => {
            if i >= *cols as usize {
                return None;
            }
            let rows = *rows as usize;
            Some(ConstValue::Vector(
                elems[i * rows..(i + 1) * rows]
                    .iter()
                    .map(|&e| ConstValue::Float(e))
                    .collect(),
            ))
        }
        _ => None,
    }
}

/// Fold the pure math built-ins on scalar float constants (plus `dot` on
/// constant vectors).
fn fold_builtin(name: &str, args: &[ConstValue]) -> Option<ConstValue> {
    if name == "dot" {
        if let [ConstValue::Vector(a), ConstValue::Vector(b)] = args {
            if a.len() == b.len() {
                let mut sum = 0.0f32;
                for (x, y) in a.iter().zip(b) {
                    sum += x.as_f32()? * y.as_f32()?;
                }
                return Some(ConstValue::Float(sum));
            }
        }
        return None;
    }

    let scalars: Option<Vec<f32>> = args
        .iter()
        .map(|a| match a {
            ConstValue::Float(v) => Some(*v),
            _ => None,
        })
        .collect();
    let s = scalars?;

    let result = match (name, s.as_slice()) {
        ("radians", [x]) => x.to_radians(),
        ("degrees", [x]) => x.to_degrees(),
        ("sin", [x]) => x.sin(),
        ("cos", [x]) => x.cos(),
        ("tan", [x]) => x.tan(),
        ("asin", [x]) => x.asin(),
        ("acos", [x]) => x.acos(),
        ("atan", [x]) => x.atan(),
        ("atan", [y, x]) => y.atan2(*x),
        ("exp", [x]) => x.exp(),
        ("log", [x]) => x.ln(),
        ("exp2", [x]) => x.exp2(),
        ("log2", [x]) => x.log2(),
        ("sqrt", [x]) => x.sqrt(),
        ("inversesqrt", [x]) => 1.0 / x.sqrt(),
        ("abs", [x]) => x.abs(),
        ("sign", [x]) => {
            if *x > 0.0 {
                1.0
            } else if *x < 0.0 {
                -1.0
            } else {
                0.0
            }
        }
        ("floor", [x]) => x.floor(),
        ("ceil", [x]) => x.ceil(),
        ("fract", [x]) => x - x.floor(),
        ("pow", [x, y]) => x.powf(*y),
        ("mod", [x, y]) => x - y * (x / y).floor(),
        ("min", [x, y]) => x.min(*y),
        ("max", [x, y]) => x.max(*y),
        ("step", [edge, x]) => {
            if *x < *edge {
                0.0
            } else {
                1.0
            }
        }
        ("clamp", [x, lo, hi]) => x.max(*lo).min(*hi),
        ("mix", [x, y, a]) => x * (1.0 - a) + y * a,
        _ => return None,
    };
    Some(ConstValue::Float(result))
}
