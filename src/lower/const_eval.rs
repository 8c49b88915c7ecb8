//! AST-level constant expression evaluation.
//!
//! Used where the language demands a compile-time constant: array sizes,
//! global and `const` initializers, and `case` labels. Integer arithmetic
//! wraps; float arithmetic is IEEE f32. Anything unfoldable (including
//! division by zero in an integer context) yields `None` and the caller
//! reports the appropriate diagnostic.

use crate::ast::{self, BinaryOp, UnaryOp};
use crate::hir::{ConstValue, Declaration};
use crate::resolve::SymbolTable;
use id_arena::Arena;

pub(super) fn eval_const_expr(
    expr: &ast::Expr,
    symbols: &SymbolTable,
    decls: &Arena<Declaration>,
) -> Option<ConstValue> {
    match expr {
        ast::Expr::IntLit { value, .. } => Some(ConstValue::Int(*value)),
        ast::Expr::UIntLit { value, .. } => Some(ConstValue::UInt(*value)),
        ast::Expr::FloatLit { value, .. } => Some(ConstValue::Float(*value)),
        ast::Expr::BoolLit { value, .. } => Some(ConstValue::Bool(*value)),
        ast::Expr::Ident { name, .. } => {
            let decl = symbols.lookup_variable(name)?;
            let d = &decls[decl];
            if d.storage == crate::hir::Storage::Const {
                d.init.clone()
            } else {
                None
            }
        }
        ast::Expr::Unary { op, expr, .. } => {
            let v = eval_const_expr(expr, symbols, decls)?;
            eval_unary(*op, v)
        }
        ast::Expr::Binary {
            op, left, right, ..
        } => {
            let l = eval_const_expr(left, symbols, decls)?;
            let r = eval_const_expr(right, symbols, decls)?;
            eval_binary(*op, l, r)
        }
        ast::Expr::Conditional {
            cond,
            then_expr,
            else_expr,
            ..
        } => {
            let c = eval_const_expr(cond, symbols, decls)?.as_bool()?;
            if c {
                eval_const_expr(then_expr, symbols, decls)
            } else {
                eval_const_expr(else_expr, symbols, decls)
            }
        }
        ast::Expr::Constructor { ty, args, .. } => eval_constructor(ty, args, symbols, decls),
        ast::Expr::Index { base, index, .. } => {
            let base = eval_const_expr(base, symbols, decls)?;
            let idx = eval_const_expr(index, symbols, decls)?.as_i64()?;
            match base {
                ConstValue::Vector(elems) => elems.get(usize::try_from(idx).ok()?).cloned(),
                _ => None,
            }
        }
        ast::Expr::Field { base, field, .. } => {
            // Swizzles of constant vectors.
            let base = eval_const_expr(base, symbols, decls)?;
            let ConstValue::Vector(elems) = base else {
                return None;
            };
            let lanes: Option<Vec<usize>> = field
                .chars()
                .map(|c| {
                    ["xyzw", "rgba", "stpq"]
                        .iter()
                        .find_map(|set| set.find(c))
                })
                .collect();
            let lanes = lanes?;
            if lanes.iter().any(|&l| l >= elems.len()) {
                return None;
            }
            if lanes.len() == 1 {
                Some(elems[lanes[0]].clone())
            } else {
                Some(ConstValue::Vector(
                    lanes.iter().map(|&l| elems[l].clone()).collect(),
                ))
            }
        }
        ast::Expr::Assign { .. }
        | ast::Expr::Call { .. }
        | ast::Expr::Comma { .. } => None,
    }
}

fn eval_unary(op: UnaryOp, v: ConstValue) -> Option<ConstValue> {
    match (op, v) {
        (UnaryOp::Neg, ConstValue::Int(v)) => Some(ConstValue::Int(v.wrapping_neg())),
        (UnaryOp::Neg, ConstValue::UInt(v)) => Some(ConstValue::UInt(v.wrapping_neg())),
        (UnaryOp::Neg, ConstValue::Float(v)) => Some(ConstValue::Float(-v)),
        (UnaryOp::Not, ConstValue::Bool(v)) => Some(ConstValue::Bool(!v)),
        (UnaryOp::BitNot, ConstValue::Int(v)) => Some(ConstValue::Int(!v)),
        (UnaryOp::BitNot, ConstValue::UInt(v)) => Some(ConstValue::UInt(!v)),
        _ => None,
    }
}

fn eval_binary(op: BinaryOp, l: ConstValue, r: ConstValue) -> Option<ConstValue> {
    use ConstValue::*;
    // Implicit conversions first: int→uint, int/uint→float.
    let (l, r) = match (l, r) {
        (Int(a), Float(b)) => (Float(a as f32), Float(b)),
        (Float(a), Int(b)) => (Float(a), Float(b as f32)),
        (UInt(a), Float(b)) => (Float(a as f32), Float(b)),
        (Float(a), UInt(b)) => (Float(a), Float(b as f32)),
        (Int(a), UInt(b)) => (UInt(a as u32), UInt(b)),
        (UInt(a), Int(b)) => (UInt(a), UInt(b as u32)),
        other => other,
    };

    match (l, r) {
        (Int(a), Int(b)) => eval_int(op, a, b),
        (UInt(a), UInt(b)) => eval_uint(op, a, b),
        (Float(a), Float(b)) => eval_float(op, a, b),
        (Bool(a), Bool(b)) => match op {
            BinaryOp::LogicalAnd => Some(Bool(a && b)),
            BinaryOp::LogicalOr => Some(Bool(a || b)),
            BinaryOp::LogicalXor => Some(Bool(a != b)),
            BinaryOp::Eq => Some(Bool(a == b)),
            BinaryOp::Ne => Some(Bool(a != b)),
            _ => None,
        },
        _ => None,
    }
}

fn eval_int(op: BinaryOp, a: i32, b: i32) -> Option<ConstValue> {
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

fn eval_uint(op: BinaryOp, a: u32, b: u32) -> Option<ConstValue> {
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

fn eval_float(op: BinaryOp, a: f32, b: f32) -> Option<ConstValue> {
    use ConstValue::{Bool, Float};
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

/// Constructors of vectors/matrices from constant components, and scalar
/// constructor casts.
fn eval_constructor(
    ts: &ast::TypeSpecifier,
    args: &[ast::Expr],
    symbols: &SymbolTable,
    decls: &Arena<Declaration>,
) -> Option<ConstValue> {
    let ast::TypeSpecifier::Builtin { ty, .. } = ts else {
        return None;
    };

    let mut values = Vec::with_capacity(args.len());
    for arg in args {
        values.push(eval_const_expr(arg, symbols, decls)?);
    }

    match ty {
        ast::BuiltinType::Scalar(kind) => {
            if values.len() != 1 {
                return None;
            }
            convert_scalar(&values[0], *kind)
        }
        ast::BuiltinType::Vector(kind, size) => {
            let mut flat = Vec::new();
            for v in &values {
                match v {
                    ConstValue::Vector(elems) => flat.extend(elems.iter().cloned()),
                    scalar if scalar.is_scalar() => flat.push(scalar.clone()),
                    _ => return None,
                }
            }
            let size = *size as usize;
            if flat.len() == 1 {
                let splat = convert_scalar(&flat[0], *kind)?;
                return Some(ConstValue::Vector(vec![splat; size]));
            }
            if flat.len() != size {
                return None;
            }
            let converted: Option<Vec<ConstValue>> =
                flat.iter().map(|v| convert_scalar(v, *kind)).collect();
            Some(ConstValue::Vector(converted?))
        }
        ast::BuiltinType::Matrix(cols, rows) => {
            let mut flat = Vec::new();
            for v in &values {
                match v {
                    ConstValue::Vector(elems) => {
                        for e in elems {
                            flat.push(e.as_f32()?);
                        }
                    }
                    scalar if scalar.is_scalar() => flat.push(scalar.as_f32()?),
                    _ => return None,
                }
            }
            let (cols, rows) = (*cols, *rows);
            let n = cols as usize * rows as usize;
            if flat.len() == 1 {
                // Diagonal construction.
                let d = flat[0];
                let mut elems = vec![0.0; n];
                for i in 0..cols.min(rows) {
                    elems[i as usize * rows as usize + i as usize] = d;
                }
                return Some(ConstValue::Matrix { cols, rows, elems });
            }
            if flat.len() != n {
                return None;
            }
            Some(ConstValue::Matrix {
                cols,
                rows,
                elems: flat,
            })
        }
        _ => None,
    }
}

fn convert_scalar(v: &ConstValue, to: crate::types::ScalarKind) -> Option<ConstValue> {
    use crate::types::ScalarKind as K;
    Some(match (v, to) {
        (ConstValue::Int(v), K::Int) => ConstValue::Int(*v),
        (ConstValue::Int(v), K::UInt) => ConstValue::UInt(*v as u32),
        (ConstValue::Int(v), K::Float) => ConstValue::Float(*v as f32),
        (ConstValue::Int(v), K::Bool) => ConstValue::Bool(*v != 0),
        (ConstValue::UInt(v), K::Int) => ConstValue::Int(*v as i32),
        (ConstValue::UInt(v), K::UInt) => ConstValue::UInt(*v),
        (ConstValue::UInt(v), K::Float) => ConstValue::Float(*v as f32),
        (ConstValue::UInt(v), K::Bool) => ConstValue::Bool(*v != 0),
        (ConstValue::Float(v), K::Int) => ConstValue::Int(*v as i32),
        (ConstValue::Float(v), K::UInt) => ConstValue::UInt(*v as u32),
        (ConstValue::Float(v), K::Float) => ConstValue::Float(*v),
        (ConstValue::Float(v), K::Bool) => ConstValue::Bool(*v != 0.0),
        (ConstValue::Bool(v), K::Int) => ConstValue::Int(*v as i32),
        (ConstValue::Bool(v), K::UInt) => ConstValue::UInt(*v as u32),
        (ConstValue::Bool(v), K::Float) => ConstValue::Float(*v as i32 as f32),
        (ConstValue::Bool(v), K::Bool) => ConstValue::Bool(*v),
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Span;

    fn int(v: i32) -> ast::Expr {
        ast::Expr::IntLit {
            value: v,
            span: Span::default(),
        }
    }

    #[test]
    fn test_int_arithmetic() {
        let symbols = SymbolTable::new();
        let decls = Arena::new();
        let expr = ast::Expr::Binary {
            op: BinaryOp::Add,
            left: Box::new(int(2)),
            right: Box::new(ast::Expr::Binary {
                op: BinaryOp::Mul,
                left: Box::new(int(3)),
                right: Box::new(int(4)),
                span: Span::default(),
            }),
            span: Span::default(),
        };
        assert_eq!(
            eval_const_expr(&expr, &symbols, &decls),
            Some(ConstValue::Int(14))
        );
    }

    #[test]
    fn test_division_by_zero_not_const() {
        let symbols = SymbolTable::new();
        let decls = Arena::new();
        let expr = ast::Expr::Binary {
            op: BinaryOp::Div,
            left: Box::new(int(1)),
            right: Box::new(int(0)),
            span: Span::default(),
        };
        assert_eq!(eval_const_expr(&expr, &symbols, &decls), None);
    }

    #[test]
    fn test_float_div_by_zero_is_inf() {
        let symbols = SymbolTable::new();
        let decls = Arena::new();
        let expr = ast::Expr::Binary {
            op: BinaryOp::Div,
            left: Box::new(ast::Expr::FloatLit {
                value: 1.0,
                span: Span::default(),
            }),
            right: Box::new(ast::Expr::FloatLit {
                value: 0.0,
                span: Span::default(),
            }),
            span: Span::default(),
        };
        assert_eq!(
            eval_const_expr(&expr, &symbols, &decls),
            Some(ConstValue::Float(f32::INFINITY))
        );
    }

    #[test]
    fn test_vector_constructor_splat() {
        let symbols = SymbolTable::new();
        let decls = Arena::new();
        let expr = ast::Expr::Constructor {
            ty: ast::TypeSpecifier::Builtin {
                ty: ast::BuiltinType::Vector(crate::types::ScalarKind::Float, 3),
                span: Span::default(),
            },
            args: vec![ast::Expr::FloatLit {
                value: 2.0,
                span: Span::default(),
            }],
            span: Span::default(),
        };
        assert_eq!(
            eval_const_expr(&expr, &symbols, &decls),
            Some(ConstValue::Vector(vec![ConstValue::Float(2.0); 3]))
        );
    }
}
