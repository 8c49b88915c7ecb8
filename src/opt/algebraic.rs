//! Algebraic simplification pass.
//!
//! Rewrites operator identities that are numerically exact for the
//! language's arithmetic. Integer identities may use absorption (`x*0`);
//! float rewrites are restricted to identities that hold for every IEEE
//! input, NaN and infinities included, which is why `x*0.0` is left alone.

use crate::hir::{BinaryOp, ConstValue, Function, Module, UnaryOp, Value, ValueId, ValueKind};
use crate::types::{ScalarKind, TypeInterner};

use super::Pass;

#[derive(Debug)]
pub struct AlgebraicSimplification;

impl Pass for AlgebraicSimplification {
    fn name(&self) -> &'static str {
        "algebraic"
    }

    fn run(&self, module: &mut Module, types: &TypeInterner) -> bool {
        let mut changed = false;
        for func in module.functions.iter_mut() {
            changed |= run_on_function(func, types);
        }
        changed
    }
}

pub(crate) fn run_on_function(func: &mut Function, types: &TypeInterner) -> bool {
    let mut changed = false;
    let ids: Vec<ValueId> = func.values.iter().map(|(id, _)| id).collect();

    for id in ids {
        let replacement = simplify(func, types, id);
        if let Some(kind) = replacement {
            let ty = func.values[id].ty;
            let span = func.values[id].span;
            func.values[id] = Value { kind, ty, span };
            changed = true;
        }
    }
    changed
}

fn simplify(func: &Function, types: &TypeInterner, id: ValueId) -> Option<ValueKind> {
    let node_ty = func.values[id].ty;
    match &func.values[id].kind {
        ValueKind::Binary { op, left, right } => {
            let l = func.resolve(*left);
            let r = func.resolve(*right);
            let l_const = as_const(func, l);
            let r_const = as_const(func, r);
            let is_int = matches!(
                types.scalar_kind(node_ty),
                Some(ScalarKind::Int) | Some(ScalarKind::UInt)
            );

            // Forwarding to one operand is only type-correct when shapes
            // already agree (rules out scalar-broadcast operands).
            let can_fwd_l = func.values[l].ty == node_ty;
            let can_fwd_r = func.values[r].ty == node_ty;

            match op {
                BinaryOp::Add => {
                    if can_fwd_l && r_const.is_some_and(is_zero) {
                        return Some(ValueKind::Copy(l));
                    }
                    if can_fwd_r && l_const.is_some_and(is_zero) {
                        return Some(ValueKind::Copy(r));
                    }
                }
                BinaryOp::Sub => {
                    if can_fwd_l && r_const.is_some_and(is_zero) {
                        return Some(ValueKind::Copy(l));
                    }
                }
                BinaryOp::Mul => {
                    if can_fwd_l && r_const.is_some_and(is_one) {
                        return Some(ValueKind::Copy(l));
                    }
                    if can_fwd_r && l_const.is_some_and(is_one) {
                        return Some(ValueKind::Copy(r));
                    }
                    // Absorption is exact for integers only.
                    if is_int
                        && (l_const.is_some_and(is_zero) || r_const.is_some_and(is_zero))
                    {
                        return Some(ValueKind::Constant(zero_like(types, node_ty)?));
                    }
                }
                BinaryOp::Div => {
                    if can_fwd_l && r_const.is_some_and(is_one) {
                        return Some(ValueKind::Copy(l));
                    }
                }
                BinaryOp::LogicalAnd => {
                    if r_const.and_then(ConstValue::as_bool) == Some(true) {
                        return Some(ValueKind::Copy(l));
                    }
                    if l_const.and_then(ConstValue::as_bool) == Some(true) {
                        return Some(ValueKind::Copy(r));
                    }
                    if l_const.and_then(ConstValue::as_bool) == Some(false)
                        || r_const.and_then(ConstValue::as_bool) == Some(false)
                    {
                        return Some(ValueKind::Constant(ConstValue::Bool(false)));
                    }
                }
                BinaryOp::LogicalOr => {
                    if r_const.and_then(ConstValue::as_bool) == Some(false) {
                        return Some(ValueKind::Copy(l));
                    }
                    if l_const.and_then(ConstValue::as_bool) == Some(false) {
                        return Some(ValueKind::Copy(r));
                    }
                    if l_const.and_then(ConstValue::as_bool) == Some(true)
                        || r_const.and_then(ConstValue::as_bool) == Some(true)
                    {
                        return Some(ValueKind::Constant(ConstValue::Bool(true)));
                    }
                }
                BinaryOp::LogicalXor => {
                    if r_const.and_then(ConstValue::as_bool) == Some(false) {
                        return Some(ValueKind::Copy(l));
                    }
                    if l_const.and_then(ConstValue::as_bool) == Some(false) {
                        return Some(ValueKind::Copy(r));
                    }
                }
                _ => {}
            }
            None
        }
        ValueKind::Unary { op, operand } => {
            let inner = func.resolve(*operand);
            // Double negation and double logical/bitwise not.
            if let ValueKind::Unary {
                op: inner_op,
                operand: innermost,
            } = &func.values[inner].kind
            {
                if inner_op == op
                    && matches!(op, UnaryOp::Neg | UnaryOp::Not | UnaryOp::BitNot)
                {
                    let target = func.resolve(*innermost);
                    if func.values[target].ty == node_ty {
                        return Some(ValueKind::Copy(target));
                    }
                }
            }
            None
        }
        ValueKind::Convert(v) => {
            // Conversion to the type the value already has.
            let inner = func.resolve(*v);
            if func.values[inner].ty == node_ty {
                return Some(ValueKind::Copy(inner));
            }
            None
        }
        _ => None,
    }
}

fn as_const(func: &Function, id: ValueId) -> Option<&ConstValue> {
    match &func.values[id].kind {
        ValueKind::Constant(c) => Some(c),
        _ => None,
    }
}

fn is_zero(c: &ConstValue) -> bool {
    match c {
        ConstValue::Int(v) => *v == 0,
        ConstValue::UInt(v) => *v == 0,
        ConstValue::Float(v) => *v == 0.0 && v.is_sign_positive(),
        ConstValue::Vector(elems) => elems.iter().all(is_zero),
        _ => false,
    }
}

fn is_one(c: &ConstValue) -> bool {
    match c {
        ConstValue::Int(v) => *v == 1,
        ConstValue::UInt(v) => *v == 1,
        ConstValue::Float(v) => *v == 1.0,
        ConstValue::Vector(elems) => elems.iter().all(is_one),
        _ => false,
    }
}

fn zero_like(types: &TypeInterner, ty: crate::types::TypeId) -> Option<ConstValue> {
    let kind = types.scalar_kind(ty)?;
    let scalar = match kind {
        ScalarKind::Int => ConstValue::Int(0),
        ScalarKind::UInt => ConstValue::UInt(0),
        _ => return None,
    };
    match types.component_count(ty)? {
        1 => Some(scalar),
        n => Some(ConstValue::Vector(vec![scalar; n as usize])),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Span;
    use crate::hir::Function;

    fn setup() -> (TypeInterner, Function) {
        let types = TypeInterner::new();
        let func = Function::new("test", types.void(), Span::default());
        (types, func)
    }

    #[test]
    fn test_mul_by_one() {
        let (types, mut func) = setup();
        let float = types.float();
        // An opaque non-constant operand.
        let x = func.add_value(
            ValueKind::Load(id_arena::Arena::<crate::hir::Declaration>::new().alloc(crate::hir::Declaration {
                name: "x".into(),
                ty: float,
                storage: crate::hir::Storage::Local,
                precision: None,
                init: None,
                builtin: false,
                span: Span::default(),
            })),
            float,
            Span::default(),
        );
        let one = func.add_value(
            ValueKind::Constant(ConstValue::Float(1.0)),
            float,
            Span::default(),
        );
        let mul = func.add_value(
            ValueKind::Binary {
                op: BinaryOp::Mul,
                left: x,
                right: one,
            },
            float,
            Span::default(),
        );

        assert!(run_on_function(&mut func, &types));
        assert_eq!(func.values[mul].kind, ValueKind::Copy(x));
    }

    #[test]
    fn test_float_mul_by_zero_kept() {
        let (types, mut func) = setup();
        let float = types.float();
        let mut decls: id_arena::Arena<crate::hir::Declaration> = id_arena::Arena::new();
        let x_decl = decls.alloc(crate::hir::Declaration {
            name: "x".into(),
            ty: float,
            storage: crate::hir::Storage::Local,
            precision: None,
            init: None,
            builtin: false,
            span: Span::default(),
        });
        let x = func.add_value(ValueKind::Load(x_decl), float, Span::default());
        let zero = func.add_value(
            ValueKind::Constant(ConstValue::Float(0.0)),
            float,
            Span::default(),
        );
        let _mul = func.add_value(
            ValueKind::Binary {
                op: BinaryOp::Mul,
                left: x,
                right: zero,
            },
            float,
            Span::default(),
        );

        // x may be NaN; x*0.0 is not exactly 0.0.
        assert!(!run_on_function(&mut func, &types));
    }

    #[test]
    fn test_int_mul_by_zero_absorbs() {
        let (types, mut func) = setup();
        let int = types.int();
        let mut decls: id_arena::Arena<crate::hir::Declaration> = id_arena::Arena::new();
        let x_decl = decls.alloc(crate::hir::Declaration {
            name: "x".into(),
            ty: int,
            storage: crate::hir::Storage::Local,
            precision: None,
            init: None,
            builtin: false,
            span: Span::default(),
        });
        let x = func.add_value(ValueKind::Load(x_decl), int, Span::default());
        let zero = func.add_value(
            ValueKind::Constant(ConstValue::Int(0)),
            int,
            Span::default(),
        );
        let mul = func.add_value(
            ValueKind::Binary {
                op: BinaryOp::Mul,
                left: x,
                right: zero,
            },
            int,
            Span::default(),
        );

        assert!(run_on_function(&mut func, &types));
        assert_eq!(
            func.values[mul].kind,
            ValueKind::Constant(ConstValue::Int(0))
        );
    }

    #[test]
    fn test_double_negation() {
        let (types, mut func) = setup();
        let float = types.float();
        let mut decls: id_arena::Arena<crate::hir::Declaration> = id_arena::Arena::new();
        let x_decl = decls.alloc(crate::hir::Declaration {
            name: "x".into(),
            ty: float,
            storage: crate::hir::Storage::Local,
            precision: None,
            init: None,
            builtin: false,
            span: Span::default(),
        });
        let x = func.add_value(ValueKind::Load(x_decl), float, Span::default());
        let neg1 = func.add_value(
            ValueKind::Unary {
                op: UnaryOp::Neg,
                operand: x,
            },
            float,
            Span::default(),
        );
        let neg2 = func.add_value(
            ValueKind::Unary {
                op: UnaryOp::Neg,
                operand: neg1,
            },
            float,
            Span::default(),
        );

        assert!(run_on_function(&mut func, &types));
        assert_eq!(func.values[neg2].kind, ValueKind::Copy(x));
    }
}
