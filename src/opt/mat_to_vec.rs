//! Matrix-operation decomposition ("mat-op-to-vec").
//!
//! Lowers whole-matrix arithmetic into per-column vector operations, and
//! matrix products into column combinations, for backends that want vector
//! granularity. This changes representation rather than simplifying, so it
//! runs only when explicitly requested before codegen handoff — never in
//! the fixed-point pipeline.

use crate::hir::{
    BinaryOp, ConstValue, Function, Module, Value, ValueId, ValueKind,
};
use crate::types::{ScalarKind, Type, TypeInterner};

use super::Pass;

#[derive(Debug)]
pub struct MatToVec;

impl Pass for MatToVec {
    fn name(&self) -> &'static str {
        "mat-to-vec"
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
        let ValueKind::Binary { op, left, right } = func.values[id].kind else {
            continue;
        };
        let node_ty = func.values[id].ty;
        let span = func.values[id].span;
        let l = func.resolve(left);
        let r = func.resolve(right);
        let l_ty = func.values[l].ty;
        let r_ty = func.values[r].ty;

        let new_kind = match (types.get(node_ty), types.get(l_ty), types.get(r_ty)) {
            // Component-wise matrix arithmetic: one vector op per column.
            (Type::Matrix { cols, rows }, Type::Matrix { .. }, Type::Matrix { .. })
                if matches!(op, BinaryOp::Add | BinaryOp::Sub)
                    || (op == BinaryOp::Div) =>
            {
                Some(columnwise(func, types, op, l, r, cols, rows, span))
            }
            // Matrix scaled by a scalar.
            (Type::Matrix { cols, rows }, Type::Matrix { .. }, Type::Scalar(_))
                if matches!(op, BinaryOp::Mul | BinaryOp::Div) =>
            {
                Some(scale_columns(func, types, op, l, r, cols, rows, span, false))
            }
            (Type::Matrix { cols, rows }, Type::Scalar(_), Type::Matrix { .. })
                if op == BinaryOp::Mul =>
            {
                Some(scale_columns(func, types, op, r, l, cols, rows, span, true))
            }
            // Matrix * vector: sum of columns scaled by the vector's
            // components.
            (Type::Vector { .. }, Type::Matrix { cols, rows }, Type::Vector { .. })
                if op == BinaryOp::Mul =>
            {
                Some(mat_vec(func, types, l, r, cols, rows, span))
            }
            // Vector * matrix: one dot-style reduction per column.
            (Type::Vector { .. }, Type::Vector { size, .. }, Type::Matrix { cols, rows })
                if op == BinaryOp::Mul =>
            {
                Some(vec_mat(func, types, l, r, size, cols, rows, span))
            }
            // Matrix * matrix: each result column is M * column of the
            // right operand; the produced mat*vec nodes decompose on the
            // next sweep.
            (
                Type::Matrix { cols, rows },
                Type::Matrix { .. },
                Type::Matrix { cols: r_cols, .. },
            ) if op == BinaryOp::Mul && cols == r_cols => {
                Some(mat_mat(func, types, l, r, l_ty, cols, rows, span))
            }
            _ => None,
        };

        if let Some(kind) = new_kind {
            func.values[id] = Value {
                kind,
                ty: node_ty,
                span,
            };
            changed = true;
        }
    }
    changed
}

fn column(
    func: &mut Function,
    types: &TypeInterner,
    matrix: ValueId,
    index: u8,
    rows: u8,
    span: crate::common::Span,
) -> ValueId {
    let idx = func.add_value(
        ValueKind::Constant(ConstValue::Int(index as i32)),
        types.int(),
        span,
    );
    func.add_value(
        ValueKind::AccessIndex {
            base: matrix,
            index: idx,
        },
        types.vector(ScalarKind::Float, rows),
        span,
    )
}

#[allow(clippy::too_many_arguments)]
fn columnwise(
    func: &mut Function,
    types: &TypeInterner,
    op: BinaryOp,
    l: ValueId,
    r: ValueId,
    cols: u8,
    rows: u8,
    span: crate::common::Span,
) -> ValueKind {
    let vec_ty = types.vector(ScalarKind::Float, rows);
    let mut columns = Vec::with_capacity(cols as usize);
    for c in 0..cols {
        let lc = column(func, types, l, c, rows, span);
        let rc = column(func, types, r, c, rows, span);
        columns.push(func.add_value(
            ValueKind::Binary {
                op,
                left: lc,
                right: rc,
            },
            vec_ty,
            span,
        ));
    }
    ValueKind::Construct(columns)
}

#[allow(clippy::too_many_arguments)]
fn scale_columns(
    func: &mut Function,
    types: &TypeInterner,
    op: BinaryOp,
    matrix: ValueId,
    scalar: ValueId,
    cols: u8,
    rows: u8,
    span: crate::common::Span,
    scalar_first: bool,
) -> ValueKind {
    let vec_ty = types.vector(ScalarKind::Float, rows);
    let mut columns = Vec::with_capacity(cols as usize);
    for c in 0..cols {
        let mc = column(func, types, matrix, c, rows, span);
        let (left, right) = if scalar_first { (scalar, mc) } else { (mc, scalar) };
        columns.push(func.add_value(
            ValueKind::Binary { op, left, right },
            vec_ty,
            span,
        ));
    }
    ValueKind::Construct(columns)
}

/// `m * v` as `Σ m[c] * v[c]`.
fn mat_vec(
    func: &mut Function,
    types: &TypeInterner,
    matrix: ValueId,
    vector: ValueId,
    cols: u8,
    rows: u8,
    span: crate::common::Span,
) -> ValueKind {
    let vec_ty = types.vector(ScalarKind::Float, rows);
    let mut acc: Option<ValueId> = None;
    for c in 0..cols {
        let mc = column(func, types, matrix, c, rows, span);
        let vc = func.add_value(
            ValueKind::Swizzle {
                vector,
                components: vec![c],
            },
            types.float(),
            span,
        );
        let scaled = func.add_value(
            ValueKind::Binary {
                op: BinaryOp::Mul,
                left: mc,
                right: vc,
            },
            vec_ty,
            span,
        );
        acc = Some(match acc {
            None => scaled,
            Some(prev) => func.add_value(
                ValueKind::Binary {
                    op: BinaryOp::Add,
                    left: prev,
                    right: scaled,
                },
                vec_ty,
                span,
            ),
        });
    }
    ValueKind::Copy(acc.expect("matrices have at least two columns"))
}

/// `v * m` as one reduction per column of `m`.
#[allow(clippy::too_many_arguments)]
fn vec_mat(
    func: &mut Function,
    types: &TypeInterner,
    vector: ValueId,
    matrix: ValueId,
    size: u8,
    cols: u8,
    rows: u8,
    span: crate::common::Span,
) -> ValueKind {
    debug_assert_eq!(size, rows);
    let float = types.float();
    let mut components = Vec::with_capacity(cols as usize);
    for c in 0..cols {
        let mc = column(func, types, matrix, c, rows, span);
        let mut acc: Option<ValueId> = None;
        for lane in 0..rows {
            let vl = func.add_value(
                ValueKind::Swizzle {
                    vector,
                    components: vec![lane],
                },
                float,
                span,
            );
            let ml = func.add_value(
                ValueKind::Swizzle {
                    vector: mc,
                    components: vec![lane],
                },
                float,
                span,
            );
            let prod = func.add_value(
                ValueKind::Binary {
                    op: BinaryOp::Mul,
                    left: vl,
                    right: ml,
                },
                float,
                span,
            );
            acc = Some(match acc {
                None => prod,
                Some(prev) => func.add_value(
                    ValueKind::Binary {
                        op: BinaryOp::Add,
                        left: prev,
                        right: prod,
                    },
                    float,
                    span,
                ),
            });
        }
        components.push(acc.expect("matrices have at least two rows"));
    }
    ValueKind::Construct(components)
}

/// `a * b` column by column; each column is an `a * b[c]` product that the
/// next sweep decomposes further.
#[allow(clippy::too_many_arguments)]
fn mat_mat(
    func: &mut Function,
    types: &TypeInterner,
    l: ValueId,
    r: ValueId,
    l_ty: crate::types::TypeId,
    cols: u8,
    rows: u8,
    span: crate::common::Span,
) -> ValueKind {
    let Type::Matrix { rows: l_rows, .. } = types.get(l_ty) else {
        return ValueKind::Copy(l);
    };
    let _ = l_rows;
    let vec_ty = types.vector(ScalarKind::Float, rows);
    let mut columns = Vec::with_capacity(cols as usize);
    for c in 0..cols {
        let rc = column(func, types, r, c, rows, span);
        columns.push(func.add_value(
            ValueKind::Binary {
                op: BinaryOp::Mul,
                left: l,
                right: rc,
            },
            vec_ty,
            span,
        ));
    }
    ValueKind::Construct(columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Span;
    use crate::hir::Declaration;

    fn matrix_load(
        func: &mut Function,
        decls: &mut id_arena::Arena<Declaration>,
        name: &str,
        ty: crate::types::TypeId,
    ) -> ValueId {
        let decl = decls.alloc(Declaration {
            name: name.into(),
            ty,
            storage: crate::hir::Storage::Uniform,
            precision: None,
            init: None,
            builtin: false,
            span: Span::default(),
        });
        func.add_value(ValueKind::Load(decl), ty, Span::default())
    }

    #[test]
    fn test_matrix_add_decomposes_to_columns() {
        let types = TypeInterner::new();
        let mat2 = types.matrix(2, 2);
        let mut decls = id_arena::Arena::new();
        let mut func = Function::new("f", types.void(), Span::default());
        let a = matrix_load(&mut func, &mut decls, "a", mat2);
        let b = matrix_load(&mut func, &mut decls, "b", mat2);
        let sum = func.add_value(
            ValueKind::Binary {
                op: BinaryOp::Add,
                left: a,
                right: b,
            },
            mat2,
            Span::default(),
        );

        assert!(run_on_function(&mut func, &types));
        match &func.values[sum].kind {
            ValueKind::Construct(cols) => {
                assert_eq!(cols.len(), 2);
                for &col in cols {
                    assert!(matches!(
                        func.values[col].kind,
                        ValueKind::Binary {
                            op: BinaryOp::Add,
                            ..
                        }
                    ));
                    assert_eq!(func.values[col].ty, types.vector(ScalarKind::Float, 2));
                }
            }
            other => panic!("expected per-column construct, got {other:?}"),
        }
    }

    #[test]
    fn test_mat_vec_product_becomes_column_sum() {
        let types = TypeInterner::new();
        let mat3 = types.matrix(3, 3);
        let vec3 = types.vector(ScalarKind::Float, 3);
        let mut decls = id_arena::Arena::new();
        let mut func = Function::new("f", types.void(), Span::default());
        let m = matrix_load(&mut func, &mut decls, "m", mat3);
        let v = matrix_load(&mut func, &mut decls, "v", vec3);
        let prod = func.add_value(
            ValueKind::Binary {
                op: BinaryOp::Mul,
                left: m,
                right: v,
            },
            vec3,
            Span::default(),
        );

        assert!(run_on_function(&mut func, &types));
        let resolved = func.resolve(prod);
        assert!(matches!(
            func.values[resolved].kind,
            ValueKind::Binary {
                op: BinaryOp::Add,
                ..
            }
        ));
    }

    #[test]
    fn test_vector_ops_untouched() {
        let types = TypeInterner::new();
        let vec4 = types.vector(ScalarKind::Float, 4);
        let mut decls = id_arena::Arena::new();
        let mut func = Function::new("f", types.void(), Span::default());
        let a = matrix_load(&mut func, &mut decls, "a", vec4);
        let b = matrix_load(&mut func, &mut decls, "b", vec4);
        let _sum = func.add_value(
            ValueKind::Binary {
                op: BinaryOp::Add,
                left: a,
                right: b,
            },
            vec4,
            Span::default(),
        );

        assert!(!run_on_function(&mut func, &types));
    }
}
