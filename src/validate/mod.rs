//! IR validator.
//!
//! A read-only consistency check run after lowering and again after
//! optimization. Violations mean the compiler itself produced broken IR —
//! they are reported as internal errors, in a channel distinct from user
//! diagnostics. The checks: every operand reference resolves, the value
//! graph is acyclic (no value used before it can be defined), operand types
//! are consistent with each operation, every referenced declaration is
//! reachable from the function, jumps appear only where a loop or switch
//! encloses them, and a call result is only consumed after its call
//! statement has executed.

use crate::hir::{
    Access, Block, ConstValue, DeclId, Function, Module, Stmt, Storage, StoreTarget, UnaryOp,
    Value, ValueId, ValueKind,
};
use crate::types::{ScalarKind, Type, TypeId, TypeInterner};
use rustc_hash::FxHashSet;
use thiserror::Error;

/// Internal-consistency failures. Never user-facing source errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("function `{function}`: dangling value reference")]
    DanglingValue { function: String },

    #[error("function `{function}`: value graph contains a cycle")]
    CyclicValue { function: String },

    #[error("function `{function}`: {detail}")]
    TypeInconsistency { function: String, detail: String },

    #[error("function `{function}`: reference to unreachable declaration `{name}`")]
    UnreachableDeclaration { function: String, name: String },

    #[error("function `{function}`: `{kind}` outside of a loop or switch")]
    MisplacedJump { function: String, kind: String },

    #[error("function `{function}`: call result consumed before the call runs")]
    CallResultBeforeCall { function: String },

    #[error("function `{function}`: call references missing function index {index}")]
    BadFunctionRef { function: String, index: usize },
}

/// Validate a whole module. Returns every violation found.
pub fn validate_module(module: &Module, types: &TypeInterner) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    // Declarations not owned by any function are the module's globals.
    let mut function_owned: FxHashSet<DeclId> = FxHashSet::default();
    for func in &module.functions {
        function_owned.extend(func.params.iter().copied());
        function_owned.extend(func.locals.iter().copied());
    }
    let globals: FxHashSet<DeclId> = module
        .decls
        .iter()
        .map(|(id, _)| id)
        .filter(|id| !function_owned.contains(id))
        .collect();

    for func in &module.functions {
        let mut cx = FunctionValidator {
            module,
            types,
            func,
            reachable: globals
                .iter()
                .copied()
                .chain(func.params.iter().copied())
                .chain(func.locals.iter().copied())
                .collect(),
            errors: &mut errors,
        };
        cx.check_values();
        let mut defined_results = FxHashSet::default();
        cx.check_block(&func.body, &JumpContext::default(), &mut defined_results);
    }

    errors
}

#[derive(Default, Clone, Copy)]
struct JumpContext {
    in_loop: bool,
    in_continuing: bool,
    in_switch: bool,
}

struct FunctionValidator<'a> {
    module: &'a Module,
    types: &'a TypeInterner,
    func: &'a Function,
    reachable: FxHashSet<DeclId>,
    errors: &'a mut Vec<ValidationError>,
}

impl FunctionValidator<'_> {
    fn error(&mut self, e: ValidationError) {
        self.errors.push(e);
    }

    fn name(&self) -> String {
        self.func.name.clone()
    }

    fn type_error(&mut self, detail: impl Into<String>) {
        let function = self.name();
        self.error(ValidationError::TypeInconsistency {
            function,
            detail: detail.into(),
        });
    }

    // ---- value graph ----

    fn check_values(&mut self) {
        // Cycle detection over the whole arena.
        let len = self.func.values.len();
        let mut state = vec![0u8; len]; // 0 unvisited, 1 on stack, 2 done
        for (id, _) in self.func.values.iter() {
            if state[id.index()] == 0 && self.has_cycle(id, &mut state) {
                let function = self.name();
                self.error(ValidationError::CyclicValue { function });
                break;
            }
        }

        let ids: Vec<ValueId> = self.func.values.iter().map(|(id, _)| id).collect();
        for id in ids {
            self.check_value(id);
        }
    }

    fn has_cycle(&self, id: ValueId, state: &mut [u8]) -> bool {
        match state[id.index()] {
            1 => return true,
            2 => return false,
            _ => {}
        }
        state[id.index()] = 1;
        for op in self.func.values[id].kind.operands() {
            if op.index() >= state.len() || self.has_cycle(op, state) {
                return true;
            }
        }
        state[id.index()] = 2;
        false
    }

    fn value(&self, id: ValueId) -> &Value {
        &self.func.values[id]
    }

    fn ty_of(&self, id: ValueId) -> TypeId {
        self.value(self.func.resolve(id)).ty
    }

    fn check_decl_reachable(&mut self, decl: DeclId) {
        if !self.reachable.contains(&decl) {
            let function = self.name();
            let name = self
                .module
                .decls
                .iter()
                .find(|(id, _)| *id == decl)
                .map(|(_, d)| d.name.clone())
                .unwrap_or_else(|| "<missing>".into());
            self.error(ValidationError::UnreachableDeclaration { function, name });
        }
    }

    fn check_value(&mut self, id: ValueId) {
        let node_ty = self.value(id).ty;
        match self.value(id).kind.clone() {
            ValueKind::Constant(c) => {
                if !constant_matches(&c, &self.types.get(node_ty)) {
                    self.type_error("constant payload does not match its type");
                }
            }
            ValueKind::Load(decl) => {
                self.check_decl_reachable(decl);
                if self.module.decls.get(decl).is_some_and(|d| d.ty != node_ty) {
                    self.type_error("load type differs from declaration type");
                }
            }
            ValueKind::Copy(v) => {
                if self.ty_of(v) != node_ty {
                    self.type_error("copy changes type");
                }
            }
            ValueKind::Convert(v) => {
                let from = self.types.get(self.ty_of(v));
                let to = self.types.get(node_ty);
                let ok = match (&from, &to) {
                    (Type::Scalar(_), Type::Scalar(_)) => true,
                    (Type::Vector { size: a, .. }, Type::Vector { size: b, .. }) => a == b,
                    // Scalar constructor applied to a vector takes the
                    // first component.
                    (Type::Vector { .. }, Type::Scalar(_)) => true,
                    _ => false,
                };
                if !ok {
                    self.type_error(format!(
                        "invalid conversion from {} to {}",
                        self.types.format(self.ty_of(v)),
                        self.types.format(node_ty)
                    ));
                }
            }
            ValueKind::Unary { op, operand } => {
                let ty = self.ty_of(operand);
                if ty != node_ty {
                    self.type_error("unary result type differs from operand");
                }
                let ok = match op {
                    UnaryOp::Neg => self.types.get(ty).is_numeric(),
                    UnaryOp::Not => ty == self.types.bool(),
                    UnaryOp::BitNot => matches!(
                        self.types.scalar_kind(ty),
                        Some(ScalarKind::Int) | Some(ScalarKind::UInt)
                    ),
                };
                if !ok {
                    self.type_error("unary operand kind mismatch");
                }
            }
            ValueKind::Binary { op, left, right } => {
                self.check_binary(op, left, right, node_ty);
            }
            ValueKind::Construct(args) => {
                self.check_construct(&args, node_ty);
            }
            ValueKind::Swizzle { vector, components } => {
                match self.types.get(self.ty_of(vector)) {
                    Type::Vector { kind, size } => {
                        if components.iter().any(|&l| l >= size) {
                            self.type_error("swizzle lane out of range");
                        }
                        let expect = self
                            .types
                            .vector_or_scalar(kind, components.len() as u8);
                        if expect != node_ty {
                            self.type_error("swizzle result type mismatch");
                        }
                    }
                    _ => self.type_error("swizzle of a non-vector"),
                }
            }
            ValueKind::AccessIndex { base, index } => {
                let base_ty = self.ty_of(base);
                let ok_index = matches!(
                    self.types.scalar_kind(self.ty_of(index)),
                    Some(ScalarKind::Int) | Some(ScalarKind::UInt)
                ) && self.types.get(self.ty_of(index)).is_scalar();
                if !ok_index {
                    self.type_error("non-integer index");
                }
                match self.types.component_type(base_ty) {
                    Some(elem) if !self.types.get(base_ty).is_scalar() => {
                        if elem != node_ty {
                            self.type_error("index result type mismatch");
                        }
                    }
                    _ => self.type_error("indexing a non-indexable type"),
                }
            }
            ValueKind::AccessMember { base, member } => {
                match self.types.get(self.ty_of(base)) {
                    Type::Struct { members, .. } => match members.get(member as usize) {
                        Some(m) => {
                            if m.ty != node_ty {
                                self.type_error("member access type mismatch");
                            }
                        }
                        None => self.type_error("member index out of range"),
                    },
                    _ => self.type_error("member access on a non-struct"),
                }
            }
            ValueKind::CallBuiltin { .. } => {
                // Builtin signatures are host-owned; the call was checked
                // against the catalog during lowering.
            }
            ValueKind::CallResult(f) => {
                if f.index() >= self.module.functions.len() {
                    let function = self.name();
                    self.error(ValidationError::BadFunctionRef {
                        function,
                        index: f.index(),
                    });
                } else if self.module.functions[f.index()].return_type != node_ty {
                    self.type_error("call result type differs from callee return type");
                }
            }
        }
    }

    fn check_binary(&mut self, op: crate::hir::BinaryOp, left: ValueId, right: ValueId, node_ty: TypeId) {
        use crate::hir::BinaryOp as B;
        let l = self.types.get(self.ty_of(left));
        let r = self.types.get(self.ty_of(right));
        let out = self.types.get(node_ty);

        let ok = match op {
            B::LogicalAnd | B::LogicalOr | B::LogicalXor => {
                l == Type::Scalar(ScalarKind::Bool)
                    && r == l
                    && out == Type::Scalar(ScalarKind::Bool)
            }
            B::Eq | B::Ne => l == r && out == Type::Scalar(ScalarKind::Bool),
            B::Lt | B::Le | B::Gt | B::Ge => {
                l == r && l.is_scalar() && out == Type::Scalar(ScalarKind::Bool)
            }
            _ => {
                // Arithmetic: same shape, scalar broadcast, or the
                // linear-algebra products.
                let same = l == r && self.ty_of(left) == node_ty;
                let broadcast = (l.is_scalar()
                    && (r.is_vector() || r.is_matrix())
                    && self.ty_of(right) == node_ty
                    && l.scalar_kind() == r.scalar_kind())
                    || (r.is_scalar()
                        && (l.is_vector() || l.is_matrix())
                        && self.ty_of(left) == node_ty
                        && l.scalar_kind() == r.scalar_kind());
                let linear = op == B::Mul
                    && match (&l, &r) {
                        (Type::Matrix { cols, rows }, Type::Vector { size, .. }) => {
                            *size == *cols
                                && out
                                    == Type::Vector {
                                        kind: ScalarKind::Float,
                                        size: *rows,
                                    }
                        }
                        (Type::Vector { size, .. }, Type::Matrix { cols, rows }) => {
                            *size == *rows
                                && out
                                    == Type::Vector {
                                        kind: ScalarKind::Float,
                                        size: *cols,
                                    }
                        }
                        (
                            Type::Matrix { cols: ac, rows: ar },
                            Type::Matrix { cols: bc, rows: br },
                        ) => {
                            ac == br
                                && out
                                    == Type::Matrix {
                                        cols: *bc,
                                        rows: *ar,
                                    }
                        }
                        _ => false,
                    };
                same || broadcast || linear
            }
        };
        if !ok {
            self.type_error(format!(
                "binary operand types {} and {} inconsistent with result {}",
                self.types.format(self.ty_of(left)),
                self.types.format(self.ty_of(right)),
                self.types.format(node_ty)
            ));
        }
    }

    fn check_construct(&mut self, args: &[ValueId], node_ty: TypeId) {
        match self.types.get(node_ty) {
            Type::Vector { size, .. } => {
                let total: Option<u32> = args
                    .iter()
                    .map(|&a| self.types.component_count(self.ty_of(a)))
                    .sum();
                let splat = args.len() == 1
                    && self.types.get(self.ty_of(args[0])).is_scalar();
                match total {
                    Some(total) if splat || total == size as u32 => {}
                    _ => self.type_error("vector constructor arity mismatch"),
                }
            }
            Type::Matrix { cols, rows } => {
                let total: Option<u32> = args
                    .iter()
                    .map(|&a| self.types.component_count(self.ty_of(a)))
                    .sum();
                let single = args.len() == 1
                    && (self.types.get(self.ty_of(args[0])).is_scalar()
                        || self.types.get(self.ty_of(args[0])).is_matrix());
                match total {
                    Some(total) if single || total == cols as u32 * rows as u32 => {}
                    _ if single => {}
                    _ => self.type_error("matrix constructor arity mismatch"),
                }
            }
            Type::Struct { members, .. } => {
                if members.len() != args.len()
                    || members
                        .iter()
                        .zip(args)
                        .any(|(m, &a)| m.ty != self.ty_of(a))
                {
                    self.type_error("struct constructor field mismatch");
                }
            }
            _ => self.type_error("constructor of a non-composite type"),
        }
    }

    // ---- statements ----

    fn check_block(
        &mut self,
        block: &Block,
        jumps: &JumpContext,
        defined_results: &mut FxHashSet<ValueId>,
    ) {
        for stmt in block.iter() {
            match stmt {
                Stmt::Store { target, value } => {
                    self.check_call_results(*value, defined_results);
                    let expected = self.check_target(target, defined_results);
                    if let Some(expected) = expected {
                        if self.ty_of(*value) != expected {
                            self.type_error(format!(
                                "store of {} into {} slot",
                                self.types.format(self.ty_of(*value)),
                                self.types.format(expected)
                            ));
                        }
                    }
                }
                Stmt::Call {
                    function,
                    args,
                    out_targets,
                    result,
                } => {
                    if function.index() >= self.module.functions.len() {
                        let name = self.name();
                        self.error(ValidationError::BadFunctionRef {
                            function: name,
                            index: function.index(),
                        });
                        continue;
                    }
                    let callee = &self.module.functions[function.index()];
                    if callee.params.len() != args.len() {
                        self.type_error(format!(
                            "call to `{}` with {} arguments, expected {}",
                            callee.name,
                            args.len(),
                            callee.params.len()
                        ));
                    }
                    let param_types: Vec<TypeId> = callee
                        .params
                        .iter()
                        .map(|&p| self.module.decls[p].ty)
                        .collect();
                    for (&arg, &expected) in args.iter().zip(&param_types) {
                        self.check_call_results(arg, defined_results);
                        if self.ty_of(arg) != expected {
                            self.type_error("call argument type mismatch");
                        }
                    }
                    for (index, target) in out_targets {
                        if *index as usize >= param_types.len() {
                            self.type_error("out-parameter index out of range");
                            continue;
                        }
                        let slot = self.check_target(target, defined_results);
                        if slot.is_some_and(|t| t != param_types[*index as usize]) {
                            self.type_error("out-parameter copy-back type mismatch");
                        }
                    }
                    if let Some(result) = result {
                        defined_results.insert(*result);
                    }
                }
                Stmt::If {
                    cond,
                    then_block,
                    else_block,
                } => {
                    self.check_call_results(*cond, defined_results);
                    if self.ty_of(*cond) != self.types.bool() {
                        self.type_error("non-bool branch condition");
                    }
                    let mut t = defined_results.clone();
                    self.check_block(then_block, jumps, &mut t);
                    let mut e = defined_results.clone();
                    self.check_block(else_block, jumps, &mut e);
                }
                Stmt::Loop { body, continuing } => {
                    let inner = JumpContext {
                        in_loop: true,
                        in_continuing: false,
                        in_switch: false,
                    };
                    let mut d = defined_results.clone();
                    self.check_block(body, &inner, &mut d);
                    let latch = JumpContext {
                        in_loop: true,
                        in_continuing: true,
                        in_switch: false,
                    };
                    let mut d = defined_results.clone();
                    self.check_block(continuing, &latch, &mut d);
                }
                Stmt::Switch { value, cases } => {
                    self.check_call_results(*value, defined_results);
                    let vt = self.ty_of(*value);
                    let ok = self.types.get(vt).is_scalar()
                        && matches!(
                            self.types.scalar_kind(vt),
                            Some(ScalarKind::Int) | Some(ScalarKind::UInt)
                        );
                    if !ok {
                        self.type_error("non-integer switch value");
                    }
                    for case in cases {
                        let inner = JumpContext {
                            in_switch: true,
                            ..*jumps
                        };
                        let mut d = defined_results.clone();
                        self.check_block(&case.body, &inner, &mut d);
                    }
                }
                Stmt::Break => {
                    if !jumps.in_loop && !jumps.in_switch {
                        let function = self.name();
                        self.error(ValidationError::MisplacedJump {
                            function,
                            kind: "break".into(),
                        });
                    }
                }
                Stmt::Continue => {
                    if !jumps.in_loop || jumps.in_continuing {
                        let function = self.name();
                        self.error(ValidationError::MisplacedJump {
                            function,
                            kind: "continue".into(),
                        });
                    }
                }
                Stmt::Discard => {}
                Stmt::Return(value) => {
                    let returned = value
                        .map(|v| {
                            self.check_call_results(v, defined_results);
                            self.ty_of(v)
                        })
                        .unwrap_or_else(|| self.types.void());
                    if returned != self.func.return_type {
                        self.type_error("return type mismatch");
                    }
                }
            }
        }
    }

    /// Validate a store target's path and compute the stored slot's type.
    fn check_target(
        &mut self,
        target: &StoreTarget,
        defined_results: &mut FxHashSet<ValueId>,
    ) -> Option<TypeId> {
        self.check_decl_reachable(target.decl);
        let decl = self.module.decls.get(target.decl)?;
        if matches!(
            decl.storage,
            Storage::Uniform | Storage::Attribute | Storage::Input | Storage::Const
        ) && !decl.builtin
        {
            self.type_error(format!("store to read-only `{}`", decl.name));
        }
        let mut ty = decl.ty;
        for access in &target.path {
            match access {
                Access::Index(v) => {
                    self.check_call_results(*v, defined_results);
                    ty = self.types.component_type(ty)?;
                }
                Access::Member(m) => match self.types.get(ty) {
                    Type::Struct { members, .. } => {
                        ty = members.get(*m as usize)?.ty;
                    }
                    _ => {
                        self.type_error("member store into a non-struct");
                        return None;
                    }
                },
                Access::Swizzle(lanes) => match self.types.get(ty) {
                    Type::Vector { kind, .. } => {
                        ty = self.types.vector_or_scalar(kind, lanes.len() as u8);
                    }
                    _ => {
                        self.type_error("swizzle store into a non-vector");
                        return None;
                    }
                },
            }
        }
        Some(ty)
    }

    /// Any `CallResult` reachable from `root` must already be defined by a
    /// call statement that executed.
    fn check_call_results(&mut self, root: ValueId, defined: &FxHashSet<ValueId>) {
        let mut visited = FxHashSet::default();
        let mut stack = vec![root];
        let mut flagged = false;
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            if self.func.values.get(id).is_none() {
                let function = self.name();
                self.error(ValidationError::DanglingValue { function });
                return;
            }
            if matches!(self.value(id).kind, ValueKind::CallResult(_))
                && !defined.contains(&id)
                && !flagged
            {
                let function = self.name();
                self.error(ValidationError::CallResultBeforeCall { function });
                flagged = true;
            }
            stack.extend(self.value(id).kind.operands());
        }
    }
}

/// Shallow shape agreement between a constant and its descriptor.
fn constant_matches(c: &ConstValue, ty: &Type) -> bool {
    match (c, ty) {
        (ConstValue::Bool(_), Type::Scalar(ScalarKind::Bool))
        | (ConstValue::Int(_), Type::Scalar(ScalarKind::Int))
        | (ConstValue::UInt(_), Type::Scalar(ScalarKind::UInt))
        | (ConstValue::Float(_), Type::Scalar(ScalarKind::Float)) => true,
        (ConstValue::Vector(elems), Type::Vector { size, .. }) => {
            elems.len() == *size as usize
        }
        (ConstValue::Matrix { cols, rows, .. }, Type::Matrix { cols: c2, rows: r2 }) => {
            cols == c2 && rows == r2
        }
        _ => false,
    }
}

/// Convenience: validate and panic-free-report into a diagnostic log.
pub fn validate_into_log(
    module: &Module,
    types: &TypeInterner,
    log: &mut crate::diagnostics::DiagnosticLog,
) -> bool {
    let errors = validate_module(module, types);
    let ok = errors.is_empty();
    for e in &errors {
        log.internal(e.to_string());
    }
    ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Span;
    use crate::hir::Declaration;
    use crate::options::ShaderStage;

    #[test]
    fn test_valid_trivial_module() {
        let types = TypeInterner::new();
        let mut module = Module::new(ShaderStage::Vertex, 110);
        let mut func = Function::new("main", types.void(), Span::default());
        func.body.push(Stmt::Return(None));
        module.functions.push(func);
        assert!(validate_module(&module, &types).is_empty());
    }

    #[test]
    fn test_detects_type_mismatch_in_store() {
        let types = TypeInterner::new();
        let mut module = Module::new(ShaderStage::Vertex, 110);
        let float = types.float();
        let out = module.decls.alloc(Declaration {
            name: "o".into(),
            ty: float,
            storage: Storage::Output,
            precision: None,
            init: None,
            builtin: false,
            span: Span::default(),
        });
        let mut func = Function::new("main", types.void(), Span::default());
        let wrong = func.add_value(
            ValueKind::Constant(ConstValue::Int(1)),
            types.int(),
            Span::default(),
        );
        func.body.push(Stmt::Store {
            target: StoreTarget::whole(out),
            value: wrong,
        });
        func.body.push(Stmt::Return(None));
        module.functions.push(func);

        let errors = validate_module(&module, &types);
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::TypeInconsistency { .. })));
    }

    #[test]
    fn test_detects_misplaced_break() {
        let types = TypeInterner::new();
        let mut module = Module::new(ShaderStage::Vertex, 110);
        let mut func = Function::new("main", types.void(), Span::default());
        func.body.push(Stmt::Break);
        func.body.push(Stmt::Return(None));
        module.functions.push(func);

        let errors = validate_module(&module, &types);
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::MisplacedJump { .. })));
    }

    #[test]
    fn test_detects_constant_shape_mismatch() {
        let types = TypeInterner::new();
        let mut module = Module::new(ShaderStage::Vertex, 110);
        let mut func = Function::new("main", types.void(), Span::default());
        // A bool constant claiming to be a float.
        let v = func.add_value(
            ValueKind::Constant(ConstValue::Bool(true)),
            types.float(),
            Span::default(),
        );
        func.body.push(Stmt::Return(Some(v)));
        module.functions.push(func);

        let errors = validate_module(&module, &types);
        assert!(!errors.is_empty());
    }

    #[test]
    fn test_detects_unreachable_declaration() {
        let types = TypeInterner::new();
        let mut module = Module::new(ShaderStage::Vertex, 110);
        let float = types.float();

        // A declaration owned by another function.
        let foreign = module.decls.alloc(Declaration {
            name: "other_local".into(),
            ty: float,
            storage: Storage::Local,
            precision: None,
            init: None,
            builtin: false,
            span: Span::default(),
        });
        let mut owner = Function::new("owner", types.void(), Span::default());
        owner.locals.push(foreign);
        owner.body.push(Stmt::Return(None));
        module.functions.push(owner);

        let mut func = Function::new("main", types.void(), Span::default());
        let load = func.add_value(ValueKind::Load(foreign), float, Span::default());
        func.body.push(Stmt::Return(Some(load)));
        module.functions.push(func);

        let errors = validate_module(&module, &types);
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::UnreachableDeclaration { .. })));
    }
}
