//! Semantic lowering: AST to typed HIR.
//!
//! Walks the tree in declaration order, pushing a scope for every
//! scope-introducing node, resolving identifiers innermost-first, and
//! computing types bottom-up. Every implicit conversion the language allows
//! becomes an explicit `Convert` node; nothing converts silently. Hard
//! errors abort the current function but sibling functions keep lowering so
//! one invocation reports everything.

mod const_eval;

use crate::ast::{self, ParamQualifier};
use crate::common::Span;
use crate::diagnostics::{CompileError, DiagnosticLog};
use crate::hir::*;
use crate::options::ShaderStage;
use crate::resolve::{BuiltinCatalog, FunctionKind, FunctionSig, ParamSig, SymbolTable};
use crate::types::{ScalarKind, Type, TypeId, TypeInterner};
use const_eval::eval_const_expr;

/// Hard error already logged; abort the current function.
struct Aborted;

type LResult<T> = Result<T, Aborted>;

/// Lower a parsed unit. The caller must have checked that lexing/parsing
/// left no errors; the returned module is meaningful only when `log` still
/// has no errors afterwards.
pub fn lower(
    unit: &ast::TranslationUnit,
    stage: ShaderStage,
    version: u16,
    types: &TypeInterner,
    catalog: &BuiltinCatalog,
    log: &mut DiagnosticLog,
) -> Module {
    let mut lowerer = Lowerer {
        types,
        log,
        stage,
        module: Module::new(stage, version),
        symbols: SymbolTable::new(),
        next_temp: 0,
    };
    lowerer.seed_builtins(catalog);
    // User declarations live one scope inside the built-in scope.
    lowerer.symbols.push_scope();

    for decl in &unit.decls {
        match decl {
            ast::ExtDecl::Precision(_) => {
                // Default precision declarations carry no semantic weight
                // for this front end.
            }
            ast::ExtDecl::Variable(var) => lowerer.lower_global(var),
            ast::ExtDecl::Function(def) => lowerer.lower_function_def(def),
        }
    }

    let entry = lowerer
        .module
        .functions
        .iter()
        .position(|f| f.name == "main" && f.params.is_empty());
    lowerer.module.entry = entry.map(|i| FunctionId(i as u32));

    // A prototype that was called but never given a body is an error; an
    // uncalled one is dead and harmless. Skip when the unit already failed,
    // since aborted functions are indistinguishable from bare prototypes.
    if !lowerer.log.has_errors() {
        let mut called = vec![false; lowerer.module.functions.len()];
        for func in &lowerer.module.functions {
            collect_called(&func.body, &mut called);
        }
        for (i, func) in lowerer.module.functions.iter().enumerate() {
            if called[i] && func.body.is_empty() {
                lowerer.log.error(
                    func.span,
                    CompileError::UndefinedFunction {
                        name: func.name.clone(),
                    },
                );
            }
        }
    }

    lowerer.module
}

fn collect_called(block: &Block, called: &mut [bool]) {
    for stmt in block.iter() {
        match stmt {
            Stmt::Call { function, .. } => called[function.index()] = true,
            Stmt::If {
                then_block,
                else_block,
                ..
            } => {
                collect_called(then_block, called);
                collect_called(else_block, called);
            }
            Stmt::Loop { body, continuing } => {
                collect_called(body, called);
                collect_called(continuing, called);
            }
            Stmt::Switch { cases, .. } => {
                for case in cases {
                    collect_called(&case.body, called);
                }
            }
            _ => {}
        }
    }
}

struct Lowerer<'a> {
    types: &'a TypeInterner,
    log: &'a mut DiagnosticLog,
    stage: ShaderStage,
    module: Module,
    symbols: SymbolTable,
    next_temp: u32,
}

impl Lowerer<'_> {
    // ==================== SEEDING ====================

    fn seed_builtins(&mut self, catalog: &BuiltinCatalog) {
        for var in &catalog.variables {
            let decl = self.module.decls.alloc(Declaration {
                name: var.name.clone(),
                ty: var.ty,
                storage: var.storage,
                precision: None,
                init: None,
                builtin: true,
                span: Span::default(),
            });
            let _ = self.symbols.declare_variable(&var.name, decl);
        }
        for (name, value) in &catalog.constants {
            let decl = self.module.decls.alloc(Declaration {
                name: name.clone(),
                ty: self.types.int(),
                storage: Storage::Const,
                precision: None,
                init: Some(ConstValue::Int(*value)),
                builtin: true,
                span: Span::default(),
            });
            let _ = self.symbols.declare_variable(name, decl);
        }
        for func in &catalog.functions {
            let sig = FunctionSig {
                name: func.name.clone(),
                params: func
                    .params
                    .iter()
                    .map(|&ty| ParamSig {
                        ty,
                        qualifier: ParamQualifier::In,
                    })
                    .collect(),
                return_type: func.return_type,
                kind: FunctionKind::Builtin,
                span: Span::default(),
            };
            let _ = self.symbols.declare_function(sig);
        }
    }

    // ==================== TYPES ====================

    /// Resolve a written type to an interned descriptor, declaring any
    /// inline struct definition along the way.
    fn resolve_type(&mut self, ts: &ast::TypeSpecifier) -> TypeId {
        match ts {
            ast::TypeSpecifier::Builtin { ty, .. } => match ty {
                ast::BuiltinType::Void => self.types.void(),
                ast::BuiltinType::Scalar(kind) => self.types.scalar(*kind),
                ast::BuiltinType::Vector(kind, size) => self.types.vector(*kind, *size),
                ast::BuiltinType::Matrix(cols, rows) => self.types.matrix(*cols, *rows),
                ast::BuiltinType::Sampler(kind) => self.types.sampler(*kind),
            },
            ast::TypeSpecifier::Named { name, span } => {
                match self.symbols.lookup_type(name) {
                    Some(ty) => ty,
                    None => {
                        self.log
                            .error(*span, CompileError::Undeclared { name: name.clone() });
                        self.types.error()
                    }
                }
            }
            ast::TypeSpecifier::Struct { def, span } => {
                let mut members = Vec::new();
                for field in &def.fields {
                    let field_ty = self.resolve_type(&field.ty);
                    for d in &field.declarators {
                        let ty = self.apply_array_suffix(field_ty, d);
                        members.push(crate::types::StructMember {
                            name: d.name.clone(),
                            ty,
                        });
                    }
                }
                let name = def
                    .name
                    .clone()
                    .unwrap_or_else(|| format!("<anonymous@{}>", span.start));
                let ty = self.types.intern(Type::Struct {
                    name: name.clone(),
                    members,
                });
                if let Some(struct_name) = &def.name {
                    if self.symbols.declare_type(struct_name, ty).is_err() {
                        self.log.error(
                            *span,
                            CompileError::Redeclaration {
                                name: struct_name.clone(),
                            },
                        );
                    }
                }
                ty
            }
        }
    }

    /// Apply a declarator's `[N]` suffix, validating the size.
    fn apply_array_suffix(&mut self, element: TypeId, d: &ast::Declarator) -> TypeId {
        match &d.array_size {
            None => element,
            Some(None) => self.types.array(element, None),
            Some(Some(expr)) => match self.const_array_size(expr) {
                Some(n) => self.types.array(element, Some(n)),
                None => {
                    self.log.error(d.span, CompileError::InvalidArraySize);
                    self.types.array(element, None)
                }
            },
        }
    }

    fn const_array_size(&mut self, expr: &ast::Expr) -> Option<u32> {
        match eval_const_expr(expr, &self.symbols, &self.module.decls)? {
            ConstValue::Int(v) if v > 0 => Some(v as u32),
            ConstValue::UInt(v) if v > 0 => Some(v),
            _ => None,
        }
    }

    // ==================== GLOBALS ====================

    fn map_global_storage(&mut self, quals: &ast::Qualifiers, span: Span) -> Storage {
        match quals.storage {
            None => Storage::Local,
            Some(ast::StorageQualifier::Const) => Storage::Const,
            Some(ast::StorageQualifier::Attribute) => {
                if self.stage != ShaderStage::Vertex {
                    self.log.warning_text(
                        span,
                        "`attribute` is only meaningful in vertex shaders",
                    );
                }
                Storage::Attribute
            }
            Some(ast::StorageQualifier::Uniform) => Storage::Uniform,
            Some(ast::StorageQualifier::Varying) => match self.stage {
                ShaderStage::Vertex | ShaderStage::Geometry => Storage::Output,
                ShaderStage::Fragment => Storage::Input,
            },
            Some(ast::StorageQualifier::In) => match self.stage {
                ShaderStage::Vertex => Storage::Attribute,
                _ => Storage::Input,
            },
            Some(ast::StorageQualifier::Out) => Storage::Output,
        }
    }

    fn lower_global(&mut self, var: &ast::VariableDecl) {
        let base_ty = self.resolve_type(&var.ty);
        let storage = self.map_global_storage(&var.qualifiers, var.span);

        for d in &var.declarators {
            let ty = self.apply_array_suffix(base_ty, d);

            // Global initializers must be constant expressions.
            let init = match &d.init {
                None => None,
                Some(expr) => {
                    match eval_const_expr(expr, &self.symbols, &self.module.decls) {
                        Some(value) => Some(value),
                        None => {
                            self.log.error(expr.span(), CompileError::ConstExprExpected);
                            None
                        }
                    }
                }
            };

            let decl = self.module.decls.alloc(Declaration {
                name: d.name.clone(),
                ty,
                storage,
                precision: var.qualifiers.precision,
                init,
                builtin: false,
                span: d.span,
            });
            if self.symbols.declare_variable(&d.name, decl).is_err() {
                self.log.error(
                    d.span,
                    CompileError::Redeclaration {
                        name: d.name.clone(),
                    },
                );
            }
        }
    }

    // ==================== FUNCTIONS ====================

    fn lower_function_def(&mut self, def: &ast::FunctionDef) {
        let return_type = self.resolve_type(&def.proto.return_ty);
        let params: Vec<ParamSig> = def
            .proto
            .params
            .iter()
            .map(|p| {
                let base = self.resolve_type(&p.ty);
                let ty = match &p.array_size {
                    Some(expr) => match self.const_array_size(expr) {
                        Some(n) => self.types.array(base, Some(n)),
                        None => {
                            self.log.error(p.span, CompileError::InvalidArraySize);
                            self.types.array(base, None)
                        }
                    },
                    None => base,
                };
                ParamSig {
                    ty,
                    qualifier: p.qualifier,
                }
            })
            .collect();

        // Find an existing prototype this definition completes, or allocate
        // a fresh function slot.
        let probe = FunctionSig {
            name: def.proto.name.clone(),
            params: params.clone(),
            return_type,
            kind: FunctionKind::Builtin, // placeholder for matching only
            span: def.proto.span,
        };
        let existing = self
            .symbols
            .lookup_functions(&def.proto.name)
            .into_iter()
            .find(|s| s.matches_params(&probe))
            .map(|s| (s.kind, s.return_type));

        let id = match existing {
            Some((FunctionKind::User(id), prev_ret)) => {
                let has_body = !self.module.functions[id.index()].body.is_empty();
                if has_body && def.body.is_some() {
                    self.log.error(
                        def.span,
                        CompileError::Redeclaration {
                            name: def.proto.name.clone(),
                        },
                    );
                    return;
                }
                if prev_ret != return_type {
                    self.log.error(
                        def.span,
                        CompileError::ReturnTypeMismatch {
                            expected: self.types.format(prev_ret),
                            found: self.types.format(return_type),
                        },
                    );
                    return;
                }
                id
            }
            Some((FunctionKind::Builtin, _)) | None => {
                let id = FunctionId(self.module.functions.len() as u32);
                self.module.functions.push(Function::new(
                    def.proto.name.clone(),
                    return_type,
                    def.span,
                ));
                let sig = FunctionSig {
                    kind: FunctionKind::User(id),
                    ..probe
                };
                if self.symbols.declare_function(sig).is_err() {
                    self.log.error(
                        def.span,
                        CompileError::Redeclaration {
                            name: def.proto.name.clone(),
                        },
                    );
                    return;
                }
                id
            }
        };

        let Some(body) = &def.body else {
            return;
        };

        let mut func = Function::new(def.proto.name.clone(), return_type, def.span);
        self.symbols.push_scope();
        for (p, sig) in def.proto.params.iter().zip(&params) {
            let storage = match p.qualifier {
                ParamQualifier::In => Storage::ParamIn,
                ParamQualifier::Out => Storage::ParamOut,
                ParamQualifier::InOut => Storage::ParamInOut,
            };
            let storage = if p.is_const { Storage::Const } else { storage };
            let name = p
                .name
                .clone()
                .unwrap_or_else(|| format!("$arg{}", func.params.len()));
            let decl = self.module.decls.alloc(Declaration {
                name: name.clone(),
                ty: sig.ty,
                storage,
                precision: None,
                init: None,
                builtin: false,
                span: p.span,
            });
            func.params.push(decl);
            if self.symbols.declare_variable(&name, decl).is_err() {
                self.log.error(
                    p.span,
                    CompileError::Redeclaration { name: name.clone() },
                );
            }
        }

        let mut block = Block::new();
        let mut ctx = FnCtx {
            return_type,
            loop_depth: 0,
            switch_depth: 0,
        };
        let result = self.lower_block_stmts(&body.stmts, &mut func, &mut block, &mut ctx);
        self.symbols.pop_scope();

        if result.is_ok() {
            // Implicit return at the end of a void function body.
            let needs_return = return_type == self.types.void()
                && !matches!(block.stmts().last(), Some(Stmt::Return(_)));
            if needs_return {
                block.push(Stmt::Return(None));
            }
            func.body = block;
            self.module.functions[id.index()] = func;
        }
        // On abort the placeholder stays empty; the error flag is already
        // set, so nothing downstream will consume it.
    }

    // ==================== STATEMENTS ====================

    fn lower_block_stmts(
        &mut self,
        stmts: &[ast::Stmt],
        func: &mut Function,
        block: &mut Block,
        ctx: &mut FnCtx,
    ) -> LResult<()> {
        for stmt in stmts {
            self.lower_stmt(stmt, func, block, ctx)?;
        }
        Ok(())
    }

    fn lower_stmt(
        &mut self,
        stmt: &ast::Stmt,
        func: &mut Function,
        block: &mut Block,
        ctx: &mut FnCtx,
    ) -> LResult<()> {
        match stmt {
            ast::Stmt::Compound(inner) => {
                self.symbols.push_scope();
                let result = self.lower_block_stmts(&inner.stmts, func, block, ctx);
                self.symbols.pop_scope();
                result
            }
            ast::Stmt::Decl(decl) => self.lower_local_decl(decl, func, block, ctx),
            ast::Stmt::Expr { expr, .. } => {
                if let Some(expr) = expr {
                    self.lower_expr(expr, func, block, ctx)?;
                }
                Ok(())
            }
            ast::Stmt::If {
                cond,
                then_branch,
                else_branch,
                ..
            } => {
                let cond_v = self.lower_bool_cond(cond, func, block, ctx)?;

                self.symbols.push_scope();
                let mut then_block = Block::new();
                let then_result =
                    self.lower_stmt(then_branch, func, &mut then_block, ctx);
                self.symbols.pop_scope();
                then_result?;

                let mut else_block = Block::new();
                if let Some(else_branch) = else_branch {
                    self.symbols.push_scope();
                    let else_result =
                        self.lower_stmt(else_branch, func, &mut else_block, ctx);
                    self.symbols.pop_scope();
                    else_result?;
                }

                block.push(Stmt::If {
                    cond: cond_v,
                    then_block,
                    else_block,
                });
                Ok(())
            }
            ast::Stmt::While { cond, body, .. } => {
                self.symbols.push_scope();
                ctx.loop_depth += 1;
                let result = (|| {
                    let mut loop_body = Block::new();
                    // if (!cond) break;
                    let cond_v = self.lower_bool_cond(cond, func, &mut loop_body, ctx)?;
                    let not = func.add_value(
                        ValueKind::Unary {
                            op: UnaryOp::Not,
                            operand: cond_v,
                        },
                        self.types.bool(),
                        cond.span(),
                    );
                    let mut break_block = Block::new();
                    break_block.push(Stmt::Break);
                    loop_body.push(Stmt::If {
                        cond: not,
                        then_block: break_block,
                        else_block: Block::new(),
                    });

                    self.lower_stmt(body, func, &mut loop_body, ctx)?;
                    block.push(Stmt::Loop {
                        body: loop_body,
                        continuing: Block::new(),
                    });
                    Ok(())
                })();
                ctx.loop_depth -= 1;
                self.symbols.pop_scope();
                result
            }
            ast::Stmt::DoWhile { body, cond, .. } => {
                self.symbols.push_scope();
                ctx.loop_depth += 1;
                let result = (|| {
                    let mut loop_body = Block::new();
                    self.lower_stmt(body, func, &mut loop_body, ctx)?;

                    // The latch evaluates the condition after each pass.
                    let mut continuing = Block::new();
                    let cond_v = self.lower_bool_cond(cond, func, &mut continuing, ctx)?;
                    let not = func.add_value(
                        ValueKind::Unary {
                            op: UnaryOp::Not,
                            operand: cond_v,
                        },
                        self.types.bool(),
                        cond.span(),
                    );
                    let mut break_block = Block::new();
                    break_block.push(Stmt::Break);
                    continuing.push(Stmt::If {
                        cond: not,
                        then_block: break_block,
                        else_block: Block::new(),
                    });

                    block.push(Stmt::Loop {
                        body: loop_body,
                        continuing,
                    });
                    Ok(())
                })();
                ctx.loop_depth -= 1;
                self.symbols.pop_scope();
                result
            }
            ast::Stmt::For {
                init,
                cond,
                step,
                body,
                ..
            } => {
                self.symbols.push_scope();
                let result = (|| {
                    self.lower_stmt(init, func, block, ctx)?;

                    ctx.loop_depth += 1;
                    let inner = (|| {
                        let mut loop_body = Block::new();
                        if let Some(cond) = cond {
                            let cond_v =
                                self.lower_bool_cond(cond, func, &mut loop_body, ctx)?;
                            let not = func.add_value(
                                ValueKind::Unary {
                                    op: UnaryOp::Not,
                                    operand: cond_v,
                                },
                                self.types.bool(),
                                cond.span(),
                            );
                            let mut break_block = Block::new();
                            break_block.push(Stmt::Break);
                            loop_body.push(Stmt::If {
                                cond: not,
                                then_block: break_block,
                                else_block: Block::new(),
                            });
                        }
                        self.lower_stmt(body, func, &mut loop_body, ctx)?;

                        let mut continuing = Block::new();
                        if let Some(step) = step {
                            self.lower_expr(step, func, &mut continuing, ctx)?;
                        }
                        block.push(Stmt::Loop {
                            body: loop_body,
                            continuing,
                        });
                        Ok(())
                    })();
                    ctx.loop_depth -= 1;
                    inner
                })();
                self.symbols.pop_scope();
                result
            }
            ast::Stmt::Switch { value, cases, span } => {
                let value_v = self.lower_expr(value, func, block, ctx)?;
                let value_ty = func.values[value_v].ty;
                if !matches!(
                    self.types.scalar_kind(value_ty),
                    Some(ScalarKind::Int) | Some(ScalarKind::UInt)
                ) || !self.types.get(value_ty).is_scalar()
                {
                    self.log.error(
                        *span,
                        CompileError::TypeMismatch {
                            expected: "int".into(),
                            found: self.types.format(value_ty),
                        },
                    );
                    return Err(Aborted);
                }

                ctx.switch_depth += 1;
                let result = (|| {
                    let mut out_cases: Vec<SwitchCase> = Vec::new();
                    let mut pending_labels: Vec<Option<i64>> = Vec::new();
                    for case in cases {
                        let label = match &case.label {
                            None => None,
                            Some(expr) => {
                                match eval_const_expr(expr, &self.symbols, &self.module.decls)
                                    .and_then(|v| v.as_i64())
                                {
                                    Some(v) => Some(v),
                                    None => {
                                        self.log.error(
                                            expr.span(),
                                            CompileError::ConstExprExpected,
                                        );
                                        return Err(Aborted);
                                    }
                                }
                            }
                        };
                        pending_labels.push(label);
                        if case.stmts.is_empty() {
                            // Label shares the next non-empty body.
                            continue;
                        }
                        self.symbols.push_scope();
                        let mut body = Block::new();
                        let r = self.lower_block_stmts(&case.stmts, func, &mut body, ctx);
                        self.symbols.pop_scope();
                        r?;
                        out_cases.push(SwitchCase {
                            labels: std::mem::take(&mut pending_labels),
                            body,
                        });
                    }
                    if !pending_labels.is_empty() {
                        out_cases.push(SwitchCase {
                            labels: pending_labels,
                            body: Block::new(),
                        });
                    }
                    block.push(Stmt::Switch {
                        value: value_v,
                        cases: out_cases,
                    });
                    Ok(())
                })();
                ctx.switch_depth -= 1;
                result
            }
            ast::Stmt::Break(span) => {
                if ctx.loop_depth == 0 && ctx.switch_depth == 0 {
                    self.log.error(
                        *span,
                        CompileError::JumpOutsideLoop {
                            kind: "break".into(),
                        },
                    );
                    return Err(Aborted);
                }
                block.push(Stmt::Break);
                Ok(())
            }
            ast::Stmt::Continue(span) => {
                if ctx.loop_depth == 0 {
                    self.log.error(
                        *span,
                        CompileError::JumpOutsideLoop {
                            kind: "continue".into(),
                        },
                    );
                    return Err(Aborted);
                }
                block.push(Stmt::Continue);
                Ok(())
            }
            ast::Stmt::Discard(span) => {
                if self.stage != ShaderStage::Fragment {
                    self.log.error(*span, CompileError::DiscardOutsideFragment);
                    return Err(Aborted);
                }
                block.push(Stmt::Discard);
                Ok(())
            }
            ast::Stmt::Return { value, span } => {
                let void = self.types.void();
                match value {
                    None => {
                        if ctx.return_type != void {
                            self.log.error(
                                *span,
                                CompileError::ReturnTypeMismatch {
                                    expected: self.types.format(ctx.return_type),
                                    found: "void".into(),
                                },
                            );
                            return Err(Aborted);
                        }
                        block.push(Stmt::Return(None));
                    }
                    Some(expr) => {
                        let v = self.lower_expr(expr, func, block, ctx)?;
                        let from = func.values[v].ty;
                        let v = if from == ctx.return_type {
                            v
                        } else if self.types.implicitly_converts(from, ctx.return_type) {
                            func.add_value(ValueKind::Convert(v), ctx.return_type, *span)
                        } else {
                            self.log.error(
                                *span,
                                CompileError::ReturnTypeMismatch {
                                    expected: self.types.format(ctx.return_type),
                                    found: self.types.format(from),
                                },
                            );
                            return Err(Aborted);
                        };
                        block.push(Stmt::Return(Some(v)));
                    }
                }
                Ok(())
            }
        }
    }

    fn lower_local_decl(
        &mut self,
        decl: &ast::VariableDecl,
        func: &mut Function,
        block: &mut Block,
        ctx: &mut FnCtx,
    ) -> LResult<()> {
        let base_ty = self.resolve_type(&decl.ty);
        let is_const = decl.qualifiers.storage == Some(ast::StorageQualifier::Const);
        if decl
            .qualifiers
            .storage
            .is_some_and(|s| s != ast::StorageQualifier::Const)
        {
            self.log.warning_text(
                decl.span,
                "storage qualifiers on locals are ignored",
            );
        }

        for d in &decl.declarators {
            let ty = self.apply_array_suffix(base_ty, d);
            let storage = if is_const { Storage::Const } else { Storage::Local };

            let init_value = match &d.init {
                None => None,
                Some(expr) => {
                    let v = self.lower_expr(expr, func, block, ctx)?;
                    Some((self.coerce(v, ty, expr.span(), func)?, expr.span()))
                }
            };

            let const_init = match (&init_value, is_const) {
                (Some((v, _)), true) => match &func.values[func.resolve(*v)].kind {
                    ValueKind::Constant(c) => Some(c.clone()),
                    _ => {
                        self.log.error(d.span, CompileError::ConstExprExpected);
                        return Err(Aborted);
                    }
                },
                _ => None,
            };

            let decl_id = self.module.decls.alloc(Declaration {
                name: d.name.clone(),
                ty,
                storage,
                precision: decl.qualifiers.precision,
                init: const_init,
                builtin: false,
                span: d.span,
            });
            func.locals.push(decl_id);
            if self.symbols.declare_variable(&d.name, decl_id).is_err() {
                self.log.error(
                    d.span,
                    CompileError::Redeclaration {
                        name: d.name.clone(),
                    },
                );
                return Err(Aborted);
            }

            if let Some((v, _span)) = init_value {
                block.push(Stmt::Store {
                    target: StoreTarget::whole(decl_id),
                    value: v,
                });
            }
        }
        Ok(())
    }

    /// Lower an expression that must be a scalar bool.
    fn lower_bool_cond(
        &mut self,
        cond: &ast::Expr,
        func: &mut Function,
        block: &mut Block,
        ctx: &mut FnCtx,
    ) -> LResult<ValueId> {
        let v = self.lower_expr(cond, func, block, ctx)?;
        let ty = func.values[v].ty;
        if ty != self.types.bool() {
            self.log.error(
                cond.span(),
                CompileError::TypeMismatch {
                    expected: "bool".into(),
                    found: self.types.format(ty),
                },
            );
            return Err(Aborted);
        }
        Ok(v)
    }

    // ==================== EXPRESSIONS ====================

    fn lower_expr(
        &mut self,
        expr: &ast::Expr,
        func: &mut Function,
        block: &mut Block,
        ctx: &mut FnCtx,
    ) -> LResult<ValueId> {
        match expr {
            ast::Expr::IntLit { value, span } => Ok(func.add_value(
                ValueKind::Constant(ConstValue::Int(*value)),
                self.types.int(),
                *span,
            )),
            ast::Expr::UIntLit { value, span } => Ok(func.add_value(
                ValueKind::Constant(ConstValue::UInt(*value)),
                self.types.uint(),
                *span,
            )),
            ast::Expr::FloatLit { value, span } => Ok(func.add_value(
                ValueKind::Constant(ConstValue::Float(*value)),
                self.types.float(),
                *span,
            )),
            ast::Expr::BoolLit { value, span } => Ok(func.add_value(
                ValueKind::Constant(ConstValue::Bool(*value)),
                self.types.bool(),
                *span,
            )),
            ast::Expr::Ident { name, span } => {
                let Some(decl) = self.symbols.lookup_variable(name) else {
                    self.log
                        .error(*span, CompileError::Undeclared { name: name.clone() });
                    return Err(Aborted);
                };
                let ty = self.module.decls[decl].ty;
                Ok(func.add_value(ValueKind::Load(decl), ty, *span))
            }
            ast::Expr::Unary { op, expr, span } => {
                self.lower_unary(*op, expr, *span, func, block, ctx)
            }
            ast::Expr::Binary {
                op,
                left,
                right,
                span,
            } => {
                let l = self.lower_expr(left, func, block, ctx)?;
                let r = self.lower_expr(right, func, block, ctx)?;
                self.lower_binary(*op, l, r, *span, func)
            }
            ast::Expr::Conditional {
                cond,
                then_expr,
                else_expr,
                span,
            } => {
                let cond_v = self.lower_bool_cond(cond, func, block, ctx)?;

                // Lower both arms into their own blocks writing one
                // temporary; only the taken arm executes.
                let mut then_block = Block::new();
                let t = self.lower_expr(then_expr, func, &mut then_block, ctx)?;
                let mut else_block = Block::new();
                let e = self.lower_expr(else_expr, func, &mut else_block, ctx)?;

                let t_ty = func.values[t].ty;
                let e_ty = func.values[e].ty;
                let (t, e, ty) = if t_ty == e_ty {
                    (t, e, t_ty)
                } else if self.types.implicitly_converts(t_ty, e_ty) {
                    let t = func.add_value(ValueKind::Convert(t), e_ty, *span);
                    (t, e, e_ty)
                } else if self.types.implicitly_converts(e_ty, t_ty) {
                    let e = func.add_value(ValueKind::Convert(e), t_ty, *span);
                    (t, e, t_ty)
                } else {
                    self.log.error(
                        *span,
                        CompileError::TypeMismatch {
                            expected: self.types.format(t_ty),
                            found: self.types.format(e_ty),
                        },
                    );
                    return Err(Aborted);
                };

                let tmp = self.fresh_temp(ty, *span, func);
                then_block.push(Stmt::Store {
                    target: StoreTarget::whole(tmp),
                    value: t,
                });
                else_block.push(Stmt::Store {
                    target: StoreTarget::whole(tmp),
                    value: e,
                });
                block.push(Stmt::If {
                    cond: cond_v,
                    then_block,
                    else_block,
                });
                Ok(func.add_value(ValueKind::Load(tmp), ty, *span))
            }
            ast::Expr::Assign {
                op,
                target,
                value,
                span,
            } => self.lower_assign(*op, target, value, *span, func, block, ctx),
            ast::Expr::Call { name, args, span } => {
                self.lower_call(name, args, *span, func, block, ctx)
            }
            ast::Expr::Constructor { ty, args, span } => {
                self.lower_constructor(ty, args, *span, func, block, ctx)
            }
            ast::Expr::Index { base, index, span } => {
                let base_v = self.lower_expr(base, func, block, ctx)?;
                let index_v = self.lower_expr(index, func, block, ctx)?;
                let elem_ty = self.index_result_type(func.values[base_v].ty, *span)?;
                self.check_index_type(func.values[index_v].ty, index.span())?;
                self.check_const_index_bounds(func, base_v, index_v, index.span());
                Ok(func.add_value(
                    ValueKind::AccessIndex {
                        base: base_v,
                        index: index_v,
                    },
                    elem_ty,
                    *span,
                ))
            }
            ast::Expr::Field { base, field, span } => {
                let base_v = self.lower_expr(base, func, block, ctx)?;
                let base_ty = func.values[base_v].ty;
                match self.types.get(base_ty) {
                    Type::Struct { name, members } => {
                        match members.iter().position(|m| m.name == *field) {
                            Some(idx) => {
                                let ty = members[idx].ty;
                                Ok(func.add_value(
                                    ValueKind::AccessMember {
                                        base: base_v,
                                        member: idx as u32,
                                    },
                                    ty,
                                    *span,
                                ))
                            }
                            None => {
                                self.log.error(
                                    *span,
                                    CompileError::FieldNotFound {
                                        name: field.clone(),
                                        ty: name,
                                    },
                                );
                                Err(Aborted)
                            }
                        }
                    }
                    Type::Vector { kind, size } => {
                        let lanes = self.parse_swizzle(field, size, *span)?;
                        let ty = self.types.vector_or_scalar(kind, lanes.len() as u8);
                        Ok(func.add_value(
                            ValueKind::Swizzle {
                                vector: base_v,
                                components: lanes,
                            },
                            ty,
                            *span,
                        ))
                    }
                    other => {
                        self.log.error(
                            *span,
                            CompileError::FieldNotFound {
                                name: field.clone(),
                                ty: self.types.format(base_ty),
                            },
                        );
                        let _ = other;
                        Err(Aborted)
                    }
                }
            }
            ast::Expr::Comma { left, right, .. } => {
                self.lower_expr(left, func, block, ctx)?;
                self.lower_expr(right, func, block, ctx)
            }
        }
    }

    fn lower_unary(
        &mut self,
        op: ast::UnaryOp,
        operand: &ast::Expr,
        span: Span,
        func: &mut Function,
        block: &mut Block,
        ctx: &mut FnCtx,
    ) -> LResult<ValueId> {
        use crate::ast::UnaryOp as U;
        match op {
            U::Neg | U::Not | U::BitNot => {
                let v = self.lower_expr(operand, func, block, ctx)?;
                let ty = func.values[v].ty;
                let valid = match op {
                    U::Neg => self.types.get(ty).is_numeric(),
                    U::Not => ty == self.types.bool(),
                    U::BitNot => matches!(
                        self.types.scalar_kind(ty),
                        Some(ScalarKind::Int) | Some(ScalarKind::UInt)
                    ),
                    _ => unreachable!(),
                };
                if !valid {
                    self.log.error(
                        span,
                        CompileError::InvalidUnaryOperand {
                            op: op.symbol().into(),
                            operand: self.types.format(ty),
                        },
                    );
                    return Err(Aborted);
                }
                let hir_op = match op {
                    U::Neg => UnaryOp::Neg,
                    U::Not => UnaryOp::Not,
                    U::BitNot => UnaryOp::BitNot,
                    _ => unreachable!(),
                };
                Ok(func.add_value(ValueKind::Unary { op: hir_op, operand: v }, ty, span))
            }
            U::PreInc | U::PreDec | U::PostInc | U::PostDec => {
                let (target, ty) = self.lower_lvalue(operand, func, block, ctx)?;
                if !self.types.get(ty).is_numeric() {
                    self.log.error(
                        span,
                        CompileError::InvalidUnaryOperand {
                            op: op.symbol().into(),
                            operand: self.types.format(ty),
                        },
                    );
                    return Err(Aborted);
                }
                let one = self.make_one(ty, span, func);
                let bin_op = match op {
                    U::PreInc | U::PostInc => BinaryOp::Add,
                    _ => BinaryOp::Sub,
                };

                if matches!(op, U::PreInc | U::PreDec) {
                    // `++x` is a store followed by a read of the new value.
                    let old = self.load_target(&target, ty, span, func);
                    let new = func.add_value(
                        ValueKind::Binary {
                            op: bin_op,
                            left: old,
                            right: one,
                        },
                        ty,
                        span,
                    );
                    block.push(Stmt::Store { target: target.clone(), value: new });
                    return Ok(self.load_target(&target, ty, span, func));
                }

                // `x++` snapshots the old value so the result is unaffected
                // by the write that follows it.
                let old = self.load_target(&target, ty, span, func);
                let snapshot = self.fresh_temp(ty, span, func);
                block.push(Stmt::Store {
                    target: StoreTarget::whole(snapshot),
                    value: old,
                });
                let old = func.add_value(ValueKind::Load(snapshot), ty, span);
                let new = func.add_value(
                    ValueKind::Binary {
                        op: bin_op,
                        left: old,
                        right: one,
                    },
                    ty,
                    span,
                );
                block.push(Stmt::Store {
                    target,
                    value: new,
                });
                Ok(func.add_value(ValueKind::Load(snapshot), ty, span))
            }
        }
    }

    fn lower_binary(
        &mut self,
        op: ast::BinaryOp,
        l: ValueId,
        r: ValueId,
        span: Span,
        func: &mut Function,
    ) -> LResult<ValueId> {
        use crate::ast::BinaryOp as B;
        let l_ty = func.values[l].ty;
        let r_ty = func.values[r].ty;

        let fail = |s: &mut Self| {
            s.log.error(
                span,
                CompileError::InvalidOperands {
                    op: op.symbol().into(),
                    left: s.types.format(l_ty),
                    right: s.types.format(r_ty),
                },
            );
            Err(Aborted)
        };

        let hir_op = match op {
            B::Add => BinaryOp::Add,
            B::Sub => BinaryOp::Sub,
            B::Mul => BinaryOp::Mul,
            B::Div => BinaryOp::Div,
            B::Rem => BinaryOp::Rem,
            B::Shl => BinaryOp::Shl,
            B::Shr => BinaryOp::Shr,
            B::Lt => BinaryOp::Lt,
            B::Gt => BinaryOp::Gt,
            B::Le => BinaryOp::Le,
            B::Ge => BinaryOp::Ge,
            B::Eq => BinaryOp::Eq,
            B::Ne => BinaryOp::Ne,
            B::BitAnd => BinaryOp::BitAnd,
            B::BitXor => BinaryOp::BitXor,
            B::BitOr => BinaryOp::BitOr,
            B::LogicalAnd => BinaryOp::LogicalAnd,
            B::LogicalXor => BinaryOp::LogicalXor,
            B::LogicalOr => BinaryOp::LogicalOr,
        };

        match op {
            B::LogicalAnd | B::LogicalOr | B::LogicalXor => {
                let bool_ty = self.types.bool();
                if l_ty != bool_ty || r_ty != bool_ty {
                    return fail(self);
                }
                Ok(func.add_value(
                    ValueKind::Binary {
                        op: hir_op,
                        left: l,
                        right: r,
                    },
                    bool_ty,
                    span,
                ))
            }
            B::Eq | B::Ne => {
                let (l, r, ty) = match self.unify_operands(l, r, func, span) {
                    Some(v) => v,
                    None => return fail(self),
                };
                if self.types.get(ty).is_opaque() {
                    return fail(self);
                }
                let _ = ty;
                Ok(func.add_value(
                    ValueKind::Binary {
                        op: hir_op,
                        left: l,
                        right: r,
                    },
                    self.types.bool(),
                    span,
                ))
            }
            B::Lt | B::Gt | B::Le | B::Ge => {
                let (l, r, ty) = match self.unify_operands(l, r, func, span) {
                    Some(v) => v,
                    None => return fail(self),
                };
                let ok = self.types.get(ty).is_scalar()
                    && self
                        .types
                        .scalar_kind(ty)
                        .is_some_and(|k| k.is_numeric());
                if !ok {
                    return fail(self);
                }
                Ok(func.add_value(
                    ValueKind::Binary {
                        op: hir_op,
                        left: l,
                        right: r,
                    },
                    self.types.bool(),
                    span,
                ))
            }
            B::Rem | B::Shl | B::Shr | B::BitAnd | B::BitXor | B::BitOr => {
                let (l, r, ty) = match self.unify_operands(l, r, func, span) {
                    Some(v) => v,
                    None => return fail(self),
                };
                let ok = matches!(
                    self.types.scalar_kind(ty),
                    Some(ScalarKind::Int) | Some(ScalarKind::UInt)
                ) && !self.types.get(ty).is_matrix();
                if !ok {
                    return fail(self);
                }
                Ok(func.add_value(
                    ValueKind::Binary {
                        op: hir_op,
                        left: l,
                        right: r,
                    },
                    ty,
                    span,
                ))
            }
            B::Add | B::Sub | B::Mul | B::Div => {
                match self.arithmetic_result(hir_op, l, r, func, span) {
                    Some((l, r, ty)) => Ok(func.add_value(
                        ValueKind::Binary {
                            op: hir_op,
                            left: l,
                            right: r,
                        },
                        ty,
                        span,
                    )),
                    None => fail(self),
                }
            }
        }
    }

    /// Bring two operands to a common type via the implicit conversions.
    /// Returns converted operands plus the common type, or `None` when the
    /// shapes are incompatible.
    fn unify_operands(
        &mut self,
        l: ValueId,
        r: ValueId,
        func: &mut Function,
        span: Span,
    ) -> Option<(ValueId, ValueId, TypeId)> {
        let l_ty = func.values[l].ty;
        let r_ty = func.values[r].ty;
        if l_ty == r_ty {
            return Some((l, r, l_ty));
        }
        if self.types.implicitly_converts(l_ty, r_ty) {
            let l = func.add_value(ValueKind::Convert(l), r_ty, span);
            return Some((l, r, r_ty));
        }
        if self.types.implicitly_converts(r_ty, l_ty) {
            let r = func.add_value(ValueKind::Convert(r), l_ty, span);
            return Some((l, r, l_ty));
        }
        None
    }

    /// Type an arithmetic operation, handling the scalar-broadcast and
    /// linear-algebra cases. Returns converted operands and result type.
    fn arithmetic_result(
        &mut self,
        op: BinaryOp,
        l: ValueId,
        r: ValueId,
        func: &mut Function,
        span: Span,
    ) -> Option<(ValueId, ValueId, TypeId)> {
        let l_ty = func.values[l].ty;
        let r_ty = func.values[r].ty;
        let lt = self.types.get(l_ty);
        let rt = self.types.get(r_ty);

        if !lt.is_numeric() || !rt.is_numeric() {
            return None;
        }

        // Same shape after implicit conversion: component-wise, except
        // matrix*matrix which is the linear-algebra product.
        if let Some((l, r, ty)) = self.unify_operands(l, r, func, span) {
            let t = self.types.get(ty);
            if t.is_matrix() && op == BinaryOp::Mul {
                let Type::Matrix { cols, rows } = t else {
                    return None;
                };
                // Square matrices only when shapes are identical.
                if cols != rows {
                    return None;
                }
                return Some((l, r, ty));
            }
            return Some((l, r, ty));
        }

        // Scalar with vector/matrix: broadcast the scalar.
        let broadcast = |s: &mut Self,
                         func: &mut Function,
                         scalar: ValueId,
                         scalar_ty: TypeId,
                         shaped_ty: TypeId|
         -> Option<ValueId> {
            let component = s.types.component_type(shaped_ty)?;
            let target_kind = s.types.scalar_kind(shaped_ty)?;
            let scalar_target = s.types.scalar(target_kind);
            let _ = component;
            if scalar_ty == scalar_target {
                Some(scalar)
            } else if s.types.implicitly_converts(scalar_ty, scalar_target) {
                Some(func.add_value(ValueKind::Convert(scalar), scalar_target, span))
            } else {
                None
            }
        };

        if lt.is_scalar() && (rt.is_vector() || rt.is_matrix()) {
            let l = broadcast(self, func, l, l_ty, r_ty)?;
            return Some((l, r, r_ty));
        }
        if rt.is_scalar() && (lt.is_vector() || lt.is_matrix()) {
            let r = broadcast(self, func, r, r_ty, l_ty)?;
            return Some((l, r, l_ty));
        }

        // Linear algebra: matrix * vector and vector * matrix, plus
        // non-square matrix products.
        if op == BinaryOp::Mul {
            match (lt, rt) {
                (Type::Matrix { cols, rows }, Type::Vector { kind, size })
                    if kind == ScalarKind::Float && size == cols =>
                {
                    return Some((l, r, self.types.vector(ScalarKind::Float, rows)));
                }
                (Type::Vector { kind, size }, Type::Matrix { cols, rows })
                    if kind == ScalarKind::Float && size == rows =>
                {
                    return Some((l, r, self.types.vector(ScalarKind::Float, cols)));
                }
                (
                    Type::Matrix {
                        cols: a_cols,
                        rows: a_rows,
                    },
                    Type::Matrix {
                        cols: b_cols,
                        rows: b_rows,
                    },
                ) if a_cols == b_rows => {
                    return Some((l, r, self.types.matrix(b_cols, a_rows)));
                }
                _ => {}
            }
        }

        None
    }

    fn lower_assign(
        &mut self,
        op: ast::AssignOp,
        target: &ast::Expr,
        value: &ast::Expr,
        span: Span,
        func: &mut Function,
        block: &mut Block,
        ctx: &mut FnCtx,
    ) -> LResult<ValueId> {
        let (store_target, target_ty) = self.lower_lvalue(target, func, block, ctx)?;
        let rhs = self.lower_expr(value, func, block, ctx)?;

        let stored = match op.binary_op() {
            None => self.coerce(rhs, target_ty, value.span(), func)?,
            Some(bin) => {
                let old = self.load_target(&store_target, target_ty, span, func);
                let combined = self.lower_binary(bin, old, rhs, span, func)?;
                self.coerce(combined, target_ty, span, func)?
            }
        };

        block.push(Stmt::Store {
            target: store_target,
            value: stored,
        });
        Ok(stored)
    }

    fn lower_lvalue(
        &mut self,
        expr: &ast::Expr,
        func: &mut Function,
        block: &mut Block,
        ctx: &mut FnCtx,
    ) -> LResult<(StoreTarget, TypeId)> {
        match expr {
            ast::Expr::Ident { name, span } => {
                let Some(decl) = self.symbols.lookup_variable(name) else {
                    self.log
                        .error(*span, CompileError::Undeclared { name: name.clone() });
                    return Err(Aborted);
                };
                let d = &self.module.decls[decl];
                match d.storage {
                    Storage::Const => {
                        self.log
                            .error(*span, CompileError::AssignToConst { name: name.clone() });
                        return Err(Aborted);
                    }
                    Storage::Attribute | Storage::Uniform | Storage::Input => {
                        self.log.error(*span, CompileError::NotAnLValue);
                        return Err(Aborted);
                    }
                    _ => {}
                }
                Ok((StoreTarget::whole(decl), d.ty))
            }
            ast::Expr::Index { base, index, span } => {
                let (mut target, base_ty) = self.lower_lvalue(base, func, block, ctx)?;
                let index_v = self.lower_expr(index, func, block, ctx)?;
                self.check_index_type(func.values[index_v].ty, index.span())?;
                let elem_ty = self.index_result_type(base_ty, *span)?;
                target.path.push(Access::Index(index_v));
                Ok((target, elem_ty))
            }
            ast::Expr::Field { base, field, span } => {
                let (mut target, base_ty) = self.lower_lvalue(base, func, block, ctx)?;
                match self.types.get(base_ty) {
                    Type::Struct { name, members } => {
                        match members.iter().position(|m| m.name == *field) {
                            Some(idx) => {
                                target.path.push(Access::Member(idx as u32));
                                Ok((target, members[idx].ty))
                            }
                            None => {
                                self.log.error(
                                    *span,
                                    CompileError::FieldNotFound {
                                        name: field.clone(),
                                        ty: name,
                                    },
                                );
                                Err(Aborted)
                            }
                        }
                    }
                    Type::Vector { kind, size } => {
                        let lanes = self.parse_swizzle(field, size, *span)?;
                        // Writing through a swizzle needs distinct lanes.
                        let mut seen = [false; 4];
                        for &lane in &lanes {
                            if seen[lane as usize] {
                                self.log.error(
                                    *span,
                                    CompileError::InvalidSwizzle {
                                        text: field.clone(),
                                    },
                                );
                                return Err(Aborted);
                            }
                            seen[lane as usize] = true;
                        }
                        let ty = self.types.vector_or_scalar(kind, lanes.len() as u8);
                        target.path.push(Access::Swizzle(lanes));
                        Ok((target, ty))
                    }
                    _ => {
                        self.log.error(*span, CompileError::NotAnLValue);
                        Err(Aborted)
                    }
                }
            }
            _ => {
                self.log.error(expr.span(), CompileError::NotAnLValue);
                Err(Aborted)
            }
        }
    }

    /// Materialize a load of an lvalue (used by compound assignment and
    /// the increment/decrement family).
    fn load_target(
        &mut self,
        target: &StoreTarget,
        ty: TypeId,
        span: Span,
        func: &mut Function,
    ) -> ValueId {
        let decl_ty = self.module.decls[target.decl].ty;
        let mut v = func.add_value(ValueKind::Load(target.decl), decl_ty, span);
        let mut current_ty = decl_ty;
        for access in &target.path {
            match access {
                Access::Index(idx) => {
                    current_ty = self
                        .index_result_type(current_ty, span)
                        .unwrap_or_else(|_| self.types.error());
                    v = func.add_value(
                        ValueKind::AccessIndex {
                            base: v,
                            index: *idx,
                        },
                        current_ty,
                        span,
                    );
                }
                Access::Member(m) => {
                    if let Type::Struct { members, .. } = self.types.get(current_ty) {
                        current_ty = members[*m as usize].ty;
                    }
                    v = func.add_value(
                        ValueKind::AccessMember {
                            base: v,
                            member: *m,
                        },
                        current_ty,
                        span,
                    );
                }
                Access::Swizzle(lanes) => {
                    if let Type::Vector { kind, .. } = self.types.get(current_ty) {
                        current_ty = self.types.vector_or_scalar(kind, lanes.len() as u8);
                    }
                    v = func.add_value(
                        ValueKind::Swizzle {
                            vector: v,
                            components: lanes.clone(),
                        },
                        current_ty,
                        span,
                    );
                }
            }
        }
        let _ = ty;
        v
    }

    fn lower_call(
        &mut self,
        name: &str,
        args: &[ast::Expr],
        span: Span,
        func: &mut Function,
        block: &mut Block,
        ctx: &mut FnCtx,
    ) -> LResult<ValueId> {
        let mut arg_values = Vec::with_capacity(args.len());
        for arg in args {
            arg_values.push(self.lower_expr(arg, func, block, ctx)?);
        }
        let arg_types: Vec<TypeId> = arg_values.iter().map(|&v| func.values[v].ty).collect();

        let candidates: Vec<FunctionSig> = self
            .symbols
            .lookup_functions(name)
            .into_iter()
            .cloned()
            .collect();
        if candidates.is_empty() {
            if self.symbols.lookup_variable(name).is_some() {
                self.log.error(
                    span,
                    CompileError::NotAFunction {
                        name: name.to_string(),
                    },
                );
            } else {
                self.log.error(
                    span,
                    CompileError::Undeclared {
                        name: name.to_string(),
                    },
                );
            }
            return Err(Aborted);
        }

        let sig = match self.resolve_overload(name, &candidates, &arg_types, span) {
            Some(sig) => sig,
            None => return Err(Aborted),
        };

        // Insert conversions for arguments that need them.
        for (i, (&arg_ty, param)) in arg_types.iter().zip(&sig.params).enumerate() {
            if arg_ty != param.ty {
                arg_values[i] = func.add_value(ValueKind::Convert(arg_values[i]), param.ty, span);
            }
        }

        match sig.kind {
            FunctionKind::Builtin => {
                if !self
                    .module
                    .builtins_referenced
                    .iter()
                    .any(|b| b == name)
                {
                    self.module.builtins_referenced.push(name.to_string());
                }
                Ok(func.add_value(
                    ValueKind::CallBuiltin {
                        name: name.to_string(),
                        args: arg_values,
                    },
                    sig.return_type,
                    span,
                ))
            }
            FunctionKind::User(id) => {
                // Out and inout parameters copy back into the argument's
                // lvalue at the call's sequence point.
                let mut out_targets = Vec::new();
                for (i, param) in sig.params.iter().enumerate() {
                    if matches!(param.qualifier, ParamQualifier::Out | ParamQualifier::InOut) {
                        let (target, target_ty) =
                            self.lower_lvalue(&args[i], func, block, ctx)?;
                        if target_ty != param.ty {
                            self.log.error(
                                args[i].span(),
                                CompileError::TypeMismatch {
                                    expected: self.types.format(param.ty),
                                    found: self.types.format(target_ty),
                                },
                            );
                            return Err(Aborted);
                        }
                        out_targets.push((i as u32, target));
                    }
                }

                let result = func.add_value(ValueKind::CallResult(id), sig.return_type, span);
                block.push(Stmt::Call {
                    function: id,
                    args: arg_values,
                    out_targets,
                    result: Some(result),
                });
                Ok(result)
            }
        }
    }

    /// Overload resolution: an exact parameter-type match wins; otherwise
    /// there must be exactly one candidate reachable through the implicit
    /// conversions. Zero is "no matching overload", several is ambiguity —
    /// both hard errors.
    fn resolve_overload(
        &mut self,
        name: &str,
        candidates: &[FunctionSig],
        arg_types: &[TypeId],
        span: Span,
    ) -> Option<FunctionSig> {
        let arity_ok: Vec<&FunctionSig> = candidates
            .iter()
            .filter(|s| s.params.len() == arg_types.len())
            .collect();

        if let Some(exact) = arity_ok.iter().find(|s| {
            s.params
                .iter()
                .zip(arg_types)
                .all(|(p, &a)| p.ty == a)
        }) {
            return Some((*exact).clone());
        }

        let applicable: Vec<&&FunctionSig> = arity_ok
            .iter()
            .filter(|s| {
                s.params.iter().zip(arg_types).all(|(p, &a)| {
                    // Writable parameters must match exactly; conversion
                    // has nowhere to write back.
                    if matches!(p.qualifier, ParamQualifier::Out | ParamQualifier::InOut) {
                        p.ty == a
                    } else {
                        p.ty == a || self.types.implicitly_converts(a, p.ty)
                    }
                })
            })
            .collect();

        match applicable.len() {
            1 => Some((**applicable[0]).clone()),
            0 => {
                let rendered: Vec<String> =
                    arg_types.iter().map(|&t| self.types.format(t)).collect();
                self.log.error(
                    span,
                    CompileError::NoMatchingOverload {
                        name: name.to_string(),
                        args: rendered.join(", "),
                    },
                );
                None
            }
            _ => {
                self.log.error(
                    span,
                    CompileError::AmbiguousOverload {
                        name: name.to_string(),
                    },
                );
                None
            }
        }
    }

    fn lower_constructor(
        &mut self,
        ts: &ast::TypeSpecifier,
        args: &[ast::Expr],
        span: Span,
        func: &mut Function,
        block: &mut Block,
        ctx: &mut FnCtx,
    ) -> LResult<ValueId> {
        let target = self.resolve_type(ts);
        let mut arg_values = Vec::with_capacity(args.len());
        for arg in args {
            arg_values.push(self.lower_expr(arg, func, block, ctx)?);
        }
        let arg_types: Vec<TypeId> = arg_values.iter().map(|&v| func.values[v].ty).collect();

        match self.types.get(target) {
            Type::Scalar(_) => {
                // Constructor conversion between any scalar kinds; taking
                // the first component of a vector is also allowed.
                if arg_types.len() != 1
                    || !(self.types.get(arg_types[0]).is_scalar()
                        || self.types.get(arg_types[0]).is_vector())
                {
                    return Err(self.constructor_error(target, &arg_types, span));
                }
                Ok(func.add_value(ValueKind::Convert(arg_values[0]), target, span))
            }
            Type::Vector { size, .. } => {
                if arg_types
                    .iter()
                    .any(|&t| self.types.component_count(t).is_none())
                {
                    return Err(self.constructor_error(target, &arg_types, span));
                }
                let total: u32 = arg_types
                    .iter()
                    .map(|&t| self.types.component_count(t).unwrap_or(0))
                    .sum();
                let splat = arg_types.len() == 1 && self.types.get(arg_types[0]).is_scalar();
                if !splat && total != size as u32 {
                    return Err(self.constructor_error(target, &arg_types, span));
                }
                Ok(func.add_value(ValueKind::Construct(arg_values), target, span))
            }
            Type::Matrix { cols, rows } => {
                let from_matrix =
                    arg_types.len() == 1 && self.types.get(arg_types[0]).is_matrix();
                let diagonal = arg_types.len() == 1 && self.types.get(arg_types[0]).is_scalar();
                let total: u32 = arg_types
                    .iter()
                    .map(|&t| self.types.component_count(t).unwrap_or(0))
                    .sum();
                if !from_matrix && !diagonal && total != cols as u32 * rows as u32 {
                    return Err(self.constructor_error(target, &arg_types, span));
                }
                Ok(func.add_value(ValueKind::Construct(arg_values), target, span))
            }
            Type::Struct { members, .. } => {
                if arg_types.len() != members.len() {
                    return Err(self.constructor_error(target, &arg_types, span));
                }
                let mut converted = Vec::with_capacity(arg_values.len());
                for ((&v, &from), member) in
                    arg_values.iter().zip(&arg_types).zip(&members)
                {
                    if from == member.ty {
                        converted.push(v);
                    } else if self.types.implicitly_converts(from, member.ty) {
                        converted.push(func.add_value(ValueKind::Convert(v), member.ty, span));
                    } else {
                        return Err(self.constructor_error(target, &arg_types, span));
                    }
                }
                Ok(func.add_value(ValueKind::Construct(converted), target, span))
            }
            _ => Err(self.constructor_error(target, &arg_types, span)),
        }
    }

    fn constructor_error(&mut self, target: TypeId, arg_types: &[TypeId], span: Span) -> Aborted {
        let rendered: Vec<String> = arg_types.iter().map(|&t| self.types.format(t)).collect();
        self.log.error(
            span,
            CompileError::NoMatchingOverload {
                name: self.types.format(target),
                args: rendered.join(", "),
            },
        );
        Aborted
    }

    // ==================== HELPERS ====================

    /// Insert an implicit conversion to `to`, or report a type mismatch.
    fn coerce(
        &mut self,
        v: ValueId,
        to: TypeId,
        span: Span,
        func: &mut Function,
    ) -> LResult<ValueId> {
        let from = func.values[v].ty;
        if from == to {
            return Ok(v);
        }
        if self.types.implicitly_converts(from, to) {
            return Ok(func.add_value(ValueKind::Convert(v), to, span));
        }
        self.log.error(
            span,
            CompileError::TypeMismatch {
                expected: self.types.format(to),
                found: self.types.format(from),
            },
        );
        Err(Aborted)
    }

    fn index_result_type(&mut self, base: TypeId, span: Span) -> LResult<TypeId> {
        match self.types.component_type(base) {
            Some(ty) if !self.types.get(base).is_scalar() => Ok(ty),
            _ => {
                self.log.error(
                    span,
                    CompileError::TypeMismatch {
                        expected: "an indexable type".into(),
                        found: self.types.format(base),
                    },
                );
                Err(Aborted)
            }
        }
    }

    fn check_index_type(&mut self, ty: TypeId, span: Span) -> LResult<()> {
        let ok = self.types.get(ty).is_scalar()
            && matches!(
                self.types.scalar_kind(ty),
                Some(ScalarKind::Int) | Some(ScalarKind::UInt)
            );
        if ok {
            Ok(())
        } else {
            self.log.error(
                span,
                CompileError::TypeMismatch {
                    expected: "int".into(),
                    found: self.types.format(ty),
                },
            );
            Err(Aborted)
        }
    }

    /// Warn when a constant index steps outside a statically sized array.
    fn check_const_index_bounds(
        &mut self,
        func: &Function,
        base: ValueId,
        index: ValueId,
        span: Span,
    ) {
        let base_ty = func.values[base].ty;
        let Type::Array {
            size: Some(size), ..
        } = self.types.get(base_ty)
        else {
            return;
        };
        if let ValueKind::Constant(c) = &func.values[func.resolve(index)].kind {
            if let Some(i) = c.as_i64() {
                if i < 0 || i >= size as i64 {
                    self.log
                        .warning_text(span, format!("index {i} is outside [0, {size})"));
                }
            }
        }
    }

    fn make_one(&mut self, ty: TypeId, span: Span, func: &mut Function) -> ValueId {
        let kind = self.types.scalar_kind(ty).unwrap_or(ScalarKind::Float);
        let scalar = match kind {
            ScalarKind::Int => ConstValue::Int(1),
            ScalarKind::UInt => ConstValue::UInt(1),
            _ => ConstValue::Float(1.0),
        };
        let scalar_ty = self.types.scalar(kind);
        let one = func.add_value(ValueKind::Constant(scalar), scalar_ty, span);
        if self.types.get(ty).is_scalar() {
            one
        } else {
            // Splat to the operand's shape.
            func.add_value(ValueKind::Construct(vec![one]), ty, span)
        }
    }

    fn fresh_temp(&mut self, ty: TypeId, span: Span, func: &mut Function) -> DeclId {
        let name = format!("$tmp{}", self.next_temp);
        self.next_temp += 1;
        let decl = self.module.decls.alloc(Declaration {
            name,
            ty,
            storage: Storage::Local,
            precision: None,
            init: None,
            builtin: false,
            span,
        });
        func.locals.push(decl);
        decl
    }

    fn parse_swizzle(&mut self, text: &str, size: u8, span: Span) -> LResult<Vec<u8>> {
        const SETS: [&str; 3] = ["xyzw", "rgba", "stpq"];
        if text.is_empty() || text.len() > 4 {
            self.log.error(
                span,
                CompileError::InvalidSwizzle {
                    text: text.to_string(),
                },
            );
            return Err(Aborted);
        }
        for set in SETS {
            let lanes: Option<Vec<u8>> = text
                .chars()
                .map(|c| set.find(c).map(|i| i as u8))
                .collect();
            if let Some(lanes) = lanes {
                if lanes.iter().all(|&l| l < size) {
                    return Ok(lanes);
                }
                break;
            }
        }
        self.log.error(
            span,
            CompileError::InvalidSwizzle {
                text: text.to_string(),
            },
        );
        Err(Aborted)
    }
}

/// Per-function lowering context.
struct FnCtx {
    return_type: TypeId,
    loop_depth: u32,
    switch_depth: u32,
}
