//! Parser for the shading language.
//!
//! Recursive descent for declarations and statements, precedence climbing
//! for expressions. On a syntax error the parser logs a diagnostic at the
//! offending span and performs panic-mode recovery to the next statement or
//! declaration boundary, so a single run collects every syntax error in the
//! unit. The caller checks the log's error flag before trusting the tree.
//!
//! The one genuinely context-sensitive decision — is `Foo(x)` a constructor
//! and is `Foo bar;` a declaration — is made against the set of struct type
//! names declared so far, which is why new types must be declared before
//! use.

use crate::ast::*;
use crate::common::Span;
use crate::diagnostics::{CompileError, DiagnosticLog};
use crate::lexer::{LitValue, Token, TokenKind};
use crate::types::{SamplerKind, ScalarKind};
use rustc_hash::FxHashSet;

/// Marker for panic-mode recovery; the diagnostic is already logged when
/// this is returned.
#[derive(Debug)]
struct Recovered;

type PResult<T> = Result<T, Recovered>;

/// Parse a token stream into a translation unit, collecting diagnostics.
pub fn parse(tokens: &[Token], log: &mut DiagnosticLog) -> TranslationUnit {
    let mut parser = Parser::new(tokens, log);
    parser.parse_translation_unit()
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    log: &'a mut DiagnosticLog,
    /// Struct type names declared so far.
    type_names: FxHashSet<String>,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token], log: &'a mut DiagnosticLog) -> Self {
        Self {
            tokens,
            pos: 0,
            log,
            type_names: FxHashSet::default(),
        }
    }

    fn current(&self) -> &Token {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .expect("token stream always ends in Eof")
    }

    fn peek(&self) -> TokenKind {
        self.current().kind
    }

    fn peek_n(&self, n: usize) -> TokenKind {
        self.tokens
            .get(self.pos + n)
            .map(|t| t.kind)
            .unwrap_or(TokenKind::Eof)
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek() == kind
    }

    fn span(&self) -> Span {
        self.current().span
    }

    fn prev_span(&self) -> Span {
        self.tokens
            .get(self.pos.saturating_sub(1))
            .map(|t| t.span)
            .unwrap_or_default()
    }

    fn advance(&mut self) -> &Token {
        let pos = self.pos;
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        &self.tokens[pos.min(self.tokens.len() - 1)]
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> PResult<&Token> {
        if self.at(kind) {
            Ok(self.advance())
        } else {
            self.unexpected(&format!("`{}`", kind.as_str()))
        }
    }

    fn unexpected<T>(&mut self, expected: &str) -> PResult<T> {
        let tok = self.current().clone();
        if tok.kind == TokenKind::Eof {
            self.log.error(tok.span, CompileError::UnexpectedEof);
        } else {
            self.log.error(
                tok.span,
                CompileError::UnexpectedToken {
                    expected: expected.to_string(),
                    found: tok.text.clone(),
                },
            );
        }
        Err(Recovered)
    }

    /// Panic-mode recovery: discard tokens up to and including the next `;`
    /// at brace depth zero, or up to (not including) an unmatched `}`.
    fn synchronize(&mut self) {
        let mut depth = 0usize;
        loop {
            match self.peek() {
                TokenKind::Eof => return,
                TokenKind::Semi if depth == 0 => {
                    self.advance();
                    return;
                }
                TokenKind::LBrace => {
                    depth += 1;
                    self.advance();
                }
                TokenKind::RBrace => {
                    if depth == 0 {
                        return;
                    }
                    depth -= 1;
                    self.advance();
                }
                _ => {
                    self.advance();
                }
            }
        }
    }

    // ==================== TRANSLATION UNIT ====================

    fn parse_translation_unit(&mut self) -> TranslationUnit {
        let mut decls = Vec::new();
        while !self.at(TokenKind::Eof) {
            match self.parse_external_decl() {
                Ok(decl) => decls.push(decl),
                Err(Recovered) => {
                    self.synchronize();
                    // An unmatched `}` at top level would stall recovery.
                    if self.at(TokenKind::RBrace) {
                        self.advance();
                    }
                }
            }
        }
        TranslationUnit { decls }
    }

    fn parse_external_decl(&mut self) -> PResult<ExtDecl> {
        if self.at(TokenKind::Precision) {
            return self.parse_precision_decl().map(ExtDecl::Precision);
        }

        let start = self.span();
        let qualifiers = self.parse_qualifiers();
        let ty = self.parse_type_specifier()?;

        // `struct S { ... };` with no declarators.
        if self.at(TokenKind::Semi) {
            self.advance();
            return Ok(ExtDecl::Variable(VariableDecl {
                qualifiers,
                ty,
                declarators: Vec::new(),
                span: start.merge(self.prev_span()),
            }));
        }

        // A name followed by `(` begins a function definition or prototype.
        if self.at(TokenKind::Ident) && self.peek_n(1) == TokenKind::LParen {
            let name = self.advance().text.clone();
            return self.parse_function(ty, name, start).map(ExtDecl::Function);
        }

        let decl = self.parse_declarator_list(qualifiers, ty, start)?;
        Ok(ExtDecl::Variable(decl))
    }

    fn parse_precision_decl(&mut self) -> PResult<PrecisionDecl> {
        let start = self.span();
        self.expect(TokenKind::Precision)?;
        let precision = self.parse_precision_qualifier()?;
        let ty = self.parse_type_specifier()?;
        self.expect(TokenKind::Semi)?;
        Ok(PrecisionDecl {
            precision,
            ty,
            span: start.merge(self.prev_span()),
        })
    }

    fn parse_precision_qualifier(&mut self) -> PResult<PrecisionQualifier> {
        match self.peek() {
            TokenKind::HighP => {
                self.advance();
                Ok(PrecisionQualifier::High)
            }
            TokenKind::MediumP => {
                self.advance();
                Ok(PrecisionQualifier::Medium)
            }
            TokenKind::LowP => {
                self.advance();
                Ok(PrecisionQualifier::Low)
            }
            _ => self.unexpected("a precision qualifier"),
        }
    }

    // ==================== QUALIFIERS & TYPES ====================

    fn parse_qualifiers(&mut self) -> Qualifiers {
        let mut quals = Qualifiers::default();
        loop {
            match self.peek() {
                TokenKind::Const => {
                    self.advance();
                    quals.storage = Some(StorageQualifier::Const);
                }
                TokenKind::Attribute => {
                    self.advance();
                    quals.storage = Some(StorageQualifier::Attribute);
                }
                TokenKind::Varying => {
                    self.advance();
                    quals.storage = Some(StorageQualifier::Varying);
                }
                TokenKind::Uniform => {
                    self.advance();
                    quals.storage = Some(StorageQualifier::Uniform);
                }
                TokenKind::In => {
                    self.advance();
                    quals.storage = Some(StorageQualifier::In);
                }
                TokenKind::Out => {
                    self.advance();
                    quals.storage = Some(StorageQualifier::Out);
                }
                TokenKind::Centroid => {
                    self.advance();
                    quals.centroid = true;
                }
                TokenKind::Invariant => {
                    self.advance();
                    quals.invariant = true;
                }
                TokenKind::HighP => {
                    self.advance();
                    quals.precision = Some(PrecisionQualifier::High);
                }
                TokenKind::MediumP => {
                    self.advance();
                    quals.precision = Some(PrecisionQualifier::Medium);
                }
                TokenKind::LowP => {
                    self.advance();
                    quals.precision = Some(PrecisionQualifier::Low);
                }
                _ => break,
            }
        }
        quals
    }

    fn builtin_type_of(kind: TokenKind) -> Option<BuiltinType> {
        use ScalarKind::*;
        Some(match kind {
            TokenKind::Void => BuiltinType::Void,
            TokenKind::Bool => BuiltinType::Scalar(Bool),
            TokenKind::Int => BuiltinType::Scalar(Int),
            TokenKind::Uint => BuiltinType::Scalar(UInt),
            TokenKind::Float => BuiltinType::Scalar(Float),
            TokenKind::Vec2 => BuiltinType::Vector(Float, 2),
            TokenKind::Vec3 => BuiltinType::Vector(Float, 3),
            TokenKind::Vec4 => BuiltinType::Vector(Float, 4),
            TokenKind::BVec2 => BuiltinType::Vector(Bool, 2),
            TokenKind::BVec3 => BuiltinType::Vector(Bool, 3),
            TokenKind::BVec4 => BuiltinType::Vector(Bool, 4),
            TokenKind::IVec2 => BuiltinType::Vector(Int, 2),
            TokenKind::IVec3 => BuiltinType::Vector(Int, 3),
            TokenKind::IVec4 => BuiltinType::Vector(Int, 4),
            TokenKind::UVec2 => BuiltinType::Vector(UInt, 2),
            TokenKind::UVec3 => BuiltinType::Vector(UInt, 3),
            TokenKind::UVec4 => BuiltinType::Vector(UInt, 4),
            TokenKind::Mat2 | TokenKind::Mat2x2 => BuiltinType::Matrix(2, 2),
            TokenKind::Mat3 | TokenKind::Mat3x3 => BuiltinType::Matrix(3, 3),
            TokenKind::Mat4 | TokenKind::Mat4x4 => BuiltinType::Matrix(4, 4),
            TokenKind::Mat2x3 => BuiltinType::Matrix(2, 3),
            TokenKind::Mat2x4 => BuiltinType::Matrix(2, 4),
            TokenKind::Mat3x2 => BuiltinType::Matrix(3, 2),
            TokenKind::Mat3x4 => BuiltinType::Matrix(3, 4),
            TokenKind::Mat4x2 => BuiltinType::Matrix(4, 2),
            TokenKind::Mat4x3 => BuiltinType::Matrix(4, 3),
            TokenKind::Sampler1D => BuiltinType::Sampler(SamplerKind::Sampler1D),
            TokenKind::Sampler2D => BuiltinType::Sampler(SamplerKind::Sampler2D),
            TokenKind::Sampler3D => BuiltinType::Sampler(SamplerKind::Sampler3D),
            TokenKind::SamplerCube => BuiltinType::Sampler(SamplerKind::SamplerCube),
            TokenKind::Sampler1DShadow => BuiltinType::Sampler(SamplerKind::Sampler1DShadow),
            TokenKind::Sampler2DShadow => BuiltinType::Sampler(SamplerKind::Sampler2DShadow),
            TokenKind::Sampler2DArray => BuiltinType::Sampler(SamplerKind::Sampler2DArray),
            _ => return None,
        })
    }

    fn parse_type_specifier(&mut self) -> PResult<TypeSpecifier> {
        let span = self.span();
        if let Some(ty) = Self::builtin_type_of(self.peek()) {
            self.advance();
            return Ok(TypeSpecifier::Builtin { ty, span });
        }
        match self.peek() {
            TokenKind::Struct => {
                let def = self.parse_struct_def()?;
                Ok(TypeSpecifier::Struct {
                    span: span.merge(self.prev_span()),
                    def,
                })
            }
            TokenKind::Ident if self.type_names.contains(&self.current().text) => {
                let name = self.advance().text.clone();
                Ok(TypeSpecifier::Named { name, span })
            }
            _ => self.unexpected("a type"),
        }
    }

    fn parse_struct_def(&mut self) -> PResult<StructDef> {
        let start = self.span();
        self.expect(TokenKind::Struct)?;
        let name = if self.at(TokenKind::Ident) {
            Some(self.advance().text.clone())
        } else {
            None
        };
        self.expect(TokenKind::LBrace)?;

        let mut fields = Vec::new();
        while !self.at(TokenKind::RBrace) && !self.at(TokenKind::Eof) {
            let field_start = self.span();
            let ty = self.parse_type_specifier()?;
            let mut declarators = Vec::new();
            loop {
                declarators.push(self.parse_declarator(false)?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::Semi)?;
            fields.push(StructField {
                ty,
                declarators,
                span: field_start.merge(self.prev_span()),
            });
        }
        self.expect(TokenKind::RBrace)?;

        // The name is usable immediately after the closing brace.
        if let Some(name) = &name {
            self.type_names.insert(name.clone());
        }

        Ok(StructDef {
            name,
            fields,
            span: start.merge(self.prev_span()),
        })
    }

    // ==================== DECLARATIONS ====================

    fn parse_declarator(&mut self, allow_init: bool) -> PResult<Declarator> {
        let start = self.span();
        let name = self.expect(TokenKind::Ident)?.text.clone();

        let array_size = if self.eat(TokenKind::LBracket) {
            if self.eat(TokenKind::RBracket) {
                Some(None)
            } else {
                let size = self.parse_assignment_expr()?;
                self.expect(TokenKind::RBracket)?;
                Some(Some(Box::new(size)))
            }
        } else {
            None
        };

        let init = if allow_init && self.eat(TokenKind::Eq) {
            Some(self.parse_assignment_expr()?)
        } else {
            None
        };

        Ok(Declarator {
            name,
            array_size,
            init,
            span: start.merge(self.prev_span()),
        })
    }

    fn parse_declarator_list(
        &mut self,
        qualifiers: Qualifiers,
        ty: TypeSpecifier,
        start: Span,
    ) -> PResult<VariableDecl> {
        let mut declarators = Vec::new();
        loop {
            declarators.push(self.parse_declarator(true)?);
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::Semi)?;
        Ok(VariableDecl {
            qualifiers,
            ty,
            declarators,
            span: start.merge(self.prev_span()),
        })
    }

    // ==================== FUNCTIONS ====================

    fn parse_function(
        &mut self,
        return_ty: TypeSpecifier,
        name: String,
        start: Span,
    ) -> PResult<FunctionDef> {
        self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        if !self.at(TokenKind::RParen) {
            loop {
                params.push(self.parse_param()?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen)?;

        // `f(void)` declares an empty parameter list.
        if params.len() == 1
            && params[0].name.is_none()
            && matches!(
                params[0].ty,
                TypeSpecifier::Builtin {
                    ty: BuiltinType::Void,
                    ..
                }
            )
        {
            params.clear();
        }

        let proto = FunctionProto {
            return_ty,
            name,
            params,
            span: start.merge(self.prev_span()),
        };

        let body = if self.eat(TokenKind::Semi) {
            None
        } else {
            Some(self.parse_block()?)
        };

        Ok(FunctionDef {
            proto,
            body,
            span: start.merge(self.prev_span()),
        })
    }

    fn parse_param(&mut self) -> PResult<ParamDecl> {
        let start = self.span();
        let mut is_const = false;
        let mut qualifier = ParamQualifier::In;
        loop {
            match self.peek() {
                TokenKind::Const => {
                    self.advance();
                    is_const = true;
                }
                TokenKind::In => {
                    self.advance();
                    qualifier = ParamQualifier::In;
                }
                TokenKind::Out => {
                    self.advance();
                    qualifier = ParamQualifier::Out;
                }
                TokenKind::InOut => {
                    self.advance();
                    qualifier = ParamQualifier::InOut;
                }
                TokenKind::HighP | TokenKind::MediumP | TokenKind::LowP => {
                    self.advance();
                }
                _ => break,
            }
        }

        let ty = self.parse_type_specifier()?;
        let name = if self.at(TokenKind::Ident) {
            Some(self.advance().text.clone())
        } else {
            None
        };
        let array_size = if self.eat(TokenKind::LBracket) {
            let size = self.parse_assignment_expr()?;
            self.expect(TokenKind::RBracket)?;
            Some(Box::new(size))
        } else {
            None
        };

        Ok(ParamDecl {
            qualifier,
            is_const,
            ty,
            name,
            array_size,
            span: start.merge(self.prev_span()),
        })
    }

    // ==================== STATEMENTS ====================

    fn parse_block(&mut self) -> PResult<BlockStmt> {
        let start = self.span();
        self.expect(TokenKind::LBrace)?;
        let mut stmts = Vec::new();
        while !self.at(TokenKind::RBrace) && !self.at(TokenKind::Eof) {
            match self.parse_statement() {
                Ok(stmt) => stmts.push(stmt),
                Err(Recovered) => self.synchronize(),
            }
        }
        self.expect(TokenKind::RBrace)?;
        Ok(BlockStmt {
            stmts,
            span: start.merge(self.prev_span()),
        })
    }

    /// Declaration vs expression statement, resolved with one token of
    /// lookahead against the known type names.
    fn starts_declaration(&self) -> bool {
        let kind = self.peek();
        if kind.is_qualifier_keyword() || kind == TokenKind::Struct {
            return true;
        }
        if kind.is_type_keyword() || (kind == TokenKind::Ident
            && self.type_names.contains(&self.current().text))
        {
            // `vec3(1.0)` is a constructor expression, `vec3 v` a
            // declaration.
            return self.peek_n(1) != TokenKind::LParen;
        }
        false
    }

    fn parse_statement(&mut self) -> PResult<Stmt> {
        let start = self.span();
        match self.peek() {
            TokenKind::LBrace => Ok(Stmt::Compound(self.parse_block()?)),
            TokenKind::If => self.parse_if(),
            TokenKind::For => self.parse_for(),
            TokenKind::While => self.parse_while(),
            TokenKind::Do => self.parse_do_while(),
            TokenKind::Switch => self.parse_switch(),
            TokenKind::Break => {
                self.advance();
                self.expect(TokenKind::Semi)?;
                Ok(Stmt::Break(start.merge(self.prev_span())))
            }
            TokenKind::Continue => {
                self.advance();
                self.expect(TokenKind::Semi)?;
                Ok(Stmt::Continue(start.merge(self.prev_span())))
            }
            TokenKind::Discard => {
                self.advance();
                self.expect(TokenKind::Semi)?;
                Ok(Stmt::Discard(start.merge(self.prev_span())))
            }
            TokenKind::Return => {
                self.advance();
                let value = if self.at(TokenKind::Semi) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.expect(TokenKind::Semi)?;
                Ok(Stmt::Return {
                    value,
                    span: start.merge(self.prev_span()),
                })
            }
            TokenKind::Semi => {
                self.advance();
                Ok(Stmt::Expr {
                    expr: None,
                    span: start,
                })
            }
            _ if self.starts_declaration() => {
                let qualifiers = self.parse_qualifiers();
                let ty = self.parse_type_specifier()?;
                if self.at(TokenKind::Semi) {
                    // Local struct definition with no declarators.
                    self.advance();
                    return Ok(Stmt::Decl(VariableDecl {
                        qualifiers,
                        ty,
                        declarators: Vec::new(),
                        span: start.merge(self.prev_span()),
                    }));
                }
                let decl = self.parse_declarator_list(qualifiers, ty, start)?;
                Ok(Stmt::Decl(decl))
            }
            _ => {
                let expr = self.parse_expr()?;
                self.expect(TokenKind::Semi)?;
                Ok(Stmt::Expr {
                    expr: Some(expr),
                    span: start.merge(self.prev_span()),
                })
            }
        }
    }

    fn parse_if(&mut self) -> PResult<Stmt> {
        let start = self.span();
        self.expect(TokenKind::If)?;
        self.expect(TokenKind::LParen)?;
        let cond = self.parse_expr()?;
        self.expect(TokenKind::RParen)?;
        let then_branch = Box::new(self.parse_statement()?);
        let else_branch = if self.eat(TokenKind::Else) {
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };
        Ok(Stmt::If {
            cond,
            then_branch,
            else_branch,
            span: start.merge(self.prev_span()),
        })
    }

    fn parse_for(&mut self) -> PResult<Stmt> {
        let start = self.span();
        self.expect(TokenKind::For)?;
        self.expect(TokenKind::LParen)?;

        let init = if self.at(TokenKind::Semi) {
            self.advance();
            Box::new(Stmt::Expr {
                expr: None,
                span: self.prev_span(),
            })
        } else if self.starts_declaration() {
            let decl_start = self.span();
            let qualifiers = self.parse_qualifiers();
            let ty = self.parse_type_specifier()?;
            Box::new(Stmt::Decl(self.parse_declarator_list(
                qualifiers, ty, decl_start,
            )?))
        } else {
            let expr_start = self.span();
            let expr = self.parse_expr()?;
            self.expect(TokenKind::Semi)?;
            Box::new(Stmt::Expr {
                expr: Some(expr),
                span: expr_start.merge(self.prev_span()),
            })
        };

        let cond = if self.at(TokenKind::Semi) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(TokenKind::Semi)?;

        let step = if self.at(TokenKind::RParen) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(TokenKind::RParen)?;

        let body = Box::new(self.parse_statement()?);
        Ok(Stmt::For {
            init,
            cond,
            step,
            body,
            span: start.merge(self.prev_span()),
        })
    }

    fn parse_while(&mut self) -> PResult<Stmt> {
        let start = self.span();
        self.expect(TokenKind::While)?;
        self.expect(TokenKind::LParen)?;
        let cond = self.parse_expr()?;
        self.expect(TokenKind::RParen)?;
        let body = Box::new(self.parse_statement()?);
        Ok(Stmt::While {
            cond,
            body,
            span: start.merge(self.prev_span()),
        })
    }

    fn parse_do_while(&mut self) -> PResult<Stmt> {
        let start = self.span();
        self.expect(TokenKind::Do)?;
        let body = Box::new(self.parse_statement()?);
        self.expect(TokenKind::While)?;
        self.expect(TokenKind::LParen)?;
        let cond = self.parse_expr()?;
        self.expect(TokenKind::RParen)?;
        self.expect(TokenKind::Semi)?;
        Ok(Stmt::DoWhile {
            body,
            cond,
            span: start.merge(self.prev_span()),
        })
    }

    fn parse_switch(&mut self) -> PResult<Stmt> {
        let start = self.span();
        self.expect(TokenKind::Switch)?;
        self.expect(TokenKind::LParen)?;
        let value = self.parse_expr()?;
        self.expect(TokenKind::RParen)?;
        self.expect(TokenKind::LBrace)?;

        let mut cases: Vec<SwitchCase> = Vec::new();
        while !self.at(TokenKind::RBrace) && !self.at(TokenKind::Eof) {
            let case_start = self.span();
            let label = match self.peek() {
                TokenKind::Case => {
                    self.advance();
                    let label = self.parse_expr()?;
                    self.expect(TokenKind::Colon)?;
                    Some(label)
                }
                TokenKind::Default => {
                    self.advance();
                    self.expect(TokenKind::Colon)?;
                    None
                }
                _ => return self.unexpected("`case` or `default`"),
            };

            let mut stmts = Vec::new();
            while !matches!(
                self.peek(),
                TokenKind::Case | TokenKind::Default | TokenKind::RBrace | TokenKind::Eof
            ) {
                match self.parse_statement() {
                    Ok(stmt) => stmts.push(stmt),
                    Err(Recovered) => self.synchronize(),
                }
            }
            cases.push(SwitchCase {
                label,
                stmts,
                span: case_start.merge(self.prev_span()),
            });
        }
        self.expect(TokenKind::RBrace)?;
        Ok(Stmt::Switch {
            value,
            cases,
            span: start.merge(self.prev_span()),
        })
    }

    // ==================== EXPRESSIONS ====================

    /// Full expression, comma operator included.
    fn parse_expr(&mut self) -> PResult<Expr> {
        let start = self.span();
        let mut expr = self.parse_assignment_expr()?;
        while self.eat(TokenKind::Comma) {
            let right = self.parse_assignment_expr()?;
            expr = Expr::Comma {
                left: Box::new(expr),
                right: Box::new(right),
                span: start.merge(self.prev_span()),
            };
        }
        Ok(expr)
    }

    /// Assignment expression (no comma); right associative.
    fn parse_assignment_expr(&mut self) -> PResult<Expr> {
        let start = self.span();
        let left = self.parse_conditional_expr()?;

        let op = match self.peek() {
            TokenKind::Eq => AssignOp::Assign,
            TokenKind::PlusEq => AssignOp::Add,
            TokenKind::MinusEq => AssignOp::Sub,
            TokenKind::StarEq => AssignOp::Mul,
            TokenKind::SlashEq => AssignOp::Div,
            TokenKind::PercentEq => AssignOp::Rem,
            TokenKind::ShlEq => AssignOp::Shl,
            TokenKind::ShrEq => AssignOp::Shr,
            TokenKind::AmpEq => AssignOp::And,
            TokenKind::CaretEq => AssignOp::Xor,
            TokenKind::PipeEq => AssignOp::Or,
            _ => return Ok(left),
        };
        self.advance();
        let value = self.parse_assignment_expr()?;
        Ok(Expr::Assign {
            op,
            target: Box::new(left),
            value: Box::new(value),
            span: start.merge(self.prev_span()),
        })
    }

    fn parse_conditional_expr(&mut self) -> PResult<Expr> {
        let start = self.span();
        let cond = self.parse_binary_expr(0)?;
        if !self.eat(TokenKind::Question) {
            return Ok(cond);
        }
        let then_expr = self.parse_expr()?;
        self.expect(TokenKind::Colon)?;
        let else_expr = self.parse_assignment_expr()?;
        Ok(Expr::Conditional {
            cond: Box::new(cond),
            then_expr: Box::new(then_expr),
            else_expr: Box::new(else_expr),
            span: start.merge(self.prev_span()),
        })
    }

    fn binary_op_info(&self) -> Option<(BinaryOp, u8)> {
        let info = match self.peek() {
            TokenKind::PipePipe => (BinaryOp::LogicalOr, 1),
            TokenKind::CaretCaret => (BinaryOp::LogicalXor, 2),
            TokenKind::AmpAmp => (BinaryOp::LogicalAnd, 3),
            TokenKind::Pipe => (BinaryOp::BitOr, 4),
            TokenKind::Caret => (BinaryOp::BitXor, 5),
            TokenKind::Amp => (BinaryOp::BitAnd, 6),
            TokenKind::EqEq => (BinaryOp::Eq, 7),
            TokenKind::Ne => (BinaryOp::Ne, 7),
            TokenKind::Lt => (BinaryOp::Lt, 8),
            TokenKind::Gt => (BinaryOp::Gt, 8),
            TokenKind::Le => (BinaryOp::Le, 8),
            TokenKind::Ge => (BinaryOp::Ge, 8),
            TokenKind::Shl => (BinaryOp::Shl, 9),
            TokenKind::Shr => (BinaryOp::Shr, 9),
            TokenKind::Plus => (BinaryOp::Add, 10),
            TokenKind::Minus => (BinaryOp::Sub, 10),
            TokenKind::Star => (BinaryOp::Mul, 11),
            TokenKind::Slash => (BinaryOp::Div, 11),
            TokenKind::Percent => (BinaryOp::Rem, 11),
            _ => return None,
        };
        Some(info)
    }

    /// Precedence climbing over the binary operator table. All binary
    /// operators in this language are left associative.
    fn parse_binary_expr(&mut self, min_prec: u8) -> PResult<Expr> {
        let start = self.span();
        let mut left = self.parse_unary_expr()?;

        while let Some((op, prec)) = self.binary_op_info() {
            if prec < min_prec {
                break;
            }
            self.advance();
            let right = self.parse_binary_expr(prec + 1)?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
                span: start.merge(self.prev_span()),
            };
        }
        Ok(left)
    }

    fn parse_unary_expr(&mut self) -> PResult<Expr> {
        let start = self.span();
        let op = match self.peek() {
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Bang => Some(UnaryOp::Not),
            TokenKind::Tilde => Some(UnaryOp::BitNot),
            TokenKind::PlusPlus => Some(UnaryOp::PreInc),
            TokenKind::MinusMinus => Some(UnaryOp::PreDec),
            TokenKind::Plus => {
                // Unary plus is a no-op.
                self.advance();
                return self.parse_unary_expr();
            }
            _ => None,
        };
        match op {
            Some(op) => {
                self.advance();
                let expr = self.parse_unary_expr()?;
                Ok(Expr::Unary {
                    op,
                    expr: Box::new(expr),
                    span: start.merge(self.prev_span()),
                })
            }
            None => self.parse_postfix_expr(),
        }
    }

    fn parse_postfix_expr(&mut self) -> PResult<Expr> {
        let start = self.span();
        let mut expr = self.parse_primary_expr()?;

        loop {
            match self.peek() {
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.parse_expr()?;
                    self.expect(TokenKind::RBracket)?;
                    expr = Expr::Index {
                        base: Box::new(expr),
                        index: Box::new(index),
                        span: start.merge(self.prev_span()),
                    };
                }
                TokenKind::Dot => {
                    self.advance();
                    let field = self.expect(TokenKind::Ident)?.text.clone();
                    expr = Expr::Field {
                        base: Box::new(expr),
                        field,
                        span: start.merge(self.prev_span()),
                    };
                }
                TokenKind::PlusPlus => {
                    self.advance();
                    expr = Expr::Unary {
                        op: UnaryOp::PostInc,
                        expr: Box::new(expr),
                        span: start.merge(self.prev_span()),
                    };
                }
                TokenKind::MinusMinus => {
                    self.advance();
                    expr = Expr::Unary {
                        op: UnaryOp::PostDec,
                        expr: Box::new(expr),
                        span: start.merge(self.prev_span()),
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_call_args(&mut self) -> PResult<Vec<Expr>> {
        self.expect(TokenKind::LParen)?;
        let mut args = Vec::new();
        if !self.at(TokenKind::RParen) {
            // `f(void)` is an empty argument list.
            if self.at(TokenKind::Void) && self.peek_n(1) == TokenKind::RParen {
                self.advance();
            } else {
                loop {
                    args.push(self.parse_assignment_expr()?);
                    if !self.eat(TokenKind::Comma) {
                        break;
                    }
                }
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(args)
    }

    fn parse_primary_expr(&mut self) -> PResult<Expr> {
        let span = self.span();

        // Constructor from a built-in type keyword: `vec3(...)`.
        if let Some(ty) = Self::builtin_type_of(self.peek()) {
            self.advance();
            let args = self.parse_call_args()?;
            return Ok(Expr::Constructor {
                ty: TypeSpecifier::Builtin { ty, span },
                args,
                span: span.merge(self.prev_span()),
            });
        }

        match self.peek() {
            TokenKind::IntLit => {
                let tok = self.advance();
                match tok.value {
                    Some(LitValue::UInt(value)) => Ok(Expr::UIntLit { value, span }),
                    Some(LitValue::Int(value)) => Ok(Expr::IntLit { value, span }),
                    _ => Ok(Expr::IntLit { value: 0, span }),
                }
            }
            TokenKind::FloatLit => {
                let tok = self.advance();
                let value = match tok.value {
                    Some(LitValue::Float(v)) => v,
                    _ => 0.0,
                };
                Ok(Expr::FloatLit { value, span })
            }
            TokenKind::True => {
                self.advance();
                Ok(Expr::BoolLit { value: true, span })
            }
            TokenKind::False => {
                self.advance();
                Ok(Expr::BoolLit { value: false, span })
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(expr)
            }
            TokenKind::Ident => {
                let name = self.advance().text.clone();
                if self.at(TokenKind::LParen) {
                    let args = self.parse_call_args()?;
                    let span = span.merge(self.prev_span());
                    if self.type_names.contains(&name) {
                        Ok(Expr::Constructor {
                            ty: TypeSpecifier::Named { name, span },
                            args,
                            span,
                        })
                    } else {
                        Ok(Expr::Call { name, args, span })
                    }
                } else {
                    Ok(Expr::Ident { name, span })
                }
            }
            _ => self.unexpected("an expression"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer;
    use crate::options::Profile;

    fn parse_ok(src: &str) -> TranslationUnit {
        let mut log = DiagnosticLog::new();
        let tokens = lexer::lex(src, 130, Profile::Core, &mut log);
        let unit = parse(&tokens, &mut log);
        assert!(!log.has_errors(), "unexpected errors: {:?}", log.entries());
        unit
    }

    fn parse_err(src: &str) -> (TranslationUnit, DiagnosticLog) {
        let mut log = DiagnosticLog::new();
        let tokens = lexer::lex(src, 130, Profile::Core, &mut log);
        let unit = parse(&tokens, &mut log);
        assert!(log.has_errors(), "expected errors for {src:?}");
        (unit, log)
    }

    #[test]
    fn test_empty_main() {
        let unit = parse_ok("void main() { }");
        assert_eq!(unit.decls.len(), 1);
        match &unit.decls[0] {
            ExtDecl::Function(f) => {
                assert_eq!(f.proto.name, "main");
                assert!(f.proto.params.is_empty());
                assert!(f.body.is_some());
            }
            other => panic!("expected function, got {other:?}"),
        }
    }

    #[test]
    fn test_void_param_list_is_empty() {
        let unit = parse_ok("float f(void) { return 1.0; }");
        match &unit.decls[0] {
            ExtDecl::Function(f) => assert!(f.proto.params.is_empty()),
            other => panic!("expected function, got {other:?}"),
        }
    }

    #[test]
    fn test_precedence() {
        let unit = parse_ok("void main() { int x = 1 + 2 * 3; }");
        let ExtDecl::Function(f) = &unit.decls[0] else {
            panic!("expected function");
        };
        let body = f.body.as_ref().unwrap();
        let Stmt::Decl(decl) = &body.stmts[0] else {
            panic!("expected declaration");
        };
        // 1 + (2 * 3): the top node is Add.
        match decl.declarators[0].init.as_ref().unwrap() {
            Expr::Binary { op: BinaryOp::Add, right, .. } => {
                assert!(matches!(**right, Expr::Binary { op: BinaryOp::Mul, .. }));
            }
            other => panic!("expected binary add, got {other:?}"),
        }
    }

    #[test]
    fn test_constructor_vs_declaration() {
        let unit = parse_ok("void main() { vec3 v = vec3(1.0); }");
        let ExtDecl::Function(f) = &unit.decls[0] else {
            panic!("expected function");
        };
        let Stmt::Decl(decl) = &f.body.as_ref().unwrap().stmts[0] else {
            panic!("expected declaration statement");
        };
        assert!(matches!(
            decl.declarators[0].init,
            Some(Expr::Constructor { .. })
        ));
    }

    #[test]
    fn test_struct_name_usable_after_declaration() {
        let unit = parse_ok(
            "struct Light { vec3 dir; float power; };\n\
             void main() { Light l = Light(vec3(1.0), 2.0); }",
        );
        assert_eq!(unit.decls.len(), 2);
    }

    #[test]
    fn test_uniform_declarations() {
        let unit = parse_ok("uniform sampler2D tex;\nvarying vec2 uv;\n");
        assert_eq!(unit.decls.len(), 2);
        let ExtDecl::Variable(d) = &unit.decls[0] else {
            panic!("expected variable");
        };
        assert_eq!(d.qualifiers.storage, Some(StorageQualifier::Uniform));
    }

    #[test]
    fn test_array_declarator() {
        let unit = parse_ok("uniform vec4 lights[8];");
        let ExtDecl::Variable(d) = &unit.decls[0] else {
            panic!("expected variable");
        };
        assert!(d.declarators[0].array_size.is_some());
    }

    #[test]
    fn test_for_loop() {
        let unit = parse_ok(
            "void main() { for (int i = 0; i < 4; ++i) { } }",
        );
        let ExtDecl::Function(f) = &unit.decls[0] else {
            panic!("expected function");
        };
        assert!(matches!(
            f.body.as_ref().unwrap().stmts[0],
            Stmt::For { .. }
        ));
    }

    #[test]
    fn test_switch_statement() {
        let unit = parse_ok(
            "void main() { int x = 0; switch (x) { case 0: x = 1; break; default: x = 2; } }",
        );
        let ExtDecl::Function(f) = &unit.decls[0] else {
            panic!("expected function");
        };
        let Stmt::Switch { cases, .. } = &f.body.as_ref().unwrap().stmts[1] else {
            panic!("expected switch");
        };
        assert_eq!(cases.len(), 2);
        assert!(cases[0].label.is_some());
        assert!(cases[1].label.is_none());
    }

    #[test]
    fn test_swizzle_and_index() {
        parse_ok("void main() { vec4 v = vec4(1.0); float x = v.xy[0]; }");
    }

    #[test]
    fn test_comma_and_conditional() {
        parse_ok("void main() { int a = 1; int b = (a = 2, a > 1 ? 3 : 4); }");
    }

    #[test]
    fn test_two_errors_both_reported() {
        let (_, log) = parse_err("void main() { float x = ; int y = @; }");
        assert!(
            log.error_count() >= 2,
            "expected two diagnostics, got {:?}",
            log.entries()
        );
    }

    #[test]
    fn test_recovery_continues_to_next_function() {
        let (unit, _) = parse_err("void broken() { float x = ; }\nvoid ok() { }");
        // The second function still parses.
        assert!(unit
            .decls
            .iter()
            .any(|d| matches!(d, ExtDecl::Function(f) if f.proto.name == "ok")));
    }

    #[test]
    fn test_prototype() {
        let unit = parse_ok("float helper(float x);");
        let ExtDecl::Function(f) = &unit.decls[0] else {
            panic!("expected function");
        };
        assert!(f.body.is_none());
    }

    #[test]
    fn test_out_params() {
        let unit = parse_ok("void split(in float v, out float a, inout float b) { a = v; }");
        let ExtDecl::Function(f) = &unit.decls[0] else {
            panic!("expected function");
        };
        assert_eq!(f.proto.params[1].qualifier, ParamQualifier::Out);
        assert_eq!(f.proto.params[2].qualifier, ParamQualifier::InOut);
    }
}
