//! Abstract syntax tree produced by the parser.
//!
//! Purely structural: nodes carry source spans and no semantic information.
//! Each node category is a closed enum so lowering passes get exhaustiveness
//! checking when a node kind is added.

use crate::common::Span;
use crate::types::{SamplerKind, ScalarKind};
use serde::{Deserialize, Serialize};

/// One parsed compilation unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationUnit {
    pub decls: Vec<ExtDecl>,
}

/// External (file-scope) declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExtDecl {
    Variable(VariableDecl),
    Function(FunctionDef),
    Precision(PrecisionDecl),
}

/// `precision highp float;`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrecisionDecl {
    pub precision: PrecisionQualifier,
    pub ty: TypeSpecifier,
    pub span: Span,
}

/// A declaration statement: qualifiers, a type specifier, and one or more
/// declarators (`uniform vec4 a, b[2];`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableDecl {
    pub qualifiers: Qualifiers,
    pub ty: TypeSpecifier,
    pub declarators: Vec<Declarator>,
    pub span: Span,
}

/// One declared name within a [`VariableDecl`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Declarator {
    pub name: String,
    /// `None`: not an array. `Some(None)`: unsized `[]`.
    /// `Some(Some(expr))`: sized by a constant expression.
    pub array_size: Option<Option<Box<Expr>>>,
    pub init: Option<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Qualifiers {
    pub storage: Option<StorageQualifier>,
    pub precision: Option<PrecisionQualifier>,
    pub invariant: bool,
    pub centroid: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageQualifier {
    Const,
    Attribute,
    Varying,
    Uniform,
    In,
    Out,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrecisionQualifier {
    High,
    Medium,
    Low,
}

/// A type as written in source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TypeSpecifier {
    Builtin { ty: BuiltinType, span: Span },
    /// Inline struct definition, optionally named.
    Struct { def: StructDef, span: Span },
    /// Reference to a previously declared struct type.
    Named { name: String, span: Span },
}

impl TypeSpecifier {
    pub fn span(&self) -> Span {
        match self {
            TypeSpecifier::Builtin { span, .. }
            | TypeSpecifier::Struct { span, .. }
            | TypeSpecifier::Named { span, .. } => *span,
        }
    }
}

/// Built-in (non-struct) type keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuiltinType {
    Void,
    Scalar(ScalarKind),
    Vector(ScalarKind, u8),
    Matrix(u8, u8),
    Sampler(SamplerKind),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructDef {
    pub name: Option<String>,
    pub fields: Vec<StructField>,
    pub span: Span,
}

/// One field declaration inside a struct (no initializers allowed).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructField {
    pub ty: TypeSpecifier,
    pub declarators: Vec<Declarator>,
    pub span: Span,
}

// ==================== FUNCTIONS ====================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDef {
    pub proto: FunctionProto,
    /// `None` for a bare prototype.
    pub body: Option<BlockStmt>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionProto {
    pub return_ty: TypeSpecifier,
    pub name: String,
    pub params: Vec<ParamDecl>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamDecl {
    pub qualifier: ParamQualifier,
    pub is_const: bool,
    pub ty: TypeSpecifier,
    /// Anonymous parameters are allowed in prototypes.
    pub name: Option<String>,
    pub array_size: Option<Box<Expr>>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ParamQualifier {
    #[default]
    In,
    Out,
    InOut,
}

// ==================== STATEMENTS ====================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockStmt {
    pub stmts: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Stmt {
    Compound(BlockStmt),
    Decl(VariableDecl),
    /// An expression statement; `None` is the empty statement `;`.
    Expr { expr: Option<Expr>, span: Span },
    If {
        cond: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
        span: Span,
    },
    For {
        init: Box<Stmt>,
        cond: Option<Expr>,
        step: Option<Expr>,
        body: Box<Stmt>,
        span: Span,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
        span: Span,
    },
    DoWhile {
        body: Box<Stmt>,
        cond: Expr,
        span: Span,
    },
    Switch {
        value: Expr,
        cases: Vec<SwitchCase>,
        span: Span,
    },
    Break(Span),
    Continue(Span),
    Discard(Span),
    Return {
        value: Option<Expr>,
        span: Span,
    },
}

impl Stmt {
    pub fn span(&self) -> Span {
        match self {
            Stmt::Compound(b) => b.span,
            Stmt::Decl(d) => d.span,
            Stmt::Expr { span, .. }
            | Stmt::If { span, .. }
            | Stmt::For { span, .. }
            | Stmt::While { span, .. }
            | Stmt::DoWhile { span, .. }
            | Stmt::Switch { span, .. }
            | Stmt::Return { span, .. } => *span,
            Stmt::Break(span) | Stmt::Continue(span) | Stmt::Discard(span) => *span,
        }
    }
}

/// `case expr:` or `default:` plus the statements that follow it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchCase {
    /// `None` for `default`.
    pub label: Option<Expr>,
    pub stmts: Vec<Stmt>,
    pub span: Span,
}

// ==================== EXPRESSIONS ====================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Expr {
    IntLit { value: i32, span: Span },
    UIntLit { value: u32, span: Span },
    FloatLit { value: f32, span: Span },
    BoolLit { value: bool, span: Span },
    Ident { name: String, span: Span },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
        span: Span,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
        span: Span,
    },
    Conditional {
        cond: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
        span: Span,
    },
    Assign {
        op: AssignOp,
        target: Box<Expr>,
        value: Box<Expr>,
        span: Span,
    },
    /// Call to a named function (function names are not values in this
    /// language, so the callee is a name, not an expression).
    Call {
        name: String,
        args: Vec<Expr>,
        span: Span,
    },
    /// Constructor-style type conversion: `vec3(...)`, `MyStruct(...)`.
    Constructor {
        ty: TypeSpecifier,
        args: Vec<Expr>,
        span: Span,
    },
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
        span: Span,
    },
    /// Field access or swizzle; lowering decides which from the base type.
    Field {
        base: Box<Expr>,
        field: String,
        span: Span,
    },
    Comma {
        left: Box<Expr>,
        right: Box<Expr>,
        span: Span,
    },
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::IntLit { span, .. }
            | Expr::UIntLit { span, .. }
            | Expr::FloatLit { span, .. }
            | Expr::BoolLit { span, .. }
            | Expr::Ident { span, .. }
            | Expr::Unary { span, .. }
            | Expr::Binary { span, .. }
            | Expr::Conditional { span, .. }
            | Expr::Assign { span, .. }
            | Expr::Call { span, .. }
            | Expr::Constructor { span, .. }
            | Expr::Index { span, .. }
            | Expr::Field { span, .. }
            | Expr::Comma { span, .. } => *span,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
    PreInc,
    PreDec,
    PostInc,
    PostDec,
}

impl UnaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "!",
            UnaryOp::BitNot => "~",
            UnaryOp::PreInc | UnaryOp::PostInc => "++",
            UnaryOp::PreDec | UnaryOp::PostDec => "--",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    BitAnd,
    BitXor,
    BitOr,
    LogicalAnd,
    LogicalXor,
    LogicalOr,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::Le => "<=",
            BinaryOp::Ge => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitXor => "^",
            BinaryOp::BitOr => "|",
            BinaryOp::LogicalAnd => "&&",
            BinaryOp::LogicalXor => "^^",
            BinaryOp::LogicalOr => "||",
        }
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Lt
                | BinaryOp::Gt
                | BinaryOp::Le
                | BinaryOp::Ge
                | BinaryOp::Eq
                | BinaryOp::Ne
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignOp {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    And,
    Xor,
    Or,
}

impl AssignOp {
    /// The arithmetic operator a compound assignment desugars to.
    pub fn binary_op(&self) -> Option<BinaryOp> {
        match self {
            AssignOp::Assign => None,
            AssignOp::Add => Some(BinaryOp::Add),
            AssignOp::Sub => Some(BinaryOp::Sub),
            AssignOp::Mul => Some(BinaryOp::Mul),
            AssignOp::Div => Some(BinaryOp::Div),
            AssignOp::Rem => Some(BinaryOp::Rem),
            AssignOp::Shl => Some(BinaryOp::Shl),
            AssignOp::Shr => Some(BinaryOp::Shr),
            AssignOp::And => Some(BinaryOp::BitAnd),
            AssignOp::Xor => Some(BinaryOp::BitXor),
            AssignOp::Or => Some(BinaryOp::BitOr),
        }
    }
}
