//! Token definitions for the shading-language lexer.

use crate::common::Span;
use logos::Logos;
use serde::{Deserialize, Serialize};

/// Parsed payload of a literal token.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum LitValue {
    Int(i32),
    UInt(u32),
    Float(f32),
    Bool(bool),
}

/// A token with its kind, source text, span, and (for literals) value.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub span: Span,
    pub value: Option<LitValue>,
}

impl Token {
    pub fn eof(offset: usize) -> Self {
        Self {
            kind: TokenKind::Eof,
            text: String::new(),
            span: Span::point(offset),
            value: None,
        }
    }
}

/// Token kinds recognized by the lexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Logos, Serialize, Deserialize)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"//[^\n]*")]
#[logos(skip r"/\*([^*]|\*[^/])*\*/")]
pub enum TokenKind {
    // Storage and parameter qualifiers
    #[token("attribute")]
    Attribute,
    #[token("const")]
    Const,
    #[token("uniform")]
    Uniform,
    #[token("varying")]
    Varying,
    #[token("centroid")]
    Centroid,
    #[token("invariant")]
    Invariant,
    #[token("in")]
    In,
    #[token("out")]
    Out,
    #[token("inout")]
    InOut,

    // Precision qualifiers
    #[token("precision")]
    Precision,
    #[token("highp")]
    HighP,
    #[token("mediump")]
    MediumP,
    #[token("lowp")]
    LowP,

    // Control flow
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("for")]
    For,
    #[token("while")]
    While,
    #[token("do")]
    Do,
    #[token("switch")]
    Switch,
    #[token("case")]
    Case,
    #[token("default")]
    Default,
    #[token("break")]
    Break,
    #[token("continue")]
    Continue,
    #[token("return")]
    Return,
    #[token("discard")]
    Discard,

    // Type keywords
    #[token("void")]
    Void,
    #[token("bool")]
    Bool,
    #[token("int")]
    Int,
    #[token("uint")]
    Uint,
    #[token("float")]
    Float,
    #[token("vec2")]
    Vec2,
    #[token("vec3")]
    Vec3,
    #[token("vec4")]
    Vec4,
    #[token("bvec2")]
    BVec2,
    #[token("bvec3")]
    BVec3,
    #[token("bvec4")]
    BVec4,
    #[token("ivec2")]
    IVec2,
    #[token("ivec3")]
    IVec3,
    #[token("ivec4")]
    IVec4,
    #[token("uvec2")]
    UVec2,
    #[token("uvec3")]
    UVec3,
    #[token("uvec4")]
    UVec4,
    #[token("mat2")]
    Mat2,
    #[token("mat3")]
    Mat3,
    #[token("mat4")]
    Mat4,
    #[token("mat2x2")]
    Mat2x2,
    #[token("mat2x3")]
    Mat2x3,
    #[token("mat2x4")]
    Mat2x4,
    #[token("mat3x2")]
    Mat3x2,
    #[token("mat3x3")]
    Mat3x3,
    #[token("mat3x4")]
    Mat3x4,
    #[token("mat4x2")]
    Mat4x2,
    #[token("mat4x3")]
    Mat4x3,
    #[token("mat4x4")]
    Mat4x4,
    #[token("sampler1D")]
    Sampler1D,
    #[token("sampler2D")]
    Sampler2D,
    #[token("sampler3D")]
    Sampler3D,
    #[token("samplerCube")]
    SamplerCube,
    #[token("sampler1DShadow")]
    Sampler1DShadow,
    #[token("sampler2DShadow")]
    Sampler2DShadow,
    #[token("sampler2DArray")]
    Sampler2DArray,
    #[token("struct")]
    Struct,

    // Boolean literals
    #[token("true")]
    True,
    #[token("false")]
    False,

    // Literals. Radix and suffix validation happens in the lexer driver,
    // which fills in the token's value payload.
    #[regex(r"0[xX][0-9a-fA-F]+[uU]?|[0-9]+[uU]?", priority = 2)]
    IntLit,
    #[regex(
        r"([0-9]+\.[0-9]*|\.[0-9]+)([eE][+-]?[0-9]+)?[fF]?|[0-9]+[eE][+-]?[0-9]+[fF]?|[0-9]+[fF]",
        priority = 3
    )]
    FloatLit,

    // Identifiers
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", priority = 1)]
    Ident,

    // Operators
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("^")]
    Caret,
    #[token("&")]
    Amp,
    #[token("|")]
    Pipe,
    #[token("~")]
    Tilde,
    #[token("!")]
    Bang,
    #[token("=")]
    Eq,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,

    // Compound operators
    #[token("++")]
    PlusPlus,
    #[token("--")]
    MinusMinus,
    #[token("==")]
    EqEq,
    #[token("!=")]
    Ne,
    #[token("<=")]
    Le,
    #[token(">=")]
    Ge,
    #[token("&&")]
    AmpAmp,
    #[token("||")]
    PipePipe,
    #[token("^^")]
    CaretCaret,
    #[token("<<")]
    Shl,
    #[token(">>")]
    Shr,
    #[token("+=")]
    PlusEq,
    #[token("-=")]
    MinusEq,
    #[token("*=")]
    StarEq,
    #[token("/=")]
    SlashEq,
    #[token("%=")]
    PercentEq,
    #[token("&=")]
    AmpEq,
    #[token("|=")]
    PipeEq,
    #[token("^=")]
    CaretEq,
    #[token("<<=")]
    ShlEq,
    #[token(">>=")]
    ShrEq,

    // Delimiters
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,

    // Punctuation
    #[token(",")]
    Comma,
    #[token(";")]
    Semi,
    #[token(":")]
    Colon,
    #[token(".")]
    Dot,
    #[token("?")]
    Question,

    // Special
    /// Sentinel for characters the scanner could not classify.
    Error,
    Eof,
}

impl TokenKind {
    /// Tokens that can start a type specifier.
    pub fn is_type_keyword(&self) -> bool {
        matches!(
            self,
            TokenKind::Void
                | TokenKind::Bool
                | TokenKind::Int
                | TokenKind::Uint
                | TokenKind::Float
                | TokenKind::Vec2
                | TokenKind::Vec3
                | TokenKind::Vec4
                | TokenKind::BVec2
                | TokenKind::BVec3
                | TokenKind::BVec4
                | TokenKind::IVec2
                | TokenKind::IVec3
                | TokenKind::IVec4
                | TokenKind::UVec2
                | TokenKind::UVec3
                | TokenKind::UVec4
                | TokenKind::Mat2
                | TokenKind::Mat3
                | TokenKind::Mat4
                | TokenKind::Mat2x2
                | TokenKind::Mat2x3
                | TokenKind::Mat2x4
                | TokenKind::Mat3x2
                | TokenKind::Mat3x3
                | TokenKind::Mat3x4
                | TokenKind::Mat4x2
                | TokenKind::Mat4x3
                | TokenKind::Mat4x4
                | TokenKind::Sampler1D
                | TokenKind::Sampler2D
                | TokenKind::Sampler3D
                | TokenKind::SamplerCube
                | TokenKind::Sampler1DShadow
                | TokenKind::Sampler2DShadow
                | TokenKind::Sampler2DArray
                | TokenKind::Struct
        )
    }

    /// Tokens that can start a declaration qualifier sequence.
    pub fn is_qualifier_keyword(&self) -> bool {
        matches!(
            self,
            TokenKind::Attribute
                | TokenKind::Const
                | TokenKind::Uniform
                | TokenKind::Varying
                | TokenKind::Centroid
                | TokenKind::Invariant
                | TokenKind::In
                | TokenKind::Out
                | TokenKind::InOut
                | TokenKind::HighP
                | TokenKind::MediumP
                | TokenKind::LowP
        )
    }

    pub fn is_literal(&self) -> bool {
        matches!(
            self,
            TokenKind::IntLit | TokenKind::FloatLit | TokenKind::True | TokenKind::False
        )
    }

    /// Assignment operators, compound forms included.
    pub fn is_assignment_op(&self) -> bool {
        matches!(
            self,
            TokenKind::Eq
                | TokenKind::PlusEq
                | TokenKind::MinusEq
                | TokenKind::StarEq
                | TokenKind::SlashEq
                | TokenKind::PercentEq
                | TokenKind::AmpEq
                | TokenKind::PipeEq
                | TokenKind::CaretEq
                | TokenKind::ShlEq
                | TokenKind::ShrEq
        )
    }

    /// First core-profile version in which this token is a keyword, if it is
    /// not one from the beginning.
    pub fn min_core_version(&self) -> Option<u16> {
        match self {
            TokenKind::Mat2x2
            | TokenKind::Mat2x3
            | TokenKind::Mat2x4
            | TokenKind::Mat3x2
            | TokenKind::Mat3x3
            | TokenKind::Mat3x4
            | TokenKind::Mat4x2
            | TokenKind::Mat4x3
            | TokenKind::Mat4x4 => Some(120),
            TokenKind::Uint
            | TokenKind::UVec2
            | TokenKind::UVec3
            | TokenKind::UVec4
            | TokenKind::Switch
            | TokenKind::Case
            | TokenKind::Default
            | TokenKind::Sampler2DArray => Some(130),
            // Precision syntax exists in ES from the start and in core 1.30.
            TokenKind::Precision | TokenKind::HighP | TokenKind::MediumP | TokenKind::LowP => {
                Some(130)
            }
            _ => None,
        }
    }

    /// Get the string representation of the token.
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Attribute => "attribute",
            TokenKind::Const => "const",
            TokenKind::Uniform => "uniform",
            TokenKind::Varying => "varying",
            TokenKind::Centroid => "centroid",
            TokenKind::Invariant => "invariant",
            TokenKind::In => "in",
            TokenKind::Out => "out",
            TokenKind::InOut => "inout",
            TokenKind::Precision => "precision",
            TokenKind::HighP => "highp",
            TokenKind::MediumP => "mediump",
            TokenKind::LowP => "lowp",
            TokenKind::If => "if",
            TokenKind::Else => "else",
            TokenKind::For => "for",
            TokenKind::While => "while",
            TokenKind::Do => "do",
            TokenKind::Switch => "switch",
            TokenKind::Case => "case",
            TokenKind::Default => "default",
            TokenKind::Break => "break",
            TokenKind::Continue => "continue",
            TokenKind::Return => "return",
            TokenKind::Discard => "discard",
            TokenKind::Void => "void",
            TokenKind::Bool => "bool",
            TokenKind::Int => "int",
            TokenKind::Uint => "uint",
            TokenKind::Float => "float",
            TokenKind::Vec2 => "vec2",
            TokenKind::Vec3 => "vec3",
            TokenKind::Vec4 => "vec4",
            TokenKind::BVec2 => "bvec2",
            TokenKind::BVec3 => "bvec3",
            TokenKind::BVec4 => "bvec4",
            TokenKind::IVec2 => "ivec2",
            TokenKind::IVec3 => "ivec3",
            TokenKind::IVec4 => "ivec4",
            TokenKind::UVec2 => "uvec2",
            TokenKind::UVec3 => "uvec3",
            TokenKind::UVec4 => "uvec4",
            TokenKind::Mat2 => "mat2",
            TokenKind::Mat3 => "mat3",
            TokenKind::Mat4 => "mat4",
            TokenKind::Mat2x2 => "mat2x2",
            TokenKind::Mat2x3 => "mat2x3",
            TokenKind::Mat2x4 => "mat2x4",
            TokenKind::Mat3x2 => "mat3x2",
            TokenKind::Mat3x3 => "mat3x3",
            TokenKind::Mat3x4 => "mat3x4",
            TokenKind::Mat4x2 => "mat4x2",
            TokenKind::Mat4x3 => "mat4x3",
            TokenKind::Mat4x4 => "mat4x4",
            TokenKind::Sampler1D => "sampler1D",
            TokenKind::Sampler2D => "sampler2D",
            TokenKind::Sampler3D => "sampler3D",
            TokenKind::SamplerCube => "samplerCube",
            TokenKind::Sampler1DShadow => "sampler1DShadow",
            TokenKind::Sampler2DShadow => "sampler2DShadow",
            TokenKind::Sampler2DArray => "sampler2DArray",
            TokenKind::Struct => "struct",
            TokenKind::True => "true",
            TokenKind::False => "false",
            TokenKind::IntLit => "<int>",
            TokenKind::FloatLit => "<float>",
            TokenKind::Ident => "<ident>",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
            TokenKind::Caret => "^",
            TokenKind::Amp => "&",
            TokenKind::Pipe => "|",
            TokenKind::Tilde => "~",
            TokenKind::Bang => "!",
            TokenKind::Eq => "=",
            TokenKind::Lt => "<",
            TokenKind::Gt => ">",
            TokenKind::PlusPlus => "++",
            TokenKind::MinusMinus => "--",
            TokenKind::EqEq => "==",
            TokenKind::Ne => "!=",
            TokenKind::Le => "<=",
            TokenKind::Ge => ">=",
            TokenKind::AmpAmp => "&&",
            TokenKind::PipePipe => "||",
            TokenKind::CaretCaret => "^^",
            TokenKind::Shl => "<<",
            TokenKind::Shr => ">>",
            TokenKind::PlusEq => "+=",
            TokenKind::MinusEq => "-=",
            TokenKind::StarEq => "*=",
            TokenKind::SlashEq => "/=",
            TokenKind::PercentEq => "%=",
            TokenKind::AmpEq => "&=",
            TokenKind::PipeEq => "|=",
            TokenKind::CaretEq => "^=",
            TokenKind::ShlEq => "<<=",
            TokenKind::ShrEq => ">>=",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            TokenKind::Comma => ",",
            TokenKind::Semi => ";",
            TokenKind::Colon => ":",
            TokenKind::Dot => ".",
            TokenKind::Question => "?",
            TokenKind::Error => "<error>",
            TokenKind::Eof => "<eof>",
        }
    }
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
