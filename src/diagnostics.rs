//! Diagnostic reporting.
//!
//! Every stage appends into a per-unit [`DiagnosticLog`]; a hard error flips
//! the log's persistent error flag, which downstream stages consult before
//! trusting their input. The log renders in the classic driver info-log
//! format (`0:line(col): error: ...`) so hosts can show all messages from a
//! single compile invocation.

use crate::common::{line_col, Span};
use thiserror::Error;

/// User-facing compiler diagnostics.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    // === Preprocessor ===
    #[error("malformed `#{directive}` directive")]
    MalformedDirective { directive: String },

    #[error("macro `{name}` called with wrong number of arguments")]
    MacroArgumentMismatch { name: String },

    #[error("unterminated `#if` conditional")]
    UnterminatedConditional,

    #[error("`#{directive}` without matching `#if`")]
    DanglingConditional { directive: String },

    #[error("`#version` must appear before any other source text")]
    VersionNotFirst,

    #[error("unsupported shading language version {version}")]
    UnsupportedVersion { version: u16 },

    #[error("unknown extension `{name}`")]
    UnknownExtension { name: String },

    #[error("extension `{name}` is not supported but is required")]
    UnresolvableExtension { name: String },

    #[error("#error: {message}")]
    UserError { message: String },

    // === Lexical ===
    #[error("malformed literal `{text}`")]
    MalformedLiteral { text: String },

    #[error("integer literal `{text}` out of range")]
    IntegerOverflow { text: String },

    #[error("illegal use of reserved word `{word}`")]
    ReservedWord { word: String },

    #[error("illegal character `{ch}`")]
    IllegalCharacter { ch: char },

    // === Syntax ===
    #[error("syntax error: expected {expected}, found `{found}`")]
    UnexpectedToken { expected: String, found: String },

    #[error("syntax error: unexpected end of input")]
    UnexpectedEof,

    // === Semantic ===
    #[error("`{name}` : undeclared identifier")]
    Undeclared { name: String },

    #[error("`{name}` : redeclaration in the same scope")]
    Redeclaration { name: String },

    #[error("type mismatch: expected `{expected}`, found `{found}`")]
    TypeMismatch { expected: String, found: String },

    #[error("operator `{op}` cannot be applied to `{left}` and `{right}`")]
    InvalidOperands {
        op: String,
        left: String,
        right: String,
    },

    #[error("operator `{op}` cannot be applied to `{operand}`")]
    InvalidUnaryOperand { op: String, operand: String },

    #[error("no matching overload for call to `{name}({args})`")]
    NoMatchingOverload { name: String, args: String },

    #[error("call to `{name}` is ambiguous")]
    AmbiguousOverload { name: String },

    #[error("`{name}` is not a function")]
    NotAFunction { name: String },

    #[error("array size must be a positive constant integer")]
    InvalidArraySize,

    #[error("`{text}` : invalid component selection")]
    InvalidSwizzle { text: String },

    #[error("`{name}` : no such field in `{ty}`")]
    FieldNotFound { name: String, ty: String },

    #[error("cannot assign to constant `{name}`")]
    AssignToConst { name: String },

    #[error("expression is not assignable")]
    NotAnLValue,

    #[error("return type mismatch: expected `{expected}`, found `{found}`")]
    ReturnTypeMismatch { expected: String, found: String },

    #[error("constant expression expected")]
    ConstExprExpected,

    #[error("`{kind}` statement outside of a loop")]
    JumpOutsideLoop { kind: String },

    #[error("`discard` is only allowed in fragment shaders")]
    DiscardOutsideFragment,

    #[error("function `{name}` declared but never defined")]
    UndefinedFunction { name: String },

    // === Link ===
    #[error("interface mismatch for `{name}`: `{a}` vs `{b}`")]
    InterfaceTypeMismatch { name: String, a: String, b: String },

    #[error("varying `{name}` is not written by the previous stage")]
    UnmatchedVarying { name: String },

    #[error("{stage} shader has no `main` entry point")]
    MissingMain { stage: String },
}

/// Message severity.
///
/// `Internal` is reserved for validator findings; it marks a defect in the
/// compiler itself, never in user source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Error,
    Internal,
}

impl Severity {
    pub fn label(&self) -> &'static str {
        match self {
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Internal => "internal error",
        }
    }
}

/// One entry in a [`DiagnosticLog`].
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub span: Option<Span>,
    pub message: String,
}

/// Append-only, ordered log of compiler messages for one unit.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticLog {
    entries: Vec<Diagnostic>,
    error_flag: bool,
}

impl DiagnosticLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, span: Span, err: CompileError) {
        self.error_flag = true;
        self.entries.push(Diagnostic {
            severity: Severity::Error,
            span: Some(span),
            message: err.to_string(),
        });
    }

    pub fn warning(&mut self, span: Span, err: CompileError) {
        self.entries.push(Diagnostic {
            severity: Severity::Warning,
            span: Some(span),
            message: err.to_string(),
        });
    }

    /// A hard error with no useful source position (cross-stage link
    /// failures, mostly).
    pub fn error_global(&mut self, err: CompileError) {
        self.error_flag = true;
        self.entries.push(Diagnostic {
            severity: Severity::Error,
            span: None,
            message: err.to_string(),
        });
    }

    pub fn warning_text(&mut self, span: Span, message: impl Into<String>) {
        self.entries.push(Diagnostic {
            severity: Severity::Warning,
            span: Some(span),
            message: message.into(),
        });
    }

    /// Record a validator finding. Kept out of the user error channel by
    /// severity, but still fails the unit.
    pub fn internal(&mut self, message: impl Into<String>) {
        self.error_flag = true;
        self.entries.push(Diagnostic {
            severity: Severity::Internal,
            span: None,
            message: message.into(),
        });
    }

    /// True once any hard error has been logged.
    pub fn has_errors(&self) -> bool {
        self.error_flag
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn error_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|d| d.severity >= Severity::Error)
            .count()
    }

    /// Append all entries of `other`, carrying its error flag along.
    pub fn merge(&mut self, other: DiagnosticLog) {
        self.error_flag |= other.error_flag;
        self.entries.extend(other.entries);
    }

    /// Render as ordered info-log lines against the preprocessed source the
    /// spans refer to.
    pub fn render(&self, source: &str) -> String {
        let mut out = String::new();
        for d in &self.entries {
            match d.span {
                Some(span) => {
                    let lc = line_col(source, span.start);
                    out.push_str(&format!(
                        "0:{}({}): {}: {}\n",
                        lc.line,
                        lc.col,
                        d.severity.label(),
                        d.message
                    ));
                }
                None => out.push_str(&format!("{}: {}\n", d.severity.label(), d.message)),
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_sets_flag() {
        let mut log = DiagnosticLog::new();
        assert!(!log.has_errors());
        log.warning_text(Span::new(0, 1), "benign");
        assert!(!log.has_errors());
        log.error(
            Span::new(0, 3),
            CompileError::Undeclared { name: "foo".into() },
        );
        assert!(log.has_errors());
        assert_eq!(log.error_count(), 1);
        assert_eq!(log.entries().len(), 2);
    }

    #[test]
    fn test_render_positions() {
        let src = "void main() {\n  bad;\n}\n";
        let mut log = DiagnosticLog::new();
        log.error(
            Span::new(16, 19),
            CompileError::Undeclared { name: "bad".into() },
        );
        let text = log.render(src);
        assert!(text.starts_with("0:2(3): error:"), "got: {text}");
        assert!(text.contains("undeclared identifier"));
    }

    #[test]
    fn test_merge_carries_flag() {
        let mut a = DiagnosticLog::new();
        let mut b = DiagnosticLog::new();
        b.error(Span::new(0, 1), CompileError::UnexpectedEof);
        a.merge(b);
        assert!(a.has_errors());
        assert_eq!(a.entries().len(), 1);
    }
}
