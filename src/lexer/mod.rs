//! Lexer for the shading language.
//!
//! The token shapes come from a [`logos`]-generated scanner; this driver
//! layers on the pieces the scanner cannot know: literal radix/suffix
//! validation, the active language version's keyword set, and reserved-word
//! checks. Lexing never fails — every problem becomes a diagnostic plus a
//! best-effort token so the parser can keep going.

mod tokens;

pub use tokens::{LitValue, Token, TokenKind};

use crate::common::Span;
use crate::diagnostics::{CompileError, DiagnosticLog};
use crate::options::Profile;
use logos::Logos;

/// Words set aside by the language specification. Using one is an error,
/// but the token still lexes as an identifier so parsing can continue.
const RESERVED_WORDS: &[&str] = &[
    "asm", "class", "union", "enum", "typedef", "template", "this", "packed", "goto", "inline",
    "noinline", "volatile", "public", "static", "extern", "external", "interface", "long", "short",
    "double", "half", "fixed", "unsigned", "superp", "input", "output", "sizeof", "cast",
    "namespace", "using",
];

/// Lex preprocessed source into a finite token sequence ending in `Eof`.
pub fn lex(source: &str, version: u16, profile: Profile, log: &mut DiagnosticLog) -> Vec<Token> {
    lex_from(source, 0, version, profile, log)
}

/// Lex starting at a byte offset into `source`. Spans refer to the full
/// source text, so restarting from scratch yields identical tokens.
pub fn lex_from(
    source: &str,
    start: usize,
    version: u16,
    profile: Profile,
    log: &mut DiagnosticLog,
) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut lexer = TokenKind::lexer(&source[start..]);

    while let Some(result) = lexer.next() {
        let range = lexer.span();
        let span = Span::new(start + range.start, start + range.end);
        let text = lexer.slice().to_string();

        match result {
            Ok(kind) => {
                let kind = apply_version_gate(kind, &text, span, version, profile, log);
                let value = literal_value(kind, &text, span, version, profile, log);
                if kind == TokenKind::Ident && RESERVED_WORDS.contains(&text.as_str()) {
                    log.error(span, CompileError::ReservedWord { word: text.clone() });
                }
                tokens.push(Token {
                    kind,
                    text,
                    span,
                    value,
                });
            }
            Err(()) => {
                let ch = text.chars().next().unwrap_or('\u{fffd}');
                log.error(span, CompileError::IllegalCharacter { ch });
                tokens.push(Token {
                    kind: TokenKind::Error,
                    text,
                    span,
                    value: None,
                });
            }
        }
    }

    tokens.push(Token::eof(source.len()));
    tokens
}

/// Demote keywords the active version does not have yet. They lex as
/// identifiers with an error logged, which matches how drivers treat e.g.
/// `uint` in a 1.10 shader.
fn apply_version_gate(
    kind: TokenKind,
    text: &str,
    span: Span,
    version: u16,
    profile: Profile,
    log: &mut DiagnosticLog,
) -> TokenKind {
    let Some(min) = kind.min_core_version() else {
        return kind;
    };
    let available = match profile {
        Profile::Core => version >= min,
        // ES has precision syntax from the start and none of the 1.30
        // desktop additions.
        Profile::Es => matches!(
            kind,
            TokenKind::Precision | TokenKind::HighP | TokenKind::MediumP | TokenKind::LowP
        ),
    };
    if available {
        kind
    } else {
        log.error(
            span,
            CompileError::ReservedWord {
                word: text.to_string(),
            },
        );
        TokenKind::Ident
    }
}

fn literal_value(
    kind: TokenKind,
    text: &str,
    span: Span,
    version: u16,
    profile: Profile,
    log: &mut DiagnosticLog,
) -> Option<LitValue> {
    match kind {
        TokenKind::IntLit => Some(parse_int_literal(text, span, version, profile, log)),
        TokenKind::FloatLit => Some(parse_float_literal(text, span, log)),
        TokenKind::True => Some(LitValue::Bool(true)),
        TokenKind::False => Some(LitValue::Bool(false)),
        _ => None,
    }
}

/// Integer literals: decimal, octal (leading `0`), hex (`0x`), optional
/// `u`/`U` suffix. Malformed or out-of-range literals are diagnosed and
/// clamped so a usable token always comes out.
fn parse_int_literal(
    text: &str,
    span: Span,
    version: u16,
    profile: Profile,
    log: &mut DiagnosticLog,
) -> LitValue {
    let (digits, unsigned) = match text.strip_suffix(['u', 'U']) {
        Some(rest) => (rest, true),
        None => (text, false),
    };

    if unsigned && profile == Profile::Core && version < 130 {
        log.error(
            span,
            CompileError::MalformedLiteral {
                text: text.to_string(),
            },
        );
    }

    let parsed = if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X"))
    {
        u64::from_str_radix(hex, 16)
    } else if digits.len() > 1 && digits.starts_with('0') {
        // Octal; a stray 8 or 9 is a malformed literal.
        if digits.bytes().any(|b| b == b'8' || b == b'9') {
            log.error(
                span,
                CompileError::MalformedLiteral {
                    text: text.to_string(),
                },
            );
            digits[1..].parse::<u64>()
        } else {
            u64::from_str_radix(&digits[1..], 8)
        }
    } else {
        digits.parse::<u64>()
    };

    let raw = match parsed {
        Ok(v) => v,
        Err(_) => {
            log.error(
                span,
                CompileError::IntegerOverflow {
                    text: text.to_string(),
                },
            );
            u32::MAX as u64
        }
    };

    if unsigned {
        if raw > u32::MAX as u64 {
            log.error(
                span,
                CompileError::IntegerOverflow {
                    text: text.to_string(),
                },
            );
        }
        LitValue::UInt(raw.min(u32::MAX as u64) as u32)
    } else {
        if raw > i32::MAX as u64 {
            log.warning(
                span,
                CompileError::IntegerOverflow {
                    text: text.to_string(),
                },
            );
        }
        LitValue::Int(raw.min(u32::MAX as u64) as u32 as i32)
    }
}

fn parse_float_literal(text: &str, span: Span, log: &mut DiagnosticLog) -> LitValue {
    let digits = text.strip_suffix(['f', 'F']).unwrap_or(text);
    match digits.parse::<f32>() {
        Ok(v) => LitValue::Float(v),
        Err(_) => {
            log.error(
                span,
                CompileError::MalformedLiteral {
                    text: text.to_string(),
                },
            );
            LitValue::Float(0.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Profile;

    fn lex_ok(src: &str, version: u16) -> Vec<Token> {
        let mut log = DiagnosticLog::new();
        let tokens = lex(src, version, Profile::Core, &mut log);
        assert!(!log.has_errors(), "unexpected errors: {:?}", log.entries());
        tokens
    }

    #[test]
    fn test_simple_tokens() {
        let tokens = lex_ok("void main() { }", 110);
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Void,
                TokenKind::Ident,
                TokenKind::LParen,
                TokenKind::RParen,
                TokenKind::LBrace,
                TokenKind::RBrace,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_int_radixes() {
        let tokens = lex_ok("10 010 0x1F", 110);
        assert_eq!(tokens[0].value, Some(LitValue::Int(10)));
        assert_eq!(tokens[1].value, Some(LitValue::Int(8)));
        assert_eq!(tokens[2].value, Some(LitValue::Int(31)));
    }

    #[test]
    fn test_unsigned_suffix_130() {
        let tokens = lex_ok("42u", 130);
        assert_eq!(tokens[0].value, Some(LitValue::UInt(42)));
    }

    #[test]
    fn test_unsigned_suffix_rejected_pre_130() {
        let mut log = DiagnosticLog::new();
        lex("42u", 110, Profile::Core, &mut log);
        assert!(log.has_errors());
    }

    #[test]
    fn test_float_forms() {
        let tokens = lex_ok("1.0 .5 2. 1e3 1.5e-2 3.0f", 120);
        let floats: Vec<f32> = tokens
            .iter()
            .filter_map(|t| match t.value {
                Some(LitValue::Float(v)) => Some(v),
                _ => None,
            })
            .collect();
        assert_eq!(floats, vec![1.0, 0.5, 2.0, 1000.0, 0.015, 3.0]);
    }

    #[test]
    fn test_bad_octal_recovers() {
        let mut log = DiagnosticLog::new();
        let tokens = lex("019", 110, Profile::Core, &mut log);
        assert!(log.has_errors());
        // Best-effort value so parsing can continue.
        assert_eq!(tokens[0].kind, TokenKind::IntLit);
        assert_eq!(tokens[0].value, Some(LitValue::Int(19)));
    }

    #[test]
    fn test_uint_keyword_gated_by_version() {
        let mut log = DiagnosticLog::new();
        let tokens = lex("uint x;", 110, Profile::Core, &mut log);
        assert!(log.has_errors());
        assert_eq!(tokens[0].kind, TokenKind::Ident);

        let tokens = lex_ok("uint x;", 130);
        assert_eq!(tokens[0].kind, TokenKind::Uint);
    }

    #[test]
    fn test_reserved_word() {
        let mut log = DiagnosticLog::new();
        let tokens = lex("goto", 110, Profile::Core, &mut log);
        assert!(log.has_errors());
        assert_eq!(tokens[0].kind, TokenKind::Ident);
    }

    #[test]
    fn test_illegal_character_sentinel() {
        let mut log = DiagnosticLog::new();
        let tokens = lex("a $ b", 110, Profile::Core, &mut log);
        assert!(log.has_errors());
        assert_eq!(tokens[1].kind, TokenKind::Error);
        assert_eq!(tokens.len(), 4);
    }

    #[test]
    fn test_spans_with_offset() {
        let mut log = DiagnosticLog::new();
        let src = "xx 1.0";
        let a = lex(src, 110, Profile::Core, &mut log);
        let b = lex_from(src, 3, 110, Profile::Core, &mut log);
        assert_eq!(a[1].span, b[0].span);
    }

    #[test]
    fn test_comments_skipped() {
        let tokens = lex_ok("a // line\n/* block */ b", 110);
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(kinds, vec![TokenKind::Ident, TokenKind::Ident, TokenKind::Eof]);
    }
}
