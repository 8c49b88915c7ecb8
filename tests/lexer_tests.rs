//! Lexer tests

use glint::lexer::{lex, LitValue, TokenKind};
use glint::{DiagnosticLog, Profile};
use proptest::prelude::*;

fn kinds(src: &str, version: u16) -> Vec<TokenKind> {
    let mut log = DiagnosticLog::new();
    let tokens = lex(src, version, Profile::Core, &mut log);
    assert!(!log.has_errors(), "unexpected errors: {:?}", log.entries());
    tokens.iter().map(|t| t.kind).collect()
}

#[test]
fn test_shader_prelude() {
    let got = kinds("uniform sampler2D tex;\nvarying vec2 uv;", 110);
    assert_eq!(
        got,
        vec![
            TokenKind::Uniform,
            TokenKind::Sampler2D,
            TokenKind::Ident,
            TokenKind::Semi,
            TokenKind::Varying,
            TokenKind::Vec2,
            TokenKind::Ident,
            TokenKind::Semi,
            TokenKind::Eof,
        ]
    );
}

#[test]
fn test_operators_longest_match() {
    let got = kinds("a <<= b << c <= d < e", 110);
    assert_eq!(
        got,
        vec![
            TokenKind::Ident,
            TokenKind::ShlEq,
            TokenKind::Ident,
            TokenKind::Shl,
            TokenKind::Ident,
            TokenKind::Le,
            TokenKind::Ident,
            TokenKind::Lt,
            TokenKind::Ident,
            TokenKind::Eof,
        ]
    );
}

#[test]
fn test_numeric_literals() {
    let mut log = DiagnosticLog::new();
    let tokens = lex("42 010 0xFF 1.5 .25 2. 1e2 1.5e-3 3f", 130, Profile::Core, &mut log);
    assert!(!log.has_errors());
    let values: Vec<_> = tokens.iter().filter_map(|t| t.value).collect();
    assert_eq!(
        values,
        vec![
            LitValue::Int(42),
            LitValue::Int(8),
            LitValue::Int(255),
            LitValue::Float(1.5),
            LitValue::Float(0.25),
            LitValue::Float(2.0),
            LitValue::Float(100.0),
            LitValue::Float(0.0015),
            LitValue::Float(3.0),
        ]
    );
}

#[test]
fn test_unsigned_literals_130_only() {
    let mut log = DiagnosticLog::new();
    let tokens = lex("7u", 130, Profile::Core, &mut log);
    assert!(!log.has_errors());
    assert_eq!(tokens[0].value, Some(LitValue::UInt(7)));

    let mut log = DiagnosticLog::new();
    lex("7u", 110, Profile::Core, &mut log);
    assert!(log.has_errors());
}

#[test]
fn test_keyword_version_gate() {
    // `switch` is an identifier-with-error before 1.30 and a keyword after.
    let mut log = DiagnosticLog::new();
    let tokens = lex("switch", 110, Profile::Core, &mut log);
    assert!(log.has_errors());
    assert_eq!(tokens[0].kind, TokenKind::Ident);

    assert_eq!(kinds("switch", 130)[0], TokenKind::Switch);
}

#[test]
fn test_non_square_matrices_are_120() {
    let mut log = DiagnosticLog::new();
    let tokens = lex("mat2x3", 110, Profile::Core, &mut log);
    assert!(log.has_errors());
    assert_eq!(tokens[0].kind, TokenKind::Ident);

    assert_eq!(kinds("mat2x3", 120)[0], TokenKind::Mat2x3);
}

#[test]
fn test_malformed_octal_still_yields_token() {
    let mut log = DiagnosticLog::new();
    let tokens = lex("08 + 1", 110, Profile::Core, &mut log);
    assert!(log.has_errors());
    // Best-effort token so the parser can continue.
    assert_eq!(tokens[0].kind, TokenKind::IntLit);
    assert_eq!(tokens.len(), 4);
}

#[test]
fn test_integer_overflow_clamps() {
    let mut log = DiagnosticLog::new();
    let tokens = lex("4294967296u", 130, Profile::Core, &mut log);
    assert!(log.has_errors());
    assert_eq!(tokens[0].value, Some(LitValue::UInt(u32::MAX)));
}

#[test]
fn test_illegal_character_becomes_sentinel() {
    let mut log = DiagnosticLog::new();
    let tokens = lex("a @ b", 110, Profile::Core, &mut log);
    assert!(log.has_errors());
    assert_eq!(tokens[1].kind, TokenKind::Error);
    assert_eq!(tokens[2].kind, TokenKind::Ident);
}

#[test]
fn test_spans_are_byte_ranges() {
    let mut log = DiagnosticLog::new();
    let src = "vec3 position;";
    let tokens = lex(src, 110, Profile::Core, &mut log);
    assert_eq!(&src[tokens[1].span.start..tokens[1].span.end], "position");
}

proptest! {
    #[test]
    fn prop_lexing_never_panics(src in ".{0,80}") {
        let mut log = DiagnosticLog::new();
        let tokens = lex(&src, 110, Profile::Core, &mut log);
        prop_assert_eq!(tokens.last().map(|t| t.kind), Some(TokenKind::Eof));
    }

    #[test]
    fn prop_identifiers_lex_whole(name in "v_[a-zA-Z0-9_]{0,16}") {
        let mut log = DiagnosticLog::new();
        let tokens = lex(&name, 130, Profile::Core, &mut log);
        prop_assert_eq!(tokens.len(), 2);
        prop_assert_eq!(tokens[0].kind, TokenKind::Ident);
        prop_assert_eq!(&tokens[0].text, &name);
    }
}
