//! The preprocessor.
//!
//! Text in, text out: comment stripping, line continuations, object- and
//! function-like macros, conditional compilation, and the `#version` /
//! `#extension` / `#pragma` directive family. Line structure is preserved —
//! every directive or excluded line becomes a blank line — so spans into the
//! expanded text report the same line numbers as the original source.

use crate::diagnostics::{CompileError, DiagnosticLog};
use crate::options::{CompileOptions, Profile};
use crate::common::Span;
use rustc_hash::FxHashMap;

/// Result of preprocessing one unit.
#[derive(Debug, Clone)]
pub struct PreprocessOutput {
    pub text: String,
    /// Language version after any `#version` directive.
    pub version: u16,
    pub profile: Profile,
    /// Extensions enabled by the host plus `#extension` directives.
    pub extensions: Vec<String>,
}

#[derive(Debug, Clone)]
struct Macro {
    /// `None` for object-like macros.
    params: Option<Vec<String>>,
    body: String,
}

/// One level of `#if` nesting.
struct CondLevel {
    /// Lines in this branch are emitted.
    active: bool,
    /// Some earlier branch of this conditional was taken.
    taken: bool,
    seen_else: bool,
}

const MAX_EXPANSION_DEPTH: usize = 64;

/// Expand `source` under `options`, logging all diagnostics into `log`.
pub fn preprocess(
    source: &str,
    options: &CompileOptions,
    log: &mut DiagnosticLog,
) -> PreprocessOutput {
    let decommented = strip_comments(source);

    let mut pp = Preprocessor {
        macros: FxHashMap::default(),
        cond_stack: Vec::new(),
        version: options.version,
        profile: options.profile,
        extensions: options.extensions.clone(),
        seen_code: false,
        out: String::with_capacity(source.len()),
        log,
    };

    pp.define_builtin_macros(options);

    let mut lines = decommented.split('\n').peekable();
    while let Some(first) = lines.next() {
        // Fold line continuations into one logical line, remembering how
        // many physical lines it covered.
        let mut logical = first.to_string();
        let mut extra = 0;
        while logical.ends_with('\\') {
            logical.pop();
            match lines.next() {
                Some(next) => {
                    logical.push_str(next);
                    extra += 1;
                }
                None => break,
            }
        }

        pp.process_line(&logical);
        for _ in 0..extra {
            pp.out.push('\n');
        }
        if lines.peek().is_some() {
            pp.out.push('\n');
        }
    }

    if !pp.cond_stack.is_empty() {
        let at = pp.out.len();
        pp.log
            .error(Span::point(at), CompileError::UnterminatedConditional);
    }

    PreprocessOutput {
        text: pp.out,
        version: pp.version,
        profile: pp.profile,
        extensions: pp.extensions,
    }
}

/// Replace comments with spaces, keeping newlines so line numbers survive.
fn strip_comments(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let bytes = source.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'/' && i + 1 < bytes.len() && bytes[i + 1] == b'/' {
            while i < bytes.len() && bytes[i] != b'\n' {
                i += 1;
            }
        } else if bytes[i] == b'/' && i + 1 < bytes.len() && bytes[i + 1] == b'*' {
            i += 2;
            out.push(' ');
            while i < bytes.len() {
                if bytes[i] == b'*' && i + 1 < bytes.len() && bytes[i + 1] == b'/' {
                    i += 2;
                    break;
                }
                if bytes[i] == b'\n' {
                    out.push('\n');
                }
                i += 1;
            }
        } else {
            // Source is UTF-8; copy whole chars.
            let ch = source[i..].chars().next().unwrap_or('\u{fffd}');
            out.push(ch);
            i += ch.len_utf8();
        }
    }
    out
}

struct Preprocessor<'a> {
    macros: FxHashMap<String, Macro>,
    cond_stack: Vec<CondLevel>,
    version: u16,
    profile: Profile,
    extensions: Vec<String>,
    /// True once any non-directive, non-blank source text was emitted.
    seen_code: bool,
    out: String,
    log: &'a mut DiagnosticLog,
}

impl Preprocessor<'_> {
    fn define_builtin_macros(&mut self, options: &CompileOptions) {
        self.macros.insert(
            "__VERSION__".into(),
            Macro {
                params: None,
                body: options.version.to_string(),
            },
        );
        if options.profile == Profile::Es {
            self.macros.insert(
                "GL_ES".into(),
                Macro {
                    params: None,
                    body: "1".into(),
                },
            );
        }
        for ext in &options.extensions {
            self.macros.insert(
                ext.clone(),
                Macro {
                    params: None,
                    body: "1".into(),
                },
            );
        }
    }

    fn active(&self) -> bool {
        self.cond_stack.iter().all(|l| l.active)
    }

    /// Span for a diagnostic on the line currently being emitted.
    fn line_span(&self, len: usize) -> Span {
        Span::new(self.out.len(), self.out.len() + len)
    }

    fn process_line(&mut self, line: &str) {
        let trimmed = line.trim_start();
        if let Some(rest) = trimmed.strip_prefix('#') {
            self.process_directive(rest.trim(), line.len());
            // Directive lines leave a blank line behind.
            return;
        }

        if !self.active() {
            return;
        }

        if !trimmed.is_empty() {
            self.seen_code = true;
        }
        let expanded = self.expand(line, &mut Vec::new(), 0);
        self.out.push_str(&expanded);
    }

    fn process_directive(&mut self, directive: &str, line_len: usize) {
        let span = self.line_span(line_len);
        let (name, rest) = split_word(directive);
        let rest = rest.trim();

        // Conditional directives are honored even inside inactive branches
        // so nesting stays balanced.
        match name {
            "" => return, // null directive
            "ifdef" | "ifndef" => {
                let parent_active = self.active();
                let (word, _) = split_word(rest);
                if word.is_empty() {
                    self.error(span, CompileError::MalformedDirective {
                        directive: name.into(),
                    });
                }
                let defined = self.macros.contains_key(word);
                let cond = if name == "ifdef" { defined } else { !defined };
                self.cond_stack.push(CondLevel {
                    active: parent_active && cond,
                    taken: cond,
                    seen_else: false,
                });
                return;
            }
            "if" => {
                let parent_active = self.active();
                let cond = if parent_active {
                    self.eval_condition(rest, span)
                } else {
                    false
                };
                self.cond_stack.push(CondLevel {
                    active: parent_active && cond,
                    taken: cond,
                    seen_else: false,
                });
                return;
            }
            "elif" => {
                let n = self.cond_stack.len();
                if n == 0 || self.cond_stack[n - 1].seen_else {
                    self.error(span, CompileError::DanglingConditional {
                        directive: "elif".into(),
                    });
                    return;
                }
                let parent_active = self.cond_stack[..n - 1].iter().all(|l| l.active);
                let taken = self.cond_stack[n - 1].taken;
                self.cond_stack[n - 1].active = false;
                if !taken && parent_active {
                    let cond = self.eval_condition(rest, span);
                    let level = &mut self.cond_stack[n - 1];
                    level.active = cond;
                    level.taken = cond;
                }
                return;
            }
            "else" => {
                let n = self.cond_stack.len();
                if n == 0 || self.cond_stack[n - 1].seen_else {
                    self.error(span, CompileError::DanglingConditional {
                        directive: "else".into(),
                    });
                    return;
                }
                let parent_active = self.cond_stack[..n - 1].iter().all(|l| l.active);
                let level = &mut self.cond_stack[n - 1];
                level.seen_else = true;
                level.active = parent_active && !level.taken;
                level.taken = true;
                return;
            }
            "endif" => {
                if self.cond_stack.pop().is_none() {
                    self.error(span, CompileError::DanglingConditional {
                        directive: "endif".into(),
                    });
                }
                return;
            }
            _ => {}
        }

        if !self.active() {
            return;
        }

        match name {
            "version" => self.directive_version(rest, span),
            "extension" => self.directive_extension(rest, span),
            "define" => self.directive_define(rest, span),
            "undef" => {
                let (word, _) = split_word(rest);
                if word.is_empty() {
                    self.error(span, CompileError::MalformedDirective {
                        directive: "undef".into(),
                    });
                } else {
                    self.macros.remove(word);
                }
            }
            "error" => {
                self.error(span, CompileError::UserError {
                    message: rest.to_string(),
                });
            }
            "pragma" | "line" => {
                // Accepted and ignored.
            }
            other => {
                self.error(span, CompileError::MalformedDirective {
                    directive: other.to_string(),
                });
            }
        }
    }

    fn directive_version(&mut self, rest: &str, span: Span) {
        if self.seen_code {
            self.error(span, CompileError::VersionNotFirst);
        }
        let (num, tail) = split_word(rest);
        let Ok(version) = num.parse::<u16>() else {
            self.error(span, CompileError::MalformedDirective {
                directive: "version".into(),
            });
            return;
        };
        let profile = match split_word(tail.trim()).0 {
            "" => {
                if version == 100 {
                    Profile::Es
                } else {
                    Profile::Core
                }
            }
            "es" => Profile::Es,
            _ => Profile::Core,
        };
        if !CompileOptions::is_supported_version(version, profile) {
            self.error(span, CompileError::UnsupportedVersion { version });
            return;
        }
        self.version = version;
        self.profile = profile;
        if let Some(m) = self.macros.get_mut("__VERSION__") {
            m.body = version.to_string();
        }
    }

    fn directive_extension(&mut self, rest: &str, span: Span) {
        let Some((name_part, behavior_part)) = rest.split_once(':') else {
            self.error(span, CompileError::MalformedDirective {
                directive: "extension".into(),
            });
            return;
        };
        let name = name_part.trim().to_string();
        let behavior = behavior_part.trim();
        let known = CompileOptions::is_known_extension(&name);

        match behavior {
            "require" => {
                if !known || name == "all" {
                    self.error(span, CompileError::UnresolvableExtension { name });
                    return;
                }
            }
            "enable" | "warn" => {
                if !known {
                    self.log
                        .warning(span, CompileError::UnknownExtension { name: name.clone() });
                    return;
                }
            }
            "disable" => {
                if !known {
                    self.log
                        .warning(span, CompileError::UnknownExtension { name });
                    return;
                }
                if name != "all" {
                    self.extensions.retain(|e| *e != name);
                    self.macros.remove(&name);
                } else {
                    for e in std::mem::take(&mut self.extensions) {
                        self.macros.remove(&e);
                    }
                }
                return;
            }
            _ => {
                self.error(span, CompileError::MalformedDirective {
                    directive: "extension".into(),
                });
                return;
            }
        }

        if name != "all" && !self.extensions.contains(&name) {
            self.extensions.push(name.clone());
            self.macros.insert(
                name,
                Macro {
                    params: None,
                    body: "1".into(),
                },
            );
        }
    }

    fn directive_define(&mut self, rest: &str, span: Span) {
        let (name, tail) = split_word(rest);
        if name.is_empty() {
            self.error(span, CompileError::MalformedDirective {
                directive: "define".into(),
            });
            return;
        }
        // A '(' immediately after the name makes a function-like macro; the
        // split above stops at '(' because it is not a word character.
        if tail.starts_with('(') {
            let Some(close) = tail.find(')') else {
                self.error(span, CompileError::MalformedDirective {
                    directive: "define".into(),
                });
                return;
            };
            let params: Vec<String> = tail[1..close]
                .split(',')
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect();
            let body = tail[close + 1..].trim().to_string();
            self.macros.insert(
                name.to_string(),
                Macro {
                    params: Some(params),
                    body,
                },
            );
        } else {
            self.macros.insert(
                name.to_string(),
                Macro {
                    params: None,
                    body: tail.trim().to_string(),
                },
            );
        }
    }

    /// Macro-expand one line of ordinary source text.
    fn expand(&mut self, text: &str, hidden: &mut Vec<String>, depth: usize) -> String {
        if depth > MAX_EXPANSION_DEPTH {
            return text.to_string();
        }
        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        while !rest.is_empty() {
            let Some(start) = rest.find(|c: char| c.is_ascii_alphabetic() || c == '_') else {
                out.push_str(rest);
                break;
            };
            out.push_str(&rest[..start]);
            rest = &rest[start..];
            let end = rest
                .find(|c: char| !c.is_ascii_alphanumeric() && c != '_')
                .unwrap_or(rest.len());
            let word = &rest[..end];
            rest = &rest[end..];

            let mac = if hidden.iter().any(|h| h == word) {
                None
            } else {
                self.macros.get(word).cloned()
            };
            let expansion = match mac {
                Some(Macro { params: None, body }) => Some((body, 0)),
                Some(Macro {
                    params: Some(params),
                    body,
                }) => match collect_arguments(rest) {
                    Some((args, consumed)) if args.len() == params.len() => {
                        Some((substitute_params(&body, &params, &args), consumed))
                    }
                    Some((_, _)) => {
                        let span = self.line_span(text.len());
                        self.error(span, CompileError::MacroArgumentMismatch {
                            name: word.to_string(),
                        });
                        None
                    }
                    // Not followed by '(': not an invocation.
                    None => None,
                },
                None => None,
            };

            match expansion {
                Some((body, consumed)) => {
                    rest = &rest[consumed..];
                    hidden.push(word.to_string());
                    let expanded = self.expand(&body, hidden, depth + 1);
                    hidden.pop();
                    out.push_str(&expanded);
                }
                None => out.push_str(word),
            }
        }
        out
    }

    /// Evaluate a `#if`/`#elif` controlling expression.
    fn eval_condition(&mut self, expr: &str, span: Span) -> bool {
        let resolved = self.resolve_defined(expr);
        let expanded = self.expand(&resolved, &mut Vec::new(), 0);
        match eval_pp_expr(&expanded) {
            Some(v) => v != 0,
            None => {
                self.error(span, CompileError::MalformedDirective {
                    directive: "if".into(),
                });
                false
            }
        }
    }

    /// Replace `defined NAME` / `defined(NAME)` with 1 or 0 before macro
    /// expansion touches the operand.
    fn resolve_defined(&self, expr: &str) -> String {
        let mut out = String::with_capacity(expr.len());
        let mut rest = expr;
        while let Some(pos) = rest.find("defined") {
            let is_word_start = pos == 0
                || !rest[..pos]
                    .chars()
                    .next_back()
                    .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_');
            let after = &rest[pos + "defined".len()..];
            let is_word_end = !after
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_');
            if !is_word_start || !is_word_end {
                out.push_str(&rest[..pos + "defined".len()]);
                rest = after;
                continue;
            }
            out.push_str(&rest[..pos]);
            rest = after;
            let trimmed = rest.trim_start();
            let (name, remainder) = if let Some(inner) = trimmed.strip_prefix('(') {
                let inner = inner.trim_start();
                let (word, after) = split_word(inner);
                let after = after.trim_start();
                (word, after.strip_prefix(')').unwrap_or(after))
            } else {
                split_word(trimmed)
            };
            if name.is_empty() {
                out.push('0');
            } else if self.macros.contains_key(name) {
                out.push('1');
            } else {
                out.push('0');
            }
            rest = remainder;
        }
        out.push_str(rest);
        out
    }

    fn error(&mut self, span: Span, err: CompileError) {
        self.log.error(span, err);
    }
}

/// Split off a leading identifier-ish word.
fn split_word(s: &str) -> (&str, &str) {
    let end = s
        .find(|c: char| !c.is_ascii_alphanumeric() && c != '_')
        .unwrap_or(s.len());
    (&s[..end], &s[end..])
}

/// Collect `(arg, arg, ...)` following a function-like macro name.
/// Returns the argument texts and how many bytes were consumed, or `None`
/// when the text does not start an invocation.
fn collect_arguments(rest: &str) -> Option<(Vec<String>, usize)> {
    let after_ws = rest.trim_start();
    if !after_ws.starts_with('(') {
        return None;
    }
    let lead = rest.len() - after_ws.len();
    let mut depth = 0usize;
    let mut args = Vec::new();
    let mut current = String::new();
    for (i, ch) in after_ws.char_indices() {
        match ch {
            '(' => {
                depth += 1;
                if depth > 1 {
                    current.push(ch);
                }
            }
            ')' => {
                depth -= 1;
                if depth == 0 {
                    if !current.trim().is_empty() || !args.is_empty() {
                        args.push(current.trim().to_string());
                    }
                    return Some((args, lead + i + 1));
                }
                current.push(ch);
            }
            ',' if depth == 1 => {
                args.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    // Unbalanced parentheses: not an invocation we can honor.
    None
}

/// Whole-word parameter substitution in a macro body.
fn substitute_params(body: &str, params: &[String], args: &[String]) -> String {
    let mut out = String::with_capacity(body.len());
    let mut rest = body;
    while !rest.is_empty() {
        let Some(start) = rest.find(|c: char| c.is_ascii_alphabetic() || c == '_') else {
            out.push_str(rest);
            break;
        };
        out.push_str(&rest[..start]);
        rest = &rest[start..];
        let (word, tail) = split_word(rest);
        match params.iter().position(|p| p == word) {
            Some(idx) => out.push_str(&args[idx]),
            None => out.push_str(word),
        }
        rest = tail;
    }
    out
}

// --- `#if` expression evaluation --------------------------------------

struct PpExprParser<'a> {
    tokens: Vec<PpTok<'a>>,
    pos: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum PpTok<'a> {
    Num(i64),
    Op(&'a str),
}

fn eval_pp_expr(text: &str) -> Option<i64> {
    let tokens = pp_expr_tokens(text)?;
    let mut parser = PpExprParser { tokens, pos: 0 };
    let value = parser.parse_expr(0)?;
    if parser.pos == parser.tokens.len() {
        Some(value)
    } else {
        None
    }
}

fn pp_expr_tokens(text: &str) -> Option<Vec<PpTok<'_>>> {
    let mut tokens = Vec::new();
    let mut rest = text.trim();
    while !rest.is_empty() {
        let bytes = rest.as_bytes();
        if bytes[0].is_ascii_digit() {
            let end = rest
                .find(|c: char| !c.is_ascii_alphanumeric())
                .unwrap_or(rest.len());
            let lit = &rest[..end];
            let value = if let Some(hex) = lit.strip_prefix("0x").or_else(|| lit.strip_prefix("0X"))
            {
                i64::from_str_radix(hex, 16).ok()?
            } else if lit.len() > 1 && lit.starts_with('0') {
                i64::from_str_radix(&lit[1..], 8).ok()?
            } else {
                lit.parse().ok()?
            };
            tokens.push(PpTok::Num(value));
            rest = rest[end..].trim_start();
        } else if bytes[0].is_ascii_alphabetic() || bytes[0] == b'_' {
            // Undefined identifiers surviving expansion evaluate to 0.
            let (_, tail) = split_word(rest);
            tokens.push(PpTok::Num(0));
            rest = tail.trim_start();
        } else {
            let two = rest.get(..2).unwrap_or("");
            let op_len = if matches!(two, "&&" | "||" | "==" | "!=" | "<=" | ">=" | "<<" | ">>") {
                2
            } else if matches!(
                bytes[0],
                b'!' | b'~' | b'-' | b'+' | b'*' | b'/' | b'%' | b'<' | b'>' | b'&' | b'^' | b'|'
                    | b'(' | b')'
            ) {
                1
            } else {
                return None;
            };
            tokens.push(PpTok::Op(&rest[..op_len]));
            rest = rest[op_len..].trim_start();
        }
    }
    Some(tokens)
}

impl<'a> PpExprParser<'a> {
    fn peek(&self) -> Option<PpTok<'a>> {
        self.tokens.get(self.pos).copied()
    }

    fn parse_expr(&mut self, min_prec: u8) -> Option<i64> {
        let mut left = self.parse_unary()?;
        while let Some(PpTok::Op(op)) = self.peek() {
            let prec = match op {
                "||" => 1,
                "&&" => 2,
                "|" => 3,
                "^" => 4,
                "&" => 5,
                "==" | "!=" => 6,
                "<" | ">" | "<=" | ">=" => 7,
                "<<" | ">>" => 8,
                "+" | "-" => 9,
                "*" | "/" | "%" => 10,
                _ => break,
            };
            if prec < min_prec {
                break;
            }
            self.pos += 1;
            let right = self.parse_expr(prec + 1)?;
            left = match op {
                "||" => ((left != 0) || (right != 0)) as i64,
                "&&" => ((left != 0) && (right != 0)) as i64,
                "|" => left | right,
                "^" => left ^ right,
                "&" => left & right,
                "==" => (left == right) as i64,
                "!=" => (left != right) as i64,
                "<" => (left < right) as i64,
                ">" => (left > right) as i64,
                "<=" => (left <= right) as i64,
                ">=" => (left >= right) as i64,
                "<<" => left.wrapping_shl(right as u32),
                ">>" => left.wrapping_shr(right as u32),
                "+" => left.wrapping_add(right),
                "-" => left.wrapping_sub(right),
                "*" => left.wrapping_mul(right),
                "/" => {
                    if right == 0 {
                        return None;
                    }
                    left.wrapping_div(right)
                }
                "%" => {
                    if right == 0 {
                        return None;
                    }
                    left.wrapping_rem(right)
                }
                _ => return None,
            };
        }
        Some(left)
    }

    fn parse_unary(&mut self) -> Option<i64> {
        match self.peek()? {
            PpTok::Num(v) => {
                self.pos += 1;
                Some(v)
            }
            PpTok::Op("!") => {
                self.pos += 1;
                Some((self.parse_unary()? == 0) as i64)
            }
            PpTok::Op("~") => {
                self.pos += 1;
                Some(!self.parse_unary()?)
            }
            PpTok::Op("-") => {
                self.pos += 1;
                Some(self.parse_unary()?.wrapping_neg())
            }
            PpTok::Op("+") => {
                self.pos += 1;
                self.parse_unary()
            }
            PpTok::Op("(") => {
                self.pos += 1;
                let v = self.parse_expr(0)?;
                match self.peek() {
                    Some(PpTok::Op(")")) => {
                        self.pos += 1;
                        Some(v)
                    }
                    _ => None,
                }
            }
            _ => None,
        }
    }
}
