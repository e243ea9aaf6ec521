//! Logging family: secret leakage, log-call hygiene, and console usage.
//!
//! Log call sites are parsed with a small tokenizer that walks the
//! argument list respecting string literals, escapes, and balanced
//! brackets, since a plain comma-split breaks on arguments like
//! `fmt("{}, {}", a, b)`.

use super::{is_inside_loop, RuleContext};
use crate::model::{Category, Finding, Severity};
use crate::scanner::find_matching_paren;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

const SECRET_MARKERS: &[&str] = &["password", "token", "secret", "apikey", "api_key", "credential"];

fn log_call_regex() -> &'static Regex {
    static RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"\b(?:log|logger|LOG|LOGGER)\.(trace|debug|info|warn|error)\s*\(").unwrap());
    &RE
}

fn println_regex() -> &'static Regex {
    static RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"System\.(?:out|err)\.println?\s*\(").unwrap());
    &RE
}

/// Splits a parenthesized argument list on top-level commas, respecting
/// nested `()`/`[]`/`{}` and string/char literals.
fn split_top_level_args(args: &str) -> Vec<String> {
    let bytes = args.as_bytes();
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut start = 0usize;
    let mut i = 0usize;
    let mut in_string: Option<u8> = None;
    while i < bytes.len() {
        let b = bytes[i];
        if let Some(q) = in_string {
            if b == b'\\' {
                i += 2;
                continue;
            }
            if b == q {
                in_string = None;
            }
            i += 1;
            continue;
        }
        match b {
            b'"' | b'\'' => in_string = Some(b),
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth -= 1,
            b',' if depth == 0 => {
                out.push(args[start..i].trim().to_string());
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    if start < bytes.len() {
        out.push(args[start..].trim().to_string());
    }
    out.into_iter().filter(|s| !s.is_empty()).collect()
}

fn placeholder_count(literal: &str) -> usize {
    literal.matches("{}").count()
}

fn simple_identifier_regex() -> &'static Regex {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());
    &RE
}

pub fn check(ctx: &RuleContext) -> Vec<Finding> {
    let mut findings = Vec::new();
    let content = ctx.content;

    let mut seen_calls: HashMap<String, usize> = HashMap::new();
    let mut seen_vars: HashMap<String, usize> = HashMap::new();

    for caps in log_call_regex().captures_iter(content) {
        let whole = caps.get(0).unwrap();
        let paren_pos = whole.end() - 1;
        let close = find_matching_paren(content, paren_pos);
        if close < 0 {
            continue;
        }
        let args_text = &content[paren_pos + 1..close as usize - 1];
        let args = split_top_level_args(args_text);
        let line = ctx.line_of(whole.start());

        if SECRET_MARKERS.iter().any(|m| {
            args.first()
                .map(|a| a.to_ascii_lowercase().contains(m))
                .unwrap_or(false)
        }) && ctx.in_logging_scope(line)
        {
            findings.push(ctx.make_finding(
                Severity::MustFix,
                Category::Logging,
                "LOG001",
                line,
                "Log statement may leak a secret value",
                "The logged literal mentions password/token/secret/credential. Redact or omit sensitive values from log output.",
                None,
            ));
        }

        if is_inside_loop(content, whole.start()) && ctx.in_logging_scope(line) {
            findings.push(ctx.make_finding(
                Severity::ShouldFix,
                Category::Logging,
                "LOG002",
                line,
                "Log statement inside a loop",
                "Logging on every loop iteration can flood log storage and obscure the signal. Log a summary once, outside the loop, or sample.",
                None,
            ));
        }

        if let Some(first) = args.first() {
            if first.starts_with('"') {
                let expected = placeholder_count(first);
                let actual = args.len() - 1;
                if expected != actual && ctx.in_logging_scope(line) {
                    findings.push(ctx.make_finding(
                        Severity::ShouldFix,
                        Category::Logging,
                        "LOG003",
                        line,
                        format!("Log message has {expected} placeholder(s) but {actual} argument(s)"),
                        "A mismatched {} placeholder count means the logged message either drops an argument or prints the literal {} text.",
                        None,
                    ));
                }
            }
        }

        if ctx.in_logging_scope(line) {
            let key = format!(
                "{}|{}",
                ctx.enclosing_method(line).map(|m| m.name.as_str()).unwrap_or(""),
                args_text.trim()
            );
            let count = seen_calls.entry(key).or_insert(0);
            *count += 1;
            if *count == 2 {
                findings.push(ctx.make_finding(
                    Severity::Consider,
                    Category::Logging,
                    "LOG004",
                    line,
                    "Identical log statement repeated in the same method",
                    "The same log call with the same arguments appears more than once in this method; consolidate to one statement.",
                    None,
                ));
            }

            let method_name = ctx.enclosing_method(line).map(|m| m.name.as_str()).unwrap_or("");
            for arg in args.iter().skip(1) {
                let trimmed = arg.trim();
                if !simple_identifier_regex().is_match(trimmed) {
                    continue;
                }
                let var_key = format!("{method_name}|{trimmed}");
                let var_count = seen_vars.entry(var_key).or_insert(0);
                *var_count += 1;
                if *var_count == 2 {
                    findings.push(ctx.make_finding(
                        Severity::Consider,
                        Category::Logging,
                        "LOG006",
                        line,
                        format!("Variable '{trimmed}' is logged more than once in this method"),
                        "Logging the same variable at multiple points in one method usually means the log calls can be consolidated into a single statement.",
                        None,
                    ));
                }
            }
        }
    }

    for m in println_regex().find_iter(content) {
        let line = ctx.line_of(m.start());
        if !ctx.in_logging_scope(line) {
            continue;
        }
        findings.push(ctx.make_finding(
            Severity::ShouldFix,
            Category::Logging,
            "LOG005",
            line,
            "Use of System.out/err.println instead of the logger",
            "Console output bypasses log levels, formatting, and centralized log aggregation. Use the configured logger.",
            None,
        ));
    }

    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::context::build_context;
    use crate::scanner::{method_spans, LineIndex};
    use std::collections::BTreeSet;
    use std::path::Path;

    fn run(content: &str, changed: &[usize]) -> Vec<Finding> {
        let methods = method_spans(content);
        let analysis = build_context(content, &methods);
        let config = Config::default();
        let line_index = LineIndex::new(content);
        let scope: BTreeSet<usize> = changed.iter().copied().collect();
        let ctx = RuleContext {
            file: Path::new("Foo.java"),
            content,
            diff_lines: &scope,
            scope_lines: &scope,
            methods: &methods,
            analysis: &analysis,
            config: &config,
            line_index: &line_index,
        };
        check(&ctx)
    }

    #[test]
    fn secret_marker_in_log_literal() {
        let content = "class Foo {\n  void m(String password) {\n    log.info(\"password=\" + password);\n  }\n}\n";
        let findings = run(content, &[3]);
        assert!(findings.iter().any(|f| f.code == "LOG001"));
    }

    #[test]
    fn placeholder_count_mismatch() {
        let content = "class Foo {\n  void m(String a) {\n    log.info(\"a={} b={}\", a);\n  }\n}\n";
        let findings = run(content, &[3]);
        assert!(findings.iter().any(|f| f.code == "LOG003"));
    }

    #[test]
    fn placeholder_count_match_not_flagged() {
        let content = "class Foo {\n  void m(String a, String b) {\n    log.info(\"a={} b={}\", a, b);\n  }\n}\n";
        let findings = run(content, &[3]);
        assert!(!findings.iter().any(|f| f.code == "LOG003"));
    }

    #[test]
    fn println_is_flagged() {
        let content = "class Foo {\n  void m() {\n    System.out.println(\"hi\");\n  }\n}\n";
        let findings = run(content, &[3]);
        assert!(findings.iter().any(|f| f.code == "LOG005"));
    }

    #[test]
    fn same_variable_logged_twice_in_method_is_flagged() {
        let content = "class Foo {\n  void m(String userId) {\n    log.info(\"start {}\", userId);\n    log.info(\"end {}\", userId);\n  }\n}\n";
        let findings = run(content, &[3, 4]);
        assert!(findings.iter().any(|f| f.code == "LOG006"));
    }

    #[test]
    fn different_variables_logged_once_each_not_flagged() {
        let content = "class Foo {\n  void m(String a, String b) {\n    log.info(\"a={}\", a);\n    log.info(\"b={}\", b);\n  }\n}\n";
        let findings = run(content, &[3, 4]);
        assert!(!findings.iter().any(|f| f.code == "LOG006"));
    }
}
