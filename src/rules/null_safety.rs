//! Null-safety family: `Optional` misuse and unguarded index access.

use super::{is_inside_loop, RuleContext};
use crate::model::{Category, Finding, Severity};
use once_cell::sync::Lazy;
use regex::Regex;

fn optional_of_regex() -> &'static Regex {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"Optional\.of\(\s*([^)]*)\)").unwrap());
    &RE
}

fn chained_call_regex() -> &'static Regex {
    static RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"\w+\(\)\s*\.\s*\w+\(\)\s*\.\s*\w+\(").unwrap());
    &RE
}

fn get_int_literal_regex() -> &'static Regex {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.get\(\s*\d+\s*\)").unwrap());
    &RE
}

fn optional_get_regex() -> &'static Regex {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.get\(\s*\)").unwrap());
    &RE
}

fn looks_like_constant(arg: &str) -> bool {
    let arg = arg.trim();
    if arg.is_empty() {
        return true;
    }
    if arg.starts_with('"') || arg == "null" {
        return true;
    }
    arg.chars().all(|c| c.is_ascii_digit() || c == '.' || c == '-' || c == 'L' || c == 'f')
}

pub fn check(ctx: &RuleContext) -> Vec<Finding> {
    let mut findings = Vec::new();
    let content = ctx.content;

    for caps in optional_of_regex().captures_iter(content) {
        let whole = caps.get(0).unwrap();
        let arg = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        if looks_like_constant(arg) {
            continue;
        }
        let line = ctx.line_of(whole.start());
        if !ctx.in_scope(line) {
            continue;
        }
        findings.push(ctx.make_finding(
            Severity::ShouldFix,
            Category::NullSafety,
            "NS001",
            line,
            "Optional.of() called with a non-constant argument",
            "Optional.of(x) throws NullPointerException if x is null at runtime. Use Optional.ofNullable(x) unless x is provably non-null.",
            Some("Optional.ofNullable(...)".to_string()),
        ));
    }

    for m in chained_call_regex().find_iter(content) {
        let line = ctx.line_of(m.start());
        if !ctx.in_scope(line) {
            continue;
        }
        findings.push(ctx.make_finding(
            Severity::ShouldFix,
            Category::NullSafety,
            "NS002",
            line,
            "Chained method calls without an intermediate null check",
            "A call chain of the form a.b().c() throws NullPointerException if any intermediate result is null. Consider Optional chaining or an explicit null guard.",
            None,
        ));
    }

    for m in get_int_literal_regex().find_iter(content) {
        let line = ctx.line_of(m.start());
        if !ctx.in_scope(line) {
            continue;
        }
        findings.push(ctx.make_finding(
            Severity::ShouldFix,
            Category::NullSafety,
            "NS003",
            line,
            "List access by fixed index without a bounds check",
            "A literal index passed to get() throws IndexOutOfBoundsException if the collection is shorter than expected.",
            None,
        ));
    }

    for m in optional_get_regex().find_iter(content) {
        let line = ctx.line_of(m.start());
        if !ctx.in_scope(line) {
            continue;
        }
        let in_loop = is_inside_loop(content, m.start());
        let severity = if in_loop {
            Severity::MustFix
        } else {
            Severity::ShouldFix
        };
        findings.push(ctx.make_finding(
            severity,
            Category::NullSafety,
            "NS004",
            line,
            "Optional.get() called without isPresent()/isEmpty() guard",
            if in_loop {
                "Optional.get() throws NoSuchElementException on an empty Optional; calling it unconditionally inside a loop compounds the risk on every iteration."
            } else {
                "Optional.get() throws NoSuchElementException on an empty Optional. Prefer orElseThrow(), orElse(), or an isPresent() guard."
            },
            Some("orElseThrow(...)".to_string()),
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
    fn optional_of_non_constant_flagged() {
        let content = "class Foo {\n  void m(String s) {\n    Optional<String> o = Optional.of(s);\n  }\n}\n";
        let findings = run(content, &[3]);
        assert!(findings.iter().any(|f| f.code == "NS001"));
    }

    #[test]
    fn optional_of_literal_not_flagged() {
        let content = "class Foo {\n  void m() {\n    Optional<String> o = Optional.of(\"x\");\n  }\n}\n";
        let findings = run(content, &[3]);
        assert!(!findings.iter().any(|f| f.code == "NS001"));
    }

    #[test]
    fn optional_get_in_loop_is_must_fix() {
        let content = "class Foo {\n  void m(Optional<String> o) {\n    for (int i = 0; i < 3; i++) {\n      String s = o.get();\n    }\n  }\n}\n";
        let findings = run(content, &[4]);
        let f = findings.iter().find(|f| f.code == "NS004").unwrap();
        assert_eq!(f.severity, Severity::MustFix);
    }

    #[test]
    fn optional_get_outside_loop_is_should_fix() {
        let content = "class Foo {\n  void m(Optional<String> o) {\n    String s = o.get();\n  }\n}\n";
        let findings = run(content, &[3]);
        let f = findings.iter().find(|f| f.code == "NS004").unwrap();
        assert_eq!(f.severity, Severity::ShouldFix);
    }
}
