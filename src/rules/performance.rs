//! Performance family: allocation and blocking-call hot spots.

use super::{is_inside_loop, RuleContext};
use crate::model::{Category, Finding, Severity};
use once_cell::sync::Lazy;
use regex::Regex;

fn or_else_call_regex() -> &'static Regex {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.orElse\(\s*\w+\([^)]*\)\s*\)").unwrap());
    &RE
}

fn string_concat_assign_regex() -> &'static Regex {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\w+)\s*\+=\s*").unwrap());
    &RE
}

fn thread_sleep_regex() -> &'static Regex {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"Thread\.sleep\(\s*(\d+)\s*\)").unwrap());
    &RE
}

const SLEEP_MIN_MS: i64 = 1;
const SLEEP_MAX_MS: i64 = 60_000;

pub fn check(ctx: &RuleContext) -> Vec<Finding> {
    let mut findings = Vec::new();
    let content = ctx.content;

    for m in or_else_call_regex().find_iter(content) {
        let line = ctx.line_of(m.start());
        if !ctx.in_scope(line) {
            continue;
        }
        findings.push(ctx.make_finding(
            Severity::ShouldFix,
            Category::Performance,
            "PERF001",
            line,
            "Optional.orElse() argument is evaluated eagerly",
            "Unlike orElseGet(supplier), the argument to orElse() is evaluated every time regardless of whether the Optional is present, paying the cost of the fallback call even when it's discarded.",
            Some("orElseGet(() -> ...)".to_string()),
        ));
    }

    for caps in string_concat_assign_regex().captures_iter(content) {
        let whole = caps.get(0).unwrap();
        if !is_inside_loop(content, whole.start()) {
            continue;
        }
        let line = ctx.line_of(whole.start());
        if !ctx.in_scope(line) {
            continue;
        }
        findings.push(ctx.make_finding(
            Severity::ShouldFix,
            Category::Performance,
            "PERF002",
            line,
            "String concatenation inside a loop",
            "`+=` on a String inside a loop allocates a new String object per iteration. Use a StringBuilder and append outside or across iterations.",
            Some("StringBuilder".to_string()),
        ));
    }

    for caps in thread_sleep_regex().captures_iter(content) {
        let whole = caps.get(0).unwrap();
        let line = ctx.line_of(whole.start());
        if !ctx.in_scope(line) {
            continue;
        }
        findings.push(ctx.make_finding(
            Severity::Consider,
            Category::Performance,
            "PERF003",
            line,
            "Thread.sleep() with a literal duration",
            "A bare millisecond literal in Thread.sleep() is easy to misread and hard to tune. Consider a named constant or a non-blocking wait.",
            None,
        ));

        if let Some(ms) = caps.get(1).and_then(|m| m.as_str().parse::<i64>().ok()) {
            if ms < SLEEP_MIN_MS || ms > SLEEP_MAX_MS {
                findings.push(ctx.make_finding(
                    Severity::Consider,
                    Category::Performance,
                    "PERF004",
                    line,
                    format!("Thread.sleep({ms}) is outside the usual 1ms-60s range"),
                    "A sleep duration this small is likely a busy-wait; one this large likely belongs in a scheduled task rather than an inline sleep.",
                    None,
                ));
            }
        }
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
    fn or_else_eager_call_is_flagged() {
        let content = "class Foo {\n  void m() {\n    String s = opt.orElse(compute());\n  }\n}\n";
        let findings = run(content, &[3]);
        assert!(findings.iter().any(|f| f.code == "PERF001"));
    }

    #[test]
    fn string_concat_in_loop_is_flagged() {
        let content = "class Foo {\n  void m() {\n    String s = \"\";\n    for (int i = 0; i < 10; i++) {\n      s += i;\n    }\n  }\n}\n";
        let findings = run(content, &[5]);
        assert!(findings.iter().any(|f| f.code == "PERF002"));
    }

    #[test]
    fn string_concat_outside_loop_not_flagged() {
        let content = "class Foo {\n  void m() {\n    String s = \"\";\n    s += \"x\";\n  }\n}\n";
        let findings = run(content, &[3]);
        assert!(!findings.iter().any(|f| f.code == "PERF002"));
    }

    #[test]
    fn out_of_range_sleep_is_flagged() {
        let content = "class Foo {\n  void m() {\n    Thread.sleep(500000);\n  }\n}\n";
        let findings = run(content, &[3]);
        assert!(findings.iter().any(|f| f.code == "PERF004"));
    }
}
