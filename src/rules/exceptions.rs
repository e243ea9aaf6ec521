//! Exception-handling family: swallowed exceptions and over-broad catches.

use super::RuleContext;
use crate::model::{Category, Finding, Severity};
use crate::scanner::find_matching_brace;
use once_cell::sync::Lazy;
use regex::Regex;

fn catch_header_regex() -> &'static Regex {
    static RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"catch\s*\(\s*([\w.]+(?:\s*\|\s*[\w.]+)*)\s+(\w+)\s*\)\s*\{").unwrap());
    &RE
}

fn is_interrupt_type(type_list: &str) -> bool {
    type_list
        .split('|')
        .map(|t| t.trim())
        .any(|t| t == "InterruptedException" || t.ends_with(".InterruptedException"))
}

pub fn check(ctx: &RuleContext) -> Vec<Finding> {
    let mut findings = Vec::new();
    let content = ctx.content;

    for caps in catch_header_regex().captures_iter(content) {
        let whole = caps.get(0).unwrap();
        let types = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        let brace_pos = whole.end() - 1;
        let line = ctx.line_of(whole.start());
        if !ctx.in_scope(line) {
            continue;
        }

        let body_end = find_matching_brace(content, brace_pos);
        let body = if body_end >= 0 {
            &content[brace_pos + 1..body_end as usize - 1]
        } else {
            ""
        };
        let body_is_empty = body.trim().is_empty()
            || body
                .lines()
                .all(|l| l.trim().is_empty() || l.trim().starts_with("//"));

        if body_is_empty {
            findings.push(ctx.make_finding(
                Severity::MustFix,
                Category::ExceptionHandling,
                "EH001",
                line,
                "Empty catch block swallows the exception",
                "An empty catch block silently discards failure information, making production incidents impossible to diagnose. Log the exception or rethrow it.",
                None,
            ));
        }

        if types.split('|').any(|t| t.trim() == "Throwable") {
            findings.push(ctx.make_finding(
                Severity::MustFix,
                Category::ExceptionHandling,
                "EH002",
                line,
                "Catching Throwable also catches Error and OutOfMemoryError",
                "Catching Throwable intercepts JVM errors the application cannot meaningfully recover from. Catch the narrowest applicable exception type.",
                None,
            ));
        } else if types.split('|').any(|t| t.trim() == "Exception") {
            findings.push(ctx.make_finding(
                Severity::ShouldFix,
                Category::ExceptionHandling,
                "EH003",
                line,
                "Catching the generic Exception type",
                "Catching Exception masks unrelated failure modes and prevents callers from handling specific errors distinctly. Catch the specific exception types this code can raise.",
                None,
            ));
        }

        if is_interrupt_type(types) {
            let window: String = body.lines().take(5).collect::<Vec<_>>().join("\n");
            let restores_interrupt = window.contains("Thread.currentThread().interrupt()");
            if !restores_interrupt {
                findings.push(ctx.make_finding(
                    Severity::MustFix,
                    Category::ExceptionHandling,
                    "EH004",
                    line,
                    "InterruptedException caught without restoring the interrupt flag",
                    "Swallowing InterruptedException without calling Thread.currentThread().interrupt() erases the interrupt status, which can stall shutdown and cancellation elsewhere in the call stack.",
                    Some("Thread.currentThread().interrupt();".to_string()),
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
    fn empty_catch_is_must_fix() {
        let content = "class Foo {\n  void m() {\n    try {\n      x();\n    } catch (IOException e) {\n    }\n  }\n}\n";
        let findings = run(content, &[5, 6]);
        assert!(findings.iter().any(|f| f.code == "EH001"));
    }

    #[test]
    fn catch_throwable_is_flagged_even_with_body() {
        let content = "class Foo {\n  void m() {\n    try {\n      x();\n    } catch (Throwable t) {\n      log.error(\"x\", t);\n    }\n  }\n}\n";
        let findings = run(content, &[5]);
        assert!(findings.iter().any(|f| f.code == "EH002"));
        assert!(!findings.iter().any(|f| f.code == "EH001"));
    }

    #[test]
    fn swallowed_interrupt_without_restore() {
        let content = "class Foo {\n  void m() {\n    try {\n      x();\n    } catch (InterruptedException e) {\n      log.warn(\"interrupted\");\n    }\n  }\n}\n";
        let findings = run(content, &[5]);
        assert!(findings.iter().any(|f| f.code == "EH004"));
    }

    #[test]
    fn restored_interrupt_is_not_flagged() {
        let content = "class Foo {\n  void m() {\n    try {\n      x();\n    } catch (InterruptedException e) {\n      Thread.currentThread().interrupt();\n    }\n  }\n}\n";
        let findings = run(content, &[5]);
        assert!(!findings.iter().any(|f| f.code == "EH004"));
    }

    #[test]
    fn interrupt_restored_beyond_five_lines_is_still_flagged() {
        let content = "class Foo {\n  void m() {\n    try {\n      x();\n    } catch (InterruptedException e) {\n      log.warn(\"a\");\n      log.warn(\"b\");\n      log.warn(\"c\");\n      log.warn(\"d\");\n      log.warn(\"e\");\n      log.warn(\"f\");\n      Thread.currentThread().interrupt();\n    }\n  }\n}\n";
        let findings = run(content, &[5]);
        assert!(findings.iter().any(|f| f.code == "EH004"));
    }
}
