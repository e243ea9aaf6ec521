//! API documentation family: OpenAPI/Swagger annotation completeness.
//!
//! These rules only fire on controller classes; a missing `@Tag` or
//! `@Operation` on a plain service method isn't a documentation gap
//! because it was never meant to be documented.

use super::RuleContext;
use crate::model::{Category, Finding, Severity};
use once_cell::sync::Lazy;
use regex::Regex;

const MAPPING_ANNOTATIONS: &[&str] = &[
    "@GetMapping",
    "@PostMapping",
    "@PutMapping",
    "@DeleteMapping",
    "@PatchMapping",
    "@RequestMapping",
];

fn mapping_method_regex() -> &'static Regex {
    static RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?m)^\s*@(GetMapping|PostMapping|PutMapping|DeleteMapping|PatchMapping|RequestMapping)\b").unwrap()
    });
    &RE
}

fn operation_regex() -> &'static Regex {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*@Operation\b").unwrap());
    &RE
}

fn endpoint_param_regex() -> &'static Regex {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"@(?:PathVariable|RequestParam)\b").unwrap());
    &RE
}

fn preceding_block(content: &str, pos: usize, window: usize) -> &str {
    let start = pos.saturating_sub(window);
    &content[start..pos]
}

pub fn check(ctx: &RuleContext) -> Vec<Finding> {
    let mut findings = Vec::new();
    if !ctx.analysis.is_controller {
        return findings;
    }
    let content = ctx.content;

    if !content.contains("@Tag") {
        let line = ctx
            .line_of(content.find("class").or_else(|| content.find("interface")).unwrap_or(0));
        if ctx.in_scope(line) {
            findings.push(ctx.make_finding(
                Severity::Consider,
                Category::ApiDocumentation,
                "DOC001",
                line,
                "Controller has no @Tag annotation",
                "A Swagger/OpenAPI @Tag groups this controller's endpoints under a readable heading in generated documentation.",
                None,
            ));
        }
    }

    for m in mapping_method_regex().find_iter(content) {
        let line = ctx.line_of(m.start());
        if !ctx.in_scope(line) {
            continue;
        }
        if !preceding_block(content, m.start(), 120).contains("@Operation")
            && !content[m.end()..(m.end() + 200).min(content.len())].contains("@Operation")
        {
            findings.push(ctx.make_finding(
                Severity::Consider,
                Category::ApiDocumentation,
                "DOC002",
                line,
                "Endpoint mapping has no @Operation summary",
                "Without @Operation, the generated API documentation falls back to the bare method name and signature.",
                None,
            ));
        }
    }

    for m in operation_regex().find_iter(content) {
        let line = ctx.line_of(m.start());
        if !ctx.in_scope(line) {
            continue;
        }
        let window_end = (m.end() + 300).min(content.len());
        if !content[m.end()..window_end].contains("@ApiResponse") {
            findings.push(ctx.make_finding(
                Severity::Consider,
                Category::ApiDocumentation,
                "DOC003",
                line,
                "@Operation has no @ApiResponse documented",
                "Without at least one @ApiResponse, generated docs don't describe this endpoint's response codes or payload shape.",
                None,
            ));
        }
    }

    for m in endpoint_param_regex().find_iter(content) {
        let window_end = (m.end() + 60).min(content.len());
        if content[m.end()..window_end].contains("@Parameter") {
            continue;
        }
        let line = ctx.line_of(m.start());
        if !ctx.in_scope(line) {
            continue;
        }
        findings.push(ctx.make_finding(
            Severity::Consider,
            Category::ApiDocumentation,
            "DOC004",
            line,
            "Endpoint parameter has no @Parameter description",
            "An undocumented @PathVariable/@RequestParam shows up in generated docs with no explanation of its meaning or constraints.",
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
    fn controller_without_tag_is_flagged() {
        let content = "@RestController\nclass Foo {\n  @GetMapping(\"/x\")\n  void m() {\n  }\n}\n";
        let findings = run(content, &[1, 2, 3]);
        assert!(findings.iter().any(|f| f.code == "DOC001"));
    }

    #[test]
    fn mapping_with_operation_not_flagged() {
        let content = "@RestController\n@Tag(name = \"foo\")\nclass Foo {\n  @Operation(summary = \"x\")\n  @GetMapping(\"/x\")\n  void m() {\n  }\n}\n";
        let findings = run(content, &[4, 5]);
        assert!(!findings.iter().any(|f| f.code == "DOC002"));
    }

    #[test]
    fn non_controller_class_is_skipped() {
        let content = "class Foo {\n  @GetMapping(\"/x\")\n  void m() {\n  }\n}\n";
        let findings = run(content, &[2]);
        assert!(findings.is_empty());
    }
}
