//! Code quality / modernization family: the broadest catch-all, covering
//! boxed-type pitfalls, dead idioms, and a few style-level nits.

use super::RuleContext;
use crate::model::{Category, Finding, Severity};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

const BOXED_TYPES: &[&str] = &[
    "Integer", "Long", "Double", "Float", "Short", "Byte", "Character", "Boolean",
];
const SECRET_FIELD_NAMES: &[&str] = &["password", "secret", "apikey", "api_key", "token"];

fn boxed_decl_regex() -> &'static Regex {
    static RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"\b(Integer|Long|Double|Float|Short|Byte|Character|Boolean)\s+(\w+)\s*=").unwrap()
    });
    &RE
}

fn hardcoded_credential_regex() -> &'static Regex {
    static RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r#"(?i)\b(password|secret|apikey|api_key|token)\s*=\s*"[^"]+"\s*;"#).unwrap()
    });
    &RE
}

fn todo_regex() -> &'static Regex {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"//.*\b(TODO|FIXME)\b").unwrap());
    &RE
}

fn string_literal_regex() -> &'static Regex {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#""([^"\\]{3,}(?:\\.[^"\\]*)*)""#).unwrap());
    &RE
}

fn literal_equals_regex() -> &'static Regex {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(\w+)\.equals\(\s*"([^"]*)"\s*\)"#).unwrap());
    &RE
}

fn while_true_regex() -> &'static Regex {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"while\s*\(\s*true\s*\)\s*\{").unwrap());
    &RE
}

fn legacy_date_regex() -> &'static Regex {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bnew\s+(java\.util\.)?(Date|Calendar)\s*\(").unwrap());
    &RE
}

fn raw_collection_ctor_regex() -> &'static Regex {
    static RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"new\s+(ArrayList|HashMap|HashSet|LinkedList)\s*\(\s*\)").unwrap());
    &RE
}

fn raw_collection_assignment_regex() -> &'static Regex {
    static RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(ArrayList|HashMap|HashSet|LinkedList)\s+\w+\s*=\s*new\s+(?:ArrayList|HashMap|HashSet|LinkedList)\s*\(\s*\)").unwrap());
    &RE
}

fn legacy_empty_collection_regex() -> &'static Regex {
    static RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"Collections\.EMPTY_(LIST|MAP|SET)\b").unwrap());
    &RE
}

fn double_brace_init_regex() -> &'static Regex {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"new\s+\w+(?:<[^>]*>)?\s*\(\s*\)\s*\{\{").unwrap());
    &RE
}

fn math_random_regex() -> &'static Regex {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"Math\.random\(\)").unwrap());
    &RE
}

fn instanceof_regex() -> &'static Regex {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\w+\s+instanceof\s+(\w+)\b").unwrap());
    &RE
}

fn string_equality_regex() -> &'static Regex {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"\b\w+\s*(==|!=)\s*"[^"]*"|"[^"]*"\s*(==|!=)\s*\w+"#).unwrap());
    &RE
}

fn magic_number_regex() -> &'static Regex {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?:^|[^\w.])(\d{2,})(?:[^\w.]|$)").unwrap());
    &RE
}

const DEEP_NESTING_THRESHOLD: usize = 5;

/// Deepest brace-nesting level reached anywhere in `body`, counting the
/// method's own opening brace as depth 1.
fn max_brace_depth(body: &str) -> usize {
    let bytes = body.as_bytes();
    let mut depth: i32 = 0;
    let mut max_depth: i32 = 0;
    let mut in_string: Option<u8> = None;
    let mut i = 0usize;
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
            b'{' => {
                depth += 1;
                max_depth = max_depth.max(depth);
            }
            b'}' => depth -= 1,
            _ => {}
        }
        i += 1;
    }
    max_depth.max(0) as usize
}

pub fn check(ctx: &RuleContext) -> Vec<Finding> {
    let mut findings = Vec::new();
    let content = ctx.content;

    let mut boxed_vars: Vec<String> = Vec::new();
    for caps in boxed_decl_regex().captures_iter(content) {
        if let Some(name) = caps.get(2) {
            boxed_vars.push(name.as_str().to_string());
        }
    }
    if !boxed_vars.is_empty() {
        let pattern = format!(
            r"\b({})\s*(==|!=)\s*(\w+)",
            boxed_vars.iter().map(|v| regex::escape(v)).collect::<Vec<_>>().join("|")
        );
        if let Ok(re) = Regex::new(&pattern) {
            for caps in re.captures_iter(content) {
                let rhs = caps.get(3).map(|m| m.as_str()).unwrap_or_default();
                if rhs == "null" {
                    continue;
                }
                let whole = caps.get(0).unwrap();
                let line = ctx.line_of(whole.start());
                if !ctx.in_scope(line) {
                    continue;
                }
                findings.push(ctx.make_finding(
                    Severity::MustFix,
                    Category::CodeQuality,
                    "CQ001",
                    line,
                    "Boxed type compared with == instead of equals()",
                    "== on Integer/Long/etc. compares references, not values; it happens to work inside the cached -128..127 range and fails outside it.",
                    Some(".equals(...)".to_string()),
                ));
            }
        }
    }

    for caps in hardcoded_credential_regex().captures_iter(content) {
        let whole = caps.get(0).unwrap();
        let line = ctx.line_of(whole.start());
        if !ctx.in_scope(line) {
            continue;
        }
        findings.push(ctx.make_finding(
            Severity::MustFix,
            Category::CodeQuality,
            "CQ002",
            line,
            "Hardcoded credential literal",
            "A literal password/secret/token committed to source is visible to everyone with repo access and in history forever.",
            None,
        ));
        let _ = SECRET_FIELD_NAMES;
    }

    for caps in todo_regex().captures_iter(content) {
        let whole = caps.get(0).unwrap();
        let line = ctx.line_of(whole.start());
        if !ctx.in_scope(line) {
            continue;
        }
        findings.push(ctx.make_finding(
            Severity::Consider,
            Category::CodeQuality,
            "CQ003",
            line,
            "TODO/FIXME comment",
            "Tracked here so it isn't forgotten; consider filing an issue if it represents real follow-up work.",
            None,
        ));
    }

    if content.contains("public boolean equals(") && !content.contains("public int hashCode(") {
        let line = ctx.line_of(content.find("public boolean equals(").unwrap());
        if ctx.in_scope(line) {
            findings.push(ctx.make_finding(
                Severity::ShouldFix,
                Category::CodeQuality,
                "CQ004",
                line,
                "equals() overridden without hashCode()",
                "Objects that are equal by equals() but hash differently break HashMap/HashSet contracts silently.",
                None,
            ));
        }
    } else if content.contains("public int hashCode(") && !content.contains("public boolean equals(") {
        let line = ctx.line_of(content.find("public int hashCode(").unwrap());
        if ctx.in_scope(line) {
            findings.push(ctx.make_finding(
                Severity::ShouldFix,
                Category::CodeQuality,
                "CQ004",
                line,
                "hashCode() overridden without equals()",
                "Objects that are equal by equals() but hash differently break HashMap/HashSet contracts silently.",
                None,
            ));
        }
    }

    for caps in magic_number_regex().captures_iter(content) {
        let group = caps.get(1).unwrap();
        let line_text = content
            .lines()
            .nth(ctx.line_of(group.start()).saturating_sub(1))
            .unwrap_or("");
        if line_text.contains("static final") || line_text.trim_start().starts_with('*') {
            continue;
        }
        let line = ctx.line_of(group.start());
        if !ctx.in_scope(line) {
            continue;
        }
        findings.push(ctx.make_finding(
            Severity::ShouldFix,
            Category::CodeQuality,
            "CQ005",
            line,
            format!("Magic number {}", group.as_str()),
            "An inline numeric literal with no name carries no explanation of what it represents or why that value was chosen.",
            None,
        ));
    }

    let mut literal_counts: HashMap<&str, usize> = HashMap::new();
    for caps in string_literal_regex().captures_iter(content) {
        if let Some(text) = caps.get(1) {
            *literal_counts.entry(text.as_str()).or_insert(0) += 1;
        }
    }
    let mut already_flagged = std::collections::HashSet::new();
    for caps in string_literal_regex().captures_iter(content) {
        let Some(text) = caps.get(1) else { continue };
        if literal_counts.get(text.as_str()).copied().unwrap_or(0) < 2 {
            continue;
        }
        if !already_flagged.insert(text.as_str()) {
            continue;
        }
        let whole = caps.get(0).unwrap();
        let line = ctx.line_of(whole.start());
        if !ctx.in_scope(line) {
            continue;
        }
        findings.push(ctx.make_finding(
            Severity::ShouldFix,
            Category::CodeQuality,
            "CQ006",
            line,
            format!("String literal \"{text}\" repeated across the file"),
            "A domain literal copied more than once drifts silently when only one copy is updated. Extract it to a shared constant.",
            None,
        ));
    }

    for caps in literal_equals_regex().captures_iter(content) {
        let whole = caps.get(0).unwrap();
        let receiver = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        let literal = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
        let line = ctx.line_of(whole.start());
        if !ctx.in_scope(line) {
            continue;
        }
        findings.push(ctx.make_finding(
            Severity::ShouldFix,
            Category::CodeQuality,
            "CQ007",
            line,
            format!("{receiver}.equals(\"{literal}\") can throw if {receiver} is null"),
            "Calling equals() on a possibly-null receiver against a literal throws NullPointerException; flipping the receiver and literal is null-safe.",
            Some(format!("\"{literal}\".equals({receiver})")),
        ));
    }

    for m in while_true_regex().find_iter(content) {
        let brace_pos = m.end() - 1;
        let body_end = crate::scanner::find_matching_brace(content, brace_pos);
        let body = if body_end >= 0 {
            &content[brace_pos + 1..body_end as usize - 1]
        } else {
            ""
        };
        if body.contains("break") || body.contains("return") || body.contains("throw") {
            continue;
        }
        let line = ctx.line_of(m.start());
        if !ctx.in_scope(line) {
            continue;
        }
        findings.push(ctx.make_finding(
            Severity::MustFix,
            Category::CodeQuality,
            "CQ008",
            line,
            "while(true) loop with no visible exit",
            "Without a break, return, or throw anywhere in the body, this loop never terminates.",
            None,
        ));
    }

    for m in legacy_date_regex().find_iter(content) {
        let line = ctx.line_of(m.start());
        if !ctx.in_scope(line) {
            continue;
        }
        findings.push(ctx.make_finding(
            Severity::ShouldFix,
            Category::CodeQuality,
            "CQ009",
            line,
            "Legacy java.util.Date/Calendar usage",
            "Date and Calendar are mutable and notoriously error-prone around time zones. Prefer java.time (Instant, LocalDate, ZonedDateTime).",
            None,
        ));
    }

    for m in raw_collection_ctor_regex().find_iter(content) {
        let line = ctx.line_of(m.start());
        if !ctx.in_scope(line) {
            continue;
        }
        if !raw_collection_assignment_regex().is_match(&content[m.start().saturating_sub(60)..(m.end() + 10).min(content.len())]) {
            continue;
        }
        findings.push(ctx.make_finding(
            Severity::ShouldFix,
            Category::CodeQuality,
            "CQ010",
            line,
            "Raw collection constructor without a generic type argument",
            "Declaring the variable with a raw collection type and a raw constructor loses compile-time type checking on every element access.",
            None,
        ));
    }

    for m in legacy_empty_collection_regex().find_iter(content) {
        let line = ctx.line_of(m.start());
        if !ctx.in_scope(line) {
            continue;
        }
        findings.push(ctx.make_finding(
            Severity::ShouldFix,
            Category::CodeQuality,
            "CQ011",
            line,
            "Raw Collections.EMPTY_* constant",
            "The raw EMPTY_LIST/EMPTY_MAP/EMPTY_SET fields are untyped; Collections.emptyList()/emptyMap()/emptySet() infer the generic type at the call site.",
            None,
        ));
    }

    for m in double_brace_init_regex().find_iter(content) {
        let line = ctx.line_of(m.start());
        if !ctx.in_scope(line) {
            continue;
        }
        findings.push(ctx.make_finding(
            Severity::ShouldFix,
            Category::CodeQuality,
            "CQ012",
            line,
            "Double-brace initialization",
            "Double-brace init creates an anonymous subclass per use, which leaks a reference to the enclosing instance and bloats the classfile count for no benefit over a builder or factory method.",
            None,
        ));
    }

    for m in math_random_regex().find_iter(content) {
        let line = ctx.line_of(m.start());
        if !ctx.in_scope(line) {
            continue;
        }
        findings.push(ctx.make_finding(
            Severity::ShouldFix,
            Category::CodeQuality,
            "CQ013",
            line,
            "Direct Math.random() call",
            "Math.random() is a single shared instance with no seeding control, which makes tests relying on it non-reproducible. Inject a Random or RandomGenerator instead.",
            None,
        ));
    }

    for caps in instanceof_regex().captures_iter(content) {
        let whole = caps.get(0).unwrap();
        let type_name = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        let window_end = (whole.end() + 200).min(content.len());
        let cast = format!("({type_name})");
        if !content[whole.end()..window_end].contains(&cast) {
            continue;
        }
        let line = ctx.line_of(whole.start());
        if !ctx.in_scope(line) {
            continue;
        }
        findings.push(ctx.make_finding(
            Severity::Consider,
            Category::CodeQuality,
            "CQ014",
            line,
            "instanceof followed by an explicit cast to the checked type",
            "Pattern-variable instanceof (`if (x instanceof Type t)`) folds the check and the cast into one expression and removes the redundant cast.",
            None,
        ));
    }

    for method in ctx.methods {
        let body = &content[method.start_byte..method.end_byte];
        let depth = max_brace_depth(body);
        if depth >= DEEP_NESTING_THRESHOLD {
            let line = method.start_line;
            if !ctx.in_scope(line) {
                continue;
            }
            findings.push(ctx.make_finding(
                Severity::Consider,
                Category::CodeQuality,
                "CQ016",
                line,
                format!("Method '{}' nests {depth} blocks deep", method.name),
                "Deeply nested conditionals and loops are hard to read and test; extracting guard clauses or helper methods usually flattens the structure.",
                None,
            ));
        }
    }

    if ctx.config.strict_java {
        for m in string_equality_regex().find_iter(content) {
            let line = ctx.line_of(m.start());
            if !ctx.in_scope(line) {
                continue;
            }
            findings.push(ctx.make_finding(
                Severity::MustFix,
                Category::CodeQuality,
                "CQ015",
                line,
                "String compared with ==/!= instead of equals()",
                "== on String compares references; two equal strings from different sources (e.g. one interned, one built at runtime) are not guaranteed to be the same reference.",
                Some(".equals(...)".to_string()),
            ));
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

    fn run(content: &str, changed: &[usize], config: Config) -> Vec<Finding> {
        let methods = method_spans(content);
        let analysis = build_context(content, &methods);
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
    fn boxed_equality_is_flagged() {
        let content = "class Foo {\n  void m() {\n    Integer a = 200;\n    Integer b = 200;\n    if (a == b) {\n    }\n  }\n}\n";
        let findings = run(content, &[5], Config::default());
        assert!(findings.iter().any(|f| f.code == "CQ001"));
    }

    #[test]
    fn while_true_without_exit_is_must_fix() {
        let content = "class Foo {\n  void m() {\n    while (true) {\n      x();\n    }\n  }\n}\n";
        let findings = run(content, &[3, 4], Config::default());
        assert!(findings.iter().any(|f| f.code == "CQ008"));
    }

    #[test]
    fn while_true_with_break_not_flagged() {
        let content = "class Foo {\n  void m() {\n    while (true) {\n      if (done()) break;\n    }\n  }\n}\n";
        let findings = run(content, &[3, 4], Config::default());
        assert!(!findings.iter().any(|f| f.code == "CQ008"));
    }

    #[test]
    fn literal_equals_suggests_flip() {
        let content = "class Foo {\n  void m(String s) {\n    if (s.equals(\"OK\")) {\n    }\n  }\n}\n";
        let findings = run(content, &[3], Config::default());
        let f = findings.iter().find(|f| f.code == "CQ007").unwrap();
        assert_eq!(f.suggested_fix.as_deref(), Some("\"OK\".equals(s)"));
    }

    #[test]
    fn deeply_nested_method_is_flagged() {
        let content = "class Foo {\n  void m() {\n    if (a) {\n      if (b) {\n        if (c) {\n          if (d) {\n            x();\n          }\n        }\n      }\n    }\n  }\n}\n";
        let findings = run(content, &[2], Config::default());
        assert!(findings.iter().any(|f| f.code == "CQ016"));
    }

    #[test]
    fn shallow_method_not_flagged_for_nesting() {
        let content = "class Foo {\n  void m() {\n    if (a) {\n      x();\n    }\n  }\n}\n";
        let findings = run(content, &[2], Config::default());
        assert!(!findings.iter().any(|f| f.code == "CQ016"));
    }

    #[test]
    fn string_equality_requires_strict_java() {
        let content = "class Foo {\n  void m(String s) {\n    if (s == \"OK\") {\n    }\n  }\n}\n";
        let lenient = run(content, &[3], Config::default());
        assert!(!lenient.iter().any(|f| f.code == "CQ015"));
        let strict = run(
            content,
            &[3],
            Config {
                strict_java: true,
                ..Config::default()
            },
        );
        assert!(strict.iter().any(|f| f.code == "CQ015"));
    }
}
