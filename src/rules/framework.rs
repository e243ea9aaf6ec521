//! Framework-idiom family: Spring-style annotation misuse.
//!
//! The largest rule family; most rules are independent annotation/body
//! pattern checks against the whole file, a handful need method
//! modifiers or the per-method `AnalysisContext` role flags.

use super::RuleContext;
use crate::model::{Category, Finding, Method, Severity};
use crate::scanner::find_matching_paren;
use once_cell::sync::Lazy;
use regex::Regex;

fn header_before_params<'a>(content: &'a str, method: &Method) -> &'a str {
    let from = method.start_byte.min(content.len());
    let rel = content[from..method.end_byte.min(content.len())].find('(');
    match rel {
        Some(r) => &content[from..from + r],
        None => "",
    }
}

fn has_modifier(content: &str, method: &Method, modifier: &str) -> bool {
    header_before_params(content, method)
        .split_whitespace()
        .any(|w| w == modifier)
}

fn nearby_precedes(content: &str, pos: usize, window: usize, needle: &str) -> bool {
    let start = pos.saturating_sub(window);
    content[start..pos].contains(needle)
}

fn annotation_args(content: &str, annotation_start: usize) -> Option<&str> {
    let open = content[annotation_start..].find('(')? + annotation_start;
    let close = find_matching_paren(content, open);
    if close < 0 {
        return None;
    }
    Some(&content[open + 1..close as usize - 1])
}

fn request_body_regex() -> &'static Regex {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"@RequestBody\b").unwrap());
    &RE
}

fn injection_field_regex() -> &'static Regex {
    static RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"@(?:Autowired|Inject|Resource)\b(?:\([^)]*\))?\s*\n?\s*(?:private|protected|public)?\s*[\w.<>\[\],\s]+?\s+\w+\s*;").unwrap()
    });
    &RE
}

fn hardcoded_url_regex() -> &'static Regex {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#""https?://[^"]+""#).unwrap());
    &RE
}

fn repository_find_regex() -> &'static Regex {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\w*[Rr]epository\.\w*[Ff]ind\w*\(").unwrap());
    &RE
}

fn configuration_properties_regex() -> &'static Regex {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"@ConfigurationProperties\b").unwrap());
    &RE
}

fn value_annotation_regex() -> &'static Regex {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"@Value\(\s*"\$\{([^}]*)\}"\s*\)"#).unwrap());
    &RE
}

fn cacheable_regex() -> &'static Regex {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"@Cacheable\b").unwrap());
    &RE
}

fn inline_rest_client_regex() -> &'static Regex {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"new\s+(?:RestTemplate|WebClient)\s*\(").unwrap());
    &RE
}

fn scheduled_regex() -> &'static Regex {
    static RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"@Scheduled\(\s*fixed(?:Rate|Delay)\s*=\s*\d+").unwrap());
    &RE
}

fn cross_origin_wildcard_regex() -> &'static Regex {
    static RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r#"@CrossOrigin\([^)]*origins\s*=\s*"\*""#).unwrap());
    &RE
}

fn cross_origin_bare_regex() -> &'static Regex {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"@CrossOrigin(\s|\(\s*\)|\n|$)").unwrap());
    &RE
}

fn lifecycle_regex() -> &'static Regex {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"@(?:PostConstruct|PreDestroy)\b").unwrap());
    &RE
}

fn wildcard_response_regex() -> &'static Regex {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"ResponseEntity<\?>").unwrap());
    &RE
}

fn entity_field_regex() -> &'static Regex {
    static RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?i)(?:private|protected|public)\s+\w+(?:<[^>]*>)?\s+(\w*(?:password|secret|token)\w*)\s*;").unwrap()
    });
    &RE
}

fn query_method_name_regex() -> &'static Regex {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?:get|find|query|list)[A-Z]").unwrap());
    &RE
}

pub fn check(ctx: &RuleContext) -> Vec<Finding> {
    let mut findings = Vec::new();
    let content = ctx.content;

    for method in ctx.methods {
        let Some(annotations) = ctx.analysis.annotations_for(method) else {
            continue;
        };
        let line = ctx.line_of(method.start_byte);
        if !ctx.in_scope(line) {
            continue;
        }

        if annotations.contains("@Transactional") && has_modifier(content, method, "private") {
            findings.push(ctx.make_finding(
                Severity::MustFix,
                Category::FrameworkIdiom,
                "FW001",
                line,
                "@Transactional on a private method has no effect",
                "Spring's transactional proxy can only intercept calls through the public interface; annotating a private method silently does nothing.",
                None,
            ));
        }

        if (annotations.contains("@Async") || annotations.contains("@Cacheable"))
            && has_modifier(content, method, "private")
        {
            findings.push(ctx.make_finding(
                Severity::MustFix,
                Category::FrameworkIdiom,
                "FW014",
                line,
                "@Async/@Cacheable on a private method has no effect",
                "Proxy-based AOP cannot intercept private methods; the annotation is silently ignored.",
                None,
            ));
        }

        if annotations.contains("@Transactional")
            && ctx.analysis.is_service
            && query_method_name_regex().is_match(&method.name)
        {
            let args = content[method.start_byte..method.end_byte]
                .find("@Transactional")
                .and_then(|p| annotation_args(content, method.start_byte + p));
            let has_readonly = args.map(|a| a.contains("readOnly")).unwrap_or(false);
            if !has_readonly {
                findings.push(ctx.make_finding(
                    Severity::Consider,
                    Category::FrameworkIdiom,
                    "FW017",
                    line,
                    format!("{} looks like a read-only query but isn't marked readOnly", method.name),
                    "A query-shaped method name (get/find/query/list) under @Transactional without readOnly=true forgoes a read-only transaction optimization.",
                    Some("@Transactional(readOnly = true)".to_string()),
                ));
            }
        }
    }

    if ctx.analysis.is_controller {
        for caps in wildcard_response_regex().find_iter(content) {
            let line = ctx.line_of(caps.start());
            if !ctx.in_scope(line) {
                continue;
            }
            let severity = if ctx.config.strict_framework {
                Severity::ShouldFix
            } else {
                Severity::Consider
            };
            findings.push(ctx.make_finding(
                severity,
                Category::FrameworkIdiom,
                "FW018",
                line,
                "Controller endpoint returns ResponseEntity<?>",
                "A wildcard response type pushes the real payload shape out of the signature and into documentation that can drift. Declare the concrete response type.",
                None,
            ));
        }
    }

    for m in request_body_regex().find_iter(content) {
        let line = ctx.line_of(m.start());
        if !ctx.in_scope(line) {
            continue;
        }
        if nearby_precedes(content, m.start(), 30, "@Valid") || nearby_precedes(content, m.start(), 30, "@Validated") {
            continue;
        }
        let severity = if ctx.analysis.is_controller && ctx.config.strict_framework {
            Severity::MustFix
        } else {
            Severity::ShouldFix
        };
        findings.push(ctx.make_finding(
            severity,
            Category::FrameworkIdiom,
            "FW002",
            line,
            "@RequestBody parameter is not validated",
            "Without @Valid or @Validated next to @RequestBody, bean validation annotations on the payload type are never triggered.",
            Some("@Valid @RequestBody".to_string()),
        ));
    }

    for m in injection_field_regex().find_iter(content) {
        let line = ctx.line_of(m.start());
        if !ctx.in_scope(line) {
            continue;
        }
        findings.push(ctx.make_finding(
            Severity::ShouldFix,
            Category::FrameworkIdiom,
            "FW003",
            line,
            "Field injection instead of constructor injection",
            "Field injection hides required dependencies from the constructor, making the class harder to construct outside a container and impossible to mark final.",
            None,
        ));
    }

    for m in hardcoded_url_regex().find_iter(content) {
        let line = ctx.line_of(m.start());
        if !ctx.in_scope(line) {
            continue;
        }
        findings.push(ctx.make_finding(
            Severity::Consider,
            Category::FrameworkIdiom,
            "FW004",
            line,
            "Hardcoded URL literal",
            "A hardcoded endpoint URL can't be changed per environment without a rebuild. Externalize it to configuration.",
            None,
        ));
    }

    for m in repository_find_regex().find_iter(content) {
        if !super::is_inside_loop(content, m.start()) {
            continue;
        }
        let line = ctx.line_of(m.start());
        if !ctx.in_scope(line) {
            continue;
        }
        findings.push(ctx.make_finding(
            Severity::ShouldFix,
            Category::FrameworkIdiom,
            "FW005",
            line,
            "Repository lookup inside a loop (N+1 query pattern)",
            "Calling a repository find method once per loop iteration issues one database round trip per element. Batch-fetch outside the loop instead.",
            None,
        ));
    }

    for m in configuration_properties_regex().find_iter(content) {
        let line = ctx.line_of(m.start());
        if !ctx.in_scope(line) {
            continue;
        }
        if !content.contains("@Validated") {
            findings.push(ctx.make_finding(
                Severity::ShouldFix,
                Category::FrameworkIdiom,
                "FW006",
                line,
                "@ConfigurationProperties class is not @Validated",
                "Without @Validated, bean-validation constraints on configuration fields are never checked at startup.",
                None,
            ));
        }
    }

    for caps in value_annotation_regex().captures_iter(content) {
        let whole = caps.get(0).unwrap();
        let inner = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        let line = ctx.line_of(whole.start());
        if !ctx.in_scope(line) {
            continue;
        }
        let lower = inner.to_ascii_lowercase();
        if lower.contains("password") || lower.contains("secret") || lower.contains("token") {
            findings.push(ctx.make_finding(
                Severity::MustFix,
                Category::FrameworkIdiom,
                "FW008",
                line,
                "@Value injects a secret-shaped property directly",
                "Binding a password/secret/token property straight into a field via @Value bypasses centralized secret management. Use a secrets provider.",
                None,
            ));
        } else if !inner.contains(':') {
            findings.push(ctx.make_finding(
                Severity::ShouldFix,
                Category::FrameworkIdiom,
                "FW007",
                line,
                "@Value property has no default value",
                "Without a `:default` fallback, a missing property fails application startup instead of degrading predictably.",
                None,
            ));
        }
    }

    for m in cacheable_regex().find_iter(content) {
        let line = ctx.line_of(m.start());
        if !ctx.in_scope(line) {
            continue;
        }
        let args = annotation_args(content, m.start()).unwrap_or_default();
        if !args.contains("key") {
            findings.push(ctx.make_finding(
                Severity::ShouldFix,
                Category::FrameworkIdiom,
                "FW009",
                line,
                "@Cacheable has no explicit cache key",
                "Without an explicit key, the default key generator hashes all arguments together, which can collide or vary unexpectedly across overloads.",
                None,
            ));
        }
    }

    for m in inline_rest_client_regex().find_iter(content) {
        let line = ctx.line_of(m.start());
        if !ctx.in_scope(line) {
            continue;
        }
        findings.push(ctx.make_finding(
            Severity::Consider,
            Category::FrameworkIdiom,
            "FW010",
            line,
            "REST client constructed inline instead of injected",
            "A RestTemplate/WebClient built inside a method bypasses shared connection pooling, timeouts, and interceptors configured on the managed bean.",
            None,
        ));
    }

    for m in scheduled_regex().find_iter(content) {
        let line = ctx.line_of(m.start());
        if !ctx.in_scope(line) {
            continue;
        }
        findings.push(ctx.make_finding(
            Severity::Consider,
            Category::FrameworkIdiom,
            "FW011",
            line,
            "@Scheduled interval is a raw millisecond literal",
            "A bare millisecond constant is hard to read and easy to typo. Prefer a named duration property or a documented constant.",
            None,
        ));
    }

    for m in cross_origin_wildcard_regex().find_iter(content) {
        let line = ctx.line_of(m.start());
        if !ctx.in_scope(line) {
            continue;
        }
        findings.push(ctx.make_finding(
            Severity::MustFix,
            Category::FrameworkIdiom,
            "FW012",
            line,
            "CORS origin wildcard",
            "origins = \"*\" allows any site to call this endpoint with credentials-free requests, defeating same-origin protections for browser clients.",
            None,
        ));
    }

    for m in cross_origin_bare_regex().find_iter(content) {
        let line = ctx.line_of(m.start());
        if !ctx.in_scope(line) {
            continue;
        }
        let severity = if ctx.config.strict_framework {
            Severity::MustFix
        } else {
            Severity::ShouldFix
        };
        findings.push(ctx.make_finding(
            severity,
            Category::FrameworkIdiom,
            "FW013",
            line,
            "@CrossOrigin with no explicit origins",
            "A bare @CrossOrigin defaults to allowing all origins, which is rarely the intended policy for a production endpoint.",
            None,
        ));
    }

    for m in lifecycle_regex().find_iter(content) {
        let line = ctx.line_of(m.start());
        if !ctx.in_scope(line) {
            continue;
        }
        if let Some(method) = ctx.methods.iter().find(|mm| mm.start_line >= line) {
            if has_modifier(content, method, "static") {
                findings.push(ctx.make_finding(
                    Severity::MustFix,
                    Category::FrameworkIdiom,
                    "FW015",
                    line,
                    "@PostConstruct/@PreDestroy on a static method",
                    "Lifecycle callbacks are invoked on the bean instance; a static method is never called by the container and the hook silently never runs.",
                    None,
                ));
            }
        }
    }

    if ctx.analysis.is_entity {
        for caps in entity_field_regex().captures_iter(content) {
            let whole = caps.get(0).unwrap();
            let line = ctx.line_of(whole.start());
            if !ctx.in_scope(line) {
                continue;
            }
            if !nearby_precedes(content, whole.start(), 40, "@JsonIgnore") {
                findings.push(ctx.make_finding(
                    Severity::MustFix,
                    Category::FrameworkIdiom,
                    "FW019",
                    line,
                    "Sensitive entity field is serialized without @JsonIgnore",
                    "A password/secret/token-shaped field on a JPA entity without @JsonIgnore will be included in any default JSON serialization of the entity.",
                    Some("@JsonIgnore".to_string()),
                ));
            }
        }
    }

    for method in ctx.methods {
        let Some(annotations) = ctx.analysis.annotations_for(method) else {
            continue;
        };
        if !annotations.contains("@Transactional") {
            continue;
        }
        let call = format!("this.{}(", method.name);
        for caller in ctx.methods {
            if caller.name == method.name {
                continue;
            }
            let body = &content[caller.start_byte..caller.end_byte];
            if let Some(rel) = body.find(&call) {
                let abs = caller.start_byte + rel;
                let line = ctx.line_of(abs);
                if !ctx.in_scope(line) {
                    continue;
                }
                findings.push(ctx.make_finding(
                    Severity::MustFix,
                    Category::FrameworkIdiom,
                    "FW016",
                    line,
                    format!("Self-invocation of @Transactional method {}", method.name),
                    "Calling this.method() bypasses the Spring proxy entirely, so the transactional advice never runs for this call.",
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
    fn transactional_on_private_method() {
        let content = "class Foo {\n  @Transactional\n  private void m() {\n    x();\n  }\n}\n";
        let findings = run(content, &[2, 3]);
        assert!(findings.iter().any(|f| f.code == "FW001"));
    }

    #[test]
    fn cors_wildcard_is_must_fix() {
        let content = "@RestController\n@CrossOrigin(origins = \"*\")\nclass Foo {\n}\n";
        let findings = run(content, &[2]);
        assert!(findings.iter().any(|f| f.code == "FW012"));
    }

    #[test]
    fn request_body_without_valid_is_flagged() {
        let content = "class Foo {\n  void m(@RequestBody Payload p) {\n  }\n}\n";
        let findings = run(content, &[2]);
        assert!(findings.iter().any(|f| f.code == "FW002"));
    }

    #[test]
    fn request_body_with_valid_not_flagged() {
        let content = "class Foo {\n  void m(@Valid @RequestBody Payload p) {\n  }\n}\n";
        let findings = run(content, &[2]);
        assert!(!findings.iter().any(|f| f.code == "FW002"));
    }

    #[test]
    fn value_secret_is_must_fix() {
        let content = "class Foo {\n  @Value(\"${db.password}\")\n  String pw;\n}\n";
        let findings = run(content, &[2]);
        assert!(findings.iter().any(|f| f.code == "FW008"));
    }

    #[test]
    fn self_invocation_of_transactional_method_is_must_fix() {
        let content = "class Foo {\n  @Transactional\n  public void inner() {\n  }\n\n  public void outer() {\n    this.inner();\n  }\n}\n";
        let findings = run(content, &[7]);
        assert!(findings.iter().any(|f| f.code == "FW016" && f.severity == Severity::MustFix));
    }
}
