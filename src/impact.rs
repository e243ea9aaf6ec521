//! Impact analysis: touched-method extraction, the caller-detection
//! cascade, endpoint extraction, and the bounded transitive BFS.

use crate::model::{ClassInfo, DependencyKind, Method};
use crate::scanner::{self, LineIndex};
use crate::symbol_index;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::path::{Path, PathBuf};

/// A method whose source span intersects the diff's changed lines.
pub fn touched_methods(methods: &[Method], changed_lines: &BTreeSet<usize>) -> Vec<Method> {
    methods
        .iter()
        .filter(|m| m.intersects_lines(changed_lines))
        .cloned()
        .collect()
}

fn any_touched_token_present(content: &str, touched: &[String]) -> bool {
    touched.iter().any(|n| {
        content.contains(&format!("{n}("))
            || content.contains(&format!(".{n}("))
            || content.contains(&format!("::{n}"))
    })
}

fn to_lower_camel(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) => c.to_lowercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn enclosing_method_name(methods: &[Method], pos: usize) -> Option<String> {
    methods
        .iter()
        .find(|m| m.start_byte <= pos && pos < m.end_byte)
        .map(|m| m.name.clone())
}

/// Tier 1: candidate instance names — declarations typed as the target (or
/// a supertype), the synthesized lowerCamelCase field-name guess, and the
/// target simple name itself (covers static calls).
fn instance_names(content: &str, target_simple: &str, target_fqn: &str, supertypes: &[String]) -> HashSet<String> {
    let mut set = HashSet::new();
    set.insert(target_simple.to_string());

    let mut type_candidates: Vec<&str> = vec![target_simple, target_fqn];
    type_candidates.extend(supertypes.iter().map(String::as_str));

    for ty in type_candidates {
        if ty.is_empty() {
            continue;
        }
        let pattern = format!(
            r"\b{}\b(?:\s*<[^<>]*>)?\s+([A-Za-z_][A-Za-z0-9_]*)\b",
            regex::escape(ty)
        );
        if let Ok(re) = Regex::new(&pattern) {
            for caps in re.captures_iter(content) {
                if let Some(m) = caps.get(1) {
                    set.insert(m.as_str().to_string());
                }
            }
        }
    }

    let camel = to_lower_camel(target_simple);
    if !camel.is_empty() && symbol_index::contains_token(content, &camel) {
        set.insert(camel);
    }

    set
}

fn tier2_qualified_calls(
    content: &str,
    methods: &[Method],
    instances: &HashSet<String>,
    touched: &[String],
) -> HashSet<String> {
    let mut out = HashSet::new();
    for inst in instances {
        for t in touched {
            let dot_pattern = format!(r"\b{}\s*\.\s*{}\b\s*\(", regex::escape(inst), regex::escape(t));
            let ref_pattern = format!(r"\b{}\s*::\s*{}\b", regex::escape(inst), regex::escape(t));
            for pattern in [dot_pattern, ref_pattern] {
                if let Ok(re) = Regex::new(&pattern) {
                    for m in re.find_iter(content) {
                        if let Some(name) = enclosing_method_name(methods, m.start()) {
                            out.insert(name);
                        }
                    }
                }
            }
        }
    }
    out
}

fn tier3_broad_fallback(content: &str, methods: &[Method], touched: &[String]) -> HashSet<String> {
    let mut out = HashSet::new();
    for t in touched {
        let dot_pattern = format!(r"[A-Za-z_][A-Za-z0-9_]*\s*\.\s*{}\b\s*\(", regex::escape(t));
        let ref_pattern = format!(r"[A-Za-z_][A-Za-z0-9_]*\s*::\s*{}\b", regex::escape(t));
        for pattern in [dot_pattern, ref_pattern] {
            if let Ok(re) = Regex::new(&pattern) {
                for m in re.find_iter(content) {
                    if let Some(name) = enclosing_method_name(methods, m.start()) {
                        out.insert(name);
                    }
                }
            }
        }
    }
    out
}

fn is_lower_camel(s: &str) -> bool {
    s.chars().next().map(|c| c.is_lowercase()).unwrap_or(false)
}

fn tier4_type_anchored_fallback(
    content: &str,
    methods: &[Method],
    touched: &[String],
    target_simple: &str,
    instances: &HashSet<String>,
) -> HashSet<String> {
    let mut out = HashSet::new();
    for t in touched {
        let pattern = format!(r"([A-Za-z_][A-Za-z0-9_]*)\s*\.\s*{}\b\s*\(", regex::escape(t));
        let Ok(re) = Regex::new(&pattern) else { continue };
        for caps in re.captures_iter(content) {
            let qualifier = caps.get(1).unwrap().as_str();
            let whole = caps.get(0).unwrap();
            let plausible = qualifier == target_simple
                || instances.contains(qualifier)
                || is_lower_camel(qualifier)
                || content.contains(&format!("{qualifier} = new {target_simple}("));
            if plausible {
                if let Some(name) = enclosing_method_name(methods, whole.start()) {
                    out.insert(name);
                }
            }
        }
    }
    out
}

fn likely_referenced(content: &str, target: &ClassInfo) -> bool {
    (!target.fqn.is_empty() && content.contains(&target.fqn))
        || content.contains(&format!("import {};", target.fqn))
        || content.contains(&format!("import {}.*;", target.package_name))
        || content.contains(&format!("new {}(", target.simple_name))
        || content.contains(&format!("{}.", target.simple_name))
        || content.contains(&format!("{}<", target.simple_name))
        || Regex::new(&format!(r"\b{}\s+\w+", regex::escape(&target.simple_name)))
            .map(|r| r.is_match(content))
            .unwrap_or(false)
}

fn tier5_static_imports(
    content: &str,
    methods: &[Method],
    target_fqn: &str,
    touched: &[String],
) -> HashSet<String> {
    let mut out = HashSet::new();
    if target_fqn.is_empty() {
        return out;
    }
    let wildcard_marker = format!("import static {target_fqn}.*");
    let has_wildcard = content.contains(&wildcard_marker);
    for t in touched {
        let specific_marker = format!("import static {target_fqn}.{t}");
        if !has_wildcard && !content.contains(&specific_marker) {
            continue;
        }
        let pattern = format!(r"(?:^|[^.\w]){}\s*\(", regex::escape(t));
        let Ok(re) = Regex::new(&pattern) else { continue };
        for m in re.find_iter(content) {
            if let Some(name) = enclosing_method_name(methods, m.start()) {
                out.insert(name);
            }
        }
    }
    out
}

/// Tier 6: the opt-in AST-based structural fallback. No target-language
/// AST facility ships in this crate (this tier is documented as
/// optional and parallel to the regex path); per the contract, callers
/// must tolerate an empty result when it is unavailable, so this always
/// degrades to empty rather than approximating with more regex.
fn tier6_structural_fallback(
    _content: &str,
    _methods: &[Method],
    _target: &ClassInfo,
    _touched: &[String],
) -> HashSet<String> {
    HashSet::new()
}

/// Inputs to the 5-tier-plus-structural caller cascade.
pub struct CascadeOptions {
    pub allow_broad_fallback: bool,
    pub use_structural_fallback: bool,
}

/// Returns the set of enclosing method names in `content` that contain at
/// least one call site matching a touched method on `target` (or one of
/// its supertypes).
pub fn detect_callers(
    content: &str,
    methods: &[Method],
    target: &ClassInfo,
    touched: &[String],
    opts: &CascadeOptions,
) -> HashSet<String> {
    if touched.is_empty() || !any_touched_token_present(content, touched) {
        return HashSet::new();
    }

    let instances = instance_names(content, &target.simple_name, &target.fqn, &target.supertype_simple_names);

    let tier2 = tier2_qualified_calls(content, methods, &instances, touched);
    if !tier2.is_empty() {
        return tier2;
    }

    if opts.allow_broad_fallback {
        let tier3 = tier3_broad_fallback(content, methods, touched);
        if !tier3.is_empty() {
            return tier3;
        }
    }

    if likely_referenced(content, target) {
        let tier4 = tier4_type_anchored_fallback(content, methods, touched, &target.simple_name, &instances);
        if !tier4.is_empty() {
            return tier4;
        }
    }

    let tier5 = tier5_static_imports(content, methods, &target.fqn, touched);
    if !tier5.is_empty() {
        return tier5;
    }

    if opts.use_structural_fallback {
        return tier6_structural_fallback(content, methods, target, touched);
    }

    HashSet::new()
}

/// Labels a verified dependency edge for the human-readable impact note.
pub fn classify_dependency(candidate: &ClassInfo, target: &ClassInfo, content: &str) -> DependencyKind {
    let names_overlap = candidate.supertype_simple_names.contains(&target.simple_name)
        || target
            .supertype_simple_names
            .iter()
            .any(|s| candidate.supertype_simple_names.contains(s));
    if names_overlap {
        return DependencyKind::Extends;
    }
    if symbol_index::has_injected_reference(content, target) {
        return DependencyKind::Injected;
    }
    DependencyKind::Calls
}

// ── Endpoint extraction ────────────────────────────────────────────────

const ROUTE_ANNOTATIONS: &[(&str, &str)] = &[
    ("GetMapping", "GET"),
    ("PostMapping", "POST"),
    ("PutMapping", "PUT"),
    ("DeleteMapping", "DELETE"),
    ("PatchMapping", "PATCH"),
];

fn request_method_regex() -> &'static Regex {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"method\s*=\s*RequestMethod\.(\w+)").unwrap());
    &RE
}

fn extract_parenthesized(s: &str) -> Option<String> {
    let trimmed = s.trim_start();
    if !trimmed.starts_with('(') {
        return None;
    }
    let start = s.len() - trimmed.len();
    let close = scanner::find_matching_paren(s, start);
    if close < 0 {
        return None;
    }
    let close = close as usize;
    Some(s[start + 1..close - 1].to_string())
}

fn extract_first_quoted(s: &str) -> Option<String> {
    let start = s.find('"')?;
    let rest = &s[start + 1..];
    let end = rest.find('"')?;
    Some(rest[..end].to_string())
}

fn join_path(prefix: &str, suffix: &str) -> String {
    let mut combined = format!("{prefix}/{suffix}");
    while combined.contains("//") {
        combined = combined.replace("//", "/");
    }
    if !combined.starts_with('/') {
        combined = format!("/{combined}");
    }
    if combined.len() > 1 && combined.ends_with('/') {
        combined.pop();
    }
    combined
}

/// Parses the class prefix from the first class-level `@RequestMapping`
/// found before the class/interface keyword.
pub fn class_prefix(content: &str) -> Option<String> {
    let head_end = ["class ", "interface "]
        .iter()
        .filter_map(|kw| content.find(kw))
        .min()
        .unwrap_or_else(|| content.len().min(4000));
    let head = &content[..head_end];
    let at = head.rfind("@RequestMapping")?;
    let after = &head[at + "@RequestMapping".len()..];
    let args = extract_parenthesized(after)?;
    extract_first_quoted(&args).or(Some(String::new()))
}

fn endpoints_for_method(
    method: &Method,
    class_prefix_value: &str,
    lines: &[&str],
) -> Vec<(String, String)> {
    let header_idx = method.start_line.saturating_sub(1);
    let ann_start_idx = scanner::backscan_annotation_block(lines, header_idx);
    let block_text = lines[ann_start_idx..=header_idx.min(lines.len().saturating_sub(1))].join("\n");

    let mut results = Vec::new();
    for (annotation, verb) in ROUTE_ANNOTATIONS {
        let marker = format!("@{annotation}");
        if let Some(pos) = block_text.find(&marker) {
            let after = &block_text[pos + marker.len()..];
            let path = extract_parenthesized(after)
                .and_then(|args| extract_first_quoted(&args))
                .unwrap_or_default();
            results.push((verb.to_string(), join_path(class_prefix_value, &path)));
        }
    }
    if let Some(pos) = block_text.find("@RequestMapping") {
        let after = &block_text[pos + "@RequestMapping".len()..];
        if let Some(args) = extract_parenthesized(after) {
            let path = extract_first_quoted(&args).unwrap_or_default();
            let verb = request_method_regex()
                .captures(&args)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string())
                .unwrap_or_else(|| "ANY".to_string());
            results.push((verb, join_path(class_prefix_value, &path)));
        }
    }
    results
}

/// Extracts `ClassName.method [VERB /full/path]` entries for every method
/// in `wanted` that carries a routing annotation.
pub fn extract_endpoints(content: &str, class_name: &str, wanted: &[String]) -> Vec<String> {
    let Some(prefix) = class_prefix(content) else {
        return Vec::new();
    };
    let methods = scanner::method_spans(content);
    let lines: Vec<&str> = content.lines().collect();
    let mut out = Vec::new();
    for m in &methods {
        if !wanted.contains(&m.name) {
            continue;
        }
        for (verb, path) in endpoints_for_method(m, &prefix, &lines) {
            out.push(format!("{class_name}.{} [{verb} {path}]", m.name));
        }
    }
    out
}

// ── Transitive endpoint discovery ──────────────────────────────────────

/// Abstraction over the orchestrator-owned reverse graph and content
/// cache, so the BFS stays decoupled from `symbol_index`'s storage
/// details. The reverse graph and content cache are monotonic caches —
/// `dependents_of` computes and inserts on demand for FQNs not among the
/// original targets.
pub trait GraphContext {
    fn dependents_of(&mut self, fqn: &str) -> HashSet<PathBuf>;
    fn class_info(&self, path: &Path) -> Option<ClassInfo>;
    fn content(&self, path: &Path) -> Option<String>;
    fn is_controller(&self, content: &str) -> bool;
}

#[derive(Debug, Clone, Copy)]
pub struct BfsBounds {
    pub max_depth: usize,
    pub max_visited_files: usize,
    pub max_controllers: usize,
}

impl Default for BfsBounds {
    fn default() -> Self {
        Self {
            max_depth: 3,
            max_visited_files: 200,
            max_controllers: 25,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BfsOutcome {
    pub endpoints: Vec<String>,
    pub notes: Vec<String>,
    pub controllers_found: usize,
}

struct QueueNode {
    fqn: String,
    path: PathBuf,
    simple_name: String,
    supertypes: Vec<String>,
    impacted_methods: Vec<String>,
    depth: usize,
    call_chain_note: Option<String>,
}

fn summarize_call_chain(class_name: &str, methods: &[String]) -> String {
    let shown: Vec<String> = methods.iter().take(2).map(|m| format!("{m}()")).collect();
    let joined = shown.join(", ");
    if methods.len() > shown.len() {
        format!("{class_name}.{joined}, +{} more", methods.len() - shown.len())
    } else {
        format!("{class_name}.{joined}")
    }
}

/// Runs the bounded BFS from a changed (non-controller) class and its
/// initial touched methods, discovering HTTP endpoints reachable through
/// intermediate classes.
pub fn discover_transitive_endpoints(
    seed_class: &ClassInfo,
    seed_methods: Vec<String>,
    ctx: &mut dyn GraphContext,
    bounds: BfsBounds,
) -> BfsOutcome {
    let mut queue = VecDeque::new();
    queue.push_back(QueueNode {
        fqn: seed_class.fqn.clone(),
        path: seed_class.path.clone(),
        simple_name: seed_class.simple_name.clone(),
        supertypes: seed_class.supertype_simple_names.clone(),
        impacted_methods: seed_methods,
        depth: 0,
        call_chain_note: None,
    });

    let mut visited_controllers: HashSet<String> = HashSet::new();
    let mut visited_intermediates: HashSet<String> = HashSet::new();
    let mut outcome = BfsOutcome::default();
    let mut visited_files = 0usize;

    while let Some(node) = queue.pop_front() {
        if node.depth > bounds.max_depth {
            continue;
        }
        if visited_files >= bounds.max_visited_files || outcome.controllers_found >= bounds.max_controllers {
            break;
        }

        if node.depth > 0 {
            if let Some(note) = &node.call_chain_note {
                outcome.notes.push(note.clone());
            }
        }

        let dependents = ctx.dependents_of(&node.fqn);
        let mut sorted_dependents: Vec<PathBuf> = dependents.into_iter().collect();
        sorted_dependents.sort();

        for dep_path in sorted_dependents {
            if visited_files >= bounds.max_visited_files {
                break;
            }
            if symbol_index::is_test_file(&dep_path) {
                continue;
            }
            let Some(content) = ctx.content(&dep_path) else {
                continue;
            };
            let Some(dep_class) = ctx.class_info(&dep_path) else {
                continue;
            };
            let is_ctrl = ctx.is_controller(&content);

            let target = ClassInfo {
                path: node.path.clone(),
                package_name: String::new(),
                simple_name: node.simple_name.clone(),
                fqn: node.fqn.clone(),
                supertype_simple_names: node.supertypes.clone(),
            };

            let opts = CascadeOptions {
                allow_broad_fallback: !is_ctrl,
                use_structural_fallback: !is_ctrl,
            };
            let methods = scanner::method_spans(&content);
            let calling_methods = detect_callers(&content, &methods, &target, &node.impacted_methods, &opts);
            if calling_methods.is_empty() {
                continue;
            }

            visited_files += 1;
            let mut sorted_methods: Vec<String> = calling_methods.into_iter().collect();
            sorted_methods.sort();
            let key = format!("{}|{}", dep_class.fqn, sorted_methods.join(","));

            if is_ctrl {
                if !visited_controllers.insert(key) {
                    continue;
                }
                outcome.controllers_found += 1;
                if outcome.controllers_found > bounds.max_controllers {
                    break;
                }
                for ep in extract_endpoints(&content, &dep_class.simple_name, &sorted_methods) {
                    if !outcome.endpoints.contains(&ep) {
                        outcome.endpoints.push(ep);
                    }
                }
            } else {
                if !visited_intermediates.insert(key) {
                    continue;
                }
                let next_depth = node.depth + 1;
                if next_depth > bounds.max_depth {
                    continue;
                }
                let note = format!(
                    "Transitive caller [depth {next_depth}]: {}",
                    summarize_call_chain(&dep_class.simple_name, &sorted_methods)
                );
                queue.push_back(QueueNode {
                    fqn: dep_class.fqn.clone(),
                    path: dep_path.clone(),
                    simple_name: dep_class.simple_name.clone(),
                    supertypes: dep_class.supertype_simple_names.clone(),
                    impacted_methods: sorted_methods,
                    depth: next_depth,
                    call_chain_note: Some(note),
                });
            }
        }
    }

    outcome
}

pub fn line_index(content: &str) -> LineIndex {
    LineIndex::new(content)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class(name: &str, fqn: &str) -> ClassInfo {
        ClassInfo {
            path: PathBuf::from(format!("{name}.java")),
            package_name: fqn.rsplit_once('.').map(|(p, _)| p.to_string()).unwrap_or_default(),
            simple_name: name.to_string(),
            fqn: fqn.to_string(),
            supertype_simple_names: Vec::new(),
        }
    }

    #[test]
    fn tier2_finds_qualified_call() {
        let content = "class Caller {\n  private Repo repo;\n  void handle() {\n    repo.touchedMethod();\n  }\n}\n";
        let methods = scanner::method_spans(content);
        let target = class("Repo", "pkg.Repo");
        let touched = vec!["touchedMethod".to_string()];
        let opts = CascadeOptions { allow_broad_fallback: true, use_structural_fallback: false };
        let callers = detect_callers(content, &methods, &target, &touched, &opts);
        assert!(callers.contains("handle"));
    }

    #[test]
    fn broad_fallback_disabled_for_controllers_hides_injection_only_callers() {
        let content = "class CtrlA {\n  private Service service;\n  void other() {\n    logger.info(\"x\");\n  }\n}\n";
        let methods = scanner::method_spans(content);
        let target = class("Service", "pkg.Service");
        let touched = vec!["doWork".to_string()];
        let opts = CascadeOptions { allow_broad_fallback: false, use_structural_fallback: false };
        let callers = detect_callers(content, &methods, &target, &touched, &opts);
        assert!(callers.is_empty());
    }

    #[test]
    fn endpoint_extraction_joins_class_prefix_and_method_path() {
        let content = r#"
@RequestMapping("/api/widgets")
public class WidgetController {
    @GetMapping("/{id}")
    public Widget get(String id) {
        return null;
    }
}
"#;
        let endpoints = extract_endpoints(content, "WidgetController", &["get".to_string()]);
        assert_eq!(endpoints, vec!["WidgetController.get [GET /api/widgets/{id}]".to_string()]);
    }

    #[test]
    fn no_self_edges_from_classify() {
        let a = class("A", "pkg.A");
        let b = class("B", "pkg.B");
        assert_eq!(classify_dependency(&a, &b, "class A {}"), DependencyKind::Calls);
    }

    #[test]
    fn classify_detects_injected_field() {
        let a = class("WidgetService", "pkg.WidgetService");
        let b = class("WidgetRepository", "pkg.WidgetRepository");
        let content = "class WidgetService {\n  @Autowired\n  private WidgetRepository repository;\n}\n";
        assert_eq!(classify_dependency(&a, &b, content), DependencyKind::Injected);
    }
}
