//! Per-file `AnalysisContext` construction: class-level and method-level
//! annotations, and the framework-role booleans the rule engine gates
//! severity escalation on.

use crate::model::{AnalysisContext, Method};
use crate::scanner;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

const CONTROLLER_ANNOTATIONS: &[&str] = &["@RestController", "@Controller"];
const SERVICE_ANNOTATIONS: &[&str] = &["@Service"];
const REPOSITORY_ANNOTATIONS: &[&str] = &["@Repository"];
const ENTITY_ANNOTATIONS: &[&str] = &["@Entity"];

fn class_header_regex() -> &'static Regex {
    static RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?m)^\s*((?:@\w+(?:\([^)]*\))?\s*)*)\s*(?:public|private|protected)?\s*(?:abstract\s+|final\s+)*(?:class|interface|enum|record)\s+(\w+)").unwrap());
    &RE
}

fn annotation_name_regex() -> &'static Regex {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"@(\w+)").unwrap());
    &RE
}

/// Extracts the annotation names in `text` (bare name, no `@`).
fn extract_annotation_names(text: &str) -> HashSet<String> {
    annotation_name_regex()
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| format!("@{}", m.as_str()))
        .collect()
}

fn any_present(annotations: &HashSet<String>, markers: &[&str]) -> bool {
    markers.iter().any(|m| annotations.contains(*m))
}

/// Builds the per-file analysis context used by the rule engine and the
/// impact analyzer's controller detection.
pub fn build_context(content: &str, methods: &[Method]) -> AnalysisContext {
    let class_name = class_header_regex()
        .captures(content)
        .and_then(|c| c.get(2))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();

    let class_annotation_block = class_header_regex()
        .captures(content)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or("");
    let class_annotations = extract_annotation_names(class_annotation_block);

    let is_controller = any_present(&class_annotations, CONTROLLER_ANNOTATIONS);
    let is_service = any_present(&class_annotations, SERVICE_ANNOTATIONS);
    let is_repository = any_present(&class_annotations, REPOSITORY_ANNOTATIONS);
    let is_entity = any_present(&class_annotations, ENTITY_ANNOTATIONS);

    let lines: Vec<&str> = content.lines().collect();
    let mut method_annotations = Vec::new();
    for m in methods {
        let header_idx = m.start_line.saturating_sub(1).min(lines.len().saturating_sub(1));
        let ann_start = scanner::backscan_annotation_block(&lines, header_idx);
        let block = lines[ann_start..=header_idx].join("\n");
        method_annotations.push((m.clone(), extract_annotation_names(&block)));
    }

    AnalysisContext {
        class_name,
        class_annotations,
        method_annotations,
        is_controller,
        is_service,
        is_repository,
        is_entity,
    }
}

/// Quick controller-only check used by the BFS, which doesn't need the
/// full context (method annotations are irrelevant there).
pub fn is_controller_file(content: &str) -> bool {
    let Some(caps) = class_header_regex().captures(content) else {
        return false;
    };
    let block = caps.get(1).map(|m| m.as_str()).unwrap_or("");
    any_present(&extract_annotation_names(block), CONTROLLER_ANNOTATIONS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_controller_annotation() {
        let content = "@RestController\n@RequestMapping(\"/x\")\npublic class Foo {\n}\n";
        let ctx = build_context(content, &[]);
        assert!(ctx.is_controller);
        assert_eq!(ctx.class_name, "Foo");
    }

    #[test]
    fn non_annotated_class_has_no_roles() {
        let content = "public class Plain {\n}\n";
        let ctx = build_context(content, &[]);
        assert!(!ctx.is_controller && !ctx.is_service && !ctx.is_repository && !ctx.is_entity);
    }
}
