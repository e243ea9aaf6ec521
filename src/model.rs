//! Core data model shared by every stage of the review pipeline.
//!
//! A `ChangedFile` goes in, a `Finding`/`ImpactEntry` stream comes out, and
//! a `ClassInfo`/`Imports` pair describes how the symbol index sees one
//! file.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::path::PathBuf;

/// One staged file plus the set of post-image line numbers touched by the
/// diff. Created once per run from the VCS diff and never mutated again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedFile {
    pub path: PathBuf,
    pub name: String,
    pub changed_lines: BTreeSet<usize>,
}

impl ChangedFile {
    pub fn new(path: PathBuf, changed_lines: BTreeSet<usize>) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Self {
            path,
            name,
            changed_lines,
        }
    }

    /// True when `line` falls within `changed_lines`, allowing `slack`
    /// lines on either side (the rule engine's default ±1 tolerance).
    pub fn line_in_scope(&self, line: usize, slack: usize) -> bool {
        self.changed_lines
            .iter()
            .any(|&l| line.abs_diff(l) <= slack)
    }
}

/// Total-ordered severity: `MustFix < ShouldFix < Consider` for "max
/// severity" computations (derive order follows declaration order).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    MustFix,
    ShouldFix,
    Consider,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::MustFix => "MUST_FIX",
            Severity::ShouldFix => "SHOULD_FIX",
            Severity::Consider => "CONSIDER",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The closed set of finding categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    NullSafety,
    ExceptionHandling,
    Logging,
    FrameworkIdiom,
    ApiDocumentation,
    Performance,
    CodeQuality,
}

/// A single rule violation, bound to a file/line/category/severity.
/// Immutable once constructed by the rule engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub severity: Severity,
    pub category: Category,
    pub file: PathBuf,
    pub line: usize,
    pub code: String,
    pub message: String,
    pub explanation: String,
    pub suggested_fix: Option<String>,
}

/// One declared top-level type in the repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassInfo {
    pub path: PathBuf,
    pub package_name: String,
    pub simple_name: String,
    pub fqn: String,
    /// Superclass and interface simple names as they appeared in the class
    /// header, with generic arguments stripped.
    pub supertype_simple_names: Vec<String>,
}

impl ClassInfo {
    pub fn fqn_of(package_name: &str, simple_name: &str) -> String {
        if package_name.is_empty() {
            simple_name.to_string()
        } else {
            format!("{package_name}.{simple_name}")
        }
    }
}

/// Explicit and wildcard imports found in one file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Imports {
    pub explicit: HashSet<String>,
    pub wildcard: HashSet<String>,
}

impl Imports {
    pub fn imports_fqn(&self, fqn: &str) -> bool {
        self.explicit.contains(fqn)
    }

    pub fn imports_package_wildcard(&self, package: &str) -> bool {
        self.wildcard.contains(package)
    }
}

/// Label attached to a verified reverse-dependency edge for the
/// human-readable impact note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DependencyKind {
    Injected,
    Extends,
    Calls,
}

impl DependencyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DependencyKind::Injected => "INJECTED",
            DependencyKind::Extends => "EXTENDS",
            DependencyKind::Calls => "CALLS",
        }
    }
}

/// Accumulated impact signal for one changed file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImpactEntry {
    pub file_name: String,
    pub fqn: String,
    pub layers: Vec<String>,
    pub endpoints: Vec<String>,
    pub functions: Vec<String>,
    pub notes: Vec<String>,
    pub recommended_tests: Vec<String>,
    pub method_scoped_dependents: Vec<String>,
}

impl ImpactEntry {
    pub fn new(file_name: String, fqn: String) -> Self {
        Self {
            file_name,
            fqn,
            ..Default::default()
        }
    }

    /// Append an endpoint, deduplicating while preserving first occurrence.
    pub fn push_endpoint(&mut self, endpoint: String) {
        if !self.endpoints.contains(&endpoint) {
            self.endpoints.push(endpoint);
        }
    }

    pub fn push_note(&mut self, note: String) {
        if !self.notes.contains(&note) {
            self.notes.push(note);
        }
    }
}

/// A method declaration's byte span plus its declared name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodSpan {
    pub start: usize,
    pub end: usize,
    pub name_start: usize,
    pub name_end: usize,
}

impl MethodSpan {
    pub fn contains(&self, pos: usize) -> bool {
        pos >= self.start && pos < self.end
    }
}

/// A named, resolved method span plus line bounds, as exposed to rules and
/// the impact analyzer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Method {
    pub name: String,
    pub start_byte: usize,
    pub end_byte: usize,
    pub start_line: usize,
    pub end_line: usize,
}

impl Method {
    pub fn intersects_lines(&self, lines: &BTreeSet<usize>) -> bool {
        lines.iter().any(|&l| l >= self.start_line && l <= self.end_line)
    }

    pub fn contains_line(&self, line: usize) -> bool {
        line >= self.start_line && line <= self.end_line
    }
}

/// Per-file analysis context: class-level and method-level annotations,
/// plus the framework-role booleans derived from them.
#[derive(Debug, Clone, Default)]
pub struct AnalysisContext {
    pub class_name: String,
    pub class_annotations: HashSet<String>,
    pub method_annotations: Vec<(Method, HashSet<String>)>,
    pub is_controller: bool,
    pub is_service: bool,
    pub is_repository: bool,
    pub is_entity: bool,
}

impl AnalysisContext {
    pub fn annotations_for(&self, method: &Method) -> Option<&HashSet<String>> {
        self.method_annotations
            .iter()
            .find(|(m, _)| m.name == method.name && m.start_line == method.start_line)
            .map(|(_, anns)| anns)
    }
}

/// The final result payload emitted by the review engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReviewPayload {
    pub branch: String,
    pub staged_count: usize,
    pub findings: Vec<Finding>,
    pub impact_entries: Vec<ImpactEntry>,
    pub testing_status: std::collections::BTreeMap<String, TestingStatus>,
    pub reverse_graph: std::collections::BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestingStatus {
    pub has_tests: bool,
    pub related_tests: Vec<String>,
}

impl ReviewPayload {
    /// Exit code: 1 iff a MUST_FIX finding exists and `block_on_must_fix`
    /// is set.
    pub fn exit_code(&self, block_on_must_fix: bool) -> i32 {
        if block_on_must_fix && self.findings.iter().any(|f| f.severity == Severity::MustFix) {
            1
        } else {
            0
        }
    }
}
