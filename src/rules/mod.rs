//! The rule engine: ~40 pattern-based rules across seven families,
//! evaluated against one file's change-scoped text.

mod docs;
mod exceptions;
mod framework;
mod logging;
mod null_safety;
mod performance;
mod quality;

use crate::config::Config;
use crate::model::{AnalysisContext, Category, Finding, Method, Severity};
use crate::scanner::LineIndex;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use std::path::Path;

fn loop_head_regex() -> &'static Regex {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(?:for|while)\s*\(").unwrap());
    &RE
}

/// True when byte offset `pos` falls inside the braced body of a `for`/
/// `while` loop somewhere earlier in `content`. Used by the rules that
/// escalate severity, or fire at all, only inside a loop (Optional
/// `.get()`, log-in-loop, N+1 repository lookups, string concatenation).
pub(crate) fn is_inside_loop(content: &str, pos: usize) -> bool {
    let bytes = content.as_bytes();
    for m in loop_head_regex().find_iter(content) {
        if m.start() >= pos {
            continue;
        }
        let paren_open = m.end() - 1;
        let paren_close = crate::scanner::find_matching_paren(content, paren_open);
        if paren_close < 0 {
            continue;
        }
        let mut i = paren_close as usize;
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= bytes.len() || bytes[i] != b'{' {
            continue;
        }
        let body_close = crate::scanner::find_matching_brace(content, i);
        if body_close < 0 {
            continue;
        }
        if pos > i && pos < body_close as usize {
            return true;
        }
    }
    false
}

/// Everything one family needs to locate candidate sites, convert them to
/// line numbers, and apply the changed-scope filter.
pub struct RuleContext<'a> {
    pub file: &'a Path,
    pub content: &'a str,
    /// Raw post-image changed lines straight from the diff, never mutated.
    pub diff_lines: &'a BTreeSet<usize>,
    /// Changed lines after the orchestrator's optional method-scope
    /// expansion (`expand_changed_scope_to_method`); most families filter
    /// against this.
    pub scope_lines: &'a BTreeSet<usize>,
    pub methods: &'a [Method],
    pub analysis: &'a AnalysisContext,
    pub config: &'a Config,
    pub line_index: &'a LineIndex,
}

impl<'a> RuleContext<'a> {
    pub fn line_of(&self, byte_offset: usize) -> usize {
        self.line_index.line_of(byte_offset)
    }

    /// Default changed-scope filter: ±1 line tolerance against
    /// `scope_lines`. When `only_changed_lines` is off, everything is in
    /// scope.
    pub fn in_scope(&self, line: usize) -> bool {
        if !self.config.only_changed_lines {
            return true;
        }
        self.scope_lines.iter().any(|&l| line.abs_diff(l) <= 1)
    }

    /// Logging-family scope: the default filter, plus whole enclosing
    /// methods touched by the raw diff (independent of the
    /// `expand_changed_scope_to_method` flag — this expansion is
    /// intrinsic to the logging family, not configurable).
    pub fn in_logging_scope(&self, line: usize) -> bool {
        if !self.config.only_changed_lines {
            return true;
        }
        if self.in_scope(line) {
            return true;
        }
        self.methods
            .iter()
            .any(|m| m.contains_line(line) && m.intersects_lines(self.diff_lines))
    }

    pub fn enclosing_method(&self, line: usize) -> Option<&Method> {
        self.methods.iter().find(|m| m.contains_line(line))
    }

    pub fn make_finding(
        &self,
        severity: Severity,
        category: Category,
        code: &str,
        line: usize,
        message: impl Into<String>,
        explanation: impl Into<String>,
        suggested_fix: Option<String>,
    ) -> Finding {
        Finding {
            severity,
            category,
            file: self.file.to_path_buf(),
            line,
            code: code.to_string(),
            message: message.into(),
            explanation: explanation.into(),
            suggested_fix,
        }
    }
}

/// Runs every family and returns all findings for one file, in rule
/// evaluation order: findings within a file follow the order the
/// families fire, not source position.
pub fn run_all(ctx: &RuleContext) -> Vec<Finding> {
    let mut findings = Vec::new();
    findings.extend(null_safety::check(ctx));
    findings.extend(exceptions::check(ctx));
    findings.extend(logging::check(ctx));
    findings.extend(framework::check(ctx));
    findings.extend(docs::check(ctx));
    findings.extend(performance::check(ctx));
    findings.extend(quality::check(ctx));
    findings
}

/// The highest-severity finding for a file, stable under permutation of
/// rule execution order since `Severity`'s `Ord` is total and `min`
/// picks the most severe regardless of input order.
pub fn max_severity(findings: &[Finding]) -> Option<Severity> {
    findings.iter().map(|f| f.severity).min()
}
