//! Runtime configuration: a flat `key=value` file read once at startup.
//!
//! Unknown keys are ignored (forward compatibility with newer config
//! files); malformed boolean or integer values fall back to the
//! documented default rather than failing the run, since a bad config
//! line should never be the reason a pre-commit hook blocks a commit.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub block_on_must_fix: bool,
    pub only_changed_lines: bool,
    pub expand_changed_scope_to_method: bool,
    pub strict_java: bool,
    pub strict_framework: bool,
    pub enable_transitive_api_discovery: bool,
    pub transitive_api_discovery_max_depth: usize,
    pub transitive_api_discovery_max_visited_files: usize,
    pub transitive_api_discovery_max_controllers: usize,
    pub transitive_caller_structural_fallback: bool,
    pub use_ast_caller_detection: bool,
    pub method_scoped_dependency_graph: bool,
    pub graph_cache_ttl_hours: u64,
    pub rebuild_graph_cache: bool,
    pub enable_pmd_analysis: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            block_on_must_fix: true,
            only_changed_lines: true,
            expand_changed_scope_to_method: true,
            strict_java: false,
            strict_framework: false,
            enable_transitive_api_discovery: true,
            transitive_api_discovery_max_depth: 3,
            transitive_api_discovery_max_visited_files: 200,
            transitive_api_discovery_max_controllers: 25,
            transitive_caller_structural_fallback: false,
            use_ast_caller_detection: false,
            method_scoped_dependency_graph: true,
            graph_cache_ttl_hours: 12,
            rebuild_graph_cache: false,
            enable_pmd_analysis: false,
        }
    }
}

impl Config {
    pub const FILE_NAME: &'static str = ".code-reviewer.properties";

    /// Loads `<repoRoot>/.code-reviewer.properties` if present, else
    /// returns the default config untouched.
    pub fn load(repo_root: &Path) -> Self {
        let path = repo_root.join(Self::FILE_NAME);
        match fs::read_to_string(&path) {
            Ok(text) => Self::parse(&text),
            Err(_) => Self::default(),
        }
    }

    /// Parses `key=value` lines, one per line, `#` starting a comment.
    /// Blank lines and unrecognized keys are skipped silently.
    pub fn parse(text: &str) -> Self {
        let mut raw = HashMap::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                raw.insert(key.trim().to_string(), value.trim().to_string());
            }
        }

        let defaults = Self::default();
        Self {
            block_on_must_fix: bool_or(&raw, "blockOnMustFix", defaults.block_on_must_fix),
            only_changed_lines: bool_or(&raw, "onlyChangedLines", defaults.only_changed_lines),
            expand_changed_scope_to_method: bool_or(
                &raw,
                "expandChangedScopeToMethod",
                defaults.expand_changed_scope_to_method,
            ),
            strict_java: bool_or(&raw, "strictJava", defaults.strict_java),
            strict_framework: bool_or(&raw, "strictFramework", defaults.strict_framework),
            enable_transitive_api_discovery: bool_or(
                &raw,
                "enableTransitiveApiDiscovery",
                defaults.enable_transitive_api_discovery,
            ),
            transitive_api_discovery_max_depth: usize_or(
                &raw,
                "transitiveApiDiscoveryMaxDepth",
                defaults.transitive_api_discovery_max_depth,
            ),
            transitive_api_discovery_max_visited_files: usize_or(
                &raw,
                "transitiveApiDiscoveryMaxVisitedFiles",
                defaults.transitive_api_discovery_max_visited_files,
            ),
            transitive_api_discovery_max_controllers: usize_or(
                &raw,
                "transitiveApiDiscoveryMaxControllers",
                defaults.transitive_api_discovery_max_controllers,
            ),
            transitive_caller_structural_fallback: bool_or(
                &raw,
                "transitiveCallerStructuralFallback",
                defaults.transitive_caller_structural_fallback,
            ),
            use_ast_caller_detection: bool_or(
                &raw,
                "useAstCallerDetection",
                defaults.use_ast_caller_detection,
            ),
            method_scoped_dependency_graph: bool_or(
                &raw,
                "methodScopedDependencyGraph",
                defaults.method_scoped_dependency_graph,
            ),
            graph_cache_ttl_hours: u64_or(
                &raw,
                "graphCacheTtlHours",
                defaults.graph_cache_ttl_hours,
            ),
            rebuild_graph_cache: bool_or(
                &raw,
                "rebuildGraphCache",
                defaults.rebuild_graph_cache,
            ),
            enable_pmd_analysis: bool_or(&raw, "enablePmdAnalysis", defaults.enable_pmd_analysis),
        }
    }
}

fn bool_or(raw: &HashMap<String, String>, key: &str, default: bool) -> bool {
    raw.get(key)
        .and_then(|v| match v.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        })
        .unwrap_or(default)
}

fn usize_or(raw: &HashMap<String, String>, key: &str, default: usize) -> usize {
    raw.get(key)
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default)
}

fn u64_or(raw: &HashMap<String, String>, key: &str, default: u64) -> u64 {
    raw.get(key)
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_keys_and_blank_lines_are_ignored() {
        let cfg = Config::parse("\n# comment\nsomeUnknownKey=true\nstrictJava=true\n");
        assert!(cfg.strict_java);
        assert_eq!(
            cfg,
            Config {
                strict_java: true,
                ..Config::default()
            }
        );
    }

    #[test]
    fn malformed_values_fall_back_to_defaults() {
        let cfg = Config::parse("blockOnMustFix=maybe\ngraphCacheTtlHours=not-a-number\n");
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn overrides_discovery_bounds() {
        let cfg = Config::parse(
            "transitiveApiDiscoveryMaxDepth=5\ntransitiveApiDiscoveryMaxControllers=10\n",
        );
        assert_eq!(cfg.transitive_api_discovery_max_depth, 5);
        assert_eq!(cfg.transitive_api_discovery_max_controllers, 10);
    }
}
