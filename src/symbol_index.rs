//! Whole-repo symbol index: what does this file declare, and does file A
//! depend on class B?

use crate::model::{ClassInfo, Imports};
use crate::scanner;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use walkdir::WalkDir;

/// Directories that never contain reviewable source: build output, VCS
/// metadata, and dependency vendoring.
const IGNORED_DIRS: &[&str] = &[
    ".git",
    "target",
    "node_modules",
    "vendor",
    "dist",
    "build",
    "out",
    ".idea",
    ".code-reviewer-cache",
];

/// Injection-style annotations that make a field/parameter a framework
/// collaborator rather than a plain declaration. Framework-agnostic by
/// design — swap this list for the target ecosystem's idiom.
const INJECTION_ANNOTATIONS: &[&str] = &["@Autowired", "@Inject", "@Resource"];

fn package_regex() -> &'static Regex {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*package\s+([\w.]+)\s*;").unwrap());
    &RE
}

fn import_regex() -> &'static Regex {
    static RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?m)^\s*import\s+(static\s+)?([\w.]+)(\.\*)?\s*;").unwrap());
    &RE
}

fn type_header_regex() -> &'static Regex {
    static RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(
            r"(?m)^\s*(?:[\w@()\"\s]*?\s)?(?:public|private|protected)?\s*(?:static\s+|final\s+|abstract\s+)*(?:class|interface|enum|record)\s+(\w+)",
        )
        .unwrap()
    });
    &RE
}

/// Per-process cache of `\bname\b` patterns, amortizing repeated
/// identifier-token searches across files.
static WORD_PATTERN_CACHE: Lazy<Mutex<HashMap<String, Regex>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Whole-word, non-allocating (after the first call) token search for
/// `name` within `content`.
pub fn contains_token(content: &str, name: &str) -> bool {
    let mut cache = WORD_PATTERN_CACHE.lock().unwrap();
    let re = cache.entry(name.to_string()).or_insert_with(|| {
        Regex::new(&format!(r"\b{}\b", regex::escape(name))).unwrap()
    });
    re.is_match(content)
}

pub fn is_ignored(path: &Path) -> bool {
    path.components().any(|c| {
        let s = c.as_os_str().to_string_lossy();
        IGNORED_DIRS.contains(&s.as_ref())
    })
}

pub fn is_test_file(path: &Path) -> bool {
    let normalized = path.to_string_lossy().replace('\\', "/");
    if normalized.contains("/test/") || normalized.starts_with("test/") {
        return true;
    }
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(|s| s.ends_with("Test"))
        .unwrap_or(false)
}

/// Two paths share a module when they share the normalized prefix up to
/// the first `/src/main/<lang>/` or `/src/test/<lang>/` segment, or the
/// parent directory when neither segment exists.
pub fn module_root(path: &Path) -> PathBuf {
    let normalized = path.to_string_lossy().replace('\\', "/");
    for marker in ["/src/main/", "/src/test/"] {
        if let Some(idx) = normalized.find(marker) {
            // include up through the language directory component after the marker
            let rest = &normalized[idx + marker.len()..];
            let lang_end = rest.find('/').map(|p| idx + marker.len() + p).unwrap_or(normalized.len());
            return PathBuf::from(&normalized[..lang_end]);
        }
    }
    path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from(""))
}

pub fn same_module(a: &Path, b: &Path) -> bool {
    module_root(a) == module_root(b)
}

/// Parses the package declaration, explicit/wildcard imports, and the
/// first top-level type declaration (with its supertype simple names) out
/// of one file's content.
pub fn parse_file(path: &Path, content: &str) -> Option<(ClassInfo, Imports)> {
    let package_name = package_regex()
        .captures(content)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();

    let mut imports = Imports::default();
    for caps in import_regex().captures_iter(content) {
        let is_static = caps.get(1).is_some();
        let target = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
        let is_wildcard = caps.get(3).is_some();
        if is_static {
            // Static imports are tracked separately by the impact analyzer;
            // the symbol index only needs to know the type is referenced.
            if let Some(dot) = target.rfind('.') {
                imports.explicit.insert(target[..dot].to_string());
            }
            continue;
        }
        if is_wildcard {
            imports.wildcard.insert(target.to_string());
        } else {
            imports.explicit.insert(target.to_string());
        }
    }

    let header_caps = type_header_regex().captures(content)?;
    let simple_name = header_caps.get(1)?.as_str().to_string();
    let header_start = header_caps.get(0)?.end();

    let header_end = find_header_end(content, header_start);
    let header_text = &content[header_start..header_end];
    let supertype_simple_names = parse_supertypes(header_text);

    let fqn = ClassInfo::fqn_of(&package_name, &simple_name);

    Some((
        ClassInfo {
            path: path.to_path_buf(),
            package_name,
            simple_name,
            fqn,
            supertype_simple_names,
        },
        imports,
    ))
}

/// Finds the `{` that opens the class body (respecting angle-bracket
/// nesting so generic argument commas don't terminate the header early).
fn find_header_end(content: &str, from: usize) -> usize {
    let bytes = content.as_bytes();
    let mut i = from;
    let mut angle_depth = 0i32;
    while i < bytes.len() {
        match bytes[i] {
            b'<' => angle_depth += 1,
            b'>' => angle_depth -= 1,
            b'{' if angle_depth <= 0 => return i,
            b';' if angle_depth <= 0 => return i,
            _ => {}
        }
        i += 1;
    }
    bytes.len()
}

/// Parses `extends`/`implements` clauses, respecting angle-bracket nesting
/// (generic argument lists may contain commas), returning supertype
/// simple names with generic arguments stripped.
fn parse_supertypes(header: &str) -> Vec<String> {
    let mut names = Vec::new();
    for keyword in ["extends", "implements"] {
        if let Some(kw_pos) = find_keyword(header, keyword) {
            let rest = &header[kw_pos + keyword.len()..];
            let clause_end = find_clause_end(rest);
            let clause = &rest[..clause_end];
            for token in split_top_level_commas(clause) {
                let name = token.split('<').next().unwrap_or("").trim();
                let simple = name.rsplit('.').next().unwrap_or(name).trim();
                if !simple.is_empty() {
                    names.push(simple.to_string());
                }
            }
        }
    }
    names
}

fn find_keyword(text: &str, keyword: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let kw = keyword.as_bytes();
    let mut i = 0;
    while i + kw.len() <= bytes.len() {
        if &bytes[i..i + kw.len()] == kw {
            let before_ok = i == 0 || !bytes[i - 1].is_ascii_alphanumeric();
            let after_ok = i + kw.len() == bytes.len() || !bytes[i + kw.len()].is_ascii_alphanumeric();
            if before_ok && after_ok {
                return Some(i);
            }
        }
        i += 1;
    }
    None
}

fn find_clause_end(text: &str) -> usize {
    // The clause runs until the next top-level `extends`/`implements` or
    // the header's end; `find_header_end` already stripped the body brace.
    let mut angle_depth = 0i32;
    for (i, b) in text.bytes().enumerate() {
        match b {
            b'<' => angle_depth += 1,
            b'>' => angle_depth -= 1,
            _ if angle_depth <= 0 && text[i..].starts_with("implements") && i > 0 => return i,
            _ => {}
        }
    }
    text.len()
}

fn split_top_level_commas(text: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0usize;
    for (i, c) in text.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => depth -= 1,
            ',' if depth <= 0 => {
                parts.push(text[start..i].to_string());
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(text[start..].to_string());
    parts
}

/// Tracks repo-wide simple-name collisions, used by the impact analyzer's
/// tie-breaking heuristics.
#[derive(Debug, Default)]
pub struct NameIndex {
    counts: HashMap<String, usize>,
}

impl NameIndex {
    pub fn build(classes: &[ClassInfo]) -> Self {
        let mut counts = HashMap::new();
        for c in classes {
            *counts.entry(c.simple_name.clone()).or_insert(0) += 1;
        }
        Self { counts }
    }

    pub fn is_unique(&self, simple_name: &str) -> bool {
        self.counts.get(simple_name).copied().unwrap_or(0) <= 1
    }
}

/// Shared content cache: callers populate it on read, and
/// `build_reverse_graph` both reads from and writes to it so a later
/// cache-miss reload doesn't re-read files already seen in-process.
pub type ContentCache = Mutex<HashMap<PathBuf, String>>;

pub fn read_cached(cache: &ContentCache, path: &Path) -> Option<String> {
    {
        let guard = cache.lock().unwrap();
        if let Some(content) = guard.get(path) {
            return Some(content.clone());
        }
    }
    let content = std::fs::read_to_string(path).ok()?;
    cache.lock().unwrap().insert(path.to_path_buf(), content.clone());
    Some(content)
}

/// Walks the repository root and returns every eligible `ClassInfo` plus
/// its parsed imports, skipping ignored directories and non-target-
/// language files. Test files are included in the index (they can still
/// be dependents) but are tagged via `is_test_file` for callers that want
/// to exclude them.
pub fn build_index(root: &Path, extension: &str, cache: &ContentCache) -> Vec<(ClassInfo, Imports)> {
    let mut out = Vec::new();
    for entry in WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !is_ignored(e.path()))
    {
        let Ok(entry) = entry else { continue };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(extension) {
            continue;
        }
        let Some(content) = read_cached(cache, path) else {
            continue;
        };
        if let Some((class_info, imports)) = parse_file(path, &content) {
            out.push((class_info, imports));
        }
    }
    out
}

/// The dependency oracle: does `candidate` depend on
/// `target`?
#[allow(clippy::too_many_arguments)]
pub fn depends_on(
    candidate_content: &str,
    candidate_imports: &Imports,
    candidate: &ClassInfo,
    target: &ClassInfo,
    name_index: &NameIndex,
) -> bool {
    // 1. explicit import of target's FQN
    if candidate_imports.imports_fqn(&target.fqn) {
        return true;
    }

    // 2. wildcard import of target's package + token reference
    if candidate_imports.imports_package_wildcard(&target.package_name)
        && contains_token(candidate_content, &target.simple_name)
    {
        return true;
    }

    // 3. same package + same module + token reference
    if candidate.package_name == target.package_name
        && same_module(&candidate.path, &target.path)
        && contains_token(candidate_content, &target.simple_name)
    {
        return true;
    }

    // 4. target FQN appears verbatim
    if !target.fqn.is_empty() && candidate_content.contains(&target.fqn) {
        return true;
    }

    // 5. supertype simple name token reference with a qualifying import
    for supertype in &target.supertype_simple_names {
        if contains_token(candidate_content, supertype) {
            let qualifies = candidate_imports
                .explicit
                .iter()
                .any(|fqn| fqn.ends_with(&format!(".{supertype}")) && fqn.starts_with(&format!("{}.", target.package_name)))
                || candidate_imports.imports_package_wildcard(&target.package_name)
                || (candidate.package_name == target.package_name && same_module(&candidate.path, &target.path));
            if qualifies {
                return true;
            }
        }
    }

    // 6. injection annotation followed by a field/parameter typed as the
    //    target or one of its supertypes
    if has_injected_reference(candidate_content, target) {
        return true;
    }

    let _ = name_index;
    false
}

/// Scans for an injection-style annotation followed (within a short
/// window) by a declaration typed as `target` or a supertype.
pub fn has_injected_reference(content: &str, target: &ClassInfo) -> bool {
    for marker in INJECTION_ANNOTATIONS {
        let mut search_from = 0usize;
        while let Some(rel) = content[search_from..].find(marker) {
            let pos = search_from + rel + marker.len();
            let window_end = (pos + 200).min(content.len());
            let window = &content[pos..window_end];
            let declared_type = first_type_token(window);
            if let Some(ty) = declared_type {
                if ty == target.simple_name || target.supertype_simple_names.contains(&ty) {
                    return true;
                }
            }
            search_from = pos;
        }
    }
    false
}

/// Finds the first capitalized identifier-looking token in a short window
/// following an injection annotation — a cheap proxy for "the declared
/// type of the next field/parameter".
fn first_type_token(window: &str) -> Option<String> {
    let re_cache = static_type_token_regex();
    re_cache
        .captures(window)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

fn static_type_token_regex() -> &'static Regex {
    static RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?:private|public|protected|final)?\s*([A-Z][A-Za-z0-9_]*)\s*<?[^;=]*?\s+\w+\s*[;=)]").unwrap());
    &RE
}

/// Builds the reverse dependency graph: target FQN → set of dependent
/// file paths. For each candidate, content and imports are parsed once
/// and tested against every target via the oracle.
pub fn build_reverse_graph(
    targets: &[ClassInfo],
    candidates: &[(ClassInfo, Imports)],
    cache: &ContentCache,
    name_index: &NameIndex,
) -> HashMap<String, HashSet<PathBuf>> {
    let mut graph: HashMap<String, HashSet<PathBuf>> = HashMap::new();
    for target in targets {
        graph.entry(target.fqn.clone()).or_default();
    }

    for (candidate, imports) in candidates {
        let Some(content) = read_cached(cache, &candidate.path) else {
            continue;
        };
        for target in targets {
            if candidate.path == target.path {
                continue; // no self-edges
            }
            if depends_on(&content, imports, candidate, target, name_index) {
                graph
                    .entry(target.fqn.clone())
                    .or_default()
                    .insert(candidate.path.clone());
            }
        }
    }

    graph
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_package_and_imports() {
        let content = "package com.acme.svc;\nimport com.acme.repo.Repo;\nimport com.acme.util.*;\n\npublic class Impl implements IService {\n}\n";
        let (class_info, imports) = parse_file(Path::new("com/acme/svc/Impl.java"), content).unwrap();
        assert_eq!(class_info.package_name, "com.acme.svc");
        assert_eq!(class_info.simple_name, "Impl");
        assert_eq!(class_info.fqn, "com.acme.svc.Impl");
        assert_eq!(class_info.supertype_simple_names, vec!["IService".to_string()]);
        assert!(imports.explicit.contains("com.acme.repo.Repo"));
        assert!(imports.wildcard.contains("com.acme.util"));
    }

    #[test]
    fn generic_supertype_is_stripped() {
        let content = "package p;\nclass Foo extends Base<String, List<Integer>> implements Runnable {\n}\n";
        let (class_info, _) = parse_file(Path::new("p/Foo.java"), content).unwrap();
        assert_eq!(class_info.supertype_simple_names, vec!["Base".to_string(), "Runnable".to_string()]);
    }

    #[test]
    fn no_self_edges() {
        let content = "package p;\nclass A {\n}\n";
        let (class_info, imports) = parse_file(Path::new("p/A.java"), content).unwrap();
        let cache: ContentCache = Mutex::new(HashMap::new());
        cache.lock().unwrap().insert(class_info.path.clone(), content.clone());
        let name_index = NameIndex::build(&[class_info.clone()]);
        let graph = build_reverse_graph(
            &[class_info.clone()],
            &[(class_info.clone(), imports)],
            &cache,
            &name_index,
        );
        assert!(!graph[&class_info.fqn].contains(&class_info.path));
    }
}
