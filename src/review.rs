//! The review engine: the orchestrator that drives every other module
//! through one run, per the eleven-step sequence.
//!
//! All operations proceed sequentially; the only suspension points are
//! VCS process invocations, file reads/writes, and (out of scope here)
//! the external static-analysis subprocess. Per-file rule and impact
//! passes are parallelized across a bounded worker pool with `rayon`;
//! `FindingCache` and `symbol_index::ContentCache` are safe for
//! concurrent insert-or-get access from that pool.

use crate::cache::{FindingCache, ReverseGraphCache};
use crate::config::Config;
use crate::context;
use crate::diff;
use crate::impact::{self, BfsBounds, CascadeOptions, GraphContext};
use crate::model::{ChangedFile, ClassInfo, ImpactEntry, ReviewPayload, TestingStatus};
use crate::rules::{self, RuleContext};
use crate::scanner;
use crate::symbol_index::{self, ContentCache, NameIndex};
use crate::vcs;
use rayon::prelude::*;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Fully-qualified target-language source extension. This is the one
/// place a concrete extension is pinned, so a port to a different
/// C-family OO language only needs to change this constant.
pub const SOURCE_EXTENSION: &str = "java";

/// Which files the orchestrator should review: auto-detected staged
/// files (hook mode) or an explicit list (CLI mode), where explicit
/// files carry no diff so their whole content is in scope.
pub enum ReviewTarget {
    Staged,
    Explicit(Vec<PathBuf>),
}

/// Runs the full pipeline and returns the merged result payload.
pub fn run(repo_root: &Path, target: ReviewTarget, config: &Config) -> ReviewPayload {
    let branch = vcs::current_branch(repo_root).unwrap_or_else(|| "HEAD".to_string());

    let (changed_files, staged_count) = match target {
        ReviewTarget::Staged => {
            let staged = vcs::staged_files(repo_root);
            let staged_count = staged
                .iter()
                .filter(|p| p.extension().and_then(|e| e.to_str()) == Some(SOURCE_EXTENSION))
                .count();
            if staged.is_empty() {
                tracing::info!("nothing staged; reporting an empty review");
                return ReviewPayload {
                    branch,
                    staged_count: 0,
                    ..Default::default()
                };
            }
            let raw_diff = vcs::staged_diff(repo_root);
            let by_file = diff::changed_lines_by_file(&raw_diff);
            let mut lines_by_path: HashMap<PathBuf, BTreeSet<usize>> = by_file.into_iter().collect();
            let changed_files: Vec<ChangedFile> = staged
                .into_iter()
                .filter(|p| p.extension().and_then(|e| e.to_str()) == Some(SOURCE_EXTENSION))
                .map(|p| {
                    let lines = lines_by_path.remove(&p).unwrap_or_default();
                    // `git diff --cached --name-only` (and the diff's own
                    // `+++ b/<path>` headers) are repo-root-relative;
                    // resolve against `repo_root` so this path space
                    // matches `symbol_index::build_index`'s, which walks
                    // from an absolute `repo_root` too. Otherwise the same
                    // file would parse into two different `ClassInfo.path`
                    // values depending on which pass touched it, breaking
                    // the reverse graph's self-edge check.
                    ChangedFile::new(resolve_repo_path(repo_root, &p), lines)
                })
                .collect();
            (changed_files, staged_count)
        }
        ReviewTarget::Explicit(paths) => {
            let changed_files: Vec<ChangedFile> = paths
                .into_iter()
                .map(|p| ChangedFile::new(resolve_repo_path(repo_root, &p), BTreeSet::new()))
                .collect();
            let count = changed_files.len();
            (changed_files, count)
        }
    };

    let content_cache: ContentCache = std::sync::Mutex::new(HashMap::new());

    // Partition tests vs non-tests; only non-test files are reviewed, but
    // both sides are eligible dependents in the reverse graph.
    let (non_test_files, _test_files): (Vec<&ChangedFile>, Vec<&ChangedFile>) = changed_files
        .iter()
        .partition(|f| !symbol_index::is_test_file(&f.path));

    // Step 6: rule engine, run per non-test file, parallelized.
    let finding_cache = FindingCache::new(repo_root.join(".code-reviewer-cache"));
    let findings: Vec<_> = non_test_files
        .par_iter()
        .filter_map(|cf| {
            let content = symbol_index::read_cached(&content_cache, &cf.path)?;
            Some((*cf, content))
        })
        .flat_map(|(cf, content)| run_rules_cached(&finding_cache, cf, &content, config))
        .collect();

    // Step 7: symbol index + reverse graph (cached).
    let all_classes = symbol_index::build_index(repo_root, SOURCE_EXTENSION, &content_cache);
    let name_index = NameIndex::build(&all_classes.iter().map(|(c, _)| c.clone()).collect::<Vec<_>>());

    let changed_class_infos: Vec<ClassInfo> = non_test_files
        .iter()
        .filter_map(|cf| {
            let content = symbol_index::read_cached(&content_cache, &cf.path)?;
            symbol_index::parse_file(&cf.path, &content).map(|(c, _)| c)
        })
        .collect();

    let mtimes: Vec<(PathBuf, chrono::DateTime<chrono::Utc>)> = changed_files
        .iter()
        .filter_map(|cf| {
            std::fs::metadata(&cf.path)
                .and_then(|m| m.modified())
                .ok()
                .map(|t| (cf.path.clone(), chrono::DateTime::<chrono::Utc>::from(t)))
        })
        .collect();
    let graph_cache = ReverseGraphCache::new(repo_root);
    let signature = ReverseGraphCache::signature(&mtimes);

    let reverse_graph: HashMap<String, HashSet<PathBuf>> = if config.rebuild_graph_cache {
        let built = symbol_index::build_reverse_graph(&changed_class_infos, &all_classes, &content_cache, &name_index);
        graph_cache.save(&signature, &to_vec_map(&built));
        built
    } else if let Some(cached) = graph_cache.load(&signature, config.graph_cache_ttl_hours) {
        tracing::debug!("reverse graph cache hit");
        cached.into_iter().map(|(k, v)| (k, v.into_iter().collect())).collect()
    } else {
        let built = symbol_index::build_reverse_graph(&changed_class_infos, &all_classes, &content_cache, &name_index);
        graph_cache.save(&signature, &to_vec_map(&built));
        built
    };

    // Step 8: impact analyzer per non-test file.
    let mut impact_entries: Vec<ImpactEntry> = Vec::new();
    let mut state = OrchestratorGraph {
        repo_classes: &all_classes,
        content_cache: &content_cache,
        reverse_graph,
    };
    for cf in &non_test_files {
        if let Some(entry) = analyze_impact(cf, &mut state, config) {
            impact_entries.push(entry);
        }
    }

    // Step 9 + 10: testing status per changed file.
    let mut testing_status = std::collections::BTreeMap::new();
    for cf in &changed_files {
        let status = testing_status_for(&cf.name, &changed_files, repo_root);
        testing_status.insert(cf.name.clone(), status);
    }
    for entry in &mut impact_entries {
        let status = testing_status.get(&entry.file_name).cloned().unwrap_or_default();
        if !status.has_tests {
            entry.push_note("No related tests".to_string());
        }
    }

    ReviewPayload {
        branch,
        staged_count,
        findings,
        impact_entries,
        testing_status,
        reverse_graph: state
            .reverse_graph
            .iter()
            .map(|(k, v)| (k.clone(), v.iter().map(|p| p.display().to_string()).collect()))
            .collect(),
    }
}

/// Resolves a path reported by the VCS (repo-root-relative, or already
/// absolute for explicit-file CLI invocations) against `repo_root`, so
/// every `ChangedFile.path` and every `symbol_index::build_index` path
/// share the same absolute path space. Without this, the same file could
/// parse into two different `ClassInfo.path` values depending on which
/// pass touched it, breaking the reverse graph's self-edge check.
fn resolve_repo_path(repo_root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        repo_root.join(path)
    }
}

fn to_vec_map(graph: &HashMap<String, HashSet<PathBuf>>) -> HashMap<String, Vec<PathBuf>> {
    graph
        .iter()
        .map(|(k, v)| (k.clone(), v.iter().cloned().collect()))
        .collect()
}

fn run_rules_cached(
    cache: &FindingCache,
    cf: &ChangedFile,
    content: &str,
    config: &Config,
) -> Vec<crate::model::Finding> {
    if let Some(cached) = cache.get(&cf.path, content.as_bytes()) {
        return cached;
    }

    let methods = scanner::method_spans(content);
    let analysis = context::build_context(content, &methods);
    let line_index = scanner::LineIndex::new(content);

    let scope_lines = if config.expand_changed_scope_to_method {
        expand_to_method_scope(&cf.changed_lines, &methods)
    } else {
        cf.changed_lines.clone()
    };

    let ctx = RuleContext {
        file: &cf.path,
        content,
        diff_lines: &cf.changed_lines,
        scope_lines: &scope_lines,
        methods: &methods,
        analysis: &analysis,
        config,
        line_index: &line_index,
    };

    let findings = rules::run_all(&ctx);
    cache.put(&cf.path, content.as_bytes(), &findings);
    findings
}

/// Expands `changed_lines` to the full line range of every method that
/// contains at least one changed line, per `expandChangedScopeToMethod`.
fn expand_to_method_scope(
    changed_lines: &BTreeSet<usize>,
    methods: &[crate::model::Method],
) -> BTreeSet<usize> {
    let mut expanded = changed_lines.clone();
    for m in methods {
        if m.intersects_lines(changed_lines) {
            for line in m.start_line..=m.end_line {
                expanded.insert(line);
            }
        }
    }
    expanded
}

/// Adapts the orchestrator's owned reverse graph and content cache to
/// the impact module's `GraphContext` seam. Both are treated as
/// monotonic caches: `dependents_of` computes and inserts on demand for
/// FQNs the reverse-graph build didn't originally target.
struct OrchestratorGraph<'a> {
    repo_classes: &'a [(ClassInfo, crate::model::Imports)],
    content_cache: &'a ContentCache,
    reverse_graph: HashMap<String, HashSet<PathBuf>>,
}

impl<'a> GraphContext for OrchestratorGraph<'a> {
    fn dependents_of(&mut self, fqn: &str) -> HashSet<PathBuf> {
        if let Some(existing) = self.reverse_graph.get(fqn) {
            return existing.clone();
        }
        let Some((target, _)) = self.repo_classes.iter().find(|(c, _)| c.fqn == fqn) else {
            return HashSet::new();
        };
        let name_index = NameIndex::build(&self.repo_classes.iter().map(|(c, _)| c.clone()).collect::<Vec<_>>());
        let computed = symbol_index::build_reverse_graph(
            std::slice::from_ref(target),
            self.repo_classes,
            self.content_cache,
            &name_index,
        );
        let deps = computed.get(fqn).cloned().unwrap_or_default();
        self.reverse_graph.insert(fqn.to_string(), deps.clone());
        deps
    }

    fn class_info(&self, path: &Path) -> Option<ClassInfo> {
        self.repo_classes
            .iter()
            .find(|(c, _)| c.path == path)
            .map(|(c, _)| c.clone())
    }

    fn content(&self, path: &Path) -> Option<String> {
        symbol_index::read_cached(self.content_cache, path)
    }

    fn is_controller(&self, content: &str) -> bool {
        context::is_controller_file(content)
    }
}

fn analyze_impact(
    cf: &ChangedFile,
    state: &mut OrchestratorGraph,
    config: &Config,
) -> Option<ImpactEntry> {
    let content = symbol_index::read_cached(state.content_cache, &cf.path)?;
    let (class_info, _imports) = symbol_index::parse_file(&cf.path, &content)?;
    let methods = scanner::method_spans(&content);
    let touched = impact::touched_methods(&methods, &cf.changed_lines);
    if touched.is_empty() {
        return None;
    }
    let touched_names: Vec<String> = touched.iter().map(|m| m.name.clone()).collect();

    let mut entry = ImpactEntry::new(cf.name.clone(), class_info.fqn.clone());
    entry.functions = touched_names.clone();
    entry.layers = class_info.supertype_simple_names.clone();

    let is_self_controller = context::is_controller_file(&content);
    if is_self_controller {
        for ep in impact::extract_endpoints(&content, &class_info.simple_name, &touched_names) {
            entry.push_endpoint(ep);
        }
    }

    // First-hop verified dependents (method-scoped cascade). First hop
    // always allows the broad fallback and the structural fallback: it
    // is not a controller-target BFS edge.
    let dependents = state.dependents_of(&class_info.fqn);
    let mut method_scoped_dependents = Vec::new();
    let mut sorted_dependents: Vec<PathBuf> = dependents.into_iter().collect();
    sorted_dependents.sort();
    for dep_path in &sorted_dependents {
        if symbol_index::is_test_file(dep_path) {
            continue;
        }
        let Some(dep_content) = symbol_index::read_cached(state.content_cache, dep_path) else {
            continue;
        };
        let dep_methods = scanner::method_spans(&dep_content);
        let opts = CascadeOptions {
            allow_broad_fallback: true,
            use_structural_fallback: config.transitive_caller_structural_fallback,
        };
        let calling = impact::detect_callers(&dep_content, &dep_methods, &class_info, &touched_names, &opts);

        if config.method_scoped_dependency_graph && calling.is_empty() {
            continue;
        }

        let dep_class_info = symbol_index::parse_file(dep_path, &dep_content);
        let kind = dep_class_info
            .as_ref()
            .map(|(dc, _)| impact::classify_dependency(dc, &class_info, &dep_content))
            .unwrap_or(crate::model::DependencyKind::Calls);
        let dep_name = dep_path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
        let mut sorted_methods: Vec<String> = calling.into_iter().collect();
        sorted_methods.sort();

        let note = if sorted_methods.is_empty() {
            format!("Dependent [{}]: {dep_name}", kind.as_str())
        } else {
            format!("Impacted Method [{}]: {dep_name} -> {}", kind.as_str(), sorted_methods.join(", "))
        };
        entry.push_note(note);
        method_scoped_dependents.push(dep_name);
    }
    entry.method_scoped_dependents = method_scoped_dependents;

    // Transitive BFS, only from non-controller changes.
    if config.enable_transitive_api_discovery && !is_self_controller {
        let bounds = BfsBounds {
            max_depth: config.transitive_api_discovery_max_depth,
            max_visited_files: config.transitive_api_discovery_max_visited_files,
            max_controllers: config.transitive_api_discovery_max_controllers,
        };
        let outcome = impact::discover_transitive_endpoints(&class_info, touched_names, state, bounds);
        for ep in outcome.endpoints {
            entry.push_endpoint(ep);
        }
        for note in outcome.notes {
            entry.push_note(note);
        }
    }

    Some(entry)
}

fn testing_status_for(base_name: &str, changed_files: &[ChangedFile], repo_root: &Path) -> TestingStatus {
    let stem = Path::new(base_name)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let mut related: Vec<String> = changed_files
        .iter()
        .filter(|f| symbol_index::is_test_file(&f.path) && f.name.contains(&stem))
        .map(|f| f.name.clone())
        .collect();

    // Also check the repo tree for an existing test with a matching name,
    // not just other files in this changeset.
    if related.is_empty() {
        for entry in walkdir::WalkDir::new(repo_root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| !symbol_index::is_ignored(e.path()))
            .filter_map(Result::ok)
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(SOURCE_EXTENSION) {
                continue;
            }
            if symbol_index::is_test_file(path)
                && path
                    .file_stem()
                    .map(|s| s.to_string_lossy().contains(&stem))
                    .unwrap_or(false)
            {
                related.push(path.file_name().unwrap().to_string_lossy().to_string());
            }
        }
    }

    TestingStatus {
        has_tests: !related.is_empty(),
        related_tests: related,
    }
}

/// End-to-end review scenarios, run against a real scratch git repository
/// rather than mocking the VCS seam.
#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Category, Severity};
    use std::process::Command;
    use tempfile::TempDir;

    fn git(repo: &Path, args: &[&str]) {
        let status = Command::new("git")
            .current_dir(repo)
            .args(args)
            .status()
            .expect("git invocation failed");
        assert!(status.success(), "git {args:?} failed");
    }

    fn init_repo() -> TempDir {
        let dir = TempDir::new().unwrap();
        git(dir.path(), &["init", "-q"]);
        git(dir.path(), &["config", "user.email", "test@example.com"]);
        git(dir.path(), &["config", "user.name", "Test"]);
        dir
    }

    fn commit_all(repo: &Path, message: &str) {
        git(repo, &["add", "-A"]);
        git(repo, &["commit", "-q", "-m", message]);
    }

    /// A deletion-only hunk still resolves to its enclosing method.
    #[test]
    fn deletion_only_hunk_touches_enclosing_method() {
        let repo = init_repo();
        let file = repo.path().join("Calc.java");
        std::fs::write(
            &file,
            "public class Calc {\n".to_string()
                + &"    // pad\n".repeat(10)
                + "    public int computeTotal(int a, int b, int c) {\n"
                + "        int x = a;\n"
                + "        int y = b;\n"
                + "        int z = c;\n"
                + "        return x + y + z;\n"
                + "    }\n"
                + "}\n",
        )
        .unwrap();
        commit_all(repo.path(), "baseline");

        let content = std::fs::read_to_string(&file).unwrap();
        let without_z = content.replace("        int z = c;\n", "");
        std::fs::write(&file, without_z).unwrap();
        git(repo.path(), &["add", "-A"]);

        let config = Config::default();
        let payload = run(repo.path(), ReviewTarget::Staged, &config);

        let entry = payload
            .impact_entries
            .iter()
            .find(|e| e.file_name == "Calc.java")
            .expect("Calc.java should produce an impact entry");
        assert!(entry.functions.contains(&"computeTotal".to_string()));
    }

    /// A log call whose placeholder count doesn't match its arguments is flagged.
    #[test]
    fn log_placeholder_mismatch_is_flagged() {
        let repo = init_repo();
        let file = repo.path().join("Greeter.java");
        std::fs::write(
            &file,
            "public class Greeter {\n    public void greet(String name) {\n    }\n}\n",
        )
        .unwrap();
        commit_all(repo.path(), "baseline");

        std::fs::write(
            &file,
            "public class Greeter {\n    public void greet(String name) {\n        log.info(\"a={} b={}\", name);\n    }\n}\n",
        )
        .unwrap();
        git(repo.path(), &["add", "-A"]);

        let config = Config::default();
        let payload = run(repo.path(), ReviewTarget::Staged, &config);

        assert!(
            payload
                .findings
                .iter()
                .any(|f| f.category == Category::Logging && f.message.to_lowercase().contains("placeholder")),
            "expected a logging placeholder-mismatch finding, got: {:#?}",
            payload.findings
        );
    }

    /// A change to a repository class is visible as an impact entry with a
    /// method-scoped dependent when a service in the same staged changeset
    /// calls the touched method.
    #[test]
    fn method_scoped_dependent_is_recorded_for_verified_caller() {
        let repo = init_repo();
        let repo_file = repo.path().join("WidgetRepository.java");
        let service_file = repo.path().join("WidgetService.java");

        std::fs::write(
            &repo_file,
            "@Repository\npublic class WidgetRepository {\n    public Widget findById(long id) {\n        return null;\n    }\n}\n",
        )
        .unwrap();
        std::fs::write(
            &service_file,
            "import pkg.WidgetRepository;\n\n@Service\npublic class WidgetService {\n    private WidgetRepository repository;\n\n    public Widget load(long id) {\n        return repository.findById(id);\n    }\n}\n",
        )
        .unwrap();
        commit_all(repo.path(), "baseline");

        let content = std::fs::read_to_string(&repo_file).unwrap();
        let changed = content.replace("return null;", "return lookup(id);");
        std::fs::write(&repo_file, changed).unwrap();
        git(repo.path(), &["add", "-A"]);

        let config = Config::default();
        let payload = run(repo.path(), ReviewTarget::Staged, &config);

        let entry = payload
            .impact_entries
            .iter()
            .find(|e| e.file_name == "WidgetRepository.java")
            .expect("WidgetRepository.java should produce an impact entry");
        assert!(
            entry.notes.iter().any(|n| n.contains("WidgetService.java")),
            "expected WidgetService to show up as a verified dependent, got: {:#?}",
            entry.notes
        );
    }

    /// `@Autowired` field injection is recognized as an INJECTED dependency
    /// and surfaces as a note on the touched class's impact entry, distinct
    /// from a plain CALLS edge.
    #[test]
    fn autowired_field_injection_is_recorded_as_injected_note() {
        let repo = init_repo();
        let repo_file = repo.path().join("WidgetRepository.java");
        let service_file = repo.path().join("WidgetService.java");

        std::fs::write(
            &repo_file,
            "@Repository\npublic class WidgetRepository {\n    public Widget findById(long id) {\n        return null;\n    }\n}\n",
        )
        .unwrap();
        std::fs::write(
            &service_file,
            "import pkg.WidgetRepository;\n\n@Service\npublic class WidgetService {\n    @Autowired\n    private WidgetRepository repository;\n\n    public Widget load(long id) {\n        return repository.findById(id);\n    }\n}\n",
        )
        .unwrap();
        commit_all(repo.path(), "baseline");

        let content = std::fs::read_to_string(&repo_file).unwrap();
        let changed = content.replace("return null;", "return lookup(id);");
        std::fs::write(&repo_file, changed).unwrap();
        git(repo.path(), &["add", "-A"]);

        let config = Config::default();
        let payload = run(repo.path(), ReviewTarget::Staged, &config);

        let entry = payload
            .impact_entries
            .iter()
            .find(|e| e.file_name == "WidgetRepository.java")
            .expect("WidgetRepository.java should produce an impact entry");
        assert!(
            entry.notes.iter().any(|n| n.contains("WidgetService.java") && n.contains("INJECTED")),
            "expected an INJECTED dependent note for WidgetService, got: {:#?}",
            entry.notes
        );
    }

    /// Calling a `@Transactional` method via `this.` inside the same class
    /// is a MustFix finding because the Spring proxy never sees the call.
    #[test]
    fn self_invocation_of_transactional_method_is_must_fix() {
        let repo = init_repo();
        let file = repo.path().join("WidgetService.java");
        std::fs::write(
            &file,
            "@Service\npublic class WidgetService {\n    @Transactional\n    public void save() {\n    }\n\n    public void saveAll() {\n    }\n}\n",
        )
        .unwrap();
        commit_all(repo.path(), "baseline");

        let content = std::fs::read_to_string(&file).unwrap();
        let changed = content.replace(
            "    public void saveAll() {\n    }\n",
            "    public void saveAll() {\n        this.save();\n    }\n",
        );
        std::fs::write(&file, changed).unwrap();
        git(repo.path(), &["add", "-A"]);

        let config = Config::default();
        let payload = run(repo.path(), ReviewTarget::Staged, &config);

        assert!(
            payload
                .findings
                .iter()
                .any(|f| f.code == "FW016" && f.severity == Severity::MustFix),
            "expected a MustFix FW016 finding for self-invocation, got: {:#?}",
            payload.findings
        );
    }

    /// Nothing staged degrades to an empty, exit-0 payload rather than
    /// treating an empty staged set as an error.
    #[test]
    fn empty_staged_set_is_a_clean_no_op() {
        let repo = init_repo();
        std::fs::write(repo.path().join("Unstaged.java"), "public class Unstaged {}\n").unwrap();

        let config = Config::default();
        let payload = run(repo.path(), ReviewTarget::Staged, &config);

        assert_eq!(payload.staged_count, 0);
        assert!(payload.findings.is_empty());
        assert_eq!(payload.exit_code(config.block_on_must_fix), 0);
    }
}

