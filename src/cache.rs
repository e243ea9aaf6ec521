//! Two independent on-disk caches: per-file rule findings, keyed by
//! content hash, and the reverse dependency graph, keyed by a changed-
//! files signature with a TTL.

use crate::model::Finding;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const SCHEMA_VERSION: u32 = 3;
const GRAPH_CACHE_FILE: &str = "reverse-graph.json";
const CACHE_DIR_NAME: &str = ".code-reviewer-cache";

/// Escapes a path into a flat, filesystem-safe cache key.
fn sanitized_path(path: &Path) -> String {
    path.to_string_lossy()
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | ':' | '.') { '_' } else { c })
        .collect()
}

fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub total_cached_files: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64 * 100.0
        }
    }
}

struct MemoryEntry {
    hash: String,
    findings: Vec<Finding>,
}

/// Per-file rule-finding cache: memory tier backed by a disk tier.
/// Lookup order is memory (hash-verified), then disk (hash-verified and
/// used to rehydrate memory). A hash mismatch at either tier is treated
/// as a miss rather than an error.
pub struct FindingCache {
    cache_dir: PathBuf,
    memory: Mutex<HashMap<PathBuf, MemoryEntry>>,
    stats: Mutex<CacheStats>,
}

impl FindingCache {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self {
            cache_dir,
            memory: Mutex::new(HashMap::new()),
            stats: Mutex::new(CacheStats::default()),
        }
    }

    fn results_path(&self, path: &Path) -> PathBuf {
        self.cache_dir
            .join("pmd-results")
            .join(format!("{}.json", sanitized_path(path)))
    }

    fn hash_path(&self, path: &Path) -> PathBuf {
        self.cache_dir
            .join("file-hashes")
            .join(format!("{}.hash", sanitized_path(path)))
    }

    /// Looks up cached findings for `path` whose content matches `content`.
    /// Memory is checked first, then disk; a disk hit rehydrates memory.
    pub fn get(&self, path: &Path, content: &[u8]) -> Option<Vec<Finding>> {
        let hash = content_hash(content);

        if let Some(entry) = self.memory.lock().unwrap().get(path) {
            if entry.hash == hash {
                self.record_hit();
                return Some(entry.findings.clone());
            }
        }

        let stored_hash = fs::read_to_string(self.hash_path(path)).ok()?;
        if stored_hash.trim() != hash {
            self.record_miss();
            return None;
        }
        let raw = fs::read_to_string(self.results_path(path)).ok()?;
        let findings: Vec<Finding> = serde_json::from_str(&raw).ok()?;

        self.memory.lock().unwrap().insert(
            path.to_path_buf(),
            MemoryEntry {
                hash,
                findings: findings.clone(),
            },
        );
        self.record_hit();
        Some(findings)
    }

    /// Stores `findings` for `path` in both tiers.
    pub fn put(&self, path: &Path, content: &[u8], findings: &[Finding]) {
        let hash = content_hash(content);

        self.memory.lock().unwrap().insert(
            path.to_path_buf(),
            MemoryEntry {
                hash: hash.clone(),
                findings: findings.to_vec(),
            },
        );

        let results_path = self.results_path(path);
        let hash_path = self.hash_path(path);
        if let Some(parent) = results_path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        if let Some(parent) = hash_path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        if let Ok(json) = serde_json::to_string(findings) {
            let _ = fs::write(&results_path, json);
        }
        let _ = fs::write(&hash_path, &hash);

        let mut stats = self.stats.lock().unwrap();
        stats.total_cached_files += 1;
    }

    /// Drops both on-disk files and the in-memory entry for `path`.
    pub fn invalidate(&self, path: &Path) {
        self.memory.lock().unwrap().remove(path);
        let _ = fs::remove_file(self.results_path(path));
        let _ = fs::remove_file(self.hash_path(path));
    }

    /// Deletes on-disk cache files older than `max_age_ms`.
    pub fn sweep_ttl(&self, max_age_ms: u64) {
        for dir_name in ["pmd-results", "file-hashes"] {
            let dir = self.cache_dir.join(dir_name);
            let Ok(entries) = fs::read_dir(&dir) else {
                continue;
            };
            for entry in entries.flatten() {
                let Ok(metadata) = entry.metadata() else {
                    continue;
                };
                let Ok(modified) = metadata.modified() else {
                    continue;
                };
                if let Ok(age) = modified.elapsed() {
                    if age.as_millis() as u64 > max_age_ms {
                        let _ = fs::remove_file(entry.path());
                    }
                }
            }
        }
    }

    fn record_hit(&self) {
        self.stats.lock().unwrap().hits += 1;
    }

    fn record_miss(&self) {
        self.stats.lock().unwrap().misses += 1;
    }

    pub fn stats(&self) -> CacheStats {
        *self.stats.lock().unwrap()
    }
}

/// The disk-persisted reverse dependency graph: target FQN to dependent
/// file paths. Invalidated by a changed-files signature and a TTL, not
/// by individual file hashes, since rebuilding it requires a full repo
/// scan rather than a per-file check.
pub struct ReverseGraphCache {
    cache_dir: PathBuf,
}

impl ReverseGraphCache {
    pub fn new(repo_root: &Path) -> Self {
        Self {
            cache_dir: repo_root.join(CACHE_DIR_NAME),
        }
    }

    fn path(&self) -> PathBuf {
        self.cache_dir.join(GRAPH_CACHE_FILE)
    }

    /// Builds the `KEY=` signature: changed files sorted by path, each
    /// joined to its mtime.
    pub fn signature(changed_files: &[(PathBuf, DateTime<Utc>)]) -> String {
        let mut sorted: Vec<&(PathBuf, DateTime<Utc>)> = changed_files.iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(&b.0));
        sorted
            .iter()
            .map(|(path, mtime)| format!("{}@{}", path.display(), mtime.timestamp_millis()))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Loads the cached graph if present, on the current schema, within
    /// `ttl_hours`, and keyed to the same `signature`. Any parse error,
    /// schema mismatch, or signature mismatch is treated as a miss.
    pub fn load(&self, signature: &str, ttl_hours: u64) -> Option<HashMap<String, Vec<PathBuf>>> {
        let text = fs::read_to_string(self.path()).ok()?;
        let mut lines = text.lines();

        let version_line = lines.next()?;
        if version_line.trim() != format!("V={SCHEMA_VERSION}") {
            return None;
        }

        let ts_line = lines.next()?;
        let ts: i64 = ts_line.strip_prefix("TS=")?.parse().ok()?;
        let cached_at = DateTime::from_timestamp_millis(ts)?;
        let age = Utc::now().signed_duration_since(cached_at);
        if age.num_hours() as u64 > ttl_hours {
            return None;
        }

        let key_line = lines.next()?;
        let cached_key = key_line.strip_prefix("KEY=")?;
        if cached_key != signature {
            return None;
        }

        let mut graph = HashMap::new();
        for line in lines {
            let Some(rest) = line.strip_prefix("DEP=") else {
                continue;
            };
            let Some((fqn, deps)) = rest.split_once('=') else {
                continue;
            };
            let paths: Vec<PathBuf> = deps
                .split('|')
                .filter(|s| !s.is_empty())
                .map(PathBuf::from)
                .collect();
            graph.insert(fqn.to_string(), paths);
        }
        Some(graph)
    }

    /// Writes the graph in the `V=3` line format with a fresh timestamp.
    pub fn save(&self, signature: &str, graph: &HashMap<String, Vec<PathBuf>>) {
        let _ = fs::create_dir_all(&self.cache_dir);

        let mut out = String::new();
        out.push_str(&format!("V={SCHEMA_VERSION}\n"));
        out.push_str(&format!("TS={}\n", Utc::now().timestamp_millis()));
        out.push_str(&format!("KEY={signature}\n"));
        let mut fqns: Vec<&String> = graph.keys().collect();
        fqns.sort();
        for fqn in fqns {
            let deps = &graph[fqn];
            let joined = deps
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join("|");
            out.push_str(&format!("DEP={fqn}={joined}\n"));
        }

        let _ = fs::write(self.path(), out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Category, Severity};
    use tempfile::tempdir;

    fn sample_finding() -> Finding {
        Finding {
            severity: Severity::ShouldFix,
            category: Category::CodeQuality,
            file: PathBuf::from("Foo.java"),
            line: 10,
            code: "CQ001".to_string(),
            message: "x".to_string(),
            explanation: "y".to_string(),
            suggested_fix: None,
        }
    }

    #[test]
    fn put_then_get_round_trips_through_disk() {
        let dir = tempdir().unwrap();
        let cache = FindingCache::new(dir.path().to_path_buf());
        let path = PathBuf::from("Foo.java");
        let content = b"class Foo {}";
        cache.put(&path, content, &[sample_finding()]);

        let fresh = FindingCache::new(dir.path().to_path_buf());
        let found = fresh.get(&path, content).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].code, "CQ001");
    }

    #[test]
    fn content_hash_mismatch_is_a_miss() {
        let dir = tempdir().unwrap();
        let cache = FindingCache::new(dir.path().to_path_buf());
        let path = PathBuf::from("Foo.java");
        cache.put(&path, b"class Foo {}", &[sample_finding()]);
        assert!(cache.get(&path, b"class Foo { int x; }").is_none());
    }

    #[test]
    fn graph_cache_round_trips() {
        let dir = tempdir().unwrap();
        let cache = ReverseGraphCache::new(dir.path());
        let mut graph = HashMap::new();
        graph.insert("pkg.Foo".to_string(), vec![PathBuf::from("Bar.java")]);
        let sig = "a.java@1000";
        cache.save(sig, &graph);
        let loaded = cache.load(sig, 12).unwrap();
        assert_eq!(loaded["pkg.Foo"], vec![PathBuf::from("Bar.java")]);
    }

    #[test]
    fn graph_cache_signature_mismatch_is_a_miss() {
        let dir = tempdir().unwrap();
        let cache = ReverseGraphCache::new(dir.path());
        cache.save("sig-a", &HashMap::new());
        assert!(cache.load("sig-b", 12).is_none());
    }

    #[test]
    fn graph_cache_expired_ttl_is_a_miss() {
        let dir = tempdir().unwrap();
        let cache = ReverseGraphCache::new(dir.path());
        let cache_dir = dir.path().join(".code-reviewer-cache");
        fs::create_dir_all(&cache_dir).unwrap();
        let stale_ts = Utc::now().timestamp_millis() - 13 * 3_600_000;
        fs::write(
            cache_dir.join("reverse-graph.json"),
            format!("V=3\nTS={stale_ts}\nKEY=sig\n"),
        )
        .unwrap();
        assert!(cache.load("sig", 12).is_none());
    }
}
