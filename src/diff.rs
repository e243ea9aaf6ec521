//! Parses a `git diff -U0` unified diff into per-file changed-line sets.
//!
//! The engine only ever needs the *set* of post-image line numbers a
//! diff touches, not the diff's content lines, so this module stops at
//! hunk headers and discards everything else.

use std::collections::BTreeSet;
use std::path::PathBuf;

/// `changedLines` for every file section found in one `-U0` diff,
/// keyed by the post-image path.
pub fn changed_lines_by_file(diff: &str) -> Vec<(PathBuf, BTreeSet<usize>)> {
    let mut result = Vec::new();
    let mut current_path: Option<PathBuf> = None;
    let mut current_lines: BTreeSet<usize> = BTreeSet::new();

    for line in diff.lines() {
        if let Some(path) = line.strip_prefix("+++ ") {
            if let Some(prev) = current_path.take() {
                result.push((prev, std::mem::take(&mut current_lines)));
            }
            let path = path.trim();
            if path == "/dev/null" {
                current_path = None;
                continue;
            }
            let path = path.strip_prefix("b/").unwrap_or(path);
            current_path = Some(PathBuf::from(path));
        } else if line.starts_with("@@ ") {
            if current_path.is_none() {
                continue;
            }
            if let Some((start, count)) = parse_hunk_new_range(line) {
                if count == 0 {
                    current_lines.insert(start);
                } else {
                    for l in start..start + count {
                        current_lines.insert(l);
                    }
                }
            }
        }
    }

    if let Some(prev) = current_path.take() {
        result.push((prev, current_lines));
    }

    result
}

/// Parses the `+new[,newCount]` half of a hunk header
/// (`@@ -old[,oldCount] +new[,newCount] @@`) into `(start, count)`.
/// `count` defaults to 1 when omitted, per unified-diff convention.
fn parse_hunk_new_range(header: &str) -> Option<(usize, usize)> {
    let plus_pos = header.find(" +")?;
    let rest = &header[plus_pos + 2..];
    let end = rest.find(' ')?;
    let range = &rest[..end];

    let mut parts = range.splitn(2, ',');
    let start: usize = parts.next()?.parse().ok()?;
    let count: usize = match parts.next() {
        Some(c) => c.parse().ok()?,
        None => 1,
    };
    Some((start, count))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pure_addition_hunk_records_full_range() {
        let diff = "diff --git a/Foo.java b/Foo.java\n--- a/Foo.java\n+++ b/Foo.java\n@@ -10,0 +11,3 @@\n+a\n+b\n+c\n";
        let result = changed_lines_by_file(diff);
        assert_eq!(result.len(), 1);
        let (path, lines) = &result[0];
        assert_eq!(path, &PathBuf::from("Foo.java"));
        assert_eq!(lines, &BTreeSet::from([11, 12, 13]));
    }

    #[test]
    fn pure_deletion_hunk_records_anchor_line_only() {
        let diff = "--- a/Foo.java\n+++ b/Foo.java\n@@ -50,3 +50,0 @@\n-x\n-y\n-z\n";
        let result = changed_lines_by_file(diff);
        let (_, lines) = &result[0];
        assert_eq!(lines, &BTreeSet::from([50]));
    }

    #[test]
    fn multiple_files_are_kept_separate() {
        let diff = "--- a/A.java\n+++ b/A.java\n@@ -1,0 +1,1 @@\n+x\n--- a/B.java\n+++ b/B.java\n@@ -5,0 +6,2 @@\n+y\n+z\n";
        let result = changed_lines_by_file(diff);
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].0, PathBuf::from("A.java"));
        assert_eq!(result[0].1, BTreeSet::from([1]));
        assert_eq!(result[1].0, PathBuf::from("B.java"));
        assert_eq!(result[1].1, BTreeSet::from([6, 7]));
    }

    #[test]
    fn single_line_hunk_with_no_count_defaults_to_one() {
        let diff = "--- a/Foo.java\n+++ b/Foo.java\n@@ -20 +20 @@\n-old\n+new\n";
        let result = changed_lines_by_file(diff);
        assert_eq!(result[0].1, BTreeSet::from([20]));
    }
}
