//! Brace/string/comment-aware source scanning.
//!
//! Everything here works on raw source text without a real parser: a
//! single masking pass classifies each byte as "code" or "not code"
//! (string/char literal, line comment, block comment), and every other
//! operation — brace matching, method-span enumeration, annotation
//! backscan — consults that mask instead of re-deriving it.

use crate::model::Method;
use regex::Regex;
use std::sync::OnceLock;

/// Control-flow keywords that must never be mistaken for a method name,
/// compared case-insensitively.
const CONTROL_KEYWORDS: &[&str] = &[
    "if", "for", "while", "switch", "catch", "synchronized", "try", "do",
];

pub fn is_control_keyword(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    CONTROL_KEYWORDS.contains(&lower.as_str())
}

/// Sentinel returned by scan operations that fail to find a balanced
/// structure (unmatched brace, truncated literal). Callers degrade
/// gracefully rather than treating this as an error.
pub const NOT_FOUND: isize = -1;

/// Precomputed byte-offset → 1-based-line lookup, built once per file and
/// shared by every caller instead of rescanning for each `line_of` call.
pub struct LineIndex {
    /// Byte offset of the start of each line (line 0 is index 0 in this
    /// vector but corresponds to displayed line number 1).
    line_starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(content: &str) -> Self {
        let mut line_starts = vec![0];
        for (i, b) in content.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        Self { line_starts }
    }

    /// 1-based line number containing `index`.
    pub fn line_of(&self, index: usize) -> usize {
        match self.line_starts.binary_search(&index) {
            Ok(i) => i + 1,
            Err(i) => i, // i is the insertion point; line i (1-based) started before index
        }
    }
}

/// Convenience wrapper for one-off lookups; prefer `LineIndex` when calling
/// this more than once against the same content.
pub fn line_of(content: &str, index: usize) -> usize {
    LineIndex::new(content).line_of(index)
}

/// What kind of literal/comment region a byte falls in. `Code` means "plain
/// source, braces here count".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Region {
    Code,
    StringLit,
    CharLit,
    LineComment,
    BlockComment,
}

/// Classifies every byte of `content` into a `Region`, honoring escape
/// sequences (a quote preceded by an odd run of backslashes is still part
/// of the literal).
fn classify(content: &[u8]) -> Vec<Region> {
    let mut regions = vec![Region::Code; content.len()];
    let mut i = 0;
    let mut state = Region::Code;
    let mut escape_run = 0usize;

    while i < content.len() {
        let b = content[i];
        regions[i] = state;
        match state {
            Region::Code => {
                if b == b'/' && i + 1 < content.len() && content[i + 1] == b'/' {
                    state = Region::LineComment;
                } else if b == b'/' && i + 1 < content.len() && content[i + 1] == b'*' {
                    state = Region::BlockComment;
                } else if b == b'"' {
                    state = Region::StringLit;
                } else if b == b'\'' {
                    state = Region::CharLit;
                }
                escape_run = 0;
            }
            Region::StringLit => {
                if b == b'\\' {
                    escape_run += 1;
                } else {
                    if b == b'"' && escape_run % 2 == 0 {
                        state = Region::Code;
                    }
                    escape_run = 0;
                }
            }
            Region::CharLit => {
                if b == b'\\' {
                    escape_run += 1;
                } else {
                    if b == b'\'' && escape_run % 2 == 0 {
                        state = Region::Code;
                    }
                    escape_run = 0;
                }
            }
            Region::LineComment => {
                if b == b'\n' {
                    state = Region::Code;
                }
            }
            Region::BlockComment => {
                if b == b'*' && i + 1 < content.len() && content[i + 1] == b'/' {
                    regions[i] = state;
                    regions[i + 1] = state;
                    i += 2;
                    state = Region::Code;
                    continue;
                }
            }
        }
        i += 1;
    }

    regions
}

fn is_code(regions: &[Region], pos: usize) -> bool {
    regions.get(pos).copied() == Some(Region::Code)
}

/// Finds the position just past the `}` matching the `{` at `open_brace_pos`.
/// Skips braces inside strings/chars/comments. Returns `NOT_FOUND` on an
/// unmatched brace or out-of-range input.
pub fn find_matching_brace(content: &str, open_brace_pos: usize) -> isize {
    find_matching(content, open_brace_pos, b'{', b'}')
}

/// Same contract as `find_matching_brace` but for parentheses, used to
/// resolve parameter lists (including ones containing nested parens from
/// parameter annotations).
pub fn find_matching_paren(content: &str, open_paren_pos: usize) -> isize {
    find_matching(content, open_paren_pos, b'(', b')')
}

fn find_matching(content: &str, open_pos: usize, open: u8, close: u8) -> isize {
    let bytes = content.as_bytes();
    if open_pos >= bytes.len() || bytes[open_pos] != open {
        return NOT_FOUND;
    }
    let regions = classify(bytes);
    if !is_code(&regions, open_pos) {
        return NOT_FOUND;
    }

    let mut depth = 0i64;
    let mut i = open_pos;
    while i < bytes.len() {
        if is_code(&regions, i) {
            if bytes[i] == open {
                depth += 1;
            } else if bytes[i] == close {
                depth -= 1;
                if depth == 0 {
                    return (i + 1) as isize;
                }
            }
        }
        i += 1;
    }
    NOT_FOUND
}

fn method_call_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_]*\s*\(").unwrap())
}

/// Enumerates top-level method declarations: `(start, end_exclusive,
/// name)` in source order. A valid declaration has modifiers, an optional
/// generic parameter block, a return type, an identifier, a balanced
/// parameter list, an optional `throws` clause, and an opening `{`.
pub fn method_spans(content: &str) -> Vec<Method> {
    let bytes = content.as_bytes();
    let regions = classify(bytes);
    let line_index = LineIndex::new(content);
    let mut spans = Vec::new();

    for m in method_call_regex().find_iter(content) {
        let name_start = m.start();
        if !is_code(&regions, name_start) {
            continue;
        }
        let paren_open = content[name_start..m.end()]
            .rfind('(')
            .map(|p| name_start + p)
            .unwrap();
        let name_end = content[name_start..paren_open].trim_end().len() + name_start;
        let name = content[name_start..name_end].to_string();
        if is_control_keyword(&name) {
            continue;
        }
        if !looks_like_declaration_site(content, &regions, name_start) {
            continue;
        }

        let paren_close = find_matching_paren(content, paren_open);
        if paren_close < 0 {
            continue;
        }
        let paren_close = paren_close as usize;

        let Some(open_brace) = skip_to_open_brace(content, &regions, paren_close) else {
            continue;
        };

        let body_end = find_matching_brace(content, open_brace);
        if body_end < 0 {
            continue;
        }
        let body_end = body_end as usize;

        let decl_start = backscan_declaration_start(content, &regions, name_start);

        spans.push(Method {
            name,
            start_byte: decl_start,
            end_byte: body_end,
            start_line: line_index.line_of(decl_start),
            end_line: line_index.line_of(body_end.saturating_sub(1)),
        });
    }

    spans
}

/// Rejects matches that are plainly calls (`obj.name(`, `new Name(`,
/// `::name(`) rather than declarations, and requires something
/// type-shaped before the identifier.
fn looks_like_declaration_site(content: &str, regions: &[Region], name_start: usize) -> bool {
    let before = &content[..name_start];
    let trimmed = before.trim_end();
    if trimmed.ends_with('.') || trimmed.ends_with("::") {
        return false;
    }
    if trimmed.ends_with("new") && trimmed.len() >= 3 {
        let boundary_ok = trimmed.len() == 3
            || !trimmed.as_bytes()[trimmed.len() - 4].is_ascii_alphanumeric();
        if boundary_ok {
            return false;
        }
    }
    // Require a preceding identifier/generic token (the return type) on
    // the same logical declaration, i.e. not the very first token in the
    // file/region with nothing before it.
    let mut chars = trimmed.chars().rev();
    let mut saw_type_char = false;
    for c in chars.by_ref() {
        if c.is_whitespace() {
            if saw_type_char {
                break;
            }
            continue;
        }
        if c.is_alphanumeric() || c == '_' || c == '>' || c == ']' || c == '.' {
            saw_type_char = true;
        } else {
            break;
        }
    }
    if !saw_type_char {
        return false;
    }
    let _ = regions;
    true
}

/// Skips whitespace, identifier characters, commas, and dots between a
/// closing `)` and the body-opening `{` (tolerates a `throws A, B` clause).
/// Returns the position of `{` or `None` if something else intervenes
/// first (e.g. a `;` for an interface method with no body).
fn skip_to_open_brace(content: &str, regions: &[Region], from: usize) -> Option<usize> {
    let bytes = content.as_bytes();
    let mut i = from;
    while i < bytes.len() {
        if !is_code(regions, i) {
            i += 1;
            continue;
        }
        let b = bytes[i];
        if b == b'{' {
            return Some(i);
        }
        if b.is_ascii_whitespace()
            || b.is_ascii_alphanumeric()
            || b == b'_'
            || b == b','
            || b == b'.'
        {
            i += 1;
            continue;
        }
        return None;
    }
    None
}

/// Walks backward from the method name collecting the modifiers/generic
/// parameter block/return-type run, stopping at the previous statement or
/// block boundary (`;`, `{`, `}`).
fn backscan_declaration_start(content: &str, regions: &[Region], name_start: usize) -> usize {
    let bytes = content.as_bytes();
    let mut i = name_start;
    let mut last_boundary = 0usize;
    let mut depth_angle = 0i32;

    while i > 0 {
        let prev = i - 1;
        if !is_code(regions, prev) {
            i = prev;
            continue;
        }
        let b = bytes[prev];
        match b {
            b';' | b'{' | b'}' => {
                last_boundary = i;
                break;
            }
            b'>' => depth_angle += 1,
            b'<' => depth_angle -= 1,
            _ => {}
        }
        i = prev;
    }
    let _ = depth_angle;
    last_boundary
}

/// Annotation-line predicate: a bare `@Name` start, or a continuation of a
/// multi-line annotation (ends in `)`, `,`, `=`, or starts with `*`).
fn is_annotation_line(line: &str) -> bool {
    let t = line.trim();
    t.starts_with('@')
}

fn is_continuation_line(line: &str) -> bool {
    let t = line.trim();
    if t.is_empty() {
        return false;
    }
    t.starts_with('*') || t.ends_with(')') || t.ends_with(',') || t.ends_with('=')
}

/// Walks upward from the method header line collecting its annotation
/// block. Up to 5 non-annotation, non-empty, non-continuation lines are
/// tolerated as interruptions (e.g. comments); a standalone `}` is a hard
/// stop (the previous method's closing brace). Bounded to a 100-line
/// window.
pub fn backscan_annotation_block(lines: &[&str], method_header_idx: usize) -> usize {
    const MAX_WINDOW: usize = 100;
    const MAX_INTERRUPTIONS: usize = 5;

    let mut start = method_header_idx;
    let mut interruptions = 0usize;
    let lower_bound = method_header_idx.saturating_sub(MAX_WINDOW);

    let mut idx = method_header_idx;
    while idx > lower_bound {
        let prev_idx = idx - 1;
        let line = lines.get(prev_idx).copied().unwrap_or("");
        let trimmed = line.trim();

        if trimmed == "}" {
            break;
        }

        if is_annotation_line(trimmed) || is_continuation_line(trimmed) {
            start = prev_idx;
            idx = prev_idx;
            continue;
        }

        if trimmed.is_empty() {
            idx = prev_idx;
            continue;
        }

        interruptions += 1;
        if interruptions > MAX_INTERRUPTIONS {
            break;
        }
        idx = prev_idx;
    }

    start
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn brace_matching_skips_strings_and_comments() {
        let src = r#"void m() { String s = "}"; /* } */ int x = 1; }"#;
        let open = src.find('{').unwrap();
        let close = find_matching_brace(src, open);
        assert_eq!(close, src.len() as isize);
    }

    #[test]
    fn brace_matching_handles_escaped_quote() {
        let src = r#"{ "a\"}" }"#;
        let close = find_matching_brace(src, 0);
        assert_eq!(close, src.len() as isize);
    }

    #[test]
    fn unmatched_brace_is_sentinel() {
        let src = "{ foo();";
        assert_eq!(find_matching_brace(src, 0), NOT_FOUND);
    }

    #[test]
    fn method_span_is_found() {
        let src = "public class X {\n    public int computeTotal(int a, int b) {\n        return a + b;\n    }\n}\n";
        let spans = method_spans(src);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].name, "computeTotal");
        assert!(spans[0].start_line <= 2);
        assert!(spans[0].end_line >= 4);
    }

    #[test]
    fn control_keywords_are_excluded() {
        let src = "void m() { if (x) { doThing(); } }";
        let spans = method_spans(src);
        assert!(spans.iter().all(|s| s.name != "if"));
    }

    #[test]
    fn call_sites_are_not_declarations() {
        let src = "void m() { helper.doWork(1); }";
        let spans = method_spans(src);
        assert!(spans.iter().all(|s| s.name != "doWork"));
    }

    #[test]
    fn annotation_backscan_collects_multiline_block() {
        let text = "@Transactional\n@Override\npublic void inner() {\n}\n";
        let lines: Vec<&str> = text.lines().collect();
        let header_idx = lines.iter().position(|l| l.contains("public void inner")).unwrap();
        let start = backscan_annotation_block(&lines, header_idx);
        assert_eq!(start, 0);
    }

    #[test]
    fn annotation_backscan_stops_at_previous_closing_brace() {
        let text = "}\n@Override\npublic void inner() {\n}\n";
        let lines: Vec<&str> = text.lines().collect();
        let header_idx = lines.iter().position(|l| l.contains("public void inner")).unwrap();
        let start = backscan_annotation_block(&lines, header_idx);
        assert_eq!(start, 1);
    }
}
