//! The report adapter: takes the merged `ReviewPayload` and hands it to a
//! renderer. HTML rendering, terminal colorization beyond what `tracing`
//! already gives us, and auto-opening a browser are out of scope here —
//! this module implements only the two interfaces the orchestrator
//! actually needs: the JSON wire contract and a plain-text summary for a
//! terminal that isn't piping to a report viewer.

use crate::model::{ReviewPayload, Severity};
use std::io::Write;

/// Serializes the payload as pretty JSON, the wire contract a downstream
/// HTML renderer (out of scope here) would consume.
pub fn to_json(payload: &ReviewPayload) -> serde_json::Result<String> {
    serde_json::to_string_pretty(payload)
}

/// Writes a short human-readable summary to `out`: staged count, a
/// severity breakdown, and one line per finding/impact entry.
pub fn write_summary(out: &mut impl Write, payload: &ReviewPayload) -> std::io::Result<()> {
    writeln!(
        out,
        "branch {} — {} staged file(s), {} finding(s), {} impacted file(s)",
        payload.branch,
        payload.staged_count,
        payload.findings.len(),
        payload.impact_entries.len()
    )?;

    let must_fix = count_severity(payload, Severity::MustFix);
    let should_fix = count_severity(payload, Severity::ShouldFix);
    let consider = count_severity(payload, Severity::Consider);
    if !payload.findings.is_empty() {
        writeln!(
            out,
            "  {must_fix} must-fix, {should_fix} should-fix, {consider} consider"
        )?;
    }

    for finding in &payload.findings {
        writeln!(
            out,
            "  [{}] {}:{} {} — {}",
            finding.severity,
            finding.file.display(),
            finding.line,
            finding.code,
            finding.message
        )?;
    }

    for entry in &payload.impact_entries {
        if entry.endpoints.is_empty() && entry.notes.is_empty() {
            continue;
        }
        writeln!(out, "  impact: {} ({})", entry.file_name, entry.fqn)?;
        for endpoint in &entry.endpoints {
            writeln!(out, "    endpoint: {endpoint}")?;
        }
        for note in &entry.notes {
            writeln!(out, "    note: {note}")?;
        }
    }

    Ok(())
}

fn count_severity(payload: &ReviewPayload, severity: Severity) -> usize {
    payload.findings.iter().filter(|f| f.severity == severity).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Category, Finding};
    use std::path::PathBuf;

    fn payload_with_one_finding() -> ReviewPayload {
        ReviewPayload {
            branch: "main".to_string(),
            staged_count: 1,
            findings: vec![Finding {
                severity: Severity::MustFix,
                category: Category::NullSafety,
                file: PathBuf::from("Foo.java"),
                line: 10,
                code: "NS001".to_string(),
                message: "Optional.get() without isPresent check".to_string(),
                explanation: "explanation".to_string(),
                suggested_fix: None,
            }],
            ..Default::default()
        }
    }

    #[test]
    fn json_round_trips_through_serde() {
        let payload = payload_with_one_finding();
        let json = to_json(&payload).unwrap();
        let back: ReviewPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(back.findings.len(), 1);
        assert_eq!(back.findings[0].code, "NS001");
    }

    #[test]
    fn summary_mentions_must_fix_count() {
        let payload = payload_with_one_finding();
        let mut buf = Vec::new();
        write_summary(&mut buf, &payload).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("1 must-fix"));
        assert!(text.contains("NS001"));
    }
}
