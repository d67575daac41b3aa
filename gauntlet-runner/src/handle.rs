//! Deterministic report handles.
//!
//! The terminal writes all artifacts into a shared output directory; handles
//! must be unique per (workflow, stage, disambiguator) so concurrent
//! workflows never clobber each other and stages never have to guess which
//! file is theirs.

/// Maximum handle length accepted by the terminal's report option.
const MAX_HANDLE_LEN: usize = 60;

/// Build a report handle of the form `{stem}_{tag}_{hash8}`.
///
/// The hash covers the workflow id, stem, tag and disambiguator, so two
/// workflows over the same source produce disjoint handle sets. The readable
/// prefix is clamped; the hash is always kept.
pub fn report_handle(workflow_id: &str, source_stem: &str, tag: &str, extra: Option<&str>) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(workflow_id.as_bytes());
    hasher.update(b"/");
    hasher.update(source_stem.as_bytes());
    hasher.update(b"/");
    hasher.update(tag.as_bytes());
    if let Some(extra) = extra {
        hasher.update(b"/");
        hasher.update(extra.as_bytes());
    }
    let digest = hasher.finalize().to_hex();
    let hash8 = &digest.as_str()[..8];

    let mut base = format!("{source_stem}_{tag}");
    if let Some(extra) = extra {
        base.push('_');
        base.push_str(extra);
    }
    let safe = sanitize(&base);

    let budget = MAX_HANDLE_LEN - 9; // room for '_' + 8 hex chars
    let head: String = if safe.len() > budget {
        safe[..budget].trim_end_matches('_').to_string()
    } else {
        safe
    };
    format!("{head}_{hash8}")
}

fn sanitize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_underscore = false;
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
            last_underscore = false;
        } else if !last_underscore {
            out.push('_');
            last_underscore = true;
        }
    }
    out.trim_matches('_').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn handle_is_deterministic() {
        let a = report_handle("wf1", "trend_ea", "sweep", None);
        let b = report_handle("wf1", "trend_ea", "sweep", None);
        assert_eq!(a, b);
    }

    #[test]
    fn handles_disjoint_across_workflows() {
        let tags = ["validate", "sweep", "bt_pass1", "bt_pass2", "stress_ohlc_last_30d"];
        let a: HashSet<_> = tags
            .iter()
            .map(|t| report_handle("wf_a", "trend_ea", t, None))
            .collect();
        let b: HashSet<_> = tags
            .iter()
            .map(|t| report_handle("wf_b", "trend_ea", t, None))
            .collect();
        assert!(a.is_disjoint(&b));
    }

    #[test]
    fn disambiguator_changes_handle() {
        let one = report_handle("wf1", "ea", "bt", Some("pass1"));
        let two = report_handle("wf1", "ea", "bt", Some("pass2"));
        assert_ne!(one, two);
    }

    #[test]
    fn long_names_clamped_but_unique() {
        let stem = "an_extremely_long_expert_advisor_source_file_name_beyond_reason";
        let a = report_handle("wf1", stem, "sweep", Some("iteration1"));
        let b = report_handle("wf1", stem, "sweep", Some("iteration2"));
        assert!(a.len() <= MAX_HANDLE_LEN);
        assert!(b.len() <= MAX_HANDLE_LEN);
        assert_ne!(a, b);
    }

    #[test]
    fn special_characters_sanitized() {
        let handle = report_handle("wf1", "my ea (v2)", "validate", None);
        assert!(handle.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
    }
}
