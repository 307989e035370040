//! Roster feed: the JSON list of subjects to enroll.

use std::path::Path;

use rollcall_store::EnrollmentRecord;
use rollcall_types::IdentityId;
use serde::Deserialize;

use crate::error::DaemonError;

#[derive(Debug, Deserialize)]
struct RosterEntry {
    identity_id: String,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    group_label: String,
}

pub fn load_roster(path: &Path) -> Result<Vec<EnrollmentRecord>, DaemonError> {
    let content = std::fs::read_to_string(path)?;
    parse_roster(&content)
}

/// Parse a roster: a JSON array of `{identity_id, display_name, group_label}`.
///
/// Identity ids must be non-empty and carry no surrounding whitespace. Names
/// and groups are trimmed.
pub fn parse_roster(json: &str) -> Result<Vec<EnrollmentRecord>, DaemonError> {
    let entries: Vec<RosterEntry> =
        serde_json::from_str(json).map_err(|e| DaemonError::Roster(e.to_string()))?;

    entries
        .into_iter()
        .enumerate()
        .map(|(row, entry)| {
            let identity_id = IdentityId::parse(&entry.identity_id)
                .map_err(|e| DaemonError::Roster(format!("row {row}: {e}")))?;
            Ok(EnrollmentRecord {
                identity_id,
                display_name: entry.display_name.trim().to_string(),
                group_label: entry.group_label.trim().to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rows_in_order() {
        let roster = parse_roster(
            r#"[
                {"identity_id": "S001", "display_name": "Jo ", "group_label": "A"},
                {"identity_id": "S002", "display_name": "Al"}
            ]"#,
        )
        .unwrap();
        assert_eq!(roster.len(), 2);
        assert_eq!(roster[0].identity_id, IdentityId::new("S001"));
        assert_eq!(roster[0].display_name, "Jo");
        assert_eq!(roster[1].group_label, "");
    }

    #[test]
    fn blank_identity_names_the_row() {
        let err = parse_roster(r#"[{"identity_id": "S001"}, {"identity_id": " "}]"#).unwrap_err();
        match err {
            DaemonError::Roster(msg) => assert!(msg.starts_with("row 1")),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn not_an_array_is_rejected() {
        assert!(matches!(
            parse_roster(r#"{"identity_id": "S001"}"#),
            Err(DaemonError::Roster(_))
        ));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roster.json");
        std::fs::write(&path, r#"[{"identity_id": "S001", "display_name": "Jo"}]"#).unwrap();
        assert_eq!(load_roster(&path).unwrap().len(), 1);
    }
}
