use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::enrich::{EntityKind, RunSummary, Selection};
use crate::error::{AppError, Result};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichRequest {
    pub target_id: Option<String>,
    pub only_missing: Option<bool>,
    pub parent_id: Option<String>,
    pub section_ids: Option<Vec<String>>,
}

impl EnrichRequest {
    /// An empty body means "fill every gap".
    pub fn from_body(body: &[u8]) -> Result<Self> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(body)
            .map_err(|e| AppError::ValidationError(format!("invalid request body: {}", e)))
    }

    pub fn into_selection(self, kind: EntityKind) -> Result<Selection> {
        let target_id = self.target_id.as_deref().map(|id| parse_id("targetId", id)).transpose()?;
        // Manual re-enrichment of one target overwrites by default; batch runs fill gaps.
        let only_missing = self.only_missing.unwrap_or(target_id.is_none());

        let mut selection = Selection {
            target_id,
            only_missing,
            ..Selection::default()
        };

        if kind == EntityKind::Sections {
            let parent_id = self
                .parent_id
                .as_deref()
                .ok_or_else(|| AppError::ValidationError("parentId is required".to_string()))?;
            selection.parent_id = Some(parse_id("parentId", parent_id)?);
            selection.section_ids = self
                .section_ids
                .unwrap_or_default()
                .iter()
                .map(|id| parse_id("sectionIds", id))
                .collect::<Result<_>>()?;
        }

        Ok(selection)
    }
}

fn parse_id(field: &str, raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| AppError::ValidationError(format!("{} is not a valid id: {}", field, raw)))
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct TargetResult {
    pub id: Uuid,
    pub name: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct RunCounts {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

#[derive(Debug, Serialize)]
pub struct EnrichResponse {
    pub success: bool,
    pub message: String,
    pub results: Vec<TargetResult>,
    pub summary: RunCounts,
}

impl EnrichResponse {
    pub fn from_summary(kind: EntityKind, summary: RunSummary) -> Self {
        let message = format!(
            "Processed {} {}: {} succeeded, {} failed",
            summary.total_processed, kind, summary.succeeded_count, summary.failed_count
        );
        let counts = RunCounts {
            total: summary.total_processed,
            succeeded: summary.succeeded_count,
            failed: summary.failed_count,
        };
        let results = summary
            .outcomes
            .into_iter()
            .map(|outcome| TargetResult {
                id: outcome.target_id,
                name: outcome.target_name,
                success: outcome.success,
                error: outcome.error_reason,
            })
            .collect();

        Self {
            success: true,
            message,
            results,
            summary: counts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_body_fills_gaps() {
        let selection = EnrichRequest::from_body(b"")
            .unwrap()
            .into_selection(EntityKind::Organizations)
            .unwrap();
        assert_eq!(selection.target_id, None);
        assert!(selection.only_missing);
    }

    #[test]
    fn test_single_target_overwrites_by_default() {
        let id = Uuid::new_v4();
        let body = format!(r#"{{"targetId":"{}"}}"#, id);
        let selection = EnrichRequest::from_body(body.as_bytes())
            .unwrap()
            .into_selection(EntityKind::Investors)
            .unwrap();
        assert_eq!(selection.target_id, Some(id));
        assert!(!selection.only_missing);
    }

    #[test]
    fn test_explicit_only_missing_wins() {
        let selection = EnrichRequest::from_body(br#"{"onlyMissing":false}"#)
            .unwrap()
            .into_selection(EntityKind::Organizations)
            .unwrap();
        assert!(!selection.only_missing);
    }

    #[test]
    fn test_sections_require_parent() {
        let err = EnrichRequest::from_body(b"{}")
            .unwrap()
            .into_selection(EntityKind::Sections)
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid request: parentId is required");
    }

    #[test]
    fn test_sections_with_subset() {
        let parent = Uuid::new_v4();
        let section = Uuid::new_v4();
        let body = format!(r#"{{"parentId":"{}","sectionIds":["{}"]}}"#, parent, section);
        let selection = EnrichRequest::from_body(body.as_bytes())
            .unwrap()
            .into_selection(EntityKind::Sections)
            .unwrap();
        assert_eq!(selection.parent_id, Some(parent));
        assert_eq!(selection.section_ids, vec![section]);
    }

    #[test]
    fn test_invalid_ids_and_json() {
        let err = EnrichRequest::from_body(br#"{"targetId":"nope"}"#)
            .unwrap()
            .into_selection(EntityKind::Organizations)
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));

        assert!(matches!(
            EnrichRequest::from_body(b"{not json"),
            Err(AppError::ValidationError(_))
        ));
    }
}
