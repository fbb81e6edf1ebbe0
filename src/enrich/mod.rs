//! Batch enrichment of records from their public web pages.
//!
//! A run selects targets for one entity kind, then for each target fetches its
//! page, asks the language model for narrative text and writes it back. Every
//! failure is local to its target: the run always continues with the next one
//! and reports one [`EnrichmentOutcome`] per target in [`RunSummary`].

pub mod adapter;
pub mod pacing;
pub mod parser;
pub mod pipeline;

use serde::Serialize;
use uuid::Uuid;

pub use adapter::{EntityAdapter, EntityKind, InvestorAdapter, OrganizationAdapter, SectionAdapter};
pub use pacing::{FixedDelay, Pacer};
pub use parser::{OutputFields, ParseError};
pub use pipeline::{Pipeline, PipelineSettings};

/// A record selected for enrichment.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct EnrichmentTarget {
    pub id: Uuid,
    pub display_name: String,
    pub source_url: Option<String>,
    pub existing_summary: Option<String>,
    pub existing_value_proposition: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedDocument {
    pub url: String,
    pub markdown: String,
    /// Length of `markdown` in characters.
    pub length: usize,
}

impl FetchedDocument {
    pub fn new(url: impl Into<String>, markdown: impl Into<String>) -> Self {
        let markdown = markdown.into();
        let length = markdown.chars().count();
        Self {
            url: url.into(),
            markdown,
            length,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisResult {
    pub summary: String,
    pub value_proposition: String,
}

/// Which records a run covers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub target_id: Option<Uuid>,
    pub only_missing: bool,
    pub parent_id: Option<Uuid>,
    pub section_ids: Vec<Uuid>,
}

/// Terminal state of one target within a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetState {
    NoUrl,
    FetchFailed(String),
    InsufficientContent,
    SynthesisFailed(String),
    EmptySynthesis,
    ParseFailed,
    WriteFailed(String),
    Succeeded,
}

impl TargetState {
    pub fn is_success(&self) -> bool {
        matches!(self, TargetState::Succeeded)
    }

    pub fn error_reason(&self) -> Option<String> {
        match self {
            TargetState::NoUrl => Some("no website URL".to_string()),
            TargetState::FetchFailed(e) => Some(format!("scrape failed: {}", e)),
            TargetState::InsufficientContent => Some("insufficient content scraped".to_string()),
            TargetState::SynthesisFailed(status) => Some(format!("synthesis failed: {}", status)),
            TargetState::EmptySynthesis => Some("no content generated".to_string()),
            TargetState::ParseFailed => Some("failed to parse response".to_string()),
            TargetState::WriteFailed(e) => Some(format!("database update failed: {}", e)),
            TargetState::Succeeded => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnrichmentOutcome {
    pub target_id: Uuid,
    pub target_name: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
}

impl EnrichmentOutcome {
    pub fn new(target: &EnrichmentTarget, state: &TargetState) -> Self {
        Self {
            target_id: target.id,
            target_name: target.display_name.clone(),
            success: state.is_success(),
            error_reason: state.error_reason(),
        }
    }
}

/// Outcomes of one run, in processing order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub total_processed: usize,
    pub succeeded_count: usize,
    pub failed_count: usize,
    pub outcomes: Vec<EnrichmentOutcome>,
}

impl RunSummary {
    pub fn record(&mut self, target: &EnrichmentTarget, state: &TargetState) {
        let outcome = EnrichmentOutcome::new(target, state);
        if outcome.success {
            self.succeeded_count += 1;
        } else {
            self.failed_count += 1;
        }
        self.total_processed += 1;
        self.outcomes.push(outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(name: &str) -> EnrichmentTarget {
        EnrichmentTarget {
            id: Uuid::new_v4(),
            display_name: name.to_string(),
            source_url: None,
            existing_summary: None,
            existing_value_proposition: None,
        }
    }

    #[test]
    fn test_error_reasons() {
        assert_eq!(TargetState::NoUrl.error_reason().as_deref(), Some("no website URL"));
        assert_eq!(
            TargetState::FetchFailed("timeout".into()).error_reason().as_deref(),
            Some("scrape failed: timeout")
        );
        assert_eq!(
            TargetState::SynthesisFailed("429".into()).error_reason().as_deref(),
            Some("synthesis failed: 429")
        );
        assert_eq!(
            TargetState::WriteFailed("deadlock".into()).error_reason().as_deref(),
            Some("database update failed: deadlock")
        );
        assert_eq!(TargetState::Succeeded.error_reason(), None);
    }

    #[test]
    fn test_summary_counts_follow_outcomes() {
        let mut summary = RunSummary::default();
        summary.record(&target("A"), &TargetState::Succeeded);
        summary.record(&target("B"), &TargetState::ParseFailed);
        summary.record(&target("C"), &TargetState::NoUrl);

        assert_eq!(summary.total_processed, 3);
        assert_eq!(summary.succeeded_count, 1);
        assert_eq!(summary.failed_count, 2);
        let names: Vec<_> = summary.outcomes.iter().map(|o| o.target_name.as_str()).collect();
        assert_eq!(names, ["A", "B", "C"]);
    }

    #[test]
    fn test_fetched_document_counts_chars() {
        let doc = FetchedDocument::new("https://example.org", "café");
        assert_eq!(doc.length, 4);
    }
}
