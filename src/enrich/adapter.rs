//! Per-entity-kind plumbing for the generic pipeline.
//!
//! An adapter knows which table its records live in, how to phrase the prompt
//! for them and which JSON keys it expects back. Everything else is shared.

use std::fmt;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::parser::OutputFields;
use super::{EnrichmentTarget, Selection, SynthesisResult};
use crate::llm::Prompt;
use crate::store::{EnrichmentUpdate, EntityStore, StoreError, TableSpec, TargetQuery};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Organizations,
    Investors,
    Sections,
}

impl EntityKind {
    pub const ALL: [EntityKind; 3] = [
        EntityKind::Organizations,
        EntityKind::Investors,
        EntityKind::Sections,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Organizations => "organizations",
            EntityKind::Investors => "investors",
            EntityKind::Sections => "sections",
        }
    }

    pub fn adapter(&self) -> &'static dyn EntityAdapter {
        match self {
            EntityKind::Organizations => &OrganizationAdapter,
            EntityKind::Investors => &InvestorAdapter,
            EntityKind::Sections => &SectionAdapter,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[async_trait]
pub trait EntityAdapter: Send + Sync {
    fn kind(&self) -> EntityKind;

    fn table(&self) -> TableSpec;

    fn output_fields(&self) -> OutputFields;

    fn build_prompt(&self, name: &str, source_text: &str) -> Prompt;

    async fn select_candidates(
        &self,
        store: &dyn EntityStore,
        selection: &Selection,
    ) -> Result<Vec<EnrichmentTarget>, StoreError> {
        let mut query = TargetQuery::new(self.table());
        query.target_id = selection.target_id;
        query.only_missing = selection.only_missing;
        store.find_targets(&query).await
    }

    async fn persist(
        &self,
        store: &dyn EntityStore,
        id: Uuid,
        result: &SynthesisResult,
    ) -> Result<(), StoreError> {
        store
            .update_enrichment(&EnrichmentUpdate {
                table: self.table(),
                id,
                result,
                updated_at: Utc::now(),
            })
            .await
    }
}

/// Wording that differs between entity kinds.
struct PromptWording {
    subject: &'static str,
    overview_focus: &'static str,
    value_focus: &'static str,
}

fn narrative_prompt(
    wording: &PromptWording,
    fields: OutputFields,
    name: &str,
    source_text: &str,
) -> Prompt {
    let system = format!(
        "You are a professional copywriter who writes accurate, neutral profiles of {subject} \
         from the content of their website. Only use facts supported by the provided content. \
         Respond with a single JSON object and nothing else: no prose before or after it and \
         no markdown code fences.",
        subject = wording.subject,
    );

    let user = format!(
        "Name: {name}\n\n\
         Write two pieces of content based on the website content below.\n\n\
         1. \"{summary}\": a 200-300 word overview written in the third person covering {overview}.\n\
         2. \"{value}\": one paragraph of 3-5 sentences explaining {value_focus}.\n\n\
         Return exactly this JSON shape with both fields as strings:\n\
         {{\"{summary}\": \"...\", \"{value}\": \"...\"}}\n\n\
         Website content:\n{source_text}",
        summary = fields.summary,
        value = fields.value_proposition,
        overview = wording.overview_focus,
        value_focus = wording.value_focus,
    );

    Prompt { system, user }
}

pub struct OrganizationAdapter;

impl OrganizationAdapter {
    const TABLE: TableSpec = TableSpec {
        table: "organizations",
        name_column: "name",
        url_column: "website",
        summary_column: "basic_info",
        value_column: "why_work_with_us",
        parent_column: None,
    };

    const FIELDS: OutputFields = OutputFields {
        summary: "basic_info",
        value_proposition: "why_work_with_us",
    };

    const WORDING: PromptWording = PromptWording {
        subject: "organizations",
        overview_focus: "the organization's mission, its focus areas and what sets it apart",
        value_focus: "why someone should work with or join this organization",
    };
}

#[async_trait]
impl EntityAdapter for OrganizationAdapter {
    fn kind(&self) -> EntityKind {
        EntityKind::Organizations
    }

    fn table(&self) -> TableSpec {
        Self::TABLE
    }

    fn output_fields(&self) -> OutputFields {
        Self::FIELDS
    }

    fn build_prompt(&self, name: &str, source_text: &str) -> Prompt {
        narrative_prompt(&Self::WORDING, Self::FIELDS, name, source_text)
    }
}

pub struct InvestorAdapter;

impl InvestorAdapter {
    const TABLE: TableSpec = TableSpec {
        table: "investors",
        name_column: "name",
        url_column: "website",
        summary_column: "description",
        value_column: "value_proposition",
        parent_column: None,
    };

    const FIELDS: OutputFields = OutputFields {
        summary: "overview",
        value_proposition: "why_partner_with_us",
    };

    const WORDING: PromptWording = PromptWording {
        subject: "investment firms",
        overview_focus: "the firm's investment thesis, stages and sectors of focus, and what \
                         distinguishes it from other investors",
        value_focus: "what founders gain from partnering with this investor beyond capital",
    };
}

#[async_trait]
impl EntityAdapter for InvestorAdapter {
    fn kind(&self) -> EntityKind {
        EntityKind::Investors
    }

    fn table(&self) -> TableSpec {
        Self::TABLE
    }

    fn output_fields(&self) -> OutputFields {
        Self::FIELDS
    }

    fn build_prompt(&self, name: &str, source_text: &str) -> Prompt {
        narrative_prompt(&Self::WORDING, Self::FIELDS, name, source_text)
    }
}

/// Content sections belong to a parent record and can be narrowed to a subset.
pub struct SectionAdapter;

impl SectionAdapter {
    const TABLE: TableSpec = TableSpec {
        table: "content_sections",
        name_column: "title",
        url_column: "source_url",
        summary_column: "body",
        value_column: "highlights",
        parent_column: Some("parent_id"),
    };

    const FIELDS: OutputFields = OutputFields {
        summary: "section_body",
        value_proposition: "key_highlights",
    };

    const WORDING: PromptWording = PromptWording {
        subject: "website content sections",
        overview_focus: "what this section of the site is about, its main points and what makes \
                         the offering distinctive",
        value_focus: "the most important takeaways a reader should remember from this section",
    };
}

#[async_trait]
impl EntityAdapter for SectionAdapter {
    fn kind(&self) -> EntityKind {
        EntityKind::Sections
    }

    fn table(&self) -> TableSpec {
        Self::TABLE
    }

    fn output_fields(&self) -> OutputFields {
        Self::FIELDS
    }

    fn build_prompt(&self, name: &str, source_text: &str) -> Prompt {
        narrative_prompt(&Self::WORDING, Self::FIELDS, name, source_text)
    }

    async fn select_candidates(
        &self,
        store: &dyn EntityStore,
        selection: &Selection,
    ) -> Result<Vec<EnrichmentTarget>, StoreError> {
        let mut query = TargetQuery::new(Self::TABLE);
        query.target_id = selection.target_id;
        query.only_missing = selection.only_missing;
        query.parent_id = selection.parent_id;
        query.ids = selection.section_ids.clone();
        store.find_targets(&query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_names_entity_and_requested_keys() {
        let prompt = OrganizationAdapter.build_prompt("Acme Relief", "We feed families.");
        assert!(prompt.user.starts_with("Name: Acme Relief"));
        assert!(prompt.user.contains(r#"{"basic_info": "...", "why_work_with_us": "..."}"#));
        assert!(prompt.user.ends_with("Website content:\nWe feed families."));
        assert!(prompt.system.contains("no markdown code fences"));
    }

    #[test]
    fn test_each_kind_has_distinct_table_and_keys() {
        let adapters: Vec<_> = EntityKind::ALL.iter().map(|k| k.adapter()).collect();
        for (kind, adapter) in EntityKind::ALL.iter().zip(&adapters) {
            assert_eq!(adapter.kind(), *kind);
        }
        assert_eq!(adapters[0].table().table, "organizations");
        assert_eq!(adapters[1].table().table, "investors");
        assert_eq!(adapters[2].table().table, "content_sections");
        assert_eq!(adapters[1].output_fields().summary, "overview");
        assert_eq!(adapters[2].table().parent_column, Some("parent_id"));
    }

    #[test]
    fn test_investor_prompt_wording() {
        let prompt = InvestorAdapter.build_prompt("Northwind Ventures", "Seed fund.");
        assert!(prompt.system.contains("investment firms"));
        assert!(prompt.user.contains("\"why_partner_with_us\""));
    }
}
