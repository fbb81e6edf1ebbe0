use std::sync::Arc;

use tracing::{info, warn};

use super::adapter::EntityAdapter;
use super::pacing::Pacer;
use super::parser;
use super::{EnrichmentTarget, RunSummary, Selection, TargetState};
use crate::llm::TextGenerator;
use crate::scraper::{PageFetcher, normalize_url};
use crate::store::{EntityStore, StoreError};

/// Fetched pages shorter than this are not worth a model call.
pub const MIN_CONTENT_CHARS: usize = 100;

/// Upper bound on the page text sent to the model.
pub const MAX_SOURCE_CHARS: usize = 12_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSettings {
    pub min_content_chars: usize,
    pub max_source_chars: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            min_content_chars: MIN_CONTENT_CHARS,
            max_source_chars: MAX_SOURCE_CHARS,
        }
    }
}

/// One bounded, sequential enrichment run over the targets an adapter selects.
pub struct Pipeline {
    store: Arc<dyn EntityStore>,
    fetcher: Arc<dyn PageFetcher>,
    generator: Arc<dyn TextGenerator>,
    pacer: Arc<dyn Pacer>,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn EntityStore>,
        fetcher: Arc<dyn PageFetcher>,
        generator: Arc<dyn TextGenerator>,
        pacer: Arc<dyn Pacer>,
    ) -> Self {
        Self {
            store,
            fetcher,
            generator,
            pacer,
            settings: PipelineSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Only a failed candidate query aborts the run; every per-target failure
    /// is recorded in the summary and the loop moves on.
    pub async fn run(
        &self,
        adapter: &dyn EntityAdapter,
        selection: &Selection,
    ) -> Result<RunSummary, StoreError> {
        let targets = adapter
            .select_candidates(self.store.as_ref(), selection)
            .await?;

        info!(
            kind = %adapter.kind(),
            targets = targets.len(),
            only_missing = selection.only_missing,
            "Starting enrichment run"
        );

        let mut summary = RunSummary::default();
        for (index, target) in targets.iter().enumerate() {
            if index > 0 {
                self.pacer.pause().await;
            }

            let state = self.process(adapter, target).await;
            match state.error_reason() {
                None => info!(target_id = %target.id, name = %target.display_name, "Target enriched"),
                Some(reason) => warn!(
                    target_id = %target.id,
                    name = %target.display_name,
                    reason = %reason,
                    "Target enrichment failed"
                ),
            }
            summary.record(target, &state);
        }

        info!(
            kind = %adapter.kind(),
            total = summary.total_processed,
            succeeded = summary.succeeded_count,
            failed = summary.failed_count,
            "Enrichment run completed"
        );

        Ok(summary)
    }

    async fn process(&self, adapter: &dyn EntityAdapter, target: &EnrichmentTarget) -> TargetState {
        let Some(raw_url) = target
            .source_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
        else {
            return TargetState::NoUrl;
        };
        let url = normalize_url(raw_url);

        let document = match self.fetcher.fetch(&url).await {
            Ok(document) => document,
            Err(e) => return TargetState::FetchFailed(e.to_string()),
        };
        if document.length < self.settings.min_content_chars {
            return TargetState::InsufficientContent;
        }

        let source_text = truncate_chars(&document.markdown, self.settings.max_source_chars);
        let prompt = adapter.build_prompt(&target.display_name, source_text);

        let raw = match self.generator.generate(&prompt).await {
            Ok(raw) => raw,
            Err(e) => return TargetState::SynthesisFailed(e.to_string()),
        };
        if raw.trim().is_empty() {
            return TargetState::EmptySynthesis;
        }

        let result = match parser::parse(&raw, adapter.output_fields()) {
            Ok(result) => result,
            Err(e) => {
                warn!(target_id = %target.id, error = %e, "Unparseable model response");
                return TargetState::ParseFailed;
            }
        };

        match adapter.persist(self.store.as_ref(), target.id, &result).await {
            Ok(()) => TargetState::Succeeded,
            Err(e) => TargetState::WriteFailed(e.to_string()),
        }
    }
}

/// Longest prefix of `text` holding at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}
