pub mod api;
pub mod config;
pub mod enrich;
pub mod error;
pub mod llm;
pub mod scraper;
pub mod store;
pub mod testing;

use std::sync::Arc;

use crate::api::auth::{AdminGate, IdentityServiceGate};
use crate::config::{Config, FetcherBackend};
use crate::enrich::{EntityKind, FixedDelay, Pipeline};
use crate::error::{AppError, Result};
use crate::llm::{ChatCompletionsClient, TextGenerator};
use crate::scraper::{DirectFetcher, FirecrawlFetcher, PageFetcher};
use crate::store::{EntityStore, PgStore};

/// Application state shared across handlers.
///
/// External services whose credentials are missing are left as `None`; the
/// server still starts and every enrichment request is refused with a
/// configuration error until they are provided.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn EntityStore>,
    pub auth: Arc<dyn AdminGate>,
    pub fetcher: Option<Arc<dyn PageFetcher>>,
    pub generator: Option<Arc<dyn TextGenerator>>,
}

impl AppState {
    pub fn from_config(config: Config, store: PgStore) -> Result<Self> {
        let store = Arc::new(store);

        let fetcher: Option<Arc<dyn PageFetcher>> = match config.page_fetcher {
            FetcherBackend::Direct => Some(Arc::new(
                DirectFetcher::new(config.http_timeout)
                    .map_err(|e| AppError::ConfigError(e.to_string()))?,
            )),
            FetcherBackend::Firecrawl => match &config.firecrawl_api_key {
                Some(key) => Some(Arc::new(
                    FirecrawlFetcher::new(
                        key.clone(),
                        config.firecrawl_base_url.clone(),
                        config.fetch_wait,
                        config.http_timeout,
                    )
                    .map_err(|e| AppError::ConfigError(e.to_string()))?,
                )),
                None => None,
            },
        };

        let generator: Option<Arc<dyn TextGenerator>> = match &config.llm_api_key {
            Some(key) => Some(Arc::new(
                ChatCompletionsClient::new(
                    key.clone(),
                    config.llm_base_url.clone(),
                    config.llm_model.clone(),
                    config.llm_temperature,
                    config.http_timeout,
                )
                .map_err(|e| AppError::ConfigError(e.to_string()))?,
            )),
            None => None,
        };

        let auth = Arc::new(
            IdentityServiceGate::new(
                config.identity_url.clone(),
                config.identity_api_key.clone(),
                store.clone(),
                config.http_timeout,
            )
            .map_err(|e| AppError::ConfigError(e.to_string()))?,
        );

        Ok(Self {
            config: Arc::new(config),
            store,
            auth,
            fetcher,
            generator,
        })
    }

    /// A pipeline for one run, or a configuration error when a service
    /// credential is missing.
    pub fn pipeline(&self, kind: EntityKind) -> Result<Pipeline> {
        let fetcher = self.fetcher.clone().ok_or_else(|| {
            AppError::ConfigError(
                "FIRECRAWL_API_KEY is not configured (or set PAGE_FETCHER=direct)".to_string(),
            )
        })?;
        let generator = self
            .generator
            .clone()
            .ok_or_else(|| AppError::ConfigError("LLM_API_KEY is not configured".to_string()))?;
        let pacer = Arc::new(FixedDelay::new(self.config.pacing.delay_for(kind)));

        Ok(Pipeline::new(self.store.clone(), fetcher, generator, pacer))
    }
}
