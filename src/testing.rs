// In-memory implementations of the pipeline's collaborators, for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::api::auth::{AdminGate, AdminUser, AuthError};
use crate::enrich::{EnrichmentTarget, FetchedDocument, Pacer};
use crate::llm::{Prompt, SynthesisError, TextGenerator};
use crate::scraper::{FetchError, PageFetcher};
use crate::store::{EnrichmentUpdate, EntityStore, RoleLookup, StoreError, TargetQuery};

// =============================================================================
// Memory Store
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryRow {
    pub id: Uuid,
    pub name: String,
    pub url: Option<String>,
    pub summary: Option<String>,
    pub value_proposition: Option<String>,
    pub parent_id: Option<Uuid>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl MemoryRow {
    pub fn new(name: &str, url: Option<&str>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            url: url.map(str::to_string),
            summary: None,
            value_proposition: None,
            parent_id: None,
            updated_at: None,
        }
    }

    pub fn with_summary(mut self, summary: &str) -> Self {
        self.summary = Some(summary.to_string());
        self
    }

    pub fn with_parent(mut self, parent_id: Uuid) -> Self {
        self.parent_id = Some(parent_id);
        self
    }
}

/// Rows keyed by table name. Selection follows the same filters and ordering
/// as the SQL store.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<&'static str, Vec<MemoryRow>>>,
    roles: Mutex<Vec<(String, String)>>,
    fail_selection: Mutex<Option<String>>,
    failing_updates: Mutex<HashMap<Uuid, String>>,
    update_count: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, table: &'static str, row: MemoryRow) -> Uuid {
        let id = row.id;
        self.tables.lock().unwrap().entry(table).or_default().push(row);
        id
    }

    pub fn row(&self, table: &str, id: Uuid) -> Option<MemoryRow> {
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .and_then(|rows| rows.iter().find(|r| r.id == id).cloned())
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.tables.lock().unwrap().get(table).map_or(0, Vec::len)
    }

    pub fn grant_role(&self, user_id: &str, role: &str) {
        self.roles
            .lock()
            .unwrap()
            .push((user_id.to_string(), role.to_string()));
    }

    /// Make every selection fail with the given message.
    pub fn fail_selection(&self, message: &str) {
        *self.fail_selection.lock().unwrap() = Some(message.to_string());
    }

    pub fn fail_update_for(&self, id: Uuid, message: &str) {
        self.failing_updates
            .lock()
            .unwrap()
            .insert(id, message.to_string());
    }

    pub fn update_count(&self) -> usize {
        self.update_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn find_targets(&self, query: &TargetQuery) -> Result<Vec<EnrichmentTarget>, StoreError> {
        if let Some(message) = self.fail_selection.lock().unwrap().clone() {
            return Err(StoreError::Other(message));
        }

        let tables = self.tables.lock().unwrap();
        let mut rows: Vec<&MemoryRow> = tables
            .get(query.table.table)
            .map(|rows| rows.iter().collect())
            .unwrap_or_default();

        rows.retain(|row| {
            query.target_id.is_none_or(|id| row.id == id)
                && (!query.only_missing || row.summary.is_none())
                && (query.table.parent_column.is_none()
                    || query.parent_id.is_none_or(|p| row.parent_id == Some(p)))
                && (query.ids.is_empty() || query.ids.contains(&row.id))
        });
        rows.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));

        Ok(rows
            .into_iter()
            .map(|row| EnrichmentTarget {
                id: row.id,
                display_name: row.name.clone(),
                source_url: row.url.clone(),
                existing_summary: row.summary.clone(),
                existing_value_proposition: row.value_proposition.clone(),
            })
            .collect())
    }

    async fn update_enrichment(&self, update: &EnrichmentUpdate<'_>) -> Result<(), StoreError> {
        if let Some(message) = self.failing_updates.lock().unwrap().get(&update.id) {
            return Err(StoreError::Other(message.clone()));
        }

        let mut tables = self.tables.lock().unwrap();
        let row = tables
            .get_mut(update.table.table)
            .and_then(|rows| rows.iter_mut().find(|r| r.id == update.id))
            .ok_or(StoreError::NotFound {
                table: update.table.table,
                id: update.id,
            })?;

        row.summary = Some(update.result.summary.clone());
        row.value_proposition = Some(update.result.value_proposition.clone());
        row.updated_at = Some(update.updated_at);
        self.update_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl RoleLookup for MemoryStore {
    async fn has_role(&self, user_id: &str, role: &str) -> Result<bool, StoreError> {
        Ok(self
            .roles
            .lock()
            .unwrap()
            .iter()
            .any(|(u, r)| u == user_id && r == role))
    }
}

// =============================================================================
// Fake Fetcher
// =============================================================================

/// Pages keyed by URL. Unknown URLs fail like an unreachable site.
#[derive(Default)]
pub struct FakeFetcher {
    pages: Mutex<HashMap<String, Result<String, FetchError>>>,
    calls: Mutex<Vec<String>>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(self, url: &str, markdown: &str) -> Self {
        self.pages
            .lock()
            .unwrap()
            .insert(url.to_string(), Ok(markdown.to_string()));
        self
    }

    pub fn with_failure(self, url: &str, error: FetchError) -> Self {
        self.pages.lock().unwrap().insert(url.to_string(), Err(error));
        self
    }

    /// URLs fetched, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageFetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedDocument, FetchError> {
        self.calls.lock().unwrap().push(url.to_string());

        match self.pages.lock().unwrap().get(url) {
            Some(Ok(markdown)) => Ok(FetchedDocument::new(url, markdown.clone())),
            Some(Err(e)) => Err(e.clone()),
            None => Err(FetchError::Transport(format!("could not resolve {}", url))),
        }
    }
}

// =============================================================================
// Fake Generator
// =============================================================================

/// Answers by entity name (the prompt's `Name:` line), else a default reply.
pub struct FakeGenerator {
    default_reply: Result<String, SynthesisError>,
    replies: Mutex<HashMap<String, Result<String, SynthesisError>>>,
    prompts: Mutex<Vec<Prompt>>,
}

impl FakeGenerator {
    pub fn new(default_reply: &str) -> Self {
        Self {
            default_reply: Ok(default_reply.to_string()),
            replies: Mutex::new(HashMap::new()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn reply_for(self, name: &str, reply: &str) -> Self {
        self.replies
            .lock()
            .unwrap()
            .insert(name.to_string(), Ok(reply.to_string()));
        self
    }

    pub fn fail_for(self, name: &str, error: SynthesisError) -> Self {
        self.replies.lock().unwrap().insert(name.to_string(), Err(error));
        self
    }

    pub fn prompts(&self) -> Vec<Prompt> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl TextGenerator for FakeGenerator {
    async fn generate(&self, prompt: &Prompt) -> Result<String, SynthesisError> {
        self.prompts.lock().unwrap().push(prompt.clone());

        let name = prompt
            .user
            .lines()
            .next()
            .and_then(|line| line.strip_prefix("Name: "))
            .unwrap_or_default();

        match self.replies.lock().unwrap().get(name) {
            Some(reply) => reply.clone(),
            None => self.default_reply.clone(),
        }
    }
}

// =============================================================================
// Counting Pacer
// =============================================================================

#[derive(Default)]
pub struct CountingPacer {
    pauses: AtomicUsize,
}

impl CountingPacer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pauses(&self) -> usize {
        self.pauses.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Pacer for CountingPacer {
    async fn pause(&self) {
        self.pauses.fetch_add(1, Ordering::SeqCst);
    }
}

// =============================================================================
// Static Gate
// =============================================================================

/// Accepts a fixed set of tokens: admins pass, members are forbidden.
#[derive(Default)]
pub struct StaticGate {
    admins: HashMap<String, String>,
    members: Vec<String>,
}

impl StaticGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn admin(mut self, token: &str, user_id: &str) -> Self {
        self.admins.insert(token.to_string(), user_id.to_string());
        self
    }

    pub fn member(mut self, token: &str) -> Self {
        self.members.push(token.to_string());
        self
    }
}

#[async_trait]
impl AdminGate for StaticGate {
    async fn authorize(&self, token: Option<&str>) -> Result<AdminUser, AuthError> {
        let token = token.ok_or_else(|| AuthError::Unauthenticated("missing bearer token".into()))?;
        if let Some(user_id) = self.admins.get(token) {
            return Ok(AdminUser {
                user_id: user_id.clone(),
                email: None,
            });
        }
        if self.members.iter().any(|m| m == token) {
            return Err(AuthError::Forbidden);
        }
        Err(AuthError::Unauthenticated("invalid or expired token".into()))
    }
}
