//! Record store access.
//!
//! The pipeline only ever needs two operations from the store: select the rows
//! of one table that need enrichment, and overwrite the two narrative columns
//! of one row. Table and column names come from static [`TableSpec`]s owned by
//! the entity adapters, never from request input.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use crate::enrich::{EnrichmentTarget, SynthesisResult};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0}")]
    Database(#[from] sqlx::Error),

    #[error("no row in {table} with id {id}")]
    NotFound { table: &'static str, id: Uuid },

    #[error("{0}")]
    Other(String),
}

/// Where an entity kind lives and which columns hold its narrative fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSpec {
    pub table: &'static str,
    pub name_column: &'static str,
    pub url_column: &'static str,
    pub summary_column: &'static str,
    pub value_column: &'static str,
    pub parent_column: Option<&'static str>,
}

#[derive(Debug, Clone)]
pub struct TargetQuery {
    pub table: TableSpec,
    pub target_id: Option<Uuid>,
    pub only_missing: bool,
    pub parent_id: Option<Uuid>,
    pub ids: Vec<Uuid>,
}

impl TargetQuery {
    pub fn new(table: TableSpec) -> Self {
        Self {
            table,
            target_id: None,
            only_missing: false,
            parent_id: None,
            ids: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EnrichmentUpdate<'a> {
    pub table: TableSpec,
    pub id: Uuid,
    pub result: &'a SynthesisResult,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Rows matching the query, ordered by display name then id.
    async fn find_targets(&self, query: &TargetQuery) -> Result<Vec<EnrichmentTarget>, StoreError>;

    /// Overwrite the narrative columns of exactly one row.
    async fn update_enrichment(&self, update: &EnrichmentUpdate<'_>) -> Result<(), StoreError>;
}

#[async_trait]
pub trait RoleLookup: Send + Sync {
    async fn has_role(&self, user_id: &str, role: &str) -> Result<bool, StoreError>;
}

/// PostgreSQL-backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }
}

fn select_query(query: &TargetQuery) -> QueryBuilder<'static, Postgres> {
    let spec = &query.table;
    let mut builder = QueryBuilder::new(format!(
        "SELECT id, {name} AS display_name, {url} AS source_url, \
         {summary} AS existing_summary, {value} AS existing_value_proposition \
         FROM {table} WHERE TRUE",
        name = spec.name_column,
        url = spec.url_column,
        summary = spec.summary_column,
        value = spec.value_column,
        table = spec.table,
    ));

    if let Some(id) = query.target_id {
        builder.push(" AND id = ").push_bind(id);
    }
    if query.only_missing {
        builder.push(format!(" AND {} IS NULL", spec.summary_column));
    }
    if let (Some(column), Some(parent_id)) = (spec.parent_column, query.parent_id) {
        builder.push(format!(" AND {} = ", column)).push_bind(parent_id);
    }
    if !query.ids.is_empty() {
        builder.push(" AND id = ANY(").push_bind(query.ids.clone()).push(")");
    }

    builder.push(format!(" ORDER BY {}, id", spec.name_column));
    builder
}

fn update_sql(spec: &TableSpec) -> String {
    format!(
        "UPDATE {} SET {} = $1, {} = $2, updated_at = $3 WHERE id = $4",
        spec.table, spec.summary_column, spec.value_column
    )
}

#[async_trait]
impl EntityStore for PgStore {
    async fn find_targets(&self, query: &TargetQuery) -> Result<Vec<EnrichmentTarget>, StoreError> {
        let mut builder = select_query(query);
        let targets = builder
            .build_query_as::<EnrichmentTarget>()
            .fetch_all(&self.pool)
            .await?;
        Ok(targets)
    }

    async fn update_enrichment(&self, update: &EnrichmentUpdate<'_>) -> Result<(), StoreError> {
        let sql = update_sql(&update.table);
        let result = sqlx::query(&sql)
            .bind(&update.result.summary)
            .bind(&update.result.value_proposition)
            .bind(update.updated_at)
            .bind(update.id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                table: update.table.table,
                id: update.id,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RoleLookup for PgStore {
    async fn has_role(&self, user_id: &str, role: &str) -> Result<bool, StoreError> {
        let found = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM user_roles WHERE user_id::text = $1 AND role = $2)",
        )
        .bind(user_id)
        .bind(role)
        .fetch_one(&self.pool)
        .await?;
        Ok(found)
    }
}
