//! Tenant configuration store
//!
//! Every application (tenant) declares the graph schema its knowledge graph
//! may use: the entity labels, relation labels, and the direction rule for
//! each relation. The pipeline fetches this whitelist fresh on every request
//! and never lets a generated label outside of it reach a query.

use std::collections::BTreeMap;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use crate::config::StoreConfig;
use crate::error::{Error, Result};

/// Direction rule for a relation: which entity label it points from and to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationRule {
    pub from: String,
    pub to: String,
}

/// The per-application whitelist of graph labels and relation rules
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantSchema {
    pub entities_allowed: Vec<String>,
    pub relations_allowed: Vec<String>,
    pub relation_rules: BTreeMap<String, RelationRule>,
}

impl TenantSchema {
    /// Check structural validity: the declared arrays must be non-empty and
    /// every rule must reference declared labels.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.entities_allowed.is_empty() {
            return Err("entities_allowed is empty".to_string());
        }
        if self.relations_allowed.is_empty() {
            return Err("relations_allowed is empty".to_string());
        }
        for (relation, rule) in &self.relation_rules {
            if !self.relations_allowed.iter().any(|r| r == relation) {
                return Err(format!(
                    "relation_rules references undeclared relation '{}'",
                    relation
                ));
            }
            if !self.entities_allowed.iter().any(|e| e == &rule.from) {
                return Err(format!(
                    "rule for '{}' references undeclared entity '{}'",
                    relation, rule.from
                ));
            }
            if !self.entities_allowed.iter().any(|e| e == &rule.to) {
                return Err(format!(
                    "rule for '{}' references undeclared entity '{}'",
                    relation, rule.to
                ));
            }
        }
        Ok(())
    }

    pub fn allows_entity(&self, label: &str) -> bool {
        self.entities_allowed.iter().any(|e| e == label)
    }

    pub fn allows_relation(&self, label: &str) -> bool {
        self.relations_allowed.iter().any(|r| r == label)
    }
}

/// A registered tenant configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantRecord {
    pub id: String,
    pub app_name: String,
    pub description: String,
    #[serde(flatten)]
    pub schema: TenantSchema,
    pub created_at: DateTime<Utc>,
}

impl TenantRecord {
    /// Validate a registration request before insertion
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::InvalidInput("id must not be empty".to_string()));
        }
        if self.app_name.trim().is_empty() {
            return Err(Error::InvalidInput("app_name must not be empty".to_string()));
        }
        if self.description.trim().is_empty() {
            return Err(Error::InvalidInput(
                "description must not be empty".to_string(),
            ));
        }
        self.schema
            .validate()
            .map_err(|msg| Error::InvalidInput(msg))?;
        Ok(())
    }
}

/// Registration request envelope, as received from the outside
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub id: String,
    pub app_name: String,
    pub description: String,
    pub entities_allowed: Vec<String>,
    pub relations_allowed: Vec<String>,
    pub relation_rules: BTreeMap<String, RelationRule>,
}

impl RegisterRequest {
    /// Stamp the request into a storable record
    pub fn into_record(self) -> TenantRecord {
        TenantRecord {
            id: self.id,
            app_name: self.app_name,
            description: self.description,
            schema: TenantSchema {
                entities_allowed: self.entities_allowed,
                relations_allowed: self.relations_allowed,
                relation_rules: self.relation_rules,
            },
            created_at: Utc::now(),
        }
    }
}

/// Read/write access to tenant configurations
#[async_trait]
pub trait TenantConfigStore: Send + Sync {
    /// Fetch the schema for an application, or None if unregistered
    async fn get(&self, app_id: &str) -> Result<Option<TenantSchema>>;

    /// Register a tenant configuration (insert or replace)
    async fn put(&self, record: &TenantRecord) -> Result<()>;

    /// List all registered tenant records
    async fn list(&self) -> Result<Vec<TenantRecord>>;
}

/// SQLite-backed tenant configuration store
pub struct SqliteTenantStore {
    pool: SqlitePool,
}

impl SqliteTenantStore {
    /// Open (or create) the store at the configured path
    pub async fn open(config: &StoreConfig) -> Result<Self> {
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", config.path.display()))
            .map_err(Error::DatabaseError)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Open an in-memory store (useful for testing)
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(Error::DatabaseError)?;

        // In-memory databases vanish per-connection, so keep exactly one
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS tenant_configs (
                id TEXT PRIMARY KEY,
                app_name TEXT NOT NULL,
                description TEXT NOT NULL,
                entities_allowed TEXT NOT NULL,
                relations_allowed TEXT NOT NULL,
                relation_rules TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn schema_from_row(app_id: &str, row: &sqlx::sqlite::SqliteRow) -> Result<TenantSchema> {
        let entities: String = row.get("entities_allowed");
        let relations: String = row.get("relations_allowed");
        let rules: String = row.get("relation_rules");

        let entities_allowed: Vec<String> = serde_json::from_str(&entities).map_err(|e| {
            Error::InvalidConfig(app_id.to_string(), format!("entities_allowed: {}", e))
        })?;
        let relations_allowed: Vec<String> = serde_json::from_str(&relations).map_err(|e| {
            Error::InvalidConfig(app_id.to_string(), format!("relations_allowed: {}", e))
        })?;
        let relation_rules: BTreeMap<String, RelationRule> = serde_json::from_str(&rules)
            .map_err(|e| {
                Error::InvalidConfig(app_id.to_string(), format!("relation_rules: {}", e))
            })?;

        let schema = TenantSchema {
            entities_allowed,
            relations_allowed,
            relation_rules,
        };

        schema
            .validate()
            .map_err(|msg| Error::InvalidConfig(app_id.to_string(), msg))?;

        Ok(schema)
    }
}

#[async_trait]
impl TenantConfigStore for SqliteTenantStore {
    async fn get(&self, app_id: &str) -> Result<Option<TenantSchema>> {
        debug!(app_id = %app_id, "Fetching tenant configuration");

        let row = sqlx::query("SELECT * FROM tenant_configs WHERE id = ?")
            .bind(app_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(Self::schema_from_row(app_id, &row)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, record: &TenantRecord) -> Result<()> {
        record.validate()?;

        sqlx::query(
            "INSERT OR REPLACE INTO tenant_configs
             (id, app_name, description, entities_allowed, relations_allowed, relation_rules, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(&record.app_name)
        .bind(&record.description)
        .bind(serde_json::to_string(&record.schema.entities_allowed).unwrap_or_default())
        .bind(serde_json::to_string(&record.schema.relations_allowed).unwrap_or_default())
        .bind(serde_json::to_string(&record.schema.relation_rules).unwrap_or_default())
        .bind(record.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        info!(app_id = %record.id, app_name = %record.app_name, "Tenant configuration registered");
        Ok(())
    }

    async fn list(&self) -> Result<Vec<TenantRecord>> {
        let rows = sqlx::query("SELECT * FROM tenant_configs ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row.get("id");
            let schema = Self::schema_from_row(&id, &row)?;
            let raw_created_at: String = row.get("created_at");
            let created_at = DateTime::parse_from_rfc3339(&raw_created_at)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| Error::InvalidConfig(id.clone(), format!("created_at: {}", e)))?;
            records.push(TenantRecord {
                id,
                app_name: row.get("app_name"),
                description: row.get("description"),
                schema,
                created_at,
            });
        }
        Ok(records)
    }
}
