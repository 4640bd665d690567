//! PostgreSQL graph store for production use.
//!
//! ## Configuration
//!
//! All settings can be configured via environment variables:
//! - `DATABASE_URL`: PostgreSQL connection string (required)
//! - `DB_MAX_CONNECTIONS`: Maximum pool size (default: 10)
//! - `DB_MIN_CONNECTIONS`: Minimum idle connections (default: 2)
//! - `DB_CONNECT_TIMEOUT_SECS`: Connection timeout (default: 10)
//! - `DB_IDLE_TIMEOUT_SECS`: Idle connection timeout (default: 300)
//! - `DB_MAX_LIFETIME_SECS`: Max connection lifetime (default: 1800)
//!
//! ## Sessions
//!
//! A [`PostgresSession`] wraps one database transaction. Mutations take
//! `pg_advisory_xact_lock` on the repository key, so concurrent writers to the
//! same repository are serialized until commit or rollback.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{Postgres, Row, Transaction};
use std::collections::BTreeSet;
use std::time::Duration;
use uuid::Uuid;

use super::{schema, DescendantQuery, GraphSession, GraphStore, Inserted};
use crate::normalize::repository_lock_key;
use crate::query::QuerySpec;
use crate::types::{
    Edge, Link, LinkId, NodeId, NodeKind, Repository, RepositoryId, Synonyms, TimeRange,
    TimeRangePrefixFormat, Topic, TopicId,
};

/// Configuration for PostgreSQL connection pool.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// Database connection URL.
    pub database_url: String,
    /// Maximum connections in pool (default: 10).
    pub max_connections: u32,
    /// Minimum idle connections to keep warm (default: 2).
    pub min_connections: u32,
    /// Connection acquire timeout in seconds (default: 10).
    pub connect_timeout_secs: u64,
    /// Idle connection timeout in seconds (default: 300 = 5 min).
    pub idle_timeout_secs: u64,
    /// Maximum connection lifetime in seconds (default: 1800 = 30 min).
    pub max_lifetime_secs: u64,
}

impl PostgresConfig {
    /// Load configuration from environment variables with production defaults.
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgresql://localhost/digraph".to_string()),
            max_connections: crate::config::env_or("DB_MAX_CONNECTIONS", 10),
            min_connections: crate::config::env_or("DB_MIN_CONNECTIONS", 2),
            connect_timeout_secs: crate::config::env_or("DB_CONNECT_TIMEOUT_SECS", 10),
            idle_timeout_secs: crate::config::env_or("DB_IDLE_TIMEOUT_SECS", 300),
            max_lifetime_secs: crate::config::env_or("DB_MAX_LIFETIME_SECS", 1800),
        }
    }
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Pool statistics for monitoring.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PoolStats {
    /// Current pool size.
    pub size: u32,
    /// Number of idle connections.
    pub idle: usize,
    /// Maximum pool size.
    pub max: u32,
}

/// Error type for PostgreSQL store.
#[derive(Debug, thiserror::Error)]
pub enum PostgresError {
    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    /// Row to update was not found.
    #[error("Row not found: {0}")]
    RowNotFound(String),
    /// A stored value could not be decoded.
    #[error("Invalid stored value in {column}: {value}")]
    InvalidValue {
        /// Column holding the value.
        column: &'static str,
        /// The offending value.
        value: String,
    },
}

/// PostgreSQL graph store.
///
/// Uses connection pooling with production-tuned settings.
#[derive(Clone)]
pub struct PostgresGraphStore {
    pool: PgPool,
}

impl PostgresGraphStore {
    /// Create a new store with the given configuration.
    pub async fn new(config: PostgresConfig) -> Result<Self, sqlx::Error> {
        tracing::info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            connect_timeout_secs = config.connect_timeout_secs,
            idle_timeout_secs = config.idle_timeout_secs,
            max_lifetime_secs = config.max_lifetime_secs,
            "Initializing PostgreSQL connection pool"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
            .test_before_acquire(true)
            .connect(&config.database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Create a store from environment variables.
    pub async fn from_env() -> Result<Self, sqlx::Error> {
        Self::new(PostgresConfig::from_env()).await
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the connection pool for health checks.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the tables and indexes if they do not exist.
    pub async fn migrate(&self) -> Result<(), PostgresError> {
        for statement in schema::statements() {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        tracing::info!("Graph schema is up to date");
        Ok(())
    }

    /// Check if the database is reachable.
    pub async fn is_healthy(&self) -> bool {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .is_ok()
    }

    /// Get pool statistics for monitoring.
    pub fn pool_stats(&self) -> PoolStats {
        PoolStats {
            size: self.pool.size(),
            idle: self.pool.num_idle(),
            max: self.pool.options().get_max_connections(),
        }
    }
}

#[async_trait]
impl GraphStore for PostgresGraphStore {
    type Error = PostgresError;
    type Session = PostgresSession;

    async fn begin(&self) -> Result<Self::Session, Self::Error> {
        let tx = self.pool.begin().await?;
        Ok(PostgresSession { tx })
    }
}

/// Session over a single PostgreSQL transaction.
///
/// Dropping the session without calling [`GraphSession::commit`] rolls the
/// transaction back.
pub struct PostgresSession {
    tx: Transaction<'static, Postgres>,
}

const TOPIC_COLUMNS: &str = "t.id, t.repository_id, t.name, t.synonyms, t.description, t.root, \
     t.timerange_starts_at, t.timerange_ends_at, t.timerange_prefix_format, t.created_at";

const LINK_COLUMNS: &str =
    "l.id, l.repository_id, l.url, l.canonical_url, l.url_hash, l.title, l.created_at";

fn parse_topic_row(row: &PgRow) -> Result<Topic, PostgresError> {
    let id: Uuid = row.try_get("id")?;
    let repository_id: Uuid = row.try_get("repository_id")?;
    let synonyms: Json<Synonyms> = row.try_get("synonyms")?;
    let starts_at: Option<DateTime<Utc>> = row.try_get("timerange_starts_at")?;
    let ends_at: Option<DateTime<Utc>> = row.try_get("timerange_ends_at")?;
    let prefix_format: Option<String> = row.try_get("timerange_prefix_format")?;

    let timerange = match starts_at {
        Some(starts_at) => {
            let raw = prefix_format.unwrap_or_default();
            let prefix_format = TimeRangePrefixFormat::from_str(&raw).ok_or_else(|| {
                PostgresError::InvalidValue {
                    column: "timerange_prefix_format",
                    value: raw.clone(),
                }
            })?;
            Some(TimeRange::new(starts_at, ends_at, prefix_format))
        }
        None => None,
    };

    Ok(Topic {
        id: TopicId::new(id),
        repository_id: RepositoryId::new(repository_id),
        name: row.try_get("name")?,
        synonyms: synonyms.0,
        description: row.try_get("description")?,
        timerange,
        root: row.try_get("root")?,
        created_at: row.try_get("created_at")?,
    })
}

fn parse_link_row(row: &PgRow) -> Result<Link, PostgresError> {
    let id: Uuid = row.try_get("id")?;
    let repository_id: Uuid = row.try_get("repository_id")?;
    Ok(Link {
        id: LinkId::new(id),
        repository_id: RepositoryId::new(repository_id),
        url: row.try_get("url")?,
        canonical_url: row.try_get("canonical_url")?,
        url_hash: row.try_get("url_hash")?,
        title: row.try_get("title")?,
        created_at: row.try_get("created_at")?,
    })
}

fn parse_node_row(row: &PgRow) -> Result<NodeId, PostgresError> {
    let kind: String = row.try_get("kind")?;
    let id: Uuid = row.try_get("id")?;
    match NodeKind::from_str(&kind) {
        Some(NodeKind::Topic) => Ok(NodeId::Topic(TopicId::new(id))),
        Some(NodeKind::Link) => Ok(NodeId::Link(LinkId::new(id))),
        None => Err(PostgresError::InvalidValue {
            column: "kind",
            value: kind,
        }),
    }
}

/// Split nodes into topic and link uuid arrays for binding.
fn split_nodes<'a>(nodes: impl IntoIterator<Item = &'a NodeId>) -> (Vec<Uuid>, Vec<Uuid>) {
    let mut topics = Vec::new();
    let mut links = Vec::new();
    for node in nodes {
        match node {
            NodeId::Topic(id) => topics.push(id.as_uuid()),
            NodeId::Link(id) => links.push(id.as_uuid()),
        }
    }
    (topics, links)
}

fn edge_table(child: &NodeId) -> &'static str {
    match child {
        NodeId::Topic(_) => "topic_topics",
        NodeId::Link(_) => "link_topics",
    }
}

fn closure_table(child: &NodeId) -> &'static str {
    match child {
        NodeId::Topic(_) => "topic_transitive_closure",
        NodeId::Link(_) => "link_transitive_closure",
    }
}

/// `LIMIT` argument for a result cap; caps beyond `i64::MAX` saturate.
fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

impl PostgresSession {
    async fn fetch_topic_where(
        &mut self,
        predicate: &str,
        repository: RepositoryId,
        value: &str,
    ) -> Result<Option<Topic>, PostgresError> {
        let sql = format!(
            "SELECT {TOPIC_COLUMNS} FROM topics t WHERE t.repository_id = $1 AND {predicate}"
        );
        let row = sqlx::query(&sql)
            .bind(repository.as_uuid())
            .bind(value)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(parse_topic_row).transpose()
    }
}

#[async_trait]
impl GraphSession for PostgresSession {
    type Error = PostgresError;

    async fn lock_repository(&mut self, id: RepositoryId) -> Result<(), Self::Error> {
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(repository_lock_key(id))
            .execute(&mut *self.tx)
            .await?;
        tracing::trace!(repository_id = %id, "Acquired repository lock");
        Ok(())
    }

    async fn get_repository(&mut self, id: RepositoryId) -> Result<Option<Repository>, Self::Error> {
        let row = sqlx::query(
            r#"
            SELECT id, name, root_topic_id, created_at
            FROM repositories
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        match row {
            Some(r) => Ok(Some(Repository {
                id: RepositoryId::new(r.try_get("id")?),
                name: r.try_get("name")?,
                root_topic_id: TopicId::new(r.try_get("root_topic_id")?),
                created_at: r.try_get("created_at")?,
            })),
            None => Ok(None),
        }
    }

    async fn insert_repository(&mut self, repository: &Repository) -> Result<(), Self::Error> {
        sqlx::query(
            r#"
            INSERT INTO repositories (id, name, root_topic_id, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(repository.id.as_uuid())
        .bind(&repository.name)
        .bind(repository.root_topic_id.as_uuid())
        .bind(repository.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn get_topic(&mut self, id: TopicId) -> Result<Option<Topic>, Self::Error> {
        let sql = format!("SELECT {TOPIC_COLUMNS} FROM topics t WHERE t.id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(parse_topic_row).transpose()
    }

    async fn get_topics(&mut self, ids: &[TopicId]) -> Result<Vec<Topic>, Self::Error> {
        let uuids: Vec<Uuid> = ids.iter().map(|id| id.as_uuid()).collect();
        let sql = format!("SELECT {TOPIC_COLUMNS} FROM topics t WHERE t.id = ANY($1) ORDER BY t.id");
        let rows = sqlx::query(&sql)
            .bind(&uuids)
            .fetch_all(&mut *self.tx)
            .await?;
        rows.iter().map(parse_topic_row).collect()
    }

    async fn find_topic_by_name(
        &mut self,
        repository: RepositoryId,
        name: &str,
    ) -> Result<Option<Topic>, Self::Error> {
        self.fetch_topic_where("t.name = $2", repository, name).await
    }

    async fn insert_topic(&mut self, topic: &Topic) -> Result<Inserted<Topic>, Self::Error> {
        let (starts_at, ends_at, prefix_format) = match &topic.timerange {
            Some(tr) => (Some(tr.starts_at), tr.ends_at, Some(tr.prefix_format.to_string())),
            None => (None, None, None),
        };

        let inserted = sqlx::query(
            r#"
            INSERT INTO topics (
                id, repository_id, name, synonyms, description, root,
                timerange_starts_at, timerange_ends_at, timerange_prefix_format, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (repository_id, name) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(topic.id.as_uuid())
        .bind(topic.repository_id.as_uuid())
        .bind(&topic.name)
        .bind(Json(topic.synonyms.clone()))
        .bind(&topic.description)
        .bind(topic.root)
        .bind(starts_at)
        .bind(ends_at)
        .bind(prefix_format)
        .bind(topic.created_at)
        .fetch_optional(&mut *self.tx)
        .await?;

        if inserted.is_some() {
            return Ok(Inserted::Created(topic.clone()));
        }

        self.find_topic_by_name(topic.repository_id, &topic.name)
            .await?
            .map(Inserted::Existing)
            .ok_or_else(|| PostgresError::RowNotFound(format!("topic named {:?}", topic.name)))
    }

    async fn update_topic(&mut self, topic: &Topic) -> Result<(), Self::Error> {
        let (starts_at, ends_at, prefix_format) = match &topic.timerange {
            Some(tr) => (Some(tr.starts_at), tr.ends_at, Some(tr.prefix_format.to_string())),
            None => (None, None, None),
        };

        let result = sqlx::query(
            r#"
            UPDATE topics
            SET name = $2, synonyms = $3, description = $4,
                timerange_starts_at = $5, timerange_ends_at = $6, timerange_prefix_format = $7
            WHERE id = $1
            "#,
        )
        .bind(topic.id.as_uuid())
        .bind(&topic.name)
        .bind(Json(topic.synonyms.clone()))
        .bind(&topic.description)
        .bind(starts_at)
        .bind(ends_at)
        .bind(prefix_format)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(PostgresError::RowNotFound(format!("topic {}", topic.id)));
        }
        Ok(())
    }

    async fn delete_topic(&mut self, id: TopicId) -> Result<(), Self::Error> {
        sqlx::query("DELETE FROM topics WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn get_link(&mut self, id: LinkId) -> Result<Option<Link>, Self::Error> {
        let sql = format!("SELECT {LINK_COLUMNS} FROM links l WHERE l.id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(parse_link_row).transpose()
    }

    async fn get_links(&mut self, ids: &[LinkId]) -> Result<Vec<Link>, Self::Error> {
        let uuids: Vec<Uuid> = ids.iter().map(|id| id.as_uuid()).collect();
        let sql = format!("SELECT {LINK_COLUMNS} FROM links l WHERE l.id = ANY($1) ORDER BY l.id");
        let rows = sqlx::query(&sql)
            .bind(&uuids)
            .fetch_all(&mut *self.tx)
            .await?;
        rows.iter().map(parse_link_row).collect()
    }

    async fn insert_link(&mut self, link: &Link) -> Result<Inserted<Link>, Self::Error> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO links (id, repository_id, url, canonical_url, url_hash, title, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (repository_id, url_hash) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(link.id.as_uuid())
        .bind(link.repository_id.as_uuid())
        .bind(&link.url)
        .bind(&link.canonical_url)
        .bind(&link.url_hash)
        .bind(&link.title)
        .bind(link.created_at)
        .fetch_optional(&mut *self.tx)
        .await?;

        if inserted.is_some() {
            return Ok(Inserted::Created(link.clone()));
        }

        let sql = format!(
            "SELECT {LINK_COLUMNS} FROM links l WHERE l.repository_id = $1 AND l.url_hash = $2"
        );
        let row = sqlx::query(&sql)
            .bind(link.repository_id.as_uuid())
            .bind(&link.url_hash)
            .fetch_optional(&mut *self.tx)
            .await?;

        match row {
            Some(r) => Ok(Inserted::Existing(parse_link_row(&r)?)),
            None => Err(PostgresError::RowNotFound(format!("link {}", link.url_hash))),
        }
    }

    async fn update_link(&mut self, link: &Link) -> Result<(), Self::Error> {
        let result = sqlx::query("UPDATE links SET title = $2 WHERE id = $1")
            .bind(link.id.as_uuid())
            .bind(&link.title)
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(PostgresError::RowNotFound(format!("link {}", link.id)));
        }
        Ok(())
    }

    async fn delete_link(&mut self, id: LinkId) -> Result<(), Self::Error> {
        sqlx::query("DELETE FROM links WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn insert_edge(&mut self, edge: Edge) -> Result<bool, Self::Error> {
        let sql = format!(
            "INSERT INTO {} (parent_id, child_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            edge_table(&edge.child)
        );
        let result = sqlx::query(&sql)
            .bind(edge.parent.as_uuid())
            .bind(edge.child.as_uuid())
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_edge(&mut self, edge: Edge) -> Result<bool, Self::Error> {
        let sql = format!(
            "DELETE FROM {} WHERE parent_id = $1 AND child_id = $2",
            edge_table(&edge.child)
        );
        let result = sqlx::query(&sql)
            .bind(edge.parent.as_uuid())
            .bind(edge.child.as_uuid())
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn parent_topics(&mut self, node: NodeId) -> Result<Vec<TopicId>, Self::Error> {
        let sql = format!(
            "SELECT parent_id FROM {} WHERE child_id = $1 ORDER BY parent_id",
            edge_table(&node)
        );
        let rows = sqlx::query(&sql)
            .bind(node.as_uuid())
            .fetch_all(&mut *self.tx)
            .await?;

        rows.iter()
            .map(|row| -> Result<TopicId, PostgresError> {
                Ok(TopicId::new(row.try_get("parent_id")?))
            })
            .collect()
    }

    async fn child_nodes(&mut self, topic: TopicId) -> Result<Vec<NodeId>, Self::Error> {
        let rows = sqlx::query(
            r#"
            SELECT 'topic' AS kind, child_id AS id FROM topic_topics WHERE parent_id = $1
            UNION ALL
            SELECT 'link' AS kind, child_id AS id FROM link_topics WHERE parent_id = $1
            ORDER BY kind DESC, id
            "#,
        )
        .bind(topic.as_uuid())
        .fetch_all(&mut *self.tx)
        .await?;

        rows.iter().map(parse_node_row).collect()
    }

    async fn reachable_from(&mut self, topic: TopicId) -> Result<BTreeSet<NodeId>, Self::Error> {
        // UNION (not UNION ALL) terminates the recursion on revisits.
        let rows = sqlx::query(
            r#"
            WITH RECURSIVE down(id) AS (
                SELECT child_id FROM topic_topics WHERE parent_id = $1
                UNION
                SELECT tt.child_id FROM topic_topics tt JOIN down d ON tt.parent_id = d.id
            )
            SELECT 'topic' AS kind, id FROM down WHERE id <> $1
            UNION
            SELECT 'link' AS kind, lt.child_id AS id
            FROM link_topics lt
            WHERE lt.parent_id = $1 OR lt.parent_id IN (SELECT id FROM down)
            "#,
        )
        .bind(topic.as_uuid())
        .fetch_all(&mut *self.tx)
        .await?;

        rows.iter().map(parse_node_row).collect()
    }

    async fn descendants(&mut self, topic: TopicId) -> Result<BTreeSet<NodeId>, Self::Error> {
        let rows = sqlx::query(
            r#"
            SELECT 'topic' AS kind, child_id AS id FROM topic_transitive_closure WHERE parent_id = $1
            UNION ALL
            SELECT 'link' AS kind, child_id AS id FROM link_transitive_closure WHERE parent_id = $1
            "#,
        )
        .bind(topic.as_uuid())
        .fetch_all(&mut *self.tx)
        .await?;

        rows.iter().map(parse_node_row).collect()
    }

    async fn ancestors(&mut self, node: NodeId) -> Result<BTreeSet<TopicId>, Self::Error> {
        let sql = format!(
            "SELECT parent_id FROM {} WHERE child_id = $1",
            closure_table(&node)
        );
        let rows = sqlx::query(&sql)
            .bind(node.as_uuid())
            .fetch_all(&mut *self.tx)
            .await?;

        rows.iter()
            .map(|row| -> Result<TopicId, PostgresError> {
                Ok(TopicId::new(row.try_get("parent_id")?))
            })
            .collect()
    }

    async fn replace_descendants(
        &mut self,
        ancestor: TopicId,
        descendants: &BTreeSet<NodeId>,
    ) -> Result<(), Self::Error> {
        let (topics, links) = split_nodes(descendants);

        for table in ["topic_transitive_closure", "link_transitive_closure"] {
            let sql = format!("DELETE FROM {table} WHERE parent_id = $1");
            sqlx::query(&sql)
                .bind(ancestor.as_uuid())
                .execute(&mut *self.tx)
                .await?;
        }

        for (table, ids) in [
            ("topic_transitive_closure", &topics),
            ("link_transitive_closure", &links),
        ] {
            if ids.is_empty() {
                continue;
            }
            let sql = format!(
                "INSERT INTO {table} (parent_id, child_id) SELECT $1, UNNEST($2::uuid[])"
            );
            sqlx::query(&sql)
                .bind(ancestor.as_uuid())
                .bind(ids)
                .execute(&mut *self.tx)
                .await?;
        }

        tracing::trace!(
            ancestor = %ancestor,
            topics = topics.len(),
            links = links.len(),
            "Replaced closure rows"
        );
        Ok(())
    }

    async fn purge_closure(&mut self, node: NodeId) -> Result<(), Self::Error> {
        match node {
            NodeId::Topic(id) => {
                sqlx::query(
                    "DELETE FROM topic_transitive_closure WHERE parent_id = $1 OR child_id = $1",
                )
                .bind(id.as_uuid())
                .execute(&mut *self.tx)
                .await?;
                sqlx::query("DELETE FROM link_transitive_closure WHERE parent_id = $1")
                    .bind(id.as_uuid())
                    .execute(&mut *self.tx)
                    .await?;
            }
            NodeId::Link(id) => {
                sqlx::query("DELETE FROM link_transitive_closure WHERE child_id = $1")
                    .bind(id.as_uuid())
                    .execute(&mut *self.tx)
                    .await?;
            }
        }
        Ok(())
    }

    async fn search_topics(&mut self, query: &DescendantQuery) -> Result<Vec<Topic>, Self::Error> {
        let refs: Vec<Uuid> = query.spec.topic_ids().iter().map(|id| id.as_uuid()).collect();
        let sql = format!(
            r#"
            SELECT {TOPIC_COLUMNS}
            FROM topics t
            WHERE (t.id = $1 OR t.id IN (
                SELECT child_id FROM topic_transitive_closure WHERE parent_id = $1
            ))
            AND NOT EXISTS (
                SELECT 1 FROM UNNEST($2::uuid[]) AS r(id)
                WHERE r.id <> t.id AND NOT EXISTS (
                    SELECT 1 FROM topic_transitive_closure c
                    WHERE c.parent_id = r.id AND c.child_id = t.id
                )
            )
            AND NOT EXISTS (
                SELECT 1 FROM UNNEST($3::text[]) AS p(pattern)
                WHERE t.name NOT ILIKE p.pattern ESCAPE '\'
            )
            ORDER BY t.name, t.id
            LIMIT $4
            "#
        );

        let rows = sqlx::query(&sql)
            .bind(query.root.as_uuid())
            .bind(&refs)
            .bind(query.spec.wildcard_tokens())
            .bind(sql_limit(query.limit))
            .fetch_all(&mut *self.tx)
            .await?;

        rows.iter().map(parse_topic_row).collect()
    }

    async fn search_links(&mut self, query: &DescendantQuery) -> Result<Vec<Link>, Self::Error> {
        let refs: Vec<Uuid> = query.spec.topic_ids().iter().map(|id| id.as_uuid()).collect();
        let sql = format!(
            r#"
            SELECT {LINK_COLUMNS}
            FROM links l
            WHERE l.id IN (
                SELECT child_id FROM link_transitive_closure WHERE parent_id = $1
            )
            AND NOT EXISTS (
                SELECT 1 FROM UNNEST($2::uuid[]) AS r(id)
                WHERE NOT EXISTS (
                    SELECT 1 FROM link_transitive_closure c
                    WHERE c.parent_id = r.id AND c.child_id = l.id
                )
            )
            AND NOT EXISTS (
                SELECT 1 FROM UNNEST($3::text[]) AS p(pattern)
                WHERE NOT (
                    l.title ILIKE p.pattern ESCAPE '\'
                    OR l.url ILIKE p.pattern ESCAPE '\'
                    OR l.canonical_url ILIKE p.pattern ESCAPE '\'
                )
            )
            ORDER BY l.created_at DESC, l.id
            LIMIT $4
            "#
        );

        let rows = sqlx::query(&sql)
            .bind(query.root.as_uuid())
            .bind(&refs)
            .bind(query.spec.wildcard_tokens())
            .bind(sql_limit(query.limit))
            .fetch_all(&mut *self.tx)
            .await?;

        rows.iter().map(parse_link_row).collect()
    }

    async fn match_topics(
        &mut self,
        repository: RepositoryId,
        spec: &QuerySpec,
        limit: usize,
    ) -> Result<Vec<Topic>, Self::Error> {
        let Some(ts_query) = spec.full_text_query() else {
            return Ok(Vec::new());
        };

        let sql = format!(
            r#"
            SELECT {TOPIC_COLUMNS}
            FROM topics t
            WHERE t.repository_id = $1
            AND to_tsvector('simple', t.name) @@ to_tsquery('simple', $2)
            ORDER BY t.name, t.id
            LIMIT $3
            "#
        );

        let rows = sqlx::query(&sql)
            .bind(repository.as_uuid())
            .bind(ts_query)
            .bind(sql_limit(limit))
            .fetch_all(&mut *self.tx)
            .await?;

        rows.iter().map(parse_topic_row).collect()
    }

    async fn commit(self) -> Result<(), Self::Error> {
        self.tx.commit().await?;
        Ok(())
    }
}
