//! SQL schema for the PostgreSQL graph store.
//!
//! Closure rows carry `(parent_id, child_id)` only and never contain
//! self-pairs.

/// Repositories and their root topic.
pub const REPOSITORIES_TABLE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS repositories (
    id UUID PRIMARY KEY,
    name TEXT NOT NULL,
    root_topic_id UUID NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

/// Topics. The name is unique within a repository.
pub const TOPICS_TABLE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS topics (
    id UUID PRIMARY KEY,
    repository_id UUID NOT NULL REFERENCES repositories(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    synonyms JSONB NOT NULL DEFAULT '[]'::jsonb,
    description TEXT,
    root BOOLEAN NOT NULL DEFAULT FALSE,
    timerange_starts_at TIMESTAMPTZ,
    timerange_ends_at TIMESTAMPTZ,
    timerange_prefix_format TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),

    CONSTRAINT topics_repository_name_key UNIQUE (repository_id, name),
    CONSTRAINT topics_prefix_format_check CHECK (
        timerange_prefix_format IS NULL
        OR timerange_prefix_format IN ('NONE', 'START_YEAR', 'START_YEAR_MONTH')
    )
)
"#;

/// Links. Deduplicated on the hash of the canonical URL.
pub const LINKS_TABLE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS links (
    id UUID PRIMARY KEY,
    repository_id UUID NOT NULL REFERENCES repositories(id) ON DELETE CASCADE,
    url TEXT NOT NULL,
    canonical_url TEXT NOT NULL,
    url_hash TEXT NOT NULL,
    title TEXT NOT NULL DEFAULT '',
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),

    CONSTRAINT links_repository_hash_key UNIQUE (repository_id, url_hash)
)
"#;

/// Direct topic -> topic edges.
pub const TOPIC_TOPICS_TABLE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS topic_topics (
    parent_id UUID NOT NULL REFERENCES topics(id) ON DELETE CASCADE,
    child_id UUID NOT NULL REFERENCES topics(id) ON DELETE CASCADE,
    PRIMARY KEY (parent_id, child_id)
)
"#;

/// Direct topic -> link edges.
pub const LINK_TOPICS_TABLE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS link_topics (
    parent_id UUID NOT NULL REFERENCES topics(id) ON DELETE CASCADE,
    child_id UUID NOT NULL REFERENCES links(id) ON DELETE CASCADE,
    PRIMARY KEY (parent_id, child_id)
)
"#;

/// Topic -> topic reachability.
pub const TOPIC_CLOSURE_TABLE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS topic_transitive_closure (
    parent_id UUID NOT NULL REFERENCES topics(id) ON DELETE CASCADE,
    child_id UUID NOT NULL REFERENCES topics(id) ON DELETE CASCADE,
    PRIMARY KEY (parent_id, child_id),
    CONSTRAINT topic_closure_no_self_pair CHECK (parent_id <> child_id)
)
"#;

/// Topic -> link reachability.
pub const LINK_CLOSURE_TABLE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS link_transitive_closure (
    parent_id UUID NOT NULL REFERENCES topics(id) ON DELETE CASCADE,
    child_id UUID NOT NULL REFERENCES links(id) ON DELETE CASCADE,
    PRIMARY KEY (parent_id, child_id)
)
"#;

/// Secondary indexes.
pub const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_topic_topics_child ON topic_topics(child_id)",
    "CREATE INDEX IF NOT EXISTS idx_link_topics_child ON link_topics(child_id)",
    "CREATE INDEX IF NOT EXISTS idx_topic_closure_child ON topic_transitive_closure(child_id)",
    "CREATE INDEX IF NOT EXISTS idx_link_closure_child ON link_transitive_closure(child_id)",
    "CREATE INDEX IF NOT EXISTS idx_topics_name_fts ON topics USING GIN (to_tsvector('simple', name))",
];

/// Every statement needed to create the schema, in dependency order.
pub fn statements() -> Vec<&'static str> {
    let mut all = vec![
        REPOSITORIES_TABLE_SCHEMA,
        TOPICS_TABLE_SCHEMA,
        LINKS_TABLE_SCHEMA,
        TOPIC_TOPICS_TABLE_SCHEMA,
        LINK_TOPICS_TABLE_SCHEMA,
        TOPIC_CLOSURE_TABLE_SCHEMA,
        LINK_CLOSURE_TABLE_SCHEMA,
    ];
    all.extend_from_slice(INDEXES);
    all
}
