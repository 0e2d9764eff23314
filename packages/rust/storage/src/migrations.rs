//! SQL migration definitions for the dredger database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: links",
            sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Bookmarked links
CREATE TABLE IF NOT EXISTS links (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    url         TEXT NOT NULL UNIQUE,
    title       TEXT NOT NULL DEFAULT '',
    description TEXT NOT NULL DEFAULT '',
    tags_json   TEXT NOT NULL DEFAULT '[]',
    status      INTEGER NOT NULL DEFAULT 0,
    date_added  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_links_status ON links(status);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Dredge pipeline columns: enriched, dredge_state, dredge_error, summary",
            sql: r#"
ALTER TABLE links ADD COLUMN enriched INTEGER NOT NULL DEFAULT 0;
ALTER TABLE links ADD COLUMN dredge_state INTEGER NOT NULL DEFAULT 0;
ALTER TABLE links ADD COLUMN dredge_error TEXT NOT NULL DEFAULT '';
ALTER TABLE links ADD COLUMN summary TEXT NOT NULL DEFAULT '';

CREATE INDEX IF NOT EXISTS idx_links_enriched ON links(enriched);
CREATE INDEX IF NOT EXISTS idx_links_dredge_state ON links(dredge_state);

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
    ]
}

/// Highest version known to this build.
pub(crate) fn latest_version() -> u32 {
    all_migrations().last().map(|m| m.version).unwrap_or(0)
}
