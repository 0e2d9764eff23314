//! libSQL storage layer for bookmarked links.
//!
//! The [`Storage`] struct wraps a local libSQL database holding the `links`
//! table: triage status, scraped metadata, and enrichment-pipeline progress.
//!
//! **Guarded writes:** the two pipeline write paths,
//! [`Storage::update_dredge_state`] and [`Storage::update_dredge_result`], are
//! single statements conditioned on `status != pruned`. A link pruned while a
//! crawl for it is in flight is never touched by that crawl. Both return
//! whether a row was actually changed.

mod migrations;

use std::path::Path;

use chrono::{DateTime, Utc};
use dredger_shared::{DredgeState, DredgerError, Link, LinkId, LinkStats, LinkStatus, Result};
use libsql::{Connection, Database, params};

/// Columns selected for every [`Link`] read, in [`row_to_link`] order.
const LINK_COLUMNS: &str = "id, url, title, description, summary, tags_json, status, enriched, \
                            dredge_state, dredge_error, date_added";

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

/// Fields for a link that does not exist yet.
#[derive(Debug, Clone, Default)]
pub struct NewLink {
    pub url: String,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub status: LinkStatus,
}

impl NewLink {
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }
}

fn db_err(e: libsql::Error) -> DredgerError {
    DredgerError::Storage(e.to_string())
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DredgerError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(db_err)?;
        let conn = db.connect().map_err(db_err)?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open a database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(db_err)?;
        let conn = db.connect().map_err(db_err)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        DredgerError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => match rows.next().await {
                Ok(Some(row)) => row.get::<u32>(0).unwrap_or(0),
                _ => 0,
            },
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(DredgerError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Link CRUD
    // -----------------------------------------------------------------------

    /// Insert a single link. Fails if the URL is already stored.
    pub async fn insert_link(&self, link: &NewLink) -> Result<LinkId> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        let mut rows = self
            .conn
            .query(
                "INSERT INTO links (url, title, description, tags_json, status, date_added)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 RETURNING id",
                params![
                    link.url.as_str(),
                    link.title.as_str(),
                    link.description.as_str(),
                    tags_to_json(&link.tags)?,
                    link.status.code(),
                    now.as_str(),
                ],
            )
            .await
            .map_err(|e| DredgerError::Storage(format!("insert link {}: {e}", link.url)))?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(LinkId(row.get::<i64>(0).map_err(db_err)?)),
            None => Err(DredgerError::Storage(format!(
                "insert link {}: no id returned",
                link.url
            ))),
        }
    }

    /// Insert many URLs in one transaction, skipping ones already stored.
    /// Returns `(inserted, skipped)`.
    pub async fn insert_urls(&self, urls: &[String]) -> Result<(usize, usize)> {
        self.check_writable()?;
        let tx = self.conn.transaction().await.map_err(db_err)?;
        let now = Utc::now().to_rfc3339();

        let mut inserted = 0;
        let mut skipped = 0;
        for url in urls {
            let changed = tx
                .execute(
                    "INSERT INTO links (url, date_added) VALUES (?1, ?2)
                     ON CONFLICT(url) DO NOTHING",
                    params![url.as_str(), now.as_str()],
                )
                .await
                .map_err(|e| DredgerError::Storage(format!("insert url {url}: {e}")))?;
            if changed > 0 {
                inserted += 1;
            } else {
                skipped += 1;
            }
        }

        tx.commit().await.map_err(db_err)?;
        Ok((inserted, skipped))
    }

    /// Get a link by ID.
    pub async fn get_link(&self, id: LinkId) -> Result<Option<Link>> {
        let sql = format!("SELECT {LINK_COLUMNS} FROM links WHERE id = ?1");
        let mut rows = self
            .conn
            .query(&sql, params![id.0])
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(Some(row_to_link(&row)?)),
            None => Ok(None),
        }
    }

    /// List all links, newest first.
    pub async fn list_links(&self) -> Result<Vec<Link>> {
        let sql = format!("SELECT {LINK_COLUMNS} FROM links ORDER BY date_added DESC, id DESC");
        self.query_links(&sql, params![]).await
    }

    /// List links with the given triage status, newest first.
    pub async fn list_links_by_status(&self, status: LinkStatus) -> Result<Vec<Link>> {
        let sql = format!(
            "SELECT {LINK_COLUMNS} FROM links WHERE status = ?1 ORDER BY date_added DESC, id DESC"
        );
        self.query_links(&sql, params![status.code()]).await
    }

    /// Links the pipeline has not enriched yet, oldest first. Pruned links are
    /// excluded. `None` means no limit.
    pub async fn list_unenriched_links(&self, limit: Option<u32>) -> Result<Vec<Link>> {
        let sql = format!(
            "SELECT {LINK_COLUMNS} FROM links
             WHERE enriched = 0 AND status != ?1
             ORDER BY date_added ASC, id ASC
             LIMIT ?2"
        );
        let limit = limit.map(i64::from).unwrap_or(-1);
        self.query_links(&sql, params![LinkStatus::Pruned.code(), limit])
            .await
    }

    async fn query_links(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<Link>> {
        let mut rows = self.conn.query(sql, params).await.map_err(db_err)?;

        let mut links = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            links.push(row_to_link(&row)?);
        }
        Ok(links)
    }

    /// Record the user's triage decision. Returns `false` if the link does not exist.
    pub async fn set_status(&self, id: LinkId, status: LinkStatus) -> Result<bool> {
        self.check_writable()?;
        let changed = self
            .conn
            .execute(
                "UPDATE links SET status = ?1 WHERE id = ?2",
                params![status.code(), id.0],
            )
            .await
            .map_err(db_err)?;
        Ok(changed > 0)
    }

    /// Overwrite every mutable field of a link.
    pub async fn update_link(&self, link: &Link) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "UPDATE links SET url = ?1, title = ?2, description = ?3, summary = ?4,
                   tags_json = ?5, status = ?6, enriched = ?7, dredge_state = ?8,
                   dredge_error = ?9, date_added = ?10
                 WHERE id = ?11",
                params![
                    link.url.as_str(),
                    link.title.as_str(),
                    link.description.as_str(),
                    link.summary.as_str(),
                    tags_to_json(&link.tags)?,
                    link.status.code(),
                    i64::from(link.enriched),
                    link.dredge_state.code(),
                    link.dredge_error.as_str(),
                    link.date_added.to_rfc3339(),
                    link.id.0,
                ],
            )
            .await
            .map_err(|e| DredgerError::Storage(format!("update link {}: {e}", link.id)))?;
        Ok(())
    }

    /// Delete a link. Returns `false` if it did not exist.
    pub async fn delete_link(&self, id: LinkId) -> Result<bool> {
        self.check_writable()?;
        let changed = self
            .conn
            .execute("DELETE FROM links WHERE id = ?1", params![id.0])
            .await
            .map_err(db_err)?;
        Ok(changed > 0)
    }

    // -----------------------------------------------------------------------
    // Guarded pipeline writes
    // -----------------------------------------------------------------------

    /// Set the dredge state and error message of a link, unless it is pruned.
    pub async fn update_dredge_state(
        &self,
        id: LinkId,
        state: DredgeState,
        dredge_error: &str,
    ) -> Result<bool> {
        self.check_writable()?;
        let changed = self
            .conn
            .execute(
                "UPDATE links SET dredge_state = ?1, dredge_error = ?2
                 WHERE id = ?3 AND status != ?4",
                params![state.code(), dredge_error, id.0, LinkStatus::Pruned.code()],
            )
            .await
            .map_err(|e| DredgerError::Storage(format!("update dredge state: {e}")))?;
        Ok(changed > 0)
    }

    /// Store crawl/summary output, mark the link enriched and `complete`, and
    /// clear any previous dredge error, unless the link is pruned.
    pub async fn update_dredge_result(
        &self,
        id: LinkId,
        title: &str,
        description: &str,
        summary: &str,
        tags: &[String],
    ) -> Result<bool> {
        self.check_writable()?;
        let changed = self
            .conn
            .execute(
                "UPDATE links SET title = ?1, description = ?2, summary = ?3, tags_json = ?4,
                   enriched = 1, dredge_state = ?5, dredge_error = ''
                 WHERE id = ?6 AND status != ?7",
                params![
                    title,
                    description,
                    summary,
                    tags_to_json(tags)?,
                    DredgeState::Complete.code(),
                    id.0,
                    LinkStatus::Pruned.code(),
                ],
            )
            .await
            .map_err(|e| DredgerError::Storage(format!("update dredge result: {e}")))?;
        Ok(changed > 0)
    }

    // -----------------------------------------------------------------------
    // Maintenance
    // -----------------------------------------------------------------------

    /// Count links per triage status.
    pub async fn count_links_by_status(&self) -> Result<LinkStats> {
        let mut rows = self
            .conn
            .query("SELECT status, COUNT(*) FROM links GROUP BY status", params![])
            .await
            .map_err(db_err)?;

        let mut stats = LinkStats::default();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            let status = LinkStatus::from_code(row.get::<i64>(0).map_err(db_err)?)?;
            let count = row.get::<i64>(1).map_err(db_err)? as usize;
            match status {
                LinkStatus::Unprocessed => stats.unprocessed = count,
                LinkStatus::Saved => stats.saved = count,
                LinkStatus::Pruned => stats.pruned = count,
            }
            stats.total += count;
        }
        Ok(stats)
    }

    /// Permanently remove all pruned links. Returns the number removed.
    pub async fn delete_pruned_links(&self) -> Result<u64> {
        self.check_writable()?;
        self.conn
            .execute(
                "DELETE FROM links WHERE status = ?1",
                params![LinkStatus::Pruned.code()],
            )
            .await
            .map_err(|e| DredgerError::Storage(format!("delete pruned links: {e}")))
    }

    /// Remove every link. Returns the number removed.
    pub async fn delete_all_links(&self) -> Result<u64> {
        self.check_writable()?;
        self.conn
            .execute("DELETE FROM links", params![])
            .await
            .map_err(|e| DredgerError::Storage(format!("delete all links: {e}")))
    }
}

fn tags_to_json(tags: &[String]) -> Result<String> {
    serde_json::to_string(tags).map_err(|e| DredgerError::Storage(format!("encode tags: {e}")))
}

/// Convert a database row (selected with [`LINK_COLUMNS`]) to a [`Link`].
fn row_to_link(row: &libsql::Row) -> Result<Link> {
    let tags_json: String = row.get(5).map_err(db_err)?;
    let date_added: String = row.get(10).map_err(db_err)?;

    Ok(Link {
        id: LinkId(row.get::<i64>(0).map_err(db_err)?),
        url: row.get::<String>(1).map_err(db_err)?,
        title: row.get::<String>(2).map_err(db_err)?,
        description: row.get::<String>(3).map_err(db_err)?,
        summary: row.get::<String>(4).map_err(db_err)?,
        tags: serde_json::from_str(&tags_json)
            .map_err(|e| DredgerError::Storage(format!("invalid tags_json: {e}")))?,
        status: LinkStatus::from_code(row.get::<i64>(6).map_err(db_err)?)?,
        enriched: row.get::<i64>(7).map_err(db_err)? != 0,
        dredge_state: DredgeState::from_code(row.get::<i64>(8).map_err(db_err)?)?,
        dredge_error: row.get::<String>(9).map_err(db_err)?,
        date_added: DateTime::parse_from_rfc3339(&date_added)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| DredgerError::Storage(format!("invalid date: {e}")))?,
    })
}
