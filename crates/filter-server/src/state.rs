use std::{
    path::Path,
    sync::{Mutex, MutexGuard, PoisonError},
};

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use regex::Regex;
use rusqlite::{ErrorCode, params};
use tracing::{info, warn};

use crate::{
    error::FilterError,
    matcher::FilterLists,
    types::{Filter, FilterMode, GalleryInfo, ImportReport, NewFilter},
};

const DB_FILE_NAME: &str = "filters.db";

/// Filters mirrored between the `filters` table and six in-memory lists.
///
/// One mutex guards the lists and is held across every table write, so a
/// reader never sees a list that disagrees with the table.
pub struct FilterStore {
    pool: Pool<SqliteConnectionManager>,
    lists: Mutex<FilterLists>,
}

impl FilterStore {
    pub fn open(data_dir: &Path) -> Result<Self, FilterError> {
        if let Err(e) = std::fs::create_dir_all(data_dir) {
            warn!("[Filter] Failed to create {}: {e}", data_dir.display());
        }
        let manager = SqliteConnectionManager::file(data_dir.join(DB_FILE_NAME))
            .with_init(|c| c.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;"));
        let pool = Pool::builder().max_size(4).build(manager)?;
        Self::from_pool(pool)
    }

    pub fn from_pool(pool: Pool<SqliteConnectionManager>) -> Result<Self, FilterError> {
        let conn = pool.get()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS filters (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                mode INTEGER NOT NULL,
                text TEXT NOT NULL,
                enabled INTEGER NOT NULL DEFAULT 1,
                UNIQUE(text, mode)
            );",
        )?;

        let mut lists = FilterLists::default();
        let mut stmt = conn.prepare("SELECT id, mode, text, enabled FROM filters ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, bool>(3)?,
            ))
        })?;

        let mut loaded = 0usize;
        for row in rows {
            let (id, code, text, enabled) = row?;
            let Some(mode) = FilterMode::from_code(code) else {
                warn!("[Filter] Unknown mode {code} for filter {id}, skipping.");
                continue;
            };
            lists.memorize(Filter {
                id,
                mode,
                text: mode.normalize(&text),
                enabled,
            });
            loaded += 1;
        }
        drop(stmt);
        drop(conn);

        info!("[Filter] Loaded {loaded} filters.");
        Ok(Self {
            pool,
            lists: Mutex::new(lists),
        })
    }

    fn lock(&self) -> MutexGuard<'_, FilterLists> {
        self.lists.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores a new, enabled filter.
    pub fn add(&self, mode: FilterMode, text: &str) -> Result<Filter, FilterError> {
        let mut lists = self.lock();
        self.insert(&mut lists, mode, text, true)
    }

    fn insert(
        &self,
        lists: &mut FilterLists,
        mode: FilterMode,
        text: &str,
        enabled: bool,
    ) -> Result<Filter, FilterError> {
        let text = mode.normalize(text);
        if text.trim().is_empty() {
            return Err(FilterError::EmptyText);
        }
        if mode == FilterMode::Comment {
            Regex::new(&text).map_err(|source| FilterError::InvalidPattern {
                pattern: text.clone(),
                source,
            })?;
        }
        if lists.contains(mode, &text) {
            return Err(FilterError::Duplicate { mode, text });
        }

        let conn = self.pool.get()?;
        let inserted = conn.execute(
            "INSERT INTO filters (mode, text, enabled) VALUES (?1, ?2, ?3)",
            params![mode.code(), text, enabled],
        );
        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                return Err(FilterError::Duplicate { mode, text });
            }
            Err(e) => return Err(e.into()),
        }

        let filter = Filter {
            id: conn.last_insert_rowid(),
            mode,
            text,
            enabled,
        };
        lists.memorize(filter.clone());
        info!("[Filter] Added {} filter {}.", filter.mode, filter.id);
        Ok(filter)
    }

    pub fn delete(&self, id: i64) -> Result<Filter, FilterError> {
        let mut lists = self.lock();
        if lists.find(id).is_none() {
            return Err(FilterError::NotFound(id));
        }

        let conn = self.pool.get()?;
        conn.execute("DELETE FROM filters WHERE id = ?1", params![id])?;

        let removed = lists.forget(id).ok_or(FilterError::NotFound(id))?;
        info!("[Filter] Deleted {} filter {id}.", removed.mode);
        Ok(removed)
    }

    /// Flips the enabled flag. The filter keeps its place in its list.
    pub fn toggle(&self, id: i64) -> Result<Filter, FilterError> {
        let mut lists = self.lock();
        let enabled = !lists.find(id).ok_or(FilterError::NotFound(id))?.enabled;

        let conn = self.pool.get()?;
        conn.execute(
            "UPDATE filters SET enabled = ?1 WHERE id = ?2",
            params![enabled, id],
        )?;

        lists
            .set_enabled(id, enabled)
            .cloned()
            .ok_or(FilterError::NotFound(id))
    }

    pub fn list(&self) -> Vec<Filter> {
        self.lock().all()
    }

    pub fn list_mode(&self, mode: FilterMode) -> Vec<Filter> {
        self.lock().list(mode).to_vec()
    }

    pub fn export(&self) -> Vec<NewFilter> {
        self.list().into_iter().map(NewFilter::from).collect()
    }

    /// Adds every filter that is not already present.
    ///
    /// Invalid entries are skipped. A database failure stops the import but
    /// keeps whatever was added before it.
    pub fn import(&self, filters: Vec<NewFilter>) -> Result<ImportReport, FilterError> {
        let mut lists = self.lock();
        let mut report = ImportReport::default();

        for filter in filters {
            match self.insert(&mut lists, filter.mode, &filter.text, filter.enabled) {
                Ok(_) => report.added += 1,
                Err(FilterError::Duplicate { .. }) => report.duplicates += 1,
                Err(e @ (FilterError::EmptyText | FilterError::InvalidPattern { .. })) => {
                    warn!("[Filter] Skipping imported {} filter: {e}", filter.mode);
                    report.rejected += 1;
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            "[Filter] Import finished: {} added, {} duplicates, {} rejected.",
            report.added, report.duplicates, report.rejected
        );
        Ok(report)
    }

    pub fn need_tags(&self) -> bool {
        self.lock().need_tags()
    }

    pub fn filter_title(&self, info: &GalleryInfo) -> bool {
        self.lock().filter_title(info)
    }

    pub fn filter_uploader(&self, info: &GalleryInfo) -> bool {
        self.lock().filter_uploader(info)
    }

    pub fn filter_tag(&self, info: &GalleryInfo) -> bool {
        self.lock().filter_tag(info)
    }

    pub fn filter_tag_namespace(&self, info: &GalleryInfo) -> bool {
        self.lock().filter_tag_namespace(info)
    }

    pub fn filter_commenter(&self, commenter: &str) -> bool {
        self.lock().filter_commenter(commenter)
    }

    pub fn filter_comment(&self, comment: &str) -> bool {
        self.lock().filter_comment(comment)
    }

    pub fn filter_gallery(&self, info: &GalleryInfo) -> Option<FilterMode> {
        self.lock().filter_gallery(info)
    }

    pub fn filter_comment_entry(&self, commenter: Option<&str>, comment: &str) -> Option<FilterMode> {
        self.lock().filter_comment_entry(commenter, comment)
    }
}
