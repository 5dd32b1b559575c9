use std::{
    fs,
    path::{Path, PathBuf},
    sync::{
        Arc, PoisonError, RwLock,
        atomic::{AtomicBool, Ordering},
    },
};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::{
    database::{Suggestion, TagDatabase},
    update::{Fetch, check_data, delete_quietly, save},
};

const TAG_DIR_NAME: &str = "tag-translations";

/// Where the translation data and its detached checksum are published.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagSource {
    pub sha1_name: String,
    pub sha1_url: String,
    pub data_name: String,
    pub data_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RefreshOutcome {
    /// Another refresh holds the lock.
    Busy,
    UpToDate,
    Updated { entries: usize },
    Failed { message: String },
}

#[derive(Debug, Serialize)]
pub struct TagStatus {
    pub loaded: bool,
    pub name: Option<String>,
    pub entries: usize,
    pub refreshing: bool,
    pub last_refresh: Option<RefreshOutcome>,
}

/// Process-wide owner of the current tag database.
///
/// The database is never modified in place. Readers take a clone of the
/// `Arc` and keep using it even if a refresh swaps in a newer one.
pub struct TagService {
    dir: PathBuf,
    source: TagSource,
    fetcher: Arc<dyn Fetch>,
    database: RwLock<Option<Arc<TagDatabase>>>,
    refresh_lock: Mutex<()>,
    refreshing: AtomicBool,
    last_refresh: RwLock<Option<RefreshOutcome>>,
}

/// Clears the refreshing flag when a refresh ends, even if it is dropped.
struct RefreshingFlag<'a>(&'a AtomicBool);

impl Drop for RefreshingFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl TagService {
    /// Opens the translation directory and loads the on-disk data if its
    /// checksum file vouches for it. Unverified files are removed.
    pub async fn new(data_dir: &Path, source: TagSource, fetcher: Arc<dyn Fetch>) -> Self {
        let dir = data_dir.join(TAG_DIR_NAME);
        if let Err(e) = tokio::fs::create_dir_all(&dir).await {
            warn!("[Tags] Failed to create {}: {e}", dir.display());
        }

        let service = Self {
            dir,
            source,
            fetcher,
            database: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            refreshing: AtomicBool::new(false),
            last_refresh: RwLock::new(None),
        };

        match service.load_verified().await {
            Ok(Some(db)) => {
                info!("[Tags] Loaded {} translations from disk.", db.len());
                service.swap(db);
            }
            Ok(None) => info!("[Tags] No verified translation data on disk."),
            Err(e) => warn!("[Tags] Discarding unreadable translation data: {e:#}"),
        }
        service
    }

    fn sha1_path(&self) -> PathBuf {
        self.dir.join(&self.source.sha1_name)
    }

    fn data_path(&self) -> PathBuf {
        self.dir.join(&self.source.data_name)
    }

    fn temp_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.tmp"))
    }

    /// Reads the current data file if it is verified. Unverified or
    /// unreadable pairs are deleted.
    async fn load_verified(&self) -> Result<Option<TagDatabase>> {
        let name = self.source.data_name.clone();
        let sha1_file = self.sha1_path();
        let data_file = self.data_path();

        blocking(move || {
            if !verify_or_discard(&sha1_file, &data_file) {
                return Ok(None);
            }
            read_database(&name, &data_file).map(Some).inspect_err(|_| {
                delete_quietly(&sha1_file);
                delete_quietly(&data_file);
            })
        })
        .await?
    }

    fn swap(&self, db: TagDatabase) {
        let mut current = self.database.write().unwrap_or_else(PoisonError::into_inner);
        *current = Some(Arc::new(db));
    }

    pub fn current(&self) -> Option<Arc<TagDatabase>> {
        self.database
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn get_translation(&self, tag: &str) -> Option<String> {
        self.current()?.get_translation(tag).map(str::to_string)
    }

    pub fn translate(&self, namespace: &str, name: &str) -> Option<String> {
        self.current()?.translate(namespace, name).map(str::to_string)
    }

    pub fn suggest(&self, query: &str, translate: bool) -> Vec<Suggestion> {
        match self.current() {
            Some(db) => db.suggest_query(query, translate),
            None => Vec::new(),
        }
    }

    pub fn status(&self) -> TagStatus {
        let db = self.current();
        TagStatus {
            loaded: db.is_some(),
            name: db.as_ref().map(|d| d.name().to_string()),
            entries: db.as_ref().map_or(0, |d| d.len()),
            refreshing: self.refreshing.load(Ordering::SeqCst),
            last_refresh: self
                .last_refresh
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }

    /// Fire-and-forget refresh on the runtime.
    pub fn spawn_refresh(self: &Arc<Self>) {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            service.refresh().await;
        });
    }

    /// Runs one refresh unless another is already in progress.
    ///
    /// Failures are logged and reported but never unload the database that
    /// is currently being served.
    pub async fn refresh(&self) -> RefreshOutcome {
        let Ok(_guard) = self.refresh_lock.try_lock() else {
            info!("[Tags] Refresh already running, skipping.");
            return RefreshOutcome::Busy;
        };
        self.refreshing.store(true, Ordering::SeqCst);
        let _flag = RefreshingFlag(&self.refreshing);

        let outcome = match self.refresh_locked().await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("[Tags] Refresh failed: {e:#}");
                RefreshOutcome::Failed {
                    message: format!("{e:#}"),
                }
            }
        };

        *self
            .last_refresh
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(outcome.clone());
        outcome
    }

    async fn refresh_locked(&self) -> Result<RefreshOutcome> {
        let sha1_file = self.sha1_path();
        let data_file = self.data_path();

        if self.current().is_none() {
            match self.load_verified().await {
                Ok(Some(db)) => self.swap(db),
                Ok(None) => {}
                Err(e) => warn!("[Tags] Discarding unreadable translation data: {e:#}"),
            }
        } else {
            let (sha1, data) = (sha1_file.clone(), data_file.clone());
            blocking(move || verify_or_discard(&sha1, &data)).await?;
        }

        let temp_sha1 = self.temp_path(&self.source.sha1_name);
        if let Err(e) = save(self.fetcher.as_ref(), &self.source.sha1_url, &temp_sha1).await {
            delete_quietly(&temp_sha1);
            return Err(e.context("Fetching checksum"));
        }

        if verify(&temp_sha1, &data_file).await? {
            delete_quietly(&temp_sha1);
            info!("[Tags] Translations are up to date.");
            return Ok(RefreshOutcome::UpToDate);
        }

        let temp_data = self.temp_path(&self.source.data_name);
        if let Err(e) = save(self.fetcher.as_ref(), &self.source.data_url, &temp_data).await {
            delete_quietly(&temp_sha1);
            delete_quietly(&temp_data);
            return Err(e.context("Fetching translation data"));
        }

        if !verify(&temp_sha1, &temp_data).await? {
            delete_quietly(&temp_sha1);
            delete_quietly(&temp_data);
            bail!("Downloaded translation data does not match its checksum");
        }

        // A publish that fails to parse must not replace the files on disk.
        let db = match self.parse_file(&temp_data).await {
            Ok(db) => db,
            Err(e) => {
                delete_quietly(&temp_sha1);
                delete_quietly(&temp_data);
                return Err(e.context("Parsing downloaded translation data"));
            }
        };

        blocking(move || -> Result<()> {
            delete_quietly(&sha1_file);
            delete_quietly(&data_file);
            fs::rename(&temp_sha1, &sha1_file).context("Replacing checksum file")?;
            fs::rename(&temp_data, &data_file).context("Replacing data file")?;
            Ok(())
        })
        .await??;

        let entries = db.len();
        self.swap(db);
        info!("[Tags] Updated translations ({entries} entries).");
        Ok(RefreshOutcome::Updated { entries })
    }

    async fn parse_file(&self, path: &Path) -> Result<TagDatabase> {
        let name = self.source.data_name.clone();
        let path = path.to_path_buf();
        blocking(move || read_database(&name, &path)).await?
    }
}

/// Runs file hashing and replacement off the async workers.
async fn blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    Ok(tokio::task::spawn_blocking(f).await?)
}

async fn verify(sha1_file: &Path, data_file: &Path) -> Result<bool> {
    let (sha1, data) = (sha1_file.to_path_buf(), data_file.to_path_buf());
    blocking(move || check_data(&sha1, &data)).await
}

/// True when the pair verifies. Otherwise both files are deleted.
fn verify_or_discard(sha1_file: &Path, data_file: &Path) -> bool {
    if check_data(sha1_file, data_file) {
        return true;
    }
    delete_quietly(sha1_file);
    delete_quietly(data_file);
    false
}

fn read_database(name: &str, path: &Path) -> Result<TagDatabase> {
    let bytes = fs::read(path)?;
    TagDatabase::load(name, &bytes)
}
