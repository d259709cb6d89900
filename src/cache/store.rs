//! Disk-backed store of named cache generations
//!
//! Each generation is a directory under `<root>/generations/`. An entry is a
//! single file named by the digest of its request identity, `<digest>.entry`:
//! one line of JSON metadata followed by the body bytes. Entries are replaced
//! with one rename, so a reader sees either the old or the new response whole.
//!
//! A generation only counts as installed once it holds an `INSTALLED` marker.
//! Install seeds into a staging directory under `<root>/staging/` and commits
//! it, so a failed install never touches the generation it targets.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::{WorkerError, WorkerResult};
use crate::net::{RequestKey, Response, ResponseType};

/// Directory holding one subdirectory per generation
const GENERATIONS_DIR: &str = "generations";

/// Directory holding generations being seeded
const STAGING_DIR: &str = "staging";

/// File recording which generation controls request handling
const CONTROLLER_FILE: &str = "CONTROLLER";

/// Written into a generation once its seed set is complete
const INSTALLED_MARKER: &str = "INSTALLED";

/// Extension of entry files
const ENTRY_EXT: &str = "entry";

/// Distinguishes temp files of concurrent writers within one process
static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Metadata stored in front of each body
#[derive(Debug, Serialize, Deserialize)]
struct EntryMeta {
    method: String,
    url: String,
    status: u16,
    status_text: String,
    headers: Vec<(String, String)>,
    response_type: ResponseType,
    /// When the entry was written
    stored_at: DateTime<Utc>,
}

/// A response read back from the store
#[derive(Debug, Clone)]
pub struct CachedResponse {
    /// The stored response, verbatim
    pub response: Response,
    /// Generation the entry was found in
    pub generation: String,
    /// When the entry was written
    pub stored_at: DateTime<Utc>,
}

/// A generation being seeded, not yet visible to lookups
#[derive(Debug)]
pub struct StagedGeneration {
    /// Generation this will become
    name: String,
    /// Private directory the entries are written to
    dir: PathBuf,
}

/// Manages named cache generations on disk
///
/// The store is cheap to clone; clones share the same root directory. It keeps
/// no in-memory state, so every operation sees what is on disk.
#[derive(Debug, Clone)]
pub struct GenerationStore {
    /// Root directory of the store
    root: PathBuf,
}

impl GenerationStore {
    /// Creates a store in the XDG-compliant cache directory
    ///
    /// Uses `~/.cache/dictcache/` on Linux, or the platform equivalent.
    /// Returns `None` if the cache directory cannot be determined.
    pub fn new() -> Option<Self> {
        let project_dirs = ProjectDirs::from("", "", "dictcache")?;
        Some(Self {
            root: project_dirs.cache_dir().to_path_buf(),
        })
    }

    /// Creates a store rooted at a custom directory
    pub fn with_dir(root: PathBuf) -> Self {
        Self { root }
    }

    /// Root directory of the store
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn generations_dir(&self) -> PathBuf {
        self.root.join(GENERATIONS_DIR)
    }

    fn generation_dir(&self, name: &str) -> WorkerResult<PathBuf> {
        validate_name(name)?;
        Ok(self.generations_dir().join(name))
    }

    fn entry_path(&self, name: &str, key: &RequestKey) -> WorkerResult<PathBuf> {
        Ok(entry_path_in(&self.generation_dir(name)?, key))
    }

    /// Opens a generation, creating it if absent
    pub async fn open(&self, name: &str) -> WorkerResult<()> {
        let dir = self.generation_dir(name)?;
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| WorkerError::io("creating generation", &dir, e))
    }

    /// Whether a generation exists
    pub async fn has(&self, name: &str) -> WorkerResult<bool> {
        let dir = self.generation_dir(name)?;
        fs::try_exists(&dir)
            .await
            .map_err(|e| WorkerError::io("checking generation", &dir, e))
    }

    /// Whether a generation exists and its seed set was committed
    pub async fn is_installed(&self, name: &str) -> WorkerResult<bool> {
        let marker = self.generation_dir(name)?.join(INSTALLED_MARKER);
        fs::try_exists(&marker)
            .await
            .map_err(|e| WorkerError::io("checking install marker", &marker, e))
    }

    /// Names of all existing generations, sorted
    pub async fn keys(&self) -> WorkerResult<Vec<String>> {
        let dir = self.generations_dir();
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(WorkerError::io("listing generations", &dir, e)),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| WorkerError::io("listing generations", &dir, e))?
        {
            let is_dir = entry
                .file_type()
                .await
                .map(|t| t.is_dir())
                .unwrap_or(false);
            if is_dir {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Deletes a generation and everything in it
    ///
    /// Returns `false` if the generation did not exist.
    pub async fn delete(&self, name: &str) -> WorkerResult<bool> {
        let dir = self.generation_dir(name)?;
        remove_dir(&dir, "deleting generation").await
    }

    /// Stores a response under `key` in generation `name`
    ///
    /// Creates the generation if it does not exist and replaces any entry
    /// already stored under the same key.
    pub async fn put(&self, name: &str, key: &RequestKey, response: &Response) -> WorkerResult<()> {
        self.open(name).await?;
        write_entry(&self.entry_path(name, key)?, key, response).await
    }

    /// Starts seeding generation `name` in a private staging directory
    pub async fn stage(&self, name: &str) -> WorkerResult<StagedGeneration> {
        validate_name(name)?;
        let seq = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let dir = self
            .root
            .join(STAGING_DIR)
            .join(format!("{}.{}.{}", name, std::process::id(), seq));
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| WorkerError::io("creating staging directory", &dir, e))?;
        Ok(StagedGeneration {
            name: name.to_string(),
            dir,
        })
    }

    /// Writes an entry into a staged generation
    pub async fn put_staged(
        &self,
        staged: &StagedGeneration,
        key: &RequestKey,
        response: &Response,
    ) -> WorkerResult<()> {
        write_entry(&entry_path_in(&staged.dir, key), key, response).await
    }

    /// Makes a staged generation visible and marks it installed
    ///
    /// A new generation appears with one directory rename. Into an existing
    /// generation the staged entries are moved one by one, each replacing the
    /// old entry whole, and the marker is written last; entries the staging
    /// did not touch are kept.
    pub async fn commit(&self, staged: StagedGeneration) -> WorkerResult<()> {
        let target = self.generation_dir(&staged.name)?;
        write_replace(&staged.dir.join(INSTALLED_MARKER), b"").await?;

        if !self.has(&staged.name).await? {
            let parent = self.generations_dir();
            fs::create_dir_all(&parent)
                .await
                .map_err(|e| WorkerError::io("creating generations directory", &parent, e))?;
            if fs::rename(&staged.dir, &target).await.is_ok() {
                return Ok(());
            }
            // Lost a race with another writer creating the generation; merge
        }

        self.open(&staged.name).await?;
        let mut entries = fs::read_dir(&staged.dir)
            .await
            .map_err(|e| WorkerError::io("reading staging directory", &staged.dir, e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| WorkerError::io("reading staging directory", &staged.dir, e))?
        {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == ENTRY_EXT) {
                let dest = target.join(entry.file_name());
                fs::rename(&path, &dest)
                    .await
                    .map_err(|e| WorkerError::io("committing entry", &dest, e))?;
            }
        }
        write_replace(&target.join(INSTALLED_MARKER), b"").await?;
        self.discard(staged).await
    }

    /// Throws away a staged generation
    pub async fn discard(&self, staged: StagedGeneration) -> WorkerResult<()> {
        remove_dir(&staged.dir, "removing staging directory")
            .await
            .map(|_| ())
    }

    /// Looks up `key` in one generation
    ///
    /// Returns `None` if the generation or entry doesn't exist. Only GET keys
    /// ever match.
    pub async fn match_in(&self, name: &str, key: &RequestKey) -> WorkerResult<Option<CachedResponse>> {
        if !key.is_get() {
            return Ok(None);
        }
        let path = self.entry_path(name, key)?;
        let Some(raw) = read_optional(&path).await? else {
            return Ok(None);
        };
        let (meta, body) = decode_entry(&raw)?;

        Ok(Some(CachedResponse {
            response: Response {
                url: meta.url,
                status: meta.status,
                status_text: meta.status_text,
                headers: meta.headers,
                response_type: meta.response_type,
                body,
            },
            generation: name.to_string(),
            stored_at: meta.stored_at,
        }))
    }

    /// Looks up `key` in every generation, the controlling one first
    pub async fn match_any(&self, key: &RequestKey) -> WorkerResult<Option<CachedResponse>> {
        let mut names = self.keys().await?;
        if let Some(controller) = self.controller().await? {
            if let Some(pos) = names.iter().position(|n| *n == controller) {
                let name = names.remove(pos);
                names.insert(0, name);
            }
        }

        for name in names {
            if let Some(found) = self.match_in(&name, key).await? {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    /// Number of entries in a generation
    pub async fn entry_count(&self, name: &str) -> WorkerResult<usize> {
        let dir = self.generation_dir(name)?;
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(WorkerError::io("counting entries", &dir, e)),
        };

        let mut count = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| WorkerError::io("counting entries", &dir, e))?
        {
            if entry.path().extension().is_some_and(|ext| ext == ENTRY_EXT) {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Name of the generation that last took control, if any
    pub async fn controller(&self) -> WorkerResult<Option<String>> {
        let path = self.root.join(CONTROLLER_FILE);
        let Some(raw) = read_optional(&path).await? else {
            return Ok(None);
        };
        let name = String::from_utf8_lossy(&raw).trim().to_string();
        Ok((!name.is_empty()).then_some(name))
    }

    /// Records `name` as the controlling generation
    pub async fn set_controller(&self, name: &str) -> WorkerResult<()> {
        validate_name(name)?;
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| WorkerError::io("creating store root", &self.root, e))?;
        write_replace(&self.root.join(CONTROLLER_FILE), name.as_bytes()).await
    }
}

/// Generation names are used as directory names
fn validate_name(name: &str) -> WorkerResult<()> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);
    if invalid {
        Err(WorkerError::InvalidGeneration(name.to_string()))
    } else {
        Ok(())
    }
}

fn entry_path_in(dir: &Path, key: &RequestKey) -> PathBuf {
    dir.join(format!("{}.{}", key.digest(), ENTRY_EXT))
}

/// Encodes metadata and body into one file and swaps it into place
async fn write_entry(path: &Path, key: &RequestKey, response: &Response) -> WorkerResult<()> {
    if !key.is_get() {
        return Err(WorkerError::UnsupportedMethod(key.method.clone()));
    }
    let meta = EntryMeta {
        method: key.method.clone(),
        url: key.url.clone(),
        status: response.status,
        status_text: response.status_text.clone(),
        headers: response.headers.clone(),
        response_type: response.response_type,
        stored_at: Utc::now(),
    };

    // Compact JSON never contains a raw newline, so the first one ends the header
    let mut contents = serde_json::to_vec(&meta)?;
    contents.push(b'\n');
    contents.extend_from_slice(&response.body);
    write_replace(path, &contents).await
}

fn decode_entry(raw: &[u8]) -> WorkerResult<(EntryMeta, Vec<u8>)> {
    let split = raw.iter().position(|&b| b == b'\n').unwrap_or(raw.len());
    let meta: EntryMeta = serde_json::from_slice(&raw[..split])?;
    let body = raw.get(split + 1..).unwrap_or_default().to_vec();
    Ok((meta, body))
}

/// Removes a directory tree, mapping "not found" to `false`
async fn remove_dir(dir: &Path, context: &'static str) -> WorkerResult<bool> {
    match fs::remove_dir_all(dir).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(WorkerError::io(context, dir, e)),
    }
}

/// Reads a file, mapping "not found" to `None`
async fn read_optional(path: &Path) -> WorkerResult<Option<Vec<u8>>> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(WorkerError::io("reading entry", path, e)),
    }
}

/// Writes through a temp file and renames it over `path`
async fn write_replace(path: &Path, contents: &[u8]) -> WorkerResult<()> {
    let seq = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp = path.with_extension(format!("{}.{}.tmp", std::process::id(), seq));

    fs::write(&tmp, contents)
        .await
        .map_err(|e| WorkerError::io("writing entry", &tmp, e))?;
    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(WorkerError::io("replacing entry", path, e));
    }
    Ok(())
}
