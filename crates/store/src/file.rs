//! JSON file document store.
//!
//! Layout under the collection directory:
//!
//! ```text
//! <doc_id>.json               top-level fields, replaced via temp + rename
//! <doc_id>/<subpath>.jsonl    append-only record log, one JSON line per write
//! ```
//!
//! A batch appends only its own records, so write cost does not grow with
//! the size of the subcollection. Rewriting a record ID appends a newer line;
//! the last line for an ID wins on read.

use std::collections::BTreeMap;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use score_core::{Error, Result, StoreErrorCode};
use serde::{Deserialize, Serialize};
use tokio::fs::OpenOptions;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::document::{BatchWrite, Document, DocumentStore, StoredDocument};

/// One line of a record log.
#[derive(Debug, Serialize, Deserialize)]
struct LogEntry {
    id: String,
    record: Document,
}

/// Durable store backed by a directory of JSON files.
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    /// Serializes read-modify-write cycles and appends.
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Opens (creating if needed) the collection directory.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await.map_err(|e| {
            Error::store(
                StoreErrorCode::WriteFailed,
                format!("failed to create {}: {}", root.display(), e),
            )
        })?;
        debug!(root = %root.display(), "Opened file store");

        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn fields_path(&self, doc_id: &str, code: StoreErrorCode) -> Result<PathBuf> {
        check_name("document id", doc_id, code)?;
        Ok(self.root.join(format!("{}.json", doc_id)))
    }

    fn log_path(&self, doc_id: &str, subpath: &str, code: StoreErrorCode) -> Result<PathBuf> {
        check_name("document id", doc_id, code)?;
        check_name("subcollection", subpath, code)?;
        Ok(self.root.join(doc_id).join(format!("{}.jsonl", subpath)))
    }

    async fn load_fields(&self, doc_id: &str) -> Result<Option<Document>> {
        let path = self.fields_path(doc_id, StoreErrorCode::ReadFailed)?;
        let Some(bytes) = read_optional(&path).await? else {
            return Ok(None);
        };

        serde_json::from_slice(&bytes).map(Some).map_err(|e| {
            Error::store(
                StoreErrorCode::Corrupt,
                format!("failed to decode {}: {}", path.display(), e),
            )
        })
    }

    async fn save_fields(&self, doc_id: &str, fields: &Document) -> Result<()> {
        let path = self.fields_path(doc_id, StoreErrorCode::WriteFailed)?;
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec(fields)?;

        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| write_error(&tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| write_error(&path, e))?;
        Ok(())
    }

    /// Replays a record log. The last entry per ID wins.
    async fn load_log(&self, doc_id: &str, subpath: &str) -> Result<StoredDocument> {
        let path = self.log_path(doc_id, subpath, StoreErrorCode::ReadFailed)?;
        let mut doc = StoredDocument::default();
        let Some(bytes) = read_optional(&path).await? else {
            return Ok(doc);
        };

        let mut lines = bytes.split(|b| *b == b'\n').peekable();
        while let Some(line) = lines.next() {
            if line.is_empty() {
                continue;
            }
            if lines.peek().is_none() {
                // No trailing newline: an append that never completed.
                warn!(path = %path.display(), bytes = line.len(), "Ignoring torn tail of record log");
                break;
            }
            let entry: LogEntry = serde_json::from_slice(line).map_err(|e| {
                Error::store(
                    StoreErrorCode::Corrupt,
                    format!("failed to decode {}: {}", path.display(), e),
                )
            })?;
            doc.put(subpath, &entry.id, entry.record);
        }
        Ok(doc)
    }

    async fn append_log(&self, doc_id: &str, subpath: &str, entries: &[LogEntry]) -> Result<()> {
        let path = self.log_path(doc_id, subpath, StoreErrorCode::WriteFailed)?;

        let mut buf = Vec::new();
        for entry in entries {
            serde_json::to_writer(&mut buf, entry)?;
            buf.push(b'\n');
        }

        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| write_error(dir, e))?;
        }
        repair_torn_tail(&path)
            .await
            .map_err(|e| write_error(&path, e))?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| write_error(&path, e))?;
        file.write_all(&buf).await.map_err(|e| write_error(&path, e))?;
        file.sync_data().await.map_err(|e| write_error(&path, e))?;
        Ok(())
    }
}

fn check_name(what: &str, name: &str, code: StoreErrorCode) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(Error::store(code, format!("invalid {}: {:?}", what, name)))
    }
}

fn write_error(path: &Path, e: std::io::Error) -> Error {
    Error::store(
        StoreErrorCode::WriteFailed,
        format!("failed to write {}: {}", path.display(), e),
    )
}

async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::store(
            StoreErrorCode::ReadFailed,
            format!("failed to read {}: {}", path.display(), e),
        )),
    }
}

/// Cuts a partial last line left by an interrupted append, so the next
/// append starts on a line boundary.
async fn repair_torn_tail(path: &Path) -> std::io::Result<()> {
    let mut file = match OpenOptions::new().read(true).write(true).open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    let len = file.metadata().await?.len();
    if len == 0 {
        return Ok(());
    }
    file.seek(SeekFrom::End(-1)).await?;
    if file.read_u8().await? == b'\n' {
        return Ok(());
    }

    let bytes = tokio::fs::read(path).await?;
    let keep = bytes
        .iter()
        .rposition(|b| *b == b'\n')
        .map_or(0, |i| i + 1) as u64;
    warn!(path = %path.display(), dropped = len - keep, "Truncating torn tail of record log");
    file.set_len(keep).await?;
    file.sync_all().await
}

#[async_trait]
impl DocumentStore for FileStore {
    async fn get(&self, doc_id: &str) -> Result<Option<Document>> {
        self.load_fields(doc_id).await
    }

    async fn set_merge(&self, doc_id: &str, fields: Document) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut doc = StoredDocument {
            fields: self.load_fields(doc_id).await?.unwrap_or_default(),
            ..Default::default()
        };
        doc.merge(fields);
        self.save_fields(doc_id, &doc.fields).await
    }

    /// Each (document, subcollection) pair gets one append. Batches spanning
    /// several pairs are applied one pair at a time.
    async fn batch_write(&self, writes: Vec<BatchWrite>) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut by_log: BTreeMap<(String, String), Vec<LogEntry>> = BTreeMap::new();
        for write in writes {
            by_log
                .entry((write.doc_id, write.subpath))
                .or_default()
                .push(LogEntry {
                    id: write.id,
                    record: write.record,
                });
        }

        for ((doc_id, subpath), entries) in by_log {
            self.append_log(&doc_id, &subpath, &entries).await?;
        }
        Ok(())
    }

    async fn query(&self, doc_id: &str, subpath: &str, order_by: &str) -> Result<Vec<Document>> {
        Ok(self
            .load_log(doc_id, subpath)
            .await?
            .ordered(subpath, order_by))
    }
}
