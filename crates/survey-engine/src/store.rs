use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_json::Value;
use survey_spec::RespondentDocument;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("respondent document {} is not valid JSON: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("respondent document {} is not a JSON object", .0.display())]
    NotAnObject(PathBuf),
    #[error("json encode error: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Loads and saves respondent documents by session token.
pub trait DocumentStore: Send + Sync {
    /// Returns the stored document, or an empty one when none exists yet.
    fn load(&self, token: &str) -> Result<RespondentDocument, StoreError>;
    /// Replaces the stored document.
    fn save(&self, token: &str, doc: &RespondentDocument) -> Result<(), StoreError>;
}

/// Keeps one `<token>.json` file per respondent in a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, token: &str) -> PathBuf {
        self.dir.join(format!("{token}.json"))
    }
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl DocumentStore for FileStore {
    fn load(&self, token: &str) -> Result<RespondentDocument, StoreError> {
        let path = self.path_for(token);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(RespondentDocument::new());
            }
            Err(err) => return Err(io_error(&path)(err)),
        };
        match serde_json::from_str(&text) {
            Ok(Value::Object(doc)) => Ok(doc),
            Ok(_) => Err(StoreError::NotAnObject(path)),
            Err(source) => Err(StoreError::Parse { path, source }),
        }
    }

    fn save(&self, token: &str, doc: &RespondentDocument) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir).map_err(io_error(&self.dir))?;
        let path = self.path_for(token);
        let staging = self.dir.join(format!("{token}.json.tmp"));
        let mut text = serde_json::to_string_pretty(doc).map_err(StoreError::Encode)?;
        text.push('\n');
        fs::write(&staging, text).map_err(io_error(&staging))?;
        fs::rename(&staging, &path).map_err(io_error(&path))
    }
}

/// In-process store, used for previews and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    docs: Mutex<HashMap<String, RespondentDocument>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(token: &str, doc: RespondentDocument) -> Self {
        let store = Self::default();
        store
            .docs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(token.to_string(), doc);
        store
    }
}

impl DocumentStore for MemoryStore {
    fn load(&self, token: &str) -> Result<RespondentDocument, StoreError> {
        let docs = self.docs.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(docs.get(token).cloned().unwrap_or_default())
    }

    fn save(&self, token: &str, doc: &RespondentDocument) -> Result<(), StoreError> {
        let mut docs = self.docs.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        docs.insert(token.to_string(), doc.clone());
        Ok(())
    }
}
