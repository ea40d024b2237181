use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::error::SurveyError;

#[derive(Debug, Default)]
struct AliasTable {
    by_path: HashMap<PathBuf, String>,
    by_alias: HashMap<String, PathBuf>,
}

/// Maps image files referenced by the survey to opaque served aliases.
///
/// Aliases are numbered in first-seen order (`0.png`, `1.svg`, ...) and stay
/// stable for the registry's lifetime.
#[derive(Debug)]
pub struct AssetRegistry {
    base: PathBuf,
    table: Mutex<AliasTable>,
}

impl AssetRegistry {
    /// Creates a registry resolving relative paths against `base`.
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            table: Mutex::new(AliasTable::default()),
        }
    }

    /// Returns the alias for `path`, registering it on first use.
    pub fn register(&self, path: &str) -> Result<String, SurveyError> {
        let full = self.base.join(path);
        let mut table = self.lock();
        if let Some(alias) = table.by_path.get(&full) {
            return Ok(alias.clone());
        }
        if !full.is_file() {
            return Err(SurveyError::MissingAsset(full));
        }
        let alias = format!("{}.{}", table.by_path.len(), extension(&full));
        table.by_path.insert(full.clone(), alias.clone());
        table.by_alias.insert(alias.clone(), full);
        Ok(alias)
    }

    /// Real path behind a previously issued alias.
    pub fn resolve(&self, alias: &str) -> Option<PathBuf> {
        self.lock().by_alias.get(alias).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, AliasTable> {
        self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// MIME type served for an image file.
pub fn content_type(path: &Path) -> String {
    match extension(path).as_str() {
        "svg" => "image/svg+xml".to_string(),
        "jpg" => "image/jpeg".to_string(),
        ext => format!("image/{ext}"),
    }
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default()
        .to_string()
}
