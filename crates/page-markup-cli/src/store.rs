//! File-backed markup store.

use page_markup_engine::{MarkupStore, PageMarkups, StoreError};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// Markup store in one JSON file, keyed by page url:
/// `{ "<url>": { "markups": [...] }, ... }`.
///
/// Every save rewrites the whole file. Loads go through the engine's
/// lenient decoding, so a malformed entry costs that entry rather than the
/// page, and a missing file reads as an empty store.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        JsonFileStore {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<serde_json::Map<String, Value>, String> {
        if !self.path.exists() {
            return Ok(serde_json::Map::new());
        }
        let content = fs::read_to_string(&self.path)
            .map_err(|e| format!("{}: {e}", self.path.display()))?;
        let value: Value = serde_json::from_str(&content)
            .map_err(|e| format!("{}: {e}", self.path.display()))?;
        match value {
            Value::Object(pages) => Ok(pages),
            _ => Err(format!("{}: not a JSON object", self.path.display())),
        }
    }
}

impl MarkupStore for JsonFileStore {
    fn load(&self, url: &str) -> Result<Option<PageMarkups>, StoreError> {
        let pages = self.read_all().map_err(|message| StoreError::Load {
            url: url.to_string(),
            message,
        })?;
        Ok(pages.get(url).map(PageMarkups::from_value))
    }

    fn save(&mut self, url: &str, markups: &PageMarkups) -> Result<(), StoreError> {
        let save_error = |message: String| StoreError::Save {
            url: url.to_string(),
            message,
        };
        let mut pages = self.read_all().map_err(save_error)?;
        let value = serde_json::to_value(markups).map_err(|e| save_error(e.to_string()))?;
        pages.insert(url.to_string(), value);

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| save_error(e.to_string()))?;
        }
        let content = serde_json::to_string_pretty(&Value::Object(pages))
            .map_err(|e| save_error(e.to_string()))?;
        fs::write(&self.path, content).map_err(|e| save_error(format!("{}: {e}", self.path.display())))
    }
}
