//! Durable storage boundary.

use crate::markup::PageMarkups;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to load markups for {url}: {message}")]
    Load { url: String, message: String },
    #[error("failed to save markups for {url}: {message}")]
    Save { url: String, message: String },
}

/// Keyed persistence for page markups.
///
/// Implementations may sit on files, a browser storage bridge or plain
/// memory. The engine only assumes a successful save is visible to the next
/// load; it always rewrites the full set for a url, so read-modify-write
/// stays on the caller's side of this trait.
pub trait MarkupStore {
    /// Markups previously saved for `url`, or `None` for an unknown page.
    fn load(&self, url: &str) -> Result<Option<PageMarkups>, StoreError>;

    /// Replace the whole markup set for `url`.
    fn save(&mut self, url: &str, markups: &PageMarkups) -> Result<(), StoreError>;
}

/// In-memory store.
///
/// Pages are held in serialized form so loads run through the same lenient
/// decoding as on-disk stores. Tests can inject raw JSON and simulated
/// failures.
#[derive(Debug, Default)]
pub struct MemoryStore {
    pages: HashMap<String, serde_json::Value>,
    fail_loads: bool,
    fail_saves: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a page with raw JSON, bypassing markup encoding.
    pub fn set_raw(&mut self, url: &str, value: serde_json::Value) {
        self.pages.insert(url.to_string(), value);
    }

    pub fn raw(&self, url: &str) -> Option<&serde_json::Value> {
        self.pages.get(url)
    }

    pub fn fail_loads(&mut self, fail: bool) {
        self.fail_loads = fail;
    }

    pub fn fail_saves(&mut self, fail: bool) {
        self.fail_saves = fail;
    }
}

impl MarkupStore for MemoryStore {
    fn load(&self, url: &str) -> Result<Option<PageMarkups>, StoreError> {
        if self.fail_loads {
            return Err(StoreError::Load {
                url: url.to_string(),
                message: "simulated load failure".to_string(),
            });
        }
        Ok(self.pages.get(url).map(PageMarkups::from_value))
    }

    fn save(&mut self, url: &str, markups: &PageMarkups) -> Result<(), StoreError> {
        if self.fail_saves {
            return Err(StoreError::Save {
                url: url.to_string(),
                message: "simulated save failure".to_string(),
            });
        }
        let value = serde_json::to_value(markups).map_err(|e| StoreError::Save {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        self.pages.insert(url.to_string(), value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchor::{Anchor, RangeAnchor};
    use crate::markup::{Markup, MarkupKind};
    use pretty_assertions::assert_eq;

    const URL: &str = "https://example.com/page";

    fn one_markup() -> PageMarkups {
        let markup = Markup {
            id: "markup-1".into(),
            kind: MarkupKind::Highlight,
            text: "stored".to_string(),
            anchor: Anchor::Range(RangeAnchor {
                start_path: "/html/body/p[1]/text()[1]".parse().unwrap(),
                start_offset: 0,
                end_path: "/html/body/p[1]/text()[1]".parse().unwrap(),
                end_offset: 6,
            }),
            color: None,
        };
        vec![markup].into()
    }

    #[test]
    fn test_save_then_load_round_trips() {
        let mut store = MemoryStore::new();
        let markups = one_markup();
        store.save(URL, &markups).unwrap();
        assert_eq!(store.load(URL).unwrap(), Some(markups));
    }

    #[test]
    fn test_load_of_unknown_url_is_none() {
        let store = MemoryStore::new();
        assert_eq!(store.load(URL).unwrap(), None);
    }

    #[test]
    fn test_pages_are_isolated_by_url() {
        let mut store = MemoryStore::new();
        store.save(URL, &one_markup()).unwrap();
        assert_eq!(store.load("https://example.com/other").unwrap(), None);
    }

    #[test]
    fn test_simulated_failures() {
        let mut store = MemoryStore::new();
        store.fail_loads(true);
        assert!(store.load(URL).is_err());
        store.fail_loads(false);

        store.fail_saves(true);
        assert!(store.save(URL, &one_markup()).is_err());
        store.fail_saves(false);
        assert_eq!(store.load(URL).unwrap(), None, "failed save left nothing");
    }

    #[test]
    fn test_raw_json_loads_leniently() {
        let mut store = MemoryStore::new();
        store.set_raw(
            URL,
            serde_json::json!({ "markups": [ { "id": "garbage" } ] }),
        );
        let loaded = store.load(URL).unwrap().unwrap();
        assert!(loaded.is_empty(), "malformed entries are skipped, not fatal");
    }
}
