//! Markup records and their serialized form.

use crate::anchor::Anchor;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Fallback paint color for highlights saved without one.
pub const DEFAULT_HIGHLIGHT_COLOR: &str = "#fff888";
/// Fallback paint color for underlines saved without one.
pub const DEFAULT_UNDERLINE_COLOR: &str = "#ff5555";

/// Opaque markup identifier, unique within a page's markup set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarkupId(String);

impl MarkupId {
    /// Allocate a fresh id.
    pub fn generate() -> Self {
        MarkupId(format!("markup-{}", Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MarkupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MarkupId {
    fn from(id: &str) -> Self {
        MarkupId(id.to_string())
    }
}

impl From<String> for MarkupId {
    fn from(id: String) -> Self {
        MarkupId(id)
    }
}

/// What kind of mark the user made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkupKind {
    Highlight,
    Underline,
    Note,
}

impl MarkupKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarkupKind::Highlight => "highlight",
            MarkupKind::Underline => "underline",
            MarkupKind::Note => "note",
        }
    }
}

/// One persisted markup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Markup {
    pub id: MarkupId,
    pub kind: MarkupKind,
    /// Captured text for highlights and underlines, the note body for notes.
    pub text: String,
    pub anchor: Anchor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl Markup {
    /// Paint color for this markup. Invalid or missing stored colors fall
    /// back to the kind's default; notes have no paint color.
    pub fn effective_color(&self) -> Option<&str> {
        let stored = self.color.as_deref().filter(|c| is_valid_hex_color(c));
        match self.kind {
            MarkupKind::Highlight => Some(stored.unwrap_or(DEFAULT_HIGHLIGHT_COLOR)),
            MarkupKind::Underline => Some(stored.unwrap_or(DEFAULT_UNDERLINE_COLOR)),
            MarkupKind::Note => None,
        }
    }
}

/// `#rrggbb`, as produced by a color picker.
pub fn is_valid_hex_color(color: &str) -> bool {
    use std::sync::OnceLock;
    static HEX_COLOR: OnceLock<Regex> = OnceLock::new();
    let re = HEX_COLOR
        .get_or_init(|| Regex::new(r"^#[0-9a-fA-F]{6}$").expect("Invalid hex color regex"));
    re.is_match(color)
}

/// A CSS `rgba(...)` paint value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: f64,
}

impl Rgba {
    /// Parse `#rrggbb` with the given alpha. `None` for anything else.
    pub fn from_hex(hex: &str, alpha: f64) -> Option<Rgba> {
        if !is_valid_hex_color(hex) {
            return None;
        }
        let r = u8::from_str_radix(&hex[1..3], 16).ok()?;
        let g = u8::from_str_radix(&hex[3..5], 16).ok()?;
        let b = u8::from_str_radix(&hex[5..7], 16).ok()?;
        Some(Rgba { r, g, b, a: alpha })
    }
}

impl fmt::Display for Rgba {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rgba({}, {}, {}, {})", self.r, self.g, self.b, self.a)
    }
}

/// All markups of one page, in creation order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageMarkups {
    markups: Vec<Markup>,
}

impl PageMarkups {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Markup> {
        self.markups.iter()
    }

    pub fn len(&self) -> usize {
        self.markups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markups.is_empty()
    }

    pub fn get(&self, id: &MarkupId) -> Option<&Markup> {
        self.markups.iter().find(|m| &m.id == id)
    }

    pub fn get_mut(&mut self, id: &MarkupId) -> Option<&mut Markup> {
        self.markups.iter_mut().find(|m| &m.id == id)
    }

    /// Append a markup. A markup with a duplicate id replaces the original
    /// in place instead, keeping ids unique within the set.
    pub fn push(&mut self, markup: Markup) {
        match self.get_mut(&markup.id) {
            Some(existing) => *existing = markup,
            None => self.markups.push(markup),
        }
    }

    /// Remove by id. Returns whether anything was removed.
    pub fn remove(&mut self, id: &MarkupId) -> bool {
        let before = self.markups.len();
        self.markups.retain(|m| &m.id != id);
        self.markups.len() != before
    }

    /// Decode a persisted JSON value leniently: entries that fail to decode
    /// are logged and skipped instead of poisoning the whole page.
    pub fn from_value(value: &serde_json::Value) -> PageMarkups {
        let mut out = PageMarkups::new();
        let entries = match value.get("markups").and_then(|m| m.as_array()) {
            Some(entries) => entries,
            None => return out,
        };
        for entry in entries {
            match serde_json::from_value::<Markup>(entry.clone()) {
                Ok(markup) => out.push(markup),
                Err(e) => log::warn!("skipping malformed markup entry: {e}"),
            }
        }
        out
    }
}

impl From<Vec<Markup>> for PageMarkups {
    fn from(markups: Vec<Markup>) -> Self {
        let mut out = PageMarkups::new();
        for markup in markups {
            out.push(markup);
        }
        out
    }
}

impl<'a> IntoIterator for &'a PageMarkups {
    type Item = &'a Markup;
    type IntoIter = std::slice::Iter<'a, Markup>;

    fn into_iter(self) -> Self::IntoIter {
        self.markups.iter()
    }
}

/// Plain-text export of a page's highlights and underlines. Notes are not
/// included. `None` when the page has no text markups to export.
pub fn export_text(url: &str, markups: &PageMarkups) -> Option<String> {
    let text_markups: Vec<&Markup> = markups
        .iter()
        .filter(|m| matches!(m.kind, MarkupKind::Highlight | MarkupKind::Underline))
        .collect();
    if text_markups.is_empty() {
        return None;
    }
    let mut out = format!("Source: {url}");
    for markup in text_markups {
        out.push_str(&format!("\n---\n\"{}\"", markup.text));
    }
    Some(out)
}
