//! Structural anchors.
//!
//! A markup must survive page reloads, so its position is stored as a pair
//! of node paths plus byte offsets rather than as node handles. Paths are a
//! small XPath-like dialect: `/html/body/div[1]/p[2]/text()[1]`, with an id
//! short-circuit (`//*[@id="intro"]/text()[3]`) whenever an ancestor
//! carries an `id` attribute. Ordinals are 1-based and count same-tag
//! element siblings, or text-node siblings for `text()` steps.
//!
//! Resolution is positional. If same-tag siblings are reordered the path
//! resolves to whatever node now occupies the recorded position; if the
//! node is gone the path stops resolving and the markup is skipped.

use crate::dom::{Boundary, NodeId, Page, TextRange};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
#[error("invalid node path `{path}`")]
pub struct PathParseError {
    path: String,
}

/// One step of a [`NodePath`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathStep {
    /// Jump to the first element in document order with this `id` attribute.
    /// Only ever the first step of a path.
    ById(String),
    /// The `ordinal`-th child element with this tag, 1-based.
    Child { tag: String, ordinal: usize },
    /// The `ordinal`-th child text node, 1-based.
    TextNode { ordinal: usize },
}

/// A structural path from the page root (or an id anchor) down to one node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct NodePath {
    steps: Vec<PathStep>,
}

impl NodePath {
    pub fn steps(&self) -> &[PathStep] {
        &self.steps
    }

    /// Compute the path of `node`. Walks up towards the root, stopping early
    /// at the first element with a usable `id`. `None` when the node is
    /// detached from the page.
    pub fn of(page: &Page, node: NodeId) -> Option<NodePath> {
        let mut steps = Vec::new();
        let mut current = node;
        loop {
            if page.is_element(current) {
                if let Some(id) = page.attr(current, "id") {
                    // Ids containing a double quote cannot be round-tripped
                    // through the path syntax; fall back to ordinals.
                    if !id.is_empty() && !id.contains('"') {
                        steps.push(PathStep::ById(id.to_string()));
                        break;
                    }
                }
            }
            if current == page.root() {
                break;
            }
            let parent = page.parent(current)?;
            let siblings = page.children(parent);
            let preceding = siblings.iter().take_while(|&&s| s != current);
            let step = if page.is_text(current) {
                let ordinal = preceding.filter(|&&s| page.is_text(s)).count() + 1;
                PathStep::TextNode { ordinal }
            } else {
                let tag = page.tag(current)?.to_string();
                let ordinal = preceding
                    .filter(|&&s| page.tag(s) == Some(tag.as_str()))
                    .count()
                    + 1;
                PathStep::Child { tag, ordinal }
            };
            steps.push(step);
            current = parent;
        }
        steps.reverse();
        Some(NodePath { steps })
    }

    /// Resolve the path against a page. Positional: returns whatever node
    /// currently occupies the recorded position, or `None`.
    pub fn resolve(&self, page: &Page) -> Option<NodeId> {
        let mut steps = self.steps.iter();
        let mut current = match self.steps.first() {
            Some(PathStep::ById(id)) => {
                steps.next();
                page.element_by_id(id)?
            }
            _ => page.root(),
        };
        for step in steps {
            current = match step {
                PathStep::ById(id) => page.element_by_id(id)?,
                PathStep::Child { tag, ordinal } => {
                    nth_child_element(page, current, tag, *ordinal)?
                }
                PathStep::TextNode { ordinal } => nth_text_child(page, current, *ordinal)?,
            };
        }
        Some(current)
    }
}

fn nth_child_element(page: &Page, parent: NodeId, tag: &str, ordinal: usize) -> Option<NodeId> {
    page.children(parent)
        .iter()
        .filter(|&&c| page.tag(c) == Some(tag))
        .nth(ordinal.checked_sub(1)?)
        .copied()
}

fn nth_text_child(page: &Page, parent: NodeId, ordinal: usize) -> Option<NodeId> {
    page.children(parent)
        .iter()
        .filter(|&&c| page.is_text(c))
        .nth(ordinal.checked_sub(1)?)
        .copied()
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut steps = self.steps.iter();
        match self.steps.first() {
            Some(PathStep::ById(id)) => {
                steps.next();
                write!(f, "//*[@id=\"{id}\"]")?;
            }
            _ => write!(f, "/html/body")?,
        }
        for step in steps {
            match step {
                PathStep::ById(id) => write!(f, "//*[@id=\"{id}\"]")?,
                PathStep::Child { tag, ordinal } => write!(f, "/{tag}[{ordinal}]")?,
                PathStep::TextNode { ordinal } => write!(f, "/text()[{ordinal}]")?,
            }
        }
        Ok(())
    }
}

impl FromStr for NodePath {
    type Err = PathParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || PathParseError {
            path: s.to_string(),
        };
        let mut steps = Vec::new();
        let rest = if let Some(tail) = s.strip_prefix("//*[@id=\"") {
            let quote = tail.find('"').ok_or_else(&bad)?;
            let id = &tail[..quote];
            if id.is_empty() {
                return Err(bad());
            }
            steps.push(PathStep::ById(id.to_string()));
            tail[quote..].strip_prefix("\"]").ok_or_else(&bad)?
        } else {
            s.strip_prefix("/html/body").ok_or_else(&bad)?
        };

        let mut rest = rest;
        while !rest.is_empty() {
            rest = rest.strip_prefix('/').ok_or_else(&bad)?;
            let end = rest.find('/').unwrap_or(rest.len());
            let segment = &rest[..end];
            rest = &rest[end..];
            steps.push(parse_segment(segment).ok_or_else(&bad)?);
        }
        Ok(NodePath { steps })
    }
}

fn parse_segment(segment: &str) -> Option<PathStep> {
    let (head, ordinal) = segment
        .strip_suffix(']')
        .and_then(|s| s.split_once('['))?;
    let ordinal: usize = ordinal.parse().ok()?;
    if ordinal == 0 {
        return None;
    }
    if head == "text()" {
        return Some(PathStep::TextNode { ordinal });
    }
    if head.is_empty()
        || !head
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return None;
    }
    Some(PathStep::Child {
        tag: head.to_string(),
        ordinal,
    })
}

impl Serialize for NodePath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for NodePath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// The persisted position of a highlight or underline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeAnchor {
    pub start_path: NodePath,
    pub start_offset: usize,
    pub end_path: NodePath,
    pub end_offset: usize,
}

impl RangeAnchor {
    /// Encode a live range into a durable anchor. `None` when an endpoint is
    /// not an attached text node.
    pub fn encode(page: &Page, range: &TextRange) -> Option<Self> {
        if !page.is_text(range.start.node) || !page.is_text(range.end.node) {
            return None;
        }
        Some(RangeAnchor {
            start_path: NodePath::of(page, range.start.node)?,
            start_offset: range.start.offset,
            end_path: NodePath::of(page, range.end.node)?,
            end_offset: range.end.offset,
        })
    }

    /// Decode back into a live range. `None` when either path no longer
    /// resolves to a text node, an offset is out of bounds or off a
    /// character boundary, or the endpoints are out of document order.
    pub fn decode(&self, page: &Page) -> Option<TextRange> {
        let start = self.start_path.resolve(page)?;
        let end = self.end_path.resolve(page)?;
        let start_text = page.text(start)?;
        let end_text = page.text(end)?;
        if !valid_offset(start_text, self.start_offset) || !valid_offset(end_text, self.end_offset)
        {
            return None;
        }

        let order = page.text_nodes();
        let start_at = order.iter().position(|&n| n == start)?;
        let end_at = order.iter().position(|&n| n == end)?;
        if start_at > end_at || (start_at == end_at && self.start_offset > self.end_offset) {
            return None;
        }
        Some(TextRange::new(
            Boundary::new(start, self.start_offset),
            Boundary::new(end, self.end_offset),
        ))
    }
}

fn valid_offset(text: &str, offset: usize) -> bool {
    offset <= text.len() && text.is_char_boundary(offset)
}

/// The persisted position of a sticky note: fixed document coordinates,
/// plus the range it was created from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteAnchor {
    pub top: f64,
    pub left: f64,
    pub origin: RangeAnchor,
}

/// Position data of any markup kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Anchor {
    Range(RangeAnchor),
    Note(NoteAnchor),
}

impl Anchor {
    pub fn as_range(&self) -> Option<&RangeAnchor> {
        match self {
            Anchor::Range(anchor) => Some(anchor),
            Anchor::Note(_) => None,
        }
    }

    pub fn as_note(&self) -> Option<&NoteAnchor> {
        match self {
            Anchor::Note(anchor) => Some(anchor),
            Anchor::Range(_) => None,
        }
    }
}
