//! In-memory page tree.
//!
//! The engine does not run inside a browser; it owns a small arena-backed
//! tree standing in for the host page. Every structural or textual change
//! goes through [`Page`] methods and is appended to a mutation log, which is
//! what the reconciliation loop observes. Engine-created artifacts (overlay
//! rectangles, sticky notes, the selection toolbar) are tagged with a
//! [`Region`] so observers can tell self-caused mutations from foreign ones.

mod parse;
mod range;

pub use parse::ParseError;
pub use range::{Boundary, TextRange};

/// Handle to a node in a [`Page`] arena. Ids are never reused within a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Artifact regions the engine mounts into the page.
///
/// A mutation targeting a node inside any of these regions is self-caused
/// and must not feed back into the reconciliation loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    /// Container for highlight/underline rectangles.
    Overlay,
    /// A sticky note panel.
    Note,
    /// The selection prompt toolbar.
    Toolbar,
}

/// The kinds of change the page records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    /// A node was attached to or detached from the target's child list.
    ChildList,
    /// The content of the target text node changed.
    CharacterData,
    /// An attribute on the target element changed.
    Attributes,
}

/// One entry in the page's mutation log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationRecord {
    pub seq: u64,
    pub kind: MutationKind,
    /// The node whose child list, text or attributes changed.
    pub target: NodeId,
    /// The subject of the change: the attached or detached child for
    /// [`MutationKind::ChildList`] records, the target itself otherwise.
    /// Region filtering tests this node, so detaching a region-tagged
    /// artifact still reads as self-caused.
    pub node: NodeId,
}

#[derive(Debug, Clone, PartialEq)]
enum NodeKind {
    Element {
        tag: String,
        attrs: Vec<(String, String)>,
    },
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
struct Node {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    region: Option<Region>,
    kind: NodeKind,
}

/// An in-memory page tree with a mutation log.
#[derive(Debug, Clone)]
pub struct Page {
    nodes: Vec<Node>,
    root: NodeId,
    log: Vec<MutationRecord>,
}

impl Page {
    /// Create an empty page with a `body` root element.
    pub fn new() -> Self {
        let mut page = Page {
            nodes: Vec::new(),
            root: NodeId(0),
            log: Vec::new(),
        };
        let root = page.alloc(NodeKind::Element {
            tag: "body".to_string(),
            attrs: Vec::new(),
        });
        page.root = root;
        page
    }

    /// Parse an HTML document into a page tree.
    pub fn from_html(html: &str) -> Result<Self, ParseError> {
        parse::parse_document(html)
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    fn alloc(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            parent: None,
            children: Vec::new(),
            region: None,
            kind,
        });
        id
    }

    fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    fn record(&mut self, kind: MutationKind, target: NodeId, node: NodeId) {
        let seq = self.log.len() as u64;
        self.log.push(MutationRecord {
            seq,
            kind,
            target,
            node,
        });
    }

    /// Create a detached element node.
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.alloc(NodeKind::Element {
            tag: tag.to_ascii_lowercase(),
            attrs: Vec::new(),
        })
    }

    /// Create a detached text node.
    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.alloc(NodeKind::Text(text.to_string()))
    }

    fn is_ancestor(&self, maybe_ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == maybe_ancestor {
                return true;
            }
            current = self.node(id).parent;
        }
        false
    }

    fn detach(&mut self, node: NodeId) {
        if let Some(parent) = self.node(node).parent {
            self.node_mut(parent).children.retain(|&c| c != node);
            self.node_mut(node).parent = None;
            self.record(MutationKind::ChildList, parent, node);
        }
    }

    /// Append `child` as the last child of `parent`, detaching it from any
    /// current parent first. Appending a node into its own subtree is a no-op.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        if self.is_ancestor(child, parent) {
            return;
        }
        self.detach(child);
        self.node_mut(child).parent = Some(parent);
        self.node_mut(parent).children.push(child);
        self.record(MutationKind::ChildList, parent, child);
    }

    /// Insert `child` into `parent` before `reference`. Falls back to an
    /// append when `reference` is not a child of `parent`.
    pub fn insert_before(&mut self, parent: NodeId, child: NodeId, reference: NodeId) {
        if self.is_ancestor(child, parent) {
            return;
        }
        self.detach(child);
        let position = self.node(parent).children.iter().position(|&c| c == reference);
        self.node_mut(child).parent = Some(parent);
        match position {
            Some(at) => self.node_mut(parent).children.insert(at, child),
            None => self.node_mut(parent).children.push(child),
        }
        self.record(MutationKind::ChildList, parent, child);
    }

    /// Detach `node` from the tree. Detached subtrees keep their ids but are
    /// unreachable from the root.
    pub fn remove(&mut self, node: NodeId) {
        self.detach(node);
    }

    /// Replace the content of a text node. Ignored for elements.
    pub fn set_text(&mut self, node: NodeId, text: &str) {
        if let NodeKind::Text(content) = &mut self.node_mut(node).kind {
            *content = text.to_string();
            self.record(MutationKind::CharacterData, node, node);
        }
    }

    /// Set or replace an attribute. Ignored for text nodes.
    pub fn set_attr(&mut self, node: NodeId, name: &str, value: &str) {
        if let NodeKind::Element { attrs, .. } = &mut self.node_mut(node).kind {
            match attrs.iter_mut().find(|(n, _)| n == name) {
                Some(entry) => entry.1 = value.to_string(),
                None => attrs.push((name.to_string(), value.to_string())),
            }
            self.record(MutationKind::Attributes, node, node);
        }
    }

    pub fn attr(&self, node: NodeId, name: &str) -> Option<&str> {
        match &self.node(node).kind {
            NodeKind::Element { attrs, .. } => attrs
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.as_str()),
            NodeKind::Text(_) => None,
        }
    }

    pub fn attrs(&self, node: NodeId) -> &[(String, String)] {
        match &self.node(node).kind {
            NodeKind::Element { attrs, .. } => attrs,
            NodeKind::Text(_) => &[],
        }
    }

    pub fn tag(&self, node: NodeId) -> Option<&str> {
        match &self.node(node).kind {
            NodeKind::Element { tag, .. } => Some(tag.as_str()),
            NodeKind::Text(_) => None,
        }
    }

    /// Content of a text node, or `None` for elements.
    pub fn text(&self, node: NodeId) -> Option<&str> {
        match &self.node(node).kind {
            NodeKind::Text(content) => Some(content.as_str()),
            NodeKind::Element { .. } => None,
        }
    }

    pub fn is_text(&self, node: NodeId) -> bool {
        matches!(self.node(node).kind, NodeKind::Text(_))
    }

    pub fn is_element(&self, node: NodeId) -> bool {
        matches!(self.node(node).kind, NodeKind::Element { .. })
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.node(node).parent
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        &self.node(node).children
    }

    /// Tag a node as belonging to an engine artifact region.
    pub fn set_region(&mut self, node: NodeId, region: Region) {
        self.node_mut(node).region = Some(region);
    }

    /// The artifact region containing `node`, if any. Checks the node itself
    /// and then its ancestors, so region tags cover whole subtrees.
    pub fn region_of(&self, node: NodeId) -> Option<Region> {
        let mut current = Some(node);
        while let Some(id) = current {
            if let Some(region) = self.node(id).region {
                return Some(region);
            }
            current = self.node(id).parent;
        }
        None
    }

    pub fn is_attached(&self, node: NodeId) -> bool {
        node == self.root || self.is_ancestor(self.root, node)
    }

    /// All nodes of the subtree rooted at `node`, in document order,
    /// including `node` itself.
    pub fn subtree(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![node];
        while let Some(id) = stack.pop() {
            out.push(id);
            for &child in self.node(id).children.iter().rev() {
                stack.push(child);
            }
        }
        out
    }

    /// All text nodes of the page in document order.
    pub fn text_nodes(&self) -> Vec<NodeId> {
        self.subtree(self.root)
            .into_iter()
            .filter(|&id| self.is_text(id))
            .collect()
    }

    /// First element in document order with the given `id` attribute.
    pub fn element_by_id(&self, id: &str) -> Option<NodeId> {
        self.subtree(self.root)
            .into_iter()
            .find(|&n| self.is_element(n) && self.attr(n, "id") == Some(id))
    }

    /// Concatenated text content of the subtree rooted at `node`.
    pub fn text_content(&self, node: NodeId) -> String {
        let mut out = String::new();
        for id in self.subtree(node) {
            if let NodeKind::Text(content) = &self.node(id).kind {
                out.push_str(content);
            }
        }
        out
    }

    /// Sequence number one past the latest mutation record.
    pub fn mutation_seq(&self) -> u64 {
        self.log.len() as u64
    }

    /// Records appended at or after `seq`, oldest first.
    pub fn mutations_since(&self, seq: u64) -> &[MutationRecord] {
        let start = (seq as usize).min(self.log.len());
        &self.log[start..]
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}
