use super::{NodeId, Page};

/// A position inside a text node, as a byte offset into its content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Boundary {
    pub node: NodeId,
    pub offset: usize,
}

impl Boundary {
    pub fn new(node: NodeId, offset: usize) -> Self {
        Boundary { node, offset }
    }
}

/// A contiguous span of page text, start inclusive, end exclusive.
///
/// Both endpoints sit inside text nodes and `start` must not come after
/// `end` in document order. Offsets are byte offsets; lookups snap them
/// back to the nearest character boundary rather than fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextRange {
    pub start: Boundary,
    pub end: Boundary,
}

impl TextRange {
    pub fn new(start: Boundary, end: Boundary) -> Self {
        TextRange { start, end }
    }

    pub fn is_collapsed(&self) -> bool {
        self.start == self.end
    }
}

fn snap_to_char_boundary(text: &str, offset: usize) -> usize {
    let mut at = offset.min(text.len());
    while at > 0 && !text.is_char_boundary(at) {
        at -= 1;
    }
    at
}

impl Page {
    /// Text nodes covered by `range` in document order, each with the byte
    /// span that falls inside the range. Empty when either endpoint is not
    /// an attached text node.
    pub(crate) fn range_slices(&self, range: &TextRange) -> Vec<(NodeId, std::ops::Range<usize>)> {
        let order = self.text_nodes();
        let start_at = order.iter().position(|&n| n == range.start.node);
        let end_at = order.iter().position(|&n| n == range.end.node);
        let (start_at, end_at) = match (start_at, end_at) {
            (Some(s), Some(e)) if s <= e => (s, e),
            _ => return Vec::new(),
        };

        let mut slices = Vec::new();
        for &node in &order[start_at..=end_at] {
            let text = match self.text(node) {
                Some(text) => text,
                None => continue,
            };
            let from = if node == range.start.node {
                snap_to_char_boundary(text, range.start.offset)
            } else {
                0
            };
            let to = if node == range.end.node {
                snap_to_char_boundary(text, range.end.offset)
            } else {
                text.len()
            };
            if from < to {
                slices.push((node, from..to));
            }
        }
        slices
    }

    /// The text captured by `range`.
    pub fn range_text(&self, range: &TextRange) -> String {
        let mut out = String::new();
        for (node, span) in self.range_slices(range) {
            if let Some(text) = self.text(node) {
                out.push_str(&text[span]);
            }
        }
        out
    }

    /// Find the first occurrence of `needle` inside a single text node of
    /// page content, skipping engine artifact regions.
    pub fn find_text(&self, needle: &str) -> Option<TextRange> {
        if needle.is_empty() {
            return None;
        }
        for node in self.text_nodes() {
            if self.region_of(node).is_some() {
                continue;
            }
            if let Some(text) = self.text(node) {
                if let Some(at) = text.find(needle) {
                    return Some(TextRange::new(
                        Boundary::new(node, at),
                        Boundary::new(node, at + needle.len()),
                    ));
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Region;

    #[test]
    fn test_range_text_within_one_node() {
        let page = Page::from_html("<p>hello world</p>").unwrap();
        let range = page.find_text("lo wor").unwrap();
        assert_eq!(page.range_text(&range), "lo wor");
    }

    #[test]
    fn test_range_text_spans_multiple_nodes() {
        let page = Page::from_html("<p>one <b>two</b> three</p>").unwrap();
        let start = page.find_text("one ").unwrap().start;
        let end = page.find_text(" three").unwrap().end;
        let range = TextRange::new(start, end);
        assert_eq!(page.range_text(&range), "one two three");
    }

    #[test]
    fn test_collapsed_range_captures_nothing() {
        let page = Page::from_html("<p>text</p>").unwrap();
        let start = page.find_text("text").unwrap().start;
        let range = TextRange::new(start, start);
        assert!(range.is_collapsed());
        assert_eq!(page.range_text(&range), "");
        assert!(page.range_slices(&range).is_empty());
    }

    #[test]
    fn test_range_with_detached_endpoint_is_empty() {
        let mut page = Page::from_html("<p>gone</p>").unwrap();
        let range = page.find_text("gone").unwrap();
        let para = page.children(page.root())[0];
        page.remove(para);
        assert!(page.range_slices(&range).is_empty());
    }

    #[test]
    fn test_offsets_snap_to_char_boundaries() {
        let page = Page::from_html("<p>caf\u{e9} au lait</p>").unwrap();
        let found = page.find_text("café").unwrap();
        // Push the end offset into the middle of the two-byte 'é'.
        let mid = TextRange::new(found.start, Boundary::new(found.end.node, found.end.offset - 1));
        assert_eq!(page.range_text(&mid), "caf");
    }

    #[test]
    fn test_find_text_skips_artifact_regions() {
        let mut page = Page::from_html("<p>body</p>").unwrap();
        let para = page.children(page.root())[0];
        let panel = page.create_element("div");
        let note_text = page.create_text("body of the note");
        page.set_region(panel, Region::Note);
        page.append_child(panel, note_text);
        let root = page.root();
        // The panel comes first in document order but must not win the search.
        page.insert_before(root, panel, para);

        let range = page.find_text("body").unwrap();
        assert_eq!(page.region_of(range.start.node), None);
        assert_eq!(page.parent(range.start.node), Some(para));
    }
}
