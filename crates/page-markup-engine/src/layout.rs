//! Deterministic flow layout.
//!
//! The engine answers geometry questions without a real renderer: block
//! elements stack vertically, inline text wraps greedily at a fixed
//! character width, like a monospace rendering of the page. Every text node
//! gets a list of [`Fragment`]s, one per laid-out line run, which is what
//! range geometry is computed from.
//!
//! All coordinates are document-flow coordinates. Scrolling never changes
//! them; resizing the viewport does, because line wrapping changes.

use crate::dom::{NodeId, Page};
use kurbo::Rect;
use std::collections::HashMap;
use std::ops::Range;

/// Monospace font metrics driving the layout.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutMetrics {
    pub char_width: f64,
    pub line_height: f64,
    pub block_gap: f64,
    pub page_margin: f64,
}

impl Default for LayoutMetrics {
    fn default() -> Self {
        LayoutMetrics {
            char_width: 8.0,
            line_height: 18.0,
            block_gap: 8.0,
            page_margin: 16.0,
        }
    }
}

/// Host viewport dimensions and scroll position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
    pub scroll_x: f64,
    pub scroll_y: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Viewport {
            width: 1024.0,
            height: 768.0,
            scroll_x: 0.0,
            scroll_y: 0.0,
        }
    }
}

/// A run of one text node laid out on one line.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    pub node: NodeId,
    /// Byte span of the node's content covered by this fragment.
    pub bytes: Range<usize>,
    pub rect: Rect,
}

/// The geometry of a page at one viewport width.
#[derive(Debug, Clone)]
pub struct Layout {
    metrics: LayoutMetrics,
    fragments: Vec<Fragment>,
    boxes: HashMap<NodeId, Rect>,
    content_height: f64,
}

impl Layout {
    pub fn metrics(&self) -> &LayoutMetrics {
        &self.metrics
    }

    /// All fragments in document order.
    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    /// Fragments of one text node, in byte order.
    pub fn fragments_of(&self, node: NodeId) -> impl Iterator<Item = &Fragment> {
        self.fragments.iter().filter(move |f| f.node == node)
    }

    /// Bounding box of a block element.
    pub fn box_of(&self, node: NodeId) -> Option<Rect> {
        self.boxes.get(&node).copied()
    }

    pub fn content_height(&self) -> f64 {
        self.content_height
    }
}

const BLOCK_TAGS: &[&str] = &[
    "address",
    "article",
    "aside",
    "blockquote",
    "body",
    "div",
    "dd",
    "dl",
    "dt",
    "fieldset",
    "figcaption",
    "figure",
    "footer",
    "form",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "header",
    "hr",
    "html",
    "li",
    "main",
    "nav",
    "ol",
    "p",
    "pre",
    "section",
    "table",
    "tbody",
    "td",
    "th",
    "thead",
    "tr",
    "ul",
];

fn is_block(page: &Page, node: NodeId) -> bool {
    page.tag(node)
        .map(|tag| BLOCK_TAGS.contains(&tag))
        .unwrap_or(false)
}

/// Lay out a page at the given viewport width.
pub fn layout_page(page: &Page, metrics: &LayoutMetrics, viewport: &Viewport) -> Layout {
    let left = metrics.page_margin;
    let right = (viewport.width - metrics.page_margin).max(left + metrics.char_width);
    let mut flow = Flow {
        page,
        metrics,
        left,
        right,
        x: left,
        y: metrics.page_margin,
        fragments: Vec::new(),
        boxes: HashMap::new(),
    };
    flow.layout_block(page.root());
    let content_height = flow.y + metrics.page_margin;
    Layout {
        metrics: *metrics,
        fragments: flow.fragments,
        boxes: flow.boxes,
        content_height,
    }
}

struct Flow<'a> {
    page: &'a Page,
    metrics: &'a LayoutMetrics,
    left: f64,
    right: f64,
    x: f64,
    y: f64,
    fragments: Vec<Fragment>,
    boxes: HashMap<NodeId, Rect>,
}

impl<'a> Flow<'a> {
    fn layout_block(&mut self, node: NodeId) {
        let page = self.page;
        if page.region_of(node).is_some() {
            // Engine artifacts are out of flow.
            return;
        }
        let top = self.y;
        let mut content_started = false;
        for &child in page.children(node) {
            if is_block(page, child) {
                self.close_line();
                if content_started {
                    self.y += self.metrics.block_gap;
                }
                self.layout_block(child);
            } else {
                self.flow_inline(child);
            }
            content_started = true;
        }
        self.close_line();
        self.boxes
            .insert(node, Rect::new(self.left, top, self.right, self.y));
    }

    fn flow_inline(&mut self, node: NodeId) {
        let page = self.page;
        if page.region_of(node).is_some() {
            return;
        }
        if page.is_text(node) {
            self.flow_text(node);
            return;
        }
        for &child in page.children(node) {
            self.flow_inline(child);
        }
    }

    fn flow_text(&mut self, node: NodeId) {
        let page = self.page;
        let text: &'a str = match page.text(node) {
            Some(text) => text,
            None => return,
        };
        let mut token_start = 0;
        let mut token_is_space = false;
        let mut token_chars = 0usize;

        for (at, ch) in text.char_indices() {
            if ch == '\n' {
                self.place_token(node, token_start, at, token_chars, token_is_space);
                self.new_line();
                token_start = at + 1;
                token_chars = 0;
                continue;
            }
            let is_space = ch.is_whitespace();
            if token_start < at && is_space != token_is_space {
                self.place_token(node, token_start, at, token_chars, token_is_space);
                token_start = at;
                token_chars = 0;
            }
            if token_start == at {
                token_is_space = is_space;
            }
            token_chars += 1;
        }
        self.place_token(node, token_start, text.len(), token_chars, token_is_space);
    }

    /// Place one word or whitespace token, wrapping before words that no
    /// longer fit. Trailing whitespace is allowed to hang past the edge.
    fn place_token(&mut self, node: NodeId, start: usize, end: usize, chars: usize, is_space: bool) {
        if start == end {
            return;
        }
        let width = chars as f64 * self.metrics.char_width;
        if !is_space && self.x + width > self.right && self.x > self.left {
            self.new_line();
        }
        self.emit(node, start, end, width);
    }

    fn emit(&mut self, node: NodeId, start: usize, end: usize, width: f64) {
        let line_top = self.y;
        let line_bottom = self.y + self.metrics.line_height;
        if let Some(last) = self.fragments.last_mut() {
            let contiguous =
                last.node == node && last.bytes.end == start && last.rect.y0 == line_top;
            if contiguous {
                last.bytes.end = end;
                last.rect.x1 += width;
                self.x += width;
                return;
            }
        }
        self.fragments.push(Fragment {
            node,
            bytes: start..end,
            rect: Rect::new(self.x, line_top, self.x + width, line_bottom),
        });
        self.x += width;
    }

    fn new_line(&mut self) {
        self.x = self.left;
        self.y += self.metrics.line_height;
    }

    fn close_line(&mut self) {
        if self.x > self.left {
            self.new_line();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn narrow_viewport(chars_per_line: usize, metrics: &LayoutMetrics) -> Viewport {
        Viewport {
            width: metrics.page_margin * 2.0 + chars_per_line as f64 * metrics.char_width,
            ..Viewport::default()
        }
    }

    #[test]
    fn test_single_line_fragment_geometry() {
        let page = Page::from_html("<p>hello world</p>").unwrap();
        let layout = layout_page(&page, &LayoutMetrics::default(), &Viewport::default());
        let text = page.text_nodes()[0];
        let fragments: Vec<_> = layout.fragments_of(text).collect();
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].bytes, 0..11);
        assert_eq!(fragments[0].rect, Rect::new(16.0, 16.0, 16.0 + 11.0 * 8.0, 34.0));
    }

    #[test]
    fn test_text_wraps_at_viewport_width() {
        let metrics = LayoutMetrics::default();
        let page = Page::from_html("<p>aaaa bbbb cccc</p>").unwrap();
        let layout = layout_page(&page, &metrics, &narrow_viewport(10, &metrics));
        let text = page.text_nodes()[0];
        let fragments: Vec<_> = layout.fragments_of(text).collect();
        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0].bytes, 0..10);
        assert_eq!(fragments[0].rect.y0, 16.0);
        assert_eq!(fragments[1].bytes, 10..14);
        assert_eq!(fragments[1].rect.y0, 34.0);
        assert_eq!(fragments[1].rect.x0, 16.0);
    }

    #[test]
    fn test_wider_viewport_unwraps_text() {
        let metrics = LayoutMetrics::default();
        let page = Page::from_html("<p>aaaa bbbb cccc</p>").unwrap();
        let narrow = layout_page(&page, &metrics, &narrow_viewport(10, &metrics));
        let wide = layout_page(&page, &metrics, &Viewport::default());
        let text = page.text_nodes()[0];
        assert_eq!(narrow.fragments_of(text).count(), 2);
        assert_eq!(wide.fragments_of(text).count(), 1);
    }

    #[test]
    fn test_blocks_stack_with_gap() {
        let metrics = LayoutMetrics::default();
        let page = Page::from_html("<p>one</p><p>two</p>").unwrap();
        let layout = layout_page(&page, &metrics, &Viewport::default());
        let first = page.children(page.root())[0];
        let second = page.children(page.root())[1];
        let first_box = layout.box_of(first).unwrap();
        let second_box = layout.box_of(second).unwrap();
        assert_eq!(first_box.y0, 16.0);
        assert_eq!(first_box.y1, 34.0);
        assert_eq!(second_box.y0, 34.0 + 8.0);
    }

    #[test]
    fn test_inline_elements_flow_on_the_same_line() {
        let page = Page::from_html("<p>one <b>two</b> three</p>").unwrap();
        let layout = layout_page(&page, &LayoutMetrics::default(), &Viewport::default());
        let tops: Vec<f64> = layout.fragments().iter().map(|f| f.rect.y0).collect();
        assert!(tops.iter().all(|&t| t == 16.0), "all fragments on one line: {tops:?}");
        // Fragments from the three text nodes sit flush against each other.
        let rects: Vec<Rect> = layout.fragments().iter().map(|f| f.rect).collect();
        assert_eq!(rects[0].x1, rects[1].x0);
        assert_eq!(rects[1].x1, rects[2].x0);
    }

    #[test]
    fn test_newlines_force_line_breaks() {
        let page = Page::from_html("<pre>one\ntwo</pre>").unwrap();
        let layout = layout_page(&page, &LayoutMetrics::default(), &Viewport::default());
        let text = page.text_nodes()[0];
        let fragments: Vec<_> = layout.fragments_of(text).collect();
        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[1].rect.y0 - fragments[0].rect.y0, 18.0);
    }

    #[test]
    fn test_artifact_subtrees_are_out_of_flow() {
        use crate::dom::Region;
        let mut page = Page::from_html("<p>content</p>").unwrap();
        let panel = page.create_element("div");
        let inner = page.create_text("sticky note text");
        page.set_region(panel, Region::Note);
        page.append_child(panel, inner);
        let root = page.root();
        page.append_child(root, panel);

        let layout = layout_page(&page, &LayoutMetrics::default(), &Viewport::default());
        assert!(layout.fragments_of(inner).next().is_none());
        let with_panel = layout.content_height();

        page.remove(panel);
        let without_panel =
            layout_page(&page, &LayoutMetrics::default(), &Viewport::default()).content_height();
        assert_eq!(with_panel, without_panel);
    }

    #[test]
    fn test_long_word_overflows_instead_of_splitting() {
        let metrics = LayoutMetrics::default();
        let page = Page::from_html("<p>abcdefghijklmnop</p>").unwrap();
        let layout = layout_page(&page, &metrics, &narrow_viewport(10, &metrics));
        let text = page.text_nodes()[0];
        let fragments: Vec<_> = layout.fragments_of(text).collect();
        assert_eq!(fragments.len(), 1);
        assert!(fragments[0].rect.x1 > 16.0 + 10.0 * 8.0);
    }

    #[test]
    fn test_multibyte_chars_count_once() {
        let page = Page::from_html("<p>caf\u{e9}</p>").unwrap();
        let layout = layout_page(&page, &LayoutMetrics::default(), &Viewport::default());
        let fragment = &layout.fragments()[0];
        assert_eq!(fragment.rect.width(), 4.0 * 8.0);
        assert_eq!(fragment.bytes.len(), 5);
    }
}
