//! Overlay rendering and incremental reconciliation.
//!
//! Highlights and underlines are painted as absolutely positioned rectangle
//! elements inside a single overlay container; notes are floating panels
//! appended to the page root. [`OverlayLayer::sync`] reconciles the
//! rendered elements against a target markup set: rectangles are reused
//! positionally per markup id and patched in place, surplus rectangles are
//! destroyed, and note panels are rebuilt from scratch every pass. Running
//! the same sync twice therefore creates and destroys no rectangles the
//! second time.
//!
//! Every element the layer creates is tagged with a [`Region`] so the
//! change observer can recognize these mutations as self-caused.

use crate::anchor::NoteAnchor;
use crate::dom::{NodeId, Page, Region};
use crate::geometry::{rects_of_range, rects_overlap};
use crate::layout::Layout;
use crate::markup::{Markup, MarkupId, MarkupKind, PageMarkups, Rgba};
use kurbo::Rect;

/// Element id of the overlay container.
pub const OVERLAY_CONTAINER_ID: &str = "markup-highlight-overlay";
/// CSS class of note panels.
pub const NOTE_CLASS: &str = "markup-sticky-note";
/// Highlight fills are drawn half transparent over the page text.
pub const HIGHLIGHT_ALPHA: f64 = 0.5;

/// Counts of concrete element operations performed by one sync pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Rectangle elements created.
    pub rects_created: usize,
    /// Rectangle elements patched in place.
    pub rects_updated: usize,
    /// Rectangle elements destroyed.
    pub rects_removed: usize,
    /// Note panels rendered; notes are rebuilt every pass.
    pub notes_rendered: usize,
    /// Markups whose anchors no longer decode to visible text.
    pub skipped: usize,
}

#[derive(Debug, Clone)]
struct RenderedRect {
    markup_id: MarkupId,
    node: NodeId,
    rect: Rect,
}

#[derive(Debug, Clone)]
struct NotePanel {
    markup_id: MarkupId,
    node: NodeId,
    text_node: NodeId,
}

/// The engine's visual layer over one page.
#[derive(Debug, Default)]
pub struct OverlayLayer {
    container: Option<NodeId>,
    rects: Vec<RenderedRect>,
    notes: Vec<NotePanel>,
}

impl OverlayLayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mount the overlay container into the page. Idempotent.
    pub fn mount(&mut self, page: &mut Page) {
        if self.container.is_some() {
            return;
        }
        let container = page.create_element("div");
        page.set_region(container, Region::Overlay);
        page.set_attr(container, "id", OVERLAY_CONTAINER_ID);
        let root = page.root();
        page.append_child(root, container);
        self.container = Some(container);
    }

    /// Remove the container, every rectangle and every note panel.
    pub fn unmount(&mut self, page: &mut Page) {
        if let Some(container) = self.container.take() {
            page.remove(container);
        }
        for panel in self.notes.drain(..) {
            page.remove(panel.node);
        }
        self.rects.clear();
    }

    pub fn is_mounted(&self) -> bool {
        self.container.is_some()
    }

    pub fn container(&self) -> Option<NodeId> {
        self.container
    }

    /// Rendered rectangles in render order.
    pub fn rendered_rects(&self) -> impl Iterator<Item = (&MarkupId, Rect)> {
        self.rects.iter().map(|r| (&r.markup_id, r.rect))
    }

    /// Live note panels in render order.
    pub fn note_panels(&self) -> impl Iterator<Item = (&MarkupId, NodeId)> {
        self.notes.iter().map(|n| (&n.markup_id, n.node))
    }

    /// The text node holding a note panel's body.
    pub fn note_text_node(&self, id: &MarkupId) -> Option<NodeId> {
        self.notes
            .iter()
            .find(|n| &n.markup_id == id)
            .map(|n| n.text_node)
    }

    /// First rendered markup, in render order, whose rectangles overlap any
    /// of `rects`.
    pub fn find_overlapping(&self, rects: &[Rect]) -> Option<&MarkupId> {
        self.rects
            .iter()
            .find(|rendered| rects.iter().any(|r| rects_overlap(r, &rendered.rect)))
            .map(|rendered| &rendered.markup_id)
    }

    /// Reconcile the rendered overlay against the full markup set.
    ///
    /// Markups that fail to decode, or decode to nothing visible, leave no
    /// elements behind and are counted as skipped. Without a mounted
    /// container this is a no-op.
    pub fn sync(&mut self, page: &mut Page, layout: &Layout, markups: &PageMarkups) -> SyncStats {
        let container = match self.container {
            Some(container) => container,
            None => return SyncStats::default(),
        };
        let mut stats = SyncStats::default();

        let mut live: Vec<&MarkupId> = Vec::new();
        for markup in markups.iter() {
            if markup.kind == MarkupKind::Note {
                continue;
            }
            live.push(&markup.id);
            let decoded = markup.anchor.as_range().and_then(|a| a.decode(page));
            let rects = decoded
                .map(|range| rects_of_range(page, layout, &range))
                .unwrap_or_default();
            if rects.is_empty() {
                log::debug!("markup {} no longer anchors, skipping", markup.id);
                stats.skipped += 1;
                stats.rects_removed += self.remove_rects_for(page, &markup.id);
                continue;
            }
            self.reconcile_rects(page, container, markup, &rects, &mut stats);
        }

        // Rectangles of markups that vanished from the set entirely.
        let mut stale: Vec<MarkupId> = Vec::new();
        for rendered in &self.rects {
            if !live.contains(&&rendered.markup_id) && !stale.contains(&rendered.markup_id) {
                stale.push(rendered.markup_id.clone());
            }
        }
        for id in &stale {
            stats.rects_removed += self.remove_rects_for(page, id);
        }

        // Notes are destroyed and recreated wholesale each pass.
        for panel in self.notes.drain(..) {
            page.remove(panel.node);
        }
        for markup in markups.iter() {
            if markup.kind != MarkupKind::Note {
                continue;
            }
            match markup.anchor.as_note() {
                Some(anchor) => {
                    create_note_panel(page, &mut self.notes, markup, anchor);
                    stats.notes_rendered += 1;
                }
                None => {
                    log::debug!("note {} has no panel position, skipping", markup.id);
                    stats.skipped += 1;
                }
            }
        }
        stats
    }

    /// Draw a single markup immediately, ahead of the next full sync.
    pub fn render_markup(&mut self, page: &mut Page, layout: &Layout, markup: &Markup) {
        let container = match self.container {
            Some(container) => container,
            None => return,
        };
        if markup.kind == MarkupKind::Note {
            if self.notes.iter().any(|n| n.markup_id == markup.id) {
                return;
            }
            if let Some(anchor) = markup.anchor.as_note() {
                create_note_panel(page, &mut self.notes, markup, anchor);
            }
            return;
        }
        let decoded = markup.anchor.as_range().and_then(|a| a.decode(page));
        let rects = decoded
            .map(|range| rects_of_range(page, layout, &range))
            .unwrap_or_default();
        if !rects.is_empty() {
            let mut stats = SyncStats::default();
            self.reconcile_rects(page, container, markup, &rects, &mut stats);
        }
    }

    /// Destroy all elements of one markup, whatever its kind.
    pub fn remove_markup(&mut self, page: &mut Page, id: &MarkupId) {
        self.remove_rects_for(page, id);
        if let Some(at) = self.notes.iter().position(|n| &n.markup_id == id) {
            let panel = self.notes.remove(at);
            page.remove(panel.node);
        }
    }

    fn remove_rects_for(&mut self, page: &mut Page, id: &MarkupId) -> usize {
        let doomed: Vec<NodeId> = self
            .rects
            .iter()
            .filter(|r| &r.markup_id == id)
            .map(|r| r.node)
            .collect();
        for node in &doomed {
            page.remove(*node);
        }
        self.rects.retain(|r| &r.markup_id != id);
        doomed.len()
    }

    fn reconcile_rects(
        &mut self,
        page: &mut Page,
        container: NodeId,
        markup: &Markup,
        target: &[Rect],
        stats: &mut SyncStats,
    ) {
        let existing: Vec<NodeId> = self
            .rects
            .iter()
            .filter(|r| r.markup_id == markup.id)
            .map(|r| r.node)
            .collect();

        for (i, &rect) in target.iter().enumerate() {
            match existing.get(i) {
                Some(&node) => {
                    style_rect(page, node, markup, rect);
                    if let Some(entry) = self.rects.iter_mut().find(|r| r.node == node) {
                        entry.rect = rect;
                    }
                    stats.rects_updated += 1;
                }
                None => {
                    let node = page.create_element("div");
                    page.set_region(node, Region::Overlay);
                    style_rect(page, node, markup, rect);
                    page.append_child(container, node);
                    self.rects.push(RenderedRect {
                        markup_id: markup.id.clone(),
                        node,
                        rect,
                    });
                    stats.rects_created += 1;
                }
            }
        }
        for &node in existing.iter().skip(target.len()) {
            page.remove(node);
            self.rects.retain(|r| r.node != node);
            stats.rects_removed += 1;
        }
    }
}

fn style_rect(page: &mut Page, node: NodeId, markup: &Markup, rect: Rect) {
    page.set_attr(node, "class", &format!("markup--{}", markup.kind.as_str()));
    page.set_attr(node, "data-markup-id", markup.id.as_str());

    let mut style = format!(
        "position:absolute;top:{}px;left:{}px;width:{}px;height:{}px;pointer-events:none;z-index:9998;",
        rect.y0,
        rect.x0,
        rect.width(),
        rect.height()
    );
    match (markup.kind, markup.effective_color()) {
        (MarkupKind::Highlight, Some(color)) => {
            if let Some(fill) = Rgba::from_hex(color, HIGHLIGHT_ALPHA) {
                style.push_str(&format!(
                    "background-color:{fill};box-shadow:0 0 2px 2px {fill};"
                ));
            }
        }
        (MarkupKind::Underline, Some(color)) => {
            style.push_str(&format!("border-bottom:2px solid {color};"));
        }
        _ => {}
    }
    page.set_attr(node, "style", &style);
}

fn create_note_panel(
    page: &mut Page,
    notes: &mut Vec<NotePanel>,
    markup: &Markup,
    anchor: &NoteAnchor,
) {
    let panel = page.create_element("div");
    page.set_region(panel, Region::Note);
    page.set_attr(panel, "id", markup.id.as_str());
    page.set_attr(panel, "class", NOTE_CLASS);
    page.set_attr(
        panel,
        "style",
        &format!("position:absolute;top:{}px;left:{}px;", anchor.top, anchor.left),
    );
    let text_node = page.create_text(&markup.text);
    page.set_region(text_node, Region::Note);
    page.append_child(panel, text_node);
    let root = page.root();
    page.append_child(root, panel);
    notes.push(NotePanel {
        markup_id: markup.id.clone(),
        node: panel,
        text_node,
    });
}
