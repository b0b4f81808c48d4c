//! Rectangle queries over a layout.

use crate::dom::{Page, TextRange};
use crate::layout::Layout;
use kurbo::Rect;

/// Closed-interval overlap test. Rectangles that merely touch at an edge or
/// corner count as overlapping.
pub fn rects_overlap(a: &Rect, b: &Rect) -> bool {
    a.x0 <= b.x1 && b.x0 <= a.x1 && a.y0 <= b.y1 && b.y0 <= a.y1
}

/// Smallest rectangle containing all of `rects`, or `None` for an empty list.
pub fn bounding_rect(rects: &[Rect]) -> Option<Rect> {
    let mut iter = rects.iter();
    let first = *iter.next()?;
    Some(iter.fold(first, |acc, r| acc.union(*r)))
}

/// Client rectangles of a text range: one rectangle per laid-out line run
/// the range touches, in reading order, in document-flow coordinates.
///
/// Empty when the range is collapsed or its endpoints are no longer
/// attached text nodes.
pub fn rects_of_range(page: &Page, layout: &Layout, range: &TextRange) -> Vec<Rect> {
    let char_width = layout.metrics().char_width;
    let mut rects = Vec::new();
    for (node, span) in page.range_slices(range) {
        let text = match page.text(node) {
            Some(text) => text,
            None => continue,
        };
        for fragment in layout.fragments_of(node) {
            let from = span.start.max(fragment.bytes.start);
            let to = span.end.min(fragment.bytes.end);
            if from >= to {
                continue;
            }
            let lead_chars = text[fragment.bytes.start..from].chars().count();
            let span_chars = text[from..to].chars().count();
            let x0 = fragment.rect.x0 + lead_chars as f64 * char_width;
            let x1 = x0 + span_chars as f64 * char_width;
            rects.push(Rect::new(x0, fragment.rect.y0, x1, fragment.rect.y1));
        }
    }
    rects
}
