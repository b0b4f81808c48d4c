//! Turning selections into markups.
//!
//! Releasing a text selection opens a prompt: a floating toolbar mounted
//! just above the selected text. Over plain text it offers the three
//! creation actions; over an already-marked span it offers removal of that
//! markup. Applying an action renders optimistically and persists through
//! the same read-modify-write the rest of the engine uses.

use crate::anchor::{Anchor, NoteAnchor, RangeAnchor};
use crate::dom::{NodeId, Page, Region, TextRange};
use crate::geometry::{bounding_rect, rects_of_range};
use crate::markup::{
    DEFAULT_HIGHLIGHT_COLOR, DEFAULT_UNDERLINE_COLOR, Markup, MarkupId, MarkupKind,
    is_valid_hex_color,
};
use crate::reconcile::Session;
use crate::store::MarkupStore;
use kurbo::Rect;

/// CSS class of the selection toolbar.
pub const TOOLBAR_CLASS: &str = "markup-toolbar";
/// Vertical gap between a selection and the toolbar above it.
pub const TOOLBAR_OFFSET_PX: f64 = 40.0;
/// Fixed left edge of newly created note panels.
pub const NOTE_LEFT_PX: f64 = 20.0;

/// What the open prompt offers.
#[derive(Debug, Clone, PartialEq)]
pub enum PromptKind {
    /// Create a markup over the selection.
    Create,
    /// Remove the existing markup the selection overlaps.
    Remove(MarkupId),
}

/// A button on the prompt toolbar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptAction {
    Highlight,
    Underline,
    Note,
    Remove,
    Dismiss,
}

/// The floating toolbar shown next to a released selection.
#[derive(Debug)]
pub struct Prompt {
    pub(crate) kind: PromptKind,
    pub(crate) node: NodeId,
    pub(crate) selection: TextRange,
}

impl Prompt {
    pub fn kind(&self) -> &PromptKind {
        &self.kind
    }

    /// The mounted toolbar element.
    pub fn node(&self) -> NodeId {
        self.node
    }
}

impl Session {
    /// The open prompt, if any.
    pub fn prompt(&self) -> Option<&Prompt> {
        self.prompt.as_ref()
    }

    /// React to a selection release: mount a prompt toolbar next to the
    /// selection, replacing any previous prompt.
    ///
    /// No prompt opens for a collapsed selection, or for a whitespace-only
    /// selection that does not overlap an existing markup. A release inside
    /// an engine artifact leaves the current prompt alone.
    pub fn open_prompt(&mut self, page: &mut Page, selection: &TextRange) -> Option<&Prompt> {
        if page.region_of(selection.start.node).is_some()
            || page.region_of(selection.end.node).is_some()
        {
            return self.prompt.as_ref();
        }
        self.dismiss_prompt(page);
        if selection.is_collapsed() {
            return None;
        }
        let layout = self.current_layout(page);
        let rects = rects_of_range(page, &layout, selection);
        let overlapping = self.overlay.find_overlapping(&rects).cloned();
        if overlapping.is_none() && page.range_text(selection).trim().is_empty() {
            return None;
        }
        let bounds = bounding_rect(&rects)?;
        let kind = match overlapping {
            Some(id) => PromptKind::Remove(id),
            None => PromptKind::Create,
        };
        let node = mount_toolbar(page, &kind, bounds);
        self.prompt = Some(Prompt {
            kind,
            node,
            selection: selection.clone(),
        });
        self.prompt.as_ref()
    }

    /// Close the prompt toolbar without acting on it.
    pub fn dismiss_prompt(&mut self, page: &mut Page) {
        if let Some(prompt) = self.prompt.take() {
            page.remove(prompt.node);
        }
    }

    /// Act on the open prompt. Returns the created or removed markup id.
    /// The prompt closes whatever the action was.
    pub fn apply_prompt<S: MarkupStore>(
        &mut self,
        page: &mut Page,
        store: &mut S,
        action: PromptAction,
    ) -> Option<MarkupId> {
        let prompt = self.prompt.take()?;
        page.remove(prompt.node);
        match (action, prompt.kind) {
            (PromptAction::Highlight, PromptKind::Create) => {
                self.create_markup(page, store, MarkupKind::Highlight, &prompt.selection)
            }
            (PromptAction::Underline, PromptKind::Create) => {
                self.create_markup(page, store, MarkupKind::Underline, &prompt.selection)
            }
            (PromptAction::Note, PromptKind::Create) => {
                self.create_markup(page, store, MarkupKind::Note, &prompt.selection)
            }
            (PromptAction::Remove, PromptKind::Remove(id)) => {
                self.remove_markup(page, store, &id);
                Some(id)
            }
            (PromptAction::Dismiss, _) => None,
            (action, kind) => {
                log::debug!("action {action:?} does not apply to a {kind:?} prompt");
                None
            }
        }
    }

    /// Create a markup over a selection, render it immediately and persist
    /// it. A new note starts empty and takes input focus.
    ///
    /// Persistence failures are logged; the optimistic render stays up and
    /// the next successful pass settles the difference.
    pub fn create_markup<S: MarkupStore>(
        &mut self,
        page: &mut Page,
        store: &mut S,
        kind: MarkupKind,
        selection: &TextRange,
    ) -> Option<MarkupId> {
        let origin = RangeAnchor::encode(page, selection)?;
        let layout = self.current_layout(page);
        let rects = rects_of_range(page, &layout, selection);
        let anchor = match kind {
            MarkupKind::Note => {
                let bounds = bounding_rect(&rects)?;
                Anchor::Note(NoteAnchor {
                    top: bounds.y0,
                    left: NOTE_LEFT_PX,
                    origin,
                })
            }
            _ => Anchor::Range(origin),
        };
        let markup = Markup {
            id: MarkupId::generate(),
            kind,
            text: match kind {
                MarkupKind::Note => String::new(),
                _ => page.range_text(selection),
            },
            anchor,
            color: self.configured_color(kind),
        };
        let id = markup.id.clone();
        self.overlay.render_markup(page, &layout, &markup);
        if kind == MarkupKind::Note {
            self.focus_note(&id);
        }

        match store.load(&self.url) {
            Ok(loaded) => {
                let mut markups = loaded.unwrap_or_default();
                markups.push(markup);
                if let Err(e) = store.save(&self.url, &markups) {
                    log::warn!("saving new markup failed: {e}");
                }
            }
            // A save without a successful read would clobber the stored set.
            Err(e) => log::warn!("skipping save of new markup: {e}"),
        }
        Some(id)
    }

    /// Remove a markup from the page and from the store.
    pub fn remove_markup<S: MarkupStore>(&mut self, page: &mut Page, store: &mut S, id: &MarkupId) {
        self.overlay.remove_markup(page, id);
        if self.focused_note.as_ref() == Some(id) {
            self.blur_note(page);
        }
        self.pending_notes.retain(|edit| &edit.id != id);
        match store.load(&self.url) {
            Ok(loaded) => {
                let mut markups = loaded.unwrap_or_default();
                if markups.remove(id) {
                    if let Err(e) = store.save(&self.url, &markups) {
                        log::warn!("saving markup removal failed: {e}");
                    }
                }
            }
            Err(e) => log::warn!("skipping removal of {id} from the store: {e}"),
        }
    }

    fn configured_color(&self, kind: MarkupKind) -> Option<String> {
        let color = match kind {
            MarkupKind::Highlight => valid_or(&self.highlight_color, DEFAULT_HIGHLIGHT_COLOR),
            MarkupKind::Underline => valid_or(&self.underline_color, DEFAULT_UNDERLINE_COLOR),
            MarkupKind::Note => return None,
        };
        Some(color.to_string())
    }
}

fn valid_or<'a>(color: &'a str, fallback: &'a str) -> &'a str {
    if is_valid_hex_color(color) { color } else { fallback }
}

fn mount_toolbar(page: &mut Page, kind: &PromptKind, bounds: Rect) -> NodeId {
    let toolbar = page.create_element("div");
    page.set_region(toolbar, Region::Toolbar);
    page.set_attr(toolbar, "class", TOOLBAR_CLASS);
    page.set_attr(
        toolbar,
        "style",
        &format!(
            "position:absolute;top:{}px;left:{}px;",
            bounds.y0 - TOOLBAR_OFFSET_PX,
            bounds.x0
        ),
    );
    let actions: &[(&str, &str)] = match kind {
        PromptKind::Create => &[
            ("highlight", "Highlight"),
            ("underline", "Underline"),
            ("note", "Note"),
        ],
        PromptKind::Remove(_) => &[("remove", "Remove")],
    };
    for (action, label) in actions {
        let button = page.create_element("button");
        page.set_region(button, Region::Toolbar);
        page.set_attr(button, "data-action", action);
        let text = page.create_text(label);
        page.set_region(text, Region::Toolbar);
        page.append_child(button, text);
        page.append_child(toolbar, button);
    }
    let root = page.root();
    page.append_child(root, toolbar);
    toolbar
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Boundary;
    use crate::layout::{LayoutMetrics, Viewport};
    use crate::reconcile::SessionOptions;
    use crate::store::MemoryStore;
    use pretty_assertions::assert_eq;

    const URL: &str = "https://example.com/article";

    fn started(html: &str) -> (Page, MemoryStore, Session) {
        let mut page = Page::from_html(html).unwrap();
        let mut store = MemoryStore::new();
        let mut session = Session::new(URL);
        session.start(&mut page);
        session.pump(&mut page, &mut store, 0);
        (page, store, session)
    }

    fn toolbar_actions(page: &Page, toolbar: NodeId) -> Vec<String> {
        page.children(toolbar)
            .iter()
            .filter_map(|&b| page.attr(b, "data-action"))
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_prompt_over_plain_text_offers_creation() {
        let (mut page, _store, mut session) = started("<p>hello world</p>");
        let selection = page.find_text("world").unwrap();

        let prompt = session.open_prompt(&mut page, &selection).unwrap();
        assert_eq!(prompt.kind(), &PromptKind::Create);
        let toolbar = prompt.node();

        assert_eq!(page.attr(toolbar, "class"), Some(TOOLBAR_CLASS));
        assert_eq!(
            toolbar_actions(&page, toolbar),
            vec!["highlight", "underline", "note"]
        );
        // Selection starts at y 16; the toolbar floats 40 above it.
        let style = page.attr(toolbar, "style").unwrap();
        assert!(style.contains("top:-24px;"), "got {style}");
    }

    #[test]
    fn test_prompt_over_marked_text_offers_removal() {
        let (mut page, mut store, mut session) = started("<p>hello world</p>");
        let selection = page.find_text("hello world").unwrap();
        let id = session
            .create_markup(&mut page, &mut store, MarkupKind::Highlight, &selection)
            .unwrap();

        let inside = page.find_text("lo wo").unwrap();
        let prompt = session.open_prompt(&mut page, &inside).unwrap();
        assert_eq!(prompt.kind(), &PromptKind::Remove(id));
        assert_eq!(toolbar_actions(&page, prompt.node()), vec!["remove"]);
    }

    #[test]
    fn test_collapsed_selection_closes_the_prompt() {
        let (mut page, _store, mut session) = started("<p>hello world</p>");
        let selection = page.find_text("world").unwrap();
        let toolbar = session.open_prompt(&mut page, &selection).unwrap().node();

        let collapsed = TextRange::new(selection.start, selection.start);
        assert!(session.open_prompt(&mut page, &collapsed).is_none());
        assert!(session.prompt().is_none());
        assert!(!page.is_attached(toolbar));
    }

    #[test]
    fn test_whitespace_selection_prompts_only_over_a_markup() {
        let (mut page, mut store, mut session) = started("<p>one two</p>");
        let gap = page.find_text(" ").unwrap();
        assert!(session.open_prompt(&mut page, &gap).is_none());

        let words = page.find_text("one two").unwrap();
        session
            .create_markup(&mut page, &mut store, MarkupKind::Highlight, &words)
            .unwrap();
        let prompt = session.open_prompt(&mut page, &gap).unwrap();
        assert!(matches!(prompt.kind(), PromptKind::Remove(_)));
    }

    #[test]
    fn test_release_inside_the_toolbar_keeps_the_prompt() {
        let (mut page, _store, mut session) = started("<p>hello world</p>");
        let selection = page.find_text("world").unwrap();
        let toolbar = session.open_prompt(&mut page, &selection).unwrap().node();

        let button = page.children(toolbar)[0];
        let label = page.children(button)[0];
        let on_label = TextRange::new(Boundary::new(label, 0), Boundary::new(label, 0));
        let prompt = session.open_prompt(&mut page, &on_label).unwrap();
        assert_eq!(prompt.node(), toolbar);
        assert!(page.is_attached(toolbar));
    }

    #[test]
    fn test_apply_highlight_persists_and_renders() {
        let (mut page, mut store, mut session) = started("<p>hello world</p>");
        let selection = page.find_text("world").unwrap();
        session.open_prompt(&mut page, &selection);

        let id = session
            .apply_prompt(&mut page, &mut store, PromptAction::Highlight)
            .unwrap();
        assert!(session.prompt().is_none());
        assert_eq!(session.overlay().rendered_rects().count(), 1);

        let stored = store.load(URL).unwrap().unwrap();
        let markup = stored.get(&id).unwrap();
        assert_eq!(markup.kind, MarkupKind::Highlight);
        assert_eq!(markup.text, "world");
        assert_eq!(markup.color.as_deref(), Some(DEFAULT_HIGHLIGHT_COLOR));
        assert!(matches!(markup.anchor, Anchor::Range(_)));
    }

    #[test]
    fn test_apply_note_creates_empty_focused_panel() {
        let (mut page, mut store, mut session) = started("<p>hello world</p>");
        let selection = page.find_text("world").unwrap();
        session.open_prompt(&mut page, &selection);

        let id = session
            .apply_prompt(&mut page, &mut store, PromptAction::Note)
            .unwrap();
        let panel = session
            .overlay()
            .note_panels()
            .next()
            .map(|(_, node)| node)
            .unwrap();
        assert_eq!(page.text_content(panel), "");
        let style = page.attr(panel, "style").unwrap();
        assert!(style.contains("left:20px;"), "got {style}");
        assert!(style.contains("top:16px;"), "got {style}");
        assert!(
            !session.observer.is_active(),
            "typing into the fresh note must not feed back"
        );

        let stored = store.load(URL).unwrap().unwrap();
        let markup = stored.get(&id).unwrap();
        assert_eq!(markup.text, "");
        assert_eq!(markup.color, None);
        match &markup.anchor {
            Anchor::Note(anchor) => {
                assert_eq!(anchor.left, NOTE_LEFT_PX);
                assert_eq!(anchor.top, 16.0);
            }
            other => panic!("expected a note anchor, got {other:?}"),
        }
    }

    #[test]
    fn test_apply_remove_deletes_everywhere() {
        let (mut page, mut store, mut session) = started("<p>hello world</p>");
        let selection = page.find_text("hello").unwrap();
        session
            .create_markup(&mut page, &mut store, MarkupKind::Underline, &selection)
            .unwrap();

        session.open_prompt(&mut page, &selection);
        let removed = session.apply_prompt(&mut page, &mut store, PromptAction::Remove);
        assert!(removed.is_some());
        assert_eq!(session.overlay().rendered_rects().count(), 0);
        assert!(store.load(URL).unwrap().unwrap().is_empty());
    }

    #[test]
    fn test_dismiss_changes_nothing() {
        let (mut page, mut store, mut session) = started("<p>hello world</p>");
        let selection = page.find_text("world").unwrap();
        let toolbar = session.open_prompt(&mut page, &selection).unwrap().node();

        assert_eq!(
            session.apply_prompt(&mut page, &mut store, PromptAction::Dismiss),
            None
        );
        assert!(!page.is_attached(toolbar));
        assert_eq!(store.load(URL).unwrap(), None);
        assert_eq!(session.overlay().rendered_rects().count(), 0);
    }

    #[test]
    fn test_mismatched_action_is_ignored() {
        let (mut page, mut store, mut session) = started("<p>hello world</p>");
        let selection = page.find_text("world").unwrap();
        session.open_prompt(&mut page, &selection);

        // Remove is not offered by a creation prompt.
        assert_eq!(
            session.apply_prompt(&mut page, &mut store, PromptAction::Remove),
            None
        );
        assert_eq!(store.load(URL).unwrap(), None);
    }

    #[test]
    fn test_configured_colors_flow_into_new_markups() {
        let mut page = Page::from_html("<p>hello world</p>").unwrap();
        let mut store = MemoryStore::new();
        let mut session = Session::with_options(
            URL,
            SessionOptions {
                highlight_color: "#00ff00".to_string(),
                underline_color: "nonsense".to_string(),
                metrics: LayoutMetrics::default(),
                viewport: Viewport::default(),
            },
        );
        session.start(&mut page);
        session.pump(&mut page, &mut store, 0);

        let selection = page.find_text("hello").unwrap();
        let highlight = session
            .create_markup(&mut page, &mut store, MarkupKind::Highlight, &selection)
            .unwrap();
        let tail = page.find_text("world").unwrap();
        let underline = session
            .create_markup(&mut page, &mut store, MarkupKind::Underline, &tail)
            .unwrap();

        let stored = store.load(URL).unwrap().unwrap();
        assert_eq!(
            stored.get(&highlight).unwrap().color.as_deref(),
            Some("#00ff00")
        );
        assert_eq!(
            stored.get(&underline).unwrap().color.as_deref(),
            Some(DEFAULT_UNDERLINE_COLOR),
            "unusable configured colors fall back"
        );
    }

    #[test]
    fn test_create_markup_skips_save_when_load_fails() {
        let (mut page, mut store, mut session) = started("<p>hello world</p>");
        store.fail_loads(true);

        let selection = page.find_text("world").unwrap();
        let id = session.create_markup(&mut page, &mut store, MarkupKind::Highlight, &selection);
        assert!(id.is_some(), "the render side still succeeds");
        assert_eq!(session.overlay().rendered_rects().count(), 1);

        store.fail_loads(false);
        assert_eq!(store.load(URL).unwrap(), None, "nothing was written");
    }

    #[test]
    fn test_remove_markup_drops_pending_note_edits() {
        let (mut page, mut store, mut session) = started("<p>hello world</p>");
        let selection = page.find_text("world").unwrap();
        let id = session
            .create_markup(&mut page, &mut store, MarkupKind::Note, &selection)
            .unwrap();
        session.note_input(&mut page, &id, "never saved", 100);
        assert_eq!(session.pending_note_edits(), 1);

        session.remove_markup(&mut page, &mut store, &id);
        assert_eq!(session.pending_note_edits(), 0);
        assert!(session.observer.is_active(), "focus is released with the note");
        assert!(store.load(URL).unwrap().unwrap().is_empty());
    }
}
