//! The reconciliation loop.
//!
//! A [`Session`] ties one page to one persisted markup set and keeps the
//! two in agreement over time. The host drives it by reporting events and
//! calling [`Session::pump`] with a monotonic clock; the session decides
//! when a render pass is actually due. Three debounce windows keep bursty
//! input from causing render storms: viewport changes, foreign page
//! mutations, and note keystrokes each collapse into one deferred action.
//!
//! Self-exclusion is what keeps the loop stable. Every element the engine
//! mounts is region-tagged, so the mutations caused by a render pass are
//! recognized as self-caused on the next pump and schedule nothing.

use crate::controller::Prompt;
use crate::debounce::Debouncer;
use crate::dom::{MutationKind, MutationRecord, Page};
use crate::layout::{Layout, LayoutMetrics, Viewport, layout_page};
use crate::markup::{DEFAULT_HIGHLIGHT_COLOR, DEFAULT_UNDERLINE_COLOR, MarkupId, PageMarkups};
use crate::overlay::{OverlayLayer, SyncStats};
use crate::store::{MarkupStore, StoreError};

/// Window applied to resize and scroll bursts before re-rendering.
pub const VIEWPORT_DEBOUNCE_MS: u64 = 100;
/// Window applied to foreign page mutations before re-rendering.
pub const MUTATION_DEBOUNCE_MS: u64 = 250;
/// Window applied to note keystrokes before persisting the new text.
pub const NOTE_EDIT_DEBOUNCE_MS: u64 = 500;

/// Host happenings the session reacts to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Event {
    /// The page finished loading; render as soon as possible.
    Loaded,
    /// The viewport was resized.
    Resized { width: f64, height: f64 },
    /// The page was scrolled.
    Scrolled { x: f64, y: f64 },
}

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Not started; the page carries no engine artifacts.
    Idle,
    /// Started but no render pass has succeeded yet.
    Loading,
    /// At least one render pass has succeeded.
    Rendered,
}

/// Initial settings for a [`Session`].
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub highlight_color: String,
    pub underline_color: String,
    pub metrics: LayoutMetrics,
    pub viewport: Viewport,
}

impl Default for SessionOptions {
    fn default() -> Self {
        SessionOptions {
            highlight_color: DEFAULT_HIGHLIGHT_COLOR.to_string(),
            underline_color: DEFAULT_UNDERLINE_COLOR.to_string(),
            metrics: LayoutMetrics::default(),
            viewport: Viewport::default(),
        }
    }
}

/// Cursor over the page's mutation log.
///
/// Stands in for a mutation observer: it only ever reports changes made
/// while active, and reactivation jumps past anything recorded in between.
#[derive(Debug, Default)]
pub struct Observer {
    cursor: u64,
    active: bool,
}

impl Observer {
    /// Start observing from the page's current position. Records logged
    /// before this call are never reported.
    pub fn activate(&mut self, page: &Page) {
        self.cursor = page.mutation_seq();
        self.active = true;
    }

    pub fn deactivate(&mut self) {
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Drain mutations recorded since the last take. While inactive the
    /// cursor still advances, so the records are skipped rather than queued.
    /// Attribute changes are not watched.
    pub fn take_batch(&mut self, page: &Page) -> Vec<MutationRecord> {
        let records = page.mutations_since(self.cursor);
        let batch = if self.active {
            records
                .iter()
                .filter(|rec| {
                    matches!(
                        rec.kind,
                        MutationKind::ChildList | MutationKind::CharacterData
                    )
                })
                .copied()
                .collect()
        } else {
            Vec::new()
        };
        self.cursor = page.mutation_seq();
        batch
    }
}

/// Whether a record describes a change outside every engine-owned region.
/// Records failing this test never schedule a render pass.
pub fn is_foreign_mutation(page: &Page, record: &MutationRecord) -> bool {
    page.region_of(record.node).is_none()
}

/// A note edit that has been rendered but not yet persisted.
#[derive(Debug)]
pub(crate) struct NoteEdit {
    pub(crate) id: MarkupId,
    pub(crate) text: String,
    pub(crate) debounce: Debouncer,
}

/// One page's markup session.
///
/// Owns the overlay, the mutation observer and all scheduling state. The
/// host reports input through [`Session::handle_event`], selection releases
/// through [`Session::open_prompt`] and note typing through
/// [`Session::note_input`], then calls [`Session::pump`] regularly;
/// everything else happens inside.
///
/// ```
/// use page_markup_engine::{MemoryStore, Page, Session};
///
/// let mut page = Page::from_html("<p>hello world</p>").unwrap();
/// let mut store = MemoryStore::new();
/// let mut session = Session::new("https://example.com/");
/// session.start(&mut page);
/// session.pump(&mut page, &mut store, 0);
/// ```
#[derive(Debug)]
pub struct Session {
    /// Page address markups are loaded from and saved under.
    pub(crate) url: String,
    pub(crate) state: SessionState,
    /// Geometry assumptions used for every layout pass.
    pub(crate) metrics: LayoutMetrics,
    /// Last reported viewport, updated through [`Event`]s.
    pub(crate) viewport: Viewport,
    /// Configured highlight paint, validated at use.
    pub(crate) highlight_color: String,
    /// Configured underline paint, validated at use.
    pub(crate) underline_color: String,
    pub(crate) overlay: OverlayLayer,
    pub(crate) observer: Observer,
    pub(crate) viewport_debounce: Debouncer,
    pub(crate) mutation_debounce: Debouncer,
    /// Note edits rendered but not yet persisted.
    pub(crate) pending_notes: Vec<NoteEdit>,
    /// Forces a render pass on the next pump regardless of debouncing.
    pub(crate) pass_queued: bool,
    /// The open selection toolbar, if any.
    pub(crate) prompt: Option<Prompt>,
    /// Note with input focus; observation is suspended while set.
    pub(crate) focused_note: Option<MarkupId>,
    /// Element operation counts of the last successful render pass.
    pub(crate) last_stats: SyncStats,
}

impl Session {
    pub fn new(url: &str) -> Self {
        Session::with_options(url, SessionOptions::default())
    }

    pub fn with_options(url: &str, options: SessionOptions) -> Self {
        Session {
            url: url.to_string(),
            state: SessionState::Idle,
            metrics: options.metrics,
            viewport: options.viewport,
            highlight_color: options.highlight_color,
            underline_color: options.underline_color,
            overlay: OverlayLayer::new(),
            observer: Observer::default(),
            viewport_debounce: Debouncer::new(VIEWPORT_DEBOUNCE_MS),
            mutation_debounce: Debouncer::new(MUTATION_DEBOUNCE_MS),
            pending_notes: Vec::new(),
            pass_queued: false,
            prompt: None,
            focused_note: None,
            last_stats: SyncStats::default(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn overlay(&self) -> &OverlayLayer {
        &self.overlay
    }

    /// Stats of the last successful render pass.
    pub fn last_stats(&self) -> SyncStats {
        self.last_stats
    }

    /// Whether a render pass is queued or debouncing.
    pub fn refresh_pending(&self) -> bool {
        self.pass_queued
            || self.viewport_debounce.is_pending()
            || self.mutation_debounce.is_pending()
    }

    pub fn pending_note_edits(&self) -> usize {
        self.pending_notes.len()
    }

    /// Mount the overlay, start observing and queue the first render pass.
    pub fn start(&mut self, page: &mut Page) {
        if self.state != SessionState::Idle {
            return;
        }
        self.overlay.mount(page);
        self.observer.activate(page);
        self.state = SessionState::Loading;
        self.pass_queued = true;
    }

    /// Tear down every engine artifact and stop observing. Pending note
    /// edits are dropped.
    pub fn stop(&mut self, page: &mut Page) {
        if self.state == SessionState::Idle {
            return;
        }
        self.observer.deactivate();
        self.dismiss_prompt(page);
        self.overlay.unmount(page);
        self.pending_notes.clear();
        self.focused_note = None;
        self.viewport_debounce.cancel();
        self.mutation_debounce.cancel();
        self.pass_queued = false;
        self.state = SessionState::Idle;
    }

    pub fn handle_event(&mut self, event: Event, now_ms: u64) {
        match event {
            Event::Loaded => self.pass_queued = true,
            Event::Resized { width, height } => {
                self.viewport.width = width;
                self.viewport.height = height;
                self.viewport_debounce.trigger(now_ms);
            }
            Event::Scrolled { x, y } => {
                self.viewport.scroll_x = x;
                self.viewport.scroll_y = y;
                self.viewport_debounce.trigger(now_ms);
            }
        }
    }

    /// Advance the loop: collect page mutations, flush due note edits and
    /// run a render pass if one is due. Returns whether a pass ran.
    pub fn pump<S: MarkupStore>(&mut self, page: &mut Page, store: &mut S, now_ms: u64) -> bool {
        if self.state == SessionState::Idle {
            return false;
        }

        let batch = self.observer.take_batch(page);
        if batch.iter().any(|rec| is_foreign_mutation(page, rec)) {
            self.mutation_debounce.trigger(now_ms);
        }

        self.flush_note_edits(store, now_ms);

        let viewport_due = self.viewport_debounce.fire(now_ms);
        let mutation_due = self.mutation_debounce.fire(now_ms);
        if !(self.pass_queued || viewport_due || mutation_due) {
            return false;
        }
        self.pass_queued = false;
        self.run_pass(page, store);
        true
    }

    /// Suspend observation while a note has input focus, so typing does not
    /// feed back into the loop. Returns whether the note is on screen.
    pub fn focus_note(&mut self, id: &MarkupId) -> bool {
        if self.overlay.note_text_node(id).is_none() {
            return false;
        }
        self.observer.deactivate();
        self.focused_note = Some(id.clone());
        true
    }

    /// Resume observation after note focus is lost. Changes made while
    /// suspended are never reported.
    pub fn blur_note(&mut self, page: &Page) {
        if self.focused_note.take().is_some() {
            self.observer.activate(page);
        }
    }

    /// A keystroke in a note body: update the panel immediately, persist
    /// after the typing burst settles.
    pub fn note_input(&mut self, page: &mut Page, id: &MarkupId, text: &str, now_ms: u64) {
        let text_node = match self.overlay.note_text_node(id) {
            Some(node) => node,
            None => return,
        };
        page.set_text(text_node, text);
        match self.pending_notes.iter_mut().find(|e| &e.id == id) {
            Some(edit) => {
                edit.text = text.to_string();
                edit.debounce.trigger(now_ms);
            }
            None => {
                let mut debounce = Debouncer::new(NOTE_EDIT_DEBOUNCE_MS);
                debounce.trigger(now_ms);
                self.pending_notes.push(NoteEdit {
                    id: id.clone(),
                    text: text.to_string(),
                    debounce,
                });
            }
        }
    }

    pub(crate) fn current_layout(&self, page: &Page) -> Layout {
        layout_page(page, &self.metrics, &self.viewport)
    }

    fn flush_note_edits<S: MarkupStore>(&mut self, store: &mut S, now_ms: u64) {
        let mut i = 0;
        while i < self.pending_notes.len() {
            if !self.pending_notes[i].debounce.fire(now_ms) {
                i += 1;
                continue;
            }
            let edit = &self.pending_notes[i];
            match persist_note_text(store, &self.url, &edit.id, &edit.text) {
                Ok(true) => {
                    self.pending_notes.remove(i);
                }
                Ok(false) => {
                    log::warn!("note {} vanished before its edit was saved", edit.id);
                    self.pending_notes.remove(i);
                }
                Err(e) => {
                    log::warn!("saving note text failed, will retry: {e}");
                    self.pending_notes[i].debounce.trigger(now_ms);
                    i += 1;
                }
            }
        }
    }

    /// One full render pass: load, patch in unsaved note text, lay out and
    /// reconcile the overlay. A failed load renders the empty set; the
    /// stored markups reappear on the next pass that loads cleanly.
    fn run_pass<S: MarkupStore>(&mut self, page: &mut Page, store: &mut S) {
        let mut markups = match store.load(&self.url) {
            Ok(loaded) => loaded.unwrap_or_default(),
            Err(e) => {
                log::warn!("loading markups failed, rendering none: {e}");
                PageMarkups::default()
            }
        };
        for edit in &self.pending_notes {
            if let Some(markup) = markups.get_mut(&edit.id) {
                markup.text = edit.text.clone();
            }
        }
        let layout = layout_page(page, &self.metrics, &self.viewport);
        self.last_stats = self.overlay.sync(page, &layout, &markups);
        log::debug!(
            "render pass for {}: {} markups, {:?}",
            self.url,
            markups.len(),
            self.last_stats
        );
        self.state = SessionState::Rendered;
    }
}

/// Read-modify-write of one note's text. `Ok(false)` when the note no
/// longer exists in the store.
fn persist_note_text<S: MarkupStore>(
    store: &mut S,
    url: &str,
    id: &MarkupId,
    text: &str,
) -> Result<bool, StoreError> {
    let mut markups = store.load(url)?.unwrap_or_default();
    let markup = match markups.get_mut(id) {
        Some(markup) => markup,
        None => return Ok(false),
    };
    markup.text = text.to_string();
    store.save(url, &markups)?;
    Ok(true)
}
