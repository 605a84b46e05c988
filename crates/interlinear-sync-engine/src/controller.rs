//! The edit session controller: brackets one logical edit, routes content
//! changes through the classifier and finishes with a single flush, re-parse
//! and undo registration.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::classify::{EditContext, run_pass};
use crate::error::{Result, SyncError};
use crate::model::{AnnotationId, EditEvent, ParagraphId, TextId};
use crate::moves::{self, Survivor};
use crate::reparse::{Reparser, SegmentReparser, segments_partition};
use crate::scan::{SegmentScanner, SentenceScanner, UnicodeWordClassifier, WordClassifier};
use crate::session::EditSession;
use crate::store::{AnnotationStore, TextBuffer};
use crate::undo::{
    ActionLog, SegmentListAction, SegmentListener, SegmentsReplaced, TextState, UndoableAction,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Joins free and literal translations when their segments merge
    pub freeform_separator: String,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            freeform_separator: " ".to_string(),
        }
    }
}

/// Where a finished edit reports to
pub struct EditHooks<'a> {
    pub log: &'a mut dyn ActionLog,
    pub listener: &'a mut dyn SegmentListener,
}

/// What one completed edit did
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EditOutcome {
    pub deleted: Vec<AnnotationId>,
    /// User-authored annotations the edit would have deleted
    pub rescued: Vec<AnnotationId>,
    pub relocated: Vec<AnnotationId>,
    pub reparsed: Vec<ParagraphId>,
    /// Notes left for the host's own re-validation
    pub deferred_notes: Vec<AnnotationId>,
    /// Whether an undoable action was registered
    pub undoable: bool,
}

/// Keeps annotations in step with paragraph text, one bracketed edit at a time.
pub struct Synchronizer {
    settings: SyncSettings,
    scanner: Box<dyn SegmentScanner>,
    words: Box<dyn WordClassifier>,
    reparser: Box<dyn Reparser>,
    open: Option<TextId>,
}

impl fmt::Debug for Synchronizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Synchronizer")
            .field("settings", &self.settings)
            .field("open", &self.open)
            .finish_non_exhaustive()
    }
}

impl Default for Synchronizer {
    fn default() -> Self {
        Self::new(SyncSettings::default())
    }
}

impl Synchronizer {
    pub fn new(settings: SyncSettings) -> Self {
        let reparser = SegmentReparser::new(SentenceScanner::default(), settings.freeform_separator.clone());
        Self {
            settings,
            scanner: Box::new(SentenceScanner::default()),
            words: Box::new(UnicodeWordClassifier),
            reparser: Box::new(reparser),
            open: None,
        }
    }

    /// Use `scanner` both for boundary detection and for the default re-parse
    pub fn with_scanner<S>(mut self, scanner: S) -> Self
    where
        S: SegmentScanner + Clone + 'static,
    {
        self.reparser = Box::new(SegmentReparser::new(
            scanner.clone(),
            self.settings.freeform_separator.clone(),
        ));
        self.scanner = Box::new(scanner);
        self
    }

    pub fn with_classifier(mut self, words: impl WordClassifier + 'static) -> Self {
        self.words = Box::new(words);
        self
    }

    pub fn with_reparser(mut self, reparser: impl Reparser + 'static) -> Self {
        self.reparser = Box::new(reparser);
        self
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    pub fn is_editing(&self) -> bool {
        self.open.is_some()
    }

    /// Open a session spanning the paragraphs from `anchor` to `far_end`.
    ///
    /// Only one session may be open at a time; edits must be serialised.
    pub fn begin_edit(
        &mut self,
        store: &dyn AnnotationStore,
        text: TextId,
        anchor: ParagraphId,
        far_end: ParagraphId,
    ) -> Result<EditSession> {
        if let Some(open) = self.open {
            return Err(SyncError::SessionAlreadyOpen(open));
        }
        for paragraph in [anchor, far_end] {
            if store.text_of(paragraph)? != text {
                return Err(SyncError::InvalidEdit {
                    paragraph,
                    reason: format!("paragraph does not belong to {text}"),
                });
            }
        }

        let mut session = EditSession::new(
            text,
            TextState::capture(store, text, anchor)?,
            TextState::capture(store, text, far_end)?,
        );
        let (a, b) = (store.paragraph_index(anchor)?, store.paragraph_index(far_end)?);
        let paragraphs = store.paragraphs_of(text)?;
        for &paragraph in &paragraphs[a.min(b)..=a.max(b)] {
            self.capture_paragraph(store, &mut session, paragraph)?;
        }
        self.open = Some(text);
        log::debug!("opened edit session on {text}");
        Ok(session)
    }

    /// Record a paragraph's pre-edit segmentation if the session has not yet
    pub fn capture_paragraph(
        &self,
        store: &dyn AnnotationStore,
        session: &mut EditSession,
        paragraph: ParagraphId,
    ) -> Result<()> {
        if !session.before.contains_key(&paragraph) {
            let text = store.paragraph_text(paragraph)?;
            session.before.insert(paragraph, self.scanner.scan(&text));
        }
        Ok(())
    }

    /// Reconcile every annotation of the edited paragraph with one change
    /// already applied to its text.
    pub fn adjust_for_edit(
        &self,
        store: &mut dyn AnnotationStore,
        session: &mut EditSession,
        edit: EditEvent,
    ) -> Result<()> {
        if edit.is_noop() {
            return Ok(());
        }
        let paragraph = edit.paragraph;
        if store.text_of(paragraph)? != session.text {
            return Err(SyncError::InvalidEdit {
                paragraph,
                reason: format!("edit is outside the session's text {}", session.text),
            });
        }
        let text = store.paragraph_text(paragraph)?;
        if edit.inserted_end() > text.len() {
            return Err(SyncError::InvalidEdit {
                paragraph,
                reason: format!(
                    "insertion ends at {} in a {}-byte paragraph",
                    edit.inserted_end(),
                    text.len()
                ),
            });
        }

        let after = self.scanner.scan(&text);
        let before = session.before.remove(&paragraph).unwrap_or_else(|| {
            log::debug!("{paragraph} was not captured before the edit, using its current segmentation");
            after.clone()
        });
        let ctx = EditContext {
            edit,
            text: &text,
            before: &before,
            after: &after,
            words: self.words.as_ref(),
            separator: &self.settings.freeform_separator,
        };
        let result = run_pass(store, session, &ctx);
        session.touched.insert(paragraph);
        session.before.insert(paragraph, after);
        result
    }

    pub fn on_content_changed(
        &self,
        store: &mut dyn AnnotationStore,
        session: &mut EditSession,
        paragraph: ParagraphId,
        start: usize,
        inserted: usize,
        deleted: usize,
    ) -> Result<()> {
        self.adjust_for_edit(store, session, EditEvent::new(paragraph, start, inserted, deleted))
    }

    /// Enter pressed: remember what will end up in the new paragraph
    pub fn before_split(
        &self,
        store: &dyn AnnotationStore,
        session: &mut EditSession,
        paragraph: ParagraphId,
        offset: usize,
    ) -> Result<()> {
        let len = store.paragraph_len(paragraph)?;
        if offset > len {
            return Err(SyncError::InvalidEdit {
                paragraph,
                reason: format!("cannot split a {len}-byte paragraph at {offset}"),
            });
        }
        self.capture_paragraph(store, session, paragraph)?;
        moves::capture_split(store, session, paragraph, offset);
        Ok(())
    }

    /// Enter released: move the captured annotations into `new_paragraph`
    pub fn after_split(
        &self,
        store: &mut dyn AnnotationStore,
        session: &mut EditSession,
        new_paragraph: ParagraphId,
    ) -> Result<Vec<AnnotationId>> {
        moves::relocate_split(store, session, new_paragraph)
    }

    /// A paragraph is about to go. Picks the survivor (the previous
    /// paragraph unless merging with the next) and queues what happens to
    /// the paragraph's annotations.
    pub fn on_about_to_delete_paragraph(
        &self,
        store: &dyn AnnotationStore,
        session: &mut EditSession,
        paragraph: ParagraphId,
        text: TextId,
        index: usize,
        merge_with_next: bool,
    ) -> Result<Survivor> {
        let paragraphs = store.paragraphs_of(text)?;
        if paragraphs.get(index) != Some(&paragraph) {
            let found = store.paragraph_index(paragraph)?;
            return Err(SyncError::UnexpectedParagraphPosition {
                expected: index,
                found,
            });
        }
        let next = paragraphs.get(index + 1).copied();
        let previous = index.checked_sub(1).map(|i| paragraphs[i]);
        let survivor = match (merge_with_next, previous, next) {
            (true, _, Some(next)) => Survivor::Next(next),
            (false, Some(previous), _) => Survivor::Previous(previous),
            (_, _, Some(next)) => Survivor::Next(next),
            _ => Survivor::None,
        };
        for p in [Some(paragraph), previous, next].into_iter().flatten() {
            self.capture_paragraph(store, session, p)?;
        }
        log::debug!("{paragraph} is being removed, survivor {survivor:?}");
        moves::queue_removal(store, session, paragraph, survivor)?;
        Ok(survivor)
    }

    /// Close the session: relocate, flush deletions once, re-parse what the
    /// edit left inconsistent, notify and register the undoable action.
    pub fn end_edit(
        &mut self,
        store: &mut dyn AnnotationStore,
        mut session: EditSession,
        hooks: &mut EditHooks<'_>,
    ) -> Result<EditOutcome> {
        self.open = None;

        moves::apply_moves(store, &mut session);
        let flushed = std::mem::take(&mut session.deletions).flush(store);

        let text = session.text;
        let order = store.paragraphs_of(text)?;
        let mut reparsed = Vec::new();
        if order != session.anchor.paragraph_order() {
            log::debug!("paragraphs of {text} changed, re-parsing the whole text");
            self.reparser.reparse_text(store, text)?;
            reparsed = order.clone();
        } else {
            let candidates = session.touched.union(&session.needs_reparse);
            for &paragraph in candidates {
                if store.paragraph_len(paragraph).is_err() {
                    continue;
                }
                if session.needs_reparse.contains(&paragraph)
                    || !segments_partition(store, paragraph)?
                {
                    self.reparser.reparse_paragraph(store, paragraph)?;
                    reparsed.push(paragraph);
                }
            }
        }

        for &paragraph in &order {
            let previous = session
                .anchor
                .segments_of(paragraph)
                .map(<[AnnotationId]>::to_vec)
                .unwrap_or_default();
            let current = store.segment_ids(paragraph);
            if previous != current {
                hooks.listener.segments_replaced(&SegmentsReplaced {
                    paragraph,
                    previous,
                    current,
                });
            }
        }

        let mut action = SegmentListAction::new(session.anchor, session.far_end);
        let undoable = action.record_done_state(store)?;
        if undoable {
            hooks.log.register(Box::new(action));
        }
        log::debug!(
            "closed edit session on {text}: {} deleted, {} rescued, {} re-parsed",
            flushed.deleted.len(),
            flushed.rescued.len(),
            reparsed.len()
        );

        Ok(EditOutcome {
            deleted: flushed.deleted,
            rescued: flushed.rescued,
            relocated: session.relocated,
            reparsed,
            deferred_notes: session.deferred_notes,
            undoable,
        })
    }

    /// Drop a session without flushing anything it queued
    pub fn abort_edit(&mut self, session: EditSession) {
        log::warn!(
            "aborted edit session on {} with {} queued deletions",
            session.text,
            session.deletions.len()
        );
        self.open = None;
    }

    fn within_session<S, T>(
        &mut self,
        store: &mut S,
        hooks: &mut EditHooks<'_>,
        anchor: ParagraphId,
        far_end: ParagraphId,
        edit: impl FnOnce(&Self, &mut S, &mut EditSession) -> Result<T>,
    ) -> Result<(T, EditOutcome)>
    where
        S: AnnotationStore + TextBuffer,
    {
        let text = store.text_of(anchor)?;
        let mut session = self.begin_edit(&*store, text, anchor, far_end)?;
        match edit(self, store, &mut session) {
            Ok(value) => Ok((value, self.end_edit(store, session, hooks)?)),
            Err(err) => {
                self.abort_edit(session);
                Err(err)
            }
        }
    }

    /// Replace `deleted` bytes at `start` with `inserted` as one edit
    pub fn replace_text<S>(
        &mut self,
        store: &mut S,
        hooks: &mut EditHooks<'_>,
        paragraph: ParagraphId,
        start: usize,
        deleted: usize,
        inserted: &str,
    ) -> Result<EditOutcome>
    where
        S: AnnotationStore + TextBuffer,
    {
        self.within_session(store, hooks, paragraph, paragraph, |sync, store, session| {
            let edit = store.replace_text(paragraph, start, deleted, inserted)?;
            sync.adjust_for_edit(store, session, edit)
        })
        .map(|((), outcome)| outcome)
    }

    /// Press Enter at `offset`; returns the new paragraph
    pub fn split_paragraph<S>(
        &mut self,
        store: &mut S,
        hooks: &mut EditHooks<'_>,
        paragraph: ParagraphId,
        offset: usize,
    ) -> Result<(ParagraphId, EditOutcome)>
    where
        S: AnnotationStore + TextBuffer,
    {
        self.within_session(store, hooks, paragraph, paragraph, |sync, store, session| {
            let len = store.paragraph_len(paragraph)?;
            sync.before_split(&*store, session, paragraph, offset)?;
            let new_paragraph = TextBuffer::split_paragraph(store, paragraph, offset)?;
            sync.adjust_for_edit(store, session, EditEvent::new(paragraph, offset, 0, len - offset))?;
            sync.after_split(store, session, new_paragraph)?;
            Ok(new_paragraph)
        })
    }

    /// Backspace at the start of `paragraph`: append its text to the previous one
    pub fn merge_with_previous<S>(
        &mut self,
        store: &mut S,
        hooks: &mut EditHooks<'_>,
        paragraph: ParagraphId,
    ) -> Result<EditOutcome>
    where
        S: AnnotationStore + TextBuffer,
    {
        let text = store.text_of(paragraph)?;
        let index = store.paragraph_index(paragraph)?;
        let Some(previous) = index
            .checked_sub(1)
            .and_then(|i| store.paragraphs_of(text).ok()?.get(i).copied())
        else {
            return Err(SyncError::InvalidEdit {
                paragraph,
                reason: "the first paragraph has nothing to merge into".to_string(),
            });
        };

        self.within_session(store, hooks, previous, paragraph, |sync, store, session| {
            sync.on_about_to_delete_paragraph(&*store, session, paragraph, text, index, false)?;
            let content = store.paragraph_text(paragraph)?;
            let end = store.paragraph_len(previous)?;
            let edit = TextBuffer::replace_text(store, previous, end, 0, &content)?;
            sync.adjust_for_edit(store, session, edit)?;
            store.remove_paragraph(paragraph)
        })
        .map(|((), outcome)| outcome)
    }

    /// Remove `paragraph`. With `merge_with_next` its text is prepended to
    /// the next paragraph, otherwise the text goes with it.
    pub fn delete_paragraph<S>(
        &mut self,
        store: &mut S,
        hooks: &mut EditHooks<'_>,
        paragraph: ParagraphId,
        merge_with_next: bool,
    ) -> Result<EditOutcome>
    where
        S: AnnotationStore + TextBuffer,
    {
        let text = store.text_of(paragraph)?;
        let index = store.paragraph_index(paragraph)?;
        let paragraphs = store.paragraphs_of(text)?;
        let next = paragraphs.get(index + 1).copied();
        let neighbour = next.or_else(|| index.checked_sub(1).map(|i| paragraphs[i]));
        let Some(neighbour) = neighbour else {
            return Err(SyncError::InvalidEdit {
                paragraph,
                reason: format!("cannot remove the only paragraph of {text}"),
            });
        };

        if merge_with_next {
            let Some(next) = next else {
                return Err(SyncError::InvalidEdit {
                    paragraph,
                    reason: "the last paragraph has no next paragraph to merge into".to_string(),
                });
            };
            return self
                .within_session(store, hooks, paragraph, next, |sync, store, session| {
                    sync.on_about_to_delete_paragraph(&*store, session, paragraph, text, index, true)?;
                    let content = store.paragraph_text(paragraph)?;
                    let edit = TextBuffer::replace_text(store, next, 0, 0, &content)?;
                    sync.adjust_for_edit(store, session, edit)?;
                    store.remove_paragraph(paragraph)
                })
                .map(|((), outcome)| outcome);
        }

        self.within_session(store, hooks, paragraph, neighbour, |_, store, session| {
            // nothing survives the text; rescued annotations land in the neighbour
            moves::queue_removal(&*store, session, paragraph, Survivor::Next(neighbour))?;
            store.remove_paragraph(paragraph)
        })
        .map(|((), outcome)| outcome)
    }
}
