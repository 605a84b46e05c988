//! Per-edit state, threaded explicitly through every step of one logical edit.

use std::collections::{BTreeMap, BTreeSet};

use crate::model::{AnnotationId, AnnotationKind, ParagraphId, TextId};
use crate::scan::SegmentScan;
use crate::store::AnnotationStore;
use crate::undo::TextState;

/// Deletion candidates gathered over a whole edit, flushed once at `end_edit`
#[derive(Debug, Default)]
pub struct DeletionBatch {
    ids: BTreeSet<AnnotationId>,
    /// Where to re-home an annotation if it survives the flush but its
    /// paragraph is gone
    fallback: BTreeMap<AnnotationId, ParagraphId>,
}

/// Result of flushing a `DeletionBatch`
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FlushReport {
    pub deleted: Vec<AnnotationId>,
    /// User-authored annotations that were queued but kept
    pub rescued: Vec<AnnotationId>,
}

impl DeletionBatch {
    /// Returns false if `id` was already queued
    pub fn queue(&mut self, id: AnnotationId) -> bool {
        self.ids.insert(id)
    }

    pub fn queue_with_fallback(&mut self, id: AnnotationId, fallback: ParagraphId) -> bool {
        self.fallback.insert(id, fallback);
        self.queue(id)
    }

    pub fn contains(&self, id: AnnotationId) -> bool {
        self.ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Drop user-authored ids and delete the rest in one call
    pub fn flush(self, store: &mut dyn AnnotationStore) -> FlushReport {
        let (rescued, deleted): (Vec<_>, Vec<_>) =
            self.ids.into_iter().partition(|&id| store.is_user_authored(id));

        for &id in &rescued {
            log::warn!("kept user-authored annotation {id} that the edit would have deleted");
            settle_rescued(store, id, self.fallback.get(&id).copied());
        }
        if !deleted.is_empty() {
            store.delete_annotations(&deleted);
        }
        FlushReport { deleted, rescued }
    }
}

/// Leave a rescued annotation somewhere valid: its surface form is no longer
/// what any analysis describes, and its offsets may point past the text.
fn settle_rescued(store: &mut dyn AnnotationStore, id: AnnotationId, fallback: Option<ParagraphId>) {
    let Ok(ann) = store.annotation(id) else {
        return;
    };
    if ann.kind == AnnotationKind::Token
        && ann.analysis.is_some()
        && let Err(err) = store.clear_analysis(id)
    {
        log::debug!("rescued {id} keeps its analysis: {err}");
    }
    let owner = if store.paragraph_len(ann.owner).is_ok() {
        ann.owner
    } else if let Some(fallback) = fallback
        && store.set_owner(id, fallback).is_ok()
    {
        fallback
    } else {
        return;
    };
    let Ok(len) = store.paragraph_len(owner) else {
        return;
    };
    let (begin, end) = if owner == ann.owner {
        (ann.begin.min(len), ann.end.min(len))
    } else {
        (0, 0)
    };
    if ((begin, end) != (ann.begin, ann.end) || owner != ann.owner)
        && let Err(err) = store.set_offsets(id, begin, end)
    {
        log::debug!("rescued {id} left stale in {owner}: {err}");
    }
}

/// A queued cross-paragraph move
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relocation {
    pub target: ParagraphId,
    pub shift: usize,
}

/// Annotations to relocate at `end_edit`
#[derive(Debug, Default)]
pub struct MoveBatch {
    moves: BTreeMap<AnnotationId, Relocation>,
}

impl MoveBatch {
    pub fn queue(&mut self, id: AnnotationId, relocation: Relocation) {
        self.moves.insert(id, relocation);
    }

    pub fn contains(&self, id: AnnotationId) -> bool {
        self.moves.contains_key(&id)
    }

    /// Remove and return every move whose destination is `paragraph`
    pub fn take_targeting(&mut self, paragraph: ParagraphId) -> Vec<AnnotationId> {
        let ids: Vec<AnnotationId> = self
            .moves
            .iter()
            .filter(|(_, r)| r.target == paragraph)
            .map(|(&id, _)| id)
            .collect();
        for id in &ids {
            self.moves.remove(id);
        }
        ids
    }

    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    pub(crate) fn drain(&mut self) -> impl Iterator<Item = (AnnotationId, Relocation)> + '_ {
        std::mem::take(&mut self.moves).into_iter()
    }
}

/// Annotations captured on Enter, waiting for the new paragraph to exist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSplit {
    pub source: ParagraphId,
    pub offset: usize,
    pub ids: Vec<AnnotationId>,
}

/// Everything one logical edit accumulates between `begin_edit` and `end_edit`
#[derive(Debug)]
pub struct EditSession {
    pub(crate) text: TextId,
    pub(crate) anchor: TextState,
    pub(crate) far_end: TextState,
    /// Segmentation of each prepared paragraph as of its last reconciled state
    pub(crate) before: BTreeMap<ParagraphId, SegmentScan>,
    pub(crate) merge_pending: Option<AnnotationId>,
    pub(crate) deletions: DeletionBatch,
    pub(crate) moves: MoveBatch,
    pub(crate) pending_split: Option<PendingSplit>,
    pub(crate) touched: BTreeSet<ParagraphId>,
    pub(crate) needs_reparse: BTreeSet<ParagraphId>,
    pub(crate) relocated: Vec<AnnotationId>,
    pub(crate) deferred_notes: Vec<AnnotationId>,
}

impl EditSession {
    pub(crate) fn new(text: TextId, anchor: TextState, far_end: TextState) -> Self {
        Self {
            text,
            anchor,
            far_end,
            before: BTreeMap::new(),
            merge_pending: None,
            deletions: DeletionBatch::default(),
            moves: MoveBatch::default(),
            pending_split: None,
            touched: BTreeSet::new(),
            needs_reparse: BTreeSet::new(),
            relocated: Vec::new(),
            deferred_notes: Vec::new(),
        }
    }

    pub fn text(&self) -> TextId {
        self.text
    }

    pub fn merge_pending(&self) -> Option<AnnotationId> {
        self.merge_pending
    }

    pub fn deletions(&self) -> &DeletionBatch {
        &self.deletions
    }

    pub fn moves(&self) -> &MoveBatch {
        &self.moves
    }

    /// Has an earlier step of this edit already decided this annotation's fate?
    pub fn is_queued(&self, id: AnnotationId) -> bool {
        self.deletions.contains(id)
            || self.moves.contains(id)
            || self
                .pending_split
                .as_ref()
                .is_some_and(|split| split.ids.contains(&id))
    }
}
