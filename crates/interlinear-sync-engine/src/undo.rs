//! Undo/redo support: segment-list snapshots around an edit, the reversible
//! action registered for it, and a bounded history to register it with.

use std::collections::VecDeque;
use std::fmt;

use crate::error::{Result, SyncError};
use crate::model::{AnnotationId, ParagraphId, TextId};
use crate::store::AnnotationStore;

/// "Segment list replaced" notification for one paragraph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentsReplaced {
    pub paragraph: ParagraphId,
    pub previous: Vec<AnnotationId>,
    pub current: Vec<AnnotationId>,
}

pub trait SegmentListener {
    fn segments_replaced(&mut self, change: &SegmentsReplaced);
}

/// Keeps every notification it receives
#[derive(Debug, Default)]
pub struct RecordingListener {
    pub changes: Vec<SegmentsReplaced>,
}

impl SegmentListener for RecordingListener {
    fn segments_replaced(&mut self, change: &SegmentsReplaced) {
        self.changes.push(change.clone());
    }
}

/// Segment ids of every paragraph of a text, captured at one end of the selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextState {
    pub text: TextId,
    pub paragraph: ParagraphId,
    pub segments: Vec<(ParagraphId, Vec<AnnotationId>)>,
}

impl TextState {
    pub fn capture(
        store: &dyn AnnotationStore,
        text: TextId,
        paragraph: ParagraphId,
    ) -> Result<Self> {
        let segments = store
            .paragraphs_of(text)?
            .into_iter()
            .map(|p| (p, store.segment_ids(p)))
            .collect();
        Ok(Self {
            text,
            paragraph,
            segments,
        })
    }

    pub fn paragraph_order(&self) -> Vec<ParagraphId> {
        self.segments.iter().map(|(p, _)| *p).collect()
    }

    pub fn segments_of(&self, paragraph: ParagraphId) -> Option<&[AnnotationId]> {
        self.segments
            .iter()
            .find(|(p, _)| *p == paragraph)
            .map(|(_, ids)| ids.as_slice())
    }

    /// Put every snapshotted paragraph's segment list back, notifying for
    /// each one that actually changes. Segments deleted since the capture
    /// are left out. Restoring twice is harmless.
    pub fn restore(&self, store: &mut dyn AnnotationStore, listener: &mut dyn SegmentListener) {
        for (paragraph, ids) in &self.segments {
            if store.paragraph_len(*paragraph).is_err() {
                continue;
            }
            let live: Vec<AnnotationId> = ids
                .iter()
                .copied()
                .filter(|&id| store.annotation(id).is_ok())
                .collect();
            let previous = store.segment_ids(*paragraph);
            if previous == live {
                continue;
            }
            store.replace_segment_ids(*paragraph, &live);
            listener.segments_replaced(&SegmentsReplaced {
                paragraph: *paragraph,
                previous,
                current: store.segment_ids(*paragraph),
            });
        }
    }
}

pub trait UndoableAction: fmt::Debug {
    fn undo(&self, store: &mut dyn AnnotationStore, listener: &mut dyn SegmentListener);
    fn redo(&self, store: &mut dyn AnnotationStore, listener: &mut dyn SegmentListener);
    /// Capture the post-edit state; returns whether anything changed
    fn record_done_state(&mut self, store: &dyn AnnotationStore) -> Result<bool>;
}

/// Reversible record of how one edit changed the segment lists of a text
#[derive(Debug, Clone)]
pub struct SegmentListAction {
    before: [TextState; 2],
    after: Option<[TextState; 2]>,
}

impl SegmentListAction {
    pub fn new(anchor: TextState, far_end: TextState) -> Self {
        Self {
            before: [anchor, far_end],
            after: None,
        }
    }

    pub fn before(&self) -> &TextState {
        &self.before[0]
    }

    pub fn after(&self) -> Option<&TextState> {
        self.after.as_ref().map(|states| &states[0])
    }
}

/// Each text once: both ends of a selection within one text snapshot the
/// same paragraphs.
fn restore_states(
    states: &[TextState],
    store: &mut dyn AnnotationStore,
    listener: &mut dyn SegmentListener,
) {
    for (i, state) in states.iter().enumerate() {
        if states[..i].iter().any(|earlier| earlier.text == state.text) {
            continue;
        }
        state.restore(store, listener);
    }
}

impl UndoableAction for SegmentListAction {
    fn undo(&self, store: &mut dyn AnnotationStore, listener: &mut dyn SegmentListener) {
        restore_states(&self.before, store, listener);
    }

    fn redo(&self, store: &mut dyn AnnotationStore, listener: &mut dyn SegmentListener) {
        if let Some(after) = &self.after {
            restore_states(after, store, listener);
        }
    }

    fn record_done_state(&mut self, store: &dyn AnnotationStore) -> Result<bool> {
        let [anchor, far_end] = &self.before;
        let after = [
            TextState::capture(store, anchor.text, anchor.paragraph)?,
            TextState::capture(store, far_end.text, far_end.paragraph)?,
        ];
        let changed = after[0].segments != anchor.segments || after[1].segments != far_end.segments;
        self.after = Some(after);
        Ok(changed)
    }
}

/// Where finished edits register their undoable actions
pub trait ActionLog {
    fn register(&mut self, action: Box<dyn UndoableAction>);
}

/// Bounded undo/redo stack
#[derive(Debug)]
pub struct UndoHistory {
    actions: VecDeque<Box<dyn UndoableAction>>,
    /// Number of actions currently applied
    current_index: usize,
    max_size: usize,
}

impl Default for UndoHistory {
    fn default() -> Self {
        Self::new(100)
    }
}

impl UndoHistory {
    pub fn new(max_size: usize) -> Self {
        Self {
            actions: VecDeque::new(),
            current_index: 0,
            max_size,
        }
    }

    pub fn undo(
        &mut self,
        store: &mut dyn AnnotationStore,
        listener: &mut dyn SegmentListener,
    ) -> Result<()> {
        if !self.can_undo() {
            return Err(SyncError::NothingToUndo);
        }
        self.current_index -= 1;
        self.actions[self.current_index].undo(store, listener);
        Ok(())
    }

    pub fn redo(
        &mut self,
        store: &mut dyn AnnotationStore,
        listener: &mut dyn SegmentListener,
    ) -> Result<()> {
        if !self.can_redo() {
            return Err(SyncError::NothingToRedo);
        }
        self.actions[self.current_index].redo(store, listener);
        self.current_index += 1;
        Ok(())
    }

    pub fn can_undo(&self) -> bool {
        self.current_index > 0
    }

    pub fn can_redo(&self) -> bool {
        self.current_index < self.actions.len()
    }

    pub fn undo_count(&self) -> usize {
        self.current_index
    }

    pub fn redo_count(&self) -> usize {
        self.actions.len() - self.current_index
    }
}

impl ActionLog for UndoHistory {
    fn register(&mut self, action: Box<dyn UndoableAction>) {
        // a new edit discards anything that could have been redone
        self.actions.truncate(self.current_index);
        self.actions.push_back(action);
        self.current_index = self.actions.len();

        if self.actions.len() > self.max_size {
            self.actions.pop_front();
            self.current_index = self.current_index.saturating_sub(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AnnotationKind, NewAnnotation};
    use crate::store::MemoryStore;
    use pretty_assertions::assert_eq;

    fn two_segment_store() -> (MemoryStore, TextId, ParagraphId, Vec<AnnotationId>) {
        let mut store = MemoryStore::new();
        let text = store.add_text();
        let para = store.add_paragraph(text, "sample. sentence.").unwrap();
        let ids = [0..8, 8..17]
            .into_iter()
            .map(|r| {
                store
                    .create_annotation(NewAnnotation::new(para, AnnotationKind::Segment, r))
                    .unwrap()
            })
            .collect();
        (store, text, para, ids)
    }

    #[test]
    fn undo_and_redo_restore_snapshots() {
        let (mut store, text, para, ids) = two_segment_store();
        let before = TextState::capture(&store, text, para).unwrap();
        let mut action = SegmentListAction::new(before.clone(), before);

        store.delete_annotations(&[ids[1]]);
        assert!(action.record_done_state(&store).unwrap());

        let mut listener = RecordingListener::default();
        action.undo(&mut store, &mut listener);
        // the deleted segment is not live, so only the surviving one comes back
        assert_eq!(store.segment_ids(para), vec![ids[0]]);
        assert!(listener.changes.is_empty());

        store.replace_segment_ids(para, &[]);
        action.undo(&mut store, &mut listener);
        assert_eq!(
            listener.changes,
            vec![SegmentsReplaced {
                paragraph: para,
                previous: vec![],
                current: vec![ids[0]],
            }]
        );

        action.redo(&mut store, &mut listener);
        assert_eq!(store.segment_ids(para), vec![ids[0]]);
    }

    #[test]
    fn unchanged_edit_records_nothing() {
        let (store, text, para, _) = two_segment_store();
        let before = TextState::capture(&store, text, para).unwrap();
        let mut action = SegmentListAction::new(before.clone(), before);
        assert!(!action.record_done_state(&store).unwrap());
    }

    #[derive(Debug)]
    struct Counter(std::rc::Rc<std::cell::Cell<i32>>);

    impl UndoableAction for Counter {
        fn undo(&self, _: &mut dyn AnnotationStore, _: &mut dyn SegmentListener) {
            self.0.set(self.0.get() - 1);
        }
        fn redo(&self, _: &mut dyn AnnotationStore, _: &mut dyn SegmentListener) {
            self.0.set(self.0.get() + 1);
        }
        fn record_done_state(&mut self, _: &dyn AnnotationStore) -> Result<bool> {
            Ok(true)
        }
    }

    #[test]
    fn history_truncates_redo_and_enforces_max_size() {
        let mut store = MemoryStore::new();
        let mut listener = RecordingListener::default();
        let value = std::rc::Rc::new(std::cell::Cell::new(0));
        let mut history = UndoHistory::new(3);

        for _ in 0..5 {
            value.set(value.get() + 1);
            history.register(Box::new(Counter(value.clone())));
        }
        assert_eq!(history.undo_count(), 3);

        history.undo(&mut store, &mut listener).unwrap();
        history.undo(&mut store, &mut listener).unwrap();
        assert_eq!(value.get(), 3);
        assert_eq!(history.redo_count(), 2);

        history.register(Box::new(Counter(value.clone())));
        assert!(!history.can_redo());
        assert_eq!(history.undo_count(), 2);

        history.undo(&mut store, &mut listener).unwrap();
        history.undo(&mut store, &mut listener).unwrap();
        assert_eq!(
            history.undo(&mut store, &mut listener),
            Err(SyncError::NothingToUndo)
        );
    }
}
