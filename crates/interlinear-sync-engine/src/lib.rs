//! Keeps token, punctuation, segment and freeform annotations consistent with
//! paragraph text while it is being edited.
//!
//! A host mutates a paragraph buffer, then reports the change as an
//! [`EditEvent`] inside a session opened with [`Synchronizer::begin_edit`].
//! Deletions and cross-paragraph moves are queued on the [`EditSession`] and
//! applied once at [`Synchronizer::end_edit`], which also registers an
//! undoable action.

mod classify;
pub mod controller;
pub mod error;
pub mod intervals;
pub mod model;
pub mod moves;
pub mod reparse;
pub mod scan;
pub mod session;
pub mod store;
pub mod undo;

// Re-export key types for easier usage
pub use controller::{EditHooks, EditOutcome, SyncSettings, Synchronizer};
pub use error::{Result, SyncError};
pub use intervals::{Adjustment, adjust_offsets, adjusted_range};
pub use model::*;
pub use moves::Survivor;
pub use reparse::{Reparser, SegmentReparser, segments_partition};
pub use scan::{SegmentScan, SegmentScanner, SentenceScanner, UnicodeWordClassifier, WordClassifier};
pub use session::{DeletionBatch, EditSession, FlushReport};
pub use store::{AnnotationStore, MemoryStore, TextBuffer, migrate_freeform};
pub use undo::{
    ActionLog, RecordingListener, SegmentListAction, SegmentListener, SegmentsReplaced, TextState,
    UndoHistory, UndoableAction,
};
