use crate::model::{AnnotationId, ParagraphId, TextId};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    #[error("annotation {id} would move to {begin}..{end}, outside paragraph of length {len}")]
    OffsetOutOfRange {
        id: AnnotationId,
        begin: isize,
        end: isize,
        len: usize,
    },
    #[error("annotation {0} was fully deleted before its kind-specific rule ran")]
    PrematureFullOverlap(AnnotationId),
    #[error("split paragraph landed at index {found}, expected {expected}")]
    UnexpectedParagraphPosition { expected: usize, found: usize },
    #[error("annotation {0} is already queued by an earlier step of this edit")]
    StaleAnnotationReference(AnnotationId),
    #[error("an edit session is already open on text {0}")]
    SessionAlreadyOpen(TextId),
    #[error("unknown text {0}")]
    UnknownText(TextId),
    #[error("unknown paragraph {0}")]
    UnknownParagraph(ParagraphId),
    #[error("unknown annotation {0}")]
    UnknownAnnotation(AnnotationId),
    #[error("invalid edit on {paragraph}: {reason}")]
    InvalidEdit {
        paragraph: ParagraphId,
        reason: String,
    },
    #[error("nothing to undo")]
    NothingToUndo,
    #[error("nothing to redo")]
    NothingToRedo,
}

impl SyncError {
    /// Soft errors leave an annotation stale until the next full re-parse
    /// instead of failing the edit.
    pub fn is_soft(&self) -> bool {
        matches!(
            self,
            SyncError::OffsetOutOfRange { .. }
                | SyncError::PrematureFullOverlap(_)
                | SyncError::StaleAnnotationReference(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
