use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;

use serde::{Deserialize, Serialize};

macro_rules! arena_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub u32);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

arena_id!(
    /// Identifies a Text (an ordered paragraph sequence)
    TextId,
    "t"
);
arena_id!(
    /// Identifies a paragraph buffer
    ParagraphId,
    "p"
);
arena_id!(
    /// Identifies a positional annotation over paragraph text
    AnnotationId,
    "a"
);
arena_id!(
    /// Identifies a freeform annotation attached to a segment
    FreeformId,
    "f"
);
arena_id!(
    /// Externally owned analysis a token or punctuation span may point at
    AnalysisId,
    "x"
);

/// The closed set of annotation kinds this engine reasons about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationKind {
    /// Word-like span whose surface form must match its analysis
    Token,
    /// Punctuation run between tokens
    Punctuation,
    /// Sentence-like span; segments partition paragraph text
    Segment,
    /// Annotation owned by another subsystem, re-validated elsewhere
    ExternalNote,
}

impl AnnotationKind {
    /// Kinds whose full deletion must be resolved by the classifier before
    /// offsets are adjusted.
    pub fn is_managed(self) -> bool {
        !matches!(self, AnnotationKind::ExternalNote)
    }
}

/// A positional interval over one paragraph's text.
///
/// Offsets are UTF-8 byte offsets; `begin <= end <= paragraph length`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    pub id: AnnotationId,
    pub begin: usize,
    pub end: usize,
    pub kind: AnnotationKind,
    pub owner: ParagraphId,
    pub analysis: Option<AnalysisId>,
}

impl Annotation {
    pub fn range(&self) -> Range<usize> {
        self.begin..self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.begin
    }

    pub fn is_empty(&self) -> bool {
        self.begin == self.end
    }
}

/// Fields needed to create an annotation; the store assigns the id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAnnotation {
    pub owner: ParagraphId,
    pub kind: AnnotationKind,
    pub begin: usize,
    pub end: usize,
    pub analysis: Option<AnalysisId>,
    pub user_authored: bool,
}

impl NewAnnotation {
    pub fn new(owner: ParagraphId, kind: AnnotationKind, range: Range<usize>) -> Self {
        Self {
            owner,
            kind,
            begin: range.start,
            end: range.end,
            analysis: None,
            user_authored: false,
        }
    }

    pub fn with_analysis(mut self, analysis: AnalysisId) -> Self {
        self.analysis = Some(analysis);
        self
    }

    pub fn user_authored(mut self) -> Self {
        self.user_authored = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FreeformKind {
    FreeTranslation,
    LiteralTranslation,
    Note,
}

impl FreeformKind {
    /// Translations of two merged segments are concatenated; notes stay distinct.
    pub fn merges_on_segment_merge(self) -> bool {
        matches!(
            self,
            FreeformKind::FreeTranslation | FreeformKind::LiteralTranslation
        )
    }
}

/// Multilingual commentary attached to a segment, keyed by writing system
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreeformAnnotation {
    pub id: FreeformId,
    pub kind: FreeformKind,
    pub ws_text: BTreeMap<String, String>,
    pub applies_to: AnnotationId,
}

impl FreeformAnnotation {
    /// Merge another annotation's text into this one, writing system by writing system
    pub fn absorb_text(&mut self, other: &FreeformAnnotation, separator: &str) {
        for (ws, text) in &other.ws_text {
            if text.is_empty() {
                continue;
            }
            match self.ws_text.get_mut(ws) {
                Some(existing) if !existing.is_empty() => {
                    existing.push_str(separator);
                    existing.push_str(text);
                }
                _ => {
                    self.ws_text.insert(ws.clone(), text.clone());
                }
            }
        }
    }
}

/// The sole description of a change to one paragraph.
///
/// Coordinates are those of the paragraph after its buffer was mutated:
/// `start..start + inserted` is the new text, and `deleted` bytes of old
/// text used to follow `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditEvent {
    pub paragraph: ParagraphId,
    pub start: usize,
    pub inserted: usize,
    pub deleted: usize,
}

impl EditEvent {
    pub fn new(paragraph: ParagraphId, start: usize, inserted: usize, deleted: usize) -> Self {
        Self {
            paragraph,
            start,
            inserted,
            deleted,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.inserted == 0 && self.deleted == 0
    }

    /// End of the deleted range, in pre-edit coordinates
    pub fn deleted_end(&self) -> usize {
        self.start + self.deleted
    }

    /// End of the inserted range, in post-edit coordinates
    pub fn inserted_end(&self) -> usize {
        self.start + self.inserted
    }

    /// Does the deletion intersect `range` (pre-edit coordinates)?
    pub fn deletes_within(&self, range: Range<usize>) -> bool {
        self.deleted > 0 && self.start < range.end && self.deleted_end() > range.start
    }

    /// Map a pre-edit offset into post-edit coordinates. Offsets inside the
    /// deleted range land at the edit point; `after_insert` decides which
    /// side of the inserted text they land on.
    pub fn map_offset(&self, offset: usize, after_insert: bool) -> usize {
        if offset < self.start {
            offset
        } else if offset > self.deleted_end() || (offset == self.deleted_end() && self.deleted > 0)
        {
            offset - self.deleted + self.inserted
        } else if after_insert {
            self.inserted_end()
        } else {
            self.start
        }
    }
}
