//! The annotation store and text buffers the engine mutates.
//!
//! `AnnotationStore` is the seam to the host's backing store; `MemoryStore`
//! is an arena implementation where every back-reference (annotation to
//! paragraph, freeform to segment) is an id rather than a pointer.

use std::collections::BTreeMap;

use xi_rope::Rope;

use crate::error::{Result, SyncError};
use crate::model::{
    Annotation, AnnotationId, AnnotationKind, EditEvent, FreeformAnnotation, FreeformId,
    FreeformKind, NewAnnotation, ParagraphId, TextId,
};

pub trait AnnotationStore {
    /// Paragraphs of a text, in order
    fn paragraphs_of(&self, text: TextId) -> Result<Vec<ParagraphId>>;
    fn text_of(&self, paragraph: ParagraphId) -> Result<TextId>;
    fn paragraph_text(&self, paragraph: ParagraphId) -> Result<String>;
    fn annotation(&self, id: AnnotationId) -> Result<Annotation>;
    /// Annotations owned by `paragraph`, ordered by begin then end offset
    fn annotations_in(&self, paragraph: ParagraphId) -> Vec<Annotation>;
    /// The paragraph's owned segment sequence
    fn segment_ids(&self, paragraph: ParagraphId) -> Vec<AnnotationId>;
    fn replace_segment_ids(&mut self, paragraph: ParagraphId, ids: &[AnnotationId]);

    fn create_annotation(&mut self, new: NewAnnotation) -> Result<AnnotationId>;
    /// Bulk delete; segments take their freeform annotations with them
    fn delete_annotations(&mut self, ids: &[AnnotationId]);
    fn set_offsets(&mut self, id: AnnotationId, begin: usize, end: usize) -> Result<()>;
    fn set_owner(&mut self, id: AnnotationId, paragraph: ParagraphId) -> Result<()>;
    fn clear_analysis(&mut self, id: AnnotationId) -> Result<()>;

    fn linked_freeform(&self, segment: AnnotationId) -> Vec<FreeformAnnotation>;
    fn update_freeform(&mut self, freeform: &FreeformAnnotation) -> Result<()>;

    fn is_user_authored(&self, id: AnnotationId) -> bool;

    fn paragraph_len(&self, paragraph: ParagraphId) -> Result<usize> {
        self.paragraph_text(paragraph).map(|text| text.len())
    }

    fn paragraph_index(&self, paragraph: ParagraphId) -> Result<usize> {
        let text = self.text_of(paragraph)?;
        self.paragraphs_of(text)?
            .iter()
            .position(|&p| p == paragraph)
            .ok_or(SyncError::UnknownParagraph(paragraph))
    }
}

/// Mutations of the underlying text, performed by the host before it
/// reports the change to the engine.
pub trait TextBuffer {
    fn replace_text(
        &mut self,
        paragraph: ParagraphId,
        start: usize,
        deleted: usize,
        inserted: &str,
    ) -> Result<EditEvent>;

    /// Move everything from `offset` on into a new paragraph placed directly after
    fn split_paragraph(&mut self, paragraph: ParagraphId, offset: usize) -> Result<ParagraphId>;

    fn remove_paragraph(&mut self, paragraph: ParagraphId) -> Result<()>;
}

/// Move a segment's freeform annotations onto another segment. Translations
/// of a kind the target already has are appended to it with `separator`;
/// everything else is re-pointed. Nothing is dropped: merged sources stay on
/// `from` and go when it is deleted.
pub fn migrate_freeform(
    store: &mut dyn AnnotationStore,
    from: AnnotationId,
    into: AnnotationId,
    separator: &str,
) -> Result<()> {
    let mut existing = store.linked_freeform(into);
    for freeform in store.linked_freeform(from) {
        if freeform.kind.merges_on_segment_merge()
            && let Some(target) = existing.iter_mut().find(|ff| ff.kind == freeform.kind)
        {
            target.absorb_text(&freeform, separator);
            store.update_freeform(target)?;
            continue;
        }
        let mut moved = freeform;
        moved.applies_to = into;
        store.update_freeform(&moved)?;
        existing.push(moved);
    }
    Ok(())
}

#[derive(Debug, Clone)]
struct ParagraphEntry {
    text: TextId,
    buffer: Rope,
    segments: Vec<AnnotationId>,
}

#[derive(Debug, Clone)]
struct AnnotationEntry {
    annotation: Annotation,
    user_authored: bool,
}

/// In-memory arena of texts, paragraphs and annotations
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    next_id: u32,
    texts: BTreeMap<TextId, Vec<ParagraphId>>,
    paragraphs: BTreeMap<ParagraphId, ParagraphEntry>,
    annotations: BTreeMap<AnnotationId, AnnotationEntry>,
    freeform: BTreeMap<FreeformId, FreeformAnnotation>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    pub fn add_text(&mut self) -> TextId {
        let id = TextId(self.allocate());
        self.texts.insert(id, Vec::new());
        id
    }

    /// Append a paragraph to the end of `text`
    pub fn add_paragraph(&mut self, text: TextId, content: &str) -> Result<ParagraphId> {
        let id = ParagraphId(self.allocate());
        self.texts
            .get_mut(&text)
            .ok_or(SyncError::UnknownText(text))?
            .push(id);
        self.paragraphs.insert(
            id,
            ParagraphEntry {
                text,
                buffer: Rope::from(content),
                segments: Vec::new(),
            },
        );
        Ok(id)
    }

    pub fn add_freeform(
        &mut self,
        segment: AnnotationId,
        kind: FreeformKind,
        ws: &str,
        content: &str,
    ) -> Result<FreeformId> {
        if !self.annotations.contains_key(&segment) {
            return Err(SyncError::UnknownAnnotation(segment));
        }
        let id = FreeformId(self.allocate());
        self.freeform.insert(
            id,
            FreeformAnnotation {
                id,
                kind,
                ws_text: BTreeMap::from([(ws.to_string(), content.to_string())]),
                applies_to: segment,
            },
        );
        Ok(id)
    }

    pub fn freeform(&self, id: FreeformId) -> Option<&FreeformAnnotation> {
        self.freeform.get(&id)
    }

    pub fn contains(&self, id: AnnotationId) -> bool {
        self.annotations.contains_key(&id)
    }

    fn paragraph(&self, paragraph: ParagraphId) -> Result<&ParagraphEntry> {
        self.paragraphs
            .get(&paragraph)
            .ok_or(SyncError::UnknownParagraph(paragraph))
    }

    fn paragraph_mut(&mut self, paragraph: ParagraphId) -> Result<&mut ParagraphEntry> {
        self.paragraphs
            .get_mut(&paragraph)
            .ok_or(SyncError::UnknownParagraph(paragraph))
    }

    fn entry_mut(&mut self, id: AnnotationId) -> Result<&mut AnnotationEntry> {
        self.annotations
            .get_mut(&id)
            .ok_or(SyncError::UnknownAnnotation(id))
    }

    fn sort_segments(&mut self, paragraph: ParagraphId) {
        let Some(entry) = self.paragraphs.get(&paragraph) else {
            return;
        };
        let mut segments = entry.segments.clone();
        segments.sort_by_key(|id| {
            self.annotations
                .get(id)
                .map_or((usize::MAX, usize::MAX), |e| {
                    (e.annotation.begin, e.annotation.end)
                })
        });
        if let Some(entry) = self.paragraphs.get_mut(&paragraph) {
            entry.segments = segments;
        }
    }
}

impl AnnotationStore for MemoryStore {
    fn paragraphs_of(&self, text: TextId) -> Result<Vec<ParagraphId>> {
        self.texts
            .get(&text)
            .cloned()
            .ok_or(SyncError::UnknownText(text))
    }

    fn text_of(&self, paragraph: ParagraphId) -> Result<TextId> {
        self.paragraph(paragraph).map(|p| p.text)
    }

    fn paragraph_text(&self, paragraph: ParagraphId) -> Result<String> {
        self.paragraph(paragraph).map(|p| p.buffer.to_string())
    }

    fn paragraph_len(&self, paragraph: ParagraphId) -> Result<usize> {
        self.paragraph(paragraph).map(|p| p.buffer.len())
    }

    fn annotation(&self, id: AnnotationId) -> Result<Annotation> {
        self.annotations
            .get(&id)
            .map(|e| e.annotation.clone())
            .ok_or(SyncError::UnknownAnnotation(id))
    }

    fn annotations_in(&self, paragraph: ParagraphId) -> Vec<Annotation> {
        let mut owned: Vec<Annotation> = self
            .annotations
            .values()
            .filter(|e| e.annotation.owner == paragraph)
            .map(|e| e.annotation.clone())
            .collect();
        owned.sort_by_key(|a| (a.begin, a.end, a.id));
        owned
    }

    fn segment_ids(&self, paragraph: ParagraphId) -> Vec<AnnotationId> {
        self.paragraphs
            .get(&paragraph)
            .map(|p| p.segments.clone())
            .unwrap_or_default()
    }

    fn replace_segment_ids(&mut self, paragraph: ParagraphId, ids: &[AnnotationId]) {
        let live: Vec<AnnotationId> = ids
            .iter()
            .copied()
            .filter(|id| self.annotations.contains_key(id))
            .collect();
        if let Some(entry) = self.paragraphs.get_mut(&paragraph) {
            entry.segments = live;
        }
    }

    fn create_annotation(&mut self, new: NewAnnotation) -> Result<AnnotationId> {
        let len = self.paragraph(new.owner)?.buffer.len();
        if new.begin > new.end || new.end > len {
            return Err(SyncError::OffsetOutOfRange {
                id: AnnotationId(0),
                begin: new.begin as isize,
                end: new.end as isize,
                len,
            });
        }
        let id = AnnotationId(self.allocate());
        self.annotations.insert(
            id,
            AnnotationEntry {
                annotation: Annotation {
                    id,
                    begin: new.begin,
                    end: new.end,
                    kind: new.kind,
                    owner: new.owner,
                    analysis: new.analysis,
                },
                user_authored: new.user_authored,
            },
        );
        if new.kind == AnnotationKind::Segment {
            self.paragraph_mut(new.owner)?.segments.push(id);
            self.sort_segments(new.owner);
        }
        Ok(id)
    }

    fn delete_annotations(&mut self, ids: &[AnnotationId]) {
        for id in ids {
            let Some(entry) = self.annotations.remove(id) else {
                continue;
            };
            if let Some(paragraph) = self.paragraphs.get_mut(&entry.annotation.owner) {
                paragraph.segments.retain(|s| s != id);
            }
            self.freeform.retain(|_, ff| ff.applies_to != *id);
        }
    }

    fn set_offsets(&mut self, id: AnnotationId, begin: usize, end: usize) -> Result<()> {
        let owner = self.annotation(id)?.owner;
        let len = self.paragraph(owner)?.buffer.len();
        if begin > end || end > len {
            return Err(SyncError::OffsetOutOfRange {
                id,
                begin: begin as isize,
                end: end as isize,
                len,
            });
        }
        let entry = self.entry_mut(id)?;
        entry.annotation.begin = begin;
        entry.annotation.end = end;
        if entry.annotation.kind == AnnotationKind::Segment {
            self.sort_segments(owner);
        }
        Ok(())
    }

    fn set_owner(&mut self, id: AnnotationId, paragraph: ParagraphId) -> Result<()> {
        self.paragraph(paragraph)?;
        let entry = self.entry_mut(id)?;
        let previous = entry.annotation.owner;
        entry.annotation.owner = paragraph;
        if entry.annotation.kind == AnnotationKind::Segment && previous != paragraph {
            if let Some(old) = self.paragraphs.get_mut(&previous) {
                old.segments.retain(|s| *s != id);
            }
            self.paragraph_mut(paragraph)?.segments.push(id);
            self.sort_segments(paragraph);
        }
        Ok(())
    }

    fn clear_analysis(&mut self, id: AnnotationId) -> Result<()> {
        self.entry_mut(id)?.annotation.analysis = None;
        Ok(())
    }

    fn linked_freeform(&self, segment: AnnotationId) -> Vec<FreeformAnnotation> {
        self.freeform
            .values()
            .filter(|ff| ff.applies_to == segment)
            .cloned()
            .collect()
    }

    fn update_freeform(&mut self, freeform: &FreeformAnnotation) -> Result<()> {
        if !self.annotations.contains_key(&freeform.applies_to) {
            return Err(SyncError::UnknownAnnotation(freeform.applies_to));
        }
        self.freeform.insert(freeform.id, freeform.clone());
        Ok(())
    }

    fn is_user_authored(&self, id: AnnotationId) -> bool {
        self.annotations.get(&id).is_some_and(|e| e.user_authored)
    }
}

impl TextBuffer for MemoryStore {
    fn replace_text(
        &mut self,
        paragraph: ParagraphId,
        start: usize,
        deleted: usize,
        inserted: &str,
    ) -> Result<EditEvent> {
        let entry = self.paragraph_mut(paragraph)?;
        let current = entry.buffer.to_string();
        let end = start + deleted;
        if end > current.len() || !current.is_char_boundary(start) || !current.is_char_boundary(end)
        {
            return Err(SyncError::InvalidEdit {
                paragraph,
                reason: format!("{start}..{end} is not a character range of a {}-byte paragraph", current.len()),
            });
        }
        entry.buffer.edit(start..end, inserted);
        Ok(EditEvent::new(paragraph, start, inserted.len(), deleted))
    }

    fn split_paragraph(&mut self, paragraph: ParagraphId, offset: usize) -> Result<ParagraphId> {
        let entry = self.paragraph(paragraph)?;
        let (text, current) = (entry.text, entry.buffer.to_string());
        if offset > current.len() || !current.is_char_boundary(offset) {
            return Err(SyncError::InvalidEdit {
                paragraph,
                reason: format!("cannot split a {}-byte paragraph at {offset}", current.len()),
            });
        }
        let index = self.paragraph_index(paragraph)?;
        let id = ParagraphId(self.allocate());
        self.paragraph_mut(paragraph)?
            .buffer
            .edit(offset..current.len(), "");
        self.paragraphs.insert(
            id,
            ParagraphEntry {
                text,
                buffer: Rope::from(&current[offset..]),
                segments: Vec::new(),
            },
        );
        self.texts
            .get_mut(&text)
            .ok_or(SyncError::UnknownText(text))?
            .insert(index + 1, id);
        Ok(id)
    }

    fn remove_paragraph(&mut self, paragraph: ParagraphId) -> Result<()> {
        let entry = self
            .paragraphs
            .remove(&paragraph)
            .ok_or(SyncError::UnknownParagraph(paragraph))?;
        if let Some(paragraphs) = self.texts.get_mut(&entry.text) {
            paragraphs.retain(|p| *p != paragraph);
        }
        Ok(())
    }
}
