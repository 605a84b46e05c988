//! Full re-parse backstop for segments.

use std::ops::Range;

use crate::error::Result;
use crate::model::{Annotation, AnnotationId, AnnotationKind, NewAnnotation, ParagraphId, TextId};
use crate::scan::SegmentScanner;
use crate::store::{AnnotationStore, migrate_freeform};

pub trait Reparser {
    fn reparse_paragraph(&self, store: &mut dyn AnnotationStore, paragraph: ParagraphId) -> Result<()>;

    fn reparse_text(&self, store: &mut dyn AnnotationStore, text: TextId) -> Result<()> {
        for paragraph in store.paragraphs_of(text)? {
            self.reparse_paragraph(store, paragraph)?;
        }
        Ok(())
    }
}

/// Do a paragraph's segments cover its text exactly once, in order?
pub fn segments_partition(store: &dyn AnnotationStore, paragraph: ParagraphId) -> Result<bool> {
    let len = store.paragraph_len(paragraph)?;
    let mut cursor = 0;
    for id in store.segment_ids(paragraph) {
        let segment = store.annotation(id)?;
        if segment.begin != cursor || segment.end < segment.begin {
            return Ok(false);
        }
        cursor = segment.end;
    }
    Ok(cursor == len)
}

fn overlap(a: &Range<usize>, b: &Range<usize>) -> usize {
    a.end.min(b.end).saturating_sub(a.start.max(b.start))
}

/// Rebuilds segments from a `SegmentScanner`, reusing existing segments
/// where it can so their ids and freeform annotations survive.
#[derive(Debug, Clone)]
pub struct SegmentReparser<S> {
    scanner: S,
    separator: String,
}

impl<S: SegmentScanner> SegmentReparser<S> {
    pub fn new(scanner: S, separator: impl Into<String>) -> Self {
        Self {
            scanner,
            separator: separator.into(),
        }
    }
}

impl<S: SegmentScanner> Reparser for SegmentReparser<S> {
    fn reparse_paragraph(&self, store: &mut dyn AnnotationStore, paragraph: ParagraphId) -> Result<()> {
        let text = store.paragraph_text(paragraph)?;
        let ranges = self.scanner.scan(&text).segments;
        let mut unused: Vec<Annotation> = store
            .annotations_in(paragraph)
            .into_iter()
            .filter(|ann| ann.kind == AnnotationKind::Segment)
            .collect();
        let mut assigned: Vec<Option<AnnotationId>> = vec![None; ranges.len()];

        for (slot, range) in assigned.iter_mut().zip(&ranges) {
            if let Some(i) = unused.iter().position(|ann| ann.range() == *range) {
                *slot = Some(unused.remove(i).id);
            }
        }

        for (slot, range) in assigned.iter_mut().zip(&ranges) {
            if slot.is_some() {
                continue;
            }
            let mut best: Option<(usize, usize)> = None;
            for (i, ann) in unused.iter().enumerate() {
                let shared = overlap(&ann.range(), range);
                if shared > 0 && best.is_none_or(|(most, _)| shared > most) {
                    best = Some((shared, i));
                }
            }
            let id = match best {
                Some((_, i)) => {
                    let ann = unused.remove(i);
                    store.set_offsets(ann.id, range.start, range.end)?;
                    ann.id
                }
                None => store.create_annotation(NewAnnotation::new(
                    paragraph,
                    AnnotationKind::Segment,
                    range.clone(),
                ))?,
            };
            *slot = Some(id);
        }

        let mut leftovers = Vec::new();
        for ann in unused {
            if store.is_user_authored(ann.id) {
                log::warn!("re-parse of {paragraph} kept user-authored segment {}", ann.id);
                let end = ann.end.min(text.len());
                store.set_offsets(ann.id, ann.begin.min(end), end)?;
                continue;
            }
            let covering = ranges
                .iter()
                .zip(&assigned)
                .max_by_key(|(range, _)| overlap(&ann.range(), range))
                .and_then(|(_, id)| *id);
            if let Some(into) = covering {
                migrate_freeform(store, ann.id, into, &self.separator)?;
            }
            leftovers.push(ann.id);
        }
        if !leftovers.is_empty() {
            log::debug!("re-parse of {paragraph} dropped segments {leftovers:?}");
            store.delete_annotations(&leftovers);
        }
        Ok(())
    }
}
