//! Offset arithmetic for a single annotation under a single edit.
//!
//! Intervals are half-open: text inserted exactly at an annotation's end
//! offset lands after it. Text inserted exactly at its begin offset lands
//! before it unless `grow_at_boundary` is set.

use crate::error::{Result, SyncError};
use crate::model::{Annotation, EditEvent};

/// What `adjust_offsets` did to the annotation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adjustment {
    Unchanged,
    /// Both offsets moved by the same amount
    Shifted,
    /// Length changed
    Resized,
    /// Non-managed annotation whose whole span was deleted
    Collapsed,
}

/// Compute the post-edit offsets of `ann` without touching it
pub fn adjusted_range(
    ann: &Annotation,
    edit: &EditEvent,
    grow_at_boundary: bool,
    text_len: usize,
) -> Result<(usize, usize, Adjustment)> {
    let (begin, end) = (ann.begin, ann.end);
    if edit.start > end || edit.is_noop() {
        return Ok((begin, end, Adjustment::Unchanged));
    }

    if edit.deleted > 0 && edit.start <= begin && edit.deleted_end() >= end {
        if ann.kind.is_managed() {
            return Err(SyncError::PrematureFullOverlap(ann.id));
        }
        check_bounds(ann, edit.start, edit.start, text_len)?;
        return Ok((edit.start, edit.start, Adjustment::Collapsed));
    }

    let new_begin = edit.map_offset(begin, !grow_at_boundary);
    let new_end = if end == edit.start && begin < end {
        end
    } else {
        edit.map_offset(end, true)
    };
    check_bounds(ann, new_begin, new_end, text_len)?;

    let outcome = if (new_begin, new_end) == (begin, end) {
        Adjustment::Unchanged
    } else if new_end - new_begin == end - begin {
        Adjustment::Shifted
    } else {
        Adjustment::Resized
    };
    Ok((new_begin, new_end, outcome))
}

/// Adjust `ann` in place for `edit`. On error the annotation is untouched.
pub fn adjust_offsets(
    ann: &mut Annotation,
    edit: &EditEvent,
    grow_at_boundary: bool,
    text_len: usize,
) -> Result<Adjustment> {
    let (begin, end, outcome) = adjusted_range(ann, edit, grow_at_boundary, text_len)?;
    ann.begin = begin;
    ann.end = end;
    Ok(outcome)
}

fn check_bounds(ann: &Annotation, begin: usize, end: usize, text_len: usize) -> Result<()> {
    if begin <= end && end <= text_len {
        Ok(())
    } else {
        Err(SyncError::OffsetOutOfRange {
            id: ann.id,
            begin: begin as isize,
            end: end as isize,
            len: text_len,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AnnotationId, AnnotationKind, ParagraphId};
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn ann(kind: AnnotationKind, begin: usize, end: usize) -> Annotation {
        Annotation {
            id: AnnotationId(1),
            begin,
            end,
            kind,
            owner: ParagraphId(0),
            analysis: None,
        }
    }

    fn edit(start: usize, inserted: usize, deleted: usize) -> EditEvent {
        EditEvent::new(ParagraphId(0), start, inserted, deleted)
    }

    #[rstest]
    #[case::edit_after_end(edit(12, 3, 0), false, (4, 10), Adjustment::Unchanged)]
    #[case::insert_at_end_is_outside(edit(10, 3, 0), true, (4, 10), Adjustment::Unchanged)]
    #[case::delete_from_end(edit(10, 0, 2), true, (4, 10), Adjustment::Unchanged)]
    #[case::insert_before(edit(1, 3, 0), true, (7, 13), Adjustment::Shifted)]
    #[case::delete_before(edit(1, 0, 2), true, (2, 8), Adjustment::Shifted)]
    #[case::insert_at_begin_no_grow(edit(4, 3, 0), false, (7, 13), Adjustment::Shifted)]
    #[case::insert_at_begin_grow(edit(4, 3, 0), true, (4, 13), Adjustment::Resized)]
    #[case::insert_inside(edit(6, 3, 0), false, (4, 13), Adjustment::Resized)]
    #[case::delete_inside(edit(5, 0, 3), false, (4, 7), Adjustment::Resized)]
    #[case::delete_across_begin(edit(2, 0, 4), false, (2, 6), Adjustment::Resized)]
    #[case::replace_across_begin_no_grow(edit(2, 1, 4), false, (3, 7), Adjustment::Resized)]
    #[case::replace_across_begin_grow(edit(2, 1, 4), true, (2, 7), Adjustment::Resized)]
    #[case::replace_across_end(edit(8, 5, 4), false, (4, 13), Adjustment::Resized)]
    fn adjusts_ten_byte_paragraph_span(
        #[case] edit: EditEvent,
        #[case] grow: bool,
        #[case] expected: (usize, usize),
        #[case] outcome: Adjustment,
    ) {
        let mut token = ann(AnnotationKind::Segment, 4, 10);
        let result = adjust_offsets(&mut token, &edit, grow, 20).unwrap();
        assert_eq!((token.begin, token.end), expected);
        assert_eq!(result, outcome);
    }

    #[test]
    fn noop_edit_changes_nothing() {
        let mut token = ann(AnnotationKind::Token, 0, 6);
        let result = adjust_offsets(&mut token, &edit(3, 0, 0), true, 15).unwrap();
        assert_eq!(result, Adjustment::Unchanged);
        assert_eq!(token.range(), 0..6);
    }

    #[test]
    fn full_overlap_of_managed_kind_is_premature() {
        for kind in [
            AnnotationKind::Token,
            AnnotationKind::Punctuation,
            AnnotationKind::Segment,
        ] {
            let mut span = ann(kind, 4, 6);
            let err = adjust_offsets(&mut span, &edit(3, 0, 4), true, 10).unwrap_err();
            assert_eq!(err, SyncError::PrematureFullOverlap(AnnotationId(1)));
            assert_eq!(span.range(), 4..6);
        }
    }

    #[test]
    fn full_overlap_of_external_note_collapses() {
        let mut note = ann(AnnotationKind::ExternalNote, 4, 6);
        let result = adjust_offsets(&mut note, &edit(3, 2, 4), true, 10).unwrap();
        assert_eq!(result, Adjustment::Collapsed);
        assert_eq!(note.range(), 3..3);
    }

    #[test]
    fn zero_length_span_follows_insertion() {
        let mut stub = ann(AnnotationKind::ExternalNote, 3, 3);
        adjust_offsets(&mut stub, &edit(3, 2, 0), false, 10).unwrap();
        assert_eq!(stub.range(), 5..5);

        let mut stub = ann(AnnotationKind::ExternalNote, 3, 3);
        adjust_offsets(&mut stub, &edit(3, 2, 0), true, 10).unwrap();
        assert_eq!(stub.range(), 3..5);
    }

    #[test]
    fn out_of_range_result_leaves_annotation_untouched() {
        let mut stale = ann(AnnotationKind::Segment, 4, 10);
        // buffer is shorter than the annotation claims
        let err = adjust_offsets(&mut stale, &edit(6, 1, 0), false, 8).unwrap_err();
        assert!(matches!(err, SyncError::OffsetOutOfRange { len: 8, .. }));
        assert!(err.is_soft());
        assert_eq!(stale.range(), 4..10);
    }
}
