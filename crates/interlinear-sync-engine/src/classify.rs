//! Per-annotation decisions for one edit: survive, shift, resize, delete or
//! merge with a neighbouring segment.

use crate::error::{Result, SyncError};
use crate::intervals::{Adjustment, adjusted_range};
use crate::model::{Annotation, AnnotationId, AnnotationKind, EditEvent};
use crate::scan::{SegmentScan, WordClassifier};
use crate::session::EditSession;
use crate::store::{AnnotationStore, migrate_freeform};

/// Everything the classifier needs to know about one edit
pub(crate) struct EditContext<'a> {
    pub edit: EditEvent,
    /// Paragraph text after the edit
    pub text: &'a str,
    pub before: &'a SegmentScan,
    pub after: &'a SegmentScan,
    pub words: &'a dyn WordClassifier,
    pub separator: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Verdict {
    Keep(usize, usize, Adjustment),
    Delete,
    /// Kept alive pending a forward merge
    MergePending,
    /// Absorbed into the merge-pending segment
    Merged(AnnotationId),
    Stale(SyncError),
}

/// Classify and mutate every annotation of the edited paragraph that ends at
/// or after the edit, in offset order.
pub(crate) fn run_pass(
    store: &mut dyn AnnotationStore,
    session: &mut EditSession,
    ctx: &EditContext<'_>,
) -> Result<()> {
    let paragraph = ctx.edit.paragraph;
    let candidates: Vec<Annotation> = store
        .annotations_in(paragraph)
        .into_iter()
        .filter(|ann| ann.end >= ctx.edit.start)
        .collect();

    for ann in candidates {
        if session.is_queued(ann.id) {
            log::debug!("{}", SyncError::StaleAnnotationReference(ann.id));
            continue;
        }
        let verdict = match ann.kind {
            AnnotationKind::Token => classify_token(&ann, ctx),
            AnnotationKind::Punctuation => classify_punctuation(&ann, ctx),
            AnnotationKind::Segment => classify_segment(store, session, &ann, ctx)?,
            AnnotationKind::ExternalNote => {
                session.deferred_notes.push(ann.id);
                generic(&ann, ctx, true)
            }
        };
        log::debug!("{} {:?} {:?}: {verdict:?}", ann.id, ann.kind, ann.range());
        apply(store, session, &ann, verdict);
    }

    resolve_merge_pending(store, session, ctx);
    Ok(())
}

fn apply(store: &mut dyn AnnotationStore, session: &mut EditSession, ann: &Annotation, verdict: Verdict) {
    let result = match verdict {
        Verdict::Keep(_, _, Adjustment::Unchanged) | Verdict::MergePending | Verdict::Merged(_) => {
            Ok(())
        }
        Verdict::Keep(begin, end, _) => store.set_offsets(ann.id, begin, end),
        Verdict::Delete => {
            session.deletions.queue(ann.id);
            Ok(())
        }
        Verdict::Stale(err) => Err(err),
    };
    if let Err(err) = result {
        log::debug!("leaving {} stale until the next re-parse: {err}", ann.id);
        session.needs_reparse.insert(ann.owner);
    }
}

fn generic(ann: &Annotation, ctx: &EditContext<'_>, grow_at_boundary: bool) -> Verdict {
    match adjusted_range(ann, &ctx.edit, grow_at_boundary, ctx.text.len()) {
        Ok((begin, end, outcome)) => Verdict::Keep(begin, end, outcome),
        Err(err) => Verdict::Stale(err),
    }
}

fn classify_token(ann: &Annotation, ctx: &EditContext<'_>) -> Verdict {
    let edit = &ctx.edit;
    if edit.deletes_within(ann.range()) {
        return Verdict::Delete;
    }
    if edit.inserted > 0 && ann.begin < edit.start && edit.start < ann.end {
        return Verdict::Delete;
    }

    let verdict = generic(ann, ctx, false);
    let Verdict::Keep(begin, end, _) = verdict else {
        return verdict;
    };
    // a token is its exact surface form: new word characters against
    // either edge change which word it is
    let joined_before = edit.deleted_end() == ann.begin
        && char_before(ctx.text, begin).is_some_and(|ch| ctx.words.is_word_forming(ch));
    let joined_after = edit.start == ann.end
        && char_at(ctx.text, end).is_some_and(|ch| ctx.words.is_word_forming(ch));
    if joined_before || joined_after {
        Verdict::Delete
    } else {
        verdict
    }
}

fn classify_punctuation(ann: &Annotation, ctx: &EditContext<'_>) -> Verdict {
    let edit = &ctx.edit;
    if edit.deleted > 0 && edit.start <= ann.begin && edit.deleted_end() >= ann.end {
        return Verdict::Delete;
    }
    if edit.inserted > 0 && ann.begin < edit.start && edit.start < ann.end {
        return Verdict::Delete;
    }
    generic(ann, ctx, true)
}

fn classify_segment(
    store: &mut dyn AnnotationStore,
    session: &mut EditSession,
    ann: &Annotation,
    ctx: &EditContext<'_>,
) -> Result<Verdict> {
    let edit = &ctx.edit;
    let boundary = ctx.before.boundary_chars(ann.begin, ann.end);

    if is_fully_consumed(ann, ctx) {
        return Ok(Verdict::Delete);
    }

    if let Some(pending) = session.merge_pending
        && edit.deleted > 0
        && edit.deleted_end() <= boundary.start
    {
        absorb(store, session, pending, ann, ctx)?;
        return Ok(Verdict::Merged(pending));
    }

    let boundary_touched = edit.deletes_within(boundary.clone())
        || (edit.inserted > 0 && boundary.start < edit.start && edit.start < boundary.end);
    if boundary_touched {
        if edit.start <= ann.begin {
            // part of this boundary survives, so nothing after it can join
            // the pending segment
            let boundary_gone = edit.start <= boundary.start && edit.deleted_end() >= boundary.end;
            if !boundary_gone && let Some(pending) = session.merge_pending.take() {
                resolve_to_boundary(store, session, pending, ctx);
            }
            return Ok(Verdict::Delete);
        }
        let Some(i) = ctx.after.first_ending_after(ann.begin) else {
            return Ok(Verdict::Keep(ann.begin, ctx.text.len(), Adjustment::Resized));
        };
        let (segment, brk) = (&ctx.after.segments[i], ctx.after.breaks[i]);
        let typed_here = (edit.start <= brk && brk < edit.inserted_end())
            || (edit.start < segment.end && segment.end <= edit.inserted_end());
        if typed_here {
            return Ok(Verdict::Keep(ann.begin, segment.end, Adjustment::Resized));
        }
        if let Some(previous) = session.merge_pending.replace(ann.id) {
            resolve_to_boundary(store, session, previous, ctx);
        }
        return Ok(Verdict::MergePending);
    }

    if edit.inserted > 0 && ann.begin <= edit.start && edit.start < ann.end {
        let verdict = generic(ann, ctx, true);
        let Verdict::Keep(begin, end, _) = verdict else {
            return Ok(verdict);
        };
        let Some(i) = ctx.after.first_ending_after(begin) else {
            return Ok(verdict);
        };
        let boundary_end = ctx.after.segments[i].end;
        if edit.start == ann.begin && boundary_end == edit.inserted_end() {
            // the inserted text completes whatever precedes this segment
            return Ok(generic(ann, ctx, false));
        }
        if begin < boundary_end && boundary_end < end {
            return Ok(Verdict::Keep(begin, boundary_end, Adjustment::Resized));
        }
        return Ok(verdict);
    }

    Ok(generic(ann, ctx, true))
}

fn char_before(text: &str, offset: usize) -> Option<char> {
    text.get(..offset)?.chars().next_back()
}

fn char_at(text: &str, offset: usize) -> Option<char> {
    text.get(offset..)?.chars().next()
}

/// The deletion starts at or before the segment and nothing but whitespace
/// of its old extent is left after the edit.
fn is_fully_consumed(ann: &Annotation, ctx: &EditContext<'_>) -> bool {
    let edit = &ctx.edit;
    if edit.deleted == 0 || edit.start > ann.begin {
        return false;
    }
    if edit.deleted_end() >= ann.end {
        return true;
    }
    let rest_end = ann.end - edit.deleted + edit.inserted;
    ctx.text
        .get(edit.inserted_end()..rest_end)
        .is_some_and(|rest| rest.trim().is_empty())
}

/// Merge `ann` into the merge-pending segment and queue `ann` for deletion
fn absorb(
    store: &mut dyn AnnotationStore,
    session: &mut EditSession,
    pending: AnnotationId,
    ann: &Annotation,
    ctx: &EditContext<'_>,
) -> Result<()> {
    let target = store.annotation(pending)?;
    let end = ctx.edit.map_offset(ann.end, true).min(ctx.text.len());
    if let Err(err) = store.set_offsets(pending, target.begin, end) {
        log::debug!("merged segment {pending} left stale: {err}");
        session.needs_reparse.insert(target.owner);
    }
    migrate_freeform(store, ann.id, pending, ctx.separator)?;
    session.deletions.queue(ann.id);
    session.merge_pending = None;
    Ok(())
}

/// An unconfirmed merge: the pending segment instead ends at the first
/// provisional boundary after its start.
fn resolve_merge_pending(
    store: &mut dyn AnnotationStore,
    session: &mut EditSession,
    ctx: &EditContext<'_>,
) {
    if let Some(pending) = session.merge_pending.take() {
        resolve_to_boundary(store, session, pending, ctx);
    }
}

fn resolve_to_boundary(
    store: &mut dyn AnnotationStore,
    session: &mut EditSession,
    pending: AnnotationId,
    ctx: &EditContext<'_>,
) {
    let Ok(ann) = store.annotation(pending) else {
        return;
    };
    let end = ctx
        .after
        .first_ending_after(ann.begin)
        .map_or(ctx.text.len(), |i| ctx.after.segments[i].end);
    log::debug!("merge for {pending} not confirmed, ending it at {end}");
    if store.set_offsets(pending, ann.begin, end).is_err() {
        session.needs_reparse.insert(ann.owner);
    }
}
