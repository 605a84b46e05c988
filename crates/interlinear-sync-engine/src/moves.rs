//! Moving annotations between paragraphs when paragraphs split or merge.

use crate::error::{Result, SyncError};
use crate::model::{AnnotationId, ParagraphId};
use crate::session::{EditSession, PendingSplit, Relocation};
use crate::store::AnnotationStore;

/// Which paragraph inherits the content of a removed one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Survivor {
    /// The removed paragraph's text is appended to the previous paragraph
    Previous(ParagraphId),
    /// The removed paragraph's text flows into the next paragraph, which is
    /// re-parsed
    Next(ParagraphId),
    None,
}

/// First half of Enter: remember everything at or after the split point
pub(crate) fn capture_split(
    store: &dyn AnnotationStore,
    session: &mut EditSession,
    paragraph: ParagraphId,
    offset: usize,
) {
    let ids: Vec<AnnotationId> = store
        .annotations_in(paragraph)
        .into_iter()
        .filter(|ann| ann.begin >= offset && !session.is_queued(ann.id))
        .map(|ann| ann.id)
        .collect();
    log::debug!("split of {paragraph} at {offset} will move {} annotations", ids.len());
    session.pending_split = Some(PendingSplit {
        source: paragraph,
        offset,
        ids,
    });
}

/// Second half of Enter: move captured annotations into the new paragraph.
///
/// The new paragraph must sit directly after the one that was split;
/// anything else means the relocation would land in unrelated text.
pub(crate) fn relocate_split(
    store: &mut dyn AnnotationStore,
    session: &mut EditSession,
    new_paragraph: ParagraphId,
) -> Result<Vec<AnnotationId>> {
    let Some(split) = session.pending_split.take() else {
        return Ok(Vec::new());
    };
    let expected = store.paragraph_index(split.source)? + 1;
    let found = store.paragraph_index(new_paragraph)?;
    if found != expected {
        log::warn!(
            "refusing to relocate {} annotations from {} into {new_paragraph}",
            split.ids.len(),
            split.source
        );
        return Err(SyncError::UnexpectedParagraphPosition { expected, found });
    }

    let mut relocated = Vec::with_capacity(split.ids.len());
    for id in split.ids {
        let ann = store.annotation(id)?;
        store.set_owner(id, new_paragraph)?;
        let moved = store.set_offsets(id, ann.begin - split.offset, ann.end - split.offset);
        if let Err(err) = moved {
            log::debug!("relocated {id} left stale: {err}");
            session.needs_reparse.insert(new_paragraph);
        }
        relocated.push(id);
    }
    session.touched.insert(split.source);
    session.touched.insert(new_paragraph);
    session.relocated.extend(&relocated);
    Ok(relocated)
}

/// Queue what happens to a paragraph's annotations when it is removed.
///
/// Appending to the previous paragraph keeps them, shifted past its current
/// text. Flowing into the next paragraph deletes them; its re-parse builds
/// equivalents. Annotations already on their way into the removed paragraph
/// lose their text twice over and are deleted either way.
pub(crate) fn queue_removal(
    store: &dyn AnnotationStore,
    session: &mut EditSession,
    removed: ParagraphId,
    survivor: Survivor,
) -> Result<()> {
    for id in session.moves.take_targeting(removed) {
        log::debug!("{id} was moving into removed {removed}; deleting instead");
        session.deletions.queue(id);
    }

    let owned = store.annotations_in(removed);
    match survivor {
        Survivor::Previous(target) => {
            let shift = store.paragraph_len(target)?;
            let keep: Vec<AnnotationId> = owned
                .into_iter()
                .filter(|a| !session.is_queued(a.id))
                .map(|a| a.id)
                .collect();
            for id in keep {
                session.moves.queue(id, Relocation { target, shift });
            }
            session.touched.insert(target);
        }
        Survivor::Next(target) => {
            for ann in owned {
                session.deletions.queue_with_fallback(ann.id, target);
            }
            session.touched.insert(target);
        }
        Survivor::None => {
            for ann in owned {
                session.deletions.queue(ann.id);
            }
        }
    }
    Ok(())
}

/// Carry out queued relocations
pub(crate) fn apply_moves(store: &mut dyn AnnotationStore, session: &mut EditSession) {
    let moves: Vec<(AnnotationId, Relocation)> = session.moves.drain().collect();
    for (id, Relocation { target, shift }) in moves {
        let Ok(ann) = store.annotation(id) else {
            continue;
        };
        let moved = store
            .set_owner(id, target)
            .and_then(|()| store.set_offsets(id, ann.begin + shift, ann.end + shift));
        if let Err(err) = moved {
            log::debug!("relocation of {id} into {target} left it stale: {err}");
            session.needs_reparse.insert(target);
        }
        session.relocated.push(id);
    }
}
