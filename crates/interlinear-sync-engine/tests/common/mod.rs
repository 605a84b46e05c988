// Shared fixtures - each integration test binary uses a different subset
#![allow(dead_code)]

use std::fmt::Write as _;

use interlinear_sync_engine::{
    AnnotationId, AnnotationKind, AnnotationStore, EditHooks, MemoryStore, NewAnnotation,
    ParagraphId, RecordingListener, SegmentScanner, SentenceScanner, TextId, UndoHistory,
    segments_partition,
};

/// Owns the undo log and listener a `Synchronizer` reports to
#[derive(Debug, Default)]
pub struct Host {
    pub history: UndoHistory,
    pub listener: RecordingListener,
}

impl Host {
    pub fn hooks(&mut self) -> EditHooks<'_> {
        EditHooks {
            log: &mut self.history,
            listener: &mut self.listener,
        }
    }
}

pub fn segment(store: &mut MemoryStore, para: ParagraphId, range: std::ops::Range<usize>) -> AnnotationId {
    store
        .create_annotation(NewAnnotation::new(para, AnnotationKind::Segment, range))
        .unwrap()
}

pub fn token(store: &mut MemoryStore, para: ParagraphId, range: std::ops::Range<usize>) -> AnnotationId {
    store
        .create_annotation(NewAnnotation::new(para, AnnotationKind::Token, range))
        .unwrap()
}

/// Stand-in for the host's full parser: sentence segments, word tokens and
/// punctuation runs.
pub fn parse_paragraph(store: &mut MemoryStore, para: ParagraphId) {
    let text = store.paragraph_text(para).unwrap();
    for range in SentenceScanner::default().scan(&text).segments {
        segment(store, para, range);
    }

    let mut run: Option<(usize, bool)> = None;
    let flush = |store: &mut MemoryStore, run: Option<(usize, bool)>, end: usize| {
        if let Some((start, word)) = run {
            let kind = if word {
                AnnotationKind::Token
            } else {
                AnnotationKind::Punctuation
            };
            store
                .create_annotation(NewAnnotation::new(para, kind, start..end))
                .unwrap();
        }
    };
    for (i, ch) in text.char_indices() {
        let class = if ch.is_whitespace() {
            None
        } else {
            Some(ch.is_alphanumeric())
        };
        match (run, class) {
            (Some((_, word)), Some(is_word)) if word == is_word => {}
            _ => {
                flush(store, run, i);
                run = class.map(|is_word| (i, is_word));
            }
        }
    }
    flush(store, run, text.len());
}

pub fn text_with(store: &mut MemoryStore, paragraphs: &[&str]) -> (TextId, Vec<ParagraphId>) {
    let text = store.add_text();
    let ids = paragraphs
        .iter()
        .map(|content| store.add_paragraph(text, content).unwrap())
        .collect();
    (text, ids)
}

/// One line per paragraph, then one indented line per annotation it owns
pub fn dump(store: &MemoryStore, text: TextId) -> String {
    let mut out = String::new();
    for (i, para) in store.paragraphs_of(text).unwrap().into_iter().enumerate() {
        let content = store.paragraph_text(para).unwrap();
        writeln!(out, "{i} {content:?}").unwrap();
        for ann in store.annotations_in(para) {
            let surface = content.get(ann.range()).unwrap_or("<stale>");
            writeln!(out, "  {:?} {}..{} {surface:?}", ann.kind, ann.begin, ann.end).unwrap();
        }
    }
    out.trim_end().to_string()
}

/// Every annotation inside its paragraph, every paragraph's segments a partition
pub fn assert_consistent(store: &MemoryStore, text: TextId) {
    for para in store.paragraphs_of(text).unwrap() {
        let len = store.paragraph_len(para).unwrap();
        for ann in store.annotations_in(para) {
            assert!(
                ann.begin <= ann.end && ann.end <= len,
                "{} {:?} out of range in {len}-byte {para}",
                ann.id,
                ann.range()
            );
        }
        assert!(
            segments_partition(store, para).unwrap(),
            "segments of {para} do not partition its text:\n{}",
            dump(store, text)
        );
    }
}
