mod common;

use common::{Host, assert_consistent, dump, parse_paragraph, segment, text_with, token};
use interlinear_sync_engine::{
    AnnotationKind, AnnotationStore, FreeformKind, MemoryStore, NewAnnotation, Survivor,
    SyncError, Synchronizer, TextBuffer,
};
use pretty_assertions::assert_eq;

#[test]
fn enter_moves_trailing_annotations_into_the_new_paragraph() {
    let mut store = MemoryStore::new();
    let (text, paras) = text_with(&mut store, &["one two"]);
    let para = paras[0];
    parse_paragraph(&mut store, para);
    let trailing: Vec<_> = store
        .annotations_in(para)
        .into_iter()
        .filter(|ann| ann.begin >= 3)
        .collect();

    let mut host = Host::default();
    let (new_para, outcome) = Synchronizer::default()
        .split_paragraph(&mut store, &mut host.hooks(), para, 3)
        .unwrap();

    assert_eq!(store.paragraphs_of(text).unwrap(), vec![para, new_para]);
    for ann in &trailing {
        let moved = store.annotation(ann.id).unwrap();
        assert_eq!(moved.owner, new_para);
        assert_eq!(moved.begin, ann.begin - 3);
    }
    assert_eq!(
        outcome.relocated,
        trailing.iter().map(|ann| ann.id).collect::<Vec<_>>()
    );
    assert_consistent(&store, text);
    insta::assert_snapshot!(dump(&store, text), @r#"
    0 "one"
      Segment 0..3 "one"
      Token 0..3 "one"
    1 " two"
      Segment 0..4 " two"
      Token 1..4 "two"
    "#);
}

#[test]
fn enter_inside_a_word_deletes_its_token() {
    let mut store = MemoryStore::new();
    let (text, paras) = text_with(&mut store, &["one two"]);
    let para = paras[0];
    let one = token(&mut store, para, 0..3);
    let two = token(&mut store, para, 4..7);

    let mut host = Host::default();
    let (_, outcome) = Synchronizer::default()
        .split_paragraph(&mut store, &mut host.hooks(), para, 5)
        .unwrap();

    assert_eq!(outcome.deleted, vec![two]);
    assert!(store.contains(one));
    assert_consistent(&store, text);
}

#[test]
fn relocation_refuses_a_paragraph_in_the_wrong_place() {
    let mut store = MemoryStore::new();
    let (text, paras) = text_with(&mut store, &["one two", "three"]);
    let (para, unrelated) = (paras[0], paras[1]);
    let two = token(&mut store, para, 4..7);
    let mut sync = Synchronizer::default();

    let mut session = sync.begin_edit(&store, text, para, para).unwrap();
    sync.before_split(&store, &mut session, para, 3).unwrap();
    store.split_paragraph(para, 3).unwrap();
    let err = sync
        .after_split(&mut store, &mut session, unrelated)
        .unwrap_err();
    sync.abort_edit(session);

    assert_eq!(
        err,
        SyncError::UnexpectedParagraphPosition {
            expected: 1,
            found: 2
        }
    );
    assert_eq!(store.annotation(two).unwrap().owner, para);
    assert!(!sync.is_editing());
}

#[test]
fn backspace_appends_to_the_previous_paragraph() {
    let mut store = MemoryStore::new();
    let (text, paras) = text_with(&mut store, &["First one.", "Second."]);
    for &para in &paras {
        parse_paragraph(&mut store, para);
    }

    let mut host = Host::default();
    let outcome = Synchronizer::default()
        .merge_with_previous(&mut store, &mut host.hooks(), paras[1])
        .unwrap();

    assert_eq!(store.paragraphs_of(text).unwrap(), vec![paras[0]]);
    assert_eq!(outcome.relocated.len(), 3);
    assert!(outcome.deleted.is_empty());
    assert_eq!(host.listener.changes.len(), 1);
    assert_consistent(&store, text);
    insta::assert_snapshot!(dump(&store, text), @r#"
    0 "First one.Second."
      Token 0..5 "First"
      Segment 0..10 "First one."
      Token 6..9 "one"
      Punctuation 9..10 "."
      Token 10..16 "Second"
      Segment 10..17 "Second."
      Punctuation 16..17 "."
    "#);
}

#[test]
fn cascading_backspaces_delete_text_removed_twice() {
    let mut store = MemoryStore::new();
    let (text, paras) = text_with(&mut store, &["One.", "Two.", "Three."]);
    for &para in &paras {
        parse_paragraph(&mut store, para);
    }
    let (first, second, third) = (paras[0], paras[1], paras[2]);
    let owned_ids = |store: &MemoryStore, para| {
        let mut ids: Vec<_> = store.annotations_in(para).iter().map(|a| a.id).collect();
        ids.sort();
        ids
    };
    let from_second = owned_ids(&store, second);
    let from_third = owned_ids(&store, third);

    let mut sync = Synchronizer::default();
    let mut host = Host::default();
    let mut session = sync.begin_edit(&store, text, first, third).unwrap();

    let survivor = sync
        .on_about_to_delete_paragraph(&store, &mut session, third, text, 2, false)
        .unwrap();
    assert_eq!(survivor, Survivor::Previous(second));
    let edit = store.replace_text(second, 4, 0, "Three.").unwrap();
    sync.adjust_for_edit(&mut store, &mut session, edit).unwrap();
    store.remove_paragraph(third).unwrap();

    let survivor = sync
        .on_about_to_delete_paragraph(&store, &mut session, second, text, 1, false)
        .unwrap();
    assert_eq!(survivor, Survivor::Previous(first));
    let edit = store.replace_text(first, 4, 0, "Two.Three.").unwrap();
    sync.adjust_for_edit(&mut store, &mut session, edit).unwrap();
    store.remove_paragraph(second).unwrap();

    let mut outcome = sync.end_edit(&mut store, session, &mut host.hooks()).unwrap();
    outcome.relocated.sort();

    assert_eq!(outcome.deleted, from_third);
    assert_eq!(outcome.relocated, from_second);
    assert!(from_third.iter().all(|&id| !store.contains(id)));
    assert_eq!(store.paragraph_text(first).unwrap(), "One.Two.Three.");
    assert_consistent(&store, text);
}

#[test]
fn joined_sentences_keep_both_translations() {
    let mut store = MemoryStore::new();
    let (text, paras) = text_with(&mut store, &["one two", "three."]);
    let first = segment(&mut store, paras[0], 0..7);
    let second = segment(&mut store, paras[1], 0..6);
    let translation = store
        .add_freeform(first, FreeformKind::FreeTranslation, "en", "first")
        .unwrap();
    store
        .add_freeform(second, FreeformKind::FreeTranslation, "en", "second")
        .unwrap();

    let mut host = Host::default();
    Synchronizer::default()
        .merge_with_previous(&mut store, &mut host.hooks(), paras[1])
        .unwrap();

    assert_eq!(store.segment_ids(paras[0]), vec![first]);
    assert_eq!(store.annotation(first).unwrap().range(), 0..13);
    assert_eq!(
        store.freeform(translation).unwrap().ws_text["en"],
        "first second"
    );
    assert_consistent(&store, text);
}

#[test]
fn merging_into_the_next_paragraph_reparses_it() {
    let mut store = MemoryStore::new();
    let (text, paras) = text_with(&mut store, &["Intro.", "Body."]);
    let intro = segment(&mut store, paras[0], 0..6);
    let body = segment(&mut store, paras[1], 0..5);
    let word = token(&mut store, paras[1], 0..4);

    let mut host = Host::default();
    let outcome = Synchronizer::default()
        .delete_paragraph(&mut store, &mut host.hooks(), paras[0], true)
        .unwrap();

    assert_eq!(store.paragraphs_of(text).unwrap(), vec![paras[1]]);
    assert_eq!(store.paragraph_text(paras[1]).unwrap(), "Intro.Body.");
    assert_eq!(outcome.deleted, vec![intro]);
    assert_eq!(store.annotation(body).unwrap().range(), 6..11);
    assert_eq!(store.annotation(word).unwrap().range(), 6..10);
    assert_eq!(store.segment_ids(paras[1]).len(), 2);
    assert_consistent(&store, text);
}

#[test]
fn discarded_paragraph_hands_user_content_to_its_neighbour() {
    let mut store = MemoryStore::new();
    let (text, paras) = text_with(&mut store, &["Keep me.", "Drop this.", "Tail."]);
    for &para in &paras {
        parse_paragraph(&mut store, para);
    }
    let manual = store
        .create_annotation(
            NewAnnotation::new(paras[1], AnnotationKind::Token, 0..4).user_authored(),
        )
        .unwrap();

    let mut host = Host::default();
    let outcome = Synchronizer::default()
        .delete_paragraph(&mut store, &mut host.hooks(), paras[1], false)
        .unwrap();

    assert_eq!(store.paragraphs_of(text).unwrap(), vec![paras[0], paras[2]]);
    assert_eq!(outcome.rescued, vec![manual]);
    let manual = store.annotation(manual).unwrap();
    assert_eq!((manual.owner, manual.range()), (paras[2], 0..0));
    assert_consistent(&store, text);
}

#[test]
fn paragraphs_without_a_survivor_are_rejected() {
    let mut store = MemoryStore::new();
    let (_, paras) = text_with(&mut store, &["Only."]);
    let mut sync = Synchronizer::default();
    let mut host = Host::default();

    assert!(matches!(
        sync.merge_with_previous(&mut store, &mut host.hooks(), paras[0]),
        Err(SyncError::InvalidEdit { .. })
    ));
    assert!(matches!(
        sync.delete_paragraph(&mut store, &mut host.hooks(), paras[0], true),
        Err(SyncError::InvalidEdit { .. })
    ));
    assert!(!sync.is_editing());
}
