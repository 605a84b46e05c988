//! Edit scenarios: a starting text plus a list of edits, replayed through
//! the engine with a report of what each edit did to the annotations.

use std::fmt::Write as _;

use anyhow::{Context, Result, bail};
use interlinear_sync_config::Config;
use interlinear_sync_engine::{
    AnnotationKind, AnnotationStore, EditHooks, EditOutcome, FreeformKind, MemoryStore,
    NewAnnotation, ParagraphId, RecordingListener, Reparser, SegmentReparser, SentenceScanner,
    SyncSettings, Synchronizer, TextId, UndoHistory, UnicodeWordClassifier, WordClassifier,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Scenario {
    /// Writing system used for translations
    #[serde(default = "default_ws")]
    pub ws: String,
    pub paragraphs: Vec<ParagraphSpec>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

fn default_ws() -> String {
    "en".to_string()
}

#[derive(Debug, Deserialize)]
pub struct ParagraphSpec {
    pub text: String,
    /// Build segments, tokens and punctuation from the text
    #[serde(default)]
    pub parse: bool,
    /// Free translations for the parsed segments, in order
    #[serde(default)]
    pub translations: Vec<String>,
    #[serde(default)]
    pub annotations: Vec<AnnotationSpec>,
}

#[derive(Debug, Deserialize)]
pub struct AnnotationSpec {
    pub kind: AnnotationKind,
    pub begin: usize,
    pub end: usize,
    #[serde(default)]
    pub user_authored: bool,
    pub translation: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    Replace {
        paragraph: usize,
        start: usize,
        #[serde(default)]
        deleted: usize,
        #[serde(default)]
        insert: String,
    },
    Split {
        paragraph: usize,
        offset: usize,
    },
    MergeWithPrevious {
        paragraph: usize,
    },
    DeleteParagraph {
        paragraph: usize,
        #[serde(default)]
        merge_with_next: bool,
    },
    Undo,
    Redo,
}

impl Scenario {
    pub fn from_toml(content: &str) -> Result<Self> {
        let scenario: Scenario = toml::from_str(content)?;
        if scenario.paragraphs.is_empty() {
            bail!("a scenario needs at least one paragraph");
        }
        Ok(scenario)
    }
}

/// Host side of a replay: the store plus everything the engine reports to
struct Replay {
    store: MemoryStore,
    text: TextId,
    sync: Synchronizer,
    history: UndoHistory,
    listener: RecordingListener,
    ws: String,
}

impl Replay {
    fn new(scenario: &Scenario, config: &Config) -> Result<Self> {
        let scanner = SentenceScanner::with_terminators(&config.segment_terminators)
            .with_context(|| format!("invalid segment terminators {:?}", config.segment_terminators))?;
        let settings = SyncSettings {
            freeform_separator: config.freeform_separator.clone(),
        };
        let mut store = MemoryStore::new();
        let text = store.add_text();
        let mut replay = Self {
            store,
            text,
            sync: Synchronizer::new(settings).with_scanner(scanner.clone()),
            history: UndoHistory::new(config.undo_depth),
            listener: RecordingListener::default(),
            ws: scenario.ws.clone(),
        };
        let parser = SegmentReparser::new(scanner, config.freeform_separator.clone());
        for (i, spec) in scenario.paragraphs.iter().enumerate() {
            replay
                .add_paragraph(spec, &parser)
                .with_context(|| format!("paragraph {i}"))?;
        }
        Ok(replay)
    }

    fn add_paragraph(
        &mut self,
        spec: &ParagraphSpec,
        parser: &SegmentReparser<SentenceScanner>,
    ) -> Result<()> {
        let para = self.store.add_paragraph(self.text, &spec.text)?;
        if spec.parse {
            parser.reparse_paragraph(&mut self.store, para)?;
            tokenize(&mut self.store, para, &spec.text)?;
            for (segment, translation) in self.store.segment_ids(para).into_iter().zip(&spec.translations) {
                self.store
                    .add_freeform(segment, FreeformKind::FreeTranslation, &self.ws, translation)?;
            }
        }
        for ann in &spec.annotations {
            let mut new = NewAnnotation::new(para, ann.kind, ann.begin..ann.end);
            if ann.user_authored {
                new = new.user_authored();
            }
            let id = self.store.create_annotation(new)?;
            if let Some(translation) = &ann.translation {
                self.store
                    .add_freeform(id, FreeformKind::FreeTranslation, &self.ws, translation)?;
            }
            if let Some(note) = &ann.note {
                self.store.add_freeform(id, FreeformKind::Note, &self.ws, note)?;
            }
        }
        Ok(())
    }

    fn paragraph(&self, index: usize) -> Result<ParagraphId> {
        self.store
            .paragraphs_of(self.text)?
            .get(index)
            .copied()
            .with_context(|| format!("no paragraph at index {index}"))
    }

    fn apply(&mut self, step: &Step) -> Result<Option<EditOutcome>> {
        let outcome = match step {
            Step::Replace {
                paragraph,
                start,
                deleted,
                insert,
            } => {
                let para = self.paragraph(*paragraph)?;
                self.sync.replace_text(
                    &mut self.store,
                    &mut EditHooks {
                        log: &mut self.history,
                        listener: &mut self.listener,
                    },
                    para,
                    *start,
                    *deleted,
                    insert,
                )?
            }
            Step::Split { paragraph, offset } => {
                let para = self.paragraph(*paragraph)?;
                let (_, outcome) = self.sync.split_paragraph(
                    &mut self.store,
                    &mut EditHooks {
                        log: &mut self.history,
                        listener: &mut self.listener,
                    },
                    para,
                    *offset,
                )?;
                outcome
            }
            Step::MergeWithPrevious { paragraph } => {
                let para = self.paragraph(*paragraph)?;
                self.sync.merge_with_previous(
                    &mut self.store,
                    &mut EditHooks {
                        log: &mut self.history,
                        listener: &mut self.listener,
                    },
                    para,
                )?
            }
            Step::DeleteParagraph {
                paragraph,
                merge_with_next,
            } => {
                let para = self.paragraph(*paragraph)?;
                self.sync.delete_paragraph(
                    &mut self.store,
                    &mut EditHooks {
                        log: &mut self.history,
                        listener: &mut self.listener,
                    },
                    para,
                    *merge_with_next,
                )?
            }
            Step::Undo => {
                self.history.undo(&mut self.store, &mut self.listener)?;
                return Ok(None);
            }
            Step::Redo => {
                self.history.redo(&mut self.store, &mut self.listener)?;
                return Ok(None);
            }
        };
        Ok(Some(outcome))
    }

    fn render(&self, out: &mut String) -> Result<()> {
        for (i, para) in self.store.paragraphs_of(self.text)?.into_iter().enumerate() {
            let content = self.store.paragraph_text(para)?;
            writeln!(out, "{i} {content:?}")?;
            for ann in self.store.annotations_in(para) {
                let surface = content.get(ann.range()).unwrap_or("<stale>");
                write!(out, "  {:?} {}..{} {surface:?}", ann.kind, ann.begin, ann.end)?;
                for freeform in self.store.linked_freeform(ann.id) {
                    for (ws, text) in &freeform.ws_text {
                        write!(out, " [{:?} {ws}: {text}]", freeform.kind)?;
                    }
                }
                writeln!(out)?;
            }
        }
        Ok(())
    }
}

/// Word tokens and punctuation runs, split on whitespace
fn tokenize(store: &mut MemoryStore, para: ParagraphId, text: &str) -> Result<()> {
    let words = UnicodeWordClassifier;
    let mut run: Option<(usize, AnnotationKind)> = None;
    let mut spans = Vec::new();
    for (i, ch) in text.char_indices() {
        let kind = if ch.is_whitespace() {
            None
        } else if words.is_word_forming(ch) {
            Some(AnnotationKind::Token)
        } else {
            Some(AnnotationKind::Punctuation)
        };
        if run.map(|(_, k)| k) != kind {
            if let Some((start, k)) = run {
                spans.push((start..i, k));
            }
            run = kind.map(|k| (i, k));
        }
    }
    if let Some((start, k)) = run {
        spans.push((start..text.len(), k));
    }
    for (range, kind) in spans {
        store.create_annotation(NewAnnotation::new(para, kind, range))?;
    }
    Ok(())
}

fn describe(step: &Step) -> String {
    match step {
        Step::Replace {
            paragraph,
            start,
            deleted,
            insert,
        } => format!("replace {paragraph}:{start}..{} with {insert:?}", start + deleted),
        Step::Split { paragraph, offset } => format!("split {paragraph} at {offset}"),
        Step::MergeWithPrevious { paragraph } => format!("merge {paragraph} with previous"),
        Step::DeleteParagraph {
            paragraph,
            merge_with_next: true,
        } => format!("merge {paragraph} into next"),
        Step::DeleteParagraph { paragraph, .. } => format!("delete {paragraph}"),
        Step::Undo => "undo".to_string(),
        Step::Redo => "redo".to_string(),
    }
}

fn list<T: std::fmt::Display>(items: &[T]) -> String {
    if items.is_empty() {
        "-".to_string()
    } else {
        items
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Replay every step, returning the report
pub fn run(scenario: &Scenario, config: &Config) -> Result<String> {
    let mut replay = Replay::new(scenario, config)?;
    let mut out = String::new();
    writeln!(out, "initial")?;
    replay.render(&mut out)?;

    for (n, step) in scenario.steps.iter().enumerate() {
        log::debug!("step {}: {step:?}", n + 1);
        let seen = replay.listener.changes.len();
        let outcome = replay
            .apply(step)
            .with_context(|| format!("step {} ({})", n + 1, describe(step)))?;

        writeln!(out, "\nstep {}: {}", n + 1, describe(step))?;
        if let Some(outcome) = outcome {
            writeln!(
                out,
                "  deleted {}; rescued {}; relocated {}; reparsed {}{}",
                list(&outcome.deleted),
                list(&outcome.rescued),
                list(&outcome.relocated),
                list(&outcome.reparsed),
                if outcome.undoable { "; undoable" } else { "" }
            )?;
        }
        for change in &replay.listener.changes[seen..] {
            writeln!(
                out,
                "  {}: [{}] -> [{}]",
                change.paragraph,
                list(&change.previous),
                list(&change.current)
            )?;
        }
        replay.render(&mut out)?;
    }
    Ok(out)
}
