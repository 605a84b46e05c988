//! Lightweight segmentation and word classification.
//!
//! These stand in for the host application's parser in "scan only" mode:
//! they report where segments would fall without creating anything.

use std::ops::Range;

use regex::Regex;

pub trait WordClassifier {
    fn is_word_forming(&self, ch: char) -> bool;
}

/// Letters, digits and word-medial apostrophes/hyphens
#[derive(Debug, Clone, Copy, Default)]
pub struct UnicodeWordClassifier;

impl WordClassifier for UnicodeWordClassifier {
    fn is_word_forming(&self, ch: char) -> bool {
        ch.is_alphanumeric() || matches!(ch, '\'' | '\u{2019}' | '-')
    }
}

/// Provisional segmentation of one paragraph.
///
/// `segments` partition the text; `breaks[i]` is the offset where the
/// boundary characters of `segments[i]` begin (its end if unterminated).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SegmentScan {
    pub breaks: Vec<usize>,
    pub segments: Vec<Range<usize>>,
}

impl SegmentScan {
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Index of the first provisional segment ending after `offset`
    pub fn first_ending_after(&self, offset: usize) -> Option<usize> {
        self.segments.iter().position(|seg| seg.end > offset)
    }

    /// Boundary-character range of the provisional segment containing the
    /// last byte before `end`, clipped to start no earlier than `begin`.
    pub fn boundary_chars(&self, begin: usize, end: usize) -> Range<usize> {
        if end == 0 {
            return 0..0;
        }
        self.segments
            .iter()
            .zip(&self.breaks)
            .find(|(seg, _)| seg.start < end && end <= seg.end)
            .map(|(_, &brk)| brk.clamp(begin, end)..end)
            .unwrap_or(end..end)
    }
}

pub trait SegmentScanner {
    fn scan(&self, text: &str) -> SegmentScan;
}

/// Splits after runs of sentence-final punctuation and the whitespace that follows
#[derive(Debug, Clone)]
pub struct SentenceScanner {
    pattern: Regex,
}

impl SentenceScanner {
    pub const DEFAULT_TERMINATORS: &'static str = ".!?";

    pub fn with_terminators(terminators: &str) -> Result<Self, regex::Error> {
        let class: String = terminators.chars().map(|c| regex::escape(&c.to_string())).collect();
        let pattern = Regex::new(&format!(r"(?s).*?(?P<term>[{class}]+)\s*"))?;
        Ok(Self { pattern })
    }
}

impl Default for SentenceScanner {
    fn default() -> Self {
        Self::with_terminators(Self::DEFAULT_TERMINATORS).expect("Invalid default terminator regex")
    }
}

impl SegmentScanner for SentenceScanner {
    fn scan(&self, text: &str) -> SegmentScan {
        let mut scan = SegmentScan::default();
        let mut consumed = 0;
        for caps in self.pattern.captures_iter(text) {
            let (Some(whole), Some(term)) = (caps.get(0), caps.name("term")) else {
                continue;
            };
            scan.segments.push(consumed..whole.end());
            scan.breaks.push(term.start());
            consumed = whole.end();
        }
        if consumed < text.len() {
            scan.segments.push(consumed..text.len());
            scan.breaks.push(text.len());
        }
        log::trace!("scanned {} segments: {:?}", scan.segments.len(), scan.segments);
        scan
    }
}
