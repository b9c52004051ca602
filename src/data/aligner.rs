// ============================================================
// Layer 4 — Span Aligner
// ============================================================
// Converts (question, context, answer) examples into labelled
// fixed-length token windows.
//
// Why is this needed?
//   The dataset locates answers by CHARACTER offset into the
//   context, but the model predicts TOKEN positions. And a
//   long context is split by the tokenizer into several
//   overlapping windows, so the same answer has a different
//   token position in every window it appears in — or no
//   position at all in windows that don't contain it.
//
// Per window:
//   1. Find the context segment [context_start, context_end]
//      from the sequence ids.
//   2. No answer → label = sentinel (classifier token).
//   3. Answer not fully inside this window's context chars
//      → label = sentinel. A window that only holds part of
//      the answer is never given a clipped span.
//   4. Otherwise walk the offset mapping:
//        forward from context_start to the last token whose
//        start offset is <= start_char → start index
//        backward from context_end to the last token whose
//        end offset is >= end_char    → end index
//
// Example (max_length large, one window):
//   context: "AAAA BBBB CCCC", answer "BBBB" at char 5
//   tokens:  [CLS] Q [SEP] AAAA BBBB CCCC [SEP]
//   index:     0   1   2    3    4    5    6
//   label:   (4, 4)
//
// Reference: Devlin et al. (2019) BERT, SQuAD fine-tuning
//            Rust Book §8 (Vectors), §13 (Iterators)

use anyhow::{Context, Result};
use std::collections::HashSet;

use crate::domain::example::Example;
use crate::domain::traits::WindowTokenizer;
use crate::domain::window::{Label, TokenizedWindow, Window};

pub struct SpanAligner<'t, T: WindowTokenizer + ?Sized> {
    tokenizer:  &'t T,
    max_length: usize,
    doc_stride: usize,
}

/// Counts reported after aligning a dataset split
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AlignmentStats {
    pub examples:           usize,
    pub windows:            usize,
    pub answerable_windows: usize,
    pub answered_examples:  usize,
    /// Answered examples whose answer fits in no single window
    pub answers_lost:       usize,
}

impl<'t, T: WindowTokenizer + ?Sized> SpanAligner<'t, T> {
    pub fn new(tokenizer: &'t T, max_length: usize, doc_stride: usize) -> Self {
        Self { tokenizer, max_length, doc_stride }
    }

    /// Tokenise and label every example. Windows are emitted in example
    /// order; `Window::example_index` is the position in `examples`.
    pub fn align(&self, examples: &[Example]) -> Result<Vec<Window>> {
        let mut windows = Vec::new();

        for (example_index, example) in examples.iter().enumerate() {
            let tokenized = self
                .tokenizer
                .tokenize(&example.question, &example.context, self.max_length, self.doc_stride)
                .with_context(|| format!("Cannot tokenise example {example_index}"))?;

            for tokens in tokenized {
                let label = self.label_window(&tokens, example);
                windows.push(Window { tokens, example_index, label });
            }
        }

        Ok(windows)
    }

    /// Label one window of `example`.
    pub fn label_window(&self, tokens: &TokenizedWindow, example: &Example) -> Label {
        let sentinel = Label::sentinel(self.sentinel_index(tokens));

        let Some(answer) = &example.answer else {
            return sentinel;
        };
        let Some((context_start, context_end)) = tokens.context_range() else {
            return sentinel;
        };

        let start_char = answer.start_char;
        let end_char   = answer.end_char();
        let offsets    = &tokens.offset_mapping;

        // The answer must lie completely within this window's context slice
        let covered = match (offsets[context_start], offsets[context_end]) {
            (Some((first, _)), Some((_, last))) => first <= start_char && last >= end_char,
            _ => false,
        };
        if !covered {
            return sentinel;
        }

        let starts_at_or_before = |i: usize| matches!(offsets[i], Some((s, _)) if s <= start_char);
        let ends_at_or_after    = |i: usize| matches!(offsets[i], Some((_, e)) if e >= end_char);

        let mut token_start = context_start;
        while token_start <= context_end && starts_at_or_before(token_start) {
            token_start += 1;
        }
        token_start -= 1;

        // signed so the scan may step one below context_start
        let mut token_end = context_end as isize;
        while token_end >= context_start as isize && ends_at_or_after(token_end as usize) {
            token_end -= 1;
        }
        let token_end = (token_end + 1) as usize;

        Label::span(token_start, token_end)
    }

    /// Position of the sentinel token, or 0 if the window lacks one
    fn sentinel_index(&self, tokens: &TokenizedWindow) -> usize {
        let id = self.tokenizer.sentinel_token_id();
        tokens.token_ids.iter().position(|&t| t == id).unwrap_or(0)
    }
}

/// Source example index of every window, in window order
pub fn sample_mapping<'w>(windows: impl IntoIterator<Item = &'w Window>) -> Vec<usize> {
    windows.into_iter().map(|w| w.example_index).collect()
}

impl AlignmentStats {
    pub fn of(examples: &[Example], windows: &[Window]) -> Self {
        let located: HashSet<usize> =
            sample_mapping(windows.iter().filter(|w| w.label_char_range().is_some()))
                .into_iter()
                .collect();
        let answered = || examples.iter().enumerate().filter(|(_, e)| e.has_answer());

        Self {
            examples:           examples.len(),
            windows:            windows.len(),
            answerable_windows: windows.iter().filter(|w| !w.is_sentinel()).count(),
            answered_examples:  answered().count(),
            answers_lost:       answered().filter(|(i, _)| !located.contains(i)).count(),
        }
    }
}
