// ============================================================
// Layer 3 — Window and Label Domain Types
// ============================================================
// A Window is one fixed-length slice of a tokenised
// (question, context) pair. Long contexts do not fit in a
// single model input, so the tokenizer slides a window over
// the context tokens with some overlap (the doc stride):
//
//   [CLS] question [SEP] context tokens 0..k   [SEP] [PAD]...
//   [CLS] question [SEP] context tokens j..m   [SEP] [PAD]...
//                               ^^^^ overlap
//
// Every Window carries a Label: the inclusive token span of
// the answer inside THIS window, or the sentinel position
// (the classifier token) when the answer is absent or does
// not fit entirely inside this window's context slice.
//
// Reference: Devlin et al. (2019) BERT, SQuAD fine-tuning
//            Rust Book §5 (Structs), §6 (Enums and Option)

use serde::{Deserialize, Serialize};

/// Raw output of the tokenizer for one window, before labelling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenizedWindow {
    /// Token ids, padded to the window length
    pub token_ids: Vec<u32>,

    /// 1 = real token, 0 = padding
    pub attention_mask: Vec<u32>,

    /// Per-token (char_start, char_end) into the context.
    /// `None` for question tokens, special tokens and padding.
    pub offset_mapping: Vec<Option<(usize, usize)>>,

    /// Which input sequence each token came from:
    /// Some(0) = question, Some(1) = context, None = special/padding
    pub sequence_ids: Vec<Option<usize>>,
}

impl TokenizedWindow {
    pub fn len(&self) -> usize {
        self.token_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.token_ids.is_empty()
    }

    /// First and last token index belonging to the context segment
    pub fn context_range(&self) -> Option<(usize, usize)> {
        let start = self.sequence_ids.iter().position(|s| *s == Some(1))?;
        let end   = self.sequence_ids.iter().rposition(|s| *s == Some(1))?;
        Some((start, end))
    }
}

/// Token-level answer annotation for one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub start_token_index: usize,
    pub end_token_index:   usize,
    /// True when both indices point at the no-answer position
    pub sentinel:          bool,
}

impl Label {
    pub fn span(start_token_index: usize, end_token_index: usize) -> Self {
        Self { start_token_index, end_token_index, sentinel: false }
    }

    pub fn sentinel(index: usize) -> Self {
        Self { start_token_index: index, end_token_index: index, sentinel: true }
    }
}

/// A labelled window with its back-reference to the source example.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub tokens:        TokenizedWindow,
    /// Index of the source Example in the aligned batch
    pub example_index: usize,
    pub label:         Label,
}

impl Window {
    pub fn is_sentinel(&self) -> bool {
        self.label.sentinel
    }

    /// Decode a non-sentinel label back to a character range of the
    /// context: start of the first label token to end of the last.
    pub fn label_char_range(&self) -> Option<(usize, usize)> {
        if self.label.sentinel {
            return None;
        }
        let offsets = &self.tokens.offset_mapping;
        let (start, _) = (*offsets.get(self.label.start_token_index)?)?;
        let (_, end)   = (*offsets.get(self.label.end_token_index)?)?;
        Some((start, end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(seq: Vec<Option<usize>>, offsets: Vec<Option<(usize, usize)>>) -> TokenizedWindow {
        TokenizedWindow {
            token_ids:      vec![7; seq.len()],
            attention_mask: vec![1; seq.len()],
            offset_mapping: offsets,
            sequence_ids:   seq,
        }
    }

    #[test]
    fn test_context_range_skips_question_and_specials() {
        let w = window(
            vec![None, Some(0), None, Some(1), Some(1), None, None],
            vec![None, None, None, Some((0, 3)), Some((4, 7)), None, None],
        );
        assert_eq!(w.context_range(), Some((3, 4)));
    }

    #[test]
    fn test_context_range_none_without_context() {
        let w = window(vec![None, Some(0), None], vec![None; 3]);
        assert_eq!(w.context_range(), None);
    }

    #[test]
    fn test_sentinel_label_decodes_to_nothing() {
        let w = Window {
            tokens:        window(vec![None, Some(1)], vec![None, Some((0, 4))]),
            example_index: 0,
            label:         Label::sentinel(0),
        };
        assert!(w.is_sentinel());
        assert_eq!(w.label_char_range(), None);
    }
}
