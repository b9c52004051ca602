// ============================================================
// Layer 3 — Example Domain Type
// ============================================================
// Represents a single labelled question-answering example
// exactly as it arrives from the dataset, before tokenisation.
//
//   - We have a question
//   - We have a context passage
//   - The answer (if any) is a SPAN of characters inside
//     the context, located by its first character offset
//
// Offsets are counted in Unicode scalar values (chars), not
// bytes, matching how SQuAD-style datasets annotate answers.
//
// Example:
//   Question: "When is the graduation ceremony?"
//   Context:  "The graduation ceremony will be held on 15 April 2026"
//   Answer:   text = "15 April 2026", start_char = 40
//
// Reference: Rajpurkar et al. (2016) SQuAD
//            Rust Book §5 (Structs)

use serde::{Deserialize, Serialize};

/// The answer span of an answerable example.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    /// The literal answer text as it appears in the context
    pub text: String,

    /// Character offset of the first answer character in the context
    pub start_char: usize,
}

impl Answer {
    pub fn new(text: impl Into<String>, start_char: usize) -> Self {
        Self { text: text.into(), start_char }
    }

    /// Exclusive character offset one past the last answer character
    pub fn end_char(&self) -> usize {
        self.start_char + self.text.chars().count()
    }
}

/// One read-only training example.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Example {
    /// The natural language question being asked
    pub question: String,

    /// The context passage that may contain the answer
    pub context: String,

    /// `None` for unanswerable examples
    pub answer: Option<Answer>,
}

impl Example {
    /// Create an answerable example
    pub fn answered(
        question:   impl Into<String>,
        context:    impl Into<String>,
        answer:     impl Into<String>,
        start_char: usize,
    ) -> Self {
        Self {
            question: question.into(),
            context:  context.into(),
            answer:   Some(Answer::new(answer, start_char)),
        }
    }

    /// Create an example with no answer in its context
    pub fn unanswerable(question: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            context:  context.into(),
            answer:   None,
        }
    }

    pub fn has_answer(&self) -> bool {
        self.answer.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_end_char_counts_chars_not_bytes() {
        // "é" is two bytes in UTF-8 but one character
        let a = Answer::new("café", 3);
        assert_eq!(a.end_char(), 7);
    }

    #[test]
    fn test_unanswerable_has_no_answer() {
        let ex = Example::unanswerable("Who?", "Nobody knows.");
        assert!(!ex.has_answer());
    }
}
