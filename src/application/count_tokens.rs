// ============================================================
// Layer 2 — Token Counting
// ============================================================
// Sizes a dataset before paying for a training run: encodes
// every question and context of every split and sums the
// token counts. Special tokens, padding and window overlap
// are not included, so the real number of tokens processed
// per epoch is higher.

use anyhow::Result;
use std::path::PathBuf;

use crate::data::loader::SquadLoader;
use crate::domain::{example::Example, traits::WindowTokenizer};
use crate::infra::tokenizer_store::TokenizerStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TokenCount {
    pub examples: usize,
    pub tokens:   usize,
}

/// Sum of question + context tokens over `examples`
pub fn count_tokens<'a, T, I>(tokenizer: &T, examples: I) -> Result<TokenCount>
where
    T: WindowTokenizer + ?Sized,
    I: IntoIterator<Item = &'a Example>,
{
    let mut count = TokenCount::default();
    for ex in examples {
        count.examples += 1;
        count.tokens   += tokenizer.encode(&ex.question)?.len();
        count.tokens   += tokenizer.encode(&ex.context)?.len();
    }
    Ok(count)
}

pub struct CountTokensUseCase {
    data_path:  PathBuf,
    model_path: PathBuf,
}

impl CountTokensUseCase {
    pub fn new(data_path: impl Into<PathBuf>, model_path: impl Into<PathBuf>) -> Self {
        Self { data_path: data_path.into(), model_path: model_path.into() }
    }

    pub fn execute(&self) -> Result<TokenCount> {
        let splits    = SquadLoader::new(&self.data_path).load()?;
        let tokenizer = TokenizerStore::new(&self.model_path).load()?;
        let count     = count_tokens(&tokenizer, splits.all())?;
        tracing::info!("{} examples, {} tokens", count.examples, count.tokens);
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::WhitespaceTokenizer;

    #[test]
    fn test_counts_question_and_context_tokens() {
        let examples = vec![
            Example::answered("When is it?", "It is on Monday.", "Monday", 9),
            Example::unanswerable("Who?", "Nobody knows"),
        ];
        let count = count_tokens(&WhitespaceTokenizer::new(), &examples).unwrap();
        assert_eq!(count, TokenCount { examples: 2, tokens: 3 + 4 + 1 + 2 });
    }

    #[test]
    fn test_empty_dataset_counts_zero() {
        let count = count_tokens(&WhitespaceTokenizer::new(), &Vec::<Example>::new()).unwrap();
        assert_eq!(count, TokenCount::default());
    }
}
