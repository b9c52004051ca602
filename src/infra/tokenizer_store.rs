// ============================================================
// Layer 6 — Tokenizer Store
// ============================================================
// Loads the pretrained tokenizer that ships with the model
// (`tokenizer.json` in the model directory) and adapts it to
// the WindowTokenizer trait.
//
// Sliding windows come straight from the `tokenizers` crate:
//   - truncation strategy OnlySecond → only the context is cut
//   - stride                         → overlap between windows
//   - overflowing encodings          → the extra windows
//   - fixed padding                  → every window max_length
//
// Offsets are requested in CHARACTERS (encode_char_offsets),
// matching how dataset answers are annotated. Offsets of
// every non-context token are replaced with None so the span
// aligner can never match a question or special token.
//
// Truncation settings live inside the Tokenizer, so the
// tokenizer sits behind a Mutex and is reconfigured only when
// a call asks for a different (max_length, stride). Padding
// uses the model's own pad token, never a hard-coded id.
//
// Reference: huggingface/tokenizers documentation

use anyhow::{anyhow, Context, Result};
use std::{
    path::{Path, PathBuf},
    sync::Mutex,
};
use tokenizers::{
    Encoding, PaddingParams, PaddingStrategy, Tokenizer, TruncationDirection, TruncationParams,
    TruncationStrategy,
};

use crate::domain::traits::WindowTokenizer;
use crate::domain::window::TokenizedWindow;

pub const TOKENIZER_FILE: &str = "tokenizer.json";

/// Candidate classifier tokens, BERT style first
const SENTINEL_TOKENS: [&str; 3] = ["[CLS]", "<s>", "<cls>"];
const PAD_TOKENS:      [&str; 3] = ["[PAD]", "<pad>", "<PAD>"];

pub struct TokenizerStore {
    dir: PathBuf,
}

impl TokenizerStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(TOKENIZER_FILE)
    }

    /// Load the model's tokenizer
    pub fn load(&self) -> Result<HfTokenizer> {
        HfTokenizer::from_file(self.path())
    }

    /// Copy the tokenizer next to a saved model
    pub fn copy_to(&self, dir: &Path) -> Result<()> {
        let target = dir.join(TOKENIZER_FILE);
        if target == self.path() {
            return Ok(());
        }
        std::fs::copy(self.path(), &target)
            .with_context(|| format!("Cannot copy tokenizer to '{}'", target.display()))?;
        Ok(())
    }
}

/// `tokenizers::Tokenizer` behind the WindowTokenizer trait
pub struct HfTokenizer {
    /// Configured for sliding windows on demand
    inner:       Mutex<Tokenizer>,
    /// No truncation, no padding: raw encodes
    plain:       Tokenizer,
    sentinel_id: u32,
    pad_id:      u32,
    pad_token:   String,
    vocab_size:  usize,
}

impl HfTokenizer {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let tokenizer = Tokenizer::from_file(path)
            .map_err(|e| anyhow!("Cannot load tokenizer from '{}': {}", path.display(), e))?;
        Self::new(tokenizer)
    }

    pub fn new(tokenizer: Tokenizer) -> Result<Self> {
        let sentinel_id = SENTINEL_TOKENS
            .iter()
            .find_map(|t| tokenizer.token_to_id(t))
            .ok_or_else(|| anyhow!("Tokenizer has no classifier token ({:?})", SENTINEL_TOKENS))?;
        let (pad_id, pad_token) = Self::pad_of(&tokenizer);
        let vocab_size = tokenizer.get_vocab_size(true);

        let mut plain = tokenizer.clone();
        plain.with_padding(None);
        plain
            .with_truncation(None)
            .map_err(|e| anyhow!("Cannot disable truncation: {e}"))?;

        Ok(Self {
            inner: Mutex::new(tokenizer),
            plain,
            sentinel_id,
            pad_id,
            pad_token,
            vocab_size,
        })
    }

    /// Pad token from the tokenizer's own padding settings, else its vocab
    fn pad_of(tokenizer: &Tokenizer) -> (u32, String) {
        if let Some(p) = tokenizer.get_padding() {
            return (p.pad_id, p.pad_token.clone());
        }
        if let Some((id, token)) = PAD_TOKENS
            .iter()
            .find_map(|t| tokenizer.token_to_id(t).map(|id| (id, t.to_string())))
        {
            return (id, token);
        }
        tracing::warn!("Tokenizer has no pad token ({:?}); padding with id 0", PAD_TOKENS);
        (0, PAD_TOKENS[0].to_string())
    }

    fn configure(&self, tokenizer: &mut Tokenizer, max_length: usize, stride: usize) -> Result<()> {
        let truncation_ok = tokenizer.get_truncation().map_or(false, |t| {
            t.max_length == max_length
                && t.stride == stride
                && t.strategy == TruncationStrategy::OnlySecond
        });
        if !truncation_ok {
            tokenizer
                .with_truncation(Some(TruncationParams {
                    max_length,
                    stride,
                    strategy:  TruncationStrategy::OnlySecond,
                    direction: TruncationDirection::Right,
                }))
                .map_err(|e| anyhow!("Invalid truncation settings: {e}"))?;
        }

        let padding_ok = tokenizer.get_padding().map_or(false, |p| {
            matches!(p.strategy, PaddingStrategy::Fixed(n) if n == max_length) && p.pad_id == self.pad_id
        });
        if !padding_ok {
            tokenizer.with_padding(Some(PaddingParams {
                strategy:  PaddingStrategy::Fixed(max_length),
                pad_id:    self.pad_id,
                pad_token: self.pad_token.clone(),
                ..Default::default()
            }));
        }
        Ok(())
    }

    /// Convert one encoding, hiding offsets of non-context tokens
    fn to_window(encoding: &Encoding) -> TokenizedWindow {
        let sequence_ids = encoding.get_sequence_ids();
        let offset_mapping = encoding
            .get_offsets()
            .iter()
            .zip(&sequence_ids)
            .map(|(&offset, seq)| (*seq == Some(1)).then_some(offset))
            .collect();

        TokenizedWindow {
            token_ids:      encoding.get_ids().to_vec(),
            attention_mask: encoding.get_attention_mask().to_vec(),
            offset_mapping,
            sequence_ids,
        }
    }
}

impl WindowTokenizer for HfTokenizer {
    fn tokenize(
        &self,
        question:   &str,
        context:    &str,
        max_length: usize,
        stride:     usize,
    ) -> Result<Vec<TokenizedWindow>> {
        let mut tokenizer = self
            .inner
            .lock()
            .map_err(|_| anyhow!("Tokenizer lock poisoned"))?;
        self.configure(&mut tokenizer, max_length, stride)?;

        let encoding = tokenizer
            .encode_char_offsets((question, context), true)
            .map_err(|e| anyhow!("Tokenisation error: {e}"))?;

        // The first window is the encoding itself, the rest overflow from it
        let mut windows = vec![Self::to_window(&encoding)];
        windows.extend(encoding.get_overflowing().iter().map(Self::to_window));
        Ok(windows)
    }

    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self
            .plain
            .encode(text, false)
            .map_err(|e| anyhow!("Tokenisation error: {e}"))?;
        Ok(encoding.get_ids().to_vec())
    }

    fn sentinel_token_id(&self) -> u32 {
        self.sentinel_id
    }

    fn vocab_size(&self) -> usize {
        self.vocab_size
    }
}
