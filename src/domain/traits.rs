// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The two heavyweight collaborators of this system are
// described here as traits so the core logic never depends
// on a concrete tokenizer library or ML framework:
//
//   - WindowTokenizer    → text in, windows + offsets out
//                          (HfTokenizer wraps `tokenizers`)
//   - TrainingCapability → "train, maybe resuming from here"
//                          (BurnTrainer wraps `burn`)
//   - TrainingObserver   → receives progress ticks while
//                          training runs (ProgressTracker)
//
// Tests inject deterministic stubs for all three, so the
// span aligner and the retry state machine run without a
// GPU or a model download.
//
// Reference: Rust Book §10 (Traits: Defining Shared Behaviour)
//            Rust Book §17 (Trait Objects)

use anyhow::Result;
use std::collections::BTreeMap;
use std::path::Path;

use crate::domain::window::TokenizedWindow;

// ─── WindowTokenizer ──────────────────────────────────────────────────────────
/// Any tokenizer able to produce sliding windows over a
/// (question, context) pair.
pub trait WindowTokenizer {
    /// Tokenise the pair, truncating only the context. Long contexts
    /// produce several windows overlapping by `stride` context tokens,
    /// each padded to `max_length`.
    fn tokenize(
        &self,
        question:   &str,
        context:    &str,
        max_length: usize,
        stride:     usize,
    ) -> Result<Vec<TokenizedWindow>>;

    /// Encode a single text without special tokens
    fn encode(&self, text: &str) -> Result<Vec<u32>>;

    /// Id of the designated no-answer token (the classifier token)
    fn sentinel_token_id(&self) -> u32;

    /// Number of distinct ids the tokenizer may emit
    fn vocab_size(&self) -> usize;
}

// ─── TrainingObserver ─────────────────────────────────────────────────────────
/// Scalar metrics reported on one logging tick, e.g. `loss`, `eval_accuracy`
pub type LogMetrics = BTreeMap<String, f64>;

/// Receives progress from a running training procedure.
pub trait TrainingObserver {
    fn on_train_begin(&mut self) {}

    fn on_log(&mut self, step: usize, metrics: &LogMetrics);

    fn on_train_end(&mut self) {}
}

// ─── TrainingCapability ───────────────────────────────────────────────────────
/// Summary of a training procedure that ran to completion.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainOutcome {
    pub global_step: usize,
    pub train_loss:  f64,
}

/// A configured training procedure (model + data + hyperparameters).
///
/// Implementations persist `checkpoint-<step>` entries into their output
/// directory while training; the driver only ever reads them.
pub trait TrainingCapability {
    /// Run training to completion. `resume_from` is a checkpoint
    /// directory to continue from, `None` to start fresh.
    /// An `Err` means the attempt terminated abnormally.
    fn train(
        &mut self,
        resume_from: Option<&Path>,
        observer:    &mut dyn TrainingObserver,
    ) -> Result<TrainOutcome>;

    /// Current optimisation step, also meaningful after a failure
    fn global_step(&self) -> usize;

    /// Persist the trained model into `dir`
    fn save_model(&self, dir: &Path) -> Result<()>;
}
