// Deterministic stand-ins for the tokenizer and training
// capabilities, shared by unit tests across the crate.

use anyhow::{bail, Result};
use std::path::{Path, PathBuf};

use crate::domain::traits::{LogMetrics, TrainOutcome, TrainingCapability, TrainingObserver, WindowTokenizer};
use crate::domain::window::TokenizedWindow;

pub const PAD_ID: u32 = 0;
pub const CLS_ID: u32 = 101;
pub const SEP_ID: u32 = 102;

/// Splits on whitespace; every word is one token with char offsets.
/// Windows are laid out BERT style: [CLS] q [SEP] ctx [SEP] [PAD]...
pub struct WhitespaceTokenizer;

impl WhitespaceTokenizer {
    pub fn new() -> Self {
        Self
    }

    fn words(text: &str) -> Vec<(usize, usize)> {
        let mut spans = Vec::new();
        let mut start = None;
        for (i, c) in text.chars().enumerate() {
            match (c.is_whitespace(), start) {
                (false, None)    => start = Some(i),
                (true, Some(s))  => { spans.push((s, i)); start = None; }
                _ => {}
            }
        }
        if let Some(s) = start {
            spans.push((s, text.chars().count()));
        }
        spans
    }

    fn id_for(text: &str, (s, e): (usize, usize)) -> u32 {
        let word: String = text.chars().skip(s).take(e - s).collect();
        1000 + word.bytes().map(u32::from).sum::<u32>() % 5000
    }
}

impl WindowTokenizer for WhitespaceTokenizer {
    fn tokenize(
        &self,
        question:   &str,
        context:    &str,
        max_length: usize,
        stride:     usize,
    ) -> Result<Vec<TokenizedWindow>> {
        let q = Self::words(question);
        let c = Self::words(context);

        let capacity = max_length.saturating_sub(q.len() + 3);
        if capacity == 0 || stride >= capacity {
            bail!("window capacity {capacity} too small for stride {stride}");
        }
        let step = capacity - stride;

        let mut windows = Vec::new();
        let mut start   = 0usize;
        loop {
            let end = (start + capacity).min(c.len());

            let mut w = TokenizedWindow {
                token_ids:      vec![CLS_ID],
                attention_mask: Vec::new(),
                offset_mapping: vec![None],
                sequence_ids:   vec![None],
            };
            for &span in &q {
                w.token_ids.push(Self::id_for(question, span));
                w.offset_mapping.push(None);
                w.sequence_ids.push(Some(0));
            }
            w.token_ids.push(SEP_ID);
            w.offset_mapping.push(None);
            w.sequence_ids.push(None);
            for &span in &c[start..end] {
                w.token_ids.push(Self::id_for(context, span));
                w.offset_mapping.push(Some(span));
                w.sequence_ids.push(Some(1));
            }
            w.token_ids.push(SEP_ID);
            w.offset_mapping.push(None);
            w.sequence_ids.push(None);

            w.attention_mask = vec![1; w.token_ids.len()];
            while w.token_ids.len() < max_length {
                w.token_ids.push(PAD_ID);
                w.attention_mask.push(0);
                w.offset_mapping.push(None);
                w.sequence_ids.push(None);
            }
            windows.push(w);

            if end >= c.len() {
                break;
            }
            start += step;
        }
        Ok(windows)
    }

    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        Ok(Self::words(text).into_iter().map(|span| Self::id_for(text, span)).collect())
    }

    fn sentinel_token_id(&self) -> u32 {
        CLS_ID
    }

    fn vocab_size(&self) -> usize {
        6000
    }
}

/// Fails its first `failures` attempts, then succeeds. Every attempt
/// advances `steps_per_attempt` steps from wherever it resumed and writes
/// a `checkpoint-<step>` directory per step into `output_dir`.
pub struct ScriptedTrainer {
    pub output_dir:        PathBuf,
    pub failures:          usize,
    pub steps_per_attempt: usize,
    pub attempts:          usize,
    pub resumed_from:      Vec<Option<PathBuf>>,
    step:                  usize,
}

impl ScriptedTrainer {
    pub fn new(output_dir: impl Into<PathBuf>, failures: usize) -> Self {
        Self {
            output_dir: output_dir.into(),
            failures,
            steps_per_attempt: 2,
            attempts: 0,
            resumed_from: Vec::new(),
            step: 0,
        }
    }
}

impl TrainingCapability for ScriptedTrainer {
    fn train(
        &mut self,
        resume_from: Option<&Path>,
        observer:    &mut dyn TrainingObserver,
    ) -> Result<TrainOutcome> {
        self.attempts += 1;
        self.resumed_from.push(resume_from.map(Path::to_path_buf));

        self.step = match resume_from {
            Some(p) => crate::infra::checkpoint::step_of(p).unwrap_or(0),
            None    => 0,
        };

        observer.on_train_begin();
        for _ in 0..self.steps_per_attempt {
            self.step += 1;
            std::fs::create_dir_all(self.output_dir.join(format!("checkpoint-{}", self.step)))?;
            let mut metrics = LogMetrics::new();
            metrics.insert("loss".into(), 1.0 / self.step as f64);
            observer.on_log(self.step, &metrics);
        }

        if self.attempts <= self.failures {
            bail!("simulated failure on attempt {}", self.attempts);
        }
        observer.on_train_end();
        Ok(TrainOutcome { global_step: self.step, train_loss: 0.5 })
    }

    fn global_step(&self) -> usize {
        self.step
    }

    fn save_model(&self, dir: &Path) -> Result<()> {
        std::fs::write(dir.join("model.bin"), b"weights")?;
        Ok(())
    }
}
