use burn::data::dataset::Dataset;
use serde::{Deserialize, Serialize};

use crate::domain::window::Window;

/// One training row: a labelled window with every per-example
/// column (offsets, sequence ids, source index) stripped.
/// Sequence format: [CLS] question [SEP] context [SEP] [PAD]...
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaSample {
    pub input_ids:      Vec<u32>,
    pub attention_mask: Vec<u32>,
    pub start_position: usize,
    pub end_position:   usize,
}

impl From<Window> for QaSample {
    fn from(w: Window) -> Self {
        Self {
            input_ids:      w.tokens.token_ids,
            attention_mask: w.tokens.attention_mask,
            start_position: w.label.start_token_index,
            end_position:   w.label.end_token_index,
        }
    }
}

pub struct QaDataset {
    samples: Vec<QaSample>,
}

impl QaDataset {
    pub fn new(samples: Vec<QaSample>) -> Self { Self { samples } }

    pub fn from_windows(windows: Vec<Window>) -> Self {
        Self::new(windows.into_iter().map(QaSample::from).collect())
    }

    pub fn into_samples(self) -> Vec<QaSample> { self.samples }
}

impl Dataset<QaSample> for QaDataset {
    fn get(&self, index: usize) -> Option<QaSample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}
