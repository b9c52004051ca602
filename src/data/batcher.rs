// ============================================================
// Layer 4 — Q&A Batcher
// ============================================================
// Implements Burn's Batcher trait to stack aligned windows
// into tensors for one optimisation step.
//
//   Input:  Vec of N QaSamples, each max_length tokens long
//   Output: QaBatch with [N, max_length] token ids and
//           padding mask, plus [N] start/end labels
//
// Every window is already padded to max_length by the
// tokenizer, so batching is a flatten + reshape. The
// attention mask is inverted into a padding mask (true =
// padding) because that is what Burn's attention expects.
//
// Reference: Burn Book §4 (Batcher)

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
};

use crate::data::dataset::QaSample;

#[derive(Debug, Clone)]
pub struct QaBatch<B: Backend> {
    /// [batch_size, seq_len]
    pub input_ids: Tensor<B, 2, Int>,

    /// [batch_size, seq_len], true where the token is padding
    pub pad_mask: Tensor<B, 2, Bool>,

    /// [batch_size] — labelled start token per window
    pub start_positions: Tensor<B, 1, Int>,

    /// [batch_size] — labelled end token per window
    pub end_positions: Tensor<B, 1, Int>,
}

impl<B: Backend> QaBatch<B> {
    pub fn len(&self) -> usize {
        self.start_positions.dims()[0]
    }
}

#[derive(Clone, Debug)]
pub struct QaBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> QaBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }

    fn ints(&self, values: Vec<i32>) -> Tensor<B, 1, Int> {
        Tensor::<B, 1, Int>::from_ints(values.as_slice(), &self.device)
    }
}

impl<B: Backend> Batcher<QaSample, QaBatch<B>> for QaBatcher<B> {
    fn batch(&self, items: Vec<QaSample>) -> QaBatch<B> {
        let batch_size = items.len();
        let seq_len    = items[0].input_ids.len();

        let ids: Vec<i32> = items
            .iter()
            .flat_map(|s| s.input_ids.iter().map(|&x| x as i32))
            .collect();
        let mask: Vec<i32> = items
            .iter()
            .flat_map(|s| s.attention_mask.iter().map(|&x| x as i32))
            .collect();
        let starts: Vec<i32> = items.iter().map(|s| s.start_position as i32).collect();
        let ends:   Vec<i32> = items.iter().map(|s| s.end_position as i32).collect();

        let input_ids = self.ints(ids).reshape([batch_size, seq_len]);
        let pad_mask  = self.ints(mask).reshape([batch_size, seq_len]).equal_elem(0);

        QaBatch {
            input_ids,
            pad_mask,
            start_positions: self.ints(starts),
            end_positions:   self.ints(ends),
        }
    }
}
