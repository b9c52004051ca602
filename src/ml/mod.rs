// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// Model and training loop code built on the Burn framework.
// The data layer's batcher and the checkpoint store also
// speak Burn types, but nothing above this layer does: the
// driver only sees the TrainingCapability trait.
//
// What's in this layer:
//
//   model.rs     — The transformer encoder architecture
//                  • Token + positional embeddings
//                  • Multi-head self-attention with padding mask
//                  • Feed-forward networks (GELU activation)
//                  • Layer normalisation + residual connections
//                  • Span head: start / end logits per token
//
//   trainer.rs   — BurnTrainer, one resumable training run:
//                  AdamW with warmup/decay, periodic logging,
//                  evaluation, checkpoint save + rotation,
//                  best-model reload
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)
//            Vaswani et al. (2017) Attention Is All You Need
//            Devlin et al. (2019) BERT

/// Transformer encoder Q&A model architecture
pub mod model;

/// Step-based training loop behind TrainingCapability
pub mod trainer;
