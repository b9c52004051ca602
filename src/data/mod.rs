// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything from dataset files to tensor batches:
//
//   train.json / validation.json
//       │
//       ▼
//   SquadLoader       → reads records into Examples
//       │
//       ▼
//   SpanAligner       → sliding-window tokenisation plus
//       │               character → token answer labels
//       ▼
//   QaDataset         → Burn Dataset of labelled windows
//       │
//       ▼
//   QaBatcher         → stacks windows into tensor batches
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Reads SQuAD-style records from a data directory
pub mod loader;

/// Aligns character answer spans to token windows
pub mod aligner;

/// Implements Burn's Dataset trait for labelled windows
pub mod dataset;

/// Implements Burn's Batcher trait to create tensor batches
pub mod batcher;
