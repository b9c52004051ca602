// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Filesystem concerns shared by the other layers:
//
//   checkpoint.rs      — checkpoint-<step> discovery, saving,
//                        loading and rotation. Weights go
//                        through Burn's CompactRecorder, the
//                        trainer state through serde_json.
//
//   tokenizer_store.rs — Loads the model directory's
//                        tokenizer.json and adapts it to the
//                        WindowTokenizer trait (sliding
//                        windows, char offsets, padding).
//
//   progress_log.rs    — Append-only progress log written
//                        while training runs, one line per
//                        logging tick or failure.
//
// Reference: Rust Book §7 (Modules)
//            Rust Book §9 (Error Handling with anyhow)
//            Burn Book §5 (Checkpointing)

/// Checkpoint discovery, storage and rotation
pub mod checkpoint;

/// Hugging Face tokenizer loading and windowing
pub mod tokenizer_store;

/// Progress log sink and training observer
pub mod progress_log;
