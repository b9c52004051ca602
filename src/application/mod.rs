// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// This layer orchestrates all the other layers to accomplish
// a specific goal (fine-tuning, or sizing a dataset).
//
// Rules for this layer:
//   - No ML math or model code here
//   - No UI or printing here (that's Layer 1)
//   - Only workflow coordination
//
// The resumable driver lives here too: it is pure control
// flow over the TrainingCapability trait and never touches
// Burn itself.
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

/// JSON fine-tuning configuration with defaults
pub mod config;

/// Crash-resumable retry loop around a training capability
pub mod driver;

/// The fine-tuning workflow
pub mod train_use_case;

/// Dataset token counting
pub mod count_tokens;
