// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Pure Rust structs and traits that define the core concepts
// of the system.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O or network calls
//   - NO tokenizer library types
//
// It defines what things ARE, not how they work.
//
// Reference: Rust Book §5 (Structs), §10 (Traits)

// A question/context/answer example as read from the dataset
pub mod example;

// Tokenised windows and their answer labels
pub mod window;

// Tokenizer and training capabilities that other layers implement
pub mod traits;
