// ============================================================
// Layer 2 — Fine-tuning Configuration
// ============================================================
// All hyperparameters of a fine-tuning job, read from a JSON
// document. Every key is optional: anything missing takes the
// default below, and unknown keys are ignored so one config
// file can carry settings for other tools too.
//
// Example config.json:
//   {
//     "num_train_epochs": 2,
//     "per_device_train_batch_size": 16,
//     "save_steps": 200,
//     "max_retries": 5
//   }
//
// Both the short names (num_epochs, train_batch_size, ...)
// and the longer Hugging Face-style names are accepted.
//
// Reference: serde documentation (field attributes)

use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use crate::errors::{FinetuneError, Result};

/// When evaluation or checkpointing happens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntervalStrategy {
    No,
    Steps,
    Epoch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FinetuneConfig {
    #[serde(alias = "num_train_epochs")]
    pub num_epochs:             usize,
    #[serde(alias = "per_device_train_batch_size")]
    pub train_batch_size:       usize,
    #[serde(alias = "per_device_eval_batch_size")]
    pub eval_batch_size:        usize,
    pub warmup_steps:           usize,
    pub weight_decay:           f64,
    pub learning_rate:          f64,
    pub logging_steps:          usize,
    pub evaluation_strategy:    IntervalStrategy,
    pub save_strategy:          IntervalStrategy,
    pub save_steps:             usize,
    pub eval_steps:             usize,
    pub save_total_limit:       usize,
    pub load_best_model_at_end: bool,
    pub metric_for_best_model:  String,
    pub greater_is_better:      bool,
    pub max_retries:            usize,
    pub max_length:             usize,
    pub doc_stride:             usize,
    pub seed:                   u64,
}

impl Default for FinetuneConfig {
    fn default() -> Self {
        Self {
            num_epochs:             3,
            train_batch_size:       8,
            eval_batch_size:        8,
            warmup_steps:           500,
            weight_decay:           0.01,
            learning_rate:          5e-5,
            logging_steps:          10,
            evaluation_strategy:    IntervalStrategy::Steps,
            save_strategy:          IntervalStrategy::Steps,
            save_steps:             500,
            eval_steps:             500,
            save_total_limit:       1,
            load_best_model_at_end: true,
            metric_for_best_model:  "accuracy".to_string(),
            greater_is_better:      true,
            max_retries:            3,
            max_length:             384,
            doc_stride:             128,
            seed:                   42,
        }
    }
}

impl FinetuneConfig {
    /// Read and parse a JSON config file. Any failure is `ConfigUnreadable`.
    pub fn load(path: &Path) -> Result<Self> {
        let unreadable = |cause: anyhow::Error| FinetuneError::ConfigUnreadable {
            path: path.to_path_buf(),
            cause,
        };

        let json = fs::read_to_string(path).map_err(|e| unreadable(e.into()))?;
        let cfg: Self = serde_json::from_str(&json).map_err(|e| unreadable(e.into()))?;
        cfg.validate().map_err(unreadable)?;
        Ok(cfg)
    }

    /// Reject settings that would make windowing or stepping impossible
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.train_batch_size > 0, "train_batch_size must be positive");
        anyhow::ensure!(self.eval_batch_size > 0, "eval_batch_size must be positive");
        anyhow::ensure!(
            self.doc_stride < self.max_length,
            "doc_stride ({}) must be less than max_length ({})",
            self.doc_stride,
            self.max_length,
        );
        Ok(())
    }

    /// Name of the tracked metric as reported by evaluation
    /// ("accuracy" → "eval_accuracy")
    pub fn best_metric_key(&self) -> String {
        if self.metric_for_best_model.starts_with("eval_") {
            self.metric_for_best_model.clone()
        } else {
            format!("eval_{}", self.metric_for_best_model)
        }
    }

    /// At least one attempt is always made
    pub fn effective_max_retries(&self) -> usize {
        if self.max_retries == 0 {
            tracing::warn!("max_retries = 0 in config; making a single attempt");
        }
        self.max_retries.max(1)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_keys_take_defaults() {
        let cfg: FinetuneConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.num_epochs, 3);
        assert_eq!(cfg.max_retries, 3);
        assert_eq!(cfg.max_length, 384);
        assert_eq!(cfg.doc_stride, 128);
        assert_eq!(cfg.evaluation_strategy, IntervalStrategy::Steps);
        assert!(cfg.load_best_model_at_end);
    }

    #[test]
    fn test_long_key_names_and_unknown_keys() {
        let cfg: FinetuneConfig = serde_json::from_str(
            r#"{"num_train_epochs": 1, "per_device_train_batch_size": 4,
                "save_strategy": "epoch", "report_to": ["none"]}"#,
        ).unwrap();
        assert_eq!(cfg.num_epochs, 1);
        assert_eq!(cfg.train_batch_size, 4);
        assert_eq!(cfg.save_strategy, IntervalStrategy::Epoch);
    }

    #[test]
    fn test_unreadable_config_is_typed_error() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = FinetuneConfig::load(&tmp.path().join("nope.json"));
        assert!(matches!(missing, Err(FinetuneError::ConfigUnreadable { .. })));

        let bad = tmp.path().join("bad.json");
        fs::write(&bad, "{ not json").unwrap();
        assert!(matches!(FinetuneConfig::load(&bad), Err(FinetuneError::ConfigUnreadable { .. })));

        let stride = tmp.path().join("stride.json");
        fs::write(&stride, r#"{"max_length": 64, "doc_stride": 64}"#).unwrap();
        assert!(matches!(FinetuneConfig::load(&stride), Err(FinetuneError::ConfigUnreadable { .. })));
    }

    #[test]
    fn test_best_metric_key_prefix() {
        let mut cfg = FinetuneConfig::default();
        assert_eq!(cfg.best_metric_key(), "eval_accuracy");
        cfg.metric_for_best_model = "eval_loss".into();
        assert_eq!(cfg.best_metric_key(), "eval_loss");
    }

    #[test]
    fn test_zero_retries_still_attempts_once() {
        let cfg = FinetuneConfig { max_retries: 0, ..Default::default() };
        assert_eq!(cfg.effective_max_retries(), 1);
    }
}
