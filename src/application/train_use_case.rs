// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates one fine-tuning job in order:
//
//   Step 1: Read the JSON config      (Layer 2 - config)
//   Step 2: Load dataset splits       (Layer 4 - data)
//   Step 3: Load the model tokenizer  (Layer 6 - infra)
//   Step 4: Align answers to windows  (Layer 4 - data)
//   Step 5: Build Burn datasets       (Layer 4 - data)
//   Step 6: Resolve the architecture  (Layer 6 - infra)
//   Step 7: Run the resumable driver  (Layer 2 + Layer 5)
//   Step 8: Copy the tokenizer next to the final model
//
// Reference: Rust Book §13 (Iterators and Closures)
//            Burn Book §5 (Training)

use anyhow::{ensure, Result};
use std::path::{Path, PathBuf};

use crate::application::{
    config::{FinetuneConfig, IntervalStrategy},
    driver::{DriverReport, DriverSettings, ResumableDriver},
};
use crate::data::{
    aligner::{AlignmentStats, SpanAligner},
    dataset::QaDataset,
    loader::SquadLoader,
};
use crate::domain::traits::WindowTokenizer;
use crate::errors::FinetuneError;
use crate::infra::{
    checkpoint::{has_weights, load_model_config},
    tokenizer_store::TokenizerStore,
};
use crate::ml::{model::TransformerQaConfig, trainer::BurnTrainer};

/// Where everything for one job lives
#[derive(Debug, Clone)]
pub struct TrainRequest {
    pub data_path:    PathBuf,
    pub model_path:   PathBuf,
    pub config_path:  PathBuf,
    pub output_dir:   PathBuf,
    pub progress_log: PathBuf,
}

pub struct TrainUseCase {
    request: TrainRequest,
}

impl TrainUseCase {
    pub fn new(request: TrainRequest) -> Self {
        Self { request }
    }

    /// Execute the full fine-tuning job end to end
    pub fn execute(&self) -> Result<DriverReport> {
        let req = &self.request;

        // ── Step 1: Config ────────────────────────────────────────────────────
        let mut cfg = FinetuneConfig::load(&req.config_path)?;
        tracing::info!("Loaded config from '{}'", req.config_path.display());

        // ── Step 2: Dataset splits ────────────────────────────────────────────
        let splits = SquadLoader::new(&req.data_path).load()?;

        // ── Step 3: Tokenizer ─────────────────────────────────────────────────
        let store     = TokenizerStore::new(&req.model_path);
        let tokenizer = store.load()?;

        // ── Step 4: Span alignment ────────────────────────────────────────────
        // Each example may expand into several windows; every window is
        // labelled with the answer's token span or the sentinel position.
        let aligner       = SpanAligner::new(&tokenizer, cfg.max_length, cfg.doc_stride);
        let train_windows = aligner.align(&splits.train)?;
        log_stats("train", &AlignmentStats::of(&splits.train, &train_windows));

        let eval_windows = match &splits.eval {
            Some(examples) => {
                let windows = aligner.align(examples)?;
                log_stats("eval", &AlignmentStats::of(examples, &windows));
                Some(windows)
            }
            None => None,
        };

        if eval_windows.is_none() && cfg.evaluation_strategy != IntervalStrategy::No {
            tracing::warn!("No validation or test split; evaluation disabled");
            cfg.evaluation_strategy = IntervalStrategy::No;
        }

        // ── Step 5: Burn datasets ─────────────────────────────────────────────
        let train_dataset = QaDataset::from_windows(train_windows);
        let eval_dataset  = eval_windows.map(QaDataset::from_windows);

        // ── Step 6: Architecture + starting weights ───────────────────────────
        let (model_cfg, init_weights) =
            resolve_model(&req.model_path, tokenizer.vocab_size(), cfg.max_length)?;
        tracing::info!(
            "Model: {} layers, d_model={}, vocab={}, max_seq_len={}",
            model_cfg.num_layers, model_cfg.d_model, model_cfg.vocab_size, model_cfg.max_seq_len,
        );

        // ── Step 7: Resumable training ────────────────────────────────────────
        let settings = DriverSettings {
            max_retries:  cfg.effective_max_retries(),
            progress_log: req.progress_log.clone(),
            batch_size:   cfg.train_batch_size,
            max_length:   cfg.max_length,
        };
        let mut trainer = BurnTrainer::new(
            cfg,
            model_cfg,
            init_weights,
            train_dataset,
            eval_dataset,
            &req.output_dir,
        );
        let report = ResumableDriver::new(&req.output_dir, settings).run(&mut trainer)?;

        // ── Step 8: Tokenizer next to the model ───────────────────────────────
        store.copy_to(&req.output_dir).map_err(FinetuneError::ModelSave)?;

        Ok(report)
    }
}

fn log_stats(split: &str, stats: &AlignmentStats) {
    tracing::info!(
        "{split}: {} examples → {} windows ({} with an answer span)",
        stats.examples, stats.windows, stats.answerable_windows,
    );
    if stats.answers_lost > 0 {
        tracing::warn!(
            "{split}: {} of {} answers fit in no window; raise max_length or doc_stride",
            stats.answers_lost, stats.answered_examples,
        );
    }
}

/// Architecture from `model_config.json` in the model directory, with its
/// weights if present; otherwise a fresh encoder sized to the tokenizer.
pub fn resolve_model(
    model_path: &Path,
    vocab_size: usize,
    max_length: usize,
) -> Result<(TransformerQaConfig, Option<PathBuf>)> {
    let Some(model_cfg) = load_model_config(model_path)? else {
        tracing::info!("No model_config.json in '{}'; initialising a fresh encoder", model_path.display());
        return Ok((TransformerQaConfig::new(vocab_size, max_length), None));
    };

    ensure!(
        model_cfg.max_seq_len >= max_length,
        "Model supports {} positions but max_length is {}",
        model_cfg.max_seq_len,
        max_length,
    );
    ensure!(
        model_cfg.vocab_size >= vocab_size,
        "Model vocabulary ({}) is smaller than the tokenizer's ({})",
        model_cfg.vocab_size,
        vocab_size,
    );

    let init_weights = has_weights(model_path).then(|| model_path.to_path_buf());
    Ok((model_cfg, init_weights))
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::config::Config;

    #[test]
    fn test_fresh_model_sized_to_tokenizer() {
        let tmp = tempfile::tempdir().unwrap();
        let (cfg, weights) = resolve_model(tmp.path(), 500, 64).unwrap();
        assert_eq!(cfg.vocab_size, 500);
        assert_eq!(cfg.max_seq_len, 64);
        assert!(weights.is_none());
    }

    #[test]
    fn test_saved_architecture_is_reused() {
        let tmp = tempfile::tempdir().unwrap();
        TransformerQaConfig::new(600, 128)
            .with_num_layers(2)
            .save(tmp.path().join("model_config.json"))
            .unwrap();

        let (cfg, weights) = resolve_model(tmp.path(), 500, 64).unwrap();
        assert_eq!(cfg.vocab_size, 600);
        assert_eq!(cfg.num_layers, 2);
        // config without weights: architecture only
        assert!(weights.is_none());
    }

    #[test]
    fn test_saved_architecture_too_short_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        TransformerQaConfig::new(600, 32)
            .save(tmp.path().join("model_config.json"))
            .unwrap();

        assert!(resolve_model(tmp.path(), 500, 64).is_err());
    }

    #[test]
    fn test_unreadable_config_keeps_its_kind_through_anyhow() {
        let tmp = tempfile::tempdir().unwrap();
        let use_case = TrainUseCase::new(TrainRequest {
            data_path:    tmp.path().join("data"),
            model_path:   tmp.path().join("model"),
            config_path:  tmp.path().join("missing.json"),
            output_dir:   tmp.path().join("out"),
            progress_log: tmp.path().join("progress.log"),
        });

        let err = use_case.execute().unwrap_err();
        let kind = err.downcast_ref::<FinetuneError>().unwrap();
        assert!(matches!(kind, FinetuneError::ConfigUnreadable { .. }));
        assert_eq!(kind.exit_code(), 1);
    }
}
