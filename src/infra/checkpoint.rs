// ============================================================
// Layer 6 — Checkpoint Discovery and Storage
// ============================================================
// Training persists a snapshot every `save_steps` steps so a
// crashed run can pick up where it left off instead of
// starting over.
//
// File naming convention:
//   output_dir/
//     checkpoint-500/
//       model.mpk.gz          ← weights (Burn CompactRecorder)
//       model_config.json     ← architecture, to rebuild the model
//       trainer_state.json    ← global step, epoch, best metric
//     checkpoint-1000/
//       ...
//     model.mpk.gz            ← final model after training
//     model_config.json
//     tokenizer.json
//
// Discovery:
//   The latest checkpoint is the one with the HIGHEST step
//   number embedded in its name — never the most recently
//   modified one. Directory listings come back in arbitrary
//   order, so we parse and compare the step numbers.
//
// Reference: Burn Book §5 (Records and Checkpointing)
//            Rust Book §9 (Error Handling)

use anyhow::{Context, Result};
use burn::{
    prelude::*,
    record::{CompactRecorder, Recorder},
};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::ml::model::{TransformerQaConfig, TransformerQaModel};

pub const CHECKPOINT_PREFIX: &str = "checkpoint-";

const WEIGHTS_STEM:   &str = "model";
const MODEL_CONFIG:   &str = "model_config.json";
const TRAINER_STATE:  &str = "trainer_state.json";
const STAGING_SUFFIX: &str = ".tmp";

/// One persisted training snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    pub path: PathBuf,
    pub step: usize,
}

/// Step number embedded in a `checkpoint-<step>` path, if any
pub fn step_of(path: &Path) -> Option<usize> {
    path.file_name()?
        .to_str()?
        .strip_prefix(CHECKPOINT_PREFIX)?
        .parse()
        .ok()
}

/// All checkpoints under `dir`, ascending by step.
/// A missing or unreadable directory yields an empty list.
pub fn list_checkpoints(dir: &Path) -> Vec<Checkpoint> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut checkpoints: Vec<Checkpoint> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let path = entry.path();
            let step = step_of(&path)?;
            Some(Checkpoint { path, step })
        })
        .collect();

    checkpoints.sort_by_key(|c| c.step);
    checkpoints
}

/// The checkpoint with the maximum step number, or `None` to start fresh
pub fn discover_latest_checkpoint(dir: &Path) -> Option<Checkpoint> {
    list_checkpoints(dir).pop()
}

// ─── Trainer State ────────────────────────────────────────────────────────────
/// Progress counters saved next to the weights of every checkpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainerState {
    pub global_step:           usize,
    pub epoch:                 usize,
    pub best_metric:           Option<f64>,
    pub best_model_checkpoint: Option<PathBuf>,
}

// ─── Checkpoint Manager ───────────────────────────────────────────────────────
/// Saves and restores model snapshots under one output directory.
pub struct CheckpointManager {
    /// Directory that holds the `checkpoint-<step>` entries
    dir: PathBuf,
}

impl CheckpointManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Where the checkpoint for `step` lives (whether or not it exists yet)
    pub fn path_for(&self, step: usize) -> PathBuf {
        self.dir.join(format!("{CHECKPOINT_PREFIX}{step}"))
    }

    /// Write `checkpoint-<step>/` with weights, architecture and state.
    pub fn save_checkpoint<B: Backend>(
        &self,
        model:     &TransformerQaModel<B>,
        model_cfg: &TransformerQaConfig,
        state:     &TrainerState,
    ) -> Result<Checkpoint> {
        let path = self.publish(state.global_step, |staging| {
            save_model_files(model, model_cfg, staging)?;
            let state_json = serde_json::to_string_pretty(state)?;
            fs::write(staging.join(TRAINER_STATE), state_json)
                .with_context(|| "Failed to write trainer_state.json")?;
            Ok(())
        })?;

        tracing::debug!("Saved checkpoint: step {}", state.global_step);
        Ok(Checkpoint { path, step: state.global_step })
    }

    /// Fill `checkpoint-<step>.tmp/` with `write`, then rename it to
    /// `checkpoint-<step>/`. Discovery never sees a half-written
    /// checkpoint: the staging name has no integer suffix.
    pub fn publish<F>(&self, step: usize, write: F) -> Result<PathBuf>
    where
        F: FnOnce(&Path) -> Result<()>,
    {
        let path    = self.path_for(step);
        let staging = self.dir.join(format!("{CHECKPOINT_PREFIX}{step}{STAGING_SUFFIX}"));

        if staging.exists() {
            fs::remove_dir_all(&staging)
                .with_context(|| format!("Cannot clear stale staging dir '{}'", staging.display()))?;
        }
        fs::create_dir_all(&staging)
            .with_context(|| format!("Cannot create checkpoint dir '{}'", staging.display()))?;

        if let Err(e) = write(&staging) {
            if let Err(cleanup) = fs::remove_dir_all(&staging) {
                tracing::warn!("Cannot remove '{}': {}", staging.display(), cleanup);
            }
            return Err(e);
        }

        if path.exists() {
            fs::remove_dir_all(&path)
                .with_context(|| format!("Cannot replace checkpoint '{}'", path.display()))?;
        }
        fs::rename(&staging, &path)
            .with_context(|| format!("Cannot move '{}' into place", staging.display()))?;
        Ok(path)
    }

    /// Restore weights and trainer state from a checkpoint directory.
    pub fn load_checkpoint<B: Backend>(
        &self,
        model:  TransformerQaModel<B>,
        path:   &Path,
        device: &B::Device,
    ) -> Result<(TransformerQaModel<B>, TrainerState)> {
        let model = load_weights(model, path, device)?;

        let state_path = path.join(TRAINER_STATE);
        let json = fs::read_to_string(&state_path)
            .with_context(|| format!("Cannot read '{}'", state_path.display()))?;
        let state: TrainerState = serde_json::from_str(&json)
            .with_context(|| format!("Malformed '{}'", state_path.display()))?;

        tracing::info!("Restored checkpoint '{}' at step {}", path.display(), state.global_step);
        Ok((model, state))
    }

    /// Delete the oldest checkpoints so at most `limit` remain.
    /// `keep` (the best checkpoint) is never deleted.
    pub fn rotate(&self, limit: usize, keep: Option<&Path>) {
        if limit == 0 {
            return;
        }
        let mut checkpoints = list_checkpoints(&self.dir);

        // Move the protected checkpoint to the end so it survives the cut
        let mut limit = limit;
        if let Some(keep) = keep {
            if let Some(i) = checkpoints.iter().position(|c| c.path == keep) {
                let protected = checkpoints.remove(i);
                let is_newest = i == checkpoints.len();
                checkpoints.push(protected);
                if limit == 1 && !is_newest {
                    limit = 2;
                }
            }
        }

        let excess = checkpoints.len().saturating_sub(limit);
        for old in &checkpoints[..excess] {
            match fs::remove_dir_all(&old.path) {
                Ok(())  => tracing::debug!("Deleted old checkpoint '{}'", old.path.display()),
                Err(e)  => tracing::warn!("Cannot delete checkpoint '{}': {}", old.path.display(), e),
            }
        }
    }
}

// ─── Model Files ──────────────────────────────────────────────────────────────
/// Write weights and architecture config into `dir`.
pub fn save_model_files<B: Backend>(
    model:     &TransformerQaModel<B>,
    model_cfg: &TransformerQaConfig,
    dir:       &Path,
) -> Result<()> {
    let weights = dir.join(WEIGHTS_STEM);
    CompactRecorder::new()
        .record(model.clone().into_record(), weights.clone())
        .with_context(|| format!("Failed to save weights to '{}'", weights.display()))?;

    model_cfg
        .save(dir.join(MODEL_CONFIG))
        .with_context(|| format!("Cannot write model config into '{}'", dir.display()))?;
    Ok(())
}

/// Load weights saved by `save_model_files` into `model`.
pub fn load_weights<B: Backend>(
    model:  TransformerQaModel<B>,
    dir:    &Path,
    device: &B::Device,
) -> Result<TransformerQaModel<B>> {
    let weights = dir.join(WEIGHTS_STEM);
    let record = CompactRecorder::new()
        .load(weights.clone(), device)
        .with_context(|| format!("Cannot load weights '{}'", weights.display()))?;
    Ok(model.load_record(record))
}

/// True when `dir` holds a weights file written by `save_model_files`
pub fn has_weights(dir: &Path) -> bool {
    dir.join(format!("{WEIGHTS_STEM}.mpk.gz")).exists()
}

/// Architecture config saved alongside weights, if present
pub fn load_model_config(dir: &Path) -> Result<Option<TransformerQaConfig>> {
    let path = dir.join(MODEL_CONFIG);
    if !path.exists() {
        return Ok(None);
    }
    TransformerQaConfig::load(&path)
        .map(Some)
        .map_err(|e| anyhow::anyhow!("Cannot load model config '{}': {}", path.display(), e))
}
