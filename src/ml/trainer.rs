// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Step-based fine-tuning loop on Burn, behind the
// TrainingCapability trait so the resumable driver can run,
// fail and re-run it.
//
// One attempt:
//   1. Build the model (from the model dir weights if any)
//   2. If resuming, load weights + trainer_state.json from the
//      checkpoint and skip the batches already consumed
//   3. For every batch: forward, backward, AdamW step with a
//      linear warmup → linear decay learning rate
//   4. Every `logging_steps`: report loss / lr / epoch
//      Every `eval_steps` (or epoch): evaluate on the eval split
//      Every `save_steps` (or epoch): write checkpoint-<step>/
//      and rotate old checkpoints, never deleting the best one
//   5. Optionally reload the best checkpoint at the end
//
// Key Burn insight:
//   - Training uses MyBackend (Autodiff<Wgpu>) for gradients
//   - model.valid() returns the model on MyInnerBackend (Wgpu)
//     with dropout disabled, so evaluation uses that batcher
//   - argmax(1) returns [batch,1] so we flatten before .equal()
//
// Reference: Burn Book §5, Loshchilov & Hutter (2019) AdamW

use anyhow::{bail, Result};
use burn::{
    data::dataloader::{batcher::Batcher, DataLoader, DataLoaderBuilder},
    module::AutodiffModule,
    optim::{AdamWConfig, GradientsParams, Optimizer},
    prelude::*,
};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::application::config::{FinetuneConfig, IntervalStrategy};
use crate::data::{
    batcher::QaBatcher,
    dataset::{QaDataset, QaSample},
};
use crate::domain::traits::{LogMetrics, TrainOutcome, TrainingCapability, TrainingObserver};
use crate::infra::checkpoint::{load_weights, save_model_files, CheckpointManager, TrainerState};
use crate::ml::model::{TransformerQaConfig, TransformerQaModel};

pub type MyBackend      = burn::backend::Autodiff<burn::backend::Wgpu>;
pub type MyInnerBackend = burn::backend::Wgpu;

// ─── Schedule helpers ─────────────────────────────────────────────────────────
/// Optimisation steps in one pass over `samples` windows
pub fn steps_per_epoch(samples: usize, batch_size: usize) -> usize {
    if batch_size == 0 {
        return 0;
    }
    samples.div_ceil(batch_size)
}

/// Shuffle seed of one epoch. A resumed attempt rebuilds the
/// same permutation, so skipped batches are the ones already trained.
pub fn epoch_seed(seed: u64, epoch: usize) -> u64 {
    seed.wrapping_add(epoch as u64)
}

/// (epoch, batches to skip in it) for `global_step` completed steps
pub fn resume_position(global_step: usize, per_epoch: usize) -> (usize, usize) {
    (global_step / per_epoch, global_step % per_epoch)
}

/// A fresh loader over `samples` whose order depends only on
/// `seed` and `epoch`
pub fn epoch_loader<O, Bt>(
    batcher:    Bt,
    samples:    Vec<QaSample>,
    batch_size: usize,
    seed:       u64,
    epoch:      usize,
) -> Arc<dyn DataLoader<O>>
where
    O:  Send + Clone + std::fmt::Debug + 'static,
    Bt: Batcher<QaSample, O> + Clone + 'static,
{
    DataLoaderBuilder::new(batcher)
        .batch_size(batch_size)
        .shuffle(epoch_seed(seed, epoch))
        .num_workers(1)
        .build(QaDataset::new(samples))
}

/// Linear warmup from 0 to `peak` over `warmup` steps, then linear
/// decay to 0 at `total` steps. `step` counts completed steps.
pub fn learning_rate_at(step: usize, peak: f64, warmup: usize, total: usize) -> f64 {
    if step < warmup {
        return peak * step as f64 / warmup.max(1) as f64;
    }
    let remaining = total.saturating_sub(step) as f64;
    peak * remaining / total.saturating_sub(warmup).max(1) as f64
}

/// Whether `value` beats the best metric seen so far
pub fn is_improvement(value: f64, best: Option<f64>, greater_is_better: bool) -> bool {
    match best {
        None if value.is_nan() => false,
        None                   => true,
        Some(best) if greater_is_better => value > best,
        Some(best)                      => value < best,
    }
}

/// Running sums over the evaluation split
#[derive(Debug, Default, Clone, PartialEq)]
pub struct EvalTally {
    pub loss_sum:      f64,
    pub batches:       usize,
    pub samples:       usize,
    pub start_correct: usize,
    pub end_correct:   usize,
    pub span_correct:  usize,
}

impl EvalTally {
    pub fn metrics(&self) -> LogMetrics {
        let ratio = |n: usize| if self.samples > 0 { n as f64 / self.samples as f64 } else { 0.0 };
        let loss  = if self.batches > 0 { self.loss_sum / self.batches as f64 } else { f64::NAN };

        let mut m = LogMetrics::new();
        m.insert("eval_loss".into(), loss);
        m.insert("eval_accuracy".into(), ratio(self.span_correct));
        m.insert("eval_start_accuracy".into(), ratio(self.start_correct));
        m.insert("eval_end_accuracy".into(), ratio(self.end_correct));
        m
    }
}

// ─── BurnTrainer ──────────────────────────────────────────────────────────────
pub struct BurnTrainer {
    cfg:          FinetuneConfig,
    model_cfg:    TransformerQaConfig,
    /// Directory with weights to start from instead of a random init
    init_weights: Option<PathBuf>,
    train:        Vec<QaSample>,
    eval:         Option<Vec<QaSample>>,
    checkpoints:  CheckpointManager,
    device:       burn::backend::wgpu::WgpuDevice,
    state:        TrainerState,
    trained:      Option<TransformerQaModel<MyInnerBackend>>,
}

impl BurnTrainer {
    pub fn new(
        cfg:          FinetuneConfig,
        model_cfg:    TransformerQaConfig,
        init_weights: Option<PathBuf>,
        train:        QaDataset,
        eval:         Option<QaDataset>,
        output_dir:   &Path,
    ) -> Self {
        let device = burn::backend::wgpu::WgpuDevice::default();
        tracing::info!("Using WGPU device: {:?}", device);
        Self {
            cfg,
            model_cfg,
            init_weights,
            train:       train.into_samples(),
            eval:        eval.map(QaDataset::into_samples),
            checkpoints: CheckpointManager::new(output_dir),
            device,
            state:       TrainerState::default(),
            trained:     None,
        }
    }

    fn build_model(&self) -> Result<TransformerQaModel<MyBackend>> {
        let model: TransformerQaModel<MyBackend> = self.model_cfg.init(&self.device);
        match &self.init_weights {
            Some(dir) => {
                tracing::info!("Initialising weights from '{}'", dir.display());
                load_weights(model, dir, &self.device)
            }
            None => Ok(model),
        }
    }

    /// Loss and span accuracy over the eval split; `None` without one.
    fn evaluate(&self, model: &TransformerQaModel<MyBackend>) -> Option<LogMetrics> {
        let samples = self.eval.as_ref().filter(|s| !s.is_empty())?;

        // model.valid() → TransformerQaModel<MyInnerBackend>, dropout disabled
        let model_valid = model.valid();
        let loader = DataLoaderBuilder::new(QaBatcher::<MyInnerBackend>::new(self.device.clone()))
            .batch_size(self.cfg.eval_batch_size)
            .num_workers(1)
            .build(QaDataset::new(samples.clone()));

        let mut tally = EvalTally::default();
        for batch in loader.iter() {
            let size = batch.len();
            let (loss, output) = model_valid.forward_loss(
                batch.input_ids,
                batch.pad_mask,
                batch.start_positions.clone(),
                batch.end_positions.clone(),
            );
            tally.loss_sum += loss.into_scalar().elem::<f64>();
            tally.batches  += 1;
            tally.samples  += size;

            let start_hit = output.start_logits.argmax(1).flatten::<1>(0, 1)
                .equal(batch.start_positions)
                .int();
            let end_hit = output.end_logits.argmax(1).flatten::<1>(0, 1)
                .equal(batch.end_positions)
                .int();

            tally.start_correct += start_hit.clone().sum().into_scalar().elem::<i64>() as usize;
            tally.end_correct   += end_hit.clone().sum().into_scalar().elem::<i64>() as usize;
            tally.span_correct  += (start_hit * end_hit).sum().into_scalar().elem::<i64>() as usize;
        }
        Some(tally.metrics())
    }

    /// Write checkpoint-<step>/, updating the best checkpoint from `eval`
    fn save(&mut self, model: &TransformerQaModel<MyBackend>, eval: Option<&LogMetrics>) -> Result<()> {
        let path = self.checkpoints.path_for(self.state.global_step);
        let key  = self.cfg.best_metric_key();

        if let Some(&value) = eval.and_then(|m| m.get(&key)) {
            if is_improvement(value, self.state.best_metric, self.cfg.greater_is_better) {
                tracing::info!("New best {key} = {value:.4} at step {}", self.state.global_step);
                self.state.best_metric           = Some(value);
                self.state.best_model_checkpoint = Some(path);
            }
        }

        self.checkpoints.save_checkpoint(model, &self.model_cfg, &self.state)?;
        self.checkpoints.rotate(
            self.cfg.save_total_limit,
            self.state.best_model_checkpoint.as_deref(),
        );
        Ok(())
    }
}

impl TrainingCapability for BurnTrainer {
    fn train(
        &mut self,
        resume_from: Option<&Path>,
        observer:    &mut dyn TrainingObserver,
    ) -> Result<TrainOutcome> {
        // ── Build or restore the model ────────────────────────────────────────
        self.trained = None;
        let mut model = self.build_model()?;
        self.state = TrainerState::default();
        if let Some(checkpoint) = resume_from {
            let (restored, state) = self.checkpoints.load_checkpoint(model, checkpoint, &self.device)?;
            model      = restored;
            self.state = state;
        }

        let per_epoch = steps_per_epoch(self.train.len(), self.cfg.train_batch_size);
        if per_epoch == 0 {
            bail!("No training windows to learn from");
        }
        let total_steps = per_epoch * self.cfg.num_epochs;
        let (start_epoch, skip) = resume_position(self.state.global_step, per_epoch);
        tracing::info!(
            "Training {} windows: {} steps/epoch, {} total, starting at step {}",
            self.train.len(), per_epoch, total_steps, self.state.global_step,
        );

        // ── AdamW optimiser (decoupled weight decay) ──────────────────────────
        // θ = θ - lr * (m / (√v + ε) + λθ)
        let mut optim = AdamWConfig::new()
            .with_weight_decay(self.cfg.weight_decay as f32)
            .init();

        observer.on_train_begin();

        let mut loss_since_log  = 0.0f64;
        let mut steps_since_log = 0usize;
        let mut loss_total      = 0.0f64;
        let mut steps_total     = 0usize;

        // ── Epoch loop ────────────────────────────────────────────────────────
        for epoch in start_epoch..self.cfg.num_epochs {
            // Rebuilt per epoch (AutodiffBackend) so the order is reproducible
            let train_loader = epoch_loader(
                QaBatcher::<MyBackend>::new(self.device.clone()),
                self.train.clone(),
                self.cfg.train_batch_size,
                self.cfg.seed,
                epoch,
            );
            for (i, batch) in train_loader.iter().enumerate() {
                if epoch == start_epoch && i < skip {
                    continue;
                }

                let (loss, _) = model.forward_loss(
                    batch.input_ids,
                    batch.pad_mask,
                    batch.start_positions,
                    batch.end_positions,
                );
                let loss_val: f64 = loss.clone().into_scalar().elem::<f64>();
                if !loss_val.is_finite() {
                    bail!("Loss became {loss_val} at step {}", self.state.global_step + 1);
                }

                let lr = learning_rate_at(
                    self.state.global_step,
                    self.cfg.learning_rate,
                    self.cfg.warmup_steps,
                    total_steps,
                );

                // Backward pass + AdamW update
                let grads = loss.backward();
                let grads = GradientsParams::from_grads(grads, &model);
                model = optim.step(lr, model, grads);

                self.state.global_step += 1;
                let step = self.state.global_step;
                loss_since_log  += loss_val;
                steps_since_log += 1;
                loss_total      += loss_val;
                steps_total     += 1;

                if self.cfg.logging_steps > 0 && step % self.cfg.logging_steps == 0 {
                    let mut logs = LogMetrics::new();
                    logs.insert("loss".into(), loss_since_log / steps_since_log as f64);
                    logs.insert("learning_rate".into(), lr);
                    logs.insert("epoch".into(), step as f64 / per_epoch as f64);
                    tracing::debug!("step {step}: {logs:?}");
                    observer.on_log(step, &logs);
                    loss_since_log  = 0.0;
                    steps_since_log = 0;
                }

                let mut eval = None;
                if self.cfg.evaluation_strategy == IntervalStrategy::Steps
                    && self.cfg.eval_steps > 0
                    && step % self.cfg.eval_steps == 0
                {
                    eval = self.evaluate(&model);
                    if let Some(metrics) = &eval {
                        tracing::info!("step {step} evaluation: {metrics:?}");
                        observer.on_log(step, metrics);
                    }
                }

                if self.cfg.save_strategy == IntervalStrategy::Steps
                    && self.cfg.save_steps > 0
                    && step % self.cfg.save_steps == 0
                {
                    self.save(&model, eval.as_ref())?;
                }
            }

            self.state.epoch = epoch + 1;
            let step = self.state.global_step;

            let mut eval = None;
            if self.cfg.evaluation_strategy == IntervalStrategy::Epoch {
                eval = self.evaluate(&model);
                if let Some(metrics) = &eval {
                    tracing::info!("epoch {} evaluation: {metrics:?}", epoch + 1);
                    observer.on_log(step, metrics);
                }
            }
            if self.cfg.save_strategy == IntervalStrategy::Epoch {
                self.save(&model, eval.as_ref())?;
            }
        }

        let train_loss = if steps_total > 0 { loss_total / steps_total as f64 } else { 0.0 };
        let mut summary = LogMetrics::new();
        summary.insert("train_loss".into(), train_loss);
        summary.insert("epoch".into(), self.state.global_step as f64 / per_epoch as f64);
        observer.on_log(self.state.global_step, &summary);

        // ── Best checkpoint ───────────────────────────────────────────────────
        if self.cfg.load_best_model_at_end {
            if let Some(best) = self.state.best_model_checkpoint.clone().filter(|p| p.exists()) {
                tracing::info!("Loading best checkpoint '{}'", best.display());
                model = load_weights(model, &best, &self.device)?;
            }
        }

        self.trained = Some(model.valid());
        observer.on_train_end();
        tracing::info!("Training complete at step {}", self.state.global_step);

        Ok(TrainOutcome { global_step: self.state.global_step, train_loss })
    }

    fn global_step(&self) -> usize {
        self.state.global_step
    }

    fn save_model(&self, dir: &Path) -> Result<()> {
        let Some(model) = &self.trained else {
            bail!("No trained model to save");
        };
        std::fs::create_dir_all(dir)?;
        save_model_files(model, &self.model_cfg, dir)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steps_per_epoch_rounds_up() {
        assert_eq!(steps_per_epoch(17, 8), 3);
        assert_eq!(steps_per_epoch(16, 8), 2);
        assert_eq!(steps_per_epoch(0, 8), 0);
        assert_eq!(steps_per_epoch(5, 0), 0);
    }

    #[test]
    fn test_resume_position_splits_global_step() {
        assert_eq!(resume_position(0, 10), (0, 0));
        assert_eq!(resume_position(15, 10), (1, 5));
        assert_eq!(resume_position(20, 10), (2, 0));
    }

    #[test]
    fn test_epoch_seed_differs_per_epoch() {
        assert_eq!(epoch_seed(42, 0), 42);
        assert_eq!(epoch_seed(42, 3), 45);
        assert_ne!(epoch_seed(42, 1), epoch_seed(42, 2));
        assert_eq!(epoch_seed(u64::MAX, 1), 0);
    }

    /// Batches as the start positions of their samples
    #[derive(Clone)]
    struct StartBatcher;

    impl Batcher<QaSample, Vec<usize>> for StartBatcher {
        fn batch(&self, items: Vec<QaSample>) -> Vec<usize> {
            items.iter().map(|s| s.start_position).collect()
        }
    }

    fn numbered_samples(n: usize) -> Vec<QaSample> {
        (0..n)
            .map(|i| QaSample {
                input_ids:      vec![1, 2],
                attention_mask: vec![1, 1],
                start_position: i,
                end_position:   i,
            })
            .collect()
    }

    fn epoch_order(epoch: usize) -> Vec<Vec<usize>> {
        epoch_loader(StartBatcher, numbered_samples(12), 3, 42, epoch).iter().collect()
    }

    #[test]
    fn test_resumed_epoch_replays_the_same_order() {
        let first_attempt = epoch_order(1);
        let resumed: Vec<Vec<usize>> = epoch_order(1).into_iter().skip(2).collect();

        assert_eq!(resumed, first_attempt[2..].to_vec());

        let mut seen: Vec<usize> = first_attempt.into_iter().flatten().collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..12).collect::<Vec<_>>());
    }

    #[test]
    fn test_epochs_are_shuffled_differently() {
        assert_ne!(epoch_order(0), epoch_order(1));
    }

    #[test]
    fn test_learning_rate_warmup_then_decay() {
        let peak = 1e-3;
        assert_eq!(learning_rate_at(0, peak, 10, 110), 0.0);
        assert!((learning_rate_at(5, peak, 10, 110) - 5e-4).abs() < 1e-12);
        assert!((learning_rate_at(10, peak, 10, 110) - peak).abs() < 1e-12);
        assert!((learning_rate_at(60, peak, 10, 110) - 5e-4).abs() < 1e-12);
        assert_eq!(learning_rate_at(110, peak, 10, 110), 0.0);
        assert_eq!(learning_rate_at(200, peak, 10, 110), 0.0);
    }

    #[test]
    fn test_learning_rate_without_warmup_starts_at_peak() {
        assert_eq!(learning_rate_at(0, 2.0, 0, 4), 2.0);
        assert_eq!(learning_rate_at(2, 2.0, 0, 4), 1.0);
    }

    #[test]
    fn test_improvement_direction() {
        assert!(is_improvement(0.5, None, true));
        assert!(!is_improvement(f64::NAN, None, true));
        assert!(is_improvement(0.6, Some(0.5), true));
        assert!(!is_improvement(0.5, Some(0.5), true));
        assert!(is_improvement(0.4, Some(0.5), false));
        assert!(!is_improvement(0.6, Some(0.5), false));
    }

    #[test]
    fn test_eval_tally_metrics() {
        let tally = EvalTally {
            loss_sum: 3.0, batches: 2, samples: 4,
            start_correct: 3, end_correct: 2, span_correct: 1,
        };
        let m = tally.metrics();
        assert_eq!(m["eval_loss"], 1.5);
        assert_eq!(m["eval_start_accuracy"], 0.75);
        assert_eq!(m["eval_end_accuracy"], 0.5);
        assert_eq!(m["eval_accuracy"], 0.25);
    }

    #[test]
    fn test_empty_tally_has_nan_loss() {
        let m = EvalTally::default().metrics();
        assert!(m["eval_loss"].is_nan());
        assert_eq!(m["eval_accuracy"], 0.0);
    }
}
