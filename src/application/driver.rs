// ============================================================
// Layer 2 — Resumable Training Driver
// ============================================================
// Runs a training capability to completion, surviving
// crashes by resuming from the newest checkpoint in the
// output directory.
//
//   ┌──────────┐   none    ┌─────────┐
//   │ Discover │─────────▶│  Fresh  │──┐
//   └──────────┘           └─────────┘  │   ┌─────┐  ok   ┌──────┐
//        │ checkpoint-N                 ├─▶│ Run │──────▶│ Save │
//        ▼                              │   └─────┘       └──────┘
//   ┌─────────────┐                     │      │ err
//   │ Resume(N)   │────────────────────┘      ▼
//   └─────────────┘        attempt < max ◀─ Failed ─▶ attempt = max
//        ▲                        │                     │
//        └────────────────────────┘              RetryBoundExceeded
//
// Every attempt gets a fresh progress log handle (append
// mode), and the handle is released before the next attempt
// or before returning. Failures are written to the progress
// log with the retry message before the loop moves on.
//
// Reference: Rust Book §9 (Recoverable Errors with Result)

use std::path::PathBuf;

use crate::domain::traits::{TrainOutcome, TrainingCapability};
use crate::errors::{FinetuneError, Result};
use crate::infra::{
    checkpoint::{discover_latest_checkpoint, Checkpoint},
    progress_log::ProgressTracker,
};

pub const DEFAULT_PROGRESS_LOG: &str = "progress.log";

/// Knobs of the retry loop and the throughput estimate
#[derive(Debug, Clone)]
pub struct DriverSettings {
    pub max_retries:  usize,
    pub progress_log: PathBuf,
    pub batch_size:   usize,
    pub max_length:   usize,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            max_retries:  3,
            progress_log: PathBuf::from(DEFAULT_PROGRESS_LOG),
            batch_size:   8,
            max_length:   384,
        }
    }
}

/// What a successful run looked like
#[derive(Debug, Clone)]
pub struct DriverReport {
    /// Attempts made, including the successful one
    pub attempts:     usize,
    /// Checkpoint the successful attempt resumed from
    pub resumed_from: Option<Checkpoint>,
    pub outcome:      TrainOutcome,
}

pub struct ResumableDriver {
    output_dir: PathBuf,
    settings:   DriverSettings,
}

impl ResumableDriver {
    pub fn new(output_dir: impl Into<PathBuf>, settings: DriverSettings) -> Self {
        Self { output_dir: output_dir.into(), settings }
    }

    /// Train until success or until `max_retries` attempts have failed,
    /// then persist the final model into the output directory.
    pub fn run<T: TrainingCapability + ?Sized>(&self, trainer: &mut T) -> Result<DriverReport> {
        let max_attempts = self.settings.max_retries.max(1);
        let mut attempt  = 0usize;

        loop {
            let resume = discover_latest_checkpoint(&self.output_dir);
            match &resume {
                Some(c) => tracing::info!("Resuming from checkpoint '{}' (step {})", c.path.display(), c.step),
                None    => tracing::info!("No checkpoint in '{}'; starting fresh", self.output_dir.display()),
            }

            let mut tracker = ProgressTracker::open(
                &self.settings.progress_log,
                self.settings.batch_size,
                self.settings.max_length,
            );

            let result = trainer.train(resume.as_ref().map(|c| c.path.as_path()), &mut tracker);
            attempt += 1;

            match result {
                Ok(outcome) => {
                    tracker.close();
                    tracing::info!(
                        "Training finished after {attempt} attempt(s) at step {}",
                        outcome.global_step,
                    );
                    trainer
                        .save_model(&self.output_dir)
                        .map_err(FinetuneError::ModelSave)?;
                    tracing::info!("Final model saved to '{}'", self.output_dir.display());
                    return Ok(DriverReport { attempts: attempt, resumed_from: resume, outcome });
                }
                Err(cause) => {
                    let message = if attempt < max_attempts {
                        format!("Retrying ({attempt}/{max_attempts})")
                    } else {
                        format!("Max retries reached ({max_attempts}). Training failed.")
                    };
                    tracker.record_failure(trainer.global_step(), &cause, attempt, message.clone());
                    tracker.close();

                    let failure = FinetuneError::TrainingAttemptFailed { attempt, cause };
                    tracing::error!("{failure}. {message}");

                    if attempt >= max_attempts {
                        return Err(failure.into_retry_bound());
                    }
                }
            }
        }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedTrainer;
    use std::fs;
    use std::path::Path;

    fn settings(max_retries: usize, log: &Path) -> DriverSettings {
        DriverSettings {
            max_retries,
            progress_log: log.to_path_buf(),
            batch_size:   2,
            max_length:   16,
        }
    }

    #[test]
    fn test_succeeds_when_failures_fit_in_retry_bound() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("out");
        let mut trainer = ScriptedTrainer::new(&out, 2);

        let report = ResumableDriver::new(&out, settings(3, &tmp.path().join("progress.log")))
            .run(&mut trainer)
            .unwrap();

        assert_eq!(report.attempts, 3);
        assert_eq!(trainer.attempts, 3);
        assert!(out.join("model.bin").exists());
    }

    #[test]
    fn test_retry_bound_exceeded_after_exactly_max_attempts() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("out");
        let log = tmp.path().join("progress.log");
        let mut trainer = ScriptedTrainer::new(&out, 2);

        let err = ResumableDriver::new(&out, settings(2, &log))
            .run(&mut trainer)
            .unwrap_err();

        assert!(matches!(err, FinetuneError::RetryBoundExceeded { attempts: 2, .. }));
        assert_eq!(err.exit_code(), 2);
        assert_eq!(trainer.attempts, 2);
        assert!(!out.join("model.bin").exists());

        let text = fs::read_to_string(&log).unwrap();
        assert!(text.contains("Retrying (1/2)"));
        assert!(text.contains("Max retries reached (2)"));
    }

    #[test]
    fn test_retry_resumes_from_latest_checkpoint() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("out");
        let mut trainer = ScriptedTrainer::new(&out, 1);

        let report = ResumableDriver::new(&out, settings(3, &tmp.path().join("progress.log")))
            .run(&mut trainer)
            .unwrap();

        assert_eq!(trainer.resumed_from[0], None);
        assert_eq!(trainer.resumed_from[1], Some(out.join("checkpoint-2")));
        assert_eq!(report.resumed_from.map(|c| c.step), Some(2));
        assert_eq!(report.outcome.global_step, 4);
    }

    #[test]
    fn test_progress_log_records_ticks_and_failures() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("out");
        let log = tmp.path().join("logs").join("progress.log");
        let mut trainer = ScriptedTrainer::new(&out, 1);

        ResumableDriver::new(&out, settings(3, &log)).run(&mut trainer).unwrap();

        let text  = fs::read_to_string(&log).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        // two ticks + one failure, then two ticks
        assert_eq!(lines.len(), 5);
        assert!(lines[0].starts_with("Step: 1, Logs: "));
        assert!(lines[2].starts_with("[ERROR] Step: 2, Error: simulated failure on attempt 1"));
        assert!(lines[2].contains("Retrying (1/3)"));
        assert!(lines[4].starts_with("Step: 4, Logs: "));
    }

    #[test]
    fn test_unavailable_progress_log_does_not_abort() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("out");
        let mut trainer = ScriptedTrainer::new(&out, 1);

        // a directory is not a writable log file
        let report = ResumableDriver::new(&out, settings(3, tmp.path()))
            .run(&mut trainer)
            .unwrap();
        assert_eq!(report.attempts, 2);
    }

    #[test]
    fn test_zero_retries_means_one_attempt() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("out");
        let mut trainer = ScriptedTrainer::new(&out, 1);

        let err = ResumableDriver::new(&out, settings(0, &tmp.path().join("progress.log")))
            .run(&mut trainer)
            .unwrap_err();
        assert!(matches!(err, FinetuneError::RetryBoundExceeded { attempts: 1, .. }));
        assert_eq!(trainer.attempts, 1);
    }

    #[test]
    fn test_existing_checkpoints_resume_the_first_attempt() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("out");
        for step in [500, 1500, 250] {
            fs::create_dir_all(out.join(format!("checkpoint-{step}"))).unwrap();
        }
        let mut trainer = ScriptedTrainer::new(&out, 0);

        let report = ResumableDriver::new(&out, settings(3, &tmp.path().join("progress.log")))
            .run(&mut trainer)
            .unwrap();
        assert_eq!(trainer.resumed_from[0], Some(out.join("checkpoint-1500")));
        assert_eq!(report.attempts, 1);
        assert_eq!(report.outcome.global_step, 1502);
    }
}
