// ============================================================
// Layer 6 — Progress Log
// ============================================================
// Appends one human-readable line per training progress tick
// (or per failure) to a log file that operators tail while a
// long job runs.
//
// Line format:
//   Step: 120, Logs: {"loss":1.93,"tokens_per_second":5120.4,...}
//   [ERROR] Step: 340, Error: <message>, Other logs: {...}
//
// The sink is best-effort: failing to open or write the file
// is reported on the tracing diagnostic stream and training
// carries on. Every write is flushed immediately so a crash
// loses at most the line being written. The file handle is
// owned by ProgressLog and closed when it is dropped, which
// happens at the end of every attempt, success or failure.
//
// Throughput estimate:
//   tokens_per_second = step * batch_size * max_length / elapsed
// It ignores padding and short windows, so it is only an
// operational signal, never used for anything else.
//
// Reference: Rust Book §12 (I/O and File Handling)
//            Rust Book §15 (Drop)

use serde::Serialize;
use serde_json::{Map, Value};
use std::{
    fs::{self, File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
    time::Instant,
};

use crate::domain::traits::{LogMetrics, TrainingObserver};
use crate::errors::FinetuneError;

/// One append-only progress record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub step:              usize,
    pub elapsed_secs:      f64,
    pub tokens_per_second: f64,
    pub metrics:           LogMetrics,
    pub error:             Option<String>,
    pub retry_attempt:     Option<usize>,
    /// Human-readable note, e.g. "Retrying (1/3)"
    pub message:           Option<String>,
}

impl ProgressEvent {
    /// Render as one log line (without the trailing newline)
    pub fn to_line(&self) -> String {
        let mut logs = Map::new();
        for (k, v) in &self.metrics {
            logs.insert(k.clone(), Value::from(*v));
        }
        logs.insert("tokens_per_second".into(), Value::from(self.tokens_per_second));
        logs.insert("elapsed_secs".into(), Value::from(self.elapsed_secs));
        if let Some(attempt) = self.retry_attempt {
            logs.insert("retry_attempt".into(), Value::from(attempt));
        }
        if let Some(message) = &self.message {
            logs.insert("message".into(), Value::from(message.as_str()));
        }
        let logs = Value::Object(logs);

        match &self.error {
            Some(err) => format!("[ERROR] Step: {}, Error: {}, Other logs: {}", self.step, err, logs),
            None      => format!("Step: {}, Logs: {}", self.step, logs),
        }
    }
}

/// Approximate throughput; 0 when no time has elapsed yet
pub fn tokens_per_second(step: usize, batch_size: usize, max_length: usize, elapsed_secs: f64) -> f64 {
    if elapsed_secs <= 0.0 {
        return 0.0;
    }
    (step * batch_size * max_length) as f64 / elapsed_secs
}

// ─── ProgressLog (the sink) ───────────────────────────────────────────────────
/// Append-mode handle on the progress log file.
pub struct ProgressLog {
    path: PathBuf,
    file: File,
}

impl ProgressLog {
    /// Open (creating if needed) the log for appending.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, FinetuneError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|cause| FinetuneError::LogSinkUnavailable {
                path: path.clone(),
                cause,
            })?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|cause| FinetuneError::LogSinkUnavailable { path: path.clone(), cause })?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event and flush it to disk.
    pub fn append(&mut self, event: &ProgressEvent) -> std::io::Result<()> {
        writeln!(self.file, "{}", event.to_line())?;
        self.file.flush()
    }
}

// ─── ProgressTracker (the observer) ───────────────────────────────────────────
/// Turns training progress ticks into ProgressEvents on a sink.
/// Holds no sink at all when the log could not be opened.
pub struct ProgressTracker {
    sink:       Option<ProgressLog>,
    started:    Instant,
    batch_size: usize,
    max_length: usize,
}

impl ProgressTracker {
    pub fn new(sink: Option<ProgressLog>, batch_size: usize, max_length: usize) -> Self {
        Self { sink, started: Instant::now(), batch_size, max_length }
    }

    /// Open the sink at `path`; on failure log a warning and track without one.
    pub fn open(path: &Path, batch_size: usize, max_length: usize) -> Self {
        let sink = match ProgressLog::open(path) {
            Ok(log) => Some(log),
            Err(e)  => {
                tracing::warn!("{e}; progress will not be recorded for this attempt");
                None
            }
        };
        Self::new(sink, batch_size, max_length)
    }

    fn event(&self, step: usize, metrics: &LogMetrics) -> ProgressEvent {
        let elapsed_secs = self.started.elapsed().as_secs_f64();
        ProgressEvent {
            step,
            elapsed_secs,
            tokens_per_second: tokens_per_second(step, self.batch_size, self.max_length, elapsed_secs),
            metrics:           metrics.clone(),
            error:             None,
            retry_attempt:     None,
            message:           None,
        }
    }

    /// Record a failed attempt together with what happens next.
    pub fn record_failure(&mut self, step: usize, error: &anyhow::Error, attempt: usize, message: String) {
        let mut event = self.event(step, &LogMetrics::new());
        event.error         = Some(format!("{error:#}"));
        event.retry_attempt = Some(attempt);
        event.message       = Some(message);
        self.write(&event);
    }

    /// Write an event; errors go to the diagnostic stream only.
    pub fn write(&mut self, event: &ProgressEvent) {
        let Some(sink) = self.sink.as_mut() else {
            return;
        };
        if let Err(e) = sink.append(event) {
            tracing::warn!("Error writing to progress log '{}': {}", sink.path().display(), e);
        }
    }

    /// Release the sink (closes the file)
    pub fn close(&mut self) {
        self.sink = None;
    }
}

impl TrainingObserver for ProgressTracker {
    fn on_train_begin(&mut self) {
        self.started = Instant::now();
    }

    fn on_log(&mut self, step: usize, metrics: &LogMetrics) {
        let event = self.event(step, metrics);
        self.write(&event);
    }
}
