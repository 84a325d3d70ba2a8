//! Per-run execution log and step timings.
//!
//! The log is a human-readable markdown file. Writes are best effort: a
//! failing disk never fails a run, it only produces a warning.

use rosetta_error::{Error, Result};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Append-only markdown log for one run
#[derive(Debug, Default)]
pub struct ExecutionLog {
    file: Option<Mutex<File>>,
    path: Option<PathBuf>,
}

impl ExecutionLog {
    /// A log that records nothing
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Create `<dir>/<stamp>-<run_id>.md` and write the header.
    pub fn create(dir: &Path, run_id: &str) -> Result<Self> {
        std::fs::create_dir_all(dir).map_err(|e| {
            Error::from(e)
                .with_operation("ExecutionLog::create")
                .with_context("dir", dir.display().to_string())
        })?;

        let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S");
        let path = dir.join(format!("{}-{}.md", stamp, run_id));
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| {
                Error::from(e)
                    .with_operation("ExecutionLog::create")
                    .with_context("path", path.display().to_string())
            })?;

        writeln!(
            file,
            "# Rosetta run {}\n\nStarted {}\n",
            run_id,
            chrono::Utc::now().to_rfc3339()
        )
        .map_err(|e| Error::from(e).with_operation("ExecutionLog::create"))?;

        Ok(Self {
            file: Some(Mutex::new(file)),
            path: Some(path),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_enabled(&self) -> bool {
        self.file.is_some()
    }

    fn append(&self, text: &str) {
        let Some(file) = &self.file else {
            return;
        };
        let result = match file.lock() {
            Ok(mut f) => f.write_all(text.as_bytes()),
            Err(_) => return,
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, "failed to write execution log");
        }
    }

    /// A titled block of free text
    pub fn section(&self, title: &str, body: &str) {
        self.append(&format!("## {}\n\n{}\n\n", title, body.trim_end()));
    }

    /// A titled block holding a pretty-printed value
    pub fn json<T: Serialize>(&self, title: &str, value: &T) {
        if !self.is_enabled() {
            return;
        }
        match serde_json::to_string_pretty(value) {
            Ok(body) => self.section(title, &format!("```json\n{}\n```", body)),
            Err(e) => tracing::warn!(error = %e, title, "failed to render log section"),
        }
    }

    pub fn timing_summary(&self, timings: &StepTimings) {
        self.section("Timing summary", &timings.render_table());
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepTiming {
    pub step_id: String,
    pub duration_ms: u64,
}

/// Wall-clock duration of each completed step, in completion order
#[derive(Debug, Default)]
pub struct StepTimings {
    started: Mutex<Vec<(String, Instant)>>,
    finished: Mutex<Vec<StepTiming>>,
}

impl StepTimings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self, step_id: &str) {
        if let Ok(mut started) = self.started.lock() {
            started.push((step_id.to_string(), Instant::now()));
        }
    }

    /// Close the most recent open entry for `step_id`
    pub fn finish(&self, step_id: &str) -> Duration {
        let elapsed = self
            .started
            .lock()
            .ok()
            .and_then(|mut started| {
                let pos = started.iter().rposition(|(id, _)| id == step_id)?;
                Some(started.remove(pos).1.elapsed())
            })
            .unwrap_or_default();

        if let Ok(mut finished) = self.finished.lock() {
            finished.push(StepTiming {
                step_id: step_id.to_string(),
                duration_ms: elapsed.as_millis() as u64,
            });
        }
        elapsed
    }

    pub fn snapshot(&self) -> Vec<StepTiming> {
        self.finished.lock().map(|f| f.clone()).unwrap_or_default()
    }

    pub fn total_ms(&self) -> u64 {
        self.snapshot().iter().map(|t| t.duration_ms).sum()
    }

    pub fn render_table(&self) -> String {
        let mut out = String::from("| Step | Duration (ms) |\n|------|---------------|\n");
        for timing in self.snapshot() {
            out.push_str(&format!("| {} | {} |\n", timing.step_id, timing.duration_ms));
        }
        out.push_str(&format!("| **total** | {} |\n", self.total_ms()));
        out
    }
}
