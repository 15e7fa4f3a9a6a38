//! Job progress, status events and cooperative cancellation.
//!
//! A running job reports through a [`JobEvent`] channel instead of
//! callbacks: hosts call [`Mesher::subscribe`](crate::Mesher::subscribe) and
//! drain the receiver on whatever thread suits them. Every event is also
//! logged through `tracing`, so an unsubscribed mesher still leaves a trail.
//!
//! # Example
//!
//! ```ignore
//! use mesh_tetra::{JobEvent, Mesher};
//!
//! let mut mesher = Mesher::new();
//! let events = mesher.subscribe();
//! let cancel = mesher.cancel_token();
//!
//! std::thread::spawn(move || {
//!     for event in events {
//!         if let JobEvent::ProcessOutput(line) = event {
//!             println!("{line}");
//!         }
//!     }
//! });
//! // cancel.cancel() from any thread stops the external process.
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, info, warn};

/// Shared cancellation flag.
///
/// Cloning yields a handle to the same flag. Setting it makes the process
/// runner kill the external mesher at its next poll (within ~50 ms).
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a new, unset token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Check if cancellation was requested.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Clear the flag before a new job.
    pub(crate) fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Pipeline stages of a meshing job, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum JobStage {
    /// Parameters checked, workspace being created.
    Preparing,
    /// Input written to the workspace.
    Serializing,
    /// External mesher running.
    Meshing,
    /// Output grid being read back.
    Importing,
    /// Workspace teardown.
    CleaningUp,
    /// Terminal.
    Finished,
}

impl JobStage {
    const ALL: [JobStage; 6] = [
        JobStage::Preparing,
        JobStage::Serializing,
        JobStage::Meshing,
        JobStage::Importing,
        JobStage::CleaningUp,
        JobStage::Finished,
    ];

    /// Zero-based position in the pipeline.
    pub fn index(&self) -> u64 {
        Self::ALL.iter().position(|s| s == self).unwrap_or(0) as u64
    }

    /// Stage name for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStage::Preparing => "preparing",
            JobStage::Serializing => "serializing",
            JobStage::Meshing => "meshing",
            JobStage::Importing => "importing",
            JobStage::CleaningUp => "cleaning up",
            JobStage::Finished => "finished",
        }
    }
}

impl std::fmt::Display for JobStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress information carried by [`JobEvent::Progress`].
#[derive(Debug, Clone)]
pub struct Progress {
    /// Current stage.
    pub stage: JobStage,

    /// Human-readable message describing current operation.
    pub message: String,

    /// Elapsed time since the job started.
    pub elapsed: Duration,
}

impl Progress {
    /// Create a new progress report.
    pub fn new(stage: JobStage, message: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            stage,
            message: message.into(),
            elapsed,
        }
    }

    /// Get progress as a fraction (0.0 to 1.0), by stage.
    #[inline]
    pub fn fraction(&self) -> f64 {
        let last = (JobStage::ALL.len() - 1) as f64;
        self.stage.index() as f64 / last
    }

    /// Get progress as a percentage (0 to 100).
    #[inline]
    pub fn percent(&self) -> u32 {
        (self.fraction() * 100.0).round() as u32
    }

    /// Check if the job has finished.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.stage == JobStage::Finished
    }
}

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Whether the job can no longer change status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Events emitted while a job runs.
#[derive(Debug, Clone)]
pub enum JobEvent {
    /// Orchestrator log line.
    Log(String),
    /// A line of mesher output (stdout or stderr).
    ProcessOutput(String),
    /// Stage transition.
    Progress(Progress),
    /// Status transition.
    Status(JobStatus),
}

/// Fan-out point for job events: the optional subscriber channel plus
/// `tracing`.
///
/// `EventSink::default()` only logs. Clones share the subscriber and the
/// job transcript.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    sender: Option<Sender<JobEvent>>,
    started: Option<Instant>,
    transcript: Arc<Mutex<Vec<String>>>,
}

impl EventSink {
    /// Create a sink with a fresh channel, returning the receiving end.
    pub fn channel() -> (Self, Receiver<JobEvent>) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        (
            Self {
                sender: Some(sender),
                ..Default::default()
            },
            receiver,
        )
    }

    /// Restart the elapsed-time clock.
    pub(crate) fn start_clock(&mut self) {
        self.started = Some(Instant::now());
    }

    fn elapsed(&self) -> Duration {
        self.started.map(|s| s.elapsed()).unwrap_or_default()
    }

    /// Take the lines logged since the last call.
    pub(crate) fn take_transcript(&self) -> Vec<String> {
        let mut lines = self
            .transcript
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::take(&mut *lines)
    }

    fn record(&self, line: &str) {
        let mut lines = self
            .transcript
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        lines.push(line.to_string());
    }

    fn send(&self, event: JobEvent) {
        if let Some(sender) = &self.sender {
            // A dropped receiver just means nobody is listening anymore.
            let _ = sender.send(event);
        }
    }

    pub fn log(&self, message: impl Into<String>) {
        let message = message.into();
        info!(target: "mesh_tetra::job", "{}", message);
        self.record(&message);
        self.send(JobEvent::Log(message));
    }

    pub fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        warn!(target: "mesh_tetra::job", "{}", message);
        self.record(&message);
        self.send(JobEvent::Log(message));
    }

    pub fn process_output(&self, line: &str) {
        debug!(target: "mesh_tetra::process", "{}", line);
        self.record(line);
        self.send(JobEvent::ProcessOutput(line.to_string()));
    }

    pub fn stage(&self, stage: JobStage, message: impl Into<String>) {
        let progress = Progress::new(stage, message, self.elapsed());
        debug!(
            target: "mesh_tetra::job",
            stage = stage.as_str(),
            percent = progress.percent(),
            "{}",
            progress.message
        );
        self.send(JobEvent::Progress(progress));
    }

    pub fn status(&self, status: JobStatus) {
        debug!(target: "mesh_tetra::job", status = %status, "Job status changed");
        self.send(JobEvent::Status(status));
    }
}
