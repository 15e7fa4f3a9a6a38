//! Running a mesher process with streamed output and cancellation.
//!
//! stdout and stderr are drained by two reader threads into one channel
//! while the process runs, so the child never blocks on a full pipe. The
//! calling thread waits on that channel with a short timeout and checks the
//! cancel token after every line and every timeout.

use std::io::{BufRead, BufReader, Read};
use std::process::{Child, Command, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tracing::{debug, trace, warn};

use crate::command::MesherCommand;
use crate::error::{TetraError, TetraResult};
use crate::progress::{CancelToken, EventSink};
use crate::tracing_ext;

/// How long the runner waits for a line before checking the cancel token.
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// After a kill, how long to wait for the output pipes to close. A mesher
/// that left a grandchild holding them open is not waited for beyond this.
const KILL_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Process lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    NotStarted,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

/// Result of a run that did not fail.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// `Succeeded` or `Cancelled`.
    pub state: RunState,
    /// Exit code, if the process exited normally.
    pub exit_code: Option<i32>,
    /// Every output line, stdout and stderr interleaved as received.
    pub output: Vec<String>,
    /// Wall time from spawn to reap.
    pub elapsed: Duration,
}

impl RunReport {
    pub fn is_cancelled(&self) -> bool {
        self.state == RunState::Cancelled
    }
}

/// Runs mesher commands.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    /// Forward each output line as it arrives instead of buffering it.
    pub verbose: bool,
    /// Cancel polling interval.
    pub poll_interval: Duration,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self {
            verbose: false,
            poll_interval: POLL_INTERVAL,
        }
    }
}

impl ProcessRunner {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            ..Default::default()
        }
    }

    /// Run `command` to completion or cancellation.
    ///
    /// A non-zero exit without cancellation flushes the buffered output to
    /// `sink` and returns [`TetraError::ProcessFailed`]. Cancellation wins
    /// over any exit code.
    pub fn run(
        &self,
        command: &MesherCommand,
        cancel: &CancelToken,
        sink: &EventSink,
    ) -> TetraResult<RunReport> {
        let program = command.program_name();
        let mut state = RunState::NotStarted;
        trace!(target: "mesh_tetra::process", state = ?state, "Runner created");

        tracing_ext::log_command(&command.program, &command.args);
        let start = Instant::now();
        let mut child = spawn(command)?;
        state = RunState::Running;
        trace!(target: "mesh_tetra::process", state = ?state, pid = child.id(), "Mesher spawned");

        let (tx, rx) = crossbeam_channel::unbounded::<String>();
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_reader(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_reader(stderr, tx.clone()));
        }
        drop(tx);

        let (output, killed, drained) = self.pump(&mut child, &rx, cancel, sink);

        if drained {
            for reader in readers {
                if reader.join().is_err() {
                    warn!(target: "mesh_tetra::process", "Output reader thread panicked");
                }
            }
        } else {
            warn!(
                target: "mesh_tetra::process",
                program = %program,
                "Output pipes still open after kill, not waiting for them"
            );
        }

        let status = child
            .wait()
            .map_err(|e| TetraError::ProcessSpawn {
                program: command.program.clone(),
                source: e,
            })?;
        let exit_code = status.code();
        let cancelled = killed || cancel.is_cancelled();
        let elapsed = start.elapsed();
        tracing_ext::log_process_exit(
            &program,
            exit_code,
            cancelled,
            elapsed.as_secs_f64() * 1000.0,
        );

        if cancelled {
            state = RunState::Cancelled;
        } else if status.success() {
            state = RunState::Succeeded;
        } else {
            state = RunState::Failed;
            trace!(target: "mesh_tetra::process", state = ?state, "Mesher failed");
            if !self.verbose && !output.is_empty() {
                sink.log(output.join("\n"));
            }
            return Err(TetraError::process_failed(program, exit_code));
        }
        trace!(target: "mesh_tetra::process", state = ?state, "Mesher finished");

        Ok(RunReport {
            state,
            exit_code,
            output,
            elapsed,
        })
    }

    /// Receive lines until both pipes close. Returns the lines, whether the
    /// child was killed, and whether the pipes closed.
    fn pump(
        &self,
        child: &mut Child,
        rx: &Receiver<String>,
        cancel: &CancelToken,
        sink: &EventSink,
    ) -> (Vec<String>, bool, bool) {
        let mut output = Vec::new();
        let mut killed_at: Option<Instant> = None;

        loop {
            match rx.recv_timeout(self.poll_interval) {
                Ok(line) => {
                    if self.verbose {
                        sink.process_output(&line);
                    } else {
                        trace!(target: "mesh_tetra::process", "{}", line);
                    }
                    output.push(line);
                }
                Err(RecvTimeoutError::Timeout) => {
                    if let Some(at) = killed_at {
                        if at.elapsed() > KILL_DRAIN_TIMEOUT {
                            return (output, true, false);
                        }
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }

            if killed_at.is_none() && cancel.is_cancelled() {
                debug!(target: "mesh_tetra::process", pid = child.id(), "Cancel requested, killing mesher");
                // The child may already have exited; reaping happens below.
                let _ = child.kill();
                killed_at = Some(Instant::now());
            }
        }

        (output, killed_at.is_some(), true)
    }
}

fn spawn(command: &MesherCommand) -> TetraResult<Child> {
    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        cmd.creation_flags(CREATE_NO_WINDOW);
    }

    cmd.spawn().map_err(|e| TetraError::ProcessSpawn {
        program: command.program.clone(),
        source: e,
    })
}

fn spawn_reader<R: Read + Send + 'static>(pipe: R, tx: Sender<String>) -> JoinHandle<()> {
    std::thread::spawn(move || {
        let mut reader = BufReader::new(pipe);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    let line = line.trim_end_matches(['\n', '\r']).to_string();
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    })
}
