//! Tracing extensions for meshing jobs.
//!
//! Structured logging and timing for the pipeline stages. Targets:
//!
//! - `mesh_tetra::job`: job lifecycle and orchestrator log lines
//! - `mesh_tetra::process`: external mesher invocation and output
//! - `mesh_tetra::io`: staged input and imported output files
//! - `mesh_tetra::timing`: stage durations
//!
//! Enable tracing by initializing a subscriber in your application:
//!
//! ```rust,ignore
//! use tracing_subscriber::{fmt, prelude::*, EnvFilter};
//!
//! tracing_subscriber::registry()
//!     .with(fmt::layer())
//!     .with(EnvFilter::from_default_env())
//!     .init();
//!
//! // RUST_LOG=mesh_tetra::process=debug shows every mesher output line
//! ```

use std::path::Path;
use std::time::Instant;

use tracing::{Span, debug, info, warn};

use crate::types::TetrahedralMesh;

/// A performance timer that logs duration on drop.
///
/// ```rust,ignore
/// use mesh_tetra::tracing_ext::OperationTimer;
///
/// fn import() {
///     let _timer = OperationTimer::new("import_output");
///     // ... do work ...
/// } // Timer logs duration when dropped
/// ```
pub struct OperationTimer {
    name: &'static str,
    start: Instant,
    span: Span,
}

impl OperationTimer {
    /// Create a new operation timer.
    pub fn new(name: &'static str) -> Self {
        let span = tracing::info_span!("tetra_operation", operation = name);
        debug!(target: "mesh_tetra::timing", operation = name, "Starting operation");
        Self {
            name,
            start: Instant::now(),
            span,
        }
    }

    /// Create a timer tagged with the backend it runs for.
    pub fn for_backend(name: &'static str, backend: &'static str) -> Self {
        let span = tracing::info_span!("tetra_operation", operation = name, backend = backend);
        debug!(
            target: "mesh_tetra::timing",
            operation = name,
            backend = backend,
            "Starting operation"
        );
        Self {
            name,
            start: Instant::now(),
            span,
        }
    }

    /// Get the elapsed time.
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Get the span for this timer.
    pub fn span(&self) -> &Span {
        &self.span
    }
}

impl Drop for OperationTimer {
    fn drop(&mut self) {
        let elapsed_ms = self.elapsed_ms();
        info!(
            target: "mesh_tetra::timing",
            operation = self.name,
            elapsed_ms = format!("{:.2}", elapsed_ms),
            "Operation completed"
        );
    }
}

/// Log the start of a job.
pub fn log_job_start(backend: &str, workspace: &Path, keep_files: bool) {
    info!(
        target: "mesh_tetra::job",
        backend = backend,
        workspace = workspace.display().to_string(),
        keep_files = keep_files,
        "Mesh generation started"
    );
}

/// Log the command line handed to the mesher.
pub fn log_command(program: &Path, args: &[String]) {
    info!(
        target: "mesh_tetra::process",
        program = program.display().to_string(),
        args = args.join(" "),
        "Launching mesher"
    );
}

/// Log how the mesher process ended.
pub fn log_process_exit(program: &str, exit_code: Option<i32>, cancelled: bool, elapsed_ms: f64) {
    if cancelled {
        warn!(
            target: "mesh_tetra::process",
            program = program,
            elapsed_ms = format!("{:.2}", elapsed_ms),
            "Mesher cancelled"
        );
    } else if exit_code == Some(0) {
        info!(
            target: "mesh_tetra::process",
            program = program,
            elapsed_ms = format!("{:.2}", elapsed_ms),
            "Mesher finished"
        );
    } else {
        warn!(
            target: "mesh_tetra::process",
            program = program,
            exit_code = ?exit_code,
            elapsed_ms = format!("{:.2}", elapsed_ms),
            "Mesher failed"
        );
    }
}

/// Log mesh statistics at debug level.
pub fn log_mesh_stats(mesh: &TetrahedralMesh, context: &str) {
    let (min_bounds, max_bounds) = mesh.bounds().unwrap_or_default();
    let dims = max_bounds - min_bounds;

    debug!(
        target: "mesh_tetra::mesh_state",
        context = context,
        points = mesh.point_count(),
        cells = mesh.cell_count(),
        tetras = mesh.tetra_count(),
        dimensions = format!("{:.2} x {:.2} x {:.2}", dims.x, dims.y, dims.z),
        "Mesh state"
    );
}

/// Log a file I/O operation.
pub fn log_io_operation(operation: &str, path: &Path, format: &str, success: bool) {
    if success {
        info!(
            target: "mesh_tetra::io",
            operation = operation,
            path = path.display().to_string(),
            format = format,
            "I/O operation completed"
        );
    } else {
        warn!(
            target: "mesh_tetra::io",
            operation = operation,
            path = path.display().to_string(),
            format = format,
            "I/O operation failed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_timer() {
        let timer = OperationTimer::new("test_operation");
        std::thread::sleep(std::time::Duration::from_millis(10));
        assert!(timer.elapsed_ms() >= 10.0);
    }

    #[test]
    fn test_log_helpers_do_not_panic() {
        let mesh = TetrahedralMesh::new();
        log_mesh_stats(&mesh, "test");
        log_process_exit("tetgen", None, false, 1.0);
        log_process_exit("tetgen", Some(0), false, 1.0);
        log_command(Path::new("/bin/true"), &["-k".to_string()]);
    }
}
