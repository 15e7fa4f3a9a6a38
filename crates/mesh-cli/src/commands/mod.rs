//! CLI command implementations.

pub mod info;
pub mod locate;
pub mod surface;
pub mod volume;

use std::path::Path;

use anyhow::{Context, Result, bail};
use colored::Colorize;
use mesh_tetra::{
    CancelToken, JobEvent, JobOutcome, JobReport, MeshJob, Mesher, MesherSettings, vtk,
};
use serde::Serialize;
use tracing::debug;

use crate::{Cli, JobArgs, OutputFormat, output};

#[derive(Serialize)]
pub struct JobSummary {
    pub backend: &'static str,
    pub input: String,
    pub output: Option<String>,
    pub status: String,
    pub points: usize,
    pub cells: usize,
    pub tetrahedra: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removed_background_cells: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,
    pub elapsed_ms: f64,
    pub log: Vec<String>,
}

/// Mesher configured from settings and the shared job flags.
pub fn mesher_for(settings: &MesherSettings, args: &JobArgs) -> Mesher {
    let mut mesher = Mesher::from_settings(settings);
    if let Some(base) = &args.workspace {
        mesher.set_workspace_base(base);
    }
    mesher
}

/// Apply the shared job flags on top of the mesher defaults.
pub fn apply_job_args(job: MeshJob, args: &JobArgs) -> MeshJob {
    let keep = job.keep_temporary_files || args.keep_temp;
    let show = job.show_detailed_log || args.show_log;
    job.keep_temporary_files(keep).show_detailed_log(show)
}

/// Ctrl-C handler: request cooperative cancellation so the running job
/// reaps its mesher and removes its workspace before the CLI exits.
fn interrupt_handler(cancel: CancelToken) -> impl Fn() + Send + 'static {
    move || {
        if !cancel.is_cancelled() {
            eprintln!("{}", "Interrupted, cancelling mesh generation...".yellow());
        }
        cancel.cancel();
    }
}

/// Run a job while echoing its events, write the result and report it.
pub fn run_job(
    mut mesher: Mesher,
    job: MeshJob,
    input: &Path,
    output_path: &Path,
    cli: &Cli,
) -> Result<()> {
    debug!(
        backend = job.backend.name(),
        input = %input.display(),
        workspace_base = %mesher.workspace_base().display(),
        "Starting mesh job"
    );
    if let Err(e) = ctrlc::set_handler(interrupt_handler(mesher.cancel_token())) {
        debug!(error = %e, "Ctrl-C handler not installed");
    }
    let events = mesher.subscribe();
    let echo = !cli.quiet && matches!(cli.format, OutputFormat::Text);
    let printer = std::thread::spawn(move || {
        for event in events {
            if !echo {
                continue;
            }
            match event {
                JobEvent::Log(line) => eprintln!("{}", line.dimmed()),
                JobEvent::ProcessOutput(line) => eprintln!("  {} {}", "│".dimmed(), line),
                JobEvent::Progress(p) => {
                    eprintln!("{} {}", format!("[{:>3}%]", p.percent()).cyan(), p.message)
                }
                JobEvent::Status(_) => {}
            }
        }
    });

    let result = mesher.run(&job);
    // Dropping the mesher closes the event channel and ends the printer
    drop(mesher);
    if printer.join().is_err() {
        output::warn("event printer thread panicked", cli.quiet);
    }
    let report = result.context("Mesh generation failed")?;

    let saved = match &report.outcome {
        JobOutcome::Completed(result) => {
            vtk::write_unstructured_grid(&result.mesh, output_path).with_context(|| {
                format!("Failed to save mesh to {:?}", output_path)
            })?;
            Some(output_path.display().to_string())
        }
        JobOutcome::Skipped { reason } => {
            output::warn(reason, cli.quiet);
            None
        }
        JobOutcome::Cancelled => bail!("Mesh generation was cancelled"),
    };

    let summary = summarize(&report, job.backend.name(), input, saved);
    match cli.format {
        OutputFormat::Json => output::print(&summary, cli.format, cli.quiet),
        OutputFormat::Text => print_summary(&summary, cli),
    }
    Ok(())
}

fn summarize(
    report: &JobReport,
    backend: &'static str,
    input: &Path,
    output: Option<String>,
) -> JobSummary {
    let (points, cells, tetrahedra, removed) = match &report.outcome {
        JobOutcome::Completed(result) => (
            result.mesh.point_count(),
            result.mesh.cell_count(),
            result.mesh.tetra_count(),
            result.color_table.as_ref().map(|_| result.removed_background_cells),
        ),
        _ => (0, 0, 0, None),
    };
    JobSummary {
        backend,
        input: input.display().to_string(),
        output,
        status: report.status.to_string(),
        points,
        cells,
        tetrahedra,
        removed_background_cells: removed,
        workspace: report
            .workspace
            .as_ref()
            .filter(|p| p.exists())
            .map(|p| p.display().to_string()),
        elapsed_ms: report.elapsed.as_secs_f64() * 1000.0,
        log: report.log.clone(),
    }
}

fn print_summary(summary: &JobSummary, cli: &Cli) {
    let Some(path) = &summary.output else {
        return;
    };
    output::success(&format!("Mesh saved to {}", path), cli.format, cli.quiet);
    if cli.quiet {
        return;
    }
    println!("  {}: {}", "Mesher".cyan(), summary.backend);
    println!("  {}: {}", "Points".cyan(), summary.points);
    println!(
        "  {}: {} ({} tetrahedra)",
        "Cells".cyan(),
        summary.cells,
        summary.tetrahedra
    );
    if let Some(removed) = summary.removed_background_cells {
        if removed > 0 {
            println!("  {}: {} background cells removed", "Cleanup".green(), removed);
        }
    }
    if let Some(ws) = &summary.workspace {
        println!("  {}: {}", "Working directory".cyan(), ws);
    }
    println!("  {}: {:.1} s", "Time".cyan(), summary.elapsed_ms / 1000.0);
}
