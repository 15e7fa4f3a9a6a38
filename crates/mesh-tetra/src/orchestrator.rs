//! Running meshing jobs end to end.
//!
//! [`Mesher::run`] drives one job through workspace creation, input staging,
//! executable resolution, the external process, output import and cleanup.
//! The same sequence serves both backends; only staging and import differ.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use tracing::{debug, info};

use crate::colors::LabelColorTable;
use crate::command::{Backend, MesherCommand};
use crate::config::MesherSettings;
use crate::error::TetraResult;
use crate::locate::ExecutableLocator;
use crate::progress::{CancelToken, EventSink, JobEvent, JobStage, JobStatus};
use crate::runner::ProcessRunner;
use crate::serialize::{self, PreparedLabelmap};
use crate::tracing_ext::{self, OperationTimer};
use crate::types::{PolygonSurface, TetrahedralMesh};
use crate::volume::LabelVolume;
use crate::vtk;
use crate::workspace::{self, CleanupPolicy, Workspace};

/// What a job meshes.
#[derive(Debug, Clone)]
pub enum MeshInput {
    /// Selected regions of a labelmap, by label value.
    LabelVolume { volume: LabelVolume, regions: Vec<u16> },
    /// A closed polygon surface. Surface backend only.
    Polygon(PolygonSurface),
}

/// One meshing request.
#[derive(Debug, Clone)]
pub struct MeshJob {
    pub backend: Backend,
    pub input: MeshInput,
    /// Leave the workspace on disk after the job.
    pub keep_temporary_files: bool,
    /// Forward mesher output as it arrives.
    pub show_detailed_log: bool,
    /// Executable for this job only, bypassing the search.
    pub executable: Option<PathBuf>,
}

impl MeshJob {
    pub fn new(backend: Backend, input: MeshInput) -> Self {
        Self {
            backend,
            input,
            keep_temporary_files: false,
            show_detailed_log: false,
            executable: None,
        }
    }

    pub fn keep_temporary_files(mut self, keep: bool) -> Self {
        self.keep_temporary_files = keep;
        self
    }

    pub fn show_detailed_log(mut self, show: bool) -> Self {
        self.show_detailed_log = show;
        self
    }

    pub fn with_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.executable = Some(path.into());
        self
    }

    /// Why this job has nothing to do, if so.
    fn skip_reason(&self) -> Option<String> {
        match (&self.backend, &self.input) {
            (_, MeshInput::LabelVolume { regions, .. }) if regions.is_empty() => {
                Some("No input regions are selected, nothing to mesh".to_string())
            }
            (Backend::Volumetric(_), MeshInput::Polygon(_)) => Some(
                "The volumetric mesher requires a labelmap input, a polygon surface was given"
                    .to_string(),
            ),
            _ => None,
        }
    }
}

/// A successfully imported mesh.
#[derive(Debug, Clone)]
pub struct MeshOutput {
    /// Tetrahedral mesh in the input's physical frame.
    pub mesh: TetrahedralMesh,
    /// Region colors, volumetric jobs only.
    pub color_table: Option<LabelColorTable>,
    /// Input label and the label it carries in the mesh, volumetric jobs
    /// only.
    pub label_map: Vec<(u16, u16)>,
    /// Background cells stripped from the mesh.
    pub removed_background_cells: usize,
}

/// How a job ended, when it did not fail.
#[derive(Debug, Clone)]
pub enum JobOutcome {
    Completed(MeshOutput),
    Cancelled,
    /// The job had nothing to do and started no process.
    Skipped { reason: String },
}

/// Everything known about a finished job.
#[derive(Debug, Clone)]
pub struct JobReport {
    pub outcome: JobOutcome,
    pub status: JobStatus,
    /// Workspace directory, if one was created. Only still on disk when the
    /// job kept its temporary files.
    pub workspace: Option<PathBuf>,
    /// User-facing log lines of the job.
    pub log: Vec<String>,
    pub elapsed: Duration,
}

impl JobReport {
    pub fn mesh(&self) -> Option<&TetrahedralMesh> {
        match &self.outcome {
            JobOutcome::Completed(output) => Some(&output.mesh),
            _ => None,
        }
    }

    pub fn into_output(self) -> Option<MeshOutput> {
        match self.outcome {
            JobOutcome::Completed(output) => Some(output),
            _ => None,
        }
    }
}

/// Runtime state of the job in flight.
#[derive(Debug)]
struct JobExecution {
    workspace: Workspace,
    status: JobStatus,
    started: Instant,
}

/// Runs meshing jobs, one at a time.
///
/// `run` takes `&mut self`, so a mesher never has two jobs in flight. Use
/// [`cancel_token`](Self::cancel_token) to stop a job from another thread
/// and [`subscribe`](Self::subscribe) to follow its events.
#[derive(Debug)]
pub struct Mesher {
    cleaver: ExecutableLocator,
    tetgen: ExecutableLocator,
    sink: EventSink,
    cancel: CancelToken,
    workspace_base: PathBuf,
    keep_temporary_files: bool,
    show_detailed_log: bool,
    last_log: Vec<String>,
}

impl Default for Mesher {
    fn default() -> Self {
        Self::new()
    }
}

impl Mesher {
    pub fn new() -> Self {
        Self {
            cleaver: ExecutableLocator::cleaver(),
            tetgen: ExecutableLocator::tetgen(),
            sink: EventSink::default(),
            cancel: CancelToken::new(),
            workspace_base: workspace::default_base_dir(),
            keep_temporary_files: false,
            show_detailed_log: false,
            last_log: Vec::new(),
        }
    }

    /// Mesher configured from persisted settings: executable paths,
    /// workspace location and the flags new jobs start with.
    pub fn from_settings(settings: &MesherSettings) -> Self {
        let mut mesher = Self::new();
        mesher.set_cleaver_path(settings.executables.cleaver.clone());
        mesher.set_tetgen_path(settings.executables.tetgen.clone());
        if let Some(base) = &settings.workspace_base {
            mesher.workspace_base = base.clone();
        }
        mesher.keep_temporary_files = settings.keep_temporary_files;
        mesher.show_detailed_log = settings.show_detailed_log;
        mesher
    }

    /// A job carrying this mesher's default flags.
    pub fn job(&self, backend: Backend, input: MeshInput) -> MeshJob {
        MeshJob::new(backend, input)
            .keep_temporary_files(self.keep_temporary_files)
            .show_detailed_log(self.show_detailed_log)
    }

    /// Start a new event subscription. Replaces any previous subscriber.
    pub fn subscribe(&mut self) -> Receiver<JobEvent> {
        let (sink, receiver) = EventSink::channel();
        self.sink = sink;
        receiver
    }

    /// Handle for cancelling the current (or next) job from any thread.
    /// The flag is cleared when a job starts.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn workspace_base(&self) -> &Path {
        &self.workspace_base
    }

    pub fn set_workspace_base(&mut self, base: impl Into<PathBuf>) {
        self.workspace_base = base.into();
    }

    pub fn set_cleaver_path(&mut self, path: Option<PathBuf>) {
        self.cleaver.set_custom_path(path);
    }

    pub fn set_tetgen_path(&mut self, path: Option<PathBuf>) {
        self.tetgen.set_custom_path(path);
    }

    /// Search both executables relative to `root` instead of the running
    /// executable's directory.
    pub fn set_search_root(&mut self, root: Option<PathBuf>) {
        self.cleaver.set_search_root(root.clone());
        self.tetgen.set_search_root(root);
    }

    pub fn locator(&self, backend: &Backend) -> &ExecutableLocator {
        match backend {
            Backend::Volumetric(_) => &self.cleaver,
            Backend::Surface(_) => &self.tetgen,
        }
    }

    /// Resolve the executable a backend would run.
    pub fn resolve_executable(&mut self, backend: &Backend) -> TetraResult<PathBuf> {
        match backend {
            Backend::Volumetric(_) => self.cleaver.resolve(),
            Backend::Surface(_) => self.tetgen.resolve(),
        }
    }

    /// Log lines of the most recent job, including a failed one.
    pub fn last_log(&self) -> &[String] {
        &self.last_log
    }

    /// Run a job to completion, cancellation or failure.
    ///
    /// Skipped and cancelled jobs are `Ok`. Once a workspace exists it is
    /// cleaned up on every path unless the job keeps its temporary files;
    /// a failed cleanup is logged as a warning.
    pub fn run(&mut self, job: &MeshJob) -> TetraResult<JobReport> {
        self.cancel.reset();
        self.sink.start_clock();
        self.sink.take_transcript();
        let started = Instant::now();
        let _timer = OperationTimer::for_backend("mesh_job", job.backend.name());

        self.sink.status(JobStatus::Pending);
        self.sink.stage(JobStage::Preparing, "Checking job parameters");

        if let Some(reason) = job.skip_reason() {
            self.sink.log(reason.clone());
            return Ok(self.finish_report(
                JobOutcome::Skipped { reason },
                JobStatus::Succeeded,
                None,
                started,
            ));
        }

        if let Err(e) = job.backend.validate() {
            self.sink.status(JobStatus::Failed);
            self.last_log = self.sink.take_transcript();
            return Err(e);
        }

        let workspace = match Workspace::create(&self.workspace_base) {
            Ok(ws) => ws,
            Err(e) => {
                self.sink.status(JobStatus::Failed);
                self.last_log = self.sink.take_transcript();
                return Err(e);
            }
        };
        tracing_ext::log_job_start(
            job.backend.name(),
            workspace.path(),
            job.keep_temporary_files,
        );
        self.sink.log(format!(
            "Mesh generation using {} started in working directory: {}",
            job.backend.name(),
            workspace.path().display()
        ));

        let mut execution = JobExecution {
            workspace,
            status: JobStatus::Running,
            started,
        };
        self.sink.status(execution.status);

        let result = self.execute(job, &execution.workspace);

        execution.status = match &result {
            Ok(JobOutcome::Completed(_)) => JobStatus::Succeeded,
            Ok(JobOutcome::Cancelled) => JobStatus::Cancelled,
            Ok(JobOutcome::Skipped { .. }) => JobStatus::Succeeded,
            Err(_) => JobStatus::Failed,
        };
        if let Err(e) = &result {
            self.sink.log(format!("Mesh generation failed: {}", e));
        }

        self.sink.stage(JobStage::CleaningUp, "Cleaning up");
        let workspace_path = execution.workspace.path().to_path_buf();
        if let Some(warning) = execution
            .workspace
            .finish(CleanupPolicy::from_keep_flag(job.keep_temporary_files))
        {
            self.sink.warn(warning);
        }

        match result {
            Ok(outcome) => {
                if matches!(outcome, JobOutcome::Completed(_)) {
                    self.sink.log("Model generation is completed");
                }
                Ok(self.finish_report(
                    outcome,
                    execution.status,
                    Some(workspace_path),
                    execution.started,
                ))
            }
            Err(e) => {
                self.sink.status(execution.status);
                self.last_log = self.sink.take_transcript();
                Err(e)
            }
        }
    }

    fn finish_report(
        &mut self,
        outcome: JobOutcome,
        status: JobStatus,
        workspace: Option<PathBuf>,
        started: Instant,
    ) -> JobReport {
        self.sink.stage(JobStage::Finished, status.to_string());
        self.sink.status(status);
        let log = self.sink.take_transcript();
        self.last_log = log.clone();
        JobReport {
            outcome,
            status,
            workspace,
            log,
            elapsed: started.elapsed(),
        }
    }

    /// Stage, run and import inside an existing workspace.
    fn execute(&mut self, job: &MeshJob, workspace: &Workspace) -> TetraResult<JobOutcome> {
        self.sink.stage(JobStage::Serializing, "Writing mesher input");
        let mut prepared: Option<PreparedLabelmap> = None;
        let input_path = match (&job.backend, &job.input) {
            (Backend::Volumetric(params), MeshInput::LabelVolume { volume, regions }) => {
                let labelmap =
                    serialize::prepare_labelmap(volume, regions, params.padding_percent)?;
                let path = serialize::stage_labelmap(&labelmap, workspace)?;
                prepared = Some(labelmap);
                path
            }
            (Backend::Surface(_), MeshInput::LabelVolume { volume, regions }) => {
                serialize::stage_region_surfaces(volume, regions, workspace)?
            }
            (Backend::Surface(_), MeshInput::Polygon(surface)) => {
                serialize::stage_surface(surface, workspace)?
            }
            (Backend::Volumetric(_), MeshInput::Polygon(_)) => {
                return Ok(JobOutcome::Skipped {
                    reason: "polygon input for the volumetric mesher".to_string(),
                });
            }
        };
        tracing_ext::log_io_operation("stage", &input_path, "input", true);

        let program = match &job.executable {
            Some(path) => {
                let mut locator = self.locator(&job.backend).clone();
                locator.set_custom_path(Some(path.clone()));
                locator.resolve()?
            }
            None => self.resolve_executable(&job.backend)?,
        };
        let command = MesherCommand::new(
            program,
            job.backend.arguments(&input_path, workspace.path()),
        );

        let kind = match job.backend {
            Backend::Volumetric(_) => "volumetric",
            Backend::Surface(_) => "surface",
        };
        self.sink
            .stage(JobStage::Meshing, format!("Generating {} mesh", kind));
        self.sink.log(format!("Generating {} mesh...", kind));

        let runner = ProcessRunner::new(job.show_detailed_log);
        let report = runner.run(&command, &self.cancel, &self.sink)?;
        if report.is_cancelled() {
            self.sink.log("Mesh generation was cancelled");
            return Ok(JobOutcome::Cancelled);
        }
        debug!(
            target: "mesh_tetra::job",
            lines = report.output.len(),
            elapsed_ms = report.elapsed.as_secs_f64() * 1000.0,
            "Mesher finished"
        );

        self.sink.stage(JobStage::Importing, "Reading mesher output");
        let output_path = workspace.file(job.backend.output_file_name());
        let mut mesh = vtk::read_unstructured_grid(&output_path)?;
        tracing_ext::log_mesh_stats(&mesh, "imported");

        let output = match (&job.backend, prepared) {
            (Backend::Volumetric(params), Some(labelmap)) => {
                labelmap.frame.apply(&mut mesh);
                let removed = if params.remove_background {
                    mesh.remove_background()
                } else {
                    0
                };
                if removed > 0 {
                    info!(target: "mesh_tetra::job", cells = removed, "Removed background cells");
                }
                let table = LabelColorTable::from_regions(&labelmap.volume.regions);
                table.attach_to(&mut mesh);
                MeshOutput {
                    mesh,
                    color_table: Some(table),
                    label_map: labelmap.label_map,
                    removed_background_cells: removed,
                }
            }
            _ => MeshOutput {
                mesh,
                color_table: None,
                label_map: Vec::new(),
                removed_background_cells: 0,
            },
        };
        tracing_ext::log_mesh_stats(&output.mesh, "result");

        Ok(JobOutcome::Completed(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{CleaverParams, TetGenParams};
    use crate::error::TetraError;
    use crate::volume::VolumeGeometry;

    fn volume() -> LabelVolume {
        let mut volume = LabelVolume::zeros(VolumeGeometry::identity([6, 6, 6])).unwrap();
        volume.fill_box([1, 1, 1], [4, 4, 4], 1);
        volume
    }

    fn entries(dir: &Path) -> usize {
        std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
    }

    #[test]
    fn test_empty_selection_is_skipped() {
        let base = tempfile::tempdir().unwrap();
        let mut mesher = Mesher::new();
        mesher.set_workspace_base(base.path());
        let events = mesher.subscribe();

        let job = MeshJob::new(
            Backend::Volumetric(CleaverParams::default()),
            MeshInput::LabelVolume {
                volume: volume(),
                regions: vec![],
            },
        );
        let report = mesher.run(&job).unwrap();

        assert!(matches!(report.outcome, JobOutcome::Skipped { .. }));
        assert!(report.workspace.is_none());
        assert_eq!(entries(base.path()), 0);
        assert_eq!(report.log.len(), 1);
        assert!(
            events
                .try_iter()
                .any(|e| matches!(e, JobEvent::Status(JobStatus::Succeeded)))
        );
    }

    #[test]
    fn test_polygon_input_to_volumetric_is_skipped() {
        let mut mesher = Mesher::new();
        let job = MeshJob::new(
            Backend::Volumetric(CleaverParams::default()),
            MeshInput::Polygon(PolygonSurface::new()),
        );
        let report = mesher.run(&job).unwrap();
        assert!(matches!(report.outcome, JobOutcome::Skipped { .. }));
        assert!(report.mesh().is_none());
    }

    #[test]
    fn test_invalid_parameters_fail_before_workspace() {
        let base = tempfile::tempdir().unwrap();
        let mut mesher = Mesher::new();
        mesher.set_workspace_base(base.path());
        let params = TetGenParams {
            ratio: -1.0,
            ..Default::default()
        };
        let job = MeshJob::new(
            Backend::Surface(params),
            MeshInput::LabelVolume {
                volume: volume(),
                regions: vec![1],
            },
        );
        let err = mesher.run(&job).unwrap_err();
        assert!(matches!(err, TetraError::InvalidParameter { .. }));
        assert_eq!(entries(base.path()), 0);
    }

    #[test]
    fn test_missing_executable_cleans_workspace() {
        let base = tempfile::tempdir().unwrap();
        let empty_root = tempfile::tempdir().unwrap();
        let mut mesher = Mesher::new();
        mesher.set_workspace_base(base.path());
        mesher.set_search_root(Some(empty_root.path().join("a/b/c/d")));

        let job = MeshJob::new(
            Backend::Volumetric(CleaverParams::default()),
            MeshInput::LabelVolume {
                volume: volume(),
                regions: vec![1],
            },
        );
        let err = mesher.run(&job).unwrap_err();
        assert!(matches!(err, TetraError::ExecutableNotFound { .. }));
        assert_eq!(entries(base.path()), 0);
        assert!(mesher.last_log().iter().any(|l| l.contains("failed")));
    }

    #[test]
    fn test_unknown_region_keeps_workspace_when_asked() {
        let base = tempfile::tempdir().unwrap();
        let mut mesher = Mesher::new();
        mesher.set_workspace_base(base.path());
        let job = MeshJob::new(
            Backend::Volumetric(CleaverParams::default()),
            MeshInput::LabelVolume {
                volume: volume(),
                regions: vec![42],
            },
        )
        .keep_temporary_files(true);
        let err = mesher.run(&job).unwrap_err();
        assert!(matches!(err, TetraError::UnknownRegion { label: 42 }));
        assert_eq!(entries(base.path()), 1);
    }

    #[test]
    fn test_from_settings_seeds_jobs() {
        let mut settings = MesherSettings::default();
        settings.keep_temporary_files = true;
        settings.executables.tetgen = Some(PathBuf::from("/opt/tetgen"));
        let mesher = Mesher::from_settings(&settings);

        let job = mesher.job(
            Backend::Surface(TetGenParams::default()),
            MeshInput::Polygon(PolygonSurface::new()),
        );
        assert!(job.keep_temporary_files);
        assert!(!job.show_detailed_log);
        assert_eq!(
            mesher
                .locator(&Backend::Surface(TetGenParams::default()))
                .custom_path(),
            Some(Path::new("/opt/tetgen"))
        );
    }
}
