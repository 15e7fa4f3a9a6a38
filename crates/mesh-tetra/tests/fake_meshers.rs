//! End-to-end jobs against stand-in mesher executables.
//!
//! Each test writes a small shell script that behaves like Cleaver or TetGen
//! as far as files and exit codes go, then runs a full job through it.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use approx::assert_relative_eq;
use mesh_tetra::{
    Backend, CleaverParams, JobEvent, JobOutcome, JobStatus, LabelColorTable, LabelVolume,
    MeshInput, MeshJob, Mesher, PolygonSurface, Region, TetGenParams, TetraError,
    TetrahedralMesh, VolumeGeometry,
};
use nalgebra::Point3;
use tempfile::TempDir;

// Writing an executable while another test thread forks can fail the exec
// with ETXTBSY, so these tests run one at a time.
static SERIAL: Mutex<()> = Mutex::new(());

fn serial() -> std::sync::MutexGuard<'static, ()> {
    SERIAL.lock().unwrap_or_else(|e| e.into_inner())
}

/// Two tetrahedra sharing a face; the second one is background.
const LABELED_GRID: &str = "# vtk DataFile Version 3.0
cleaver output
ASCII
DATASET UNSTRUCTURED_GRID
POINTS 5 float
0 0 0
1 0 0
0 1 0
0 0 1
1 1 1
CELLS 2 10
4 0 1 2 3
4 1 2 3 4
CELL_TYPES 2
10
10
CELL_DATA 2
SCALARS labels int 1
LOOKUP_TABLE default
1
0
";

/// A single tetrahedron, as TetGen writes it.
const PLAIN_GRID: &str = "# vtk DataFile Version 2.0
Unstructured Grid
ASCII
DATASET UNSTRUCTURED_GRID
POINTS 4 double
0 0 0
2 0 0
0 2 0
0 0 2

CELLS 1 5
4 0 1 2 3

CELL_TYPES 1
10
";

struct Fixture {
    _dir: TempDir,
    scripts: PathBuf,
    base: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let scripts = dir.path().join("bin");
        let base = dir.path().join("work");
        std::fs::create_dir_all(&scripts).unwrap();
        Self {
            _dir: dir,
            scripts,
            base,
        }
    }

    fn script(&self, name: &str, body: &str) -> PathBuf {
        let path = self.scripts.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    /// Stand-in for `cleaver-cli` that writes `grid` into `--output_path`.
    fn cleaver(&self, grid: &str, exit_code: i32) -> PathBuf {
        self.script(
            "cleaver-cli",
            &format!(
                r#"out=""
while [ $# -gt 0 ]; do
  if [ "$1" = "--output_path" ]; then out="$2"; shift; fi
  shift
done
echo "Material 1 loaded"
echo "Creating octree" >&2
cat > "${{out}}output.vtk" <<'GRID'
{grid}GRID
exit {exit_code}
"#
            ),
        )
    }

    /// Stand-in for `tetgen` that records its arguments and writes
    /// `mesh.1.vtk` next to its input.
    fn tetgen(&self) -> PathBuf {
        self.script(
            "tetgen",
            &format!(
                r#"dir=$(dirname "$2")
printf '%s\n' "$@" > "$dir/args.txt"
echo "Delaunizing vertices..."
cat > "$dir/mesh.1.vtk" <<'GRID'
{PLAIN_GRID}GRID
"#
            ),
        )
    }

    fn mesher(&self) -> Mesher {
        let mut mesher = Mesher::new();
        mesher.set_workspace_base(&self.base);
        mesher.set_search_root(Some(self.scripts.join("missing")));
        mesher
    }

    fn workspaces(&self) -> usize {
        std::fs::read_dir(&self.base).map(|d| d.count()).unwrap_or(0)
    }
}

/// 10³ identity volume with region 4 ("liver") in the middle.
fn liver_volume() -> LabelVolume {
    let mut volume = LabelVolume::zeros(VolumeGeometry::identity([10, 10, 10]))
        .unwrap()
        .with_regions(vec![Region::new(4, "liver").with_color([0.8, 0.3, 0.2])]);
    volume.fill_box([2, 2, 2], [7, 7, 7], 4);
    volume
}

fn volumetric_job(executable: &Path) -> MeshJob {
    MeshJob::new(
        Backend::Volumetric(CleaverParams::default()),
        MeshInput::LabelVolume {
            volume: liver_volume(),
            regions: vec![4],
        },
    )
    .with_executable(executable)
}

fn log_events(events: &crossbeam_channel::Receiver<JobEvent>) -> Vec<String> {
    events
        .try_iter()
        .filter_map(|e| match e {
            JobEvent::Log(line) => Some(line),
            _ => None,
        })
        .collect()
}

#[test]
fn volumetric_job_imports_corrected_mesh() {
    let _guard = serial();
    let fx = Fixture::new();
    let cleaver = fx.cleaver(LABELED_GRID, 0);
    let mut mesher = fx.mesher();

    let report = mesher.run(&volumetric_job(&cleaver)).unwrap();
    assert_eq!(report.status, JobStatus::Succeeded);
    assert!(
        report
            .log
            .iter()
            .any(|l| l == "Model generation is completed")
    );

    let output = report.into_output().unwrap();
    assert_eq!(output.label_map, vec![(4, 1)]);
    assert_eq!(output.removed_background_cells, 1);

    let mesh = &output.mesh;
    assert_eq!(mesh.cell_count(), 1);
    assert_eq!(mesh.point_count(), 4);
    assert!(mesh.first_invalid_reference().is_none());
    assert_eq!(mesh.cell_labels(), Some(vec![1]));

    // Padding is one voxel per side, so the written volume starts at index
    // -1 and mesher (0, 0, 0) is the lower corner of that voxel.
    assert_relative_eq!(mesh.points[0], Point3::new(-1.5, -1.5, -1.5), epsilon = 1e-12);
    assert_relative_eq!(mesh.points[1], Point3::new(-0.5, -1.5, -1.5), epsilon = 1e-12);

    let table = output.color_table.unwrap();
    assert_eq!(table.get(1).unwrap().name, "liver");
    assert!(mesh.cell_array(LabelColorTable::LOOKUP_TABLE_NAME).is_some());

    assert_eq!(fx.workspaces(), 0);
}

#[test]
fn volumetric_job_can_keep_background() {
    let _guard = serial();
    let fx = Fixture::new();
    let cleaver = fx.cleaver(LABELED_GRID, 0);
    let mut mesher = fx.mesher();

    let job = MeshJob::new(
        Backend::Volumetric(CleaverParams {
            remove_background: false,
            padding_percent: 0,
            ..Default::default()
        }),
        MeshInput::LabelVolume {
            volume: liver_volume(),
            regions: vec![4],
        },
    )
    .with_executable(&cleaver);
    let report = mesher.run(&job).unwrap();
    let mesh = report.mesh().unwrap();
    assert_eq!(mesh.cell_count(), 2);
    assert_eq!(mesh.cell_labels(), Some(vec![1, 0]));
    assert_relative_eq!(mesh.points[0], Point3::new(-0.5, -0.5, -0.5), epsilon = 1e-12);
}

#[test]
fn staged_labelmap_and_arguments_are_kept_when_asked() {
    let _guard = serial();
    let fx = Fixture::new();
    let cleaver = fx.script(
        "cleaver-cli",
        &format!(
            r#"out=""
for arg in "$@"; do
  if [ "$prev" = "--output_path" ]; then out="$arg"; fi
  prev="$arg"
done
printf '%s\n' "$@" > "${{out}}args.txt"
cat > "${{out}}output.vtk" <<'GRID'
{LABELED_GRID}GRID
"#
        ),
    );
    let mut mesher = fx.mesher();
    let job = MeshJob::new(
        Backend::Volumetric(CleaverParams {
            additional_arguments: "--alpha 0.4".into(),
            ..Default::default()
        }),
        MeshInput::LabelVolume {
            volume: liver_volume(),
            regions: vec![4],
        },
    )
    .with_executable(&cleaver)
    .keep_temporary_files(true);

    let report = mesher.run(&job).unwrap();
    let workspace = report.workspace.clone().unwrap();
    assert!(workspace.join("input_labelmap.nrrd").is_file());
    assert!(workspace.join("output.vtk").is_file());

    let args = std::fs::read_to_string(workspace.join("args.txt")).unwrap();
    let args: Vec<&str> = args.lines().collect();
    assert_eq!(args[0], "--input_files");
    assert!(args[1].ends_with("input_labelmap.nrrd"));
    assert_eq!(&args[2..4], &["--feature_scaling", "2.00"]);
    assert_eq!(&args[args.len() - 2..], &["--alpha", "0.4"]);

    let staged = mesh_tetra::nrrd::read_labelmap(&workspace.join("input_labelmap.nrrd")).unwrap();
    assert_eq!(staged.geometry.dims, [12, 12, 12]);
    assert_eq!(staged.present_labels(), vec![1]);
    assert_eq!(fx.workspaces(), 1);
}

#[test]
fn surface_job_from_polygons() {
    let _guard = serial();
    let fx = Fixture::new();
    let tetgen = fx.tetgen();
    let mut mesher = fx.mesher();
    mesher.set_tetgen_path(Some(tetgen));

    let mut surface = PolygonSurface::new();
    surface.points = vec![
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(2.0, 0.0, 0.0),
        Point3::new(0.0, 2.0, 0.0),
        Point3::new(0.0, 0.0, 2.0),
    ];
    surface.polygons = vec![vec![0, 2, 1], vec![0, 1, 3], vec![1, 2, 3], vec![0, 3, 2]];

    let job = MeshJob::new(
        Backend::Surface(TetGenParams::default()),
        MeshInput::Polygon(surface),
    )
    .keep_temporary_files(true);
    let report = mesher.run(&job).unwrap();

    let mesh = report.mesh().unwrap();
    assert_eq!(mesh.tetra_count(), 1);
    assert!(mesh.first_invalid_reference().is_none());

    let workspace = report.workspace.clone().unwrap();
    assert!(workspace.join("mesh.ply").is_file());
    let args = std::fs::read_to_string(workspace.join("args.txt")).unwrap();
    let args: Vec<&str> = args.lines().collect();
    assert_eq!(args[0], "-kq5.00/0.00a10.00");
    assert!(args[1].ends_with("mesh.ply"));
}

#[test]
fn surface_job_from_labelmap_regions() {
    let _guard = serial();
    let fx = Fixture::new();
    let tetgen = fx.tetgen();
    let mut mesher = fx.mesher();

    let job = MeshJob::new(
        Backend::Surface(TetGenParams {
            additional_arguments: "Y".into(),
            ..Default::default()
        }),
        MeshInput::LabelVolume {
            volume: liver_volume(),
            regions: vec![4],
        },
    )
    .with_executable(&tetgen)
    .keep_temporary_files(true);
    let report = mesher.run(&job).unwrap();
    assert!(matches!(report.outcome, JobOutcome::Completed(_)));

    let workspace = report.workspace.clone().unwrap();
    let staged = mesh_tetra::ply::read(&workspace.join("mesh.ply")).unwrap();
    assert!(staged.polygon_count() > 0);
    let (min, max) = staged.bounds().unwrap();
    assert!(min.x >= 1.0 && max.x <= 8.0);

    let args = std::fs::read_to_string(workspace.join("args.txt")).unwrap();
    assert!(args.starts_with("-kq5.00/0.00a10.00Y\n"));
}

#[test]
fn failed_mesher_surfaces_its_output() {
    let _guard = serial();
    let fx = Fixture::new();
    let cleaver = fx.cleaver(LABELED_GRID, 3);
    let mut mesher = fx.mesher();
    let events = mesher.subscribe();

    let err = mesher.run(&volumetric_job(&cleaver)).unwrap_err();
    assert!(matches!(
        err,
        TetraError::ProcessFailed {
            exit_code: Some(3),
            ..
        }
    ));

    let logs = log_events(&events).join("\n");
    assert!(logs.contains("Material 1 loaded"));
    assert!(logs.contains("Creating octree"));
    assert!(
        mesher
            .last_log()
            .iter()
            .any(|l| l.contains("Material 1 loaded"))
    );
    assert_eq!(fx.workspaces(), 0);
}

#[test]
fn detailed_log_streams_mesher_output() {
    let _guard = serial();
    let fx = Fixture::new();
    let cleaver = fx.cleaver(LABELED_GRID, 0);
    let mut mesher = fx.mesher();
    let events = mesher.subscribe();

    mesher
        .run(&volumetric_job(&cleaver).show_detailed_log(true))
        .unwrap();
    let lines: Vec<String> = events
        .try_iter()
        .filter_map(|e| match e {
            JobEvent::ProcessOutput(line) => Some(line),
            _ => None,
        })
        .collect();
    assert!(lines.contains(&"Material 1 loaded".to_string()));
    assert!(lines.contains(&"Creating octree".to_string()));
}

#[test]
fn cancelling_stops_a_running_mesher() {
    let _guard = serial();
    let fx = Fixture::new();
    let slow = fx.script("cleaver-cli", "echo started\nexec sleep 30\n");
    let mut mesher = fx.mesher();
    let events = mesher.subscribe();
    let cancel = mesher.cancel_token();

    let trigger = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(300));
        cancel.cancel();
    });
    let started = Instant::now();
    let report = mesher.run(&volumetric_job(&slow)).unwrap();
    trigger.join().unwrap();

    assert!(matches!(report.outcome, JobOutcome::Cancelled));
    assert_eq!(report.status, JobStatus::Cancelled);
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(
        events
            .try_iter()
            .any(|e| matches!(e, JobEvent::Status(JobStatus::Cancelled)))
    );
    assert_eq!(fx.workspaces(), 0);
}

#[test]
fn cancel_flag_is_cleared_for_the_next_job() {
    let _guard = serial();
    let fx = Fixture::new();
    let cleaver = fx.cleaver(LABELED_GRID, 0);
    let mut mesher = fx.mesher();

    mesher.cancel_token().cancel();
    let report = mesher.run(&volumetric_job(&cleaver)).unwrap();
    assert!(matches!(report.outcome, JobOutcome::Completed(_)));
}

#[test]
fn missing_output_is_an_io_error() {
    let _guard = serial();
    let fx = Fixture::new();
    let silent = fx.script("cleaver-cli", "echo done\n");
    let mut mesher = fx.mesher();

    let err = mesher.run(&volumetric_job(&silent)).unwrap_err();
    assert!(matches!(err, TetraError::IoRead { .. }));
    assert_eq!(fx.workspaces(), 0);
}

#[test]
fn executable_found_next_to_search_root() {
    let _guard = serial();
    let fx = Fixture::new();
    fx.cleaver(LABELED_GRID, 0);
    let mut mesher = fx.mesher();
    // `<root>/..` is the first candidate directory
    let root = fx.scripts.join("lib");
    std::fs::create_dir(&root).unwrap();
    mesher.set_search_root(Some(root));

    let backend = Backend::Volumetric(CleaverParams::default());
    let found = mesher.resolve_executable(&backend).unwrap();
    assert!(found.ends_with("cleaver-cli"));

    let job = MeshJob::new(
        backend,
        MeshInput::LabelVolume {
            volume: liver_volume(),
            regions: vec![4],
        },
    );
    let report = mesher.run(&job).unwrap();
    let mesh: &TetrahedralMesh = report.mesh().unwrap();
    assert_eq!(mesh.cell_count(), 1);
}
