//! Tetrahedral meshing of labelmaps and closed surfaces through external
//! mesh generators.
//!
//! Two generators are supported, each as a [`Backend`] variant:
//!
//! - **Cleaver** (`cleaver-cli`): multi-material labelmap in, conforming
//!   tetrahedral mesh out. Selected regions are merged into one padded
//!   labelmap and every cell of the result carries its region label.
//! - **TetGen** (`tetgen`): closed polygon surface in, constrained Delaunay
//!   tetrahedralization out. Labelmap regions can be used as input; their
//!   boundaries are extracted first.
//!
//! The crate stages the input in a scratch directory, runs the generator with
//! streamed output and cancellation, reads the legacy VTK result back and
//! puts it in the input's physical frame.
//!
//! # Coordinate System
//!
//! Labelmap geometry follows the usual medical imaging convention: a voxel
//! index `(i, j, k)` maps to `origin + direction * (spacing ∘ (i, j, k))`,
//! in RAS. Cleaver places voxel centers at `i + 0.5`, so its output is
//! shifted back by half a voxel before the index-to-physical transform is
//! applied. The applied matrix is kept on the mesh
//! ([`TetrahedralMesh::applied_transform`]).
//!
//! # Quick Start
//!
//! ```no_run
//! use mesh_tetra::{Backend, CleaverParams, MeshInput, Mesher, nrrd};
//!
//! let volume = nrrd::read_labelmap("segmentation.nrrd".as_ref()).unwrap();
//! let mut mesher = Mesher::new();
//! let job = mesher.job(
//!     Backend::Volumetric(CleaverParams::default()),
//!     MeshInput::LabelVolume { volume, regions: vec![1, 2] },
//! );
//! let report = mesher.run(&job).unwrap();
//! if let Some(mesh) = report.mesh() {
//!     println!("{} tetrahedra", mesh.tetra_count());
//!     mesh_tetra::vtk::write_unstructured_grid(mesh, "tissue.vtk".as_ref()).unwrap();
//! }
//! ```
//!
//! # Cancellation and Events
//!
//! [`Mesher::run`] blocks. Cancel it from another thread through the token
//! from [`Mesher::cancel_token`]; follow it through the receiver from
//! [`Mesher::subscribe`]. See [`progress`] for an example.
//!
//! # Error Handling
//!
//! Operations return [`TetraResult<T>`]. Every [`TetraError`] has a stable
//! [`ErrorCode`] and a [`RecoverySuggestion`]:
//!
//! ```
//! use mesh_tetra::{ErrorCode, TetraError};
//!
//! let err = TetraError::process_failed("tetgen", Some(1));
//! assert_eq!(err.code(), ErrorCode::ProcessFailed);
//! println!("{}", err.recovery_suggestion());
//! ```
//!
//! A job with no selected regions, or a polygon surface handed to the
//! volumetric backend, is not an error: it comes back as
//! [`JobOutcome::Skipped`]. A cancelled job is [`JobOutcome::Cancelled`].

mod error;
mod orchestrator;
mod types;

pub mod colors;
pub mod command;
pub mod config;
pub mod frame;
pub mod locate;
pub mod nrrd;
pub mod ply;
pub mod progress;
pub mod runner;
pub mod serialize;
pub mod surface;
pub mod tracing_ext;
pub mod volume;
pub mod vtk;
pub mod workspace;

pub use colors::{BACKGROUND_COLOR, BACKGROUND_LABEL, LabelColor, LabelColorTable};
pub use command::{Backend, CleaverParams, MesherCommand, TetGenParams};
pub use config::{ExecutablePaths, MesherSettings};
pub use error::{ErrorCode, ErrorLocation, RecoverySuggestion, TetraError, TetraResult};
pub use frame::SpatialFrame;
pub use locate::ExecutableLocator;
pub use orchestrator::{JobOutcome, JobReport, MeshInput, MeshJob, MeshOutput, Mesher};
pub use progress::{CancelToken, EventSink, JobEvent, JobStage, JobStatus, Progress};
pub use runner::{ProcessRunner, RunReport, RunState};
pub use types::{
    AttributeKind, AttributeLocation, Cell, CellKind, DataArray, PolygonSurface, TetrahedralMesh,
};
pub use volume::{LabelVolume, Region, VolumeGeometry};
pub use workspace::{CleanupPolicy, Workspace};
