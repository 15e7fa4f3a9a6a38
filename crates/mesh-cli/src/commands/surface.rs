//! mesh-tetra surface command - mesh a closed surface with TetGen.

use std::path::Path;

use anyhow::{Context, Result, bail};
use mesh_tetra::{Backend, MeshInput, nrrd, ply};

use crate::commands::{apply_job_args, mesher_for, run_job};
use crate::{Cli, JobArgs};

pub struct SurfaceArgs<'a> {
    pub input: &'a Path,
    pub output: &'a Path,
    pub labels: Option<&'a [u16]>,
    pub ratio: Option<f64>,
    pub angle: Option<f64>,
    pub volume: Option<f64>,
    pub extra: Option<&'a str>,
    pub tetgen: Option<&'a Path>,
    pub job: &'a JobArgs,
}

fn load_input(path: &Path, labels: Option<&[u16]>) -> Result<MeshInput> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("ply") => {
            let surface = ply::read(path)
                .with_context(|| format!("Failed to load surface from {:?}", path))?;
            Ok(MeshInput::Polygon(surface))
        }
        Some("nrrd") => {
            let volume = nrrd::read_labelmap(path)
                .with_context(|| format!("Failed to load labelmap from {:?}", path))?;
            let regions = match labels {
                Some(labels) => labels.to_vec(),
                None => volume.present_labels(),
            };
            Ok(MeshInput::LabelVolume { volume, regions })
        }
        _ => bail!(
            "Unsupported input {:?}: expected a .ply surface or a .nrrd labelmap",
            path
        ),
    }
}

pub fn run(args: SurfaceArgs<'_>, cli: &Cli) -> Result<()> {
    let settings = cli.settings()?;

    let mut params = settings.tetgen.clone();
    if let Some(v) = args.ratio {
        params.ratio = v;
    }
    if let Some(v) = args.angle {
        params.angle = v;
    }
    if let Some(v) = args.volume {
        params.volume = v;
    }
    if let Some(extra) = args.extra {
        params.additional_arguments = extra.to_string();
    }

    let input = load_input(args.input, args.labels)?;

    let mut mesher = mesher_for(&settings, args.job);
    if let Some(path) = args.tetgen {
        mesher.set_tetgen_path(Some(path.to_path_buf()));
    }
    let job = apply_job_args(mesher.job(Backend::Surface(params), input), args.job);

    run_job(mesher, job, args.input, args.output, cli)
}
