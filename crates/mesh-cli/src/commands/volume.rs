//! mesh-tetra volume command - mesh labelmap regions with Cleaver.

use std::path::Path;

use anyhow::{Context, Result};
use mesh_tetra::{Backend, MeshInput, nrrd};

use crate::commands::{apply_job_args, mesher_for, run_job};
use crate::{Cli, JobArgs, output};

pub struct VolumeArgs<'a> {
    pub input: &'a Path,
    pub output: &'a Path,
    pub labels: Option<&'a [u16]>,
    pub feature_scaling: Option<f64>,
    pub sampling_rate: Option<f64>,
    pub lipschitz: Option<f64>,
    pub padding_percent: Option<u32>,
    pub keep_background: bool,
    pub extra: Option<&'a str>,
    pub cleaver: Option<&'a Path>,
    pub job: &'a JobArgs,
}

pub fn run(args: VolumeArgs<'_>, cli: &Cli) -> Result<()> {
    let settings = cli.settings()?;

    let mut params = settings.cleaver.clone();
    if let Some(v) = args.feature_scaling {
        params.feature_scaling = v;
    }
    if let Some(v) = args.sampling_rate {
        params.sampling_rate = v;
    }
    if let Some(v) = args.lipschitz {
        params.lipschitz = v;
    }
    if let Some(v) = args.padding_percent {
        params.padding_percent = v;
    }
    if args.keep_background {
        params.remove_background = false;
    }
    if let Some(extra) = args.extra {
        params.additional_arguments = extra.to_string();
    }

    let volume = nrrd::read_labelmap(args.input)
        .with_context(|| format!("Failed to load labelmap from {:?}", args.input))?;
    let regions = match args.labels {
        Some(labels) => labels.to_vec(),
        None => volume.present_labels(),
    };
    output::info(
        &format!(
            "Meshing {} region(s) of a {}x{}x{} labelmap",
            regions.len(),
            volume.geometry.dims[0],
            volume.geometry.dims[1],
            volume.geometry.dims[2]
        ),
        cli.format,
        cli.quiet,
    );

    let mut mesher = mesher_for(&settings, args.job);
    if let Some(path) = args.cleaver {
        mesher.set_cleaver_path(Some(path.to_path_buf()));
    }
    let job = mesher.job(
        Backend::Volumetric(params),
        MeshInput::LabelVolume { volume, regions },
    );
    let job = apply_job_args(job, args.job);

    run_job(mesher, job, args.input, args.output, cli)
}
