//! Mesher backends, their parameters and command lines.
//!
//! Arguments are always passed to the process as a vector; nothing here is
//! ever interpreted by a shell.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{TetraError, TetraResult};

/// Output grid written by the volumetric mesher.
pub const VOLUMETRIC_OUTPUT_FILE: &str = "output.vtk";

/// Output grid written by the surface mesher, next to its `mesh.ply` input.
pub const SURFACE_OUTPUT_FILE: &str = "mesh.1.vtk";

/// Parameters of the volumetric (Cleaver) mesher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleaverParams {
    /// Scales the sizing field; larger values give coarser meshes.
    pub feature_scaling: f64,
    /// Sampling rate of the input indicator functions.
    pub sampling_rate: f64,
    /// Lipschitz bound on the sizing field's rate of change.
    pub lipschitz: f64,
    /// Background margin around the labelmap, percent of each axis.
    pub padding_percent: u32,
    /// Drop cells labeled as background from the result.
    pub remove_background: bool,
    /// Extra command-line arguments, split on whitespace.
    pub additional_arguments: String,
}

impl Default for CleaverParams {
    fn default() -> Self {
        Self {
            feature_scaling: 2.0,
            sampling_rate: 0.2,
            lipschitz: 0.2,
            padding_percent: 10,
            remove_background: true,
            additional_arguments: String::new(),
        }
    }
}

impl CleaverParams {
    /// Check value ranges before anything touches the filesystem.
    pub fn validate(&self) -> TetraResult<()> {
        for (name, value) in [
            ("feature_scaling", self.feature_scaling),
            ("sampling_rate", self.sampling_rate),
            ("lipschitz", self.lipschitz),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(TetraError::invalid_parameter(
                    name,
                    format!("must be a positive number, got {}", value),
                ));
            }
        }
        Ok(())
    }

    /// Extra arguments as tokens. Quoting is not understood: `"a b"` becomes
    /// two tokens, `"a` and `b"`.
    pub fn extra_tokens(&self) -> Vec<String> {
        self.additional_arguments
            .split_whitespace()
            .map(str::to_string)
            .collect()
    }
}

/// Parameters of the surface (TetGen) mesher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TetGenParams {
    /// Maximum radius-edge ratio.
    pub ratio: f64,
    /// Minimum dihedral angle in degrees.
    pub angle: f64,
    /// Maximum tetrahedron volume.
    pub volume: f64,
    /// Extra switches appended verbatim to the quality switch.
    pub additional_arguments: String,
}

impl Default for TetGenParams {
    fn default() -> Self {
        Self {
            ratio: 5.0,
            angle: 0.0,
            volume: 10.0,
            additional_arguments: String::new(),
        }
    }
}

impl TetGenParams {
    /// Check value ranges before anything touches the filesystem.
    pub fn validate(&self) -> TetraResult<()> {
        for (name, value) in [
            ("ratio", self.ratio),
            ("angle", self.angle),
            ("volume", self.volume),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(TetraError::invalid_parameter(
                    name,
                    format!("must be a non-negative number, got {}", value),
                ));
            }
        }
        Ok(())
    }

    /// Quality switch, e.g. `q5.00/0.00a10.00`.
    pub fn quality_switches(&self) -> String {
        format!("q{:.2}/{:.2}a{:.2}", self.ratio, self.angle, self.volume)
    }
}

/// Mesher backend with its parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum Backend {
    /// Cleaver: multi-material labelmap in, tetrahedral grid out.
    Volumetric(CleaverParams),
    /// TetGen: closed surface in, constrained Delaunay tetrahedralization out.
    Surface(TetGenParams),
}

impl Backend {
    /// Short name for logs and reports.
    pub fn name(&self) -> &'static str {
        match self {
            Backend::Volumetric(_) => "cleaver",
            Backend::Surface(_) => "tetgen",
        }
    }

    /// Executable file name without platform suffix.
    pub fn executable_stem(&self) -> &'static str {
        match self {
            Backend::Volumetric(_) => "cleaver-cli",
            Backend::Surface(_) => "tetgen",
        }
    }

    /// Output file the mesher writes into the workspace.
    pub fn output_file_name(&self) -> &'static str {
        match self {
            Backend::Volumetric(_) => VOLUMETRIC_OUTPUT_FILE,
            Backend::Surface(_) => SURFACE_OUTPUT_FILE,
        }
    }

    pub fn validate(&self) -> TetraResult<()> {
        match self {
            Backend::Volumetric(p) => p.validate(),
            Backend::Surface(p) => p.validate(),
        }
    }

    /// Argument vector for a staged input file and output directory.
    pub fn arguments(&self, input: &Path, output_dir: &Path) -> Vec<String> {
        match self {
            Backend::Volumetric(p) => volumetric_arguments(p, input, output_dir),
            Backend::Surface(p) => surface_arguments(p, input),
        }
    }
}

/// A program plus its argument vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MesherCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl MesherCommand {
    pub fn new(program: PathBuf, args: Vec<String>) -> Self {
        Self { program, args }
    }

    /// File name of the program, for messages.
    pub fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string())
    }
}

fn volumetric_arguments(params: &CleaverParams, input: &Path, output_dir: &Path) -> Vec<String> {
    let mut output_path = output_dir.display().to_string();
    if !output_path.ends_with('/') {
        output_path.push('/');
    }

    let mut args = vec![
        "--input_files".to_string(),
        input.display().to_string(),
        "--feature_scaling".to_string(),
        format!("{:.2}", params.feature_scaling),
        "--sampling_rate".to_string(),
        format!("{:.2}", params.sampling_rate),
        "--lipschitz".to_string(),
        format!("{:.2}", params.lipschitz),
        "--output_path".to_string(),
        output_path,
        "--output_format".to_string(),
        "vtkUSG".to_string(),
        // Prevent inside-out tetrahedra
        "--fix_tet_windup".to_string(),
        // Remove the elements added to make the volume cubic
        "--strip_exterior".to_string(),
        "--verbose".to_string(),
    ];
    args.extend(params.extra_tokens());
    args
}

fn surface_arguments(params: &TetGenParams, input: &Path) -> Vec<String> {
    vec![
        format!(
            "-k{}{}",
            params.quality_switches(),
            params.additional_arguments
        ),
        input.display().to_string(),
    ]
}
