//! Error types for meshing jobs with rich diagnostics.
//!
//! Every error carries:
//! - A machine-readable error code for programmatic handling
//! - Context (which file, which process, which cell)
//! - A recovery suggestion the host can show next to the log
//! - Terminal rendering via miette
//!
//! # Error Codes
//!
//! Each error has a unique code in the format `TETRA-XXXX`:
//! - `TETRA-1xxx`: Configuration errors (executables, parameters, workspace)
//! - `TETRA-2xxx`: Input errors (regions, volumes, surfaces)
//! - `TETRA-3xxx`: Execution errors (external mesher process)
//! - `TETRA-4xxx`: I/O and parsing errors
//!
//! Cancellation and an empty region selection are job outcomes, not errors.
//!
//! # Example
//!
//! ```
//! use mesh_tetra::{ErrorCode, TetraError};
//!
//! let err = TetraError::process_failed("tetgen", Some(3));
//! assert_eq!(err.code(), ErrorCode::ProcessFailed);
//! assert_eq!(err.code().as_str(), "TETRA-3002");
//! ```

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for meshing operations.
pub type TetraResult<T> = Result<T, TetraError>;

/// Machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Configuration errors (1xxx)
    /// TETRA-1001: Mesher executable could not be located
    ExecutableNotFound = 1001,
    /// TETRA-1002: A job or settings parameter is out of range
    InvalidParameter = 1002,
    /// TETRA-1003: Scratch directory could not be created
    WorkspaceCreate = 1003,

    // Input errors (2xxx)
    /// TETRA-2001: Selected region does not exist in the labelmap
    UnknownRegion = 2001,
    /// TETRA-2002: Labelmap geometry or voxel data is inconsistent
    InvalidVolume = 2002,
    /// TETRA-2003: Surface input has no geometry
    EmptySurface = 2003,

    // Execution errors (3xxx)
    /// TETRA-3001: Mesher process could not be started
    ProcessSpawn = 3001,
    /// TETRA-3002: Mesher process exited with a non-zero code
    ProcessFailed = 3002,

    // I/O and parsing errors (4xxx)
    /// TETRA-4001: Failed to read file
    IoRead = 4001,
    /// TETRA-4002: Failed to write file
    IoWrite = 4002,
    /// TETRA-4003: Failed to parse file
    ParseError = 4003,
    /// TETRA-4004: File uses an encoding that is not supported
    UnsupportedEncoding = 4004,
    /// TETRA-4005: Cell references a point that does not exist
    InvalidCellIndex = 4005,
}

impl ErrorCode {
    /// Returns the error code as a string in the format `TETRA-XXXX`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ExecutableNotFound => "TETRA-1001",
            ErrorCode::InvalidParameter => "TETRA-1002",
            ErrorCode::WorkspaceCreate => "TETRA-1003",
            ErrorCode::UnknownRegion => "TETRA-2001",
            ErrorCode::InvalidVolume => "TETRA-2002",
            ErrorCode::EmptySurface => "TETRA-2003",
            ErrorCode::ProcessSpawn => "TETRA-3001",
            ErrorCode::ProcessFailed => "TETRA-3002",
            ErrorCode::IoRead => "TETRA-4001",
            ErrorCode::IoWrite => "TETRA-4002",
            ErrorCode::ParseError => "TETRA-4003",
            ErrorCode::UnsupportedEncoding => "TETRA-4004",
            ErrorCode::InvalidCellIndex => "TETRA-4005",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Recovery suggestions for meshing errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoverySuggestion {
    /// Point the job at the mesher executable explicitly.
    ConfigureExecutable { name: String },
    /// Adjust parameters for the operation.
    AdjustParameters { parameters: Vec<(String, String)> },
    /// Check the job input.
    CheckInput { checks: Vec<String> },
    /// Inspect the mesher output kept in the workspace.
    InspectMesherLog { keep_temporary_files: bool },
    /// Check the filesystem location.
    CheckFilesystem { checks: Vec<String> },
    /// No automatic recovery available.
    None,
}

impl std::fmt::Display for RecoverySuggestion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecoverySuggestion::ConfigureExecutable { name } => {
                write!(
                    f,
                    "Install {} or set a custom executable path in the settings",
                    name
                )
            }
            RecoverySuggestion::AdjustParameters { parameters } => {
                let params: Vec<String> = parameters
                    .iter()
                    .map(|(k, v)| format!("{} = {}", k, v))
                    .collect();
                write!(f, "Try adjusting: {}", params.join(", "))
            }
            RecoverySuggestion::CheckInput { checks } => {
                write!(f, "Check the input for: {}", checks.join(", "))
            }
            RecoverySuggestion::InspectMesherLog {
                keep_temporary_files,
            } => {
                if *keep_temporary_files {
                    write!(
                        f,
                        "Read the mesher output in the log and the files kept in the workspace"
                    )
                } else {
                    write!(
                        f,
                        "Read the mesher output in the log; enable keep-temporary-files to inspect its inputs"
                    )
                }
            }
            RecoverySuggestion::CheckFilesystem { checks } => {
                write!(f, "Check the filesystem: {}", checks.join(", "))
            }
            RecoverySuggestion::None => {
                write!(f, "No automatic recovery available")
            }
        }
    }
}

/// Location information for errors.
#[derive(Debug, Clone)]
pub enum ErrorLocation {
    /// Error in a file, optionally at a specific line.
    File { path: PathBuf, line: Option<usize> },
    /// Error at a specific cell of the output mesh.
    Cell { index: usize },
    /// Error in a labelmap region.
    Region { label: u16 },
}

impl std::fmt::Display for ErrorLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorLocation::File { path, line } => {
                if let Some(l) = line {
                    write!(f, "{}:{}", path.display(), l)
                } else {
                    write!(f, "{}", path.display())
                }
            }
            ErrorLocation::Cell { index } => write!(f, "cell {}", index),
            ErrorLocation::Region { label } => write!(f, "region with label {}", label),
        }
    }
}

/// Errors that can occur while preparing, running or importing a meshing job.
#[derive(Debug, Error, Diagnostic)]
pub enum TetraError {
    /// The mesher executable was not found.
    #[error("{name} not found")]
    #[diagnostic(
        code(tetra::config::executable_not_found),
        help("Install {name} next to this tool or configure a custom executable path")
    )]
    ExecutableNotFound { name: String, searched: Vec<PathBuf> },

    /// A parameter is out of its valid range.
    #[error("invalid parameter `{name}`: {details}")]
    #[diagnostic(code(tetra::config::invalid_parameter))]
    InvalidParameter { name: String, details: String },

    /// The scratch directory could not be created.
    #[error("failed to create working directory {path}")]
    #[diagnostic(
        code(tetra::config::workspace),
        help("Check that the temporary directory base exists and is writable")
    )]
    WorkspaceCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A selected region label is not present in the labelmap region table.
    #[error("region with label {label} is not defined in the labelmap")]
    #[diagnostic(code(tetra::input::unknown_region))]
    UnknownRegion { label: u16 },

    /// Labelmap geometry or voxel buffer is inconsistent.
    #[error("invalid labelmap: {details}")]
    #[diagnostic(code(tetra::input::volume))]
    InvalidVolume { details: String },

    /// Surface input has no points or polygons.
    #[error("surface is empty: {details}")]
    #[diagnostic(
        code(tetra::input::empty_surface),
        help("The surface mesher needs a closed polygon surface with at least one polygon")
    )]
    EmptySurface { details: String },

    /// The mesher process could not be started.
    #[error("failed to start {program}")]
    #[diagnostic(
        code(tetra::process::spawn),
        help("Check that the executable exists and has execute permission")
    )]
    ProcessSpawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The mesher process exited unsuccessfully.
    #[error("{program} failed with {}", describe_exit(.exit_code))]
    #[diagnostic(
        code(tetra::process::failed),
        help("The mesher output has been written to the log")
    )]
    ProcessFailed {
        program: String,
        exit_code: Option<i32>,
    },

    /// Error reading from a file.
    #[error("failed to read {path}")]
    #[diagnostic(code(tetra::io::read))]
    IoRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error writing to a file.
    #[error("failed to write {path}")]
    #[diagnostic(
        code(tetra::io::write),
        help("Check that the directory exists and is writable")
    )]
    IoWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error parsing a file.
    #[error("failed to parse {path}{}: {details}", describe_line(.line))]
    #[diagnostic(code(tetra::parse::error))]
    ParseError {
        path: PathBuf,
        line: Option<usize>,
        details: String,
    },

    /// File encoding is not supported.
    #[error("unsupported encoding `{encoding}` in {path}")]
    #[diagnostic(
        code(tetra::parse::encoding),
        help("Only ASCII legacy VTK files are read; ask the mesher for ASCII output")
    )]
    UnsupportedEncoding { path: PathBuf, encoding: String },

    /// Cell references a point index outside the point array.
    #[error(
        "invalid point index: cell {cell_index} references point {point_index}, but mesh only has {point_count} points"
    )]
    #[diagnostic(code(tetra::parse::cell_index))]
    InvalidCellIndex {
        cell_index: usize,
        point_index: u32,
        point_count: usize,
    },
}

fn describe_exit(exit_code: &Option<i32>) -> String {
    match exit_code {
        Some(code) => format!("exit code {}", code),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

fn describe_line(line: &Option<usize>) -> String {
    line.map(|l| format!(" at line {}", l)).unwrap_or_default()
}

impl TetraError {
    /// Returns the machine-readable error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            TetraError::ExecutableNotFound { .. } => ErrorCode::ExecutableNotFound,
            TetraError::InvalidParameter { .. } => ErrorCode::InvalidParameter,
            TetraError::WorkspaceCreate { .. } => ErrorCode::WorkspaceCreate,
            TetraError::UnknownRegion { .. } => ErrorCode::UnknownRegion,
            TetraError::InvalidVolume { .. } => ErrorCode::InvalidVolume,
            TetraError::EmptySurface { .. } => ErrorCode::EmptySurface,
            TetraError::ProcessSpawn { .. } => ErrorCode::ProcessSpawn,
            TetraError::ProcessFailed { .. } => ErrorCode::ProcessFailed,
            TetraError::IoRead { .. } => ErrorCode::IoRead,
            TetraError::IoWrite { .. } => ErrorCode::IoWrite,
            TetraError::ParseError { .. } => ErrorCode::ParseError,
            TetraError::UnsupportedEncoding { .. } => ErrorCode::UnsupportedEncoding,
            TetraError::InvalidCellIndex { .. } => ErrorCode::InvalidCellIndex,
        }
    }

    /// Returns a recovery suggestion for this error.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self {
            TetraError::ExecutableNotFound { name, .. } => {
                RecoverySuggestion::ConfigureExecutable { name: name.clone() }
            }
            TetraError::InvalidParameter { name, details } => {
                RecoverySuggestion::AdjustParameters {
                    parameters: vec![(name.clone(), details.clone())],
                }
            }
            TetraError::WorkspaceCreate { .. } => RecoverySuggestion::CheckFilesystem {
                checks: vec!["base directory exists".into(), "write permissions".into()],
            },
            TetraError::UnknownRegion { .. } => RecoverySuggestion::CheckInput {
                checks: vec!["selected region labels".into()],
            },
            TetraError::InvalidVolume { .. } => RecoverySuggestion::CheckInput {
                checks: vec![
                    "voxel count matches dimensions".into(),
                    "positive spacing".into(),
                ],
            },
            TetraError::EmptySurface { .. } => RecoverySuggestion::CheckInput {
                checks: vec!["surface has polygons".into()],
            },
            TetraError::ProcessSpawn { .. } => RecoverySuggestion::CheckFilesystem {
                checks: vec!["executable permissions".into()],
            },
            TetraError::ProcessFailed { .. } => RecoverySuggestion::InspectMesherLog {
                keep_temporary_files: false,
            },
            TetraError::IoRead { .. } => RecoverySuggestion::CheckFilesystem {
                checks: vec!["file exists".into(), "file permissions".into()],
            },
            TetraError::IoWrite { .. } => RecoverySuggestion::CheckFilesystem {
                checks: vec!["directory exists".into(), "write permissions".into()],
            },
            TetraError::ParseError { .. } | TetraError::InvalidCellIndex { .. } => {
                RecoverySuggestion::InspectMesherLog {
                    keep_temporary_files: true,
                }
            }
            TetraError::UnsupportedEncoding { .. } => RecoverySuggestion::None,
        }
    }

    /// Returns location information if available.
    pub fn location(&self) -> Option<ErrorLocation> {
        match self {
            TetraError::ParseError { path, line, .. } => Some(ErrorLocation::File {
                path: path.clone(),
                line: *line,
            }),
            TetraError::IoRead { path, .. }
            | TetraError::IoWrite { path, .. }
            | TetraError::WorkspaceCreate { path, .. }
            | TetraError::UnsupportedEncoding { path, .. } => Some(ErrorLocation::File {
                path: path.clone(),
                line: None,
            }),
            TetraError::InvalidCellIndex { cell_index, .. } => Some(ErrorLocation::Cell {
                index: *cell_index,
            }),
            TetraError::UnknownRegion { label } => Some(ErrorLocation::Region { label: *label }),
            _ => None,
        }
    }

    // Constructor helpers for common error patterns

    /// Create an ExecutableNotFound error.
    pub fn executable_not_found(name: impl Into<String>, searched: Vec<PathBuf>) -> Self {
        TetraError::ExecutableNotFound {
            name: name.into(),
            searched,
        }
    }

    /// Create an InvalidParameter error.
    pub fn invalid_parameter(name: impl Into<String>, details: impl Into<String>) -> Self {
        TetraError::InvalidParameter {
            name: name.into(),
            details: details.into(),
        }
    }

    /// Create an InvalidVolume error.
    pub fn invalid_volume(details: impl Into<String>) -> Self {
        TetraError::InvalidVolume {
            details: details.into(),
        }
    }

    /// Create an EmptySurface error.
    pub fn empty_surface(details: impl Into<String>) -> Self {
        TetraError::EmptySurface {
            details: details.into(),
        }
    }

    /// Create a ProcessFailed error.
    pub fn process_failed(program: impl Into<String>, exit_code: Option<i32>) -> Self {
        TetraError::ProcessFailed {
            program: program.into(),
            exit_code,
        }
    }

    /// Create an IoRead error.
    pub fn io_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TetraError::IoRead {
            path: path.into(),
            source,
        }
    }

    /// Create an IoWrite error.
    pub fn io_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TetraError::IoWrite {
            path: path.into(),
            source,
        }
    }

    /// Create a ParseError without line information.
    pub fn parse_error(path: impl Into<PathBuf>, details: impl Into<String>) -> Self {
        TetraError::ParseError {
            path: path.into(),
            line: None,
            details: details.into(),
        }
    }

    /// Create a ParseError pointing at a line (1-based).
    pub fn parse_error_at(path: impl Into<PathBuf>, line: usize, details: impl Into<String>) -> Self {
        TetraError::ParseError {
            path: path.into(),
            line: Some(line),
            details: details.into(),
        }
    }

    /// Create an InvalidCellIndex error.
    pub fn invalid_cell_index(cell_index: usize, point_index: u32, point_count: usize) -> Self {
        TetraError::InvalidCellIndex {
            cell_index,
            point_index,
            point_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = TetraError::invalid_cell_index(5, 100, 50);
        assert_eq!(err.code(), ErrorCode::InvalidCellIndex);
        assert_eq!(err.code().as_str(), "TETRA-4005");
    }

    #[test]
    fn test_process_failed_display() {
        let err = TetraError::process_failed("cleaver-cli", Some(2));
        assert_eq!(err.to_string(), "cleaver-cli failed with exit code 2");

        let err = TetraError::process_failed("tetgen", None);
        assert!(err.to_string().contains("terminated by signal"));
    }

    #[test]
    fn test_recovery_suggestions() {
        let err = TetraError::executable_not_found("tetgen", Vec::new());
        match err.recovery_suggestion() {
            RecoverySuggestion::ConfigureExecutable { name } => assert_eq!(name, "tetgen"),
            other => panic!("Expected ConfigureExecutable suggestion, got {:?}", other),
        }
    }

    #[test]
    fn test_location_info() {
        let err = TetraError::parse_error_at("output.vtk", 12, "bad token");
        match err.location() {
            Some(ErrorLocation::File { line, .. }) => assert_eq!(line, Some(12)),
            other => panic!("Expected File location, got {:?}", other),
        }
        assert!(err.to_string().contains("at line 12"));
    }

    #[test]
    fn test_error_display() {
        let err = TetraError::invalid_cell_index(5, 100, 50);
        let display = format!("{}", err);
        assert!(display.contains("cell 5"));
        assert!(display.contains("point 100"));
        assert!(display.contains("50 points"));
    }
}
