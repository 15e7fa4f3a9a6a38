//! Mesher settings: TOML files and flat key-value persistence.
//!
//! ```toml
//! show_detailed_log = false
//! keep_temporary_files = false
//!
//! [cleaver]
//! feature_scaling = 2.0
//! padding_percent = 10
//!
//! [tetgen]
//! ratio = 5.0
//!
//! [executables]
//! tetgen = "/opt/tetgen/bin/tetgen"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::command::{CleaverParams, TetGenParams};
use crate::error::{TetraError, TetraResult};

/// Custom executable paths, overriding the search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutablePaths {
    pub cleaver: Option<PathBuf>,
    pub tetgen: Option<PathBuf>,
}

/// Everything a host persists between sessions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MesherSettings {
    /// Forward mesher output line by line.
    pub show_detailed_log: bool,
    /// Leave job workspaces on disk.
    pub keep_temporary_files: bool,
    /// Where job workspaces are created. Defaults to `<temp>/mesh-tetra`.
    pub workspace_base: Option<PathBuf>,
    pub cleaver: CleaverParams,
    pub tetgen: TetGenParams,
    pub executables: ExecutablePaths,
}

const KEYS: [&str; 15] = [
    "show_detailed_log",
    "keep_temporary_files",
    "workspace_base",
    "cleaver.feature_scaling",
    "cleaver.sampling_rate",
    "cleaver.lipschitz",
    "cleaver.padding_percent",
    "cleaver.remove_background",
    "cleaver.additional_arguments",
    "tetgen.ratio",
    "tetgen.angle",
    "tetgen.volume",
    "tetgen.additional_arguments",
    "executables.cleaver",
    "executables.tetgen",
];

impl MesherSettings {
    /// Load settings from a TOML file. Missing fields take defaults.
    pub fn load(path: &Path) -> TetraResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| TetraError::io_read(path, e))?;
        let settings: Self = toml::from_str(&text)
            .map_err(|e| TetraError::parse_error(path, e.to_string()))?;
        debug!(target: "mesh_tetra::io", path = %path.display(), "Settings loaded");
        Ok(settings)
    }

    /// Save settings as TOML.
    pub fn save(&self, path: &Path) -> TetraResult<()> {
        let text = toml::to_string_pretty(self).map_err(|e| {
            TetraError::io_write(path, std::io::Error::other(e.to_string()))
        })?;
        std::fs::write(path, text).map_err(|e| TetraError::io_write(path, e))
    }

    /// Flatten into string pairs for hosts with an opaque key-value store.
    /// Unset optional paths are omitted.
    pub fn to_key_values(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        let mut put = |k: &str, v: String| {
            map.insert(k.to_string(), v);
        };
        put("show_detailed_log", self.show_detailed_log.to_string());
        put("keep_temporary_files", self.keep_temporary_files.to_string());
        if let Some(base) = &self.workspace_base {
            put("workspace_base", base.display().to_string());
        }
        put("cleaver.feature_scaling", self.cleaver.feature_scaling.to_string());
        put("cleaver.sampling_rate", self.cleaver.sampling_rate.to_string());
        put("cleaver.lipschitz", self.cleaver.lipschitz.to_string());
        put("cleaver.padding_percent", self.cleaver.padding_percent.to_string());
        put("cleaver.remove_background", self.cleaver.remove_background.to_string());
        put(
            "cleaver.additional_arguments",
            self.cleaver.additional_arguments.clone(),
        );
        put("tetgen.ratio", self.tetgen.ratio.to_string());
        put("tetgen.angle", self.tetgen.angle.to_string());
        put("tetgen.volume", self.tetgen.volume.to_string());
        put(
            "tetgen.additional_arguments",
            self.tetgen.additional_arguments.clone(),
        );
        if let Some(p) = &self.executables.cleaver {
            put("executables.cleaver", p.display().to_string());
        }
        if let Some(p) = &self.executables.tetgen {
            put("executables.tetgen", p.display().to_string());
        }
        map
    }

    /// Rebuild settings from string pairs. Unknown keys are ignored, missing
    /// keys keep their defaults, unparsable values are an error.
    pub fn from_key_values<'a, I>(pairs: I) -> TetraResult<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut s = Self::default();
        for (key, value) in pairs {
            if !KEYS.contains(&key) {
                debug!(target: "mesh_tetra::job", key = key, "Ignoring unknown setting");
                continue;
            }
            match key {
                "show_detailed_log" => s.show_detailed_log = parse(key, value)?,
                "keep_temporary_files" => s.keep_temporary_files = parse(key, value)?,
                "workspace_base" => s.workspace_base = non_empty_path(value),
                "cleaver.feature_scaling" => s.cleaver.feature_scaling = parse(key, value)?,
                "cleaver.sampling_rate" => s.cleaver.sampling_rate = parse(key, value)?,
                "cleaver.lipschitz" => s.cleaver.lipschitz = parse(key, value)?,
                "cleaver.padding_percent" => s.cleaver.padding_percent = parse(key, value)?,
                "cleaver.remove_background" => s.cleaver.remove_background = parse(key, value)?,
                "cleaver.additional_arguments" => {
                    s.cleaver.additional_arguments = value.to_string()
                }
                "tetgen.ratio" => s.tetgen.ratio = parse(key, value)?,
                "tetgen.angle" => s.tetgen.angle = parse(key, value)?,
                "tetgen.volume" => s.tetgen.volume = parse(key, value)?,
                "tetgen.additional_arguments" => {
                    s.tetgen.additional_arguments = value.to_string()
                }
                "executables.cleaver" => s.executables.cleaver = non_empty_path(value),
                "executables.tetgen" => s.executables.tetgen = non_empty_path(value),
                _ => {}
            }
        }
        Ok(s)
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> TetraResult<T> {
    value.trim().parse().map_err(|_| {
        TetraError::invalid_parameter(key, format!("cannot parse `{}`", value))
    })
}

fn non_empty_path(value: &str) -> Option<PathBuf> {
    let value = value.trim();
    (!value.is_empty()).then(|| PathBuf::from(value))
}
