//! Finding mesher executables.
//!
//! Resolution order: a custom path if one is configured (it must be an
//! existing file), then a fixed list of directories relative to a search
//! root covering install-tree and build-tree layouts. The first hit is
//! cached until the custom path changes.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{TetraError, TetraResult};

/// Build configurations whose output directories are searched.
const BUILD_CONFIGURATIONS: [&str; 4] = ["Release", "Debug", "RelWithDebInfo", "MinSizeRel"];

/// Directories searched relative to the search root, in order.
pub fn candidate_dirs(root: &Path) -> Vec<PathBuf> {
    let mut dirs = vec![
        root.join(".."),
        root.join("../../../bin"),
        root.join("../../../../bin"),
    ];
    dirs.extend(
        BUILD_CONFIGURATIONS
            .iter()
            .map(|config| root.join("../../../../bin").join(config)),
    );
    dirs
}

/// Resolves and caches the path of one mesher executable.
#[derive(Debug, Clone)]
pub struct ExecutableLocator {
    file_name: String,
    custom_path: Option<PathBuf>,
    search_root: Option<PathBuf>,
    cached: Option<PathBuf>,
}

impl ExecutableLocator {
    /// Locator for an executable stem; the platform suffix is appended.
    pub fn new(stem: &str) -> Self {
        Self {
            file_name: format!("{}{}", stem, std::env::consts::EXE_SUFFIX),
            custom_path: None,
            search_root: None,
            cached: None,
        }
    }

    /// Locator for the volumetric mesher.
    pub fn cleaver() -> Self {
        Self::new("cleaver-cli")
    }

    /// Locator for the surface mesher.
    pub fn tetgen() -> Self {
        Self::new("tetgen")
    }

    /// Executable file name searched for.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Configured custom path.
    pub fn custom_path(&self) -> Option<&Path> {
        self.custom_path.as_deref()
    }

    /// Set or clear the custom path. Invalidates the cache when it changes.
    pub fn set_custom_path(&mut self, path: Option<PathBuf>) {
        if self.custom_path != path {
            self.custom_path = path;
            self.cached = None;
        }
    }

    /// Search relative to `root` instead of the running executable's
    /// directory.
    pub fn set_search_root(&mut self, root: Option<PathBuf>) {
        if self.search_root != root {
            self.search_root = root;
            self.cached = None;
        }
    }

    fn root(&self) -> Option<PathBuf> {
        self.search_root.clone().or_else(|| {
            std::env::current_exe()
                .ok()
                .and_then(|exe| exe.parent().map(Path::to_path_buf))
        })
    }

    /// Every path that would be probed, in order.
    pub fn search_paths(&self) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Some(custom) = &self.custom_path {
            paths.push(custom.clone());
        }
        if let Some(root) = self.root() {
            paths.extend(
                candidate_dirs(&root)
                    .into_iter()
                    .map(|dir| dir.join(&self.file_name)),
            );
        }
        paths
    }

    /// Resolve the executable path, using the cache when possible.
    pub fn resolve(&mut self) -> TetraResult<PathBuf> {
        if let Some(path) = &self.cached {
            return Ok(path.clone());
        }

        if let Some(custom) = &self.custom_path {
            if custom.is_file() {
                self.cached = Some(custom.clone());
                return Ok(custom.clone());
            }
            return Err(TetraError::executable_not_found(
                &self.file_name,
                vec![custom.clone()],
            ));
        }

        let searched = self.search_paths();
        for candidate in &searched {
            debug!(target: "mesh_tetra::process", path = %candidate.display(), "Probing for executable");
            if candidate.is_file() {
                let found = std::path::absolute(candidate).unwrap_or_else(|_| candidate.clone());
                self.cached = Some(found.clone());
                return Ok(found);
            }
        }

        Err(TetraError::executable_not_found(&self.file_name, searched))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"").unwrap();
    }

    #[test]
    fn test_candidate_order() {
        let dirs = candidate_dirs(Path::new("/opt/app/lib/ext/mod"));
        assert_eq!(dirs.len(), 7);
        assert_eq!(dirs[0], Path::new("/opt/app/lib/ext/mod/.."));
        assert_eq!(dirs[6], Path::new("/opt/app/lib/ext/mod/../../../../bin/MinSizeRel"));
    }

    #[test]
    fn test_custom_path_wins_and_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let custom = dir.path().join("my-tetgen");
        let mut locator = ExecutableLocator::tetgen();
        locator.set_search_root(Some(dir.path().join("a/b/c/d")));

        locator.set_custom_path(Some(custom.clone()));
        let err = locator.resolve().unwrap_err();
        assert!(matches!(err, TetraError::ExecutableNotFound { .. }));

        touch(&custom);
        assert_eq!(locator.resolve().unwrap(), custom);
    }

    #[test]
    fn test_build_tree_layout_is_found() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("a/b/c/d");
        std::fs::create_dir_all(&root).unwrap();
        let exe = dir.path().join("bin/Debug").join(ExecutableLocator::cleaver().file_name());
        touch(&exe);

        let mut locator = ExecutableLocator::cleaver();
        locator.set_search_root(Some(root));
        let found = locator.resolve().unwrap();
        assert_eq!(
            std::fs::canonicalize(found).unwrap(),
            std::fs::canonicalize(exe).unwrap()
        );
    }

    #[test]
    fn test_cache_invalidated_by_custom_path() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first");
        let second = dir.path().join("second");
        touch(&first);
        touch(&second);

        let mut locator = ExecutableLocator::tetgen();
        locator.set_custom_path(Some(first.clone()));
        assert_eq!(locator.resolve().unwrap(), first);

        // Cached even if the file disappears
        std::fs::remove_file(&first).unwrap();
        assert_eq!(locator.resolve().unwrap(), first);

        locator.set_custom_path(Some(second.clone()));
        assert_eq!(locator.resolve().unwrap(), second);
    }

    #[test]
    fn test_not_found_lists_searched_paths() {
        let dir = tempfile::tempdir().unwrap();
        let mut locator = ExecutableLocator::tetgen();
        locator.set_search_root(Some(dir.path().to_path_buf()));
        match locator.resolve() {
            Err(TetraError::ExecutableNotFound { searched, .. }) => assert_eq!(searched.len(), 7),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
