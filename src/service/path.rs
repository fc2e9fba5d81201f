//! Package-manager resolution and `PATH` construction for spawned services.
//!
//! Resolution is an explicit chain: configured directory, then the current
//! `PATH`, then a fixed candidate list. If every step misses, the spawn fails
//! with [`Error::PackageManagerNotFound`]; a bare unqualified command is never
//! handed to the OS.

use crate::config::PackageManagerSettings;
use crate::error::{Error, Result};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// System directories every child gets on its `PATH`.
const SYSTEM_BIN_DIRS: &[&str] = &["/usr/local/bin", "/usr/bin", "/bin"];

#[derive(Debug, Clone)]
pub struct PackageManagerLocator {
    name: String,
    bin_dir: Option<PathBuf>,
    search_path: Vec<PathBuf>,
    candidates: Vec<PathBuf>,
}

impl PackageManagerLocator {
    /// Build the chain from settings and the orchestrator's own environment.
    pub fn from_settings(settings: &PackageManagerSettings, env: &HashMap<String, String>) -> Self {
        let search_path = env
            .get("PATH")
            .map(|p| std::env::split_paths(p).collect())
            .unwrap_or_default();

        let mut candidates = Vec::new();
        if let Some(pnpm_home) = env.get("PNPM_HOME").filter(|v| !v.is_empty()) {
            candidates.push(PathBuf::from(pnpm_home));
        }
        if let Some(data) = dirs::data_dir() {
            candidates.push(data.join("pnpm"));
        }
        candidates.push(PathBuf::from("/usr/local/bin"));
        candidates.push(PathBuf::from("/usr/bin"));

        Self {
            name: settings.name.clone(),
            bin_dir: settings.bin_dir.clone(),
            search_path,
            candidates,
        }
    }

    /// Fully explicit chain, used in tests.
    pub fn new(
        name: impl Into<String>,
        bin_dir: Option<PathBuf>,
        search_path: Vec<PathBuf>,
        candidates: Vec<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            bin_dir,
            search_path,
            candidates,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Absolute path of the package-manager executable.
    pub fn locate(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.bin_dir {
            let candidate = dir.join(&self.name);
            if is_executable(&candidate) {
                return Ok(candidate);
            }
            tracing::warn!(
                "Configured package manager directory '{}' has no executable '{}'",
                dir.display(),
                self.name
            );
        }

        self.search_path
            .iter()
            .chain(self.candidates.iter())
            .map(|dir| dir.join(&self.name))
            .find(|candidate| is_executable(candidate))
            .ok_or_else(|| Error::PackageManagerNotFound(self.name.clone()))
    }
}

fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    match std::fs::metadata(path) {
        Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}

/// `PATH` for a child: `extra_dir` (the resolved package-manager directory),
/// the system bin dirs and `~/.local/bin`, then `existing`. First occurrence
/// wins.
pub fn augment_path(existing: Option<&str>, extra_dir: Option<&Path>) -> String {
    let mut entries: Vec<PathBuf> = Vec::new();
    if let Some(dir) = extra_dir {
        entries.push(dir.to_path_buf());
    }
    entries.extend(SYSTEM_BIN_DIRS.iter().map(PathBuf::from));
    if let Some(home) = dirs::home_dir() {
        entries.push(home.join(".local/bin"));
    }
    if let Some(existing) = existing {
        entries.extend(std::env::split_paths(existing));
    }

    let mut seen = HashSet::new();
    let deduped: Vec<PathBuf> = entries
        .into_iter()
        .filter(|p| !p.as_os_str().is_empty())
        .filter(|p| seen.insert(p.clone()))
        .collect();

    // Entries came from split_paths or are fixed, so none contain ':'.
    std::env::join_paths(deduped)
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default()
}
