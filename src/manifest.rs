use crate::error::{MockError, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_MANIFEST: &str = "mockpkg.toml";

/// Optional `mockpkg.toml` overriding the host build configuration.
#[derive(Debug, Default, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub build: BuildSection,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct BuildSection {
    pub goos: Option<String>,
    pub goarch: Option<String>,
    pub compiler: Option<String>,
    pub cgo: Option<bool>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub goroot: Option<PathBuf>,
    #[serde(default)]
    pub gopath: Vec<PathBuf>,
    pub module_root: Option<PathBuf>,
    /// Newest `go1.N` release tag to satisfy, e.g. "go1.21".
    pub release: Option<String>,
}

impl Manifest {
    pub fn parse(text: &str, path: &Path) -> Result<Self> {
        toml::from_str(text).map_err(|err| MockError::Config {
            path: path.to_path_buf(),
            message: err.to_string(),
        })
    }
}

pub fn load_manifest(path: &Path) -> Result<Manifest> {
    let text = fs::read_to_string(path).map_err(|source| MockError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    Manifest::parse(&text, path)
}

/// Loads `mockpkg.toml` from `dir` when one exists.
pub fn discover_manifest(dir: &Path) -> Result<Option<Manifest>> {
    let candidate = dir.join(DEFAULT_MANIFEST);
    if candidate.is_file() {
        load_manifest(&candidate).map(Some)
    } else {
        Ok(None)
    }
}
