//! The build configuration every pipeline stage consults: target platform,
//! extra build tags, and the roots import paths are resolved against.

use crate::constraint;
use crate::error::{MockError, Result};
use crate::manifest::BuildSection;
use std::env;
use std::path::{Path, PathBuf};

pub const KNOWN_OS: &[&str] = &[
    "aix", "android", "darwin", "dragonfly", "freebsd", "hurd", "illumos", "ios", "js", "linux",
    "nacl", "netbsd", "openbsd", "plan9", "solaris", "wasip1", "windows", "zos",
];

pub const UNIX_OS: &[&str] = &[
    "aix", "android", "darwin", "dragonfly", "freebsd", "hurd", "illumos", "ios", "linux",
    "netbsd", "openbsd", "solaris",
];

pub const KNOWN_ARCH: &[&str] = &[
    "386", "amd64", "amd64p32", "arm", "armbe", "arm64", "arm64be", "loong64", "mips", "mipsle",
    "mips64", "mips64le", "mips64p32", "mips64p32le", "ppc", "ppc64", "ppc64le", "riscv",
    "riscv64", "s390", "s390x", "sparc", "sparc64", "wasm",
];

/// Newest `go1.N` release tag satisfied by default.
pub const DEFAULT_RELEASE_MINOR: u32 = 22;

#[derive(Debug, Clone)]
pub struct BuildContext {
    pub goos: String,
    pub goarch: String,
    pub compiler: String,
    pub cgo_enabled: bool,
    pub build_tags: Vec<String>,
    pub release_tags: Vec<String>,
    pub goroot: Option<PathBuf>,
    pub gopath: Vec<PathBuf>,
    /// Module download cache; `GOPATH[0]/pkg/mod` when unset.
    pub gomodcache: Option<PathBuf>,
    /// Directory holding the main module's `go.mod`.
    pub module_root: Option<PathBuf>,
    /// Base for relative locations and relative import paths.
    pub working_dir: PathBuf,
}

impl BuildContext {
    /// A context for the given platform with no import roots configured.
    pub fn new(goos: &str, goarch: &str) -> Self {
        BuildContext {
            goos: goos.to_string(),
            goarch: goarch.to_string(),
            compiler: "gc".to_string(),
            cgo_enabled: false,
            build_tags: Vec::new(),
            release_tags: release_tags(DEFAULT_RELEASE_MINOR),
            goroot: None,
            gopath: Vec::new(),
            gomodcache: None,
            module_root: None,
            working_dir: PathBuf::from("."),
        }
    }

    /// Host defaults, overridable through the usual Go environment variables.
    pub fn host() -> Self {
        let goos = env::var("GOOS")
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| go_os_name(env::consts::OS).to_string());
        let goarch = env::var("GOARCH")
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| go_arch_name(env::consts::ARCH).to_string());

        let mut ctx = BuildContext::new(&goos, &goarch);
        ctx.cgo_enabled = match env::var("CGO_ENABLED").ok().as_deref() {
            Some("1") => true,
            Some("0") => false,
            _ => which::which("gcc").is_ok() || which::which("clang").is_ok(),
        };
        ctx.goroot = find_goroot();
        ctx.gopath = default_gopath();
        ctx.gomodcache = env::var_os("GOMODCACHE")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        ctx.working_dir = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        ctx.module_root = find_module_root(&ctx.working_dir);
        ctx
    }

    pub fn apply_manifest(&mut self, build: &BuildSection, origin: &Path) -> Result<()> {
        if let Some(goos) = &build.goos {
            self.goos = goos.clone();
        }
        if let Some(goarch) = &build.goarch {
            self.goarch = goarch.clone();
        }
        if let Some(compiler) = &build.compiler {
            self.compiler = compiler.clone();
        }
        if let Some(cgo) = build.cgo {
            self.cgo_enabled = cgo;
        }
        if let Some(goroot) = &build.goroot {
            self.goroot = Some(goroot.clone());
        }
        if !build.gopath.is_empty() {
            self.gopath = build.gopath.clone();
        }
        if let Some(root) = &build.module_root {
            self.module_root = Some(root.clone());
        }
        if let Some(release) = &build.release {
            let minor = parse_release(release).ok_or_else(|| MockError::Config {
                path: origin.to_path_buf(),
                message: format!("invalid release tag {release:?}, expected go1.N"),
            })?;
            self.release_tags = release_tags(minor);
        }
        self.add_tags(build.tags.iter().cloned());
        Ok(())
    }

    /// Appends extra build tags. Empty entries are dropped.
    pub fn add_tags<I, S>(&mut self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for tag in tags {
            let tag = tag.into();
            let tag = tag.trim();
            if !tag.is_empty() && !self.build_tags.iter().any(|t| t == tag) {
                self.build_tags.push(tag.to_string());
            }
        }
    }

    /// Reports whether a single build tag is satisfied.
    pub fn match_tag(&self, name: &str) -> bool {
        if name.is_empty() {
            return false;
        }
        if name == self.goos || name == self.goarch || name == self.compiler {
            return true;
        }
        if name == "cgo" && self.cgo_enabled {
            return true;
        }
        if name == "unix" && UNIX_OS.contains(&self.goos.as_str()) {
            return true;
        }
        let implied = match self.goos.as_str() {
            "android" => "linux",
            "illumos" => "solaris",
            "ios" => "darwin",
            _ => "",
        };
        if name == implied {
            return true;
        }
        self.build_tags.iter().any(|t| t == name) || self.release_tags.iter().any(|t| t == name)
    }

    /// Reports whether `dir/name` belongs to the build under this context.
    pub fn match_file(&self, dir: &Path, name: &str) -> Result<bool> {
        constraint::match_file(self, dir, name)
    }

    pub fn module_cache(&self) -> Option<PathBuf> {
        self.gomodcache
            .clone()
            .or_else(|| self.gopath.first().map(|gopath| gopath.join("pkg").join("mod")))
    }

    pub fn resolve_relative(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.working_dir.join(path)
        }
    }
}

fn go_os_name(rust_os: &str) -> &str {
    match rust_os {
        "macos" => "darwin",
        other => other,
    }
}

fn go_arch_name(rust_arch: &str) -> &str {
    match rust_arch {
        "x86_64" => "amd64",
        "x86" => "386",
        "aarch64" => "arm64",
        "powerpc64" => "ppc64",
        "loongarch64" => "loong64",
        "wasm32" => "wasm",
        other => other,
    }
}

fn release_tags(minor: u32) -> Vec<String> {
    (1..=minor).map(|n| format!("go1.{n}")).collect()
}

fn parse_release(tag: &str) -> Option<u32> {
    tag.strip_prefix("go1.")?.parse().ok()
}

fn find_goroot() -> Option<PathBuf> {
    if let Some(root) = env::var_os("GOROOT").filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(root));
    }
    let go = which::which("go").ok()?;
    let go = go.canonicalize().unwrap_or(go);
    let root = go.parent()?.parent()?;
    root.join("src").is_dir().then(|| root.to_path_buf())
}

fn default_gopath() -> Vec<PathBuf> {
    if let Some(paths) = env::var_os("GOPATH").filter(|v| !v.is_empty()) {
        return env::split_paths(&paths).collect();
    }
    env::var_os("HOME")
        .map(|home| vec![PathBuf::from(home).join("go")])
        .unwrap_or_default()
}

pub fn find_module_root(start: &Path) -> Option<PathBuf> {
    let mut dir = start.to_path_buf();
    loop {
        if dir.join("go.mod").is_file() {
            return Some(dir);
        }
        if !dir.pop() {
            return None;
        }
    }
}
