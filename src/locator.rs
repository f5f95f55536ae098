//! Turns a location string (directory or import path) into the canonical
//! directory of a package.

use crate::context::BuildContext;
use crate::error::{MockError, Result};
use regex::Regex;
use serde::Serialize;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Location {
    /// Absolute, symlink-free directory.
    pub dir: PathBuf,
    /// Import path under which generated code refers to the package.
    pub import_path: String,
}

pub fn locate(location: &str, ctx: &BuildContext) -> Result<Location> {
    if location.is_empty() {
        return Err(MockError::location(location, "empty location"));
    }

    let direct = ctx.resolve_relative(Path::new(location));
    let dir = if direct.is_dir() {
        direct
    } else {
        find_import_dir(ctx, location, &ctx.working_dir).map_err(|searched| {
            let searched: Vec<String> = searched.iter().map(|p| p.display().to_string()).collect();
            if searched.is_empty() {
                MockError::location(location, "not a directory or a resolvable import path")
            } else {
                MockError::location(
                    location,
                    format!("cannot find package in any of: {}", searched.join(", ")),
                )
            }
        })?
    };

    // Vendor and root prefix matching below only work on canonical paths.
    let dir = fs::canonicalize(&dir).map_err(|err| {
        MockError::location(location, format!("{}: {err}", dir.display()))
    })?;
    let import_path = import_path_for(ctx, &dir);
    debug!(dir = %dir.display(), %import_path, "located package");
    Ok(Location { dir, import_path })
}

fn is_local_import(path: &str) -> bool {
    path == "." || path == ".." || path.starts_with("./") || path.starts_with("../")
}

/// Resolves an import path to a directory. On failure, returns the
/// directories that were tried.
pub fn find_import_dir(
    ctx: &BuildContext,
    import_path: &str,
    src_dir: &Path,
) -> std::result::Result<PathBuf, Vec<PathBuf>> {
    if import_path.is_empty() || Path::new(import_path).is_absolute() {
        return Err(Vec::new());
    }
    if is_local_import(import_path) {
        let dir = ctx.resolve_relative(src_dir).join(import_path);
        return if dir.is_dir() { Ok(dir) } else { Err(vec![dir]) };
    }

    let mut candidates = Vec::new();
    if let Some(root) = &ctx.module_root {
        if let Some(module) = module_path(root) {
            if import_path == module {
                candidates.push(root.clone());
            } else if let Some(rest) = import_path
                .strip_prefix(module.as_str())
                .and_then(|rest| rest.strip_prefix('/'))
            {
                candidates.push(join_slashed(root, rest));
            }
        }
        candidates.push(join_slashed(&root.join("vendor"), import_path));
        if let Some(cache) = ctx.module_cache() {
            if let Some(dir) = module_cache_dir(&cache, &module_requirements(root), import_path) {
                candidates.push(dir);
            }
        }
    }
    if let Some(goroot) = &ctx.goroot {
        candidates.push(join_slashed(&goroot.join("src"), import_path));
        candidates.push(join_slashed(&goroot.join("src").join("vendor"), import_path));
    }
    for gopath in &ctx.gopath {
        candidates.push(join_slashed(&gopath.join("src"), import_path));
    }

    match candidates.iter().find(|dir| dir.is_dir()) {
        Some(dir) => Ok(dir.clone()),
        None => Err(candidates),
    }
}

fn join_slashed(base: &Path, import_path: &str) -> PathBuf {
    import_path
        .split('/')
        .filter(|segment| !segment.is_empty())
        .fold(base.to_path_buf(), |dir, segment| dir.join(segment))
}

fn module_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?m)^\s*module\s+"?([^"\s]+)"?\s*$"#).expect("valid regex"))
}

/// Reads the module path declared by `root/go.mod`.
pub fn module_path(root: &Path) -> Option<String> {
    let text = fs::read_to_string(root.join("go.mod")).ok()?;
    module_re()
        .captures(&text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// A `require` directive of `go.mod`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub path: String,
    pub version: String,
}

pub fn module_requirements(root: &Path) -> Vec<Requirement> {
    fs::read_to_string(root.join("go.mod"))
        .map(|text| parse_requirements(&text))
        .unwrap_or_default()
}

/// Collects both the single-line and the parenthesized form.
pub fn parse_requirements(text: &str) -> Vec<Requirement> {
    let mut out = Vec::new();
    let mut in_block = false;
    for line in text.lines() {
        let line = line.split("//").next().unwrap_or("").trim();
        if in_block {
            if line.starts_with(')') {
                in_block = false;
            } else {
                push_requirement(line, &mut out);
            }
            continue;
        }
        let Some(rest) = line.strip_prefix("require") else {
            continue;
        };
        if let Some(rest) = rest.trim_start().strip_prefix('(') {
            in_block = true;
            push_requirement(rest, &mut out);
        } else if rest.starts_with(char::is_whitespace) {
            push_requirement(rest, &mut out);
        }
    }
    out
}

fn push_requirement(line: &str, out: &mut Vec<Requirement>) {
    let mut fields = line.split_whitespace().map(|f| f.trim_matches('"'));
    if let (Some(path), Some(version)) = (fields.next(), fields.next()) {
        out.push(Requirement {
            path: path.to_string(),
            version: version.to_string(),
        });
    }
}

/// Directory of `import_path` inside the module cache, picked from the
/// requirement with the longest matching module path.
fn module_cache_dir(cache: &Path, requirements: &[Requirement], import_path: &str) -> Option<PathBuf> {
    let (requirement, rest) = requirements
        .iter()
        .filter_map(|req| {
            let rest = import_path.strip_prefix(req.path.as_str())?;
            (rest.is_empty() || rest.starts_with('/')).then_some((req, rest))
        })
        .max_by_key(|(req, _)| req.path.len())?;
    let module_dir = format!(
        "{}@{}",
        escape_module_path(&requirement.path),
        escape_module_path(&requirement.version)
    );
    Some(join_slashed(&join_slashed(cache, &module_dir), rest))
}

/// Case-encodes a module path for the cache: each upper-case letter becomes
/// `!` followed by its lower-case form.
pub fn escape_module_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for c in path.chars() {
        if c.is_ascii_uppercase() {
            out.push('!');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

pub fn unescape_module_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut chars = path.chars();
    while let Some(c) = chars.next() {
        match c {
            '!' => out.extend(chars.next().map(|c| c.to_ascii_uppercase())),
            c => out.push(c),
        }
    }
    out
}

/// `github.com/!acme/lib@v1.2.3/sub` → `github.com/Acme/lib/sub`.
fn cache_import_path(rel: &str) -> Option<String> {
    let at = rel.find('@')?;
    let rest = rel[at..].find('/').map(|i| &rel[at + i..]).unwrap_or("");
    Some(format!("{}{rest}", unescape_module_path(&rel[..at])))
}

fn slashed(rel: &Path) -> String {
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn canonical(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Derives the import path of a canonical package directory.
pub fn import_path_for(ctx: &BuildContext, dir: &Path) -> String {
    if let Some(root) = &ctx.module_root {
        if let Some(module) = module_path(root) {
            let root = canonical(root);
            if let Ok(rel) = dir.strip_prefix(root.join("vendor")) {
                return slashed(rel);
            }
            if let Ok(rel) = dir.strip_prefix(&root) {
                let rel = slashed(rel);
                return if rel.is_empty() {
                    module
                } else {
                    format!("{module}/{rel}")
                };
            }
        }
    }
    if let Some(cache) = ctx.module_cache() {
        if let Ok(rel) = dir.strip_prefix(canonical(&cache)) {
            if let Some(path) = cache_import_path(&slashed(rel)) {
                return path;
            }
        }
    }
    let roots = ctx.goroot.iter().chain(ctx.gopath.iter());
    for root in roots {
        let src = canonical(&root.join("src"));
        if let Ok(rel) = dir.strip_prefix(&src) {
            let rel = slashed(rel);
            if !rel.is_empty() {
                return rel;
            }
        }
    }
    dir.to_string_lossy().into_owned()
}
