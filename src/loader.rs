use crate::context::BuildContext;
use crate::error::{MockError, Result};
use crate::parser::{group_units, parse_file, SourceUnit};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Go source files with a non-test name.
pub fn is_candidate(name: &str) -> bool {
    name.ends_with(".go") && !name.ends_with("_test.go")
}

/// Lists the files of `dir` that belong to the build under `ctx`, sorted by
/// file name. Subdirectories are not visited.
pub fn collect_source_files(dir: &Path, ctx: &BuildContext) -> Result<Vec<PathBuf>> {
    let mut result = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|err| MockError::DirectoryRead {
            dir: dir.to_path_buf(),
            source: err.into(),
        })?;
        // Symlinked sources count when they point at a regular file.
        let is_file = entry.file_type().is_file()
            || (entry.path_is_symlink() && entry.path().is_file());
        if !is_file {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        if !is_candidate(name) {
            continue;
        }
        if !ctx.match_file(dir, name)? {
            debug!(file = name, "excluded by build constraints");
            continue;
        }
        result.push(entry.path().to_path_buf());
    }
    Ok(result)
}

/// Filters and parses `dir`, grouping the files into compilation units.
pub fn load_dir(dir: &Path, ctx: &BuildContext) -> Result<Vec<SourceUnit>> {
    let files = collect_source_files(dir, ctx)?;
    debug!(dir = %dir.display(), count = files.len(), "parsing source files");
    let mut parsed = Vec::with_capacity(files.len());
    for path in files {
        parsed.push(parse_file(&path)?);
    }
    Ok(group_units(parsed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn write(dir: &Path, name: &str, text: &str) {
        fs::write(dir.join(name), text).expect("write fixture");
    }

    fn names(files: &[PathBuf]) -> Vec<String> {
        files
            .iter()
            .filter_map(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn candidate_names() {
        assert!(is_candidate("a.go"));
        assert!(!is_candidate("a_test.go"));
        assert!(!is_candidate("a.go.txt"));
        assert!(!is_candidate("README.md"));
    }

    #[test]
    fn filters_by_name_and_constraints() {
        let tmp = tempdir().expect("tempdir");
        let dir = tmp.path();
        write(dir, "a.go", "package p\n");
        write(dir, "a_test.go", "package p\n");
        write(dir, "b_windows.go", "package p\n");
        write(dir, "c.go", "//go:build integration\n\npackage p\n");
        write(dir, "d.go", "// +build ignore\n\npackage p\n");
        write(dir, "_scratch.go", "package p\n");
        write(dir, ".hidden.go", "package p\n");
        write(dir, "notes.txt", "package p\n");
        fs::create_dir_all(dir.join("sub.go")).expect("mkdir");

        let ctx = BuildContext::new("linux", "amd64");
        let files = collect_source_files(dir, &ctx).expect("collect");
        assert_eq!(names(&files), vec!["a.go"]);

        let mut tagged = ctx.clone();
        tagged.add_tags(["integration"]);
        let files = collect_source_files(dir, &tagged).expect("collect");
        assert_eq!(names(&files), vec!["a.go", "c.go"]);
    }

    #[test]
    fn malformed_directive_is_a_filter_error() {
        let tmp = tempdir().expect("tempdir");
        write(tmp.path(), "a.go", "//go:build linux &&\n\npackage p\n");
        let ctx = BuildContext::new("linux", "amd64");
        let err = collect_source_files(tmp.path(), &ctx).unwrap_err();
        assert!(matches!(err, MockError::Filter { .. }));
    }

    #[test]
    fn unreadable_directory() {
        let tmp = tempdir().expect("tempdir");
        let ctx = BuildContext::new("linux", "amd64");
        let err = collect_source_files(&tmp.path().join("missing"), &ctx).unwrap_err();
        assert!(matches!(err, MockError::DirectoryRead { .. }));
    }

    #[test]
    fn cgo_files_need_cgo() {
        let tmp = tempdir().expect("tempdir");
        write(tmp.path(), "a.go", "package p\n\nimport \"C\"\n\nfunc A() {}\n");
        let mut ctx = BuildContext::new("linux", "amd64");
        assert!(collect_source_files(tmp.path(), &ctx).expect("collect").is_empty());
        ctx.cgo_enabled = true;
        assert_eq!(collect_source_files(tmp.path(), &ctx).expect("collect").len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn follows_symlinked_sources() {
        let tmp = tempdir().expect("tempdir");
        let generated = tmp.path().join("generated");
        let pkg = tmp.path().join("pkg");
        fs::create_dir_all(&generated).expect("mkdir");
        fs::create_dir_all(&pkg).expect("mkdir");
        write(&generated, "gen.go", "package p\n\nfunc Generated() {}\n");
        write(&pkg, "a.go", "package p\n\nfunc Foo() {}\n");
        std::os::unix::fs::symlink(generated.join("gen.go"), pkg.join("gen.go")).expect("symlink");
        std::os::unix::fs::symlink(generated.join("gone.go"), pkg.join("dangling.go")).expect("symlink");

        let ctx = BuildContext::new("linux", "amd64");
        let files = collect_source_files(&pkg, &ctx).expect("collect");
        assert_eq!(names(&files), vec!["a.go", "gen.go"]);
        let units = load_dir(&pkg, &ctx).expect("load");
        assert_eq!(units[0].files.len(), 2);
    }

    #[test]
    fn load_dir_parses_into_units() {
        let tmp = tempdir().expect("tempdir");
        write(tmp.path(), "a.go", "package p\n\nfunc A() {}\n");
        write(tmp.path(), "b.go", "package p\n\nfunc B() {}\n");
        let ctx = BuildContext::new("linux", "amd64");
        let units = load_dir(tmp.path(), &ctx).expect("load");
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].package, "p");
        assert_eq!(units[0].files.len(), 2);
    }

    #[test]
    fn load_dir_stops_at_first_parse_error() {
        let tmp = tempdir().expect("tempdir");
        write(tmp.path(), "a.go", "package p\n\nfunc A( {\n");
        let ctx = BuildContext::new("linux", "amd64");
        let err = load_dir(tmp.path(), &ctx).unwrap_err();
        assert!(matches!(err, MockError::Parse { .. }));
    }
}
