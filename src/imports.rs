//! Import resolution for the checker: the `Importer` seam, its default
//! source-tree implementation, and the per-file import bindings.

use crate::ast::{Decl, Position};
use crate::context::BuildContext;
use crate::loader::collect_source_files;
use crate::locator::find_import_dir;
use crate::parser::parse_file;
use crate::types::PackageId;
use crate::visitor::is_exported;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImportError {
    #[error("cannot find package {path:?}")]
    NotFound { path: String },
    #[error("cannot import {path:?}: {message}")]
    Invalid { path: String, message: String },
}

/// Maps an import path to the identity of the imported package. Imported
/// packages are never type-checked themselves.
pub trait Importer: Sync {
    fn import(&self, path: &str, src_dir: &Path) -> Result<PackageId, ImportError>;

    /// Exported type names of an imported package, used to resolve names
    /// brought in by dot imports. `None` when the importer cannot tell.
    fn exported_types(
        &self,
        _package: &PackageId,
        _src_dir: &Path,
    ) -> Result<Option<BTreeSet<String>>, ImportError> {
        Ok(None)
    }
}

/// Resolves imports against the source roots of a `BuildContext`, falling
/// back to the standard library's package list when GOROOT is unavailable.
#[derive(Debug, Clone)]
pub struct SourceImporter {
    ctx: Arc<BuildContext>,
}

impl SourceImporter {
    pub fn new(ctx: Arc<BuildContext>) -> Self {
        SourceImporter { ctx }
    }
}

impl Importer for SourceImporter {
    fn import(&self, path: &str, src_dir: &Path) -> Result<PackageId, ImportError> {
        if path == "C" || path == "unsafe" {
            return Ok(PackageId::new(path, path));
        }
        match find_import_dir(&self.ctx, path, src_dir) {
            Ok(dir) => package_name_in(&self.ctx, &dir, path).map(|name| PackageId::new(path, name)),
            Err(_) if is_std_package(path) => Ok(PackageId::new(path, default_package_name(path))),
            Err(_) => Err(ImportError::NotFound {
                path: path.to_string(),
            }),
        }
    }

    fn exported_types(
        &self,
        package: &PackageId,
        src_dir: &Path,
    ) -> Result<Option<BTreeSet<String>>, ImportError> {
        match package.path.as_str() {
            "C" => Ok(None),
            "unsafe" => Ok(Some(BTreeSet::from(["Pointer".to_string()]))),
            path => match find_import_dir(&self.ctx, path, src_dir) {
                Ok(dir) => type_names_in(&self.ctx, &dir, path).map(Some),
                // Standard library without a GOROOT to read it from.
                Err(_) => Ok(None),
            },
        }
    }
}

fn type_names_in(ctx: &BuildContext, dir: &Path, path: &str) -> Result<BTreeSet<String>, ImportError> {
    let invalid = |message: String| ImportError::Invalid {
        path: path.to_string(),
        message,
    };
    let mut names = BTreeSet::new();
    for file in collect_source_files(dir, ctx).map_err(|err| invalid(err.to_string()))? {
        let parsed = parse_file(&file).map_err(|err| invalid(err.to_string()))?;
        names.extend(parsed.ast.decls.into_iter().filter_map(|decl| match decl {
            Decl::Type(spec) if is_exported(&spec.name) => Some(spec.name),
            _ => None,
        }));
    }
    Ok(names)
}

/// Reads the package clause of the first buildable file in `dir`.
fn package_name_in(ctx: &BuildContext, dir: &Path, path: &str) -> Result<String, ImportError> {
    let invalid = |message: String| ImportError::Invalid {
        path: path.to_string(),
        message,
    };
    let files = collect_source_files(dir, ctx).map_err(|err| invalid(err.to_string()))?;
    let first = files.first().ok_or_else(|| {
        invalid(format!("no buildable Go source files in {}", dir.display()))
    })?;
    let parsed = parse_file(first).map_err(|err| invalid(err.to_string()))?;
    Ok(parsed.ast.package)
}

/// Last path element, skipping a trailing major-version element (`/v2`).
pub fn default_package_name(path: &str) -> String {
    let mut segments = path.rsplit('/');
    let last = segments.next().unwrap_or(path);
    let is_version = last.len() > 1
        && last.starts_with('v')
        && last[1..].chars().all(|c| c.is_ascii_digit());
    match segments.next() {
        Some(prev) if is_version => prev.to_string(),
        _ => last.to_string(),
    }
}

pub fn is_std_package(path: &str) -> bool {
    STD_PACKAGES.binary_search(&path).is_ok()
}

/// Standard library import paths (sorted).
pub const STD_PACKAGES: &[&str] = &[
    "archive/tar",
    "archive/zip",
    "bufio",
    "bytes",
    "cmp",
    "compress/bzip2",
    "compress/flate",
    "compress/gzip",
    "compress/lzw",
    "compress/zlib",
    "container/heap",
    "container/list",
    "container/ring",
    "context",
    "crypto",
    "crypto/aes",
    "crypto/cipher",
    "crypto/des",
    "crypto/dsa",
    "crypto/ecdh",
    "crypto/ecdsa",
    "crypto/ed25519",
    "crypto/elliptic",
    "crypto/hmac",
    "crypto/md5",
    "crypto/rand",
    "crypto/rc4",
    "crypto/rsa",
    "crypto/sha1",
    "crypto/sha256",
    "crypto/sha512",
    "crypto/subtle",
    "crypto/tls",
    "crypto/x509",
    "crypto/x509/pkix",
    "database/sql",
    "database/sql/driver",
    "debug/dwarf",
    "debug/elf",
    "debug/gosym",
    "debug/macho",
    "debug/pe",
    "embed",
    "encoding",
    "encoding/ascii85",
    "encoding/asn1",
    "encoding/base32",
    "encoding/base64",
    "encoding/binary",
    "encoding/csv",
    "encoding/gob",
    "encoding/hex",
    "encoding/json",
    "encoding/pem",
    "encoding/xml",
    "errors",
    "expvar",
    "flag",
    "fmt",
    "go/ast",
    "go/build",
    "go/constant",
    "go/format",
    "go/importer",
    "go/parser",
    "go/printer",
    "go/scanner",
    "go/token",
    "go/types",
    "hash",
    "hash/adler32",
    "hash/crc32",
    "hash/crc64",
    "hash/fnv",
    "hash/maphash",
    "html",
    "html/template",
    "image",
    "image/color",
    "image/draw",
    "image/gif",
    "image/jpeg",
    "image/png",
    "io",
    "io/fs",
    "io/ioutil",
    "iter",
    "log",
    "log/slog",
    "log/syslog",
    "maps",
    "math",
    "math/big",
    "math/bits",
    "math/cmplx",
    "math/rand",
    "math/rand/v2",
    "mime",
    "mime/multipart",
    "mime/quotedprintable",
    "net",
    "net/http",
    "net/http/cookiejar",
    "net/http/httptest",
    "net/http/httptrace",
    "net/http/httputil",
    "net/http/pprof",
    "net/mail",
    "net/netip",
    "net/rpc",
    "net/smtp",
    "net/textproto",
    "net/url",
    "os",
    "os/exec",
    "os/signal",
    "os/user",
    "path",
    "path/filepath",
    "plugin",
    "reflect",
    "regexp",
    "regexp/syntax",
    "runtime",
    "runtime/debug",
    "runtime/pprof",
    "runtime/trace",
    "slices",
    "sort",
    "strconv",
    "strings",
    "sync",
    "sync/atomic",
    "syscall",
    "testing",
    "testing/fstest",
    "testing/iotest",
    "testing/quick",
    "text/scanner",
    "text/tabwriter",
    "text/template",
    "time",
    "unicode",
    "unicode/utf16",
    "unicode/utf8",
    "unique",
];

#[derive(Debug, Clone)]
pub struct DotImport {
    pub package: PackageId,
    /// Exported type names, when the importer knows them.
    pub types: Option<BTreeSet<String>>,
}

/// The names an import declaration brings into one file's scope.
#[derive(Debug, Clone, Default)]
pub struct FileImports {
    pub file: PathBuf,
    pub bindings: BTreeMap<String, (PackageId, Position)>,
    pub dot_imports: Vec<DotImport>,
}

impl FileImports {
    pub fn new(file: PathBuf) -> Self {
        FileImports {
            file,
            ..Self::default()
        }
    }

    /// Binds `name`; returns the earlier position when it is already bound.
    pub fn bind(&mut self, name: &str, package: PackageId, pos: Position) -> Result<(), Position> {
        if let Some((_, previous)) = self.bindings.get(name) {
            return Err(*previous);
        }
        self.bindings.insert(name.to_string(), (package, pos));
        Ok(())
    }

    pub fn package(&self, name: &str) -> Option<&PackageId> {
        self.bindings.get(name).map(|(package, _)| package)
    }

    /// Dot-imported packages that may declare type `name`. Packages known
    /// to declare it take precedence over packages whose names are unknown.
    pub fn dot_candidates(&self, name: &str) -> Vec<&PackageId> {
        let known: Vec<&PackageId> = self
            .dot_imports
            .iter()
            .filter(|dot| dot.types.as_ref().is_some_and(|types| types.contains(name)))
            .map(|dot| &dot.package)
            .collect();
        if !known.is_empty() {
            return known;
        }
        self.dot_imports
            .iter()
            .filter(|dot| dot.types.is_none())
            .map(|dot| &dot.package)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn importer_in(dir: &Path) -> SourceImporter {
        let mut ctx = BuildContext::new("linux", "amd64");
        ctx.working_dir = dir.to_path_buf();
        ctx.gopath = vec![dir.join("gopath")];
        SourceImporter::new(Arc::new(ctx))
    }

    #[test]
    fn std_list_is_sorted() {
        let mut sorted = STD_PACKAGES.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, STD_PACKAGES);
    }

    #[test]
    fn default_names() {
        assert_eq!(default_package_name("net/http"), "http");
        assert_eq!(default_package_name("math/rand/v2"), "rand");
        assert_eq!(default_package_name("context"), "context");
        assert_eq!(default_package_name("example.com/v"), "v");
    }

    #[test]
    fn imports_std_without_goroot() {
        let tmp = tempdir().expect("tempdir");
        let importer = importer_in(tmp.path());
        let id = importer.import("net/http", tmp.path()).expect("import");
        assert_eq!(id, PackageId::new("net/http", "http"));
        assert_eq!(importer.import("C", tmp.path()).expect("cgo").name, "C");
    }

    #[test]
    fn reads_package_clause_from_source() {
        let tmp = tempdir().expect("tempdir");
        let dir = tmp.path().join("gopath/src/github.com/acme/go-widgets");
        fs::create_dir_all(&dir).expect("mkdir");
        fs::write(dir.join("widgets.go"), "package widgets\n\nfunc New() {}\n").expect("write");

        let importer = importer_in(tmp.path());
        let id = importer
            .import("github.com/acme/go-widgets", tmp.path())
            .expect("import");
        assert_eq!(id.name, "widgets");
        assert_eq!(id.path, "github.com/acme/go-widgets");
    }

    #[test]
    fn lists_exported_type_names() {
        let tmp = tempdir().expect("tempdir");
        let dir = tmp.path().join("gopath/src/github.com/acme/shapes");
        fs::create_dir_all(&dir).expect("mkdir");
        fs::write(dir.join("a.go"), "package shapes\n\ntype Circle struct{}\ntype radius float64\n").expect("write");
        fs::write(dir.join("b.go"), "package shapes\n\ntype Square = Circle\n\nfunc Area() {}\n").expect("write");

        let importer = importer_in(tmp.path());
        let id = importer.import("github.com/acme/shapes", tmp.path()).expect("import");
        let types = importer
            .exported_types(&id, tmp.path())
            .expect("types")
            .expect("known");
        assert_eq!(types.into_iter().collect::<Vec<_>>(), vec!["Circle", "Square"]);

        let std = importer.import("strings", tmp.path()).expect("std");
        assert_eq!(importer.exported_types(&std, tmp.path()).expect("types"), None);
    }

    #[test]
    fn dot_candidates_prefer_known_declarations() {
        let dot = |path: &str, types: Option<&[&str]>| DotImport {
            package: PackageId::new(path, default_package_name(path)),
            types: types.map(|names| names.iter().map(|n| n.to_string()).collect()),
        };
        let mut imports = FileImports::new(PathBuf::from("a.go"));
        imports.dot_imports = vec![
            dot("strings", Some(&["Builder", "Reader"][..])),
            dot("bytes", Some(&["Buffer", "Reader"][..])),
            dot("example.com/opaque", None),
        ];
        let paths = |name: &str| -> Vec<String> {
            imports
                .dot_candidates(name)
                .into_iter()
                .map(|p| p.path.clone())
                .collect()
        };
        assert_eq!(paths("Buffer"), vec!["bytes"]);
        assert_eq!(paths("Reader"), vec!["strings", "bytes"]);
        assert_eq!(paths("Widget"), vec!["example.com/opaque"]);
    }

    #[test]
    fn missing_package_is_not_found() {
        let tmp = tempdir().expect("tempdir");
        let importer = importer_in(tmp.path());
        let err = importer.import("github.com/acme/missing", tmp.path()).unwrap_err();
        assert!(matches!(err, ImportError::NotFound { .. }));
    }

    #[test]
    fn empty_package_directory_is_invalid() {
        let tmp = tempdir().expect("tempdir");
        fs::create_dir_all(tmp.path().join("gopath/src/github.com/acme/empty")).expect("mkdir");
        let importer = importer_in(tmp.path());
        let err = importer.import("github.com/acme/empty", tmp.path()).unwrap_err();
        assert!(matches!(err, ImportError::Invalid { .. }));
    }

    #[test]
    fn duplicate_bindings_report_first_position() {
        let mut imports = FileImports::new(PathBuf::from("a.go"));
        let first = Position { line: 3, column: 2 };
        imports
            .bind("http", PackageId::new("net/http", "http"), first)
            .expect("bind");
        let err = imports
            .bind("http", PackageId::new("example.com/http", "http"), Position::default())
            .unwrap_err();
        assert_eq!(err, first);
    }
}
