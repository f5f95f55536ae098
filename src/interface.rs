//! Assembles the resolved exported functions of a package into one
//! synthetic interface type.

use crate::diagnostic::{Diagnostic, SkipKind};
use crate::error::{MockError, Result};
use crate::symbol::ResolvedPackage;
use crate::types::{Func, Object, PackageId};
use crate::visitor::DeclaredNames;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use tracing::warn;

/// The caller's filter on declared names. Empty admits every name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DesiredNames {
    names: Vec<String>,
}

impl DesiredNames {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names: Vec<String> = names.into_iter().map(Into::into).collect();
        names.sort_unstable();
        names.dedup();
        DesiredNames { names }
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn admits(&self, name: &str) -> bool {
        self.names.is_empty() || self.names.binary_search_by(|n| n.as_str().cmp(name)).is_ok()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.names
    }
}

impl<S: Into<String>> FromIterator<S> for DesiredNames {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        DesiredNames::new(iter)
    }
}

/// Method set of the synthesized interface, sorted by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterfaceType {
    pub methods: Vec<Func>,
}

impl InterfaceType {
    pub fn new(mut methods: Vec<Func>) -> Self {
        methods.sort_by(|a, b| a.name.cmp(&b.name));
        InterfaceType { methods }
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    pub fn method(&self, name: &str) -> Option<&Func> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.methods.iter().map(|m| m.name.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamedType {
    pub name: String,
    pub package: PackageId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SynthesizedInterface {
    pub name: String,
    pub package: PackageId,
    pub aggregate: InterfaceType,
    pub named: NamedType,
}

impl fmt::Display for SynthesizedInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} interface{{", self.name)?;
        for (i, method) in self.aggregate.methods.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}{}", method.name, method.signature)?;
        }
        f.write_str("}")
    }
}

/// Base name of `dir` with its first character upper-cased; the package
/// name stands in when the directory has no base name.
pub fn interface_name(dir: &Path, package: &str) -> String {
    let base = dir
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| package.to_string());
    let mut chars = base.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Intersects the declared names with `desired` and resolves the survivors
/// against the single package in `packages`. Names that do not resolve to a
/// non-generic function are skipped and reported as diagnostics.
pub fn synthesize(
    source_dir: &Path,
    packages: &[ResolvedPackage],
    declared: &DeclaredNames,
    desired: &DesiredNames,
) -> Result<(SynthesizedInterface, Vec<Diagnostic>)> {
    let package = match packages {
        [] => {
            return Err(MockError::EmptyInterface {
                name: interface_name(source_dir, ""),
            })
        }
        [package] => package,
        _ => {
            return Err(MockError::AmbiguousUnit {
                packages: packages.iter().map(|p| p.id.name.clone()).collect(),
            })
        }
    };
    let name = interface_name(source_dir, &package.id.name);

    let mut members = Vec::new();
    let mut diagnostics = Vec::new();
    for (file, names) in declared {
        for declared_name in names.iter().filter(|n| desired.admits(n)) {
            let skip = match package.lookup(declared_name) {
                None => Some((SkipKind::NotFound, "not found in package scope".to_string())),
                Some(Object::Func(func)) if func.is_generic() => Some((
                    SkipKind::Generic,
                    "generic functions cannot be interface methods".to_string(),
                )),
                Some(Object::Func(func)) => {
                    members.push(func.clone());
                    None
                }
                Some(other) => Some((SkipKind::NotAFunction, format!("resolves to a {}", other.kind()))),
            };
            if let Some((kind, reason)) = skip {
                let location = file.display().to_string();
                warn!(name = %declared_name, file = %location, "skipping: {reason}");
                diagnostics.push(Diagnostic {
                    kind,
                    name: declared_name.clone(),
                    message: format!("skipping {declared_name}: {reason}"),
                    location,
                });
            }
        }
    }

    if members.is_empty() {
        return Err(MockError::EmptyInterface { name });
    }

    let interface = SynthesizedInterface {
        named: NamedType {
            name: name.clone(),
            package: package.id.clone(),
        },
        name,
        package: package.id.clone(),
        aggregate: InterfaceType::new(members),
    };
    Ok((interface, diagnostics))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Position;
    use crate::symbol::Scope;
    use crate::types::{Signature, TypeParamDecl, TypeName, Type, Value};
    use std::path::PathBuf;

    fn pkg_id() -> PackageId {
        PackageId::new("example.com/widgets", "widgets")
    }

    fn func(name: &str) -> Object {
        Object::Func(Func {
            name: name.into(),
            package: pkg_id(),
            signature: Signature::default(),
            file: PathBuf::from("/src/widgets/a.go"),
            position: Position::default(),
        })
    }

    fn package(objects: Vec<Object>) -> ResolvedPackage {
        let mut scope = Scope::new();
        for object in objects {
            scope.insert(object).expect("insert");
        }
        ResolvedPackage {
            id: pkg_id(),
            dir: PathBuf::from("/src/widgets"),
            files: vec![PathBuf::from("/src/widgets/a.go")],
            imports: Vec::new(),
            scope,
        }
    }

    fn declared(names: &[&str]) -> DeclaredNames {
        let mut map = DeclaredNames::new();
        map.insert(
            PathBuf::from("/src/widgets/a.go"),
            names.iter().map(|n| n.to_string()).collect(),
        );
        map
    }

    #[test]
    fn desired_names_are_sorted_and_deduplicated() {
        let desired: DesiredNames = ["Zed", "Alpha", "Zed"].into_iter().collect();
        assert_eq!(desired.as_slice(), ["Alpha", "Zed"]);
        assert!(desired.admits("Alpha"));
        assert!(!desired.admits("Mid"));
        assert!(DesiredNames::all().admits("Anything"));
    }

    #[test]
    fn names_from_directory() {
        assert_eq!(interface_name(Path::new("/src/widgets"), "w"), "Widgets");
        assert_eq!(interface_name(Path::new("/src/élan"), "e"), "Élan");
        assert_eq!(interface_name(Path::new("/"), "root"), "Root");
    }

    #[test]
    fn collects_functions_sorted_by_name() {
        let pkg = package(vec![func("Zeta"), func("Alpha"), func("Mid")]);
        let (iface, diags) = synthesize(
            Path::new("/src/widgets"),
            &[pkg],
            &declared(&["Zeta", "Alpha", "Mid"]),
            &DesiredNames::all(),
        )
        .expect("synthesize");
        assert!(diags.is_empty());
        assert_eq!(iface.name, "Widgets");
        assert_eq!(iface.named.name, "Widgets");
        assert_eq!(iface.package, pkg_id());
        assert_eq!(iface.aggregate.names().collect::<Vec<_>>(), vec!["Alpha", "Mid", "Zeta"]);
        assert_eq!(iface.to_string(), "Widgets interface{Alpha(); Mid(); Zeta()}");
    }

    #[test]
    fn desired_filter_intersects() {
        let pkg = package(vec![func("Foo"), func("Bar")]);
        let (iface, diags) = synthesize(
            Path::new("/src/widgets"),
            &[pkg],
            &declared(&["Foo", "Bar"]),
            &DesiredNames::new(["Foo", "Qux"]),
        )
        .expect("synthesize");
        assert!(diags.is_empty());
        assert_eq!(iface.aggregate.names().collect::<Vec<_>>(), vec!["Foo"]);
    }

    #[test]
    fn skips_unresolvable_names() {
        let generic = Object::Func(Func {
            signature: Signature {
                type_params: vec![TypeParamDecl {
                    name: "T".into(),
                    constraint: Type::Interface(Vec::new()),
                }],
                ..Signature::default()
            },
            ..match func("Map") {
                Object::Func(f) => f,
                _ => unreachable!(),
            }
        });
        let not_func = Object::TypeName(TypeName {
            name: "Thing".into(),
            package: pkg_id(),
            alias: false,
            type_params: Vec::new(),
            ty: Type::Struct(Vec::new()),
            methods: Vec::new(),
            file: PathBuf::from("/src/widgets/a.go"),
            position: Position::default(),
        });
        let var = Object::Var(Value {
            name: "Var".into(),
            package: pkg_id(),
            ty: None,
            file: PathBuf::from("/src/widgets/a.go"),
            position: Position::default(),
        });
        let pkg = package(vec![func("Keep"), generic, not_func, var]);
        let (iface, diags) = synthesize(
            Path::new("/src/widgets"),
            &[pkg],
            &declared(&["Keep", "Map", "Thing", "Var", "Gone"]),
            &DesiredNames::all(),
        )
        .expect("synthesize");
        assert_eq!(iface.aggregate.len(), 1);
        let kinds: Vec<(SkipKind, &str)> = diags.iter().map(|d| (d.kind, d.name.as_str())).collect();
        assert_eq!(
            kinds,
            vec![
                (SkipKind::Generic, "Map"),
                (SkipKind::NotAFunction, "Thing"),
                (SkipKind::NotAFunction, "Var"),
                (SkipKind::NotFound, "Gone"),
            ]
        );
        assert!(diags[1].message.contains("type"));
    }

    #[test]
    fn empty_result_is_an_error() {
        let pkg = package(vec![func("Foo")]);
        let err = synthesize(
            Path::new("/src/widgets"),
            &[pkg],
            &declared(&["Foo"]),
            &DesiredNames::new(["Bar"]),
        )
        .unwrap_err();
        assert!(matches!(err, MockError::EmptyInterface { ref name } if name == "Widgets"));
    }

    #[test]
    fn package_count_must_be_one() {
        let err = synthesize(
            Path::new("/src/widgets"),
            &[],
            &DeclaredNames::new(),
            &DesiredNames::all(),
        )
        .unwrap_err();
        assert!(matches!(err, MockError::EmptyInterface { .. }));

        let mut other = package(vec![func("Foo")]);
        other.id = PackageId::new("example.com/widgets", "main");
        let err = synthesize(
            Path::new("/src/widgets"),
            &[package(vec![func("Foo")]), other],
            &declared(&["Foo"]),
            &DesiredNames::all(),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "too many packages: widgets, main");
    }
}
