//! Generators that hand a synthesized interface to the outside world.

use crate::imports::default_package_name;
use crate::interface::SynthesizedInterface;
use crate::types::{InterfaceElem, PackageId, Signature, Type};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;

const TOOL: &str = "mockpkg";

pub trait Generator {
    /// Writes `iface` for use from the package at `package_path`.
    fn generate(
        &self,
        iface: &SynthesizedInterface,
        package_path: &str,
        out: &mut dyn Write,
    ) -> io::Result<()>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    #[default]
    Go,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(OutputFormat::Json),
            "go" => Ok(OutputFormat::Go),
            other => Err(format!("unknown output format {other:?} (expected json or go)")),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OutputFormat::Json => "json",
            OutputFormat::Go => "go",
        })
    }
}

pub fn generator_for(format: OutputFormat) -> Box<dyn Generator> {
    match format {
        OutputFormat::Json => Box::new(JsonGenerator::new()),
        OutputFormat::Go => Box::new(InterfaceSourceGenerator::new()),
    }
}

#[derive(Serialize)]
struct JsonMethod<'a> {
    name: &'a str,
    signature: String,
    file: String,
    line: usize,
}

#[derive(Serialize)]
struct JsonEnvelope<'a> {
    generator: &'a str,
    version: &'a str,
    generated_at: String,
    package_path: &'a str,
    name: &'a str,
    package: &'a PackageId,
    methods: Vec<JsonMethod<'a>>,
    interface: &'a SynthesizedInterface,
}

/// Machine-readable dump: a summary of each member plus the full
/// interface value.
#[derive(Debug, Default)]
pub struct JsonGenerator;

impl JsonGenerator {
    pub fn new() -> Self {
        Self
    }
}

impl Generator for JsonGenerator {
    fn generate(
        &self,
        iface: &SynthesizedInterface,
        package_path: &str,
        out: &mut dyn Write,
    ) -> io::Result<()> {
        let envelope = JsonEnvelope {
            generator: TOOL,
            version: env!("CARGO_PKG_VERSION"),
            generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            package_path,
            name: &iface.name,
            package: &iface.package,
            methods: iface
                .aggregate
                .methods
                .iter()
                .map(|m| JsonMethod {
                    name: &m.name,
                    signature: m.signature.to_string(),
                    file: m.file.display().to_string(),
                    line: m.position.line,
                })
                .collect(),
            interface: iface,
        };
        serde_json::to_writer_pretty(&mut *out, &envelope)?;
        writeln!(out)
    }
}

/// Emits a Go source file declaring the interface.
#[derive(Debug, Default)]
pub struct InterfaceSourceGenerator;

impl InterfaceSourceGenerator {
    pub fn new() -> Self {
        Self
    }

    pub fn render(&self, iface: &SynthesizedInterface, package_path: &str) -> String {
        let package_name = if package_path == iface.package.path {
            iface.package.name.clone()
        } else {
            default_package_name(package_path)
        };

        let mut used = BTreeSet::new();
        for method in &iface.aggregate.methods {
            collect_signature(&method.signature, &mut used);
        }
        used.retain(|p| p.path != package_path && p.path != "C");
        let imports = ImportNames::assign(&used, &package_name);
        let qualify = |package: &PackageId| -> String {
            if package.path == package_path {
                String::new()
            } else {
                imports.name_of(package)
            }
        };

        let mut output = String::new();
        output.push_str(&format!(
            "// Code generated by {TOOL} from {}. DO NOT EDIT.\n\n",
            iface.package.path
        ));
        output.push_str(&format!("package {package_name}\n\n"));

        if !imports.is_empty() {
            output.push_str("import (\n");
            for (package, name) in &imports.names {
                if *name == default_package_name(&package.path) {
                    output.push_str(&format!("\t{:?}\n", package.path));
                } else {
                    output.push_str(&format!("\t{name} {:?}\n", package.path));
                }
            }
            output.push_str(")\n\n");
        }

        output.push_str(&format!(
            "// {} is the exported function set of package {}.\n",
            iface.name, iface.package.path
        ));
        output.push_str(&format!("type {} interface {{\n", iface.name));
        for method in &iface.aggregate.methods {
            output.push_str(&format!(
                "\t{}{}\n",
                method.name,
                method.signature.render(&qualify)
            ));
        }
        output.push_str("}\n");
        output
    }
}

impl Generator for InterfaceSourceGenerator {
    fn generate(
        &self,
        iface: &SynthesizedInterface,
        package_path: &str,
        out: &mut dyn Write,
    ) -> io::Result<()> {
        out.write_all(self.render(iface, package_path).as_bytes())
    }
}

/// Local names for imported packages, made unique against each other and
/// against the generated file's own package name.
struct ImportNames {
    names: BTreeMap<PackageId, String>,
}

impl ImportNames {
    fn assign(packages: &BTreeSet<PackageId>, own: &str) -> Self {
        let mut taken: BTreeSet<String> = BTreeSet::from([own.to_string()]);
        let mut names = BTreeMap::new();
        for package in packages {
            let mut name = package.name.clone();
            let mut n = 2;
            while taken.contains(&name) {
                name = format!("{}{n}", package.name);
                n += 1;
            }
            taken.insert(name.clone());
            names.insert(package.clone(), name);
        }
        ImportNames { names }
    }

    fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    fn name_of(&self, package: &PackageId) -> String {
        self.names
            .get(package)
            .cloned()
            .unwrap_or_else(|| package.name.clone())
    }
}

fn collect_signature(sig: &Signature, out: &mut BTreeSet<PackageId>) {
    for param in sig.type_params.iter() {
        collect_type(&param.constraint, out);
    }
    for var in sig.params.iter().chain(sig.results.iter()) {
        collect_type(&var.ty, out);
    }
}

fn collect_type(ty: &Type, out: &mut BTreeSet<PackageId>) {
    match ty {
        Type::Named(named) => {
            if let Some(package) = &named.package {
                out.insert(package.clone());
            }
            for arg in &named.args {
                collect_type(arg, out);
            }
        }
        Type::Pointer(elem) | Type::Slice(elem) => collect_type(elem, out),
        Type::Array { elem, .. } | Type::Chan { elem, .. } => collect_type(elem, out),
        Type::Map { key, value } => {
            collect_type(key, out);
            collect_type(value, out);
        }
        Type::Func(sig) => collect_signature(sig, out),
        Type::Struct(fields) => {
            for field in fields {
                collect_type(&field.ty, out);
            }
        }
        Type::Interface(elems) => {
            for elem in elems {
                match elem {
                    InterfaceElem::Method { signature, .. } => collect_signature(signature, out),
                    InterfaceElem::Embedded(ty) => collect_type(ty, out),
                }
            }
        }
        Type::Basic(_) | Type::TypeParam(_) | Type::Opaque(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Position;
    use crate::interface::{InterfaceType, NamedType};
    use crate::types::{BasicKind, Func, NamedRef, Var};
    use std::path::PathBuf;

    fn named(path: &str, name: &str, ty: &str) -> Type {
        Type::Named(NamedRef {
            package: Some(PackageId::new(path, name)),
            name: ty.to_string(),
            args: Vec::new(),
        })
    }

    fn sample() -> SynthesizedInterface {
        let own = PackageId::new("example.com/store", "store");
        let method = |name: &str, params: Vec<Type>, results: Vec<Type>| Func {
            name: name.into(),
            package: own.clone(),
            signature: Signature {
                params: params.into_iter().map(|ty| Var { name: None, ty }).collect(),
                results: results.into_iter().map(|ty| Var { name: None, ty }).collect(),
                ..Signature::default()
            },
            file: PathBuf::from("/src/store/store.go"),
            position: Position { line: 7, column: 1 },
        };
        let methods = vec![
            method(
                "Open",
                vec![named("context", "context", "Context"), Type::Basic(BasicKind::String)],
                vec![Type::Pointer(Box::new(named("example.com/store", "store", "DB"))), Type::universe("error")],
            ),
            method(
                "Render",
                vec![named("html/template", "template", "Template"), named("text/template", "template", "Template")],
                vec![],
            ),
        ];
        SynthesizedInterface {
            name: "Store".into(),
            package: own.clone(),
            aggregate: InterfaceType::new(methods),
            named: NamedType {
                name: "Store".into(),
                package: own,
            },
        }
    }

    #[test]
    fn formats_parse() {
        assert_eq!("json".parse::<OutputFormat>(), Ok(OutputFormat::Json));
        assert_eq!("go".parse::<OutputFormat>(), Ok(OutputFormat::Go));
        assert!("yaml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn renders_go_interface_in_source_package() {
        let text = InterfaceSourceGenerator::new().render(&sample(), "example.com/store");
        assert!(text.starts_with("// Code generated by mockpkg from example.com/store. DO NOT EDIT."));
        assert!(text.contains("package store\n"));
        assert!(text.contains("\t\"context\"\n"));
        assert!(text.contains("\t\"html/template\"\n"));
        assert!(text.contains("\ttemplate2 \"text/template\"\n"));
        assert!(text.contains("type Store interface {\n"));
        assert!(text.contains("\tOpen(context.Context, string) (*DB, error)\n"));
        assert!(text.contains("\tRender(template.Template, template2.Template)\n"));
    }

    #[test]
    fn qualifies_source_package_from_elsewhere() {
        let text = InterfaceSourceGenerator::new().render(&sample(), "example.com/store/mocks");
        assert!(text.contains("package mocks\n"));
        assert!(text.contains("\t\"example.com/store\"\n"));
        assert!(text.contains("\tOpen(context.Context, string) (*store.DB, error)\n"));
    }

    #[test]
    fn json_envelope() {
        let mut buf = Vec::new();
        JsonGenerator::new()
            .generate(&sample(), "example.com/store", &mut buf)
            .expect("generate");
        let value: serde_json::Value = serde_json::from_slice(&buf).expect("json");
        assert_eq!(value["generator"], "mockpkg");
        assert_eq!(value["name"], "Store");
        assert_eq!(value["package"]["path"], "example.com/store");
        assert_eq!(value["methods"][0]["name"], "Open");
        assert_eq!(
            value["methods"][0]["signature"],
            "(context.Context, string) (*example.com/store.DB, error)"
        );
        assert_eq!(value["methods"][0]["line"], 7);
        assert!(value["generated_at"].as_str().is_some_and(|s| s.ends_with('Z')));
    }
}
