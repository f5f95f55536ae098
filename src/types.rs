//! Resolved types and package-level objects produced by the checker.

use crate::ast::{ChanDir, Position};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Identity of a package: its import path and its declared name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PackageId {
    pub path: String,
    pub name: String,
}

impl PackageId {
    pub fn new(path: impl Into<String>, name: impl Into<String>) -> Self {
        PackageId {
            path: path.into(),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BasicKind {
    Bool,
    Int,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Uintptr,
    Float32,
    Float64,
    Complex64,
    Complex128,
    String,
    Byte,
    Rune,
}

impl BasicKind {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "bool" => BasicKind::Bool,
            "int" => BasicKind::Int,
            "int8" => BasicKind::Int8,
            "int16" => BasicKind::Int16,
            "int32" => BasicKind::Int32,
            "int64" => BasicKind::Int64,
            "uint" => BasicKind::Uint,
            "uint8" => BasicKind::Uint8,
            "uint16" => BasicKind::Uint16,
            "uint32" => BasicKind::Uint32,
            "uint64" => BasicKind::Uint64,
            "uintptr" => BasicKind::Uintptr,
            "float32" => BasicKind::Float32,
            "float64" => BasicKind::Float64,
            "complex64" => BasicKind::Complex64,
            "complex128" => BasicKind::Complex128,
            "string" => BasicKind::String,
            "byte" => BasicKind::Byte,
            "rune" => BasicKind::Rune,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            BasicKind::Bool => "bool",
            BasicKind::Int => "int",
            BasicKind::Int8 => "int8",
            BasicKind::Int16 => "int16",
            BasicKind::Int32 => "int32",
            BasicKind::Int64 => "int64",
            BasicKind::Uint => "uint",
            BasicKind::Uint8 => "uint8",
            BasicKind::Uint16 => "uint16",
            BasicKind::Uint32 => "uint32",
            BasicKind::Uint64 => "uint64",
            BasicKind::Uintptr => "uintptr",
            BasicKind::Float32 => "float32",
            BasicKind::Float64 => "float64",
            BasicKind::Complex64 => "complex64",
            BasicKind::Complex128 => "complex128",
            BasicKind::String => "string",
            BasicKind::Byte => "byte",
            BasicKind::Rune => "rune",
        }
    }
}

/// Reference to a defined type. `package` is `None` for universe types
/// (`error`, `comparable`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamedRef {
    pub package: Option<PackageId>,
    pub name: String,
    pub args: Vec<Type>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Type {
    Basic(BasicKind),
    Named(NamedRef),
    TypeParam(String),
    Pointer(Box<Type>),
    Slice(Box<Type>),
    Array { len: String, elem: Box<Type> },
    Map { key: Box<Type>, value: Box<Type> },
    Chan { dir: ChanDir, elem: Box<Type> },
    Func(Box<Signature>),
    Struct(Vec<Field>),
    Interface(Vec<InterfaceElem>),
    /// Constraint syntax that is carried through unchecked.
    Opaque(String),
}

impl Type {
    pub fn universe(name: &str) -> Type {
        Type::Named(NamedRef {
            package: None,
            name: name.to_string(),
            args: Vec::new(),
        })
    }

    /// Renders the type with `qualify` choosing the prefix for each package.
    pub fn render(&self, qualify: &dyn Fn(&PackageId) -> String) -> String {
        let mut out = String::new();
        self.write_to(&mut out, qualify);
        out
    }

    fn write_to(&self, out: &mut String, qualify: &dyn Fn(&PackageId) -> String) {
        match self {
            Type::Basic(kind) => out.push_str(kind.name()),
            Type::Named(named) => {
                if let Some(package) = &named.package {
                    let prefix = qualify(package);
                    if !prefix.is_empty() {
                        out.push_str(&prefix);
                        out.push('.');
                    }
                }
                out.push_str(&named.name);
                if !named.args.is_empty() {
                    out.push('[');
                    for (i, arg) in named.args.iter().enumerate() {
                        if i > 0 {
                            out.push_str(", ");
                        }
                        arg.write_to(out, qualify);
                    }
                    out.push(']');
                }
            }
            Type::TypeParam(name) | Type::Opaque(name) => out.push_str(name),
            Type::Pointer(elem) => {
                out.push('*');
                elem.write_to(out, qualify);
            }
            Type::Slice(elem) => {
                out.push_str("[]");
                elem.write_to(out, qualify);
            }
            Type::Array { len, elem } => {
                out.push('[');
                out.push_str(len);
                out.push(']');
                elem.write_to(out, qualify);
            }
            Type::Map { key, value } => {
                out.push_str("map[");
                key.write_to(out, qualify);
                out.push(']');
                value.write_to(out, qualify);
            }
            Type::Chan { dir, elem } => {
                out.push_str(match dir {
                    ChanDir::Both => "chan ",
                    ChanDir::Send => "chan<- ",
                    ChanDir::Recv => "<-chan ",
                });
                let parens = *dir != ChanDir::Recv
                    && matches!(**elem, Type::Chan { dir: ChanDir::Recv, .. });
                if parens {
                    out.push('(');
                }
                elem.write_to(out, qualify);
                if parens {
                    out.push(')');
                }
            }
            Type::Func(sig) => {
                out.push_str("func");
                sig.write_to(out, qualify);
            }
            Type::Struct(fields) => {
                out.push_str("struct{");
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        out.push_str("; ");
                    }
                    if !field.embedded {
                        out.push_str(&field.name);
                        out.push(' ');
                    }
                    field.ty.write_to(out, qualify);
                }
                out.push('}');
            }
            Type::Interface(elems) if elems.is_empty() => out.push_str("interface{}"),
            Type::Interface(elems) => {
                out.push_str("interface{");
                for (i, elem) in elems.iter().enumerate() {
                    if i > 0 {
                        out.push_str("; ");
                    }
                    match elem {
                        InterfaceElem::Method { name, signature } => {
                            out.push_str(name);
                            signature.write_to(out, qualify);
                        }
                        InterfaceElem::Embedded(ty) => ty.write_to(out, qualify),
                    }
                }
                out.push('}');
            }
        }
    }
}

/// Qualifies by full import path, the way compiler diagnostics print types.
fn path_qualifier(package: &PackageId) -> String {
    package.path.clone()
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(&path_qualifier))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Field {
    pub name: String,
    pub ty: Type,
    pub embedded: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum InterfaceElem {
    Method { name: String, signature: Signature },
    Embedded(Type),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Var {
    pub name: Option<String>,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeParamDecl {
    pub name: String,
    pub constraint: Type,
}

/// A function signature. For a variadic signature the last parameter's type
/// is the slice type `[]T`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Signature {
    pub type_params: Vec<TypeParamDecl>,
    pub params: Vec<Var>,
    pub results: Vec<Var>,
    pub variadic: bool,
}

impl Signature {
    pub fn render(&self, qualify: &dyn Fn(&PackageId) -> String) -> String {
        let mut out = String::new();
        self.write_to(&mut out, qualify);
        out
    }

    fn write_to(&self, out: &mut String, qualify: &dyn Fn(&PackageId) -> String) {
        out.push('(');
        let last = self.params.len().saturating_sub(1);
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            if let Some(name) = &param.name {
                out.push_str(name);
                out.push(' ');
            }
            match &param.ty {
                Type::Slice(elem) if self.variadic && i == last => {
                    out.push_str("...");
                    elem.write_to(out, qualify);
                }
                ty => ty.write_to(out, qualify),
            }
        }
        out.push(')');

        match self.results.as_slice() {
            [] => {}
            [single] if single.name.is_none() => {
                out.push(' ');
                single.ty.write_to(out, qualify);
            }
            results => {
                out.push_str(" (");
                for (i, result) in results.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    if let Some(name) = &result.name {
                        out.push_str(name);
                        out.push(' ');
                    }
                    result.ty.write_to(out, qualify);
                }
                out.push(')');
            }
        }
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(&path_qualifier))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Func {
    pub name: String,
    pub package: PackageId,
    pub signature: Signature,
    pub file: PathBuf,
    pub position: Position,
}

impl Func {
    pub fn is_generic(&self) -> bool {
        !self.signature.type_params.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Method {
    pub name: String,
    pub pointer_receiver: bool,
    pub signature: Signature,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeName {
    pub name: String,
    pub package: PackageId,
    pub alias: bool,
    pub type_params: Vec<TypeParamDecl>,
    /// The alias target, or the underlying type of a defined type.
    pub ty: Type,
    pub methods: Vec<Method>,
    pub file: PathBuf,
    pub position: Position,
}

/// A package-level `const` or `var`; `ty` is `None` when it is inferred
/// from an initializer the checker does not evaluate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Value {
    pub name: String,
    pub package: PackageId,
    pub ty: Option<Type>,
    pub file: PathBuf,
    pub position: Position,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ObjectKind {
    Func,
    TypeName,
    Const,
    Var,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ObjectKind::Func => "func",
            ObjectKind::TypeName => "type",
            ObjectKind::Const => "const",
            ObjectKind::Var => "var",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Object {
    Func(Func),
    TypeName(TypeName),
    Const(Value),
    Var(Value),
}

impl Object {
    pub fn name(&self) -> &str {
        match self {
            Object::Func(func) => &func.name,
            Object::TypeName(type_name) => &type_name.name,
            Object::Const(value) | Object::Var(value) => &value.name,
        }
    }

    pub fn kind(&self) -> ObjectKind {
        match self {
            Object::Func(_) => ObjectKind::Func,
            Object::TypeName(_) => ObjectKind::TypeName,
            Object::Const(_) => ObjectKind::Const,
            Object::Var(_) => ObjectKind::Var,
        }
    }

    pub fn as_func(&self) -> Option<&Func> {
        match self {
            Object::Func(func) => Some(func),
            _ => None,
        }
    }
}
