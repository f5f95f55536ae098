//! Package-level type checking of one compilation unit.
//!
//! Only declarations are checked: function bodies and initializers are never
//! looked at. Imported packages are identified through the `Importer` seam
//! and are not checked themselves.

use crate::ast::{
    Decl, FieldExpr, FuncDecl, FuncTypeExpr, ImportName, InterfaceElemExpr, Position, TypeExpr,
    TypeParam, TypeSpec, ValueSpec,
};
use crate::error::{TypeCheckError, TypeCheckErrorKind};
use crate::imports::{DotImport, FileImports, ImportError, Importer};
use crate::parser::SourceUnit;
use crate::symbol::{ResolvedPackage, Scope};
use crate::types::{
    BasicKind, Field, Func, InterfaceElem, Method, NamedRef, Object, ObjectKind, PackageId,
    Signature, Type, TypeName, TypeParamDecl, Value, Var,
};
use crate::visitor::is_exported;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::debug;

type CheckResult<T> = Result<T, TypeCheckError>;

fn error(
    kind: TypeCheckErrorKind,
    file: &Path,
    position: Position,
    message: impl Into<String>,
) -> TypeCheckError {
    TypeCheckError {
        kind,
        file: file.to_path_buf(),
        line: position.line,
        column: position.column,
        message: message.into(),
    }
}

pub fn check_unit(
    unit: &SourceUnit,
    import_path: &str,
    importer: &dyn Importer,
) -> CheckResult<ResolvedPackage> {
    let id = PackageId::new(import_path, unit.package.clone());
    let index = DeclIndex::new(unit)?;
    let (imports, imported) = resolve_imports(unit, importer, &index)?;

    let mut checker = Checker {
        id: &id,
        index: &index,
        imports: &imports,
        alias_stack: Vec::new(),
    };
    let mut scope = Scope::new();
    for file in &unit.files {
        checker.declare_file(&file.path, &file.ast.decls, &mut scope)?;
    }
    for file in &unit.files {
        for decl in &file.ast.decls {
            if let Decl::Func(func) = decl {
                if func.receiver.is_some() {
                    checker.attach_method(&file.path, func, &mut scope)?;
                }
            }
        }
    }

    debug!(package = %id.path, objects = scope.len(), "type-checked package");
    Ok(ResolvedPackage {
        id,
        dir: unit.dir.clone(),
        files: unit.files.iter().map(|f| f.path.clone()).collect(),
        imports: imported.into_iter().collect(),
        scope,
    })
}

/// Where a package-level name was first declared.
struct Site<'a> {
    kind: ObjectKind,
    file: &'a Path,
    position: Position,
    spec: Option<&'a TypeSpec>,
}

/// Every package-level name of the unit, collected before anything is
/// resolved so that declarations may refer to each other in any order.
struct DeclIndex<'a> {
    sites: BTreeMap<&'a str, Site<'a>>,
}

impl<'a> DeclIndex<'a> {
    fn new(unit: &'a SourceUnit) -> CheckResult<Self> {
        let mut index = DeclIndex {
            sites: BTreeMap::new(),
        };
        for file in &unit.files {
            let path = file.path.as_path();
            for decl in &file.ast.decls {
                match decl {
                    Decl::Func(func) if func.receiver.is_none() && func.name != "init" => {
                        index.add(&func.name, ObjectKind::Func, path, func.position, None)?;
                    }
                    Decl::Func(_) => {}
                    Decl::Type(spec) => {
                        index.add(&spec.name, ObjectKind::TypeName, path, spec.position, Some(spec))?;
                    }
                    Decl::Const(spec) => index.add_values(spec, ObjectKind::Const, path)?,
                    Decl::Var(spec) => index.add_values(spec, ObjectKind::Var, path)?,
                }
            }
        }
        Ok(index)
    }

    fn add_values(&mut self, spec: &'a ValueSpec, kind: ObjectKind, file: &'a Path) -> CheckResult<()> {
        for name in &spec.names {
            self.add(name, kind, file, spec.position, None)?;
        }
        Ok(())
    }

    fn add(
        &mut self,
        name: &'a str,
        kind: ObjectKind,
        file: &'a Path,
        position: Position,
        spec: Option<&'a TypeSpec>,
    ) -> CheckResult<()> {
        if name == "_" {
            return Ok(());
        }
        if let Some(previous) = self.sites.get(name) {
            return Err(error(
                TypeCheckErrorKind::AmbiguousSymbol,
                file,
                position,
                format!(
                    "{name} redeclared in this block (previous {} at {}:{}:{})",
                    previous.kind,
                    previous.file.display(),
                    previous.position.line,
                    previous.position.column
                ),
            ));
        }
        self.sites.insert(
            name,
            Site {
                kind,
                file,
                position,
                spec,
            },
        );
        Ok(())
    }
}

/// Resolves the import declarations of every file into per-file bindings,
/// returning the set of distinct imported packages alongside.
fn resolve_imports<'a>(
    unit: &'a SourceUnit,
    importer: &dyn Importer,
    index: &DeclIndex<'_>,
) -> CheckResult<(BTreeMap<&'a Path, FileImports>, BTreeSet<PackageId>)> {
    let mut by_file = BTreeMap::new();
    let mut imported = BTreeSet::new();
    let mut dot_types: BTreeMap<String, Option<BTreeSet<String>>> = BTreeMap::new();
    for file in &unit.files {
        let path = file.path.as_path();
        let mut bindings = FileImports::new(file.path.clone());
        for spec in &file.ast.imports {
            let unresolved = |err: ImportError| {
                error(
                    TypeCheckErrorKind::UnresolvedImport,
                    path,
                    spec.position,
                    format!("could not import {} ({err})", spec.path),
                )
            };
            let package = importer.import(&spec.path, &unit.dir).map_err(unresolved)?;
            imported.insert(package.clone());

            let name = match &spec.name {
                Some(ImportName::Blank) => continue,
                Some(ImportName::Dot) => {
                    let types = match dot_types.get(&package.path) {
                        Some(types) => types.clone(),
                        None => {
                            let types = importer
                                .exported_types(&package, &unit.dir)
                                .map_err(unresolved)?;
                            dot_types.insert(package.path.clone(), types.clone());
                            types
                        }
                    };
                    bindings.dot_imports.push(DotImport { package, types });
                    continue;
                }
                Some(ImportName::Named(name)) => name.clone(),
                None => package.name.clone(),
            };
            if let Some(site) = index.sites.get(name.as_str()) {
                return Err(error(
                    TypeCheckErrorKind::AmbiguousSymbol,
                    site.file,
                    site.position,
                    format!(
                        "{name} already declared through import of package {} at {}:{}",
                        package.path,
                        path.display(),
                        spec.position.line
                    ),
                ));
            }
            if let Err(previous) = bindings.bind(&name, package, spec.position) {
                return Err(error(
                    TypeCheckErrorKind::AmbiguousSymbol,
                    path,
                    spec.position,
                    format!(
                        "{name} redeclared in this block (previous import at line {})",
                        previous.line
                    ),
                ));
            }
        }
        by_file.insert(path, bindings);
    }
    Ok((by_file, imported))
}

/// Resolution context of one declaration.
struct Env<'e> {
    file: &'e Path,
    position: Position,
    type_params: &'e [String],
}

impl Env<'_> {
    fn error(&self, message: impl Into<String>) -> TypeCheckError {
        error(TypeCheckErrorKind::Other, self.file, self.position, message)
    }
}

fn param_names(params: &[TypeParam]) -> Vec<String> {
    params.iter().map(|p| p.name.clone()).collect()
}

fn universe_type(name: &str) -> Option<Type> {
    if let Some(kind) = BasicKind::from_name(name) {
        return Some(Type::Basic(kind));
    }
    match name {
        "error" | "comparable" => Some(Type::universe(name)),
        "any" => Some(Type::Interface(Vec::new())),
        _ => None,
    }
}

struct Checker<'a> {
    id: &'a PackageId,
    index: &'a DeclIndex<'a>,
    imports: &'a BTreeMap<&'a Path, FileImports>,
    /// Aliases whose targets are being resolved, innermost last.
    alias_stack: Vec<String>,
}

impl<'a> Checker<'a> {
    fn declare_file(&mut self, file: &Path, decls: &[Decl], scope: &mut Scope) -> CheckResult<()> {
        // Type of the previous const spec, inherited by specs that repeat it.
        let mut last_const: Option<Type> = None;
        for decl in decls {
            if !matches!(decl, Decl::Const(_)) {
                last_const = None;
            }
            match decl {
                Decl::Func(func) if func.receiver.is_none() => {
                    if func.name == "init" || func.name == "_" {
                        continue;
                    }
                    let object = Object::Func(self.func(file, func)?);
                    self.insert(scope, object, file, func.position)?;
                }
                Decl::Func(_) => {}
                Decl::Type(spec) => {
                    if spec.name == "_" {
                        continue;
                    }
                    let object = Object::TypeName(self.type_name(file, spec)?);
                    self.insert(scope, object, file, spec.position)?;
                }
                Decl::Const(spec) => {
                    let env = Env {
                        file,
                        position: spec.position,
                        type_params: &[],
                    };
                    let ty = match (&spec.ty, spec.has_values) {
                        (Some(expr), _) => Some(self.resolve(&env, expr)?),
                        (None, true) => None,
                        (None, false) => last_const.clone(),
                    };
                    last_const = ty.clone();
                    for name in spec.names.iter().filter(|n| *n != "_") {
                        let value = self.value(name, ty.clone(), file, spec.position);
                        self.insert(scope, Object::Const(value), file, spec.position)?;
                    }
                }
                Decl::Var(spec) => {
                    let env = Env {
                        file,
                        position: spec.position,
                        type_params: &[],
                    };
                    let ty = spec.ty.as_ref().map(|expr| self.resolve(&env, expr)).transpose()?;
                    for name in spec.names.iter().filter(|n| *n != "_") {
                        let value = self.value(name, ty.clone(), file, spec.position);
                        self.insert(scope, Object::Var(value), file, spec.position)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn insert(&self, scope: &mut Scope, object: Object, file: &Path, position: Position) -> CheckResult<()> {
        scope.insert(object).map_err(|rejected| {
            error(
                TypeCheckErrorKind::AmbiguousSymbol,
                file,
                position,
                format!("{} redeclared in this block", rejected.name()),
            )
        })
    }

    fn value(&self, name: &str, ty: Option<Type>, file: &Path, position: Position) -> Value {
        Value {
            name: name.to_string(),
            package: self.id.clone(),
            ty,
            file: file.to_path_buf(),
            position,
        }
    }

    fn func(&mut self, file: &Path, decl: &FuncDecl) -> CheckResult<Func> {
        let names = param_names(&decl.type_params);
        let env = Env {
            file,
            position: decl.position,
            type_params: &names,
        };
        let type_params = self.type_params(&env, &decl.type_params)?;
        let signature = self.signature(&env, &decl.signature, type_params)?;
        Ok(Func {
            name: decl.name.clone(),
            package: self.id.clone(),
            signature,
            file: file.to_path_buf(),
            position: decl.position,
        })
    }

    fn type_name(&mut self, file: &Path, spec: &TypeSpec) -> CheckResult<TypeName> {
        let names = param_names(&spec.type_params);
        let env = Env {
            file,
            position: spec.position,
            type_params: &names,
        };
        let type_params = self.type_params(&env, &spec.type_params)?;
        let ty = if spec.alias {
            self.alias_target(&spec.name, file, spec)?
        } else {
            self.resolve(&env, &spec.ty)?
        };
        Ok(TypeName {
            name: spec.name.clone(),
            package: self.id.clone(),
            alias: spec.alias,
            type_params,
            ty,
            methods: Vec::new(),
            file: file.to_path_buf(),
            position: spec.position,
        })
    }

    fn attach_method(&mut self, file: &Path, decl: &FuncDecl, scope: &mut Scope) -> CheckResult<()> {
        let Some(receiver) = &decl.receiver else {
            return Ok(());
        };
        let fail = |message: String| error(TypeCheckErrorKind::Other, file, decl.position, message);
        let (base, pointer_receiver, receiver_params) = receiver_base(&receiver.ty);
        let Some(base) = base else {
            return Err(fail("invalid receiver type".into()));
        };

        let index = self.index;
        let target = match index.sites.get(base) {
            Some(site) => match site.spec {
                Some(spec) if !spec.alias => base.to_string(),
                Some(spec) => match self.alias_target(base, site.file, spec)? {
                    Type::Named(named) if named.package.as_ref() == Some(self.id) => named.name,
                    other => {
                        return Err(fail(format!(
                            "cannot define new methods on non-local type {other}"
                        )))
                    }
                },
                None => return Err(fail(format!("{base} is not a type"))),
            },
            None if universe_type(base).is_some() => {
                return Err(fail(format!(
                    "cannot define new methods on non-local type {base}"
                )))
            }
            None => return Err(fail(format!("undefined: {base}"))),
        };

        if decl.name == "_" {
            return Ok(());
        }
        let env = Env {
            file,
            position: decl.position,
            type_params: &receiver_params,
        };
        let signature = self.signature(&env, &decl.signature, Vec::new())?;
        let Some(Object::TypeName(type_name)) = scope.lookup_mut(&target) else {
            return Err(fail(format!("{target} is not a type")));
        };
        if type_name.methods.iter().any(|m| m.name == decl.name) {
            return Err(error(
                TypeCheckErrorKind::AmbiguousSymbol,
                file,
                decl.position,
                format!("method {target}.{} already declared", decl.name),
            ));
        }
        type_name.methods.push(Method {
            name: decl.name.clone(),
            pointer_receiver,
            signature,
            position: decl.position,
        });
        Ok(())
    }

    fn alias_target(&mut self, name: &str, file: &Path, spec: &TypeSpec) -> CheckResult<Type> {
        if self.alias_stack.iter().any(|a| a == name) {
            let mut cycle = self.alias_stack.clone();
            cycle.push(name.to_string());
            return Err(error(
                TypeCheckErrorKind::Other,
                file,
                spec.position,
                format!("invalid recursive type alias {}", cycle.join(" -> ")),
            ));
        }
        self.alias_stack.push(name.to_string());
        let names = param_names(&spec.type_params);
        let env = Env {
            file,
            position: spec.position,
            type_params: &names,
        };
        let target = self.resolve(&env, &spec.ty);
        self.alias_stack.pop();
        target
    }

    fn type_params(&mut self, env: &Env<'_>, params: &[TypeParam]) -> CheckResult<Vec<TypeParamDecl>> {
        params
            .iter()
            .map(|param| {
                Ok(TypeParamDecl {
                    name: param.name.clone(),
                    constraint: self.resolve(env, &param.constraint)?,
                })
            })
            .collect()
    }

    fn signature(
        &mut self,
        env: &Env<'_>,
        sig: &FuncTypeExpr,
        type_params: Vec<TypeParamDecl>,
    ) -> CheckResult<Signature> {
        let mut variadic = false;
        let mut params = Vec::with_capacity(sig.params.len());
        for param in &sig.params {
            let mut ty = self.resolve(env, &param.ty)?;
            if param.variadic {
                variadic = true;
                ty = Type::Slice(Box::new(ty));
            }
            params.push(Var {
                name: param.name.clone(),
                ty,
            });
        }
        let mut results = Vec::with_capacity(sig.results.len());
        for result in &sig.results {
            results.push(Var {
                name: result.name.clone(),
                ty: self.resolve(env, &result.ty)?,
            });
        }
        Ok(Signature {
            type_params,
            params,
            results,
            variadic,
        })
    }

    fn file_imports(&self, file: &Path) -> Option<&'a FileImports> {
        self.imports.get(file)
    }

    fn resolve(&mut self, env: &Env<'_>, expr: &TypeExpr) -> CheckResult<Type> {
        let boxed = |ty: Type| Box::new(ty);
        Ok(match expr {
            TypeExpr::Name(name) => self.resolve_name(env, name)?,
            TypeExpr::Qualified { package, name } => self.resolve_qualified(env, package, name)?,
            TypeExpr::Pointer(elem) => Type::Pointer(boxed(self.resolve(env, elem)?)),
            TypeExpr::Slice(elem) => Type::Slice(boxed(self.resolve(env, elem)?)),
            TypeExpr::Array { len, elem } => Type::Array {
                len: len.clone(),
                elem: boxed(self.resolve(env, elem)?),
            },
            TypeExpr::Map { key, value } => Type::Map {
                key: boxed(self.resolve(env, key)?),
                value: boxed(self.resolve(env, value)?),
            },
            TypeExpr::Chan { dir, elem } => Type::Chan {
                dir: *dir,
                elem: boxed(self.resolve(env, elem)?),
            },
            TypeExpr::Func(sig) => Type::Func(Box::new(self.signature(env, sig, Vec::new())?)),
            TypeExpr::Struct(fields) => Type::Struct(self.fields(env, fields)?),
            TypeExpr::Interface(elems) => {
                let mut out = Vec::with_capacity(elems.len());
                for elem in elems {
                    out.push(match elem {
                        InterfaceElemExpr::Method { name, signature } => InterfaceElem::Method {
                            name: name.clone(),
                            signature: self.signature(env, signature, Vec::new())?,
                        },
                        InterfaceElemExpr::Embedded(ty) => {
                            InterfaceElem::Embedded(self.resolve(env, ty)?)
                        }
                    });
                }
                Type::Interface(out)
            }
            TypeExpr::Generic { base, args } => {
                let base = self.resolve(env, base)?;
                let args = args
                    .iter()
                    .map(|arg| self.resolve(env, arg))
                    .collect::<CheckResult<Vec<_>>>()?;
                match base {
                    Type::Named(mut named) if named.args.is_empty() => {
                        named.args = args;
                        Type::Named(named)
                    }
                    other => return Err(env.error(format!("{other} is not a generic type"))),
                }
            }
            TypeExpr::Opaque(text) if text.is_empty() => {
                return Err(env.error("missing type"));
            }
            TypeExpr::Opaque(text) => Type::Opaque(text.clone()),
        })
    }

    fn resolve_name(&mut self, env: &Env<'_>, name: &str) -> CheckResult<Type> {
        if env.type_params.iter().any(|p| p == name) {
            return Ok(Type::TypeParam(name.to_string()));
        }
        let index = self.index;
        if let Some(site) = index.sites.get(name) {
            return match site.spec {
                Some(spec) if spec.alias => self.alias_target(name, site.file, spec),
                Some(_) => Ok(Type::Named(NamedRef {
                    package: Some(self.id.clone()),
                    name: name.to_string(),
                    args: Vec::new(),
                })),
                None => Err(env.error(format!("{name} ({}) is not a type", site.kind))),
            };
        }
        let imports = self.file_imports(env.file);
        if imports.and_then(|i| i.package(name)).is_some() {
            return Err(env.error(format!("use of package {name} without selector")));
        }
        if let Some(ty) = universe_type(name) {
            return Ok(ty);
        }
        if is_exported(name) {
            let candidates = imports.map(|i| i.dot_candidates(name)).unwrap_or_default();
            match candidates.as_slice() {
                [] => {}
                [package] => {
                    return Ok(Type::Named(NamedRef {
                        package: Some((*package).clone()),
                        name: name.to_string(),
                        args: Vec::new(),
                    }))
                }
                several => {
                    let paths: Vec<&str> = several.iter().map(|p| p.path.as_str()).collect();
                    return Err(error(
                        TypeCheckErrorKind::AmbiguousSymbol,
                        env.file,
                        env.position,
                        format!("{name} is ambiguous among dot imports {}", paths.join(", ")),
                    ));
                }
            }
        }
        Err(env.error(format!("undefined: {name}")))
    }

    fn resolve_qualified(&self, env: &Env<'_>, package: &str, name: &str) -> CheckResult<Type> {
        let Some(imported) = self.file_imports(env.file).and_then(|i| i.package(package)) else {
            return Err(env.error(format!("undefined: {package}")));
        };
        if imported.path == "C" {
            return Ok(Type::Opaque(format!("C.{name}")));
        }
        if !is_exported(name) {
            return Err(env.error(format!(
                "name {name} not exported by package {}",
                imported.path
            )));
        }
        Ok(Type::Named(NamedRef {
            package: Some(imported.clone()),
            name: name.to_string(),
            args: Vec::new(),
        }))
    }

    fn fields(&mut self, env: &Env<'_>, fields: &[FieldExpr]) -> CheckResult<Vec<Field>> {
        let mut out = Vec::with_capacity(fields.len());
        for field in fields {
            let ty = self.resolve(env, &field.ty)?;
            if field.names.is_empty() {
                let ty = if field.embedded_pointer {
                    Type::Pointer(Box::new(ty))
                } else {
                    ty
                };
                out.push(Field {
                    name: embedded_name(&field.ty).to_string(),
                    ty,
                    embedded: true,
                });
            } else {
                for name in &field.names {
                    out.push(Field {
                        name: name.clone(),
                        ty: ty.clone(),
                        embedded: false,
                    });
                }
            }
        }
        Ok(out)
    }
}

fn embedded_name(expr: &TypeExpr) -> &str {
    match expr {
        TypeExpr::Name(name) | TypeExpr::Qualified { name, .. } => name,
        TypeExpr::Pointer(inner) => embedded_name(inner),
        TypeExpr::Generic { base, .. } => embedded_name(base),
        _ => "",
    }
}

/// Splits a receiver type into its base type name, whether it is a pointer
/// receiver, and the receiver's type parameter names.
fn receiver_base(expr: &TypeExpr) -> (Option<&str>, bool, Vec<String>) {
    match expr {
        TypeExpr::Name(name) => (Some(name), false, Vec::new()),
        TypeExpr::Pointer(inner) => {
            let (base, _, params) = receiver_base(inner);
            (base, true, params)
        }
        TypeExpr::Generic { base, args } => {
            let params = args
                .iter()
                .filter_map(|arg| match arg {
                    TypeExpr::Name(name) => Some(name.clone()),
                    _ => None,
                })
                .collect();
            match base.as_ref() {
                TypeExpr::Name(name) => (Some(name), false, params),
                _ => (None, false, params),
            }
        }
        _ => (None, false, Vec::new()),
    }
}
