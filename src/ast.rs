use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SourceFile {
    pub package: String,
    pub imports: Vec<ImportSpec>,
    pub decls: Vec<Decl>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ImportName {
    Named(String),
    Dot,
    Blank,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportSpec {
    pub name: Option<ImportName>,
    pub path: String,
    pub position: Position,
}

#[derive(Debug, Clone, Serialize)]
pub enum Decl {
    Func(FuncDecl),
    Type(TypeSpec),
    Const(ValueSpec),
    Var(ValueSpec),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeclKind {
    Func,
    Method,
    Type,
    Const,
    Var,
}

impl Decl {
    pub fn kind(&self) -> DeclKind {
        match self {
            Decl::Func(func) if func.receiver.is_some() => DeclKind::Method,
            Decl::Func(_) => DeclKind::Func,
            Decl::Type(_) => DeclKind::Type,
            Decl::Const(_) => DeclKind::Const,
            Decl::Var(_) => DeclKind::Var,
        }
    }

    pub fn position(&self) -> Position {
        match self {
            Decl::Func(func) => func.position,
            Decl::Type(spec) => spec.position,
            Decl::Const(spec) | Decl::Var(spec) => spec.position,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FuncDecl {
    pub name: String,
    pub receiver: Option<Receiver>,
    pub type_params: Vec<TypeParam>,
    pub signature: FuncTypeExpr,
    pub position: Position,
}

#[derive(Debug, Clone, Serialize)]
pub struct Receiver {
    pub name: Option<String>,
    pub ty: TypeExpr,
}

#[derive(Debug, Clone, Serialize)]
pub struct TypeParam {
    pub name: String,
    pub constraint: TypeExpr,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FuncTypeExpr {
    pub params: Vec<Param>,
    pub results: Vec<Param>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Param {
    pub name: Option<String>,
    pub ty: TypeExpr,
    pub variadic: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TypeSpec {
    pub name: String,
    pub type_params: Vec<TypeParam>,
    pub alias: bool,
    pub ty: TypeExpr,
    pub position: Position,
}

/// One `const` or `var` spec. `ty` is the declared type, if any.
#[derive(Debug, Clone, Serialize)]
pub struct ValueSpec {
    pub names: Vec<String>,
    pub ty: Option<TypeExpr>,
    pub has_values: bool,
    pub position: Position,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChanDir {
    Both,
    Send,
    Recv,
}

#[derive(Debug, Clone, Serialize)]
pub enum TypeExpr {
    Name(String),
    Qualified { package: String, name: String },
    Pointer(Box<TypeExpr>),
    Slice(Box<TypeExpr>),
    Array { len: String, elem: Box<TypeExpr> },
    Map { key: Box<TypeExpr>, value: Box<TypeExpr> },
    Chan { dir: ChanDir, elem: Box<TypeExpr> },
    Func(Box<FuncTypeExpr>),
    Struct(Vec<FieldExpr>),
    Interface(Vec<InterfaceElemExpr>),
    Generic { base: Box<TypeExpr>, args: Vec<TypeExpr> },
    /// Constraint syntax (`~int | string`) kept as written.
    Opaque(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldExpr {
    /// Empty for an embedded field.
    pub names: Vec<String>,
    pub ty: TypeExpr,
    pub embedded_pointer: bool,
}

#[derive(Debug, Clone, Serialize)]
pub enum InterfaceElemExpr {
    Method { name: String, signature: FuncTypeExpr },
    Embedded(TypeExpr),
}
