//! Go syntax trees via tree-sitter, lowered into the tagged AST of `ast`.

use crate::ast::{
    ChanDir, Decl, FieldExpr, FuncDecl, FuncTypeExpr, ImportName, ImportSpec, InterfaceElemExpr,
    Param, Position, Receiver, SourceFile, TypeExpr, TypeParam, TypeSpec, ValueSpec,
};
use crate::error::{MockError, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tree_sitter::{Node, Parser};

#[derive(Debug, Clone, Serialize)]
pub struct ParsedFile {
    pub path: PathBuf,
    pub ast: SourceFile,
}

/// One compilation unit: the files of a directory sharing a package clause.
#[derive(Debug, Clone, Serialize)]
pub struct SourceUnit {
    pub dir: PathBuf,
    pub package: String,
    pub files: Vec<ParsedFile>,
}

/// Groups parsed files by (directory, package clause), keeping file order.
pub fn group_units(files: Vec<ParsedFile>) -> Vec<SourceUnit> {
    let mut units: Vec<SourceUnit> = Vec::new();
    for file in files {
        let dir = file
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        match units
            .iter_mut()
            .find(|unit| unit.dir == dir && unit.package == file.ast.package)
        {
            Some(unit) => unit.files.push(file),
            None => units.push(SourceUnit {
                dir,
                package: file.ast.package.clone(),
                files: vec![file],
            }),
        }
    }
    units
}

pub fn parse_file(path: &Path) -> Result<ParsedFile> {
    let source = fs::read_to_string(path).map_err(|source| MockError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    let ast = parse_source(path, &source)?;
    Ok(ParsedFile {
        path: path.to_path_buf(),
        ast,
    })
}

pub fn parse_source(path: &Path, source: &str) -> Result<SourceFile> {
    let mut parser = Parser::new();
    parser
        .set_language(tree_sitter_go::language())
        .map_err(|err| parse_error(path, Position::default(), format!("{err:?}")))?;
    let tree = parser
        .parse(source, None)
        .ok_or_else(|| parse_error(path, Position::default(), "parser produced no tree".into()))?;
    let root = tree.root_node();

    if root.has_error() {
        if let Some(bad) = first_error(root) {
            let message = if bad.is_missing() {
                format!("expected {}", bad.kind())
            } else {
                format!("syntax error near {:?}", snippet(bad, source))
            };
            return Err(parse_error(path, position(bad), message));
        }
    }

    let lower = Lowerer {
        src: source.as_bytes(),
    };
    let file = lower.file(root);
    if file.package.is_empty() {
        return Err(parse_error(
            path,
            Position { line: 1, column: 1 },
            "expected 'package' clause".into(),
        ));
    }
    Ok(file)
}

fn parse_error(path: &Path, pos: Position, message: String) -> MockError {
    MockError::Parse {
        file: path.to_path_buf(),
        line: pos.line,
        column: pos.column,
        message,
    }
}

fn first_error(node: Node) -> Option<Node> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    if !node.has_error() {
        return None;
    }
    let mut cursor = node.walk();
    let children: Vec<Node> = node.children(&mut cursor).collect();
    children.into_iter().find_map(first_error)
}

fn position(node: Node) -> Position {
    let point = node.start_position();
    Position {
        line: point.row + 1,
        column: point.column + 1,
    }
}

fn snippet<'a>(node: Node, source: &'a str) -> &'a str {
    let text = node.utf8_text(source.as_bytes()).unwrap_or("");
    let line = text.lines().next().unwrap_or("");
    match line.char_indices().nth(24) {
        Some((idx, _)) => &line[..idx],
        None => line,
    }
}

struct Lowerer<'a> {
    src: &'a [u8],
}

impl<'a> Lowerer<'a> {
    fn text(&self, node: Node) -> String {
        node.utf8_text(self.src).unwrap_or("").to_string()
    }

    fn field_text(&self, node: Node, field: &str) -> Option<String> {
        node.child_by_field_name(field).map(|n| self.text(n))
    }

    /// Declared identifiers of a spec. The grammar tags the comma tokens
    /// between them with the `name` field as well.
    fn names(&self, node: Node) -> Vec<String> {
        let mut cursor = node.walk();
        let names: Vec<String> = node
            .children_by_field_name("name", &mut cursor)
            .filter(|n| n.is_named())
            .map(|n| self.text(n))
            .collect();
        names
    }

    fn file(&self, root: Node) -> SourceFile {
        let mut file = SourceFile::default();
        let mut cursor = root.walk();
        for node in root.named_children(&mut cursor) {
            match node.kind() {
                "package_clause" => {
                    let mut inner = node.walk();
                    let name = node
                        .named_children(&mut inner)
                        .find(|n| n.kind() == "package_identifier")
                        .map(|n| self.text(n));
                    file.package = name.unwrap_or_default();
                }
                "import_declaration" => self.imports(node, &mut file.imports),
                "function_declaration" | "method_declaration" => {
                    file.decls.push(Decl::Func(self.func(node)));
                }
                "type_declaration" => self.type_decl(node, &mut file.decls),
                "const_declaration" => self.value_decl(node, true, &mut file.decls),
                "var_declaration" => self.value_decl(node, false, &mut file.decls),
                _ => {}
            }
        }
        file
    }

    fn imports(&self, node: Node, out: &mut Vec<ImportSpec>) {
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            match child.kind() {
                "import_spec" => out.push(self.import_spec(child)),
                "import_spec_list" => self.imports(child, out),
                _ => {}
            }
        }
    }

    fn import_spec(&self, node: Node) -> ImportSpec {
        let name = node.child_by_field_name("name").map(|n| match n.kind() {
            "dot" => ImportName::Dot,
            "blank_identifier" => ImportName::Blank,
            _ => ImportName::Named(self.text(n)),
        });
        let raw = self.field_text(node, "path").unwrap_or_default();
        let path = raw.trim_matches(|c| c == '"' || c == '`').to_string();
        ImportSpec {
            name,
            path,
            position: position(node),
        }
    }

    fn func(&self, node: Node) -> FuncDecl {
        let receiver = node
            .child_by_field_name("receiver")
            .and_then(|list| self.params(list).into_iter().next())
            .map(|param| Receiver {
                name: param.name,
                ty: param.ty,
            })
            .or_else(|| {
                (node.kind() == "method_declaration").then(|| Receiver {
                    name: None,
                    ty: TypeExpr::Opaque(String::new()),
                })
            });
        FuncDecl {
            name: self.field_text(node, "name").unwrap_or_default(),
            receiver,
            type_params: node
                .child_by_field_name("type_parameters")
                .map(|n| self.type_params(n))
                .unwrap_or_default(),
            signature: self.signature(node),
            position: position(node),
        }
    }

    fn signature(&self, node: Node) -> FuncTypeExpr {
        let params = node
            .child_by_field_name("parameters")
            .map(|n| self.params(n))
            .unwrap_or_default();
        let results = match node.child_by_field_name("result") {
            Some(result) if result.kind() == "parameter_list" => self.params(result),
            Some(result) => vec![Param {
                name: None,
                ty: self.type_expr(result),
                variadic: false,
            }],
            None => Vec::new(),
        };
        FuncTypeExpr { params, results }
    }

    fn params(&self, list: Node) -> Vec<Param> {
        let mut params = Vec::new();
        let mut cursor = list.walk();
        for decl in list.named_children(&mut cursor) {
            let variadic = match decl.kind() {
                "parameter_declaration" => false,
                "variadic_parameter_declaration" => true,
                _ => continue,
            };
            let Some(ty_node) = decl.child_by_field_name("type") else {
                continue;
            };
            let ty = self.type_expr(ty_node);
            let names = self.names(decl);
            if names.is_empty() {
                params.push(Param {
                    name: None,
                    ty,
                    variadic,
                });
            } else {
                for name in names {
                    params.push(Param {
                        name: Some(name),
                        ty: ty.clone(),
                        variadic,
                    });
                }
            }
        }
        params
    }

    fn type_params(&self, list: Node) -> Vec<TypeParam> {
        let mut out = Vec::new();
        let mut cursor = list.walk();
        for decl in list.named_children(&mut cursor) {
            let constraint = decl
                .child_by_field_name("type")
                .map(|n| self.type_expr(n))
                .unwrap_or_else(|| TypeExpr::Name("any".into()));
            for name in self.names(decl) {
                out.push(TypeParam {
                    name,
                    constraint: constraint.clone(),
                });
            }
        }
        out
    }

    fn type_decl(&self, node: Node, out: &mut Vec<Decl>) {
        let mut cursor = node.walk();
        for spec in node.named_children(&mut cursor) {
            let alias = match spec.kind() {
                "type_spec" => false,
                "type_alias" => true,
                _ => continue,
            };
            let Some(ty) = spec.child_by_field_name("type") else {
                continue;
            };
            out.push(Decl::Type(TypeSpec {
                name: self.field_text(spec, "name").unwrap_or_default(),
                type_params: spec
                    .child_by_field_name("type_parameters")
                    .map(|n| self.type_params(n))
                    .unwrap_or_default(),
                alias,
                ty: self.type_expr(ty),
                position: position(spec),
            }));
        }
    }

    fn value_decl(&self, node: Node, is_const: bool, out: &mut Vec<Decl>) {
        let spec_kind = if is_const { "const_spec" } else { "var_spec" };
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            if child.kind() == spec_kind {
                out.push(self.value_spec(child, is_const));
            } else if child.kind() == "var_spec_list" {
                let mut inner = child.walk();
                for spec in child.named_children(&mut inner) {
                    if spec.kind() == spec_kind {
                        out.push(self.value_spec(spec, is_const));
                    }
                }
            }
        }
    }

    fn value_spec(&self, spec: Node, is_const: bool) -> Decl {
        let value = ValueSpec {
            names: self.names(spec),
            ty: spec.child_by_field_name("type").map(|n| self.type_expr(n)),
            has_values: spec.child_by_field_name("value").is_some(),
            position: position(spec),
        };
        if is_const {
            Decl::Const(value)
        } else {
            Decl::Var(value)
        }
    }

    fn type_expr(&self, node: Node) -> TypeExpr {
        let child = |field: &str| {
            node.child_by_field_name(field)
                .map(|n| Box::new(self.type_expr(n)))
                .unwrap_or_else(|| Box::new(TypeExpr::Opaque(String::new())))
        };
        match node.kind() {
            "type_identifier" | "identifier" => TypeExpr::Name(self.text(node)),
            "qualified_type" => TypeExpr::Qualified {
                package: self.field_text(node, "package").unwrap_or_default(),
                name: self.field_text(node, "name").unwrap_or_default(),
            },
            "pointer_type" | "parenthesized_type" | "interface_type_name" => {
                match node.named_child(0) {
                    Some(inner) if node.kind() == "pointer_type" => {
                        TypeExpr::Pointer(Box::new(self.type_expr(inner)))
                    }
                    Some(inner) => self.type_expr(inner),
                    None => TypeExpr::Opaque(self.text(node)),
                }
            }
            "slice_type" => TypeExpr::Slice(child("element")),
            "array_type" => TypeExpr::Array {
                len: self.field_text(node, "length").unwrap_or_default(),
                elem: child("element"),
            },
            "implicit_length_array_type" => TypeExpr::Array {
                len: "...".into(),
                elem: child("element"),
            },
            "map_type" => TypeExpr::Map {
                key: child("key"),
                value: child("value"),
            },
            "channel_type" => {
                let text = self.text(node);
                let dir = if text.starts_with("<-") {
                    ChanDir::Recv
                } else if text
                    .trim_start_matches("chan")
                    .trim_start()
                    .starts_with("<-")
                {
                    ChanDir::Send
                } else {
                    ChanDir::Both
                };
                TypeExpr::Chan {
                    dir,
                    elem: child("value"),
                }
            }
            "function_type" => TypeExpr::Func(Box::new(self.signature(node))),
            "struct_type" => TypeExpr::Struct(self.struct_fields(node)),
            "interface_type" => TypeExpr::Interface(self.interface_elems(node)),
            "generic_type" => {
                let args = node
                    .child_by_field_name("type_arguments")
                    .map(|list| {
                        let mut cursor = list.walk();
                        let args: Vec<TypeExpr> = list
                            .named_children(&mut cursor)
                            .map(|n| self.type_expr(n))
                            .collect();
                        args
                    })
                    .unwrap_or_default();
                TypeExpr::Generic {
                    base: child("type"),
                    args,
                }
            }
            "type_elem" | "constraint_elem" | "type_constraint" if node.named_child_count() == 1 => {
                let inner = node.named_child(0);
                match inner {
                    Some(inner) if !self.text(node).contains('~') => self.type_expr(inner),
                    _ => TypeExpr::Opaque(self.text(node)),
                }
            }
            _ => TypeExpr::Opaque(self.text(node)),
        }
    }

    fn struct_fields(&self, node: Node) -> Vec<FieldExpr> {
        let mut fields = Vec::new();
        let mut cursor = node.walk();
        let Some(list) = node
            .named_children(&mut cursor)
            .find(|n| n.kind() == "field_declaration_list")
        else {
            return fields;
        };
        let mut list_cursor = list.walk();
        for decl in list.named_children(&mut list_cursor) {
            if decl.kind() != "field_declaration" {
                continue;
            }
            let Some(ty) = decl.child_by_field_name("type") else {
                continue;
            };
            let names = self.names(decl);
            let mut token_cursor = decl.walk();
            let embedded_pointer =
                names.is_empty() && decl.children(&mut token_cursor).any(|n| n.kind() == "*");
            fields.push(FieldExpr {
                names,
                ty: self.type_expr(ty),
                embedded_pointer,
            });
        }
        fields
    }

    fn interface_elems(&self, node: Node) -> Vec<InterfaceElemExpr> {
        let mut elems = Vec::new();
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            match child.kind() {
                "method_spec" | "method_elem" => elems.push(InterfaceElemExpr::Method {
                    name: self.field_text(child, "name").unwrap_or_default(),
                    signature: self.signature(child),
                }),
                "comment" => {}
                _ => elems.push(InterfaceElemExpr::Embedded(self.type_expr(child))),
            }
        }
        elems
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::DeclKind;

    fn parse(src: &str) -> SourceFile {
        parse_source(Path::new("a.go"), src).expect("parse")
    }

    fn func<'f>(file: &'f SourceFile, name: &str) -> &'f FuncDecl {
        file.decls
            .iter()
            .find_map(|d| match d {
                Decl::Func(f) if f.name == name => Some(f),
                _ => None,
            })
            .expect("function present")
    }

    #[test]
    fn lowers_package_imports_and_decls() {
        let file = parse(
            r#"package pkg

import (
	"context"
	h "net/http"
	. "strings"
	_ "embed"
)

type T struct{}

func Foo(x int) error { return nil }

func bar(int) error { return nil }

func (T) Baz() {}
"#,
        );
        assert_eq!(file.package, "pkg");
        assert_eq!(file.imports.len(), 4);
        assert_eq!(file.imports[0].path, "context");
        assert!(file.imports[0].name.is_none());
        assert_eq!(file.imports[1].name, Some(ImportName::Named("h".into())));
        assert_eq!(file.imports[2].name, Some(ImportName::Dot));
        assert_eq!(file.imports[3].name, Some(ImportName::Blank));

        let kinds: Vec<DeclKind> = file.decls.iter().map(Decl::kind).collect();
        assert_eq!(
            kinds,
            vec![DeclKind::Type, DeclKind::Func, DeclKind::Func, DeclKind::Method]
        );
        let foo = func(&file, "Foo");
        assert_eq!(foo.signature.params.len(), 1);
        assert_eq!(foo.signature.params[0].name.as_deref(), Some("x"));
        assert!(matches!(&foo.signature.results[0].ty, TypeExpr::Name(n) if n == "error"));
        assert!(func(&file, "Baz").receiver.is_some());
    }

    #[test]
    fn lowers_composite_types() {
        let file = parse(
            r#"package pkg

func Do(ctx context.Context, names []string, m map[string]*T, ch <-chan int, fn func(int) (bool, error), rest ...string) (n int, err error) {
	return 0, nil
}
"#,
        );
        let sig = &func(&file, "Do").signature;
        assert_eq!(sig.params.len(), 6);
        assert!(matches!(&sig.params[0].ty, TypeExpr::Qualified { package, name } if package == "context" && name == "Context"));
        assert!(matches!(&sig.params[1].ty, TypeExpr::Slice(_)));
        assert!(matches!(&sig.params[2].ty, TypeExpr::Map { .. }));
        assert!(matches!(&sig.params[3].ty, TypeExpr::Chan { dir: ChanDir::Recv, .. }));
        assert!(matches!(&sig.params[4].ty, TypeExpr::Func(f) if f.results.len() == 2));
        assert!(sig.params[5].variadic);
        assert_eq!(sig.results.len(), 2);
        assert_eq!(sig.results[1].name.as_deref(), Some("err"));
    }

    #[test]
    fn grouped_params_share_type() {
        let file = parse("package pkg\n\nfunc Add(a, b int) int { return a + b }\n");
        let sig = &func(&file, "Add").signature;
        assert_eq!(sig.params.len(), 2);
        assert_eq!(sig.params[1].name.as_deref(), Some("b"));
        assert!(matches!(&sig.params[1].ty, TypeExpr::Name(n) if n == "int"));
    }

    #[test]
    fn lowers_type_specs_and_values() {
        let file = parse(
            r#"package pkg

type (
	ID    = string
	Store interface {
		Get(id ID) ([]byte, error)
		io.Closer
	}
)

const (
	A Kind = iota
	B
)

var Default, Fallback *Store
"#,
        );
        let specs: Vec<&TypeSpec> = file
            .decls
            .iter()
            .filter_map(|d| match d {
                Decl::Type(t) => Some(t),
                _ => None,
            })
            .collect();
        assert_eq!(specs.len(), 2);
        assert!(specs[0].alias);
        match &specs[1].ty {
            TypeExpr::Interface(elems) => {
                assert_eq!(elems.len(), 2);
                assert!(matches!(&elems[0], InterfaceElemExpr::Method { name, .. } if name == "Get"));
                assert!(matches!(&elems[1], InterfaceElemExpr::Embedded(_)));
            }
            other => panic!("unexpected {other:?}"),
        }
        let consts: Vec<&ValueSpec> = file
            .decls
            .iter()
            .filter_map(|d| match d {
                Decl::Const(v) => Some(v),
                _ => None,
            })
            .collect();
        assert_eq!(consts.len(), 2);
        assert!(consts[0].ty.is_some() && consts[0].has_values);
        assert!(consts[1].ty.is_none() && !consts[1].has_values);
        assert!(file.decls.iter().any(
            |d| matches!(d, Decl::Var(v) if v.names == vec!["Default".to_string(), "Fallback".to_string()])
        ));
    }

    #[test]
    fn name_lists_hold_only_identifiers() {
        let file = parse(
            r#"package pkg

var A, B int

const X, Y = 1, 2

type Pair[K, V comparable] struct {
	Key, Alt K
	Val      V
}

func Swap(a, b, c string) {}
"#,
        );
        let values: Vec<&Vec<String>> = file
            .decls
            .iter()
            .filter_map(|d| match d {
                Decl::Var(v) | Decl::Const(v) => Some(&v.names),
                _ => None,
            })
            .collect();
        assert_eq!(values.len(), 2);
        assert_eq!(values[0], &vec!["A".to_string(), "B".to_string()]);
        assert_eq!(values[1], &vec!["X".to_string(), "Y".to_string()]);

        let pair = file
            .decls
            .iter()
            .find_map(|d| match d {
                Decl::Type(t) if t.name == "Pair" => Some(t),
                _ => None,
            })
            .expect("Pair");
        let params: Vec<&str> = pair.type_params.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(params, vec!["K", "V"]);
        match &pair.ty {
            TypeExpr::Struct(fields) => {
                assert_eq!(fields[0].names, vec!["Key", "Alt"]);
                assert_eq!(fields[1].names, vec!["Val"]);
            }
            other => panic!("unexpected {other:?}"),
        }

        let names: Vec<Option<&str>> = func(&file, "Swap")
            .signature
            .params
            .iter()
            .map(|p| p.name.as_deref())
            .collect();
        assert_eq!(names, vec![Some("a"), Some("b"), Some("c")]);
    }

    #[test]
    fn generic_functions_keep_type_params() {
        let file = parse("package pkg\n\nfunc Map[T any, U any](in []T, f func(T) U) []U { return nil }\n");
        let map = func(&file, "Map");
        assert_eq!(map.type_params.len(), 2);
        assert_eq!(map.type_params[0].name, "T");
    }

    #[test]
    fn reports_syntax_errors_with_position() {
        let err = parse_source(Path::new("bad.go"), "package pkg\n\nfunc Foo( {\n").unwrap_err();
        match err {
            MockError::Parse { file, line, .. } => {
                assert_eq!(file, PathBuf::from("bad.go"));
                assert!(line >= 3);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    // Generic aliases are newer than the grammar.
    #[test]
    fn generic_type_aliases_are_parse_errors() {
        let err = parse_source(
            Path::new("set.go"),
            "package pkg\n\ntype Set[T comparable] = map[T]struct{}\n",
        )
        .unwrap_err();
        assert!(matches!(err, MockError::Parse { ref file, .. } if file == Path::new("set.go")));
    }

    #[test]
    fn missing_package_clause_is_an_error() {
        let err = parse_source(Path::new("a.go"), "// just a comment\n").unwrap_err();
        assert!(matches!(err, MockError::Parse { line: 1, .. }));
    }

    #[test]
    fn groups_units_by_package_clause() {
        let file = |path: &str, package: &str| ParsedFile {
            path: PathBuf::from(path),
            ast: SourceFile {
                package: package.into(),
                ..SourceFile::default()
            },
        };
        let units = group_units(vec![
            file("/p/a.go", "p"),
            file("/p/b.go", "p"),
            file("/p/main.go", "main"),
        ]);
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].files.len(), 2);
        assert_eq!(units[1].package, "main");
    }
}
