use crate::ast::{Decl, SourceFile};
use crate::parser::SourceUnit;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Exported free-function names per file, in source order.
pub type DeclaredNames = BTreeMap<PathBuf, Vec<String>>;

/// Go's visibility rule: the name starts with an upper-case letter.
pub fn is_exported(name: &str) -> bool {
    name.chars().next().is_some_and(char::is_uppercase)
}

#[derive(Debug, Default)]
pub struct DeclVisitor {
    declared: Vec<String>,
}

impl DeclVisitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn visit_file(&mut self, file: &SourceFile) {
        for decl in &file.decls {
            self.visit_decl(decl);
        }
    }

    fn visit_decl(&mut self, decl: &Decl) {
        if let Decl::Func(func) = decl {
            if func.receiver.is_none() && is_exported(&func.name) {
                self.declared.push(func.name.clone());
            }
        }
    }

    pub fn into_declared(self) -> Vec<String> {
        self.declared
    }
}

pub fn declared_funcs(file: &SourceFile) -> Vec<String> {
    let mut visitor = DeclVisitor::new();
    visitor.visit_file(file);
    visitor.into_declared()
}

/// Sweeps every file of every unit.
pub fn visit_units(units: &[SourceUnit]) -> DeclaredNames {
    units
        .iter()
        .flat_map(|unit| unit.files.iter())
        .map(|file| (file.path.clone(), declared_funcs(&file.ast)))
        .collect()
}
