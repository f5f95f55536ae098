use crate::types::{Object, PackageId};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Package-level symbol table, indexed by name.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Scope {
    objects: BTreeMap<String, Object>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `object`; on a name clash the table is left unchanged and the
    /// object is handed back.
    pub fn insert(&mut self, object: Object) -> Result<(), Object> {
        if self.objects.contains_key(object.name()) {
            return Err(object);
        }
        self.objects.insert(object.name().to_string(), object);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<&Object> {
        self.objects.get(name)
    }

    pub fn lookup_mut(&mut self, name: &str) -> Option<&mut Object> {
        self.objects.get_mut(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.objects.keys().map(String::as_str)
    }

    pub fn objects(&self) -> impl Iterator<Item = &Object> {
        self.objects.values()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

/// The type-checked form of one compilation unit.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedPackage {
    pub id: PackageId,
    pub dir: PathBuf,
    pub files: Vec<PathBuf>,
    pub imports: Vec<PackageId>,
    pub scope: Scope,
}

impl ResolvedPackage {
    pub fn lookup(&self, name: &str) -> Option<&Object> {
        self.scope.lookup(name)
    }
}
