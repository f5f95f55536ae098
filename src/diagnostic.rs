use serde::Serialize;
use std::fmt;

/// Why a declared name did not become an interface member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SkipKind {
    NotFound,
    NotAFunction,
    Generic,
}

/// Advisory record of a skipped name. Never changes the outcome of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub kind: SkipKind,
    pub name: String,
    pub message: String,
    pub location: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.location, self.message)
    }
}
