use serde::Serialize;
use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Every way a run can fail. All variants are terminal.
#[derive(Debug, Error)]
pub enum MockError {
    #[error("cannot locate package {location:?}: {reason}")]
    Location { location: String, reason: String },

    #[error("cannot read directory {}: {source}", dir.display())]
    DirectoryRead {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot read {}: {source}", path.display())]
    ReadFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{}: {message}", file.display())]
    Filter { file: PathBuf, message: String },

    #[error("{}:{line}:{column}: {message}", file.display())]
    Parse {
        file: PathBuf,
        line: usize,
        column: usize,
        message: String,
    },

    #[error(transparent)]
    TypeCheck(#[from] TypeCheckError),

    #[error("too many packages: {}", packages.join(", "))]
    AmbiguousUnit { packages: Vec<String> },

    #[error("no functions for interface {name}")]
    EmptyInterface { name: String },

    #[error("invalid configuration {}: {message}", path.display())]
    Config { path: PathBuf, message: String },
}

impl MockError {
    pub fn location(location: &str, reason: impl Into<String>) -> Self {
        MockError::Location {
            location: location.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TypeCheckErrorKind {
    UnresolvedImport,
    AmbiguousSymbol,
    Other,
}

impl fmt::Display for TypeCheckErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeCheckErrorKind::UnresolvedImport => write!(f, "unresolved import"),
            TypeCheckErrorKind::AmbiguousSymbol => write!(f, "ambiguous symbol"),
            TypeCheckErrorKind::Other => write!(f, "type error"),
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("{}:{line}:{column}: {kind}: {message}", file.display())]
pub struct TypeCheckError {
    pub kind: TypeCheckErrorKind,
    pub file: PathBuf,
    pub line: usize,
    pub column: usize,
    pub message: String,
}

pub type Result<T, E = MockError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_check_error_mentions_position_and_kind() {
        let err = MockError::from(TypeCheckError {
            kind: TypeCheckErrorKind::UnresolvedImport,
            file: PathBuf::from("/src/pkg/a.go"),
            line: 3,
            column: 8,
            message: "could not import example.com/missing".into(),
        });
        let text = err.to_string();
        assert!(text.starts_with("/src/pkg/a.go:3:8: unresolved import"));
        assert!(text.contains("example.com/missing"));
    }

    #[test]
    fn ambiguous_unit_lists_packages() {
        let err = MockError::AmbiguousUnit {
            packages: vec!["foo".into(), "main".into()],
        };
        assert_eq!(err.to_string(), "too many packages: foo, main");
    }
}
