pub mod ast;
pub mod checker;
pub mod constraint;
pub mod context;
pub mod diagnostic;
pub mod error;
pub mod imports;
pub mod interface;
pub mod loader;
pub mod locator;
pub mod manifest;
pub mod output;
pub mod pipeline;
pub mod symbol;
pub mod types;
pub mod visitor;

pub mod parser;

pub use checker::check_unit;
pub use context::BuildContext;
pub use diagnostic::{Diagnostic, SkipKind};
pub use error::{MockError, Result, TypeCheckError, TypeCheckErrorKind};
pub use imports::{ImportError, Importer, SourceImporter};
pub use interface::{synthesize, DesiredNames, InterfaceType, NamedType, SynthesizedInterface};
pub use loader::{collect_source_files, load_dir};
pub use locator::{locate, Location};
pub use manifest::{discover_manifest, load_manifest, Manifest};
pub use output::{generator_for, Generator, InterfaceSourceGenerator, JsonGenerator, OutputFormat};
pub use parser::{parse_file, parse_source, ParsedFile, SourceUnit};
pub use pipeline::{LoadedProgram, ParsedProgram, Pipeline};
pub use symbol::{ResolvedPackage, Scope};
pub use types::{Func, Object, PackageId, Signature, Type};
pub use visitor::{declared_funcs, DeclaredNames};
