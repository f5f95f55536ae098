//! The staged driver: locate and parse, then load (visit and type-check
//! concurrently), then synthesize the interface.
//!
//! Each stage consumes the previous one, so build tags can only be added
//! before any file has been matched against the build context.

use crate::checker::check_unit;
use crate::context::BuildContext;
use crate::diagnostic::Diagnostic;
use crate::error::{Result, TypeCheckError};
use crate::imports::{Importer, SourceImporter};
use crate::interface::{synthesize, DesiredNames, SynthesizedInterface};
use crate::loader::load_dir;
use crate::locator::{locate, Location};
use crate::parser::SourceUnit;
use crate::symbol::ResolvedPackage;
use crate::visitor::{visit_units, DeclaredNames};
use std::panic;
use std::sync::Arc;
use std::thread;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct Pipeline {
    location: String,
    desired: DesiredNames,
    ctx: BuildContext,
}

impl Pipeline {
    /// Starts from the host build context.
    pub fn new(location: impl Into<String>, desired: DesiredNames) -> Self {
        Pipeline {
            location: location.into(),
            desired,
            ctx: BuildContext::host(),
        }
    }

    pub fn with_context(mut self, ctx: BuildContext) -> Self {
        self.ctx = ctx;
        self
    }

    pub fn add_build_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ctx.add_tags(tags);
        self
    }

    pub fn context(&self) -> &BuildContext {
        &self.ctx
    }

    /// Locates the package, filters its files and parses them in order.
    pub fn parse(self) -> Result<ParsedProgram> {
        let ctx = Arc::new(self.ctx);
        let location = locate(&self.location, &ctx)?;
        let units = load_dir(&location.dir, &ctx)?;
        debug!(
            dir = %location.dir.display(),
            units = units.len(),
            files = units.iter().map(|u| u.files.len()).sum::<usize>(),
            "parsed package directory"
        );
        Ok(ParsedProgram {
            location,
            desired: self.desired,
            ctx,
            units,
        })
    }
}

#[derive(Debug)]
pub struct ParsedProgram {
    location: Location,
    desired: DesiredNames,
    ctx: Arc<BuildContext>,
    units: Vec<SourceUnit>,
}

impl ParsedProgram {
    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn units(&self) -> &[SourceUnit] {
        &self.units
    }

    pub fn context(&self) -> &BuildContext {
        &self.ctx
    }

    /// Loads with a `SourceImporter` over the same build context.
    pub fn load(self) -> Result<LoadedProgram> {
        let importer = SourceImporter::new(Arc::clone(&self.ctx));
        self.load_with(&importer)
    }

    /// Runs the declaration sweep and the type checker on two scoped
    /// threads and waits for both.
    pub fn load_with(self, importer: &dyn Importer) -> Result<LoadedProgram> {
        let units = self.units.as_slice();
        let import_path = self.location.import_path.as_str();

        let (declared, checked) = thread::scope(|scope| {
            let sweep = scope.spawn(|| visit_units(units));
            let check = scope.spawn(|| {
                units
                    .iter()
                    .map(|unit| check_unit(unit, import_path, importer))
                    .collect::<std::result::Result<Vec<_>, TypeCheckError>>()
            });
            let declared = sweep.join().unwrap_or_else(|payload| panic::resume_unwind(payload));
            let checked = check.join().unwrap_or_else(|payload| panic::resume_unwind(payload));
            (declared, checked)
        });
        let packages = checked?;
        debug!(
            packages = packages.len(),
            declared = declared.values().map(Vec::len).sum::<usize>(),
            "loaded package"
        );

        Ok(LoadedProgram {
            location: self.location,
            desired: self.desired,
            packages,
            declared,
        })
    }
}

#[derive(Debug)]
pub struct LoadedProgram {
    location: Location,
    desired: DesiredNames,
    packages: Vec<ResolvedPackage>,
    declared: DeclaredNames,
}

impl LoadedProgram {
    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn packages(&self) -> &[ResolvedPackage] {
        &self.packages
    }

    pub fn declared(&self) -> &DeclaredNames {
        &self.declared
    }

    pub fn interface(&self) -> Result<SynthesizedInterface> {
        self.interface_with_diagnostics().map(|(interface, _)| interface)
    }

    pub fn interface_with_diagnostics(&self) -> Result<(SynthesizedInterface, Vec<Diagnostic>)> {
        synthesize(
            &self.location.dir,
            &self.packages,
            &self.declared,
            &self.desired,
        )
    }
}
