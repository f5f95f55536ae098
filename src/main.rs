use std::env;
use std::error::Error;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use mockpkg::manifest::{discover_manifest, load_manifest, DEFAULT_MANIFEST};
use mockpkg::{generator_for, BuildContext, DesiredNames, OutputFormat, Pipeline};
use tracing::debug;
use tracing_subscriber::EnvFilter;

fn main() {
    init_tracing();
    if let Err(err) = run() {
        eprintln!("mockpkg: {err}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

#[derive(Debug, Default, PartialEq)]
struct Options {
    outfile: Option<PathBuf>,
    overwrite: bool,
    tags: Vec<String>,
    config: Option<PathBuf>,
    format: OutputFormat,
    package: String,
    funcs: Vec<String>,
}

fn run() -> Result<(), Box<dyn Error>> {
    let args: Vec<String> = env::args().skip(1).collect();
    let options = match parse_args(&args) {
        Ok(Some(options)) => options,
        Ok(None) => {
            print_usage();
            return Ok(());
        }
        Err(message) => {
            eprintln!("mockpkg: {message}");
            eprintln!();
            print_usage();
            std::process::exit(2);
        }
    };

    if let Some(outfile) = &options.outfile {
        if outfile.exists() && !options.overwrite {
            return Err(format!(
                "output file {} already exists (use -overwrite to replace it)",
                outfile.display()
            )
            .into());
        }
    }

    let ctx = build_context(options.config.as_deref())?;
    let loaded = Pipeline::new(&options.package, DesiredNames::new(&options.funcs))
        .with_context(ctx)
        .add_build_tags(options.tags.iter().cloned())
        .parse()?
        .load()?;
    let (iface, diagnostics) = loaded.interface_with_diagnostics()?;
    debug!(
        members = iface.aggregate.len(),
        skipped = diagnostics.len(),
        "synthesized interface {}",
        iface.name
    );

    let mut rendered = Vec::new();
    generator_for(options.format).generate(&iface, &loaded.location().import_path, &mut rendered)?;

    match &options.outfile {
        Some(outfile) => fs::write(outfile, rendered)?,
        None => io::stdout().write_all(&rendered)?,
    }
    Ok(())
}

/// Host defaults, then the configuration file, if any.
fn build_context(config: Option<&Path>) -> Result<BuildContext, Box<dyn Error>> {
    configure(BuildContext::host(), config)
}

fn configure(mut ctx: BuildContext, config: Option<&Path>) -> Result<BuildContext, Box<dyn Error>> {
    let (manifest, origin) = match config {
        Some(path) => (Some(load_manifest(path)?), path.to_path_buf()),
        None => (
            discover_manifest(&ctx.working_dir)?,
            ctx.working_dir.join(DEFAULT_MANIFEST),
        ),
    };
    if let Some(manifest) = manifest {
        debug!(path = %origin.display(), "loaded configuration");
        ctx.apply_manifest(&manifest.build, &origin)?;
    }
    Ok(ctx)
}

/// Parses the command line in the Go flag style: single-dash options before
/// the positional arguments. Returns `None` when help was requested.
fn parse_args(args: &[String]) -> Result<Option<Options>, String> {
    let mut options = Options::default();
    let mut i = 0;
    while i < args.len() {
        let arg = args[i].as_str();
        if arg == "--" {
            i += 1;
            break;
        }
        if !arg.starts_with('-') || arg == "-" {
            break;
        }
        let flag = arg.trim_start_matches('-');
        let (name, inline) = match flag.split_once('=') {
            Some((name, value)) => (name, Some(value.to_string())),
            None => (flag, None),
        };
        let value = |i: &mut usize| -> Result<String, String> {
            if let Some(v) = inline.clone() {
                return Ok(v);
            }
            *i += 1;
            args.get(*i)
                .cloned()
                .ok_or_else(|| format!("flag needs an argument: -{name}"))
        };
        match name {
            "h" | "help" => return Ok(None),
            "outfile" => options.outfile = Some(PathBuf::from(value(&mut i)?)),
            "overwrite" => {
                options.overwrite = match inline.as_deref() {
                    None | Some("true") => true,
                    Some("false") => false,
                    Some(other) => return Err(format!("invalid boolean value {other:?} for -overwrite")),
                }
            }
            "tags" => options
                .tags
                .extend(value(&mut i)?.split_whitespace().map(str::to_string)),
            "config" => options.config = Some(PathBuf::from(value(&mut i)?)),
            "format" => options.format = value(&mut i)?.parse()?,
            other => return Err(format!("flag provided but not defined: -{other}")),
        }
        i += 1;
    }

    let mut positional = args[i.min(args.len())..].iter();
    options.package = positional
        .next()
        .cloned()
        .ok_or_else(|| "missing package location".to_string())?;
    options.funcs = positional.cloned().collect();
    Ok(Some(options))
}

fn print_usage() {
    eprintln!("Usage: mockpkg [options] <package> [<func1> <func2> ...]");
    eprintln!();
    eprintln!("Synthesizes an interface from the exported functions of a Go package.");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  <package>           Package directory or import path");
    eprintln!("  <func>...           Functions to include (default: all exported functions)");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -outfile <file>     Write output to <file> instead of stdout");
    eprintln!("  -overwrite          Replace <file> when it already exists");
    eprintln!("  -tags \"<tags>\"      Space-separated build tags to satisfy");
    eprintln!("  -config <file>      Configuration file (default: ./{DEFAULT_MANIFEST} if present)");
    eprintln!("  -format json|go     Output format (default: go)");
    eprintln!("  -h, --help          Show this help");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  GOOS, GOARCH, CGO_ENABLED, GOROOT, GOPATH, GOMODCACHE   Build context overrides");
    eprintln!("  RUST_LOG                                                Log filter (default: warn)");
    eprintln!();
    eprintln!("Examples:");
    eprintln!("  mockpkg ./internal/store");
    eprintln!("  mockpkg -tags \"integration\" -outfile store_iface.go example.com/app/store Open Close");
    eprintln!("  mockpkg -format json net/http");
}
