use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::process;

use aml_core::{Application, Error, ParseNode, ReadIdiom, ValidationReport};

const EXIT_OK: i32 = 0;
const EXIT_INVALID: i32 = 1;
const EXIT_ERROR: i32 = 2;

/// AML: ArduinoML chained-declaration front end
///
/// Parse, validate, build and format AML programs.
#[derive(Parser)]
#[command(name = "aml", version, about, long_about = None)]
struct Cli {
    /// Suppress non-error output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log pipeline passes to stderr
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a program for semantic errors
    Validate {
        /// Path to .aml file
        file: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the parse tree as JSON
    Parse {
        /// Path to .aml file
        file: PathBuf,
    },

    /// Validate and build the linked application model
    Build {
        /// Path to .aml file
        file: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
        /// How guards read their sensors
        #[arg(long, value_enum, default_value_t = IdiomArg::Plain)]
        read_idiom: IdiomArg,
    },

    /// Print a program in canonical form
    Fmt {
        /// Path to .aml file
        file: PathBuf,
    },

    /// Compute semantic hash (SHA-256) of a program
    Hash {
        /// Path to .aml file
        file: PathBuf,
    },

    /// Show version information
    Version,
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Validate { .. } => "validate",
            Commands::Parse { .. } => "parse",
            Commands::Build { .. } => "build",
            Commands::Fmt { .. } => "fmt",
            Commands::Hash { .. } => "hash",
            Commands::Version => "version",
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum IdiomArg {
    Plain,
    DigitalRead,
}

impl From<IdiomArg> for ReadIdiom {
    fn from(arg: IdiomArg) -> Self {
        match arg {
            IdiomArg::Plain => ReadIdiom::Plain,
            IdiomArg::DigitalRead => ReadIdiom::DigitalRead,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(&cli);

    let quiet = cli.quiet;
    tracing::debug!(command = cli.command.name(), "dispatching command");
    let result = match cli.command {
        Commands::Validate { file, json } => cmd_validate(&file, json, quiet),
        Commands::Parse { file } => cmd_parse(&file),
        Commands::Build {
            file,
            json,
            read_idiom,
        } => cmd_build(&file, json, read_idiom.into(), quiet),
        Commands::Fmt { file } => cmd_fmt(&file),
        Commands::Hash { file } => cmd_hash(&file),
        Commands::Version => {
            println!("aml {}", env!("CARGO_PKG_VERSION"));
            Ok(EXIT_OK)
        }
    };

    process::exit(result.unwrap_or_else(|code| code));
}

fn init_tracing(cli: &Cli) {
    let level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .init();
}

// ── Commands ──────────────────────────────────────────────

// Each command returns its exit code; `Err` carries the code of a failure
// that has already been reported on stderr.
type CmdResult = Result<i32, i32>;

fn cmd_validate(file: &Path, json: bool, quiet: bool) -> CmdResult {
    let tree = load_tree(file)?;
    let report = aml_core::validator::validate(&tree);

    if json {
        print_json(&report.to_json())?;
    } else {
        print_report(file, &report, quiet);
        if report.is_valid() && !quiet {
            println!("{} {}: valid", "✓".green(), file.display());
        }
    }

    Ok(if report.is_valid() {
        EXIT_OK
    } else {
        EXIT_INVALID
    })
}

fn cmd_parse(file: &Path) -> CmdResult {
    let tree = load_tree(file)?;
    let value = serde_json::to_value(&tree).map_err(json_failure)?;
    print_json(&value)?;
    Ok(EXIT_OK)
}

fn cmd_build(file: &Path, json: bool, idiom: ReadIdiom, quiet: bool) -> CmdResult {
    let source = read_source(file)?;
    let compilation = aml_core::compile(&source).map_err(|e| fail(file, &e))?;

    let Some(app) = compilation.application else {
        if json {
            print_json(&compilation.report.to_json())?;
        } else {
            print_report(file, &compilation.report, quiet);
        }
        return Ok(EXIT_INVALID);
    };

    if json {
        print_json(&application_json(&app, idiom)?)?;
    } else {
        print_report(file, &compilation.report, quiet);
        if !quiet {
            print_application(&app, idiom);
        }
    }
    Ok(EXIT_OK)
}

fn cmd_fmt(file: &Path) -> CmdResult {
    let source = read_source(file)?;
    let canonical = aml_core::normalizer::normalize(&source).map_err(|e| fail(file, &e))?;
    print!("{}", canonical);
    Ok(EXIT_OK)
}

fn cmd_hash(file: &Path) -> CmdResult {
    let tree = load_tree(file)?;
    println!("{}", aml_core::normalizer::semantic_hash(&tree));
    Ok(EXIT_OK)
}

// ── Input ─────────────────────────────────────────────────

fn read_source(file: &Path) -> Result<String, i32> {
    std::fs::read_to_string(file).map_err(|e| {
        eprintln!("{} {}: {}", "error:".red().bold(), file.display(), e);
        EXIT_ERROR
    })
}

fn load_tree(file: &Path) -> Result<ParseNode, i32> {
    let source = read_source(file)?;
    aml_core::parser::parse(&source).map_err(|e| fail(file, &e))
}

/// Report a pipeline error; link failures count as invalid programs
fn fail(file: &Path, err: &Error) -> i32 {
    eprintln!("{} {}: {}", "error:".red().bold(), file.display(), err);
    if err.is_link_error() {
        EXIT_INVALID
    } else {
        EXIT_ERROR
    }
}

// ── Output ────────────────────────────────────────────────

fn print_json(value: &serde_json::Value) -> Result<(), i32> {
    let text = serde_json::to_string_pretty(value).map_err(json_failure)?;
    println!("{}", text);
    Ok(())
}

fn json_failure(err: serde_json::Error) -> i32 {
    eprintln!("{} JSON serialization failed: {}", "error:".red().bold(), err);
    EXIT_ERROR
}

fn print_report(file: &Path, report: &ValidationReport, quiet: bool) {
    for diagnostic in report.errors() {
        eprintln!("{} {}", "error:".red().bold(), diagnostic.message);
    }
    if !quiet {
        for diagnostic in report.warnings() {
            eprintln!("{} {}", "warning:".yellow().bold(), diagnostic.message);
        }
    }
    let errors = report.errors().len();
    if errors > 0 {
        eprintln!(
            "{} {}: {} error{}",
            "✗".red(),
            file.display(),
            errors,
            if errors == 1 { "" } else { "s" }
        );
    }
}

fn print_application(app: &Application, idiom: ReadIdiom) {
    println!("{} '{}'", "Application".bold(), app.name);

    println!("  bricks:");
    for brick in app.bricks.iter() {
        println!("    {} {} on pin {}", brick.kind, brick.name.cyan(), brick.pin);
    }

    let initial = app.initial_state().map(|s| s.name.as_str());
    println!("  states:");
    for (_, state) in app.states.iter() {
        if Some(state.name.as_str()) == initial {
            println!("    {} {}", state.name.cyan(), "(initial)".dimmed());
        } else {
            println!("    {}", state.name.cyan());
        }
        for action in &state.actions {
            println!("      set {} to {}", action.actuator, action.signal);
        }
        if let Some(transition) = &state.transition {
            let target = app.target(transition).map(|s| s.name.as_str()).unwrap_or("?");
            println!(
                "      when {} -> {}",
                transition.guard.render_with(idiom),
                target
            );
        }
    }
}

/// Model JSON with each `condition` rendered in the requested idiom
fn application_json(app: &Application, idiom: ReadIdiom) -> Result<serde_json::Value, i32> {
    let mut value = serde_json::to_value(app).map_err(json_failure)?;
    if let Some(states) = value.get_mut("states").and_then(|s| s.as_array_mut()) {
        for (entry, (_, state)) in states.iter_mut().zip(app.states.iter()) {
            if let (Some(transition), Some(rendered)) = (
                entry.get_mut("transition").and_then(|t| t.as_object_mut()),
                state.transition.as_ref().map(|t| t.guard.render_with(idiom)),
            ) {
                transition.insert("condition".into(), serde_json::Value::String(rendered));
            }
        }
    }
    Ok(value)
}
