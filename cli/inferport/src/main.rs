//! inferport CLI: resolve targets, pick backends and generate inference code.

mod commands;
mod context;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use commands::build::BuildArgs;
use inferport_backends::Operation;

#[derive(Parser)]
#[command(name = "inferport", version, about = "Deploy trained models to embedded AI targets")]
struct Cli {
    /// Log debug output
    #[arg(long, short, global = true)]
    verbose: bool,
    /// Log as JSON lines instead of text
    #[arg(long, global = true)]
    json_logs: bool,
    /// Extra chip catalog file or directory (repeatable)
    #[arg(long, global = true)]
    catalog: Vec<PathBuf>,
    /// Directory of `.backend.toml` manifests
    #[arg(long, global = true)]
    backends_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate code for every enabled model
    Build(BuildArgs),
    /// Validate models against their backends without generating code
    Check(BuildArgs),
    /// List supported chips and the targets they offer
    Targets {
        /// Only list targets of this chip
        soc: Option<String>,
        /// List SOC[PACKAGE] pairs instead of targets
        #[arg(long)]
        packages: bool,
        /// Print JSON
        #[arg(long)]
        json: bool,
    },
    /// List registered backends and what they support
    Backends {
        /// Print JSON
        #[arg(long)]
        json: bool,
    },
    /// Describe the extension options a backend accepts
    Extensions {
        /// Backend name
        backend: String,
        /// Print the raw schema
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    context::init_tracing(cli.verbose, cli.json_logs);
    if let Err(e) = run(cli) {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let ctx = context::Context::load(&cli.catalog, cli.backends_dir.as_deref())?;
    match cli.command {
        Commands::Build(args) => commands::build::run(&ctx, &args, Operation::Build),
        Commands::Check(args) => commands::build::run(&ctx, &args, Operation::Check),
        Commands::Targets {
            soc,
            packages,
            json,
        } => commands::targets::run(&ctx, soc.as_deref(), packages, json),
        Commands::Backends { json } => commands::backends::run(&ctx, json),
        Commands::Extensions { backend, json } => commands::extensions::run(&ctx, &backend, json),
    }
}
