//! CLI entry point for the pre-commit code review engine.
//!
//! Three surfaces: no args runs hook mode against the staged file set; a
//! single reserved flag requests installer behavior (delegated to an
//! external script — out of scope for this crate); any other positional
//! args are explicit file paths to review with empty `changedLines`. The
//! core never throws through this entry point: every fallible step is
//! caught here and turned into a `tracing::error!` plus exit code 1.

use clap::Parser;
use review_engine::config::Config;
use review_engine::report;
use review_engine::review::{self, ReviewTarget};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(
    name = "review-engine",
    about = "Pre-commit code review engine: change-scoped findings and reverse-dependency impact analysis",
    version
)]
struct Args {
    /// Explicit file paths to review instead of the staged set (no diff
    /// scope — the whole file is in scope).
    files: Vec<PathBuf>,

    /// Install the git pre-commit hook. Delegated to an external
    /// installer script; this crate only recognizes the flag and exits.
    #[arg(long)]
    install: bool,

    /// Path to a `.properties`-style config file. Defaults to
    /// `<repoRoot>/.code-reviewer.properties`.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Increase log verbosity (repeat for more). Overridden by `RUST_LOG`
    /// if set.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Emit the JSON payload instead of the plain-text summary.
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);

    match run(args) {
        Ok(code) => ExitCode::from(code as u8),
        Err(err) => {
            tracing::error!("review-engine failed: {err:#}");
            eprintln!("review-engine: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> anyhow::Result<i32> {
    if args.install {
        // Hook installation is an external script's responsibility. We
        // only recognize the flag so a
        // caller wiring this binary into an installer doesn't see an
        // "unknown argument" error.
        println!("install: delegated to the external installer script; nothing to do here");
        return Ok(0);
    }

    let cwd = std::env::current_dir()?;
    let repo_root = review_engine::vcs::repo_root(&cwd);

    let config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            Config::parse(&text)
        }
        None => Config::load(&repo_root),
    };

    let target = if args.files.is_empty() {
        ReviewTarget::Staged
    } else {
        ReviewTarget::Explicit(args.files)
    };

    let payload = review::run(&repo_root, target, &config);

    if args.json {
        println!("{}", report::to_json(&payload)?);
    } else {
        report::write_summary(&mut std::io::stdout(), &payload)?;
    }

    Ok(payload.exit_code(config.block_on_must_fix))
}

fn init_tracing(verbose: u8) {
    use tracing_subscriber::EnvFilter;

    let default_directive = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .try_init();
}
