//! mdopt entrypoint: read one m68k GAS translation unit, rewrite it with
//! smaller/faster equivalent sequences, write the result.

use std::path::PathBuf;
use std::sync::Once;

use anyhow::{Context, Result};
use clap::Parser;
use core_driver::{optimize, OptimizeOutcome};
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;

/// CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "mdopt", version, about = "m68k GAS peephole optimizer")]
struct Args {
    /// Assembly input (`gcc -S` output).
    pub input: PathBuf,
    /// Where to write the optimized assembly.
    pub output: PathBuf,
    /// Optional configuration file path (overrides discovery of
    /// `mdopt.toml`).
    #[arg(long = "config")]
    pub config: Option<PathBuf>,
}

fn configure_logging() -> Option<WorkerGuard> {
    let file_appender = tracing_appender::rolling::never(".", "mdopt.log");
    let (nb_writer, guard) = tracing_appender::non_blocking(file_appender);
    match tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(nb_writer)
        .with_ansi(false)
        .try_init()
    {
        Ok(_) => Some(guard),
        Err(_) => {
            // Global subscriber already installed; drop the guard so the
            // writer shuts down.
            None
        }
    }
}

fn install_panic_hook() {
    static HOOK: Once = Once::new();
    HOOK.call_once(|| {
        let default_panic = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            tracing::error!(target: "runtime.panic", ?info, "panic");
            default_panic(info);
        }));
    });
}

fn run(args: &Args) -> Result<()> {
    let cfg = core_config::load_from(args.config.clone())?;
    let source = std::fs::read_to_string(&args.input)
        .with_context(|| format!("cannot read {}", args.input.display()))?;
    info!(
        target: "io",
        input = %args.input.display(),
        bytes = source.len(),
        "input_read"
    );

    let OptimizeOutcome { text, report } = optimize(&source, &cfg);

    if cfg.print_log {
        report.print(cfg.two_column_log);
    }
    info!(target: "driver", rewrites = report.len(), "summary");

    if cfg.save_optimizations {
        std::fs::write(&args.output, text)
            .with_context(|| format!("cannot write {}", args.output.display()))?;
        info!(target: "io", output = %args.output.display(), "output_written");
    } else {
        info!(target: "io", "dry_run_no_output");
    }
    Ok(())
}

fn main() {
    let args = Args::parse();
    let _log_guard = configure_logging();
    install_panic_hook();
    if let Err(e) = run(&args) {
        error!(target: "runtime", error = %e, "fatal");
        eprintln!("mdopt: {e:#}");
        std::process::exit(1);
    }
}
