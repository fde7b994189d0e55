//! chix - a C source editor with compile and run support
//!
//! This is the main entry point. It parses CLI arguments and delegates
//! to the appropriate mode runner (shell or batch).

use chix::{cli, config, run, user_config};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Diagnostics go to stderr so they never mix with program output
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    // Parse command line arguments
    let cli = cli::Cli::parse()?;
    if cli.help {
        println!("{}", cli::USAGE);
        return Ok(());
    }

    // Load configuration
    let mut config = config::Config::default();
    user_config::configure(&mut config);

    // Apply CLI overrides
    cli.apply_to_config(&mut config);

    // Run in appropriate mode
    let ok = match run::mode_for(&cli) {
        run::EditorMode::Shell => {
            run::run_shell_mode(&cli.paths, &config, run::detect_style())?;
            true
        }
        run::EditorMode::BatchRun(path) => run::run_batch_run(&path, &config)?,
        run::EditorMode::BatchAnalyze(path) => run::run_batch_analyze(&path, &config)?,
    };

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}
