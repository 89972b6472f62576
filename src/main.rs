use clap::{Parser, error::ErrorKind};

use hookforward::cli::Cli;
use hookforward::error::{AppError, ExitCode};

#[tokio::main]
async fn main() {
    init_logging();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // --help and --version are informational, not errors — print as-is.
            if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) {
                e.print().expect("failed to write to stdout");
                std::process::exit(0);
            }
            let app_err = AppError {
                message: clean_clap_error(&e),
                code: ExitCode::GeneralError,
            };
            app_err.print_json_stderr();
            std::process::exit(app_err.code as i32);
        }
    };

    let config = cli.into_config();
    if let Err(e) = hookforward::control::run(config).await {
        e.print_json_stderr();
        std::process::exit(e.code as i32);
    }
}

/// Strip clap's multi-line usage banner down to one readable sentence,
/// matching the teacher's JSON-on-stderr error convention.
fn clean_clap_error(e: &clap::Error) -> String {
    let full = e.to_string();
    let clean = full
        .lines()
        .filter(|line| {
            let trimmed = line.trim();
            !trimmed.is_empty()
                && !trimmed.starts_with("For more information")
                && !trimmed.starts_with("Usage:")
        })
        .map(|line| line.strip_prefix("error: ").unwrap_or(line).trim())
        .collect::<Vec<_>>()
        .join(", ");
    if clean.is_empty() {
        e.kind().to_string()
    } else {
        clean
    }
}

/// One-time `tracing` initialization (ambient logging concern), honoring
/// `RUST_LOG` the way the teacher's CLI does for its own commands.
fn init_logging() {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}
