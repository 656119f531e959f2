use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use sync::{PrintFormat, RunOptions, RunStatus};
use sync_core::CancelFlag;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod output;

/// Collect secrets from configured sources and push them to AWS SSM
/// Parameter Store and Secrets Manager.
#[derive(Parser)]
#[command(name = "secrets-sync", version, about)]
struct Cli {
    /// YAML config file(s) to merge; later files override earlier ones
    #[arg(short = 'f', long = "file", value_name = "PATH", required = true)]
    files: Vec<PathBuf>,

    /// Collect and preview, but do not push to AWS
    #[arg(long)]
    dry_run: bool,

    /// Include value snapshots in preview and sync output
    #[arg(long)]
    print_values: bool,

    /// Preview output format
    #[arg(long, value_enum, default_value = "list")]
    print_format: PrintFormatArg,

    /// Print one line per item while pushing to sinks
    #[arg(long)]
    print_sync_details: bool
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PrintFormatArg {
    List,
    Table,
    Json
}

impl From<PrintFormatArg> for PrintFormat {
    fn from(value: PrintFormatArg) -> Self {
        match value {
            PrintFormatArg::List => Self::List,
            PrintFormatArg::Table => Self::Table,
            PrintFormatArg::Json => Self::Json
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let cfg = match config::load_config_from_files(&cli.files) {
        Ok(cfg) => cfg,
        Err(e) => {
            output::error(&format!("failed to load config: {e}"));
            return ExitCode::from(2);
        }
    };

    let cancel = CancelFlag::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Received Ctrl+C, finishing in-flight writes");
                cancel.cancel();
            }
        });
    }

    let options = RunOptions {
        dry_run: cli.dry_run,
        print_values: cli.print_values,
        print_format: cli.print_format.into(),
        print_sync_details: cli.print_sync_details
    };

    match sync::run(&cfg, &options, cancel).await {
        Ok(RunStatus::Success) => ExitCode::SUCCESS,
        Ok(RunStatus::ItemsFailed) => ExitCode::from(1),
        Ok(RunStatus::Cancelled) => ExitCode::from(130),
        Err(e) => {
            output::error(&e.to_string());
            ExitCode::from(1)
        }
    }
}
