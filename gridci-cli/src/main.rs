// gridci CLI
// Runs matrix fan-out workflows locally from the command line

mod commands;
mod output;

use clap::{Parser, Subcommand};
use color_eyre::Result;

#[derive(Parser, Debug)]
#[command(name = "gridci", version, about = "Run matrix fan-out CI workflows locally")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a workflow file
    Run(commands::run::RunArgs),
    /// Validate a workflow file without running it
    Validate(commands::validate::ValidateArgs),
    /// Expand and print a stage's job matrix
    Matrix(commands::matrix::MatrixArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => commands::run::execute(args).await,
        Command::Validate(args) => commands::validate::execute(args),
        Command::Matrix(args) => commands::matrix::execute(args),
    }
}
