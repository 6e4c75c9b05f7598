use clap::{Parser, Subcommand};

mod commands;
mod scenario;

#[derive(Parser)]
#[command(
    name = "sortctl",
    about = "WarpGrid sorter — replay allocation scenarios and inspect client ordering",
    version,
    propagate_version = true,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the allocation order for one or more rounds.
    Order {
        /// Scenario file (sorter config plus agents and clients)
        #[arg(short, long)]
        scenario: String,
        /// Number of allocation rounds to sort
        #[arg(short, long, default_value = "1")]
        rounds: usize,
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
    /// Load a scenario and check the sorter's invariants.
    Check {
        #[arg(short, long)]
        scenario: String,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,warpgrid=debug".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Order {
            scenario,
            rounds,
            format,
        } => commands::order::order(&scenario, rounds, &format),
        Commands::Check { scenario } => commands::check::check(&scenario),
    }
}
