use clap::{Parser, Subcommand};
use early_shift::config::Config;
use early_shift::db::Database;
use early_shift::monitor::MonitorCycle;
use early_shift::report::format_spikes_table;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "early-shift", about = "Spot growing games and the mechanics behind them")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run one full monitoring cycle
    Cycle,
    /// Run the monitoring cycle on CYCLE_INTERVAL, forever
    Watch,
    /// Resolve candidates and record one snapshot each
    Poll {
        /// Number of candidates to poll (defaults to CANDIDATE_LIMIT)
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Evaluate growth and correlate with recent mentions
    Detect {
        /// Print spikes without appending them to the store
        #[arg(long)]
        no_persist: bool,
    },
    /// Show the most recently detected spikes
    Spikes {
        /// Number of spikes to show (defaults to SPIKE_LIMIT)
        #[arg(short, long)]
        limit: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    info!("Loaded configuration: {:?}", config);

    let db = Database::new(&config)?;
    db.execute_init()?;
    let cycle = MonitorCycle::from_config(&config, db)?;

    match cli.command.unwrap_or(Command::Cycle) {
        Command::Cycle => {
            let summary = cycle.run_once().await?;
            println!("{}", format_spikes_table(&summary.spikes));
            println!("\n{} spikes detected and persisted.", summary.spikes.len());
        }
        Command::Watch => {
            info!("Starting monitor every {}", humantime::format_duration(config.cycle_interval));
            cycle.run().await;
        }
        Command::Poll { limit } => {
            let (resolved, report) = cycle.poll(limit.unwrap_or(config.candidate_limit)).await?;
            match report {
                Some(report) => println!(
                    "Polled {} of {} candidates at {} ({} degraded)",
                    report.polled,
                    resolved,
                    report.captured_at.to_rfc3339(),
                    report.degraded
                ),
                None => println!("No candidates to poll."),
            }
        }
        Command::Detect { no_persist } => {
            let detection = cycle.detect(!no_persist).await?;
            println!("{}", format_spikes_table(&detection.spikes));
            println!(
                "\n{} spikes from {} growth candidates and {} mentions{}.",
                detection.spikes.len(),
                detection.growth_candidates,
                detection.mentions,
                if no_persist { " (not persisted)" } else { "" }
            );
        }
        Command::Spikes { limit } => {
            let spikes = cycle
                .store()
                .retrieve(limit.unwrap_or(config.spike_limit))
                .await?;
            println!("{}", format_spikes_table(&spikes));
        }
    }

    Ok(())
}
