use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::{
    ConfigCommand, FlushCommand, LogCommand, QueueCommand, RetryCommand, TodayCommand,
    WatchCommand,
};
use moodsync::config::Config;
use moodsync::context::AppContext;

#[derive(Parser)]
#[command(name = "mood")]
#[command(version)]
#[command(about = "Log moods, even offline", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Show pipeline activity on stderr
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Log a mood
    Log(LogCommand),

    /// Show the mood logged for today
    Today(TodayCommand),

    /// List entries waiting to sync or needing a manual retry
    Queue(QueueCommand),

    /// Retry queued entries now
    Flush(FlushCommand),

    /// Manually retry an entry that failed to sync
    Retry(RetryCommand),

    /// Sync queued entries whenever the server is reachable
    Watch(WatchCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "moodsync=debug" } else { "moodsync=warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::load(cli.config)?;

    let command = match cli.command {
        Some(Commands::Config(cmd)) => return cmd.run(&config),
        Some(command) => command,
        None => {
            println!("Use --help to see available commands");
            return Ok(());
        }
    };

    let ctx = AppContext::start(config).await?;
    let result = match command {
        Commands::Log(cmd) => cmd.run(&ctx).await,
        Commands::Today(cmd) => cmd.run(&ctx).await,
        Commands::Queue(cmd) => cmd.run(&ctx).await,
        Commands::Flush(cmd) => cmd.run(&ctx).await,
        Commands::Retry(cmd) => cmd.run(&ctx).await,
        Commands::Watch(cmd) => cmd.run(&ctx).await,
        Commands::Config(_) => Ok(()),
    };
    ctx.shutdown().await;

    result
}
