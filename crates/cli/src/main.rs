use clap::{Parser, Subcommand};
use explorer_core::{config::AppConfig, runtime::ExplorerRuntime, BlockId};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
use commands::{
    handle_config_command, handle_providers_command,
    query,
    utils::{print_error, CliError, CliResult},
    ConfigCommands, ProvidersCommands,
};

#[derive(Parser)]
#[command(name = "explorer-cli")]
#[command(about = "Query a chain through a rotating set of RPC providers")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to $EXPLORER_CONFIG or config/explorer.toml)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Node status of the selected network
    Status,

    /// A block by height or hash
    Block { id: BlockId },

    /// Latest final block
    Latest,

    /// Transactions in an inclusive height range
    Txs {
        #[arg(long)]
        from: u64,
        #[arg(long)]
        to: u64,
    },

    /// Follow the chain and print new transactions
    Watch {
        /// Poll interval in milliseconds (defaults to sync.poll_interval_ms)
        #[arg(long)]
        interval_ms: Option<u64>,
    },

    /// Provider management
    #[command(subcommand)]
    Providers(ProvidersCommands),

    /// Configuration management
    #[command(subcommand)]
    Config(ConfigCommands),
}

fn init_logging(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &config.logging.level;
        EnvFilter::new(format!("warn,explorer_core={level},explorer_cli={level}"))
    });
    let registry = tracing_subscriber::registry().with(filter);

    if config.logging.format.as_str() == "json" {
        let fmt_layer = tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr);
        registry.with(fmt_layer).init();
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .pretty()
            .with_file(true)
            .with_line_number(true)
            .with_target(false)
            .with_writer(std::io::stderr);
        registry.with(fmt_layer).init();
    }
}

fn load_config(path: Option<&str>) -> CliResult<AppConfig> {
    match path {
        Some(path) => AppConfig::from_file(path),
        None => AppConfig::load(),
    }
    .map_err(|e| CliError::Config(e.to_string()))
}

async fn run(cli: Cli) -> CliResult<()> {
    if let Commands::Config(command) = cli.command {
        return handle_config_command(command);
    }

    let config = load_config(cli.config.as_deref())?;
    init_logging(&config);

    // One-shot commands drive the explorer directly; background tasks stay off.
    let runtime = ExplorerRuntime::builder()
        .with_config(config)
        .disable_health_checker()
        .disable_sync_poller()
        .build()?;
    let explorer = runtime.explorer().clone();
    tracing::debug!(network = %explorer.network(), "explorer runtime ready");

    let result = match cli.command {
        Commands::Status => query::show_status(&explorer, cli.json).await,
        Commands::Block { id } => query::show_block(&explorer, &id, cli.json).await,
        Commands::Latest => query::show_latest(&explorer, cli.json).await,
        Commands::Txs { from, to } => query::show_transactions(&explorer, from, to, cli.json).await,
        Commands::Watch { interval_ms } => {
            query::watch(&explorer, interval_ms.map(Duration::from_millis), cli.json).await
        }
        Commands::Providers(command) => {
            handle_providers_command(command, &explorer, cli.json).await
        }
        Commands::Config(_) => Ok(()),
    };

    runtime.shutdown().await;
    result
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        print_error(&e.to_string());
        std::process::exit(1);
    }
}
