use clap::Subcommand;
use explorer_core::config::{AppConfig, DEFAULT_CONFIG_PATH};
use std::path::Path;

use super::utils::{print_error, print_info, print_json, print_success, CliError, CliResult};

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Validate a configuration file
    Validate {
        /// Path to config file
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        file: String,
    },

    /// Show the effective configuration (defaults, file and environment merged)
    Show {
        /// Path to config file
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        file: String,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate a sample configuration file
    Generate {
        /// Output path for the config file
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        output: String,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}

pub fn handle_config_command(command: ConfigCommands) -> CliResult<()> {
    match command {
        ConfigCommands::Validate { file } => validate_config(&file),
        ConfigCommands::Show { file, json } => show_config(&file, json),
        ConfigCommands::Generate { output, force } => generate_config(&output, force),
    }
}

fn load(file: &str) -> CliResult<AppConfig> {
    AppConfig::from_file(file).map_err(|e| CliError::Config(e.to_string()))
}

fn validate_config(file: &str) -> CliResult<()> {
    if !Path::new(file).exists() {
        print_error(&format!("Configuration file not found: {file}"));
        return Err(CliError::Config(format!("File not found: {file}")));
    }

    print_info(&format!("Loading configuration from {file}..."));
    let config = load(file)?;

    print_info("Validating configuration...");
    config.validate().map_err(CliError::Config)?;

    print_success("Configuration is valid!");

    println!("Configuration Summary:");
    println!("  Default network: {}", config.registry.default_network);
    println!("  Registry storage: {}", config.registry.storage_dir);
    println!(
        "  Proxy: {}",
        config.transport.proxy_url.as_deref().unwrap_or("none (direct requests)")
    );
    println!(
        "  Failover: {} attempts per provider, {}ms initial backoff x{}",
        config.failover.max_attempts,
        config.failover.initial_backoff_ms,
        config.failover.backoff_multiplier
    );
    println!(
        "  Health checker: {}",
        if config.health.enabled { "enabled" } else { "disabled" }
    );
    println!(
        "  Sync poller: {}",
        if config.sync.enabled { "enabled" } else { "disabled" }
    );

    Ok(())
}

fn show_config(file: &str, json: bool) -> CliResult<()> {
    let config = load(file)?;
    if json {
        return print_json(&config);
    }

    println!("Configuration from {file}:");

    println!("\n[Registry]");
    println!("  Storage Dir: {}", config.registry.storage_dir);
    println!("  Default Network: {}", config.registry.default_network);

    println!("\n[Transport]");
    println!("  Proxy URL: {}", config.transport.proxy_url.as_deref().unwrap_or("-"));
    println!("  Concurrent Limit: {}", config.transport.concurrent_limit);
    println!("  Connect Timeout: {}s", config.transport.connect_timeout_seconds);
    println!("  User Agent: {}", config.transport.user_agent);

    println!("\n[Failover]");
    println!("  Max Attempts: {}", config.failover.max_attempts);
    println!("  Initial Backoff: {}ms", config.failover.initial_backoff_ms);
    println!("  Backoff Multiplier: {}", config.failover.backoff_multiplier);
    println!("  Request Timeout: {}s", config.failover.request_timeout_seconds);

    println!("\n[Health]");
    println!("  Enabled: {}", config.health.enabled);
    println!("  Probe Timeout: {}s", config.health.probe_timeout_seconds);
    println!("  Check Interval: {}s", config.health.check_interval_seconds);

    println!("\n[Sync]");
    println!("  Enabled: {}", config.sync.enabled);
    println!("  Window: {} blocks", config.sync.window);
    println!("  Max Transactions: {}", config.sync.max_transactions);
    println!("  Block Cache Capacity: {}", config.sync.block_cache_capacity);
    println!("  Concurrency: {}", config.sync.concurrency);
    println!("  Batch Delay: {}ms", config.sync.batch_delay_ms);
    println!("  Poll Interval: {}ms", config.sync.poll_interval_ms);

    println!("\n[Logging]");
    println!("  Level: {}", config.logging.level);
    println!("  Format: {}", config.logging.format);

    Ok(())
}

const SAMPLE_HEADER: &str = "\
# Chain explorer RPC access layer configuration.
# Every value below is the compiled default. Any key can also be overridden with an
# environment variable such as EXPLORER__SYNC__WINDOW=20.

";

fn sample_config() -> CliResult<String> {
    let body = toml::to_string_pretty(&AppConfig::default())
        .map_err(|e| CliError::General(format!("Failed to render sample config: {e}")))?;
    Ok(format!("{SAMPLE_HEADER}{body}"))
}

fn generate_config(output: &str, force: bool) -> CliResult<()> {
    if Path::new(output).exists() && !force {
        return Err(CliError::Config(format!(
            "File {output} already exists. Use --force to overwrite."
        )));
    }

    if let Some(parent) = Path::new(output).parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(output, sample_config()?)?;

    print_success(&format!("Sample configuration generated: {output}"));
    print_info("Set transport.proxy_url when the providers reject cross-origin requests");

    Ok(())
}
