use clap::{Subcommand, ValueEnum};
use explorer_core::{provider::MoveDirection, Explorer, Network};

use super::utils::{format_health, print_info, print_json, print_success, CliResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Direction {
    Up,
    Down,
}

impl From<Direction> for MoveDirection {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Up => Self::Up,
            Direction::Down => Self::Down,
        }
    }
}

#[derive(Subcommand)]
pub enum ProvidersCommands {
    /// List providers of a network (defaults to the selected one)
    List {
        #[arg(short, long)]
        network: Option<Network>,
    },

    /// Add a custom provider
    Add {
        name: String,
        url: String,

        /// Network of the provider (defaults to the selected one)
        #[arg(short, long)]
        network: Option<Network>,
    },

    /// Remove a custom provider
    Remove { id: String },

    /// Flip the enabled flag of a provider in the selected network
    Toggle { id: String },

    /// Enable every provider of the selected network
    EnableAll,

    /// Disable every provider of the selected network
    DisableAll,

    /// Move a provider one step in the rotation order
    Move {
        id: String,
        #[arg(value_enum)]
        direction: Direction,
    },

    /// Probe providers with a `status` call (all enabled ones when no id is given)
    Test { id: Option<String> },

    /// Start the rotation at a provider and show the node it reaches
    Select { id: String },

    /// Show or change the selected network
    Network { network: Option<Network> },

    /// Drop custom providers and restore the built-in order
    Reset,
}

pub async fn handle_providers_command(
    command: ProvidersCommands,
    explorer: &Explorer,
    json: bool,
) -> CliResult<()> {
    match command {
        ProvidersCommands::List { network } => {
            list_providers(explorer, network.unwrap_or_else(|| explorer.network()), json)
        }
        ProvidersCommands::Add { name, url, network } => {
            let network = network.unwrap_or_else(|| explorer.network());
            let provider = explorer.add_custom_provider(&name, &url, network)?;
            print_success(&format!("Added {} ({}) to {network}", provider.id, provider.url));
            Ok(())
        }
        ProvidersCommands::Remove { id } => {
            let removed = explorer.remove_custom_provider(&id)?;
            print_success(&format!("Removed {} ({})", removed.id, removed.url));
            Ok(())
        }
        ProvidersCommands::Toggle { id } => {
            let enabled = explorer.toggle_provider(&id)?;
            print_success(&format!("{id} is now {}", if enabled { "enabled" } else { "disabled" }));
            Ok(())
        }
        ProvidersCommands::EnableAll => {
            let changed = explorer.enable_all_providers()?;
            print_success(&format!("Enabled {changed} provider(s) in {}", explorer.network()));
            Ok(())
        }
        ProvidersCommands::DisableAll => {
            let changed = explorer.disable_all_providers()?;
            print_success(&format!("Disabled {changed} provider(s) in {}", explorer.network()));
            Ok(())
        }
        ProvidersCommands::Move { id, direction } => {
            if explorer.move_provider(&id, direction.into())? {
                print_success(&format!("Moved {id} {direction:?}"));
            } else {
                print_info(&format!("{id} is already at the edge of the list"));
            }
            list_providers(explorer, explorer.network(), json)
        }
        ProvidersCommands::Test { id } => test_providers(explorer, id, json).await,
        ProvidersCommands::Select { id } => select_provider(explorer, &id, json).await,
        ProvidersCommands::Network { network: None } => {
            println!("{}", explorer.network());
            Ok(())
        }
        ProvidersCommands::Network { network: Some(network) } => {
            if explorer.set_network(network)? {
                print_success(&format!("Selected network: {network}"));
            } else {
                print_info(&format!("{network} is already selected"));
            }
            Ok(())
        }
        ProvidersCommands::Reset => {
            explorer.reset_providers()?;
            print_success("Provider list restored to defaults");
            Ok(())
        }
    }
}

fn list_providers(explorer: &Explorer, network: Network, json: bool) -> CliResult<()> {
    let providers = explorer.providers(network);
    if json {
        return print_json(&providers);
    }

    let marker = if network == explorer.network() { " (selected)" } else { "" };
    println!("Providers for {network}{marker}:");
    if providers.is_empty() {
        println!("  none");
    }
    for provider in &providers {
        println!(
            "  {:>2}. [{}] {:<20} {:<40} {}{}",
            provider.priority,
            if provider.enabled { "x" } else { " " },
            provider.id,
            provider.url,
            format_health(explorer.provider_health(&provider.id).as_ref()),
            if provider.is_custom { "  (custom)" } else { "" },
        );
    }
    Ok(())
}

async fn test_providers(explorer: &Explorer, id: Option<String>, json: bool) -> CliResult<()> {
    let ids: Vec<String> = match id {
        Some(id) => vec![id],
        None => explorer.enabled_providers().into_iter().map(|p| p.id).collect(),
    };
    if ids.is_empty() {
        print_info(&format!("No enabled providers in {}", explorer.network()));
        return Ok(());
    }

    let probes = ids.iter().map(|id| explorer.test_provider(id));
    let results = futures::future::join_all(probes).await;

    if json {
        let report: Vec<_> = ids.iter().zip(&results).collect();
        return print_json(&report);
    }

    for (id, health) in ids.iter().zip(&results) {
        println!("  {id:<20} {}", format_health(Some(health)));
    }
    let healthy = results.iter().filter(|h| h.is_healthy).count();
    print_info(&format!("{healthy}/{} providers healthy", results.len()));
    Ok(())
}

async fn select_provider(explorer: &Explorer, id: &str, json: bool) -> CliResult<()> {
    let provider = explorer.select_provider(id)?;
    print_success(&format!("Rotation starts at {} ({})", provider.id, provider.url));

    let status = explorer.get_status().await?;
    if json {
        return print_json(&serde_json::json!({
            "current": explorer.get_current_provider_info(),
            "status": status,
        }));
    }
    if let Some(info) = explorer.get_current_provider_info() {
        println!(
            "  answered by {} ({}/{}), chain {} at height {}",
            info.provider.id,
            info.position + 1,
            info.total,
            status.chain_id,
            status.latest_block_height
        );
    }
    Ok(())
}
