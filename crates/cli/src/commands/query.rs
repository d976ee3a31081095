use explorer_core::{
    cache::{ScanReport, SyncOutcome},
    chain::{Block, Transaction},
    provider::FailoverEvent,
    BlockId, BlockRange, Explorer,
};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::utils::{format_actions, print_error, print_info, print_json, CliError, CliResult};

pub async fn show_status(explorer: &Explorer, json: bool) -> CliResult<()> {
    let status = explorer.get_status().await?;
    if json {
        return print_json(&status);
    }

    println!("Network:        {}", explorer.network());
    println!("Chain id:       {}", status.chain_id);
    println!("Latest height:  {}", status.latest_block_height);
    println!("Latest hash:    {}", status.latest_block_hash);
    println!("Latest time:    {}", status.latest_block_time);
    println!("Syncing:        {}", status.syncing);
    println!("Node version:   {} (protocol {})", status.node_version, status.protocol_version);
    print_current_provider(explorer);
    Ok(())
}

pub async fn show_block(explorer: &Explorer, id: &BlockId, json: bool) -> CliResult<()> {
    let block = explorer.get_block(id).await?;
    print_block(&block, json)
}

pub async fn show_latest(explorer: &Explorer, json: bool) -> CliResult<()> {
    let block = explorer.get_latest_block().await?;
    print_block(&block, json)
}

pub async fn show_transactions(
    explorer: &Explorer,
    from: u64,
    to: u64,
    json: bool,
) -> CliResult<()> {
    if from > to {
        return Err(CliError::General(format!("--from ({from}) must not exceed --to ({to})")));
    }
    let report = explorer.get_transactions_in_range(BlockRange::new(from, to)).await?;
    if json {
        return print_json(&report);
    }

    print_report(&report);
    Ok(())
}

/// Polls the tip and prints transactions as new heights are synced, until Ctrl+C.
pub async fn watch(
    explorer: &Explorer,
    interval: Option<Duration>,
    json: bool,
) -> CliResult<()> {
    let interval = interval.unwrap_or(explorer.sync().config().poll_interval);
    let cancel = CancellationToken::new();

    let _failovers = explorer.on_failover_event(|event| match event {
        FailoverEvent::ProviderSwitched { from, to, reason, .. } => {
            eprintln!("[FAILOVER] {from} -> {to}: {reason}");
        }
        FailoverEvent::ProvidersExhausted { tried, .. } => {
            eprintln!("[FAILOVER] all providers failed: {}", tried.join(", "));
        }
        _ => {}
    });

    print_info(&format!(
        "Watching {} every {}ms, Ctrl+C to stop",
        explorer.network(),
        interval.as_millis()
    ));

    let watcher = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            watcher.cancel();
        }
    });

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        match explorer.sync_recent_with_cancel(&cancel).await {
            Ok(SyncOutcome::Synced { report, cursor }) => {
                if json {
                    for tx in &report.transactions {
                        println!("{}", serde_json::to_string(tx)?);
                    }
                } else {
                    for tx in &report.transactions {
                        print_transaction(tx);
                    }
                    if !report.failed_heights.is_empty() {
                        print_error(&format!(
                            "failed heights {:?}, cursor held at {cursor:?}",
                            report.failed_heights
                        ));
                    }
                }
            }
            Ok(_) => {}
            Err(e) if e.is_cancelled() => break,
            Err(e) => print_error(&e.to_string()),
        }
    }

    let (_, transactions) = explorer.cache_stats();
    print_info(&format!("Stopped; {} transactions cached", transactions.entries));
    Ok(())
}

fn print_current_provider(explorer: &Explorer) {
    if let Some(info) = explorer.get_current_provider_info() {
        println!(
            "Provider:       {} ({}/{}) {}",
            info.provider.id,
            info.position + 1,
            info.total,
            info.provider.url
        );
    }
}

fn print_block(block: &Block, json: bool) -> CliResult<()> {
    if json {
        return print_json(block);
    }

    println!("Block #{}", block.height);
    println!("  Hash:       {}", block.hash);
    println!("  Prev hash:  {}", block.prev_hash);
    println!("  Time:       {}", block.timestamp_utc().to_rfc3339());
    println!("  Author:     {}", block.author);
    println!("  Chunks:     {}", block.chunks.len());
    for chunk in &block.chunks {
        let stale = if chunk.height_included == block.height { "" } else { " (carried over)" };
        println!("    shard {}: {}{stale}", chunk.shard_id, chunk.chunk_hash);
    }
    Ok(())
}

fn print_transaction(tx: &Transaction) {
    println!(
        "#{:<10} {}  {} -> {}  [{}]",
        tx.block_height,
        tx.hash,
        tx.signer_id,
        tx.receiver_id,
        format_actions(&tx.actions)
    );
}

fn print_report(report: &ScanReport) {
    for tx in report.transactions.iter().rev() {
        print_transaction(tx);
    }
    print_info(&format!(
        "{} transactions in {} ({} heights scanned)",
        report.transactions.len(),
        report.range,
        report.scanned
    ));
    if !report.failed_heights.is_empty() {
        print_error(&format!("Failed heights: {:?}", report.failed_heights));
    }
}
