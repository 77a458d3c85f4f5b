use anyhow::Context;
use config_manager::SystemConfig;
use ledger_client::LedgerClient;
use price_client::SolscanClient;
use scan_orchestrator::{report, CohortAnalyzer, SymbolCache};
use std::sync::Arc;
use tracing::{error, info};
use winrate_core::PriceCache;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    if let Err(e) = run().await {
        error!("Scan failed: {:#}", e);
        println!("❌ An error occurred while processing the data.");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let token = args
        .next()
        .context("usage: winrate_tracker <token-address> [--holders]")?;
    let holders_view = args.next().as_deref() == Some("--holders");

    let config = SystemConfig::load()?;
    info!("Configuration loaded");

    let ledger = Arc::new(LedgerClient::new(config.helius.clone())?);
    let prices = Arc::new(PriceCache::new(SolscanClient::new(config.solscan.clone())?));
    let analyzer = CohortAnalyzer::new(ledger.clone(), prices, config.analysis.clone());
    let symbols = SymbolCache::new(ledger);

    match analyzer.scan_token(&token).await? {
        Some(scan) => {
            let rendered = if holders_view {
                report::render_holder_report(&scan, &symbols).await
            } else {
                report::render_cohort_report(&scan, &symbols).await
            };
            println!("{rendered}");
        }
        None => println!("No trading data available for analysis."),
    }

    Ok(())
}
