use chrono::{Duration, Utc};
use config_manager::AnalysisConfig;
use futures::future::join_all;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use winrate_core::{
    classify_confidence, CohortResult, LedgerSource, PriceCache, PriceSource, Result, WalletAsset,
    WalletResult, WalletStanding,
};

use crate::wallet::WalletAnalyzer;

/// One resolved top holder and everything the reports need about it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HolderStanding {
    /// The holder's token account for the scanned token
    pub token_account: String,

    /// Wallet behind the token account
    pub owner: String,

    /// Balance of the scanned token held
    pub balance: Decimal,

    /// Trade performance over the window; zero trades means "no data"
    pub result: WalletResult,

    /// Tokens the wallet currently holds, for the assets line
    pub assets: Vec<WalletAsset>,
}

/// Outcome of scanning one token's top holders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CohortScan {
    /// Resolved holders in discovery order
    pub holders: Vec<HolderStanding>,

    /// Token supply, zero when the upstream had none
    pub supply: Decimal,
}

impl CohortScan {
    /// Cohort aggregate over the wallets that actually traded.
    ///
    /// `None` means no wallet produced a trade, which is reported as "no
    /// trading data" rather than as a zero-confidence cohort.
    pub fn confidence(&self) -> Option<CohortResult> {
        let pack: Vec<WalletStanding> = self
            .holders
            .iter()
            .filter(|holder| holder.result.has_trades())
            .map(|holder| WalletStanding {
                win_rate: holder.result.win_rate,
                total_pnl: holder.result.total_pnl,
                total_trades: holder.result.total_trades,
            })
            .collect();

        if pack.is_empty() {
            return None;
        }
        Some(classify_confidence(&pack))
    }
}

/// Discovers a token's top holders and fans wallet analysis out over them.
///
/// Owns the per-run price cache; dropping the analyzer drops the cache.
pub struct CohortAnalyzer<L: LedgerSource, P: PriceSource> {
    ledger: Arc<L>,
    wallets: WalletAnalyzer<L, P>,
    settings: AnalysisConfig,
}

impl<L: LedgerSource, P: PriceSource> CohortAnalyzer<L, P> {
    pub fn new(ledger: Arc<L>, prices: Arc<PriceCache<P>>, settings: AnalysisConfig) -> Self {
        Self {
            wallets: WalletAnalyzer::new(ledger.clone(), prices),
            ledger,
            settings,
        }
    }

    /// Full scan of a token's top holders.
    ///
    /// `Ok(None)` when no holder account resolves to a wallet; there is
    /// nothing to report. Per-wallet failures degrade that wallet to "no
    /// data" without aborting the scan.
    pub async fn scan_token(&self, token: &str) -> Result<Option<CohortScan>> {
        info!("Starting scan for token: {}", token);

        let (holders, supply) = tokio::join!(
            self.ledger.top_holders(token),
            self.ledger.token_supply(token)
        );
        let holders = holders?;
        if holders.is_empty() {
            info!("No holder accounts found for token {}", token);
            return Ok(None);
        }
        let supply = match supply {
            Ok(supply) => supply.unwrap_or(Decimal::ZERO),
            Err(e) => {
                warn!("Supply lookup failed for token {}: {}", token, e);
                Decimal::ZERO
            }
        };

        // Resolve owners concurrently; each future carries its holding so
        // completion order cannot misalign accounts and owners.
        let resolved: Vec<_> = join_all(holders.into_iter().map(|holding| async move {
            match self.ledger.resolve_owner(&holding.account).await {
                Ok(Some(owner)) => Some((holding, owner)),
                Ok(None) => {
                    debug!("No owner resolved for token account {}", holding.account);
                    None
                }
                Err(e) => {
                    warn!("Owner resolution failed for {}: {}", holding.account, e);
                    None
                }
            }
        }))
        .await
        .into_iter()
        .flatten()
        .collect();

        if resolved.is_empty() {
            info!("No owners resolved for token {}", token);
            return Ok(None);
        }

        let window_start = Utc::now() - Duration::days(self.settings.window_days);

        let holders = join_all(resolved.into_iter().map(|(holding, owner)| {
            let analyzer = &self.wallets;
            let ledger = &self.ledger;
            async move {
                let (result, assets) = tokio::join!(
                    analyzer.analyze_wallet(&owner, window_start),
                    ledger.wallet_holdings(&owner)
                );
                let result = result.unwrap_or_else(|e| {
                    warn!("Wallet analysis failed for {}: {}", owner, e);
                    WalletResult::default()
                });
                let assets = assets.unwrap_or_else(|e| {
                    debug!("Holdings lookup failed for {}: {}", owner, e);
                    Vec::new()
                });
                HolderStanding {
                    token_account: holding.account,
                    owner,
                    balance: holding.balance,
                    result,
                    assets,
                }
            }
        }))
        .await;

        let traded = holders.iter().filter(|h| h.result.has_trades()).count();
        info!(
            "Scan for token {} finished: {} holders, {} with trades",
            token,
            holders.len(),
            traded
        );

        Ok(Some(CohortScan { holders, supply }))
    }
}
