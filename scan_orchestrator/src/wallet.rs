use chrono::{DateTime, Utc};
use futures::future::join_all;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use winrate_core::{
    LedgerSource, PriceCache, PriceSource, Result, SellBook, TradeMatcher, Transfer, WalletResult,
};

/// Computes one wallet's trade performance over the observation window.
pub struct WalletAnalyzer<L: LedgerSource, P: PriceSource> {
    ledger: Arc<L>,
    prices: Arc<PriceCache<P>>,
}

impl<L: LedgerSource, P: PriceSource> WalletAnalyzer<L, P> {
    pub fn new(ledger: Arc<L>, prices: Arc<PriceCache<P>>) -> Self {
        Self { ledger, prices }
    }

    /// Fetches the wallet's transfer history for `[window_start, now)`,
    /// excluding the current calendar day, and matches trades per mint.
    ///
    /// A wallet with no usable history yields an empty result (zero trades),
    /// which the cohort layer treats as "no data".
    pub async fn analyze_wallet(
        &self,
        wallet: &str,
        window_start: DateTime<Utc>,
    ) -> Result<WalletResult> {
        let transfers = self
            .ledger
            .transfers(wallet, None, Some(window_start), true)
            .await?;
        if transfers.is_empty() {
            debug!("No transfers in window for wallet {}", wallet);
            return Ok(WalletResult::default());
        }

        let buys: Vec<&Transfer> = transfers.iter().filter(|t| t.to_account == wallet).collect();
        let mut sell_book =
            SellBook::from_transfers(transfers.iter().filter(|t| t.from_account == wallet));

        // Warm the cache with one series per mint, keyed fetches issued
        // together. Anchor = earliest buy of the mint in the window.
        let mut anchors: HashMap<&str, DateTime<Utc>> = HashMap::new();
        for buy in &buys {
            anchors
                .entry(buy.mint.as_str())
                .and_modify(|anchor| {
                    if buy.timestamp < *anchor {
                        *anchor = buy.timestamp;
                    }
                })
                .or_insert(buy.timestamp);
        }
        join_all(
            anchors
                .iter()
                .map(|(mint, anchor)| self.prices.series(mint, *anchor)),
        )
        .await;

        let matcher = TradeMatcher::new(&self.prices);
        let trades = matcher.match_trades(buys.into_iter(), &mut sell_book).await;

        let mut result = WalletResult::default();
        for trade in &trades {
            result.total_pnl += trade.realized_pnl;
            result.total_trades += 1;
            if trade.is_win {
                result.total_wins += 1;
            }
            *result
                .previous_coins
                .entry(trade.mint.clone())
                .or_insert(Decimal::ZERO) += trade.realized_pnl;
        }
        result.win_rate = if result.total_trades > 0 {
            Decimal::from(result.total_wins * 100) / Decimal::from(result.total_trades)
        } else {
            Decimal::ZERO
        };

        debug!(
            "Wallet {}: {} trades, {} wins, pnl {}",
            wallet, result.total_trades, result.total_wins, result.total_pnl
        );
        Ok(result)
    }
}
