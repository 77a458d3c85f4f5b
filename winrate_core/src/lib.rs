pub mod confidence;
pub mod matcher;
pub mod price_cache;

// Re-export the matching and aggregation surface
pub use confidence::{classify_confidence, CohortResult, Confidence, WalletStanding};
pub use matcher::{SellBook, TradeMatcher};
pub use price_cache::PriceCache;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Ledger fetch error: {0}")]
    Ledger(String),
    #[error("Price fetch error: {0}")]
    Price(String),
}

pub type Result<T> = std::result::Result<T, AnalysisError>;

/// One on-chain token movement touching a wallet.
///
/// Records are immutable once fetched; the matcher copies sell-side amounts
/// into a [`SellBook`] before consuming them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transfer {
    /// Token mint that moved
    pub mint: String,

    /// Block time of the containing transaction
    pub timestamp: DateTime<Utc>,

    /// Quantity moved, in UI units
    pub token_amount: Decimal,

    /// Sending user account
    pub from_account: String,

    /// Receiving user account
    pub to_account: String,
}

impl Transfer {
    /// UTC calendar day the transfer landed on.
    pub fn day(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }
}

/// Price of one token on one UTC calendar day.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub price: Decimal,
}

/// Daily price history for one mint, ascending by date.
///
/// The first point is the price at or near the anchor (purchase) date, the
/// last point the most recent price the upstream had available.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PriceSeries {
    pub points: Vec<PricePoint>,
}

impl PriceSeries {
    pub fn new(mut points: Vec<PricePoint>) -> Self {
        points.sort_by_key(|p| p.date);
        Self { points }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Price at the anchor date.
    pub fn opening_price(&self) -> Option<Decimal> {
        self.points.first().map(|p| p.price)
    }

    /// Most recent price known, used to mark open positions.
    pub fn latest_price(&self) -> Option<Decimal> {
        self.points.last().map(|p| p.price)
    }

    pub fn price_on(&self, date: NaiveDate) -> Option<Decimal> {
        self.points.iter().find(|p| p.date == date).map(|p| p.price)
    }
}

/// Outcome of matching one buy against part of the sell pool, or of marking
/// an open remainder at the latest known price.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Trade {
    pub mint: String,

    pub realized_pnl: Decimal,

    pub is_win: bool,

    /// False when part of the buy stayed open and was marked at the latest price
    pub closed: bool,
}

/// Aggregated trade performance for one wallet over the observation window.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WalletResult {
    /// Percentage of trades that were wins, 0 when there are no trades
    pub win_rate: Decimal,

    pub total_pnl: Decimal,

    pub total_trades: u32,

    pub total_wins: u32,

    /// Net PnL contributed per mint, for the top-holdings report
    pub previous_coins: HashMap<String, Decimal>,
}

impl WalletResult {
    pub fn has_trades(&self) -> bool {
        self.total_trades > 0
    }

    /// Mints ranked by contributed PnL, best first.
    pub fn top_coins(&self, limit: usize) -> Vec<(String, Decimal)> {
        let mut coins: Vec<(String, Decimal)> = self
            .previous_coins
            .iter()
            .map(|(mint, pnl)| (mint.clone(), *pnl))
            .collect();
        coins.sort_by(|a, b| b.1.cmp(&a.1));
        coins.truncate(limit);
        coins
    }
}

/// A top-holder token account and its balance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenHolding {
    pub account: String,
    pub balance: Decimal,
}

/// A token position currently held by a wallet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WalletAsset {
    pub mint: String,
    pub balance: Decimal,
}

/// Historical price lookup the analysis consumes.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Daily price series for a mint, anchored at the given purchase time.
    ///
    /// `Ok(None)` means the upstream has no data for this mint: a data gap,
    /// not an error.
    async fn price_series(
        &self,
        mint: &str,
        anchor: DateTime<Utc>,
    ) -> Result<Option<PriceSeries>>;
}

/// On-chain history access the analysis consumes.
#[async_trait]
pub trait LedgerSource: Send + Sync {
    /// Largest holder token accounts for a token, escrow accounts excluded.
    async fn top_holders(&self, token: &str) -> Result<Vec<TokenHolding>>;

    /// Wallet behind a token account, from its recent transaction history.
    async fn resolve_owner(&self, token_account: &str) -> Result<Option<String>>;

    /// Token transfers touching a wallet, newest signatures first upstream.
    async fn transfers(
        &self,
        wallet: &str,
        mint_filter: Option<&str>,
        since: Option<DateTime<Utc>>,
        exclude_today: bool,
    ) -> Result<Vec<Transfer>>;

    /// Token accounts currently held by a wallet, largest balance first.
    async fn wallet_holdings(&self, owner: &str) -> Result<Vec<WalletAsset>>;

    /// Display symbol for a mint.
    async fn token_symbol(&self, mint: &str) -> Result<Option<String>>;

    /// Circulating supply of a token, when the upstream reports one.
    async fn token_supply(&self, token: &str) -> Result<Option<Decimal>>;
}
