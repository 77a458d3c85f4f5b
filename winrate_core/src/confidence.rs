use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Per-wallet triple feeding the cohort confidence classification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WalletStanding {
    pub win_rate: Decimal,
    pub total_pnl: Decimal,
    pub total_trades: u32,
}

/// How trustworthy the cohort's aggregate win rate is, based on sample size
/// and magnitude thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::High => "High",
            Confidence::Medium => "Medium",
            Confidence::Low => "Low",
        }
    }
}

/// Cohort aggregate over the wallets that actually traded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CohortResult {
    pub average_win_rate: Decimal,
    pub average_pnl: Decimal,
    pub average_trades: Decimal,
    pub confidence: Confidence,
}

/// Averages the standings and assigns a confidence tier.
///
/// An empty pack classifies as Low with zero averages; callers that want a
/// "no data" outcome instead should check for emptiness first.
pub fn classify_confidence(pack: &[WalletStanding]) -> CohortResult {
    let (average_win_rate, average_pnl, average_trades) = if pack.is_empty() {
        (Decimal::ZERO, Decimal::ZERO, Decimal::ZERO)
    } else {
        let count = Decimal::from(pack.len() as u64);
        let win_rate_sum: Decimal = pack.iter().map(|w| w.win_rate).sum();
        let pnl_sum: Decimal = pack.iter().map(|w| w.total_pnl).sum();
        let trades_sum: Decimal = pack.iter().map(|w| Decimal::from(w.total_trades)).sum();
        (win_rate_sum / count, pnl_sum / count, trades_sum / count)
    };

    let confidence = if average_win_rate >= Decimal::from(70)
        && average_pnl >= Decimal::from(1000)
        && average_trades >= Decimal::from(15)
    {
        Confidence::High
    } else if average_win_rate >= Decimal::from(50)
        && average_pnl >= Decimal::from(500)
        && average_trades >= Decimal::from(10)
    {
        Confidence::Medium
    } else {
        Confidence::Low
    };

    CohortResult {
        average_win_rate,
        average_pnl,
        average_trades,
        confidence,
    }
}
