//! Plain-text rendering of scan results.

use rust_decimal::Decimal;
use std::collections::HashSet;

use winrate_core::LedgerSource;

use crate::cohort::{CohortScan, HolderStanding};
use crate::symbols::SymbolCache;

const DIVIDER: &str = "━━━━━━━━━━━━━━━━━━━━━━";
const NO_DATA_MESSAGE: &str = "No trading data available for analysis.";

/// Cohort confidence view: overall win rate plus each trading wallet.
pub async fn render_cohort_report<L: LedgerSource>(
    scan: &CohortScan,
    symbols: &SymbolCache<L>,
) -> String {
    let Some(cohort) = scan.confidence() else {
        return NO_DATA_MESSAGE.to_string();
    };

    let mut out = String::new();
    out.push_str("🤖 Trader Cohort Analysis\n");
    out.push_str(&format!("🎯 Overall Win Rate: 🌟 {:.2}%\n", cohort.average_win_rate));
    out.push_str(&format!("🔍 Confidence Level: {}\n\n", cohort.confidence.as_str()));

    let mut index = 1;
    for holder in scan.holders.iter().filter(|h| h.result.has_trades()) {
        out.push_str(&format!("Wallet #{} ({})\n", index, shorten(&holder.owner)));
        out.push_str("💼 Previous Coins:\n");
        for (mint, pnl) in holder.result.top_coins(3) {
            let symbol = symbols.symbol(&mint).await;
            let verdict = if pnl > Decimal::ZERO { "✅ Profit" } else { "❌ Loss" };
            out.push_str(&format!("{}: {} (${:.2})\n", symbol, verdict, pnl));
        }
        out.push_str(&format!("📈 Win Rate: {:.2}%\n", holder.result.win_rate));
        out.push_str(&format!("Total PnL: {:.2}\n\n", holder.result.total_pnl));
        index += 1;
    }
    out
}

/// Holder view: every resolved top holder with its share of supply and, for
/// wallets that traded, performance and still-held winners.
pub async fn render_holder_report<L: LedgerSource>(
    scan: &CohortScan,
    symbols: &SymbolCache<L>,
) -> String {
    let mut out = String::new();
    out.push_str("🏆 Top Wallet Holders & Trade Performance:\n");
    out.push_str(DIVIDER);
    out.push_str("\n\n");

    for (idx, holder) in scan.holders.iter().enumerate() {
        let pct = percentage_of_supply(holder.balance, scan.supply);
        out.push_str(&format!(
            "#{} {} | ({:.2}%) {}\n",
            idx + 1,
            shorten(&holder.owner),
            pct,
            size_icon(pct)
        ));

        if holder.result.has_trades() {
            out.push_str(&format!("├ PNL: {:.2}\n", holder.result.total_pnl));
            out.push_str(&format!("├ Winrate: {:.2}%\n", holder.result.win_rate));
            out.push_str(&render_assets_line(holder, symbols).await);
        } else {
            out.push_str("└ No trading activity in window.\n");
        }
        out.push_str(DIVIDER);
        out.push_str("\n\n");
    }
    out
}

/// Top previous coins the wallet still holds, best PnL first.
async fn render_assets_line<L: LedgerSource>(
    holder: &HolderStanding,
    symbols: &SymbolCache<L>,
) -> String {
    let held: HashSet<&str> = holder.assets.iter().map(|asset| asset.mint.as_str()).collect();
    let relevant: Vec<(String, Decimal)> = holder
        .result
        .top_coins(3)
        .into_iter()
        .filter(|(mint, _)| held.contains(mint.as_str()))
        .collect();

    if relevant.is_empty() {
        return "└ No matching assets found.\n".to_string();
    }

    let mut parts = Vec::new();
    for (mint, pnl) in relevant {
        parts.push(format!("{} ({})", symbols.symbol(&mint).await, format_number(pnl)));
    }
    format!("├ Assets: {}\n", parts.join(", "))
}

pub fn percentage_of_supply(balance: Decimal, supply: Decimal) -> Decimal {
    if supply.is_zero() {
        Decimal::ZERO
    } else {
        balance / supply * Decimal::from(100)
    }
}

fn size_icon(percentage: Decimal) -> &'static str {
    if percentage > Decimal::from(5) {
        "🐋"
    } else if percentage > Decimal::from(3) {
        "🐬"
    } else {
        "🐟"
    }
}

pub fn shorten(address: &str) -> String {
    if address.len() <= 6 {
        return address.to_string();
    }
    format!("{}...{}", &address[..3], &address[address.len() - 3..])
}

/// Integer K/M/B/T suffix formatting for the assets line.
pub fn format_number(value: Decimal) -> String {
    let thousand = Decimal::from(1_000);
    let million = Decimal::from(1_000_000);
    let billion = Decimal::from(1_000_000_000);
    let trillion = Decimal::from(1_000_000_000_000i64);

    if value >= trillion {
        format!("{}T", (value / trillion).trunc())
    } else if value >= billion {
        format!("{}B", (value / billion).trunc())
    } else if value >= million {
        format!("{}M", (value / million).trunc())
    } else if value >= thousand {
        format!("{}K", (value / thousand).trunc())
    } else {
        format!("{}", value.trunc())
    }
}
