use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::debug;

use crate::price_cache::PriceCache;
use crate::{PriceSeries, PriceSource, Trade, Transfer};

/// Sell-side working copy for one matching pass.
///
/// Fetched transfers stay untouched; matching decrements these copies
/// instead. The pool for a mint is shared across all buys of that mint,
/// first come first served.
#[derive(Debug, Default)]
pub struct SellBook {
    by_mint: HashMap<String, Vec<OpenSell>>,
}

#[derive(Debug, Clone)]
struct OpenSell {
    timestamp: DateTime<Utc>,
    remaining: Decimal,
}

impl SellBook {
    /// Builds the per-mint sell pools, ordered chronologically so matching
    /// stays FIFO regardless of the order transfers were fetched in.
    pub fn from_transfers<'a>(sells: impl IntoIterator<Item = &'a Transfer>) -> Self {
        let mut by_mint: HashMap<String, Vec<OpenSell>> = HashMap::new();
        for transfer in sells {
            by_mint.entry(transfer.mint.clone()).or_default().push(OpenSell {
                timestamp: transfer.timestamp,
                remaining: transfer.token_amount,
            });
        }
        for pool in by_mint.values_mut() {
            pool.sort_by_key(|sell| sell.timestamp);
        }
        Self { by_mint }
    }

    /// Unconsumed sell quantity left for a mint.
    pub fn remaining_for(&self, mint: &str) -> Decimal {
        self.by_mint
            .get(mint)
            .map(|pool| pool.iter().map(|sell| sell.remaining).sum())
            .unwrap_or(Decimal::ZERO)
    }

    fn pool_mut(&mut self, mint: &str) -> Option<&mut Vec<OpenSell>> {
        self.by_mint.get_mut(mint)
    }
}

/// Matches each buy against later-day sells of the same mint, FIFO, and
/// marks any unmatched remainder against the latest known price.
pub struct TradeMatcher<'a, P: PriceSource> {
    prices: &'a PriceCache<P>,
}

impl<'a, P: PriceSource> TradeMatcher<'a, P> {
    pub fn new(prices: &'a PriceCache<P>) -> Self {
        Self { prices }
    }

    /// Runs the matching pass. Buys whose mint has no price history are
    /// skipped as data gaps and contribute no trades.
    pub async fn match_trades<'t>(
        &self,
        buys: impl IntoIterator<Item = &'t Transfer>,
        sells: &mut SellBook,
    ) -> Vec<Trade> {
        let mut trades = Vec::new();
        for buy in buys {
            let series = match self.prices.series(&buy.mint, buy.timestamp).await {
                Some(series) => series,
                None => {
                    debug!("Price data unavailable for mint {}, skipping buy", buy.mint);
                    continue;
                }
            };
            match_buy(buy, &series, sells, &mut trades);
        }
        trades
    }
}

fn match_buy(buy: &Transfer, series: &PriceSeries, sells: &mut SellBook, out: &mut Vec<Trade>) {
    let Some(price_buy) = series.opening_price() else {
        return;
    };
    let mut remaining = buy.token_amount;
    let buy_day = buy.day();

    if let Some(pool) = sells.pool_mut(&buy.mint) {
        let mut i = 0;
        while i < pool.len() && remaining > Decimal::ZERO {
            let sell_day = pool[i].timestamp.date_naive();
            // Only sells dated on a later calendar day qualify
            if sell_day <= buy_day {
                i += 1;
                continue;
            }
            let Some(price_sell) = series.price_on(sell_day) else {
                // No series point for this sell's day: hard stop for this buy
                break;
            };

            let sell = &mut pool[i];
            let matched = remaining.min(sell.remaining);
            let pnl = matched * (price_sell - price_buy);
            out.push(Trade {
                mint: buy.mint.clone(),
                realized_pnl: pnl,
                is_win: pnl > Decimal::ZERO,
                closed: true,
            });

            remaining -= matched;
            sell.remaining -= matched;
            if sell.remaining.is_zero() {
                pool.remove(i);
            } else {
                i += 1;
            }
        }
    }

    if remaining > Decimal::ZERO {
        if let Some(latest) = series.latest_price() {
            let pnl = remaining * (latest - price_buy);
            out.push(Trade {
                mint: buy.mint.clone(),
                realized_pnl: pnl,
                is_win: pnl > Decimal::ZERO,
                closed: false,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AnalysisError, PricePoint, Result};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::collections::HashMap;
    use std::str::FromStr;

    struct StaticPrices {
        series: HashMap<String, PriceSeries>,
        fail: bool,
    }

    impl StaticPrices {
        fn new() -> Self {
            Self { series: HashMap::new(), fail: false }
        }

        fn with_series(mut self, mint: &str, prices: &[(u32, &str)]) -> Self {
            let points = prices
                .iter()
                .map(|(d, p)| PricePoint { date: day(*d), price: dec(p) })
                .collect();
            self.series.insert(mint.to_string(), PriceSeries::new(points));
            self
        }
    }

    #[async_trait]
    impl PriceSource for StaticPrices {
        async fn price_series(
            &self,
            mint: &str,
            _anchor: DateTime<Utc>,
        ) -> Result<Option<PriceSeries>> {
            if self.fail {
                return Err(AnalysisError::Price("upstream down".to_string()));
            }
            Ok(self.series.get(mint).cloned())
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn ts(d: u32, hour: u32) -> DateTime<Utc> {
        day(d).and_hms_opt(hour, 0, 0).unwrap().and_utc()
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn transfer(mint: &str, timestamp: DateTime<Utc>, amount: &str) -> Transfer {
        Transfer {
            mint: mint.to_string(),
            timestamp,
            token_amount: dec(amount),
            from_account: "seller".to_string(),
            to_account: "buyer".to_string(),
        }
    }

    async fn run(
        prices: StaticPrices,
        buys: &[Transfer],
        sells: &[Transfer],
    ) -> (Vec<Trade>, SellBook) {
        let cache = PriceCache::new(prices);
        let matcher = TradeMatcher::new(&cache);
        let mut book = SellBook::from_transfers(sells.iter());
        let trades = matcher.match_trades(buys.iter(), &mut book).await;
        (trades, book)
    }

    #[tokio::test]
    async fn full_close_next_day_is_one_winning_trade() {
        let prices = StaticPrices::new().with_series("mint-a", &[(1, "1.0"), (2, "1.5")]);
        let buys = [transfer("mint-a", ts(1, 9), "100")];
        let sells = [transfer("mint-a", ts(2, 9), "100")];

        let (trades, book) = run(prices, &buys, &sells).await;

        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].realized_pnl, dec("50"));
        assert!(trades[0].is_win);
        assert!(trades[0].closed);
        assert_eq!(book.remaining_for("mint-a"), Decimal::ZERO);
    }

    #[tokio::test]
    async fn open_position_is_marked_at_latest_price() {
        let prices = StaticPrices::new().with_series("mint-a", &[(1, "1.0"), (3, "1.2")]);
        let buys = [transfer("mint-a", ts(1, 9), "100")];

        let (trades, _) = run(prices, &buys, &[]).await;

        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].realized_pnl, dec("20"));
        assert!(trades[0].is_win);
        assert!(!trades[0].closed);
    }

    #[tokio::test]
    async fn partial_fills_leave_sell_remainder() {
        let prices =
            StaticPrices::new().with_series("mint-a", &[(1, "1.0"), (2, "0.8"), (3, "1.3")]);
        let buys = [transfer("mint-a", ts(1, 9), "100")];
        let sells = [
            transfer("mint-a", ts(2, 9), "60"),
            transfer("mint-a", ts(3, 9), "60"),
        ];

        let (trades, book) = run(prices, &buys, &sells).await;

        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].realized_pnl, dec("-12"));
        assert!(!trades[0].is_win);
        assert_eq!(trades[1].realized_pnl, dec("12"));
        assert!(trades[1].is_win);
        // 20 of the second sell stays available for another buy
        assert_eq!(book.remaining_for("mint-a"), dec("20"));
    }

    #[tokio::test]
    async fn same_day_sell_does_not_qualify() {
        let prices = StaticPrices::new().with_series("mint-a", &[(1, "1.0"), (2, "2.0")]);
        let buys = [transfer("mint-a", ts(1, 9), "100")];
        let sells = [
            transfer("mint-a", ts(1, 15), "100"),
            transfer("mint-a", ts(1, 3), "50"),
        ];

        let (trades, book) = run(prices, &buys, &sells).await;

        // Nothing closed; the whole buy stays open
        assert_eq!(trades.len(), 1);
        assert!(!trades[0].closed);
        assert_eq!(trades[0].realized_pnl, dec("100"));
        assert_eq!(book.remaining_for("mint-a"), dec("150"));
    }

    #[tokio::test]
    async fn unpriced_sell_day_stops_matching_for_the_buy() {
        let prices = StaticPrices::new().with_series("mint-a", &[(1, "1.0"), (2, "1.1"), (4, "2.0")]);
        let buys = [transfer("mint-a", ts(1, 9), "100")];
        let sells = [
            transfer("mint-a", ts(2, 9), "40"),
            transfer("mint-a", ts(3, 9), "40"), // day 3 has no price point
            transfer("mint-a", ts(4, 9), "40"), // priced, but behind the stop
        ];

        let (trades, book) = run(prices, &buys, &sells).await;

        assert_eq!(trades.len(), 2);
        assert!(trades[0].closed);
        assert_eq!(trades[0].realized_pnl, dec("4.0"));
        assert!(!trades[1].closed);
        assert_eq!(trades[1].realized_pnl, dec("60.0"));
        assert_eq!(book.remaining_for("mint-a"), dec("80"));
    }

    #[tokio::test]
    async fn sells_are_shared_across_buys_in_order() {
        let prices = StaticPrices::new().with_series("mint-a", &[(1, "1.0"), (2, "2.0")]);
        let buys = [
            transfer("mint-a", ts(1, 9), "50"),
            transfer("mint-a", ts(1, 10), "100"),
        ];
        let sells = [transfer("mint-a", ts(2, 9), "120")];

        let (trades, book) = run(prices, &buys, &sells).await;

        assert_eq!(trades.len(), 3);
        // First buy fully closed against the shared sell
        assert_eq!(trades[0].realized_pnl, dec("50"));
        assert!(trades[0].closed);
        // Second buy takes the 70 left on the sell, 30 stays open
        assert_eq!(trades[1].realized_pnl, dec("70"));
        assert!(trades[1].closed);
        assert_eq!(trades[2].realized_pnl, dec("30"));
        assert!(!trades[2].closed);
        assert_eq!(book.remaining_for("mint-a"), Decimal::ZERO);
    }

    #[tokio::test]
    async fn unpriced_mint_contributes_nothing() {
        let prices = StaticPrices::new().with_series("mint-b", &[(1, "1.0"), (2, "3.0")]);
        let buys = [
            transfer("mint-a", ts(1, 9), "100"),
            transfer("mint-b", ts(1, 9), "10"),
        ];
        let sells = [transfer("mint-a", ts(2, 9), "100")];

        let (trades, book) = run(prices, &buys, &sells).await;

        // mint-a has no prices and is skipped; mint-b still resolves
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].mint, "mint-b");
        assert_eq!(book.remaining_for("mint-a"), dec("100"));
    }

    #[tokio::test]
    async fn price_fetch_failure_degrades_to_no_trades() {
        let mut prices = StaticPrices::new().with_series("mint-a", &[(1, "1.0")]);
        prices.fail = true;
        let buys = [transfer("mint-a", ts(1, 9), "100")];

        let (trades, _) = run(prices, &buys, &[]).await;

        assert!(trades.is_empty());
    }

    #[tokio::test]
    async fn losing_and_flat_trades_are_not_wins() {
        let prices = StaticPrices::new().with_series("mint-a", &[(1, "1.0"), (2, "1.0")]);
        let buys = [transfer("mint-a", ts(1, 9), "100")];
        let sells = [transfer("mint-a", ts(2, 9), "100")];

        let (trades, _) = run(prices, &buys, &sells).await;

        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].realized_pnl, Decimal::ZERO);
        assert!(!trades[0].is_win);
    }
}
