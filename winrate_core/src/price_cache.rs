use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, warn};

use crate::{PriceSeries, PriceSource};

/// Per-run price memoization, keyed by mint.
///
/// One series is fetched per mint per analysis run; concurrent first
/// requests for the same mint share a single in-flight fetch. The cache is
/// owned by one analysis run and dropped with it.
pub struct PriceCache<P: PriceSource> {
    source: P,
    cells: Mutex<HashMap<String, Arc<OnceCell<Option<PriceSeries>>>>>,
}

impl<P: PriceSource> PriceCache<P> {
    pub fn new(source: P) -> Self {
        Self {
            source,
            cells: Mutex::new(HashMap::new()),
        }
    }

    /// Cached series for a mint, fetching on first access.
    ///
    /// Upstream failures and empty responses are remembered as gaps for the
    /// rest of the run, so a flaky mint is not re-fetched per buy.
    pub async fn series(&self, mint: &str, anchor: DateTime<Utc>) -> Option<PriceSeries> {
        let cell = {
            let mut cells = self.cells.lock().await;
            cells
                .entry(mint.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        cell.get_or_init(|| async {
            match self.source.price_series(mint, anchor).await {
                Ok(Some(series)) if !series.is_empty() => {
                    debug!("Cached {} price points for mint {}", series.points.len(), mint);
                    Some(series)
                }
                Ok(_) => {
                    debug!("No price history for mint {}", mint);
                    None
                }
                Err(e) => {
                    warn!("Price fetch failed for mint {}: {}", mint, e);
                    None
                }
            }
        })
        .await
        .clone()
    }
}
