use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;

use winrate_core::LedgerSource;

/// Per-run memoized symbol lookup for report rendering.
///
/// Failed lookups resolve to "Unknown" and are cached so the miss is not
/// retried within the run.
pub struct SymbolCache<L: LedgerSource> {
    ledger: Arc<L>,
    cache: Mutex<HashMap<String, String>>,
}

impl<L: LedgerSource> SymbolCache<L> {
    pub fn new(ledger: Arc<L>) -> Self {
        Self {
            ledger,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub async fn symbol(&self, mint: &str) -> String {
        let mut cache = self.cache.lock().await;
        if let Some(symbol) = cache.get(mint) {
            return symbol.clone();
        }

        let symbol = match self.ledger.token_symbol(mint).await {
            Ok(Some(symbol)) => symbol,
            Ok(None) => "Unknown".to_string(),
            Err(e) => {
                warn!("Symbol lookup failed for mint {}: {}", mint, e);
                "Unknown".to_string()
            }
        };
        cache.insert(mint.to_string(), symbol.clone());
        symbol
    }
}
