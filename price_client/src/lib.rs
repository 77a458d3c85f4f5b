use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use config_manager::SolscanConfig;
use reqwest::header::HeaderMap;
use reqwest::Client;
use retry_utils::{retry_with_policy, RetryAdvice, RetryPolicy};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use winrate_core::{AnalysisError, PricePoint, PriceSeries, PriceSource};

#[derive(Error, Debug)]
pub enum PriceClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
    #[error("Rate limited, retry after {retry_after_ms:?}ms")]
    Throttled { retry_after_ms: Option<u64> },
    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, PriceClientError>;

/// Solscan-backed historical price lookup: one daily series per mint,
/// anchored at the purchase date.
#[derive(Debug, Clone)]
pub struct SolscanClient {
    config: SolscanConfig,
    http_client: Client,
    retry: RetryPolicy,
}

impl SolscanClient {
    pub fn new(config: SolscanConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(PriceClientError::Config(
                "Solscan API key is required".to_string(),
            ));
        }

        let mut headers = HeaderMap::new();
        let key = config
            .api_key
            .parse()
            .map_err(|_| PriceClientError::Config("Invalid Solscan API key".to_string()))?;
        headers.insert("token", key);

        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            config,
            http_client,
            retry: RetryPolicy::default(),
        })
    }

    /// Daily price history for a mint. `Ok(None)` when the upstream has no
    /// data for this mint, which the analysis treats as a gap.
    pub async fn daily_price_series(
        &self,
        mint: &str,
        anchor: DateTime<Utc>,
    ) -> Result<Option<PriceSeries>> {
        let anchor_day = format_price_day(anchor.date_naive());
        let url = format!("{}/token/price", self.config.api_base_url);
        debug!("Fetching price series for mint {} anchored at {}", mint, anchor_day);

        let body: Value = retry_with_policy(
            &self.retry,
            || async {
                let response = self
                    .http_client
                    .get(&url)
                    .query(&[("address", mint), ("time[]", anchor_day.as_str())])
                    .send()
                    .await?;
                let status = response.status();

                if status.as_u16() == 429 || status.as_u16() == 503 {
                    let retry_after_ms = response
                        .headers()
                        .get("retry-after")
                        .and_then(|value| value.to_str().ok())
                        .and_then(|value| value.parse::<u64>().ok())
                        .map(|seconds| seconds * 1000);
                    return Err(PriceClientError::Throttled { retry_after_ms });
                }
                if !status.is_success() {
                    let message = response.text().await.unwrap_or_default();
                    return Err(PriceClientError::Api {
                        status: status.as_u16(),
                        message,
                    });
                }

                Ok(response.json::<Value>().await?)
            },
            retry_advice,
        )
        .await?;

        if let Some(error) = body.get("error") {
            warn!("Price lookup error for mint {}: {}", mint, error);
            return Ok(None);
        }
        let Some(data) = body.get("data") else {
            return Ok(None);
        };

        let entries: Vec<PriceEntry> = serde_json::from_value(data.clone())?;
        Ok(build_series(entries, mint))
    }
}

fn retry_advice(err: &PriceClientError) -> RetryAdvice {
    match err {
        PriceClientError::Throttled { retry_after_ms } => retry_after_ms
            .map(|ms| RetryAdvice::After(Duration::from_millis(ms)))
            .unwrap_or(RetryAdvice::Backoff),
        PriceClientError::Http(e) if e.is_timeout() || e.is_connect() => RetryAdvice::Backoff,
        PriceClientError::Api { status, .. } if *status >= 500 => RetryAdvice::Backoff,
        _ => RetryAdvice::GiveUp,
    }
}

fn build_series(entries: Vec<PriceEntry>, mint: &str) -> Option<PriceSeries> {
    let points: Vec<PricePoint> = entries
        .into_iter()
        .filter_map(|entry| {
            let date = parse_price_day(entry.date)?;
            let price = Decimal::from_f64_retain(entry.price)?;
            Some(PricePoint { date, price })
        })
        .collect();

    if points.is_empty() {
        debug!("Empty price series for mint {}", mint);
        return None;
    }
    Some(PriceSeries::new(points))
}

fn format_price_day(day: NaiveDate) -> String {
    day.format("%Y%m%d").to_string()
}

fn parse_price_day(raw: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt((raw / 10_000) as i32, raw / 100 % 100, raw % 100)
}

#[async_trait]
impl PriceSource for SolscanClient {
    async fn price_series(
        &self,
        mint: &str,
        anchor: DateTime<Utc>,
    ) -> winrate_core::Result<Option<PriceSeries>> {
        self.daily_price_series(mint, anchor)
            .await
            .map_err(|e| AnalysisError::Price(e.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct PriceEntry {
    date: u32,
    price: f64,
}
