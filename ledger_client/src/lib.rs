use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use config_manager::HeliusConfig;
use reqwest::Client;
use retry_utils::{retry_with_policy, RetryAdvice, RetryPolicy};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};
use winrate_core::{AnalysisError, LedgerSource, TokenHolding, Transfer, WalletAsset};

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("RPC error: {0}")]
    Rpc(String),
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
    #[error("Rate limited, retry after {retry_after_ms:?}ms")]
    Throttled { retry_after_ms: Option<u64> },
    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, LedgerError>;

const TOKEN_PROGRAM_ID: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";

/// The enhanced-transaction API accepts at most this many signatures per call
const PARSE_CHUNK_SIZE: usize = 100;

/// Helius-backed ledger access: holder discovery, owner resolution and
/// transfer history for an analysis run.
#[derive(Debug, Clone)]
pub struct LedgerClient {
    config: HeliusConfig,
    http_client: Client,
    retry: RetryPolicy,
}

impl LedgerClient {
    pub fn new(config: HeliusConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(LedgerError::Config("Helius API key is required".to_string()));
        }

        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;

        Ok(Self {
            config,
            http_client,
            retry: RetryPolicy::default(),
        })
    }

    fn rpc_url(&self) -> String {
        format!("{}/?api-key={}", self.config.rpc_url, self.config.api_key)
    }

    fn parse_url(&self) -> String {
        format!("{}?api-key={}", self.config.parse_url, self.config.api_key)
    }

    async fn post_json(&self, url: &str, payload: &Value) -> Result<Value> {
        retry_with_policy(
            &self.retry,
            || async {
                let response = self.http_client.post(url).json(payload).send().await?;
                let status = response.status();

                if status.as_u16() == 429 || status.as_u16() == 503 {
                    let retry_after_ms = response
                        .headers()
                        .get("retry-after")
                        .and_then(|value| value.to_str().ok())
                        .and_then(|value| value.parse::<u64>().ok())
                        .map(|seconds| seconds * 1000);
                    return Err(LedgerError::Throttled { retry_after_ms });
                }
                if !status.is_success() {
                    let message = response.text().await.unwrap_or_default();
                    return Err(LedgerError::Api {
                        status: status.as_u16(),
                        message,
                    });
                }

                Ok(response.json::<Value>().await?)
            },
            retry_advice,
        )
        .await
    }

    async fn rpc_request(&self, method: &str, params: Value) -> Result<Value> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": "1",
            "method": method,
            "params": params
        });
        debug!("RPC request: {}", method);

        let body: RpcResponse = serde_json::from_value(self.post_json(&self.rpc_url(), &payload).await?)?;
        if let Some(error) = body.error {
            return Err(LedgerError::Rpc(error.message));
        }
        body.result
            .ok_or_else(|| LedgerError::Rpc(format!("{} returned no result", method)))
    }

    /// Largest holder token accounts for a token, excluding configured
    /// bonding-curve / escrow accounts, truncated to the configured limit.
    pub async fn top_holders(&self, token: &str) -> Result<Vec<TokenHolding>> {
        info!("Fetching top holders for token: {}", token);

        let result = self.rpc_request("getTokenLargestAccounts", json!([token])).await?;
        let accounts: LargestAccounts = serde_json::from_value(result)?;

        let holders = filter_holders(
            accounts.value,
            &self.config.exclude_accounts,
            self.config.top_holder_limit,
        );
        info!("Retrieved {} holder accounts for token: {}", holders.len(), token);
        Ok(holders)
    }

    /// Circulating supply of the token, in UI units.
    pub async fn token_supply(&self, token: &str) -> Result<Option<Decimal>> {
        let result = self.rpc_request("getTokenSupply", json!([token])).await?;
        let supply: TokenAmountResult = serde_json::from_value(result)?;
        Ok(supply
            .value
            .ui_amount_string
            .as_deref()
            .and_then(|amount| Decimal::from_str(amount).ok()))
    }

    /// Wallet behind a token account: the user-account side of the first
    /// parsed transfer whose token account matches.
    pub async fn resolve_owner(&self, token_account: &str) -> Result<Option<String>> {
        let signatures = self
            .signatures_for_address(token_account, self.config.owner_signature_limit)
            .await?;
        if signatures.is_empty() {
            debug!("No signatures found for token account {}", token_account);
            return Ok(None);
        }

        let parsed = self.parse_transactions(&signatures).await?;
        Ok(find_owner(&parsed, token_account))
    }

    /// Token transfers touching a wallet within the observation window.
    pub async fn transfers(
        &self,
        wallet: &str,
        mint_filter: Option<&str>,
        since: Option<DateTime<Utc>>,
        exclude_today: bool,
    ) -> Result<Vec<Transfer>> {
        let signatures = self
            .signatures_for_address(wallet, self.config.history_signature_limit)
            .await?;
        if signatures.is_empty() {
            debug!("No signatures found for wallet {}", wallet);
            return Ok(Vec::new());
        }

        let parsed = self.parse_transactions(&signatures).await?;
        let transfers = collect_wallet_transfers(
            parsed,
            wallet,
            mint_filter,
            since,
            exclude_today,
            Utc::now().date_naive(),
        );
        info!("Extracted {} transfers for wallet {}", transfers.len(), wallet);
        Ok(transfers)
    }

    /// Token accounts currently held by a wallet, largest balance first.
    pub async fn wallet_holdings(&self, owner: &str) -> Result<Vec<WalletAsset>> {
        let params = json!([
            owner,
            { "programId": TOKEN_PROGRAM_ID },
            { "encoding": "jsonParsed" }
        ]);
        let result = self.rpc_request("getTokenAccountsByOwner", params).await?;

        let mut assets = Vec::new();
        if let Some(accounts) = result.get("value").and_then(Value::as_array) {
            for account in accounts {
                let info = account.pointer("/account/data/parsed/info");
                let Some(mint) = info.and_then(|i| i.get("mint")).and_then(Value::as_str) else {
                    continue;
                };
                let balance = info
                    .and_then(|i| i.pointer("/tokenAmount/uiAmountString"))
                    .and_then(Value::as_str)
                    .and_then(|amount| Decimal::from_str(amount).ok())
                    .unwrap_or(Decimal::ZERO);
                assets.push(WalletAsset {
                    mint: mint.to_string(),
                    balance,
                });
            }
        }
        assets.sort_by(|a, b| b.balance.cmp(&a.balance));

        debug!("Fetched {} token accounts for wallet {}", assets.len(), owner);
        Ok(assets)
    }

    /// Display symbol for a mint, from its on-chain asset metadata.
    pub async fn token_symbol(&self, mint: &str) -> Result<Option<String>> {
        let result = self.rpc_request("getAsset", json!({ "id": mint })).await?;
        let asset: AssetResponse = serde_json::from_value(result)?;
        Ok(asset
            .content
            .and_then(|content| content.metadata)
            .and_then(|metadata| metadata.symbol))
    }

    async fn signatures_for_address(&self, address: &str, limit: u32) -> Result<Vec<String>> {
        debug!("Fetching signatures for address: {}", address);
        let result = self
            .rpc_request("getSignaturesForAddress", json!([address, { "limit": limit }]))
            .await?;
        let entries: Vec<SignatureEntry> = serde_json::from_value(result)?;
        Ok(entries.into_iter().map(|entry| entry.signature).collect())
    }

    async fn parse_transactions(&self, signatures: &[String]) -> Result<Vec<EnhancedTransaction>> {
        let mut transactions = Vec::new();
        for chunk in signatures.chunks(PARSE_CHUNK_SIZE) {
            let payload = json!({ "transactions": chunk });
            let body = self.post_json(&self.parse_url(), &payload).await?;
            let mut parsed: Vec<EnhancedTransaction> = serde_json::from_value(body)?;
            transactions.append(&mut parsed);
        }
        Ok(transactions)
    }
}

fn retry_advice(err: &LedgerError) -> RetryAdvice {
    match err {
        LedgerError::Throttled { retry_after_ms } => retry_after_ms
            .map(|ms| RetryAdvice::After(Duration::from_millis(ms)))
            .unwrap_or(RetryAdvice::Backoff),
        LedgerError::Http(e) if e.is_timeout() || e.is_connect() => RetryAdvice::Backoff,
        LedgerError::Api { status, .. } if *status >= 500 => RetryAdvice::Backoff,
        _ => RetryAdvice::GiveUp,
    }
}

fn filter_holders(
    entries: Vec<LargestAccountEntry>,
    exclude_accounts: &[String],
    limit: usize,
) -> Vec<TokenHolding> {
    entries
        .into_iter()
        .filter(|entry| !exclude_accounts.contains(&entry.address))
        .filter_map(|entry| {
            let balance = entry
                .ui_amount_string
                .as_deref()
                .and_then(|amount| Decimal::from_str(amount).ok())?;
            Some(TokenHolding {
                account: entry.address,
                balance,
            })
        })
        .take(limit)
        .collect()
}

fn find_owner(parsed: &[EnhancedTransaction], token_account: &str) -> Option<String> {
    for tx in parsed {
        for record in &tx.token_transfers {
            if record.from_token_account.as_deref() == Some(token_account) {
                if let Some(owner) = &record.from_user_account {
                    return Some(owner.clone());
                }
            }
            if record.to_token_account.as_deref() == Some(token_account) {
                if let Some(owner) = &record.to_user_account {
                    return Some(owner.clone());
                }
            }
        }
    }
    None
}

/// One swap emits several transfer legs in the enhanced feed; at most one
/// qualifying transfer is taken per transaction.
fn collect_wallet_transfers(
    parsed: Vec<EnhancedTransaction>,
    wallet: &str,
    mint_filter: Option<&str>,
    since: Option<DateTime<Utc>>,
    exclude_today: bool,
    today: NaiveDate,
) -> Vec<Transfer> {
    let mut transfers = Vec::new();
    for tx in parsed {
        let Some(timestamp) = tx.timestamp.and_then(|ts| DateTime::from_timestamp(ts, 0)) else {
            continue;
        };
        if let Some(since) = since {
            if timestamp < since {
                continue;
            }
        }
        if exclude_today && timestamp.date_naive() == today {
            continue;
        }

        for record in tx.token_transfers {
            let (Some(mint), Some(from), Some(to), Some(amount)) = (
                record.mint,
                record.from_user_account,
                record.to_user_account,
                record.token_amount,
            ) else {
                continue;
            };
            if from != wallet && to != wallet {
                continue;
            }
            if let Some(filter) = mint_filter {
                if mint != filter {
                    continue;
                }
            }
            let Some(token_amount) = Decimal::from_f64_retain(amount) else {
                continue;
            };

            transfers.push(Transfer {
                mint,
                timestamp,
                token_amount,
                from_account: from,
                to_account: to,
            });
            break;
        }
    }
    transfers
}

#[async_trait]
impl LedgerSource for LedgerClient {
    async fn top_holders(&self, token: &str) -> winrate_core::Result<Vec<TokenHolding>> {
        LedgerClient::top_holders(self, token).await.map_err(into_analysis_error)
    }

    async fn resolve_owner(&self, token_account: &str) -> winrate_core::Result<Option<String>> {
        LedgerClient::resolve_owner(self, token_account)
            .await
            .map_err(into_analysis_error)
    }

    async fn transfers(
        &self,
        wallet: &str,
        mint_filter: Option<&str>,
        since: Option<DateTime<Utc>>,
        exclude_today: bool,
    ) -> winrate_core::Result<Vec<Transfer>> {
        LedgerClient::transfers(self, wallet, mint_filter, since, exclude_today)
            .await
            .map_err(into_analysis_error)
    }

    async fn wallet_holdings(&self, owner: &str) -> winrate_core::Result<Vec<WalletAsset>> {
        LedgerClient::wallet_holdings(self, owner)
            .await
            .map_err(into_analysis_error)
    }

    async fn token_symbol(&self, mint: &str) -> winrate_core::Result<Option<String>> {
        LedgerClient::token_symbol(self, mint)
            .await
            .map_err(into_analysis_error)
    }

    async fn token_supply(&self, token: &str) -> winrate_core::Result<Option<Decimal>> {
        LedgerClient::token_supply(self, token)
            .await
            .map_err(into_analysis_error)
    }
}

fn into_analysis_error(err: LedgerError) -> AnalysisError {
    AnalysisError::Ledger(err.to_string())
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    message: String,
}

#[derive(Debug, Deserialize)]
struct SignatureEntry {
    signature: String,
}

#[derive(Debug, Deserialize)]
struct LargestAccounts {
    value: Vec<LargestAccountEntry>,
}

#[derive(Debug, Deserialize)]
struct LargestAccountEntry {
    address: String,
    #[serde(rename = "uiAmountString")]
    ui_amount_string: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenAmountResult {
    value: UiTokenAmount,
}

#[derive(Debug, Deserialize)]
struct UiTokenAmount {
    #[serde(rename = "uiAmountString")]
    ui_amount_string: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AssetResponse {
    content: Option<AssetContent>,
}

#[derive(Debug, Deserialize)]
struct AssetContent {
    metadata: Option<AssetMetadata>,
}

#[derive(Debug, Deserialize)]
struct AssetMetadata {
    symbol: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EnhancedTransaction {
    timestamp: Option<i64>,
    #[serde(rename = "tokenTransfers", default)]
    token_transfers: Vec<TokenTransferRecord>,
}

#[derive(Debug, Deserialize)]
struct TokenTransferRecord {
    mint: Option<String>,
    #[serde(rename = "fromUserAccount")]
    from_user_account: Option<String>,
    #[serde(rename = "toUserAccount")]
    to_user_account: Option<String>,
    #[serde(rename = "fromTokenAccount")]
    from_token_account: Option<String>,
    #[serde(rename = "toTokenAccount")]
    to_token_account: Option<String>,
    #[serde(rename = "tokenAmount")]
    token_amount: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(timestamp: i64, transfers: Value) -> EnhancedTransaction {
        serde_json::from_value(json!({
            "timestamp": timestamp,
            "tokenTransfers": transfers
        }))
        .unwrap()
    }

    fn leg(mint: &str, from: &str, to: &str, amount: f64) -> Value {
        json!({
            "mint": mint,
            "fromUserAccount": from,
            "toUserAccount": to,
            "fromTokenAccount": format!("{}-ta", from),
            "toTokenAccount": format!("{}-ta", to),
            "tokenAmount": amount
        })
    }

    // 2024-03-05 00:00:00 UTC
    const DAY5: i64 = 1_709_596_800;
    const DAY: i64 = 86_400;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 7).unwrap()
    }

    #[test]
    fn one_transfer_is_taken_per_transaction() {
        let parsed = vec![tx(
            DAY5,
            json!([
                leg("mint-a", "w1", "other", 10.0),
                leg("mint-b", "w1", "other", 20.0),
            ]),
        )];

        let transfers = collect_wallet_transfers(parsed, "w1", None, None, false, today());
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].mint, "mint-a");
    }

    #[test]
    fn unrelated_transfers_are_ignored() {
        let parsed = vec![tx(DAY5, json!([leg("mint-a", "x", "y", 10.0)]))];
        let transfers = collect_wallet_transfers(parsed, "w1", None, None, false, today());
        assert!(transfers.is_empty());
    }

    #[test]
    fn transfers_before_the_window_are_dropped() {
        let since = DateTime::from_timestamp(DAY5, 0).unwrap();
        let parsed = vec![
            tx(DAY5 - DAY, json!([leg("mint-a", "w1", "other", 10.0)])),
            tx(DAY5 + DAY, json!([leg("mint-a", "other", "w1", 5.0)])),
        ];

        let transfers = collect_wallet_transfers(parsed, "w1", None, Some(since), false, today());
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].to_account, "w1");
    }

    #[test]
    fn same_day_transfers_are_excluded_when_requested() {
        let parsed = vec![tx(DAY5, json!([leg("mint-a", "w1", "other", 10.0)]))];
        let on_day5 = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();

        let kept = collect_wallet_transfers(
            parsed,
            "w1",
            None,
            None,
            true,
            on_day5,
        );
        assert!(kept.is_empty());
    }

    #[test]
    fn mint_filter_narrows_the_history() {
        let parsed = vec![
            tx(DAY5, json!([leg("mint-a", "w1", "other", 10.0)])),
            tx(DAY5 + DAY, json!([leg("mint-b", "w1", "other", 20.0)])),
        ];

        let transfers =
            collect_wallet_transfers(parsed, "w1", Some("mint-b"), None, false, today());
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].mint, "mint-b");
    }

    #[test]
    fn owner_is_the_user_side_of_a_matching_leg() {
        let parsed = vec![
            tx(DAY5, json!([leg("mint-a", "x", "y", 1.0)])),
            tx(DAY5, json!([leg("mint-a", "owner1", "z", 2.0)])),
        ];

        assert_eq!(find_owner(&parsed, "owner1-ta"), Some("owner1".to_string()));
        assert_eq!(find_owner(&parsed, "z-ta"), Some("z".to_string()));
        assert_eq!(find_owner(&parsed, "nobody-ta"), None);
    }

    #[test]
    fn excluded_accounts_are_dropped_before_the_limit() {
        let entries: Vec<LargestAccountEntry> = serde_json::from_value(json!([
            { "address": "curve", "uiAmountString": "9000" },
            { "address": "a", "uiAmountString": "500" },
            { "address": "b", "uiAmountString": "300" },
            { "address": "c", "uiAmountString": "100" },
        ]))
        .unwrap();

        let holders = filter_holders(entries, &["curve".to_string()], 2);
        assert_eq!(holders.len(), 2);
        assert_eq!(holders[0].account, "a");
        assert_eq!(holders[0].balance, Decimal::from(500));
        assert_eq!(holders[1].account, "b");
    }

    #[test]
    fn holders_without_a_balance_are_skipped() {
        let entries: Vec<LargestAccountEntry> = serde_json::from_value(json!([
            { "address": "a" },
            { "address": "b", "uiAmountString": "300" },
        ]))
        .unwrap();

        let holders = filter_holders(entries, &[], 10);
        assert_eq!(holders.len(), 1);
        assert_eq!(holders[0].account, "b");
    }

    #[test]
    fn client_requires_an_api_key() {
        let config = HeliusConfig {
            api_key: "".to_string(),
            rpc_url: "https://mainnet.helius-rpc.com".to_string(),
            parse_url: "https://api.helius.xyz/v0/transactions".to_string(),
            request_timeout_seconds: 30,
            history_signature_limit: 100,
            owner_signature_limit: 10,
            top_holder_limit: 10,
            exclude_accounts: Vec::new(),
        };
        assert!(LedgerClient::new(config).is_err());
    }
}
