//! Balance and token holdings checker
//!
//! Reads SOL and SPL token balances for a list of wallets. Names and symbols
//! come from the public Solana token list when it can be downloaded. Ledger
//! reads are retried on HTTP 429 with a fixed delay.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use backoff::{future::retry, ExponentialBackoff};
use serde::Deserialize;
use solana_sdk::pubkey::Pubkey;
use tracing::{debug, info, warn};

use crate::config::TokensConfig;
use crate::error::Result;
use crate::ledger::{Ledger, LedgerResult, TokenHolding};

/// Display metadata for a mint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenInfo {
    pub name: String,
    pub symbol: String,
}

impl TokenInfo {
    fn unknown() -> Self {
        Self {
            name: "Unknown Token".to_string(),
            symbol: "UNKNOWN".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenList {
    tokens: Vec<TokenListEntry>,
}

#[derive(Debug, Deserialize)]
struct TokenListEntry {
    address: String,
    name: String,
    symbol: String,
}

/// Mint address to name/symbol lookup
#[derive(Debug, Default)]
pub struct TokenRegistry {
    tokens: HashMap<String, TokenInfo>,
}

impl TokenRegistry {
    /// Download the token list; failures leave the registry empty
    pub async fn fetch(url: &str) -> Self {
        if url.is_empty() {
            return Self::default();
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        match Self::download(&client, url).await {
            Ok(registry) => {
                info!("Token list loaded: {} tokens", registry.len());
                registry
            }
            Err(e) => {
                warn!("Token list unavailable, continuing without names: {}", e);
                Self::default()
            }
        }
    }

    async fn download(client: &reqwest::Client, url: &str) -> Result<Self> {
        let body = client.get(url).send().await?.error_for_status()?.text().await?;
        Self::from_json(&body)
    }

    /// Parse a `{"tokens": [{address, name, symbol}, ...]}` document
    pub fn from_json(json: &str) -> Result<Self> {
        let list: TokenList = serde_json::from_str(json)?;
        Ok(Self {
            tokens: list
                .tokens
                .into_iter()
                .map(|t| {
                    (
                        t.address,
                        TokenInfo {
                            name: t.name,
                            symbol: t.symbol,
                        },
                    )
                })
                .collect(),
        })
    }

    pub fn lookup(&self, mint: &Pubkey) -> TokenInfo {
        self.tokens
            .get(&mint.to_string())
            .cloned()
            .unwrap_or_else(TokenInfo::unknown)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// One non-zero token balance with its metadata
#[derive(Debug, Clone)]
pub struct TokenLine {
    pub holding: TokenHolding,
    pub info: TokenInfo,
}

#[derive(Debug, Clone)]
pub struct WalletReport {
    pub address: Pubkey,
    pub lamports: u64,
    pub tokens: Vec<TokenLine>,
}

pub struct TokenChecker {
    ledger: Arc<dyn Ledger>,
    registry: TokenRegistry,
    max_retries: u32,
    retry_delay: Duration,
}

impl TokenChecker {
    pub fn new(ledger: Arc<dyn Ledger>, registry: TokenRegistry, config: &TokensConfig) -> Self {
        Self {
            ledger,
            registry,
            max_retries: config.max_retries.max(1),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        }
    }

    /// SOL balance and non-zero token holdings of one wallet
    pub async fn check(&self, address: &Pubkey) -> LedgerResult<WalletReport> {
        let lamports = self
            .with_rate_limit_retry(|| self.ledger.balance(address))
            .await?;

        let holdings = self
            .with_rate_limit_retry(|| self.ledger.token_holdings(address))
            .await?;

        let tokens = holdings
            .into_iter()
            .filter(|h| h.amount.raw > 0)
            .map(|holding| TokenLine {
                info: self.registry.lookup(&holding.mint),
                holding,
            })
            .collect();

        Ok(WalletReport {
            address: *address,
            lamports,
            tokens,
        })
    }

    /// Run `op`, retrying while the ledger reports rate limiting
    ///
    /// `max_retries` counts total attempts.
    async fn with_rate_limit_retry<T, F, Fut>(&self, mut op: F) -> LedgerResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = LedgerResult<T>>,
    {
        let policy = ExponentialBackoff {
            current_interval: self.retry_delay,
            initial_interval: self.retry_delay,
            max_interval: self.retry_delay,
            randomization_factor: 0.0,
            multiplier: 1.0,
            max_elapsed_time: None,
            ..Default::default()
        };

        let attempts = AtomicU32::new(0);
        let attempts = &attempts;
        let max_retries = self.max_retries;

        retry(policy, || {
            let call = op();
            async move {
                match call.await {
                    Ok(value) => Ok(value),
                    Err(e) if e.is_rate_limited() => {
                        let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                        if attempt >= max_retries {
                            warn!("Still rate limited after {} attempts", attempt);
                            Err(backoff::Error::permanent(e))
                        } else {
                            warn!("Rate limited, waiting (attempt {}/{})", attempt, max_retries);
                            Err(backoff::Error::transient(e))
                        }
                    }
                    Err(e) => {
                        debug!("Ledger read failed: {}", e);
                        Err(backoff::Error::permanent(e))
                    }
                }
            }
        })
        .await
    }
}
