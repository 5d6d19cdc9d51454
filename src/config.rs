//! Configuration loading and validation

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub rpc: RpcConfig,
    #[serde(default)]
    pub files: FilesConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub tokens: TokensConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcConfig {
    #[serde(default = "default_rpc_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// processed, confirmed or finalized
    #[serde(default = "default_commitment")]
    pub commitment: String,
    /// How long to poll for a confirmation before giving up
    #[serde(default = "default_confirm_timeout_ms")]
    pub confirm_timeout_ms: u64,
}

/// Wallet file locations
#[derive(Debug, Clone, Deserialize)]
pub struct FilesConfig {
    /// Funding wallet, a single `address:secret` line
    #[serde(default = "default_main_wallet")]
    pub main_wallet: PathBuf,
    /// Pool wallets, one `address:secret` per line
    #[serde(default = "default_pool_wallets")]
    pub pool_wallets: PathBuf,
    /// Where keygen appends new wallets
    #[serde(default = "default_new_wallets")]
    pub new_wallets: PathBuf,
    /// One BIP39 phrase per line
    #[serde(default = "default_mnemonics")]
    pub mnemonics: PathBuf,
    /// Output of the mnemonic converter
    #[serde(default = "default_converted")]
    pub converted: PathBuf,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            main_wallet: default_main_wallet(),
            pool_wallets: default_pool_wallets(),
            new_wallets: default_new_wallets(),
            mnemonics: default_mnemonics(),
            converted: default_converted(),
        }
    }
}

/// Batch loop thresholds and pacing
#[derive(Debug, Clone, Deserialize)]
pub struct BatchConfig {
    /// Pool wallets below this SOL balance get a top-up before transferring
    #[serde(default = "default_min_fee_reserve")]
    pub min_fee_reserve_sol: f64,
    #[serde(default = "default_top_up")]
    pub top_up_sol: f64,
    #[serde(default)]
    pub negligible_lamports: u64,
    /// 0 disables the rent-minimum match
    #[serde(default = "default_rent_match_epsilon")]
    pub rent_match_epsilon_lamports: u64,
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    #[serde(default = "default_retry_settle_delay_ms")]
    pub retry_settle_delay_ms: u64,
    #[serde(default = "default_throttle_delay_ms")]
    pub throttle_delay_ms: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            min_fee_reserve_sol: default_min_fee_reserve(),
            top_up_sol: default_top_up(),
            negligible_lamports: 0,
            rent_match_epsilon_lamports: default_rent_match_epsilon(),
            settle_delay_ms: default_settle_delay_ms(),
            retry_settle_delay_ms: default_retry_settle_delay_ms(),
            throttle_delay_ms: default_throttle_delay_ms(),
        }
    }
}

/// Token checker settings
#[derive(Debug, Clone, Deserialize)]
pub struct TokensConfig {
    /// Public token list used for names and symbols; empty disables lookup
    #[serde(default = "default_token_list_url")]
    pub list_url: String,
    /// Attempts per RPC call when rate limited
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for TokensConfig {
    fn default() -> Self {
        Self {
            list_url: default_token_list_url(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

fn default_rpc_endpoint() -> String {
    "https://api.mainnet-beta.solana.com".to_string()
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_commitment() -> String {
    "confirmed".to_string()
}

fn default_confirm_timeout_ms() -> u64 {
    60_000
}

fn default_main_wallet() -> PathBuf {
    PathBuf::from("privkey-main-wallet.txt")
}

fn default_pool_wallets() -> PathBuf {
    PathBuf::from("privkey-tuyul.txt")
}

fn default_new_wallets() -> PathBuf {
    PathBuf::from("wallet-baru.txt")
}

fn default_mnemonics() -> PathBuf {
    PathBuf::from("mnemonic.txt")
}

fn default_converted() -> PathBuf {
    PathBuf::from("convertToPK.txt")
}

fn default_min_fee_reserve() -> f64 {
    0.001
}

fn default_top_up() -> f64 {
    0.001
}

fn default_rent_match_epsilon() -> u64 {
    1
}

fn default_settle_delay_ms() -> u64 {
    1_300
}

fn default_retry_settle_delay_ms() -> u64 {
    2_000
}

fn default_throttle_delay_ms() -> u64 {
    2_000
}

fn default_token_list_url() -> String {
    "https://cdn.jsdelivr.net/gh/solana-labs/token-list@main/src/tokens/solana.tokenlist.json"
        .to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    10_000
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Start with defaults
            .set_default("rpc.endpoint", default_rpc_endpoint())?
            .set_default("rpc.timeout_ms", default_timeout_ms() as i64)?
            .set_default("rpc.commitment", default_commitment())?
            .set_default("rpc.confirm_timeout_ms", default_confirm_timeout_ms() as i64)?
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix TUYUL__)
            .add_source(
                config::Environment::with_prefix("TUYUL")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.rpc.endpoint.trim().is_empty() {
            anyhow::bail!("rpc.endpoint cannot be empty");
        }

        if self.batch.top_up_sol <= 0.0 {
            anyhow::bail!("top_up_sol must be positive");
        }

        if self.batch.min_fee_reserve_sol < 0.0 {
            anyhow::bail!("min_fee_reserve_sol cannot be negative");
        }

        // A top-up smaller than the reserve would leave the wallet still below it
        if self.batch.min_fee_reserve_sol > self.batch.top_up_sol {
            anyhow::bail!(
                "min_fee_reserve_sol ({}) cannot exceed top_up_sol ({})",
                self.batch.min_fee_reserve_sol,
                self.batch.top_up_sol
            );
        }

        if self.tokens.max_retries == 0 {
            anyhow::bail!("tokens.max_retries must be at least 1");
        }

        if !matches!(
            self.rpc.commitment.to_lowercase().as_str(),
            "processed" | "confirmed" | "finalized"
        ) {
            tracing::warn!(
                "Unknown commitment '{}', confirmed will be used",
                self.rpc.commitment
            );
        }

        Ok(())
    }

    /// Get masked configuration for display (hide secrets)
    pub fn masked_display(&self) -> String {
        format!(
            r#"Configuration:
  RPC:
    endpoint: {}
    timeout: {}ms
    commitment: {}
    confirm_timeout: {}ms
  Files:
    main_wallet: {}
    pool_wallets: {}
    new_wallets: {}
    mnemonics: {}
    converted: {}
  Batch:
    min_fee_reserve: {} SOL
    top_up: {} SOL
    negligible: {} lamports
    rent_match_epsilon: {} lamports
    settle_delay: {}ms
    retry_settle_delay: {}ms
    throttle_delay: {}ms
  Tokens:
    list_url: {}
    max_retries: {}
    retry_delay: {}ms
"#,
            mask_url(&self.rpc.endpoint),
            self.rpc.timeout_ms,
            self.rpc.commitment,
            self.rpc.confirm_timeout_ms,
            self.files.main_wallet.display(),
            self.files.pool_wallets.display(),
            self.files.new_wallets.display(),
            self.files.mnemonics.display(),
            self.files.converted.display(),
            self.batch.min_fee_reserve_sol,
            self.batch.top_up_sol,
            self.batch.negligible_lamports,
            self.batch.rent_match_epsilon_lamports,
            self.batch.settle_delay_ms,
            self.batch.retry_settle_delay_ms,
            self.batch.throttle_delay_ms,
            if self.tokens.list_url.is_empty() {
                "(disabled)".to_string()
            } else {
                mask_url(&self.tokens.list_url)
            },
            self.tokens.max_retries,
            self.tokens.retry_delay_ms,
        )
    }
}

/// Mask URL for display (hide API keys in query params)
fn mask_url(url: &str) -> String {
    if let Some(idx) = url.find('?') {
        format!("{}?***", &url[..idx])
    } else {
        url.to_string()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc: RpcConfig {
                endpoint: default_rpc_endpoint(),
                timeout_ms: default_timeout_ms(),
                commitment: default_commitment(),
                confirm_timeout_ms: default_confirm_timeout_ms(),
            },
            files: FilesConfig::default(),
            batch: BatchConfig::default(),
            tokens: TokensConfig::default(),
        }
    }
}
