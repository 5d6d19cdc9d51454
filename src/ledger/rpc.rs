//! RPC-backed ledger
//!
//! Thin wrapper over the nonblocking Solana RPC client. One instance is
//! created per command and handed to whatever needs it.

use std::str::FromStr;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use solana_account_decoder::UiAccountData;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_request::TokenAccountsFilter;
use solana_sdk::{
    commitment_config::CommitmentConfig, hash::Hash, message::Message, program_pack::Pack,
    pubkey::Pubkey, signature::Signature, transaction::Transaction,
};
use spl_associated_token_account::get_associated_token_address;
use tracing::{debug, warn};

use super::{Ledger, LedgerError, LedgerResult, TokenAmount, TokenHolding};
use crate::config::RpcConfig;

/// Interval between signature status polls
const CONFIRM_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Ledger implementation over JSON-RPC
pub struct RpcLedger {
    client: RpcClient,
    commitment: CommitmentConfig,
    confirm_timeout: Duration,
}

impl RpcLedger {
    /// Create a ledger from RPC configuration
    pub fn new(config: &RpcConfig) -> Self {
        let commitment = parse_commitment(&config.commitment);
        let client = RpcClient::new_with_timeout_and_commitment(
            config.endpoint.clone(),
            Duration::from_millis(config.timeout_ms),
            commitment,
        );

        Self {
            client,
            commitment,
            confirm_timeout: Duration::from_millis(config.confirm_timeout_ms),
        }
    }

    /// Endpoint this ledger talks to
    pub fn url(&self) -> String {
        self.client.url()
    }
}

/// Map a commitment name from config; unknown names fall back to `confirmed`
pub fn parse_commitment(name: &str) -> CommitmentConfig {
    match name.to_lowercase().as_str() {
        "processed" => CommitmentConfig::processed(),
        "finalized" => CommitmentConfig::finalized(),
        "confirmed" => CommitmentConfig::confirmed(),
        other => {
            warn!("Unknown commitment '{}', using confirmed", other);
            CommitmentConfig::confirmed()
        }
    }
}

/// `info` object of a jsonParsed SPL token account
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ParsedTokenAccount {
    mint: String,
    token_amount: ParsedTokenAmount,
}

#[derive(Debug, Deserialize)]
struct ParsedTokenAmount {
    amount: String,
    decimals: u8,
}

fn parse_holding(token_account: &str, data: &UiAccountData) -> Option<TokenHolding> {
    let UiAccountData::Json(parsed) = data else {
        return None;
    };
    let info = parsed.parsed.get("info")?.clone();
    let info: ParsedTokenAccount = serde_json::from_value(info).ok()?;

    Some(TokenHolding {
        token_account: Pubkey::from_str(token_account).ok()?,
        mint: Pubkey::from_str(&info.mint).ok()?,
        amount: TokenAmount {
            raw: info.token_amount.amount.parse().ok()?,
            decimals: info.token_amount.decimals,
        },
    })
}

#[async_trait]
impl Ledger for RpcLedger {
    async fn balance(&self, address: &Pubkey) -> LedgerResult<u64> {
        Ok(self.client.get_balance(address).await?)
    }

    async fn estimate_fee(&self, message: &Message) -> LedgerResult<u64> {
        Ok(self.client.get_fee_for_message(message).await?)
    }

    async fn latest_blockhash(&self) -> LedgerResult<Hash> {
        Ok(self.client.get_latest_blockhash().await?)
    }

    async fn submit(&self, transaction: &Transaction) -> LedgerResult<Signature> {
        let signature = self.client.send_transaction(transaction).await?;
        debug!("Submitted {}", signature);
        Ok(signature)
    }

    async fn await_confirmation(&self, signature: &Signature) -> LedgerResult<()> {
        let started = Instant::now();

        loop {
            let status = self
                .client
                .get_signature_status_with_commitment(signature, self.commitment)
                .await?;

            match status {
                Some(Ok(())) => {
                    debug!("Confirmed {} in {}ms", signature, started.elapsed().as_millis());
                    return Ok(());
                }
                Some(Err(tx_err)) => return Err(LedgerError::from_transaction_error(&tx_err)),
                None if started.elapsed() >= self.confirm_timeout => {
                    return Err(LedgerError::Unconfirmed(signature.to_string()));
                }
                None => tokio::time::sleep(CONFIRM_POLL_INTERVAL).await,
            }
        }
    }

    async fn rent_exempt_minimum(&self, data_len: usize) -> LedgerResult<u64> {
        Ok(self
            .client
            .get_minimum_balance_for_rent_exemption(data_len)
            .await?)
    }

    async fn account_exists(&self, address: &Pubkey) -> LedgerResult<bool> {
        let response = self
            .client
            .get_account_with_commitment(address, self.commitment)
            .await?;
        Ok(response.value.is_some())
    }

    async fn mint_decimals(&self, mint: &Pubkey) -> LedgerResult<u8> {
        let data = self.client.get_account_data(mint).await?;
        let mint_state = spl_token::state::Mint::unpack(&data)
            .map_err(|e| LedgerError::Other(format!("{} is not an SPL mint: {}", mint, e)))?;
        Ok(mint_state.decimals)
    }

    async fn token_balance(&self, owner: &Pubkey, mint: &Pubkey) -> LedgerResult<TokenAmount> {
        let ata = get_associated_token_address(owner, mint);

        if !self.account_exists(&ata).await? {
            let decimals = self.mint_decimals(mint).await?;
            return Ok(TokenAmount { raw: 0, decimals });
        }

        let ui = self.client.get_token_account_balance(&ata).await?;
        let raw = ui
            .amount
            .parse()
            .map_err(|e| LedgerError::Other(format!("Bad token amount '{}': {}", ui.amount, e)))?;

        Ok(TokenAmount {
            raw,
            decimals: ui.decimals,
        })
    }

    async fn token_holdings(&self, owner: &Pubkey) -> LedgerResult<Vec<TokenHolding>> {
        let accounts = self
            .client
            .get_token_accounts_by_owner(owner, TokenAccountsFilter::ProgramId(spl_token::id()))
            .await?;

        Ok(accounts
            .iter()
            .filter_map(|keyed| parse_holding(&keyed.pubkey, &keyed.account.data))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_account_decoder::parse_account_data::ParsedAccount;

    #[test]
    fn test_parse_commitment() {
        assert_eq!(parse_commitment("finalized"), CommitmentConfig::finalized());
        assert_eq!(parse_commitment("Processed"), CommitmentConfig::processed());
        assert_eq!(parse_commitment("bogus"), CommitmentConfig::confirmed());
    }

    #[test]
    fn test_parse_holding() {
        let mint = Pubkey::new_unique();
        let account = Pubkey::new_unique();
        let data = UiAccountData::Json(ParsedAccount {
            program: "spl-token".to_string(),
            parsed: serde_json::json!({
                "type": "account",
                "info": {
                    "mint": mint.to_string(),
                    "owner": Pubkey::new_unique().to_string(),
                    "tokenAmount": {
                        "amount": "2500000",
                        "decimals": 6,
                        "uiAmount": 2.5,
                        "uiAmountString": "2.5"
                    }
                }
            }),
            space: 165,
        });

        let holding = parse_holding(&account.to_string(), &data).unwrap();
        assert_eq!(holding.mint, mint);
        assert_eq!(holding.token_account, account);
        assert_eq!(holding.amount, TokenAmount { raw: 2_500_000, decimals: 6 });
    }

    #[test]
    fn test_parse_holding_ignores_binary() {
        let data = UiAccountData::LegacyBinary("".to_string());
        assert!(parse_holding(&Pubkey::new_unique().to_string(), &data).is_none());
    }
}
