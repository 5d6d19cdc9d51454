//! Ledger access
//!
//! Everything the toolkit needs from the chain goes through the [`Ledger`]
//! trait, so the batch loop can be driven by the RPC client in production and
//! by an in-memory ledger in tests.
//!
//! Submission failures are classified here, at the boundary, into
//! [`LedgerError`] variants. Callers decide retry policy from the variant,
//! never from error text.

use async_trait::async_trait;
use solana_client::client_error::{ClientError, ClientErrorKind};
use solana_client::rpc_request::RpcError;
use solana_sdk::{
    hash::Hash, message::Message, pubkey::Pubkey, signature::Signature,
    transaction::{Transaction, TransactionError},
};
use thiserror::Error;

pub mod rpc;

#[cfg(test)]
pub(crate) mod memory;

pub use rpc::RpcLedger;

/// Result type for ledger calls
pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

/// Structured classification of ledger failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Account cannot cover rent or fee after the transaction
    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    /// Debited account has never been credited
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// Upstream rejected the request with HTTP 429
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Submitted but not confirmed before the transport timeout
    #[error("Transaction {0} not confirmed in time")]
    Unconfirmed(String),

    #[error("{0}")]
    Other(String),
}

impl LedgerError {
    /// Failures that a fee-reserve top-up can fix
    pub fn is_rent_class(&self) -> bool {
        matches!(
            self,
            LedgerError::InsufficientFunds(_) | LedgerError::AccountNotFound(_)
        )
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, LedgerError::RateLimited(_))
    }

    /// Classify an on-chain transaction error
    pub fn from_transaction_error(err: &TransactionError) -> Self {
        match err {
            TransactionError::InsufficientFundsForRent { .. }
            | TransactionError::InsufficientFundsForFee => {
                LedgerError::InsufficientFunds(err.to_string())
            }
            TransactionError::AccountNotFound => LedgerError::AccountNotFound(err.to_string()),
            other => LedgerError::Other(other.to_string()),
        }
    }
}

impl From<ClientError> for LedgerError {
    fn from(e: ClientError) -> Self {
        // Preflight failures carry the simulated TransactionError
        if let Some(tx_err) = e.get_transaction_error() {
            return LedgerError::from_transaction_error(&tx_err);
        }

        if is_rate_limited(&e) {
            return LedgerError::RateLimited(e.to_string());
        }

        LedgerError::Other(e.to_string())
    }
}

fn is_rate_limited(e: &ClientError) -> bool {
    match e.kind() {
        ClientErrorKind::Reqwest(err) => err.status().map(|s| s.as_u16()) == Some(429),
        ClientErrorKind::RpcError(RpcError::RpcRequestError(msg))
        | ClientErrorKind::RpcError(RpcError::ForUser(msg)) => msg.contains("429"),
        ClientErrorKind::RpcError(RpcError::RpcResponseError { code, message, .. }) => {
            *code == 429 || message.contains("429")
        }
        _ => false,
    }
}

/// Token amount in base units with its mint decimals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenAmount {
    pub raw: u64,
    pub decimals: u8,
}

impl TokenAmount {
    /// Amount in whole tokens
    pub fn ui_amount(&self) -> f64 {
        self.raw as f64 / 10f64.powi(self.decimals as i32)
    }
}

/// One SPL token account held by a wallet
#[derive(Debug, Clone, PartialEq)]
pub struct TokenHolding {
    pub token_account: Pubkey,
    pub mint: Pubkey,
    pub amount: TokenAmount,
}

/// Chain operations consumed by the toolkit
#[async_trait]
pub trait Ledger: Send + Sync {
    /// SOL balance in lamports
    async fn balance(&self, address: &Pubkey) -> LedgerResult<u64>;

    /// Network fee for a compiled message, in lamports
    async fn estimate_fee(&self, message: &Message) -> LedgerResult<u64>;

    async fn latest_blockhash(&self) -> LedgerResult<Hash>;

    /// Submit a signed transaction (with preflight) and return its signature
    async fn submit(&self, transaction: &Transaction) -> LedgerResult<Signature>;

    /// Wait until the transaction is confirmed; on-chain failures are classified
    async fn await_confirmation(&self, signature: &Signature) -> LedgerResult<()>;

    /// Minimum lamports for an account of `data_len` bytes to be rent exempt
    async fn rent_exempt_minimum(&self, data_len: usize) -> LedgerResult<u64>;

    async fn account_exists(&self, address: &Pubkey) -> LedgerResult<bool>;

    async fn mint_decimals(&self, mint: &Pubkey) -> LedgerResult<u8>;

    /// Balance of `owner`'s associated token account for `mint`; zero if it does not exist
    async fn token_balance(&self, owner: &Pubkey, mint: &Pubkey) -> LedgerResult<TokenAmount>;

    /// All SPL token accounts owned by `owner`
    async fn token_holdings(&self, owner: &Pubkey) -> LedgerResult<Vec<TokenHolding>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_error_classification() {
        let rent = TransactionError::InsufficientFundsForRent { account_index: 0 };
        assert!(LedgerError::from_transaction_error(&rent).is_rent_class());

        let no_credit = TransactionError::AccountNotFound;
        assert_eq!(
            LedgerError::from_transaction_error(&no_credit),
            LedgerError::AccountNotFound(no_credit.to_string())
        );

        let other = TransactionError::BlockhashNotFound;
        assert!(!LedgerError::from_transaction_error(&other).is_rent_class());
    }

    #[test]
    fn test_client_error_rate_limit() {
        let err = ClientError::from(ClientErrorKind::RpcError(RpcError::RpcRequestError(
            "HTTP status client error (429 Too Many Requests)".to_string(),
        )));
        assert!(LedgerError::from(err).is_rate_limited());
    }

    #[test]
    fn test_client_error_preflight_rent() {
        let err = ClientError::from(ClientErrorKind::TransactionError(
            TransactionError::InsufficientFundsForRent { account_index: 1 },
        ));
        assert!(matches!(
            LedgerError::from(err),
            LedgerError::InsufficientFunds(_)
        ));
    }

    #[test]
    fn test_token_amount_ui() {
        let amount = TokenAmount { raw: 1_500_000, decimals: 6 };
        assert!((amount.ui_amount() - 1.5).abs() < f64::EPSILON);
    }
}
