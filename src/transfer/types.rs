//! Batch plan and outcome types

use std::fmt;

use solana_sdk::{pubkey::Pubkey, signature::Signature};

use super::instructions::{from_raw_units, lamports_to_sol};
use crate::wallet::WalletRecord;

/// What a batch moves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Asset {
    Sol,
    Token { mint: Pubkey, decimals: u8 },
}

impl Asset {
    /// Format raw units of this asset for humans
    pub fn format(&self, raw: u64) -> String {
        match self {
            Asset::Sol => format!("{:.9} SOL", lamports_to_sol(raw)),
            Asset::Token { decimals, .. } => format!("{} tokens", from_raw_units(raw, *decimals)),
        }
    }
}

/// Amount to move per wallet, in raw units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Amount {
    Fixed(u64),
    AllRemaining,
}

/// One source/destination pair
#[derive(Debug, Clone)]
pub struct TransferPlan {
    pub source: WalletRecord,
    pub destination: Pubkey,
    pub amount: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    NoBalance,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// Fee reserve top-up from the funding wallet did not go through
    FundingFailed(String),
    /// Fixed amount larger than the wallet holds
    InsufficientBalance { available: u64, requested: u64 },
    /// Ledger refused the transfer; raw reason kept for the report
    Rejected(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::FundingFailed(reason) => write!(f, "funding failed: {}", reason),
            FailureReason::InsufficientBalance {
                available,
                requested,
            } => write!(
                f,
                "insufficient balance: {} available, {} requested",
                available, requested
            ),
            FailureReason::Rejected(reason) => write!(f, "{}", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutcomeStatus {
    Success,
    Skipped(SkipReason),
    Failed(FailureReason),
}

/// Result of one entry
#[derive(Debug, Clone)]
pub struct TransferOutcome {
    pub wallet: Pubkey,
    pub status: OutcomeStatus,
    pub amount_moved: u64,
    pub signature: Option<Signature>,
}

impl TransferOutcome {
    pub fn success(wallet: Pubkey, amount: u64, signature: Signature) -> Self {
        Self {
            wallet,
            status: OutcomeStatus::Success,
            amount_moved: amount,
            signature: Some(signature),
        }
    }

    pub fn skipped(wallet: Pubkey) -> Self {
        Self {
            wallet,
            status: OutcomeStatus::Skipped(SkipReason::NoBalance),
            amount_moved: 0,
            signature: None,
        }
    }

    pub fn failed(wallet: Pubkey, reason: FailureReason) -> Self {
        Self {
            wallet,
            status: OutcomeStatus::Failed(reason),
            amount_moved: 0,
            signature: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }
}

/// Totals for one run, printed and then dropped
#[derive(Debug, Clone)]
pub struct BatchSummary {
    pub asset: Asset,
    pub total: usize,
    pub processed: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Raw units moved by successful entries
    pub amount_moved: u64,
    /// Funding wallet SOL, best effort
    pub funding_before: Option<u64>,
    pub funding_after: Option<u64>,
    pub outcomes: Vec<TransferOutcome>,
}

impl BatchSummary {
    pub fn new(asset: Asset, total: usize) -> Self {
        Self {
            asset,
            total,
            processed: 0,
            failed: 0,
            skipped: 0,
            amount_moved: 0,
            funding_before: None,
            funding_after: None,
            outcomes: Vec::with_capacity(total),
        }
    }

    /// Tally one outcome
    pub fn record(&mut self, outcome: TransferOutcome) {
        match outcome.status {
            OutcomeStatus::Success => {
                self.processed += 1;
                self.amount_moved += outcome.amount_moved;
            }
            OutcomeStatus::Skipped(_) => self.skipped += 1,
            OutcomeStatus::Failed(_) => self.failed += 1,
        }
        self.outcomes.push(outcome);
    }

    /// Funding wallet SOL spent (positive) or received (negative) during the run
    pub fn funding_delta(&self) -> Option<i64> {
        match (self.funding_before, self.funding_after) {
            (Some(before), Some(after)) => Some(before as i64 - after as i64),
            _ => None,
        }
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total wallets      : {}", self.total)?;
        writeln!(f, "Succeeded          : {}", self.processed)?;
        writeln!(f, "Failed             : {}", self.failed)?;
        writeln!(f, "Skipped            : {}", self.skipped)?;
        writeln!(f, "Amount moved       : {}", self.asset.format(self.amount_moved))?;

        let sol = |lamports: Option<u64>| {
            lamports
                .map(|l| format!("{:.9} SOL", lamports_to_sol(l)))
                .unwrap_or_else(|| "unavailable".to_string())
        };
        writeln!(f, "Funding before     : {}", sol(self.funding_before))?;
        writeln!(f, "Funding after      : {}", sol(self.funding_after))?;
        match self.funding_delta() {
            Some(delta) => write!(
                f,
                "Funding delta      : {:.9} SOL",
                delta as f64 / 1_000_000_000.0
            ),
            None => write!(f, "Funding delta      : unavailable"),
        }
    }
}
