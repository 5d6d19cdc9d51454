//! Validated description of a batch run
//!
//! Built from command-line arguments and the `files` config section, checked
//! once, then handed to [`BatchRunner::prepare`](super::BatchRunner::prepare).

use std::path::PathBuf;

use solana_sdk::pubkey::Pubkey;

use crate::error::{Error, Result};

use super::instructions::sol_to_lamports;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Funding wallet to every pool wallet
    Distribute,
    /// Every pool wallet to the funding wallet
    Collect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Sol,
    Token(Pubkey),
}

/// Amount as typed by the user, in SOL or whole tokens
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AmountMode {
    Fixed(f64),
    All,
}

#[derive(Debug, Clone)]
pub struct BatchJob {
    pub funding_wallet: PathBuf,
    pub pool_wallets: PathBuf,
    pub direction: Direction,
    pub asset: AssetKind,
    pub amount: AmountMode,
}

impl BatchJob {
    pub fn validate(&self) -> Result<()> {
        if let AmountMode::Fixed(amount) = self.amount {
            if !amount.is_finite() || amount <= 0.0 {
                return Err(Error::InvalidAmount(format!(
                    "amount must be a positive number, got {}",
                    amount
                )));
            }
            if self.asset == AssetKind::Sol {
                sol_to_lamports(amount)?;
            }
        }

        if self.direction == Direction::Distribute
            && self.asset == AssetKind::Sol
            && self.amount == AmountMode::All
        {
            return Err(Error::InvalidAmount(
                "SOL distribution needs a fixed amount per wallet".into(),
            ));
        }

        if self.funding_wallet == self.pool_wallets {
            return Err(Error::Config(
                "funding wallet file and pool wallet file must differ".into(),
            ));
        }

        Ok(())
    }
}
