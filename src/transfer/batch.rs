//! Batch transfer loop
//!
//! Walks a plan strictly in order. Per entry: skip empty wallets, top up the
//! fee reserve from the funding wallet when it is low, compute the amount,
//! submit, and on a rent-class rejection run exactly one top-up-and-retry
//! cycle. Per-entry failures are tallied and never stop the batch; only setup
//! errors in [`BatchRunner::prepare`] abort, before any entry is attempted.

use std::sync::Arc;
use std::time::Duration;

use solana_sdk::{pubkey::Pubkey, signature::Signature};
use tracing::{debug, info, warn};

use super::instructions::{self, from_raw_units, sol_to_lamports, to_raw_units};
use super::job::{AmountMode, AssetKind, BatchJob, Direction};
use super::types::{
    Amount, Asset, BatchSummary, FailureReason, OutcomeStatus, TransferOutcome, TransferPlan,
};
use crate::config::BatchConfig;
use crate::error::{Error, Result};
use crate::ledger::{Ledger, LedgerError, LedgerResult};
use crate::wallet::{short_address, store, WalletRecord};

/// Fee assumed when the ledger cannot estimate one
pub const DEFAULT_FEE_LAMPORTS: u64 = 5_000;

/// Rent-exempt minimum of a zero-data system account, used if the lookup fails
pub const DEFAULT_RENT_MINIMUM: u64 = 890_880;

/// Thresholds and delays for a run
#[derive(Debug, Clone)]
pub struct BatchSettings {
    /// Source wallets holding less SOL than this get topped up first
    pub min_fee_reserve: u64,
    /// Lamports sent per top-up
    pub top_up: u64,
    /// SOL balances at or below this are skipped; token balances skip at zero
    pub negligible_balance: u64,
    /// Also top up when SOL is within this many lamports of the rent minimum.
    /// Zero disables the check.
    pub rent_match_epsilon: u64,
    /// Wait after a top-up before the main transfer
    pub settle_delay: Duration,
    /// Wait after the retry top-up
    pub retry_settle_delay: Duration,
    /// Pause between entries
    pub throttle_delay: Duration,
}

impl BatchSettings {
    pub fn from_config(config: &BatchConfig) -> Result<Self> {
        Ok(Self {
            min_fee_reserve: sol_to_lamports(config.min_fee_reserve_sol)?,
            top_up: sol_to_lamports(config.top_up_sol)?,
            negligible_balance: config.negligible_lamports,
            rent_match_epsilon: config.rent_match_epsilon_lamports,
            settle_delay: Duration::from_millis(config.settle_delay_ms),
            retry_settle_delay: Duration::from_millis(config.retry_settle_delay_ms),
            throttle_delay: Duration::from_millis(config.throttle_delay_ms),
        })
    }
}

/// A loaded, resolved batch ready to run
#[derive(Debug, Clone)]
pub struct PreparedBatch {
    pub funding: WalletRecord,
    pub asset: Asset,
    pub plan: Vec<TransferPlan>,
    /// Add the rent-exempt minimum when a SOL recipient does not exist yet
    pub pad_new_recipients: bool,
}

impl PreparedBatch {
    /// One-off transfer where the sender pays its own fees
    pub fn single(sender: WalletRecord, destination: Pubkey, asset: Asset, amount: Amount) -> Self {
        Self {
            plan: vec![TransferPlan {
                source: sender.clone(),
                destination,
                amount,
            }],
            funding: sender,
            asset,
            pad_new_recipients: false,
        }
    }
}

/// Result of one transfer attempt that reached a decision
enum Attempt {
    Sent { amount: u64, signature: Signature },
    NothingToMove,
    Insufficient { available: u64, requested: u64 },
}

pub struct BatchRunner {
    ledger: Arc<dyn Ledger>,
    settings: BatchSettings,
}

impl BatchRunner {
    pub fn new(ledger: Arc<dyn Ledger>, settings: BatchSettings) -> Self {
        Self { ledger, settings }
    }

    pub fn settings(&self) -> &BatchSettings {
        &self.settings
    }

    /// Load wallets and resolve a job into a plan
    ///
    /// Errors here are setup errors: nothing has been submitted yet.
    pub async fn prepare(&self, job: &BatchJob) -> Result<PreparedBatch> {
        job.validate()?;

        let funding = store::load_single(&job.funding_wallet).map_err(|e| {
            Error::FatalSetup(format!(
                "funding wallet {}: {}",
                job.funding_wallet.display(),
                e
            ))
        })?;

        let pool: Vec<WalletRecord> = store::load(&job.pool_wallets)?
            .into_iter()
            .filter(|w| {
                let is_funding = w.address() == funding.address();
                if is_funding {
                    warn!("Funding wallet {} is in the pool, ignoring it", w.address());
                }
                !is_funding
            })
            .collect();

        if pool.is_empty() {
            return Err(Error::EmptyWalletPool(job.pool_wallets.display().to_string()));
        }

        let asset = match job.asset {
            AssetKind::Sol => Asset::Sol,
            AssetKind::Token(mint) => {
                let decimals = self.ledger.mint_decimals(&mint).await.map_err(|e| {
                    Error::FatalSetup(format!("cannot read mint {}: {}", mint, e))
                })?;
                Asset::Token { mint, decimals }
            }
        };

        let plan = match job.direction {
            Direction::Distribute => {
                let amount = self.distribution_amount(&funding, asset, job.amount, pool.len()).await?;
                pool.iter()
                    .map(|wallet| TransferPlan {
                        source: funding.clone(),
                        destination: wallet.address(),
                        amount,
                    })
                    .collect()
            }
            Direction::Collect => {
                let amount = match job.amount {
                    AmountMode::All => Amount::AllRemaining,
                    AmountMode::Fixed(ui) => Amount::Fixed(to_raw(asset, ui)?),
                };
                pool.into_iter()
                    .map(|wallet| TransferPlan {
                        source: wallet,
                        destination: funding.address(),
                        amount,
                    })
                    .collect()
            }
        };

        Ok(PreparedBatch {
            funding,
            asset,
            plan,
            pad_new_recipients: job.direction == Direction::Distribute && asset == Asset::Sol,
        })
    }

    /// Per-wallet amount when the funding wallet pays out
    ///
    /// Token distributions are checked against the funding wallet's balance
    /// for the whole pool before anything is sent.
    async fn distribution_amount(
        &self,
        funding: &WalletRecord,
        asset: Asset,
        mode: AmountMode,
        wallets: usize,
    ) -> Result<Amount> {
        let Asset::Token { mint, decimals } = asset else {
            return match mode {
                AmountMode::Fixed(sol) => Ok(Amount::Fixed(sol_to_lamports(sol)?)),
                AmountMode::All => Err(Error::InvalidAmount(
                    "SOL distribution needs a fixed amount per wallet".into(),
                )),
            };
        };

        let held = self
            .ledger
            .token_balance(&funding.address(), &mint)
            .await
            .map_err(|e| Error::FatalSetup(format!("cannot read funding token balance: {}", e)))?
            .raw;

        let per_wallet = match mode {
            AmountMode::All => held / wallets as u64,
            AmountMode::Fixed(ui) => match to_raw_units(ui, decimals)? {
                0 => {
                    return Err(Error::InvalidAmount(format!(
                        "{} is below the smallest unit of a {}-decimal token",
                        ui, decimals
                    )))
                }
                raw => raw,
            },
        };

        let required = per_wallet.saturating_mul(wallets as u64);
        if per_wallet == 0 || required > held {
            return Err(Error::InsufficientBalance {
                available: from_raw_units(held, decimals),
                required: from_raw_units(required.max(wallets as u64), decimals),
            });
        }

        Ok(Amount::Fixed(per_wallet))
    }

    /// Run every entry of a prepared batch, in order
    pub async fn run(&self, batch: &PreparedBatch) -> BatchSummary {
        let total = batch.plan.len();
        let mut summary = BatchSummary::new(batch.asset, total);
        let funding = batch.funding.address();

        summary.funding_before = self.funding_balance(&funding).await;
        let rent_minimum = self.rent_minimum().await;

        for (index, entry) in batch.plan.iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(self.settings.throttle_delay).await;
            }

            let outcome = self.process(batch, entry, rent_minimum).await;
            report(index + 1, total, entry, batch.asset, &outcome);
            summary.record(outcome);
        }

        summary.funding_after = self.funding_balance(&funding).await;
        summary
    }

    async fn process(
        &self,
        batch: &PreparedBatch,
        entry: &TransferPlan,
        rent_minimum: u64,
    ) -> TransferOutcome {
        let source = entry.source.address();
        let is_funding = source == batch.funding.address();

        let held = match self.asset_balance(batch.asset, &source).await {
            Ok(held) => held,
            Err(e) => return TransferOutcome::failed(source, FailureReason::Rejected(e.to_string())),
        };

        let negligible = match batch.asset {
            Asset::Sol => self.settings.negligible_balance,
            Asset::Token { .. } => 0,
        };
        if held <= negligible {
            return TransferOutcome::skipped(source);
        }

        if !is_funding && self.needs_top_up(&source, rent_minimum).await {
            info!("Topping up fee reserve of {}", short_address(&source));
            if let Err(e) = self.top_up(&batch.funding, &source).await {
                return TransferOutcome::failed(source, FailureReason::FundingFailed(e.to_string()));
            }
            tokio::time::sleep(self.settings.settle_delay).await;
        }

        let first = self.attempt(batch, entry, rent_minimum).await;
        let result = match first {
            Err(e) if e.is_rent_class() && !is_funding => {
                warn!(
                    "{} rejected ({}), topping up and retrying once",
                    short_address(&source),
                    e
                );
                if let Err(e) = self.top_up(&batch.funding, &source).await {
                    return TransferOutcome::failed(
                        source,
                        FailureReason::FundingFailed(e.to_string()),
                    );
                }
                tokio::time::sleep(self.settings.retry_settle_delay).await;
                self.attempt(batch, entry, rent_minimum).await
            }
            other => other,
        };

        match result {
            Ok(Attempt::Sent { amount, signature }) => {
                TransferOutcome::success(source, amount, signature)
            }
            Ok(Attempt::NothingToMove) => TransferOutcome::skipped(source),
            Ok(Attempt::Insufficient {
                available,
                requested,
            }) => TransferOutcome::failed(
                source,
                FailureReason::InsufficientBalance {
                    available,
                    requested,
                },
            ),
            Err(e) => TransferOutcome::failed(source, FailureReason::Rejected(e.to_string())),
        }
    }

    /// Compute the amount from a fresh balance, then submit and confirm
    async fn attempt(
        &self,
        batch: &PreparedBatch,
        entry: &TransferPlan,
        rent_minimum: u64,
    ) -> LedgerResult<Attempt> {
        let source = entry.source.address();
        let held = self.asset_balance(batch.asset, &source).await?;
        let blockhash = self.ledger.latest_blockhash().await?;

        let (amount, instructions) = match batch.asset {
            Asset::Sol => {
                let amount = match entry.amount {
                    Amount::Fixed(requested) => {
                        let mut requested = Some(requested);
                        if batch.pad_new_recipients
                            && !self.ledger.account_exists(&entry.destination).await?
                        {
                            debug!(
                                "{} is new, adding rent minimum {}",
                                entry.destination, rent_minimum
                            );
                            requested = requested.and_then(|r| r.checked_add(rent_minimum));
                        }
                        match requested {
                            Some(requested) if requested <= held => requested,
                            requested => {
                                return Ok(Attempt::Insufficient {
                                    available: held,
                                    requested: requested.unwrap_or(u64::MAX),
                                });
                            }
                        }
                    }
                    Amount::AllRemaining => {
                        let draft = instructions::sol_transfer(&source, &entry.destination, held);
                        let message = instructions::message(&draft, &source, blockhash);
                        let fee = match self.ledger.estimate_fee(&message).await {
                            Ok(fee) => fee,
                            Err(e) => {
                                debug!("Fee estimate failed ({}), assuming {}", e, DEFAULT_FEE_LAMPORTS);
                                DEFAULT_FEE_LAMPORTS
                            }
                        };
                        held.saturating_sub(fee)
                    }
                };
                (
                    amount,
                    instructions::sol_transfer(&source, &entry.destination, amount),
                )
            }
            Asset::Token { mint, decimals } => {
                let amount = match entry.amount {
                    Amount::Fixed(requested) if requested > held => {
                        return Ok(Attempt::Insufficient {
                            available: held,
                            requested,
                        });
                    }
                    Amount::Fixed(requested) => requested,
                    Amount::AllRemaining => held,
                };
                let ixs = instructions::token_transfer(
                    &source,
                    &entry.destination,
                    &mint,
                    amount,
                    decimals,
                )
                .map_err(|e| LedgerError::Other(e.to_string()))?;
                (amount, ixs)
            }
        };

        if amount == 0 {
            return Ok(Attempt::NothingToMove);
        }

        let transaction = instructions::sign(&instructions, entry.source.keypair(), blockhash);
        let signature = self.ledger.submit(&transaction).await?;
        self.ledger.await_confirmation(&signature).await?;

        Ok(Attempt::Sent { amount, signature })
    }

    /// Send `top_up` lamports from the funding wallet and wait for confirmation
    async fn top_up(&self, funding: &WalletRecord, recipient: &Pubkey) -> LedgerResult<Signature> {
        let blockhash = self.ledger.latest_blockhash().await?;
        let ixs = instructions::sol_transfer(&funding.address(), recipient, self.settings.top_up);
        let transaction = instructions::sign(&ixs, funding.keypair(), blockhash);

        let signature = self.ledger.submit(&transaction).await?;
        self.ledger.await_confirmation(&signature).await?;
        debug!("Top-up {} confirmed", signature);
        Ok(signature)
    }

    async fn needs_top_up(&self, source: &Pubkey, rent_minimum: u64) -> bool {
        let reserve = match self.ledger.balance(source).await {
            Ok(lamports) => lamports,
            Err(e) => {
                // Leave it to the rent retry
                debug!("Cannot read fee reserve of {}: {}", source, e);
                return false;
            }
        };

        reserve < self.settings.min_fee_reserve
            || (self.settings.rent_match_epsilon > 0
                && reserve.abs_diff(rent_minimum) < self.settings.rent_match_epsilon)
    }

    async fn asset_balance(&self, asset: Asset, owner: &Pubkey) -> LedgerResult<u64> {
        match asset {
            Asset::Sol => self.ledger.balance(owner).await,
            Asset::Token { mint, .. } => Ok(self.ledger.token_balance(owner, &mint).await?.raw),
        }
    }

    async fn funding_balance(&self, funding: &Pubkey) -> Option<u64> {
        match self.ledger.balance(funding).await {
            Ok(lamports) => Some(lamports),
            Err(e) => {
                warn!("Funding balance unavailable: {}", e);
                None
            }
        }
    }

    /// Rent-exempt minimum for a plain system account
    pub async fn rent_minimum(&self) -> u64 {
        self.ledger
            .rent_exempt_minimum(0)
            .await
            .unwrap_or_else(|e| {
                warn!("Rent minimum unavailable ({}), using {}", e, DEFAULT_RENT_MINIMUM);
                DEFAULT_RENT_MINIMUM
            })
    }
}

fn to_raw(asset: Asset, ui: f64) -> Result<u64> {
    match asset {
        Asset::Sol => sol_to_lamports(ui),
        Asset::Token { decimals, .. } => to_raw_units(ui, decimals),
    }
}

fn report(position: usize, total: usize, entry: &TransferPlan, asset: Asset, outcome: &TransferOutcome) {
    let wallet = short_address(&outcome.wallet);
    match &outcome.status {
        OutcomeStatus::Success => info!(
            "[{}/{}] {} -> {}: sent {} ({})",
            position,
            total,
            wallet,
            short_address(&entry.destination),
            asset.format(outcome.amount_moved),
            outcome.signature.map(|s| s.to_string()).unwrap_or_default()
        ),
        OutcomeStatus::Skipped(_) => {
            info!("[{}/{}] {}: no balance, skipped", position, total, wallet)
        }
        OutcomeStatus::Failed(reason) => {
            warn!("[{}/{}] {}: failed, {}", position, total, wallet, reason)
        }
    }
}
