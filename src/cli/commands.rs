//! CLI command implementations

use anyhow::{Context, Result};
use dialoguer::{Confirm, Password};
use solana_sdk::pubkey::Pubkey;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::checker::{TokenChecker, TokenRegistry, WalletReport};
use crate::config::Config;
use crate::ledger::{Ledger, RpcLedger};
use crate::transfer::instructions::{from_raw_units, to_raw_units};
use crate::transfer::{
    lamports_to_sol, Amount, AmountMode, Asset, AssetKind, BatchJob, BatchRunner, BatchSettings,
    BatchSummary, Direction, OutcomeStatus, PreparedBatch,
};
use crate::wallet::{keygen, short_address, store, MnemonicConverter, WalletRecord};

/// Flags shared by every state-changing command
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Skip the confirmation prompt
    pub yes: bool,
    /// Print the plan and stop
    pub dry_run: bool,
}

/// `--amount X` or `--all`
pub fn amount_mode(amount: Option<f64>, all: bool) -> Result<AmountMode> {
    match (amount, all) {
        (Some(_), true) => anyhow::bail!("--amount and --all cannot be combined"),
        (Some(value), false) => Ok(AmountMode::Fixed(value)),
        (None, true) => Ok(AmountMode::All),
        (None, false) => anyhow::bail!("either --amount or --all is required"),
    }
}

fn parse_pubkey(value: &str, what: &str) -> Result<Pubkey> {
    Pubkey::from_str(value.trim()).map_err(|e| anyhow::anyhow!("Invalid {} '{}': {}", what, value, e))
}

fn connect(config: &Config) -> Arc<dyn Ledger> {
    let ledger = RpcLedger::new(&config.rpc);
    info!("Connected to {}", ledger.url());
    Arc::new(ledger)
}

fn confirm(options: RunOptions, prompt: &str) -> Result<bool> {
    if options.yes {
        return Ok(true);
    }

    let confirmed = Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()?;

    if !confirmed {
        info!("Cancelled by user");
    }
    Ok(confirmed)
}

/// Generate new wallets and append them to the new-wallets file
pub async fn keygen(config: &Config, count: usize) -> Result<()> {
    if count == 0 {
        anyhow::bail!("count must be at least 1");
    }

    let path = &config.files.new_wallets;
    let records = keygen::generate_into(path, count)
        .with_context(|| format!("Failed to save wallets to {}", path.display()))?;

    println!("\n=== NEW WALLETS ===\n");
    for (i, record) in records.iter().enumerate() {
        println!("Wallet {}", i + 1);
        println!("  Address     : {}", record.address());
        println!("  Private Key : {}", record.secret_base58());
    }
    println!(
        "\nSaved to {} as <address>:<privatekey>",
        path.display()
    );

    Ok(())
}

/// Convert the mnemonics file into `address:secret` lines
pub async fn convert_mnemonics(config: &Config) -> Result<()> {
    let converter = MnemonicConverter::new(&config.files.mnemonics, &config.files.converted);
    let summary = converter
        .convert()
        .with_context(|| format!("Cannot convert {}", config.files.mnemonics.display()))?;

    println!("\n=== CONVERSION SUMMARY ===\n");
    println!("Converted             : {}", summary.converted);
    println!("Skipped (already have): {}", summary.skipped);
    println!("Failed                : {}", summary.failed);
    println!(
        "Wallets in {}: {}",
        config.files.converted.display(),
        summary.total_in_output
    );
    println!(
        "Mnemonics left in {}: {}",
        config.files.mnemonics.display(),
        summary.remaining
    );

    Ok(())
}

/// Send a fixed amount of SOL from the funding wallet to every pool wallet
pub async fn distribute_sol(config: &Config, amount: f64, options: RunOptions) -> Result<()> {
    let job = batch_job(config, Direction::Distribute, AssetKind::Sol, AmountMode::Fixed(amount));
    run_batch(config, &job, "DISTRIBUTE SOL TO POOL WALLETS", options).await
}

/// Sweep all SOL from every pool wallet back to the funding wallet
pub async fn collect_sol(config: &Config, options: RunOptions) -> Result<()> {
    let job = batch_job(config, Direction::Collect, AssetKind::Sol, AmountMode::All);
    run_batch(config, &job, "COLLECT SOL TO MAIN WALLET", options).await
}

pub async fn distribute_token(
    config: &Config,
    mint: &str,
    amount: AmountMode,
    options: RunOptions,
) -> Result<()> {
    let mint = parse_pubkey(mint, "mint")?;
    let job = batch_job(config, Direction::Distribute, AssetKind::Token(mint), amount);
    run_batch(config, &job, "DISTRIBUTE TOKEN TO POOL WALLETS", options).await
}

pub async fn collect_token(
    config: &Config,
    mint: &str,
    amount: AmountMode,
    options: RunOptions,
) -> Result<()> {
    let mint = parse_pubkey(mint, "mint")?;
    let job = batch_job(config, Direction::Collect, AssetKind::Token(mint), amount);
    run_batch(config, &job, "COLLECT TOKEN TO MAIN WALLET", options).await
}

fn batch_job(config: &Config, direction: Direction, asset: AssetKind, amount: AmountMode) -> BatchJob {
    BatchJob {
        funding_wallet: config.files.main_wallet.clone(),
        pool_wallets: config.files.pool_wallets.clone(),
        direction,
        asset,
        amount,
    }
}

async fn run_batch(config: &Config, job: &BatchJob, title: &str, options: RunOptions) -> Result<()> {
    let ledger = connect(config);
    let runner = BatchRunner::new(ledger.clone(), BatchSettings::from_config(&config.batch)?);

    let batch = match runner.prepare(job).await {
        Ok(batch) => batch,
        Err(e) => {
            if e.is_fatal() {
                error!("Batch aborted before any transfer: {}", e);
            }
            return Err(e.into());
        }
    };

    print_plan(title, &batch, &runner, ledger.as_ref()).await;

    if options.dry_run {
        println!("\nDRY-RUN: nothing was sent");
        return Ok(());
    }

    if !confirm(options, &format!("Run {} transfers?", batch.plan.len()))? {
        return Ok(());
    }

    let summary = runner.run(&batch).await;
    print_summary(&summary);
    Ok(())
}

async fn print_plan(title: &str, batch: &PreparedBatch, runner: &BatchRunner, ledger: &dyn Ledger) {
    let funding = batch.funding.address();

    println!("\n=== {} ===\n", title);
    println!("Total wallets  : {}", batch.plan.len());
    println!("Amount each    : {}", describe_amount(batch));
    if let Asset::Token { mint, decimals } = batch.asset {
        println!("Mint           : {} ({} decimals)", mint, decimals);
    }
    println!("Main wallet    : {}", funding);
    match ledger.balance(&funding).await {
        Ok(lamports) => println!("Main balance   : {:.9} SOL", lamports_to_sol(lamports)),
        Err(e) => println!("Main balance   : unavailable ({})", e),
    }
    println!(
        "Rent minimum   : {:.9} SOL",
        lamports_to_sol(runner.rent_minimum().await)
    );
    println!(
        "Fee top-up     : {:.9} SOL below {:.9} SOL",
        lamports_to_sol(runner.settings().top_up),
        lamports_to_sol(runner.settings().min_fee_reserve)
    );
}

fn describe_amount(batch: &PreparedBatch) -> String {
    match batch.plan.first().map(|p| p.amount) {
        Some(Amount::Fixed(raw)) => batch.asset.format(raw),
        Some(Amount::AllRemaining) => "all remaining".to_string(),
        None => "-".to_string(),
    }
}

fn print_summary(summary: &BatchSummary) {
    let failures: Vec<_> = summary
        .outcomes
        .iter()
        .filter_map(|o| match &o.status {
            OutcomeStatus::Failed(reason) => Some((o.wallet, reason)),
            _ => None,
        })
        .collect();

    if !failures.is_empty() {
        println!("\n=== FAILED ===\n");
        for (wallet, reason) in failures {
            println!("{}  {}", wallet, reason);
        }
    }

    println!("\n=== SUMMARY ===\n");
    println!("{}", summary);
}

/// One-off token transfer from a key given on the command line or prompted for
pub async fn send_token(
    config: &Config,
    mint: &str,
    to: &str,
    amount: AmountMode,
    secret: Option<String>,
    options: RunOptions,
) -> Result<()> {
    let mint = parse_pubkey(mint, "mint")?;
    let recipient = parse_pubkey(to, "recipient")?;

    let secret = match secret {
        Some(secret) => secret,
        None => Password::new()
            .with_prompt("Sender private key (base58)")
            .interact()?,
    };
    let sender = WalletRecord::from_secret(&secret).context("Invalid sender private key")?;
    if sender.address() == recipient {
        anyhow::bail!("Sender and recipient are the same wallet");
    }

    let ledger = connect(config);
    let decimals = ledger
        .mint_decimals(&mint)
        .await
        .with_context(|| format!("Cannot read mint {}", mint))?;
    let held = ledger
        .token_balance(&sender.address(), &mint)
        .await
        .context("Cannot read sender token balance")?
        .raw;

    let amount = match amount {
        AmountMode::All => Amount::AllRemaining,
        AmountMode::Fixed(ui) if !ui.is_finite() || ui <= 0.0 => {
            anyhow::bail!("Amount must be positive, got {}", ui)
        }
        AmountMode::Fixed(ui) => Amount::Fixed(to_raw_units(ui, decimals)?),
    };

    if let Amount::Fixed(raw) = amount {
        if raw > held {
            return Err(crate::error::Error::InsufficientBalance {
                available: from_raw_units(held, decimals),
                required: from_raw_units(raw, decimals),
            }
            .into());
        }
    }

    let asset = Asset::Token { mint, decimals };
    println!("\n=== SEND TOKEN ===\n");
    println!("From     : {}", sender.address());
    println!("To       : {}", recipient);
    println!("Mint     : {}", mint);
    println!("Balance  : {}", asset.format(held));
    println!(
        "Sending  : {}",
        match amount {
            Amount::Fixed(raw) => asset.format(raw),
            Amount::AllRemaining => asset.format(held),
        }
    );

    if options.dry_run {
        println!("\nDRY-RUN: nothing was sent");
        return Ok(());
    }
    if !confirm(options, "Send this transfer?")? {
        return Ok(());
    }

    let runner = BatchRunner::new(ledger, BatchSettings::from_config(&config.batch)?);
    let batch = PreparedBatch::single(sender, recipient, asset, amount);
    let summary = runner.run(&batch).await;

    match summary.outcomes.first() {
        Some(outcome) if outcome.is_success() => {
            println!("\nSent {}", asset.format(outcome.amount_moved));
            if let Some(signature) = outcome.signature {
                println!("Signature: {}", signature);
                println!("View on Solscan: https://solscan.io/tx/{}", signature);
            }
            Ok(())
        }
        Some(outcome) => match &outcome.status {
            OutcomeStatus::Failed(reason) => anyhow::bail!("Transfer failed: {}", reason),
            _ => {
                println!("\nNothing to send");
                Ok(())
            }
        },
        None => Ok(()),
    }
}

/// Print SOL and token balances for a wallet file or a single address
pub async fn check_tokens(config: &Config, target: &str) -> Result<()> {
    let addresses = if target.ends_with(".txt") {
        let addresses = store::read_addresses(Path::new(target))
            .with_context(|| format!("Cannot read {}", target))?;
        println!("\nFound {} wallets in {}", addresses.len(), target);
        addresses
    } else {
        vec![parse_pubkey(target, "wallet address")?]
    };

    if addresses.is_empty() {
        warn!("No valid wallets to check");
        return Ok(());
    }

    let ledger = connect(config);
    let registry = TokenRegistry::fetch(&config.tokens.list_url).await;
    let checker = TokenChecker::new(ledger, registry, &config.tokens);
    let pause = Duration::from_millis(config.batch.throttle_delay_ms);

    for (i, address) in addresses.iter().enumerate() {
        if i > 0 {
            tokio::time::sleep(pause).await;
        }

        println!(
            "\nWallet {} [{}/{}]",
            address,
            i + 1,
            addresses.len()
        );
        match checker.check(address).await {
            Ok(report) => print_report(&report),
            Err(e) => println!("  Error checking {}: {}", short_address(address), e),
        }
    }

    Ok(())
}

fn print_report(report: &WalletReport) {
    println!("  SOL Balance : {} SOL", lamports_to_sol(report.lamports));

    if report.tokens.is_empty() {
        println!("  No SPL tokens found.");
        return;
    }

    for (i, line) in report.tokens.iter().enumerate() {
        println!("  Token #{}", i + 1);
        println!("    Name         : {} ({})", line.info.name, line.info.symbol);
        println!("    Mint Address : {}", line.holding.mint);
        println!("    Amount       : {}", line.holding.amount.ui_amount());
        println!("    Decimals     : {}", line.holding.amount.decimals);
    }
}

/// Show current configuration (secrets masked)
pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", config.masked_display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amount_mode() {
        assert_eq!(amount_mode(Some(1.5), false).unwrap(), AmountMode::Fixed(1.5));
        assert_eq!(amount_mode(None, true).unwrap(), AmountMode::All);
        assert!(amount_mode(Some(1.0), true).is_err());
        assert!(amount_mode(None, false).is_err());
    }

    #[test]
    fn test_parse_pubkey() {
        let key = Pubkey::new_unique();
        assert_eq!(parse_pubkey(&format!(" {} ", key), "mint").unwrap(), key);
        assert!(parse_pubkey("not-a-key", "mint").is_err());
    }

    #[tokio::test]
    async fn test_keygen_writes_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        config.files.new_wallets = dir.path().join("wallet-baru.txt");

        keygen(&config, 3).await.unwrap();
        assert_eq!(store::load(&config.files.new_wallets).unwrap().len(), 3);
        assert!(keygen(&config, 0).await.is_err());
    }
}
