//! Tuyul Tools - Solana wallet pool toolkit
//!
//! # WARNING
//! - Wallet files hold private keys in plain text. Keep them `chmod 600`.
//! - Every batch command moves real funds once confirmed.

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

use tuyul_tools::cli::{amount_mode, commands, RunOptions};
use tuyul_tools::config::Config;

/// Tuyul Tools - manage a pool of Solana wallets
#[derive(Parser)]
#[command(name = "tuyul")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Confirmation flags for state-changing commands
#[derive(Args, Clone, Copy)]
struct BatchFlags {
    /// Skip the confirmation prompt
    #[arg(short, long)]
    yes: bool,

    /// Print the plan without sending anything
    #[arg(long)]
    dry_run: bool,
}

impl From<BatchFlags> for RunOptions {
    fn from(flags: BatchFlags) -> Self {
        RunOptions {
            yes: flags.yes,
            dry_run: flags.dry_run,
        }
    }
}

/// `--amount X | --all`
#[derive(Args, Clone, Copy)]
struct AmountArgs {
    /// Amount per wallet in whole tokens
    #[arg(long, conflicts_with = "all", required_unless_present = "all")]
    amount: Option<f64>,

    /// Move the whole balance
    #[arg(long)]
    all: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate new wallets and append them to the new-wallets file
    Keygen {
        /// Number of wallets to create
        #[arg(short = 'n', long, default_value = "1")]
        count: usize,
    },

    /// Convert mnemonic phrases into address:privatekey lines
    ConvertMnemonics,

    /// Send a fixed amount of SOL from the main wallet to every pool wallet
    DistributeSol {
        /// SOL per wallet
        #[arg(long)]
        amount: f64,

        #[command(flatten)]
        flags: BatchFlags,
    },

    /// Sweep all SOL from the pool wallets into the main wallet
    CollectSol {
        #[command(flatten)]
        flags: BatchFlags,
    },

    /// Show SOL and SPL token balances for a wallet file (.txt) or an address
    CheckTokens {
        /// Wallet file or single address
        target: String,
    },

    /// Send an SPL token from the main wallet to every pool wallet
    DistributeToken {
        /// Token mint address
        #[arg(long)]
        mint: String,

        #[command(flatten)]
        amount: AmountArgs,

        #[command(flatten)]
        flags: BatchFlags,
    },

    /// Move an SPL token from every pool wallet into the main wallet
    CollectToken {
        /// Token mint address
        #[arg(long)]
        mint: String,

        #[command(flatten)]
        amount: AmountArgs,

        #[command(flatten)]
        flags: BatchFlags,
    },

    /// Send an SPL token from any wallet to one address
    SendToken {
        /// Token mint address
        #[arg(long)]
        mint: String,

        /// Recipient wallet address
        #[arg(long)]
        to: String,

        #[command(flatten)]
        amount: AmountArgs,

        /// Sender private key (base58); prompted for when omitted
        #[arg(long, env = "TUYUL_SENDER_KEY", hide_env_values = true)]
        secret: Option<String>,

        #[command(flatten)]
        flags: BatchFlags,
    },

    /// Show current configuration (secrets masked)
    Config,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("tuyul_tools=info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Parse CLI arguments
    let cli = Cli::parse();

    init_tracing(cli.json_logs);

    // Load configuration
    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    // Execute command
    let result = match cli.command {
        Commands::Keygen { count } => commands::keygen(&config, count).await,
        Commands::ConvertMnemonics => commands::convert_mnemonics(&config).await,
        Commands::DistributeSol { amount, flags } => {
            commands::distribute_sol(&config, amount, flags.into()).await
        }
        Commands::CollectSol { flags } => commands::collect_sol(&config, flags.into()).await,
        Commands::CheckTokens { target } => commands::check_tokens(&config, &target).await,
        Commands::DistributeToken {
            mint,
            amount,
            flags,
        } => match amount_mode(amount.amount, amount.all) {
            Ok(mode) => commands::distribute_token(&config, &mint, mode, flags.into()).await,
            Err(e) => Err(e),
        },
        Commands::CollectToken {
            mint,
            amount,
            flags,
        } => match amount_mode(amount.amount, amount.all) {
            Ok(mode) => commands::collect_token(&config, &mint, mode, flags.into()).await,
            Err(e) => Err(e),
        },
        Commands::SendToken {
            mint,
            to,
            amount,
            secret,
            flags,
        } => match amount_mode(amount.amount, amount.all) {
            Ok(mode) => {
                commands::send_token(&config, &mint, &to, mode, secret, flags.into()).await
            }
            Err(e) => Err(e),
        },
        Commands::Config => commands::show_config(&config),
    };

    if let Err(e) = result {
        error!("Command failed: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}
