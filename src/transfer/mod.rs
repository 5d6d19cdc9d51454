//! SOL and SPL token transfers
//!
//! ```text
//! BatchJob --prepare--> PreparedBatch --run--> BatchSummary
//!                             |
//!                      TransferPlan (one per wallet)
//! ```
//!
//! Every state-changing command, including the one-off `send-token`, goes
//! through [`BatchRunner`].

pub mod batch;
pub mod instructions;
pub mod job;
pub mod types;

pub use batch::{BatchRunner, BatchSettings, PreparedBatch, DEFAULT_FEE_LAMPORTS};
pub use instructions::{lamports_to_sol, sol_to_lamports};
pub use job::{AmountMode, AssetKind, BatchJob, Direction};
pub use types::{
    Amount, Asset, BatchSummary, FailureReason, OutcomeStatus, SkipReason, TransferOutcome,
    TransferPlan,
};
