//! Transfer instruction building
//!
//! SOL moves are a single system transfer. Token moves create the
//! recipient's associated token account idempotently, then `transfer_checked`
//! between the two ATAs, so the instruction list is valid whether or not the
//! recipient has held the mint before.

use solana_sdk::{
    hash::Hash, instruction::Instruction, message::Message, pubkey::Pubkey, signature::Keypair,
    signer::Signer, system_instruction, transaction::Transaction,
};
use spl_associated_token_account::instruction::create_associated_token_account_idempotent;

use crate::error::{Error, Result};

pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// Convert SOL to lamports
pub fn sol_to_lamports(sol: f64) -> Result<u64> {
    scale_to_raw(sol, LAMPORTS_PER_SOL as f64)
}

/// Convert lamports to SOL
pub fn lamports_to_sol(lamports: u64) -> f64 {
    lamports as f64 / LAMPORTS_PER_SOL as f64
}

/// Convert a whole-token amount to base units
pub fn to_raw_units(amount: f64, decimals: u8) -> Result<u64> {
    scale_to_raw(amount, 10f64.powi(decimals as i32))
}

/// Scale and round, rejecting values a `u64` cannot hold
fn scale_to_raw(amount: f64, scale: f64) -> Result<u64> {
    let raw = (amount * scale).round();
    // u64::MAX as f64 rounds up to 2^64, the first value out of range
    if !raw.is_finite() || raw < 0.0 || raw >= u64::MAX as f64 {
        return Err(Error::InvalidAmount(format!("{} is out of range", amount)));
    }
    Ok(raw as u64)
}

/// Convert base units to whole tokens
pub fn from_raw_units(raw: u64, decimals: u8) -> f64 {
    raw as f64 / 10f64.powi(decimals as i32)
}

/// Derive associated token account address
pub fn derive_ata(wallet: &Pubkey, mint: &Pubkey) -> Pubkey {
    spl_associated_token_account::get_associated_token_address(wallet, mint)
}

pub fn sol_transfer(from: &Pubkey, to: &Pubkey, lamports: u64) -> Vec<Instruction> {
    vec![system_instruction::transfer(from, to, lamports)]
}

/// Instructions moving `amount` base units of `mint` from `owner` to `recipient`
///
/// `owner` also pays for the recipient ATA when it has to be created.
pub fn token_transfer(
    owner: &Pubkey,
    recipient: &Pubkey,
    mint: &Pubkey,
    amount: u64,
    decimals: u8,
) -> Result<Vec<Instruction>> {
    let source_ata = derive_ata(owner, mint);
    let dest_ata = derive_ata(recipient, mint);

    let create_ata =
        create_associated_token_account_idempotent(owner, recipient, mint, &spl_token::id());

    let transfer = spl_token::instruction::transfer_checked(
        &spl_token::id(),
        &source_ata,
        mint,
        &dest_ata,
        owner,
        &[],
        amount,
        decimals,
    )
    .map_err(|e| Error::TransactionBuild(format!("transfer_checked: {}", e)))?;

    Ok(vec![create_ata, transfer])
}

/// Unsigned message, used for fee estimation
pub fn message(instructions: &[Instruction], payer: &Pubkey, blockhash: Hash) -> Message {
    Message::new_with_blockhash(instructions, Some(payer), &blockhash)
}

/// Sign with the payer as the only signer
pub fn sign(instructions: &[Instruction], payer: &Keypair, blockhash: Hash) -> Transaction {
    Transaction::new_signed_with_payer(instructions, Some(&payer.pubkey()), &[payer], blockhash)
}
