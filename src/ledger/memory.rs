//! In-memory ledger for tests
//!
//! Applies system transfers and SPL `transfer_checked` instructions to a
//! balance map, charges a flat fee to the fee payer, and records every
//! accepted transfer in order. Failures can be scripted per fee payer.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use solana_sdk::{
    hash::Hash, message::Message, pubkey::Pubkey, signature::Signature,
    system_instruction::SystemInstruction, system_program, transaction::Transaction,
};
use spl_associated_token_account::get_associated_token_address;
use spl_token::instruction::TokenInstruction;

use super::{Ledger, LedgerError, LedgerResult, TokenAmount, TokenHolding};

pub const TEST_FEE: u64 = 5_000;
pub const TEST_RENT_MINIMUM: u64 = 890_880;

/// A transfer the ledger accepted
#[derive(Debug, Clone, PartialEq)]
pub struct Recorded {
    pub from: Pubkey,
    pub to: Pubkey,
    pub amount: u64,
    /// `Some(mint)` for token transfers
    pub mint: Option<Pubkey>,
}

#[derive(Default)]
struct State {
    lamports: HashMap<Pubkey, u64>,
    /// Keyed by associated token account
    tokens: HashMap<Pubkey, u64>,
    mints: HashMap<Pubkey, u8>,
    submit_failures: HashMap<Pubkey, VecDeque<LedgerError>>,
    balance_failures: HashMap<Pubkey, LedgerError>,
    fee_estimate_fails: bool,
    rate_limited_reads: usize,
    balance_reads: usize,
    recorded: Vec<Recorded>,
    submissions: usize,
}

#[derive(Default)]
pub struct MemoryLedger {
    state: Mutex<State>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_balance(&self, address: Pubkey, lamports: u64) {
        self.state.lock().unwrap().lamports.insert(address, lamports);
    }

    pub fn add_mint(&self, mint: Pubkey, decimals: u8) {
        self.state.lock().unwrap().mints.insert(mint, decimals);
    }

    pub fn set_token_balance(&self, owner: Pubkey, mint: Pubkey, raw: u64) {
        let ata = get_associated_token_address(&owner, &mint);
        self.state.lock().unwrap().tokens.insert(ata, raw);
    }

    /// Queue a submission failure for transactions paid by `payer`
    pub fn fail_next_submit(&self, payer: Pubkey, err: LedgerError) {
        self.state
            .lock()
            .unwrap()
            .submit_failures
            .entry(payer)
            .or_default()
            .push_back(err);
    }

    pub fn fail_balance(&self, address: Pubkey, err: LedgerError) {
        self.state
            .lock()
            .unwrap()
            .balance_failures
            .insert(address, err);
    }

    pub fn fail_fee_estimates(&self) {
        self.state.lock().unwrap().fee_estimate_fails = true;
    }

    /// Next `count` balance reads fail with `RateLimited`
    pub fn rate_limit_reads(&self, count: usize) {
        self.state.lock().unwrap().rate_limited_reads = count;
    }

    pub fn lamports(&self, address: &Pubkey) -> u64 {
        self.state
            .lock()
            .unwrap()
            .lamports
            .get(address)
            .copied()
            .unwrap_or(0)
    }

    pub fn tokens(&self, owner: &Pubkey, mint: &Pubkey) -> u64 {
        let ata = get_associated_token_address(owner, mint);
        self.state
            .lock()
            .unwrap()
            .tokens
            .get(&ata)
            .copied()
            .unwrap_or(0)
    }

    pub fn recorded(&self) -> Vec<Recorded> {
        self.state.lock().unwrap().recorded.clone()
    }

    pub fn submissions(&self) -> usize {
        self.state.lock().unwrap().submissions
    }

    pub fn balance_reads(&self) -> usize {
        self.state.lock().unwrap().balance_reads
    }

    fn owner_of_ata(state: &State, ata: &Pubkey, mint: &Pubkey) -> Option<Pubkey> {
        state
            .lamports
            .keys()
            .find(|owner| get_associated_token_address(owner, mint) == *ata)
            .copied()
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn balance(&self, address: &Pubkey) -> LedgerResult<u64> {
        let mut state = self.state.lock().unwrap();
        state.balance_reads += 1;
        if state.rate_limited_reads > 0 {
            state.rate_limited_reads -= 1;
            return Err(LedgerError::RateLimited("429 Too Many Requests".into()));
        }
        if let Some(err) = state.balance_failures.get(address) {
            return Err(err.clone());
        }
        Ok(state.lamports.get(address).copied().unwrap_or(0))
    }

    async fn estimate_fee(&self, _message: &Message) -> LedgerResult<u64> {
        if self.state.lock().unwrap().fee_estimate_fails {
            return Err(LedgerError::Other("fee estimate unavailable".into()));
        }
        Ok(TEST_FEE)
    }

    async fn latest_blockhash(&self) -> LedgerResult<Hash> {
        Ok(Hash::new_unique())
    }

    async fn submit(&self, transaction: &Transaction) -> LedgerResult<Signature> {
        let mut state = self.state.lock().unwrap();
        state.submissions += 1;

        let message = &transaction.message;
        let payer = message.account_keys[0];

        if let Some(err) = state
            .submit_failures
            .get_mut(&payer)
            .and_then(|queue| queue.pop_front())
        {
            return Err(err);
        }

        let mut transfers = Vec::new();
        let mut token_moves = Vec::new();
        for ix in &message.instructions {
            let program = message.account_keys[ix.program_id_index as usize];
            let key = |i: usize| message.account_keys[ix.accounts[i] as usize];

            if program == system_program::id() {
                if let Ok(SystemInstruction::Transfer { lamports }) =
                    bincode::deserialize::<SystemInstruction>(&ix.data)
                {
                    transfers.push(Recorded {
                        from: key(0),
                        to: key(1),
                        amount: lamports,
                        mint: None,
                    });
                }
            } else if program == spl_token::id() {
                if let Ok(TokenInstruction::TransferChecked { amount, .. }) =
                    TokenInstruction::unpack(&ix.data)
                {
                    let (source_ata, mint, dest_ata) = (key(0), key(1), key(2));
                    let held = state.tokens.get(&source_ata).copied().unwrap_or(0);
                    if held < amount {
                        return Err(LedgerError::Other("insufficient token funds".into()));
                    }
                    token_moves.push((source_ata, dest_ata, amount));
                    transfers.push(Recorded {
                        from: key(3),
                        to: Self::owner_of_ata(&state, &dest_ata, &mint).unwrap_or(dest_ata),
                        amount,
                        mint: Some(mint),
                    });
                }
            }
        }

        // Fee plus outgoing lamports must be covered
        let outgoing: u64 = transfers
            .iter()
            .filter(|t| t.mint.is_none() && t.from == payer)
            .map(|t| t.amount)
            .sum();
        let payer_balance = state.lamports.get(&payer).copied().unwrap_or(0);
        if payer_balance == 0 {
            return Err(LedgerError::AccountNotFound(
                "Attempt to debit an account but found no record of a prior credit".into(),
            ));
        }
        if payer_balance < outgoing + TEST_FEE {
            return Err(LedgerError::InsufficientFunds(
                "insufficient funds for rent".into(),
            ));
        }

        *state.lamports.entry(payer).or_insert(0) -= TEST_FEE;
        for t in transfers.iter().filter(|t| t.mint.is_none()) {
            *state.lamports.entry(t.from).or_insert(0) -= t.amount;
            *state.lamports.entry(t.to).or_insert(0) += t.amount;
        }
        for (source, dest, amount) in token_moves {
            *state.tokens.entry(source).or_insert(0) -= amount;
            *state.tokens.entry(dest).or_insert(0) += amount;
        }
        state.recorded.extend(transfers);

        Ok(transaction.signatures[0])
    }

    async fn await_confirmation(&self, _signature: &Signature) -> LedgerResult<()> {
        Ok(())
    }

    async fn rent_exempt_minimum(&self, _data_len: usize) -> LedgerResult<u64> {
        Ok(TEST_RENT_MINIMUM)
    }

    async fn account_exists(&self, address: &Pubkey) -> LedgerResult<bool> {
        Ok(self.state.lock().unwrap().lamports.contains_key(address))
    }

    async fn mint_decimals(&self, mint: &Pubkey) -> LedgerResult<u8> {
        self.state
            .lock()
            .unwrap()
            .mints
            .get(mint)
            .copied()
            .ok_or_else(|| LedgerError::Other(format!("{} is not an SPL mint", mint)))
    }

    async fn token_balance(&self, owner: &Pubkey, mint: &Pubkey) -> LedgerResult<TokenAmount> {
        let decimals = self.mint_decimals(mint).await?;
        Ok(TokenAmount {
            raw: self.tokens(owner, mint),
            decimals,
        })
    }

    async fn token_holdings(&self, owner: &Pubkey) -> LedgerResult<Vec<TokenHolding>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .mints
            .iter()
            .filter_map(|(mint, decimals)| {
                let ata = get_associated_token_address(owner, mint);
                state.tokens.get(&ata).map(|raw| TokenHolding {
                    token_account: ata,
                    mint: *mint,
                    amount: TokenAmount {
                        raw: *raw,
                        decimals: *decimals,
                    },
                })
            })
            .collect())
    }
}
