use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

use super::traits::{CreditLedger, ExpenseStore};
use crate::domain::{ExpenseRecord, LedgerError, RecordId, StoreError};

/// One movement on an [`InMemoryLedger`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerEntry {
    Debit { user_id: String, amount: u32 },
    Credit { user_id: String, amount: u32 },
}

/// Credit ledger backed by a map of balances.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    balances: Mutex<HashMap<String, u32>>,
    journal: Mutex<Vec<LedgerEntry>>,
    unavailable: Mutex<bool>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_balance(user_id: impl Into<String>, balance: u32) -> Self {
        let ledger = Self::new();
        ledger.set_balance(user_id, balance);
        ledger
    }

    pub fn set_balance(&self, user_id: impl Into<String>, balance: u32) {
        self.balances.lock().insert(user_id.into(), balance);
    }

    pub fn balance(&self, user_id: &str) -> Option<u32> {
        self.balances.lock().get(user_id).copied()
    }

    /// Makes every later call fail with [`LedgerError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.lock() = unavailable;
    }

    pub fn journal(&self) -> Vec<LedgerEntry> {
        self.journal.lock().clone()
    }

    pub fn debited(&self, user_id: &str) -> u32 {
        self.sum(user_id, true)
    }

    pub fn credited(&self, user_id: &str) -> u32 {
        self.sum(user_id, false)
    }

    fn sum(&self, user_id: &str, debits: bool) -> u32 {
        self.journal
            .lock()
            .iter()
            .filter_map(|entry| match entry {
                LedgerEntry::Debit { user_id: u, amount } if debits && u == user_id => {
                    Some(*amount)
                }
                LedgerEntry::Credit { user_id: u, amount } if !debits && u == user_id => {
                    Some(*amount)
                }
                _ => None,
            })
            .sum()
    }

    fn check_available(&self) -> Result<(), LedgerError> {
        if *self.unavailable.lock() {
            return Err(LedgerError::Unavailable("ledger offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl CreditLedger for InMemoryLedger {
    async fn debit(&self, user_id: &str, amount: u32) -> Result<(), LedgerError> {
        self.check_available()?;
        let mut balances = self.balances.lock();
        let balance = balances
            .get_mut(user_id)
            .ok_or_else(|| LedgerError::UnknownAccount(user_id.to_string()))?;
        if *balance < amount {
            return Err(LedgerError::InsufficientCredits {
                required: amount,
                available: *balance,
            });
        }
        *balance -= amount;
        self.journal.lock().push(LedgerEntry::Debit {
            user_id: user_id.to_string(),
            amount,
        });
        Ok(())
    }

    async fn credit(&self, user_id: &str, amount: u32) -> Result<(), LedgerError> {
        self.check_available()?;
        let mut balances = self.balances.lock();
        let balance = balances
            .get_mut(user_id)
            .ok_or_else(|| LedgerError::UnknownAccount(user_id.to_string()))?;
        *balance = balance.saturating_add(amount);
        self.journal.lock().push(LedgerEntry::Credit {
            user_id: user_id.to_string(),
            amount,
        });
        Ok(())
    }
}

/// Expense store keeping records in insertion order.
#[derive(Debug, Default)]
pub struct InMemoryExpenseStore {
    records: Mutex<Vec<(RecordId, ExpenseRecord)>>,
    /// Number of saves that succeed before every later one fails.
    fail_after: Mutex<Option<usize>>,
}

impl InMemoryExpenseStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_after(&self, successes: Option<usize>) {
        *self.fail_after.lock() = successes;
    }

    pub fn records(&self) -> Vec<ExpenseRecord> {
        self.records
            .lock()
            .iter()
            .map(|(_, record)| record.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ExpenseStore for InMemoryExpenseStore {
    async fn save(&self, record: &ExpenseRecord) -> Result<RecordId, StoreError> {
        let mut records = self.records.lock();
        if let Some(limit) = *self.fail_after.lock()
            && records.len() >= limit
        {
            return Err(StoreError::Unavailable("expense store offline".into()));
        }
        let id = uuid::Uuid::new_v4().to_string();
        records.push((id.clone(), record.clone()));
        Ok(id)
    }
}
