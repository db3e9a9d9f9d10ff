use serde::{Deserialize, Serialize};

use super::account::BankAccount;
use super::transactions::{ImportedTransaction, TransactionId};
use super::vault::VaultEntry;

/// Versioned envelope around the on-disk database format.
#[derive(Serialize, Deserialize)]
#[cfg_attr(test, derive(PartialEq, Debug))]
pub enum Database {
    V1(DatabaseV1),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DatabaseV1 {
    pub next_account_id: u32,
    pub accounts: Vec<BankAccount>,
    pub next_credential_ref: u64,
    pub credentials: Vec<VaultEntry>,
    pub next_transaction_id: u64,
    pub transactions: Vec<(TransactionId, ImportedTransaction)>,
}

impl DatabaseV1 {
    pub fn new() -> Self {
        Self {
            next_account_id: 1,
            accounts: vec![],
            next_credential_ref: 1,
            credentials: vec![],
            next_transaction_id: 1,
            transactions: vec![],
        }
    }
}

impl Default for DatabaseV1 {
    fn default() -> Self {
        Self::new()
    }
}
