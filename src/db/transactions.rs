use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::account::AccountId;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(pub u64);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn-{}", self.0)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionKind {
    Expense,
    Income,
}

/// A transaction as reported by the bank connector. Untrusted external
/// input: it has no ledger id yet and may repeat rows already imported on
/// an earlier sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTransaction {
    pub account_id: AccountId,
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub category: Option<String>,
    pub description: String,
    pub occurred_on: NaiveDate,
    pub pending: bool,
}

impl RawTransaction {
    pub fn dedup_key(&self) -> DedupKey {
        DedupKey::of(self.account_id, self.occurred_on, self.amount, &self.description)
    }
}

/// Deterministic fingerprint of a transaction's account, date, amount and
/// description, used to detect re-imports across syncs.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey(String);

impl DedupKey {
    pub fn of(
        account_id: AccountId,
        occurred_on: NaiveDate,
        amount: Decimal,
        description: &str,
    ) -> Self {
        // Unit-separator bytes between fields so adjacent fields can't
        // collide by concatenation.
        let mut hasher = Sha256::new();
        hasher.update(account_id.0.to_le_bytes());
        hasher.update([0x1f]);
        hasher.update(occurred_on.to_string().as_bytes());
        hasher.update([0x1f]);
        hasher.update(amount.normalize().to_string().as_bytes());
        hasher.update([0x1f]);
        hasher.update(description.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A [`RawTransaction`] accepted by the import pipeline. Created once per
/// import, handed to the ledger, never mutated after commit.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ImportedTransaction {
    pub account_id: AccountId,
    pub kind: TransactionKind,
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,
    pub category: String,
    pub description: String,
    pub occurred_on: NaiveDate,
    pub dedup_key: DedupKey,
    pub imported_at: DateTime<Utc>,
}
