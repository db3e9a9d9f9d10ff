use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use tokio::sync::Notify;

use crate::db::{Credentials, RawTransaction, TransactionKind};

use super::connector::{AccountHandle, BankConnector, ConnectorError};

/// Deterministic stand-in for a real bank integration. Behavior is fully
/// scripted: tests queue explicit outcomes, and the sample-data mode used
/// by the CLI derives its batch from the calendar date. No randomness
/// anywhere in the connector contract.
pub struct MockBankConnector {
    test_results: Mutex<VecDeque<Result<(), ConnectorError>>>,
    fetch_results: Mutex<VecDeque<Result<Vec<RawTransaction>, ConnectorError>>>,
    fetch_gate: Option<Arc<Notify>>,
    fetch_calls: AtomicUsize,
    sample_data: bool,
}

impl MockBankConnector {
    /// Accepts any non-empty credentials; fetches return nothing unless
    /// outcomes are queued.
    pub fn new() -> Self {
        Self {
            test_results: Mutex::new(VecDeque::new()),
            fetch_results: Mutex::new(VecDeque::new()),
            fetch_gate: None,
            fetch_calls: AtomicUsize::new(0),
            sample_data: false,
        }
    }

    /// Development mode: serves a small batch of recent sample
    /// transactions so the CLI has something to import. The batch is keyed
    /// to the current date, so a same-day re-sync dedups to zero.
    pub fn with_sample_data() -> Self {
        Self {
            sample_data: true,
            ..Self::new()
        }
    }

    /// Every fetch waits for `gate` to be notified before returning, so
    /// tests can hold a sync open and race other operations against it.
    pub fn with_fetch_gate(mut self, gate: Arc<Notify>) -> Self {
        self.fetch_gate = Some(gate);
        self
    }

    pub fn push_test_result(&self, result: Result<(), ConnectorError>) {
        self.test_results.lock().unwrap().push_back(result);
    }

    pub fn push_fetch_result(&self, result: Result<Vec<RawTransaction>, ConnectorError>) {
        self.fetch_results.lock().unwrap().push_back(result);
    }

    pub fn fetch_call_count(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    fn sample_transactions(
        account: &AccountHandle,
        today: NaiveDate,
        window_days: u32,
    ) -> Vec<RawTransaction> {
        let rows = [
            (0i64, TransactionKind::Expense, Decimal::new(4567, 2), Some("Groceries"), "Whole Foods Market", false),
            (1, TransactionKind::Expense, Decimal::new(1250, 2), Some("Transportation"), "Metro Card Reload", false),
            (3, TransactionKind::Income, Decimal::new(215000, 2), Some("Income"), "Payroll Deposit", false),
            (0, TransactionKind::Expense, Decimal::new(575, 2), None, "Corner Coffee", true),
        ];
        rows.into_iter()
            .filter(|(days_ago, ..)| *days_ago < i64::from(window_days))
            .map(|(days_ago, kind, amount, category, description, pending)| RawTransaction {
                account_id: account.id,
                kind,
                amount,
                category: category.map(str::to_string),
                description: description.to_string(),
                occurred_on: today - Duration::days(days_ago),
                pending,
            })
            .collect()
    }
}

impl Default for MockBankConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BankConnector for MockBankConnector {
    async fn test_connection(&self, credentials: &Credentials) -> Result<(), ConnectorError> {
        if let Some(result) = self.test_results.lock().unwrap().pop_front() {
            return result;
        }
        if credentials.username.trim().is_empty() || credentials.password.is_empty() {
            return Err(ConnectorError::InvalidCredentials(
                "username and password are required".to_string(),
            ));
        }
        Ok(())
    }

    async fn fetch_transactions(
        &self,
        account: &AccountHandle,
        _credentials: &Credentials,
        window_days: u32,
    ) -> Result<Vec<RawTransaction>, ConnectorError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.fetch_gate {
            gate.notified().await;
        }
        let queued = self.fetch_results.lock().unwrap().pop_front();
        if let Some(result) = queued {
            return result;
        }
        if self.sample_data {
            let today = Utc::now().date_naive();
            return Ok(Self::sample_transactions(account, today, window_days));
        }
        Ok(vec![])
    }
}
