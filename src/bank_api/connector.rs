use async_trait::async_trait;
use thiserror::Error;

use crate::db::{AccountId, Credentials, RawTransaction};

/// What a connector needs to know about an account to fetch for it.
/// Deliberately detached from the registry record so a connector can never
/// observe or mutate registry state.
#[derive(Debug, Clone)]
pub struct AccountHandle {
    pub id: AccountId,
    pub bank_name: String,
    pub account_number_masked: String,
}

#[derive(Debug, Error)]
pub enum ConnectorError {
    /// The bank rejected the credentials. Terminal for this attempt; the
    /// user has to supply new ones.
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),
    /// The bank couldn't be reached or timed out. Retryable.
    #[error("bank service unavailable: {0}")]
    Unavailable(String),
}

impl ConnectorError {
    pub fn is_authentication(&self) -> bool {
        matches!(self, ConnectorError::InvalidCredentials(_))
    }
}

/// Abstraction over the external bank: test whether credentials are valid,
/// and fetch recent transactions given valid credentials. One
/// implementation is the deterministic mock; a real one would wrap
/// whatever protocol a bank-aggregation provider requires.
#[async_trait]
pub trait BankConnector: Send + Sync {
    async fn test_connection(&self, credentials: &Credentials) -> Result<(), ConnectorError>;

    /// Recent transactions for `account`, limited to the last
    /// `window_days` days.
    async fn fetch_transactions(
        &self,
        account: &AccountHandle,
        credentials: &Credentials,
        window_days: u32,
    ) -> Result<Vec<RawTransaction>, ConnectorError>;
}
