use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::vault::CredentialRef;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AccountId(pub u32);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountType {
    Checking,
    Savings,
    Credit,
}

impl AccountType {
    pub fn label(&self) -> &'static str {
        match self {
            AccountType::Checking => "Checking Account",
            AccountType::Savings => "Savings Account",
            AccountType::Credit => "Credit Card",
        }
    }
}

/// Advisory scheduling hint: how often the scheduler should sync the account.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncInterval {
    Daily,
    Weekly,
    Monthly,
}

impl SyncInterval {
    pub fn duration(&self) -> Duration {
        match self {
            SyncInterval::Daily => Duration::days(1),
            SyncInterval::Weekly => Duration::days(7),
            SyncInterval::Monthly => Duration::days(30),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SyncInterval::Daily => "daily",
            SyncInterval::Weekly => "weekly",
            SyncInterval::Monthly => "monthly",
        }
    }
}

/// Whether the stored credentials are currently believed valid against the
/// external bank.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
    Error,
}

/// Whether a fetch/import cycle is currently executing for the account.
/// Not persisted: a restarted process cannot resume a half-done fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncState {
    #[default]
    Idle,
    Syncing,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    pub import_pending: bool,
    pub date_range_days: u32,
    pub import_categories: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            import_pending: false,
            date_range_days: 30,
            import_categories: true,
        }
    }
}

impl SyncSettings {
    pub fn apply(&mut self, patch: SyncSettingsPatch) {
        if let Some(import_pending) = patch.import_pending {
            self.import_pending = import_pending;
        }
        if let Some(date_range_days) = patch.date_range_days {
            self.date_range_days = date_range_days;
        }
        if let Some(import_categories) = patch.import_categories {
            self.import_categories = import_categories;
        }
    }
}

/// Field-wise update for [`SyncSettings`]; unset fields keep their value.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncSettingsPatch {
    pub import_pending: Option<bool>,
    pub date_range_days: Option<u32>,
    pub import_categories: Option<bool>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct BankAccount {
    pub id: AccountId,
    pub bank_name: String,
    pub account_name: String,
    pub account_number_masked: String,
    pub account_type: AccountType,
    pub sync_interval: SyncInterval,
    pub connection_state: ConnectionState,
    #[serde(skip)]
    pub sync_state: SyncState,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub credential_ref: CredentialRef,
    pub sync_settings: SyncSettings,
}
