use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use crate::db::{
    AccountId, AccountType, BankAccount, ConnectionState, CredentialRef, SyncInterval,
    SyncSettings, SyncSettingsPatch, SyncState,
};
use crate::error::{AccountError, SyncFailure};

/// What the service hands the registry to create a record. Credentials
/// have already been vaulted; only the opaque ref travels here.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub bank_name: String,
    pub account_name: String,
    pub account_number_masked: String,
    pub account_type: AccountType,
    pub sync_interval: SyncInterval,
    pub credential_ref: CredentialRef,
}

/// Result of the atomic test-and-set that starts a sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeginSync {
    Started,
    AlreadySyncing,
    NotConnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountSummary {
    pub total: usize,
    pub connected_count: usize,
    pub error_count: usize,
    pub last_sync_at: Option<DateTime<Utc>>,
}

/// Sole owner and mutator of bank account records. Each account sits
/// behind its own lock so unrelated accounts sync concurrently; the outer
/// map lock is held only for lookups, inserts and removals.
pub struct AccountRegistry {
    next_id: AtomicU32,
    accounts: RwLock<HashMap<AccountId, Arc<RwLock<BankAccount>>>>,
}

impl AccountRegistry {
    pub fn new() -> Self {
        Self::restore(1, vec![])
    }

    pub fn restore(next_id: u32, accounts: Vec<BankAccount>) -> Self {
        Self {
            next_id: AtomicU32::new(next_id),
            accounts: RwLock::new(
                accounts
                    .into_iter()
                    .map(|account| (account.id, Arc::new(RwLock::new(account))))
                    .collect(),
            ),
        }
    }

    fn slot(&self, id: AccountId) -> Result<Arc<RwLock<BankAccount>>, AccountError> {
        self.accounts
            .read()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(AccountError::NotFound(id))
    }

    pub fn create(&self, new_account: NewAccount) -> Result<BankAccount, AccountError> {
        if new_account.bank_name.trim().is_empty() {
            return Err(AccountError::Validation("bank name is required".to_string()));
        }
        if new_account.account_name.trim().is_empty() {
            return Err(AccountError::Validation(
                "account name is required".to_string(),
            ));
        }

        let account = BankAccount {
            id: AccountId(self.next_id.fetch_add(1, Ordering::SeqCst)),
            bank_name: new_account.bank_name,
            account_name: new_account.account_name,
            account_number_masked: new_account.account_number_masked,
            account_type: new_account.account_type,
            sync_interval: new_account.sync_interval,
            connection_state: ConnectionState::Disconnected,
            sync_state: SyncState::Idle,
            last_sync_at: None,
            last_error: None,
            credential_ref: new_account.credential_ref,
            sync_settings: SyncSettings::default(),
        };
        self.accounts
            .write()
            .unwrap()
            .insert(account.id, Arc::new(RwLock::new(account.clone())));
        Ok(account)
    }

    pub fn get(&self, id: AccountId) -> Result<BankAccount, AccountError> {
        Ok(self.slot(id)?.read().unwrap().clone())
    }

    pub fn contains(&self, id: AccountId) -> bool {
        self.accounts.read().unwrap().contains_key(&id)
    }

    /// All accounts, sorted by bank name then account name.
    pub fn list_sorted(&self) -> Vec<BankAccount> {
        let mut accounts: Vec<BankAccount> = self
            .accounts
            .read()
            .unwrap()
            .values()
            .map(|slot| slot.read().unwrap().clone())
            .collect();
        accounts.sort_by(|a, b| {
            (a.bank_name.as_str(), a.account_name.as_str(), a.id)
                .cmp(&(b.bank_name.as_str(), b.account_name.as_str(), b.id))
        });
        accounts
    }

    pub fn summary(&self) -> AccountSummary {
        let accounts = self.list_sorted();
        AccountSummary {
            total: accounts.len(),
            connected_count: accounts
                .iter()
                .filter(|a| a.connection_state == ConnectionState::Connected)
                .count(),
            error_count: accounts
                .iter()
                .filter(|a| a.connection_state == ConnectionState::Error)
                .count(),
            last_sync_at: accounts.iter().filter_map(|a| a.last_sync_at).max(),
        }
    }

    pub fn set_connected(&self, id: AccountId) -> Result<(), AccountError> {
        let slot = self.slot(id)?;
        let mut account = slot.write().unwrap();
        account.connection_state = ConnectionState::Connected;
        account.last_error = None;
        Ok(())
    }

    pub fn set_error(&self, id: AccountId, reason: &str) -> Result<(), AccountError> {
        let slot = self.slot(id)?;
        let mut account = slot.write().unwrap();
        account.connection_state = ConnectionState::Error;
        account.last_error = Some(reason.to_string());
        Ok(())
    }

    pub fn update_sync_settings(
        &self,
        id: AccountId,
        patch: SyncSettingsPatch,
    ) -> Result<BankAccount, AccountError> {
        let slot = self.slot(id)?;
        let mut account = slot.write().unwrap();
        account.sync_settings.apply(patch);
        Ok(account.clone())
    }

    pub fn update_sync_interval(
        &self,
        id: AccountId,
        interval: SyncInterval,
    ) -> Result<(), AccountError> {
        let slot = self.slot(id)?;
        slot.write().unwrap().sync_interval = interval;
        Ok(())
    }

    /// Swap the vault handle after a successful credential update; returns
    /// the old ref so the caller can revoke it.
    pub fn update_credential_ref(
        &self,
        id: AccountId,
        new_ref: CredentialRef,
    ) -> Result<CredentialRef, AccountError> {
        let slot = self.slot(id)?;
        let mut account = slot.write().unwrap();
        let old_ref = account.credential_ref;
        account.credential_ref = new_ref;
        Ok(old_ref)
    }

    /// Atomic test-and-set entering the syncing state, under the
    /// account's own write guard. A timer tick racing a manual trigger
    /// means one of them sees `AlreadySyncing`.
    pub fn begin_sync(&self, id: AccountId) -> Result<BeginSync, AccountError> {
        let slot = self.slot(id)?;
        let mut account = slot.write().unwrap();
        if account.sync_state == SyncState::Syncing {
            return Ok(BeginSync::AlreadySyncing);
        }
        if account.connection_state != ConnectionState::Connected {
            return Ok(BeginSync::NotConnected);
        }
        account.sync_state = SyncState::Syncing;
        Ok(BeginSync::Started)
    }

    /// Successful sync: back to idle, `last_sync_at` advances (never
    /// regresses), the last error clears.
    pub fn complete_sync(&self, id: AccountId, now: DateTime<Utc>) -> Result<(), AccountError> {
        let slot = self.slot(id)?;
        let mut account = slot.write().unwrap();
        account.sync_state = SyncState::Idle;
        account.last_sync_at = Some(match account.last_sync_at {
            Some(previous) if previous > now => previous,
            _ => now,
        });
        account.last_error = None;
        Ok(())
    }

    /// Failed sync: back to idle with the failure recorded. Only an
    /// authentication failure demotes the connection state.
    pub fn fail_sync(&self, id: AccountId, failure: &SyncFailure) -> Result<(), AccountError> {
        let slot = self.slot(id)?;
        let mut account = slot.write().unwrap();
        account.sync_state = SyncState::Idle;
        account.last_error = Some(failure.message().to_string());
        if let SyncFailure::Authentication(_) = failure {
            account.connection_state = ConnectionState::Error;
        }
        Ok(())
    }

    pub fn remove(&self, id: AccountId) -> Result<BankAccount, AccountError> {
        let slot = self
            .accounts
            .write()
            .unwrap()
            .remove(&id)
            .ok_or(AccountError::NotFound(id))?;
        let account = slot.read().unwrap().clone();
        Ok(account)
    }

    pub fn snapshot(&self) -> (u32, Vec<BankAccount>) {
        (self.next_id.load(Ordering::SeqCst), self.list_sorted())
    }
}

impl Default for AccountRegistry {
    fn default() -> Self {
        Self::new()
    }
}
