use std::sync::Arc;

use chrono::Utc;

use crate::bank_api::{AccountHandle, BankConnector};
use crate::db::{
    AccountId, AccountType, BankAccount, CredentialVault, Credentials, Ledger, SyncInterval,
    SyncSettingsPatch,
};
use crate::error::{AccountError, SyncFailure, SyncOutcome};

use super::import;
use super::registry::{AccountRegistry, AccountSummary, BeginSync, NewAccount};

/// What the UI submits to add an account.
#[derive(Debug, Clone)]
pub struct CreateAccountRequest {
    pub bank_name: String,
    pub account_name: String,
    pub account_number: Option<String>,
    pub account_type: AccountType,
    pub sync_interval: SyncInterval,
    pub credentials: Credentials,
}

#[derive(Debug, Clone)]
pub struct CreatedAccount {
    pub account: BankAccount,
    /// Outcome of the immediate connection test. Creation succeeds either
    /// way; a failure carries the reason to show the user.
    pub connection: Result<(), String>,
}

/// The facade the UI talks to: account lifecycle, connection testing and
/// sync execution, wired over the registry, vault, connector and ledger.
pub struct SyncService {
    registry: Arc<AccountRegistry>,
    vault: Arc<CredentialVault>,
    connector: Arc<dyn BankConnector>,
    ledger: Arc<dyn Ledger>,
}

impl SyncService {
    pub fn new(
        registry: Arc<AccountRegistry>,
        vault: Arc<CredentialVault>,
        connector: Arc<dyn BankConnector>,
        ledger: Arc<dyn Ledger>,
    ) -> Self {
        Self {
            registry,
            vault,
            connector,
            ledger,
        }
    }

    /// Validate, vault the credentials, create the record, then test the
    /// connection right away. A failed test leaves the account in the
    /// error state but the creation itself stands.
    pub async fn create_account(
        &self,
        request: CreateAccountRequest,
    ) -> Result<CreatedAccount, AccountError> {
        if request.credentials.username.trim().is_empty()
            || request.credentials.password.is_empty()
        {
            return Err(AccountError::Validation(
                "bank login credentials are required".to_string(),
            ));
        }
        if request.bank_name.trim().is_empty() {
            return Err(AccountError::Validation("bank name is required".to_string()));
        }
        if request.account_name.trim().is_empty() {
            return Err(AccountError::Validation(
                "account name is required".to_string(),
            ));
        }

        let credential_ref = self
            .vault
            .store(&request.credentials)
            .map_err(|err| AccountError::Internal(err.to_string()))?;
        let account = self.registry.create(NewAccount {
            bank_name: request.bank_name,
            account_name: request.account_name,
            account_number_masked: request
                .account_number
                .filter(|number| !number.trim().is_empty())
                .unwrap_or_else(|| "****0000".to_string()),
            account_type: request.account_type,
            sync_interval: request.sync_interval,
            credential_ref,
        })?;

        let connection = match self.connector.test_connection(&request.credentials).await {
            Ok(()) => {
                self.registry.set_connected(account.id)?;
                Ok(())
            }
            Err(err) => {
                let reason = err.to_string();
                self.registry.set_error(account.id, &reason)?;
                Err(reason)
            }
        };

        Ok(CreatedAccount {
            account: self.registry.get(account.id)?,
            connection,
        })
    }

    /// Test fresh credentials against the bank. A failed test is an
    /// `Ok(false)` with the account moved to the error state, not an
    /// error; only an unknown id errors. On success the new credentials
    /// replace the vaulted ones.
    pub async fn test_connection(
        &self,
        id: AccountId,
        credentials: Credentials,
    ) -> Result<bool, AccountError> {
        self.registry.get(id)?;
        match self.connector.test_connection(&credentials).await {
            Ok(()) => {
                let new_ref = self
                    .vault
                    .store(&credentials)
                    .map_err(|err| AccountError::Internal(err.to_string()))?;
                let old_ref = self.registry.update_credential_ref(id, new_ref)?;
                self.vault.revoke(old_ref);
                self.registry.set_connected(id)?;
                Ok(true)
            }
            Err(err) => {
                self.registry.set_error(id, &err.to_string())?;
                Ok(false)
            }
        }
    }

    /// Manual or scheduled sync trigger. At most one sync per account is
    /// in flight; a second trigger while one runs comes back as
    /// `AlreadyRunning`, not an error.
    pub async fn request_sync(&self, id: AccountId) -> Result<SyncOutcome, AccountError> {
        match self.registry.begin_sync(id)? {
            BeginSync::AlreadySyncing => return Ok(SyncOutcome::AlreadyRunning),
            BeginSync::NotConnected => return Ok(SyncOutcome::NotConnected),
            BeginSync::Started => {}
        }
        Ok(self.run_sync(id).await)
    }

    /// The fetch/import cycle, entered only through the `begin_sync`
    /// test-and-set. Every exit path returns the account to idle or
    /// discovers it deleted.
    async fn run_sync(&self, id: AccountId) -> SyncOutcome {
        log::info!("Syncing account {id}...");

        let account = match self.registry.get(id) {
            Ok(account) => account,
            Err(_) => return self.discarded(id),
        };
        let credentials = match self.vault.resolve(account.credential_ref) {
            Ok(credentials) => credentials,
            Err(err) => {
                let failure = SyncFailure::Transient(format!("credential lookup failed: {err}"));
                return self.finish_failed(id, failure);
            }
        };

        let handle = AccountHandle {
            id,
            bank_name: account.bank_name.clone(),
            account_number_masked: account.account_number_masked.clone(),
        };
        let raws = match self
            .connector
            .fetch_transactions(&handle, &credentials, account.sync_settings.date_range_days)
            .await
        {
            Ok(raws) => raws,
            Err(err) => return self.finish_failed(id, SyncFailure::from_connector(err)),
        };

        let known_keys = self.ledger.existing_keys().await;
        let now = Utc::now();
        let batch = import::prepare_batch(&account.sync_settings, raws, &known_keys, now);

        // The account may have been deleted while the fetch was in
        // flight; its batch must not reach the ledger.
        if !self.registry.contains(id) {
            return self.discarded(id);
        }
        let committed = self.ledger.append(batch).await;
        let count = committed.len();

        match self.registry.complete_sync(id, now) {
            Ok(()) => {
                log::info!("Syncing account {id}...done, {count} transactions imported");
                SyncOutcome::Imported { count }
            }
            Err(_) => self.discarded(id),
        }
    }

    fn finish_failed(&self, id: AccountId, failure: SyncFailure) -> SyncOutcome {
        match self.registry.fail_sync(id, &failure) {
            Ok(()) => {
                log::warn!("Syncing account {id}...failed: {}", failure.message());
                SyncOutcome::Failed(failure)
            }
            Err(_) => self.discarded(id),
        }
    }

    fn discarded(&self, id: AccountId) -> SyncOutcome {
        log::info!("Account {id} was deleted while its sync was in flight; discarding the result");
        SyncOutcome::Discarded
    }

    /// Remove the account and revoke its vaulted credentials. Legal from
    /// any state; a sync already in flight completes and discards itself.
    pub fn delete_account(&self, id: AccountId) -> Result<(), AccountError> {
        let removed = self.registry.remove(id)?;
        self.vault.revoke(removed.credential_ref);
        Ok(())
    }

    pub fn update_sync_settings(
        &self,
        id: AccountId,
        patch: SyncSettingsPatch,
    ) -> Result<BankAccount, AccountError> {
        self.registry.update_sync_settings(id, patch)
    }

    pub fn update_sync_interval(
        &self,
        id: AccountId,
        interval: SyncInterval,
    ) -> Result<(), AccountError> {
        self.registry.update_sync_interval(id, interval)
    }

    pub fn get_account(&self, id: AccountId) -> Result<BankAccount, AccountError> {
        self.registry.get(id)
    }

    pub fn list_accounts(&self) -> Vec<BankAccount> {
        self.registry.list_sorted()
    }

    pub fn summary(&self) -> AccountSummary {
        self.registry.summary()
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use tokio::sync::Notify;

    use crate::bank_api::{ConnectorError, MockBankConnector};
    use crate::db::{
        Cipher, ConnectionState, InMemoryLedger, RawTransaction, SyncState, TransactionKind,
        XChaCha20Poly1305Cipher,
    };

    use super::*;

    struct Fixture {
        service: Arc<SyncService>,
        connector: Arc<MockBankConnector>,
        ledger: Arc<InMemoryLedger>,
        vault: Arc<CredentialVault>,
    }

    fn fixture_with(connector: MockBankConnector) -> Fixture {
        let connector = Arc::new(connector);
        let registry = Arc::new(AccountRegistry::new());
        let vault = Arc::new(CredentialVault::new(XChaCha20Poly1305Cipher::with_key(
            &XChaCha20Poly1305Cipher::new_key(),
        )));
        let ledger = Arc::new(InMemoryLedger::new());
        let service = Arc::new(SyncService::new(
            registry,
            vault.clone(),
            connector.clone(),
            ledger.clone(),
        ));
        Fixture {
            service,
            connector,
            ledger,
            vault,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(MockBankConnector::new())
    }

    fn request() -> CreateAccountRequest {
        CreateAccountRequest {
            bank_name: "First National".to_string(),
            account_name: "Primary Checking".to_string(),
            account_number: Some("****1234".to_string()),
            account_type: AccountType::Checking,
            sync_interval: SyncInterval::Daily,
            credentials: Credentials {
                username: "user@example.com".to_string(),
                password: "hunter2".to_string(),
            },
        }
    }

    fn raw(account_id: AccountId, day: &str, description: &str) -> RawTransaction {
        RawTransaction {
            account_id,
            kind: TransactionKind::Expense,
            amount: Decimal::new(4567, 2),
            category: Some("Groceries".to_string()),
            description: description.to_string(),
            occurred_on: day.parse::<NaiveDate>().unwrap(),
            pending: false,
        }
    }

    async fn connected_account(fixture: &Fixture) -> AccountId {
        let created = fixture.service.create_account(request()).await.unwrap();
        assert!(created.connection.is_ok());
        created.account.id
    }

    #[tokio::test]
    async fn create_with_valid_credentials_connects() {
        let fixture = fixture();
        let created = fixture.service.create_account(request()).await.unwrap();

        assert!(created.connection.is_ok());
        assert_eq!(ConnectionState::Connected, created.account.connection_state);
        assert_eq!(None, created.account.last_error);
    }

    #[tokio::test]
    async fn create_with_rejected_credentials_still_creates() {
        let connector = MockBankConnector::new();
        connector.push_test_result(Err(ConnectorError::InvalidCredentials(
            "wrong password".to_string(),
        )));
        let fixture = fixture_with(connector);

        let created = fixture.service.create_account(request()).await.unwrap();
        assert!(created.connection.is_err());
        assert_eq!(ConnectionState::Error, created.account.connection_state);
        assert!(created.account.last_error.is_some());

        // still listed
        let listed = fixture.service.list_accounts();
        assert_eq!(1, listed.len());
        assert_eq!(created.account.id, listed[0].id);
    }

    #[tokio::test]
    async fn create_rejects_missing_credentials_before_any_state_change() {
        let fixture = fixture();
        let mut bad = request();
        bad.credentials.password = String::new();

        assert!(matches!(
            fixture.service.create_account(bad).await,
            Err(AccountError::Validation(_))
        ));
        assert!(fixture.service.list_accounts().is_empty());
    }

    #[tokio::test]
    async fn test_connection_on_unknown_id_is_not_found() {
        let fixture = fixture();
        let missing = AccountId(99);
        assert_eq!(
            Err(AccountError::NotFound(missing)),
            fixture
                .service
                .test_connection(missing, request().credentials)
                .await
        );
    }

    #[tokio::test]
    async fn failed_test_is_reported_not_thrown() {
        let fixture = fixture();
        let id = connected_account(&fixture).await;

        fixture.connector.push_test_result(Err(
            ConnectorError::InvalidCredentials("wrong password".to_string()),
        ));
        let ok = fixture
            .service
            .test_connection(id, request().credentials)
            .await
            .unwrap();
        assert!(!ok);
        let account = fixture.service.get_account(id).unwrap();
        assert_eq!(ConnectionState::Error, account.connection_state);

        // new, valid credentials recover the account
        let ok = fixture
            .service
            .test_connection(id, request().credentials)
            .await
            .unwrap();
        assert!(ok);
        let account = fixture.service.get_account(id).unwrap();
        assert_eq!(ConnectionState::Connected, account.connection_state);
        assert_eq!(None, account.last_error);
    }

    #[tokio::test]
    async fn sync_imports_unseen_transactions() {
        let fixture = fixture();
        let id = connected_account(&fixture).await;
        fixture.connector.push_fetch_result(Ok(vec![
            raw(id, "2024-05-01", "Whole Foods Market"),
            raw(id, "2024-05-02", "Metro Card Reload"),
        ]));

        let outcome = fixture.service.request_sync(id).await.unwrap();
        assert_eq!(SyncOutcome::Imported { count: 2 }, outcome);

        let account = fixture.service.get_account(id).unwrap();
        assert!(account.last_sync_at.is_some());
        assert_eq!(SyncState::Idle, account.sync_state);
        assert_eq!(2, fixture.ledger.list_sorted().len());
    }

    #[tokio::test]
    async fn resync_of_an_unchanged_upstream_imports_nothing() {
        let fixture = fixture();
        let id = connected_account(&fixture).await;
        let upstream = vec![
            raw(id, "2024-05-01", "Whole Foods Market"),
            raw(id, "2024-05-02", "Metro Card Reload"),
        ];
        fixture.connector.push_fetch_result(Ok(upstream.clone()));
        fixture.connector.push_fetch_result(Ok(upstream));

        let first = fixture.service.request_sync(id).await.unwrap();
        assert_eq!(SyncOutcome::Imported { count: 2 }, first);
        let second = fixture.service.request_sync(id).await.unwrap();
        assert_eq!(SyncOutcome::Imported { count: 0 }, second);
        assert_eq!(2, fixture.ledger.list_sorted().len());
    }

    #[tokio::test]
    async fn last_sync_never_decreases_across_successful_syncs() {
        let fixture = fixture();
        let id = connected_account(&fixture).await;

        fixture.service.request_sync(id).await.unwrap();
        let first = fixture.service.get_account(id).unwrap().last_sync_at.unwrap();
        fixture.service.request_sync(id).await.unwrap();
        let second = fixture.service.get_account(id).unwrap().last_sync_at.unwrap();
        assert!(second >= first);
    }

    #[tokio::test]
    async fn sync_settings_filter_pending_rows() {
        let fixture = fixture();
        let id = connected_account(&fixture).await;
        fixture.connector.push_fetch_result(Ok(vec![
            raw(id, "2024-05-01", "Whole Foods Market"),
            RawTransaction {
                pending: true,
                ..raw(id, "2024-05-01", "Corner Coffee")
            },
        ]));

        let outcome = fixture.service.request_sync(id).await.unwrap();
        assert_eq!(SyncOutcome::Imported { count: 1 }, outcome);
    }

    #[tokio::test]
    async fn sync_of_a_disconnected_account_is_a_no_op() {
        let connector = MockBankConnector::new();
        connector.push_test_result(Err(ConnectorError::Unavailable("down".to_string())));
        let fixture = fixture_with(connector);
        let created = fixture.service.create_account(request()).await.unwrap();

        let outcome = fixture.service.request_sync(created.account.id).await.unwrap();
        assert_eq!(SyncOutcome::NotConnected, outcome);
        assert_eq!(0, fixture.connector.fetch_call_count());
    }

    #[tokio::test]
    async fn auth_failure_during_fetch_demotes_the_connection() {
        let fixture = fixture();
        let id = connected_account(&fixture).await;
        fixture.connector.push_fetch_result(Err(
            ConnectorError::InvalidCredentials("token expired".to_string()),
        ));

        let outcome = fixture.service.request_sync(id).await.unwrap();
        assert!(matches!(
            outcome,
            SyncOutcome::Failed(SyncFailure::Authentication(_))
        ));
        let account = fixture.service.get_account(id).unwrap();
        assert_eq!(ConnectionState::Error, account.connection_state);
        assert_eq!(SyncState::Idle, account.sync_state);
        assert!(account.last_error.is_some());
        assert_eq!(None, account.last_sync_at);
    }

    #[tokio::test]
    async fn transient_failure_keeps_the_connection_and_allows_retry() {
        let fixture = fixture();
        let id = connected_account(&fixture).await;
        fixture.connector.push_fetch_result(Err(ConnectorError::Unavailable(
            "gateway timeout".to_string(),
        )));
        fixture
            .connector
            .push_fetch_result(Ok(vec![raw(id, "2024-05-01", "Whole Foods Market")]));

        let outcome = fixture.service.request_sync(id).await.unwrap();
        assert!(matches!(
            outcome,
            SyncOutcome::Failed(SyncFailure::Transient(_))
        ));
        let account = fixture.service.get_account(id).unwrap();
        assert_eq!(ConnectionState::Connected, account.connection_state);
        assert!(account.last_error.is_some());

        // retry succeeds and clears the recorded failure
        let outcome = fixture.service.request_sync(id).await.unwrap();
        assert_eq!(SyncOutcome::Imported { count: 1 }, outcome);
        assert_eq!(None, fixture.service.get_account(id).unwrap().last_error);
    }

    #[tokio::test]
    async fn second_trigger_while_syncing_reports_already_running() {
        let gate = Arc::new(Notify::new());
        let connector =
            MockBankConnector::new().with_fetch_gate(gate.clone());
        let fixture = fixture_with(connector);
        let id = connected_account(&fixture).await;
        fixture
            .connector
            .push_fetch_result(Ok(vec![raw(id, "2024-05-01", "Whole Foods Market")]));

        let service = fixture.service.clone();
        let first = tokio::spawn(async move { service.request_sync(id).await });
        tokio::task::yield_now().await;

        let second = fixture.service.request_sync(id).await.unwrap();
        assert_eq!(SyncOutcome::AlreadyRunning, second);

        gate.notify_one();
        let first = first.await.unwrap().unwrap();
        assert_eq!(SyncOutcome::Imported { count: 1 }, first);

        // exactly one fetch reached the connector
        assert_eq!(1, fixture.connector.fetch_call_count());
    }

    #[tokio::test]
    async fn delete_mid_sync_discards_the_result() {
        let gate = Arc::new(Notify::new());
        let connector =
            MockBankConnector::new().with_fetch_gate(gate.clone());
        let fixture = fixture_with(connector);
        let id = connected_account(&fixture).await;
        fixture
            .connector
            .push_fetch_result(Ok(vec![raw(id, "2024-05-01", "Whole Foods Market")]));

        let service = fixture.service.clone();
        let pending = tokio::spawn(async move { service.request_sync(id).await });
        tokio::task::yield_now().await;

        fixture.service.delete_account(id).unwrap();
        gate.notify_one();

        let outcome = pending.await.unwrap().unwrap();
        assert_eq!(SyncOutcome::Discarded, outcome);
        assert!(fixture.service.list_accounts().is_empty());
        assert!(fixture.ledger.is_empty());
    }

    #[tokio::test]
    async fn delete_revokes_the_vault_entry_and_is_not_repeatable() {
        let fixture = fixture();
        let id = connected_account(&fixture).await;

        fixture.service.delete_account(id).unwrap();
        assert_eq!(
            Err(AccountError::NotFound(id)),
            fixture.service.delete_account(id)
        );
        let (_, entries) = fixture.vault.snapshot();
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn summary_reflects_account_states() {
        let fixture = fixture();
        let id = connected_account(&fixture).await;
        fixture.service.request_sync(id).await.unwrap();

        let summary = fixture.service.summary();
        assert_eq!(1, summary.total);
        assert_eq!(1, summary.connected_count);
        assert_eq!(0, summary.error_count);
        assert!(summary.last_sync_at.is_some());
    }
}
