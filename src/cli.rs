use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context as _, Result};
use chrono::{DateTime, NaiveDate, Utc};
use console::{pad_str, style, Alignment, StyledObject};
use rand::{rngs::StdRng, RngCore, SeedableRng};

use crate::args::{Args, Command};
use crate::bank_api::{BankConnector, MockBankConnector};
use crate::db::{
    self, AccountId, BankAccount, Cipher, ConnectionState, CredentialVault, Credentials,
    DatabaseV1, ImportedTransaction, InMemoryLedger, SyncState, SyncSettingsPatch,
    TransactionKind, XChaCha20Poly1305Cipher,
};
use crate::error::{SyncFailure, SyncOutcome};
use crate::sync::{AccountRegistry, CreateAccountRequest, SyncScheduler, SyncService, DEFAULT_TICK};
use crate::terminal::{self, BulletPointPrinter};

// TODO Configurable DB location
const DB_PATH: &str = "bank_sync.db";

// TODO Read the vault key from an OS keychain instead of deriving it in-process
fn vault_key() -> chacha20poly1305::Key {
    let mut rng = StdRng::seed_from_u64(1);
    let mut key_bytes = [0; 32];
    rng.fill_bytes(&mut key_bytes);
    key_bytes.into()
}

pub async fn main(args: Args) -> Result<()> {
    match args.command {
        Command::Init => main_init().await,
        command => {
            let cli = Cli::load().await?;
            cli.run(command).await
        }
    }
}

async fn main_init() -> Result<()> {
    if tokio::fs::try_exists(DB_PATH).await? {
        bail!("Database already exists");
    }
    db::save(DatabaseV1::new(), Path::new(DB_PATH))
        .await
        .context("Failed to save database")?;
    println!("Created {DB_PATH}");
    Ok(())
}

pub struct Cli {
    registry: Arc<AccountRegistry>,
    vault: Arc<CredentialVault>,
    ledger: Arc<InMemoryLedger>,
    service: Arc<SyncService>,
}

impl Cli {
    async fn load() -> Result<Self> {
        let database = db::load(Path::new(DB_PATH))
            .await
            .context("Failed to load database")?
            .ok_or_else(|| anyhow!("Database file not found, run `bank-sync init` first"))?;
        let registry = Arc::new(AccountRegistry::restore(
            database.next_account_id,
            database.accounts,
        ));
        let vault = Arc::new(CredentialVault::restore(
            XChaCha20Poly1305Cipher::with_key(&vault_key()),
            database.next_credential_ref,
            database.credentials,
        ));
        let ledger = Arc::new(InMemoryLedger::restore(
            database.next_transaction_id,
            database.transactions,
        ));
        let connector: Arc<dyn BankConnector> = Arc::new(MockBankConnector::with_sample_data());
        let service = Arc::new(SyncService::new(
            registry.clone(),
            vault.clone(),
            connector,
            ledger.clone(),
        ));
        Ok(Self {
            registry,
            vault,
            ledger,
            service,
        })
    }

    async fn save(self) -> Result<()> {
        let (next_account_id, accounts) = self.registry.snapshot();
        let (next_credential_ref, credentials) = self.vault.snapshot();
        let (next_transaction_id, transactions) = self.ledger.snapshot();
        let database = DatabaseV1 {
            next_account_id,
            accounts,
            next_credential_ref,
            credentials,
            next_transaction_id,
            transactions,
        };
        db::save(database, Path::new(DB_PATH))
            .await
            .context("Failed to save database")
    }

    async fn run(self, command: Command) -> Result<()> {
        match command {
            Command::Init => unreachable!("handled before the database is loaded"),
            Command::AddAccount => self.main_add_account().await?,
            Command::ListAccounts => self.main_list_accounts()?,
            Command::TestConnection { account_id } => {
                self.main_test_connection(AccountId(account_id)).await?
            }
            Command::Sync { account_id } => self.main_sync(AccountId(account_id)).await?,
            Command::SyncAll => self.main_sync_all().await?,
            Command::SetInterval {
                account_id,
                interval,
            } => self.main_set_interval(AccountId(account_id), interval.into())?,
            Command::SetSettings {
                account_id,
                import_pending,
                import_categories,
                date_range_days,
            } => self.main_set_settings(
                AccountId(account_id),
                SyncSettingsPatch {
                    import_pending,
                    date_range_days,
                    import_categories,
                },
            )?,
            Command::DeleteAccount { account_id } => {
                self.main_delete_account(AccountId(account_id))?
            }
            Command::ListTransactions => self.main_list_transactions()?,
            Command::Watch => self.main_watch().await?,
        }
        self.save().await
    }

    async fn main_add_account(&self) -> Result<()> {
        let bank_name = terminal::prompt("Bank name")?;
        let account_name = terminal::prompt("Account name")?;
        let account_number = terminal::prompt_optional("Account number (last 4 digits, optional)")?;
        let account_type = prompt_account_type()?;
        let sync_interval = prompt_sync_interval()?;
        let username = terminal::prompt("Bank login username")?;
        let password = terminal::prompt_password("Bank login password")?;

        let created = self
            .service
            .create_account(CreateAccountRequest {
                bank_name,
                account_name,
                account_number,
                account_type,
                sync_interval,
                credentials: Credentials { username, password },
            })
            .await?;

        println!();
        match created.connection {
            Ok(()) => println!(
                "{} account {} added and connected",
                style("✓").green().bold(),
                style_account(&created.account)
            ),
            Err(reason) => println!(
                "{} account {} added, but the connection failed: {}\n  Update credentials with `bank-sync test-connection {}`",
                style("!").yellow().bold(),
                style_account(&created.account),
                reason,
                created.account.id.0,
            ),
        }
        Ok(())
    }

    fn main_list_accounts(&self) -> Result<()> {
        let summary = self.service.summary();
        println!("{}", style_header("Accounts:"));
        println!(
            "{} connected, {} with errors, last sync {}",
            summary.connected_count,
            summary.error_count,
            format_sync_time(summary.last_sync_at),
        );
        println!();

        let accounts = self.service.list_accounts();
        if accounts.is_empty() {
            println!("(none)");
            return Ok(());
        }
        let printer = BulletPointPrinter::new();
        for account in &accounts {
            print_account(&printer, account);
        }
        Ok(())
    }

    async fn main_test_connection(&self, id: AccountId) -> Result<()> {
        let account = self.service.get_account(id)?;
        println!(
            "Testing connection for {} at {}",
            style_account(&account),
            style_bank(&account.bank_name)
        );
        let username = terminal::prompt("Bank login username")?;
        let password = terminal::prompt_password("Bank login password")?;

        if self
            .service
            .test_connection(id, Credentials { username, password })
            .await?
        {
            println!("{} connection successful", style("✓").green().bold());
        } else {
            let account = self.service.get_account(id)?;
            println!(
                "{} connection failed: {}",
                style("✗").red().bold(),
                account.last_error.as_deref().unwrap_or("unknown error")
            );
        }
        Ok(())
    }

    async fn main_sync(&self, id: AccountId) -> Result<()> {
        let account = self.service.get_account(id)?;
        let outcome = self.service.request_sync(id).await?;
        print_sync_outcome(&account, &outcome);
        Ok(())
    }

    async fn main_sync_all(&self) -> Result<()> {
        let accounts = self.service.list_accounts();
        if accounts.is_empty() {
            println!("(no accounts)");
            return Ok(());
        }
        println!("{}", style_header("Syncing accounts:"));
        let outcomes = futures::future::join_all(
            accounts
                .iter()
                .map(|account| self.service.request_sync(account.id)),
        )
        .await;
        for (account, outcome) in accounts.iter().zip(outcomes) {
            print_sync_outcome(account, &outcome?);
        }
        Ok(())
    }

    fn main_set_interval(&self, id: AccountId, interval: crate::db::SyncInterval) -> Result<()> {
        self.service.update_sync_interval(id, interval)?;
        println!("Sync interval set to {}", interval.label());
        Ok(())
    }

    fn main_set_settings(&self, id: AccountId, patch: SyncSettingsPatch) -> Result<()> {
        let account = self.service.update_sync_settings(id, patch)?;
        let settings = account.sync_settings;
        println!(
            "Sync settings for {}: import pending: {}, import categories: {}, date range: {} days",
            style_account(&account),
            settings.import_pending,
            settings.import_categories,
            settings.date_range_days,
        );
        Ok(())
    }

    fn main_delete_account(&self, id: AccountId) -> Result<()> {
        let account = self.service.get_account(id)?;
        let confirmed = terminal::confirm(&format!(
            "Remove {} at {} and its stored credentials?",
            account.account_name, account.bank_name
        ))?;
        if !confirmed {
            println!("Aborted");
            return Ok(());
        }
        self.service.delete_account(id)?;
        println!("Removed account {}", id);
        Ok(())
    }

    fn main_list_transactions(&self) -> Result<()> {
        println!("{}", style_header("Transactions:"));
        let rows = self.ledger.list_sorted();
        if rows.is_empty() {
            println!("(none)");
            return Ok(());
        }
        let printer = BulletPointPrinter::new();
        for (_, transaction) in &rows {
            print_transaction(&printer, transaction);
        }
        Ok(())
    }

    async fn main_watch(&self) -> Result<()> {
        println!(
            "Watching {} accounts, press ctrl-c to stop",
            self.service.list_accounts().len()
        );
        let scheduler = SyncScheduler::new(self.service.clone(), DEFAULT_TICK);
        let handle = scheduler.spawn();
        tokio::signal::ctrl_c().await?;
        handle.abort();
        println!();
        Ok(())
    }
}

fn prompt_account_type() -> Result<crate::db::AccountType> {
    use crate::db::AccountType;
    loop {
        let answer = terminal::prompt("Account type (checking/savings/credit)")?;
        match answer.trim().to_lowercase().as_str() {
            "checking" => return Ok(AccountType::Checking),
            "savings" => return Ok(AccountType::Savings),
            "credit" => return Ok(AccountType::Credit),
            _ => println!("Please answer checking, savings or credit"),
        }
    }
}

fn prompt_sync_interval() -> Result<crate::db::SyncInterval> {
    use crate::db::SyncInterval;
    loop {
        let answer = terminal::prompt("Sync interval (daily/weekly/monthly)")?;
        match answer.trim().to_lowercase().as_str() {
            "daily" => return Ok(SyncInterval::Daily),
            "weekly" => return Ok(SyncInterval::Weekly),
            "monthly" => return Ok(SyncInterval::Monthly),
            _ => println!("Please answer daily, weekly or monthly"),
        }
    }
}

fn print_account(printer: &BulletPointPrinter, account: &BankAccount) {
    printer.print_item(format!(
        "{} {} · {} {} [{}]",
        style(account.id.to_string()).dim(),
        style_account(account),
        style_bank(&account.bank_name),
        account.account_number_masked,
        style_status(account),
    ));
    let printer = printer.indent();
    printer.print_item(format!(
        "{}, syncs {}, last sync {}",
        account.account_type.label(),
        account.sync_interval.label(),
        format_sync_time(account.last_sync_at),
    ));
    if let Some(error) = &account.last_error {
        printer.print_item(format!("{} {}", style("last error:").red(), error));
    }
}

fn print_transaction(printer: &BulletPointPrinter, transaction: &ImportedTransaction) {
    printer.print_item(format!(
        "{} {} {} {}",
        pad_str(
            &style_date(&transaction.occurred_on).to_string(),
            10,
            Alignment::Left,
            None
        ),
        pad_str(
            &style_amount(transaction).to_string(),
            12,
            Alignment::Right,
            None
        ),
        style(&transaction.description).blue(),
        style(format!("[{}]", transaction.category)).magenta(),
    ));
}

fn print_sync_outcome(account: &BankAccount, outcome: &SyncOutcome) {
    let name = style_account(account);
    match outcome {
        SyncOutcome::Imported { count: 0 } => {
            println!("{name}: no new transactions");
        }
        SyncOutcome::Imported { count } => {
            println!("{name}: imported {count} transactions");
        }
        SyncOutcome::AlreadyRunning => {
            println!("{name}: a sync is already in progress");
        }
        SyncOutcome::NotConnected => {
            println!(
                "{name}: not connected, run `bank-sync test-connection {}` first",
                account.id.0
            );
        }
        SyncOutcome::Failed(SyncFailure::Authentication(reason)) => {
            println!(
                "{name}: {} {reason}, update the stored credentials",
                style("connection failed:").red()
            );
        }
        SyncOutcome::Failed(SyncFailure::Transient(reason)) => {
            println!(
                "{name}: {} {reason}, the next sync will retry",
                style("sync failed:").yellow()
            );
        }
        SyncOutcome::Discarded => {
            println!("{name}: account was removed while syncing");
        }
    }
}

fn style_header(header: &str) -> StyledObject<&str> {
    style(header).bold().underlined()
}

fn style_account(account: &BankAccount) -> StyledObject<String> {
    style(account.account_name.clone()).cyan().bold()
}

fn style_bank(bank_name: &str) -> StyledObject<&str> {
    style(bank_name).magenta()
}

fn style_status(account: &BankAccount) -> StyledObject<&'static str> {
    if account.sync_state == SyncState::Syncing {
        return style("Syncing").blue();
    }
    match account.connection_state {
        ConnectionState::Connected => style("Connected").green(),
        ConnectionState::Error => style("Error").red(),
        ConnectionState::Disconnected => style("Disconnected").yellow(),
    }
}

fn style_date(date: &NaiveDate) -> StyledObject<String> {
    style(date.format("%Y-%m-%d").to_string())
}

fn style_amount(transaction: &ImportedTransaction) -> StyledObject<String> {
    match transaction.kind {
        TransactionKind::Expense => style(format!("-{}", transaction.amount)).red().bold(),
        TransactionKind::Income => style(format!("+{}", transaction.amount)).green().bold(),
    }
}

fn format_sync_time(timestamp: Option<DateTime<Utc>>) -> String {
    match timestamp {
        Some(timestamp) => timestamp.format("%Y-%m-%d %H:%M").to_string(),
        None => "never".to_string(),
    }
}
