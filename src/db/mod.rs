mod account;
mod crypto;
mod database;
mod file;
mod ledger;
mod transactions;
mod vault;

pub use account::{
    AccountId, AccountType, BankAccount, ConnectionState, SyncInterval, SyncSettings,
    SyncSettingsPatch, SyncState,
};
pub use crypto::{Cipher, XChaCha20Poly1305Cipher};
pub use database::{Database, DatabaseV1};
pub use file::{load, save};
pub use ledger::{InMemoryLedger, Ledger};
pub use transactions::{
    DedupKey, ImportedTransaction, RawTransaction, TransactionId, TransactionKind,
};
pub use vault::{CredentialRef, CredentialVault, Credentials, VaultEntry, VaultError};
