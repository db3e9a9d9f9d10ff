mod import;
mod registry;
mod scheduler;
mod service;

pub use import::{prepare_batch, FALLBACK_CATEGORY};
pub use registry::{AccountRegistry, AccountSummary, BeginSync, NewAccount};
pub use scheduler::{due_for_sync, SyncScheduler, DEFAULT_TICK};
pub use service::{CreateAccountRequest, CreatedAccount, SyncService};
