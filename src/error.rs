use thiserror::Error;

use crate::bank_api::ConnectorError;
use crate::db::AccountId;

/// Errors surfaced synchronously to the caller. Neither variant leaves
/// partially mutated state behind.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AccountError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("unknown account {0}")]
    NotFound(AccountId),
    #[error("internal error: {0}")]
    Internal(String),
}

/// A sync attempt that ran and failed. Recorded on the account as
/// `last_error` and reported through the account's observable state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncFailure {
    /// Credentials rejected by the bank. Terminal for this attempt; the
    /// account moves to the error state until new credentials pass a test.
    Authentication(String),
    /// Bank unreachable or timed out. The account stays connected and the
    /// next scheduled tick or manual trigger retries.
    Transient(String),
}

impl SyncFailure {
    pub fn from_connector(err: ConnectorError) -> Self {
        if err.is_authentication() {
            SyncFailure::Authentication(err.to_string())
        } else {
            SyncFailure::Transient(err.to_string())
        }
    }

    pub fn message(&self) -> &str {
        match self {
            SyncFailure::Authentication(message) | SyncFailure::Transient(message) => message,
        }
    }
}

/// What came out of a requested sync. Failures are outcomes rather than
/// errors because the usual caller is the background scheduler, which has
/// nobody to catch an exception.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The sync completed; `count` transactions survived dedup and were
    /// committed to the ledger. Zero is still a success.
    Imported { count: usize },
    /// A sync for this account was already in flight; nothing was done.
    AlreadyRunning,
    /// The account isn't connected; nothing was attempted.
    NotConnected,
    /// The fetch failed; details are recorded on the account.
    Failed(SyncFailure),
    /// The account was deleted while the sync was in flight; the fetched
    /// batch was dropped without touching the ledger.
    Discarded,
}
