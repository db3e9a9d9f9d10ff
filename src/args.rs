use clap::{Parser, Subcommand, ValueEnum};

use crate::db::SyncInterval;

/// Manage bank account connections and import their transactions into the
/// local ledger.
#[derive(Parser, Debug)]
pub struct Args {
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create a new database file in the local directory
    Init,

    /// Add a bank account and test its connection
    AddAccount,

    /// List all bank accounts with their connection status
    ListAccounts,

    /// Test an account's connection with fresh credentials
    TestConnection { account_id: u32 },

    /// Fetch and import new transactions for one account
    Sync { account_id: u32 },

    /// Fetch and import new transactions for all accounts
    SyncAll,

    /// Change how often an account is synced automatically
    SetInterval {
        account_id: u32,
        interval: IntervalArg,
    },

    /// Change what a sync imports for an account
    SetSettings {
        account_id: u32,
        /// Also import transactions the bank still reports as pending
        #[clap(long)]
        import_pending: Option<bool>,
        /// Import the bank's category labels instead of "Other"
        #[clap(long)]
        import_categories: Option<bool>,
        /// How many days of history each sync fetches
        #[clap(long)]
        date_range_days: Option<u32>,
    },

    /// Remove a bank account and its stored credentials
    DeleteAccount { account_id: u32 },

    /// Print the list of imported transactions in the database
    ListTransactions,

    /// Run the background sync scheduler until interrupted
    Watch,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum IntervalArg {
    Daily,
    Weekly,
    Monthly,
}

impl From<IntervalArg> for SyncInterval {
    fn from(interval: IntervalArg) -> Self {
        match interval {
            IntervalArg::Daily => SyncInterval::Daily,
            IntervalArg::Weekly => SyncInterval::Weekly,
            IntervalArg::Monthly => SyncInterval::Monthly,
        }
    }
}

pub fn parse() -> Args {
    Args::parse()
}
