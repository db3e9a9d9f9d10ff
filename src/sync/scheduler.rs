use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::db::{AccountId, BankAccount, ConnectionState};

use super::service::SyncService;

/// How often the scheduler scans accounts for due syncs. The per-account
/// cadence itself comes from each account's sync interval.
pub const DEFAULT_TICK: Duration = Duration::from_secs(60);

/// Whether an account is due for an automatic sync at `now`. An account
/// that never synced is due as soon as it is connected; afterwards it is
/// due once its interval has elapsed since the last successful sync. A
/// successful manual sync advances `last_sync_at` and thereby pushes the
/// next automatic fire out.
pub fn due_for_sync(account: &BankAccount, now: DateTime<Utc>) -> bool {
    if account.connection_state != ConnectionState::Connected {
        return false;
    }
    match account.last_sync_at {
        None => true,
        Some(last_sync_at) => now - last_sync_at >= account.sync_interval.duration(),
    }
}

/// Timer-driven sync trigger. Each due account syncs as an independent
/// task; the registry's test-and-set guarantees a tick racing a manual
/// "sync now" never doubles the work.
pub struct SyncScheduler {
    service: Arc<SyncService>,
    tick: Duration,
}

impl SyncScheduler {
    pub fn new(service: Arc<SyncService>, tick: Duration) -> Self {
        Self { service, tick }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    async fn run(self) {
        let mut interval = tokio::time::interval(self.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            self.tick_once().await;
        }
    }

    /// One scheduler pass: fire a sync for every due account and wait for
    /// the spawned tasks. Outcomes are logged, never surfaced; there is no
    /// caller to surface them to.
    pub async fn tick_once(&self) {
        let now = Utc::now();
        let due: Vec<AccountId> = self
            .service
            .list_accounts()
            .into_iter()
            .filter(|account| due_for_sync(account, now))
            .map(|account| account.id)
            .collect();

        let tasks: Vec<JoinHandle<_>> = due
            .into_iter()
            .map(|id| {
                let service = Arc::clone(&self.service);
                tokio::spawn(async move { (id, service.request_sync(id).await) })
            })
            .collect();

        for task in tasks {
            match task.await {
                Ok((id, Ok(outcome))) => {
                    log::info!("Scheduled sync for account {id}: {outcome:?}")
                }
                Ok((id, Err(err))) => {
                    log::info!("Scheduled sync for account {id} skipped: {err}")
                }
                Err(err) => log::warn!("Scheduled sync task failed: {err}"),
            }
        }
    }
}
