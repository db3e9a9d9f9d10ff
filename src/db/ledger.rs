use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;

use super::transactions::{DedupKey, ImportedTransaction, TransactionId};

/// The transaction store the import pipeline hands committed batches to.
/// `append` is the import-completed handoff; `existing_keys` is what the
/// dedup step filters against.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Commit a batch, assigning ledger ids. Returns the committed rows.
    async fn append(
        &self,
        batch: Vec<ImportedTransaction>,
    ) -> Vec<(TransactionId, ImportedTransaction)>;

    /// Dedup keys of everything previously committed.
    async fn existing_keys(&self) -> HashSet<DedupKey>;
}

struct LedgerInner {
    rows: BTreeMap<TransactionId, ImportedTransaction>,
    keys: HashSet<DedupKey>,
}

/// Process-local transaction store. Instantiated once per process (or per
/// test) and persisted through the database snapshot; no hidden statics.
pub struct InMemoryLedger {
    next_id: AtomicU64,
    inner: RwLock<LedgerInner>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::restore(1, vec![])
    }

    pub fn restore(next_id: u64, rows: Vec<(TransactionId, ImportedTransaction)>) -> Self {
        let keys = rows.iter().map(|(_, row)| row.dedup_key.clone()).collect();
        Self {
            next_id: AtomicU64::new(next_id),
            inner: RwLock::new(LedgerInner {
                rows: rows.into_iter().collect(),
                keys,
            }),
        }
    }

    /// All committed transactions, ascending by date; ties keep commit order.
    pub fn list_sorted(&self) -> Vec<(TransactionId, ImportedTransaction)> {
        let inner = self.inner.read().unwrap();
        let mut rows: Vec<(TransactionId, ImportedTransaction)> = inner
            .rows
            .iter()
            .map(|(id, row)| (*id, row.clone()))
            .collect();
        rows.sort_by_key(|(id, row)| (row.occurred_on, *id));
        rows
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().unwrap().rows.is_empty()
    }

    pub fn snapshot(&self) -> (u64, Vec<(TransactionId, ImportedTransaction)>) {
        let inner = self.inner.read().unwrap();
        (
            self.next_id.load(Ordering::SeqCst),
            inner.rows.iter().map(|(id, row)| (*id, row.clone())).collect(),
        )
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn append(
        &self,
        batch: Vec<ImportedTransaction>,
    ) -> Vec<(TransactionId, ImportedTransaction)> {
        let mut inner = self.inner.write().unwrap();
        batch
            .into_iter()
            .map(|row| {
                let id = TransactionId(self.next_id.fetch_add(1, Ordering::SeqCst));
                inner.keys.insert(row.dedup_key.clone());
                inner.rows.insert(id, row.clone());
                (id, row)
            })
            .collect()
    }

    async fn existing_keys(&self) -> HashSet<DedupKey> {
        self.inner.read().unwrap().keys.clone()
    }
}
