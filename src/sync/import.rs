use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::db::{DedupKey, ImportedTransaction, RawTransaction, SyncSettings};

/// Category assigned when the bank reports none, or when category import
/// is turned off for the account.
pub const FALLBACK_CATEGORY: &str = "Other";

/// The pure transform stage between the connector and the ledger. Owns
/// the dedup decision; never owns ledger storage.
///
/// Applies the account's sync settings, drops anything whose dedup key is
/// already committed (or repeats within the batch), and orders the
/// survivors ascending by date so downstream consumers see chronologically
/// consistent state. Ties on the same date keep fetch order.
pub fn prepare_batch(
    settings: &SyncSettings,
    raws: Vec<RawTransaction>,
    known_keys: &HashSet<DedupKey>,
    imported_at: DateTime<Utc>,
) -> Vec<ImportedTransaction> {
    let mut seen_in_batch = HashSet::new();
    let mut batch: Vec<ImportedTransaction> = raws
        .into_iter()
        .filter_map(|raw| {
            if raw.pending && !settings.import_pending {
                return None;
            }
            let dedup_key = raw.dedup_key();
            if known_keys.contains(&dedup_key) || !seen_in_batch.insert(dedup_key.clone()) {
                return None;
            }
            let category = if settings.import_categories {
                raw.category.unwrap_or_else(|| FALLBACK_CATEGORY.to_string())
            } else {
                FALLBACK_CATEGORY.to_string()
            };
            Some(ImportedTransaction {
                account_id: raw.account_id,
                kind: raw.kind,
                amount: raw.amount,
                category,
                description: raw.description,
                occurred_on: raw.occurred_on,
                dedup_key,
                imported_at,
            })
        })
        .collect();
    batch.sort_by_key(|transaction| transaction.occurred_on);
    batch
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use crate::db::{AccountId, TransactionKind};

    use super::*;

    fn raw(day: &str, description: &str) -> RawTransaction {
        RawTransaction {
            account_id: AccountId(1),
            kind: TransactionKind::Expense,
            amount: Decimal::new(4567, 2),
            category: Some("Groceries".to_string()),
            description: description.to_string(),
            occurred_on: day.parse::<NaiveDate>().unwrap(),
            pending: false,
        }
    }

    fn descriptions(batch: &[ImportedTransaction]) -> Vec<&str> {
        batch.iter().map(|t| t.description.as_str()).collect()
    }

    #[test]
    fn pending_rows_are_dropped_by_default() {
        let pending = RawTransaction {
            pending: true,
            ..raw("2024-05-01", "Corner Coffee")
        };
        let settings = SyncSettings::default();
        let batch = prepare_batch(&settings, vec![pending.clone()], &HashSet::new(), Utc::now());
        assert!(batch.is_empty());

        let settings = SyncSettings {
            import_pending: true,
            ..SyncSettings::default()
        };
        let batch = prepare_batch(&settings, vec![pending], &HashSet::new(), Utc::now());
        assert_eq!(vec!["Corner Coffee"], descriptions(&batch));
    }

    #[test]
    fn categories_fall_back_when_missing_or_disabled() {
        let uncategorized = RawTransaction {
            category: None,
            ..raw("2024-05-01", "Mystery Charge")
        };
        let batch = prepare_batch(
            &SyncSettings::default(),
            vec![raw("2024-05-01", "Whole Foods Market"), uncategorized.clone()],
            &HashSet::new(),
            Utc::now(),
        );
        assert_eq!(
            vec!["Groceries", FALLBACK_CATEGORY],
            batch.iter().map(|t| t.category.as_str()).collect::<Vec<_>>()
        );

        let settings = SyncSettings {
            import_categories: false,
            ..SyncSettings::default()
        };
        let batch = prepare_batch(
            &settings,
            vec![raw("2024-05-01", "Whole Foods Market"), uncategorized],
            &HashSet::new(),
            Utc::now(),
        );
        assert!(batch.iter().all(|t| t.category == FALLBACK_CATEGORY));
    }

    #[test]
    fn known_keys_are_filtered_out() {
        let first = raw("2024-05-01", "Whole Foods Market");
        let known: HashSet<DedupKey> = [first.dedup_key()].into_iter().collect();
        let batch = prepare_batch(
            &SyncSettings::default(),
            vec![first, raw("2024-05-02", "Metro Card Reload")],
            &known,
            Utc::now(),
        );
        assert_eq!(vec!["Metro Card Reload"], descriptions(&batch));
    }

    #[test]
    fn repeats_within_one_batch_are_filtered_out() {
        let batch = prepare_batch(
            &SyncSettings::default(),
            vec![
                raw("2024-05-01", "Whole Foods Market"),
                raw("2024-05-01", "Whole Foods Market"),
            ],
            &HashSet::new(),
            Utc::now(),
        );
        assert_eq!(vec!["Whole Foods Market"], descriptions(&batch));
    }

    #[test]
    fn batch_is_ordered_by_date_with_ties_keeping_fetch_order() {
        let batch = prepare_batch(
            &SyncSettings::default(),
            vec![
                raw("2024-05-03", "third"),
                raw("2024-05-01", "first"),
                raw("2024-05-03", "fourth"),
                raw("2024-05-02", "second"),
            ],
            &HashSet::new(),
            Utc::now(),
        );
        assert_eq!(vec!["first", "second", "third", "fourth"], descriptions(&batch));
    }
}
