use time::{Date, Duration};
use tracing::{debug, info};

use crate::error::{EngineError, Result};
use crate::model::{HistoryEntry, RecordKey};
use crate::paths::open_with_system_viewer;
use crate::store::Db;

/// Entries older than this many days (by invoice date) drop out of the view.
pub const HISTORY_WINDOW_DAYS: i64 = 14;
/// Upper bound on entries shown even when the window holds more.
pub const HISTORY_MAX_ENTRIES: usize = 15;

/// Read-model over the append-only log: builds the recent-history view and
/// carries the per-entry file actions (open / delete / remove from list).
#[derive(Clone)]
pub struct HistoryReconciler {
    db: Db,
}

impl HistoryReconciler {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Rebuilds the history view for `today`. File presence is probed fresh
    /// on every call, so entries reflect files deleted out-of-band since the
    /// last refresh. Newest invoice date first; within one date, the most
    /// recently appended record wins.
    pub fn refresh(&self, today: Date) -> Result<Vec<HistoryEntry>> {
        let cutoff = today - Duration::days(HISTORY_WINDOW_DAYS);

        let mut records = self.db.all_records()?;
        // Future-dated invoices stay visible; only the lower bound filters.
        records.retain(|r| r.invoice_date >= cutoff);
        records.reverse();
        records.sort_by(|a, b| b.invoice_date.cmp(&a.invoice_date));
        records.truncate(HISTORY_MAX_ENTRIES);

        let entries: Vec<HistoryEntry> = records
            .into_iter()
            .map(|record| {
                let file_present = record.file_path.is_file();
                HistoryEntry {
                    record,
                    file_present,
                }
            })
            .collect();
        debug!(count = entries.len(), "history refreshed");
        Ok(entries)
    }

    /// Opens the entry's PDF with the platform viewer. Fails when the record
    /// is unknown or its file has gone missing since the last refresh.
    pub fn open(&self, key: &RecordKey) -> Result<()> {
        let record = self.require(key)?;
        if !record.file_path.is_file() {
            return Err(EngineError::FileMissing(record.file_path));
        }
        open_with_system_viewer(&record.file_path)
    }

    /// Deletes the entry's file, then its record. The file goes first so a
    /// failed deletion leaves the record (and the entry) in place; an already
    /// absent file is not an error.
    pub fn delete_file(&self, key: &RecordKey) -> Result<()> {
        let record = self.require(key)?;
        if record.file_path.exists() {
            std::fs::remove_file(&record.file_path)?;
            info!(path = %record.file_path.display(), "invoice file deleted");
        }
        self.db.remove(key)
    }

    /// Drops the record from the log but leaves the file on disk.
    pub fn remove_from_list(&self, key: &RecordKey) -> Result<()> {
        self.db.remove(key)?;
        info!(
            recipient = %key.recipient,
            year = key.year,
            number = key.number,
            "record removed from history"
        );
        Ok(())
    }

    fn require(&self, key: &RecordKey) -> Result<crate::model::InvoiceRecord> {
        self.db.get(key)?.ok_or_else(|| EngineError::NotFound {
            recipient: key.recipient.clone(),
            year: key.year,
            number: key.number,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::sample_record;
    use time::macros::date;

    fn setup() -> (Db, HistoryReconciler) {
        let db = Db::open_in_memory().unwrap();
        let reconciler = HistoryReconciler::new(db.clone());
        (db, reconciler)
    }

    fn record_on(db: &Db, number: i64, invoice_date: Date) {
        let mut record = sample_record("acme", invoice_date.year(), number);
        record.invoice_date = invoice_date;
        db.append(&record).unwrap();
    }

    #[test]
    fn window_and_cap_both_limit_the_view() {
        let (db, reconciler) = setup();
        let today = date!(2026 - 03 - 30);

        // 20 records inside the window plus 5 older ones; the window drops
        // the old ones and the cap trims the rest to 15.
        for i in 0..20i64 {
            record_on(&db, i + 1, today - Duration::days(i % 14));
        }
        for i in 0..5i64 {
            record_on(&db, 100 + i, today - Duration::days(20 + i));
        }

        let entries = reconciler.refresh(today).unwrap();
        assert_eq!(entries.len(), HISTORY_MAX_ENTRIES);
        let cutoff = today - Duration::days(HISTORY_WINDOW_DAYS);
        for entry in &entries {
            assert!(entry.record.invoice_date >= cutoff);
        }
        for pair in entries.windows(2) {
            assert!(pair[0].record.invoice_date >= pair[1].record.invoice_date);
        }
    }

    #[test]
    fn future_dated_invoices_stay_visible() {
        let (db, reconciler) = setup();
        let today = date!(2026 - 02 - 23);
        record_on(&db, 1, today + Duration::days(5));

        let entries = reconciler.refresh(today).unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn same_date_orders_most_recent_insertion_first() {
        let (db, reconciler) = setup();
        let today = date!(2026 - 02 - 23);
        record_on(&db, 1, today);
        record_on(&db, 2, today);
        record_on(&db, 3, today);

        let numbers: Vec<i64> = reconciler
            .refresh(today)
            .unwrap()
            .iter()
            .map(|e| e.record.invoice_number)
            .collect();
        assert_eq!(numbers, vec![3, 2, 1]);
    }

    #[test]
    fn file_presence_is_probed_on_every_refresh() {
        let (db, reconciler) = setup();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1.pdf");
        std::fs::write(&path, b"%PDF").unwrap();

        let mut record = sample_record("acme", 2026, 1);
        record.invoice_date = date!(2026 - 02 - 23);
        record.file_path = path.clone();
        db.append(&record).unwrap();

        let today = date!(2026 - 02 - 23);
        assert!(reconciler.refresh(today).unwrap()[0].file_present);

        std::fs::remove_file(&path).unwrap();
        assert!(!reconciler.refresh(today).unwrap()[0].file_present);
    }

    #[test]
    fn delete_file_removes_file_then_record() {
        let (db, reconciler) = setup();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1.pdf");
        std::fs::write(&path, b"%PDF").unwrap();

        let mut record = sample_record("acme", 2026, 1);
        record.file_path = path.clone();
        db.append(&record).unwrap();
        let key = record.key();

        reconciler.delete_file(&key).unwrap();
        assert!(!path.exists());
        assert!(db.get(&key).unwrap().is_none());
    }

    #[test]
    fn delete_file_with_absent_file_still_removes_the_record() {
        let (db, reconciler) = setup();
        let mut record = sample_record("acme", 2026, 1);
        record.file_path = std::path::PathBuf::from("/nonexistent/dir/1.pdf");
        db.append(&record).unwrap();
        let key = record.key();

        reconciler.delete_file(&key).unwrap();
        assert!(db.get(&key).unwrap().is_none());
    }

    #[test]
    fn failed_file_deletion_keeps_the_record() {
        let (db, reconciler) = setup();
        let dir = tempfile::tempdir().unwrap();
        // A directory at the target path makes remove_file fail.
        let path = dir.path().join("stubborn.pdf");
        std::fs::create_dir(&path).unwrap();

        let mut record = sample_record("acme", 2026, 1);
        record.file_path = path.clone();
        db.append(&record).unwrap();
        let key = record.key();

        assert!(reconciler.delete_file(&key).is_err());
        assert!(db.get(&key).unwrap().is_some());
    }

    #[test]
    fn remove_from_list_leaves_the_file() {
        let (db, reconciler) = setup();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1.pdf");
        std::fs::write(&path, b"%PDF").unwrap();

        let mut record = sample_record("acme", 2026, 1);
        record.file_path = path.clone();
        db.append(&record).unwrap();
        let key = record.key();

        reconciler.remove_from_list(&key).unwrap();
        assert!(path.exists());
        assert!(db.get(&key).unwrap().is_none());
    }

    #[test]
    fn actions_on_unknown_records_report_not_found() {
        let (_db, reconciler) = setup();
        let key = RecordKey {
            recipient: "acme".to_string(),
            year: 2026,
            number: 99,
        };
        assert!(matches!(
            reconciler.open(&key),
            Err(EngineError::NotFound { .. })
        ));
        assert!(matches!(
            reconciler.remove_from_list(&key),
            Err(EngineError::NotFound { .. })
        ));
    }

    #[test]
    fn open_without_a_file_reports_file_missing() {
        let (db, reconciler) = setup();
        let mut record = sample_record("acme", 2026, 1);
        record.file_path = std::path::PathBuf::from("/nonexistent/dir/1.pdf");
        db.append(&record).unwrap();

        assert!(matches!(
            reconciler.open(&record.key()),
            Err(EngineError::FileMissing(_))
        ));
    }
}
