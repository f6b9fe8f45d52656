use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::warn;

use crate::error::{EngineError, Result};
use crate::model::{InvoiceRecord, RecordKey};

pub(crate) fn now_iso() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

fn configure_sqlite(conn: &Connection) -> rusqlite::Result<()> {
    // Apply PRAGMAs on init (outside any transaction).
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;\n\
         PRAGMA synchronous = NORMAL;\n\
         PRAGMA foreign_keys = ON;\n\
         PRAGMA temp_store = MEMORY;\n\
         PRAGMA busy_timeout = 5000;\n",
    )?;
    conn.busy_timeout(Duration::from_millis(5000))?;
    Ok(())
}

fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS invoice_log (
            id TEXT PRIMARY KEY NOT NULL,
            recipient TEXT NOT NULL,
            year INTEGER NOT NULL,
            invoiceNumber INTEGER NOT NULL,
            invoiceDate TEXT NOT NULL,
            filePath TEXT NOT NULL,
            createdAt TEXT NOT NULL,
            data_json TEXT NOT NULL,
            UNIQUE (recipient, year, invoiceNumber)
        );

        CREATE TABLE IF NOT EXISTS profiles (
            id TEXT PRIMARY KEY NOT NULL,
            profileType TEXT NOT NULL,
            data_json TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS settings (
            id TEXT PRIMARY KEY NOT NULL,
            data_json TEXT NOT NULL,
            updatedAt TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_invoice_log_scope ON invoice_log(recipient, year);
        CREATE INDEX IF NOT EXISTS idx_profiles_type ON profiles(profileType);
        "#,
    )?;
    Ok(())
}

fn apply_migrations(conn: &Connection) -> rusqlite::Result<()> {
    let v: i64 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;

    // v=0 means a fresh DB; init_schema already created the latest tables.
    if v == 0 {
        conn.execute_batch("PRAGMA user_version = 1;")?;
    }

    Ok(())
}

/// Handle to the engine database: the invoice log plus the profile/defaults
/// tables. Cheap to clone; writers are serialized through `write_lock` so a
/// read never observes a half-applied write sequence.
#[derive(Clone)]
pub struct Db {
    conn: Arc<Mutex<Connection>>,
    write_lock: Arc<Mutex<()>>,
}

impl Db {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::from_connection(Connection::open(path)?)
    }

    /// In-memory database, used by tests to substitute the persistent store.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        configure_sqlite(&conn)?;
        init_schema(&conn)?;
        apply_migrations(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    pub(crate) fn with_read<T, F>(&self, op_name: &'static str, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let guard = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        f(&guard).map_err(|e| {
            warn!(op = op_name, error = %e, "database read failed");
            e
        })
    }

    pub(crate) fn with_write<T, F>(&self, op_name: &'static str, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let _wg = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut guard = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard).map_err(|e| {
            warn!(op = op_name, error = %e, "database write failed");
            e
        })
    }
}

fn parse_record_rows(rows: &mut rusqlite::Rows<'_>) -> Result<Vec<InvoiceRecord>> {
    let mut out: Vec<InvoiceRecord> = Vec::new();
    while let Some(row) = rows.next()? {
        let json: String = row.get(0)?;
        match serde_json::from_str::<InvoiceRecord>(&json) {
            Ok(rec) => out.push(rec),
            // A malformed row is skipped, not fatal; the rest of the log stays usable.
            Err(e) => warn!(error = %e, "skipping unreadable invoice log row"),
        }
    }
    Ok(out)
}

impl Db {
    /// Appends one record to the log. The identity triple must be new.
    pub fn append(&self, record: &InvoiceRecord) -> Result<()> {
        self.with_write("append_record", |conn| {
            let existing: i64 = conn.query_row(
                "SELECT COUNT(1) FROM invoice_log WHERE recipient = ?1 AND year = ?2 AND invoiceNumber = ?3",
                params![record.recipient, record.year, record.invoice_number],
                |r| r.get(0),
            )?;
            if existing > 0 {
                return Err(EngineError::DuplicateKey {
                    recipient: record.recipient.clone(),
                    year: record.year,
                    number: record.invoice_number,
                });
            }

            let json = serde_json::to_string(record)?;
            let created_at = record
                .created_at
                .format(&Rfc3339)
                .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string());
            conn.execute(
                r#"INSERT INTO invoice_log (id, recipient, year, invoiceNumber, invoiceDate, filePath, createdAt, data_json)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
                params![
                    record.id.to_string(),
                    record.recipient,
                    record.year,
                    record.invoice_number,
                    crate::dates::iso(record.invoice_date),
                    record.file_path.to_string_lossy(),
                    created_at,
                    json,
                ],
            )?;
            Ok(())
        })
    }

    /// All records, oldest first (insertion order).
    pub fn all_records(&self) -> Result<Vec<InvoiceRecord>> {
        self.with_read("all_records", |conn| {
            let mut stmt = conn.prepare("SELECT data_json FROM invoice_log ORDER BY rowid ASC")?;
            let mut rows = stmt.query([])?;
            parse_record_rows(&mut rows)
        })
    }

    /// Records for one (recipient, year) scope, oldest first.
    pub fn records_for(&self, recipient: &str, year: i32) -> Result<Vec<InvoiceRecord>> {
        self.with_read("records_for", |conn| {
            let mut stmt = conn.prepare(
                "SELECT data_json FROM invoice_log WHERE recipient = ?1 AND year = ?2 ORDER BY rowid ASC",
            )?;
            let mut rows = stmt.query(params![recipient, year])?;
            parse_record_rows(&mut rows)
        })
    }

    pub fn get(&self, key: &RecordKey) -> Result<Option<InvoiceRecord>> {
        self.with_read("get_record", |conn| {
            let json: Option<String> = conn
                .query_row(
                    "SELECT data_json FROM invoice_log WHERE recipient = ?1 AND year = ?2 AND invoiceNumber = ?3",
                    params![key.recipient, key.year, key.number],
                    |r| r.get(0),
                )
                .optional()?;
            match json {
                Some(j) => Ok(serde_json::from_str::<InvoiceRecord>(&j).ok()),
                None => Ok(None),
            }
        })
    }

    /// Removes a record from the log. The backing file is not touched.
    pub fn remove(&self, key: &RecordKey) -> Result<()> {
        self.with_write("remove_record", |conn| {
            let affected = conn.execute(
                "DELETE FROM invoice_log WHERE recipient = ?1 AND year = ?2 AND invoiceNumber = ?3",
                params![key.recipient, key.year, key.number],
            )?;
            if affected == 0 {
                return Err(EngineError::NotFound {
                    recipient: key.recipient.clone(),
                    year: key.year,
                    number: key.number,
                });
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::sample_record;

    #[test]
    fn append_then_query_in_insertion_order() {
        let db = Db::open_in_memory().unwrap();
        for n in [1, 2, 3] {
            db.append(&sample_record("Acme", 2026, n)).unwrap();
        }
        db.append(&sample_record("Other", 2026, 1)).unwrap();

        let acme = db.records_for("Acme", 2026).unwrap();
        assert_eq!(
            acme.iter().map(|r| r.invoice_number).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(db.all_records().unwrap().len(), 4);
    }

    #[test]
    fn duplicate_identity_triple_is_rejected() {
        let db = Db::open_in_memory().unwrap();
        db.append(&sample_record("Acme", 2026, 1)).unwrap();

        match db.append(&sample_record("Acme", 2026, 1)) {
            Err(EngineError::DuplicateKey { number: 1, .. }) => {}
            other => panic!("expected DuplicateKey, got {other:?}"),
        }

        // Same number under a different scope is fine.
        db.append(&sample_record("Acme", 2025, 1)).unwrap();
        db.append(&sample_record("Beta", 2026, 1)).unwrap();
    }

    #[test]
    fn remove_is_soft_and_reports_missing_keys() {
        let db = Db::open_in_memory().unwrap();
        let rec = sample_record("Acme", 2026, 2);
        db.append(&rec).unwrap();

        db.remove(&rec.key()).unwrap();
        assert!(db.get(&rec.key()).unwrap().is_none());

        match db.remove(&rec.key()) {
            Err(EngineError::NotFound { number: 2, .. }) => {}
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn unknown_fields_in_stored_json_survive_reads() {
        let db = Db::open_in_memory().unwrap();
        let rec = sample_record("Acme", 2026, 1);
        let mut json = serde_json::to_value(&rec).unwrap();
        json["futureField"] = serde_json::json!("kept by readers");

        db.with_write("test_insert_raw", |conn| {
            conn.execute(
                r#"INSERT INTO invoice_log (id, recipient, year, invoiceNumber, invoiceDate, filePath, createdAt, data_json)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
                params![
                    rec.id.to_string(),
                    rec.recipient,
                    rec.year,
                    rec.invoice_number,
                    "2026-02-23",
                    rec.file_path.to_string_lossy(),
                    "2026-02-23T10:05:00Z",
                    serde_json::to_string(&json).unwrap(),
                ],
            )?;
            Ok(())
        })
        .unwrap();

        let records = db.records_for("Acme", 2026).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].invoice_number, 1);
    }
}
