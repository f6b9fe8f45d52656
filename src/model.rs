use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime, PrimitiveDateTime};
use uuid::Uuid;

use crate::dates::DateSelection;
use crate::profiles::{PaymentMethod, Provider, Recipient};

time::serde::format_description!(
    session_format,
    PrimitiveDateTime,
    "[year]-[month]-[day] [hour]:[minute]"
);

/// One line of the persisted invoice log. Immutable once appended; removal is
/// the only mutation. Field names are the stable wire contract; readers must
/// tolerate additional fields they do not know.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceRecord {
    pub id: Uuid,
    pub recipient: String,
    pub year: i32,
    pub invoice_number: i64,
    #[serde(with = "session_format")]
    pub session_timestamp: PrimitiveDateTime,
    pub invoice_date: Date,
    pub date_mode: DateSelection,
    pub file_path: PathBuf,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(default)]
    pub service_category: String,
    #[serde(default)]
    pub payment_method: String,
}

impl InvoiceRecord {
    pub fn key(&self) -> RecordKey {
        RecordKey {
            recipient: self.recipient.clone(),
            year: self.year,
            number: self.invoice_number,
        }
    }
}

/// Identity triple of a record. Unique within the log.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey {
    pub recipient: String,
    pub year: i32,
    pub number: i64,
}

/// Projection of a record plus filesystem liveness, recomputed on every
/// refresh and never persisted.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub record: InvoiceRecord,
    pub file_present: bool,
}

impl HistoryEntry {
    /// "Open" is only offered while the backing file exists.
    pub fn openable(&self) -> bool {
        self.file_present
    }
}

/// Everything the UI collects for one generation, with profile snapshots
/// already resolved. The engine reads this; it never writes profiles.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub provider: Provider,
    pub recipient: Recipient,
    pub payment: PaymentMethod,
    pub service_category: String,
    pub service_title: String,
    /// Optional label, e.g. a student name for tutoring invoices.
    pub client_reference: String,
    pub rate_per_hour: f64,
    pub session_hours: f64,
    /// Shown on the invoice but never billed; 0.0 omits the line entirely.
    pub prep_hours: f64,
    pub prep_description: String,
    pub session_start: PrimitiveDateTime,
    pub date: DateSelection,
    pub terms_label: String,
    pub due_days: i64,
    pub currency: String,
    pub open_on_generate: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub description: String,
    pub hours: f64,
    pub rate: f64,
    pub amount: f64,
    pub billed: bool,
}

/// Test fixture shared across module tests.
#[cfg(test)]
pub(crate) fn sample_record(recipient: &str, year: i32, number: i64) -> InvoiceRecord {
    use time::macros::{date, datetime};

    InvoiceRecord {
        id: Uuid::new_v4(),
        recipient: recipient.to_string(),
        year,
        invoice_number: number,
        session_timestamp: datetime!(2026-02-23 10:00),
        invoice_date: date!(2026 - 02 - 23),
        date_mode: DateSelection::Relative { offset: 0 },
        file_path: PathBuf::from(format!("/tmp/invoices/{recipient}/{year}/{number}.pdf")),
        created_at: datetime!(2026-02-23 10:05 UTC),
        service_category: "Tutoring".to_string(),
        payment_method: "bank_transfer".to_string(),
    }
}
