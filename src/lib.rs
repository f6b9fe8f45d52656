//! Invoice generation engine: resolves invoice dates, allocates per-client
//! sequential numbers, renders PDFs, and keeps an append-only log of every
//! generated invoice with a recent-history view over it.
//!
//! The library is headless; a UI (or a CLI) supplies a [`GenerationRequest`]
//! and the current date, and gets back the written file plus its log record.

pub mod dates;
pub mod error;
pub mod history;
pub mod model;
pub mod numbering;
pub mod paths;
pub mod profiles;
pub mod render;
pub mod service;
pub mod store;

pub use dates::{resolve, DateSelection, ResolvedDate, MAX_RELATIVE_OFFSET};
pub use error::{EngineError, Result};
pub use history::{HistoryReconciler, HISTORY_MAX_ENTRIES, HISTORY_WINDOW_DAYS};
pub use model::{GenerationRequest, HistoryEntry, InvoiceRecord, LineItem, RecordKey};
pub use paths::{slugify, InvoicePaths};
pub use profiles::{
    Defaults, FieldDefaults, PaymentDetails, PaymentKind, PaymentMethod, Profile, Provider,
    Recipient, SelectedProfiles,
};
pub use render::{InvoiceDocument, InvoiceRenderer, PdfRenderer};
pub use service::{GenerationOutcome, InvoiceService};
pub use store::Db;
