use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use time::{Date, OffsetDateTime};
use tracing::{info, warn};
use uuid::Uuid;

use crate::dates::{resolve, ResolvedDate};
use crate::error::{EngineError, Result};
use crate::history::HistoryReconciler;
use crate::model::{GenerationRequest, InvoiceRecord};
use crate::numbering::next_number;
use crate::paths::{open_with_system_viewer, slugify, InvoicePaths};
use crate::render::{assemble_document, InvoiceRenderer};
use crate::store::Db;

/// What a successful generation produced.
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub record: InvoiceRecord,
    /// Human-readable form of the resolved invoice date, e.g.
    /// `today (2026-02-23)`.
    pub date_label: String,
    pub pdf_bytes: usize,
}

/// Orchestrates one invoice generation end to end: date resolution, number
/// allocation, rendering, file write, log append, optional auto-open.
///
/// Allocation and the write that follows run under a per-(recipient, year)
/// lock, so back-to-back generations for the same scope can never observe
/// the same max and collide.
pub struct InvoiceService<R> {
    db: Db,
    paths: InvoicePaths,
    renderer: R,
    scope_locks: Mutex<HashMap<(String, i32), Arc<Mutex<()>>>>,
}

impl<R: InvoiceRenderer> InvoiceService<R> {
    pub fn new(db: Db, paths: InvoicePaths, renderer: R) -> Self {
        Self {
            db,
            paths,
            renderer,
            scope_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn history(&self) -> HistoryReconciler {
        HistoryReconciler::new(self.db.clone())
    }

    fn scope_lock(&self, slug: &str, year: i32) -> Arc<Mutex<()>> {
        let mut map = self
            .scope_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        map.entry((slug.to_string(), year)).or_default().clone()
    }

    /// Generates one invoice. `today` anchors relative date selections; the
    /// caller passes the current date so the resolution itself stays pure.
    pub fn generate(&self, req: &GenerationRequest, today: Date) -> Result<GenerationOutcome> {
        let ResolvedDate { date, label } = resolve(&req.date, today)?;
        let slug = slugify(&req.recipient.display_name)?;
        let year = date.year();

        let lock = self.scope_lock(&slug, year);
        let _scope = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let number = self
            .db
            .with_read("next_number", |conn| Ok(next_number(conn, &slug, year)?))?;

        let doc = assemble_document(req, date, year, number);
        let bytes = self.renderer.render(&doc)?;

        let path = self.paths.plan(&req.recipient.display_name, year, number)?;
        self.paths.ensure_parent(&path)?;
        // The allocator never re-issues a number, so a file already sitting
        // at the planned path means the tree was tampered with. Abort rather
        // than overwrite.
        if path.exists() {
            return Err(EngineError::UnexpectedFileCollision(path));
        }
        write_pdf(&path, &bytes)?;

        let record = InvoiceRecord {
            id: Uuid::new_v4(),
            recipient: slug,
            year,
            invoice_number: number,
            session_timestamp: req.session_start,
            invoice_date: date,
            date_mode: req.date.clone(),
            file_path: path.clone(),
            created_at: OffsetDateTime::now_utc(),
            service_category: req.service_category.clone(),
            payment_method: req.payment.method_type.as_str().to_string(),
        };

        if let Err(e) = self.db.append(&record) {
            // The PDF landed on disk but the log rejected the record. Keep
            // the file and tell the caller exactly where it is.
            return Err(EngineError::OrphanFileAfterFailedRecord {
                path,
                source: Box::new(e),
            });
        }

        info!(
            recipient = %record.recipient,
            year = record.year,
            number = record.invoice_number,
            path = %record.file_path.display(),
            "invoice generated"
        );

        if req.open_on_generate {
            if let Err(e) = open_with_system_viewer(&record.file_path) {
                warn!(error = %e, "could not auto-open generated invoice");
            }
        }

        Ok(GenerationOutcome {
            record,
            date_label: label,
            pdf_bytes: bytes.len(),
        })
    }
}

// Windows indexers briefly hold fresh files; one short retry on a permission
// error covers that without masking real failures.
fn write_pdf(path: &Path, bytes: &[u8]) -> Result<()> {
    match std::fs::write(path, bytes) {
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            std::thread::sleep(std::time::Duration::from_millis(120));
            std::fs::write(path, bytes)?;
            Ok(())
        }
        other => {
            other?;
            Ok(())
        }
    }
}
