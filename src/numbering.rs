use rusqlite::{params, Connection};

/// Next invoice number for a (recipient, year) scope: `max(existing) + 1`,
/// starting at 1. Max-based rather than count-based, so a removed record
/// never causes a later allocation to collide with a still-referenced file.
///
/// Callers must hold the generation lock for this scope; allocation and the
/// subsequent append form one critical section.
pub fn next_number(conn: &Connection, recipient: &str, year: i32) -> rusqlite::Result<i64> {
    let max: i64 = conn.query_row(
        "SELECT COALESCE(MAX(invoiceNumber), 0) FROM invoice_log WHERE recipient = ?1 AND year = ?2",
        params![recipient, year],
        |r| r.get(0),
    )?;
    Ok(max + 1)
}

/// Display form used on the rendered invoice, e.g. `INV-2026-0007`. The file
/// on disk keeps the bare number; this is presentation only.
pub fn format_invoice_number(year: i32, number: i64) -> String {
    format!("INV-{}-{:0>4}", year, number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::sample_record;
    use crate::store::Db;

    #[test]
    fn starts_at_one_for_an_empty_scope() {
        let db = Db::open_in_memory().unwrap();
        let n = db
            .with_read("test", |conn| Ok(next_number(conn, "Acme", 2026)?))
            .unwrap();
        assert_eq!(n, 1);
    }

    #[test]
    fn skips_over_gaps_left_by_removals() {
        let db = Db::open_in_memory().unwrap();
        for n in [1, 2, 3, 4] {
            db.append(&sample_record("Acme", 2026, n)).unwrap();
        }
        // Record 3 removed from the list; its file may still exist.
        db.remove(&sample_record("Acme", 2026, 3).key()).unwrap();

        let n = db
            .with_read("test", |conn| Ok(next_number(conn, "Acme", 2026)?))
            .unwrap();
        assert_eq!(n, 5, "must never re-issue 3");
    }

    #[test]
    fn scopes_are_independent() {
        let db = Db::open_in_memory().unwrap();
        db.append(&sample_record("Acme", 2026, 9)).unwrap();

        let other_year = db
            .with_read("test", |conn| Ok(next_number(conn, "Acme", 2025)?))
            .unwrap();
        let other_recipient = db
            .with_read("test", |conn| Ok(next_number(conn, "Beta", 2026)?))
            .unwrap();
        assert_eq!(other_year, 1);
        assert_eq!(other_recipient, 1);
    }

    #[test]
    fn display_number_is_zero_padded() {
        assert_eq!(format_invoice_number(2026, 7), "INV-2026-0007");
        assert_eq!(format_invoice_number(2026, 12345), "INV-2026-12345");
    }
}
