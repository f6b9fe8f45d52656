use serde::{Deserialize, Serialize};
use time::format_description::well_known::Iso8601;
use time::{Date, Duration};

use crate::error::{EngineError, Result};

/// Largest relative offset (in days, either direction) the form accepts.
pub const MAX_RELATIVE_OFFSET: i64 = 7;

/// How the user picked the invoice date. Relative selections are re-resolved
/// against "today" every time they are evaluated; absolute ones are fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum DateSelection {
    Relative { offset: i64 },
    Absolute { date: Date },
}

/// A selection resolved against a concrete reference date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDate {
    pub date: Date,
    pub label: String,
}

/// Parses a `YYYY-MM-DD` string for absolute selections.
pub fn parse_iso_date(input: &str) -> Result<Date> {
    Date::parse(input, &Iso8601::DATE).map_err(|_| EngineError::InvalidDate(input.to_string()))
}

/// `YYYY-MM-DD`, the display/storage form used throughout the engine.
pub(crate) fn iso(date: Date) -> String {
    format!(
        "{:04}-{:02}-{:02}",
        date.year(),
        u8::from(date.month()),
        date.day()
    )
}

/// Resolves a date selection against `reference` (the caller's "today").
///
/// Pure: identical inputs always yield the identical date and label, so an
/// invoice date is reproducible after the fact.
pub fn resolve(selection: &DateSelection, reference: Date) -> Result<ResolvedDate> {
    match *selection {
        DateSelection::Relative { offset } => {
            if !(-MAX_RELATIVE_OFFSET..=MAX_RELATIVE_OFFSET).contains(&offset) {
                return Err(EngineError::InvalidOffset(offset));
            }
            let date = reference
                .checked_add(Duration::days(offset))
                .ok_or(EngineError::InvalidOffset(offset))?;
            let semantic = match offset {
                0 => "today".to_string(),
                1 => "tomorrow".to_string(),
                -1 => "yesterday".to_string(),
                n if n > 1 => format!("in {n} days"),
                n => format!("{} days ago", -n),
            };
            Ok(ResolvedDate {
                date,
                label: format!("{semantic} ({})", iso(date)),
            })
        }
        DateSelection::Absolute { date } => Ok(ResolvedDate {
            date,
            label: iso(date),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    const REF: Date = date!(2026 - 02 - 23);

    #[test]
    fn relative_labels_match_offset() {
        let cases = [
            (0, "today (2026-02-23)", date!(2026 - 02 - 23)),
            (-1, "yesterday (2026-02-22)", date!(2026 - 02 - 22)),
            (1, "tomorrow (2026-02-24)", date!(2026 - 02 - 24)),
            (3, "in 3 days (2026-02-26)", date!(2026 - 02 - 26)),
            (-5, "5 days ago (2026-02-18)", date!(2026 - 02 - 18)),
        ];
        for (offset, label, expected) in cases {
            let resolved = resolve(&DateSelection::Relative { offset }, REF).unwrap();
            assert_eq!(resolved.date, expected, "offset {offset}");
            assert_eq!(resolved.label, label, "offset {offset}");
        }
    }

    #[test]
    fn resolve_is_pure_over_the_full_offset_range() {
        for offset in -MAX_RELATIVE_OFFSET..=MAX_RELATIVE_OFFSET {
            let a = resolve(&DateSelection::Relative { offset }, REF).unwrap();
            let b = resolve(&DateSelection::Relative { offset }, REF).unwrap();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn out_of_range_offsets_are_rejected() {
        for offset in [-8, 8, 100] {
            match resolve(&DateSelection::Relative { offset }, REF) {
                Err(EngineError::InvalidOffset(o)) => assert_eq!(o, offset),
                other => panic!("expected InvalidOffset, got {other:?}"),
            }
        }
    }

    #[test]
    fn absolute_label_is_the_bare_iso_date() {
        let resolved = resolve(
            &DateSelection::Absolute {
                date: date!(2025 - 12 - 31),
            },
            REF,
        )
        .unwrap();
        assert_eq!(resolved.date, date!(2025 - 12 - 31));
        assert_eq!(resolved.label, "2025-12-31");
    }

    #[test]
    fn absolute_input_must_be_a_valid_date() {
        assert!(parse_iso_date("2026-02-23").is_ok());
        for bad in ["2026-13-01", "2026-02-30", "not-a-date", ""] {
            match parse_iso_date(bad) {
                Err(EngineError::InvalidDate(s)) => assert_eq!(s, bad),
                other => panic!("expected InvalidDate for {bad:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn selection_serializes_with_a_mode_tag() {
        let rel = serde_json::to_value(DateSelection::Relative { offset: 3 }).unwrap();
        assert_eq!(rel, serde_json::json!({"mode": "relative", "offset": 3}));

        let abs = serde_json::to_value(DateSelection::Absolute {
            date: date!(2026 - 02 - 23),
        })
        .unwrap();
        assert_eq!(abs, serde_json::json!({"mode": "absolute", "date": "2026-02-23"}));
    }
}
