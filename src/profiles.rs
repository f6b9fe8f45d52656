use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::store::{now_iso, Db};

/// Invoice issuer details as they appear on the PDF header.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provider {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub address_lines: Vec<String>,
    #[serde(default)]
    pub email: String,
}

/// The party being billed. `student_name` is the optional client reference
/// carried onto the invoice (e.g. the student for tutoring sessions).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub address_lines: Vec<String>,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub student_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentKind {
    BankTransfer,
    Paypal,
}

impl PaymentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentKind::BankTransfer => "bank_transfer",
            PaymentKind::Paypal => "paypal",
        }
    }
}

/// One flat detail record covers both payment kinds; the renderer picks the
/// rows that apply. Unknown detail fields from older/newer writers are
/// ignored on read.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentDetails {
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub account_holder: String,
    #[serde(default)]
    pub bank_name: String,
    #[serde(default)]
    pub sort_code: String,
    #[serde(default)]
    pub account_number: String,
    #[serde(default)]
    pub iban: String,
    #[serde(default)]
    pub bic: String,
    #[serde(default)]
    pub paypal_email: String,
    #[serde(default)]
    pub paypal_link: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMethod {
    pub id: String,
    pub label: String,
    pub method_type: PaymentKind,
    #[serde(default)]
    pub details: PaymentDetails,
}

/// Tagged union stored in the keyed profile table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Profile {
    Provider(Provider),
    Recipient(Recipient),
    PaymentMethod(PaymentMethod),
}

impl Profile {
    pub fn id(&self) -> &str {
        match self {
            Profile::Provider(p) => &p.id,
            Profile::Recipient(r) => &r.id,
            Profile::PaymentMethod(m) => &m.id,
        }
    }

    pub fn kind_str(&self) -> &'static str {
        match self {
            Profile::Provider(_) => "provider",
            Profile::Recipient(_) => "recipient",
            Profile::PaymentMethod(_) => "payment_method",
        }
    }

    /// Label shown in selection lists; profiles sort by it.
    pub fn display_label(&self) -> &str {
        match self {
            Profile::Provider(p) => &p.display_name,
            Profile::Recipient(r) => &r.display_name,
            Profile::PaymentMethod(m) => &m.label,
        }
    }

    pub fn new_id(kind: &str) -> String {
        let suffix = Uuid::new_v4().simple().to_string();
        format!("{kind}-{}", &suffix[..8])
    }
}

/// Which profiles are pre-selected when the form opens.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedProfiles {
    #[serde(default)]
    pub provider_id: Option<String>,
    #[serde(default)]
    pub recipient_id: Option<String>,
    #[serde(default)]
    pub payment_method_id: Option<String>,
    #[serde(default)]
    pub payment_type: Option<PaymentKind>,
}

/// Remembered form values. Populated field by field as the user hits
/// "set default" in the UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDefaults {
    #[serde(default = "default_service_category")]
    pub service_category: String,
    #[serde(default = "default_service_title")]
    pub service_title: String,
    #[serde(default)]
    pub student_name: String,
    #[serde(default = "default_rate")]
    pub rate_per_hour: f64,
    #[serde(default = "default_session_hours")]
    pub session_duration_hours: f64,
    #[serde(default)]
    pub prep_hours: f64,
    #[serde(default = "default_prep_description")]
    pub prep_description: String,
    #[serde(default = "default_terms")]
    pub terms_label: String,
    #[serde(default = "default_due_days")]
    pub due_days: i64,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub open_on_generate: bool,
}

fn default_service_category() -> String {
    "Consulting".to_string()
}
fn default_service_title() -> String {
    "Professional service".to_string()
}
fn default_rate() -> f64 {
    75.0
}
fn default_session_hours() -> f64 {
    1.0
}
fn default_prep_description() -> String {
    "Preparation and admin (not billed).".to_string()
}
fn default_terms() -> String {
    "Net 7".to_string()
}
fn default_due_days() -> i64 {
    7
}
fn default_currency() -> String {
    "GBP".to_string()
}

impl Default for FieldDefaults {
    fn default() -> Self {
        Self {
            service_category: default_service_category(),
            service_title: default_service_title(),
            student_name: String::new(),
            rate_per_hour: default_rate(),
            session_duration_hours: default_session_hours(),
            prep_hours: 0.0,
            prep_description: default_prep_description(),
            terms_label: default_terms(),
            due_days: default_due_days(),
            currency: default_currency(),
            open_on_generate: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Defaults {
    #[serde(default)]
    pub selected_profiles: SelectedProfiles,
    #[serde(default)]
    pub field_defaults: FieldDefaults,
}

const DEFAULTS_ID: &str = "default";

impl Db {
    /// Insert-or-replace by id; the generation path never calls this.
    pub fn upsert_profile(&self, profile: &Profile) -> Result<()> {
        self.with_write("upsert_profile", |conn| {
            let json = serde_json::to_string(profile)?;
            conn.execute(
                "INSERT INTO profiles (id, profileType, data_json) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET profileType = excluded.profileType, data_json = excluded.data_json",
                params![profile.id(), profile.kind_str(), json],
            )?;
            Ok(())
        })
    }

    pub fn get_profile(&self, id: &str) -> Result<Option<Profile>> {
        self.with_read("get_profile", |conn| {
            let json: Option<String> = conn
                .query_row(
                    "SELECT data_json FROM profiles WHERE id = ?1",
                    params![id],
                    |r| r.get(0),
                )
                .optional()?;
            match json {
                Some(j) => Ok(serde_json::from_str::<Profile>(&j).ok()),
                None => Ok(None),
            }
        })
    }

    /// Profiles of one kind, sorted by display label.
    pub fn list_profiles(&self, kind: &str) -> Result<Vec<Profile>> {
        self.with_read("list_profiles", |conn| {
            let mut stmt =
                conn.prepare("SELECT data_json FROM profiles WHERE profileType = ?1")?;
            let mut rows = stmt.query(params![kind])?;
            let mut out: Vec<Profile> = Vec::new();
            while let Some(row) = rows.next()? {
                let json: String = row.get(0)?;
                if let Ok(p) = serde_json::from_str::<Profile>(&json) {
                    out.push(p);
                }
            }
            out.sort_by(|a, b| a.display_label().cmp(b.display_label()));
            Ok(out)
        })
    }

    pub fn delete_profile(&self, id: &str) -> Result<bool> {
        self.with_write("delete_profile", |conn| {
            let affected = conn.execute("DELETE FROM profiles WHERE id = ?1", params![id])?;
            Ok(affected > 0)
        })
    }

    pub fn load_defaults(&self) -> Result<Defaults> {
        self.with_read("load_defaults", |conn| {
            let json: Option<String> = conn
                .query_row(
                    "SELECT data_json FROM settings WHERE id = ?1",
                    params![DEFAULTS_ID],
                    |r| r.get(0),
                )
                .optional()?;
            Ok(json
                .and_then(|j| serde_json::from_str::<Defaults>(&j).ok())
                .unwrap_or_default())
        })
    }

    pub fn save_defaults(&self, defaults: &Defaults) -> Result<()> {
        self.with_write("save_defaults", |conn| {
            let json = serde_json::to_string(defaults)?;
            conn.execute(
                "INSERT INTO settings (id, data_json, updatedAt) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET data_json = excluded.data_json, updatedAt = excluded.updatedAt",
                params![DEFAULTS_ID, json, now_iso()],
            )?;
            Ok(())
        })
    }
}

#[cfg(test)]
pub(crate) fn sample_provider() -> Provider {
    Provider {
        id: "provider-test0001".to_string(),
        display_name: "Your Company Ltd".to_string(),
        address_lines: vec!["1 High Street".to_string(), "London, AB1 2CD".to_string()],
        email: "billing@example.com".to_string(),
    }
}

#[cfg(test)]
pub(crate) fn sample_recipient(name: &str) -> Recipient {
    Recipient {
        id: "recipient-test0001".to_string(),
        display_name: name.to_string(),
        address_lines: vec!["2 Client Road".to_string()],
        email: "client@example.com".to_string(),
        student_name: "Jane Doe".to_string(),
    }
}

#[cfg(test)]
pub(crate) fn sample_payment() -> PaymentMethod {
    PaymentMethod {
        id: "payment-test0001".to_string(),
        label: "Business account".to_string(),
        method_type: PaymentKind::BankTransfer,
        details: PaymentDetails {
            currency: "GBP".to_string(),
            account_holder: "Your Company Ltd".to_string(),
            bank_name: "Example Bank".to_string(),
            sort_code: "00-00-00".to_string(),
            account_number: "00000000".to_string(),
            ..Default::default()
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_overwrites_by_id() {
        let db = Db::open_in_memory().unwrap();
        let mut provider = sample_provider();
        db.upsert_profile(&Profile::Provider(provider.clone())).unwrap();

        provider.display_name = "Renamed Ltd".to_string();
        db.upsert_profile(&Profile::Provider(provider.clone())).unwrap();

        let listed = db.list_profiles("provider").unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].display_label(), "Renamed Ltd");
    }

    #[test]
    fn listing_is_scoped_by_kind_and_sorted() {
        let db = Db::open_in_memory().unwrap();
        for name in ["Zed Corp", "Acme Ltd"] {
            let mut r = sample_recipient(name);
            r.id = Profile::new_id("recipient");
            db.upsert_profile(&Profile::Recipient(r)).unwrap();
        }
        db.upsert_profile(&Profile::Provider(sample_provider())).unwrap();

        let recipients = db.list_profiles("recipient").unwrap();
        assert_eq!(
            recipients.iter().map(|p| p.display_label()).collect::<Vec<_>>(),
            vec!["Acme Ltd", "Zed Corp"]
        );
    }

    #[test]
    fn defaults_round_trip_and_fill_gaps() {
        let db = Db::open_in_memory().unwrap();

        // Nothing saved yet: form defaults apply.
        let d = db.load_defaults().unwrap();
        assert_eq!(d.field_defaults.currency, "GBP");
        assert_eq!(d.field_defaults.due_days, 7);

        let mut d = d;
        d.field_defaults.rate_per_hour = 90.0;
        d.selected_profiles.provider_id = Some("provider-abc".to_string());
        db.save_defaults(&d).unwrap();

        let back = db.load_defaults().unwrap();
        assert_eq!(back.field_defaults.rate_per_hour, 90.0);
        assert_eq!(back.selected_profiles.provider_id.as_deref(), Some("provider-abc"));
        // Untouched fields keep their defaults.
        assert_eq!(back.field_defaults.terms_label, "Net 7");
    }

    #[test]
    fn payment_profile_keeps_its_kind_tag() {
        let db = Db::open_in_memory().unwrap();
        db.upsert_profile(&Profile::PaymentMethod(sample_payment())).unwrap();

        match db.get_profile("payment-test0001").unwrap() {
            Some(Profile::PaymentMethod(m)) => {
                assert_eq!(m.method_type, PaymentKind::BankTransfer);
                assert_eq!(m.details.bank_name, "Example Bank");
            }
            other => panic!("expected payment method, got {other:?}"),
        }
    }
}
