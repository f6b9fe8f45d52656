use time::{Date, Duration, PrimitiveDateTime};

use crate::error::{EngineError, Result};
use crate::model::{GenerationRequest, LineItem};
use crate::numbering::format_invoice_number;
use crate::profiles::{PaymentKind, PaymentMethod, Provider, Recipient};

/// Everything the renderer needs, fully populated by the service. Rendering
/// is pure: no filesystem access, deterministic for identical input.
#[derive(Debug, Clone)]
pub struct InvoiceDocument {
    pub provider: Provider,
    pub recipient: Recipient,
    pub payment: PaymentMethod,
    pub invoice_number_display: String,
    pub invoice_date: Date,
    pub due_date: Date,
    pub terms_label: String,
    pub service_category: String,
    pub client_reference: String,
    pub session_start: PrimitiveDateTime,
    pub session_end: PrimitiveDateTime,
    pub currency: String,
    pub line_items: Vec<LineItem>,
    pub total: f64,
    pub payment_reference: String,
}

pub trait InvoiceRenderer {
    fn render(&self, doc: &InvoiceDocument) -> Result<Vec<u8>>;
}

/// Builds the line items for a request. The session line bills
/// `hours x rate`; preparation effort is shown unbilled, and is omitted
/// entirely when its hours are exactly zero.
pub fn line_items(req: &GenerationRequest) -> Vec<LineItem> {
    let mut items = vec![LineItem {
        description: req.service_title.clone(),
        hours: req.session_hours,
        rate: req.rate_per_hour,
        amount: req.session_hours * req.rate_per_hour,
        billed: true,
    }];

    if req.prep_hours != 0.0 {
        items.push(LineItem {
            description: format!(
                "Preparation (not billed): {:.2} hours. {}",
                req.prep_hours, req.prep_description
            ),
            hours: req.prep_hours,
            rate: 0.0,
            amount: 0.0,
            billed: false,
        });
    }

    items
}

fn initials(name: &str) -> String {
    let parts: Vec<&str> = name.split_whitespace().collect();
    if parts.is_empty() {
        return "XX".to_string();
    }
    parts
        .iter()
        .take(2)
        .filter_map(|p| p.chars().next())
        .flat_map(|c| c.to_uppercase())
        .collect()
}

/// Default bank reference, e.g. `Tut-JD-230226`. Uses the client reference
/// when present, otherwise the recipient name.
pub fn payment_reference(req: &GenerationRequest) -> String {
    let label = if req.client_reference.trim().is_empty() {
        req.recipient.display_name.as_str()
    } else {
        req.client_reference.as_str()
    };
    let d = req.session_start.date();
    format!(
        "Tut-{}-{:02}{:02}{:02}",
        initials(label),
        d.day(),
        u8::from(d.month()),
        d.year() % 100
    )
}

/// Populates an [`InvoiceDocument`] from a request and the resolved invoice
/// date. The due date derives from the terms (`invoice date + due days`).
pub fn assemble_document(
    req: &GenerationRequest,
    invoice_date: Date,
    year: i32,
    number: i64,
) -> InvoiceDocument {
    let items = line_items(req);
    let total = items.iter().map(|i| i.amount).sum();
    let session_end = req.session_start
        + Duration::seconds((req.session_hours * 3600.0).round() as i64);

    InvoiceDocument {
        provider: req.provider.clone(),
        recipient: req.recipient.clone(),
        payment: req.payment.clone(),
        invoice_number_display: format_invoice_number(year, number),
        invoice_date,
        due_date: invoice_date
            .checked_add(Duration::days(req.due_days))
            .unwrap_or(invoice_date),
        terms_label: req.terms_label.clone(),
        service_category: req.service_category.clone(),
        client_reference: req.client_reference.clone(),
        session_start: req.session_start,
        session_end,
        currency: req.currency.clone(),
        line_items: items,
        total,
        payment_reference: payment_reference(req),
    }
}

fn fmt_date(d: Date) -> String {
    format!("{:02}-{:02}-{:04}", d.day(), u8::from(d.month()), d.year())
}

fn fmt_time(t: PrimitiveDateTime) -> String {
    format!("{:02}:{:02}", t.hour(), t.minute())
}

fn session_label(doc: &InvoiceDocument) -> String {
    format!(
        "{}  {}\u{2013}{}",
        fmt_date(doc.session_start.date()),
        fmt_time(doc.session_start),
        fmt_time(doc.session_end)
    )
}

fn format_money(v: f64) -> String {
    let s = format!("{:.2}", v);
    let parts = s.split('.').collect::<Vec<_>>();
    let int_part = parts[0];
    let dec_part = parts.get(1).copied().unwrap_or("00");

    let mut out = String::new();
    let chars: Vec<char> = int_part.chars().collect();
    let mut cnt = 0;
    for i in (0..chars.len()).rev() {
        if chars[i] == '-' {
            out.push(chars[i]);
            continue;
        }
        if cnt == 3 {
            out.push(',');
            cnt = 0;
        }
        out.push(chars[i]);
        cnt += 1;
    }
    let int_with_sep: String = out.chars().rev().collect();
    format!("{}.{}", int_with_sep, dec_part)
}

/// Key/value rows of the payment-details block; the set depends on the
/// payment kind.
fn payment_rows(doc: &InvoiceDocument) -> Vec<(String, String)> {
    let payment = &doc.payment;
    let details = &payment.details;
    let currency = if details.currency.trim().is_empty() {
        doc.currency.clone()
    } else {
        details.currency.clone()
    };

    let mut rows = vec![
        ("Payment method".to_string(), payment.label.clone()),
        ("Payment currency".to_string(), currency),
    ];
    match payment.method_type {
        PaymentKind::Paypal => {
            rows.push(("PayPal email".to_string(), details.paypal_email.clone()));
            rows.push(("PayPal link".to_string(), details.paypal_link.clone()));
        }
        PaymentKind::BankTransfer => {
            rows.push(("Account holder".to_string(), details.account_holder.clone()));
            rows.push(("Bank".to_string(), details.bank_name.clone()));
            rows.push(("Sort code".to_string(), details.sort_code.clone()));
            rows.push(("Account number".to_string(), details.account_number.clone()));
            rows.push(("IBAN".to_string(), details.iban.clone()));
            rows.push(("BIC/SWIFT".to_string(), details.bic.clone()));
        }
    }
    rows.push(("Reference".to_string(), doc.payment_reference.clone()));
    rows
}

fn wrap_text_lines(input: &str, max_chars: usize) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut current = String::new();

    for word in input.split_whitespace() {
        if current.is_empty() {
            current.push_str(word);
            continue;
        }

        if current.len() + 1 + word.len() <= max_chars {
            current.push(' ');
            current.push_str(word);
        } else {
            out.push(current);
            current = word.to_string();
        }
    }

    if !current.is_empty() {
        out.push(current);
    }

    out
}

fn push_line(
    layer: &printpdf::PdfLayerReference,
    font: &printpdf::IndirectFontRef,
    text: &str,
    font_size: f32,
    x: f32,
    y: f32,
) {
    use printpdf::Mm;
    layer.use_text(text, font_size, Mm(x), Mm(y), font);
}

// Built-in fonts expose no metrics; an average-advance estimate is good
// enough for right-aligned numeric columns.
fn text_width_mm_est(text: &str, font_size_pt: f32) -> f32 {
    const PT_TO_MM: f32 = 25.4 / 72.0;
    (text.chars().count() as f32) * font_size_pt * 0.5 * PT_TO_MM
}

fn push_line_right(
    layer: &printpdf::PdfLayerReference,
    font: &printpdf::IndirectFontRef,
    text: &str,
    font_size: f32,
    x_right: f32,
    y: f32,
) {
    let x = (x_right - text_width_mm_est(text, font_size)).max(0.0);
    push_line(layer, font, text, font_size, x, y);
}

fn draw_rule_with_thickness(
    layer: &printpdf::PdfLayerReference,
    x1: f32,
    x2: f32,
    y: f32,
    thickness: f32,
) {
    use printpdf::Mm;
    layer.set_outline_thickness(thickness);
    layer.add_line(printpdf::Line {
        points: vec![
            (printpdf::Point::new(Mm(x1), Mm(y)), false),
            (printpdf::Point::new(Mm(x2), Mm(y)), false),
        ],
        is_closed: false,
    });
}

/// A4 invoice rendered with the built-in Helvetica faces.
#[derive(Debug, Clone, Default)]
pub struct PdfRenderer;

impl PdfRenderer {
    pub fn new() -> Self {
        Self
    }
}

impl InvoiceRenderer for PdfRenderer {
    fn render(&self, doc: &InvoiceDocument) -> Result<Vec<u8>> {
        use printpdf::{BuiltinFont, Mm, PdfDocument};

        let (pdf, page1, layer1) =
            PdfDocument::new(&doc.invoice_number_display, Mm(210.0), Mm(297.0), "Layer 1");
        let layer = pdf.get_page(page1).get_layer(layer1);

        let font = pdf
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| EngineError::RenderFailure(e.to_string()))?;
        let font_bold = pdf
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|e| EngineError::RenderFailure(e.to_string()))?;

        const PAGE_H: f32 = 297.0;
        const MARGIN_X: f32 = 20.0;
        const CONTENT_RIGHT: f32 = 210.0 - MARGIN_X;
        const LINE_H: f32 = 4.6;
        const SMALL_LINE_H: f32 = 4.0;

        let mut y = PAGE_H - 18.0;

        push_line(&layer, &font_bold, "INVOICE", 20.0, MARGIN_X, y);
        y -= 10.0;

        // Parties: issuer on the left, bill-to on the right column.
        let bill_to_x = 112.0;
        let mut y_left = y;
        push_line(&layer, &font_bold, &doc.provider.display_name, 9.0, MARGIN_X, y_left);
        y_left -= SMALL_LINE_H;
        for line in &doc.provider.address_lines {
            push_line(&layer, &font, line, 9.0, MARGIN_X, y_left);
            y_left -= SMALL_LINE_H;
        }
        if !doc.provider.email.trim().is_empty() {
            push_line(&layer, &font, doc.provider.email.trim(), 9.0, MARGIN_X, y_left);
            y_left -= SMALL_LINE_H;
        }

        let mut y_right = y;
        push_line(&layer, &font_bold, "Bill To:", 9.0, bill_to_x, y_right);
        y_right -= SMALL_LINE_H;
        push_line(&layer, &font, &doc.recipient.display_name, 9.0, bill_to_x, y_right);
        y_right -= SMALL_LINE_H;
        for line in &doc.recipient.address_lines {
            push_line(&layer, &font, line, 9.0, bill_to_x, y_right);
            y_right -= SMALL_LINE_H;
        }
        if !doc.recipient.email.trim().is_empty() {
            push_line(&layer, &font, doc.recipient.email.trim(), 9.0, bill_to_x, y_right);
            y_right -= SMALL_LINE_H;
        }

        y = y_left.min(y_right) - 6.0;

        // Meta block.
        let meta_value_x = MARGIN_X + 30.0;
        let meta_label2_x = 112.0;
        let meta_value2_x = meta_label2_x + 26.0;
        let meta_rows = [
            (
                "Invoice #",
                doc.invoice_number_display.clone(),
                "Invoice date",
                fmt_date(doc.invoice_date),
            ),
            (
                "Terms",
                doc.terms_label.clone(),
                "Due date",
                fmt_date(doc.due_date),
            ),
            (
                "Service type",
                doc.service_category.clone(),
                "Session",
                session_label(doc),
            ),
            (
                "Client reference",
                if doc.client_reference.trim().is_empty() {
                    "-".to_string()
                } else {
                    doc.client_reference.clone()
                },
                "",
                String::new(),
            ),
        ];
        draw_rule_with_thickness(&layer, MARGIN_X, CONTENT_RIGHT, y + 3.0, 0.5);
        for (l1, v1, l2, v2) in meta_rows {
            push_line(&layer, &font_bold, l1, 9.0, MARGIN_X, y);
            push_line(&layer, &font, &v1, 9.0, meta_value_x, y);
            if !l2.is_empty() {
                push_line(&layer, &font_bold, l2, 9.0, meta_label2_x, y);
                push_line(&layer, &font, &v2, 9.0, meta_value2_x, y);
            }
            y -= LINE_H;
        }
        draw_rule_with_thickness(&layer, MARGIN_X, CONTENT_RIGHT, y + 1.2, 0.5);
        y -= 6.0;

        // Line items.
        let col_hours_right = 130.0;
        let col_rate_right = 155.0;
        let col_amount_right = CONTENT_RIGHT;

        push_line(&layer, &font_bold, "Description", 9.0, MARGIN_X, y);
        push_line_right(&layer, &font_bold, "Hours", 9.0, col_hours_right, y);
        push_line_right(
            &layer,
            &font_bold,
            &format!("Rate ({})", doc.currency),
            9.0,
            col_rate_right,
            y,
        );
        push_line_right(
            &layer,
            &font_bold,
            &format!("Amount ({})", doc.currency),
            9.0,
            col_amount_right,
            y,
        );
        y -= 1.6;
        draw_rule_with_thickness(&layer, MARGIN_X, CONTENT_RIGHT, y, 0.5);
        y -= LINE_H;

        for item in &doc.line_items {
            let size = if item.billed { 9.0 } else { 8.0 };
            let desc_lines = wrap_text_lines(&item.description, 60);
            let row_top = y;
            for line in &desc_lines {
                push_line(&layer, &font, line, size, MARGIN_X, y);
                y -= SMALL_LINE_H;
            }
            if item.billed {
                // The session row also carries the date/time detail line.
                push_line(&layer, &font, &format!("Session date/time: {}", session_label(doc)), 8.0, MARGIN_X, y);
                y -= SMALL_LINE_H;
            }
            push_line_right(&layer, &font, &format!("{:.2}", item.hours), size, col_hours_right, row_top);
            push_line_right(&layer, &font, &format_money(item.rate), size, col_rate_right, row_top);
            push_line_right(&layer, &font, &format_money(item.amount), size, col_amount_right, row_top);
            y -= 2.0;
        }
        draw_rule_with_thickness(&layer, MARGIN_X, CONTENT_RIGHT, y + 2.0, 0.5);
        y -= LINE_H;

        // Totals.
        push_line_right(&layer, &font_bold, "Subtotal", 9.5, col_rate_right, y);
        push_line_right(&layer, &font, &format_money(doc.total), 9.5, col_amount_right, y);
        y -= LINE_H;
        push_line_right(&layer, &font_bold, "Total", 10.5, col_rate_right, y);
        push_line_right(&layer, &font_bold, &format_money(doc.total), 10.5, col_amount_right, y);
        y -= 2.2;
        draw_rule_with_thickness(&layer, col_hours_right, CONTENT_RIGHT, y, 0.85);
        y -= 10.0;

        // Payment details.
        push_line(&layer, &font_bold, "Payment details", 10.0, MARGIN_X, y);
        y -= LINE_H;
        let value_x = MARGIN_X + 42.0;
        for (label, value) in payment_rows(doc) {
            if value.trim().is_empty() {
                continue;
            }
            push_line(&layer, &font, &label, 9.0, MARGIN_X, y);
            push_line(&layer, &font, &value, 9.0, value_x, y);
            y -= SMALL_LINE_H;
        }
        y -= 4.0;

        push_line(
            &layer,
            &font,
            "Thank you. Please use the payment reference shown above.",
            8.0,
            MARGIN_X,
            y,
        );

        let mut writer = std::io::BufWriter::new(Vec::<u8>::new());
        pdf.save(&mut writer)
            .map_err(|e| EngineError::RenderFailure(e.to_string()))?;
        let bytes = writer
            .into_inner()
            .map_err(|e| EngineError::RenderFailure(e.to_string()))?;
        Ok(bytes)
    }
}

/// Test fixture shared with the service tests.
#[cfg(test)]
pub(crate) fn sample_request(prep_hours: f64) -> GenerationRequest {
    use crate::dates::DateSelection;
    use crate::profiles::{sample_payment, sample_provider, sample_recipient};
    use time::macros::datetime;

    GenerationRequest {
        provider: sample_provider(),
        recipient: sample_recipient("Acme Ltd"),
        payment: sample_payment(),
        service_category: "Tutoring".to_string(),
        service_title: "Tutoring session (Maths)".to_string(),
        client_reference: "Jane Doe".to_string(),
        rate_per_hour: 75.0,
        session_hours: 1.5,
        prep_hours,
        prep_description: "Reviewing questions and drafting notes.".to_string(),
        session_start: datetime!(2026-02-23 10:00),
        date: DateSelection::Relative { offset: 0 },
        terms_label: "Net 7".to_string(),
        due_days: 7,
        currency: "GBP".to_string(),
        open_on_generate: false,
    }
}
