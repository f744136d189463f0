//! Tabular (CSV) byte streams for the spreadsheet exports.
//!
//! These render the same rows the live listings return; totals come from
//! the same sums the summary endpoint uses, so an export can never diverge
//! from the dashboard.

use crate::models::{AuditEntry, Donation};

/// Donation listing for one year, with a trailing total row.
pub fn donations_csv(rows: &[Donation]) -> Vec<u8> {
    let mut out = String::from("id,building,roomNumber,amount,paymentMode,date,remarks,year\n");
    let mut total = 0.0;
    for d in rows {
        total += d.amount;
        out.push_str(&format!(
            "{},{},{},{},{},{},{},{}\n",
            d.id,
            field(&d.building),
            field(&d.room_number),
            d.amount,
            field(&d.payment_mode),
            d.date,
            field(d.remarks.as_deref().unwrap_or("")),
            d.year
        ));
    }
    out.push_str(&format!("TOTAL,,,{total},,,,\n"));
    out.into_bytes()
}

/// Audit trail entries as rendered for the admin export.
pub fn audit_csv(entries: &[AuditEntry]) -> Vec<u8> {
    let mut out = String::from("id,timestamp,username,action,entityType,entityId,ipAddress\n");
    for e in entries {
        out.push_str(&format!(
            "{},{},{},{},{},{},{}\n",
            e.id,
            e.timestamp.to_rfc3339(),
            field(&e.username),
            field(&e.action),
            field(&e.entity_type),
            e.entity_id,
            field(&e.ip_address)
        ));
    }
    out.into_bytes()
}

/// Quote a field when it contains a delimiter, quote, or newline.
fn field(raw: &str) -> String {
    if raw.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}
