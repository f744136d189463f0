//! Domain types shared across the ledger modules.
//!
//! Enums carry `parse`/`as_str` pairs so the canonical string form used on
//! the wire and in SQLite stays in one place.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// How a donation was paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentMode {
    Cash,
    Cheque,
    Upi,
}

impl PaymentMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CASH" => Some(Self::Cash),
            "CHEQUE" => Some(Self::Cheque),
            "UPI" => Some(Self::Upi),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cash => "CASH",
            Self::Cheque => "CHEQUE",
            Self::Upi => "UPI",
        }
    }
}

/// Expense categories, including the festival-specific ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpenseCategory {
    Murti,
    Banjo,
    Mandap,
    PoojaSamagri,
    Decoration,
    Food,
    Sound,
    Lighting,
    Misc,
}

impl ExpenseCategory {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Murti" => Some(Self::Murti),
            "Banjo" => Some(Self::Banjo),
            "Mandap" => Some(Self::Mandap),
            "Pooja Samagri" => Some(Self::PoojaSamagri),
            "Decoration" => Some(Self::Decoration),
            "Food" => Some(Self::Food),
            "Sound" => Some(Self::Sound),
            "Lighting" => Some(Self::Lighting),
            "Misc" => Some(Self::Misc),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Murti => "Murti",
            Self::Banjo => "Banjo",
            Self::Mandap => "Mandap",
            Self::PoojaSamagri => "Pooja Samagri",
            Self::Decoration => "Decoration",
            Self::Food => "Food",
            Self::Sound => "Sound",
            Self::Lighting => "Lighting",
            Self::Misc => "Misc",
        }
    }
}

/// Every mutating action that lands in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    AddDonation,
    EditDonation,
    AddExpense,
    EditExpense,
    AddPayment,
    ExportDonations,
    ExportAudit,
}

impl AuditAction {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ADD_DONATION" => Some(Self::AddDonation),
            "EDIT_DONATION" => Some(Self::EditDonation),
            "ADD_EXPENSE" => Some(Self::AddExpense),
            "EDIT_EXPENSE" => Some(Self::EditExpense),
            "ADD_PAYMENT" => Some(Self::AddPayment),
            "EXPORT_DONATIONS" => Some(Self::ExportDonations),
            "EXPORT_AUDIT" => Some(Self::ExportAudit),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AddDonation => "ADD_DONATION",
            Self::EditDonation => "EDIT_DONATION",
            Self::AddExpense => "ADD_EXPENSE",
            Self::EditExpense => "EDIT_EXPENSE",
            Self::AddPayment => "ADD_PAYMENT",
            Self::ExportDonations => "EXPORT_DONATIONS",
            Self::ExportAudit => "EXPORT_AUDIT",
        }
    }
}

/// A room-wise donation record as stored in / read from the database.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Donation {
    pub id: i64,
    pub building: String,
    pub room_number: String,
    pub amount: f64,
    pub payment_mode: String,
    pub date: NaiveDate,
    pub remarks: Option<String>,
    pub year: i64,
}

/// An expense record row; derived totals and receipts are joined on read.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    pub id: i64,
    pub category: String,
    pub amount: f64,
    pub date: NaiveDate,
    pub description: String,
    pub added_by: String,
    pub year: i64,
}

/// An expense together with its read-time derivations.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseView {
    #[serde(flatten)]
    pub expense: Expense,
    pub total_paid: f64,
    pub balance_amount: f64,
    pub receipts: Vec<String>,
}

/// A partial payment recorded against an expense.  Append-only.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: i64,
    pub expense_id: i64,
    pub amount: f64,
    pub payment_date: NaiveDate,
    pub paid_by: String,
    pub payment_method: Option<String>,
    pub note: Option<String>,
}

/// One audit trail row.  Never mutated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub username: String,
    pub action: String,
    pub entity_type: String,
    pub entity_id: i64,
    pub ip_address: String,
}

/// One page of a listing, in the shape the client consumes.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub content: Vec<T>,
    pub total_elements: i64,
    pub total_pages: i64,
}

impl<T> Page<T> {
    /// `page_size` must already be validated as positive.
    pub fn new(content: Vec<T>, total_elements: i64, page_size: i64) -> Self {
        let total_pages = (total_elements + page_size - 1) / page_size;
        Page {
            content,
            total_elements,
            total_pages,
        }
    }
}
