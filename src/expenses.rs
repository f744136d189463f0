//! Expense ledger and its payment sub-ledger.
//!
//! An expense carries the agreed total cost; payments against it are
//! append-only installments.  `totalPaid` and `balanceAmount` are derived
//! at read time from the payments table so they can never drift.

use chrono::{Datelike, NaiveDate};
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::audit::{self, ENTITY_EXPENSE, ENTITY_PAYMENT};
use crate::auth::Principal;
use crate::errors::{map_check_violation, LedgerError, Result};
use crate::models::{AuditAction, Expense, ExpenseCategory, ExpenseView, Page, Payment};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewExpense {
    pub category: String,
    pub amount: f64,
    pub date: NaiveDate,
    #[serde(default)]
    pub description: String,
    pub added_by: String,
    /// Opaque references to receipt files already handed to the storage
    /// collaborator; order is preserved.
    #[serde(default)]
    pub receipts: Vec<String>,
}

/// Edit payload with the same delta semantics as the donation ledger.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpensePatch {
    pub amount: f64,
    #[serde(default)]
    pub adjustment: f64,
    pub category: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub description: String,
    pub added_by: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPayment {
    pub amount: f64,
    pub payment_date: NaiveDate,
    pub paid_by: String,
    pub payment_method: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseFilters {
    pub year: i64,
    pub category: Option<String>,
    pub added_by: Option<String>,
}

const FILTER_WHERE: &str = r#"
        year = ?1
    AND (?2 IS NULL OR category = ?2)
    AND (?3 IS NULL OR added_by = ?3)
"#;

#[derive(sqlx::FromRow)]
struct ExpenseRow {
    #[sqlx(flatten)]
    expense: Expense,
    total_paid: f64,
}

pub async fn create(
    pool: &SqlitePool,
    principal: &Principal,
    ip: &str,
    new: NewExpense,
) -> Result<ExpenseView> {
    validate_amount(new.amount)?;
    let category = ExpenseCategory::parse(&new.category)
        .ok_or_else(|| LedgerError::Validation(format!("unknown category: {}", new.category)))?;
    if new.added_by.trim().is_empty() {
        return Err(LedgerError::Validation("addedBy is required".to_string()));
    }

    let year = i64::from(new.date.year());
    let mut tx = pool.begin().await?;
    let id = sqlx::query(
        r#"
        INSERT INTO expenses (category, amount, date, description, added_by, year)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
    )
    .bind(category.as_str())
    .bind(new.amount)
    .bind(new.date)
    .bind(&new.description)
    .bind(&new.added_by)
    .bind(year)
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    for (position, file_ref) in new.receipts.iter().enumerate() {
        sqlx::query("INSERT INTO receipts (expense_id, file_ref, position) VALUES (?1, ?2, ?3)")
            .bind(id)
            .bind(file_ref)
            .bind(position as i64)
            .execute(&mut *tx)
            .await?;
    }

    audit::record(&mut tx, &principal.username, AuditAction::AddExpense, ENTITY_EXPENSE, id, ip)
        .await?;
    tx.commit().await?;

    get(pool, id).await
}

pub async fn update(
    pool: &SqlitePool,
    principal: &Principal,
    ip: &str,
    id: i64,
    patch: ExpensePatch,
) -> Result<ExpenseView> {
    if !patch.adjustment.is_finite() {
        return Err(LedgerError::Validation("adjustment must be a finite number".to_string()));
    }
    let category = ExpenseCategory::parse(&patch.category)
        .ok_or_else(|| LedgerError::Validation(format!("unknown category: {}", patch.category)))?;
    let year = i64::from(patch.date.year());

    let current = get(pool, id).await?;
    if (current.expense.amount - patch.amount).abs() > f64::EPSILON {
        tracing::warn!(
            "expense {id}: caller base {} differs from stored amount {}",
            patch.amount,
            current.expense.amount
        );
    }

    let mut tx = pool.begin().await?;
    let updated = sqlx::query(
        r#"
        UPDATE expenses
        SET    amount = amount + ?1, category = ?2, date = ?3, description = ?4,
               added_by = ?5, year = ?6
        WHERE  id = ?7
        "#,
    )
    .bind(patch.adjustment)
    .bind(category.as_str())
    .bind(patch.date)
    .bind(&patch.description)
    .bind(&patch.added_by)
    .bind(year)
    .bind(id)
    .execute(&mut *tx)
    .await
    .map_err(|e| map_check_violation(e, "adjustment would make the amount negative"))?
    .rows_affected();

    if updated == 0 {
        return Err(LedgerError::NotFound(format!("expense {id}")));
    }

    audit::record(&mut tx, &principal.username, AuditAction::EditExpense, ENTITY_EXPENSE, id, ip)
        .await?;
    tx.commit().await?;

    get(pool, id).await
}

/// One expense with derived totals and receipt references.
pub async fn get(pool: &SqlitePool, id: i64) -> Result<ExpenseView> {
    let row = sqlx::query_as::<_, ExpenseRow>(
        r#"
        SELECT e.id, e.category, e.amount, e.date, e.description, e.added_by, e.year,
               COALESCE((SELECT SUM(p.amount) FROM payments p WHERE p.expense_id = e.id), 0.0) AS total_paid
        FROM   expenses e
        WHERE  e.id = ?1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| LedgerError::NotFound(format!("expense {id}")))?;

    into_view(pool, row).await
}

/// One page of expenses matching the filters, ordered by id ascending.
pub async fn list(
    pool: &SqlitePool,
    filters: &ExpenseFilters,
    page: i64,
    page_size: i64,
) -> Result<Page<ExpenseView>> {
    let total: (i64,) = sqlx::query_as(&format!(
        "SELECT COUNT(*) FROM expenses WHERE {FILTER_WHERE}"
    ))
    .bind(filters.year)
    .bind(&filters.category)
    .bind(&filters.added_by)
    .fetch_one(pool)
    .await?;

    let rows = sqlx::query_as::<_, ExpenseRow>(&format!(
        r#"
        SELECT id, category, amount, date, description, added_by, year,
               COALESCE((SELECT SUM(p.amount) FROM payments p WHERE p.expense_id = expenses.id), 0.0) AS total_paid
        FROM   expenses
        WHERE  {FILTER_WHERE}
        ORDER  BY id ASC
        LIMIT  ?4 OFFSET ?5
        "#
    ))
    .bind(filters.year)
    .bind(&filters.category)
    .bind(&filters.added_by)
    .bind(page_size)
    .bind(page * page_size)
    .fetch_all(pool)
    .await?;

    let mut views = Vec::with_capacity(rows.len());
    for row in rows {
        views.push(into_view(pool, row).await?);
    }
    Ok(Page::new(views, total.0, page_size))
}

/// Sum of agreed amounts over every record matching the filters.
pub async fn total_for_filters(pool: &SqlitePool, filters: &ExpenseFilters) -> Result<f64> {
    let row: (f64,) = sqlx::query_as(&format!(
        "SELECT COALESCE(SUM(amount), 0.0) FROM expenses WHERE {FILTER_WHERE}"
    ))
    .bind(filters.year)
    .bind(&filters.category)
    .bind(&filters.added_by)
    .fetch_one(pool)
    .await?;
    Ok(row.0)
}

/// Sum of recorded payments across every expense matching the filters.
pub async fn total_paid_for_filters(pool: &SqlitePool, filters: &ExpenseFilters) -> Result<f64> {
    let row: (f64,) = sqlx::query_as(&format!(
        r#"
        SELECT COALESCE(SUM(p.amount), 0.0)
        FROM   payments p
        JOIN   expenses e ON e.id = p.expense_id
        WHERE  e.{FILTER_WHERE_QUALIFIED}
        "#,
    ))
    .bind(filters.year)
    .bind(&filters.category)
    .bind(&filters.added_by)
    .fetch_one(pool)
    .await?;
    Ok(row.0)
}

const FILTER_WHERE_QUALIFIED: &str = r#"year = ?1
    AND (?2 IS NULL OR e.category = ?2)
    AND (?3 IS NULL OR e.added_by = ?3)
"#;

/// Record an installment against an expense.  Payments are append-only;
/// corrections are made by adding another record.
pub async fn add_payment(
    pool: &SqlitePool,
    principal: &Principal,
    ip: &str,
    expense_id: i64,
    new: NewPayment,
) -> Result<Payment> {
    if !new.amount.is_finite() || new.amount <= 0.0 {
        return Err(LedgerError::Validation(
            "payment amount must be a positive number".to_string(),
        ));
    }
    if new.paid_by.trim().is_empty() {
        return Err(LedgerError::Validation("paidBy is required".to_string()));
    }
    ensure_expense_exists(pool, expense_id).await?;

    let mut tx = pool.begin().await?;
    let id = sqlx::query(
        r#"
        INSERT INTO payments (expense_id, amount, payment_date, paid_by, payment_method, note)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
    )
    .bind(expense_id)
    .bind(new.amount)
    .bind(new.payment_date)
    .bind(&new.paid_by)
    .bind(&new.payment_method)
    .bind(&new.note)
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    audit::record(&mut tx, &principal.username, AuditAction::AddPayment, ENTITY_PAYMENT, id, ip)
        .await?;
    tx.commit().await?;

    sqlx::query_as::<_, Payment>(
        r#"
        SELECT id, expense_id, amount, payment_date, paid_by, payment_method, note
        FROM   payments
        WHERE  id = ?1
        "#,
    )
    .bind(id)
    .fetch_one(pool)
    .await
    .map_err(Into::into)
}

/// Full payment history for one expense, oldest first.
pub async fn payments_for(pool: &SqlitePool, expense_id: i64) -> Result<Vec<Payment>> {
    ensure_expense_exists(pool, expense_id).await?;
    let rows = sqlx::query_as::<_, Payment>(
        r#"
        SELECT id, expense_id, amount, payment_date, paid_by, payment_method, note
        FROM   payments
        WHERE  expense_id = ?1
        ORDER  BY id ASC
        "#,
    )
    .bind(expense_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

async fn ensure_expense_exists(pool: &SqlitePool, expense_id: i64) -> Result<()> {
    let row: (i64,) = sqlx::query_as("SELECT EXISTS (SELECT 1 FROM expenses WHERE id = ?1)")
        .bind(expense_id)
        .fetch_one(pool)
        .await?;
    if row.0 == 0 {
        return Err(LedgerError::NotFound(format!("expense {expense_id}")));
    }
    Ok(())
}

async fn into_view(pool: &SqlitePool, row: ExpenseRow) -> Result<ExpenseView> {
    let receipts: Vec<(String,)> = sqlx::query_as(
        "SELECT file_ref FROM receipts WHERE expense_id = ?1 ORDER BY position ASC",
    )
    .bind(row.expense.id)
    .fetch_all(pool)
    .await?;

    // Balance may go negative when overpaid; deliberately not clamped.
    let balance_amount = row.expense.amount - row.total_paid;
    Ok(ExpenseView {
        expense: row.expense,
        total_paid: row.total_paid,
        balance_amount,
        receipts: receipts.into_iter().map(|(r,)| r).collect(),
    })
}

fn validate_amount(amount: f64) -> Result<()> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(LedgerError::Validation(
            "amount must be a non-negative number".to_string(),
        ));
    }
    Ok(())
}
