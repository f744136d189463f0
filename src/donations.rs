//! Donation ledger — room-wise contribution records.
//!
//! At most one donation exists per (building, room, year).  The exists
//! check catches the common case up front; the UNIQUE constraint in the
//! schema is the backstop against two concurrent creates.

use chrono::{Datelike, NaiveDate};
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::audit::{self, ENTITY_DONATION};
use crate::auth::Principal;
use crate::errors::{map_check_violation, map_unique_violation, LedgerError, Result};
use crate::models::{AuditAction, Donation, Page, PaymentMode};
use crate::topology;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDonation {
    pub building: String,
    pub room_number: String,
    pub amount: f64,
    pub payment_mode: String,
    pub date: NaiveDate,
    pub remarks: Option<String>,
}

/// Edit payload.  `amount` is the caller's known base; `adjustment` is the
/// signed delta.  The stored amount is incremented atomically in SQL, so
/// two concurrent adjustments both land rather than one clobbering the
/// other with a stale total.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DonationPatch {
    pub amount: f64,
    #[serde(default)]
    pub adjustment: f64,
    pub payment_mode: String,
    pub date: NaiveDate,
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DonationFilters {
    pub year: i64,
    pub building: Option<String>,
    pub payment_mode: Option<String>,
    pub date: Option<NaiveDate>,
}

const FILTER_WHERE: &str = r#"
        year = ?1
    AND (?2 IS NULL OR building = ?2)
    AND (?3 IS NULL OR payment_mode = ?3)
    AND (?4 IS NULL OR date = ?4)
"#;

/// True iff a donation already exists for the given room and year.
pub async fn exists(
    pool: &SqlitePool,
    building: &str,
    room_number: &str,
    year: i64,
) -> Result<bool> {
    let row: (i64,) = sqlx::query_as(
        "SELECT EXISTS (SELECT 1 FROM donations WHERE building = ?1 AND room_number = ?2 AND year = ?3)",
    )
    .bind(building)
    .bind(room_number)
    .bind(year)
    .fetch_one(pool)
    .await?;
    Ok(row.0 != 0)
}

pub async fn create(
    pool: &SqlitePool,
    principal: &Principal,
    ip: &str,
    new: NewDonation,
) -> Result<Donation> {
    validate_amount(new.amount)?;
    let mode = PaymentMode::parse(&new.payment_mode).ok_or_else(|| {
        LedgerError::Validation(format!("unknown payment mode: {}", new.payment_mode))
    })?;
    topology::validate_room(&new.building, &new.room_number)?;

    let year = i64::from(new.date.year());
    if exists(pool, &new.building, &new.room_number, year).await? {
        return Err(LedgerError::DuplicateEntry(format!(
            "donation already recorded for {} room {} in {year}; update the existing record instead",
            new.building, new.room_number
        )));
    }

    let mut tx = pool.begin().await?;
    let id = sqlx::query(
        r#"
        INSERT INTO donations (building, room_number, amount, payment_mode, date, remarks, year)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
    )
    .bind(&new.building)
    .bind(&new.room_number)
    .bind(new.amount)
    .bind(mode.as_str())
    .bind(new.date)
    .bind(&new.remarks)
    .bind(year)
    .execute(&mut *tx)
    .await
    .map_err(|e| map_unique_violation(e, "donation already recorded for this room and year"))?
    .last_insert_rowid();

    audit::record(&mut tx, &principal.username, AuditAction::AddDonation, ENTITY_DONATION, id, ip)
        .await?;
    tx.commit().await?;

    fetch(pool, id).await
}

pub async fn update(
    pool: &SqlitePool,
    principal: &Principal,
    ip: &str,
    id: i64,
    patch: DonationPatch,
) -> Result<Donation> {
    if !patch.adjustment.is_finite() {
        return Err(LedgerError::Validation("adjustment must be a finite number".to_string()));
    }
    let mode = PaymentMode::parse(&patch.payment_mode).ok_or_else(|| {
        LedgerError::Validation(format!("unknown payment mode: {}", patch.payment_mode))
    })?;
    let year = i64::from(patch.date.year());

    // The delta is applied to the stored amount, not the caller's base, so
    // a stale base never loses a concurrent adjustment.  Surface the skew
    // for operators when it happens.
    let current = fetch(pool, id).await?;
    if (current.amount - patch.amount).abs() > f64::EPSILON {
        tracing::warn!(
            "donation {id}: caller base {} differs from stored amount {}",
            patch.amount,
            current.amount
        );
    }

    let mut tx = pool.begin().await?;
    let updated = sqlx::query(
        r#"
        UPDATE donations
        SET    amount = amount + ?1, payment_mode = ?2, date = ?3, remarks = ?4, year = ?5
        WHERE  id = ?6
        "#,
    )
    .bind(patch.adjustment)
    .bind(mode.as_str())
    .bind(patch.date)
    .bind(&patch.remarks)
    .bind(year)
    .bind(id)
    .execute(&mut *tx)
    .await
    .map_err(|e| {
        match map_unique_violation(e, "another donation already exists for this room and year") {
            LedgerError::Database(e) => {
                map_check_violation(e, "adjustment would make the amount negative")
            }
            other => other,
        }
    })?
    .rows_affected();

    if updated == 0 {
        return Err(LedgerError::NotFound(format!("donation {id}")));
    }

    audit::record(&mut tx, &principal.username, AuditAction::EditDonation, ENTITY_DONATION, id, ip)
        .await?;
    tx.commit().await?;

    fetch(pool, id).await
}

/// One page of donations matching the filters, ordered by id ascending.
pub async fn list(
    pool: &SqlitePool,
    filters: &DonationFilters,
    page: i64,
    page_size: i64,
) -> Result<Page<Donation>> {
    let total: (i64,) = sqlx::query_as(&format!(
        "SELECT COUNT(*) FROM donations WHERE {FILTER_WHERE}"
    ))
    .bind(filters.year)
    .bind(&filters.building)
    .bind(&filters.payment_mode)
    .bind(filters.date)
    .fetch_one(pool)
    .await?;

    let rows = sqlx::query_as::<_, Donation>(&format!(
        r#"
        SELECT id, building, room_number, amount, payment_mode, date, remarks, year
        FROM   donations
        WHERE  {FILTER_WHERE}
        ORDER  BY id ASC
        LIMIT  ?5 OFFSET ?6
        "#
    ))
    .bind(filters.year)
    .bind(&filters.building)
    .bind(&filters.payment_mode)
    .bind(filters.date)
    .bind(page_size)
    .bind(page * page_size)
    .fetch_all(pool)
    .await?;

    Ok(Page::new(rows, total.0, page_size))
}

/// Sum of amounts over every record matching the filters, independent of
/// pagination.
pub async fn total_for_filters(pool: &SqlitePool, filters: &DonationFilters) -> Result<f64> {
    let row: (f64,) = sqlx::query_as(&format!(
        "SELECT COALESCE(SUM(amount), 0.0) FROM donations WHERE {FILTER_WHERE}"
    ))
    .bind(filters.year)
    .bind(&filters.building)
    .bind(&filters.payment_mode)
    .bind(filters.date)
    .fetch_one(pool)
    .await?;
    Ok(row.0)
}

/// Every donation for a year, for the spreadsheet export.
pub async fn list_all_for_year(pool: &SqlitePool, year: i64) -> Result<Vec<Donation>> {
    let rows = sqlx::query_as::<_, Donation>(
        r#"
        SELECT id, building, room_number, amount, payment_mode, date, remarks, year
        FROM   donations
        WHERE  year = ?1
        ORDER  BY id ASC
        "#,
    )
    .bind(year)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

async fn fetch(pool: &SqlitePool, id: i64) -> Result<Donation> {
    sqlx::query_as::<_, Donation>(
        r#"
        SELECT id, building, room_number, amount, payment_mode, date, remarks, year
        FROM   donations
        WHERE  id = ?1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| LedgerError::NotFound(format!("donation {id}")))
}

fn validate_amount(amount: f64) -> Result<()> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(LedgerError::Validation(
            "amount must be a non-negative number".to_string(),
        ));
    }
    Ok(())
}
