//! Read-side aggregation over both ledgers for a given year.
//!
//! Everything here is recomputed on demand from the live tables; exports
//! consume these same numbers, never a separate computation path.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;
use sqlx::SqlitePool;

use crate::errors::Result;

/// A single point in a sparse daily series.  Days without activity are
/// omitted, not zero-filled.
#[derive(Debug, Clone, Serialize)]
pub struct DailyPoint {
    pub date: NaiveDate,
    pub amount: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total_donations: f64,
    pub total_expenses: f64,
    pub balance: f64,
    pub daily_donations: Vec<DailyPoint>,
    pub daily_expenses: Vec<DailyPoint>,
    pub expense_by_category: BTreeMap<String, f64>,
    pub payment_mode_breakdown: BTreeMap<String, f64>,
}

pub async fn summary(pool: &SqlitePool, year: i64) -> Result<Summary> {
    let total_donations: (f64,) =
        sqlx::query_as("SELECT COALESCE(SUM(amount), 0.0) FROM donations WHERE year = ?1")
            .bind(year)
            .fetch_one(pool)
            .await?;
    let total_expenses: (f64,) =
        sqlx::query_as("SELECT COALESCE(SUM(amount), 0.0) FROM expenses WHERE year = ?1")
            .bind(year)
            .fetch_one(pool)
            .await?;

    let daily_donations = daily_series(pool, "donations", year).await?;
    let daily_expenses = daily_series(pool, "expenses", year).await?;

    let by_category: Vec<(String, f64)> = sqlx::query_as(
        "SELECT category, SUM(amount) FROM expenses WHERE year = ?1 GROUP BY category",
    )
    .bind(year)
    .fetch_all(pool)
    .await?;

    let by_mode: Vec<(String, f64)> = sqlx::query_as(
        "SELECT payment_mode, SUM(amount) FROM donations WHERE year = ?1 GROUP BY payment_mode",
    )
    .bind(year)
    .fetch_all(pool)
    .await?;

    Ok(Summary {
        total_donations: total_donations.0,
        total_expenses: total_expenses.0,
        balance: total_donations.0 - total_expenses.0,
        daily_donations,
        daily_expenses,
        expense_by_category: by_category.into_iter().collect(),
        payment_mode_breakdown: by_mode.into_iter().collect(),
    })
}

async fn daily_series(pool: &SqlitePool, table: &str, year: i64) -> Result<Vec<DailyPoint>> {
    // `table` is one of two literals from this module, never user input.
    let rows: Vec<(NaiveDate, f64)> = sqlx::query_as(&format!(
        "SELECT date, SUM(amount) FROM {table} WHERE year = ?1 GROUP BY date ORDER BY date ASC"
    ))
    .bind(year)
    .fetch_all(pool)
    .await?;
    Ok(rows
        .into_iter()
        .map(|(date, amount)| DailyPoint { date, amount })
        .collect())
}
