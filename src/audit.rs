//! Audit trail — one append-only row per successful mutating call.
//!
//! [`record`] runs on the caller's transaction so the domain write and its
//! trail entry commit together or not at all.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::errors::Result;
use crate::models::{AuditAction, AuditEntry, Page};

/// Entity type tags stored alongside the action.
pub const ENTITY_DONATION: &str = "DONATION";
pub const ENTITY_EXPENSE: &str = "EXPENSE";
pub const ENTITY_PAYMENT: &str = "PAYMENT";
pub const ENTITY_AUDIT_LOG: &str = "AUDIT_LOG";

/// Append a trail entry on an open transaction.
pub async fn record(
    tx: &mut Transaction<'_, Sqlite>,
    username: &str,
    action: AuditAction,
    entity_type: &str,
    entity_id: i64,
    ip_address: &str,
) -> Result<()> {
    let now: DateTime<Utc> = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO audit_log (timestamp, username, action, entity_type, entity_id, ip_address)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
    )
    .bind(now)
    .bind(username)
    .bind(action.as_str())
    .bind(entity_type)
    .bind(entity_id)
    .bind(ip_address)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Filters for querying the trail.  All optional; `year` filters on the
/// entry timestamp's calendar year.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditFilters {
    pub username: Option<String>,
    pub action: Option<String>,
    pub entity_type: Option<String>,
    pub year: Option<i64>,
}

const FILTER_WHERE: &str = r#"
        (?1 IS NULL OR username = ?1)
    AND (?2 IS NULL OR action = ?2)
    AND (?3 IS NULL OR entity_type = ?3)
    AND (?4 IS NULL OR CAST(strftime('%Y', timestamp) AS INTEGER) = ?4)
"#;

/// One page of trail entries, newest first.
pub async fn query(
    pool: &SqlitePool,
    filters: &AuditFilters,
    page: i64,
    page_size: i64,
) -> Result<Page<AuditEntry>> {
    let total: (i64,) = sqlx::query_as(&format!(
        "SELECT COUNT(*) FROM audit_log WHERE {FILTER_WHERE}"
    ))
    .bind(&filters.username)
    .bind(&filters.action)
    .bind(&filters.entity_type)
    .bind(filters.year)
    .fetch_one(pool)
    .await?;

    let rows = sqlx::query_as::<_, AuditEntry>(&format!(
        r#"
        SELECT id, timestamp, username, action, entity_type, entity_id, ip_address
        FROM   audit_log
        WHERE  {FILTER_WHERE}
        ORDER  BY id DESC
        LIMIT  ?5 OFFSET ?6
        "#
    ))
    .bind(&filters.username)
    .bind(&filters.action)
    .bind(&filters.entity_type)
    .bind(filters.year)
    .bind(page_size)
    .bind(page * page_size)
    .fetch_all(pool)
    .await?;

    Ok(Page::new(rows, total.0, page_size))
}

/// Every trail entry matching the filters, for export.
pub async fn query_all(pool: &SqlitePool, filters: &AuditFilters) -> Result<Vec<AuditEntry>> {
    let rows = sqlx::query_as::<_, AuditEntry>(&format!(
        r#"
        SELECT id, timestamp, username, action, entity_type, entity_id, ip_address
        FROM   audit_log
        WHERE  {FILTER_WHERE}
        ORDER  BY id DESC
        "#
    ))
    .bind(&filters.username)
    .bind(&filters.action)
    .bind(&filters.entity_type)
    .bind(filters.year)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Record an export action in its own transaction.  Exports mutate nothing,
/// so there is no domain write to pair with.
pub async fn record_standalone(
    pool: &SqlitePool,
    username: &str,
    action: AuditAction,
    entity_type: &str,
    ip_address: &str,
) -> Result<()> {
    let mut tx = pool.begin().await?;
    record(&mut tx, username, action, entity_type, 0, ip_address).await?;
    tx.commit().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[tokio::test]
    async fn record_and_query_by_filters() {
        let pool = db::test_pool().await;
        let mut tx = pool.begin().await.unwrap();
        record(&mut tx, "secretary", AuditAction::AddDonation, ENTITY_DONATION, 1, "10.0.0.1")
            .await
            .unwrap();
        record(&mut tx, "asha", AuditAction::AddExpense, ENTITY_EXPENSE, 7, "10.0.0.2")
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let all = query(&pool, &AuditFilters::default(), 0, 20).await.unwrap();
        assert_eq!(all.total_elements, 2);

        let by_user = AuditFilters {
            username: Some("asha".to_string()),
            ..Default::default()
        };
        let page = query(&pool, &by_user, 0, 20).await.unwrap();
        assert_eq!(page.total_elements, 1);
        assert_eq!(page.content[0].action, "ADD_EXPENSE");
        assert_eq!(page.content[0].entity_id, 7);

        let by_action = AuditFilters {
            action: Some("ADD_DONATION".to_string()),
            ..Default::default()
        };
        assert_eq!(query(&pool, &by_action, 0, 20).await.unwrap().total_elements, 1);
    }

    #[tokio::test]
    async fn uncommitted_entries_roll_back() {
        let pool = db::test_pool().await;
        {
            let mut tx = pool.begin().await.unwrap();
            record(&mut tx, "secretary", AuditAction::AddDonation, ENTITY_DONATION, 1, "unknown")
                .await
                .unwrap();
            // Dropped without commit.
        }
        let all = query(&pool, &AuditFilters::default(), 0, 20).await.unwrap();
        assert_eq!(all.total_elements, 0);
    }

    #[tokio::test]
    async fn year_filter_matches_current_entries() {
        let pool = db::test_pool().await;
        record_standalone(&pool, "secretary", AuditAction::ExportAudit, ENTITY_AUDIT_LOG, "unknown")
            .await
            .unwrap();

        let this_year = chrono::Utc::now().format("%Y").to_string().parse::<i64>().unwrap();
        let hit = AuditFilters {
            year: Some(this_year),
            ..Default::default()
        };
        assert_eq!(query(&pool, &hit, 0, 20).await.unwrap().total_elements, 1);

        let miss = AuditFilters {
            year: Some(this_year - 1),
            ..Default::default()
        };
        assert_eq!(query(&pool, &miss, 0, 20).await.unwrap().total_elements, 0);
    }
}
