//! Axum REST API handlers.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::audit::{self, AuditFilters, ENTITY_AUDIT_LOG, ENTITY_DONATION};
use crate::auth::{authorize, ClientIp, Operation, Principal};
use crate::config::Config;
use crate::donations::{self, DonationFilters, DonationPatch, NewDonation};
use crate::errors::{LedgerError, Result};
use crate::expenses::{self, ExpenseFilters, ExpensePatch, NewExpense, NewPayment};
use crate::export;
use crate::models::{AuditAction, Donation, ExpenseView, Page};
use crate::stats;

#[derive(Clone)]
pub struct ApiState {
    pub pool: SqlitePool,
    pub config: Config,
}

pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/donations/exists", get(donation_exists))
        .route("/donations", get(list_donations).post(create_donation))
        .route("/donations/:id", axum::routing::put(update_donation))
        .route("/expenses", get(list_expenses).post(create_expense))
        .route("/expenses/:id", axum::routing::put(update_expense))
        .route(
            "/expenses/:id/payments",
            get(list_payments).post(add_payment),
        )
        .route("/stats/summary", get(get_summary))
        .route("/audit-logs", get(query_audit))
        .route("/audit-logs/export", get(export_audit))
        .route("/export/donations", get(export_donations))
        .with_state(state)
}

// ─────────────────────────────────────────────────────────
// Request / response shapes
// ─────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExistsParams {
    pub building: String,
    pub room_number: String,
    pub year: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DonationListParams {
    pub year: Option<i64>,
    pub building: Option<String>,
    pub payment_mode: Option<String>,
    pub date: Option<NaiveDate>,
    pub page: Option<i64>,
    pub size: Option<i64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseListParams {
    pub year: Option<i64>,
    pub category: Option<String>,
    pub added_by: Option<String>,
    pub page: Option<i64>,
    pub size: Option<i64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditListParams {
    pub username: Option<String>,
    pub action: Option<String>,
    pub entity_type: Option<String>,
    pub year: Option<i64>,
    pub page: Option<i64>,
    pub size: Option<i64>,
}

impl AuditListParams {
    fn filters(&self) -> AuditFilters {
        AuditFilters {
            username: self.username.clone(),
            action: self.action.clone(),
            entity_type: self.entity_type.clone(),
            year: self.year,
        }
    }
}

#[derive(Deserialize)]
pub struct YearParam {
    pub year: Option<i64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DonationListResponse {
    #[serde(flatten)]
    pub page: Page<Donation>,
    /// Sum over every matching record, independent of pagination.
    pub total_amount: f64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseListResponse {
    #[serde(flatten)]
    pub page: Page<ExpenseView>,
    pub total_amount: f64,
    pub total_paid: f64,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

// ─────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `GET /donations/exists` — must return `false` before a create succeeds.
pub async fn donation_exists(
    State(state): State<Arc<ApiState>>,
    principal: Principal,
    Query(params): Query<ExistsParams>,
) -> Result<Json<bool>> {
    authorize(&principal, Operation::ReadLedger, state.config.open_entry)?;
    let found =
        donations::exists(&state.pool, &params.building, &params.room_number, params.year).await?;
    Ok(Json(found))
}

/// `POST /donations`
pub async fn create_donation(
    State(state): State<Arc<ApiState>>,
    principal: Principal,
    ClientIp(ip): ClientIp,
    Json(new): Json<NewDonation>,
) -> Result<impl IntoResponse> {
    authorize(&principal, Operation::CreateDonation, state.config.open_entry)?;
    let donation = donations::create(&state.pool, &principal, &ip, new).await?;
    Ok((StatusCode::CREATED, Json(donation)))
}

/// `PUT /donations/:id` — patch plus a signed adjustment delta.
pub async fn update_donation(
    State(state): State<Arc<ApiState>>,
    principal: Principal,
    ClientIp(ip): ClientIp,
    Path(id): Path<i64>,
    Json(patch): Json<DonationPatch>,
) -> Result<Json<Donation>> {
    authorize(&principal, Operation::EditDonation, state.config.open_entry)?;
    let donation = donations::update(&state.pool, &principal, &ip, id, patch).await?;
    Ok(Json(donation))
}

/// `GET /donations`
pub async fn list_donations(
    State(state): State<Arc<ApiState>>,
    principal: Principal,
    Query(params): Query<DonationListParams>,
) -> Result<Json<DonationListResponse>> {
    authorize(&principal, Operation::ReadLedger, state.config.open_entry)?;
    let (page, size) = page_params(params.page, params.size)?;
    let filters = DonationFilters {
        year: params.year.unwrap_or_else(current_year),
        building: params.building,
        payment_mode: params.payment_mode,
        date: params.date,
    };
    let listing = donations::list(&state.pool, &filters, page, size).await?;
    let total_amount = donations::total_for_filters(&state.pool, &filters).await?;
    Ok(Json(DonationListResponse {
        page: listing,
        total_amount,
    }))
}

/// `POST /expenses`
pub async fn create_expense(
    State(state): State<Arc<ApiState>>,
    principal: Principal,
    ClientIp(ip): ClientIp,
    Json(new): Json<NewExpense>,
) -> Result<impl IntoResponse> {
    authorize(&principal, Operation::CreateExpense, state.config.open_entry)?;
    let expense = expenses::create(&state.pool, &principal, &ip, new).await?;
    Ok((StatusCode::CREATED, Json(expense)))
}

/// `PUT /expenses/:id`
pub async fn update_expense(
    State(state): State<Arc<ApiState>>,
    principal: Principal,
    ClientIp(ip): ClientIp,
    Path(id): Path<i64>,
    Json(patch): Json<ExpensePatch>,
) -> Result<Json<ExpenseView>> {
    authorize(&principal, Operation::EditExpense, state.config.open_entry)?;
    let expense = expenses::update(&state.pool, &principal, &ip, id, patch).await?;
    Ok(Json(expense))
}

/// `GET /expenses`
pub async fn list_expenses(
    State(state): State<Arc<ApiState>>,
    principal: Principal,
    Query(params): Query<ExpenseListParams>,
) -> Result<Json<ExpenseListResponse>> {
    authorize(&principal, Operation::ReadLedger, state.config.open_entry)?;
    let (page, size) = page_params(params.page, params.size)?;
    let filters = ExpenseFilters {
        year: params.year.unwrap_or_else(current_year),
        category: params.category,
        added_by: params.added_by,
    };
    let listing = expenses::list(&state.pool, &filters, page, size).await?;
    let total_amount = expenses::total_for_filters(&state.pool, &filters).await?;
    let total_paid = expenses::total_paid_for_filters(&state.pool, &filters).await?;
    Ok(Json(ExpenseListResponse {
        page: listing,
        total_amount,
        total_paid,
    }))
}

/// `POST /expenses/:id/payments`
pub async fn add_payment(
    State(state): State<Arc<ApiState>>,
    principal: Principal,
    ClientIp(ip): ClientIp,
    Path(id): Path<i64>,
    Json(new): Json<NewPayment>,
) -> Result<impl IntoResponse> {
    authorize(&principal, Operation::AddPayment, state.config.open_entry)?;
    let payment = expenses::add_payment(&state.pool, &principal, &ip, id, new).await?;
    Ok((StatusCode::CREATED, Json(payment)))
}

/// `GET /expenses/:id/payments`
pub async fn list_payments(
    State(state): State<Arc<ApiState>>,
    principal: Principal,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    authorize(&principal, Operation::ReadLedger, state.config.open_entry)?;
    let payments = expenses::payments_for(&state.pool, id).await?;
    Ok(Json(payments))
}

/// `GET /stats/summary`
pub async fn get_summary(
    State(state): State<Arc<ApiState>>,
    principal: Principal,
    Query(params): Query<YearParam>,
) -> Result<impl IntoResponse> {
    authorize(&principal, Operation::ReadLedger, state.config.open_entry)?;
    let year = params.year.unwrap_or_else(current_year);
    let summary = stats::summary(&state.pool, year).await?;
    Ok(Json(summary))
}

/// `GET /audit-logs`
pub async fn query_audit(
    State(state): State<Arc<ApiState>>,
    principal: Principal,
    Query(params): Query<AuditListParams>,
) -> Result<impl IntoResponse> {
    authorize(&principal, Operation::QueryAudit, state.config.open_entry)?;
    let (page, size) = page_params(params.page, params.size)?;
    let listing = audit::query(&state.pool, &params.filters(), page, size).await?;
    Ok(Json(listing))
}

/// `GET /audit-logs/export`
pub async fn export_audit(
    State(state): State<Arc<ApiState>>,
    principal: Principal,
    ClientIp(ip): ClientIp,
    Query(params): Query<AuditListParams>,
) -> Result<impl IntoResponse> {
    authorize(&principal, Operation::ExportAudit, state.config.open_entry)?;
    let entries = audit::query_all(&state.pool, &params.filters()).await?;
    let body = export::audit_csv(&entries);
    audit::record_standalone(
        &state.pool,
        &principal.username,
        AuditAction::ExportAudit,
        ENTITY_AUDIT_LOG,
        &ip,
    )
    .await?;
    Ok(csv_response("audit-logs.csv", body))
}

/// `GET /export/donations`
pub async fn export_donations(
    State(state): State<Arc<ApiState>>,
    principal: Principal,
    ClientIp(ip): ClientIp,
    Query(params): Query<YearParam>,
) -> Result<impl IntoResponse> {
    authorize(&principal, Operation::ExportDonations, state.config.open_entry)?;
    let year = params.year.unwrap_or_else(current_year);
    let rows = donations::list_all_for_year(&state.pool, year).await?;
    let body = export::donations_csv(&rows);
    audit::record_standalone(
        &state.pool,
        &principal.username,
        AuditAction::ExportDonations,
        ENTITY_DONATION,
        &ip,
    )
    .await?;
    Ok(csv_response(&format!("donations-{year}.csv"), body))
}

// ─────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────

fn current_year() -> i64 {
    i64::from(Utc::now().year())
}

/// Zero-based page, caller-chosen size; any positive size is accepted.
fn page_params(page: Option<i64>, size: Option<i64>) -> Result<(i64, i64)> {
    let page = page.unwrap_or(0);
    let size = size.unwrap_or(20);
    if page < 0 {
        return Err(LedgerError::Validation("page must not be negative".to_string()));
    }
    if size < 1 {
        return Err(LedgerError::Validation("page size must be positive".to_string()));
    }
    Ok((page, size))
}

fn csv_response(filename: &str, body: Vec<u8>) -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        body,
    )
}
