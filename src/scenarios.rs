//! End-to-end scenarios across the ledgers, the gate, and the trail.

use axum::extract::FromRequestParts;

use crate::audit::{self, AuditFilters};
use crate::auth::{authorize, Operation, Principal, Role, ROLE_HEADER, USER_HEADER};
use crate::db;
use crate::donations::{self, DonationFilters, DonationPatch, NewDonation};
use crate::errors::LedgerError;
use crate::expenses::{self, NewExpense, NewPayment};
use crate::export;
use crate::models::AuditAction;
use crate::stats;

fn admin() -> Principal {
    Principal {
        username: "secretary".to_string(),
        role: Role::Admin,
    }
}

fn user() -> Principal {
    Principal {
        username: "asha".to_string(),
        role: Role::User,
    }
}

fn donation_d2_101() -> NewDonation {
    NewDonation {
        building: "D-2".to_string(),
        room_number: "101".to_string(),
        amount: 5000.0,
        payment_mode: "UPI".to_string(),
        date: "2024-09-10".parse().unwrap(),
        remarks: None,
    }
}

fn catering_expense() -> NewExpense {
    NewExpense {
        category: "Food".to_string(),
        amount: 10000.0,
        date: "2024-09-01".parse().unwrap(),
        description: "Catering".to_string(),
        added_by: "Alice".to_string(),
        receipts: vec![],
    }
}

fn payment(amount: f64) -> NewPayment {
    NewPayment {
        amount,
        payment_date: "2024-09-05".parse().unwrap(),
        paid_by: "Alice".to_string(),
        payment_method: None,
        note: None,
    }
}

/// Scenario A: create, duplicate rejection, adjustment by +500.
#[tokio::test]
async fn donation_lifecycle() {
    let pool = db::test_pool().await;
    let p = admin();

    let d = donations::create(&pool, &p, "10.0.0.1", donation_d2_101())
        .await
        .unwrap();
    assert_eq!(d.amount, 5000.0);

    let dup = donations::create(&pool, &p, "10.0.0.1", donation_d2_101()).await;
    assert!(matches!(dup, Err(LedgerError::DuplicateEntry(_))));

    let updated = donations::update(
        &pool,
        &p,
        "10.0.0.1",
        d.id,
        DonationPatch {
            amount: d.amount,
            adjustment: 500.0,
            payment_mode: d.payment_mode.clone(),
            date: d.date,
            remarks: d.remarks.clone(),
        },
    )
    .await
    .unwrap();
    assert_eq!(updated.amount, 5500.0);
}

/// Scenario B: two installments reconcile into paid/balance.
#[tokio::test]
async fn expense_installments() {
    let pool = db::test_pool().await;
    let p = admin();

    let e = expenses::create(&pool, &p, "10.0.0.1", catering_expense())
        .await
        .unwrap();
    expenses::add_payment(&pool, &p, "10.0.0.1", e.expense.id, payment(4000.0))
        .await
        .unwrap();
    expenses::add_payment(&pool, &p, "10.0.0.1", e.expense.id, payment(3000.0))
        .await
        .unwrap();

    let view = expenses::get(&pool, e.expense.id).await.unwrap();
    assert_eq!(view.total_paid, 7000.0);
    assert_eq!(view.balance_amount, 3000.0);
}

/// Scenario C: summary reflects both ledgers after A and B.
#[tokio::test]
async fn summary_after_activity() {
    let pool = db::test_pool().await;
    let p = admin();

    let d = donations::create(&pool, &p, "10.0.0.1", donation_d2_101())
        .await
        .unwrap();
    donations::update(
        &pool,
        &p,
        "10.0.0.1",
        d.id,
        DonationPatch {
            amount: d.amount,
            adjustment: 500.0,
            payment_mode: d.payment_mode.clone(),
            date: d.date,
            remarks: None,
        },
    )
    .await
    .unwrap();
    let e = expenses::create(&pool, &p, "10.0.0.1", catering_expense())
        .await
        .unwrap();
    expenses::add_payment(&pool, &p, "10.0.0.1", e.expense.id, payment(4000.0))
        .await
        .unwrap();

    let s = stats::summary(&pool, 2024).await.unwrap();
    assert!(s.total_donations >= 5500.0);
    assert!(s.total_expenses >= 10000.0);
    assert_eq!(s.balance, s.total_donations - s.total_expenses);
    assert!(s.expense_by_category["Food"] >= 10000.0);
}

/// Scenario D: unauthenticated → Unauthorized; USER → Forbidden on export;
/// ADMIN export succeeds.
#[tokio::test]
async fn audit_export_gating() {
    // No identity headers at all.
    let req = axum::http::Request::builder().body(()).unwrap();
    let (mut parts, _) = req.into_parts();
    let anon = Principal::from_request_parts(&mut parts, &()).await;
    assert!(matches!(anon, Err(LedgerError::Unauthorized(_))));

    // Headers present: the extractor resolves the principal.
    let req = axum::http::Request::builder()
        .header(USER_HEADER, "asha")
        .header(ROLE_HEADER, "USER")
        .body(())
        .unwrap();
    let (mut parts, _) = req.into_parts();
    let authed = Principal::from_request_parts(&mut parts, &()).await.unwrap();
    assert_eq!(authed.role, Role::User);

    let denied = authorize(&authed, Operation::ExportAudit, true);
    assert!(matches!(denied, Err(LedgerError::Forbidden(_))));

    // ADMIN walks the full export path.
    let pool = db::test_pool().await;
    let p = admin();
    authorize(&p, Operation::ExportAudit, true).unwrap();
    donations::create(&pool, &p, "10.0.0.1", donation_d2_101())
        .await
        .unwrap();
    let entries = audit::query_all(&pool, &AuditFilters::default()).await.unwrap();
    let csv = String::from_utf8(export::audit_csv(&entries)).unwrap();
    assert!(csv.contains("ADD_DONATION"));
}

/// Scenario E is covered in `donations::tests`; here the cross-cutting
/// property: every successful mutation leaves exactly one new trail entry,
/// and failed ones leave none.
#[tokio::test]
async fn audit_completeness() {
    let pool = db::test_pool().await;
    let p = admin();

    let count = |pool: sqlx::SqlitePool| async move {
        audit::query(&pool, &AuditFilters::default(), 0, 100)
            .await
            .unwrap()
            .total_elements
    };

    let d = donations::create(&pool, &p, "10.0.0.1", donation_d2_101())
        .await
        .unwrap();
    assert_eq!(count(pool.clone()).await, 1);

    // Rejected duplicate: no ledger change, no trail entry.
    let _ = donations::create(&pool, &p, "10.0.0.1", donation_d2_101()).await;
    assert_eq!(count(pool.clone()).await, 1);

    donations::update(
        &pool,
        &p,
        "10.0.0.1",
        d.id,
        DonationPatch {
            amount: d.amount,
            adjustment: 100.0,
            payment_mode: "CASH".to_string(),
            date: d.date,
            remarks: None,
        },
    )
    .await
    .unwrap();
    assert_eq!(count(pool.clone()).await, 2);

    let e = expenses::create(&pool, &p, "10.0.0.1", catering_expense())
        .await
        .unwrap();
    expenses::add_payment(&pool, &p, "10.0.0.1", e.expense.id, payment(500.0))
        .await
        .unwrap();
    assert_eq!(count(pool.clone()).await, 4);

    // Entries carry the actor and entity reference.
    let latest = audit::query(&pool, &AuditFilters::default(), 0, 1).await.unwrap();
    assert_eq!(latest.content[0].username, "secretary");
    assert_eq!(latest.content[0].action, AuditAction::AddPayment.as_str());
    assert_eq!(latest.content[0].ip_address, "10.0.0.1");
}

/// The open-entry deployment lets a USER record entries, while edits stay
/// admin-gated regardless.
#[tokio::test]
async fn mixed_authority_policy() {
    let pool = db::test_pool().await;
    let asha = user();

    authorize(&asha, Operation::CreateDonation, true).unwrap();
    let d = donations::create(&pool, &asha, "10.0.0.2", donation_d2_101())
        .await
        .unwrap();
    assert_eq!(d.amount, 5000.0);

    assert!(matches!(
        authorize(&asha, Operation::EditDonation, true),
        Err(LedgerError::Forbidden(_))
    ));
    // With the strict policy, even creation is closed to USER.
    assert!(matches!(
        authorize(&asha, Operation::CreateDonation, false),
        Err(LedgerError::Forbidden(_))
    ));

    // The trail names the actual submitter.
    let entries = audit::query_all(&pool, &AuditFilters::default()).await.unwrap();
    assert_eq!(entries[0].username, "asha");
}

/// The export totals row equals the live aggregate for the same year.
#[tokio::test]
async fn export_matches_summary() {
    let pool = db::test_pool().await;
    let p = admin();
    donations::create(&pool, &p, "10.0.0.1", donation_d2_101())
        .await
        .unwrap();
    let mut second = donation_d2_101();
    second.room_number = "102".to_string();
    second.amount = 2500.0;
    donations::create(&pool, &p, "10.0.0.1", second).await.unwrap();

    let s = stats::summary(&pool, 2024).await.unwrap();
    let filters = DonationFilters {
        year: 2024,
        ..Default::default()
    };
    assert_eq!(
        donations::total_for_filters(&pool, &filters).await.unwrap(),
        s.total_donations
    );

    let rows = donations::list_all_for_year(&pool, 2024).await.unwrap();
    let csv = String::from_utf8(export::donations_csv(&rows)).unwrap();
    assert!(csv.ends_with(&format!("TOTAL,,,{},,,,\n", s.total_donations)));
}
