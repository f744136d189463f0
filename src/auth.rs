//! Identity and role gate.
//!
//! The transport in front of this service verifies credentials and injects
//! identity headers on every request (`x-auth-user`, `x-auth-role`).  The
//! engine resolves the principal fresh from those headers per request and
//! never trusts role hints cached anywhere else.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::errors::LedgerError;

pub const USER_HEADER: &str = "x-auth-user";
pub const ROLE_HEADER: &str = "x-auth-role";
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "USER" => Some(Self::User),
            "ADMIN" => Some(Self::Admin),
            _ => None,
        }
    }
}

/// The acting principal for one request.
#[derive(Debug, Clone)]
pub struct Principal {
    pub username: String,
    pub role: Role,
}

#[async_trait]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = LedgerError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let username = header_str(parts, USER_HEADER)
            .ok_or_else(|| LedgerError::Unauthorized("missing identity".to_string()))?;
        let role = header_str(parts, ROLE_HEADER)
            .and_then(|s| Role::parse(&s))
            .ok_or_else(|| LedgerError::Unauthorized("missing or invalid role".to_string()))?;
        Ok(Principal { username, role })
    }
}

/// Client origin for the audit trail; falls back to the literal `unknown`
/// when the forwarding proxy did not supply one.
#[derive(Debug, Clone)]
pub struct ClientIp(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ip = header_str(parts, FORWARDED_FOR_HEADER)
            .map(|v| v.split(',').next().unwrap_or("").trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "unknown".to_string());
        Ok(ClientIp(ip))
    }
}

fn header_str(parts: &Parts, name: &str) -> Option<String> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
        .filter(|v| !v.is_empty())
}

/// Everything a principal can ask the engine to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    ReadLedger,
    CreateDonation,
    EditDonation,
    CreateExpense,
    EditExpense,
    AddPayment,
    QueryAudit,
    ExportDonations,
    ExportAudit,
}

/// Gate an operation against the principal's role.
///
/// Reads are open to any authenticated principal.  Entry creation (and the
/// initial payment the entry form submits with it) follows the `open_entry`
/// policy knob; edits, audit access, and exports are always ADMIN-only.
pub fn authorize(principal: &Principal, operation: Operation, open_entry: bool) -> crate::errors::Result<()> {
    let allowed = match operation {
        Operation::ReadLedger => true,
        Operation::CreateDonation | Operation::CreateExpense | Operation::AddPayment => {
            open_entry || principal.role == Role::Admin
        }
        Operation::EditDonation
        | Operation::EditExpense
        | Operation::QueryAudit
        | Operation::ExportDonations
        | Operation::ExportAudit => principal.role == Role::Admin,
    };
    if allowed {
        Ok(())
    } else {
        Err(LedgerError::Forbidden(format!(
            "role does not permit {operation:?}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> Principal {
        Principal {
            username: "asha".to_string(),
            role: Role::User,
        }
    }

    fn admin() -> Principal {
        Principal {
            username: "secretary".to_string(),
            role: Role::Admin,
        }
    }

    #[test]
    fn reads_are_open_to_any_principal() {
        assert!(authorize(&user(), Operation::ReadLedger, false).is_ok());
        assert!(authorize(&admin(), Operation::ReadLedger, false).is_ok());
    }

    #[test]
    fn open_entry_policy_gates_creation() {
        assert!(authorize(&user(), Operation::CreateDonation, true).is_ok());
        assert!(authorize(&user(), Operation::CreateDonation, false).is_err());
        assert!(authorize(&admin(), Operation::CreateDonation, false).is_ok());
        assert!(authorize(&user(), Operation::AddPayment, true).is_ok());
    }

    #[test]
    fn edits_and_exports_are_admin_only() {
        for op in [
            Operation::EditDonation,
            Operation::EditExpense,
            Operation::QueryAudit,
            Operation::ExportDonations,
            Operation::ExportAudit,
        ] {
            let denied = authorize(&user(), op, true);
            assert!(matches!(denied, Err(LedgerError::Forbidden(_))), "{op:?}");
            assert!(authorize(&admin(), op, true).is_ok(), "{op:?}");
        }
    }

    #[test]
    fn role_parse_is_strict() {
        assert_eq!(Role::parse("ADMIN"), Some(Role::Admin));
        assert_eq!(Role::parse("admin"), None);
        assert_eq!(Role::parse(""), None);
    }
}
