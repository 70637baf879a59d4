//! Authentication boundary.
//!
//! Token verification happens at the gateway; this service trusts the
//! forwarded identity headers and converts them into a typed
//! [`AuthContext`] exactly once, at extraction time. Handlers and core
//! code never see raw claim strings.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common::{AttendeeId, AuthContext, Role};
use uuid::Uuid;

use crate::error::ApiError;

/// Header carrying the authenticated subject id.
pub const SUBJECT_HEADER: &str = "x-subject-id";

/// Header carrying the subject's comma-separated role claims.
pub const ROLES_HEADER: &str = "x-roles";

/// Extractor producing the request's [`AuthContext`].
#[derive(Debug, Clone)]
pub struct Identity(pub AuthContext);

impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let subject = parts
            .headers
            .get(SUBJECT_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(ApiError::Unauthorized("missing x-subject-id header"))?;
        let subject = Uuid::parse_str(subject)
            .map_err(|e| ApiError::BadRequest(format!("invalid x-subject-id: {e}")))?;

        let roles = parts
            .headers
            .get(ROLES_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(parse_roles)
            .unwrap_or_default();

        Ok(Identity(AuthContext::new(
            AttendeeId::from_uuid(subject),
            roles,
        )))
    }
}

/// Parses a comma-separated role claim list, dropping unknown entries.
fn parse_roles(csv: &str) -> Vec<Role> {
    csv.split(',').filter_map(Role::parse).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_role_csv() {
        assert_eq!(
            parse_roles("ATTENDEE,ROLE_ADMIN"),
            vec![Role::Attendee, Role::Admin]
        );
        assert_eq!(parse_roles("unknown, attendee"), vec![Role::Attendee]);
        assert!(parse_roles("").is_empty());
    }
}
