//! Typed authentication context.
//!
//! Role claims are parsed exactly once at the service boundary; core code
//! receives the typed context and never re-parses claim strings.

use serde::{Deserialize, Serialize};

use crate::types::AttendeeId;

/// A capability granted to an authenticated subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// A regular attendee acting on their own resources.
    Attendee,
    /// An administrator who may act on any attendee's resources.
    Admin,
}

impl Role {
    /// Parses a single role claim, tolerating the `ROLE_` prefix and casing.
    pub fn parse(raw: &str) -> Option<Role> {
        let r = raw.trim();
        let r = r.strip_prefix("ROLE_").unwrap_or(r);
        if r.eq_ignore_ascii_case("admin") {
            Some(Role::Admin)
        } else if r.eq_ignore_ascii_case("attendee") {
            Some(Role::Attendee)
        } else {
            None
        }
    }
}

/// The authenticated subject and its capabilities for one request.
#[derive(Debug, Clone)]
pub struct AuthContext {
    subject: AttendeeId,
    roles: Vec<Role>,
}

impl AuthContext {
    /// Creates a context for the given subject and roles.
    pub fn new(subject: AttendeeId, roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            subject,
            roles: roles.into_iter().collect(),
        }
    }

    /// Creates a plain attendee context.
    pub fn attendee(subject: AttendeeId) -> Self {
        Self::new(subject, [Role::Attendee])
    }

    /// Creates an administrator context.
    pub fn admin(subject: AttendeeId) -> Self {
        Self::new(subject, [Role::Admin])
    }

    /// Returns the authenticated subject id.
    pub fn subject(&self) -> AttendeeId {
        self.subject
    }

    /// Returns true if the subject carries the given role.
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    /// Returns true if the subject is an administrator.
    pub fn is_admin(&self) -> bool {
        self.has_role(Role::Admin)
    }

    /// Returns true if the subject may act on the given attendee's resources:
    /// either the subject is that attendee, or an administrator.
    pub fn can_act_for(&self, attendee: AttendeeId) -> bool {
        self.is_admin() || self.subject == attendee
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_role_claims() {
        assert_eq!(Role::parse("ADMIN"), Some(Role::Admin));
        assert_eq!(Role::parse("ROLE_ADMIN"), Some(Role::Admin));
        assert_eq!(Role::parse(" attendee "), Some(Role::Attendee));
        assert_eq!(Role::parse("OPERATOR"), None);
    }

    #[test]
    fn attendee_can_act_for_self_only() {
        let me = AttendeeId::new();
        let other = AttendeeId::new();
        let ctx = AuthContext::attendee(me);
        assert!(ctx.can_act_for(me));
        assert!(!ctx.can_act_for(other));
        assert!(!ctx.is_admin());
    }

    #[test]
    fn admin_can_act_for_anyone() {
        let ctx = AuthContext::admin(AttendeeId::new());
        assert!(ctx.can_act_for(AttendeeId::new()));
        assert!(ctx.is_admin());
    }
}
