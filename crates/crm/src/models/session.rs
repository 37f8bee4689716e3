//! Session-stored identity of the logged-in staff member.

use serde::{Deserialize, Serialize};

use merch_crm_core::{Email, UserId};

/// Name of the built-in role with full access.
pub const ADMIN_ROLE: &str = "Administrator";

/// Name of the built-in department whose members see finance and management tools.
pub const MANAGEMENT_DEPARTMENT: &str = "Management";

/// Roles that work with order content but may not see client contact data.
pub const CONTACT_RESTRICTED_ROLES: &[&str] = &["Printer", "Designer"];

/// Session-stored staff identity.
///
/// Role and department are captured at login; changes take effect on the next login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: UserId,
    pub email: Email,
    pub name: String,
    pub role_name: Option<String>,
    pub department_name: Option<String>,
}

impl CurrentUser {
    /// Holds the "Administrator" role.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role_name.as_deref() == Some(ADMIN_ROLE)
    }

    /// Administrators and members of the "Management" department.
    #[must_use]
    pub fn is_management(&self) -> bool {
        self.is_admin() || self.department_name.as_deref() == Some(MANAGEMENT_DEPARTMENT)
    }

    /// Printers and designers see `HIDDEN` instead of client phone and email.
    #[must_use]
    pub fn hides_client_contacts(&self) -> bool {
        self.role_name
            .as_deref()
            .is_some_and(|role| CONTACT_RESTRICTED_ROLES.contains(&role))
    }
}

/// Session keys for authentication data.
pub mod keys {
    /// Key for storing the current logged-in user.
    pub const CURRENT_USER: &str = "current_user";
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn user(role: Option<&str>, department: Option<&str>) -> CurrentUser {
        CurrentUser {
            id: UserId::generate(),
            email: Email::parse("staff@merch.test").unwrap(),
            name: "Staff".to_owned(),
            role_name: role.map(str::to_owned),
            department_name: department.map(str::to_owned),
        }
    }

    #[test]
    fn test_admin_is_management() {
        let admin = user(Some("Administrator"), None);
        assert!(admin.is_admin());
        assert!(admin.is_management());
        assert!(!admin.hides_client_contacts());
    }

    #[test]
    fn test_management_department_without_admin_role() {
        let lead = user(Some("Manager"), Some("Management"));
        assert!(!lead.is_admin());
        assert!(lead.is_management());
    }

    #[test]
    fn test_restricted_roles_hide_contacts() {
        assert!(user(Some("Printer"), Some("Production")).hides_client_contacts());
        assert!(user(Some("Designer"), None).hides_client_contacts());
        assert!(!user(Some("Manager"), Some("Sales")).hides_client_contacts());
        assert!(!user(None, None).hides_client_contacts());
    }
}
