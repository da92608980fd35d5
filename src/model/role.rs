use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, ToSchema, EnumString, AsRefStr, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Role {
    MasterAdmin,
    Admin,
    Employee,
}

impl Role {
    /// Roles allowed to decide on leave requests and manage records.
    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin | Role::MasterAdmin)
    }

    /// Only a master admin may hand out admin-level roles.
    pub fn can_assign(&self, target: Role) -> bool {
        match target {
            Role::Employee => self.is_admin(),
            Role::Admin | Role::MasterAdmin => *self == Role::MasterAdmin,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn parses_stored_role_names() {
        assert_eq!(Role::from_str("master_admin").unwrap(), Role::MasterAdmin);
        assert_eq!(Role::from_str("admin").unwrap(), Role::Admin);
        assert_eq!(Role::Employee.as_ref(), "employee");
        assert!(Role::from_str("hr").is_err());
    }

    #[test]
    fn admin_cannot_promote_to_admin() {
        assert!(Role::Admin.can_assign(Role::Employee));
        assert!(!Role::Admin.can_assign(Role::Admin));
        assert!(Role::MasterAdmin.can_assign(Role::Admin));
        assert!(!Role::Employee.can_assign(Role::Employee));
    }
}
