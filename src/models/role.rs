use mongodb::bson::{doc, Bson, Document};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

use super::user::UserAuthenticationData;

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    SuperAdmin,
    Admin,
    Manager,
    #[default]
    NormalUser,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::SuperAdmin => "super_admin",
            UserRole::Admin => "admin",
            UserRole::Manager => "manager",
            UserRole::NormalUser => "normal_user",
        }
    }
    /// Managers and above can decide approvals and act on department records.
    pub fn is_privileged(&self) -> bool {
        !matches!(self, UserRole::NormalUser)
    }
    pub fn is_admin(&self) -> bool {
        matches!(self, UserRole::SuperAdmin | UserRole::Admin)
    }
}

/// Record visibility derived from the caller's role and department.
#[derive(Debug, Clone)]
pub struct AccessScope {
    pub role: UserRole,
    pub department: Option<String>,
    pub user_id: String,
    pub employee_id: Option<String>,
}

impl AccessScope {
    pub fn of(user: &UserAuthenticationData) -> Self {
        Self {
            role: user.role,
            department: user.department.clone(),
            user_id: user.id.to_hex(),
            employee_id: user.employee_id.clone(),
        }
    }

    pub fn is_unrestricted(&self) -> bool {
        self.role == UserRole::SuperAdmin
    }

    fn owner_values(&self) -> Vec<Bson> {
        let mut values = vec![Bson::String(self.user_id.clone())];
        if let Some(employee_id) = &self.employee_id {
            values.push(Bson::String(employee_id.clone()));
        }
        values
    }

    /// Filter restricting a collection to what the caller may see.
    pub fn filter(&self, department_field: &str, owner_fields: &[&str]) -> Document {
        if self.is_unrestricted() {
            return Document::new();
        }
        let mut filter = doc! {
            department_field: self.department.clone().unwrap_or_default(),
        };
        if self.role == UserRole::NormalUser && !owner_fields.is_empty() {
            let values = self.owner_values();
            let owners: Vec<Document> = owner_fields
                .iter()
                .map(|field| doc! { *field: { "$in": values.clone() } })
                .collect();
            filter.insert("$or", owners);
        }
        filter
    }

    /// Same rule as [`AccessScope::filter`] applied to one loaded record.
    pub fn allows(&self, department: Option<&str>, owners: &[Option<&str>]) -> bool {
        if self.is_unrestricted() {
            return true;
        }
        if department != self.department.as_deref() || department.is_none() {
            return false;
        }
        if self.role == UserRole::NormalUser && !owners.is_empty() {
            return owners.iter().flatten().any(|owner| {
                *owner == self.user_id || Some(*owner) == self.employee_id.as_deref()
            });
        }
        true
    }

    pub fn ensure(&self, department: Option<&str>, owners: &[Option<&str>]) -> Result<(), ApiError> {
        if self.allows(department, owners) {
            Ok(())
        } else {
            Err(ApiError::forbidden("FORBIDDEN"))
        }
    }

    /// Department a write lands in: only super admins may pick another department.
    pub fn resolve_department(&self, requested: Option<String>) -> Option<String> {
        if self.is_unrestricted() {
            requested.or_else(|| self.department.clone())
        } else {
            self.department.clone()
        }
    }

    /// Explicit department filter; never widens a restricted caller's scope.
    pub fn department_filter(&self, requested: Option<&str>) -> Option<String> {
        match requested.map(str::trim).filter(|value| !value.is_empty()) {
            Some(requested) if self.is_unrestricted() => Some(requested.to_string()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope(role: UserRole, department: &str) -> AccessScope {
        AccessScope {
            role,
            department: Some(department.to_string()),
            user_id: "u1".to_string(),
            employee_id: Some("EMP-001".to_string()),
        }
    }

    #[test]
    fn super_admin_is_unrestricted() {
        let scope = scope(UserRole::SuperAdmin, "Electrical");
        assert!(scope.filter("department", &["createdBy.id"]).is_empty());
        assert!(scope.allows(Some("Mechanical"), &[Some("someone")]));
    }

    #[test]
    fn manager_sees_whole_department() {
        let scope = scope(UserRole::Manager, "Electrical");
        assert_eq!(
            scope.filter("department", &["createdBy.id"]),
            doc! { "department": "Electrical" }
        );
        assert!(scope.allows(Some("Electrical"), &[Some("someone")]));
        assert!(!scope.allows(Some("Mechanical"), &[Some("u1")]));
    }

    #[test]
    fn normal_user_is_limited_to_own_records_in_department() {
        let scope = scope(UserRole::NormalUser, "Electrical");
        let filter = scope.filter("department", &["createdBy.id", "assignedTo"]);
        assert_eq!(filter.get_str("department").unwrap(), "Electrical");
        assert_eq!(filter.get_array("$or").unwrap().len(), 2);

        assert!(scope.allows(Some("Electrical"), &[Some("u1")]));
        assert!(scope.allows(Some("Electrical"), &[None, Some("EMP-001")]));
        assert!(!scope.allows(Some("Electrical"), &[Some("u2")]));
        assert!(!scope.allows(Some("Mechanical"), &[Some("u1")]));
        assert!(!scope.allows(None, &[Some("u1")]));
    }

    #[test]
    fn restricted_callers_cannot_pick_department() {
        let manager = scope(UserRole::Manager, "Electrical");
        assert_eq!(
            manager.resolve_department(Some("Mechanical".to_string())),
            Some("Electrical".to_string())
        );
        assert_eq!(manager.department_filter(Some("Mechanical")), None);

        let root = scope(UserRole::SuperAdmin, "Electrical");
        assert_eq!(
            root.resolve_department(Some("Mechanical".to_string())),
            Some("Mechanical".to_string())
        );
        assert_eq!(root.department_filter(Some("Mechanical")), Some("Mechanical".to_string()));
    }

    #[test]
    fn privilege_levels() {
        assert!(UserRole::Manager.is_privileged());
        assert!(!UserRole::NormalUser.is_privileged());
        assert!(UserRole::Admin.is_admin());
        assert!(!UserRole::Manager.is_admin());
    }
}
