//! Staff users, roles and departments.

use chrono::{DateTime, Utc};
use serde::Serialize;

use merch_crm_core::{DepartmentId, Email, RoleId, UserId};

/// A staff member (domain type).
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: Email,
    pub role_id: Option<RoleId>,
    pub role_name: Option<String>,
    pub department_id: Option<DepartmentId>,
    pub department_name: Option<String>,
    pub phone: Option<String>,
    pub last_active_at: Option<DateTime<Utc>>,
    pub is_system: bool,
    pub created_at: DateTime<Utc>,
}

/// A role with its permission map and member count.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    pub permissions: serde_json::Value,
    pub is_system: bool,
    pub department_id: Option<DepartmentId>,
    pub department_name: Option<String>,
    pub color: Option<String>,
    pub user_count: i64,
    pub created_at: DateTime<Utc>,
}

/// A department with its member count.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Department {
    pub id: DepartmentId,
    pub name: String,
    pub description: Option<String>,
    pub color: String,
    pub is_active: bool,
    pub is_system: bool,
    pub user_count: i64,
    pub created_at: DateTime<Utc>,
}

/// Fields for creating or updating a staff member.
#[derive(Debug, Clone)]
pub struct UserInput {
    pub name: String,
    pub email: Email,
    pub role_id: Option<RoleId>,
    pub department_id: Option<DepartmentId>,
    pub phone: Option<String>,
}

/// Fields for creating or updating a role.
#[derive(Debug, Clone)]
pub struct RoleInput {
    pub name: String,
    pub department_id: Option<DepartmentId>,
    pub color: Option<String>,
}

/// Fields for creating or updating a department.
#[derive(Debug, Clone)]
pub struct DepartmentInput {
    pub name: String,
    pub description: Option<String>,
    pub color: String,
    pub is_active: bool,
}

/// Short user reference for select boxes.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct UserOption {
    pub id: UserId,
    pub name: String,
}
