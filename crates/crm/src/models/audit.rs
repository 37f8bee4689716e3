//! Audit trail, security events and the persisted error log.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use merch_crm_core::{AuditLogId, ErrorSeverity, SecurityEventType, UserId};

/// One audit entry with the acting user's name.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AuditLogEntry {
    pub id: AuditLogId,
    pub user_id: Option<UserId>,
    pub user_name: Option<String>,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<Uuid>,
    pub details: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Filters for the audit log page.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub search: Option<String>,
    pub entity_type: Option<String>,
    pub user_id: Option<UserId>,
    pub page: u32,
}

/// A login, logout or other security-relevant event.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SecurityEvent {
    pub id: Uuid,
    pub user_id: Option<UserId>,
    pub user_name: Option<String>,
    pub event_type: SecurityEventType,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub details: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// An unexpected failure persisted for the admin panel.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SystemError {
    pub id: Uuid,
    pub user_id: Option<UserId>,
    pub message: String,
    pub stack: Option<String>,
    pub path: Option<String>,
    pub method: Option<String>,
    pub ip_address: Option<String>,
    pub severity: ErrorSeverity,
    pub details: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// A failure to record in `system_errors`.
#[derive(Debug, Clone, Default)]
pub struct NewSystemError {
    pub user_id: Option<UserId>,
    pub message: String,
    pub path: Option<String>,
    pub method: Option<String>,
    pub severity: ErrorSeverity,
    pub details: Option<serde_json::Value>,
}
