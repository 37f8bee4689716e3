//! Staff account commands.
//!
//! The first administrator has to be created here; after that accounts are
//! managed from `/admin/users`.

use merch_crm::db::RoleRepository;
use merch_crm::models::UserInput;
use merch_crm::services::{AuthError, AuthService};
use merch_crm_core::Email;

use super::{CommandError, connect};

#[derive(Debug, thiserror::Error)]
pub enum UserError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("Invalid email: {0}")]
    InvalidEmail(String),

    #[error("Unknown role: {0}")]
    UnknownRole(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Database error: {0}")]
    Repository(#[from] merch_crm::db::RepositoryError),
}

/// Create a staff account with the given role.
pub async fn create(email: &str, name: &str, password: &str, role: &str) -> Result<(), UserError> {
    let email = Email::parse(email).map_err(|e| UserError::InvalidEmail(e.to_string()))?;
    let pool = connect().await?;

    let role_id = RoleRepository::new(&pool)
        .find_by_name(role)
        .await?
        .ok_or_else(|| UserError::UnknownRole(role.to_owned()))?;

    let input = UserInput {
        name: name.trim().to_owned(),
        email,
        role_id: Some(role_id),
        department_id: None,
        phone: None,
    };
    let id = AuthService::new(&pool)
        .create_user(&input, password, None)
        .await?;

    tracing::info!(%id, email = %input.email, role, "Staff account created");
    Ok(())
}
