//! Client (customer) domain types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use merch_crm_core::{ClientId, ClientType, HIDDEN_CONTACT, UserId};

use super::audit::AuditLogEntry;
use super::order::OrderListRow;

/// A client record with its manager's name.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Client {
    pub id: ClientId,
    pub client_type: ClientType,
    pub last_name: String,
    pub first_name: String,
    pub patronymic: Option<String>,
    pub name: String,
    pub company: Option<String>,
    pub phone: String,
    pub telegram: Option<String>,
    pub instagram: Option<String>,
    pub email: Option<String>,
    pub city: Option<String>,
    pub address: Option<String>,
    pub comments: Option<String>,
    pub social_link: Option<String>,
    pub acquisition_source: Option<String>,
    pub manager_id: Option<UserId>,
    pub manager_name: Option<String>,
    pub is_archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Client {
    /// Replace phone and email with the hidden marker.
    pub fn hide_contacts(&mut self) {
        HIDDEN_CONTACT.clone_into(&mut self.phone);
        if self.email.is_some() {
            self.email = Some(HIDDEN_CONTACT.to_owned());
        }
    }
}

/// A row of the client list with order aggregates.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ClientListRow {
    pub id: ClientId,
    pub client_type: ClientType,
    pub name: String,
    pub company: Option<String>,
    pub phone: String,
    pub email: Option<String>,
    pub city: Option<String>,
    pub manager_name: Option<String>,
    pub is_archived: bool,
    pub order_count: i64,
    pub total_spent: Decimal,
    pub last_order_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ClientListRow {
    /// Replace phone and email with the hidden marker.
    pub fn hide_contacts(&mut self) {
        HIDDEN_CONTACT.clone_into(&mut self.phone);
        if self.email.is_some() {
            self.email = Some(HIDDEN_CONTACT.to_owned());
        }
    }
}

/// A possible duplicate found while creating a client.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ClientDuplicate {
    pub id: ClientId,
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
}

impl ClientDuplicate {
    /// Replace phone and email with the hidden marker.
    pub fn hide_contacts(&mut self) {
        HIDDEN_CONTACT.clone_into(&mut self.phone);
        if self.email.is_some() {
            self.email = Some(HIDDEN_CONTACT.to_owned());
        }
    }
}

/// A client in a select list.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ClientOption {
    pub id: ClientId,
    pub name: String,
    pub phone: String,
}

/// Sort keys for the client list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientSort {
    #[default]
    Name,
    CreatedAt,
    TotalSpent,
}

/// Filters for the client list.
#[derive(Debug, Clone, Default)]
pub struct ClientFilter {
    pub search: Option<String>,
    pub client_type: Option<ClientType>,
    pub manager_id: Option<UserId>,
    pub city: Option<String>,
    pub archived: bool,
    pub sort: ClientSort,
    pub page: u32,
}

/// Validated client fields for create and update.
#[derive(Debug, Clone)]
pub struct ClientInput {
    pub client_type: ClientType,
    pub last_name: String,
    pub first_name: String,
    pub patronymic: Option<String>,
    pub company: Option<String>,
    pub phone: String,
    pub telegram: Option<String>,
    pub instagram: Option<String>,
    pub email: Option<String>,
    pub city: Option<String>,
    pub address: Option<String>,
    pub comments: Option<String>,
    pub social_link: Option<String>,
    pub acquisition_source: Option<String>,
    pub manager_id: Option<UserId>,
}

/// Money totals for one client.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ClientTotals {
    pub order_count: i64,
    pub total_spent: Decimal,
    pub total_paid: Decimal,
    /// `total_paid - total_spent`; negative means the client owes money.
    pub balance: Decimal,
}

/// Everything the client card shows.
#[derive(Debug, Clone, Serialize)]
pub struct ClientDetails {
    pub client: Client,
    pub orders: Vec<OrderListRow>,
    pub totals: ClientTotals,
    pub activity: Vec<AuditLogEntry>,
}

/// Client base statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ClientStats {
    pub total_clients: i64,
    pub new_this_month: i64,
    pub total_orders: i64,
    pub total_revenue: Decimal,
    pub average_check: Decimal,
    pub average_revenue_per_client: Decimal,
}

/// Client fields that may be edited inline one at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientField {
    Phone,
    Email,
    City,
    Company,
    Telegram,
    Instagram,
    Comments,
    AcquisitionSource,
    ManagerId,
    ClientType,
}

impl ClientField {
    /// Column name; only these literals reach SQL.
    #[must_use]
    pub const fn column(self) -> &'static str {
        match self {
            Self::Phone => "phone",
            Self::Email => "email",
            Self::City => "city",
            Self::Company => "company",
            Self::Telegram => "telegram",
            Self::Instagram => "instagram",
            Self::Comments => "comments",
            Self::AcquisitionSource => "acquisition_source",
            Self::ManagerId => "manager_id",
            Self::ClientType => "client_type",
        }
    }
}

impl std::str::FromStr for ClientField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "phone" => Ok(Self::Phone),
            "email" => Ok(Self::Email),
            "city" => Ok(Self::City),
            "company" => Ok(Self::Company),
            "telegram" => Ok(Self::Telegram),
            "instagram" => Ok(Self::Instagram),
            "comments" => Ok(Self::Comments),
            "acquisition_source" | "acquisitionSource" => Ok(Self::AcquisitionSource),
            "manager_id" | "managerId" => Ok(Self::ManagerId),
            "client_type" | "clientType" => Ok(Self::ClientType),
            other => Err(format!("field cannot be edited: {other}")),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_list_row_hides_contacts() {
        let mut row = ClientListRow {
            id: ClientId::generate(),
            client_type: ClientType::B2c,
            name: "Petrov Ivan".to_owned(),
            company: None,
            phone: "+7 900 123-45-67".to_owned(),
            email: None,
            city: Some("Kazan".to_owned()),
            manager_name: None,
            is_archived: false,
            order_count: 2,
            total_spent: Decimal::new(150_000, 2),
            last_order_at: None,
            created_at: Utc::now(),
        };
        row.hide_contacts();
        assert_eq!(row.phone, HIDDEN_CONTACT);
        assert_eq!(row.email, None);
        assert_eq!(row.city.as_deref(), Some("Kazan"));
    }

    #[test]
    fn test_client_field_whitelist() {
        assert_eq!("phone".parse::<ClientField>().unwrap().column(), "phone");
        assert_eq!(
            "managerId".parse::<ClientField>().unwrap(),
            ClientField::ManagerId
        );
        assert!("name".parse::<ClientField>().is_err());
        assert!("is_archived".parse::<ClientField>().is_err());
        assert!("id; DROP TABLE".parse::<ClientField>().is_err());
    }
}
