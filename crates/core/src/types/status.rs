//! Status and classification enums shared by every CRM module.
//!
//! Each enum maps 1:1 to a `PostgreSQL` enum type in the `crm` schema and
//! serialises to the same `snake_case` text, so form values, JSON payloads and
//! database rows all use one spelling.

use serde::{Deserialize, Serialize};

/// Declare a CRM enum with its database type name, wire spelling and UI label.
///
/// Generates `as_str()`, `label()`, `ALL`, `Display` and `FromStr`
/// (`Err = String`).
macro_rules! crm_enum {
    (
        $(#[$meta:meta])*
        $name:ident => $pg_type:literal {
            $(
                $(#[$vmeta:meta])*
                $variant:ident = $text:literal / $label:literal
            ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[cfg_attr(feature = "postgres", derive(sqlx::Type))]
        #[cfg_attr(
            feature = "postgres",
            sqlx(type_name = $pg_type, rename_all = "snake_case")
        )]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $(
                $(#[$vmeta])*
                $variant,
            )+
        }

        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// The wire/database spelling.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }

            /// Human-readable label for templates.
            #[must_use]
            pub const fn label(self) -> &'static str {
                match self {
                    $(Self::$variant => $label,)+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim() {
                    $($text => Ok(Self::$variant),)+
                    other => Err(format!(
                        concat!("invalid ", stringify!($name), ": {}"),
                        other
                    )),
                }
            }
        }
    };
}

crm_enum! {
    /// Lifecycle status of an order. Allowed moves live in [`crate::types::order`].
    OrderStatus => "crm.order_status" {
        New = "new" / "New",
        Design = "design" / "Design",
        Production = "production" / "Production",
        Done = "done" / "Done",
        Shipped = "shipped" / "Shipped",
        Cancelled = "cancelled" / "Cancelled",
    }
}

crm_enum! {
    /// Kind of work an order represents.
    OrderCategory => "crm.order_category" {
        Print = "print" / "Print",
        Embroidery = "embroidery" / "Embroidery",
        Merch = "merch" / "Merch",
        Other = "other" / "Other",
    }
}

crm_enum! {
    /// Order priority.
    #[derive(Default)]
    Priority => "crm.order_priority" {
        Low = "low" / "Low",
        #[default]
        Normal = "normal" / "Normal",
        High = "high" / "High",
    }
}

crm_enum! {
    /// Status of one production stage of one order item.
    #[derive(Default)]
    StageStatus => "crm.production_stage_status" {
        #[default]
        Pending = "pending" / "Pending",
        InProgress = "in_progress" / "In progress",
        Done = "done" / "Done",
        Failed = "failed" / "Failed",
    }
}

crm_enum! {
    /// Broad class of a warehouse item.
    InventoryItemType => "crm.inventory_item_type" {
        Clothing = "clothing" / "Clothing",
        Packaging = "packaging" / "Packaging",
        Consumables = "consumables" / "Consumables",
    }
}

crm_enum! {
    /// Unit a stock quantity is counted in.
    #[derive(Default)]
    MeasurementUnit => "crm.measurement_unit" {
        #[default]
        Pcs = "pcs" / "pcs",
        Liters = "liters" / "l",
        Meters = "meters" / "m",
        Kg = "kg" / "kg",
    }
}

crm_enum! {
    /// Private person or company.
    ClientType => "crm.client_type" {
        B2c = "b2c" / "Individual",
        B2b = "b2b" / "Company",
    }
}

crm_enum! {
    /// How a payment was received.
    PaymentMethod => "crm.payment_method" {
        Cash = "cash" / "Cash",
        Bank = "bank" / "Bank transfer",
        Online = "online" / "Online",
        Account = "account" / "Invoice",
    }
}

crm_enum! {
    /// Overhead expense bucket.
    ExpenseCategory => "crm.expense_category" {
        Rent = "rent" / "Rent",
        Salary = "salary" / "Salary",
        Purchase = "purchase" / "Purchase",
        Tax = "tax" / "Tax",
        Other = "other" / "Other",
    }
}

crm_enum! {
    /// Visual severity of an in-app notification.
    NotificationType => "crm.notification_type" {
        Info = "info" / "Info",
        Warning = "warning" / "Warning",
        Success = "success" / "Success",
        Error = "error" / "Error",
        Transfer = "transfer" / "Transfer",
    }
}

crm_enum! {
    /// What a storage location is used for.
    StorageLocationType => "crm.storage_location_type" {
        Warehouse = "warehouse" / "Warehouse",
        Production = "production" / "Production",
        Office = "office" / "Office",
    }
}

crm_enum! {
    /// Kind of inventory movement recorded in the stock ledger.
    TransactionType => "crm.inventory_transaction_type" {
        In = "in" / "Receipt",
        Out = "out" / "Issue",
        Transfer = "transfer" / "Transfer",
        AttributeChange = "attribute_change" / "Attribute change",
        Archive = "archive" / "Archive",
        Restore = "restore" / "Restore",
    }
}

crm_enum! {
    /// How a promocode reduces an order.
    DiscountType => "crm.discount_type" {
        Percentage = "percentage" / "Percentage",
        Fixed = "fixed" / "Fixed amount",
        FreeShipping = "free_shipping" / "Free shipping",
        Gift = "gift" / "Gift",
    }
}

crm_enum! {
    /// Security-relevant event recorded for the admin security page.
    SecurityEventType => "crm.security_event_type" {
        LoginSuccess = "login_success" / "Login",
        LoginFailed = "login_failed" / "Failed login",
        Logout = "logout" / "Logout",
        PasswordChange = "password_change" / "Password change",
        RoleChange = "role_change" / "Role change",
        MaintenanceToggle = "maintenance_toggle" / "Maintenance mode",
        DataExport = "data_export" / "Data export",
    }
}

crm_enum! {
    /// Severity of a persisted system error.
    #[derive(Default)]
    ErrorSeverity => "crm.error_severity" {
        #[default]
        Error = "error" / "Error",
        Warning = "warning" / "Warning",
        Critical = "critical" / "Critical",
    }
}

/// One of the four production stages every order item passes through.
///
/// Stages are not a database enum: each one is its own status column on
/// `crm.order_items`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductionStage {
    Prep,
    Print,
    Application,
    Packaging,
}

impl ProductionStage {
    /// Stages in the order work flows through them.
    pub const ALL: &'static [Self] = &[Self::Prep, Self::Print, Self::Application, Self::Packaging];

    /// Column on `crm.order_items` that stores this stage's status.
    ///
    /// Only these four literals are ever interpolated into SQL.
    #[must_use]
    pub const fn column(self) -> &'static str {
        match self {
            Self::Prep => "stage_prep_status",
            Self::Print => "stage_print_status",
            Self::Application => "stage_application_status",
            Self::Packaging => "stage_packaging_status",
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Prep => "prep",
            Self::Print => "print",
            Self::Application => "application",
            Self::Packaging => "packaging",
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Prep => "Preparation",
            Self::Print => "Print",
            Self::Application => "Application",
            Self::Packaging => "Packaging",
        }
    }
}

impl std::fmt::Display for ProductionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProductionStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "prep" => Ok(Self::Prep),
            "print" => Ok(Self::Print),
            "application" => Ok(Self::Application),
            "packaging" => Ok(Self::Packaging),
            other => Err(format!("invalid production stage: {other}")),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_from_str_agree() {
        for status in OrderStatus::ALL {
            assert_eq!(status.to_string().parse::<OrderStatus>().unwrap(), *status);
        }
        for kind in TransactionType::ALL {
            assert_eq!(kind.as_str().parse::<TransactionType>().unwrap(), *kind);
        }
        for kind in DiscountType::ALL {
            assert_eq!(kind.as_str().parse::<DiscountType>().unwrap(), *kind);
        }
    }

    #[test]
    fn test_serde_matches_wire_spelling() {
        assert_eq!(
            serde_json::to_string(&StageStatus::InProgress).unwrap(),
            "\"in_progress\""
        );
        assert_eq!(
            serde_json::to_string(&TransactionType::AttributeChange).unwrap(),
            "\"attribute_change\""
        );
        assert_eq!(serde_json::to_string(&ClientType::B2b).unwrap(), "\"b2b\"");
        assert_eq!(
            serde_json::to_string(&DiscountType::FreeShipping).unwrap(),
            "\"free_shipping\""
        );
    }

    #[test]
    fn test_from_str_rejects_unknown() {
        let err = "urgent".parse::<Priority>().unwrap_err();
        assert_eq!(err, "invalid Priority: urgent");
        assert!("".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_production_stage_columns() {
        let columns: Vec<_> = ProductionStage::ALL.iter().map(|s| s.column()).collect();
        assert_eq!(
            columns,
            [
                "stage_prep_status",
                "stage_print_status",
                "stage_application_status",
                "stage_packaging_status"
            ]
        );
        assert_eq!(
            "application".parse::<ProductionStage>().unwrap(),
            ProductionStage::Application
        );
        assert!("shipping".parse::<ProductionStage>().is_err());
    }

    #[test]
    fn test_defaults() {
        assert_eq!(Priority::default(), Priority::Normal);
        assert_eq!(StageStatus::default(), StageStatus::Pending);
        assert_eq!(MeasurementUnit::default(), MeasurementUnit::Pcs);
    }
}
