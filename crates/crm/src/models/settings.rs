//! Branding and system settings stored in `crm.system_settings`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Setting keys.
pub mod keys {
    pub const BRANDING: &str = "branding";
    pub const MAINTENANCE_MODE: &str = "maintenance_mode";
    pub const LAST_NOTIFICATION_CHECK: &str = "last_notification_check";
}

/// Largest allowed corner radius.
pub const MAX_RADIUS: i32 = 64;

/// Look and feel of the whole app.
///
/// Stored as a JSON object; missing keys fall back to the defaults below so
/// older rows keep working as fields are added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Branding {
    pub company_name: String,
    pub logo_url: Option<String>,
    pub favicon_url: Option<String>,
    pub primary_color: String,
    pub background_color: String,
    pub currency_symbol: String,
    pub radius_outer: i32,
    pub radius_inner: i32,
    pub login_slogan: String,
    pub dashboard_welcome: String,
    pub email_footer: String,
    pub email_signature: String,
    pub date_format: String,
    pub timezone: String,
    /// UI preferences that are stored but not interpreted server-side.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Default for Branding {
    fn default() -> Self {
        Self {
            company_name: "MerchCRM".to_owned(),
            logo_url: None,
            favicon_url: None,
            primary_color: "#5d00ff".to_owned(),
            background_color: "#f2f2f2".to_owned(),
            currency_symbol: "₽".to_owned(),
            radius_outer: 24,
            radius_inner: 14,
            login_slogan: "Manage orders, production and stock in one place".to_owned(),
            dashboard_welcome: "Here is what is happening in the shop today".to_owned(),
            email_footer: "This message was sent automatically, please do not reply".to_owned(),
            email_signature: "Best regards, the MerchCRM team".to_owned(),
            date_format: "DD.MM.YYYY".to_owned(),
            timezone: "Europe/Moscow".to_owned(),
            extra: serde_json::Map::new(),
        }
    }
}

impl Branding {
    /// Merge a stored JSON value over the defaults.
    ///
    /// Anything that is not an object, or does not deserialize, yields the defaults.
    #[must_use]
    pub fn from_stored(value: Option<serde_json::Value>) -> Self {
        value
            .filter(serde_json::Value::is_object)
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default()
    }

    /// Check the fields an admin can break the layout with.
    ///
    /// # Errors
    ///
    /// Returns a user-facing message for the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.company_name.trim().is_empty() {
            return Err("Company name is required".to_owned());
        }
        for (label, color) in [
            ("Primary color", &self.primary_color),
            ("Background color", &self.background_color),
        ] {
            if !is_hex_color(color) {
                return Err(format!("{label} must look like #rrggbb"));
            }
        }
        for (label, radius) in [("Outer radius", self.radius_outer), ("Inner radius", self.radius_inner)] {
            if !(0..=MAX_RADIUS).contains(&radius) {
                return Err(format!("{label} must be between 0 and {MAX_RADIUS}"));
            }
        }
        Ok(())
    }
}

/// `#` followed by exactly six hex digits.
#[must_use]
pub fn is_hex_color(value: &str) -> bool {
    value
        .strip_prefix('#')
        .is_some_and(|hex| hex.len() == 6 && hex.chars().all(|c| c.is_ascii_hexdigit()))
}

/// A raw settings row for the system page.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SystemSetting {
    pub key: String,
    pub value: serde_json::Value,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Counters for the admin overview.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SystemStats {
    pub users: i64,
    pub clients: i64,
    pub orders: i64,
    pub items: i64,
    pub database_size_bytes: i64,
    pub storage_size_bytes: u64,
    pub storage_files: u64,
}

impl SystemStats {
    /// Database size in megabytes with two decimals.
    #[must_use]
    pub fn database_size_mb(&self) -> Decimal {
        bytes_to_mb(u64::try_from(self.database_size_bytes).unwrap_or(0))
    }

    /// Storage size in megabytes with two decimals.
    #[must_use]
    pub fn storage_size_mb(&self) -> Decimal {
        bytes_to_mb(self.storage_size_bytes)
    }
}

fn bytes_to_mb(bytes: u64) -> Decimal {
    (Decimal::from(bytes) / Decimal::from(1_048_576_u64)).round_dp(2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_branding_defaults_fill_missing_keys() {
        let b = Branding::from_stored(Some(json!({"companyName": "Print Lab"})));
        assert_eq!(b.company_name, "Print Lab");
        assert_eq!(b.primary_color, "#5d00ff");
        assert_eq!(b.radius_outer, 24);
        assert_eq!(b.currency_symbol, "₽");
    }

    #[test]
    fn test_branding_from_garbage_is_default() {
        assert_eq!(Branding::from_stored(None), Branding::default());
        assert_eq!(Branding::from_stored(Some(json!("x"))), Branding::default());
        assert_eq!(
            Branding::from_stored(Some(json!({"radiusOuter": "big"}))),
            Branding::default()
        );
    }

    #[test]
    fn test_branding_keeps_unknown_keys() {
        let b = Branding::from_stored(Some(json!({"soundEnabled": true})));
        assert_eq!(b.extra.get("soundEnabled"), Some(&json!(true)));
        let back = serde_json::to_value(&b).unwrap_or_default();
        assert_eq!(back["soundEnabled"], json!(true));
    }

    #[test]
    fn test_branding_validate() {
        assert!(Branding::default().validate().is_ok());

        let mut b = Branding::default();
        b.primary_color = "red".to_owned();
        assert!(b.validate().is_err());

        let mut b = Branding::default();
        b.radius_inner = 65;
        assert!(b.validate().is_err());

        let mut b = Branding::default();
        b.company_name = "  ".to_owned();
        assert_eq!(b.validate(), Err("Company name is required".to_owned()));
    }

    #[test]
    fn test_is_hex_color() {
        assert!(is_hex_color("#A1b2C3"));
        assert!(!is_hex_color("#abc"));
        assert!(!is_hex_color("a1b2c3"));
        assert!(!is_hex_color("#gggggg"));
    }
}
