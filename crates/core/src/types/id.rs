//! Newtype IDs for type-safe entity references.
//!
//! Every CRM table uses UUID primary keys. `define_id!` wraps a [`Uuid`] so a
//! client id can never be passed where an order id is expected.

use uuid::Uuid;

/// Macro to define a type-safe UUID wrapper.
///
/// Creates a newtype wrapper around `Uuid` with:
/// - `Serialize`/`Deserialize` with `#[serde(transparent)]`
/// - `Debug`, `Clone`, `Copy`, `PartialEq`, `Eq`, `Hash`
/// - `new()`, `generate()`, `as_uuid()`
/// - `Display`, `FromStr`, `From<Uuid>` and `Into<Uuid>`
/// - `sqlx` `Type`, `Encode`, and `Decode` implementations (with `postgres` feature)
///
/// # Example
///
/// ```rust
/// # use merch_crm_core::define_id;
/// define_id!(WidgetId);
/// define_id!(GadgetId);
///
/// let widget = WidgetId::generate();
/// let gadget = GadgetId::generate();
/// assert_ne!(widget.as_uuid(), gadget.as_uuid());
///
/// // Different types, so this won't compile:
/// // let _: WidgetId = gadget;
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        pub struct $name(::uuid::Uuid);

        impl $name {
            /// Wrap an existing UUID.
            #[must_use]
            pub const fn new(id: ::uuid::Uuid) -> Self {
                Self(id)
            }

            /// Generate a fresh random (v4) ID.
            #[must_use]
            pub fn generate() -> Self {
                Self(::uuid::Uuid::new_v4())
            }

            /// Get the underlying UUID.
            #[must_use]
            pub const fn as_uuid(&self) -> ::uuid::Uuid {
                self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl ::core::str::FromStr for $name {
            type Err = ::uuid::Error;

            fn from_str(s: &str) -> ::core::result::Result<Self, Self::Err> {
                ::uuid::Uuid::parse_str(s.trim()).map(Self)
            }
        }

        impl From<::uuid::Uuid> for $name {
            fn from(id: ::uuid::Uuid) -> Self {
                Self(id)
            }
        }

        impl From<$name> for ::uuid::Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        #[cfg(feature = "postgres")]
        impl ::sqlx::Type<::sqlx::Postgres> for $name {
            fn type_info() -> ::sqlx::postgres::PgTypeInfo {
                <::uuid::Uuid as ::sqlx::Type<::sqlx::Postgres>>::type_info()
            }

            fn compatible(ty: &::sqlx::postgres::PgTypeInfo) -> bool {
                <::uuid::Uuid as ::sqlx::Type<::sqlx::Postgres>>::compatible(ty)
            }
        }

        #[cfg(feature = "postgres")]
        impl ::sqlx::postgres::PgHasArrayType for $name {
            fn array_type_info() -> ::sqlx::postgres::PgTypeInfo {
                <::uuid::Uuid as ::sqlx::postgres::PgHasArrayType>::array_type_info()
            }
        }

        #[cfg(feature = "postgres")]
        impl<'r> ::sqlx::Decode<'r, ::sqlx::Postgres> for $name {
            fn decode(
                value: ::sqlx::postgres::PgValueRef<'r>,
            ) -> ::core::result::Result<Self, ::sqlx::error::BoxDynError> {
                let id = <::uuid::Uuid as ::sqlx::Decode<::sqlx::Postgres>>::decode(value)?;
                Ok(Self(id))
            }
        }

        #[cfg(feature = "postgres")]
        impl ::sqlx::Encode<'_, ::sqlx::Postgres> for $name {
            fn encode_by_ref(
                &self,
                buf: &mut ::sqlx::postgres::PgArgumentBuffer,
            ) -> ::std::result::Result<::sqlx::encode::IsNull, ::sqlx::error::BoxDynError> {
                <::uuid::Uuid as ::sqlx::Encode<::sqlx::Postgres>>::encode_by_ref(&self.0, buf)
            }
        }
    };
}

// Staff and access control
define_id!(UserId);
define_id!(RoleId);
define_id!(DepartmentId);

// Sales
define_id!(ClientId);
define_id!(OrderId);
define_id!(OrderItemId);
define_id!(AttachmentId);
define_id!(PaymentId);
define_id!(ExpenseId);
define_id!(PromocodeId);

// Warehouse
define_id!(InventoryItemId);
define_id!(CategoryId);
define_id!(StorageLocationId);
define_id!(TransactionId);

// System
define_id!(NotificationId);
define_id!(AuditLogId);

/// Parse an optional form value into a typed ID.
///
/// HTML forms submit an empty string for "no selection"; that maps to `None`.
///
/// # Errors
///
/// Returns `uuid::Error` if a non-empty value is not a valid UUID.
pub fn parse_optional_id<T: From<Uuid>>(value: Option<&str>) -> Result<Option<T>, uuid::Error> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => Uuid::parse_str(s).map(|u| Some(T::from(u))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_display_matches_uuid() {
        let raw = Uuid::new_v4();
        let id = ClientId::new(raw);
        assert_eq!(id.to_string(), raw.to_string());
        assert_eq!(Uuid::from(id), raw);
    }

    #[test]
    fn test_from_str_trims() {
        let raw = Uuid::new_v4();
        let parsed: OrderId = format!("  {raw} ").parse().unwrap();
        assert_eq!(parsed.as_uuid(), raw);
        assert!("not-a-uuid".parse::<OrderId>().is_err());
    }

    #[test]
    fn test_serde_is_transparent() {
        let raw = Uuid::new_v4();
        let json = serde_json::to_string(&UserId::new(raw)).unwrap();
        assert_eq!(json, format!("\"{raw}\""));
    }

    #[test]
    fn test_parse_optional_id() {
        assert_eq!(parse_optional_id::<UserId>(None).unwrap(), None);
        assert_eq!(parse_optional_id::<UserId>(Some("  ")).unwrap(), None);

        let raw = Uuid::new_v4();
        let parsed = parse_optional_id::<UserId>(Some(&raw.to_string())).unwrap();
        assert_eq!(parsed, Some(UserId::new(raw)));

        assert!(parse_optional_id::<UserId>(Some("abc")).is_err());
    }
}
