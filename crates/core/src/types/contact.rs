//! Helpers for client contact data.

/// Placeholder shown instead of contact data to roles that may not see it.
pub const HIDDEN_CONTACT: &str = "HIDDEN";

/// Minimum number of digits a phone needs before it is used for duplicate matching.
pub const MIN_PHONE_DIGITS: usize = 6;

/// Strip everything except ASCII digits from a phone number.
///
/// ```
/// use merch_crm_core::phone_digits;
///
/// assert_eq!(phone_digits("+7 (912) 345-67-89"), "79123456789");
/// ```
#[must_use]
pub fn phone_digits(phone: &str) -> String {
    phone.chars().filter(char::is_ascii_digit).collect()
}

/// Build a display name from its parts, skipping blanks.
#[must_use]
pub fn full_name(last_name: &str, first_name: &str, patronymic: Option<&str>) -> String {
    [Some(last_name), Some(first_name), patronymic]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Trim a form value and turn an empty result into `None`.
#[must_use]
pub fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phone_digits() {
        assert_eq!(phone_digits("8-800-555-35-35"), "88005553535");
        assert_eq!(phone_digits("no digits"), "");
    }

    #[test]
    fn test_full_name() {
        assert_eq!(
            full_name("Ivanova", "Anna", Some("Sergeevna")),
            "Ivanova Anna Sergeevna"
        );
        assert_eq!(full_name(" Petrov ", "Ivan", None), "Petrov Ivan");
        assert_eq!(full_name("Petrov", "Ivan", Some("  ")), "Petrov Ivan");
    }

    #[test]
    fn test_non_empty() {
        assert_eq!(non_empty(Some("  x ")), Some("x".to_owned()));
        assert_eq!(non_empty(Some("   ")), None);
        assert_eq!(non_empty(None), None);
    }
}
