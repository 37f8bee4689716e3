//! Promocode validation, discount arithmetic and bulk generation.

use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use sqlx::PgPool;
use thiserror::Error;

use merch_crm_core::{DiscountType, UserId, format_money, percent_of, round_money};

use crate::db::{PromocodeRepository, RepositoryError};
use crate::models::{
    BulkPromocodes, CartItem, PromoSummary, PromoValidation, Promocode, PromocodeInput,
};

/// Characters used in generated codes; no 0/O or 1/I.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Random characters appended to a bulk prefix.
pub const CODE_SUFFIX_LEN: usize = 6;

/// Largest batch `bulk_create` accepts.
pub const MAX_BULK_COUNT: u32 = 500;

/// Errors from promocode management.
#[derive(Debug, Error)]
pub enum PromocodeError {
    #[error("{0}")]
    Invalid(String),

    #[error("promocode not found")]
    NotFound,

    #[error("{0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Repository(RepositoryError),
}

impl From<RepositoryError> for PromocodeError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound => Self::NotFound,
            RepositoryError::Conflict(msg) => Self::Conflict(msg),
            other => Self::Repository(other),
        }
    }
}

/// Promocode service.
pub struct PromocodeService<'a> {
    repo: PromocodeRepository<'a>,
}

impl<'a> PromocodeService<'a> {
    /// Create a new promocode service.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self {
            repo: PromocodeRepository::new(pool),
        }
    }

    /// Check a code against a cart and compute its discount.
    ///
    /// # Errors
    ///
    /// Returns `PromocodeError::Repository` if the lookup fails. Business
    /// rejections are reported in the returned `PromoValidation`.
    pub async fn validate(
        &self,
        code: &str,
        total: Decimal,
        cart: &[CartItem],
    ) -> Result<PromoValidation, PromocodeError> {
        let Some(promo) = self.repo.find_by_code(code).await? else {
            return Ok(PromoValidation::invalid("Promocode not found"));
        };
        Ok(evaluate(&promo, total, cart, Utc::now()))
    }

    /// Create a promocode.
    ///
    /// # Errors
    ///
    /// Returns `PromocodeError::Invalid` if the value is out of range.
    /// Returns `PromocodeError::Conflict` if the code is taken.
    pub async fn create(
        &self,
        input: &PromocodeInput,
        actor: UserId,
    ) -> Result<merch_crm_core::PromocodeId, PromocodeError> {
        validate_input(input)?;
        Ok(self.repo.create(input, actor).await?)
    }

    /// Update a promocode.
    ///
    /// # Errors
    ///
    /// Returns `PromocodeError::Invalid` if the value is out of range.
    /// Returns `PromocodeError::NotFound` if it doesn't exist.
    /// Returns `PromocodeError::Conflict` if the code is taken.
    pub async fn update(
        &self,
        id: merch_crm_core::PromocodeId,
        input: &PromocodeInput,
        actor: UserId,
    ) -> Result<(), PromocodeError> {
        validate_input(input)?;
        Ok(self.repo.update(id, input, actor).await?)
    }

    /// Generate `count` random codes from a template and insert them at once.
    ///
    /// # Errors
    ///
    /// Returns `PromocodeError::Invalid` for a count outside `1..=500`.
    /// Returns `PromocodeError::Conflict` if a generated code collides.
    pub async fn bulk_create(
        &self,
        template: &BulkPromocodes,
        actor: UserId,
    ) -> Result<u64, PromocodeError> {
        if !(1..=MAX_BULK_COUNT).contains(&template.count) {
            return Err(PromocodeError::Invalid(format!(
                "Count must be between 1 and {MAX_BULK_COUNT}"
            )));
        }
        check_value(template.discount_type, template.value)?;

        let codes = generate_codes(&mut rand::rng(), &template.prefix, template.count);
        Ok(self.repo.insert_batch(&codes, template, actor).await?)
    }
}

fn validate_input(input: &PromocodeInput) -> Result<(), PromocodeError> {
    if input.code.trim().is_empty() {
        return Err(PromocodeError::Invalid("Code is required".to_owned()));
    }
    check_value(input.discount_type, input.value)?;
    if input.min_order_amount < Decimal::ZERO || input.max_discount_amount < Decimal::ZERO {
        return Err(PromocodeError::Invalid(
            "Amounts cannot be negative".to_owned(),
        ));
    }
    Ok(())
}

fn check_value(discount_type: DiscountType, value: Decimal) -> Result<(), PromocodeError> {
    if value < Decimal::ZERO {
        return Err(PromocodeError::Invalid("Value cannot be negative".to_owned()));
    }
    if discount_type == DiscountType::Percentage && value > Decimal::ONE_HUNDRED {
        return Err(PromocodeError::Invalid(
            "A percentage discount cannot exceed 100".to_owned(),
        ));
    }
    Ok(())
}

/// `count` unique codes of the form `{PREFIX}{6 chars}`.
#[must_use]
pub fn generate_codes<R: Rng + ?Sized>(rng: &mut R, prefix: &str, count: u32) -> Vec<String> {
    let prefix = prefix.trim().to_uppercase();
    let wanted = usize::try_from(count).unwrap_or(usize::MAX);
    let mut codes = std::collections::BTreeSet::new();

    while codes.len() < wanted {
        let suffix: String = (0..CODE_SUFFIX_LEN)
            .map(|_| char::from(CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())]))
            .collect();
        codes.insert(format!("{prefix}{suffix}"));
    }

    codes.into_iter().collect()
}

/// Why a promocode cannot be used right now, if it can't.
fn availability_error(promo: &Promocode, now: DateTime<Utc>) -> Option<&'static str> {
    if !promo.is_active {
        return Some("Promocode is inactive");
    }
    if promo.expires_at.is_some_and(|at| at < now) {
        return Some("Promocode has expired");
    }
    if promo.start_date.is_some_and(|at| at > now) {
        return Some("Promocode is not active yet");
    }
    if promo
        .usage_limit
        .is_some_and(|limit| promo.usage_count >= limit)
    {
        return Some("Promocode usage limit reached");
    }
    None
}

/// Check a promocode against a cart at `now`.
#[must_use]
pub fn evaluate(
    promo: &Promocode,
    total: Decimal,
    cart: &[CartItem],
    now: DateTime<Utc>,
) -> PromoValidation {
    if let Some(error) = availability_error(promo, now) {
        return PromoValidation::invalid(error);
    }
    if total < promo.min_order_amount {
        return PromoValidation::invalid(format!(
            "Minimum order amount is {}",
            format_money(promo.min_order_amount, "").trim_end()
        ));
    }

    let applicable = if cart.is_empty() {
        total
    } else {
        cart.iter()
            .filter(|item| promo.constraints.applies_to(item))
            .map(CartItem::line_total)
            .sum()
    };

    if !cart.is_empty() && applicable <= Decimal::ZERO {
        return PromoValidation::invalid("Promocode does not apply to items in the cart");
    }

    let (discount, message) = match promo.discount_type {
        DiscountType::Percentage => {
            let raw = percent_of(applicable, promo.value);
            if promo.max_discount_amount > Decimal::ZERO && raw > promo.max_discount_amount {
                (
                    promo.max_discount_amount,
                    Some(format!(
                        "Discount capped at {}",
                        format_money(promo.max_discount_amount, "").trim_end()
                    )),
                )
            } else {
                (raw, None)
            }
        }
        DiscountType::Fixed => (promo.value.min(applicable), None),
        DiscountType::FreeShipping => (Decimal::ZERO, Some("Free shipping".to_owned())),
        DiscountType::Gift => {
            let gift = promo
                .admin_comment
                .as_deref()
                .or(promo.name.as_deref())
                .unwrap_or(&promo.code);
            (Decimal::ZERO, Some(format!("Gift: {gift}")))
        }
    };

    PromoValidation {
        is_valid: true,
        discount: round_money(discount.min(total)),
        error: None,
        promo: Some(PromoSummary {
            id: promo.id,
            code: promo.code.clone(),
            discount_type: promo.discount_type,
            value: promo.value,
        }),
        message,
    }
}

/// Discount granted on an order total, or `None` if the code is unusable.
///
/// Orders carry no cart constraints: the whole total is discountable.
#[must_use]
pub fn order_discount(promo: &Promocode, total: Decimal, now: DateTime<Utc>) -> Option<Decimal> {
    if availability_error(promo, now).is_some() {
        return None;
    }

    let discount = match promo.discount_type {
        DiscountType::Percentage => {
            let raw = percent_of(total, promo.value);
            if promo.max_discount_amount > Decimal::ZERO {
                raw.min(promo.max_discount_amount)
            } else {
                raw
            }
        }
        DiscountType::Fixed => promo.value.min(total),
        DiscountType::FreeShipping | DiscountType::Gift => Decimal::ZERO,
    };

    Some(round_money(discount))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Duration;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use merch_crm_core::{InventoryItemId, PromocodeId};

    use super::*;
    use crate::models::PromoConstraints;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn promo(discount_type: DiscountType, value: &str) -> Promocode {
        Promocode {
            id: PromocodeId::generate(),
            name: Some("Spring".to_owned()),
            code: "SPRING".to_owned(),
            discount_type,
            value: dec(value),
            min_order_amount: Decimal::ZERO,
            max_discount_amount: Decimal::ZERO,
            start_date: None,
            expires_at: None,
            usage_limit: None,
            usage_count: 0,
            is_active: true,
            admin_comment: None,
            constraints: PromoConstraints::default(),
            created_at: Utc::now(),
        }
    }

    fn line(id: Option<InventoryItemId>, price: &str, qty: i32) -> CartItem {
        CartItem {
            inventory_id: id,
            category: None,
            price: dec(price),
            quantity: qty,
        }
    }

    #[test]
    fn test_percentage_over_total() {
        let v = evaluate(&promo(DiscountType::Percentage, "10"), dec("2500"), &[], Utc::now());
        assert!(v.is_valid);
        assert_eq!(v.discount, dec("250"));
    }

    #[test]
    fn test_percentage_capped() {
        let mut p = promo(DiscountType::Percentage, "50");
        p.max_discount_amount = dec("300");
        let v = evaluate(&p, dec("1000"), &[], Utc::now());
        assert_eq!(v.discount, dec("300"));
        assert_eq!(v.message.as_deref(), Some("Discount capped at 300.00"));
    }

    #[test]
    fn test_fixed_never_exceeds_total() {
        let v = evaluate(&promo(DiscountType::Fixed, "500"), dec("120"), &[], Utc::now());
        assert_eq!(v.discount, dec("120"));
    }

    #[test]
    fn test_rejections_in_order() {
        let now = Utc::now();

        let mut p = promo(DiscountType::Fixed, "100");
        p.is_active = false;
        p.expires_at = Some(now - Duration::days(1));
        assert_eq!(
            evaluate(&p, dec("1000"), &[], now).error.as_deref(),
            Some("Promocode is inactive")
        );

        p.is_active = true;
        assert_eq!(
            evaluate(&p, dec("1000"), &[], now).error.as_deref(),
            Some("Promocode has expired")
        );

        p.expires_at = None;
        p.start_date = Some(now + Duration::days(1));
        assert_eq!(
            evaluate(&p, dec("1000"), &[], now).error.as_deref(),
            Some("Promocode is not active yet")
        );

        p.start_date = None;
        p.usage_limit = Some(3);
        p.usage_count = 3;
        assert_eq!(
            evaluate(&p, dec("1000"), &[], now).error.as_deref(),
            Some("Promocode usage limit reached")
        );

        p.usage_limit = None;
        p.min_order_amount = dec("5000");
        assert_eq!(
            evaluate(&p, dec("1000"), &[], now).error.as_deref(),
            Some("Minimum order amount is 5 000.00")
        );
    }

    #[test]
    fn test_constraints_limit_applicable_amount() {
        let allowed = InventoryItemId::generate();
        let mut p = promo(DiscountType::Percentage, "10");
        p.constraints.included_products = vec![allowed];

        let other = line(Some(InventoryItemId::generate()), "500", 1);
        let cart = [line(Some(allowed), "100", 2), line(None, "1000", 1), other.clone()];
        let v = evaluate(&p, dec("1700"), &cart, Utc::now());
        assert!(v.is_valid);
        assert_eq!(v.discount, dec("120"));

        // Custom lines without an inventory link stay eligible.
        let cart = [line(None, "1000", 1)];
        let v = evaluate(&p, dec("1000"), &cart, Utc::now());
        assert!(v.is_valid);
        assert_eq!(v.discount, dec("100"));

        let v = evaluate(&p, dec("500"), &[other], Utc::now());
        assert!(!v.is_valid);
    }

    #[test]
    fn test_excluded_categories_match_exactly() {
        let mut p = promo(DiscountType::Percentage, "10");
        p.constraints.excluded_categories = vec!["Packaging".to_owned()];
        let mut boxes = line(None, "300", 1);
        boxes.category = Some("Packaging".to_owned());
        let mut lower = line(None, "200", 1);
        lower.category = Some("packaging".to_owned());

        let v = evaluate(&p, dec("500"), &[boxes, lower], Utc::now());
        assert_eq!(v.discount, dec("20"));
    }

    #[test]
    fn test_gift_and_free_shipping_messages() {
        let mut gift = promo(DiscountType::Gift, "0");
        gift.admin_comment = Some("Free tote bag".to_owned());
        let v = evaluate(&gift, dec("100"), &[], Utc::now());
        assert_eq!(v.discount, Decimal::ZERO);
        assert_eq!(v.message.as_deref(), Some("Gift: Free tote bag"));

        let v = evaluate(&promo(DiscountType::FreeShipping, "0"), dec("100"), &[], Utc::now());
        assert_eq!(v.message.as_deref(), Some("Free shipping"));
    }

    #[test]
    fn test_order_discount() {
        let now = Utc::now();
        let mut p = promo(DiscountType::Percentage, "15");
        p.max_discount_amount = dec("100");
        assert_eq!(order_discount(&p, dec("1000"), now), Some(dec("100")));

        p.usage_limit = Some(1);
        p.usage_count = 1;
        assert_eq!(order_discount(&p, dec("1000"), now), None);
    }

    #[test]
    fn test_generate_codes() {
        let mut rng = StdRng::seed_from_u64(7);
        let codes = generate_codes(&mut rng, "sale", 50);
        assert_eq!(codes.len(), 50);
        for code in &codes {
            assert!(code.starts_with("SALE"));
            assert_eq!(code.len(), 4 + CODE_SUFFIX_LEN);
            assert!(code[4..].bytes().all(|b| CODE_ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn test_value_bounds() {
        assert!(check_value(DiscountType::Percentage, dec("100")).is_ok());
        assert!(check_value(DiscountType::Percentage, dec("100.01")).is_err());
        assert!(check_value(DiscountType::Fixed, dec("5000")).is_ok());
        assert!(check_value(DiscountType::Fixed, dec("-1")).is_err());
    }
}
