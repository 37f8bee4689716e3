//! Promocode evaluation against carts.

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use merch_crm::models::{CartItem, PromoConstraints, Promocode};
use merch_crm::services::promocodes::{evaluate, order_discount};
use merch_crm_core::{DiscountType, InventoryItemId};

fn dec(s: &str) -> Decimal {
    s.parse().unwrap_or_default()
}

fn promo(discount_type: DiscountType, value: &str) -> Promocode {
    Promocode {
        id: Uuid::new_v4().into(),
        name: Some("Launch".to_string()),
        code: "LAUNCH".to_string(),
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

fn line(id: Option<InventoryItemId>, category: Option<&str>, price: &str, quantity: i32) -> CartItem {
    CartItem {
        inventory_id: id,
        category: category.map(str::to_string),
        price: dec(price),
        quantity,
    }
}

#[test]
fn test_percentage_applies_only_to_eligible_lines() {
    let hoodie: InventoryItemId = Uuid::new_v4().into();
    let mut code = promo(DiscountType::Percentage, "10");
    code.constraints.excluded_categories = vec!["Gift cards".to_string()];

    let cart = [
        line(Some(hoodie), Some("Clothing"), "2000", 2),
        line(None, Some("Gift cards"), "1000", 1),
    ];
    let result = evaluate(&code, dec("5000"), &cart, Utc::now());

    assert!(result.is_valid);
    assert_eq!(result.discount, dec("400"));
}

#[test]
fn test_included_products_gate_the_cart() {
    let allowed: InventoryItemId = Uuid::new_v4().into();
    let mut code = promo(DiscountType::Fixed, "300");
    code.constraints.included_products = vec![allowed];

    let other = [line(Some(Uuid::new_v4().into()), None, "1000", 1)];
    let rejected = evaluate(&code, dec("1000"), &other, Utc::now());
    assert!(!rejected.is_valid);
    assert!(rejected.error.is_some());

    let eligible = [line(Some(allowed), None, "200", 1)];
    let accepted = evaluate(&code, dec("200"), &eligible, Utc::now());
    assert!(accepted.is_valid);
    // Fixed discounts never exceed what they apply to.
    assert_eq!(accepted.discount, dec("200"));

    // Free-form lines with no inventory link still count.
    let custom = [line(None, None, "250", 1), line(Some(Uuid::new_v4().into()), None, "1000", 1)];
    let mixed = evaluate(&code, dec("1250"), &custom, Utc::now());
    assert!(mixed.is_valid);
    assert_eq!(mixed.discount, dec("250"));
}

#[test]
fn test_schedule_and_usage_limits() {
    let now = Utc::now();

    let mut expired = promo(DiscountType::Percentage, "5");
    expired.expires_at = Some(now - Duration::days(1));
    assert!(!evaluate(&expired, dec("100"), &[], now).is_valid);
    assert_eq!(order_discount(&expired, dec("100"), now), None);

    let mut early = promo(DiscountType::Percentage, "5");
    early.start_date = Some(now + Duration::days(1));
    assert!(!evaluate(&early, dec("100"), &[], now).is_valid);

    let mut used_up = promo(DiscountType::Percentage, "5");
    used_up.usage_limit = Some(3);
    used_up.usage_count = 3;
    assert!(!evaluate(&used_up, dec("100"), &[], now).is_valid);
}

#[test]
fn test_minimum_order_amount() {
    let mut code = promo(DiscountType::Fixed, "500");
    code.min_order_amount = dec("3000");

    assert!(!evaluate(&code, dec("2999.99"), &[], Utc::now()).is_valid);
    assert!(evaluate(&code, dec("3000"), &[], Utc::now()).is_valid);
}

#[test]
fn test_order_discount_caps_percentage() {
    let mut code = promo(DiscountType::Percentage, "20");
    code.max_discount_amount = dec("1000");

    assert_eq!(order_discount(&code, dec("10000"), Utc::now()), Some(dec("1000")));
    assert_eq!(order_discount(&code, dec("2000"), Utc::now()), Some(dec("400")));
}

#[test]
fn test_free_shipping_and_gift_carry_no_amount() {
    let shipping = evaluate(&promo(DiscountType::FreeShipping, "0"), dec("100"), &[], Utc::now());
    assert!(shipping.is_valid);
    assert_eq!(shipping.discount, Decimal::ZERO);

    let gift = evaluate(&promo(DiscountType::Gift, "0"), dec("100"), &[], Utc::now());
    assert_eq!(gift.message.as_deref(), Some("Gift: Launch"));
}
