//! Finance arithmetic: profit and loss, payroll, fund split.

#![allow(clippy::indexing_slicing)]

use rust_decimal::Decimal;
use uuid::Uuid;

use merch_crm::models::finance::{BASE_SALARY, ORDER_BONUS, split_funds};
use merch_crm::models::{ProfitLoss, SalaryRow, SalaryStats};

fn dec(s: &str) -> Decimal {
    s.parse().unwrap_or_default()
}

#[test]
fn test_fund_split_adds_up_to_revenue() {
    let revenue = dec("123456.78");
    let total: Decimal = split_funds(revenue).iter().map(|f| f.amount).sum();
    // Each share is rounded to kopecks, so allow a one-unit drift per fund.
    assert!((total - revenue).abs() <= dec("0.05"), "split total {total}");
}

#[test]
fn test_loss_making_period() {
    let pl = ProfitLoss::compute(dec("1000"), dec("800"), dec("500"));
    assert_eq!(pl.gross_profit, dec("200"));
    assert_eq!(pl.net_profit, dec("-300"));
    assert!(pl.margin < Decimal::ZERO);
}

#[test]
fn test_payroll_budget_and_order() {
    let quiet = SalaryRow::new(Uuid::new_v4().into(), "Quiet".to_string(), None, 0);
    let busy = SalaryRow::new(
        Uuid::new_v4().into(),
        "Busy".to_string(),
        Some("Manager".to_string()),
        4,
    );
    let stats = SalaryStats::from_rows(vec![quiet, busy]);

    assert_eq!(stats.rows[0].name, "Busy");
    assert_eq!(stats.rows[0].bonus, ORDER_BONUS * Decimal::from(4));
    assert_eq!(
        stats.budget,
        BASE_SALARY * Decimal::from(2) + ORDER_BONUS * Decimal::from(4)
    );
}
