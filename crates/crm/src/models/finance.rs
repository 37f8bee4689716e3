//! Finance reports.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use merch_crm_core::{ExpenseCategory, ExpenseId, OrderCategory, PaymentMethod, UserId};

use super::order::OrderListRow;

/// Share of COGS booked as write-offs.
pub const WRITE_OFF_RATE: Decimal = Decimal::from_parts(5, 0, 0, false, 2);

/// Monthly base salary.
pub const BASE_SALARY: Decimal = Decimal::from_parts(30_000, 0, 0, false, 0);

/// Bonus per completed order.
pub const ORDER_BONUS: Decimal = Decimal::from_parts(500, 0, 0, false, 0);

/// Revenue split: fund name and percent.
pub const FUND_SHARES: &[(&str, u32)] = &[
    ("Operations", 40),
    ("Payroll", 30),
    ("Development", 15),
    ("Reserve", 10),
    ("Marketing", 5),
];

/// Headline numbers for a period.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FinanceSummary {
    pub revenue: Decimal,
    pub order_count: i64,
    pub average_order_value: Decimal,
    pub cogs: Decimal,
    pub net_profit: Decimal,
    pub average_cost: Decimal,
    pub write_offs: Decimal,
}

/// Revenue for one day.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct DailyRevenue {
    pub date: NaiveDate,
    pub revenue: Decimal,
    pub count: i64,
}

/// Revenue for one order category.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CategoryRevenue {
    pub category: OrderCategory,
    pub revenue: Decimal,
    pub count: i64,
}

/// Everything the finance page shows.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FinancialStats {
    pub summary: FinanceSummary,
    pub daily: Vec<DailyRevenue>,
    pub categories: Vec<CategoryRevenue>,
    pub recent_orders: Vec<OrderListRow>,
}

/// Profit and loss for a period.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfitLoss {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub revenue: Decimal,
    pub cogs: Decimal,
    pub gross_profit: Decimal,
    pub overhead: Decimal,
    pub net_profit: Decimal,
    pub margin: Decimal,
}

impl ProfitLoss {
    /// Derive gross, net and margin from the three sums.
    #[must_use]
    pub fn compute(revenue: Decimal, cogs: Decimal, overhead: Decimal) -> Self {
        let gross_profit = revenue - cogs;
        let net_profit = gross_profit - overhead;
        Self {
            from: None,
            to: None,
            revenue,
            cogs,
            gross_profit,
            overhead,
            net_profit,
            margin: merch_crm_core::ratio_percent(net_profit, revenue),
        }
    }
}

/// Which ledger to list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerKind {
    #[default]
    Payment,
    Expense,
}

impl LedgerKind {
    #[must_use]
    pub const fn is_expense(self) -> bool {
        matches!(self, Self::Expense)
    }
}

/// A payment with its order context.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PaymentTransaction {
    pub id: uuid::Uuid,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub comment: Option<String>,
    pub order_number: String,
    pub client_name: String,
    pub created_at: DateTime<Utc>,
}

/// An overhead expense.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Expense {
    pub id: ExpenseId,
    pub category: ExpenseCategory,
    pub amount: Decimal,
    pub description: Option<String>,
    pub date: NaiveDate,
    pub created_by_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Validated expense fields.
#[derive(Debug, Clone)]
pub struct ExpenseInput {
    pub category: ExpenseCategory,
    pub amount: Decimal,
    pub description: Option<String>,
    pub date: NaiveDate,
}

/// Payroll line for one staff member.
#[derive(Debug, Clone, Serialize)]
pub struct SalaryRow {
    pub user_id: UserId,
    pub name: String,
    pub role_name: Option<String>,
    pub orders: i64,
    pub base: Decimal,
    pub bonus: Decimal,
    pub total: Decimal,
}

impl SalaryRow {
    /// Base plus per-order bonus.
    #[must_use]
    pub fn new(user_id: UserId, name: String, role_name: Option<String>, orders: i64) -> Self {
        let bonus = ORDER_BONUS * Decimal::from(orders);
        Self {
            user_id,
            name,
            role_name,
            orders,
            base: BASE_SALARY,
            bonus,
            total: BASE_SALARY + bonus,
        }
    }
}

/// Payroll for a period.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SalaryStats {
    pub rows: Vec<SalaryRow>,
    pub budget: Decimal,
}

impl SalaryStats {
    /// Sort by total, descending, and sum the budget.
    #[must_use]
    pub fn from_rows(mut rows: Vec<SalaryRow>) -> Self {
        rows.sort_by(|a, b| b.total.cmp(&a.total));
        let budget = rows.iter().map(|r| r.total).sum();
        Self { rows, budget }
    }
}

/// One fund's share of revenue.
#[derive(Debug, Clone, Serialize)]
pub struct FundShare {
    pub name: &'static str,
    pub percent: u32,
    pub amount: Decimal,
}

/// Split revenue into the fixed funds.
#[must_use]
pub fn split_funds(revenue: Decimal) -> Vec<FundShare> {
    FUND_SHARES
        .iter()
        .map(|&(name, percent)| FundShare {
            name,
            percent,
            amount: merch_crm_core::percent_of(revenue, Decimal::from(percent)),
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_constants() {
        assert_eq!(WRITE_OFF_RATE, dec("0.05"));
        assert_eq!(BASE_SALARY, dec("30000"));
        assert_eq!(ORDER_BONUS, dec("500"));
        assert_eq!(FUND_SHARES.iter().map(|(_, p)| p).sum::<u32>(), 100);
    }

    #[test]
    fn test_profit_loss() {
        let pl = ProfitLoss::compute(dec("10000"), dec("4000"), dec("1000"));
        assert_eq!(pl.gross_profit, dec("6000"));
        assert_eq!(pl.net_profit, dec("5000"));
        assert_eq!(pl.margin, dec("50.0"));

        let empty = ProfitLoss::compute(Decimal::ZERO, Decimal::ZERO, dec("500"));
        assert_eq!(empty.net_profit, dec("-500"));
        assert_eq!(empty.margin, Decimal::ZERO);
    }

    #[test]
    fn test_salary_sorted_by_total() {
        let stats = SalaryStats::from_rows(vec![
            SalaryRow::new(UserId::generate(), "A".into(), None, 1),
            SalaryRow::new(UserId::generate(), "B".into(), None, 4),
        ]);
        assert_eq!(stats.rows[0].name, "B");
        assert_eq!(stats.rows[0].total, dec("32000"));
        assert_eq!(stats.budget, dec("62500"));
    }

    #[test]
    fn test_split_funds() {
        let funds = split_funds(dec("1000"));
        assert_eq!(funds[0].amount, dec("400"));
        assert_eq!(funds[4].name, "Marketing");
        assert_eq!(funds[4].amount, dec("50"));
    }
}
