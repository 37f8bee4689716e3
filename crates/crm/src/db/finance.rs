//! Finance reports and expenses.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use sqlx::PgPool;

use merch_crm_core::{ExpenseId, UserId, round_money};

use super::{OrderRepository, RepositoryError, audit};
use crate::models::finance::{WRITE_OFF_RATE, split_funds};
use crate::models::{
    CategoryRevenue, DailyRevenue, Expense, ExpenseInput, FinanceSummary, FinancialStats,
    FundShare, PaymentTransaction, ProfitLoss, SalaryRow, SalaryStats,
};

/// Orders listed under the finance summary.
const RECENT_ORDERS: i64 = 10;

/// Repository for finance reports.
pub struct FinanceRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> FinanceRepository<'a> {
    /// Create a new finance repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Revenue, cost and the breakdowns for orders created in a period.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn financial_stats(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<FinancialStats, RepositoryError> {
        let (revenue, order_count) = sqlx::query_as::<_, (Decimal, i64)>(
            r"
            SELECT COALESCE(SUM(total_amount), 0), COUNT(*)
            FROM crm.orders
            WHERE created_at BETWEEN $1 AND $2
            ",
        )
        .bind(from)
        .bind(to)
        .fetch_one(self.pool)
        .await?;

        let cogs = self.cogs(from, to).await?;

        let daily = sqlx::query_as::<_, DailyRevenue>(
            r"
            SELECT created_at::date AS date,
                   COALESCE(SUM(total_amount), 0) AS revenue,
                   COUNT(*) AS count
            FROM crm.orders
            WHERE created_at BETWEEN $1 AND $2
            GROUP BY 1
            ORDER BY 1
            ",
        )
        .bind(from)
        .bind(to)
        .fetch_all(self.pool)
        .await?;

        let categories = sqlx::query_as::<_, CategoryRevenue>(
            r"
            SELECT category, COALESCE(SUM(total_amount), 0) AS revenue, COUNT(*) AS count
            FROM crm.orders
            WHERE created_at BETWEEN $1 AND $2
            GROUP BY category
            ORDER BY revenue DESC
            ",
        )
        .bind(from)
        .bind(to)
        .fetch_all(self.pool)
        .await?;

        let recent_orders = OrderRepository::new(self.pool)
            .recent_in_range(from, to, RECENT_ORDERS)
            .await?;

        Ok(FinancialStats {
            summary: summarize(revenue, order_count, cogs),
            daily,
            categories,
            recent_orders,
        })
    }

    /// Profit and loss: payments less stock cost and expenses.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn profit_loss(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<ProfitLoss, RepositoryError> {
        let revenue = sqlx::query_scalar::<_, Decimal>(
            "SELECT COALESCE(SUM(amount), 0) FROM crm.payments WHERE created_at BETWEEN $1 AND $2",
        )
        .bind(from)
        .bind(to)
        .fetch_one(self.pool)
        .await?;

        let cogs = self.cogs(from, to).await?;

        let overhead = sqlx::query_scalar::<_, Decimal>(
            r"
            SELECT COALESCE(SUM(amount), 0) FROM crm.expenses
            WHERE date BETWEEN $1::date AND $2::date
            ",
        )
        .bind(from)
        .bind(to)
        .fetch_one(self.pool)
        .await?;

        Ok(ProfitLoss {
            from: Some(from),
            to: Some(to),
            ..ProfitLoss::compute(revenue, cogs, overhead)
        })
    }

    /// Cost of goods: `|change| * cost_price` over outgoing stock.
    async fn cogs(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Decimal, RepositoryError> {
        let cogs = sqlx::query_scalar::<_, Decimal>(
            r"
            SELECT COALESCE(SUM(ABS(change_amount) * COALESCE(cost_price, 0)), 0)
            FROM crm.inventory_transactions
            WHERE type = 'out' AND created_at BETWEEN $1 AND $2
            ",
        )
        .bind(from)
        .bind(to)
        .fetch_one(self.pool)
        .await?;

        Ok(cogs)
    }

    /// Payments newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn payments(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<PaymentTransaction>, RepositoryError> {
        let payments = sqlx::query_as::<_, PaymentTransaction>(
            r"
            SELECT p.id, p.amount, p.method, p.comment, o.order_number,
                   c.name AS client_name, p.created_at
            FROM crm.payments p
            JOIN crm.orders o ON o.id = p.order_id
            JOIN crm.clients c ON c.id = o.client_id
            WHERE p.created_at BETWEEN $1 AND $2
            ORDER BY p.created_at DESC
            ",
        )
        .bind(from)
        .bind(to)
        .fetch_all(self.pool)
        .await?;

        Ok(payments)
    }

    /// Expenses newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn expenses(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Expense>, RepositoryError> {
        let expenses = sqlx::query_as::<_, Expense>(
            r"
            SELECT e.id, e.category, e.amount, e.description, e.date,
                   u.name AS created_by_name, e.created_at
            FROM crm.expenses e
            LEFT JOIN crm.users u ON u.id = e.created_by
            WHERE e.date BETWEEN $1::date AND $2::date
            ORDER BY e.date DESC, e.created_at DESC
            ",
        )
        .bind(from)
        .bind(to)
        .fetch_all(self.pool)
        .await?;

        Ok(expenses)
    }

    /// Record an expense.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn create_expense(
        &self,
        input: &ExpenseInput,
        actor: UserId,
    ) -> Result<ExpenseId, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let id = sqlx::query_scalar::<_, ExpenseId>(
            r"
            INSERT INTO crm.expenses (category, amount, description, date, created_by)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            ",
        )
        .bind(input.category)
        .bind(input.amount)
        .bind(&input.description)
        .bind(input.date)
        .bind(actor)
        .fetch_one(&mut *tx)
        .await?;

        audit::record(
            &mut tx,
            Some(actor),
            "Expense recorded",
            "expense",
            Some(id.as_uuid()),
            json!({ "category": input.category, "amount": input.amount }),
        )
        .await?;

        tx.commit().await?;
        Ok(id)
    }

    /// Payroll: base plus a bonus per `done` order each staff member created.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn salary_stats(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<SalaryStats, RepositoryError> {
        let rows = sqlx::query_as::<_, (UserId, String, Option<String>, i64)>(
            r"
            SELECT u.id, u.name, r.name,
                   (SELECT COUNT(*) FROM crm.orders o
                     WHERE o.created_by = u.id AND o.status = 'done'
                       AND o.created_at BETWEEN $1 AND $2)
            FROM crm.users u
            LEFT JOIN crm.roles r ON r.id = u.role_id
            WHERE NOT u.is_system
            ",
        )
        .bind(from)
        .bind(to)
        .fetch_all(self.pool)
        .await?;

        Ok(SalaryStats::from_rows(
            rows.into_iter()
                .map(|(id, name, role, orders)| SalaryRow::new(id, name, role, orders))
                .collect(),
        ))
    }

    /// Revenue of non-cancelled orders split into funds.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn funds(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<(Decimal, Vec<FundShare>), RepositoryError> {
        let revenue = sqlx::query_scalar::<_, Decimal>(
            r"
            SELECT COALESCE(SUM(total_amount), 0) FROM crm.orders
            WHERE status <> 'cancelled' AND created_at BETWEEN $1 AND $2
            ",
        )
        .bind(from)
        .bind(to)
        .fetch_one(self.pool)
        .await?;

        Ok((revenue, split_funds(revenue)))
    }
}

/// Derive the headline numbers from revenue, order count and cost.
fn summarize(revenue: Decimal, order_count: i64, cogs: Decimal) -> FinanceSummary {
    let per_order = |amount: Decimal| {
        if order_count > 0 {
            round_money(amount / Decimal::from(order_count))
        } else {
            Decimal::ZERO
        }
    };

    FinanceSummary {
        revenue,
        order_count,
        average_order_value: per_order(revenue),
        cogs,
        net_profit: revenue - cogs,
        average_cost: per_order(cogs),
        write_offs: round_money(cogs * WRITE_OFF_RATE),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_summarize() {
        let s = summarize(dec("9000"), 3, dec("1200"));
        assert_eq!(s.average_order_value, dec("3000"));
        assert_eq!(s.net_profit, dec("7800"));
        assert_eq!(s.average_cost, dec("400"));
        assert_eq!(s.write_offs, dec("60"));
    }

    #[test]
    fn test_summarize_without_orders() {
        let s = summarize(Decimal::ZERO, 0, Decimal::ZERO);
        assert_eq!(s.average_order_value, Decimal::ZERO);
        assert_eq!(s.average_cost, Decimal::ZERO);
    }
}
