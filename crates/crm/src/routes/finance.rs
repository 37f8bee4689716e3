//! Finance route handlers. Admin and management only.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form, Router,
    extract::{Query, State},
    response::Redirect,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::instrument;

use merch_crm_core::ExpenseCategory;

use crate::db::FinanceRepository;
use crate::error::AppError;
use crate::filters;
use crate::middleware::RequireAuth;
use crate::models::{
    Expense, ExpenseInput, FinancialStats, FundShare, LedgerKind, OrderListRow,
    PaymentTransaction, ProfitLoss, SalaryStats,
};
use crate::routes::{
    DateRangeQuery, Flash, Layout, parse_amount, parse_date, parse_enum, redirect_with,
    require_management, text,
};
use crate::state::AppState;

/// Default report window in days.
const DEFAULT_DAYS: i64 = 30;

/// Build the finance router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/finance", get(index))
        .route("/finance/transactions", get(transactions))
        .route("/finance/expenses", post(create_expense))
        .route("/finance/salary", get(salary))
        .route("/finance/funds", get(funds))
}

/// Resolved report period plus the values echoed back into the filter form.
#[derive(Debug, Clone)]
pub struct Period {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub from_value: String,
    pub to_value: String,
}

impl Period {
    fn resolve(query: &DateRangeQuery) -> Self {
        let (from, to) = query.resolve(DEFAULT_DAYS);
        // `to` is exclusive midnight when a date was given, otherwise now.
        let last_day = if query.to.as_deref().is_some_and(|t| !t.trim().is_empty()) {
            to - chrono::Duration::days(1)
        } else {
            to
        };
        Self {
            from,
            to,
            from_value: from.format("%Y-%m-%d").to_string(),
            to_value: last_day.format("%Y-%m-%d").to_string(),
        }
    }
}

/// Finance overview template.
#[derive(Template, WebTemplate)]
#[template(path = "finance/index.html")]
pub struct FinanceTemplate {
    pub layout: Layout,
    pub period: Period,
    pub stats: FinancialStats,
    pub pl: ProfitLoss,
}

/// Finance overview: period stats plus the P&L report.
#[instrument(skip(user, state))]
pub async fn index(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Query(flash): Query<Flash>,
    Query(range): Query<DateRangeQuery>,
) -> Result<FinanceTemplate, AppError> {
    require_management(&user)?;
    let period = Period::resolve(&range);
    let repo = FinanceRepository::new(state.pool());

    let mut stats = repo.financial_stats(period.from, period.to).await?;
    if user.hides_client_contacts() {
        stats.recent_orders.iter_mut().for_each(OrderListRow::hide_contacts);
    }
    let pl = repo.profit_loss(period.from, period.to).await?;

    Ok(FinanceTemplate {
        layout: Layout::new(&state, &user, "/finance", flash).await,
        period,
        stats,
        pl,
    })
}

/// Transaction list query.
#[derive(Debug, Default, Deserialize)]
pub struct TransactionsQuery {
    #[serde(default)]
    pub kind: LedgerKind,
    pub from: Option<String>,
    pub to: Option<String>,
}

/// Transactions page template.
#[derive(Template, WebTemplate)]
#[template(path = "finance/transactions.html")]
pub struct TransactionsTemplate {
    pub layout: Layout,
    pub period: Period,
    pub kind: LedgerKind,
    pub payments: Vec<PaymentTransaction>,
    pub expenses: Vec<Expense>,
    pub expense_total: Decimal,
    pub categories: &'static [ExpenseCategory],
}

/// Payments or expenses in a period, newest first.
#[instrument(skip(user, state))]
pub async fn transactions(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Query(flash): Query<Flash>,
    Query(query): Query<TransactionsQuery>,
) -> Result<TransactionsTemplate, AppError> {
    require_management(&user)?;
    let period = Period::resolve(&DateRangeQuery {
        from: query.from,
        to: query.to,
    });
    let repo = FinanceRepository::new(state.pool());

    let (payments, expenses) = match query.kind {
        LedgerKind::Payment => (repo.payments(period.from, period.to).await?, Vec::new()),
        LedgerKind::Expense => (Vec::new(), repo.expenses(period.from, period.to).await?),
    };
    let expense_total = expenses.iter().map(|e| e.amount).sum();

    Ok(TransactionsTemplate {
        layout: Layout::new(&state, &user, "/finance/transactions", flash).await,
        period,
        kind: query.kind,
        payments,
        expenses,
        expense_total,
        categories: ExpenseCategory::ALL,
    })
}

/// Expense form.
#[derive(Debug, Deserialize)]
pub struct ExpenseForm {
    pub category: String,
    pub amount: String,
    pub description: Option<String>,
    pub date: Option<String>,
}

impl ExpenseForm {
    fn to_input(&self) -> Result<ExpenseInput, AppError> {
        let amount = parse_amount("Amount", Some(&self.amount))?;
        if amount <= Decimal::ZERO {
            return Err(AppError::BadRequest(
                "Amount must be greater than zero".to_string(),
            ));
        }
        Ok(ExpenseInput {
            category: parse_enum("expense category", &self.category)?,
            amount,
            description: text(self.description.as_ref()),
            date: parse_date("Date", self.date.as_deref())?
                .unwrap_or_else(|| Utc::now().date_naive()),
        })
    }
}

/// Record an overhead expense.
#[instrument(skip(user, state, form))]
pub async fn create_expense(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Form(form): Form<ExpenseForm>,
) -> Result<Redirect, AppError> {
    let outcome = async {
        require_management(&user)?;
        let input = form.to_input()?;
        FinanceRepository::new(state.pool())
            .create_expense(&input, user.id)
            .await?;
        Ok::<_, AppError>("Expense recorded".to_string())
    }
    .await;

    redirect_with("/finance/transactions?kind=expense", outcome)
}

/// Payroll template.
#[derive(Template, WebTemplate)]
#[template(path = "finance/salary.html")]
pub struct SalaryTemplate {
    pub layout: Layout,
    pub period: Period,
    pub salary: SalaryStats,
}

/// Payroll for a period.
#[instrument(skip(user, state))]
pub async fn salary(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Query(flash): Query<Flash>,
    Query(range): Query<DateRangeQuery>,
) -> Result<SalaryTemplate, AppError> {
    require_management(&user)?;
    let period = Period::resolve(&range);
    let salary = FinanceRepository::new(state.pool())
        .salary_stats(period.from, period.to)
        .await?;

    Ok(SalaryTemplate {
        layout: Layout::new(&state, &user, "/finance/salary", flash).await,
        period,
        salary,
    })
}

/// Fund split template.
#[derive(Template, WebTemplate)]
#[template(path = "finance/funds.html")]
pub struct FundsTemplate {
    pub layout: Layout,
    pub period: Period,
    pub revenue: Decimal,
    pub funds: Vec<FundShare>,
}

/// Revenue split into funds.
#[instrument(skip(user, state))]
pub async fn funds(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Query(flash): Query<Flash>,
    Query(range): Query<DateRangeQuery>,
) -> Result<FundsTemplate, AppError> {
    require_management(&user)?;
    let period = Period::resolve(&range);
    let (revenue, funds) = FinanceRepository::new(state.pool())
        .funds(period.from, period.to)
        .await?;

    Ok(FundsTemplate {
        layout: Layout::new(&state, &user, "/finance/funds", flash).await,
        period,
        revenue,
        funds,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_expense_form_requires_positive_amount() {
        let form = ExpenseForm {
            category: "rent".to_string(),
            amount: "0".to_string(),
            description: None,
            date: None,
        };
        assert!(matches!(form.to_input(), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_expense_form_defaults_date_to_today() {
        let form = ExpenseForm {
            category: "tax".to_string(),
            amount: "1 500,50".to_string(),
            description: Some("  ".to_string()),
            date: None,
        };
        let input = form.to_input().unwrap();
        assert_eq!(input.category, ExpenseCategory::Tax);
        assert_eq!(input.amount, "1500.50".parse::<Decimal>().unwrap());
        assert_eq!(input.description, None);
        assert_eq!(input.date, Utc::now().date_naive());
    }

    #[test]
    fn test_period_values() {
        let period = Period::resolve(&DateRangeQuery {
            from: Some("2026-03-01".to_string()),
            to: Some("2026-03-31".to_string()),
        });
        assert_eq!(period.from_value, "2026-03-01");
        assert_eq!(period.to_value, "2026-03-31");
    }
}
