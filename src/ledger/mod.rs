//! Expense ledger and account balance
//!
//! Recording an expense and debiting the cached balance happen in one store
//! call, so the balance never lags behind the expense log.

use crate::error::FinanceError;
use crate::models::{
    ensure_non_negative, month_start, parse_range_end, parse_timestamp, round2, AccountBalance, BalanceUpdate,
    Expense, ExpenseCategory, ExpenseFilter, OperationResult, Upsert,
};
use crate::store::StoreHandle;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Arguments for an expense listing. Every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExpenseQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub category: Option<String>,
    pub min_amount: Option<f64>,
    pub max_amount: Option<f64>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExpenseRecorded {
    pub message: String,
    pub expense: Expense,
    pub new_balance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExpenseReport {
    pub count: usize,
    pub total_amount: f64,
    pub category_breakdown: BTreeMap<ExpenseCategory, f64>,
    pub expenses: Vec<Expense>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BalanceReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub current_balance: f64,
    pub monthly_income: f64,
    pub monthly_expense_threshold: f64,
    pub current_month_spent: f64,
    pub threshold_usage_percentage: f64,
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BalanceSet {
    pub message: String,
    pub balance: AccountBalance,
}

pub struct LedgerService {
    store: StoreHandle,
}

impl LedgerService {
    pub fn new(store: StoreHandle) -> Self {
        Self { store }
    }

    /// Record an expense and debit the user's balance.
    pub async fn record_expense(
        &self,
        user_id: &str,
        amount: f64,
        category: &str,
        description: &str,
        date: Option<&str>,
    ) -> OperationResult<ExpenseRecorded> {
        OperationResult::from_result(
            self.try_record_expense(user_id, amount, category, description, date)
                .await,
            "Error adding expense",
        )
    }

    async fn try_record_expense(
        &self,
        user_id: &str,
        amount: f64,
        category: &str,
        description: &str,
        date: Option<&str>,
    ) -> Result<ExpenseRecorded> {
        let category: ExpenseCategory = category.parse()?;
        let date = date.map(parse_timestamp).transpose()?;
        let expense = Expense::new(user_id, amount, category, description.to_string(), date)?;

        let balance = self.store.record_expense(&expense).await?;

        info!(
            user_id,
            expense_id = %expense.expense_id,
            amount,
            category = %category,
            new_balance = balance.current_balance,
            "Expense recorded"
        );

        Ok(ExpenseRecorded {
            message: format!("Expense of ${:.2} added successfully", amount),
            expense,
            new_balance: balance.current_balance,
        })
    }

    /// Filtered expense history, newest first, with totals per category.
    pub async fn list_expenses(
        &self,
        user_id: &str,
        query: &ExpenseQuery,
    ) -> OperationResult<ExpenseReport> {
        OperationResult::from_result(
            self.try_list_expenses(user_id, query).await,
            "Error retrieving expenses",
        )
    }

    async fn try_list_expenses(&self, user_id: &str, query: &ExpenseQuery) -> Result<ExpenseReport> {
        let filter = build_filter(user_id, query)?;
        let expenses = self.store.list_expenses(&filter).await?;

        let mut total_amount = 0.0;
        let mut category_breakdown: BTreeMap<ExpenseCategory, f64> = BTreeMap::new();
        for expense in &expenses {
            total_amount += expense.amount;
            *category_breakdown.entry(expense.category).or_insert(0.0) += expense.amount;
        }
        category_breakdown.values_mut().for_each(|v| *v = round2(*v));

        debug!(user_id, count = expenses.len(), total_amount, "Expenses listed");

        Ok(ExpenseReport {
            count: expenses.len(),
            total_amount: round2(total_amount),
            category_breakdown,
            expenses,
        })
    }

    /// Current balance plus this month's spending against the threshold.
    pub async fn get_balance(&self, user_id: &str) -> OperationResult<BalanceReport> {
        OperationResult::from_result(
            self.try_get_balance(user_id, Utc::now()).await,
            "Error retrieving account balance",
        )
    }

    async fn try_get_balance(&self, user_id: &str, now: DateTime<Utc>) -> Result<BalanceReport> {
        let Some(balance) = self.store.find_balance(user_id).await? else {
            return Ok(BalanceReport {
                message: Some("No account balance found. Please set initial balance.".to_string()),
                current_balance: 0.0,
                monthly_income: 0.0,
                monthly_expense_threshold: 0.0,
                current_month_spent: 0.0,
                threshold_usage_percentage: 0.0,
                last_updated: None,
            });
        };

        let monthly_spent = self
            .store
            .sum_expenses_since(user_id, month_start(now))
            .await?;

        Ok(BalanceReport {
            message: None,
            current_balance: round2(balance.current_balance),
            monthly_income: round2(balance.monthly_income),
            monthly_expense_threshold: round2(balance.monthly_expense_threshold),
            current_month_spent: round2(monthly_spent),
            threshold_usage_percentage: round2(threshold_usage(
                monthly_spent,
                balance.monthly_expense_threshold,
            )),
            last_updated: Some(balance.last_updated),
        })
    }

    /// Reset the balance baseline; absent parameters keep their stored value.
    pub async fn set_balance(
        &self,
        user_id: &str,
        balance: f64,
        monthly_income: Option<f64>,
        monthly_expense_threshold: Option<f64>,
    ) -> OperationResult<BalanceSet> {
        OperationResult::from_result(
            self.try_set_balance(user_id, balance, monthly_income, monthly_expense_threshold)
                .await,
            "Error setting account balance",
        )
    }

    async fn try_set_balance(
        &self,
        user_id: &str,
        balance: f64,
        monthly_income: Option<f64>,
        monthly_expense_threshold: Option<f64>,
    ) -> Result<BalanceSet> {
        let update = BalanceUpdate::new(user_id, balance, monthly_income, monthly_expense_threshold)?;
        let (stored, outcome) = self.store.upsert_balance(&update).await?;

        info!(user_id, balance, ?outcome, "Account balance set");

        let message = match outcome {
            Upsert::Created => "Account balance set successfully",
            Upsert::Updated => "Account balance updated successfully",
        };

        Ok(BalanceSet {
            message: message.to_string(),
            balance: stored,
        })
    }
}

/// Share of the monthly threshold already spent; 0 without a threshold.
pub fn threshold_usage(monthly_spent: f64, threshold: f64) -> f64 {
    if threshold > 0.0 {
        monthly_spent / threshold * 100.0
    } else {
        0.0
    }
}

fn build_filter(user_id: &str, query: &ExpenseQuery) -> Result<ExpenseFilter> {
    let mut filter = ExpenseFilter::for_user(user_id);

    filter.start_date = query.start_date.as_deref().map(parse_timestamp).transpose()?;
    filter.end_date = query.end_date.as_deref().map(parse_range_end).transpose()?;
    filter.category = query
        .category
        .as_deref()
        .map(str::parse::<ExpenseCategory>)
        .transpose()?;
    for (field, bound) in [("min_amount", query.min_amount), ("max_amount", query.max_amount)] {
        if let Some(value) = bound {
            ensure_non_negative(field, value)?;
        }
    }
    filter.min_amount = query.min_amount;
    filter.max_amount = query.max_amount;

    if let Some(limit) = query.limit {
        if limit == 0 {
            return Err(FinanceError::invalid("limit must be at least 1"));
        }
        filter.limit = limit;
    }

    if let (Some(start), Some(end)) = (filter.start_date, filter.end_date) {
        if start > end {
            return Err(FinanceError::invalid("start_date must not be after end_date"));
        }
    }

    if let (Some(min), Some(max)) = (filter.min_amount, filter.max_amount) {
        if min > max {
            return Err(FinanceError::invalid("min_amount must not exceed max_amount"));
        }
    }

    Ok(filter)
}
