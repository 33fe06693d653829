//! In-memory document store for development and tests
//!
//! All collections sit behind one lock, so the expense insert and the
//! balance debit are applied together.

use super::DocumentStore;
use crate::models::{
    AccountBalance, BalanceUpdate, Expense, ExpenseFilter, Goal, Investment, InvestmentType, Upsert,
};
use crate::Result;
use chrono::{DateTime, Utc};
use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct Collections {
    goals: Vec<Goal>,
    expenses: Vec<Expense>,
    balances: HashMap<String, AccountBalance>, // user_id → balance
    investments: Vec<Investment>,
}

pub struct InMemoryStore {
    data: Arc<RwLock<Collections>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(Collections::default())),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl DocumentStore for InMemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) {}

    async fn insert_goal(&self, goal: &Goal) -> Result<()> {
        let mut data = self.data.write().await;
        data.goals.push(goal.clone());
        Ok(())
    }

    async fn find_goal(&self, user_id: &str, goal_id: &str) -> Result<Option<Goal>> {
        let data = self.data.read().await;
        Ok(data
            .goals
            .iter()
            .find(|g| g.user_id == user_id && g.goal_id == goal_id)
            .cloned())
    }

    async fn list_goals(&self, user_id: &str) -> Result<Vec<Goal>> {
        let data = self.data.read().await;

        // Reverse insertion order first so ties keep the newest on top
        let mut goals: Vec<Goal> = data
            .goals
            .iter()
            .rev()
            .filter(|g| g.user_id == user_id)
            .cloned()
            .collect();
        goals.sort_by_key(|g| Reverse(g.created_at));

        Ok(goals)
    }

    async fn add_goal_amount(
        &self,
        user_id: &str,
        goal_id: &str,
        delta: f64,
        at: DateTime<Utc>,
    ) -> Result<Option<Goal>> {
        let mut data = self.data.write().await;

        let Some(goal) = data
            .goals
            .iter_mut()
            .find(|g| g.user_id == user_id && g.goal_id == goal_id)
        else {
            return Ok(None);
        };

        goal.current_amount += delta;
        goal.updated_at = at;
        Ok(Some(goal.clone()))
    }

    async fn record_expense(&self, expense: &Expense) -> Result<AccountBalance> {
        let mut data = self.data.write().await;

        data.expenses.push(expense.clone());

        let balance = data
            .balances
            .entry(expense.user_id.clone())
            .and_modify(|b| {
                b.current_balance -= expense.amount;
                b.last_updated = expense.created_at;
            })
            .or_insert_with(|| AccountBalance::overdrawn(&expense.user_id, expense.amount));

        Ok(balance.clone())
    }

    async fn list_expenses(&self, filter: &ExpenseFilter) -> Result<Vec<Expense>> {
        let data = self.data.read().await;

        let mut expenses: Vec<Expense> = data
            .expenses
            .iter()
            .rev()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        expenses.sort_by_key(|e| Reverse(e.date));
        expenses.truncate(filter.limit);

        Ok(expenses)
    }

    async fn sum_expenses_since(&self, user_id: &str, since: DateTime<Utc>) -> Result<f64> {
        let data = self.data.read().await;
        Ok(data
            .expenses
            .iter()
            .filter(|e| e.user_id == user_id && e.date >= since)
            .fold(0.0, |total, e| total + e.amount))
    }

    async fn find_balance(&self, user_id: &str) -> Result<Option<AccountBalance>> {
        let data = self.data.read().await;
        Ok(data.balances.get(user_id).cloned())
    }

    async fn upsert_balance(&self, update: &BalanceUpdate) -> Result<(AccountBalance, Upsert)> {
        let mut data = self.data.write().await;

        let existing = data.balances.get(&update.user_id);
        let outcome = if existing.is_some() {
            Upsert::Updated
        } else {
            Upsert::Created
        };
        let merged = update.apply_to(existing);

        data.balances.insert(update.user_id.clone(), merged.clone());
        Ok((merged, outcome))
    }

    async fn insert_investment(&self, investment: &Investment) -> Result<()> {
        let mut data = self.data.write().await;
        data.investments.push(investment.clone());
        Ok(())
    }

    async fn list_investments(
        &self,
        user_id: &str,
        investment_type: Option<InvestmentType>,
    ) -> Result<Vec<Investment>> {
        let data = self.data.read().await;

        let mut investments: Vec<Investment> = data
            .investments
            .iter()
            .rev()
            .filter(|i| i.user_id == user_id)
            .filter(|i| investment_type.map_or(true, |t| i.investment_type == t))
            .cloned()
            .collect();
        investments.sort_by_key(|i| Reverse(i.purchase_date));

        Ok(investments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExpenseCategory, GoalType, Priority};

    fn expense(user: &str, amount: f64) -> Expense {
        Expense::new(user, amount, ExpenseCategory::Dining, "lunch".into(), None).unwrap()
    }

    #[tokio::test]
    async fn test_record_expense_creates_overdrawn_balance() {
        let store = InMemoryStore::new();

        let balance = store.record_expense(&expense("u1", 40.0)).await.unwrap();
        assert_eq!(balance.current_balance, -40.0);
        assert_eq!(balance.monthly_income, 0.0);

        let balance = store.record_expense(&expense("u1", 10.0)).await.unwrap();
        assert_eq!(balance.current_balance, -50.0);
    }

    #[tokio::test]
    async fn test_users_are_isolated() {
        let store = InMemoryStore::new();
        store.record_expense(&expense("u1", 5.0)).await.unwrap();

        assert!(store.find_balance("u2").await.unwrap().is_none());
        let filter = ExpenseFilter::for_user("u2");
        assert!(store.list_expenses(&filter).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_month_sum_without_expenses_is_positive_zero() {
        let store = InMemoryStore::new();
        store.record_expense(&expense("u1", 5.0)).await.unwrap();

        let since = Utc::now() - chrono::Duration::days(1);
        let total = store.sum_expenses_since("u2", since).await.unwrap();
        assert_eq!(total, 0.0);
        assert!(total.is_sign_positive());
        assert_eq!(serde_json::to_string(&total).unwrap(), "0.0");
    }

    #[tokio::test]
    async fn test_goal_round_trip() {
        let store = InMemoryStore::new();
        let goal = Goal::new(
            "u1",
            GoalType::EmergencyFund,
            "Rainy day".into(),
            5000.0,
            100.0,
            Utc::now(),
            Priority::High,
        )
        .unwrap();

        store.insert_goal(&goal).await.unwrap();
        let loaded = store.find_goal("u1", &goal.goal_id).await.unwrap();
        assert_eq!(loaded, Some(goal.clone()));

        assert!(store.find_goal("u2", &goal.goal_id).await.unwrap().is_none());
        let missing = store
            .add_goal_amount("u1", "nope", 10.0, Utc::now())
            .await
            .unwrap();
        assert!(missing.is_none());
    }
}
