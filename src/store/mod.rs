//! Document store adapter
//!
//! One handle per process, opened explicitly and passed into every service.
//! Backed by Postgres when a database URL is configured, in-memory otherwise.

use crate::config::StoreConfig;
use crate::models::{
    AccountBalance, BalanceUpdate, Expense, ExpenseFilter, Goal, Investment, InvestmentType, Upsert,
};
use crate::Result;
use chrono::{DateTime, Utc};
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use tracing::info;

pub mod memory;
pub mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PostgresStore;

/// The four persisted collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Goals,
    Expenses,
    AccountBalance,
    Investments,
}

impl Collection {
    pub fn name(&self) -> &'static str {
        match self {
            Collection::Goals => "goals",
            Collection::Expenses => "expenses",
            Collection::AccountBalance => "account_balance",
            Collection::Investments => "investments",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

pub struct IndexSpec {
    pub name: &'static str,
    pub collection: Collection,
    pub columns: &'static str,
    pub unique: bool,
}

/// Indexes ensured at startup
pub const INDEXES: &[IndexSpec] = &[
    IndexSpec { name: "idx_goals_user_id", collection: Collection::Goals, columns: "user_id", unique: false },
    IndexSpec { name: "idx_goals_goal_type", collection: Collection::Goals, columns: "goal_type", unique: false },
    IndexSpec { name: "idx_goals_user_created", collection: Collection::Goals, columns: "user_id, created_at DESC", unique: false },
    IndexSpec { name: "idx_expenses_user_id", collection: Collection::Expenses, columns: "user_id", unique: false },
    IndexSpec { name: "idx_expenses_category", collection: Collection::Expenses, columns: "category", unique: false },
    IndexSpec { name: "idx_expenses_user_date", collection: Collection::Expenses, columns: "user_id, date DESC", unique: false },
    IndexSpec { name: "idx_expenses_user_category", collection: Collection::Expenses, columns: "user_id, category", unique: false },
    IndexSpec { name: "idx_account_balance_user_id", collection: Collection::AccountBalance, columns: "user_id", unique: true },
    IndexSpec { name: "idx_investments_user_purchase", collection: Collection::Investments, columns: "user_id, purchase_date DESC", unique: false },
];

/// Typed access to the collections. Every method is scoped to one user.
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    fn backend(&self) -> &'static str;

    /// Liveness probe
    async fn ping(&self) -> Result<()>;

    async fn close(&self);

    // ---- goals ----

    async fn insert_goal(&self, goal: &Goal) -> Result<()>;
    async fn find_goal(&self, user_id: &str, goal_id: &str) -> Result<Option<Goal>>;
    /// Newest first
    async fn list_goals(&self, user_id: &str) -> Result<Vec<Goal>>;
    /// Adds `delta` to `current_amount`. `None` when the goal does not exist.
    async fn add_goal_amount(
        &self,
        user_id: &str,
        goal_id: &str,
        delta: f64,
        at: DateTime<Utc>,
    ) -> Result<Option<Goal>>;

    // ---- ledger ----

    /// Persists the expense and debits the user's balance as one unit.
    /// A missing balance row is created at `-amount`.
    async fn record_expense(&self, expense: &Expense) -> Result<AccountBalance>;
    /// Sorted by date descending, capped at `filter.limit`
    async fn list_expenses(&self, filter: &ExpenseFilter) -> Result<Vec<Expense>>;
    async fn sum_expenses_since(&self, user_id: &str, since: DateTime<Utc>) -> Result<f64>;
    async fn find_balance(&self, user_id: &str) -> Result<Option<AccountBalance>>;
    async fn upsert_balance(&self, update: &BalanceUpdate) -> Result<(AccountBalance, Upsert)>;

    // ---- portfolio ----

    async fn insert_investment(&self, investment: &Investment) -> Result<()>;
    /// Sorted by purchase date descending
    async fn list_investments(
        &self,
        user_id: &str,
        investment_type: Option<InvestmentType>,
    ) -> Result<Vec<Investment>>;
}

/// Shared, cheaply clonable handle to the open store.
#[derive(Clone)]
pub struct StoreHandle {
    store: Arc<dyn DocumentStore>,
}

impl StoreHandle {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryStore::new()))
    }

    pub async fn close(self) {
        self.store.close().await;
        info!(backend = self.store.backend(), "Document store closed");
    }
}

impl Deref for StoreHandle {
    type Target = dyn DocumentStore;

    fn deref(&self) -> &Self::Target {
        self.store.as_ref()
    }
}

/// Open the configured store. Failure here is fatal for callers: nothing
/// works without a store.
pub async fn open(config: &StoreConfig) -> Result<StoreHandle> {
    let store: Arc<dyn DocumentStore> = match config.database_url.as_deref() {
        Some(url) => Arc::new(PostgresStore::connect(url, config).await?),
        None => {
            info!("No database URL configured, using in-memory document store");
            Arc::new(InMemoryStore::new())
        }
    };

    store.ping().await?;
    info!(backend = store.backend(), schema = %config.schema, "Document store ready");

    Ok(StoreHandle::new(store))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_without_url_uses_memory() {
        let handle = open(&StoreConfig::in_memory()).await.unwrap();
        assert_eq!(handle.backend(), "memory");
        handle.close().await;
    }

    #[test]
    fn test_required_indexes_present() {
        let names: Vec<&str> = INDEXES.iter().map(|i| i.name).collect();
        assert!(names.contains(&"idx_expenses_user_date"));

        let unique: Vec<&IndexSpec> = INDEXES.iter().filter(|i| i.unique).collect();
        assert_eq!(unique.len(), 1);
        assert_eq!(unique[0].collection, Collection::AccountBalance);
    }
}
