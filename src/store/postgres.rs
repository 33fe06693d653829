//! Postgres-backed document store
//!
//! Each collection is a table inside the configured schema. Every call is
//! bounded by the configured timeout.

use super::{Collection, DocumentStore, INDEXES};
use crate::config::{validate_schema_name, StoreConfig};
use crate::error::FinanceError;
use crate::models::{
    AccountBalance, BalanceUpdate, Expense, ExpenseFilter, Goal, Investment, InvestmentType, Upsert,
};
use crate::Result;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

const GOAL_COLUMNS: &str = "goal_id, user_id, goal_type, name, target_amount, current_amount, \
     deadline, priority, created_at, updated_at";

const EXPENSE_COLUMNS: &str = "expense_id, user_id, amount, category, description, date, created_at";

const BALANCE_COLUMNS: &str =
    "user_id, current_balance, last_updated, monthly_income, monthly_expense_threshold";

const INVESTMENT_COLUMNS: &str = "investment_id, user_id, symbol, name, quantity, purchase_price, \
     current_price, investment_type, purchase_date, notes, created_at, updated_at";

/// Fully qualified table names
struct Tables {
    goals: String,
    expenses: String,
    balance: String,
    investments: String,
}

impl Tables {
    fn new(schema: &str) -> Self {
        Self {
            goals: format!("{}.{}", schema, Collection::Goals),
            expenses: format!("{}.{}", schema, Collection::Expenses),
            balance: format!("{}.{}", schema, Collection::AccountBalance),
            investments: format!("{}.{}", schema, Collection::Investments),
        }
    }

    fn get(&self, collection: Collection) -> &str {
        match collection {
            Collection::Goals => &self.goals,
            Collection::Expenses => &self.expenses,
            Collection::AccountBalance => &self.balance,
            Collection::Investments => &self.investments,
        }
    }
}

pub struct PostgresStore {
    pool: PgPool,
    schema: String,
    tables: Tables,
    timeout: Duration,
}

impl PostgresStore {
    /// Connect, verify liveness and make sure tables and indexes exist.
    pub async fn connect(url: &str, config: &StoreConfig) -> Result<Self> {
        validate_schema_name(&config.schema)?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.timeout)
            .connect(url)
            .await
            .map_err(|e| FinanceError::storage(format!("Failed to connect to Postgres: {}", e)))?;

        let store = Self {
            pool,
            schema: config.schema.clone(),
            tables: Tables::new(&config.schema),
            timeout: config.timeout,
        };

        store.ping().await?;
        store.ensure_schema().await?;
        store.ensure_indexes().await;

        info!(schema = %store.schema, "Connected to Postgres document store");
        Ok(store)
    }

    /// Run one store call under the timeout.
    async fn call<T, F>(&self, op: &str, fut: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, sqlx::Error>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result.map_err(|e| FinanceError::storage(format!("{} failed: {}", op, e))),
            Err(_) => {
                warn!(op, timeout_ms = self.timeout.as_millis() as u64, "Store call timed out");
                Err(FinanceError::Timeout(self.timeout.as_millis() as u64))
            }
        }
    }

    async fn ensure_schema(&self) -> Result<()> {
        let statements = [
            format!("CREATE SCHEMA IF NOT EXISTS {}", self.schema),
            format!(
                r#"
                CREATE TABLE IF NOT EXISTS {} (
                  goal_id TEXT PRIMARY KEY,
                  user_id TEXT NOT NULL,
                  goal_type TEXT NOT NULL,
                  name TEXT NOT NULL,
                  target_amount DOUBLE PRECISION NOT NULL,
                  current_amount DOUBLE PRECISION NOT NULL DEFAULT 0,
                  deadline TIMESTAMPTZ NOT NULL,
                  priority TEXT NOT NULL DEFAULT 'medium',
                  created_at TIMESTAMPTZ NOT NULL,
                  updated_at TIMESTAMPTZ NOT NULL
                )
                "#,
                self.tables.goals
            ),
            format!(
                r#"
                CREATE TABLE IF NOT EXISTS {} (
                  expense_id TEXT PRIMARY KEY,
                  user_id TEXT NOT NULL,
                  amount DOUBLE PRECISION NOT NULL,
                  category TEXT NOT NULL,
                  description TEXT NOT NULL,
                  date TIMESTAMPTZ NOT NULL,
                  created_at TIMESTAMPTZ NOT NULL
                )
                "#,
                self.tables.expenses
            ),
            format!(
                r#"
                CREATE TABLE IF NOT EXISTS {} (
                  user_id TEXT PRIMARY KEY,
                  current_balance DOUBLE PRECISION NOT NULL,
                  last_updated TIMESTAMPTZ NOT NULL,
                  monthly_income DOUBLE PRECISION NOT NULL DEFAULT 0,
                  monthly_expense_threshold DOUBLE PRECISION NOT NULL DEFAULT 0
                )
                "#,
                self.tables.balance
            ),
            format!(
                r#"
                CREATE TABLE IF NOT EXISTS {} (
                  investment_id TEXT PRIMARY KEY,
                  user_id TEXT NOT NULL,
                  symbol TEXT NOT NULL,
                  name TEXT NOT NULL,
                  quantity DOUBLE PRECISION NOT NULL,
                  purchase_price DOUBLE PRECISION NOT NULL,
                  current_price DOUBLE PRECISION,
                  investment_type TEXT NOT NULL,
                  purchase_date TIMESTAMPTZ NOT NULL,
                  notes TEXT,
                  created_at TIMESTAMPTZ NOT NULL,
                  updated_at TIMESTAMPTZ NOT NULL
                )
                "#,
                self.tables.investments
            ),
        ];

        for sql in &statements {
            self.call("create collection", sqlx::query(sql).execute(&self.pool))
                .await?;
        }

        Ok(())
    }

    /// Best-effort: a failing index is logged and skipped.
    async fn ensure_indexes(&self) {
        let mut created = 0;

        for index in INDEXES {
            let sql = format!(
                "CREATE {}INDEX IF NOT EXISTS {} ON {} ({})",
                if index.unique { "UNIQUE " } else { "" },
                index.name,
                self.tables.get(index.collection),
                index.columns
            );

            match self.call("create index", sqlx::query(&sql).execute(&self.pool)).await {
                Ok(_) => created += 1,
                Err(e) => warn!(index = index.name, error = %e, "Could not create index"),
            }
        }

        debug!(created, total = INDEXES.len(), "Database indexes ensured");
    }
}

#[async_trait::async_trait]
impl DocumentStore for PostgresStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn ping(&self) -> Result<()> {
        self.call("ping", sqlx::query("SELECT 1").execute(&self.pool))
            .await
            .map(|_| ())
    }

    async fn close(&self) {
        self.pool.close().await;
    }

    async fn insert_goal(&self, goal: &Goal) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            self.tables.goals, GOAL_COLUMNS
        );

        self.call(
            "insert goal",
            sqlx::query(&sql)
                .bind(&goal.goal_id)
                .bind(&goal.user_id)
                .bind(goal.goal_type.as_str())
                .bind(&goal.name)
                .bind(goal.target_amount)
                .bind(goal.current_amount)
                .bind(goal.deadline)
                .bind(goal.priority.as_str())
                .bind(goal.created_at)
                .bind(goal.updated_at)
                .execute(&self.pool),
        )
        .await?;

        Ok(())
    }

    async fn find_goal(&self, user_id: &str, goal_id: &str) -> Result<Option<Goal>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE user_id = $1 AND goal_id = $2",
            GOAL_COLUMNS, self.tables.goals
        );

        let row = self
            .call(
                "find goal",
                sqlx::query(&sql)
                    .bind(user_id)
                    .bind(goal_id)
                    .fetch_optional(&self.pool),
            )
            .await?;

        row.as_ref().map(goal_from_row).transpose()
    }

    async fn list_goals(&self, user_id: &str) -> Result<Vec<Goal>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE user_id = $1 ORDER BY created_at DESC",
            GOAL_COLUMNS, self.tables.goals
        );

        let rows = self
            .call(
                "list goals",
                sqlx::query(&sql).bind(user_id).fetch_all(&self.pool),
            )
            .await?;

        rows.iter().map(goal_from_row).collect()
    }

    async fn add_goal_amount(
        &self,
        user_id: &str,
        goal_id: &str,
        delta: f64,
        at: DateTime<Utc>,
    ) -> Result<Option<Goal>> {
        let sql = format!(
            "UPDATE {} SET current_amount = current_amount + $3, updated_at = $4 \
             WHERE user_id = $1 AND goal_id = $2 RETURNING {}",
            self.tables.goals, GOAL_COLUMNS
        );

        let row = self
            .call(
                "update goal progress",
                sqlx::query(&sql)
                    .bind(user_id)
                    .bind(goal_id)
                    .bind(delta)
                    .bind(at)
                    .fetch_optional(&self.pool),
            )
            .await?;

        row.as_ref().map(goal_from_row).transpose()
    }

    async fn record_expense(&self, expense: &Expense) -> Result<AccountBalance> {
        let insert_sql = format!(
            "INSERT INTO {} ({}) VALUES ($1, $2, $3, $4, $5, $6, $7)",
            self.tables.expenses, EXPENSE_COLUMNS
        );
        // A new row starts at -amount; an existing one is debited by amount.
        let debit_sql = format!(
            "INSERT INTO {} AS b ({cols}) VALUES ($1, $2, $3, 0, 0) \
             ON CONFLICT (user_id) DO UPDATE \
             SET current_balance = b.current_balance + EXCLUDED.current_balance, \
                 last_updated = EXCLUDED.last_updated \
             RETURNING {cols}",
            self.tables.balance,
            cols = BALANCE_COLUMNS
        );

        let transaction = async {
            let mut tx = self.pool.begin().await?;

            sqlx::query(&insert_sql)
                .bind(&expense.expense_id)
                .bind(&expense.user_id)
                .bind(expense.amount)
                .bind(expense.category.as_str())
                .bind(&expense.description)
                .bind(expense.date)
                .bind(expense.created_at)
                .execute(&mut *tx)
                .await?;

            let row = sqlx::query(&debit_sql)
                .bind(&expense.user_id)
                .bind(-expense.amount)
                .bind(expense.created_at)
                .fetch_one(&mut *tx)
                .await?;

            tx.commit().await?;
            Ok::<PgRow, sqlx::Error>(row)
        };

        let row = self.call("record expense", transaction).await?;
        balance_from_row(&row)
    }

    async fn list_expenses(&self, filter: &ExpenseFilter) -> Result<Vec<Expense>> {
        let sql = format!(
            "SELECT {} FROM {} \
             WHERE user_id = $1 \
               AND ($2::TIMESTAMPTZ IS NULL OR date >= $2) \
               AND ($3::TIMESTAMPTZ IS NULL OR date <= $3) \
               AND ($4::TEXT IS NULL OR category = $4) \
               AND ($5::DOUBLE PRECISION IS NULL OR amount >= $5) \
               AND ($6::DOUBLE PRECISION IS NULL OR amount <= $6) \
             ORDER BY date DESC, created_at DESC \
             LIMIT $7",
            EXPENSE_COLUMNS, self.tables.expenses
        );

        let rows = self
            .call(
                "list expenses",
                sqlx::query(&sql)
                    .bind(&filter.user_id)
                    .bind(filter.start_date)
                    .bind(filter.end_date)
                    .bind(filter.category.map(|c| c.as_str()))
                    .bind(filter.min_amount)
                    .bind(filter.max_amount)
                    .bind(i64::try_from(filter.limit).unwrap_or(i64::MAX))
                    .fetch_all(&self.pool),
            )
            .await?;

        rows.iter().map(expense_from_row).collect()
    }

    async fn sum_expenses_since(&self, user_id: &str, since: DateTime<Utc>) -> Result<f64> {
        let sql = format!(
            "SELECT COALESCE(SUM(amount), 0)::DOUBLE PRECISION FROM {} \
             WHERE user_id = $1 AND date >= $2",
            self.tables.expenses
        );

        self.call(
            "sum expenses",
            sqlx::query_scalar::<_, f64>(&sql)
                .bind(user_id)
                .bind(since)
                .fetch_one(&self.pool),
        )
        .await
    }

    async fn find_balance(&self, user_id: &str) -> Result<Option<AccountBalance>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE user_id = $1",
            BALANCE_COLUMNS, self.tables.balance
        );

        let row = self
            .call(
                "find balance",
                sqlx::query(&sql).bind(user_id).fetch_optional(&self.pool),
            )
            .await?;

        row.as_ref().map(balance_from_row).transpose()
    }

    async fn upsert_balance(&self, update: &BalanceUpdate) -> Result<(AccountBalance, Upsert)> {
        let sql = format!(
            "INSERT INTO {} AS b ({cols}) VALUES ($1, $2, $3, COALESCE($4, 0), COALESCE($5, 0)) \
             ON CONFLICT (user_id) DO UPDATE \
             SET current_balance = EXCLUDED.current_balance, \
                 last_updated = EXCLUDED.last_updated, \
                 monthly_income = COALESCE($4, b.monthly_income), \
                 monthly_expense_threshold = COALESCE($5, b.monthly_expense_threshold) \
             RETURNING {cols}, (xmax = 0) AS inserted",
            self.tables.balance,
            cols = BALANCE_COLUMNS
        );

        let row = self
            .call(
                "set balance",
                sqlx::query(&sql)
                    .bind(&update.user_id)
                    .bind(update.current_balance)
                    .bind(update.last_updated)
                    .bind(update.monthly_income)
                    .bind(update.monthly_expense_threshold)
                    .fetch_one(&self.pool),
            )
            .await?;

        let inserted: bool = row.try_get("inserted")?;
        let outcome = if inserted { Upsert::Created } else { Upsert::Updated };

        Ok((balance_from_row(&row)?, outcome))
    }

    async fn insert_investment(&self, investment: &Investment) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
            self.tables.investments, INVESTMENT_COLUMNS
        );

        self.call(
            "insert investment",
            sqlx::query(&sql)
                .bind(&investment.investment_id)
                .bind(&investment.user_id)
                .bind(&investment.symbol)
                .bind(&investment.name)
                .bind(investment.quantity)
                .bind(investment.purchase_price)
                .bind(investment.current_price)
                .bind(investment.investment_type.as_str())
                .bind(investment.purchase_date)
                .bind(&investment.notes)
                .bind(investment.created_at)
                .bind(investment.updated_at)
                .execute(&self.pool),
        )
        .await?;

        Ok(())
    }

    async fn list_investments(
        &self,
        user_id: &str,
        investment_type: Option<InvestmentType>,
    ) -> Result<Vec<Investment>> {
        let sql = format!(
            "SELECT {} FROM {} \
             WHERE user_id = $1 AND ($2::TEXT IS NULL OR investment_type = $2) \
             ORDER BY purchase_date DESC, created_at DESC",
            INVESTMENT_COLUMNS, self.tables.investments
        );

        let rows = self
            .call(
                "list investments",
                sqlx::query(&sql)
                    .bind(user_id)
                    .bind(investment_type.map(|t| t.as_str()))
                    .fetch_all(&self.pool),
            )
            .await?;

        rows.iter().map(investment_from_row).collect()
    }
}

//
// ================= Row decoding =================
//

fn parse_stored<T: FromStr<Err = FinanceError>>(row: &PgRow, column: &str) -> Result<T> {
    let raw: String = row.try_get(column)?;
    raw.parse().map_err(|_| {
        FinanceError::storage(format!("stored {} '{}' is not recognised", column, raw))
    })
}

fn goal_from_row(row: &PgRow) -> Result<Goal> {
    Ok(Goal {
        goal_id: row.try_get("goal_id")?,
        user_id: row.try_get("user_id")?,
        goal_type: parse_stored(row, "goal_type")?,
        name: row.try_get("name")?,
        target_amount: row.try_get("target_amount")?,
        current_amount: row.try_get("current_amount")?,
        deadline: row.try_get("deadline")?,
        priority: parse_stored(row, "priority")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn expense_from_row(row: &PgRow) -> Result<Expense> {
    Ok(Expense {
        expense_id: row.try_get("expense_id")?,
        user_id: row.try_get("user_id")?,
        amount: row.try_get("amount")?,
        category: parse_stored(row, "category")?,
        description: row.try_get("description")?,
        date: row.try_get("date")?,
        created_at: row.try_get("created_at")?,
    })
}

fn balance_from_row(row: &PgRow) -> Result<AccountBalance> {
    Ok(AccountBalance {
        user_id: row.try_get("user_id")?,
        current_balance: row.try_get("current_balance")?,
        last_updated: row.try_get("last_updated")?,
        monthly_income: row.try_get("monthly_income")?,
        monthly_expense_threshold: row.try_get("monthly_expense_threshold")?,
    })
}

fn investment_from_row(row: &PgRow) -> Result<Investment> {
    Ok(Investment {
        investment_id: row.try_get("investment_id")?,
        user_id: row.try_get("user_id")?,
        symbol: row.try_get("symbol")?,
        name: row.try_get("name")?,
        quantity: row.try_get("quantity")?,
        purchase_price: row.try_get("purchase_price")?,
        current_price: row.try_get("current_price")?,
        investment_type: parse_stored(row, "investment_type")?,
        purchase_date: row.try_get("purchase_date")?,
        notes: row.try_get("notes")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExpenseCategory, GoalType, NewInvestment, Priority};

    #[test]
    fn test_table_names_are_schema_qualified() {
        let tables = Tables::new("finance_manager");
        assert_eq!(tables.goals, "finance_manager.goals");
        assert_eq!(tables.get(Collection::AccountBalance), "finance_manager.account_balance");
    }

    #[tokio::test]
    async fn test_connect_rejects_unsafe_schema() {
        let config = StoreConfig {
            schema: "public; DROP TABLE x".into(),
            ..StoreConfig::postgres("postgres://localhost/unused")
        };
        let err = PostgresStore::connect("postgres://localhost/unused", &config)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, FinanceError::Config(_)));
    }

    #[tokio::test]
    #[ignore = "requires a running Postgres (set FINANCE_TEST_DATABASE_URL)"]
    async fn test_postgres_round_trip() {
        let url = std::env::var("FINANCE_TEST_DATABASE_URL")
            .expect("FINANCE_TEST_DATABASE_URL must be set");
        let schema = format!("t_{}", uuid::Uuid::new_v4().simple());
        let config = StoreConfig {
            schema: schema.clone(),
            ..StoreConfig::postgres(url.clone())
        };
        let store = PostgresStore::connect(&url, &config).await.unwrap();

        let goal = Goal::new(
            "u1",
            GoalType::Savings,
            "Car".into(),
            8000.0,
            250.5,
            crate::models::parse_timestamp("2027-06-30").unwrap(),
            Priority::Low,
        )
        .unwrap();
        store.insert_goal(&goal).await.unwrap();
        assert_eq!(store.find_goal("u1", &goal.goal_id).await.unwrap(), Some(goal.clone()));

        let expense = Expense::new("u1", 19.99, ExpenseCategory::Transport, "train".into(), None)
            .unwrap();
        let balance = store.record_expense(&expense).await.unwrap();
        assert_eq!(balance.current_balance, -19.99);
        let listed = store.list_expenses(&ExpenseFilter::for_user("u1")).await.unwrap();
        assert_eq!(listed, vec![expense]);

        let (updated, outcome) = store
            .upsert_balance(&BalanceUpdate::new("u1", 100.0, Some(2000.0), None).unwrap())
            .await
            .unwrap();
        assert_eq!(outcome, Upsert::Updated);
        assert_eq!(updated.monthly_income, 2000.0);
        assert_eq!(updated.monthly_expense_threshold, 0.0);

        let investment = Investment::new(
            "u1",
            NewInvestment {
                symbol: "vti".into(),
                name: "Total Market".into(),
                quantity: 3.0,
                purchase_price: 210.25,
                investment_type: InvestmentType::Etf,
                purchase_date: None,
                notes: Some("monthly buy".into()),
            },
        )
        .unwrap();
        store.insert_investment(&investment).await.unwrap();
        let listed = store.list_investments("u1", Some(InvestmentType::Etf)).await.unwrap();
        assert_eq!(listed, vec![investment]);

        sqlx::query(&format!("DROP SCHEMA {} CASCADE", schema))
            .execute(&store.pool)
            .await
            .unwrap();
        store.close().await;
    }
}
