//! Core data models for the finance manager

use crate::error::{ErrorCode, FinanceError};
use crate::Result;
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

//
// ================= Enums =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum GoalType {
    Savings,
    Investment,
    DebtReduction,
    EmergencyFund,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ExpenseCategory {
    Groceries,
    Dining,
    Transport,
    Utilities,
    Entertainment,
    Healthcare,
    Shopping,
    Education,
    Housing,
    Insurance,
    Other,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum InvestmentType {
    Stock,
    Crypto,
    Etf,
    Bond,
    RealEstate,
    MutualFund,
    Other,
}

impl GoalType {
    pub const ALL: [GoalType; 4] = [
        GoalType::Savings,
        GoalType::Investment,
        GoalType::DebtReduction,
        GoalType::EmergencyFund,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GoalType::Savings => "savings",
            GoalType::Investment => "investment",
            GoalType::DebtReduction => "debt_reduction",
            GoalType::EmergencyFund => "emergency_fund",
        }
    }
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::High, Priority::Medium, Priority::Low];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl ExpenseCategory {
    pub const ALL: [ExpenseCategory; 11] = [
        ExpenseCategory::Groceries,
        ExpenseCategory::Dining,
        ExpenseCategory::Transport,
        ExpenseCategory::Utilities,
        ExpenseCategory::Entertainment,
        ExpenseCategory::Healthcare,
        ExpenseCategory::Shopping,
        ExpenseCategory::Education,
        ExpenseCategory::Housing,
        ExpenseCategory::Insurance,
        ExpenseCategory::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExpenseCategory::Groceries => "groceries",
            ExpenseCategory::Dining => "dining",
            ExpenseCategory::Transport => "transport",
            ExpenseCategory::Utilities => "utilities",
            ExpenseCategory::Entertainment => "entertainment",
            ExpenseCategory::Healthcare => "healthcare",
            ExpenseCategory::Shopping => "shopping",
            ExpenseCategory::Education => "education",
            ExpenseCategory::Housing => "housing",
            ExpenseCategory::Insurance => "insurance",
            ExpenseCategory::Other => "other",
        }
    }
}

impl InvestmentType {
    pub const ALL: [InvestmentType; 7] = [
        InvestmentType::Stock,
        InvestmentType::Crypto,
        InvestmentType::Etf,
        InvestmentType::Bond,
        InvestmentType::RealEstate,
        InvestmentType::MutualFund,
        InvestmentType::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InvestmentType::Stock => "stock",
            InvestmentType::Crypto => "crypto",
            InvestmentType::Etf => "etf",
            InvestmentType::Bond => "bond",
            InvestmentType::RealEstate => "real_estate",
            InvestmentType::MutualFund => "mutual_fund",
            InvestmentType::Other => "other",
        }
    }
}

/// Case-insensitive lookup against a closed set of variants.
fn parse_variant<T: Copy>(
    raw: &str,
    all: &[T],
    name: impl Fn(&T) -> &'static str,
    kind: &str,
) -> Result<T> {
    let wanted = raw.trim().to_lowercase();

    all.iter()
        .find(|v| name(*v) == wanted)
        .copied()
        .ok_or_else(|| {
            let expected: Vec<&str> = all.iter().map(&name).collect();
            FinanceError::invalid(format!(
                "'{}' is not a valid {} (expected one of: {})",
                raw,
                kind,
                expected.join(", ")
            ))
        })
}

impl FromStr for GoalType {
    type Err = FinanceError;

    fn from_str(s: &str) -> Result<Self> {
        parse_variant(s, &Self::ALL, Self::as_str, "goal type")
    }
}

impl FromStr for Priority {
    type Err = FinanceError;

    fn from_str(s: &str) -> Result<Self> {
        parse_variant(s, &Self::ALL, Self::as_str, "priority")
    }
}

impl FromStr for ExpenseCategory {
    type Err = FinanceError;

    fn from_str(s: &str) -> Result<Self> {
        parse_variant(s, &Self::ALL, Self::as_str, "expense category")
    }
}

impl FromStr for InvestmentType {
    type Err = FinanceError;

    fn from_str(s: &str) -> Result<Self> {
        parse_variant(s, &Self::ALL, Self::as_str, "investment type")
    }
}

impl fmt::Display for GoalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl fmt::Display for ExpenseCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl fmt::Display for InvestmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

//
// ================= Goal =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Goal {
    pub goal_id: String,
    pub user_id: String,
    pub goal_type: GoalType,
    pub name: String,
    pub target_amount: f64,
    pub current_amount: f64,
    pub deadline: DateTime<Utc>,
    #[serde(default)]
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Goal {
    pub fn new(
        user_id: &str,
        goal_type: GoalType,
        name: String,
        target_amount: f64,
        current_amount: f64,
        deadline: DateTime<Utc>,
        priority: Priority,
    ) -> Result<Self> {
        ensure_positive("target_amount", target_amount)?;
        ensure_non_negative("current_amount", current_amount)?;

        let now = now_utc();
        Ok(Self {
            goal_id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            goal_type,
            name,
            target_amount,
            current_amount,
            deadline,
            priority,
            created_at: now,
            updated_at: now,
        })
    }

    /// Share of the target reached, capped at 100. Not floored: a goal that
    /// has regressed below zero reports a negative percentage.
    pub fn progress_percentage(&self) -> f64 {
        if self.target_amount <= 0.0 {
            return 0.0;
        }
        (self.current_amount / self.target_amount * 100.0).min(100.0)
    }
}

//
// ================= Expense =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Expense {
    pub expense_id: String,
    pub user_id: String,
    pub amount: f64,
    pub category: ExpenseCategory,
    pub description: String,
    pub date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Expense {
    pub fn new(
        user_id: &str,
        amount: f64,
        category: ExpenseCategory,
        description: String,
        date: Option<DateTime<Utc>>,
    ) -> Result<Self> {
        ensure_positive("amount", amount)?;

        let now = now_utc();
        Ok(Self {
            expense_id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            amount,
            category,
            description,
            date: date.unwrap_or(now),
            created_at: now,
        })
    }
}

//
// ================= Account Balance =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccountBalance {
    pub user_id: String,
    pub current_balance: f64,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub monthly_income: f64,
    #[serde(default)]
    pub monthly_expense_threshold: f64,
}

impl AccountBalance {
    /// Balance row created implicitly by the first expense of a user.
    pub fn overdrawn(user_id: &str, amount: f64) -> Self {
        Self {
            user_id: user_id.to_string(),
            current_balance: -amount,
            last_updated: now_utc(),
            monthly_income: 0.0,
            monthly_expense_threshold: 0.0,
        }
    }
}

/// Explicit balance reset. `None` fields keep their stored value, or
/// default to zero when the row does not exist yet.
#[derive(Debug, Clone, PartialEq)]
pub struct BalanceUpdate {
    pub user_id: String,
    pub current_balance: f64,
    pub monthly_income: Option<f64>,
    pub monthly_expense_threshold: Option<f64>,
    pub last_updated: DateTime<Utc>,
}

impl BalanceUpdate {
    pub fn new(
        user_id: &str,
        current_balance: f64,
        monthly_income: Option<f64>,
        monthly_expense_threshold: Option<f64>,
    ) -> Result<Self> {
        ensure_finite("balance", current_balance)?;
        if let Some(income) = monthly_income {
            ensure_non_negative("monthly_income", income)?;
        }
        if let Some(threshold) = monthly_expense_threshold {
            ensure_non_negative("monthly_expense_threshold", threshold)?;
        }

        Ok(Self {
            user_id: user_id.to_string(),
            current_balance,
            monthly_income,
            monthly_expense_threshold,
            last_updated: now_utc(),
        })
    }

    pub fn apply_to(&self, existing: Option<&AccountBalance>) -> AccountBalance {
        AccountBalance {
            user_id: self.user_id.clone(),
            current_balance: self.current_balance,
            last_updated: self.last_updated,
            monthly_income: self
                .monthly_income
                .or(existing.map(|b| b.monthly_income))
                .unwrap_or(0.0),
            monthly_expense_threshold: self
                .monthly_expense_threshold
                .or(existing.map(|b| b.monthly_expense_threshold))
                .unwrap_or(0.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Created,
    Updated,
}

//
// ================= Investment =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Investment {
    pub investment_id: String,
    pub user_id: String,
    pub symbol: String,
    pub name: String,
    pub quantity: f64,
    pub purchase_price: f64,
    pub current_price: Option<f64>,
    pub investment_type: InvestmentType,
    pub purchase_date: DateTime<Utc>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields a caller supplies when recording a purchase.
#[derive(Debug, Clone)]
pub struct NewInvestment {
    pub symbol: String,
    pub name: String,
    pub quantity: f64,
    pub purchase_price: f64,
    pub investment_type: InvestmentType,
    pub purchase_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

impl Investment {
    pub fn new(user_id: &str, new: NewInvestment) -> Result<Self> {
        let symbol = new.symbol.trim().to_uppercase();
        if symbol.is_empty() {
            return Err(FinanceError::invalid("symbol must not be empty"));
        }
        ensure_positive("quantity", new.quantity)?;
        ensure_positive("purchase_price", new.purchase_price)?;

        let now = now_utc();
        Ok(Self {
            investment_id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            symbol,
            name: new.name,
            quantity: new.quantity,
            purchase_price: new.purchase_price,
            current_price: None,
            investment_type: new.investment_type,
            purchase_date: new.purchase_date.unwrap_or(now),
            notes: new.notes,
            created_at: now,
            updated_at: now,
        })
    }

    /// Cost basis of the position
    pub fn total_cost(&self) -> f64 {
        self.quantity * self.purchase_price
    }

    pub fn current_value(&self) -> Option<f64> {
        self.current_price.map(|price| self.quantity * price)
    }
}

//
// ================= Queries =================
//

/// Expense query. Date bounds and amount bounds are inclusive.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpenseFilter {
    pub user_id: String,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub category: Option<ExpenseCategory>,
    pub min_amount: Option<f64>,
    pub max_amount: Option<f64>,
    pub limit: usize,
}

impl ExpenseFilter {
    pub const DEFAULT_LIMIT: usize = 50;

    pub fn for_user(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            start_date: None,
            end_date: None,
            category: None,
            min_amount: None,
            max_amount: None,
            limit: Self::DEFAULT_LIMIT,
        }
    }

    pub fn matches(&self, expense: &Expense) -> bool {
        expense.user_id == self.user_id
            && self.start_date.map_or(true, |start| expense.date >= start)
            && self.end_date.map_or(true, |end| expense.date <= end)
            && self.category.map_or(true, |c| expense.category == c)
            && self.min_amount.map_or(true, |min| expense.amount >= min)
            && self.max_amount.map_or(true, |max| expense.amount <= max)
    }
}

//
// ================= Operation Results =================
//

/// Outcome of a service operation. Failures never escape as errors.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationResult<T> {
    Success(T),
    Failure(OperationFailure),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OperationFailure {
    pub code: ErrorCode,
    pub message: String,
    pub error: String,
}

impl OperationFailure {
    /// `context` is the message shown for storage failures; the other codes
    /// carry their own wording.
    pub fn from_error(err: &FinanceError, context: &str) -> Self {
        let code = err.code();
        let message = match code {
            ErrorCode::InvalidInput => "Invalid input parameters".to_string(),
            ErrorCode::NotFound => err.detail(),
            ErrorCode::StorageError => context.to_string(),
        };

        Self {
            code,
            message,
            error: err.detail(),
        }
    }
}

impl<T> OperationResult<T> {
    pub fn from_result(result: Result<T>, context: &str) -> Self {
        match result {
            Ok(value) => OperationResult::Success(value),
            Err(err) => {
                tracing::warn!(code = %err.code(), error = %err, "{}", context);
                OperationResult::Failure(OperationFailure::from_error(&err, context))
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, OperationResult::Success(_))
    }

    pub fn success(self) -> Option<T> {
        match self {
            OperationResult::Success(value) => Some(value),
            OperationResult::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&OperationFailure> {
        match self {
            OperationResult::Success(_) => None,
            OperationResult::Failure(failure) => Some(failure),
        }
    }
}

#[derive(Serialize)]
struct ResultWire<'a, T> {
    success: bool,
    #[serde(flatten)]
    payload: Option<&'a T>,
    #[serde(flatten)]
    failure: Option<&'a OperationFailure>,
}

impl<T: Serialize> Serialize for OperationResult<T> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let wire = match self {
            OperationResult::Success(value) => ResultWire {
                success: true,
                payload: Some(value),
                failure: None,
            },
            OperationResult::Failure(failure) => ResultWire {
                success: false,
                payload: None,
                failure: Some(failure),
            },
        };
        wire.serialize(serializer)
    }
}

//
// ================= Tool I/O =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInput {
    pub tool_name: String,
    pub user_id: String,
    #[serde(default)]
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolOutput {
    pub success: bool,
    pub data: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
}

impl ToolOutput {
    pub fn from_operation<T: Serialize>(result: OperationResult<T>) -> Self {
        match result {
            OperationResult::Success(value) => match serde_json::to_value(value) {
                Ok(data) => Self {
                    success: true,
                    message: data
                        .get("message")
                        .and_then(|m| m.as_str())
                        .map(str::to_string),
                    data,
                    error: None,
                    code: None,
                },
                Err(e) => Self::failed(OperationFailure::from_error(
                    &FinanceError::Serialization(e),
                    "Failed to encode result",
                )),
            },
            OperationResult::Failure(failure) => Self::failed(failure),
        }
    }

    pub fn failed(failure: OperationFailure) -> Self {
        Self {
            success: false,
            data: serde_json::Value::Null,
            message: Some(failure.message),
            error: Some(failure.error),
            code: Some(failure.code),
        }
    }
}

//
// ================= Helpers =================
//

/// Current instant at the microsecond precision the store keeps.
pub fn now_utc() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// First instant of the calendar month containing `now`.
pub fn month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    let first = NaiveDate::from_ymd_opt(now.year(), now.month(), 1).unwrap_or(now.date_naive());
    first.and_time(NaiveTime::default()).and_utc()
}

/// Parse a timestamp or plain calendar date. Offsets are converted to UTC;
/// naive values and plain dates are taken as UTC, dates at midnight.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let s = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc).trunc_subsecs(6));
    }
    if let Ok(naive) = s.parse::<NaiveDateTime>() {
        return Ok(naive.and_utc().trunc_subsecs(6));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(naive.and_utc().trunc_subsecs(6));
        }
    }
    if let Ok(day) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(day.and_time(NaiveTime::default()).and_utc());
    }

    Err(FinanceError::invalid(format!(
        "'{}' is not a valid date (expected YYYY-MM-DD or an ISO 8601 timestamp)",
        raw
    )))
}

/// Like [`parse_timestamp`], but a plain calendar date covers the whole day.
pub fn parse_range_end(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(day) = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d") {
        return day
            .and_hms_micro_opt(23, 59, 59, 999_999)
            .map(|naive| naive.and_utc())
            .ok_or_else(|| FinanceError::invalid(format!("'{}' is not a valid date", raw)));
    }
    parse_timestamp(raw)
}

fn ensure_finite(field: &str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(FinanceError::invalid(format!("{} must be a finite number", field)))
    }
}

fn ensure_positive(field: &str, value: f64) -> Result<()> {
    ensure_finite(field, value)?;
    if value > 0.0 {
        Ok(())
    } else {
        Err(FinanceError::invalid(format!(
            "{} must be greater than 0 (got {})",
            field, value
        )))
    }
}

pub(crate) fn ensure_non_negative(field: &str, value: f64) -> Result<()> {
    ensure_finite(field, value)?;
    if value >= 0.0 {
        Ok(())
    } else {
        Err(FinanceError::invalid(format!(
            "{} must not be negative (got {})",
            field, value
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn deadline() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_enum_parsing_is_case_insensitive() {
        assert_eq!("Groceries".parse::<ExpenseCategory>().unwrap(), ExpenseCategory::Groceries);
        assert_eq!(" REAL_ESTATE ".parse::<InvestmentType>().unwrap(), InvestmentType::RealEstate);
        assert_eq!("debt_reduction".parse::<GoalType>().unwrap(), GoalType::DebtReduction);
        assert_eq!("HIGH".parse::<Priority>().unwrap(), Priority::High);
    }

    #[test]
    fn test_unknown_variant_is_invalid_input() {
        let err = "gambling".parse::<ExpenseCategory>().unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidInput);
        assert!(err.to_string().contains("groceries"));
    }

    #[test]
    fn test_enum_names_round_trip_through_serde() {
        for category in ExpenseCategory::ALL {
            let json = serde_json::to_value(category).unwrap();
            assert_eq!(json, serde_json::json!(category.as_str()));
        }
        for kind in InvestmentType::ALL {
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json, serde_json::json!(kind.as_str()));
        }
    }

    #[test]
    fn test_progress_percentage() {
        let mut goal = Goal::new(
            "u1",
            GoalType::Savings,
            "House".to_string(),
            10_000.0,
            0.0,
            deadline(),
            Priority::default(),
        )
        .unwrap();
        assert_eq!(goal.priority, Priority::Medium);
        assert_eq!(goal.progress_percentage(), 0.0);

        let mut last = goal.progress_percentage();
        for step in [1_000.0, 2_500.0, 6_000.0, 12_000.0, 50_000.0] {
            goal.current_amount = step;
            let pct = goal.progress_percentage();
            assert!(pct >= last);
            assert!(pct <= 100.0);
            last = pct;
        }
        assert_eq!(last, 100.0);

        goal.target_amount = 0.0;
        assert_eq!(goal.progress_percentage(), 0.0);
    }

    #[test]
    fn test_goal_rejects_bad_amounts() {
        let zero_target = Goal::new(
            "u1",
            GoalType::Savings,
            "x".into(),
            0.0,
            0.0,
            deadline(),
            Priority::Low,
        );
        assert!(zero_target.is_err());

        let negative_current = Goal::new(
            "u1",
            GoalType::Savings,
            "x".into(),
            100.0,
            -1.0,
            deadline(),
            Priority::Low,
        );
        assert!(negative_current.is_err());
    }

    #[test]
    fn test_expense_requires_positive_amount() {
        for amount in [0.0, -5.0, f64::NAN, f64::INFINITY] {
            let err = Expense::new("u1", amount, ExpenseCategory::Dining, "x".into(), None)
                .unwrap_err();
            assert_eq!(err.code(), ErrorCode::InvalidInput);
        }
    }

    #[test]
    fn test_investment_normalizes_symbol_and_derives_values() {
        let mut inv = Investment::new(
            "u1",
            NewInvestment {
                symbol: " aapl ".into(),
                name: "Apple".into(),
                quantity: 10.0,
                purchase_price: 150.0,
                investment_type: InvestmentType::Stock,
                purchase_date: None,
                notes: None,
            },
        )
        .unwrap();

        assert_eq!(inv.symbol, "AAPL");
        assert_eq!(inv.total_cost(), 1500.0);
        assert_eq!(inv.current_value(), None);

        inv.current_price = Some(200.0);
        assert_eq!(inv.current_value(), Some(2000.0));
    }

    #[test]
    fn test_balance_update_keeps_existing_parameters() {
        let existing = AccountBalance {
            user_id: "u1".into(),
            current_balance: 10.0,
            last_updated: now_utc(),
            monthly_income: 3000.0,
            monthly_expense_threshold: 500.0,
        };

        let update = BalanceUpdate::new("u1", 1000.0, None, Some(800.0)).unwrap();
        let merged = update.apply_to(Some(&existing));
        assert_eq!(merged.current_balance, 1000.0);
        assert_eq!(merged.monthly_income, 3000.0);
        assert_eq!(merged.monthly_expense_threshold, 800.0);

        let fresh = update.apply_to(None);
        assert_eq!(fresh.monthly_income, 0.0);

        assert!(BalanceUpdate::new("u1", 1.0, Some(-1.0), None).is_err());
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let day = parse_timestamp("2024-03-15").unwrap();
        assert_eq!(day, Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap());

        let naive = parse_timestamp("2024-03-15T10:30:00").unwrap();
        assert_eq!(naive, Utc.with_ymd_and_hms(2024, 3, 15, 10, 30, 0).unwrap());

        let zulu = parse_timestamp("2024-03-15T10:30:00Z").unwrap();
        assert_eq!(zulu, naive);

        let offset = parse_timestamp("2024-03-15T12:30:00+02:00").unwrap();
        assert_eq!(offset, naive);

        assert!(parse_timestamp("next tuesday").is_err());
        assert!(parse_timestamp("2024-13-01").is_err());
    }

    #[test]
    fn test_range_end_covers_whole_day() {
        let end = parse_range_end("2024-03-15").unwrap();
        assert!(end > Utc.with_ymd_and_hms(2024, 3, 15, 23, 59, 59).unwrap());
        assert!(end < Utc.with_ymd_and_hms(2024, 3, 16, 0, 0, 0).unwrap());

        let exact = parse_range_end("2024-03-15T08:00:00").unwrap();
        assert_eq!(exact, Utc.with_ymd_and_hms(2024, 3, 15, 8, 0, 0).unwrap());
    }

    #[test]
    fn test_month_start() {
        let now = Utc.with_ymd_and_hms(2024, 2, 29, 17, 45, 3).unwrap();
        assert_eq!(month_start(now), Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(10.005_1), 10.01);
        assert_eq!(round2(0.1 + 0.2), 0.3);
        assert_eq!(round2(-3.456), -3.46);
    }

    #[test]
    fn test_operation_result_wire_format() {
        #[derive(Serialize)]
        struct Payload {
            count: usize,
        }

        let ok = OperationResult::Success(Payload { count: 2 });
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json, serde_json::json!({"success": true, "count": 2}));

        let failed: OperationResult<Payload> = OperationResult::from_result(
            Err(FinanceError::storage("connection refused")),
            "Error adding expense",
        );
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["message"], "Error adding expense");
        assert_eq!(json["error"], "connection refused");
        assert_eq!(json["code"], "storage_error");
    }

    #[test]
    fn test_invalid_input_message() {
        let failure = OperationFailure::from_error(
            &FinanceError::invalid("amount must be greater than 0 (got -1)"),
            "Error adding expense",
        );
        assert_eq!(failure.message, "Invalid input parameters");
        assert_eq!(failure.code, ErrorCode::InvalidInput);
    }

    #[test]
    fn test_unencodable_result_is_a_server_failure() {
        let mut bad = std::collections::HashMap::new();
        bad.insert((1, 2), "tuple keys cannot become JSON object keys");

        let output = ToolOutput::from_operation(OperationResult::Success(bad));
        assert!(!output.success);
        assert_eq!(output.code, Some(ErrorCode::StorageError));
        assert_eq!(output.message.as_deref(), Some("Failed to encode result"));
    }
}
