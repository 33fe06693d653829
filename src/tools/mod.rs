//! Tool trait and registry
//!
//! Every service operation is exposed as a named tool taking JSON parameters,
//! grouped by the agent that owns it.

use crate::error::FinanceError;
use crate::goals::{GoalRequest, GoalService};
use crate::ledger::{ExpenseQuery, LedgerService};
use crate::models::{OperationFailure, ToolInput, ToolOutput};
use crate::portfolio::{InvestmentRequest, PortfolioService};
use crate::store::StoreHandle;
use crate::Result;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Agent that owns a tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentScope {
    Root,
    Expenses,
    Investment,
}

impl AgentScope {
    pub const ALL: [AgentScope; 3] = [AgentScope::Root, AgentScope::Expenses, AgentScope::Investment];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentScope::Root => "root",
            AgentScope::Expenses => "expenses",
            AgentScope::Investment => "investment",
        }
    }
}

impl fmt::Display for AgentScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Trait for a single tool
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn scope(&self) -> AgentScope;
    /// Errors are reserved for unusable parameters. Operation failures come
    /// back as an unsuccessful `ToolOutput`.
    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub scope: AgentScope,
}

/// The three services every tool dispatches into, sharing one store.
pub struct FinanceServices {
    pub goals: GoalService,
    pub ledger: LedgerService,
    pub portfolio: PortfolioService,
}

impl FinanceServices {
    pub fn new(store: StoreHandle) -> Self {
        Self {
            goals: GoalService::new(store.clone()),
            ledger: LedgerService::new(store.clone()),
            portfolio: PortfolioService::new(store),
        }
    }
}

/// Tool registry for looking up and executing tools
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Tool names in alphabetical order
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn list_for(&self, scope: AgentScope) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .tools
            .values()
            .filter(|t| t.scope() == scope)
            .map(|t| t.name())
            .collect();
        names.sort_unstable();
        names
    }

    pub fn describe(&self) -> Vec<ToolDescriptor> {
        self.list()
            .into_iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| ToolDescriptor {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                scope: tool.scope(),
            })
            .collect()
    }

    /// Run a tool by name. Never fails: unknown tools and bad parameters
    /// produce an unsuccessful output.
    pub async fn invoke(&self, input: &ToolInput) -> ToolOutput {
        let Some(tool) = self.get(&input.tool_name) else {
            debug!(tool = %input.tool_name, "Unknown tool requested");
            return ToolOutput::failed(OperationFailure::from_error(
                &FinanceError::not_found(format!("Unknown tool: {}", input.tool_name)),
                "Unknown tool",
            ));
        };

        if input.user_id.trim().is_empty() {
            return ToolOutput::failed(OperationFailure::from_error(
                &FinanceError::invalid("user_id must not be empty"),
                "Invalid input parameters",
            ));
        }

        info!(tool = tool.name(), scope = %tool.scope(), user_id = %input.user_id, "Executing tool");

        let output = match tool.execute(input).await {
            Ok(output) => output,
            Err(e) => ToolOutput::failed(OperationFailure::from_error(&e, "Tool execution failed")),
        };

        debug!(
            tool = tool.name(),
            success = output.success,
            code = ?output.code,
            "Tool finished"
        );

        output
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode tool parameters into typed arguments. A missing parameter object
/// is treated as empty.
fn parse_args<T: DeserializeOwned>(input: &ToolInput) -> Result<T> {
    let params = match &input.parameters {
        Value::Null => Value::Object(Default::default()),
        Value::Object(_) => input.parameters.clone(),
        _ => {
            return Err(FinanceError::invalid(format!(
                "Parameters for {} must be a JSON object",
                input.tool_name
            )))
        }
    };

    serde_json::from_value(params).map_err(|e| {
        FinanceError::invalid(format!("Invalid parameters for {}: {}", input.tool_name, e))
    })
}

// ---- goal tools ----

#[derive(Debug, Default, Deserialize)]
struct GetGoalArgs {
    #[serde(default)]
    goal_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoalProgressArgs {
    goal_id: String,
    amount_to_add: f64,
}

pub struct SetGoalTool {
    services: Arc<FinanceServices>,
}

#[async_trait::async_trait]
impl Tool for SetGoalTool {
    fn name(&self) -> &'static str {
        "set_goal"
    }

    fn description(&self) -> &'static str {
        "Create a financial goal (savings, investment, debt_reduction, emergency_fund)"
    }

    fn scope(&self) -> AgentScope {
        AgentScope::Root
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let args: GoalRequest = parse_args(input)?;
        let result = self.services.goals.create_goal(&input.user_id, &args).await;
        Ok(ToolOutput::from_operation(result))
    }
}

pub struct GetGoalTool {
    services: Arc<FinanceServices>,
}

#[async_trait::async_trait]
impl Tool for GetGoalTool {
    fn name(&self) -> &'static str {
        "get_goal"
    }

    fn description(&self) -> &'static str {
        "Retrieve one goal by goal_id, or all goals when goal_id is omitted"
    }

    fn scope(&self) -> AgentScope {
        AgentScope::Root
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let args: GetGoalArgs = parse_args(input)?;
        let result = self
            .services
            .goals
            .get_goal(&input.user_id, args.goal_id.as_deref())
            .await;
        Ok(ToolOutput::from_operation(result))
    }
}

pub struct UpdateGoalProgressTool {
    services: Arc<FinanceServices>,
}

#[async_trait::async_trait]
impl Tool for UpdateGoalProgressTool {
    fn name(&self) -> &'static str {
        "update_goal_progress"
    }

    fn description(&self) -> &'static str {
        "Add an amount to a goal's current progress"
    }

    fn scope(&self) -> AgentScope {
        AgentScope::Root
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let args: GoalProgressArgs = parse_args(input)?;
        let result = self
            .services
            .goals
            .add_goal_progress(&input.user_id, &args.goal_id, args.amount_to_add)
            .await;
        Ok(ToolOutput::from_operation(result))
    }
}

// ---- expense tools ----

#[derive(Debug, Deserialize)]
struct ExpenseArgs {
    amount: f64,
    category: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BalanceArgs {
    balance: f64,
    #[serde(default)]
    monthly_income: Option<f64>,
    #[serde(default)]
    monthly_expense_threshold: Option<f64>,
}

pub struct SetExpenseTool {
    services: Arc<FinanceServices>,
}

#[async_trait::async_trait]
impl Tool for SetExpenseTool {
    fn name(&self) -> &'static str {
        "set_expense"
    }

    fn description(&self) -> &'static str {
        "Record an expense and deduct it from the account balance"
    }

    fn scope(&self) -> AgentScope {
        AgentScope::Expenses
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let args: ExpenseArgs = parse_args(input)?;
        let result = self
            .services
            .ledger
            .record_expense(
                &input.user_id,
                args.amount,
                &args.category,
                &args.description,
                args.date.as_deref(),
            )
            .await;
        Ok(ToolOutput::from_operation(result))
    }
}

pub struct GetExpensesTool {
    services: Arc<FinanceServices>,
}

#[async_trait::async_trait]
impl Tool for GetExpensesTool {
    fn name(&self) -> &'static str {
        "get_expenses"
    }

    fn description(&self) -> &'static str {
        "List expenses filtered by date range, category and amount, with per-category totals"
    }

    fn scope(&self) -> AgentScope {
        AgentScope::Expenses
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let query: ExpenseQuery = parse_args(input)?;
        let result = self.services.ledger.list_expenses(&input.user_id, &query).await;
        Ok(ToolOutput::from_operation(result))
    }
}

pub struct GetBalanceTool {
    services: Arc<FinanceServices>,
}

#[async_trait::async_trait]
impl Tool for GetBalanceTool {
    fn name(&self) -> &'static str {
        "get_current_account_balance"
    }

    fn description(&self) -> &'static str {
        "Current balance, monthly income and this month's spending against the threshold"
    }

    fn scope(&self) -> AgentScope {
        AgentScope::Expenses
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let result = self.services.ledger.get_balance(&input.user_id).await;
        Ok(ToolOutput::from_operation(result))
    }
}

pub struct SetBalanceTool {
    services: Arc<FinanceServices>,
}

#[async_trait::async_trait]
impl Tool for SetBalanceTool {
    fn name(&self) -> &'static str {
        "set_account_balance"
    }

    fn description(&self) -> &'static str {
        "Set the account balance and optionally monthly income and expense threshold"
    }

    fn scope(&self) -> AgentScope {
        AgentScope::Expenses
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let args: BalanceArgs = parse_args(input)?;
        let result = self
            .services
            .ledger
            .set_balance(
                &input.user_id,
                args.balance,
                args.monthly_income,
                args.monthly_expense_threshold,
            )
            .await;
        Ok(ToolOutput::from_operation(result))
    }
}

// ---- investment tools ----

#[derive(Debug, Default, Deserialize)]
struct PortfolioArgs {
    #[serde(default)]
    investment_type: Option<String>,
}

pub struct AddInvestmentTool {
    services: Arc<FinanceServices>,
}

#[async_trait::async_trait]
impl Tool for AddInvestmentTool {
    fn name(&self) -> &'static str {
        "add_investment"
    }

    fn description(&self) -> &'static str {
        "Record a purchased position (stock, bond, etf, mutual_fund, crypto, real_estate, other)"
    }

    fn scope(&self) -> AgentScope {
        AgentScope::Investment
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let args: InvestmentRequest = parse_args(input)?;
        let result = self.services.portfolio.add_investment(&input.user_id, &args).await;
        Ok(ToolOutput::from_operation(result))
    }
}

pub struct GetPortfolioTool {
    services: Arc<FinanceServices>,
}

#[async_trait::async_trait]
impl Tool for GetPortfolioTool {
    fn name(&self) -> &'static str {
        "get_portfolio"
    }

    fn description(&self) -> &'static str {
        "List investments, newest purchase first, optionally of one type"
    }

    fn scope(&self) -> AgentScope {
        AgentScope::Investment
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let args: PortfolioArgs = parse_args(input)?;
        let result = self
            .services
            .portfolio
            .list_investments(&input.user_id, args.investment_type.as_deref())
            .await;
        Ok(ToolOutput::from_operation(result))
    }
}

pub struct PortfolioValueTool {
    services: Arc<FinanceServices>,
}

#[async_trait::async_trait]
impl Tool for PortfolioValueTool {
    fn name(&self) -> &'static str {
        "get_portfolio_value"
    }

    fn description(&self) -> &'static str {
        "Total cost basis of the portfolio with a breakdown by investment type"
    }

    fn scope(&self) -> AgentScope {
        AgentScope::Investment
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let result = self.services.portfolio.get_portfolio_value(&input.user_id).await;
        Ok(ToolOutput::from_operation(result))
    }
}

pub struct InvestmentSummaryTool {
    services: Arc<FinanceServices>,
}

#[async_trait::async_trait]
impl Tool for InvestmentSummaryTool {
    fn name(&self) -> &'static str {
        "get_investment_summary"
    }

    fn description(&self) -> &'static str {
        "Total invested, asset allocation and number of positions"
    }

    fn scope(&self) -> AgentScope {
        AgentScope::Investment
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let result = self
            .services
            .portfolio
            .get_investment_summary(&input.user_id)
            .await;
        Ok(ToolOutput::from_operation(result))
    }
}

/// Create a registry with every finance tool bound to `store`.
pub fn create_default_registry(store: StoreHandle) -> ToolRegistry {
    let services = Arc::new(FinanceServices::new(store));
    let mut registry = ToolRegistry::new();

    registry.register(Arc::new(SetGoalTool { services: services.clone() }));
    registry.register(Arc::new(GetGoalTool { services: services.clone() }));
    registry.register(Arc::new(UpdateGoalProgressTool { services: services.clone() }));

    registry.register(Arc::new(SetExpenseTool { services: services.clone() }));
    registry.register(Arc::new(GetExpensesTool { services: services.clone() }));
    registry.register(Arc::new(GetBalanceTool { services: services.clone() }));
    registry.register(Arc::new(SetBalanceTool { services: services.clone() }));

    registry.register(Arc::new(AddInvestmentTool { services: services.clone() }));
    registry.register(Arc::new(GetPortfolioTool { services: services.clone() }));
    registry.register(Arc::new(PortfolioValueTool { services: services.clone() }));
    registry.register(Arc::new(InvestmentSummaryTool { services }));

    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use serde_json::json;

    fn input(tool: &str, parameters: Value) -> ToolInput {
        ToolInput {
            tool_name: tool.to_string(),
            user_id: "u1".to_string(),
            parameters,
        }
    }

    #[test]
    fn test_registry_groups_tools_by_agent() {
        let registry = create_default_registry(StoreHandle::in_memory());

        assert_eq!(registry.list().len(), 11);
        assert_eq!(
            registry.list_for(AgentScope::Root),
            vec!["get_goal", "set_goal", "update_goal_progress"]
        );
        assert_eq!(
            registry.list_for(AgentScope::Expenses),
            vec![
                "get_current_account_balance",
                "get_expenses",
                "set_account_balance",
                "set_expense"
            ]
        );
        assert_eq!(registry.list_for(AgentScope::Investment).len(), 4);

        let described = registry.describe();
        assert_eq!(described.len(), 11);
        assert_eq!(described[0].name, "add_investment");
        assert_eq!(described[0].scope, AgentScope::Investment);
    }

    #[tokio::test]
    async fn test_expense_flow_through_tools() {
        let registry = create_default_registry(StoreHandle::in_memory());

        let set = registry
            .invoke(&input("set_account_balance", json!({"balance": 1000.0, "monthly_expense_threshold": 500.0})))
            .await;
        assert!(set.success);
        assert_eq!(set.message.as_deref(), Some("Account balance set successfully"));

        let spent = registry
            .invoke(&input(
                "set_expense",
                json!({"amount": 120.5, "category": "Groceries", "description": "weekly shop"}),
            ))
            .await;
        assert!(spent.success, "{:?}", spent);
        assert_eq!(spent.data["new_balance"], 879.5);
        assert_eq!(spent.data["expense"]["category"], "groceries");

        let balance = registry.invoke(&input("get_current_account_balance", Value::Null)).await;
        assert_eq!(balance.data["current_balance"], 879.5);
        assert_eq!(balance.data["current_month_spent"], 120.5);

        let listed = registry
            .invoke(&input("get_expenses", json!({"category": "groceries"})))
            .await;
        assert_eq!(listed.data["count"], 1);
        assert_eq!(listed.data["category_breakdown"]["groceries"], 120.5);
    }

    #[tokio::test]
    async fn test_goal_and_portfolio_tools() {
        let registry = create_default_registry(StoreHandle::in_memory());

        let created = registry
            .invoke(&input(
                "set_goal",
                json!({
                    "goal_type": "emergency_fund",
                    "name": "Buffer",
                    "target_amount": 200.0,
                    "deadline": "2030-01-01"
                }),
            ))
            .await;
        assert!(created.success, "{:?}", created);
        let goal_id = created.data["goal_id"].as_str().unwrap().to_string();

        let progressed = registry
            .invoke(&input("update_goal_progress", json!({"goal_id": goal_id, "amount_to_add": 50})))
            .await;
        assert_eq!(progressed.data["goal"]["progress_percentage"], 25.0);

        let fetched = registry.invoke(&input("get_goal", json!({"goal_id": goal_id}))).await;
        assert_eq!(fetched.data["goal"]["current_amount"], 50.0);

        registry
            .invoke(&input(
                "add_investment",
                json!({"symbol": "vti", "quantity": 2, "purchase_price": 100, "investment_type": "etf", "name": "Total Market"}),
            ))
            .await;
        let summary = registry.invoke(&input("get_investment_summary", json!({}))).await;
        assert!(summary.success);
        assert_eq!(summary.data["total_invested"], 200.0);
        assert_eq!(summary.data["asset_allocation"]["etf"], 200.0);
        assert_eq!(summary.data["total_positions"], 1);
    }

    #[tokio::test]
    async fn test_failures_carry_codes() {
        let registry = create_default_registry(StoreHandle::in_memory());

        let unknown = registry.invoke(&input("transfer_funds", json!({}))).await;
        assert!(!unknown.success);
        assert_eq!(unknown.code, Some(ErrorCode::NotFound));

        let malformed = registry
            .invoke(&input("set_expense", json!({"amount": "lots", "category": "dining"})))
            .await;
        assert_eq!(malformed.code, Some(ErrorCode::InvalidInput));
        assert_eq!(malformed.message.as_deref(), Some("Invalid input parameters"));

        let not_object = registry.invoke(&input("get_goal", json!([1, 2]))).await;
        assert_eq!(not_object.code, Some(ErrorCode::InvalidInput));

        let missing_goal = registry
            .invoke(&input("update_goal_progress", json!({"goal_id": "nope", "amount_to_add": 1})))
            .await;
        assert_eq!(missing_goal.code, Some(ErrorCode::NotFound));
        assert_eq!(missing_goal.message.as_deref(), Some("Goal with ID 'nope' not found"));

        let anonymous = registry
            .invoke(&ToolInput {
                tool_name: "get_goal".into(),
                user_id: "  ".into(),
                parameters: Value::Null,
            })
            .await;
        assert_eq!(anonymous.code, Some(ErrorCode::InvalidInput));
    }
}
