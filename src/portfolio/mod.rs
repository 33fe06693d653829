//! Investment positions and cost-basis aggregation
//!
//! Values are cost basis only. No market prices are fetched.

use crate::models::{
    parse_timestamp, round2, Investment, InvestmentType, NewInvestment, OperationResult,
};
use crate::store::StoreHandle;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// An investment with its derived values
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvestmentView {
    #[serde(flatten)]
    pub investment: Investment,
    pub total_cost: f64,
    pub current_value: Option<f64>,
}

impl From<Investment> for InvestmentView {
    fn from(investment: Investment) -> Self {
        Self {
            total_cost: investment.total_cost(),
            current_value: investment.current_value(),
            investment,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvestmentAdded {
    pub message: String,
    pub investment: InvestmentView,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PortfolioListing {
    pub count: usize,
    pub investments: Vec<InvestmentView>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PortfolioValue {
    pub total_cost_basis: f64,
    pub breakdown_by_type: BTreeMap<InvestmentType, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvestmentSummary {
    pub total_invested: f64,
    pub asset_allocation: BTreeMap<InvestmentType, f64>,
    pub total_positions: usize,
}

/// A purchase as supplied by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestmentRequest {
    pub symbol: String,
    pub quantity: f64,
    pub purchase_price: f64,
    pub investment_type: String,
    pub name: String,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

pub struct PortfolioService {
    store: StoreHandle,
}

impl PortfolioService {
    pub fn new(store: StoreHandle) -> Self {
        Self { store }
    }

    pub async fn add_investment(
        &self,
        user_id: &str,
        request: &InvestmentRequest,
    ) -> OperationResult<InvestmentAdded> {
        OperationResult::from_result(
            self.try_add_investment(user_id, request).await,
            "Error adding investment",
        )
    }

    async fn try_add_investment(
        &self,
        user_id: &str,
        request: &InvestmentRequest,
    ) -> Result<InvestmentAdded> {
        let investment_type: InvestmentType = request.investment_type.parse()?;
        let purchase_date = request.date.as_deref().map(parse_timestamp).transpose()?;

        let investment = Investment::new(
            user_id,
            NewInvestment {
                symbol: request.symbol.clone(),
                name: request.name.clone(),
                quantity: request.quantity,
                purchase_price: request.purchase_price,
                investment_type,
                purchase_date,
                notes: request.notes.clone(),
            },
        )?;

        self.store.insert_investment(&investment).await?;

        info!(
            user_id,
            investment_id = %investment.investment_id,
            symbol = %investment.symbol,
            quantity = investment.quantity,
            purchase_price = investment.purchase_price,
            "Investment added"
        );

        Ok(InvestmentAdded {
            message: format!("Investment in {} added successfully", investment.symbol),
            investment: investment.into(),
        })
    }

    /// Positions newest purchase first, optionally of one type.
    pub async fn list_investments(
        &self,
        user_id: &str,
        investment_type: Option<&str>,
    ) -> OperationResult<PortfolioListing> {
        OperationResult::from_result(
            self.try_list_investments(user_id, investment_type).await,
            "Error retrieving portfolio",
        )
    }

    async fn try_list_investments(
        &self,
        user_id: &str,
        investment_type: Option<&str>,
    ) -> Result<PortfolioListing> {
        let investment_type = investment_type
            .filter(|t| !t.trim().is_empty())
            .map(str::parse::<InvestmentType>)
            .transpose()?;

        let investments: Vec<InvestmentView> = self
            .store
            .list_investments(user_id, investment_type)
            .await?
            .into_iter()
            .map(InvestmentView::from)
            .collect();

        Ok(PortfolioListing {
            count: investments.len(),
            investments,
        })
    }

    /// Total cost basis and its split by investment type.
    pub async fn get_portfolio_value(&self, user_id: &str) -> OperationResult<PortfolioValue> {
        OperationResult::from_result(
            self.try_get_portfolio_value(user_id).await,
            "Error calculating portfolio value",
        )
    }

    async fn try_get_portfolio_value(&self, user_id: &str) -> Result<PortfolioValue> {
        let investments = self.store.list_investments(user_id, None).await?;
        let value = cost_basis(&investments);

        debug!(
            user_id,
            positions = investments.len(),
            total_cost_basis = value.total_cost_basis,
            "Portfolio value computed"
        );

        Ok(value)
    }

    /// Invested capital, allocation and position count. A failing value
    /// computation is returned as is.
    pub async fn get_investment_summary(&self, user_id: &str) -> OperationResult<InvestmentSummary> {
        let value = match self.get_portfolio_value(user_id).await {
            OperationResult::Success(value) => value,
            OperationResult::Failure(failure) => return OperationResult::Failure(failure),
        };

        let listing = match self.list_investments(user_id, None).await {
            OperationResult::Success(listing) => listing,
            OperationResult::Failure(failure) => return OperationResult::Failure(failure),
        };

        OperationResult::Success(InvestmentSummary {
            total_invested: value.total_cost_basis,
            asset_allocation: value.breakdown_by_type,
            total_positions: listing.count,
        })
    }
}

/// Sum of `quantity * purchase_price`, overall and per type, rounded to cents.
pub fn cost_basis(investments: &[Investment]) -> PortfolioValue {
    let mut total = 0.0;
    let mut breakdown: BTreeMap<InvestmentType, f64> = BTreeMap::new();

    for investment in investments {
        let cost = investment.total_cost();
        total += cost;
        *breakdown.entry(investment.investment_type).or_insert(0.0) += cost;
    }

    PortfolioValue {
        total_cost_basis: round2(total),
        breakdown_by_type: breakdown.into_iter().map(|(k, v)| (k, round2(v))).collect(),
    }
}
