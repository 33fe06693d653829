//! Finance Manager Core
//!
//! Persistence and business logic for a personal-finance assistant:
//! - Expense ledger that keeps the account balance in step with every expense
//! - Financial goals with progress tracking
//! - Investment portfolio valued at cost basis
//!
//! Every operation returns an `OperationResult` and is exposed as a named
//! tool through `tools::ToolRegistry`.

pub mod api;
pub mod config;
pub mod error;
pub mod goals;
pub mod ledger;
pub mod models;
pub mod portfolio;
pub mod store;
pub mod tools;

pub use error::{FinanceError, Result};

// Re-export common types
pub use models::*;
pub use store::{DocumentStore, StoreHandle};
