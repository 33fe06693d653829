//! Financial goal tracking

use crate::error::FinanceError;
use crate::models::{now_utc, parse_timestamp, Goal, GoalType, OperationResult, Priority};
use crate::store::StoreHandle;
use crate::Result;
use serde::{Deserialize, Serialize};
use tracing::info;

/// A goal together with its derived progress
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GoalView {
    #[serde(flatten)]
    pub goal: Goal,
    pub progress_percentage: f64,
}

impl From<Goal> for GoalView {
    fn from(goal: Goal) -> Self {
        let progress_percentage = goal.progress_percentage();
        Self {
            goal,
            progress_percentage,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GoalCreated {
    pub message: String,
    pub goal_id: String,
    pub goal: GoalView,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum GoalLookup {
    Single { goal: GoalView },
    All { count: usize, goals: Vec<GoalView> },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GoalProgress {
    pub message: String,
    pub goal: GoalView,
}

/// Fields for a new goal, as supplied by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalRequest {
    pub goal_type: String,
    pub name: String,
    pub target_amount: f64,
    pub deadline: String,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub current_amount: f64,
}

pub struct GoalService {
    store: StoreHandle,
}

impl GoalService {
    pub fn new(store: StoreHandle) -> Self {
        Self { store }
    }

    pub async fn create_goal(&self, user_id: &str, request: &GoalRequest) -> OperationResult<GoalCreated> {
        OperationResult::from_result(
            self.try_create_goal(user_id, request).await,
            "Error creating goal",
        )
    }

    async fn try_create_goal(&self, user_id: &str, request: &GoalRequest) -> Result<GoalCreated> {
        let goal_type: GoalType = request.goal_type.parse()?;
        let priority = match request.priority.as_deref() {
            Some(raw) if !raw.trim().is_empty() => raw.parse()?,
            _ => Priority::default(),
        };
        let deadline = parse_timestamp(&request.deadline)?;

        let goal = Goal::new(
            user_id,
            goal_type,
            request.name.clone(),
            request.target_amount,
            request.current_amount,
            deadline,
            priority,
        )?;

        self.store.insert_goal(&goal).await?;

        info!(
            user_id,
            goal_id = %goal.goal_id,
            goal_type = %goal_type,
            target_amount = goal.target_amount,
            "Goal created"
        );

        Ok(GoalCreated {
            message: format!("Goal '{}' created successfully!", goal.name),
            goal_id: goal.goal_id.clone(),
            goal: goal.into(),
        })
    }

    /// One goal by id, or every goal of the user (newest first).
    pub async fn get_goal(&self, user_id: &str, goal_id: Option<&str>) -> OperationResult<GoalLookup> {
        OperationResult::from_result(
            self.try_get_goal(user_id, goal_id).await,
            "Error retrieving goals",
        )
    }

    async fn try_get_goal(&self, user_id: &str, goal_id: Option<&str>) -> Result<GoalLookup> {
        match goal_id.filter(|id| !id.trim().is_empty()) {
            Some(goal_id) => {
                let goal = self
                    .store
                    .find_goal(user_id, goal_id)
                    .await?
                    .ok_or_else(|| goal_not_found(goal_id))?;

                Ok(GoalLookup::Single { goal: goal.into() })
            }
            None => {
                let goals: Vec<GoalView> = self
                    .store
                    .list_goals(user_id)
                    .await?
                    .into_iter()
                    .map(GoalView::from)
                    .collect();

                Ok(GoalLookup::All {
                    count: goals.len(),
                    goals,
                })
            }
        }
    }

    /// Add to a goal's current amount. Negative amounts record a setback.
    pub async fn add_goal_progress(
        &self,
        user_id: &str,
        goal_id: &str,
        amount_to_add: f64,
    ) -> OperationResult<GoalProgress> {
        OperationResult::from_result(
            self.try_add_goal_progress(user_id, goal_id, amount_to_add)
                .await,
            "Error updating goal progress",
        )
    }

    async fn try_add_goal_progress(
        &self,
        user_id: &str,
        goal_id: &str,
        amount_to_add: f64,
    ) -> Result<GoalProgress> {
        if !amount_to_add.is_finite() {
            return Err(FinanceError::invalid("amount_to_add must be a finite number"));
        }

        let goal = self
            .store
            .add_goal_amount(user_id, goal_id, amount_to_add, now_utc())
            .await?
            .ok_or_else(|| goal_not_found(goal_id))?;

        info!(
            user_id,
            goal_id,
            amount_to_add,
            current_amount = goal.current_amount,
            "Goal progress updated"
        );

        Ok(GoalProgress {
            message: format!("Goal progress updated! Added ${:.2}", amount_to_add),
            goal: goal.into(),
        })
    }
}

fn goal_not_found(goal_id: &str) -> FinanceError {
    FinanceError::not_found(format!("Goal with ID '{}' not found", goal_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn savings_goal(target: f64) -> GoalRequest {
        GoalRequest {
            goal_type: "savings".into(),
            name: "House deposit".into(),
            target_amount: target,
            deadline: "2030-12-31".into(),
            priority: None,
            current_amount: 0.0,
        }
    }

    #[tokio::test]
    async fn test_scenario_progress_increments() {
        let goals = GoalService::new(StoreHandle::in_memory());

        let created = goals
            .create_goal("u1", &savings_goal(10_000.0))
            .await
            .success()
            .unwrap();
        assert_eq!(created.goal.progress_percentage, 0.0);
        assert_eq!(created.goal.goal.priority, Priority::Medium);

        let first = goals
            .add_goal_progress("u1", &created.goal_id, 2500.0)
            .await
            .success()
            .unwrap();
        assert_eq!(first.goal.progress_percentage, 25.0);

        let second = goals
            .add_goal_progress("u1", &created.goal_id, 2500.0)
            .await
            .success()
            .unwrap();
        assert_eq!(second.goal.progress_percentage, 50.0);
        assert_eq!(second.goal.goal.current_amount, 5000.0);
        assert!(second.goal.goal.updated_at >= created.goal.goal.updated_at);
    }

    #[tokio::test]
    async fn test_unknown_goal_is_not_found() {
        let goals = GoalService::new(StoreHandle::in_memory());

        let lookup = goals.get_goal("u1", Some("missing-id")).await;
        assert!(!lookup.is_success());
        let failure = lookup.failure().unwrap();
        assert_eq!(failure.code, ErrorCode::NotFound);
        assert!(failure.message.contains("missing-id"));

        let json = serde_json::to_value(&lookup).unwrap();
        assert_eq!(json["success"], false);
        assert!(json.get("goal").is_none());

        let progress = goals.add_goal_progress("u1", "missing-id", 10.0).await;
        assert_eq!(progress.failure().unwrap().code, ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_goals_are_scoped_to_user() {
        let goals = GoalService::new(StoreHandle::in_memory());
        let created = goals
            .create_goal("u1", &savings_goal(500.0))
            .await
            .success()
            .unwrap();

        let other = goals.get_goal("u2", Some(&created.goal_id)).await;
        assert_eq!(other.failure().unwrap().code, ErrorCode::NotFound);

        match goals.get_goal("u2", None).await.success().unwrap() {
            GoalLookup::All { count, .. } => assert_eq!(count, 0),
            other => panic!("unexpected lookup {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_list_goals_newest_first() {
        let goals = GoalService::new(StoreHandle::in_memory());
        let mut ids = Vec::new();
        for target in [100.0, 200.0, 300.0] {
            let created = goals
                .create_goal("u1", &savings_goal(target))
                .await
                .success()
                .unwrap();
            ids.push(created.goal_id);
        }

        let GoalLookup::All { count, goals: listed } = goals.get_goal("u1", None).await.success().unwrap()
        else {
            panic!("expected a goal listing");
        };
        assert_eq!(count, 3);
        let listed_ids: Vec<String> = listed.into_iter().map(|g| g.goal.goal_id).collect();
        ids.reverse();
        assert_eq!(listed_ids, ids);
    }

    #[tokio::test]
    async fn test_progress_may_regress_and_overshoot() {
        let goals = GoalService::new(StoreHandle::in_memory());
        let created = goals
            .create_goal("u1", &savings_goal(1000.0))
            .await
            .success()
            .unwrap();

        let setback = goals
            .add_goal_progress("u1", &created.goal_id, -200.0)
            .await
            .success()
            .unwrap();
        assert_eq!(setback.goal.goal.current_amount, -200.0);

        let overshoot = goals
            .add_goal_progress("u1", &created.goal_id, 5000.0)
            .await
            .success()
            .unwrap();
        assert_eq!(overshoot.goal.goal.current_amount, 4800.0);
        assert_eq!(overshoot.goal.progress_percentage, 100.0);
    }

    #[tokio::test]
    async fn test_create_goal_validation() {
        let goals = GoalService::new(StoreHandle::in_memory());

        let cases = [
            GoalRequest { target_amount: 0.0, ..savings_goal(1.0) },
            GoalRequest { goal_type: "retirement".into(), ..savings_goal(1.0) },
            GoalRequest { priority: Some("urgent".into()), ..savings_goal(1.0) },
            GoalRequest { deadline: "someday".into(), ..savings_goal(1.0) },
            GoalRequest { current_amount: -1.0, ..savings_goal(1.0) },
        ];

        for request in cases {
            let result = goals.create_goal("u1", &request).await;
            assert_eq!(result.failure().unwrap().code, ErrorCode::InvalidInput, "{:?}", request);
        }
    }

    #[test]
    fn test_goal_view_serializes_flat() {
        let goal = Goal::new(
            "u1",
            GoalType::Investment,
            "Index fund".into(),
            400.0,
            100.0,
            parse_timestamp("2031-01-01").unwrap(),
            Priority::High,
        )
        .unwrap();

        let json = serde_json::to_value(GoalView::from(goal)).unwrap();
        assert_eq!(json["goal_type"], "investment");
        assert_eq!(json["priority"], "high");
        assert_eq!(json["progress_percentage"], 25.0);
    }
}
