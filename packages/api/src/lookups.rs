//! Read-side queries behind the expense, planner and profile views.

use serde::{Deserialize, Serialize};
use store::models::{Bill, Expense, ExpenseCategory, Goal, Profile, Task};
use store::summary::MonthRange;

use crate::client::BackendClient;
use crate::error::ApiError;
use crate::tables::{Query, Record};

/// Prefix of expense descriptions created from a bill.
pub const BILL_PREFIX: &str = "Bill: ";

/// An expense joined with its category.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExpenseWithCategory {
    #[serde(flatten)]
    pub record: Record<Expense>,
    #[serde(default)]
    pub expense_categories: Option<ExpenseCategory>,
}

/// The bill title an expense description refers to, if any.
pub fn bill_title(description: &str) -> Option<&str> {
    description
        .strip_prefix(BILL_PREFIX)
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

impl BackendClient {
    pub async fn expense_categories(&self) -> Result<Vec<ExpenseCategory>, ApiError> {
        self.select(&Query::table("expense_categories").order("name", true, true))
            .await
    }

    /// The user's expenses in `month`, newest first, with their categories.
    pub async fn expenses_with_categories(
        &self,
        month: MonthRange,
    ) -> Result<Vec<ExpenseWithCategory>, ApiError> {
        let user_id = self.require_user().await?;
        let query = Query::table("expenses")
            .select("*,expense_categories(id,name,color,icon)")
            .eq("user_id", user_id)
            .gte("expense_date", month.start)
            .lte("expense_date", month.end)
            .order("expense_date", false, true);
        self.select(&query).await
    }

    /// The bill an expense was created from, matched by title.
    pub async fn find_bill_for_expense(
        &self,
        expense: &Expense,
    ) -> Result<Option<Record<Bill>>, ApiError> {
        let Some(title) = expense.description.as_deref().and_then(bill_title) else {
            return Ok(None);
        };
        let user_id = self.require_user().await?;
        let query = Query::table("bills")
            .eq("user_id", user_id)
            .ilike("title", format!("%{title}%"))
            .limit(1);
        let mut bills: Vec<Record<Bill>> = self.select(&query).await?;
        Ok(bills.pop())
    }

    /// The user's tasks, soonest due first and undated tasks last.
    pub async fn tasks(&self) -> Result<Vec<Record<Task>>, ApiError> {
        let user_id = self.require_user().await?;
        let query = Query::table("tasks")
            .eq("user_id", user_id)
            .order("due_date", true, true)
            .order("created_at", false, true);
        self.select(&query).await
    }

    pub async fn goals_for(&self, date: chrono::NaiveDate) -> Result<Vec<Record<Goal>>, ApiError> {
        let user_id = self.require_user().await?;
        let query = Query::table("goals")
            .eq("user_id", user_id)
            .eq("goal_date", date)
            .order("created_at", true, true);
        self.select(&query).await
    }

    pub async fn profile(&self) -> Result<Option<Profile>, ApiError> {
        let user_id = self.require_user().await?;
        let mut rows: Vec<Profile> = self
            .select(&Query::table("profiles").eq("id", user_id).limit(1))
            .await?;
        Ok(rows.pop())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bill_title_from_description() {
        assert_eq!(bill_title("Bill: Electricity March"), Some("Electricity March"));
        assert_eq!(bill_title("Bill: "), None);
        assert_eq!(bill_title("Lunch"), None);
    }

    #[test]
    fn test_expense_with_category_decodes_join() {
        let json = serde_json::json!({
            "id": "8f1f7e3c-36a7-4a39-8d4c-3f0f0a3e8b10",
            "user_id": "u-1",
            "amount": 42.5,
            "category_id": "c-1",
            "description": "Bill: Water",
            "expense_date": "2025-03-02",
            "expense_categories": { "id": "c-1", "name": "Utilities", "color": "#00f", "icon": null }
        });
        let row: ExpenseWithCategory = serde_json::from_value(json).unwrap();
        assert_eq!(row.record.data.category_id, "c-1");
        assert_eq!(row.expense_categories.unwrap().name, "Utilities");
    }
}
