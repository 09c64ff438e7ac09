//! Wire types exchanged with the expense API.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Authenticated user profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Not returned by every endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    pub username: String,

    #[serde(default)]
    pub email: String,
}

/// Locally persisted authentication state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub user: Option<User>,
}

impl Session {
    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none() && self.user.is_none()
    }
}

/// Token pair issued at login and registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// Response body of the login and register endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    #[serde(default)]
    pub message: Option<String>,
    pub tokens: TokenPair,
    pub user: User,
}

/// Response body of the token refresh endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshResponse {
    pub access: String,
}

/// Plain acknowledgement returned by the password-reset endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageResponse {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct RegisterRequest<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct PasswordResetRequest<'a> {
    pub email: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct VerifyOtpRequest<'a> {
    pub email: &'a str,
    pub otp: &'a str,
    pub new_password: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct RefreshRequest<'a> {
    pub refresh: &'a str,
}

/// Spending category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct CategoryPayload<'a> {
    pub name: &'a str,
}

/// Category as referenced from an expense.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryRef {
    pub id: i64,
    pub name: Option<String>,
}

/// A recorded expense.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    pub id: i64,
    pub amount: Decimal,
    pub description: String,
    pub date: NaiveDate,

    /// Category id; older records may have none.
    #[serde(default)]
    pub category: Option<i64>,

    #[serde(default)]
    pub category_name: Option<String>,

    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Expense {
    pub fn category_ref(&self) -> Option<CategoryRef> {
        self.category.map(|id| CategoryRef {
            id,
            name: self.category_name.clone(),
        })
    }
}

/// Payload for creating or replacing an expense.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewExpense {
    pub amount: Decimal,
    pub description: String,
    pub date: NaiveDate,
    pub category: Option<i64>,
}

impl From<&Expense> for NewExpense {
    fn from(expense: &Expense) -> Self {
        Self {
            amount: expense.amount,
            description: expense.description.clone(),
            date: expense.date,
            category: expense.category,
        }
    }
}

/// Spending in one category for the current month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySpending {
    pub category: String,
    pub amount: Decimal,
    pub percentage: Decimal,
}

/// Spending total for one month of the trend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyTotal {
    /// Display label such as "March 2024".
    pub month: String,
    pub amount: Decimal,
}

/// Aggregates served by the dashboard endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_expenses: Decimal,
    pub monthly_expenses: Decimal,

    #[serde(default)]
    pub category_expenses: Vec<CategorySpending>,

    #[serde(default)]
    pub monthly_trend: Vec<MonthlyTotal>,

    #[serde(default)]
    pub recent_expenses: Vec<Expense>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_expense_deserialization() {
        let json = serde_json::json!({
            "id": 7,
            "amount": "149.50",
            "description": "Groceries",
            "category": 3,
            "category_name": "Food & Dining",
            "date": "2024-03-14",
            "created_at": "2024-03-14T09:30:00Z",
            "updated_at": "2024-03-14T09:30:00Z"
        });

        let expense: Expense = serde_json::from_value(json).unwrap();
        assert_eq!(expense.amount, Decimal::from_str("149.50").unwrap());
        assert_eq!(expense.date, NaiveDate::from_ymd_opt(2024, 3, 14).unwrap());
        assert_eq!(
            expense.category_ref(),
            Some(CategoryRef {
                id: 3,
                name: Some("Food & Dining".to_string())
            })
        );
    }

    #[test]
    fn test_expense_without_category() {
        let json = serde_json::json!({
            "id": 1,
            "amount": "10.00",
            "description": "Legacy",
            "category": null,
            "date": "2023-12-01"
        });

        let expense: Expense = serde_json::from_value(json).unwrap();
        assert!(expense.category_ref().is_none());
        assert!(expense.created_at.is_none());
    }

    #[test]
    fn test_new_expense_serialization() {
        let payload = NewExpense {
            amount: Decimal::from_str("12.30").unwrap(),
            description: "Bus pass".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            category: Some(2),
        };

        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["amount"], "12.30");
        assert_eq!(value["date"], "2024-01-05");
        assert_eq!(value["category"], 2);
    }

    #[test]
    fn test_dashboard_accepts_strings_and_numbers() {
        let json = serde_json::json!({
            "total_expenses": "1250.00",
            "monthly_expenses": 300.5,
            "category_expenses": [
                {"category": "Travel", "amount": "200.5", "percentage": "66.72"},
                {"category": "Others", "amount": 0.0, "percentage": 0.0}
            ],
            "monthly_trend": [
                {"month": "February 2024", "amount": "950.0"},
                {"month": "March 2024", "amount": 300.5}
            ],
            "recent_expenses": []
        });

        let stats: DashboardStats = serde_json::from_value(json).unwrap();
        assert_eq!(stats.total_expenses, Decimal::from_str("1250.00").unwrap());
        assert_eq!(stats.monthly_expenses, Decimal::from_str("300.5").unwrap());
        assert_eq!(stats.category_expenses.len(), 2);
        assert_eq!(stats.monthly_trend[1].month, "March 2024");
    }

    #[test]
    fn test_auth_response_without_user_id() {
        let json = serde_json::json!({
            "message": "Login successful",
            "tokens": {"access": "t1", "refresh": "r1"},
            "user": {"username": "asha", "email": "asha@example.com"}
        });

        let response: AuthResponse = serde_json::from_value(json).unwrap();
        assert_eq!(response.tokens.access, "t1");
        assert_eq!(response.user.id, None);
    }
}
