use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Employee row joined with its department and position.
#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct EmployeeRecord {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub department_id: i64,
    pub department_name: String,
    pub position_id: i64,
    pub position_title: String,
    pub max_working_hours: i32,
    pub is_active: bool,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct Tool {
    pub id: i64,
    pub slug: String,
    pub name: String,
    pub description: String,
    pub frontend_url: String,
    pub is_active: bool,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct ToolAccess {
    pub employee_id: i64,
    pub tool_id: i64,
    pub granted_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl ToolAccess {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(true, |expires| expires > now)
    }
}
