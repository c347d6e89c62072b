use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct Module {
    pub id: i64,
    pub title: String,
    pub category_id: Option<i64>,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct Task {
    pub id: i64,
    pub module_id: i64,
    pub title: String,
    pub description: String,
    pub difficulty: String,
    pub task_type: String,
    pub order: i32,
}
