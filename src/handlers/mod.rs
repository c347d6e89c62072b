pub mod auth;
pub mod content;
pub mod db_overview;
pub mod health;
pub mod microsoft_auth;
pub mod storage;
pub mod tasks;
