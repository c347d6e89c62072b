pub mod auth;
pub mod elearning;
pub mod employee;
pub mod user;
