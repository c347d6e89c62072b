pub mod auth;
pub mod jwt;
pub mod s3;
pub mod validation;
