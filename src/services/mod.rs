pub mod cloud_storage;
pub mod content_orchestration;
pub mod content_repository;
pub mod directory;
pub mod docx;
pub mod employee_auth;
pub mod identity;
pub mod identity_provider;
pub mod oauth_state;
pub mod roles;
pub mod token_manager;
pub mod token_service;
pub mod word_extraction;
pub mod word_processing;
