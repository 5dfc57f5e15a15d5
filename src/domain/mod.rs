pub mod api_config;
pub mod chat;
pub mod diagnosis;
pub mod document;
pub mod error;
pub mod route;
pub mod validation;
