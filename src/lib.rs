pub mod api;
pub mod config;
pub mod conversation;
pub mod error;
pub mod inference;
pub mod prompts;
