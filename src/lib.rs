// Library entry point for social-feed
// Exposes modules for testing

pub mod api;
pub mod auth;
pub mod models;
pub mod store;
