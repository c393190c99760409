// Presentation layer - HTTP surface for serve mode
pub mod app_state;
pub mod handlers;
