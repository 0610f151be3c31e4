pub mod api;
pub mod config;
pub mod error;
pub mod eta;
pub mod geo;
pub mod lifecycle;
pub mod models;
pub mod notify;
pub mod observability;
pub mod state;
pub mod store;
pub mod views;
