pub mod alerts;
pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod notify;
pub mod registry;
pub mod settings_sync;
pub mod state;
pub mod telemetry;
pub mod users;
