pub mod api;
pub mod bootstrap;
pub mod cli;
pub mod config;
pub mod content;
pub mod database;
pub mod error;
pub mod files;
pub mod identity;
pub mod moderation;
pub mod node;
pub mod notifications;
pub mod reactions;
pub mod reconcile;
pub mod relationships;
pub mod sessions;
pub mod telemetry;
pub mod users;
pub mod utils;
