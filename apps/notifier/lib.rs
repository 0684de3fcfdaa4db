pub mod admin;
pub mod channel;
pub mod config;
pub mod db_handler;
pub mod discord_api;
pub mod display;
pub mod models;
pub mod render;
pub mod scheduler;
pub mod source;
pub mod store;
pub mod sync_engine;
pub mod tally_api;

pub use sync_engine::{CycleReport, SyncConfig, SyncEngine, SyncError};
