//env
pub const DISCORD_TOKEN_NOT_SET: &str = "DISCORD_TOKEN not set!";
pub const PROPOSALS_CHANNEL_ID_NOT_SET: &str = "PROPOSALS_CHANNEL_ID not set!";
pub const TALLY_API_KEY_NOT_SET: &str = "TALLY_API_KEY not set!";
pub const SYNC_INTERVAL_INVALID: &str = "SYNC_INTERVAL_MINUTES must be a positive integer";

//db
pub const DATABASE_CONNECTION_FAILED: &str = "Failed to connect to database";
pub const DATABASE_SCHEMA_FAILED: &str = "Failed to create database schema";
pub const DATABASE_ERROR: &str = "Database error";

//http
pub const HTTP_CLIENT_BUILD_FAILED: &str = "Failed to build HTTP client";
