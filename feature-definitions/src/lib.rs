pub mod api;
pub mod config;
pub mod encryption;
pub mod environments;
pub mod features;
pub mod metrics;
pub mod router;
pub mod server;
pub mod store;
pub mod webhooks;

// Shared with the integration tests, so it is compiled into the library
pub mod test_utils;
