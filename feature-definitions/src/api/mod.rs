pub mod endpoint;
pub mod errors;
pub mod request_handler;
pub mod types;
