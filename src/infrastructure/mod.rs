// Infrastructure layer - External dependencies and adapters
pub mod config;
pub mod fdsn_client;
pub mod http_response;
pub mod miniseed;
