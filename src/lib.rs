pub mod auth;
pub mod cleanup;
pub mod config;
pub mod error;
pub mod handlers;
pub mod ingest;
pub mod models;
pub mod routes;
pub mod store;
pub mod system_info;
pub mod thumbnail;
