// Fortnox Connect - Library root for testing

pub mod config;
pub mod error;
pub mod auth;
pub mod http_client;
pub mod session;
pub mod middleware;
pub mod routes;
