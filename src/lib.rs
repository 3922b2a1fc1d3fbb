// Library exports for testing
pub mod admission;
pub mod audit;
pub mod auth;
pub mod config;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod state;
pub mod storage;
