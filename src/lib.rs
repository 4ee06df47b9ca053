pub mod app;
pub mod auth;
pub mod clock;
pub mod config;
pub mod database;
pub mod error;
pub mod functions;
pub mod handlers;
pub mod middleware;
pub mod security;
