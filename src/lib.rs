pub mod api;
pub mod auth;
pub mod db;
pub mod models;
pub mod server;
pub mod storage;
pub mod types;
pub mod validation;
