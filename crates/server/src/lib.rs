pub mod app_state;
pub mod auth;
pub mod billing;
pub mod config;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod logging;
pub mod matching;
pub mod models;
pub mod payments;
pub mod schema;
pub mod time;
pub mod validate;
