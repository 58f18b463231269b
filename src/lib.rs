pub mod auth;
pub mod config;
pub mod contact;
pub mod creditors;
pub mod db;
pub mod error;
pub mod jobs;
pub mod models;
pub mod routes;
pub mod schema;
pub mod state;
pub mod store;
pub mod ticketing;
pub mod workers;

pub use workers::{default_handlers, Worker};
