// HTTP surface for the extract and load services

pub mod auth;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;

pub use handlers::{ExtractState, LoadState};
pub use server::ApiServer;
