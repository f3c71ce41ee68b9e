pub mod chat;
pub mod config;
pub mod extract;
pub mod models;
pub mod ollama;
pub mod registry;
pub mod search;
pub mod server;
pub mod storage;

pub use config::AppConfig;
pub use server::run_server;
