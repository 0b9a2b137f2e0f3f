pub mod error;
pub mod config;
pub mod files;
pub mod tabular;
pub mod events;
pub mod server;
pub mod client;
