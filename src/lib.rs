pub mod config;
pub mod error;
pub mod ethereum;
pub mod registry;
pub mod server;
pub mod wallet;
