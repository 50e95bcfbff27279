pub mod artifact;
pub mod bridge;
pub mod config;
pub mod errors;
pub mod registry;
pub mod sandbox;
pub mod server;
