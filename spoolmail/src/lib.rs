pub mod cli;
pub mod config;
pub mod controller;

pub use cli::Cli;
pub use config::{Config, StoreConfig};
pub use controller::Spoolmail;
