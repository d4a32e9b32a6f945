pub mod commands;
pub mod handler;

pub use commands::{Cli, Commands};
pub use handler::CommandHandler;
