pub mod fs;
pub mod shell;

pub use fs::*;
pub use shell::{clean_path, escape_percent, quote, quote_path, shell_word};
