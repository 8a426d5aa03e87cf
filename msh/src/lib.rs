pub mod config;
pub mod history;
pub mod input;
pub mod parser;
pub mod process;
pub mod prompt;
pub mod proxy;
pub mod repl;
pub mod shell;

pub use config::Config;
pub use history::History;
pub use shell::Shell;
