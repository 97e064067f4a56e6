pub mod command;
pub mod command_log;
pub mod config;
pub mod display;
pub mod paths;
pub mod shell;
