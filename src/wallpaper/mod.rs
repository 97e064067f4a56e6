pub mod cli;
pub mod commands;
pub mod config;
pub mod crop;
pub mod error;
pub mod goals;
pub mod macos;
pub mod models;
pub mod persistence;
pub mod state;
pub mod store;
pub mod theme;
