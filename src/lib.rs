pub mod commands;
pub mod config;
pub mod db;
pub mod errors;
pub mod format;
pub mod handlers;
pub mod model;
pub mod processor;
