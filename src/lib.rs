pub mod checker;
pub mod cli;
pub mod config;
pub mod core;
pub mod engine;
pub mod exit;
pub mod logs;
pub mod platform;
pub mod runner;
pub mod staging;
pub mod ui;
