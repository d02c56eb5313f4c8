#![warn(clippy::uninlined_format_args)]

pub mod adapters;
pub mod application;
pub mod config;
pub mod core;
pub mod paths;
pub mod review_export;

pub use adapters::inbound::cli::{Cli, Commands};
