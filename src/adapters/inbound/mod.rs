//! Inbound adapters translate external stimuli (CLI/HTTP) into application commands.

pub mod cli;
pub mod server;
