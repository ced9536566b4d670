//! Command-line chat client for the Hiroba relay server.

pub mod error;

mod domain;
mod formatter;
mod runner;
mod session;
mod ui;

pub use runner::run_client;
