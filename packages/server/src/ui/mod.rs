//! Axum router, handlers and server runner.

mod extract;
mod handler;
mod server;
mod signal;
pub mod state;

pub use server::{Collaborators, Server};
pub use signal::shutdown_signal;
