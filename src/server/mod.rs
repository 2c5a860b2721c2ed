//! Listening and connection dispatch.
//!
//! The accept loop in [`listener::serve`] is written against the [`Listener`]
//! trait so the same code runs over TCP and over the in-memory transport in
//! [`memory`].

pub mod listener;
pub mod memory;

pub use listener::{bind, serve, serve_until_shutdown, Listener, ACCEPT_ERROR_BACKOFF};
pub use memory::{memory_listener, MemoryConnector, MemoryListener};

use crate::config::Config;

/// Read-only state shared by every connection task.
#[derive(Debug)]
pub struct ServerContext<F> {
    pub config: Config,
    pub fs: F,
}

impl<F> ServerContext<F> {
    pub fn new(config: Config, fs: F) -> Self {
        Self { config, fs }
    }
}
