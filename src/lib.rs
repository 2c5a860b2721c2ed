//! plainhttp - a minimal HTTP/1.1 server on raw TCP sockets.
//!
//! Serves four routes: `/` (probe), `/echo/{text}`, `/user-agent` and
//! `/files/{name}` from a configured directory.

pub mod config;
pub mod fs;
pub mod http;
pub mod server;
