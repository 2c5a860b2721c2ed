//! HTTP/1.1 over a raw byte stream.
//!
//! - **`connection`**: per-connection state machine and the buffered reader
//! - **`parser`**: finds the header terminator and splits the request head
//! - **`request`**: parsed request with ordered headers
//! - **`router`**: method + path to handler selection
//! - **`handlers`**: root probe, echo, user-agent reflection, file serving
//! - **`response`**: status codes and response builder
//! - **`writer`**: wire serialization
//!
//! # Connection State Machine
//!
//! ```text
//!        ┌─────────────┐
//!        │   Reading   │ ← Wait for a full request head (idle timeout per read)
//!        └──────┬──────┘
//!               │ Request parsed (or 400 for a malformed one)
//!               ▼
//!        ┌──────────────────┐
//!        │   Processing     │ ← Route and run the handler
//!        └──────┬───────────┘
//!               │ Response ready
//!               ▼
//!        ┌──────────────────┐
//!        │    Writing       │ ← One write of the serialized response
//!        └──────┬───────────┘
//!               │ Response sent
//!               ├─ GET + Connection: keep-alive → Reading
//!               └─ otherwise → Closed
//! ```

pub mod connection;
pub mod handlers;
pub mod parser;
pub mod request;
pub mod response;
pub mod router;
pub mod writer;
