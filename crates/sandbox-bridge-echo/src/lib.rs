//! Echo channel for sandbox-bridge.
//!
//! A local request/response protocol over a Unix socket addressed by a
//! well-known filesystem path. Frames are UTF-8 text terminated by `\n`; the
//! server answers every request frame `p` with `ECHO: p`.
//!
//! ```text
//! backend unit                       echo server
//! ┌──────────────┐  "Hello\n"       ┌──────────────────┐
//! │  EchoClient  │ ───────────────> │ LineBuffer per   │
//! │              │ <─────────────── │ connection       │
//! └──────────────┘  "ECHO: Hello\n" └──────────────────┘
//! ```

mod client;
mod error;
mod server;

pub use client::{DEFAULT_TIMEOUT, EchoClient};
pub use error::EchoError;
pub use server::{EchoServer, echo_response, serve_connection};

/// Prefix the server prepends to every echoed payload.
pub const ECHO_PREFIX: &str = "ECHO: ";
