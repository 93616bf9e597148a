//! Client-facing control protocol.
//!
//! Clients send JSON control messages (`ping`, `message`) and receive JSON
//! event messages (`pong`, `output`, `complete`, `error`). Both directions
//! are modelled as closed enums and matched exhaustively.

mod codec;
mod types;

pub use codec::{decode, decode_str};
pub use types::*;
