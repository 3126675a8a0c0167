//! Types shared between the teamchess server and its clients.
//!
//! The only contents are the wire protocol definitions; keeping them in a
//! dedicated crate lets a native or wasm client depend on the exact message
//! shapes the server speaks without pulling in the server itself.

pub mod protocol;

pub use protocol::*;
