//! Teamchess server library.
//!
//! One process hosts exactly one cooperative team chess game: every player on
//! the side to move proposes a move, an embedded UCI engine arbitrates between
//! the proposals, and timed intra-team votes drive resignations, draw offers,
//! kicks and resets. All game state lives inside a single coordinator actor;
//! the WebSocket layer in [`ws`] only translates frames to and from it.

pub mod board;
pub mod config;
pub mod engine;
pub mod error;
pub mod game;
pub mod session;
pub mod ws;

pub use config::ServerConfig;
pub use game::actor::CoordinatorHandle;
