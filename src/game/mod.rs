//! The game coordinator and everything it drives.
//!
//! [`actor`] owns the event loop; [`turn`], [`clock`], [`votes`] and
//! [`lifecycle`] are facets of the same actor, split by protocol concern.
//! [`state`] is the passive aggregate they all mutate.

pub mod actor;
pub mod clock;
pub mod lifecycle;
pub mod state;
pub mod turn;
pub mod votes;
