//! Error types for the game coordinator.
//!
//! Protocol errors carry the exact strings reported back to clients in
//! `error` events; everything else is internal and only logged.

use thiserror::Error;

/// Errors reported to the requesting client.
///
/// Each variant's message is part of the client-facing contract, so the
/// wording here is deliberate and stable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GameError {
    #[error("Not accepting moves right now.")]
    NotAcceptingMoves,

    #[error("Only the White team can start the game.")]
    WhiteStarts,

    #[error("Not your turn.")]
    NotYourTurn,

    #[error("Already moved.")]
    AlreadyMoved,

    #[error("Illegal move.")]
    IllegalMove,

    #[error("Both teams must have at least one player.")]
    TeamsIncomplete,

    #[error("You are not on a team.")]
    NotOnTeam,

    #[error("A vote is already in progress.")]
    VoteInProgress,

    #[error("There is no active vote.")]
    NoActiveVote,

    #[error("You are not eligible to vote.")]
    NotEligible,

    #[error("You already voted.")]
    AlreadyVoted,

    #[error("A draw has already been offered.")]
    DrawAlreadyOffered,

    #[error("There is no draw offer to accept.")]
    NoDrawOffer,

    #[error("You cannot start a vote against yourself.")]
    SelfKick,

    #[error("No such player.")]
    UnknownPlayer,

    #[error("The game has not started.")]
    GameNotStarted,
}

/// Result alias for handler-level operations.
pub type GameResult<T> = Result<T, GameError>;

/// Failures inside the rules authority.
#[derive(Error, Debug)]
pub enum RulesError {
    #[error("unparseable move: {0}")]
    BadMove(String),

    #[error("illegal move {lan} in position {fen}")]
    Illegal { lan: String, fen: String },
}

/// Failures of the engine subprocess.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("engine I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("engine terminated unexpectedly")]
    Terminated,

    #[error("engine produced no usable reply")]
    NoReply,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_strings_are_stable() {
        assert_eq!(
            GameError::NotAcceptingMoves.to_string(),
            "Not accepting moves right now."
        );
        assert_eq!(GameError::NotYourTurn.to_string(), "Not your turn.");
        assert_eq!(GameError::AlreadyMoved.to_string(), "Already moved.");
        assert_eq!(GameError::IllegalMove.to_string(), "Illegal move.");
        assert_eq!(
            GameError::TeamsIncomplete.to_string(),
            "Both teams must have at least one player."
        );
        assert_eq!(
            GameError::WhiteStarts.to_string(),
            "Only the White team can start the game."
        );
    }
}
