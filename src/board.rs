//! The rules authority for the single hosted game.
//!
//! Wraps a [`shakmaty`] position together with the bookkeeping the
//! coordinator needs on top of raw rules: SAN history for PGN export and a
//! repetition table for threefold detection. Moves come in and go out as LAN
//! (`e2e4`, `g7g8q`); validation always replays against a copy so a rejected
//! move can never corrupt the live position.

use std::collections::HashMap;

use shakmaty::fen::Fen;
use shakmaty::san::SanPlus;
use shakmaty::uci::UciMove;
use shakmaty::zobrist::{Zobrist64, ZobristHash};
use shakmaty::{CastlingMode, Chess, Color, EnPassantMode, Position};

use shared::{EndReason, Side};

use crate::error::RulesError;

/// A move that passed validation, in both notations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedMove {
    /// Normalized LAN (promotion pieces lowercased, castling as king move).
    pub lan: String,
    /// SAN with check/mate suffix, derived from the position it was played in.
    pub san: String,
}

/// Authoritative position plus move history.
pub struct Board {
    position: Chess,
    sans: Vec<String>,
    /// Occurrence counts of every position reached, keyed by Zobrist hash.
    seen: HashMap<Zobrist64, u32>,
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}

impl Board {
    /// A board at the canonical start position.
    pub fn new() -> Self {
        let position = Chess::default();
        let mut seen = HashMap::new();
        seen.insert(position.zobrist_hash(EnPassantMode::Legal), 1);
        Self {
            position,
            sans: Vec::new(),
            seen,
        }
    }

    /// A board at an arbitrary position. History starts empty, so PGN export
    /// and threefold counting only cover moves played from here on.
    pub fn from_fen(fen: &str) -> Result<Self, RulesError> {
        let parsed: Fen = fen
            .parse()
            .map_err(|_| RulesError::BadMove(fen.to_string()))?;
        let position: Chess = parsed
            .into_position(CastlingMode::Standard)
            .map_err(|_| RulesError::BadMove(fen.to_string()))?;
        let mut seen = HashMap::new();
        seen.insert(position.zobrist_hash(EnPassantMode::Legal), 1);
        Ok(Self {
            position,
            sans: Vec::new(),
            seen,
        })
    }

    /// FEN of the live position.
    pub fn fen(&self) -> String {
        Fen::from_position(self.position.clone(), EnPassantMode::Legal).to_string()
    }

    pub fn side_to_move(&self) -> Side {
        match self.position.turn() {
            Color::White => Side::White,
            Color::Black => Side::Black,
        }
    }

    /// Current full-move number (1 before White's first move).
    pub fn move_number(&self) -> u32 {
        self.position.fullmoves().get()
    }

    /// Validate a LAN move against a copy of the live position.
    pub fn verify(&self, lan: &str) -> Result<VerifiedMove, RulesError> {
        let uci: UciMove = lan
            .parse()
            .map_err(|_| RulesError::BadMove(lan.to_string()))?;
        let mv = uci.to_move(&self.position).map_err(|_| RulesError::Illegal {
            lan: lan.to_string(),
            fen: self.fen(),
        })?;
        let san = SanPlus::from_move(self.position.clone(), &mv).to_string();
        Ok(VerifiedMove {
            lan: mv.to_uci(CastlingMode::Standard).to_string(),
            san,
        })
    }

    /// Validate and play a LAN move on the live position.
    pub fn apply(&mut self, lan: &str) -> Result<VerifiedMove, RulesError> {
        let uci: UciMove = lan
            .parse()
            .map_err(|_| RulesError::BadMove(lan.to_string()))?;
        let mv = uci.to_move(&self.position).map_err(|_| RulesError::Illegal {
            lan: lan.to_string(),
            fen: self.fen(),
        })?;
        let verified = VerifiedMove {
            lan: mv.to_uci(CastlingMode::Standard).to_string(),
            san: SanPlus::from_move(self.position.clone(), &mv).to_string(),
        };
        self.position.play_unchecked(&mv);
        self.sans.push(verified.san.clone());
        *self
            .seen
            .entry(self.position.zobrist_hash(EnPassantMode::Legal))
            .or_insert(0) += 1;
        Ok(verified)
    }

    /// Terminal state of the live position, if any.
    ///
    /// Checked in a fixed priority order so that, e.g., a mate delivered on
    /// the 100th halfmove counts as checkmate rather than a rule draw.
    pub fn end_state(&self) -> Option<(EndReason, Option<Side>)> {
        if self.position.is_checkmate() {
            // The mated side is the one to move.
            let winner = self.side_to_move().opponent();
            return Some((EndReason::Checkmate, Some(winner)));
        }
        if self.position.is_stalemate() {
            return Some((EndReason::Stalemate, None));
        }
        let key = self.position.zobrist_hash(EnPassantMode::Legal);
        if self.seen.get(&key).copied().unwrap_or(0) >= 3 {
            return Some((EndReason::ThreefoldRepetition, None));
        }
        if self.position.is_insufficient_material() {
            return Some((EndReason::InsufficientMaterial, None));
        }
        if self.position.halfmoves() >= 100 {
            return Some((EndReason::DrawByRule, None));
        }
        None
    }

    /// PGN movetext of the history, without headers or a result token.
    pub fn pgn(&self) -> String {
        let mut out = String::new();
        for (i, san) in self.sans.iter().enumerate() {
            if i % 2 == 0 {
                if i > 0 {
                    out.push(' ');
                }
                out.push_str(&format!("{}. {}", i / 2 + 1, san));
            } else {
                out.push(' ');
                out.push_str(san);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

    #[test]
    fn test_new_board_is_start_position() {
        let board = Board::new();
        assert_eq!(board.fen(), START_FEN);
        assert_eq!(board.side_to_move(), Side::White);
        assert_eq!(board.move_number(), 1);
        assert!(board.end_state().is_none());
    }

    #[test]
    fn test_verify_does_not_mutate() {
        let board = Board::new();
        let mv = board.verify("e2e4").expect("e2e4 is legal");
        assert_eq!(mv.lan, "e2e4");
        assert_eq!(mv.san, "e4");
        assert_eq!(board.fen(), START_FEN, "verify must not touch the position");
    }

    #[test]
    fn test_apply_advances_position() {
        let mut board = Board::new();
        board.apply("e2e4").expect("e2e4 is legal");
        assert_eq!(board.side_to_move(), Side::Black);
        board.apply("e7e5").expect("e7e5 is legal");
        assert_eq!(board.move_number(), 2);
        assert!(board.fen().contains("4p3"), "black pawn should sit on e5");
    }

    #[test]
    fn test_illegal_and_garbage_moves_rejected() {
        let board = Board::new();
        assert!(matches!(
            board.verify("e2e5"),
            Err(RulesError::Illegal { .. })
        ));
        assert!(matches!(
            board.verify("not-a-move"),
            Err(RulesError::BadMove(_))
        ));
    }

    #[test]
    fn test_fools_mate_is_checkmate_for_black() {
        let mut board = Board::new();
        for lan in ["f2f3", "e7e5", "g2g4", "d8h4"] {
            board.apply(lan).expect("scripted move should be legal");
        }
        assert_eq!(
            board.end_state(),
            Some((EndReason::Checkmate, Some(Side::Black)))
        );
        assert_eq!(board.pgn(), "1. f3 e5 2. g4 Qh4#");
    }

    #[test]
    fn test_stalemate_detected() {
        // Black to move with no legal moves and no check.
        let board = Board::from_fen("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1").expect("valid FEN");
        assert_eq!(board.end_state(), Some((EndReason::Stalemate, None)));
    }

    #[test]
    fn test_insufficient_material_detected() {
        let board = Board::from_fen("8/8/4k3/8/8/3K4/8/8 w - - 0 1").expect("valid FEN");
        assert_eq!(
            board.end_state(),
            Some((EndReason::InsufficientMaterial, None))
        );
    }

    #[test]
    fn test_threefold_repetition_detected() {
        let mut board = Board::new();
        // Shuffle knights back and forth; the start position recurs twice,
        // reaching three total occurrences.
        for lan in [
            "g1f3", "g8f6", "f3g1", "f6g8", "g1f3", "g8f6", "f3g1", "f6g8",
        ] {
            board.apply(lan).expect("knight shuffle is legal");
        }
        assert_eq!(
            board.end_state(),
            Some((EndReason::ThreefoldRepetition, None))
        );
    }

    #[test]
    fn test_promotion_lan_round_trips() {
        let mut board = Board::from_fen("8/P6k/8/8/8/8/8/K7 w - - 0 1").expect("valid FEN");
        let mv = board.apply("a7a8q").expect("promotion is legal");
        assert_eq!(mv.lan, "a7a8q");
        assert_eq!(mv.san, "a8=Q");
    }

    #[test]
    fn test_castling_lan_normalized_as_king_move() {
        let board =
            Board::from_fen("r3k2r/pppppppp/8/8/8/8/PPPPPPPP/R3K2R w KQkq - 0 1").expect("FEN");
        let mv = board.verify("e1g1").expect("short castle is legal");
        assert_eq!(mv.lan, "e1g1");
        assert_eq!(mv.san, "O-O");
    }
}
