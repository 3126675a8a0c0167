//! The turn protocol: proposal collection, quorum, arbitration, commit.
//!
//! A turn starts when the first legal White submission leaves the lobby,
//! collects one proposal per connected teammate on the side to move, hands
//! the candidate list to the engine once everyone has spoken, and commits
//! the winning move. All entry points run inside the coordinator actor.

use shared::{EndReason, ProposalInfo, Selection, ServerMessage, Side, Status, Team};
use tracing::{error, info};

use crate::error::{EngineError, GameError, GameResult};
use crate::game::actor::{Command, Coordinator};

impl Coordinator {
    /// Handle `play_move` from a client.
    pub(crate) fn handle_play_move(&mut self, pid: &str, lan: &str) -> GameResult<()> {
        match self.game.status {
            Status::Lobby => self.start_game_with(pid, lan),
            Status::AwaitingProposals => self.submit_proposal(pid, lan),
            Status::FinalizingTurn | Status::Over => Err(GameError::NotAcceptingMoves),
        }
    }

    /// First move of the game: only White may play it, and both rosters are
    /// frozen into the live game at this instant.
    fn start_game_with(&mut self, pid: &str, lan: &str) -> GameResult<()> {
        let session = self.registry.get(pid).ok_or(GameError::NotYourTurn)?;
        if session.team != Team::White {
            return Err(GameError::WhiteStarts);
        }

        let white = self.registry.pids_on_team(Team::White);
        let black = self.registry.pids_on_team(Team::Black);
        if white.is_empty() || black.is_empty() {
            return Err(GameError::TeamsIncomplete);
        }

        let verified = self
            .game
            .board
            .verify(lan)
            .map_err(|_| GameError::IllegalMove)?;

        self.game.white_team = white;
        self.game.black_team = black;
        self.game.status = Status::AwaitingProposals;
        self.game.move_number = self.game.board.move_number();
        self.clock_restarted = true;
        info!(starter = pid, "game started");
        self.broadcast(ServerMessage::GameStatusUpdate {
            status: Status::AwaitingProposals,
        });

        self.record_proposal(pid, verified.lan, verified.san);
        self.try_finalize();
        Ok(())
    }

    fn submit_proposal(&mut self, pid: &str, lan: &str) -> GameResult<()> {
        let side = self.game.side_to_move();
        if !self.game.team(side).contains(pid) {
            return Err(GameError::NotYourTurn);
        }
        if self.game.proposal_of(pid).is_some() {
            return Err(GameError::AlreadyMoved);
        }
        let verified = self
            .game
            .board
            .verify(lan)
            .map_err(|_| GameError::IllegalMove)?;

        self.record_proposal(pid, verified.lan, verified.san);
        self.try_finalize();
        Ok(())
    }

    fn record_proposal(&mut self, pid: &str, lan: String, san: String) {
        let proposal = ProposalInfo {
            id: pid.to_string(),
            // Captured at submission; later renames do not rewrite history.
            name: self.registry.name_of(pid),
            move_number: self.game.move_number,
            side: self.game.side_to_move(),
            lan,
            san,
        };
        self.broadcast(ServerMessage::MoveSubmitted {
            proposal: proposal.clone(),
        });
        self.game.add_proposal(proposal);
    }

    /// If every connected teammate on the side to move has proposed, freeze
    /// the turn and ask the engine to arbitrate.
    ///
    /// Called after every event that can change the expected set: proposal
    /// submission, side changes, disconnects and session removals.
    pub(crate) fn try_finalize(&mut self) {
        if self.game.status != Status::AwaitingProposals {
            return;
        }
        if !self.game.quorum_met(&self.connected_pids()) {
            return;
        }

        self.game.status = Status::FinalizingTurn;
        self.broadcast(ServerMessage::GameStatusUpdate {
            status: Status::FinalizingTurn,
        });

        let fen = self.game.board.fen();
        let candidates: Vec<String> = self.game.proposals.iter().map(|p| p.lan.clone()).collect();
        let epoch = self.game.epoch;
        let arbiter = self.arbiter.clone();
        let cmd_tx = self.cmd_tx.clone();
        info!(%fen, candidates = candidates.len(), "turn frozen, querying engine");
        tokio::spawn(async move {
            let result = arbiter.choose(&fen, &candidates).await;
            let _ = cmd_tx.send(Command::EngineResolved { epoch, result });
        });
    }

    /// The engine answered (or failed). Commit the turn.
    pub(crate) fn engine_resolved(&mut self, epoch: u64, result: Result<String, EngineError>) {
        if epoch != self.game.epoch {
            // A reset happened while the engine was thinking.
            return;
        }

        let lan = match result {
            Ok(lan) => lan,
            Err(err) => {
                error!(%err, "engine failed to arbitrate");
                self.recover_turn();
                return;
            }
        };

        // Abandonment (or a vote) may have ended the game while the engine
        // was thinking. The game-over broadcast has already gone out and the
        // proposals are gone with it; the arbitrated move still lands on the
        // board so the final position reflects it.
        if self.game.status == Status::Over {
            match self.game.board.apply(&lan) {
                Ok(_) => self.broadcast(ServerMessage::PositionUpdate {
                    fen: self.game.board.fen(),
                }),
                Err(err) => {
                    error!(%err, %lan, "late engine move no longer applies");
                }
            }
            return;
        }

        let Some(winner) = self.game.proposal_of_lan(&lan).cloned() else {
            error!(%lan, "engine returned a move nobody proposed");
            self.recover_turn();
            return;
        };

        let mover = winner.side;
        let remaining_before = self.game.clock.get(mover);

        let applied = match self.game.board.apply(&winner.lan) {
            Ok(applied) => applied,
            Err(err) => {
                error!(%err, fen = %self.game.board.fen(), lan = %winner.lan,
                    "rules authority rejected the arbitrated move");
                self.recover_turn();
                return;
            }
        };

        if remaining_before <= self.config.low_time_threshold_secs {
            self.game
                .clock
                .credit(mover, self.config.low_time_bonus_secs);
        }
        self.broadcast(self.clock_message());

        let candidates = std::mem::take(&mut self.game.proposals);
        let fen = self.game.board.fen();
        self.broadcast(ServerMessage::MoveSelected {
            selection: Selection {
                id: winner.id.clone(),
                name: winner.name.clone(),
                move_number: winner.move_number,
                side: mover,
                lan: applied.lan,
                san: applied.san,
                fen: fen.clone(),
                candidates,
            },
        });

        if let Some((reason, winner_side)) = self.game.board.end_state() {
            self.end_game(reason, winner_side);
            return;
        }

        self.game.move_number = self.game.board.move_number();
        self.game.status = Status::AwaitingProposals;
        self.clock_restarted = true;
        self.broadcast(ServerMessage::TurnChange {
            move_number: self.game.move_number,
            side: self.game.side_to_move(),
        });
        self.broadcast(ServerMessage::GameStatusUpdate {
            status: Status::AwaitingProposals,
        });
        self.broadcast(ServerMessage::PositionUpdate { fen });
    }

    /// Engine or rules failure mid-finalization: scrap the turn's proposals
    /// and go back to collecting. The game itself survives.
    fn recover_turn(&mut self) {
        self.system_chat("System error: move could not be processed.");
        if self.game.status != Status::FinalizingTurn {
            return;
        }
        self.game.clear_proposals();
        self.game.status = Status::AwaitingProposals;
        self.clock_restarted = true;
        self.broadcast(ServerMessage::GameStatusUpdate {
            status: Status::AwaitingProposals,
        });
    }

    /// Transition to `Over` and tell everyone why.
    pub(crate) fn end_game(&mut self, reason: EndReason, winner: Option<Side>) {
        if self.game.status == Status::Over {
            return;
        }
        info!(?reason, ?winner, "game over");
        self.game.status = Status::Over;
        self.game.end = Some((reason, winner));
        self.game.clear_proposals();

        // Draw offers and team votes die with the game; kick and reset votes
        // are about the room, not the game, and keep running.
        if self.game.draw_offer.take().is_some() {
            self.broadcast(ServerMessage::DrawOfferUpdate { side: None });
        }
        self.cancel_team_votes();

        self.broadcast(ServerMessage::GameStatusUpdate {
            status: Status::Over,
        });
        self.broadcast(ServerMessage::GameOver {
            reason,
            winner,
            pgn: self.game.board.pgn(),
        });
    }
}
