//! Session lifecycle: connects, disconnects, grace windows, side changes,
//! kicks and resets.
//!
//! Identity is durable: a socket dropping starts a 20-second grace timer
//! instead of removing the session, and a reconnect with the same PID simply
//! reattaches. Only grace expiry (or a passed kick vote) removes a session,
//! with all the roster, proposal, finalization and abandonment consequences
//! that follow.

use shared::{EndReason, ServerMessage, Side, Status, Team};
use tokio::sync::mpsc;
use tracing::info;

use crate::game::actor::{Command, ConnectError, ConnectedClient, Connection, Coordinator};
use crate::session::SessionRegistry;

impl Coordinator {
    /// A socket finished its handshake, possibly resuming a known session.
    pub(crate) fn handle_connect(
        &mut self,
        pid_hint: Option<String>,
        name_hint: Option<String>,
        tx: mpsc::UnboundedSender<ServerMessage>,
    ) -> Result<ConnectedClient, ConnectError> {
        // The blacklist gate runs before any state is touched.
        if let Some(hint) = &pid_hint {
            if self.registry.is_blacklisted(hint) {
                info!(pid = %hint, "refused blacklisted connection");
                return Err(ConnectError::Blacklisted);
            }
        }

        let pid = match pid_hint {
            Some(known) if self.registry.contains(&known) => {
                // Resuming: a pending removal no longer applies.
                self.pending_removals.remove(&known);
                known
            }
            _ => {
                let fresh = SessionRegistry::mint_pid();
                self.registry.create(&fresh, name_hint);
                fresh
            }
        };

        self.next_conn_id += 1;
        let conn_id = self.next_conn_id;
        // A newer socket for the same PID supersedes the older one; dropping
        // the old sender tears the stale socket down.
        self.connections.insert(pid.clone(), Connection { conn_id, tx });

        let name = self.registry.name_of(&pid);
        info!(%pid, %name, "client connected");

        self.replay_state_to(&pid, &name);
        self.broadcast_roster();

        Ok(ConnectedClient { pid, name, conn_id })
    }

    /// Everything a (re)connecting client needs to rebuild its view.
    fn replay_state_to(&self, pid: &str, name: &str) {
        self.unicast(
            pid,
            ServerMessage::Session {
                id: pid.to_string(),
                name: name.to_string(),
            },
        );
        self.unicast(
            pid,
            ServerMessage::GameStatusUpdate {
                status: self.game.status,
            },
        );
        self.unicast(pid, self.clock_message());

        if self.game.status != Status::Lobby {
            self.unicast(
                pid,
                ServerMessage::GameStarted {
                    move_number: self.game.move_number,
                    side: self.game.side_to_move(),
                    proposals: self.game.proposals.clone(),
                },
            );
            self.unicast(
                pid,
                ServerMessage::PositionUpdate {
                    fen: self.game.board.fen(),
                },
            );
            if let Some(side) = self.game.draw_offer {
                self.unicast(pid, ServerMessage::DrawOfferUpdate { side: Some(side) });
            }
            if self.game.status == Status::Over {
                if let Some((reason, winner)) = self.game.end {
                    self.unicast(
                        pid,
                        ServerMessage::GameOver {
                            reason,
                            winner,
                            pgn: self.game.board.pgn(),
                        },
                    );
                }
            }
        }

        if let Some(side) = self.registry.get(pid).and_then(|s| s.team.side()) {
            self.send_team_vote_to(pid, side);
        }
    }

    /// A socket went away. The session lingers for the grace window.
    pub(crate) fn handle_disconnect(&mut self, pid: &str, conn_id: u64) {
        match self.connections.get(pid) {
            Some(connection) if connection.conn_id == conn_id => {}
            // A newer socket owns this PID now, or it is already gone.
            _ => return,
        }
        self.connections.remove(pid);
        info!(pid, "client disconnected, grace window started");
        self.broadcast_roster();

        let generation = self.next_generation();
        self.pending_removals.insert(pid.to_string(), generation);
        let tx = self.cmd_tx.clone();
        let grace = self.config.disconnect_grace;
        let pid = pid.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let _ = tx.send(Command::GraceExpired { pid, generation });
        });

        // The expected set just shrank; the turn may be complete without them.
        self.try_finalize();
    }

    pub(crate) fn grace_expired(&mut self, pid: &str, generation: u64) {
        if self.pending_removals.get(pid) != Some(&generation) {
            return;
        }
        self.pending_removals.remove(pid);
        if self.is_connected(pid) {
            return;
        }
        info!(pid, "grace expired, removing session");
        self.remove_session(pid);
    }

    /// Remove a session outright and apply every consequence.
    pub(crate) fn remove_session(&mut self, pid: &str) {
        if self.registry.remove(pid).is_none() {
            return;
        }
        self.game.white_team.remove(pid);
        self.game.black_team.remove(pid);
        self.drop_proposal_of(pid);
        self.broadcast_roster();
        if self.game.is_active() {
            self.check_abandonment();
            self.try_finalize();
        }
    }

    pub(crate) fn drop_proposal_of(&mut self, pid: &str) {
        if let Some(proposal) = self.game.remove_proposal(pid) {
            self.broadcast(ServerMessage::ProposalRemoved {
                move_number: proposal.move_number,
                side: proposal.side,
                id: proposal.id,
            });
        }
    }

    /// While a game runs, a side with nobody left on it loses by walkover.
    pub(crate) fn check_abandonment(&mut self) {
        if !self.game.is_active() {
            return;
        }
        let winner = match (
            self.game.white_team.is_empty(),
            self.game.black_team.is_empty(),
        ) {
            (false, false) => return,
            (true, true) => None,
            (true, false) => Some(Side::Black),
            (false, true) => Some(Side::White),
        };
        self.end_game(EndReason::Abandonment, winner);
    }

    /// `join_side`: move a session between teams (or to the bench).
    pub(crate) fn handle_join_side(&mut self, pid: &str, team: Team) {
        let Some(old_team) = self.registry.get(pid).map(|s| s.team) else {
            return;
        };
        if old_team == team {
            return;
        }
        self.registry.set_team(pid, team);
        info!(pid, ?team, "side change");

        if self.game.status != Status::Lobby {
            self.game.white_team.remove(pid);
            self.game.black_team.remove(pid);
            if let Some(side) = team.side() {
                self.game.team_mut(side).insert(pid.to_string());
            }
            // Walking off a side takes your proposal with you.
            if old_team.side().is_some() {
                self.drop_proposal_of(pid);
            }
        }

        match team.side() {
            Some(side) => self.send_team_vote_to(pid, side),
            None => {
                if let Some(old_side) = old_team.side() {
                    self.unicast(
                        pid,
                        ServerMessage::TeamVoteUpdate {
                            team: old_side,
                            vote: None,
                        },
                    );
                }
            }
        }

        self.broadcast_roster();
        if self.game.is_active() {
            self.check_abandonment();
            self.try_finalize();
        }
    }

    pub(crate) fn handle_set_name(&mut self, pid: &str, name: String) {
        if self.registry.rename(pid, name) {
            self.broadcast_roster();
        }
    }

    /// A passed kick vote: ban, remove, and cut the cord.
    pub(crate) fn apply_kick(&mut self, target: &str) {
        let name = self.registry.name_of(target);
        info!(target, %name, "kick vote passed");
        self.registry.blacklist(target);
        self.pending_removals.remove(target);
        // Dropping the sender closes the socket from under them.
        self.connections.remove(target);
        self.remove_session(target);
        self.system_chat(format!("{name} was kicked and banned."));
    }

    /// A passed reset vote: back to the lobby, fresh board, fresh engine.
    ///
    /// The blacklist and every session's team assignment survive, so players
    /// rejoin with the roles they had.
    pub(crate) fn apply_reset(&mut self) {
        info!("reset vote passed, returning to lobby");

        self.game.reset(self.config.initial_clock_secs);

        // The old engine belongs to the old game. Replace it off-loop.
        let old = self.arbiter.clone();
        let factory = self.factory.clone();
        let tx = self.cmd_tx.clone();
        let epoch = self.game.epoch;
        tokio::spawn(async move {
            old.quit().await;
            let result = factory.create().await;
            let _ = tx.send(Command::ArbiterReplaced { epoch, result });
        });

        self.cancel_team_votes();
        if self.votes.kick.take().is_some() {
            self.broadcast(ServerMessage::KickVoteUpdate { vote: None });
        }
        if self.votes.reset.take().is_some() {
            self.broadcast(ServerMessage::ResetVoteUpdate { vote: None });
        }

        self.broadcast(ServerMessage::GameReset);
        self.broadcast(self.clock_message());
        self.system_chat("The game was reset.");
    }
}
