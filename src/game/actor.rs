//! The game coordinator actor.
//!
//! Every transport event, timer firing and engine reply funnels into one
//! mpsc-serialized task that owns all mutable state. Handlers mutate state
//! and push broadcasts onto per-client outbound queues; nothing else in the
//! process touches the game. Timer callbacks re-enter as commands stamped
//! with a generation so a cancelled timer can never act on fresh state.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use shared::{ClientMessage, PlayerEntry, ServerMessage, Side, Status, Team};
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::engine::{ArbiterFactory, MoveArbiter};
use crate::error::EngineError;
use crate::game::state::GameState;
use crate::game::votes::{VoteBook, VoteSlot};
use crate::session::SessionRegistry;

/// Everything that can happen to the coordinator, in one closed set.
pub enum Command {
    /// A transport socket finished its handshake.
    Connect {
        pid: Option<String>,
        name: Option<String>,
        tx: mpsc::UnboundedSender<ServerMessage>,
        reply: oneshot::Sender<Result<ConnectedClient, ConnectError>>,
    },
    /// A transport socket went away.
    Disconnect { pid: String, conn_id: u64 },
    /// An inbound message from an authenticated client.
    Client { pid: String, message: ClientMessage },
    /// A disconnect grace window ran out.
    GraceExpired { pid: String, generation: u64 },
    /// A vote deadline ran out.
    VoteExpired { slot: VoteSlot, generation: u64 },
    /// The engine picked a move (or failed trying).
    EngineResolved {
        epoch: u64,
        result: Result<String, EngineError>,
    },
    /// A replacement engine finished spawning after a reset.
    ArbiterReplaced {
        epoch: u64,
        result: Result<Arc<dyn MoveArbiter>, EngineError>,
    },
    Shutdown,
}

/// Identity handed back to the transport layer on a successful connect.
#[derive(Debug, Clone)]
pub struct ConnectedClient {
    pub pid: String,
    pub name: String,
    pub conn_id: u64,
}

/// Why a connection was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectError {
    /// The presented PID is banned; the transport must drop the socket.
    Blacklisted,
    /// The coordinator is gone (process shutting down).
    Closed,
}

pub(crate) struct Connection {
    pub conn_id: u64,
    pub tx: mpsc::UnboundedSender<ServerMessage>,
}

/// Cloneable front door to the coordinator task.
#[derive(Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl CoordinatorHandle {
    /// Register a socket. `Err(Blacklisted)` means close it immediately.
    pub async fn connect(
        &self,
        pid: Option<String>,
        name: Option<String>,
        out: mpsc::UnboundedSender<ServerMessage>,
    ) -> Result<ConnectedClient, ConnectError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Connect {
                pid,
                name,
                tx: out,
                reply,
            })
            .map_err(|_| ConnectError::Closed)?;
        rx.await.map_err(|_| ConnectError::Closed)?
    }

    pub fn disconnect(&self, pid: String, conn_id: u64) {
        let _ = self.tx.send(Command::Disconnect { pid, conn_id });
    }

    pub fn client_message(&self, pid: String, message: ClientMessage) {
        let _ = self.tx.send(Command::Client { pid, message });
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(Command::Shutdown);
    }
}

/// The actor. Owns the registry, the game, the votes and the sockets.
pub struct Coordinator {
    pub(crate) config: ServerConfig,
    pub(crate) registry: SessionRegistry,
    pub(crate) game: GameState,
    pub(crate) votes: VoteBook,
    pub(crate) connections: HashMap<String, Connection>,
    pub(crate) arbiter: Arc<dyn MoveArbiter>,
    pub(crate) factory: Arc<dyn ArbiterFactory>,
    /// Self-sender used by spawned timer tasks and engine queries.
    pub(crate) cmd_tx: mpsc::UnboundedSender<Command>,
    /// Live grace timers: PID → generation of the pending removal.
    pub(crate) pending_removals: HashMap<String, u64>,
    pub(crate) next_generation: u64,
    pub(crate) next_conn_id: u64,
    /// Set when the clock should start counting from a full second again.
    pub(crate) clock_restarted: bool,
}

impl Coordinator {
    /// Spawn the coordinator task and return a handle to it.
    pub fn spawn(
        config: ServerConfig,
        arbiter: Arc<dyn MoveArbiter>,
        factory: Arc<dyn ArbiterFactory>,
    ) -> CoordinatorHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let coordinator = Coordinator {
            game: GameState::new(config.initial_clock_secs),
            config,
            registry: SessionRegistry::new(),
            votes: VoteBook::default(),
            connections: HashMap::new(),
            arbiter,
            factory,
            cmd_tx: tx.clone(),
            pending_removals: HashMap::new(),
            next_generation: 0,
            next_conn_id: 0,
            clock_restarted: false,
        };
        tokio::spawn(coordinator.run(rx));
        CoordinatorHandle { tx }
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        info!("game coordinator started");

        let mut clock = tokio::time::interval(Duration::from_secs(1));
        clock.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                cmd = rx.recv() => {
                    match cmd {
                        Some(Command::Shutdown) | None => break,
                        Some(cmd) => self.handle_command(cmd),
                    }
                    if self.clock_restarted {
                        clock.reset();
                        self.clock_restarted = false;
                    }
                }

                _ = clock.tick(), if self.clock_running() => {
                    self.clock_tick();
                }
            }
        }

        info!("game coordinator shutting down");
        self.arbiter.quit().await;
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Connect {
                pid,
                name,
                tx,
                reply,
            } => {
                let _ = reply.send(self.handle_connect(pid, name, tx));
            }
            Command::Disconnect { pid, conn_id } => self.handle_disconnect(&pid, conn_id),
            Command::GraceExpired { pid, generation } => self.grace_expired(&pid, generation),
            Command::VoteExpired { slot, generation } => self.vote_expired(slot, generation),
            Command::EngineResolved { epoch, result } => self.engine_resolved(epoch, result),
            Command::ArbiterReplaced { epoch, result } => self.arbiter_replaced(epoch, result),
            Command::Client { pid, message } => self.handle_client(pid, message),
            Command::Shutdown => unreachable!(),
        }
    }

    fn handle_client(&mut self, pid: String, message: ClientMessage) {
        if !self.registry.contains(&pid) {
            warn!(%pid, "message from unknown session dropped");
            return;
        }
        let result = match message {
            ClientMessage::SetName { name } => {
                self.handle_set_name(&pid, name);
                Ok(())
            }
            ClientMessage::JoinSide { side } => {
                self.handle_join_side(&pid, side);
                Ok(())
            }
            ClientMessage::PlayMove { lan } => self.handle_play_move(&pid, &lan),
            ClientMessage::ChatMessage { message } => {
                self.handle_chat(&pid, message);
                Ok(())
            }
            ClientMessage::StartTeamVote { action } => self.start_team_vote(&pid, action),
            ClientMessage::VoteTeam { choice } => self.cast_team_vote(&pid, choice),
            ClientMessage::StartKickVote { target } => self.start_kick_vote(&pid, &target),
            ClientMessage::VoteKick { choice } => self.cast_kick_vote(&pid, choice),
            ClientMessage::StartResetVote => self.start_reset_vote(&pid),
            ClientMessage::VoteReset { choice } => self.cast_reset_vote(&pid, choice),
        };
        if let Err(err) = result {
            self.unicast(
                &pid,
                ServerMessage::Error {
                    message: err.to_string(),
                },
            );
        }
    }

    fn handle_chat(&mut self, pid: &str, message: String) {
        let message = message.trim().to_string();
        if message.is_empty() {
            return;
        }
        let sender = self.registry.name_of(pid);
        self.broadcast(ServerMessage::ChatMessage {
            sender,
            sender_id: pid.to_string(),
            message,
            system: false,
        });
    }

    /// Something only the server can say, to everyone.
    pub(crate) fn system_chat(&self, message: impl Into<String>) {
        self.broadcast(ServerMessage::ChatMessage {
            sender: "System".to_string(),
            sender_id: "system".to_string(),
            message: message.into(),
            system: true,
        });
    }

    // ---- outbound plumbing -------------------------------------------------

    pub(crate) fn unicast(&self, pid: &str, message: ServerMessage) {
        if let Some(connection) = self.connections.get(pid) {
            let _ = connection.tx.send(message);
        }
    }

    pub(crate) fn broadcast(&self, message: ServerMessage) {
        for connection in self.connections.values() {
            let _ = connection.tx.send(message.clone());
        }
    }

    /// Send to every connected member of one team.
    pub(crate) fn team_cast(&self, side: Side, message: ServerMessage) {
        for session in self.registry.iter() {
            if session.team == Team::from(side) {
                if let Some(connection) = self.connections.get(&session.pid) {
                    let _ = connection.tx.send(message.clone());
                }
            }
        }
    }

    /// PIDs with a live socket right now.
    pub(crate) fn connected_pids(&self) -> HashSet<String> {
        self.connections.keys().cloned().collect()
    }

    pub(crate) fn is_connected(&self, pid: &str) -> bool {
        self.connections.contains_key(pid)
    }

    pub(crate) fn next_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    pub(crate) fn clock_message(&self) -> ServerMessage {
        ServerMessage::ClockUpdate {
            white_time: self.game.clock.white,
            black_time: self.game.clock.black,
        }
    }

    pub(crate) fn roster_message(&self) -> ServerMessage {
        let mut spectators = Vec::new();
        let mut white_players = Vec::new();
        let mut black_players = Vec::new();
        for session in self.registry.iter() {
            let entry = PlayerEntry {
                id: session.pid.clone(),
                name: session.name.clone(),
                connected: self.is_connected(&session.pid),
            };
            match session.team {
                Team::White => white_players.push(entry),
                Team::Black => black_players.push(entry),
                Team::Spectator => spectators.push(entry),
            }
        }
        // Stable ordering keeps roster diffs quiet on the client side.
        for list in [&mut spectators, &mut white_players, &mut black_players] {
            list.sort_by(|a, b| a.id.cmp(&b.id));
        }
        ServerMessage::Players {
            spectators,
            white_players,
            black_players,
        }
    }

    pub(crate) fn broadcast_roster(&self) {
        self.broadcast(self.roster_message());
    }

    pub(crate) fn player_entry(&self, pid: &str) -> PlayerEntry {
        PlayerEntry {
            id: pid.to_string(),
            name: self.registry.name_of(pid),
            connected: self.is_connected(pid),
        }
    }

    fn arbiter_replaced(
        &mut self,
        epoch: u64,
        result: Result<Arc<dyn MoveArbiter>, EngineError>,
    ) {
        if epoch != self.game.epoch {
            return;
        }
        match result {
            Ok(arbiter) => {
                self.arbiter = arbiter;
                info!("replacement engine ready");
            }
            Err(err) => {
                // Without an engine no further turn can ever finalize.
                error!(%err, "failed to spawn replacement engine, shutting down");
                let _ = self.cmd_tx.send(Command::Shutdown);
            }
        }
    }

    /// True while the 1 Hz clock should be draining the side to move.
    pub(crate) fn clock_running(&self) -> bool {
        self.game.status == Status::AwaitingProposals
    }
}
