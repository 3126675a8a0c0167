//! Shared fixtures for coordinator integration tests: scripted arbiters in
//! place of the engine subprocess, and a lightweight fake client that talks
//! to the coordinator exactly the way a socket task would.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use shared::{ClientMessage, ServerMessage, Team};
use teamchess_server::engine::{ArbiterFactory, MoveArbiter};
use teamchess_server::error::EngineError;
use teamchess_server::game::actor::{ConnectError, Coordinator, CoordinatorHandle};
use teamchess_server::ServerConfig;

/// Picks the first preferred move present among the candidates, falling back
/// to the first candidate. Stands in for Stockfish.
pub struct ScriptedArbiter {
    pub prefer: Vec<String>,
    pub delay: Duration,
    pub calls: AtomicUsize,
}

impl ScriptedArbiter {
    pub fn preferring(prefer: &[&str]) -> Self {
        Self {
            prefer: prefer.iter().map(|s| s.to_string()).collect(),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl MoveArbiter for ScriptedArbiter {
    async fn choose(&self, _fen: &str, candidates: &[String]) -> Result<String, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        for preferred in &self.prefer {
            if candidates.contains(preferred) {
                return Ok(preferred.clone());
            }
        }
        candidates.first().cloned().ok_or(EngineError::NoReply)
    }

    async fn quit(&self) {}
}

/// Always fails, for exercising the engine-fault recovery path.
pub struct FailingArbiter;

#[async_trait]
impl MoveArbiter for FailingArbiter {
    async fn choose(&self, _fen: &str, _candidates: &[String]) -> Result<String, EngineError> {
        Err(EngineError::Terminated)
    }

    async fn quit(&self) {}
}

pub struct ScriptedFactory {
    pub prefer: Vec<String>,
}

#[async_trait]
impl ArbiterFactory for ScriptedFactory {
    async fn create(&self) -> Result<Arc<dyn MoveArbiter>, EngineError> {
        let mut arbiter = ScriptedArbiter::preferring(&[]);
        arbiter.prefer = self.prefer.clone();
        Ok(Arc::new(arbiter))
    }
}

/// A fake transport client: outbound queue plus identity.
pub struct Client {
    pub pid: String,
    pub name: String,
    pub conn_id: u64,
    pub rx: mpsc::UnboundedReceiver<ServerMessage>,
}

impl Client {
    /// Everything queued for this client so far.
    pub fn drain(&mut self) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        while let Ok(message) = self.rx.try_recv() {
            messages.push(message);
        }
        messages
    }
}

/// Spawn a coordinator with default config and a scripted arbiter.
pub fn spawn_room(prefer: &[&str]) -> CoordinatorHandle {
    spawn_room_with(ServerConfig::default(), Arc::new(ScriptedArbiter::preferring(prefer)))
}

pub fn spawn_room_with(config: ServerConfig, arbiter: Arc<dyn MoveArbiter>) -> CoordinatorHandle {
    let factory = Arc::new(ScriptedFactory { prefer: Vec::new() });
    Coordinator::spawn(config, arbiter, factory)
}

/// Connect a fresh (or resuming) client.
pub async fn connect(
    handle: &CoordinatorHandle,
    pid: Option<&str>,
    name: &str,
) -> Result<Client, ConnectError> {
    let (tx, rx) = mpsc::unbounded_channel();
    let connected = handle
        .connect(pid.map(str::to_string), Some(name.to_string()), tx)
        .await?;
    Ok(Client {
        pid: connected.pid,
        name: connected.name,
        conn_id: connected.conn_id,
        rx,
    })
}

/// Let the coordinator drain its queue (advances paused time by 1 ms).
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

pub async fn join_team(handle: &CoordinatorHandle, client: &Client, team: Team) {
    handle.client_message(client.pid.clone(), ClientMessage::JoinSide { side: team });
    settle().await;
}

pub async fn play(handle: &CoordinatorHandle, client: &Client, lan: &str) {
    handle.client_message(
        client.pid.clone(),
        ClientMessage::PlayMove {
            lan: lan.to_string(),
        },
    );
    settle().await;
}

/// First message matching `pick`, scanning in order.
pub fn find<T>(messages: &[ServerMessage], pick: impl Fn(&ServerMessage) -> Option<T>) -> Option<T> {
    messages.iter().find_map(pick)
}

pub fn errors_in(messages: &[ServerMessage]) -> Vec<String> {
    messages
        .iter()
        .filter_map(|m| match m {
            ServerMessage::Error { message } => Some(message.clone()),
            _ => None,
        })
        .collect()
}
