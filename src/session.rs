//! Durable player sessions.
//!
//! A [`Session`] is the identity that outlives any single WebSocket: it is
//! keyed by an opaque persistent id (PID) and survives transport drops for
//! the disconnect grace window. The registry also owns the blacklist, which
//! persists across game resets for the lifetime of the process.

use std::collections::{HashMap, HashSet};

use shared::Team;
use uuid::Uuid;

/// Longest display name we keep; anything longer is trimmed.
pub const MAX_NAME_LEN: usize = 30;

/// Fallback display name for clients that never set one.
pub const DEFAULT_NAME: &str = "Player";

/// One durable player identity.
#[derive(Debug, Clone)]
pub struct Session {
    pub pid: String,
    pub name: String,
    pub team: Team,
}

/// All known sessions plus the process-lifetime blacklist.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<String, Session>,
    blacklist: HashSet<String>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a fresh opaque PID.
    pub fn mint_pid() -> String {
        Uuid::new_v4().simple().to_string()
    }

    pub fn is_blacklisted(&self, pid: &str) -> bool {
        self.blacklist.contains(pid)
    }

    pub fn blacklist(&mut self, pid: &str) {
        self.blacklist.insert(pid.to_string());
    }

    pub fn get(&self, pid: &str) -> Option<&Session> {
        self.sessions.get(pid)
    }

    pub fn contains(&self, pid: &str) -> bool {
        self.sessions.contains_key(pid)
    }

    /// Create a session for a new PID, as a spectator.
    pub fn create(&mut self, pid: &str, name: Option<String>) -> &Session {
        let name = sanitize_name(name);
        self.sessions.entry(pid.to_string()).or_insert(Session {
            pid: pid.to_string(),
            name,
            team: Team::Spectator,
        })
    }

    pub fn remove(&mut self, pid: &str) -> Option<Session> {
        self.sessions.remove(pid)
    }

    /// Rename a session, trimming to the display-name limit.
    pub fn rename(&mut self, pid: &str, name: String) -> bool {
        match self.sessions.get_mut(pid) {
            Some(session) => {
                session.name = sanitize_name(Some(name));
                true
            }
            None => false,
        }
    }

    pub fn set_team(&mut self, pid: &str, team: Team) -> bool {
        match self.sessions.get_mut(pid) {
            Some(session) => {
                session.team = team;
                true
            }
            None => false,
        }
    }

    pub fn name_of(&self, pid: &str) -> String {
        self.sessions
            .get(pid)
            .map(|s| s.name.clone())
            .unwrap_or_else(|| DEFAULT_NAME.to_string())
    }

    /// All sessions currently assigned to `team`.
    pub fn pids_on_team(&self, team: Team) -> HashSet<String> {
        self.sessions
            .values()
            .filter(|s| s.team == team)
            .map(|s| s.pid.clone())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }
}

fn sanitize_name(name: Option<String>) -> String {
    let name = name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| DEFAULT_NAME.to_string());
    name.chars().take(MAX_NAME_LEN).collect()
}
