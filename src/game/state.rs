//! The in-memory game aggregate.
//!
//! Everything the coordinator mutates lives here: the authoritative board,
//! the coarse status, the live team rosters, the open proposals, the clocks
//! and the current draw offer. The aggregate itself is passive; the turn,
//! clock, vote and lifecycle logic drive it.

use std::collections::HashSet;

use shared::{EndReason, ProposalInfo, Side, Status};

use crate::board::Board;

/// Both sides' remaining time, in whole seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockPair {
    pub white: u64,
    pub black: u64,
}

impl ClockPair {
    pub fn new(initial: u64) -> Self {
        Self {
            white: initial,
            black: initial,
        }
    }

    pub fn get(&self, side: Side) -> u64 {
        match side {
            Side::White => self.white,
            Side::Black => self.black,
        }
    }

    /// Take one second off `side`; returns the remaining time.
    pub fn tick(&mut self, side: Side) -> u64 {
        let slot = match side {
            Side::White => &mut self.white,
            Side::Black => &mut self.black,
        };
        *slot = slot.saturating_sub(1);
        *slot
    }

    pub fn credit(&mut self, side: Side, seconds: u64) {
        match side {
            Side::White => self.white += seconds,
            Side::Black => self.black += seconds,
        }
    }
}

/// The single hosted game.
pub struct GameState {
    pub board: Board,
    pub status: Status,
    /// Full-move number of the turn being collected.
    pub move_number: u32,
    /// Rosters snapshotted at game start and maintained in lockstep with
    /// session team changes while the game runs.
    pub white_team: HashSet<String>,
    pub black_team: HashSet<String>,
    /// Open proposals for the current turn, in submission order.
    pub proposals: Vec<ProposalInfo>,
    pub clock: ClockPair,
    pub draw_offer: Option<Side>,
    /// Terminal result once status is `Over`.
    pub end: Option<(EndReason, Option<Side>)>,
    /// Incremented on every reset; fences stale engine replies.
    pub epoch: u64,
}

impl GameState {
    pub fn new(initial_clock: u64) -> Self {
        Self {
            board: Board::new(),
            status: Status::Lobby,
            move_number: 1,
            white_team: HashSet::new(),
            black_team: HashSet::new(),
            proposals: Vec::new(),
            clock: ClockPair::new(initial_clock),
            draw_offer: None,
            end: None,
            epoch: 0,
        }
    }

    pub fn side_to_move(&self) -> Side {
        self.board.side_to_move()
    }

    pub fn team(&self, side: Side) -> &HashSet<String> {
        match side {
            Side::White => &self.white_team,
            Side::Black => &self.black_team,
        }
    }

    pub fn team_mut(&mut self, side: Side) -> &mut HashSet<String> {
        match side {
            Side::White => &mut self.white_team,
            Side::Black => &mut self.black_team,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(
            self.status,
            Status::AwaitingProposals | Status::FinalizingTurn
        )
    }

    pub fn proposal_of(&self, pid: &str) -> Option<&ProposalInfo> {
        self.proposals.iter().find(|p| p.id == pid)
    }

    /// First proposal matching `lan`, in submission order.
    ///
    /// Duplicate LANs credit the earliest proposer.
    pub fn proposal_of_lan(&self, lan: &str) -> Option<&ProposalInfo> {
        self.proposals.iter().find(|p| p.lan == lan)
    }

    pub fn add_proposal(&mut self, proposal: ProposalInfo) {
        self.proposals.push(proposal);
    }

    pub fn remove_proposal(&mut self, pid: &str) -> Option<ProposalInfo> {
        let index = self.proposals.iter().position(|p| p.id == pid)?;
        Some(self.proposals.remove(index))
    }

    pub fn clear_proposals(&mut self) {
        self.proposals.clear();
    }

    /// The PIDs whose proposals gate finalization: members of the
    /// side-to-move roster that currently have a live socket.
    pub fn expected_pids(&self, connected: &HashSet<String>) -> HashSet<String> {
        self.team(self.side_to_move())
            .intersection(connected)
            .cloned()
            .collect()
    }

    /// True when every connected teammate on the side to move has spoken.
    ///
    /// The expected set must be non-empty: an all-offline team never
    /// finalizes, it abandons once the grace windows run out.
    pub fn quorum_met(&self, connected: &HashSet<String>) -> bool {
        let expected = self.expected_pids(connected);
        !expected.is_empty()
            && expected
                .iter()
                .all(|pid| self.proposals.iter().any(|p| &p.id == pid))
    }

    /// Return to the lobby with a fresh board and clocks.
    ///
    /// Rosters and proposals are dropped; the caller owns what survives a
    /// reset (sessions keep their team fields, the blacklist is untouched).
    pub fn reset(&mut self, initial_clock: u64) {
        self.board = Board::new();
        self.status = Status::Lobby;
        self.move_number = 1;
        self.white_team.clear();
        self.black_team.clear();
        self.proposals.clear();
        self.clock = ClockPair::new(initial_clock);
        self.draw_offer = None;
        self.end = None;
        self.epoch += 1;
    }
}
