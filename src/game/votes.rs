//! The voting engine.
//!
//! Three vote families share the same skeleton: a 20-second deadline, an
//! eligibility snapshot frozen at start (late joiners never vote), and a
//! broadcast on every state change. They differ in scope and quorum:
//!
//! - team action votes (resign / offer draw / accept draw): per team,
//!   unanimous, a single "no" kills them;
//! - kick votes: global, strict majority, yes *and* no ballots with an
//!   arithmetic short-circuit both ways;
//! - reset votes: like kick votes, minus the target.
//!
//! Votes are identified by slot plus a generation stamp, so an expiry timer
//! whose vote already finished (or was replaced) lands on the floor.

use std::collections::{HashMap, HashSet};

use shared::{Ballot, BallotVoteState, ServerMessage, Side, Status, Team, TeamAction, TeamVoteState};
use tokio::time::Instant;
use tracing::info;

use crate::error::{GameError, GameResult};
use crate::game::actor::{Command, Coordinator};

/// Which vote a deadline timer belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteSlot {
    Team(Side),
    Kick,
    Reset,
}

/// Strict majority of `n` voters: more than half.
pub fn strict_majority(n: usize) -> usize {
    n / 2 + 1
}

/// One team's pending resign / offer-draw / accept-draw decision.
pub struct TeamVote {
    pub action: TeamAction,
    /// Starter's PID; `None` when the server itself started the vote (the
    /// accept-draw vote raised in response to the opposing team's offer).
    pub initiator: Option<String>,
    /// PID → display name, frozen at start.
    pub eligible: HashMap<String, String>,
    pub yes: HashSet<String>,
    pub required: usize,
    pub deadline: Instant,
    pub generation: u64,
}

impl TeamVote {
    fn wire(&self) -> TeamVoteState {
        TeamVoteState {
            action: self.action,
            initiator: self
                .initiator
                .as_ref()
                .and_then(|pid| self.eligible.get(pid).cloned()),
            yes: sorted_names(&self.eligible, &self.yes),
            required: self.required,
            expires_in: remaining_secs(self.deadline),
        }
    }
}

/// A yes/no majority vote: kick (with a target) or reset.
pub struct BallotVote {
    pub initiator: String,
    pub target: Option<String>,
    pub eligible: HashMap<String, String>,
    pub yes: HashSet<String>,
    pub no: HashSet<String>,
    pub required: usize,
    pub deadline: Instant,
    pub generation: u64,
}

impl BallotVote {
    /// Yes can no longer reach the required count.
    fn impossible(&self) -> bool {
        self.eligible.len() - self.no.len() < self.required
    }

    fn wire(&self, target: Option<shared::PlayerEntry>) -> BallotVoteState {
        BallotVoteState {
            initiator: self
                .eligible
                .get(&self.initiator)
                .cloned()
                .unwrap_or_default(),
            target,
            yes: sorted_names(&self.eligible, &self.yes),
            no: sorted_names(&self.eligible, &self.no),
            required: self.required,
            expires_in: remaining_secs(self.deadline),
        }
    }
}

fn sorted_names(eligible: &HashMap<String, String>, pids: &HashSet<String>) -> Vec<String> {
    let mut names: Vec<String> = pids
        .iter()
        .filter_map(|pid| eligible.get(pid).cloned())
        .collect();
    names.sort();
    names
}

fn remaining_secs(deadline: Instant) -> u64 {
    deadline.saturating_duration_since(Instant::now()).as_secs()
}

/// All live votes. At most one per team slot, one kick, one reset.
#[derive(Default)]
pub struct VoteBook {
    pub white: Option<TeamVote>,
    pub black: Option<TeamVote>,
    pub kick: Option<BallotVote>,
    pub reset: Option<BallotVote>,
}

impl VoteBook {
    pub fn team(&self, side: Side) -> &Option<TeamVote> {
        match side {
            Side::White => &self.white,
            Side::Black => &self.black,
        }
    }

    pub fn team_mut(&mut self, side: Side) -> &mut Option<TeamVote> {
        match side {
            Side::White => &mut self.white,
            Side::Black => &mut self.black,
        }
    }
}

enum BallotOutcome {
    Passed,
    Impossible,
    Open,
}

impl Coordinator {
    // ---- team action votes -------------------------------------------------

    pub(crate) fn start_team_vote(&mut self, pid: &str, action: TeamAction) -> GameResult<()> {
        let side = self
            .registry
            .get(pid)
            .and_then(|s| s.team.side())
            .ok_or(GameError::NotOnTeam)?;
        if !self.game.is_active() {
            return Err(GameError::GameNotStarted);
        }
        match action {
            TeamAction::OfferDraw if self.game.draw_offer.is_some() => {
                return Err(GameError::DrawAlreadyOffered);
            }
            TeamAction::AcceptDraw if self.game.draw_offer != Some(side.opponent()) => {
                return Err(GameError::NoDrawOffer);
            }
            _ => {}
        }
        if self.votes.team(side).is_some() {
            return Err(GameError::VoteInProgress);
        }

        let eligible = self.online_team_members(side);
        if eligible.len() <= 1 {
            // Solo teams skip the ceremony; the client already confirmed.
            info!(pid, ?action, "solo team, executing action directly");
            self.execute_team_action(side, action);
            return Ok(());
        }

        let generation = self.next_generation();
        let vote = TeamVote {
            action,
            initiator: Some(pid.to_string()),
            yes: HashSet::from([pid.to_string()]),
            required: eligible.len(),
            eligible,
            deadline: Instant::now() + self.config.vote_duration,
            generation,
        };
        *self.votes.team_mut(side) = Some(vote);
        self.schedule_vote_expiry(VoteSlot::Team(side), generation);
        self.broadcast_team_vote(side);
        Ok(())
    }

    /// The accept-draw vote the server raises on the team opposing a fresh
    /// draw offer. Starts with an empty yes set and never auto-executes.
    pub(crate) fn start_system_accept_draw(&mut self, offered_by: Side) {
        let side = offered_by.opponent();
        // A draw offer demands an answer; it supersedes whatever the team
        // was voting on.
        if self.votes.team(side).is_some() {
            self.cancel_team_vote(side);
        }

        let eligible = self.online_team_members(side);
        let generation = self.next_generation();
        let vote = TeamVote {
            action: TeamAction::AcceptDraw,
            initiator: None,
            yes: HashSet::new(),
            required: eligible.len(),
            eligible,
            deadline: Instant::now() + self.config.vote_duration,
            generation,
        };
        *self.votes.team_mut(side) = Some(vote);
        self.schedule_vote_expiry(VoteSlot::Team(side), generation);
        self.broadcast_team_vote(side);
    }

    pub(crate) fn cast_team_vote(&mut self, pid: &str, choice: Ballot) -> GameResult<()> {
        let side = self
            .registry
            .get(pid)
            .and_then(|s| s.team.side())
            .ok_or(GameError::NotOnTeam)?;

        let vote = self
            .votes
            .team_mut(side)
            .as_mut()
            .ok_or(GameError::NoActiveVote)?;
        if !vote.eligible.contains_key(pid) {
            return Err(GameError::NotEligible);
        }
        if vote.yes.contains(pid) {
            return Err(GameError::AlreadyVoted);
        }

        match choice {
            Ballot::No => {
                // Unanimity votes die on the first refusal.
                let action = vote.action;
                *self.votes.team_mut(side) = None;
                self.broadcast_team_vote(side);
                self.team_vote_rejected(side, action);
            }
            Ballot::Yes => {
                vote.yes.insert(pid.to_string());
                if vote.yes.len() >= vote.required {
                    let action = vote.action;
                    *self.votes.team_mut(side) = None;
                    self.broadcast_team_vote(side);
                    self.execute_team_action(side, action);
                } else {
                    self.broadcast_team_vote(side);
                }
            }
        }
        Ok(())
    }

    fn team_vote_rejected(&mut self, side: Side, action: TeamAction) {
        match action {
            TeamAction::Resign => {
                self.system_chat(format!("The {side} team's resign vote was rejected."));
            }
            TeamAction::OfferDraw => {
                self.system_chat(format!("The {side} team's draw offer vote was rejected."));
            }
            TeamAction::AcceptDraw => {
                self.clear_draw_offer();
                self.system_chat(format!("The {side} team declined the draw."));
            }
        }
    }

    fn execute_team_action(&mut self, side: Side, action: TeamAction) {
        match action {
            TeamAction::Resign => {
                self.system_chat(format!("The {side} team resigns."));
                self.end_game(shared::EndReason::Resignation, Some(side.opponent()));
            }
            TeamAction::OfferDraw => {
                self.game.draw_offer = Some(side);
                self.broadcast(ServerMessage::DrawOfferUpdate { side: Some(side) });
                self.system_chat(format!("The {side} team offers a draw."));
                self.start_system_accept_draw(side);
            }
            TeamAction::AcceptDraw => {
                self.system_chat("Draw agreed.");
                self.end_game(shared::EndReason::DrawByAgreement, None);
            }
        }
    }

    /// Drop a team vote without an outcome (game over, reset, superseded).
    pub(crate) fn cancel_team_vote(&mut self, side: Side) {
        if self.votes.team_mut(side).take().is_some() {
            self.broadcast_team_vote(side);
        }
    }

    pub(crate) fn cancel_team_votes(&mut self) {
        self.cancel_team_vote(Side::White);
        self.cancel_team_vote(Side::Black);
    }

    pub(crate) fn clear_draw_offer(&mut self) {
        if self.game.draw_offer.take().is_some() {
            self.broadcast(ServerMessage::DrawOfferUpdate { side: None });
        }
    }

    fn broadcast_team_vote(&self, side: Side) {
        let state = self.votes.team(side).as_ref().map(TeamVote::wire);
        self.team_cast(
            side,
            ServerMessage::TeamVoteUpdate {
                team: side,
                vote: state,
            },
        );
    }

    /// Unicast one team's vote state (connect replay and side joins).
    pub(crate) fn send_team_vote_to(&self, pid: &str, side: Side) {
        let state = self.votes.team(side).as_ref().map(TeamVote::wire);
        self.unicast(
            pid,
            ServerMessage::TeamVoteUpdate {
                team: side,
                vote: state,
            },
        );
    }

    // ---- kick votes --------------------------------------------------------

    pub(crate) fn start_kick_vote(&mut self, pid: &str, target: &str) -> GameResult<()> {
        if !self.registry.contains(target) {
            return Err(GameError::UnknownPlayer);
        }
        if target == pid {
            return Err(GameError::SelfKick);
        }
        if self.votes.kick.is_some() {
            return Err(GameError::VoteInProgress);
        }

        let mut eligible = self.online_members();
        eligible.remove(target);
        let generation = self.next_generation();
        let vote = BallotVote {
            initiator: pid.to_string(),
            target: Some(target.to_string()),
            yes: HashSet::from([pid.to_string()]),
            no: HashSet::new(),
            required: strict_majority(eligible.len()),
            eligible,
            deadline: Instant::now() + self.config.vote_duration,
            generation,
        };
        self.votes.kick = Some(vote);
        self.schedule_vote_expiry(VoteSlot::Kick, generation);
        self.settle_kick();
        Ok(())
    }

    pub(crate) fn cast_kick_vote(&mut self, pid: &str, choice: Ballot) -> GameResult<()> {
        let vote = self.votes.kick.as_mut().ok_or(GameError::NoActiveVote)?;
        if !vote.eligible.contains_key(pid) {
            return Err(GameError::NotEligible);
        }
        if vote.yes.contains(pid) || vote.no.contains(pid) {
            return Err(GameError::AlreadyVoted);
        }
        match choice {
            Ballot::Yes => vote.yes.insert(pid.to_string()),
            Ballot::No => vote.no.insert(pid.to_string()),
        };
        self.settle_kick();
        Ok(())
    }

    fn settle_kick(&mut self) {
        let Some(vote) = &self.votes.kick else { return };
        let outcome = if vote.yes.len() >= vote.required {
            BallotOutcome::Passed
        } else if vote.impossible() {
            BallotOutcome::Impossible
        } else {
            BallotOutcome::Open
        };
        match outcome {
            BallotOutcome::Passed => {
                let target = self
                    .votes
                    .kick
                    .take()
                    .and_then(|v| v.target)
                    .unwrap_or_default();
                self.broadcast(ServerMessage::KickVoteUpdate { vote: None });
                self.apply_kick(&target);
            }
            BallotOutcome::Impossible => {
                if let Some(vote) = self.votes.kick.take() {
                    let target = vote.target.as_deref().unwrap_or_default();
                    let name = self.registry.name_of(target);
                    self.broadcast(ServerMessage::KickVoteUpdate { vote: None });
                    self.system_chat(format!(
                        "The vote to kick {name} failed: not enough votes possible."
                    ));
                }
            }
            BallotOutcome::Open => self.broadcast_kick_vote(),
        }
    }

    fn broadcast_kick_vote(&self) {
        let state = self.votes.kick.as_ref().map(|vote| {
            let target = vote.target.as_deref().map(|pid| self.player_entry(pid));
            vote.wire(target)
        });
        self.broadcast(ServerMessage::KickVoteUpdate { vote: state });
    }

    // ---- reset votes -------------------------------------------------------

    pub(crate) fn start_reset_vote(&mut self, pid: &str) -> GameResult<()> {
        if self.game.status == Status::Lobby {
            return Err(GameError::GameNotStarted);
        }
        if self.votes.reset.is_some() {
            return Err(GameError::VoteInProgress);
        }

        let eligible = self.online_members();
        let generation = self.next_generation();
        let vote = BallotVote {
            initiator: pid.to_string(),
            target: None,
            yes: HashSet::from([pid.to_string()]),
            no: HashSet::new(),
            required: strict_majority(eligible.len()),
            eligible,
            deadline: Instant::now() + self.config.vote_duration,
            generation,
        };
        self.votes.reset = Some(vote);
        self.schedule_vote_expiry(VoteSlot::Reset, generation);
        self.settle_reset();
        Ok(())
    }

    pub(crate) fn cast_reset_vote(&mut self, pid: &str, choice: Ballot) -> GameResult<()> {
        let vote = self.votes.reset.as_mut().ok_or(GameError::NoActiveVote)?;
        if !vote.eligible.contains_key(pid) {
            return Err(GameError::NotEligible);
        }
        if vote.yes.contains(pid) || vote.no.contains(pid) {
            return Err(GameError::AlreadyVoted);
        }
        match choice {
            Ballot::Yes => vote.yes.insert(pid.to_string()),
            Ballot::No => vote.no.insert(pid.to_string()),
        };
        self.settle_reset();
        Ok(())
    }

    fn settle_reset(&mut self) {
        let Some(vote) = &self.votes.reset else { return };
        let outcome = if vote.yes.len() >= vote.required {
            BallotOutcome::Passed
        } else if vote.impossible() {
            BallotOutcome::Impossible
        } else {
            BallotOutcome::Open
        };
        match outcome {
            BallotOutcome::Passed => {
                self.votes.reset = None;
                self.broadcast(ServerMessage::ResetVoteUpdate { vote: None });
                self.apply_reset();
            }
            BallotOutcome::Impossible => {
                self.votes.reset = None;
                self.broadcast(ServerMessage::ResetVoteUpdate { vote: None });
                self.system_chat("The reset vote failed: not enough votes possible.");
            }
            BallotOutcome::Open => self.broadcast_reset_vote(),
        }
    }

    fn broadcast_reset_vote(&self) {
        let state = self.votes.reset.as_ref().map(|vote| vote.wire(None));
        self.broadcast(ServerMessage::ResetVoteUpdate { vote: state });
    }

    // ---- shared plumbing ---------------------------------------------------

    pub(crate) fn vote_expired(&mut self, slot: VoteSlot, generation: u64) {
        match slot {
            VoteSlot::Team(side) => {
                let matches = self
                    .votes
                    .team(side)
                    .as_ref()
                    .is_some_and(|v| v.generation == generation);
                if !matches {
                    return;
                }
                let action = self.votes.team_mut(side).take().map(|v| v.action);
                self.broadcast_team_vote(side);
                match action {
                    Some(TeamAction::AcceptDraw) => {
                        self.clear_draw_offer();
                        self.system_chat(format!("The {side} team let the draw offer expire."));
                    }
                    Some(TeamAction::Resign) => {
                        self.system_chat(format!("The {side} team's resign vote expired."));
                    }
                    Some(TeamAction::OfferDraw) => {
                        self.system_chat(format!("The {side} team's draw offer vote expired."));
                    }
                    None => {}
                }
            }
            VoteSlot::Kick => {
                let matches = self
                    .votes
                    .kick
                    .as_ref()
                    .is_some_and(|v| v.generation == generation);
                if !matches {
                    return;
                }
                if let Some(vote) = self.votes.kick.take() {
                    let target = vote.target.as_deref().unwrap_or_default();
                    let name = self.registry.name_of(target);
                    self.broadcast(ServerMessage::KickVoteUpdate { vote: None });
                    self.system_chat(format!(
                        "The vote to kick {name} expired ({} yes / {} no).",
                        vote.yes.len(),
                        vote.no.len()
                    ));
                }
            }
            VoteSlot::Reset => {
                let matches = self
                    .votes
                    .reset
                    .as_ref()
                    .is_some_and(|v| v.generation == generation);
                if !matches {
                    return;
                }
                self.votes.reset = None;
                self.broadcast(ServerMessage::ResetVoteUpdate { vote: None });
                self.system_chat("The reset vote expired.");
            }
        }
    }

    fn schedule_vote_expiry(&self, slot: VoteSlot, generation: u64) {
        let tx = self.cmd_tx.clone();
        let duration = self.config.vote_duration;
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let _ = tx.send(Command::VoteExpired { slot, generation });
        });
    }

    /// Connected PID → name map for one team.
    fn online_team_members(&self, side: Side) -> HashMap<String, String> {
        self.registry
            .iter()
            .filter(|s| s.team == Team::from(side) && self.is_connected(&s.pid))
            .map(|s| (s.pid.clone(), s.name.clone()))
            .collect()
    }

    /// Connected PID → name map for the whole room, spectators included.
    fn online_members(&self) -> HashMap<String, String> {
        self.registry
            .iter()
            .filter(|s| self.is_connected(&s.pid))
            .map(|s| (s.pid.clone(), s.name.clone()))
            .collect()
    }
}
