use serde::{Deserialize, Serialize};

/// A playing side. Spectators are represented by [`Team::Spectator`], never
/// by this type.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    White,
    Black,
}

impl Side {
    pub fn opponent(self) -> Side {
        match self {
            Side::White => Side::Black,
            Side::Black => Side::White,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::White => "white",
            Side::Black => "black",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a session sits: one of the two playing teams, or watching.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Team {
    White,
    Black,
    Spectator,
}

impl Team {
    /// The playing side this team corresponds to, if any.
    pub fn side(self) -> Option<Side> {
        match self {
            Team::White => Some(Side::White),
            Team::Black => Some(Side::Black),
            Team::Spectator => None,
        }
    }
}

impl From<Side> for Team {
    fn from(side: Side) -> Team {
        match side {
            Side::White => Team::White,
            Side::Black => Team::Black,
        }
    }
}

/// Coarse game status as broadcast in `game_status_update`.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Lobby,
    AwaitingProposals,
    FinalizingTurn,
    Over,
}

/// Why a game ended. The serialized strings are part of the wire contract.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum EndReason {
    #[serde(rename = "checkmate")]
    Checkmate,
    #[serde(rename = "stalemate")]
    Stalemate,
    #[serde(rename = "threefold repetition")]
    ThreefoldRepetition,
    #[serde(rename = "insufficient material")]
    InsufficientMaterial,
    #[serde(rename = "draw by rule")]
    DrawByRule,
    #[serde(rename = "resignation")]
    Resignation,
    #[serde(rename = "draw by agreement")]
    DrawByAgreement,
    #[serde(rename = "timeout")]
    Timeout,
    #[serde(rename = "abandonment")]
    Abandonment,
}

/// The three actions a team can put to an intra-team vote.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TeamAction {
    Resign,
    OfferDraw,
    AcceptDraw,
}

/// A yes/no ballot choice.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Ballot {
    Yes,
    No,
}

/// One roster entry in a `players` broadcast.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PlayerEntry {
    pub id: String,
    pub name: String,
    pub connected: bool,
}

/// One player's move candidate for the current turn.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProposalInfo {
    pub id: String,
    pub name: String,
    pub move_number: u32,
    pub side: Side,
    pub lan: String,
    pub san: String,
}

/// The committed move of a turn, with the full candidate list it won against.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    pub id: String,
    pub name: String,
    pub move_number: u32,
    pub side: Side,
    pub lan: String,
    pub san: String,
    pub fen: String,
    pub candidates: Vec<ProposalInfo>,
}

/// Live state of a team action vote, as shown to that team.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TeamVoteState {
    pub action: TeamAction,
    /// Display name of the starter; `None` for system-triggered votes.
    pub initiator: Option<String>,
    pub yes: Vec<String>,
    pub required: usize,
    pub expires_in: u64,
}

/// Live state of a kick or reset vote, as shown to everyone.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BallotVoteState {
    pub initiator: String,
    /// Kick votes carry the player on the block; reset votes carry `None`.
    pub target: Option<PlayerEntry>,
    pub yes: Vec<String>,
    pub no: Vec<String>,
    pub required: usize,
    pub expires_in: u64,
}

/// Messages a client may send to the server.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    SetName {
        name: String,
    },
    JoinSide {
        side: Team,
    },
    PlayMove {
        lan: String,
    },
    ChatMessage {
        message: String,
    },
    StartTeamVote {
        action: TeamAction,
    },
    VoteTeam {
        choice: Ballot,
    },
    StartKickVote {
        target: String,
    },
    VoteKick {
        choice: Ballot,
    },
    StartResetVote,
    VoteReset {
        choice: Ballot,
    },
}

/// Messages the server sends, by unicast or broadcast.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent once per (re)connect: the durable identity of this client.
    Session {
        id: String,
        name: String,
    },
    #[serde(rename_all = "camelCase")]
    Players {
        spectators: Vec<PlayerEntry>,
        white_players: Vec<PlayerEntry>,
        black_players: Vec<PlayerEntry>,
    },
    GameStatusUpdate {
        status: Status,
    },
    #[serde(rename_all = "camelCase")]
    GameStarted {
        move_number: u32,
        side: Side,
        proposals: Vec<ProposalInfo>,
    },
    GameReset,
    GameOver {
        reason: EndReason,
        winner: Option<Side>,
        pgn: String,
    },
    PositionUpdate {
        fen: String,
    },
    #[serde(rename_all = "camelCase")]
    ClockUpdate {
        white_time: u64,
        black_time: u64,
    },
    MoveSubmitted {
        proposal: ProposalInfo,
    },
    MoveSelected {
        selection: Selection,
    },
    #[serde(rename_all = "camelCase")]
    TurnChange {
        move_number: u32,
        side: Side,
    },
    #[serde(rename_all = "camelCase")]
    ProposalRemoved {
        move_number: u32,
        side: Side,
        id: String,
    },
    DrawOfferUpdate {
        side: Option<Side>,
    },
    TeamVoteUpdate {
        team: Side,
        vote: Option<TeamVoteState>,
    },
    KickVoteUpdate {
        vote: Option<BallotVoteState>,
    },
    ResetVoteUpdate {
        vote: Option<BallotVoteState>,
    },
    #[serde(rename_all = "camelCase")]
    ChatMessage {
        sender: String,
        sender_id: String,
        message: String,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        system: bool,
    },
    Error {
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_play_move_round_trip() {
        let msg = ClientMessage::PlayMove {
            lan: "e2e4".to_string(),
        };
        let json = serde_json::to_string(&msg).expect("Should serialize");
        let decoded: ClientMessage = serde_json::from_str(&json).expect("Should deserialize");

        match decoded {
            ClientMessage::PlayMove { lan } => assert_eq!(lan, "e2e4"),
            _ => panic!("Wrong message type after deserialization"),
        }
    }

    #[test]
    fn test_client_join_side_wire_shape() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"join_side","side":"white"}"#).expect("Should parse");
        assert_eq!(msg, ClientMessage::JoinSide { side: Team::White });

        let msg: ClientMessage = serde_json::from_str(r#"{"type":"join_side","side":"spectator"}"#)
            .expect("Should parse");
        assert_eq!(
            msg,
            ClientMessage::JoinSide {
                side: Team::Spectator
            }
        );
    }

    #[test]
    fn test_vote_messages_use_lowercase_ballots() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"vote_kick","choice":"no"}"#).expect("Should parse");
        assert_eq!(msg, ClientMessage::VoteKick { choice: Ballot::No });

        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"start_team_vote","action":"offer_draw"}"#)
                .expect("Should parse");
        assert_eq!(
            msg,
            ClientMessage::StartTeamVote {
                action: TeamAction::OfferDraw
            }
        );
    }

    #[test]
    fn test_end_reason_wire_strings() {
        assert_eq!(
            serde_json::to_string(&EndReason::ThreefoldRepetition).unwrap(),
            r#""threefold repetition""#
        );
        assert_eq!(
            serde_json::to_string(&EndReason::DrawByAgreement).unwrap(),
            r#""draw by agreement""#
        );
        assert_eq!(
            serde_json::to_string(&EndReason::DrawByRule).unwrap(),
            r#""draw by rule""#
        );
        assert_eq!(
            serde_json::to_string(&EndReason::Abandonment).unwrap(),
            r#""abandonment""#
        );
    }

    #[test]
    fn test_game_over_includes_null_winner_for_draws() {
        let msg = ServerMessage::GameOver {
            reason: EndReason::DrawByAgreement,
            winner: None,
            pgn: "1. e4 e5".to_string(),
        };
        let json = serde_json::to_string(&msg).expect("Should serialize");
        assert!(json.contains(r#""winner":null"#), "got {json}");
        assert!(json.contains(r#""type":"game_over""#), "got {json}");
    }

    #[test]
    fn test_clock_update_uses_camel_case_fields() {
        let msg = ServerMessage::ClockUpdate {
            white_time: 600,
            black_time: 597,
        };
        let json = serde_json::to_string(&msg).expect("Should serialize");
        assert!(json.contains(r#""whiteTime":600"#), "got {json}");
        assert!(json.contains(r#""blackTime":597"#), "got {json}");
    }

    #[test]
    fn test_move_submitted_round_trip() {
        let msg = ServerMessage::MoveSubmitted {
            proposal: ProposalInfo {
                id: "p1".to_string(),
                name: "Alice".to_string(),
                move_number: 3,
                side: Side::Black,
                lan: "e7e5".to_string(),
                san: "e5".to_string(),
            },
        };
        let json = serde_json::to_string(&msg).expect("Should serialize");
        let decoded: ServerMessage = serde_json::from_str(&json).expect("Should deserialize");
        assert_eq!(decoded, msg);
        assert!(json.contains(r#""moveNumber":3"#), "got {json}");
    }

    #[test]
    fn test_system_chat_flag_is_omitted_when_false() {
        let msg = ServerMessage::ChatMessage {
            sender: "Alice".to_string(),
            sender_id: "p1".to_string(),
            message: "gg".to_string(),
            system: false,
        };
        let json = serde_json::to_string(&msg).expect("Should serialize");
        assert!(!json.contains("system"), "got {json}");

        let decoded: ServerMessage = serde_json::from_str(&json).expect("Should deserialize");
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_team_vote_update_carries_names_and_deadline() {
        let msg = ServerMessage::TeamVoteUpdate {
            team: Side::Black,
            vote: Some(TeamVoteState {
                action: TeamAction::AcceptDraw,
                initiator: None,
                yes: vec!["Bob".to_string()],
                required: 2,
                expires_in: 14,
            }),
        };
        let json = serde_json::to_string(&msg).expect("Should serialize");
        assert!(json.contains(r#""expiresIn":14"#), "got {json}");
        assert!(json.contains(r#""initiator":null"#), "got {json}");
        let decoded: ServerMessage = serde_json::from_str(&json).expect("Should deserialize");
        assert_eq!(decoded, msg);
    }
}
