//! A single match: two players, two boards, placement progress and the move log.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::board::Board;
use crate::cell::ShipId;
use crate::common::{AttackError, AttackOutcome, Coord, PlacementError, SessionError};
use crate::config::StarterPolicy;
use crate::fleet::{FleetCounter, FleetRules};
use crate::placement::{place_ship, PlacementPhase, PlacementRequest, PlacementState};

pub type MatchId = u64;

/// Seat in a match: the creator is `Primary`, the joiner `Opponent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Primary,
    Opponent,
}

impl Side {
    pub fn other(self) -> Side {
        match self {
            Side::Primary => Side::Opponent,
            Side::Opponent => Side::Primary,
        }
    }
}

/// One entry of the append-only move log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Move {
    pub attacker: String,
    pub coord: Coord,
    pub outcome: AttackOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    pub winner: String,
    pub loser: String,
    /// The loser left instead of losing their fleet.
    pub forfeit: bool,
}

/// What a successful attack did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttackReport {
    pub attacker: String,
    pub defender: String,
    pub coord: Coord,
    pub outcome: AttackOutcome,
    /// The defender's fleet is gone and the match is over.
    pub finished: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Match {
    id: MatchId,
    primary: String,
    opponent: Option<String>,
    primary_board: Board,
    opponent_board: Option<Board>,
    rules: FleetRules,
    starter: StarterPolicy,
    placement: PlacementState,
    turn: Option<Side>,
    moves: Vec<Move>,
    result: Option<MatchResult>,
}

impl Match {
    /// Open a match for `creator`; the opponent seat stays empty until someone joins.
    pub fn new(id: MatchId, creator: &str, rules: FleetRules, starter: StarterPolicy) -> Self {
        Self {
            id,
            primary: creator.to_string(),
            opponent: None,
            primary_board: Board::new(),
            opponent_board: None,
            rules,
            starter,
            placement: PlacementState::new(rules),
            turn: None,
            moves: Vec::new(),
            result: None,
        }
    }

    pub fn id(&self) -> MatchId {
        self.id
    }

    pub fn primary(&self) -> &str {
        &self.primary
    }

    pub fn opponent(&self) -> Option<&str> {
        self.opponent.as_deref()
    }

    pub fn rules(&self) -> FleetRules {
        self.rules
    }

    /// No opponent yet and not concluded.
    pub fn is_open(&self) -> bool {
        self.opponent.is_none() && self.result.is_none()
    }

    pub fn side_of(&self, name: &str) -> Option<Side> {
        if self.primary == name {
            Some(Side::Primary)
        } else if self.opponent.as_deref() == Some(name) {
            Some(Side::Opponent)
        } else {
            None
        }
    }

    pub fn name_of(&self, side: Side) -> Option<&str> {
        match side {
            Side::Primary => Some(&self.primary),
            Side::Opponent => self.opponent.as_deref(),
        }
    }

    /// Take the opponent seat and create the second board.
    pub fn join(&mut self, name: &str) -> Result<(), SessionError> {
        if self.primary == name {
            return Err(SessionError::OwnMatch);
        }
        if self.opponent.is_some() || self.result.is_some() {
            return Err(SessionError::Occupied(self.id));
        }
        self.opponent = Some(name.to_string());
        self.opponent_board = Some(Board::new());
        Ok(())
    }

    pub fn board(&self, side: Side) -> Option<&Board> {
        match side {
            Side::Primary => Some(&self.primary_board),
            Side::Opponent => self.opponent_board.as_ref(),
        }
    }

    fn board_mut(&mut self, side: Side) -> Option<&mut Board> {
        match side {
            Side::Primary => Some(&mut self.primary_board),
            Side::Opponent => self.opponent_board.as_mut(),
        }
    }

    pub fn phase(&self) -> PlacementPhase {
        self.placement.phase()
    }

    pub fn is_ready(&self) -> bool {
        self.placement.is_ready()
    }

    pub fn fleet(&self, name: &str) -> Option<&FleetCounter> {
        self.side_of(name).map(|s| self.placement.fleet(s))
    }

    pub fn place_ship(&mut self, name: &str, req: PlacementRequest) -> Result<ShipId, PlacementError> {
        let side = self.side_of(name).ok_or(PlacementError::NotParticipant)?;
        self.placement.check_turn(side)?;
        let board = match side {
            Side::Primary => &mut self.primary_board,
            Side::Opponent => self
                .opponent_board
                .as_mut()
                .ok_or(PlacementError::NotParticipant)?,
        };
        place_ship(board, self.placement.fleet_mut(side), req)
    }

    /// `name` declares their fleet complete. Entering `MatchReady` picks the first attacker.
    pub fn finish_placement(&mut self, name: &str) -> Result<PlacementPhase, PlacementError> {
        let side = self.side_of(name).ok_or(PlacementError::NotParticipant)?;
        let phase = self.placement.finish(side)?;
        if phase == PlacementPhase::MatchReady {
            self.turn = Some(match self.starter {
                StarterPolicy::Creator => Side::Primary,
                StarterPolicy::Joiner => Side::Opponent,
                StarterPolicy::Random => {
                    if rand::rng().random_bool(0.5) {
                        Side::Primary
                    } else {
                        Side::Opponent
                    }
                }
            });
        }
        Ok(phase)
    }

    pub fn turn_holder(&self) -> Option<&str> {
        self.turn.and_then(|s| self.name_of(s))
    }

    pub fn moves(&self) -> &[Move] {
        &self.moves
    }

    pub fn result(&self) -> Option<&MatchResult> {
        self.result.as_ref()
    }

    /// Resolve one attack by `attacker`. Any error leaves the match unchanged.
    pub fn attack(&mut self, attacker: &str, coord: Coord) -> Result<AttackReport, AttackError> {
        if self.result.is_some() {
            return Err(AttackError::Finished);
        }
        let side = self.side_of(attacker).ok_or(AttackError::NotParticipant)?;
        if !self.is_ready() {
            return Err(AttackError::NotReady);
        }
        if self.turn != Some(side) {
            return Err(AttackError::NotYourTurn);
        }
        let defender_side = side.other();
        let defender = self
            .name_of(defender_side)
            .ok_or(AttackError::NotReady)?
            .to_string();
        let board = self.board_mut(defender_side).ok_or(AttackError::NotReady)?;
        let outcome = board.attack(coord)?;
        let finished = board.all_ships_sunk();

        self.moves.push(Move {
            attacker: attacker.to_string(),
            coord,
            outcome,
        });
        if finished {
            self.turn = None;
            self.result = Some(MatchResult {
                winner: attacker.to_string(),
                loser: defender.clone(),
                forfeit: false,
            });
        } else {
            self.turn = Some(defender_side);
        }
        Ok(AttackReport {
            attacker: attacker.to_string(),
            defender,
            coord,
            outcome,
            finished,
        })
    }

    /// `leaver` abandons the match; the other seated player wins if there is one.
    pub fn forfeit(&mut self, leaver: &str) -> Option<&MatchResult> {
        if self.result.is_some() {
            return None;
        }
        let side = self.side_of(leaver)?;
        let winner = self.name_of(side.other())?.to_string();
        self.turn = None;
        self.result = Some(MatchResult {
            winner,
            loser: leaver.to_string(),
            forfeit: true,
        });
        self.result.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ship::{Orientation, ShipClass};

    fn one_frigate() -> FleetRules {
        FleetRules::new([0, 0, 0, 1])
    }

    fn ready_match(rules: FleetRules) -> Match {
        let mut m = Match::new(1, "ana", rules, StarterPolicy::Creator);
        m.join("bea").unwrap();
        let frigate = |r, c| PlacementRequest::new(ShipClass::Frigate, Coord::new(r, c), Orientation::Horizontal);
        m.place_ship("ana", frigate(0, 0)).unwrap();
        assert_eq!(m.finish_placement("ana"), Ok(PlacementPhase::PlacingOpponent));
        m.place_ship("bea", frigate(5, 5)).unwrap();
        assert_eq!(m.finish_placement("bea"), Ok(PlacementPhase::MatchReady));
        m
    }

    #[test]
    fn join_rules() {
        let mut m = Match::new(3, "ana", one_frigate(), StarterPolicy::Creator);
        assert!(m.is_open());
        assert_eq!(m.join("ana"), Err(SessionError::OwnMatch));
        m.join("bea").unwrap();
        assert_eq!(m.join("cris"), Err(SessionError::Occupied(3)));
        assert_eq!(m.side_of("bea"), Some(Side::Opponent));
        assert!(m.board(Side::Opponent).is_some());
    }

    #[test]
    fn placement_respects_phase() {
        let mut m = Match::new(1, "ana", one_frigate(), StarterPolicy::Creator);
        m.join("bea").unwrap();
        let req = PlacementRequest::new(ShipClass::Frigate, Coord::new(1, 1), Orientation::Vertical);
        assert_eq!(m.place_ship("bea", req), Err(PlacementError::NotYourPhase));
        assert_eq!(m.place_ship("zoe", req), Err(PlacementError::NotParticipant));
        assert!(m.place_ship("ana", req).is_ok());
    }

    #[test]
    fn turns_alternate_and_win() {
        let mut m = ready_match(one_frigate());
        assert_eq!(m.turn_holder(), Some("ana"));
        assert_eq!(m.attack("bea", Coord::new(0, 0)), Err(AttackError::NotYourTurn));

        let r = m.attack("ana", Coord::new(1, 1)).unwrap();
        assert_eq!(r.outcome, AttackOutcome::Water);
        assert_eq!(m.turn_holder(), Some("bea"));

        let r = m.attack("bea", Coord::new(4, 4)).unwrap();
        assert!(!r.finished);
        assert_eq!(
            m.attack("ana", Coord::new(1, 1)),
            Err(AttackError::AlreadyAttacked(Coord::new(1, 1)))
        );
        assert_eq!(m.turn_holder(), Some("ana"));

        let r = m.attack("ana", Coord::new(5, 5)).unwrap();
        assert_eq!(r.outcome, AttackOutcome::HitAndSunk);
        assert!(r.finished);
        assert_eq!(m.result().unwrap().winner, "ana");
        assert_eq!(m.turn_holder(), None);
        assert_eq!(m.moves().len(), 3);
        assert_eq!(m.attack("bea", Coord::new(0, 0)), Err(AttackError::Finished));
    }

    #[test]
    fn not_ready_before_placement() {
        let mut m = Match::new(1, "ana", one_frigate(), StarterPolicy::Creator);
        m.join("bea").unwrap();
        assert_eq!(m.attack("ana", Coord::new(0, 0)), Err(AttackError::NotReady));
    }

    #[test]
    fn joiner_starts_when_configured() {
        let mut m = Match::new(1, "ana", FleetRules::new([0, 0, 0, 0]), StarterPolicy::Joiner);
        m.join("bea").unwrap();
        m.finish_placement("ana").unwrap();
        m.finish_placement("bea").unwrap();
        assert_eq!(m.turn_holder(), Some("bea"));
    }

    #[test]
    fn forfeit_awards_the_other_player() {
        let mut m = ready_match(one_frigate());
        let result = m.forfeit("bea").cloned().unwrap();
        assert_eq!(result.winner, "ana");
        assert!(result.forfeit);
        assert!(m.forfeit("ana").is_none());

        let mut open = Match::new(2, "cris", one_frigate(), StarterPolicy::Creator);
        assert!(open.forfeit("cris").is_none());
    }
}
