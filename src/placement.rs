//! Placement validation, ship construction and the placement-phase machine.

use serde::{Deserialize, Serialize};

use crate::board::Board;
use crate::cell::{CellState, ShipId};
use crate::common::{Coord, PlacementError};
use crate::fleet::{FleetCounter, FleetRules};
use crate::game::Side;
use crate::ship::{Orientation, ShipClass};

/// A request to put one ship on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementRequest {
    pub class: ShipClass,
    pub anchor: Coord,
    pub orientation: Orientation,
}

impl PlacementRequest {
    pub fn new(class: ShipClass, anchor: Coord, orientation: Orientation) -> Self {
        Self {
            class,
            anchor,
            orientation,
        }
    }
}

/// Validate `req` against `board` and `fleet`, then create the ship.
///
/// Every check runs before the first mutation, so a rejected request leaves
/// both the board and the counter exactly as they were.
pub fn place_ship(
    board: &mut Board,
    fleet: &mut FleetCounter,
    req: PlacementRequest,
) -> Result<ShipId, PlacementError> {
    let cells = board
        .footprint(req.class, req.anchor, req.orientation)
        .ok_or(PlacementError::OutOfBounds)?;
    if cells
        .iter()
        .any(|c| board.state_at(*c) != CellState::UnknownWater)
    {
        return Err(PlacementError::Occupied);
    }
    fleet.check(req.class)?;

    let id = board.bind_ship(req.class, cells);
    fleet.record(req.class);
    Ok(id)
}

/// Which side may currently place and finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlacementPhase {
    PlacingPrimary,
    PlacingOpponent,
    MatchReady,
}

/// Placement progress for one match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementState {
    phase: PlacementPhase,
    primary: FleetCounter,
    opponent: FleetCounter,
}

impl PlacementState {
    pub fn new(rules: FleetRules) -> Self {
        Self {
            phase: PlacementPhase::PlacingPrimary,
            primary: FleetCounter::new(rules),
            opponent: FleetCounter::new(rules),
        }
    }

    pub fn phase(&self) -> PlacementPhase {
        self.phase
    }

    pub fn is_ready(&self) -> bool {
        self.phase == PlacementPhase::MatchReady
    }

    pub fn fleet(&self, side: Side) -> &FleetCounter {
        match side {
            Side::Primary => &self.primary,
            Side::Opponent => &self.opponent,
        }
    }

    pub(crate) fn fleet_mut(&mut self, side: Side) -> &mut FleetCounter {
        match side {
            Side::Primary => &mut self.primary,
            Side::Opponent => &mut self.opponent,
        }
    }

    /// `Ok` when `side` owns the current phase.
    pub fn check_turn(&self, side: Side) -> Result<(), PlacementError> {
        match (self.phase, side) {
            (PlacementPhase::PlacingPrimary, Side::Primary)
            | (PlacementPhase::PlacingOpponent, Side::Opponent) => Ok(()),
            _ => Err(PlacementError::NotYourPhase),
        }
    }

    /// `side` reports its fleet complete. Returns the phase entered.
    pub fn finish(&mut self, side: Side) -> Result<PlacementPhase, PlacementError> {
        self.check_turn(side)?;
        if !self.fleet(side).is_complete() {
            return Err(PlacementError::FleetIncomplete);
        }
        self.phase = match self.phase {
            PlacementPhase::PlacingPrimary => PlacementPhase::PlacingOpponent,
            _ => PlacementPhase::MatchReady,
        };
        Ok(self.phase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(class: ShipClass, r: u8, c: u8, o: Orientation) -> PlacementRequest {
        PlacementRequest::new(class, Coord::new(r, c), o)
    }

    #[test]
    fn places_carrier() {
        let mut board = Board::new();
        let mut fleet = FleetCounter::new(FleetRules::default());
        let id = place_ship(
            &mut board,
            &mut fleet,
            req(ShipClass::Carrier, 0, 0, Orientation::Horizontal),
        )
        .unwrap();
        assert_eq!(board.ship(id).unwrap().cells().len(), 4);
        assert_eq!(board.state_at(Coord::new(0, 3)), CellState::UnknownShip);
        assert_eq!(board.state_at(Coord::new(0, 4)), CellState::UnknownWater);
        assert_eq!(fleet.placed(ShipClass::Carrier), 1);
    }

    #[test]
    fn rejections_do_not_mutate() {
        let mut board = Board::new();
        let mut fleet = FleetCounter::new(FleetRules::default());
        place_ship(
            &mut board,
            &mut fleet,
            req(ShipClass::Carrier, 2, 2, Orientation::Vertical),
        )
        .unwrap();
        let (board_before, fleet_before) = (board.clone(), fleet);

        assert_eq!(
            place_ship(
                &mut board,
                &mut fleet,
                req(ShipClass::Submarine, 6, 0, Orientation::Vertical)
            ),
            Err(PlacementError::OutOfBounds)
        );
        assert_eq!(
            place_ship(
                &mut board,
                &mut fleet,
                req(ShipClass::Submarine, 4, 0, Orientation::Horizontal)
            ),
            Err(PlacementError::Occupied)
        );
        assert_eq!(
            place_ship(
                &mut board,
                &mut fleet,
                req(ShipClass::Carrier, 0, 4, Orientation::Horizontal)
            ),
            Err(PlacementError::FleetLimitReached(ShipClass::Carrier))
        );
        assert_eq!(board, board_before);
        assert_eq!(fleet, fleet_before);
    }

    #[test]
    fn phase_machine_is_sequential() {
        let mut state = PlacementState::new(FleetRules::new([0, 0, 0, 1]));
        assert_eq!(state.finish(Side::Opponent), Err(PlacementError::NotYourPhase));
        assert_eq!(state.finish(Side::Primary), Err(PlacementError::FleetIncomplete));

        state.fleet_mut(Side::Primary).record(ShipClass::Frigate);
        assert_eq!(state.finish(Side::Primary), Ok(PlacementPhase::PlacingOpponent));
        assert_eq!(state.check_turn(Side::Primary), Err(PlacementError::NotYourPhase));

        state.fleet_mut(Side::Opponent).record(ShipClass::Frigate);
        assert_eq!(state.finish(Side::Opponent), Ok(PlacementPhase::MatchReady));
        assert!(state.is_ready());
        assert_eq!(state.finish(Side::Opponent), Err(PlacementError::NotYourPhase));
    }
}
