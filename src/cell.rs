//! Per-coordinate damage state.

use serde::{Deserialize, Serialize};

use crate::common::Coord;

/// Index of a ship inside its board's arena.
pub type ShipId = usize;

/// Damage state of a single cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CellState {
    /// No ship, not yet attacked.
    #[default]
    UnknownWater,
    /// Ship present, not yet attacked.
    UnknownShip,
    /// Attacked and empty.
    Water,
    /// Attacked and occupied.
    Hit,
}

impl CellState {
    /// State after one attack. `Water` and `Hit` are fixed points.
    pub fn attacked(self) -> CellState {
        match self {
            CellState::UnknownWater | CellState::Water => CellState::Water,
            CellState::UnknownShip | CellState::Hit => CellState::Hit,
        }
    }

    /// Whether this cell has already taken an attack.
    pub fn is_revealed(self) -> bool {
        matches!(self, CellState::Water | CellState::Hit)
    }

    pub fn has_ship(self) -> bool {
        matches!(self, CellState::UnknownShip | CellState::Hit)
    }
}

/// One grid position. The ship link is a lookup into the owning board's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    coord: Coord,
    state: CellState,
    ship: Option<ShipId>,
}

impl Cell {
    pub fn new(coord: Coord) -> Self {
        Self {
            coord,
            state: CellState::UnknownWater,
            ship: None,
        }
    }

    pub fn coord(&self) -> Coord {
        self.coord
    }

    pub fn state(&self) -> CellState {
        self.state
    }

    pub fn ship(&self) -> Option<ShipId> {
        self.ship
    }

    /// Bind a ship to this cell. Callers must have checked the cell is `UnknownWater`.
    pub(crate) fn bind(&mut self, ship: ShipId) {
        debug_assert_eq!(self.state, CellState::UnknownWater);
        self.state = CellState::UnknownShip;
        self.ship = Some(ship);
    }

    /// Apply the attack transition and return the state the cell had before.
    pub(crate) fn attack(&mut self) -> CellState {
        let prior = self.state;
        self.state = prior.attacked();
        prior
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions() {
        assert_eq!(CellState::UnknownWater.attacked(), CellState::Water);
        assert_eq!(CellState::UnknownShip.attacked(), CellState::Hit);
        assert_eq!(CellState::Water.attacked(), CellState::Water);
        assert_eq!(CellState::Hit.attacked(), CellState::Hit);
    }

    #[test]
    fn bind_then_attack() {
        let mut cell = Cell::new(Coord::new(2, 3));
        cell.bind(7);
        assert_eq!(cell.state(), CellState::UnknownShip);
        assert_eq!(cell.ship(), Some(7));
        assert_eq!(cell.attack(), CellState::UnknownShip);
        assert_eq!(cell.state(), CellState::Hit);
        assert_eq!(cell.attack(), CellState::Hit);
        assert_eq!(cell.ship(), Some(7));
    }
}
