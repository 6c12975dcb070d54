//! Square grid of cells plus the arena of ships placed on it.

use core::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::cell::{Cell, CellState, ShipId};
use crate::common::{AttackError, AttackOutcome, Coord};
use crate::config::BOARD_SIZE;
use crate::ship::{Orientation, Ship, ShipClass};

/// One player's waters. Cells reference ships by index into `ships`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    size: u8,
    cells: Vec<Cell>,
    ships: Vec<Ship>,
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}

impl Board {
    /// Create an empty board of the standard size.
    pub fn new() -> Self {
        Self::with_size(BOARD_SIZE)
    }

    /// Create an empty `size`×`size` board.
    pub fn with_size(size: u8) -> Self {
        let cells = (0..size)
            .flat_map(|r| (0..size).map(move |c| Cell::new(Coord::new(r, c))))
            .collect();
        Self {
            size,
            cells,
            ships: Vec::new(),
        }
    }

    pub fn size(&self) -> u8 {
        self.size
    }

    fn index(&self, coord: Coord) -> Option<usize> {
        coord
            .in_bounds(self.size)
            .then(|| coord.row as usize * self.size as usize + coord.col as usize)
    }

    /// Cell at `coord`, or `None` when out of bounds.
    pub fn cell_at(&self, coord: Coord) -> Option<&Cell> {
        self.index(coord).map(|i| &self.cells[i])
    }

    /// State at `coord`; out-of-bounds coordinates read as open water.
    pub fn state_at(&self, coord: Coord) -> CellState {
        self.cell_at(coord)
            .map(Cell::state)
            .unwrap_or(CellState::UnknownWater)
    }

    pub fn ships(&self) -> &[Ship] {
        &self.ships
    }

    pub fn ship(&self, id: ShipId) -> Option<&Ship> {
        self.ships.get(id)
    }

    pub fn is_ship_sunk(&self, id: ShipId) -> bool {
        self.ships
            .get(id)
            .is_some_and(|s| s.is_sunk(|c| self.state_at(c)))
    }

    /// True when every ship on the board is sunk. Recomputed from cell states on each call.
    pub fn all_ships_sunk(&self) -> bool {
        self.cells
            .iter()
            .filter_map(Cell::ship)
            .all(|id| self.is_ship_sunk(id))
    }

    /// Coordinates a ship of `class` would cover from `anchor`, or `None` if it runs off the board.
    pub fn footprint(
        &self,
        class: ShipClass,
        anchor: Coord,
        orientation: Orientation,
    ) -> Option<Vec<Coord>> {
        (0..class.size())
            .map(|i| anchor.step(orientation, i).filter(|c| c.in_bounds(self.size)))
            .collect()
    }

    /// Register a ship and bind its cells. Callers validate the footprint first.
    pub(crate) fn bind_ship(&mut self, class: ShipClass, cells: Vec<Coord>) -> ShipId {
        let id = self.ships.len();
        for coord in &cells {
            if let Some(i) = self.index(*coord) {
                self.cells[i].bind(id);
            }
        }
        self.ships.push(Ship::new(class, cells));
        id
    }

    /// Resolve an attack at `coord`. Rejected attacks leave the board untouched.
    pub fn attack(&mut self, coord: Coord) -> Result<AttackOutcome, AttackError> {
        let i = self.index(coord).ok_or(AttackError::InvalidCoordinate(coord))?;
        if self.cells[i].state().is_revealed() {
            return Err(AttackError::AlreadyAttacked(coord));
        }
        let prior = self.cells[i].attack();
        if prior == CellState::UnknownWater {
            return Ok(AttackOutcome::Water);
        }
        match self.cells[i].ship() {
            Some(id) if self.is_ship_sunk(id) => Ok(AttackOutcome::HitAndSunk),
            _ => Ok(AttackOutcome::Hit),
        }
    }

    /// Random anchor and orientation where a ship of `class` fits on open water.
    pub fn random_placement<R: Rng>(
        &self,
        rng: &mut R,
        class: ShipClass,
    ) -> Option<(Coord, Orientation)> {
        for _ in 0..100 {
            let orient = if rng.random() {
                Orientation::Horizontal
            } else {
                Orientation::Vertical
            };
            let anchor = Coord::new(
                rng.random_range(0..self.size),
                rng.random_range(0..self.size),
            );
            let fits = self.footprint(class, anchor, orient).is_some_and(|cells| {
                cells
                    .iter()
                    .all(|c| self.state_at(*c) == CellState::UnknownWater)
            });
            if fits {
                return Some((anchor, orient));
            }
        }
        None
    }
}

impl fmt::Debug for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for r in 0..self.size {
            for c in 0..self.size {
                let glyph = match self.state_at(Coord::new(r, c)) {
                    CellState::UnknownWater => '.',
                    CellState::UnknownShip => 'S',
                    CellState::Water => 'o',
                    CellState::Hit => 'X',
                };
                write!(f, "{}", glyph)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
