//! Ship classes and placed ships.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::cell::CellState;
use crate::common::Coord;

/// Orientation of a ship on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Orientation {
    Horizontal,
    Vertical,
}

impl FromStr for Orientation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "h" | "horizontal" => Ok(Orientation::Horizontal),
            "v" | "vertical" => Ok(Orientation::Vertical),
            other => Err(format!("unknown orientation '{}'", other)),
        }
    }
}

/// Class of vessel. The class fixes the ship's length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShipClass {
    Carrier,
    Submarine,
    Destroyer,
    Frigate,
}

impl ShipClass {
    pub const fn size(&self) -> u8 {
        match self {
            ShipClass::Carrier => 4,
            ShipClass::Submarine => 3,
            ShipClass::Destroyer => 2,
            ShipClass::Frigate => 1,
        }
    }

    /// Position of this class in `config::SHIP_CLASSES`.
    pub const fn index(&self) -> usize {
        match self {
            ShipClass::Carrier => 0,
            ShipClass::Submarine => 1,
            ShipClass::Destroyer => 2,
            ShipClass::Frigate => 3,
        }
    }

    /// Wire name.
    pub fn token(&self) -> &'static str {
        match self {
            ShipClass::Carrier => "portaaviones",
            ShipClass::Submarine => "submarino",
            ShipClass::Destroyer => "destructor",
            ShipClass::Frigate => "fragata",
        }
    }
}

impl fmt::Display for ShipClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for ShipClass {
    type Err = String;

    /// Accepts the wire names as well as the English class names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "portaaviones" | "carrier" => Ok(ShipClass::Carrier),
            "submarino" | "submarine" => Ok(ShipClass::Submarine),
            "destructor" | "destroyer" => Ok(ShipClass::Destroyer),
            "fragata" | "frigate" => Ok(ShipClass::Frigate),
            other => Err(format!("unknown ship class '{}'", other)),
        }
    }
}

/// A ship placed on a board. Its cells are fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ship {
    class: ShipClass,
    cells: Vec<Coord>,
}

impl Ship {
    /// Build a ship over `cells`, which must hold exactly `class.size()` coordinates.
    pub(crate) fn new(class: ShipClass, cells: Vec<Coord>) -> Self {
        debug_assert_eq!(cells.len(), class.size() as usize);
        Self { class, cells }
    }

    pub fn class(&self) -> ShipClass {
        self.class
    }

    pub fn cells(&self) -> &[Coord] {
        &self.cells
    }

    pub fn contains(&self, coord: Coord) -> bool {
        self.cells.contains(&coord)
    }

    /// Number of owned cells in state `Hit`, read through `state_at`.
    pub fn hits<F>(&self, state_at: F) -> usize
    where
        F: Fn(Coord) -> CellState,
    {
        self.cells
            .iter()
            .filter(|c| state_at(**c) == CellState::Hit)
            .count()
    }

    /// A ship is sunk once every one of its cells is `Hit`.
    pub fn is_sunk<F>(&self, state_at: F) -> bool
    where
        F: Fn(Coord) -> CellState,
    {
        self.hits(state_at) == self.class.size() as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn class_names_parse_both_languages() {
        assert_eq!("Portaaviones".parse::<ShipClass>(), Ok(ShipClass::Carrier));
        assert_eq!("frigate".parse::<ShipClass>(), Ok(ShipClass::Frigate));
        assert!("acorazado".parse::<ShipClass>().is_err());
        assert_eq!("V".parse::<Orientation>(), Ok(Orientation::Vertical));
    }

    #[test]
    fn sunk_only_after_last_cell() {
        let cells = vec![Coord::new(1, 1), Coord::new(1, 2), Coord::new(1, 3)];
        let ship = Ship::new(ShipClass::Submarine, cells.clone());
        let mut hit: HashSet<Coord> = HashSet::new();
        let view = |hit: &HashSet<Coord>| {
            let hit = hit.clone();
            move |c: Coord| {
                if hit.contains(&c) {
                    CellState::Hit
                } else {
                    CellState::UnknownShip
                }
            }
        };
        for (i, c) in cells.iter().enumerate() {
            assert!(!ship.is_sunk(view(&hit)));
            hit.insert(*c);
            assert_eq!(ship.hits(view(&hit)), i + 1);
        }
        assert!(ship.is_sunk(view(&hit)));
    }
}
