//! Common types: coordinates, attack outcomes and the error taxonomy.

use core::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ship::{Orientation, ShipClass};

/// A 0-indexed (row, column) position on a board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Coord {
    pub row: u8,
    pub col: u8,
}

impl Coord {
    pub const fn new(row: u8, col: u8) -> Self {
        Self { row, col }
    }

    pub fn in_bounds(&self, size: u8) -> bool {
        self.row < size && self.col < size
    }

    /// The coordinate `offset` cells away along `orientation`, if it fits in a `u8`.
    pub fn step(&self, orientation: Orientation, offset: u8) -> Option<Coord> {
        match orientation {
            Orientation::Horizontal => self.col.checked_add(offset).map(|c| Coord::new(self.row, c)),
            Orientation::Vertical => self.row.checked_add(offset).map(|r| Coord::new(r, self.col)),
        }
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.row, self.col)
    }
}

/// Result of a resolved attack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttackOutcome {
    /// Attack landed on empty water.
    Water,
    /// Attack hit a ship that is still afloat.
    Hit,
    /// Attack hit the last intact cell of a ship.
    HitAndSunk,
}

impl AttackOutcome {
    /// Wire token for the outcome.
    pub fn token(&self) -> &'static str {
        match self {
            AttackOutcome::Water => "agua",
            AttackOutcome::Hit => "tocado",
            AttackOutcome::HitAndSunk => "hundido",
        }
    }
}

impl fmt::Display for AttackOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl core::str::FromStr for AttackOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "agua" => Ok(AttackOutcome::Water),
            "tocado" => Ok(AttackOutcome::Hit),
            "hundido" => Ok(AttackOutcome::HitAndSunk),
            other => Err(format!("unknown attack outcome '{}'", other)),
        }
    }
}

/// Reasons a ship placement or placement-phase request is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PlacementError {
    #[error("ship would run off the board")]
    OutOfBounds,
    #[error("a target cell is already occupied")]
    Occupied,
    #[error("no {0} left to place")]
    FleetLimitReached(ShipClass),
    #[error("it is not your placement phase")]
    NotYourPhase,
    #[error("fleet is not complete")]
    FleetIncomplete,
    #[error("you are not playing this match")]
    NotParticipant,
}

/// Reasons an attack is refused. None of them mutate the match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AttackError {
    #[error("match is not ready")]
    NotReady,
    #[error("it is not your turn")]
    NotYourTurn,
    #[error("coordinate {0} is off the board")]
    InvalidCoordinate(Coord),
    #[error("coordinate {0} was already attacked")]
    AlreadyAttacked(Coord),
    #[error("match is already finished")]
    Finished,
    #[error("you are not playing this match")]
    NotParticipant,
}

/// Registry-level failures (matchmaking and lookup).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("match {0} not found")]
    NotFound(u64),
    #[error("match {0} already has two players")]
    Occupied(u64),
    #[error("cannot join your own match")]
    OwnMatch,
    #[error("already playing match {0}")]
    AlreadyInMatch(u64),
    #[error("no active match")]
    NoActiveMatch,
}

/// Authentication failures. They deny the connection, never the server.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("invalid username or password")]
    BadCredentials,
    #[error("user {0} already exists")]
    UserExists(String),
    #[error("invalid username '{0}'")]
    InvalidName(String),
    #[error("user {0} is already connected")]
    AlreadyConnected(String),
    #[error("user store failure: {0}")]
    Store(String),
}

/// Malformed or unknown client input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("empty command")]
    Empty,
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("malformed {command}: {reason}")]
    Malformed {
        command: &'static str,
        reason: String,
    },
}
