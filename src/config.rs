use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ship::ShipClass;

pub const BOARD_SIZE: u8 = 8;
pub const NUM_CLASSES: usize = 4;

/// Ship classes in the order fleets are reported, largest first.
pub const SHIP_CLASSES: [ShipClass; NUM_CLASSES] = [
    ShipClass::Carrier,
    ShipClass::Submarine,
    ShipClass::Destroyer,
    ShipClass::Frigate,
];

/// Default fleet: 1 carrier, 2 submarines, 3 destroyers, 4 frigates.
pub const DEFAULT_FLEET_MAXIMA: [u8; NUM_CLASSES] = [1, 2, 3, 4];

/// Upper bound on a single frame, in bytes.
pub const MAX_FRAME_SIZE: u32 = 64 * 1024;

/// Who attacks first once both fleets are in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StarterPolicy {
    #[default]
    Creator,
    Joiner,
    Random,
}

/// Runtime tunables for the match server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
    /// Root for `users.json` and the `matches/` directory.
    pub data_dir: PathBuf,
    /// How long background waiters wait for the other player.
    pub wait_timeout: Duration,
    /// A connection that sends nothing for this long is closed.
    pub idle_timeout: Duration,
    pub write_timeout: Duration,
    pub max_auth_attempts: u32,
    pub starter: StarterPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5000".to_string(),
            data_dir: PathBuf::from("data"),
            wait_timeout: Duration::from_secs(300),
            idle_timeout: Duration::from_secs(1800),
            write_timeout: Duration::from_secs(30),
            max_auth_attempts: 3,
            starter: StarterPolicy::Creator,
        }
    }
}
