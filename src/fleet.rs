//! Per-player tally of ships placed against the fleet maxima.

use serde::{Deserialize, Serialize};

use crate::common::PlacementError;
use crate::config::{DEFAULT_FLEET_MAXIMA, NUM_CLASSES, SHIP_CLASSES};
use crate::ship::ShipClass;

/// How many ships of each class make up a complete fleet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetRules {
    maxima: [u8; NUM_CLASSES],
}

impl Default for FleetRules {
    fn default() -> Self {
        Self {
            maxima: DEFAULT_FLEET_MAXIMA,
        }
    }
}

impl FleetRules {
    /// Maxima indexed like `config::SHIP_CLASSES`.
    pub fn new(maxima: [u8; NUM_CLASSES]) -> Self {
        Self { maxima }
    }

    pub fn max(&self, class: ShipClass) -> u8 {
        self.maxima[class.index()]
    }

    /// Number of cells a complete fleet occupies.
    pub fn total_cells(&self) -> usize {
        SHIP_CLASSES
            .iter()
            .map(|c| c.size() as usize * self.max(*c) as usize)
            .sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetCounter {
    rules: FleetRules,
    placed: [u8; NUM_CLASSES],
}

impl FleetCounter {
    pub fn new(rules: FleetRules) -> Self {
        Self {
            rules,
            placed: [0; NUM_CLASSES],
        }
    }

    pub fn placed(&self, class: ShipClass) -> u8 {
        self.placed[class.index()]
    }

    pub fn remaining(&self, class: ShipClass) -> u8 {
        self.rules.max(class).saturating_sub(self.placed(class))
    }

    /// Fails with `FleetLimitReached` when the class is already at its maximum.
    pub fn check(&self, class: ShipClass) -> Result<(), PlacementError> {
        if self.remaining(class) == 0 {
            Err(PlacementError::FleetLimitReached(class))
        } else {
            Ok(())
        }
    }

    pub(crate) fn record(&mut self, class: ShipClass) {
        self.placed[class.index()] += 1;
    }

    pub fn is_complete(&self) -> bool {
        SHIP_CLASSES.iter().all(|c| self.remaining(*c) == 0)
    }

    /// `portaaviones=0,submarino=1,...` in class order.
    pub fn remaining_summary(&self) -> String {
        SHIP_CLASSES
            .iter()
            .map(|c| format!("{}={}", c.token(), self.remaining(*c)))
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_to_the_default_maxima() {
        let mut fleet = FleetCounter::new(FleetRules::default());
        assert_eq!(
            fleet.remaining_summary(),
            "portaaviones=1,submarino=2,destructor=3,fragata=4"
        );
        fleet.record(ShipClass::Carrier);
        assert_eq!(
            fleet.check(ShipClass::Carrier),
            Err(PlacementError::FleetLimitReached(ShipClass::Carrier))
        );
        assert!(!fleet.is_complete());
        for class in [ShipClass::Submarine, ShipClass::Destroyer, ShipClass::Frigate] {
            while fleet.check(class).is_ok() {
                fleet.record(class);
            }
        }
        assert!(fleet.is_complete());
        // 1x4 + 2x3 + 3x2 + 4x1
        assert_eq!(FleetRules::default().total_cells(), 20);
        assert_eq!(FleetRules::new([0, 0, 2, 1]).total_cells(), 5);
    }

    #[test]
    fn custom_rules() {
        let fleet = FleetCounter::new(FleetRules::new([0, 0, 0, 1]));
        assert_eq!(fleet.remaining(ShipClass::Frigate), 1);
        assert!(fleet.check(ShipClass::Carrier).is_err());
    }
}
