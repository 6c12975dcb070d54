use naval_duel::{
    place_ship, AttackError, AttackOutcome, Board, CellState, Coord, FleetCounter, FleetRules,
    Orientation, PlacementError, PlacementRequest, ShipClass, BOARD_SIZE, SHIP_CLASSES,
};
use proptest::prelude::*;
use rand::{rngs::SmallRng, SeedableRng};

fn random_fleet(seed: u64) -> Board {
    fleet_board(seed, FleetRules::default())
}

fn fleet_board(seed: u64, rules: FleetRules) -> Board {
    let mut rng = SmallRng::seed_from_u64(seed);
    'attempt: loop {
        let mut board = Board::new();
        let mut fleet = FleetCounter::new(rules);
        for class in SHIP_CLASSES {
            for _ in 0..rules.max(class) {
                let Some((anchor, orient)) = board.random_placement(&mut rng, class) else {
                    continue 'attempt;
                };
                place_ship(&mut board, &mut fleet, PlacementRequest::new(class, anchor, orient))
                    .unwrap();
            }
        }
        assert!(fleet.is_complete());
        return board;
    }
}

fn snapshot(board: &Board) -> Vec<CellState> {
    let size = board.size();
    (0..size)
        .flat_map(|r| (0..size).map(move |c| Coord::new(r, c)))
        .map(|c| board.state_at(c))
        .collect()
}

fn class_strategy() -> impl Strategy<Value = ShipClass> {
    prop_oneof![
        Just(ShipClass::Carrier),
        Just(ShipClass::Submarine),
        Just(ShipClass::Destroyer),
        Just(ShipClass::Frigate),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn second_attack_is_rejected_without_change(
        seed in any::<u64>(),
        row in 0..BOARD_SIZE,
        col in 0..BOARD_SIZE,
    ) {
        let mut board = random_fleet(seed);
        let target = Coord::new(row, col);
        let before = snapshot(&board);
        board.attack(target).unwrap();
        let after = snapshot(&board);
        prop_assert_ne!(&before, &after);

        prop_assert_eq!(board.attack(target), Err(AttackError::AlreadyAttacked(target)));
        prop_assert_eq!(snapshot(&board), after);
    }

    #[test]
    fn rejected_placement_leaves_board_untouched(
        seed in any::<u64>(),
        class in class_strategy(),
        row in 0..BOARD_SIZE + 2,
        col in 0..BOARD_SIZE + 2,
        vertical in any::<bool>(),
    ) {
        let mut board = fleet_board(seed, FleetRules::new([1, 1, 1, 1]));
        let mut fleet = FleetCounter::new(FleetRules::default());
        let orient = if vertical { Orientation::Vertical } else { Orientation::Horizontal };
        let before = snapshot(&board);
        let ships_before = board.ships().len();

        match place_ship(&mut board, &mut fleet, PlacementRequest::new(class, Coord::new(row, col), orient)) {
            Ok(id) => {
                prop_assert_eq!(board.ships().len(), ships_before + 1);
                prop_assert_eq!(board.ship(id).map(|s| s.cells().len()), Some(class.size() as usize));
                prop_assert_eq!(fleet.placed(class), 1);
            }
            Err(e) => {
                prop_assert!(matches!(e, PlacementError::OutOfBounds | PlacementError::Occupied));
                prop_assert_eq!(snapshot(&board), before);
                prop_assert_eq!(board.ships().len(), ships_before);
                prop_assert_eq!(fleet.placed(class), 0);
            }
        }
    }

    #[test]
    fn ship_sinks_exactly_on_its_last_cell(seed in any::<u64>()) {
        let mut board = random_fleet(seed);
        let ships: Vec<Vec<Coord>> = board.ships().iter().map(|s| s.cells().to_vec()).collect();
        for (id, cells) in ships.iter().enumerate() {
            for (i, cell) in cells.iter().enumerate() {
                prop_assert!(!board.is_ship_sunk(id));
                let outcome = board.attack(*cell).unwrap();
                if i + 1 == cells.len() {
                    prop_assert_eq!(outcome, AttackOutcome::HitAndSunk);
                } else {
                    prop_assert_eq!(outcome, AttackOutcome::Hit);
                }
            }
            prop_assert!(board.is_ship_sunk(id));
            prop_assert_eq!(board.all_ships_sunk(), id + 1 == ships.len());
        }
    }

    #[test]
    fn water_never_hits(seed in any::<u64>()) {
        let mut board = random_fleet(seed);
        let size = board.size();
        for r in 0..size {
            for c in 0..size {
                let coord = Coord::new(r, c);
                let had_ship = board.state_at(coord) == CellState::UnknownShip;
                let outcome = board.attack(coord).unwrap();
                prop_assert_eq!(outcome == AttackOutcome::Water, !had_ship);
            }
        }
        prop_assert!(board.all_ships_sunk());
    }
}
