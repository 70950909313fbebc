//! Executor and world-model tests: action semantics, faults, sensor
//! complement invariants, clone independence and lesson JSON loading.

use karel_world::executor::{apply, move_forward, pick_beeper, put_beeper, sense, turn_left};
use karel_world::{
    Action, Direction, ExecutionFault, Position, Primitive, Sensor, Wall, World, WorldBuilder,
    WorldError, UNLIMITED_BAG,
};

// ─────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────

fn facing(direction: Direction) -> World {
    WorldBuilder::new()
        .robot(1, 1, direction)
        .build()
        .expect("valid world")
}

/// A small walled world with a few piles, for sweeping every state.
fn maze() -> World {
    WorldBuilder::new()
        .size(4, 3)
        .vertical_wall(1, 1)
        .horizontal_wall(2, 2)
        .vertical_wall(3, 3)
        .beepers(2, 2, 3)
        .beepers(4, 1, 1)
        .build()
        .expect("valid world")
}

/// Every robot pose and a range of bag values inside `base`.
fn every_state(base: &World) -> Vec<World> {
    let mut states = Vec::new();
    for x in 1..=base.dimensions.width {
        for y in 1..=base.dimensions.height {
            for direction in Direction::ALL {
                for bag in [UNLIMITED_BAG, 0, 1, 7] {
                    let mut w = base.clone();
                    w.robot.position = Position::new(x, y);
                    w.robot.direction = direction;
                    w.robot.bag = bag;
                    states.push(w);
                }
            }
        }
    }
    states
}

// ─────────────────────────────────────────────────────────────────────
// move
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_move_south_from_origin_is_boundary_violation() {
    let w = facing(Direction::South);
    assert_eq!(
        move_forward(&w),
        Err(ExecutionFault::BoundaryViolation {
            x: 1,
            y: 1,
            direction: Direction::South
        })
    );
}

#[test]
fn test_move_east_from_origin() {
    let next = move_forward(&World::default()).unwrap();
    assert_eq!(next.robot.position, Position::new(2, 1));
    assert_eq!(next.robot.direction, Direction::East);
    assert_eq!(next.robot.bag, 0);
}

#[test]
fn test_move_north_increases_y() {
    let next = move_forward(&facing(Direction::North)).unwrap();
    assert_eq!(next.robot.position, Position::new(1, 2));
}

#[test]
fn test_move_into_wall_is_collision() {
    let w = WorldBuilder::new().vertical_wall(1, 1).build().unwrap();
    let err = move_forward(&w).unwrap_err();
    assert!(matches!(err, ExecutionFault::WallCollision { x: 1, y: 1, .. }));
    assert_eq!(err.code().0, 300);
}

#[test]
fn test_wall_blocks_from_both_sides() {
    let w = WorldBuilder::new()
        .robot(2, 1, Direction::West)
        .vertical_wall(1, 1)
        .build()
        .unwrap();
    assert!(matches!(
        move_forward(&w),
        Err(ExecutionFault::WallCollision { .. })
    ));

    let w = WorldBuilder::new()
        .robot(3, 3, Direction::South)
        .horizontal_wall(3, 2)
        .build()
        .unwrap();
    assert!(matches!(
        move_forward(&w),
        Err(ExecutionFault::WallCollision { .. })
    ));
}

#[test]
fn test_fault_leaves_world_unchanged() {
    let w = facing(Direction::West);
    let before = w.clone();
    assert!(apply(&w, Action::Move).is_err());
    assert!(apply(&w, Action::PickBeeper).is_err());
    assert!(apply(&w, Action::PutBeeper).is_err());
    assert_eq!(w, before);
}

#[test]
fn test_four_left_turns_return_to_start() {
    let mut w = World::default();
    for _ in 0..4 {
        w = turn_left(&w);
    }
    assert_eq!(w, World::default());
}

// ─────────────────────────────────────────────────────────────────────
// Beepers
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_pick_with_no_pile() {
    let w = World::default();
    assert_eq!(
        pick_beeper(&w),
        Err(ExecutionFault::NoBeeperPresent { x: 1, y: 1 })
    );
}

#[test]
fn test_pick_last_beeper_removes_pile() {
    let w = WorldBuilder::new().beepers(1, 1, 1).build().unwrap();
    let next = pick_beeper(&w).unwrap();
    assert!(next.piles.is_empty());
    assert_eq!(next.robot.bag, 1);
}

#[test]
fn test_pick_from_larger_pile_decrements() {
    let w = WorldBuilder::new().beepers(1, 1, 3).bag(2).build().unwrap();
    let next = pick_beeper(&w).unwrap();
    assert_eq!(next.beepers_at(1, 1), 2);
    assert_eq!(next.robot.bag, 3);
}

#[test]
fn test_pick_into_unlimited_bag_stays_unlimited() {
    let w = WorldBuilder::new().beepers(1, 1, 2).unlimited_bag().build().unwrap();
    let next = pick_beeper(&w).unwrap();
    assert_eq!(next.robot.bag, UNLIMITED_BAG);
    assert_eq!(next.beepers_at(1, 1), 1);
}

#[test]
fn test_put_with_empty_bag() {
    assert_eq!(put_beeper(&World::default()), Err(ExecutionFault::BagEmpty));
}

#[test]
fn test_put_creates_then_grows_pile() {
    let w = WorldBuilder::new().bag(2).build().unwrap();
    let once = put_beeper(&w).unwrap();
    assert_eq!(once.beepers_at(1, 1), 1);
    assert_eq!(once.robot.bag, 1);
    let twice = put_beeper(&once).unwrap();
    assert_eq!(twice.beepers_at(1, 1), 2);
    assert_eq!(twice.robot.bag, 0);
    assert_eq!(twice.piles.len(), 1);
}

#[test]
fn test_put_from_unlimited_bag_never_decrements() {
    let mut w = WorldBuilder::new().unlimited_bag().build().unwrap();
    for _ in 0..50 {
        w = put_beeper(&w).unwrap();
    }
    assert_eq!(w.robot.bag, UNLIMITED_BAG);
    assert_eq!(w.beepers_at(1, 1), 50);
}

// ─────────────────────────────────────────────────────────────────────
// Sensors
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_every_sensor_pair_is_complementary_in_every_state() {
    let sensors: Vec<Sensor> = Primitive::ALL
        .into_iter()
        .filter_map(|p| match p {
            Primitive::Sensor(s) => Some(s),
            Primitive::Action(_) => None,
        })
        .collect();
    for base in [World::default(), maze()] {
        for w in every_state(&base) {
            for &s in &sensors {
                assert_eq!(
                    sense(&w, s),
                    !sense(&w, s.complement()),
                    "{s:?} at {:?}",
                    w.robot
                );
            }
        }
    }
}

#[test]
fn test_facing_sensors_match_direction() {
    for d in Direction::ALL {
        let w = facing(d);
        assert_eq!(sense(&w, Sensor::FacingNorth), d == Direction::North);
        assert_eq!(sense(&w, Sensor::FacingEast), d == Direction::East);
        assert_eq!(sense(&w, Sensor::FacingSouth), d == Direction::South);
        assert_eq!(sense(&w, Sensor::FacingWest), d == Direction::West);
    }
}

#[test]
fn test_front_left_right_at_origin() {
    // Facing east at (1,1): south and west are world edges.
    let w = World::default();
    assert!(sense(&w, Sensor::FrontIsClear));
    assert!(sense(&w, Sensor::LeftIsClear));
    assert!(sense(&w, Sensor::RightIsBlocked));
}

#[test]
fn test_front_is_clear_agrees_with_move() {
    for w in every_state(&maze()) {
        assert_eq!(sense(&w, Sensor::FrontIsClear), move_forward(&w).is_ok());
    }
}

#[test]
fn test_bag_sensors_treat_unlimited_as_present() {
    let w = WorldBuilder::new().unlimited_bag().build().unwrap();
    assert!(sense(&w, Sensor::BeepersInBag));
    assert!(!sense(&w, Sensor::NoBeepersInBag));
    assert!(sense(&World::default(), Sensor::NoBeepersInBag));
}

// ─────────────────────────────────────────────────────────────────────
// Cloning
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_clone_is_equal_and_independent() {
    let original = WorldBuilder::new()
        .unlimited_bag()
        .vertical_wall(2, 2)
        .beepers(3, 3, 4)
        .build()
        .unwrap();
    let mut copy = original.clone();
    assert_eq!(copy, original);
    assert_eq!(copy.robot.bag, UNLIMITED_BAG);

    copy.robot.position.x = 5;
    copy.robot.direction = Direction::West;
    copy.walls[0].x = 9;
    copy.piles[0].count = 1;
    copy.dimensions.width = 20;

    assert_eq!(original.robot.position, Position::new(1, 1));
    assert_eq!(original.robot.direction, Direction::East);
    assert_eq!(original.walls[0], Wall::vertical(2, 2));
    assert_eq!(original.beepers_at(3, 3), 4);
    assert_eq!(original.dimensions.width, 10);
    assert_eq!(original.robot.bag, UNLIMITED_BAG);
}

#[test]
fn test_mutating_source_leaves_clone() {
    let mut original = maze();
    let copy = original.clone();
    original.piles.clear();
    original.walls.push(Wall::horizontal(1, 1));
    assert_eq!(copy, maze());
}

// ─────────────────────────────────────────────────────────────────────
// Loading
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_lesson_json_shape() {
    let json = r#"{
        "dimensions": {"width": 5, "height": 5},
        "karel": {"position": {"x": 1, "y": 1}, "direction": {"type": "north"}, "beepers": -1},
        "walls": [{"type": "vertical", "x": 2, "y": 1}, {"type": "vertical", "x": 2, "y": 1}],
        "beepers": [{"x": 3, "y": 3, "count": 2}, {"x": 3, "y": 3, "count": 1}]
    }"#;
    let w = World::from_json(json).unwrap();
    assert_eq!(w.robot.direction, Direction::North);
    assert_eq!(w.robot.bag, UNLIMITED_BAG);
    assert_eq!(w.walls.len(), 1);
    assert_eq!(w.piles.len(), 1);
    assert_eq!(w.beepers_at(3, 3), 3);

    let back = World::from_json(&w.to_json().unwrap()).unwrap();
    assert_eq!(back, w);
}

#[test]
fn test_walls_and_beepers_are_optional_in_json() {
    let json = r#"{
        "dimensions": {"width": 3, "height": 2},
        "karel": {"position": {"x": 3, "y": 2}, "direction": {"type": "west"}, "beepers": 0}
    }"#;
    let w = World::from_json(json).unwrap();
    assert!(w.walls.is_empty());
    assert!(w.piles.is_empty());
}

#[test]
fn test_invalid_worlds_are_rejected() {
    assert!(matches!(
        WorldBuilder::new().size(0, 5).build(),
        Err(WorldError::InvalidDimensions { .. })
    ));
    assert!(matches!(
        WorldBuilder::new().size(31, 5).build(),
        Err(WorldError::InvalidDimensions { .. })
    ));
    assert!(matches!(
        WorldBuilder::new().bag(-2).build(),
        Err(WorldError::InvalidBag(-2))
    ));
    assert!(matches!(
        WorldBuilder::new().beepers(2, 2, 0).build(),
        Err(WorldError::EmptyPile { x: 2, y: 2 })
    ));
    assert!(matches!(
        WorldBuilder::new().beepers(11, 2, 1).build(),
        Err(WorldError::PileOutOfBounds { .. })
    ));
    assert!(matches!(
        WorldBuilder::new().vertical_wall(0, 1).build(),
        Err(WorldError::WallOutOfBounds { .. })
    ));
    assert!(matches!(
        World::from_json("{not json"),
        Err(WorldError::Json(_))
    ));
}

#[test]
fn test_duplicate_walls_do_not_change_semantics() {
    let once = WorldBuilder::new().vertical_wall(1, 1).build().unwrap();
    let mut twice = once.clone();
    twice.walls.push(Wall::vertical(1, 1));
    for s in [Sensor::FrontIsClear, Sensor::FrontIsBlocked] {
        assert_eq!(sense(&once, s), sense(&twice, s));
    }
    assert_eq!(move_forward(&once).is_err(), move_forward(&twice).is_err());
}
