//! Command & sensor executor.
//!
//! Each call reads a snapshot and returns either a new snapshot (actions),
//! a boolean (sensors) or a fault. The input world is never modified, so a
//! faulting action leaves the caller's snapshot exactly as it was.

use crate::error::ExecutionFault;
use crate::primitive::{Action, Primitive, Sensor};
use crate::world::{Direction, World};

/// The result of one primitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// An action ran; this is the new snapshot.
    World(World),
    /// A sensor was read.
    Sensed(bool),
}

/// Execute any primitive against `world`.
pub fn execute(world: &World, primitive: Primitive) -> Result<Outcome, ExecutionFault> {
    match primitive {
        Primitive::Action(action) => apply(world, action).map(Outcome::World),
        Primitive::Sensor(sensor) => Ok(Outcome::Sensed(sense(world, sensor))),
    }
}

/// Apply one action, producing a new snapshot.
pub fn apply(world: &World, action: Action) -> Result<World, ExecutionFault> {
    match action {
        Action::Move => move_forward(world),
        Action::TurnLeft => Ok(turn_left(world)),
        Action::PickBeeper => pick_beeper(world),
        Action::PutBeeper => put_beeper(world),
    }
}

/// Step one cell in the facing direction.
pub fn move_forward(world: &World) -> Result<World, ExecutionFault> {
    let from = world.robot.position;
    let direction = world.robot.direction;
    let to = from.step(direction);

    if world.has_wall_between(from, to) {
        return Err(ExecutionFault::WallCollision {
            x: from.x,
            y: from.y,
            direction,
        });
    }
    if !world.contains(to) {
        return Err(ExecutionFault::BoundaryViolation {
            x: from.x,
            y: from.y,
            direction,
        });
    }

    let mut next = world.clone();
    next.robot.position = to;
    Ok(next)
}

/// Rotate 90° counter-clockwise. Never fails.
pub fn turn_left(world: &World) -> World {
    let mut next = world.clone();
    next.robot.direction = world.robot.direction.left();
    next
}

/// Move one beeper from the current cell into the bag.
pub fn pick_beeper(world: &World) -> Result<World, ExecutionFault> {
    let pos = world.robot.position;
    let mut next = world.clone();
    if !next.take_beeper(pos) {
        return Err(ExecutionFault::NoBeeperPresent { x: pos.x, y: pos.y });
    }
    if !next.robot.has_unlimited_bag() {
        next.robot.bag = next.robot.bag.saturating_add(1);
    }
    Ok(next)
}

/// Move one beeper from the bag onto the current cell.
pub fn put_beeper(world: &World) -> Result<World, ExecutionFault> {
    if world.robot.bag == 0 {
        return Err(ExecutionFault::BagEmpty);
    }
    let mut next = world.clone();
    if !next.robot.has_unlimited_bag() {
        next.robot.bag -= 1;
    }
    next.add_beeper(world.robot.position);
    Ok(next)
}

/// Read one sensor.
pub fn sense(world: &World, sensor: Sensor) -> bool {
    let robot = &world.robot;
    let pos = robot.position;
    let facing = robot.direction;
    match sensor {
        Sensor::FrontIsClear => world.is_clear(pos, facing),
        Sensor::LeftIsClear => world.is_clear(pos, facing.left()),
        Sensor::RightIsClear => world.is_clear(pos, facing.right()),
        Sensor::BeepersPresent => world.beepers_at(pos.x, pos.y) > 0,
        Sensor::BeepersInBag => robot.bag != 0,
        Sensor::FacingNorth => facing == Direction::North,
        Sensor::FacingEast => facing == Direction::East,
        Sensor::FacingSouth => facing == Direction::South,
        Sensor::FacingWest => facing == Direction::West,
        negated => !sense(world, negated.complement()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::Position;

    #[test]
    fn test_move_east_from_origin() {
        let w = World::default();
        let next = move_forward(&w).unwrap();
        assert_eq!(next.robot.position, Position::new(2, 1));
        assert_eq!(w.robot.position, Position::new(1, 1));
    }

    #[test]
    fn test_turn_left_leaves_everything_else() {
        let w = World::default();
        let next = turn_left(&w);
        assert_eq!(next.robot.direction, Direction::North);
        assert_eq!(next.robot.position, w.robot.position);
        assert_eq!(next.piles, w.piles);
    }

    #[test]
    fn test_execute_dispatches() {
        let w = World::default();
        assert_eq!(
            execute(&w, Primitive::Sensor(Sensor::FacingEast)),
            Ok(Outcome::Sensed(true))
        );
        assert!(matches!(
            execute(&w, Primitive::Action(Action::Move)),
            Ok(Outcome::World(_))
        ));
        assert_eq!(
            execute(&w, Primitive::Action(Action::PutBeeper)),
            Err(ExecutionFault::BagEmpty)
        );
    }
}
