//! The robot's command surface.
//!
//! [`KarelCommands`] is the capability handed to a running program: four
//! actions and eighteen sensors, nothing else. It is implemented once, for
//! [`World`], on top of the pure executor. Each negated sensor has a default
//! that complements its positive twin, so an implementation cannot make a
//! pair disagree.

use karel_world::{executor, Action, ExecutionFault, Primitive, Sensor, World};

use crate::value::Value;

/// The 22 operations a Karel program can invoke.
pub trait KarelCommands {
    // ── Actions ──
    fn move_forward(&mut self) -> Result<(), ExecutionFault>;
    fn turn_left(&mut self) -> Result<(), ExecutionFault>;
    fn pick_beeper(&mut self) -> Result<(), ExecutionFault>;
    fn put_beeper(&mut self) -> Result<(), ExecutionFault>;

    // ── Sensors ──
    fn front_is_clear(&self) -> bool;
    fn left_is_clear(&self) -> bool;
    fn right_is_clear(&self) -> bool;
    fn beepers_present(&self) -> bool;
    fn beepers_in_bag(&self) -> bool;
    fn facing_north(&self) -> bool;
    fn facing_east(&self) -> bool;
    fn facing_south(&self) -> bool;
    fn facing_west(&self) -> bool;

    fn front_is_blocked(&self) -> bool {
        !self.front_is_clear()
    }
    fn left_is_blocked(&self) -> bool {
        !self.left_is_clear()
    }
    fn right_is_blocked(&self) -> bool {
        !self.right_is_clear()
    }
    fn no_beepers_present(&self) -> bool {
        !self.beepers_present()
    }
    fn no_beepers_in_bag(&self) -> bool {
        !self.beepers_in_bag()
    }
    fn not_facing_north(&self) -> bool {
        !self.facing_north()
    }
    fn not_facing_east(&self) -> bool {
        !self.facing_east()
    }
    fn not_facing_south(&self) -> bool {
        !self.facing_south()
    }
    fn not_facing_west(&self) -> bool {
        !self.facing_west()
    }
}

/// Dispatch one primitive to `commands`: `None` for actions, the reading
/// for sensors.
pub fn invoke<C>(commands: &mut C, primitive: Primitive) -> Result<Value, ExecutionFault>
where
    C: KarelCommands + ?Sized,
{
    let sensed = match primitive {
        Primitive::Action(action) => {
            match action {
                Action::Move => commands.move_forward()?,
                Action::TurnLeft => commands.turn_left()?,
                Action::PickBeeper => commands.pick_beeper()?,
                Action::PutBeeper => commands.put_beeper()?,
            }
            return Ok(Value::None);
        }
        Primitive::Sensor(sensor) => match sensor {
            Sensor::FrontIsClear => commands.front_is_clear(),
            Sensor::FrontIsBlocked => commands.front_is_blocked(),
            Sensor::LeftIsClear => commands.left_is_clear(),
            Sensor::LeftIsBlocked => commands.left_is_blocked(),
            Sensor::RightIsClear => commands.right_is_clear(),
            Sensor::RightIsBlocked => commands.right_is_blocked(),
            Sensor::BeepersPresent => commands.beepers_present(),
            Sensor::NoBeepersPresent => commands.no_beepers_present(),
            Sensor::BeepersInBag => commands.beepers_in_bag(),
            Sensor::NoBeepersInBag => commands.no_beepers_in_bag(),
            Sensor::FacingNorth => commands.facing_north(),
            Sensor::NotFacingNorth => commands.not_facing_north(),
            Sensor::FacingEast => commands.facing_east(),
            Sensor::NotFacingEast => commands.not_facing_east(),
            Sensor::FacingSouth => commands.facing_south(),
            Sensor::NotFacingSouth => commands.not_facing_south(),
            Sensor::FacingWest => commands.facing_west(),
            Sensor::NotFacingWest => commands.not_facing_west(),
        },
    };
    Ok(Value::Bool(sensed))
}

/// Actions replace the snapshot only when the executor accepts them.
impl KarelCommands for World {
    fn move_forward(&mut self) -> Result<(), ExecutionFault> {
        *self = executor::move_forward(self)?;
        Ok(())
    }

    fn turn_left(&mut self) -> Result<(), ExecutionFault> {
        *self = executor::turn_left(self);
        Ok(())
    }

    fn pick_beeper(&mut self) -> Result<(), ExecutionFault> {
        *self = executor::pick_beeper(self)?;
        Ok(())
    }

    fn put_beeper(&mut self) -> Result<(), ExecutionFault> {
        *self = executor::put_beeper(self)?;
        Ok(())
    }

    fn front_is_clear(&self) -> bool {
        executor::sense(self, Sensor::FrontIsClear)
    }

    fn left_is_clear(&self) -> bool {
        executor::sense(self, Sensor::LeftIsClear)
    }

    fn right_is_clear(&self) -> bool {
        executor::sense(self, Sensor::RightIsClear)
    }

    fn beepers_present(&self) -> bool {
        executor::sense(self, Sensor::BeepersPresent)
    }

    fn beepers_in_bag(&self) -> bool {
        executor::sense(self, Sensor::BeepersInBag)
    }

    fn facing_north(&self) -> bool {
        executor::sense(self, Sensor::FacingNorth)
    }

    fn facing_east(&self) -> bool {
        executor::sense(self, Sensor::FacingEast)
    }

    fn facing_south(&self) -> bool {
        executor::sense(self, Sensor::FacingSouth)
    }

    fn facing_west(&self) -> bool {
        executor::sense(self, Sensor::FacingWest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use karel_world::{Direction, WorldBuilder};

    #[test]
    fn test_invoke_matches_executor_for_every_primitive() {
        let world = WorldBuilder::new()
            .size(4, 4)
            .robot(2, 2, Direction::North)
            .bag(1)
            .vertical_wall(2, 2)
            .beepers(2, 2, 1)
            .build()
            .unwrap();
        for primitive in Primitive::ALL {
            let mut through_trait = world.clone();
            let got = invoke(&mut through_trait, primitive);
            match karel_world::execute(&world, primitive) {
                Ok(karel_world::Outcome::World(next)) => {
                    assert_eq!(got, Ok(Value::None), "{primitive}");
                    assert_eq!(through_trait, next, "{primitive}");
                }
                Ok(karel_world::Outcome::Sensed(b)) => {
                    assert_eq!(got, Ok(Value::Bool(b)), "{primitive}");
                    assert_eq!(through_trait, world, "{primitive}");
                }
                Err(fault) => {
                    assert_eq!(got, Err(fault), "{primitive}");
                    assert_eq!(through_trait, world, "{primitive}");
                }
            }
        }
    }

    #[test]
    fn test_fault_leaves_world_unchanged() {
        let mut world = World::default();
        let before = world.clone();
        assert_eq!(
            invoke(&mut world, Primitive::Action(Action::PickBeeper)),
            Err(ExecutionFault::NoBeeperPresent { x: 1, y: 1 })
        );
        assert_eq!(world, before);
    }
}
