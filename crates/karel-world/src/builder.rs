use crate::error::WorldError;
use crate::world::{BeeperPile, Dimensions, Direction, Position, Wall, World, UNLIMITED_BAG};

/// Fluent constructor for worlds, starting from [`World::default`].
///
/// ```
/// use karel_world::{Direction, WorldBuilder};
///
/// let world = WorldBuilder::new()
///     .size(5, 3)
///     .robot(1, 1, Direction::North)
///     .bag(2)
///     .vertical_wall(2, 1)
///     .beepers(4, 3, 1)
///     .build()
///     .unwrap();
/// assert_eq!(world.beepers_at(4, 3), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct WorldBuilder {
    world: World,
}

impl WorldBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn size(mut self, width: i32, height: i32) -> Self {
        self.world.dimensions = Dimensions { width, height };
        self
    }

    pub fn robot(mut self, x: i32, y: i32, direction: Direction) -> Self {
        self.world.robot.position = Position::new(x, y);
        self.world.robot.direction = direction;
        self
    }

    pub fn bag(mut self, beepers: i32) -> Self {
        self.world.robot.bag = beepers;
        self
    }

    pub fn unlimited_bag(self) -> Self {
        self.bag(UNLIMITED_BAG)
    }

    pub fn wall(mut self, wall: Wall) -> Self {
        self.world.walls.push(wall);
        self
    }

    /// Wall between `(x, y)` and `(x, y + 1)`.
    pub fn horizontal_wall(self, x: i32, y: i32) -> Self {
        self.wall(Wall::horizontal(x, y))
    }

    /// Wall between `(x, y)` and `(x + 1, y)`.
    pub fn vertical_wall(self, x: i32, y: i32) -> Self {
        self.wall(Wall::vertical(x, y))
    }

    /// Add `count` beepers to a cell; repeated calls on one cell accumulate.
    pub fn beepers(mut self, x: i32, y: i32, count: u32) -> Self {
        self.world.piles.push(BeeperPile { x, y, count });
        self
    }

    /// Validate and normalise the world.
    pub fn build(self) -> Result<World, WorldError> {
        self.world.validated()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_default() {
        assert_eq!(WorldBuilder::new().build().unwrap(), World::default());
    }

    #[test]
    fn test_repeated_beepers_merge() {
        let w = WorldBuilder::new()
            .beepers(3, 3, 2)
            .beepers(3, 3, 1)
            .build()
            .unwrap();
        assert_eq!(w.piles.len(), 1);
        assert_eq!(w.beepers_at(3, 3), 3);
    }

    #[test]
    fn test_robot_outside_grid_rejected() {
        let err = WorldBuilder::new().size(3, 3).robot(4, 1, Direction::East).build();
        assert!(matches!(err, Err(WorldError::RobotOutOfBounds { x: 4, .. })));
    }
}
