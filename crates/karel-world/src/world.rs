//! World model: grid dimensions, robot pose, walls and beeper piles.
//!
//! A [`World`] is a plain value. The executor never mutates one in place;
//! every action produces a new snapshot. `Clone` is a full deep copy.
//!
//! Coordinates are 1-based. `y` grows northward, so `(1, 1)` is the
//! south-west corner.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::WorldError;

/// Smallest and largest grid side length.
pub const MIN_SIDE: i32 = 1;
pub const MAX_SIDE: i32 = 30;

/// Bag count meaning "unlimited beepers".
pub const UNLIMITED_BAG: i32 = -1;

// ══════════════════════════════════════════════════════════════════════════════
// Position & Direction
// ══════════════════════════════════════════════════════════════════════════════

/// A grid cell, 1-indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// The neighbouring cell one step in `direction`.
    pub fn step(self, direction: Direction) -> Position {
        let (dx, dy) = direction.delta();
        Position::new(self.x + dx, self.y + dy)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Compass direction. Serialises as `{"type": "east"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Direction {
    North,
    East,
    South,
    West,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::North,
        Direction::East,
        Direction::South,
        Direction::West,
    ];

    /// One step counter-clockwise: north → west → south → east → north.
    pub fn left(self) -> Direction {
        match self {
            Direction::North => Direction::West,
            Direction::West => Direction::South,
            Direction::South => Direction::East,
            Direction::East => Direction::North,
        }
    }

    /// One step clockwise.
    pub fn right(self) -> Direction {
        match self {
            Direction::North => Direction::East,
            Direction::East => Direction::South,
            Direction::South => Direction::West,
            Direction::West => Direction::North,
        }
    }

    /// Unit offset of one step in this direction.
    pub fn delta(self) -> (i32, i32) {
        match self {
            Direction::North => (0, 1),
            Direction::East => (1, 0),
            Direction::South => (0, -1),
            Direction::West => (-1, 0),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Direction::North => "north",
            Direction::East => "east",
            Direction::South => "south",
            Direction::West => "west",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Walls & Beepers
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WallKind {
    /// Blocks the boundary between `(x, y)` and `(x, y + 1)`.
    Horizontal,
    /// Blocks the boundary between `(x, y)` and `(x + 1, y)`.
    Vertical,
}

impl fmt::Display for WallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WallKind::Horizontal => f.write_str("horizontal"),
            WallKind::Vertical => f.write_str("vertical"),
        }
    }
}

/// A wall segment on one cell boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Wall {
    #[serde(rename = "type")]
    pub kind: WallKind,
    pub x: i32,
    pub y: i32,
}

impl Wall {
    pub fn horizontal(x: i32, y: i32) -> Self {
        Self {
            kind: WallKind::Horizontal,
            x,
            y,
        }
    }

    pub fn vertical(x: i32, y: i32) -> Self {
        Self {
            kind: WallKind::Vertical,
            x,
            y,
        }
    }
}

/// A stack of beepers on one cell. At most one pile per cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BeeperPile {
    pub x: i32,
    pub y: i32,
    pub count: u32,
}

// ══════════════════════════════════════════════════════════════════════════════
// World
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: i32,
    pub height: i32,
}

/// Robot pose and bag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Robot {
    pub position: Position,
    pub direction: Direction,
    /// Beepers carried; [`UNLIMITED_BAG`] means unlimited.
    #[serde(rename = "beepers")]
    pub bag: i32,
}

impl Robot {
    pub fn has_unlimited_bag(&self) -> bool {
        self.bag == UNLIMITED_BAG
    }
}

/// A complete world snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct World {
    pub dimensions: Dimensions,
    #[serde(rename = "karel")]
    pub robot: Robot,
    #[serde(default)]
    pub walls: Vec<Wall>,
    #[serde(default, rename = "beepers")]
    pub piles: Vec<BeeperPile>,
}

impl Default for World {
    /// 10×10, robot at `(1, 1)` facing east with an empty bag, no walls,
    /// no beepers.
    fn default() -> Self {
        Self {
            dimensions: Dimensions {
                width: 10,
                height: 10,
            },
            robot: Robot {
                position: Position::new(1, 1),
                direction: Direction::East,
                bag: 0,
            },
            walls: Vec::new(),
            piles: Vec::new(),
        }
    }
}

impl World {
    /// Parse a world from its lesson JSON form and validate it.
    pub fn from_json(json: &str) -> Result<World, WorldError> {
        let world: World = serde_json::from_str(json)?;
        let world = world.validated()?;
        tracing::debug!(
            width = world.dimensions.width,
            height = world.dimensions.height,
            walls = world.walls.len(),
            piles = world.piles.len(),
            "loaded world"
        );
        Ok(world)
    }

    /// Serialise to the lesson JSON form.
    pub fn to_json(&self) -> Result<String, WorldError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Check every invariant and normalise: piles on one cell are merged
    /// by summing their counts, duplicate walls are dropped.
    pub fn validated(mut self) -> Result<World, WorldError> {
        let Dimensions { width, height } = self.dimensions;
        if !(MIN_SIDE..=MAX_SIDE).contains(&width) || !(MIN_SIDE..=MAX_SIDE).contains(&height) {
            return Err(WorldError::InvalidDimensions { width, height });
        }
        let pos = self.robot.position;
        if !self.contains(pos) {
            return Err(WorldError::RobotOutOfBounds {
                x: pos.x,
                y: pos.y,
                width,
                height,
            });
        }
        if self.robot.bag < UNLIMITED_BAG {
            return Err(WorldError::InvalidBag(self.robot.bag));
        }
        for wall in &self.walls {
            if !self.contains(Position::new(wall.x, wall.y)) {
                return Err(WorldError::WallOutOfBounds {
                    kind: wall.kind,
                    x: wall.x,
                    y: wall.y,
                });
            }
        }

        let mut piles: Vec<BeeperPile> = Vec::with_capacity(self.piles.len());
        for pile in &self.piles {
            if pile.count == 0 {
                return Err(WorldError::EmptyPile {
                    x: pile.x,
                    y: pile.y,
                });
            }
            if !self.contains(Position::new(pile.x, pile.y)) {
                return Err(WorldError::PileOutOfBounds {
                    x: pile.x,
                    y: pile.y,
                });
            }
            match piles.iter_mut().find(|p| p.x == pile.x && p.y == pile.y) {
                Some(existing) => {
                    tracing::warn!(x = pile.x, y = pile.y, "merging duplicate beeper piles");
                    existing.count = existing.count.saturating_add(pile.count);
                }
                None => piles.push(*pile),
            }
        }
        self.piles = piles;

        let mut walls: Vec<Wall> = Vec::with_capacity(self.walls.len());
        for wall in &self.walls {
            if !walls.contains(wall) {
                walls.push(*wall);
            }
        }
        self.walls = walls;

        Ok(self)
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    /// `true` if `pos` lies inside `[1, width] × [1, height]`.
    pub fn contains(&self, pos: Position) -> bool {
        (1..=self.dimensions.width).contains(&pos.x) && (1..=self.dimensions.height).contains(&pos.y)
    }

    /// Number of beepers on a cell (0 when there is no pile).
    pub fn beepers_at(&self, x: i32, y: i32) -> u32 {
        self.piles
            .iter()
            .find(|p| p.x == x && p.y == y)
            .map_or(0, |p| p.count)
    }

    /// `true` if a wall sits on the boundary between two adjacent cells.
    /// Cells that are not orthogonal neighbours never share a wall.
    pub fn has_wall_between(&self, a: Position, b: Position) -> bool {
        let wall = if a.x == b.x && (a.y - b.y).abs() == 1 {
            Wall::horizontal(a.x, a.y.min(b.y))
        } else if a.y == b.y && (a.x - b.x).abs() == 1 {
            Wall::vertical(a.x.min(b.x), a.y)
        } else {
            return false;
        };
        self.walls.contains(&wall)
    }

    /// `true` if the robot at `from` can step one cell in `direction`.
    pub fn is_clear(&self, from: Position, direction: Direction) -> bool {
        let to = from.step(direction);
        self.contains(to) && !self.has_wall_between(from, to)
    }

    // ── Pile bookkeeping (used by the executor on its own copy) ───────────────

    pub(crate) fn add_beeper(&mut self, pos: Position) {
        match self.piles.iter_mut().find(|p| p.x == pos.x && p.y == pos.y) {
            Some(pile) => pile.count = pile.count.saturating_add(1),
            None => self.piles.push(BeeperPile {
                x: pos.x,
                y: pos.y,
                count: 1,
            }),
        }
    }

    /// Remove one beeper; returns `false` if the cell has none.
    pub(crate) fn take_beeper(&mut self, pos: Position) -> bool {
        let Some(idx) = self.piles.iter().position(|p| p.x == pos.x && p.y == pos.y) else {
            return false;
        };
        if self.piles[idx].count <= 1 {
            self.piles.remove(idx);
        } else {
            self.piles[idx].count -= 1;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_world() {
        let w = World::default();
        assert_eq!(w.dimensions, Dimensions { width: 10, height: 10 });
        assert_eq!(w.robot.position, Position::new(1, 1));
        assert_eq!(w.robot.direction, Direction::East);
        assert_eq!(w.robot.bag, 0);
        assert!(w.walls.is_empty());
        assert!(w.piles.is_empty());
    }

    #[test]
    fn test_turn_left_cycle() {
        assert_eq!(Direction::North.left(), Direction::West);
        assert_eq!(Direction::West.left(), Direction::South);
        assert_eq!(Direction::South.left(), Direction::East);
        assert_eq!(Direction::East.left(), Direction::North);
        for d in Direction::ALL {
            assert_eq!(d.left().right(), d);
        }
    }

    #[test]
    fn test_direction_json_shape() {
        let json = serde_json::to_string(&Direction::East).unwrap();
        assert_eq!(json, r#"{"type":"east"}"#);
    }

    #[test]
    fn test_wall_between_is_symmetric() {
        let mut w = World::default();
        w.walls.push(Wall::vertical(2, 3));
        w.walls.push(Wall::horizontal(5, 5));
        assert!(w.has_wall_between(Position::new(2, 3), Position::new(3, 3)));
        assert!(w.has_wall_between(Position::new(3, 3), Position::new(2, 3)));
        assert!(w.has_wall_between(Position::new(5, 5), Position::new(5, 6)));
        assert!(w.has_wall_between(Position::new(5, 6), Position::new(5, 5)));
        assert!(!w.has_wall_between(Position::new(5, 4), Position::new(5, 5)));
        assert!(!w.has_wall_between(Position::new(2, 3), Position::new(4, 3)));
    }

    #[test]
    fn test_take_beeper_removes_empty_pile() {
        let mut w = World::default();
        w.piles.push(BeeperPile { x: 1, y: 1, count: 1 });
        assert!(w.take_beeper(Position::new(1, 1)));
        assert!(w.piles.is_empty());
        assert!(!w.take_beeper(Position::new(1, 1)));
    }
}
