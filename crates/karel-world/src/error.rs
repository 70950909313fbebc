use karel_types::ErrorCode;

use crate::world::{Direction, WallKind};

/// A world description that breaks a world invariant.
#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    #[error("world size {width}x{height} is invalid: each side must be between 1 and 30")]
    InvalidDimensions { width: i32, height: i32 },

    #[error("robot position ({x}, {y}) is outside the {width}x{height} world")]
    RobotOutOfBounds {
        x: i32,
        y: i32,
        width: i32,
        height: i32,
    },

    #[error("beeper bag count {0} is invalid: use -1 for an unlimited bag")]
    InvalidBag(i32),

    #[error("beeper pile at ({x}, {y}) is empty: piles hold at least one beeper")]
    EmptyPile { x: i32, y: i32 },

    #[error("beeper pile at ({x}, {y}) is outside the world")]
    PileOutOfBounds { x: i32, y: i32 },

    #[error("{kind} wall at ({x}, {y}) is outside the world")]
    WallOutOfBounds { kind: WallKind, x: i32, y: i32 },

    #[error("invalid world JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// A robot action the world refused. The world is left unchanged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutionFault {
    #[error("Karel crashed into a wall moving {direction} from ({x}, {y})")]
    WallCollision { x: i32, y: i32, direction: Direction },

    #[error("Karel cannot move {direction} from ({x}, {y}): that is the edge of the world")]
    BoundaryViolation { x: i32, y: i32, direction: Direction },

    #[error("there is no beeper to pick up at ({x}, {y})")]
    NoBeeperPresent { x: i32, y: i32 },

    #[error("Karel's beeper bag is empty")]
    BagEmpty,
}

impl ExecutionFault {
    /// The diagnostic code reported for this fault.
    pub fn code(&self) -> ErrorCode {
        match self {
            ExecutionFault::WallCollision { .. } => ErrorCode::WALL_COLLISION,
            ExecutionFault::BoundaryViolation { .. } => ErrorCode::BOUNDARY_VIOLATION,
            ExecutionFault::NoBeeperPresent { .. } => ErrorCode::NO_BEEPER_PRESENT,
            ExecutionFault::BagEmpty => ErrorCode::BAG_EMPTY,
        }
    }

    /// A short hint shown beside the message.
    pub fn suggestion(&self) -> &'static str {
        match self {
            ExecutionFault::WallCollision { .. } => "Check front_is_clear() before calling move()",
            ExecutionFault::BoundaryViolation { .. } => {
                "Check front_is_clear() before calling move()"
            }
            ExecutionFault::NoBeeperPresent { .. } => {
                "Check beepers_present() before calling pick_beeper()"
            }
            ExecutionFault::BagEmpty => "Check beepers_in_bag() before calling put_beeper()",
        }
    }
}
