//! Karel world model and the command/sensor executor.
//!
//! The dependency runs one way: the controller calls the executor, the
//! executor reads and copies [`World`] values. Nothing here calls back out.

mod builder;
mod error;
pub mod executor;
mod primitive;
mod world;

pub use builder::WorldBuilder;
pub use error::{ExecutionFault, WorldError};
pub use executor::{execute, Outcome};
pub use primitive::{Action, Primitive, Sensor};
pub use world::{
    BeeperPile, Dimensions, Direction, Position, Robot, Wall, WallKind, World, MAX_SIDE,
    MIN_SIDE, UNLIMITED_BAG,
};
