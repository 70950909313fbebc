//! Karel execution engine.
//!
//! A validated program is compiled to bytecode and run by a resumable
//! [`Machine`] that suspends on every robot command. The [`Environment`]
//! drives the machine one command per tick and owns the world, the
//! run/step/pause/reset state machine and the execution state a UI renders.
//!
//! ```
//! use karel_eval::{Environment, ExecutionStatus};
//! use karel_world::{Direction, WorldBuilder};
//!
//! let world = WorldBuilder::new()
//!     .size(5, 5)
//!     .robot(1, 1, Direction::East)
//!     .build()
//!     .unwrap();
//! let mut env = Environment::new(world);
//! env.set_source("while front_is_clear():\n    move()\n");
//! let state = env.run_to_completion();
//! assert_eq!(state.status, ExecutionStatus::Success);
//! assert_eq!(env.world().robot.position.x, 5);
//! ```

pub mod bytecode;
pub mod commands;
pub mod compiler;
mod config;
mod controller;
mod error;
pub mod namespace;
pub mod test_runner;
pub mod value;
pub mod vm;

pub use commands::{invoke, KarelCommands};
pub use config::{ExecutionConfig, Speed};
pub use controller::{CancelToken, Environment, ExecutionState, ExecutionStatus};
pub use error::{EvalError, EvalResult};
pub use namespace::Namespace;
pub use test_runner::{
    expect_beepers_at, expect_position, expect_world, run_tests, run_tests_with, TestResult,
    TestRunSummary, TestWorld,
};
pub use value::Value;
pub use vm::{Machine, Suspend};
