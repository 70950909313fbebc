//! Lesson test runner: one program checked against several worlds.
//!
//! Each [`TestWorld`] pairs a starting world with a check on the final
//! world. The program is validated once, then run to completion in a fresh
//! [`Environment`] per world, so no state leaks between cases.

use std::collections::BTreeMap;
use std::fmt;

use karel_types::SourceFile;
use karel_validator::ValidationOptions;
use karel_world::World;
use serde::Serialize;

use crate::config::ExecutionConfig;
use crate::controller::{Environment, ExecutionStatus};
use crate::error::{EvalError, EvalResult};

/// A check on the world a program left behind.
pub type WorldCheck = Box<dyn Fn(&World) -> Result<(), String> + Send + Sync>;

/// A named starting world and what the program should leave in it.
pub struct TestWorld {
    pub name: String,
    pub world: World,
    check: WorldCheck,
}

impl TestWorld {
    pub fn new(
        name: impl Into<String>,
        world: World,
        check: impl Fn(&World) -> Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            world,
            check: Box::new(check),
        }
    }

    /// Run the check against a final world.
    pub fn check(&self, world: &World) -> Result<(), String> {
        (self.check)(world)
    }
}

impl fmt::Debug for TestWorld {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestWorld")
            .field("name", &self.name)
            .field("world", &self.world)
            .finish_non_exhaustive()
    }
}

// ── Checks ───────────────────────────────────────────────────────────────────

/// The robot ends on `(x, y)`.
pub fn expect_position(x: i32, y: i32) -> impl Fn(&World) -> Result<(), String> + Send + Sync {
    move |world| {
        let at = world.robot.position;
        if at.x == x && at.y == y {
            Ok(())
        } else {
            Err(format!(
                "expected robot at ({x}, {y}), found ({}, {})",
                at.x, at.y
            ))
        }
    }
}

/// The corner `(x, y)` ends with exactly `count` beepers.
pub fn expect_beepers_at(
    x: i32,
    y: i32,
    count: u32,
) -> impl Fn(&World) -> Result<(), String> + Send + Sync {
    move |world| {
        let found = world.beepers_at(x, y);
        if found == count {
            Ok(())
        } else {
            Err(format!(
                "expected {count} beeper(s) at ({x}, {y}), found {found}"
            ))
        }
    }
}

/// Robot and beepers end exactly as in `expected`.
pub fn expect_world(expected: World) -> impl Fn(&World) -> Result<(), String> + Send + Sync {
    move |world| {
        let want = &expected.robot;
        let got = &world.robot;
        if got.position != want.position || got.direction != want.direction {
            return Err(format!(
                "expected robot at ({}, {}) facing {}, found ({}, {}) facing {}",
                want.position.x,
                want.position.y,
                want.direction.name(),
                got.position.x,
                got.position.y,
                got.direction.name(),
            ));
        }
        let (want_piles, got_piles) = (pile_map(&expected), pile_map(world));
        if want_piles != got_piles {
            let diff = want_piles
                .keys()
                .chain(got_piles.keys())
                .find(|k| want_piles.get(*k) != got_piles.get(*k))
                .copied();
            if let Some((x, y)) = diff {
                return Err(format!(
                    "expected {} beeper(s) at ({x}, {y}), found {}",
                    want_piles.get(&(x, y)).copied().unwrap_or(0),
                    got_piles.get(&(x, y)).copied().unwrap_or(0),
                ));
            }
        }
        Ok(())
    }
}

fn pile_map(world: &World) -> BTreeMap<(i32, i32), u32> {
    let mut piles = BTreeMap::new();
    for pile in world.piles.iter().filter(|p| p.count > 0) {
        *piles.entry((pile.x, pile.y)).or_insert(0) += pile.count;
    }
    piles
}

// ── Results ──────────────────────────────────────────────────────────────────

/// Result of running the program in one test world.
#[derive(Debug, Clone, Serialize)]
pub struct TestResult {
    pub name: String,
    pub passed: bool,
    /// Why the case failed.
    pub message: Option<String>,
    pub final_status: ExecutionStatus,
    pub steps: u64,
}

impl fmt::Display for TestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.passed {
            write!(f, "  ✓ {}", self.name)
        } else {
            write!(
                f,
                "  ✗ {}: {}",
                self.name,
                self.message.as_deref().unwrap_or("unknown failure")
            )
        }
    }
}

/// Summary of a whole test run.
#[derive(Debug, Clone, Serialize)]
pub struct TestRunSummary {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
}

impl TestRunSummary {
    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }
}

impl fmt::Display for TestRunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for r in &self.results {
            writeln!(f, "{r}")?;
        }
        writeln!(f, "\n{} passed, {} failed", self.passed, self.failed)
    }
}

/// Run `source` against every test world.
///
/// A program that fails validation is rejected before any world runs.
/// Otherwise every case reports, in order, whether the run succeeded and
/// its check held.
pub fn run_tests(
    source: &str,
    worlds: &[TestWorld],
    config: &ExecutionConfig,
) -> EvalResult<TestRunSummary> {
    run_tests_with(source, worlds, config, &ValidationOptions::default())
}

/// [`run_tests`] with the exercise's allowed commands.
pub fn run_tests_with(
    source: &str,
    worlds: &[TestWorld],
    config: &ExecutionConfig,
    options: &ValidationOptions,
) -> EvalResult<TestRunSummary> {
    karel_validator::analyze(&SourceFile::new(source), options).map_err(EvalError::Rejected)?;

    let results: Vec<TestResult> = worlds
        .iter()
        .map(|test| run_single_test(source, test, config, options))
        .collect();

    let passed = results.iter().filter(|r| r.passed).count();
    let failed = results.len() - passed;
    tracing::info!(passed, failed, "test run finished");

    Ok(TestRunSummary {
        results,
        passed,
        failed,
    })
}

fn run_single_test(
    source: &str,
    test: &TestWorld,
    config: &ExecutionConfig,
    options: &ValidationOptions,
) -> TestResult {
    let mut env = Environment::with_config(test.world.clone(), config.clone())
        .with_options(options.clone());
    env.set_source(source);
    let state = env.run_to_completion().clone();

    let outcome = match state.status {
        ExecutionStatus::Success => test.check(env.world()),
        _ => Err(match (&state.error, state.error_line) {
            (Some(msg), Some(line)) => format!("line {line}: {msg}"),
            (Some(msg), None) => msg.clone(),
            _ => format!("program stopped in state '{}'", state.status),
        }),
    };
    tracing::debug!(test_world = %test.name, passed = outcome.is_ok(), steps = state.step_count, "test case");

    TestResult {
        name: test.name.clone(),
        passed: outcome.is_ok(),
        message: outcome.err(),
        final_status: state.status,
        steps: state.step_count,
    }
}
