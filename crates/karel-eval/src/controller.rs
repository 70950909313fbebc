//! Execution controller: the run/step/pause/reset state machine.
//!
//! An [`Environment`] owns one world, one program and one execution state.
//! Ticks are driven from outside: a UI timer calls [`Environment::tick`], a
//! test calls [`Environment::run_to_completion`], a native host calls
//! [`Environment::run_blocking`]. Each tick executes exactly one robot
//! command, and suspension only ever happens between ticks.
//!
//! | From | Request | To |
//! |------|---------|----|
//! | idle / success / error | `run` | running (continuous) |
//! | idle / success / error | `step` | one tick, then paused |
//! | running | `pause` | paused |
//! | paused | `run` | running |
//! | paused | `step` | one tick, then paused |
//! | any | fault or rejection | error |
//! | any | program end | success |
//! | any | `reset` | idle |

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use karel_types::{KarelError, SourceFile, Span};
use karel_validator::ValidationOptions;
use karel_world::{ExecutionFault, World};
use serde::{Deserialize, Serialize};

use crate::commands;
use crate::config::ExecutionConfig;
use crate::error::{EvalError, EvalResult};
use crate::test_runner::TestWorld;
use crate::vm::{Machine, Suspend};

// ══════════════════════════════════════════════════════════════════════════════
// State
// ══════════════════════════════════════════════════════════════════════════════

/// Where an environment is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    #[default]
    Idle,
    Running,
    Paused,
    Error,
    Success,
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExecutionStatus::Idle => "idle",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Paused => "paused",
            ExecutionStatus::Error => "error",
            ExecutionStatus::Success => "success",
        };
        f.write_str(name)
    }
}

/// Everything a UI needs to render the controls and highlight lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionState {
    pub status: ExecutionStatus,
    /// Line of the most recent robot command.
    pub current_line: Option<u32>,
    /// Line the run faulted or was rejected on.
    pub error_line: Option<u32>,
    /// Robot commands executed this run.
    pub step_count: u64,
    /// Message shown to the student.
    pub error: Option<String>,
    /// The full diagnostic behind `error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<KarelError>,
    /// Delay between continuous-mode ticks.
    pub step_delay_ms: u64,
}

impl ExecutionState {
    fn new(step_delay_ms: u64) -> Self {
        Self {
            status: ExecutionStatus::Idle,
            current_line: None,
            error_line: None,
            step_count: 0,
            error: None,
            diagnostic: None,
            step_delay_ms,
        }
    }
}

/// How a running program is being driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Continuous,
    SingleStep,
}

/// A pause flag shareable with another thread.
///
/// [`Environment::run_blocking`] reads it only between ticks, so an
/// in-flight robot command always finishes.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Re-arm the token for another run.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::Release);
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Environment
// ══════════════════════════════════════════════════════════════════════════════

/// One robot, one world, one program.
///
/// Environments share nothing: two on the same page never see each
/// other's world or state.
pub struct Environment {
    source: String,
    /// The reset target.
    initial_world: World,
    world: World,
    state: ExecutionState,
    config: ExecutionConfig,
    options: ValidationOptions,
    machine: Option<Machine>,
    mode: Mode,
    test_worlds: Vec<TestWorld>,
    loaded_test: Option<String>,
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("state", &self.state)
            .field("world", &self.world)
            .field("loaded_test", &self.loaded_test)
            .finish_non_exhaustive()
    }
}

impl Environment {
    pub fn new(world: World) -> Self {
        Self::with_config(world, ExecutionConfig::default())
    }

    pub fn with_config(world: World, config: ExecutionConfig) -> Self {
        Self {
            source: String::new(),
            initial_world: world.clone(),
            world,
            state: ExecutionState::new(config.step_delay_ms),
            config,
            options: ValidationOptions::default(),
            machine: None,
            mode: Mode::Continuous,
            test_worlds: Vec::new(),
            loaded_test: None,
        }
    }

    /// Restrict the exercise to some robot commands.
    pub fn with_options(mut self, options: ValidationOptions) -> Self {
        self.options = options;
        self
    }

    /// Change the allowed commands. A run in progress is abandoned.
    pub fn set_options(&mut self, options: ValidationOptions) {
        self.options = options;
        if self.is_active() {
            self.reset();
        }
    }

    // ── Accessors ─────────────────────────────────────────────────────────

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn initial_world(&self) -> &World {
        &self.initial_world
    }

    pub fn state(&self) -> &ExecutionState {
        &self.state
    }

    pub fn status(&self) -> ExecutionStatus {
        self.state.status
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    pub fn step_delay(&self) -> Duration {
        Duration::from_millis(self.state.step_delay_ms)
    }

    /// Whether a program is mid-run, running or paused.
    pub fn is_active(&self) -> bool {
        matches!(self.state.status, ExecutionStatus::Running | ExecutionStatus::Paused)
    }

    // ── Setup ─────────────────────────────────────────────────────────────

    /// Replace the program. A run in progress is abandoned.
    pub fn set_source(&mut self, source: impl Into<String>) {
        self.source = source.into();
        if self.is_active() {
            self.reset();
        }
    }

    /// Make `world` the reset target and reset to it.
    pub fn load_world(&mut self, world: World) {
        self.initial_world = world;
        self.loaded_test = None;
        self.reset();
    }

    /// Parse, validate and load a world document.
    pub fn load_world_json(&mut self, json: &str) -> EvalResult<()> {
        let world = World::from_json(json)?;
        self.load_world(world);
        Ok(())
    }

    pub fn set_step_delay_ms(&mut self, delay_ms: u64) {
        self.config.step_delay_ms = delay_ms;
        self.state.step_delay_ms = delay_ms;
    }

    /// Register the worlds a lesson checks programs against.
    pub fn set_test_worlds(&mut self, worlds: Vec<TestWorld>) {
        self.test_worlds = worlds;
    }

    pub fn test_world_names(&self) -> Vec<&str> {
        self.test_worlds.iter().map(|t| t.name.as_str()).collect()
    }

    /// Make a registered test world the reset target.
    pub fn load_test_world(&mut self, name: &str) -> EvalResult<()> {
        let world = self
            .test_worlds
            .iter()
            .find(|t| t.name == name)
            .map(|t| t.world.clone())
            .ok_or_else(|| EvalError::UnknownTestWorld(name.to_string()))?;
        self.initial_world = world;
        self.loaded_test = Some(name.to_string());
        self.reset();
        tracing::info!(test_world = name, "loaded test world");
        Ok(())
    }

    pub fn loaded_test_world(&self) -> Option<&str> {
        self.loaded_test.as_deref()
    }

    /// Check the current world against the loaded test world, if any.
    pub fn check_loaded_test(&self) -> Option<Result<(), String>> {
        let name = self.loaded_test.as_deref()?;
        let test = self.test_worlds.iter().find(|t| t.name == name)?;
        Some(test.check(&self.world))
    }

    // ══════════════════════════════════════════════════════════════════════
    // Transitions
    // ══════════════════════════════════════════════════════════════════════

    /// Request continuous mode. From a finished or idle state this starts a
    /// fresh run from the reset target.
    pub fn run(&mut self) {
        match self.state.status {
            ExecutionStatus::Running => self.mode = Mode::Continuous,
            ExecutionStatus::Paused => {
                self.mode = Mode::Continuous;
                self.transition(ExecutionStatus::Running);
            }
            ExecutionStatus::Idle | ExecutionStatus::Success | ExecutionStatus::Error => {
                self.start(Mode::Continuous);
            }
        }
    }

    /// Execute exactly one robot command, then pause.
    pub fn step(&mut self) {
        match self.state.status {
            ExecutionStatus::Idle | ExecutionStatus::Success | ExecutionStatus::Error => {
                self.start(Mode::SingleStep);
            }
            ExecutionStatus::Running | ExecutionStatus::Paused => {
                self.mode = Mode::SingleStep;
                self.transition(ExecutionStatus::Running);
            }
        }
        self.tick();
    }

    /// Stop before the next tick. Only a running program can pause.
    pub fn pause(&mut self) {
        if self.state.status == ExecutionStatus::Running {
            self.transition(ExecutionStatus::Paused);
        }
    }

    /// Restore the reset target and clear all execution state. Resetting
    /// twice is the same as resetting once.
    pub fn reset(&mut self) {
        if let Some(machine) = self.machine.take() {
            machine.clear_namespace();
        }
        self.world = self.initial_world.clone();
        let previous = self.state.status;
        self.state = ExecutionState::new(self.config.step_delay_ms);
        self.mode = Mode::Continuous;
        if previous != ExecutionStatus::Idle {
            tracing::info!(from = %previous, "environment reset");
        }
    }

    /// Advance one tick if running. Returns whether another tick is due.
    pub fn tick(&mut self) -> bool {
        if self.state.status != ExecutionStatus::Running {
            return false;
        }
        let Some(machine) = self.machine.as_mut() else {
            return false;
        };
        let (primitive, span) = match machine.advance() {
            Ok(Suspend::Command { primitive, span }) => (primitive, span),
            Ok(Suspend::Finished) => {
                self.finish();
                return false;
            }
            Err(err) => {
                self.fail(err);
                return false;
            }
        };

        if let Some(max) = self.config.max_steps {
            if self.state.step_count >= max {
                let err = self.limit_error(max, span);
                self.fail(err);
                return false;
            }
        }

        // Highlight before the effect, so a fault reports this line.
        self.state.current_line = Some(span.start_line);
        self.state.step_count += 1;
        tracing::debug!(
            step = self.state.step_count,
            line = span.start_line,
            command = primitive.name(),
            "tick"
        );

        match commands::invoke(&mut self.world, primitive) {
            Ok(result) => machine.resume(result),
            Err(fault) => {
                let err = self.fault_error(&fault, span);
                self.fail(err);
                return false;
            }
        }

        // Look ahead so the last command's tick also reports success.
        match machine.advance() {
            Ok(Suspend::Command { .. }) => {}
            Ok(Suspend::Finished) => {
                self.finish();
                return false;
            }
            Err(err) => {
                self.fail(err);
                return false;
            }
        }

        if self.mode == Mode::SingleStep {
            self.transition(ExecutionStatus::Paused);
            return false;
        }
        true
    }

    /// Run to the end with no delay between ticks.
    pub fn run_to_completion(&mut self) -> &ExecutionState {
        self.run();
        while self.tick() {}
        &self.state
    }

    /// Run to the end on this thread, sleeping the step delay between
    /// ticks. Cancelling the token pauses the run at the next tick
    /// boundary.
    pub fn run_blocking(&mut self, cancel: &CancelToken) -> &ExecutionState {
        self.run();
        loop {
            if cancel.is_cancelled() {
                self.pause();
                break;
            }
            if !self.tick() {
                break;
            }
            let delay = self.step_delay();
            if !delay.is_zero() {
                std::thread::sleep(delay);
            }
        }
        &self.state
    }

    // ── Internals ─────────────────────────────────────────────────────────

    /// Validate, compile and position the machine on its first command.
    fn start(&mut self, mode: Mode) {
        if self.state.status != ExecutionStatus::Idle {
            self.reset();
        }
        self.mode = mode;

        let file = SourceFile::new(self.source.as_str());
        let program = karel_validator::analyze(&file, &self.options)
            .and_then(|module| crate::compiler::compile(&module, &file));
        let program = match program {
            Ok(program) => program,
            Err(err) => {
                tracing::info!(code = %err.code, line = err.line(), "program rejected");
                self.fail(err);
                return;
            }
        };

        let machine = Machine::new(program, &self.config);
        self.machine = Some(machine);
        self.transition(ExecutionStatus::Running);
    }

    fn transition(&mut self, to: ExecutionStatus) {
        let from = self.state.status;
        if from != to {
            tracing::info!(%from, %to, step = self.state.step_count, "status change");
            self.state.status = to;
        }
    }

    fn finish(&mut self) {
        if let Some(machine) = self.machine.as_ref() {
            machine.clear_namespace();
        }
        self.transition(ExecutionStatus::Success);
    }

    fn fail(&mut self, err: KarelError) {
        if let Some(machine) = self.machine.as_ref() {
            machine.clear_namespace();
        }
        self.state.error_line = Some(err.line());
        self.state.error = Some(err.message.clone());
        self.state.diagnostic = Some(err);
        self.transition(ExecutionStatus::Error);
    }

    fn fault_error(&self, fault: &ExecutionFault, span: Span) -> KarelError {
        KarelError::new(fault.code(), fault.to_string(), span, self.line_text(span))
            .with_suggestion(fault.suggestion())
    }

    fn limit_error(&self, max: u64, span: Span) -> KarelError {
        KarelError::new(
            karel_types::ErrorCode::STEP_LIMIT,
            format!("program exceeded the limit of {max} robot commands"),
            span,
            self.line_text(span),
        )
        .with_suggestion("Check for a loop that never ends")
    }

    fn line_text(&self, span: Span) -> String {
        SourceFile::new(self.source.as_str())
            .line(span.start_line)
            .unwrap_or("")
            .to_string()
    }
}
