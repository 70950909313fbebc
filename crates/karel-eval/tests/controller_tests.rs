//! Environment tests: the run/step/pause/reset state machine, fault
//! reporting, limits and environment independence.

use karel_eval::{
    CancelToken, EvalError, Environment, ExecutionConfig, ExecutionStatus, TestWorld,
};
use karel_types::ErrorCode;
use karel_world::{Direction, World, WorldBuilder};

// ─────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────

fn corridor(width: i32) -> World {
    WorldBuilder::new()
        .size(width, 2)
        .robot(1, 1, Direction::East)
        .build()
        .expect("valid world")
}

fn env_with(world: World, source: &str) -> Environment {
    let mut env = Environment::new(world);
    env.set_source(source);
    env
}

fn unlimited() -> ExecutionConfig {
    ExecutionConfig {
        step_delay_ms: 0,
        max_steps: None,
        ..ExecutionConfig::default()
    }
}

fn error_code(env: &Environment) -> Option<ErrorCode> {
    env.state().diagnostic.as_ref().map(|d| d.code)
}

/// Step until the program leaves the paused state.
fn step_to_end(env: &mut Environment) {
    env.step();
    while env.status() == ExecutionStatus::Paused {
        env.step();
    }
}

const HARVEST: &str = "\
def turn_right():
    for i in range(3):
        turn_left()

while front_is_clear():
    if beepers_present():
        pick_beeper()
    move()
turn_right()
";

fn harvest_world() -> World {
    WorldBuilder::new()
        .size(5, 3)
        .robot(1, 1, Direction::East)
        .beepers(3, 1, 2)
        .beepers(5, 1, 1)
        .build()
        .expect("valid world")
}

// ─────────────────────────────────────────────────────────────────────
// Running
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_new_environment_is_idle() {
    let env = Environment::new(World::default());
    let state = env.state();
    assert_eq!(state.status, ExecutionStatus::Idle);
    assert_eq!(state.step_count, 0);
    assert_eq!(state.current_line, None);
    assert_eq!(state.error_line, None);
    assert_eq!(state.error, None);
    assert_eq!(env.world(), &World::default());
}

#[test]
fn test_run_to_completion_succeeds() {
    let mut env = env_with(corridor(5), "while front_is_clear():\n    move()\n");
    let state = env.run_to_completion().clone();
    assert_eq!(state.status, ExecutionStatus::Success);
    assert_eq!(state.error, None);
    assert_eq!(env.world().robot.position.x, 5);
    assert_eq!(env.world().robot.direction, Direction::East);
}

#[test]
fn test_each_robot_command_is_one_step() {
    let mut env = env_with(corridor(5), "move()\nturn_left()\nmove()\n");
    env.run_to_completion();
    assert_eq!(env.state().step_count, 3);
    assert_eq!(env.state().current_line, Some(3));
    assert_eq!(env.world().robot.position.x, 2);
    assert_eq!(env.world().robot.position.y, 2);
}

#[test]
fn test_sensors_count_as_steps() {
    let mut env = env_with(corridor(3), "while front_is_clear():\n    move()\n");
    env.run_to_completion();
    // Three sensor readings, two moves.
    assert_eq!(env.state().step_count, 5);
}

#[test]
fn test_empty_program_succeeds_without_steps() {
    let mut env = env_with(corridor(3), "");
    env.run_to_completion();
    assert_eq!(env.status(), ExecutionStatus::Success);
    assert_eq!(env.state().step_count, 0);
    assert_eq!(env.world(), &corridor(3));
}

#[test]
fn test_for_range_puts_beepers() {
    let world = WorldBuilder::new()
        .robot(1, 1, Direction::East)
        .bag(5)
        .build()
        .unwrap();
    let mut env = env_with(world, "for i in range(3):\n    put_beeper()\n");
    env.run_to_completion();
    assert_eq!(env.status(), ExecutionStatus::Success);
    assert_eq!(env.world().beepers_at(1, 1), 3);
    assert_eq!(env.world().robot.bag, 2);
}

#[test]
fn test_harvest_program() {
    let mut env = env_with(harvest_world(), HARVEST);
    env.run_to_completion();
    assert_eq!(env.status(), ExecutionStatus::Success);
    let world = env.world();
    assert_eq!(world.robot.position.x, 5);
    assert_eq!(world.robot.direction, Direction::South);
    assert_eq!(world.beepers_at(3, 1), 1);
    assert_eq!(world.beepers_at(5, 1), 1);
    assert_eq!(world.robot.bag, 1);
}

// ─────────────────────────────────────────────────────────────────────
// Stepping
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_step_executes_one_command_then_pauses() {
    let mut env = env_with(corridor(5), "turn_left()\nmove()\nturn_left()\n");
    env.step();
    assert_eq!(env.status(), ExecutionStatus::Paused);
    assert_eq!(env.state().step_count, 1);
    assert_eq!(env.state().current_line, Some(1));
    assert_eq!(env.world().robot.direction, Direction::North);
    assert_eq!(env.world().robot.position.y, 1);

    env.step();
    assert_eq!(env.status(), ExecutionStatus::Paused);
    assert_eq!(env.state().current_line, Some(2));
    assert_eq!(env.world().robot.position.y, 2);
}

#[test]
fn test_last_step_reports_success() {
    let mut env = env_with(corridor(5), "move()\nmove()\n");
    env.step();
    assert_eq!(env.status(), ExecutionStatus::Paused);
    env.step();
    assert_eq!(env.status(), ExecutionStatus::Success);
    assert_eq!(env.state().step_count, 2);
}

#[test]
fn test_stepping_matches_running() {
    let mut stepped = env_with(harvest_world(), HARVEST);
    step_to_end(&mut stepped);

    let mut ran = env_with(harvest_world(), HARVEST);
    ran.run_to_completion();

    assert_eq!(stepped.status(), ExecutionStatus::Success);
    assert_eq!(stepped.world(), ran.world());
    assert_eq!(stepped.state(), ran.state());
}

#[test]
fn test_run_after_step_continues() {
    let mut env = env_with(corridor(5), "while front_is_clear():\n    move()\n");
    env.step();
    env.step();
    assert_eq!(env.status(), ExecutionStatus::Paused);
    env.run_to_completion();
    assert_eq!(env.status(), ExecutionStatus::Success);
    assert_eq!(env.world().robot.position.x, 5);
}

// ─────────────────────────────────────────────────────────────────────
// Pause & reset
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_pause_stops_ticks() {
    let mut env = env_with(corridor(5), "while front_is_clear():\n    move()\n");
    env.run();
    assert_eq!(env.status(), ExecutionStatus::Running);
    assert!(env.tick());
    env.pause();
    assert_eq!(env.status(), ExecutionStatus::Paused);

    let before = env.state().clone();
    assert!(!env.tick());
    assert_eq!(env.state(), &before);

    env.run();
    assert_eq!(env.status(), ExecutionStatus::Running);
    while env.tick() {}
    assert_eq!(env.status(), ExecutionStatus::Success);
}

#[test]
fn test_pause_only_affects_running() {
    let mut env = env_with(corridor(5), "move()\n");
    env.pause();
    assert_eq!(env.status(), ExecutionStatus::Idle);
    env.run_to_completion();
    env.pause();
    assert_eq!(env.status(), ExecutionStatus::Success);
}

#[test]
fn test_tick_when_idle_does_nothing() {
    let mut env = env_with(corridor(5), "move()\n");
    assert!(!env.tick());
    assert_eq!(env.status(), ExecutionStatus::Idle);
    assert_eq!(env.world(), &corridor(5));
}

#[test]
fn test_reset_restores_initial_world() {
    let mut env = env_with(harvest_world(), HARVEST);
    env.run_to_completion();
    assert_ne!(env.world(), &harvest_world());

    env.reset();
    assert_eq!(env.world(), &harvest_world());
    assert_eq!(env.status(), ExecutionStatus::Idle);
    assert_eq!(env.state().step_count, 0);
    assert_eq!(env.state().current_line, None);
}

#[test]
fn test_reset_is_idempotent() {
    let mut env = env_with(corridor(5), "move()\nmove()\n");
    env.step();
    env.reset();
    let (world, state) = (env.world().clone(), env.state().clone());
    env.reset();
    assert_eq!(env.world(), &world);
    assert_eq!(env.state(), &state);
}

#[test]
fn test_reset_mid_run_then_run_again() {
    let mut env = env_with(corridor(5), "while front_is_clear():\n    move()\n");
    env.step();
    env.step();
    env.reset();
    env.run_to_completion();
    assert_eq!(env.status(), ExecutionStatus::Success);
    assert_eq!(env.world().robot.position.x, 5);
}

#[test]
fn test_running_twice_gives_same_result() {
    let mut env = env_with(harvest_world(), HARVEST);
    env.run_to_completion();
    let (world, state) = (env.world().clone(), env.state().clone());
    env.run_to_completion();
    assert_eq!(env.world(), &world);
    assert_eq!(env.state(), &state);
}

#[test]
fn test_set_source_abandons_run() {
    let mut env = env_with(corridor(5), "move()\nmove()\n");
    env.step();
    env.set_source("turn_left()\n");
    assert_eq!(env.status(), ExecutionStatus::Idle);
    assert_eq!(env.world(), &corridor(5));
    env.run_to_completion();
    assert_eq!(env.world().robot.direction, Direction::North);
}

#[test]
fn test_load_world_becomes_reset_target() {
    let mut env = env_with(corridor(5), "move()\n");
    env.load_world(corridor(3));
    env.run_to_completion();
    assert_eq!(env.world().robot.position.x, 2);
    env.reset();
    assert_eq!(env.world(), &corridor(3));
}

#[test]
fn test_load_world_json_rejects_bad_world() {
    let mut env = Environment::new(corridor(3));
    let err = env.load_world_json("{ not json").unwrap_err();
    assert!(matches!(err, EvalError::World(_)));
    assert_eq!(env.world(), &corridor(3));
}

// ─────────────────────────────────────────────────────────────────────
// Faults
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_boundary_fault_reports_line() {
    let mut env = env_with(corridor(2), "move()\nmove()\n");
    env.run_to_completion();
    let state = env.state();
    assert_eq!(state.status, ExecutionStatus::Error);
    assert_eq!(state.error_line, Some(2));
    assert_eq!(state.current_line, Some(2));
    assert_eq!(state.step_count, 2);
    assert_eq!(error_code(&env), Some(ErrorCode::BOUNDARY_VIOLATION));
    // The failed move left the robot where it was.
    assert_eq!(env.world().robot.position.x, 2);
}

#[test]
fn test_wall_fault_leaves_world_unchanged() {
    let world = WorldBuilder::new()
        .size(3, 3)
        .robot(1, 1, Direction::East)
        .vertical_wall(1, 1)
        .build()
        .unwrap();
    let mut env = env_with(world.clone(), "move()\n");
    env.run_to_completion();
    assert_eq!(env.status(), ExecutionStatus::Error);
    assert_eq!(error_code(&env), Some(ErrorCode::WALL_COLLISION));
    assert_eq!(env.world(), &world);
    let diagnostic = env.state().diagnostic.as_ref().unwrap();
    assert_eq!(diagnostic.source_line, "move()");
    assert!(diagnostic.suggestion.is_some());
}

#[test]
fn test_pick_without_beeper_faults() {
    let mut env = env_with(corridor(3), "move()\npick_beeper()\n");
    env.run_to_completion();
    assert_eq!(error_code(&env), Some(ErrorCode::NO_BEEPER_PRESENT));
    assert_eq!(env.state().error_line, Some(2));
    assert_eq!(env.world().robot.position.x, 2);
}

#[test]
fn test_put_with_empty_bag_faults() {
    let mut env = env_with(corridor(3), "put_beeper()\n");
    env.run_to_completion();
    assert_eq!(error_code(&env), Some(ErrorCode::BAG_EMPTY));
    assert_eq!(env.world().beepers_at(1, 1), 0);
}

#[test]
fn test_fault_inside_function_reports_its_own_line() {
    let source = "def go():\n    move()\n    move()\n\ngo()\n";
    let mut env = env_with(corridor(2), source);
    env.run_to_completion();
    assert_eq!(env.status(), ExecutionStatus::Error);
    assert_eq!(env.state().error_line, Some(3));
}

#[test]
fn test_step_after_error_restarts() {
    let mut env = env_with(corridor(2), "move()\nmove()\n");
    env.run_to_completion();
    assert_eq!(env.status(), ExecutionStatus::Error);
    env.step();
    assert_eq!(env.status(), ExecutionStatus::Paused);
    assert_eq!(env.state().step_count, 1);
    assert_eq!(env.state().error, None);
    assert_eq!(env.world().robot.position.x, 2);
}

// ─────────────────────────────────────────────────────────────────────
// Rejection & runtime errors
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_rejected_program_never_runs() {
    let mut env = env_with(corridor(3), "move()\nx = 1\n");
    env.run();
    let state = env.state();
    assert_eq!(state.status, ExecutionStatus::Error);
    assert_eq!(state.error_line, Some(2));
    assert_eq!(state.step_count, 0);
    assert_eq!(error_code(&env), Some(ErrorCode::ASSIGNMENT_NOT_ALLOWED));
    assert_eq!(env.world(), &corridor(3));
    assert!(!env.tick());
}

#[test]
fn test_syntax_error_is_reported() {
    let mut env = env_with(corridor(3), "while front_is_clear()\n    move()\n");
    env.run();
    assert_eq!(env.status(), ExecutionStatus::Error);
    assert_eq!(env.state().error_line, Some(1));
    let code = error_code(&env).unwrap();
    assert_eq!(code.category(), karel_types::ErrorCategory::Syntax);
}

#[test]
fn test_called_before_definition() {
    let mut env = env_with(corridor(3), "go()\n\ndef go():\n    move()\n");
    env.run_to_completion();
    assert_eq!(env.status(), ExecutionStatus::Error);
    assert_eq!(error_code(&env), Some(ErrorCode::CALLED_BEFORE_DEFINITION));
    assert_eq!(env.state().error_line, Some(1));
    assert_eq!(env.state().step_count, 0);
}

#[test]
fn test_call_after_definition_runs() {
    let mut env = env_with(corridor(3), "def go():\n    move()\n\ngo()\ngo()\n");
    env.run_to_completion();
    assert_eq!(env.status(), ExecutionStatus::Success);
    assert_eq!(env.world().robot.position.x, 3);
}

#[test]
fn test_division_by_zero_is_arithmetic_error() {
    let mut env = env_with(corridor(3), "move()\nif 1 // 0:\n    move()\n");
    env.run_to_completion();
    assert_eq!(error_code(&env), Some(ErrorCode::ARITHMETIC));
    assert_eq!(env.state().error_line, Some(2));
    assert_eq!(env.world().robot.position.x, 2);
}

// ─────────────────────────────────────────────────────────────────────
// Limits
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_commandless_loop_exhausts_gas() {
    let config = ExecutionConfig {
        gas_per_tick: 1_000,
        ..unlimited()
    };
    let mut env = Environment::with_config(corridor(3), config);
    env.set_source("while True:\n    pass\n");
    env.run_to_completion();
    assert_eq!(env.status(), ExecutionStatus::Error);
    assert_eq!(error_code(&env), Some(ErrorCode::GAS_EXHAUSTED));
    assert_eq!(env.state().step_count, 0);
}

#[test]
fn test_endless_command_loop_hits_step_limit() {
    let config = ExecutionConfig {
        max_steps: Some(50),
        ..unlimited()
    };
    let mut env = Environment::with_config(corridor(3), config);
    env.set_source("while True:\n    turn_left()\n");
    env.run_to_completion();
    assert_eq!(env.status(), ExecutionStatus::Error);
    assert_eq!(error_code(&env), Some(ErrorCode::STEP_LIMIT));
    assert_eq!(env.state().step_count, 50);
    assert_eq!(env.state().error_line, Some(2));
}

#[test]
fn test_unbounded_recursion_hits_depth_limit() {
    let config = ExecutionConfig {
        max_call_depth: 20,
        ..unlimited()
    };
    let mut env = Environment::with_config(corridor(3), config);
    env.set_source("def spin():\n    turn_left()\n    spin()\n\nspin()\n");
    env.run_to_completion();
    assert_eq!(env.status(), ExecutionStatus::Error);
    assert_eq!(error_code(&env), Some(ErrorCode::RECURSION_LIMIT));
    assert_eq!(env.state().error_line, Some(3));
}

#[test]
fn test_no_step_limit_when_unset() {
    let mut env = Environment::with_config(corridor(3), unlimited());
    env.set_source("for i in range(20000):\n    turn_left()\n");
    env.run_to_completion();
    assert_eq!(env.status(), ExecutionStatus::Success);
    assert_eq!(env.state().step_count, 20_000);
}

// ─────────────────────────────────────────────────────────────────────
// Blocking runs & isolation
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_cancelled_token_pauses_before_first_tick() {
    let mut env = Environment::with_config(corridor(5), unlimited());
    env.set_source("while front_is_clear():\n    move()\n");
    let token = CancelToken::new();
    token.cancel();
    env.run_blocking(&token);
    assert_eq!(env.status(), ExecutionStatus::Paused);
    assert_eq!(env.state().step_count, 0);

    token.reset();
    assert!(!token.is_cancelled());
    env.run_blocking(&token);
    assert_eq!(env.status(), ExecutionStatus::Success);
    assert_eq!(env.world().robot.position.x, 5);
}

#[test]
fn test_step_delay_is_configurable() {
    let mut env = Environment::new(corridor(3));
    assert_eq!(env.state().step_delay_ms, 300);
    env.set_step_delay_ms(0);
    assert_eq!(env.state().step_delay_ms, 0);
    env.reset();
    assert_eq!(env.state().step_delay_ms, 0);
}

#[test]
fn test_environments_are_independent() {
    let mut a = env_with(corridor(5), "while front_is_clear():\n    move()\n");
    let mut b = env_with(corridor(5), "turn_left()\n");
    a.step();
    b.run_to_completion();
    a.run_to_completion();
    assert_eq!(a.world().robot.position.x, 5);
    assert_eq!(a.world().robot.direction, Direction::East);
    assert_eq!(b.world().robot.position.x, 1);
    assert_eq!(b.world().robot.direction, Direction::North);
}

#[test]
fn test_environments_on_threads() {
    let handles: Vec<_> = (2..6)
        .map(|width| {
            std::thread::spawn(move || {
                let mut env = Environment::with_config(corridor(width), unlimited());
                env.set_source("while front_is_clear():\n    move()\n");
                env.run_blocking(&CancelToken::new());
                env.world().robot.position.x
            })
        })
        .collect();
    let ends: Vec<i32> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(ends, vec![2, 3, 4, 5]);
}

// ─────────────────────────────────────────────────────────────────────
// Test worlds & state shape
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_load_test_world() {
    let mut env = env_with(corridor(5), "move()\n");
    env.set_test_worlds(vec![TestWorld::new(
        "short",
        corridor(2),
        karel_eval::expect_position(2, 1),
    )]);
    assert_eq!(env.test_world_names(), vec!["short"]);
    env.load_test_world("short").unwrap();
    assert_eq!(env.world(), &corridor(2));
    assert_eq!(env.loaded_test_world(), Some("short"));

    env.run_to_completion();
    assert_eq!(env.check_loaded_test(), Some(Ok(())));
}

#[test]
fn test_unknown_test_world() {
    let mut env = Environment::new(corridor(3));
    let err = env.load_test_world("missing").unwrap_err();
    assert!(matches!(err, EvalError::UnknownTestWorld(name) if name == "missing"));
    assert_eq!(env.check_loaded_test(), None);
}

#[test]
fn test_state_serializes_lowercase_status() {
    let mut env = env_with(corridor(2), "move()\nmove()\n");
    let idle = serde_json::to_value(env.state()).unwrap();
    assert_eq!(idle["status"], "idle");
    assert!(idle.get("diagnostic").is_none());

    env.run_to_completion();
    let json = serde_json::to_value(env.state()).unwrap();
    assert_eq!(json["status"], "error");
    assert_eq!(json["error_line"], 2);
    assert_eq!(json["diagnostic"]["line"], 2);
}
